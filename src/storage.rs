//! Access to the encrypted vault file.

use crate::error::VaultError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Location of one vault file on disk.
///
/// The file is written by the browser extension and synced by Dropbox; this
/// crate only ever reads it.
#[derive(Clone, Debug)]
pub struct Storage {
    path: PathBuf,
}

impl Storage {
    /// Creates a new Storage instance with the given path.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Storage for the vault named `filename` inside `dir`.
    pub fn in_dir(dir: &Path, filename: &str) -> Self {
        Self::new(dir.join(filename))
    }

    /// Returns `true` if the vault file exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Loads the entire vault file into memory.
    ///
    /// The file handle is closed before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Filesystem`] if the file is missing or cannot be
    /// read.
    pub fn load(&self) -> Result<Vec<u8>, VaultError> {
        let data = fs::read(&self.path).map_err(|source| VaultError::Filesystem {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), len = data.len(), "vault file loaded");
        Ok(data)
    }

    /// Returns the path to the vault file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the file name component, e.g. `<hmac>.pswd`.
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|name| name.to_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_returns_file_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vault.pswd");
        fs::write(&path, b"hello world").unwrap();

        let storage = Storage::new(path);
        assert_eq!(storage.load().unwrap(), b"hello world");
    }

    #[test]
    fn load_fails_if_file_does_not_exist() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().join("missing.pswd"));

        match storage.load() {
            Err(VaultError::Filesystem { path, .. }) => {
                assert_eq!(path, dir.path().join("missing.pswd"))
            }
            other => panic!("expected Filesystem error, got: {other:?}"),
        }
    }

    #[test]
    fn load_fails_on_directory() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf());
        assert!(matches!(
            storage.load(),
            Err(VaultError::Filesystem { .. })
        ));
    }

    #[test]
    fn exists_tracks_the_file() {
        let dir = tempdir().unwrap();
        let storage = Storage::in_dir(dir.path(), "abc.pswd");
        assert!(!storage.exists());

        fs::write(storage.path(), b"data").unwrap();
        assert!(storage.exists());
    }

    #[test]
    fn file_name_is_the_last_component() {
        let storage = Storage::in_dir(Path::new("/tmp/vaults"), "abc.pswd");
        assert_eq!(storage.file_name(), Some("abc.pswd"));
        assert_eq!(storage.path(), Path::new("/tmp/vaults/abc.pswd"));
    }
}
