//! Runtime settings of a vault session.

use crate::session::DEFAULT_ORACLE_TIMEOUT;
use directories::BaseDirs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Folder Dropbox syncs the extension's files into, relative to the home dir.
pub const DROPBOX_APP_DIR: &str = "Dropbox/Apps/TREZOR Password Manager";

#[derive(Debug, Clone)]
pub struct Config {
    vault_dir: PathBuf,
    oracle_timeout: Option<Duration>,
}

impl Config {
    pub fn new(vault_dir: PathBuf) -> Self {
        Self {
            vault_dir,
            oracle_timeout: Some(DEFAULT_ORACLE_TIMEOUT),
        }
    }

    /// Bounds each exchange with the device; `0` disables the limit.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.oracle_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        self
    }

    /// Directory holding the `.pswd` vault files.
    pub fn vault_dir(&self) -> &Path {
        &self.vault_dir
    }

    pub fn oracle_timeout(&self) -> Option<Duration> {
        self.oracle_timeout
    }
}

/// `<home>/Dropbox/Apps/TREZOR Password Manager`, if a home directory exists.
pub fn default_vault_dir() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.home_dir().join(DROPBOX_APP_DIR))
}
