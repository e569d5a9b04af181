use std::path::PathBuf;

use thiserror::Error;

/// Everything that can stop a vault from being read.
///
/// None of these are retried: a failure while opening the vault ends the
/// session, a failure while viewing an entry ends that view only.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("device unavailable: {0}")]
    OracleUnavailable(String),

    #[error("authentication failed: data was tampered with or the wrong key was used")]
    AuthenticationFailure,

    #[error("malformed vault: {0}")]
    Parse(String),

    #[error("entry '{0}' not found")]
    NotFound(String),

    #[error("cannot read vault file {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl VaultError {
    /// Process exit code reported by the command line driver.
    pub fn exit_code(&self) -> u8 {
        match self {
            VaultError::OracleUnavailable(_) => 2,
            VaultError::AuthenticationFailure
            | VaultError::Parse(_)
            | VaultError::NotFound(_)
            | VaultError::Filesystem { .. } => 1,
        }
    }

    pub(crate) fn missing_field(entry: &str, field: &str) -> Self {
        VaultError::Parse(format!("entry '{entry}' has no '{field}' field"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_error_kind() {
        assert_eq!(VaultError::OracleUnavailable("gone".into()).exit_code(), 2);
        assert_eq!(VaultError::AuthenticationFailure.exit_code(), 1);
        assert_eq!(VaultError::Parse("bad".into()).exit_code(), 1);
        assert_eq!(VaultError::NotFound("3".into()).exit_code(), 1);
    }

    #[test]
    fn missing_field_names_entry_and_field() {
        let err = VaultError::missing_field("7", "safe_note");
        assert_eq!(err.to_string(), "malformed vault: entry '7' has no 'safe_note' field");
    }
}
