pub mod config;
pub mod crypto;
pub mod entry;
mod error;
pub mod oracle;
pub mod session;
mod storage;
pub mod vault;

pub use crate::config::{Config, default_vault_dir};
pub use crate::entry::EntrySecrets;
pub use crate::error::VaultError;
pub use crate::session::{DeviceSession, Prompter, SessionState};
pub use crate::storage::Storage;
pub use crate::vault::{Entry, Vault};

use crate::crypto::{DerivedKeys, aead, derive_keys};
use crate::oracle::Oracle;
use tracing::info;

/// An unlocked vault together with the device session that unlocked it.
///
/// Entry keys are not kept: every [`PasswordManager::view_entry`] goes back to
/// the device.
pub struct PasswordManager<O: Oracle> {
    session: DeviceSession<O>,
    storage: Storage,
    vault: Vault,
}

impl<O: Oracle> PasswordManager<O> {
    /// Derives the vault keys from the device, then reads, decrypts and parses
    /// the vault file.
    ///
    /// Any failure drops the session, which releases the device; the master
    /// secret and derived keys never outlive this call.
    pub async fn unlock(
        mut session: DeviceSession<O>,
        config: &Config,
    ) -> Result<Self, VaultError> {
        let keys = derive_vault_keys(&mut session).await?;
        let storage = Storage::in_dir(config.vault_dir(), keys.filename());

        let data = storage.load()?;
        let plaintext = aead::decrypt_text(&data, keys.encryption_key())?;
        drop(keys);

        let vault = Vault::parse(&plaintext)?;
        info!(entries = vault.len(), file = %storage.path().display(), "vault unlocked");

        Ok(Self {
            session,
            storage,
            vault,
        })
    }

    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    /// Location of the vault file that was opened.
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn session(&self) -> &DeviceSession<O> {
        &self.session
    }

    /// Decrypts one entry; see [`entry::view_entry`].
    pub async fn view_entry(&mut self, id: &str) -> Result<EntrySecrets, VaultError> {
        entry::view_entry(&self.vault, id, &mut self.session).await
    }

    /// Ends the session and releases the device.
    pub fn close(mut self) {
        self.session.close();
    }
}

/// Where the vault of the connected device lives, without reading it.
pub async fn locate_vault<O: Oracle>(
    session: &mut DeviceSession<O>,
    config: &Config,
) -> Result<Storage, VaultError> {
    let keys = derive_vault_keys(session).await?;
    Ok(Storage::in_dir(config.vault_dir(), keys.filename()))
}

async fn derive_vault_keys<O: Oracle>(
    session: &mut DeviceSession<O>,
) -> Result<DerivedKeys, VaultError> {
    if session.state() == SessionState::Disconnected {
        session.open().await?;
    }
    let master = session.master_key().await?;
    Ok(derive_keys(&master))
}
