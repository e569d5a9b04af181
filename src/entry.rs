//! Opening a single entry: the device decrypts the entry's nonce into the
//! key protecting its password and safe note.
//!
//! The entry key is never stored. Every view asks the device again, so each
//! entry needs its own confirmation on the device.

use crate::crypto::aead;
use crate::error::VaultError;
use crate::oracle::{CipherKeyValue, Oracle};
use crate::session::DeviceSession;
use crate::vault::{Entry, Vault};
use tracing::{debug, info};
use zeroize::Zeroizing;

/// Decrypted protected fields of one entry.
pub struct EntrySecrets {
    password: Zeroizing<String>,
    safe_note: Zeroizing<String>,
}

impl EntrySecrets {
    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn safe_note(&self) -> &str {
        &self.safe_note
    }
}

/// Label shown for an entry and sent to the device.
///
/// `item` wins over `title`. A label that is a URL is reduced to its host.
pub fn display_label(entry: &Entry) -> &str {
    let label = entry.item().or(entry.title()).unwrap_or_default();
    url_host(label).unwrap_or(label)
}

/// Host of `label` if it looks like `scheme://host...`.
fn url_host(label: &str) -> Option<&str> {
    let (scheme, rest) = label.split_once("://")?;

    let mut chars = scheme.chars();
    let valid_scheme = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if !valid_scheme {
        return None;
    }

    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host_port = authority
        .rsplit_once('@')
        .map_or(authority, |(_, host)| host);

    let host = if host_port.starts_with('[') {
        // IPv6 literal, keep the brackets
        host_port
            .find(']')
            .map_or(host_port, |end| &host_port[..=end])
    } else {
        host_port.split(':').next().unwrap_or_default()
    };

    (!host.is_empty()).then_some(host)
}

/// Builds the device request that unlocks `entry`.
pub fn unlock_request(entry: &Entry) -> Result<CipherKeyValue, VaultError> {
    Ok(CipherKeyValue::unlock_entry(
        display_label(entry),
        entry.username(),
        entry.encrypted_nonce()?,
    ))
}

/// Asks the device for the key of `entry`.
///
/// # Errors
///
/// [`VaultError::Parse`] if the entry has no usable nonce,
/// [`VaultError::OracleUnavailable`] if the device does not answer or the
/// user declines.
pub async fn resolve_entry_key<O: Oracle>(
    entry: &Entry,
    session: &mut DeviceSession<O>,
) -> Result<Zeroizing<Vec<u8>>, VaultError> {
    let request = unlock_request(entry)?;
    debug!(id = entry.id(), "requesting entry key");
    session.cipher_key_value(request).await
}

/// Decrypts the password and safe note of entry `id`.
///
/// # Errors
///
/// [`VaultError::NotFound`] for an unknown id, [`VaultError::Parse`] for a
/// malformed entry, [`VaultError::OracleUnavailable`] if the key cannot be
/// obtained and [`VaultError::AuthenticationFailure`] if a field does not
/// verify under that key.
pub async fn view_entry<O: Oracle>(
    vault: &Vault,
    id: &str,
    session: &mut DeviceSession<O>,
) -> Result<EntrySecrets, VaultError> {
    let entry = vault
        .get(id)
        .ok_or_else(|| VaultError::NotFound(id.to_string()))?;

    let password_blob = entry.password_blob()?;
    let safe_note_blob = entry.safe_note_blob()?;

    let key = resolve_entry_key(entry, session).await?;

    let password = aead::decrypt_text(&password_blob, &key)?;
    let safe_note = aead::decrypt_text(&safe_note_blob, &key)?;
    info!(id, "entry decrypted");

    Ok(EntrySecrets {
        password,
        safe_note,
    })
}
