use super::{BLOB_HEADER_LEN, IV_LEN, TAG_LEN};
use crate::error::VaultError;
use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{AeadInPlace, KeyInit, generic_array::GenericArray},
};
use tracing::debug;
use zeroize::Zeroizing;

/// Borrowed view of an `IV (12) | TAG (16) | CIPHERTEXT` blob.
#[derive(Debug, Clone, Copy)]
pub struct EncryptedBlob<'a> {
    iv: &'a [u8],
    tag: &'a [u8],
    ciphertext: &'a [u8],
}

impl<'a> EncryptedBlob<'a> {
    /// Splits raw bytes into IV, tag and ciphertext.
    ///
    /// A blob too short to carry an IV and a tag cannot be authenticated
    /// and is rejected as such.
    pub fn parse(data: &'a [u8]) -> Result<Self, VaultError> {
        if data.len() < BLOB_HEADER_LEN {
            debug!(len = data.len(), "encrypted blob shorter than its header");
            return Err(VaultError::AuthenticationFailure);
        }

        let (iv, rest) = data.split_at(IV_LEN);
        let (tag, ciphertext) = rest.split_at(TAG_LEN);

        Ok(Self {
            iv,
            tag,
            ciphertext,
        })
    }

    pub fn iv(&self) -> &[u8] {
        self.iv
    }

    pub fn tag(&self) -> &[u8] {
        self.tag
    }

    pub fn ciphertext(&self) -> &[u8] {
        self.ciphertext
    }
}

/// Decrypt an AES-256-GCM blob without associated data.
///
/// The whole ciphertext is processed at once and the tag is checked before
/// the plaintext leaves this function; on mismatch the scratch buffer is
/// zeroized and dropped.
pub fn decrypt(blob: &[u8], key: &[u8]) -> Result<Zeroizing<Vec<u8>>, VaultError> {
    let blob = EncryptedBlob::parse(blob)?;

    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| {
        debug!(len = key.len(), "key is not 256 bits");
        VaultError::AuthenticationFailure
    })?;

    let mut buffer = Zeroizing::new(blob.ciphertext.to_vec());
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(blob.iv),
            b"",
            buffer.as_mut_slice(),
            GenericArray::from_slice(blob.tag),
        )
        .map_err(|_| VaultError::AuthenticationFailure)?;

    Ok(buffer)
}

/// Decrypt a blob whose plaintext is UTF-8 text.
pub fn decrypt_text(blob: &[u8], key: &[u8]) -> Result<Zeroizing<String>, VaultError> {
    let bytes = decrypt(blob, key)?;
    let text = std::str::from_utf8(&bytes)
        .map_err(|e| VaultError::Parse(format!("decrypted data is not UTF-8: {e}")))?;
    Ok(Zeroizing::new(text.to_owned()))
}

/// Builds a blob the way the extension writes them.
#[cfg(test)]
pub(crate) fn seal(key: &[u8], iv: &[u8; IV_LEN], plaintext: &[u8]) -> Vec<u8> {
    let cipher = Aes256Gcm::new_from_slice(key).unwrap();
    let mut ciphertext = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(iv), b"", &mut ciphertext)
        .unwrap();

    let mut blob = iv.to_vec();
    blob.extend_from_slice(&tag);
    blob.extend_from_slice(&ciphertext);
    blob
}
