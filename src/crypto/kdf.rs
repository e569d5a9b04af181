use super::{FILENAME_MESS, VAULT_FILE_SUFFIX};
use crate::error::VaultError;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

/// Secret returned by the device for the master key request.
///
/// Only ever lives in memory for one session.
pub struct MasterKey {
    bytes: Zeroizing<Vec<u8>>,
}

impl MasterKey {
    /// Wraps the raw bytes answered by the device.
    ///
    /// The secret is split in two equal halves, so it must hold an even,
    /// non-zero number of bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VaultError> {
        if bytes.is_empty() || bytes.len() % 2 != 0 {
            return Err(VaultError::Parse(format!(
                "master secret must have an even, non-zero length, got {} bytes",
                bytes.len()
            )));
        }
        Ok(Self {
            bytes: Zeroizing::new(bytes.to_vec()),
        })
    }

    /// Parses the hex form the device libraries hand out.
    pub fn from_hex(hex: &str) -> Result<Self, VaultError> {
        let bytes = Zeroizing::new(
            hex::decode(hex).map_err(|e| VaultError::Parse(format!("master secret: {e}")))?,
        );
        Self::from_bytes(&bytes)
    }

    /// Lowercase hex representation, the form the key split is defined on.
    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.bytes.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Keys derived once per session from the master secret.
pub struct DerivedKeys {
    file_key: Zeroizing<String>,
    encryption_key: Zeroizing<Vec<u8>>,
    filename: String,
}

impl DerivedKeys {
    /// First half of the master secret's hex string. Its ASCII bytes key the
    /// filename HMAC.
    pub fn file_key(&self) -> &str {
        &self.file_key
    }

    /// Second half of the master secret's hex string, decoded. This is the
    /// AES key of the vault file.
    pub fn encryption_key(&self) -> &[u8] {
        &self.encryption_key
    }

    /// Name of the vault file, `<hex hmac>.pswd`.
    pub fn filename(&self) -> &str {
        &self.filename
    }
}

/// Splits the master secret and names the vault file.
///
/// The split is done on the hex string: the first half stays a string and
/// keys the HMAC through its ASCII bytes, the second half is decoded back to
/// bytes for the cipher. Splitting the hex string of an even byte count at
/// its midpoint is the same as splitting the bytes, which is how the halves
/// are taken here.
pub fn derive_keys(master: &MasterKey) -> DerivedKeys {
    let (head, tail) = master.bytes.split_at(master.len() / 2);

    let file_key = Zeroizing::new(hex::encode(head));
    let encryption_key = Zeroizing::new(tail.to_vec());

    let mut mac =
        HmacSha256::new_from_slice(file_key.as_bytes()).expect("HMAC can take key of any size");
    mac.update(FILENAME_MESS.as_bytes());
    let filename = format!(
        "{}{VAULT_FILE_SUFFIX}",
        hex::encode(mac.finalize().into_bytes())
    );

    DerivedKeys {
        file_key,
        encryption_key,
        filename,
    }
}
