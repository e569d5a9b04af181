//! Cryptographic primitives of the vault format.
//!
//! Provides AES-256-GCM blob decryption and the derivation of the vault
//! file name and file key from the device-provided master secret.

pub mod aead;
pub mod kdf;

pub use aead::{EncryptedBlob, decrypt, decrypt_text};
pub use kdf::{DerivedKeys, MasterKey, derive_keys};

/// Length of the GCM initialization vector (12 bytes).
pub const IV_LEN: usize = 12;
/// Length of the GCM authentication tag (16 bytes).
pub const TAG_LEN: usize = 16;
/// Length of an AES-256 key (32 bytes / 256 bits).
pub const KEY_LEN: usize = 32;
/// Smallest valid blob: IV followed by the tag, empty ciphertext.
pub const BLOB_HEADER_LEN: usize = IV_LEN + TAG_LEN;
/// Extension of vault files.
pub const VAULT_FILE_SUFFIX: &str = ".pswd";
/// Domain separation message hashed with the file key to name the vault file.
pub const FILENAME_MESS: &str = "5f91add3fa1c3c76e90c90a3bd0999e2bd7833d06a483fe884ee60397aca277a";
