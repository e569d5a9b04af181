#![allow(dead_code)]

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{AeadInPlace, KeyInit},
};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use trezorpass::crypto::{MasterKey, derive_keys};
use trezorpass::oracle::{CipherKeyValue, SoftwareOracle};

pub const SEED: &[u8] = b"integration seed";

/// `SEED` as passed to `--emulator-seed`.
pub fn seed_hex() -> String {
    hex::encode(SEED)
}

/// AES-256-GCM blob laid out as `IV | TAG | CIPHERTEXT`.
pub fn seal(key: &[u8], iv: [u8; 12], plaintext: &[u8]) -> Vec<u8> {
    let cipher = Aes256Gcm::new_from_slice(key).unwrap();
    let mut ciphertext = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(&iv), b"", &mut ciphertext)
        .unwrap();

    let mut blob = iv.to_vec();
    blob.extend_from_slice(&tag);
    blob.extend_from_slice(&ciphertext);
    blob
}

/// Builds vault documents the way the browser extension stores them, keyed
/// by the software device seeded with `SEED`.
pub struct VaultBuilder {
    oracle: SoftwareOracle,
    entries: serde_json::Map<String, Value>,
    tags: serde_json::Map<String, Value>,
    next_iv: u8,
}

impl VaultBuilder {
    pub fn new() -> Self {
        Self {
            oracle: SoftwareOracle::new(SEED),
            entries: serde_json::Map::new(),
            tags: serde_json::Map::new(),
            next_iv: 0,
        }
    }

    fn iv(&mut self) -> [u8; 12] {
        self.next_iv += 1;
        [self.next_iv; 12]
    }

    pub fn tag(mut self, id: &str, title: &str) -> Self {
        self.tags
            .insert(id.to_string(), json!({ "title": title, "icon": "tag" }));
        self
    }

    /// Adds an entry. `label` is what the device shows: the host for URL
    /// titles, the title otherwise.
    pub fn entry(
        mut self,
        id: &str,
        title: &str,
        label: &str,
        username: &str,
        password: &str,
        safe_note: &str,
        tags: &[u64],
    ) -> Self {
        let entry_key = [0x3c ^ id.as_bytes()[0]; 32];
        let request = CipherKeyValue {
            encrypt: true,
            ..CipherKeyValue::unlock_entry(label, username, entry_key.to_vec())
        };
        let nonce = self.oracle.cipher_key_value(&request).unwrap();

        let password_iv = self.iv();
        let safe_note_iv = self.iv();
        let password = seal(&entry_key, password_iv, password.as_bytes());
        let safe_note = seal(&entry_key, safe_note_iv, safe_note.as_bytes());

        self.entries.insert(
            id.to_string(),
            json!({
                "title": title,
                "username": username,
                "nonce": hex::encode(nonce.as_slice()),
                "note": "",
                "password": { "type": "Buffer", "data": password },
                "safe_note": { "type": "Buffer", "data": safe_note },
                "tags": tags,
            }),
        );
        self
    }

    /// Flips one bit in the stored password of entry `id`.
    pub fn tamper_password(mut self, id: &str) -> Self {
        let data = self.entries[id]["password"]["data"]
            .as_array_mut()
            .unwrap();
        let last = data.len() - 1;
        let flipped = data[last].as_u64().unwrap() ^ 1;
        data[last] = json!(flipped);
        self
    }

    pub fn document(&self) -> String {
        json!({ "version": "0.0.1", "tags": self.tags, "entries": self.entries }).to_string()
    }

    /// Encrypts the document with the vault key and writes it under the
    /// derived file name in `dir`.
    pub fn write_to(&self, dir: &Path) -> PathBuf {
        let keys = vault_keys();
        let blob = seal(keys.encryption_key(), [0xa5; 12], self.document().as_bytes());

        let path = dir.join(keys.filename());
        std::fs::write(&path, blob).unwrap();
        path
    }
}

/// The sample vault used across the integration tests.
pub fn sample_vault() -> VaultBuilder {
    VaultBuilder::new()
        .tag("0", "All")
        .tag("1", "Work")
        .entry(
            "0",
            "https://github.com/login",
            "github.com",
            "octocat",
            "correct horse",
            "recovery codes",
            &[1],
        )
        .entry("1", "Bank", "Bank", "alice", "12345678", "", &[])
        .entry("2", "Mail", "Mail", "mallory", "stolen", "note", &[1])
        .tamper_password("2")
}

/// Vault keys the software device derives for `SEED`.
pub fn vault_keys() -> trezorpass::crypto::DerivedKeys {
    let master = SoftwareOracle::new(SEED)
        .cipher_key_value(&CipherKeyValue::master())
        .unwrap();
    derive_keys(&MasterKey::from_bytes(&master).unwrap())
}

pub fn vault_filename() -> String {
    vault_keys().filename().to_string()
}
