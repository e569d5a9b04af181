//! The decrypted vault document.
//!
//! ```text
//! {
//!   "tags":    { "<id>": { "title": "...", "icon": "..." }, ... },
//!   "entries": { "<id>": { "title": "...", "username": "...", "nonce": "<hex>",
//!                          "password": { "data": ... }, "safe_note": { "data": ... },
//!                          "note": "...", "tags": [<tag id>, ...] }, ... }
//! }
//! ```
//!
//! Entry fields are not checked when the document is parsed. A display field
//! of the wrong type reads as absent, and a missing or malformed `nonce`,
//! `password` or `safe_note` is only reported once that entry is opened, so
//! one broken entry never hides the rest of the vault.

use crate::error::VaultError;
use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::warn;

#[derive(Deserialize)]
struct Document {
    entries: HashMap<String, Value>,
    #[serde(default, deserialize_with = "lenient_map")]
    tags: HashMap<String, Tag>,
}

/// Parsed vault: entries in display order plus the tag table.
#[derive(Debug, Default)]
pub struct Vault {
    entries: Vec<Entry>,
    tags: HashMap<String, Tag>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Tag {
    #[serde(default, deserialize_with = "lenient")]
    title: Option<String>,
}

impl Tag {
    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or_default()
    }
}

/// One entry as stored. Display fields of the wrong type read as absent;
/// the encrypted fields are kept raw and only checked when the entry is
/// opened.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct Entry {
    #[serde(skip)]
    id: String,
    #[serde(default, deserialize_with = "lenient")]
    item: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    title: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    username: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    note: Option<String>,
    #[serde(default)]
    nonce: Option<Value>,
    #[serde(default)]
    password: Option<Value>,
    #[serde(default)]
    safe_note: Option<Value>,
    #[serde(default, deserialize_with = "lenient_list")]
    tags: Vec<TagRef>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
enum TagRef {
    Index(u64),
    Name(String),
}

impl TagRef {
    fn key(&self) -> String {
        match self {
            TagRef::Index(i) => i.to_string(),
            TagRef::Name(name) => name.clone(),
        }
    }
}

/// `T` if the value has the expected shape, `None` otherwise.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Elements of an array that have the expected shape; anything else is empty.
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

fn lenient_map<'de, D, T>(deserializer: D) -> Result<HashMap<String, T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Object(items) => items
            .into_iter()
            .filter_map(|(id, item)| Some((id, serde_json::from_value(item).ok()?)))
            .collect(),
        _ => HashMap::new(),
    })
}

impl Vault {
    /// Parses the decrypted vault text.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Parse`] if the text is not a JSON object with an
    /// `entries` map.
    pub fn parse(plaintext: &str) -> Result<Self, VaultError> {
        let document: Document = serde_json::from_str(plaintext)
            .map_err(|e| VaultError::Parse(format!("vault document: {e}")))?;

        let mut entries: Vec<Entry> = document
            .entries
            .into_iter()
            .map(|(id, value)| {
                let mut entry = serde_json::from_value::<Entry>(value).unwrap_or_else(|e| {
                    warn!(id = %id, error = %e, "entry is not an object");
                    Entry::default()
                });
                entry.id = id;
                entry
            })
            .collect();
        entries.sort_by(|a, b| compare_ids(&a.id, &b.id));

        Ok(Self {
            entries,
            tags: document.tags,
        })
    }

    /// Entries in display order: numeric ids ascending, then other ids.
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    pub fn get(&self, id: &str) -> Option<&Entry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Titles of the tags attached to `entry`; unknown tag ids are skipped.
    pub fn tag_titles(&self, entry: &Entry) -> Vec<&str> {
        entry
            .tags
            .iter()
            .filter_map(|tag| self.tags.get(&tag.key()))
            .map(Tag::title)
            .collect()
    }

    /// Entries carrying a tag titled `title` (case-insensitive).
    pub fn entries_tagged<'a>(&'a self, title: &'a str) -> impl Iterator<Item = &'a Entry> {
        self.entries.iter().filter(move |entry| {
            self.tag_titles(entry)
                .iter()
                .any(|t| t.eq_ignore_ascii_case(title))
        })
    }
}

impl Entry {
    /// Key of the entry in the `entries` map.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn item(&self) -> Option<&str> {
        self.item.as_deref()
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn username(&self) -> &str {
        self.username.as_deref().unwrap_or_default()
    }

    /// Free-text name the user gave the entry.
    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    /// Device-encrypted entry key, hex-decoded.
    pub fn encrypted_nonce(&self) -> Result<Vec<u8>, VaultError> {
        match &self.nonce {
            Some(Value::String(nonce)) => hex::decode(nonce)
                .map_err(|e| VaultError::Parse(format!("entry '{}' nonce: {e}", self.id))),
            Some(Value::Null) | None => Err(VaultError::missing_field(&self.id, "nonce")),
            Some(_) => Err(self.wrong_type("nonce", "a hex string")),
        }
    }

    /// Encrypted password blob.
    pub fn password_blob(&self) -> Result<Vec<u8>, VaultError> {
        self.field_blob(self.password.as_ref(), "password")
    }

    /// Encrypted safe note blob.
    pub fn safe_note_blob(&self) -> Result<Vec<u8>, VaultError> {
        self.field_blob(self.safe_note.as_ref(), "safe_note")
    }

    /// Reads `{ "data": ... }`. Node buffers are serialized as byte arrays;
    /// hex strings are accepted as well.
    fn field_blob(&self, field: Option<&Value>, name: &str) -> Result<Vec<u8>, VaultError> {
        let data = field
            .and_then(|f| f.get("data"))
            .filter(|data| !data.is_null())
            .ok_or_else(|| VaultError::missing_field(&self.id, name))?;

        match data {
            Value::String(hex) => hex::decode(hex)
                .map_err(|e| VaultError::Parse(format!("entry '{}' {name}: {e}", self.id))),
            Value::Array(items) => items
                .iter()
                .map(|item| item.as_u64().and_then(|byte| u8::try_from(byte).ok()))
                .collect::<Option<Vec<u8>>>()
                .ok_or_else(|| self.wrong_type(name, "bytes 0-255")),
            _ => Err(self.wrong_type(name, "a byte array or hex string")),
        }
    }

    fn wrong_type(&self, field: &str, expected: &str) -> VaultError {
        VaultError::Parse(format!(
            "entry '{}' field '{field}' is not {expected}",
            self.id
        ))
    }
}

fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}
