//! Boundary to the hardware device.
//!
//! The device is only ever asked one thing: encrypt or decrypt a value with a
//! key derived from a fixed path and a label (`CipherKeyValue`). Everything
//! else on the wire is the device asking the host for a PIN, a passphrase or
//! a button confirmation before it answers.

pub mod command;
pub mod emulator;

pub use command::CommandOracle;
pub use emulator::SoftwareOracle;

use thiserror::Error;
use zeroize::Zeroizing;

/// Hardened index 10016, then 0. Every request of the password manager uses it.
pub const MANAGER_PATH: [u32; 2] = [0x8000_2720, 0];

/// Label shown on the device when the master key is requested.
pub const MASTER_KEY_LABEL: &str = "Activate TREZOR Password Manager?";

/// Value encrypted by the device to produce the master key; the same 32
/// bytes twice.
pub const MASTER_KEY_VALUE: [u8; 64] = [
    0x2d, 0x65, 0x05, 0x51, 0x24, 0x8d, 0x79, 0x2e,
    0xab, 0xf6, 0x28, 0xf4, 0x51, 0x20, 0x0d, 0x7f,
    0x51, 0xcb, 0x63, 0xe4, 0x6a, 0xad, 0xcb, 0xb1,
    0x03, 0x8a, 0xac, 0xb0, 0x5e, 0x8c, 0x8a, 0xee,
    0x2d, 0x65, 0x05, 0x51, 0x24, 0x8d, 0x79, 0x2e,
    0xab, 0xf6, 0x28, 0xf4, 0x51, 0x20, 0x0d, 0x7f,
    0x51, 0xcb, 0x63, 0xe4, 0x6a, 0xad, 0xcb, 0xb1,
    0x03, 0x8a, 0xac, 0xb0, 0x5e, 0x8c, 0x8a, 0xee,
];

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("device disconnected")]
    Disconnected,

    #[error("device reported failure: {0}")]
    Failure(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl OracleError {
    /// Whether the device is still usable after this error.
    ///
    /// A failure reported by the device itself (declined confirmation, wrong
    /// PIN) leaves the session open; anything else means the channel is gone.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, OracleError::Failure(_))
    }
}

/// What the device tells about itself when a session starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFeatures {
    pub label: String,
    pub bootloader: bool,
}

/// One `CipherKeyValue` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherKeyValue {
    pub path: Vec<u32>,
    pub key: String,
    pub value: Vec<u8>,
    pub encrypt: bool,
    pub ask_on_encrypt: bool,
    pub ask_on_decrypt: bool,
}

impl CipherKeyValue {
    /// Request answered with the master secret.
    pub fn master() -> Self {
        Self {
            path: MANAGER_PATH.to_vec(),
            key: MASTER_KEY_LABEL.to_string(),
            value: MASTER_KEY_VALUE.to_vec(),
            encrypt: true,
            ask_on_encrypt: true,
            ask_on_decrypt: true,
        }
    }

    /// Request decrypting an entry's stored nonce into its entry key.
    pub fn unlock_entry(label: &str, username: &str, encrypted_nonce: Vec<u8>) -> Self {
        Self {
            path: MANAGER_PATH.to_vec(),
            key: format!("Unlock {label} for user {username}?"),
            value: encrypted_nonce,
            encrypt: false,
            ask_on_encrypt: false,
            ask_on_decrypt: true,
        }
    }

    /// Whether the device wants a button press before answering.
    pub fn asks_confirmation(&self) -> bool {
        if self.encrypt {
            self.ask_on_encrypt
        } else {
            self.ask_on_decrypt
        }
    }
}

/// User interaction the device is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interaction {
    Pin,
    Passphrase,
    Button,
}

/// Messages the host sends to the device.
pub enum OracleRequest {
    CipherKeyValue(CipherKeyValue),
    Pin(Zeroizing<String>),
    Passphrase(Zeroizing<String>),
    ButtonAck,
}

/// Device answer to an [`OracleRequest`].
pub enum OracleReply {
    Value(Zeroizing<Vec<u8>>),
    Interaction(Interaction),
}

/// A hardware device, or anything that answers like one.
///
/// Exchanges are strictly one at a time: every `send` gets exactly one reply
/// before the next request goes out.
#[allow(async_fn_in_trait)]
pub trait Oracle {
    /// Opens the channel and reads the device features.
    async fn connect(&mut self) -> Result<DeviceFeatures, OracleError>;

    /// Sends one request and waits for the device's reply.
    async fn send(&mut self, request: OracleRequest) -> Result<OracleReply, OracleError>;

    /// Drops the channel. Must be idempotent; called from `Drop`.
    fn release(&mut self);
}
