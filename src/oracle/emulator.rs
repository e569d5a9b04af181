//! In-process stand-in for the device.
//!
//! Answers `CipherKeyValue` deterministically from a seed so vaults can be
//! produced and read back without hardware. The key depends on the path, the
//! label and both ask flags but not on the direction, and the cipher is its
//! own inverse, so encrypting then decrypting with the same request returns
//! the original value. Not a security device.

use super::{
    CipherKeyValue, DeviceFeatures, Interaction, Oracle, OracleError, OracleReply, OracleRequest,
};
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

/// Device label reported on connect.
const LABEL: &str = "emulator";

/// Values must be whole AES blocks, as on the device.
const BLOCK_LEN: usize = 16;

enum Pending {
    Pin(CipherKeyValue),
    Button(CipherKeyValue),
}

pub struct SoftwareOracle {
    seed: Zeroizing<Vec<u8>>,
    pin: Option<Zeroizing<String>>,
    unlocked: bool,
    connected: bool,
    pending: Option<Pending>,
}

impl SoftwareOracle {
    pub fn new(seed: &[u8]) -> Self {
        Self {
            seed: Zeroizing::new(seed.to_vec()),
            pin: None,
            unlocked: true,
            connected: false,
            pending: None,
        }
    }

    /// Require `pin` before the first request is answered.
    pub fn with_pin(mut self, pin: &str) -> Self {
        self.pin = Some(Zeroizing::new(pin.to_string()));
        self.unlocked = false;
        self
    }

    /// Computes the answer to `request` without any user interaction.
    pub fn cipher_key_value(
        &self,
        request: &CipherKeyValue,
    ) -> Result<Zeroizing<Vec<u8>>, OracleError> {
        if request.value.is_empty() || request.value.len() % BLOCK_LEN != 0 {
            return Err(OracleError::Failure(
                "Value length must be a multiple of 16".to_string(),
            ));
        }

        let mut mac =
            HmacSha512::new_from_slice(&self.seed).expect("HMAC can take key of any size");
        for index in &request.path {
            mac.update(&index.to_be_bytes());
        }
        mac.update(request.key.as_bytes());
        mac.update(if request.ask_on_encrypt { b"E1" } else { b"E0" });
        mac.update(if request.ask_on_decrypt { b"D1" } else { b"D0" });
        let node_key = Zeroizing::new(mac.finalize().into_bytes().to_vec());

        let mut output = Zeroizing::new(request.value.clone());
        for (counter, block) in output.chunks_mut(32).enumerate() {
            let mut pad =
                HmacSha256::new_from_slice(&node_key).expect("HMAC can take key of any size");
            pad.update(&(counter as u64).to_be_bytes());
            let pad = pad.finalize().into_bytes();
            for (byte, key) in block.iter_mut().zip(pad.iter()) {
                *byte ^= key;
            }
        }

        Ok(output)
    }

    fn proceed(&mut self, request: CipherKeyValue) -> Result<OracleReply, OracleError> {
        if !self.unlocked {
            self.pending = Some(Pending::Pin(request));
            return Ok(OracleReply::Interaction(Interaction::Pin));
        }
        if request.asks_confirmation() {
            self.pending = Some(Pending::Button(request));
            return Ok(OracleReply::Interaction(Interaction::Button));
        }
        self.cipher_key_value(&request).map(OracleReply::Value)
    }
}

impl Oracle for SoftwareOracle {
    async fn connect(&mut self) -> Result<DeviceFeatures, OracleError> {
        self.connected = true;
        self.pending = None;
        Ok(DeviceFeatures {
            label: LABEL.to_string(),
            bootloader: false,
        })
    }

    async fn send(&mut self, request: OracleRequest) -> Result<OracleReply, OracleError> {
        if !self.connected {
            return Err(OracleError::Disconnected);
        }

        match (request, self.pending.take()) {
            (OracleRequest::CipherKeyValue(request), _) => self.proceed(request),
            (OracleRequest::Pin(pin), Some(Pending::Pin(request))) => {
                let expected = self.pin.as_ref().map(|p| p.as_str());
                if expected == Some(pin.as_str()) {
                    self.unlocked = true;
                    self.proceed(request)
                } else {
                    Err(OracleError::Failure("PIN invalid".to_string()))
                }
            }
            (OracleRequest::ButtonAck, Some(Pending::Button(request))) => {
                self.cipher_key_value(&request).map(OracleReply::Value)
            }
            (OracleRequest::Passphrase(_), _) => Err(OracleError::Protocol(
                "emulator never asks for a passphrase".to_string(),
            )),
            _ => Err(OracleError::Protocol(
                "answer does not match the pending request".to_string(),
            )),
        }
    }

    fn release(&mut self) {
        self.connected = false;
        self.pending = None;
    }
}
