//! Device session: one owned connection to the oracle with an explicit
//! lifecycle.
//!
//! ```text
//! Disconnected -> Connecting -> Ready <-> AwaitingUserInput(Pin | Passphrase | Button)
//!                                 |
//!                                 v
//!                               Closed
//! ```
//!
//! The oracle is released on `close()` and, failing that, when the session is
//! dropped.

use crate::crypto::MasterKey;
use crate::error::VaultError;
use crate::oracle::{
    CipherKeyValue, DeviceFeatures, Interaction, Oracle, OracleError, OracleReply, OracleRequest,
};
use std::io;
use std::time::Duration;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

/// Default time to wait for one answer of the device.
pub const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    AwaitingUserInput(Interaction),
    Ready,
    Closed,
}

/// Source of the answers the device asks the user for.
pub trait Prompter {
    fn pin(&mut self) -> io::Result<Zeroizing<String>>;

    fn passphrase(&mut self) -> io::Result<Zeroizing<String>>;

    /// Tells the user to confirm on the device. Nothing is read back.
    fn button(&mut self, device_label: &str);
}

pub struct DeviceSession<O: Oracle> {
    oracle: O,
    prompter: Box<dyn Prompter>,
    state: SessionState,
    features: Option<DeviceFeatures>,
    timeout: Option<Duration>,
}

impl<O: Oracle> DeviceSession<O> {
    /// Creates a disconnected session. `timeout` bounds every single exchange
    /// with the device; `None` waits forever.
    pub fn new(oracle: O, prompter: Box<dyn Prompter>, timeout: Option<Duration>) -> Self {
        Self {
            oracle,
            prompter,
            state: SessionState::Disconnected,
            features: None,
            timeout,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn device_label(&self) -> &str {
        self.features
            .as_ref()
            .map_or("device", |features| features.label.as_str())
    }

    /// Connects to the device and waits until it is ready for requests.
    ///
    /// # Errors
    ///
    /// [`VaultError::OracleUnavailable`] if the device cannot be reached, does
    /// not answer in time or is in bootloader mode.
    pub async fn open(&mut self) -> Result<&DeviceFeatures, VaultError> {
        match self.state {
            SessionState::Disconnected => {}
            SessionState::Closed => return Err(closed()),
            _ => {
                return self
                    .features
                    .as_ref()
                    .ok_or_else(|| unavailable("device features unknown"));
            }
        }

        self.state = SessionState::Connecting;
        let connected = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.oracle.connect())
                .await
                .unwrap_or_else(|_| {
                    Err(OracleError::Io(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "no device connected",
                    )))
                }),
            None => self.oracle.connect().await,
        };

        let features = match connected {
            Ok(features) => features,
            Err(err) => {
                warn!(error = %err, "device connection failed");
                self.abort();
                return Err(unavailable(err));
            }
        };

        if features.bootloader {
            self.abort();
            return Err(unavailable(format!(
                "device {} is in bootloader mode, reconnect it",
                features.label
            )));
        }

        info!(label = %features.label, "connected device");
        self.state = SessionState::Ready;
        Ok(&*self.features.insert(features))
    }

    /// Runs one `CipherKeyValue` request to completion, answering every PIN,
    /// passphrase or button request on the way.
    ///
    /// # Errors
    ///
    /// [`VaultError::OracleUnavailable`] if the session is not ready, the user
    /// declines, a prompt fails, or the device stops answering. Only a
    /// failure reported by the device itself keeps the session usable.
    pub async fn cipher_key_value(
        &mut self,
        request: CipherKeyValue,
    ) -> Result<Zeroizing<Vec<u8>>, VaultError> {
        match self.state {
            SessionState::Ready => {}
            SessionState::Closed => return Err(closed()),
            _ => return Err(unavailable("device is not ready")),
        }

        debug!(label = %request.key, encrypt = request.encrypt, "cipher key value");
        let mut reply = self
            .exchange(OracleRequest::CipherKeyValue(request))
            .await?;

        loop {
            let interaction = match reply {
                OracleReply::Value(value) => {
                    self.state = SessionState::Ready;
                    return Ok(value);
                }
                OracleReply::Interaction(interaction) => interaction,
            };

            self.state = SessionState::AwaitingUserInput(interaction);
            let answer = match interaction {
                Interaction::Pin => self.prompter.pin().map(OracleRequest::Pin),
                Interaction::Passphrase => {
                    self.prompter.passphrase().map(OracleRequest::Passphrase)
                }
                Interaction::Button => {
                    let label = self.device_label().to_string();
                    self.prompter.button(&label);
                    Ok(OracleRequest::ButtonAck)
                }
            };

            let answer = match answer {
                Ok(answer) => answer,
                Err(err) => {
                    warn!(?interaction, error = %err, "prompt failed");
                    self.abort();
                    return Err(unavailable(format!(
                        "{interaction:?} entry aborted: {err}"
                    )));
                }
            };
            reply = self.exchange(answer).await?;
        }
    }

    /// Asks the device for the master secret of the password manager.
    pub async fn master_key(&mut self) -> Result<MasterKey, VaultError> {
        let secret = self.cipher_key_value(CipherKeyValue::master()).await?;
        MasterKey::from_bytes(&secret)
            .map_err(|e| unavailable(format!("unexpected master key answer: {e}")))
    }

    /// Releases the device. The session cannot be used afterwards.
    pub fn close(&mut self) {
        if self.state != SessionState::Closed {
            self.oracle.release();
            self.state = SessionState::Closed;
            debug!("device session closed");
        }
    }

    async fn exchange(&mut self, request: OracleRequest) -> Result<OracleReply, VaultError> {
        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.oracle.send(request)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(seconds = limit.as_secs(), "device did not answer in time");
                    self.abort();
                    return Err(unavailable(format!(
                        "no answer from device within {}s",
                        limit.as_secs()
                    )));
                }
            },
            None => self.oracle.send(request).await,
        };

        result.map_err(|err| {
            if err.is_recoverable() {
                self.state = SessionState::Ready;
            } else {
                self.abort();
            }
            unavailable(err)
        })
    }

    fn abort(&mut self) {
        self.oracle.release();
        self.state = SessionState::Closed;
    }
}

impl<O: Oracle> Drop for DeviceSession<O> {
    fn drop(&mut self) {
        self.close();
    }
}

fn unavailable(reason: impl ToString) -> VaultError {
    VaultError::OracleUnavailable(reason.to_string())
}

fn closed() -> VaultError {
    unavailable("device session is closed")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::oracle::SoftwareOracle;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    /// Prompter answering from fixed values and counting button prompts.
    #[derive(Default, Clone)]
    pub(crate) struct ScriptedPrompter {
        pub pin: Option<String>,
        pub buttons: Rc<RefCell<usize>>,
    }

    impl Prompter for ScriptedPrompter {
        fn pin(&mut self) -> io::Result<Zeroizing<String>> {
            self.pin
                .clone()
                .map(Zeroizing::new)
                .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "no PIN"))
        }

        fn passphrase(&mut self) -> io::Result<Zeroizing<String>> {
            Ok(Zeroizing::new(String::new()))
        }

        fn button(&mut self, _device_label: &str) {
            *self.buttons.borrow_mut() += 1;
        }
    }

    /// Wraps an oracle and counts how often it is released.
    pub(crate) struct CountingOracle<O> {
        inner: O,
        releases: Rc<Cell<usize>>,
    }

    impl<O: Oracle> CountingOracle<O> {
        pub(crate) fn new(inner: O) -> (Self, Rc<Cell<usize>>) {
            let releases = Rc::new(Cell::new(0));
            let oracle = Self {
                inner,
                releases: releases.clone(),
            };
            (oracle, releases)
        }
    }

    impl<O: Oracle> Oracle for CountingOracle<O> {
        async fn connect(&mut self) -> Result<DeviceFeatures, OracleError> {
            self.inner.connect().await
        }

        async fn send(&mut self, request: OracleRequest) -> Result<OracleReply, OracleError> {
            self.inner.send(request).await
        }

        fn release(&mut self) {
            self.releases.set(self.releases.get() + 1);
            self.inner.release();
        }
    }

    struct HangingOracle;

    impl Oracle for HangingOracle {
        async fn connect(&mut self) -> Result<DeviceFeatures, OracleError> {
            Ok(DeviceFeatures {
                label: "hanging".into(),
                bootloader: false,
            })
        }

        async fn send(&mut self, _request: OracleRequest) -> Result<OracleReply, OracleError> {
            std::future::pending().await
        }

        fn release(&mut self) {}
    }

    struct BootloaderOracle;

    impl Oracle for BootloaderOracle {
        async fn connect(&mut self) -> Result<DeviceFeatures, OracleError> {
            Ok(DeviceFeatures {
                label: "stuck".into(),
                bootloader: true,
            })
        }

        async fn send(&mut self, _request: OracleRequest) -> Result<OracleReply, OracleError> {
            Err(OracleError::Disconnected)
        }

        fn release(&mut self) {}
    }

    fn session(
        oracle: SoftwareOracle,
        prompter: ScriptedPrompter,
    ) -> DeviceSession<SoftwareOracle> {
        DeviceSession::new(oracle, Box::new(prompter), Some(Duration::from_secs(5)))
    }

    #[tokio::test]
    async fn open_moves_to_ready() {
        let mut s = session(SoftwareOracle::new(b"seed"), ScriptedPrompter::default());
        assert_eq!(s.state(), SessionState::Disconnected);

        let features = s.open().await.unwrap();
        assert_eq!(features.label, "emulator");
        assert_eq!(s.state(), SessionState::Ready);
        assert_eq!(s.device_label(), "emulator");
    }

    #[tokio::test]
    async fn master_key_goes_through_pin_and_button() {
        let prompter = ScriptedPrompter {
            pin: Some("1234".into()),
            ..Default::default()
        };
        let buttons = prompter.buttons.clone();
        let mut s = session(SoftwareOracle::new(b"seed").with_pin("1234"), prompter);
        s.open().await.unwrap();

        let master = s.master_key().await.unwrap();
        assert_eq!(master.len(), 64);
        assert_eq!(*buttons.borrow(), 1);
        assert_eq!(s.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn master_key_matches_direct_emulator_answer() {
        let expected = SoftwareOracle::new(b"seed")
            .cipher_key_value(&CipherKeyValue::master())
            .unwrap();

        let mut s = session(SoftwareOracle::new(b"seed"), ScriptedPrompter::default());
        s.open().await.unwrap();
        let master = s.master_key().await.unwrap();

        assert_eq!(master.to_hex().as_str(), hex::encode(expected.as_slice()));
    }

    #[tokio::test]
    async fn wrong_pin_keeps_session_usable() {
        let prompter = ScriptedPrompter {
            pin: Some("0000".into()),
            ..Default::default()
        };
        let mut s = session(SoftwareOracle::new(b"seed").with_pin("1234"), prompter);
        s.open().await.unwrap();

        assert!(matches!(
            s.master_key().await,
            Err(VaultError::OracleUnavailable(_))
        ));
        assert_eq!(s.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn aborted_pin_prompt_closes_session() {
        let mut s = session(
            SoftwareOracle::new(b"seed").with_pin("1234"),
            ScriptedPrompter::default(),
        );
        s.open().await.unwrap();

        assert!(s.master_key().await.is_err());
        assert_eq!(s.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn requests_before_open_fail() {
        let mut s = session(SoftwareOracle::new(b"seed"), ScriptedPrompter::default());
        assert!(matches!(
            s.master_key().await,
            Err(VaultError::OracleUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn closed_session_rejects_requests() {
        let mut s = session(SoftwareOracle::new(b"seed"), ScriptedPrompter::default());
        s.open().await.unwrap();
        s.close();

        assert_eq!(s.state(), SessionState::Closed);
        assert!(s.master_key().await.is_err());
        assert!(s.open().await.is_err());
    }

    #[tokio::test]
    async fn bootloader_device_is_unavailable() {
        let mut s = DeviceSession::new(
            BootloaderOracle,
            Box::new(ScriptedPrompter::default()),
            None,
        );
        assert!(matches!(
            s.open().await,
            Err(VaultError::OracleUnavailable(msg)) if msg.contains("bootloader")
        ));
        assert_eq!(s.state(), SessionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_device_times_out() {
        let mut s = DeviceSession::new(
            HangingOracle,
            Box::new(ScriptedPrompter::default()),
            Some(Duration::from_secs(30)),
        );
        s.open().await.unwrap();

        match s.master_key().await {
            Err(VaultError::OracleUnavailable(msg)) => assert!(msg.contains("30s")),
            other => panic!("expected timeout, got: {:?}", other.err()),
        }
        assert_eq!(s.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn dropping_an_open_session_releases_once() {
        let (oracle, releases) = CountingOracle::new(SoftwareOracle::new(b"seed"));
        let mut s = DeviceSession::new(oracle, Box::new(ScriptedPrompter::default()), None);
        s.open().await.unwrap();
        assert_eq!(releases.get(), 0);

        drop(s);
        assert_eq!(releases.get(), 1);
    }

    #[tokio::test]
    async fn close_then_drop_releases_once() {
        let (oracle, releases) = CountingOracle::new(SoftwareOracle::new(b"seed"));
        let mut s = DeviceSession::new(oracle, Box::new(ScriptedPrompter::default()), None);
        s.open().await.unwrap();

        s.close();
        s.close();
        drop(s);
        assert_eq!(releases.get(), 1);
    }

    #[tokio::test]
    async fn bootloader_device_is_released_once() {
        let (oracle, releases) = CountingOracle::new(BootloaderOracle);
        let mut s = DeviceSession::new(oracle, Box::new(ScriptedPrompter::default()), None);
        assert!(s.open().await.is_err());

        drop(s);
        assert_eq!(releases.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_device_is_released_once() {
        let (oracle, releases) = CountingOracle::new(HangingOracle);
        let mut s = DeviceSession::new(
            oracle,
            Box::new(ScriptedPrompter::default()),
            Some(Duration::from_secs(30)),
        );
        s.open().await.unwrap();

        assert!(s.master_key().await.is_err());
        assert_eq!(releases.get(), 1);

        drop(s);
        assert_eq!(releases.get(), 1);
    }
}
