//! Oracle backed by an external helper program.
//!
//! The helper owns the USB transport and speaks newline-delimited JSON on its
//! stdin/stdout. Each message is an object tagged by `type`:
//!
//! ```text
//! helper -> host   {"type":"features","label":"My TREZOR","bootloader":false}
//! host -> helper   {"type":"cipher_key_value","path":[2147493664,0],"key":"...",
//!                   "value":"<hex>","encrypt":true,"ask_on_encrypt":true,"ask_on_decrypt":true}
//! helper -> host   {"type":"button_request","code":"ButtonRequest_Other"}
//! host -> helper   {"type":"button_ack"}
//! helper -> host   {"type":"value","value":"<hex>"}
//! ```
//!
//! `pin_request` / `passphrase_request` are answered with `pin` / `passphrase`
//! messages, and `failure` ends the current request.

use super::{DeviceFeatures, Interaction, Oracle, OracleError, OracleReply, OracleRequest};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::debug;
use zeroize::Zeroizing;

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum HostMessage<'a> {
    CipherKeyValue {
        path: &'a [u32],
        key: &'a str,
        value: String,
        encrypt: bool,
        ask_on_encrypt: bool,
        ask_on_decrypt: bool,
    },
    Pin {
        pin: &'a str,
    },
    Passphrase {
        passphrase: &'a str,
    },
    ButtonAck,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum DeviceMessage {
    Features {
        label: String,
        #[serde(default)]
        bootloader: bool,
    },
    Value {
        value: String,
    },
    PinRequest,
    PassphraseRequest,
    ButtonRequest {
        #[serde(default)]
        code: Option<String>,
    },
    Failure {
        message: String,
    },
}

impl DeviceMessage {
    fn kind(&self) -> &'static str {
        match self {
            DeviceMessage::Features { .. } => "features",
            DeviceMessage::Value { .. } => "value",
            DeviceMessage::PinRequest => "pin_request",
            DeviceMessage::PassphraseRequest => "passphrase_request",
            DeviceMessage::ButtonRequest { .. } => "button_request",
            DeviceMessage::Failure { .. } => "failure",
        }
    }
}

pub struct CommandOracle {
    program: PathBuf,
    args: Vec<String>,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout: Option<Lines<BufReader<ChildStdout>>>,
}

impl CommandOracle {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            child: None,
            stdin: None,
            stdout: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    async fn write_message(&mut self, message: &HostMessage<'_>) -> Result<(), OracleError> {
        let stdin = self.stdin.as_mut().ok_or(OracleError::Disconnected)?;

        let mut line = Zeroizing::new(
            serde_json::to_vec(message).map_err(|e| OracleError::Protocol(e.to_string()))?,
        );
        line.push(b'\n');

        stdin.write_all(&line).await?;
        stdin.flush().await?;
        Ok(())
    }

    async fn read_message(&mut self) -> Result<DeviceMessage, OracleError> {
        let stdout = self.stdout.as_mut().ok_or(OracleError::Disconnected)?;

        let line = Zeroizing::new(
            stdout
                .next_line()
                .await?
                .ok_or(OracleError::Disconnected)?,
        );
        serde_json::from_str(&line)
            .map_err(|e| OracleError::Protocol(format!("unreadable helper message: {e}")))
    }
}

impl Oracle for CommandOracle {
    async fn connect(&mut self) -> Result<DeviceFeatures, OracleError> {
        self.release();

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;
        debug!(program = %self.program.display(), "oracle helper started");

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| OracleError::Protocol("helper stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| OracleError::Protocol("helper stdout unavailable".into()))?;

        self.stdin = Some(stdin);
        self.stdout = Some(BufReader::new(stdout).lines());
        self.child = Some(child);

        match self.read_message().await? {
            DeviceMessage::Features { label, bootloader } => {
                Ok(DeviceFeatures { label, bootloader })
            }
            DeviceMessage::Failure { message } => Err(OracleError::Failure(message)),
            other => Err(OracleError::Protocol(format!(
                "expected features, got {}",
                other.kind()
            ))),
        }
    }

    async fn send(&mut self, request: OracleRequest) -> Result<OracleReply, OracleError> {
        match &request {
            OracleRequest::CipherKeyValue(req) => {
                self.write_message(&HostMessage::CipherKeyValue {
                    path: &req.path,
                    key: &req.key,
                    value: hex::encode(&req.value),
                    encrypt: req.encrypt,
                    ask_on_encrypt: req.ask_on_encrypt,
                    ask_on_decrypt: req.ask_on_decrypt,
                })
                .await?
            }
            OracleRequest::Pin(pin) => {
                self.write_message(&HostMessage::Pin { pin: pin.as_str() })
                    .await?
            }
            OracleRequest::Passphrase(passphrase) => {
                self.write_message(&HostMessage::Passphrase {
                    passphrase: passphrase.as_str(),
                })
                .await?
            }
            OracleRequest::ButtonAck => self.write_message(&HostMessage::ButtonAck).await?,
        }

        match self.read_message().await? {
            DeviceMessage::Value { value } => {
                let value = Zeroizing::new(value);
                let bytes = hex::decode(value.as_str())
                    .map_err(|e| OracleError::Protocol(format!("value is not hex: {e}")))?;
                Ok(OracleReply::Value(Zeroizing::new(bytes)))
            }
            DeviceMessage::PinRequest => Ok(OracleReply::Interaction(Interaction::Pin)),
            DeviceMessage::PassphraseRequest => {
                Ok(OracleReply::Interaction(Interaction::Passphrase))
            }
            DeviceMessage::ButtonRequest { code } => {
                debug!(?code, "device waits for button");
                Ok(OracleReply::Interaction(Interaction::Button))
            }
            DeviceMessage::Failure { message } => Err(OracleError::Failure(message)),
            other => Err(OracleError::Protocol(format!(
                "unexpected {} message",
                other.kind()
            ))),
        }
    }

    fn release(&mut self) {
        self.stdin = None;
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            // the helper may already have exited
            let _ = child.start_kill();
            debug!("oracle helper released");
        }
    }
}
