//! Error types for device sessions, command execution and configuration.
//!
//! Every failure the engine can hit is a [`ConnectError`] variant. The
//! [`ConnectError::kind`] classifier decides how the session layer reacts:
//! timeouts and transport failures are retried while connecting,
//! authentication failures never are, and configuration problems are
//! reported without touching the network.

use std::path::PathBuf;

use thiserror::Error;
use tokio::sync::mpsc::error::SendError;

/// Failure classes used for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Local setup problem (missing credential, unknown workflow, ...).
    Configuration,
    /// The remote end did not answer in time.
    Timeout,
    /// The remote end rejected the credentials.
    Authentication,
    /// Any other transport-level failure.
    Transport,
}

/// Errors that can occur while managing device sessions and running commands.
#[derive(Error, Debug)]
pub enum ConnectError {
    /// The device has no credential reference assigned.
    #[error("no credentials specified for {0}")]
    NoCredential(String),

    /// The credential reference could not be resolved.
    #[error("credentials '{0}' not found")]
    CredentialNotFound(String),

    /// No workflow is configured under this name.
    #[error("Workflow '{0}' not found")]
    WorkflowNotFound(String),

    /// The workflow exists but is switched off.
    #[error("Workflow '{0}' is disabled")]
    WorkflowDisabled(String),

    /// The device has no live session.
    #[error("no active connection to {0}")]
    NotConnected(String),

    /// A prompt or analyzer pattern failed to compile.
    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// TCP/SSH establishment did not finish within the connection timeout.
    #[error("timeout connecting to {0}")]
    ConnectTimeout(String),

    /// The shell never presented its first prompt.
    ///
    /// Carries whatever output arrived before the timeout.
    #[error("timeout waiting for initial prompt: {0}")]
    InitTimeout(String),

    /// Authentication was rejected by the device.
    #[error("authentication failed for {0}")]
    AuthFailed(String),

    /// Command execution timed out.
    ///
    /// The error contains the partial output received before the timeout.
    #[error("exec command timeout: {0}")]
    ExecTimeout(String),

    /// The device could not be reached for a reason other than a timeout.
    #[error("transport failure: {0}")]
    TransportFailed(String),

    /// The transport reported a failed command.
    #[error("command failed: {0}")]
    ExecFailed(String),

    /// The SSH channel was disconnected while waiting for a prompt.
    #[error("channel disconnect on wait prompt")]
    ChannelDisconnectError,

    /// The SSH connection has been closed.
    #[error("connect closed")]
    ConnectClosedError,

    /// No recorded output matches the requested replay step.
    #[error("replay mismatch: {0}")]
    ReplayMismatchError(String),

    /// Session recording could not be read or written.
    #[error("recording error: {0}")]
    RecordError(String),

    /// An error occurred in the async-ssh2-tokio library.
    #[error("async ssh2 error: {0}")]
    Ssh2Error(#[from] async_ssh2_tokio::Error),

    /// An error occurred in the russh library.
    #[error("russh error: {0}")]
    RusshError(#[from] russh::Error),

    /// Failed to send data through the shell channel.
    #[error("Failed to send data: {0}")]
    SendDataError(#[from] SendError<String>),
}

impl ConnectError {
    /// Classifies the error for retry decisions.
    pub fn kind(&self) -> FailureKind {
        match self {
            ConnectError::NoCredential(_)
            | ConnectError::CredentialNotFound(_)
            | ConnectError::WorkflowNotFound(_)
            | ConnectError::WorkflowDisabled(_)
            | ConnectError::NotConnected(_)
            | ConnectError::InvalidPattern(_) => FailureKind::Configuration,
            ConnectError::ConnectTimeout(_)
            | ConnectError::InitTimeout(_)
            | ConnectError::ExecTimeout(_) => FailureKind::Timeout,
            ConnectError::AuthFailed(_) => FailureKind::Authentication,
            ConnectError::Ssh2Error(err) => match err {
                async_ssh2_tokio::Error::PasswordWrong | async_ssh2_tokio::Error::KeyAuthFailed => {
                    FailureKind::Authentication
                }
                _ => FailureKind::Transport,
            },
            _ => FailureKind::Transport,
        }
    }

    /// Shorthand for `kind() == FailureKind::Authentication`.
    pub fn is_auth(&self) -> bool {
        self.kind() == FailureKind::Authentication
    }

    /// Shorthand for `kind() == FailureKind::Timeout`.
    pub fn is_timeout(&self) -> bool {
        self.kind() == FailureKind::Timeout
    }
}

/// Errors raised while loading engine configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
}
