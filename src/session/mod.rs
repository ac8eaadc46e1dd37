//! Device session registry and shell transports.
//!
//! This module owns every live remote shell. A [`SessionManager`] keeps at
//! most one session per device address, serializes all work on the same
//! device behind a per-device lock, and checks liveness before a cached
//! session is handed out.
//!
//! # Main Components
//!
//! - [`Transport`] / [`ShellSession`] - Seam between the registry and the wire
//! - [`SshTransport`] - Interactive SSH shell transport
//! - [`ReplayTransport`] - Offline transport that replays recorded sessions
//! - [`SessionManager`] - Connect, reuse, verify and tear down sessions
//! - [`SessionRecorder`] - JSONL transcript of session events

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_ssh2_tokio::ServerCheckMethod;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use moka::future::Cache;
use regex::Regex;
use russh::Preferred;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::config::{self, NetworkConfig};
use crate::device::{CredentialStore, Credentials, Device, DeviceStatus};
use crate::error::{ConnectError, FailureKind};
use crate::vendor::VendorProfile;

pub use client::{SshShell, SshTransport};
pub use recording::{
    RecordedFailure, ReplaySession, ReplayTransport, SessionEvent, SessionRecordEntry,
    SessionRecordLevel, SessionRecorder,
};
pub use security::{ConnectionSecurityOptions, SecurityLevel};

/// Opens shell sessions to devices.
pub trait Transport: Send + Sync + 'static {
    type Session: ShellSession;

    /// Establishes one authenticated shell. Called once per connect attempt.
    fn open(
        &self,
        target: &ConnectTarget,
    ) -> impl Future<Output = Result<Self::Session, ConnectError>> + Send;
}

/// A live interactive shell on one device.
pub trait ShellSession: Send + 'static {
    /// Sends one command and returns its output without echo or prompt.
    fn send_command(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<String, ConnectError>> + Send;

    /// Sends an empty line and waits for `expect` to show up in the reply.
    fn probe(
        &mut self,
        expect: &Regex,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), ConnectError>> + Send;

    fn close(&mut self) -> impl Future<Output = Result<(), ConnectError>> + Send;

    fn is_closed(&self) -> bool;
}

/// Everything a transport needs to reach and log into one device.
#[derive(Clone)]
pub struct ConnectTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    password: String,
    enable_password: Option<String>,
    known_vendor: bool,
    pub profile: &'static VendorProfile,
    pub timeout: Duration,
    pub security: ConnectionSecurityOptions,
}

impl ConnectTarget {
    pub fn new(
        device: &Device,
        credentials: &Credentials,
        timeout: Duration,
        security: ConnectionSecurityOptions,
    ) -> Self {
        Self {
            host: device.ip_address.clone(),
            port: device.ssh_port,
            username: credentials.username.clone(),
            password: credentials.password.clone(),
            enable_password: credentials.enable_password.clone(),
            known_vendor: device.has_known_vendor(),
            profile: device.profile(),
            timeout,
            security,
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Enable secret to send after login. Withheld unless the device has a
    /// recognised vendor tag; the fallback profile stays in user mode.
    pub fn enable_password(&self) -> Option<&str> {
        self.enable_password
            .as_deref()
            .filter(|_| self.known_vendor)
    }

    /// SHA-256 over the login material, used to detect rotated credentials.
    pub fn fingerprint(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.username.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.password.as_bytes());
        hasher.update([0u8]);
        if let Some(enable) = self.enable_password.as_ref() {
            hasher.update(enable.as_bytes());
        }
        hasher.finalize().into()
    }
}

impl fmt::Debug for ConnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("platform", &self.profile.platform)
            .field("timeout", &self.timeout)
            .field("security", &self.security.level)
            .finish()
    }
}

/// Result of a successful [`SessionManager::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected,
    AlreadyConnected,
}

/// The output of one command execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Output {
    pub success: bool,
    /// Command output on success, the failure text otherwise.
    pub content: String,
}

impl Output {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            success: true,
            content: content.into(),
        }
    }

    pub fn failed(content: impl Into<String>) -> Self {
        Self {
            success: false,
            content: content.into(),
        }
    }
}

/// A cached session plus its bookkeeping.
pub(crate) struct LiveSession<S> {
    shell: S,
    created_at: DateTime<Utc>,
    fingerprint: [u8; 32],
}

/// Exclusive, verified access to one device's session.
///
/// Holding a lease keeps the device lock, so no other task can probe,
/// replace or disconnect the session until the lease is dropped.
pub struct SessionLease<S> {
    _guard: OwnedMutexGuard<()>,
    session: Arc<Mutex<LiveSession<S>>>,
}

impl<S: ShellSession> SessionLease<S> {
    pub async fn send_command(
        &self,
        command: &str,
        timeout: Duration,
    ) -> Result<String, ConnectError> {
        let mut live = self.session.lock().await;
        live.shell.send_command(command, timeout).await
    }

    pub async fn created_at(&self) -> DateTime<Utc> {
        self.session.lock().await.created_at
    }
}

/// Registry of live device sessions.
///
/// Sessions are cached per device address until disconnected, or until the
/// optional idle timeout closes them. Same-device operations are serialized;
/// different devices proceed in parallel.
pub struct SessionManager<T: Transport> {
    transport: T,
    credentials: Arc<dyn CredentialStore>,
    network: NetworkConfig,
    security: ConnectionSecurityOptions,
    liveness: Regex,
    cache: Cache<String, Arc<Mutex<LiveSession<T::Session>>>>,
    locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

mod client;
mod manager;
mod recording;
mod security;
