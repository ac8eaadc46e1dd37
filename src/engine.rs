//! Facade tying sessions, command execution and workflows together.

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};

use crate::batch::run_bounded;
use crate::config::EngineConfig;
use crate::device::{CredentialStore, Device};
use crate::diagnostics::{DiagnosticEngine, DiagnosticResult};
use crate::error::ConnectError;
use crate::executor::CommandExecutor;
use crate::session::{ConnectionSecurityOptions, Output, SessionManager, SshTransport, Transport};
use crate::vendor::ConfigKind;

/// Device health-check engine.
///
/// Every operation reports failures as values: `false`, a failed
/// [`Output`] or a failed [`DiagnosticResult`].
pub struct Engine<T: Transport> {
    sessions: Arc<SessionManager<T>>,
    executor: CommandExecutor<T>,
    diagnostics: DiagnosticEngine<T>,
    pool_size: usize,
}

impl Engine<SshTransport> {
    /// Engine over real SSH sessions.
    pub fn ssh(
        config: EngineConfig,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<Self, ConnectError> {
        Self::new(SshTransport::new(), credentials, config)
    }
}

impl<T: Transport> Engine<T> {
    pub fn new(
        transport: T,
        credentials: Arc<dyn CredentialStore>,
        config: EngineConfig,
    ) -> Result<Self, ConnectError> {
        let EngineConfig {
            network,
            diagnostics,
        } = config;
        let pool_size = network.max_concurrent_connections.max(1);
        let sessions = Arc::new(SessionManager::new(transport, credentials, network)?);
        Ok(Self::from_sessions(sessions, diagnostics, pool_size))
    }

    /// Engine with an explicit SSH security profile instead of the configured level.
    pub fn with_security(
        transport: T,
        credentials: Arc<dyn CredentialStore>,
        config: EngineConfig,
        security: ConnectionSecurityOptions,
    ) -> Result<Self, ConnectError> {
        let EngineConfig {
            network,
            diagnostics,
        } = config;
        let pool_size = network.max_concurrent_connections.max(1);
        let sessions =
            Arc::new(SessionManager::new(transport, credentials, network)?.with_security(security));
        Ok(Self::from_sessions(sessions, diagnostics, pool_size))
    }

    fn from_sessions(
        sessions: Arc<SessionManager<T>>,
        diagnostics: crate::config::DiagnosticsConfig,
        pool_size: usize,
    ) -> Self {
        let executor = CommandExecutor::new(sessions.clone());
        let diagnostics = DiagnosticEngine::new(executor.clone(), diagnostics);
        Self {
            sessions,
            executor,
            diagnostics,
            pool_size,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionManager<T>> {
        &self.sessions
    }

    /// Connects to a device. Failures are logged and reported as `false`.
    pub async fn connect(&self, device: &mut Device) -> bool {
        match self.sessions.connect(device).await {
            Ok(_) => true,
            Err(err) => {
                warn!("Connect to {} failed: {}", device.ip_address, err);
                false
            }
        }
    }

    pub async fn disconnect(&self, device: &mut Device) -> bool {
        self.sessions.disconnect(device).await
    }

    pub async fn disconnect_all(&self) {
        self.sessions.disconnect_all().await;
    }

    pub fn is_connected(&self, device: &Device) -> bool {
        self.sessions.is_connected(device)
    }

    pub async fn active_connection_count(&self) -> usize {
        self.sessions.active_connection_count().await
    }

    pub async fn execute_command(
        &self,
        device: &Device,
        command: &str,
        timeout: Option<Duration>,
    ) -> Output {
        self.executor.execute_command(device, command, timeout).await
    }

    pub async fn execute_commands(
        &self,
        device: &Device,
        commands: &[String],
        timeout: Option<Duration>,
    ) -> Vec<(String, Output)> {
        self.executor
            .execute_commands(device, commands, timeout)
            .await
    }

    pub async fn retrieve_config(&self, device: &Device, kind: ConfigKind) -> Output {
        self.executor.retrieve_config(device, kind).await
    }

    pub async fn run_workflow(&self, device: &Device, workflow_name: &str) -> DiagnosticResult {
        self.diagnostics.run_workflow(device, workflow_name).await
    }

    pub async fn run_multiple_workflows(
        &self,
        device: &Device,
        workflow_names: &[String],
    ) -> Vec<DiagnosticResult> {
        self.diagnostics
            .run_multiple_workflows(device, workflow_names)
            .await
    }

    pub fn available_workflows(&self) -> Vec<String> {
        self.diagnostics.available_workflows()
    }

    /// Connects to many devices in parallel.
    ///
    /// `pool_size` defaults to `network.max_concurrent_connections`.
    /// `on_progress(completed, total, connected)` fires per device as it finishes.
    pub async fn connect_all<P>(
        &self,
        devices: &mut [Device],
        pool_size: Option<usize>,
        on_progress: P,
    ) -> Vec<bool>
    where
        P: FnMut(usize, usize, &bool),
    {
        let pool_size = pool_size.unwrap_or(self.pool_size);
        let results = run_bounded(
            devices.iter_mut(),
            pool_size,
            |device| self.connect(device),
            on_progress,
        )
        .await;
        info!(
            "Connected to {} of {} device(s)",
            results.iter().filter(|ok| **ok).count(),
            results.len()
        );
        results
    }

    /// Runs one workflow on many devices in parallel.
    pub async fn diagnose_all<P>(
        &self,
        devices: &[Device],
        workflow_name: &str,
        pool_size: Option<usize>,
        on_progress: P,
    ) -> Vec<DiagnosticResult>
    where
        P: FnMut(usize, usize, &DiagnosticResult),
    {
        let pool_size = pool_size.unwrap_or(self.pool_size);
        run_bounded(
            devices.iter(),
            pool_size,
            |device| self.run_workflow(device, workflow_name),
            on_progress,
        )
        .await
    }
}
