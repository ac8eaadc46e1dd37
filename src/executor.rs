//! Single-command execution over registered sessions.
//!
//! Failures never escape as errors here: a missing session, a timeout or a
//! transport fault all come back as an [`Output`] with `success == false`
//! and the reason as content. Commands are not retried.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, warn};

use crate::device::Device;
use crate::error::ConnectError;
use crate::session::{Output, SessionManager, Transport};
use crate::vendor::ConfigKind;

/// Content returned when the device has no live session.
pub const NO_ACTIVE_CONNECTION: &str = "No active connection";

/// Runs commands on devices through a [`SessionManager`].
pub struct CommandExecutor<T: Transport> {
    sessions: Arc<SessionManager<T>>,
    default_timeout: Duration,
}

impl<T: Transport> Clone for CommandExecutor<T> {
    fn clone(&self) -> Self {
        Self {
            sessions: self.sessions.clone(),
            default_timeout: self.default_timeout,
        }
    }
}

impl<T: Transport> CommandExecutor<T> {
    pub fn new(sessions: Arc<SessionManager<T>>) -> Self {
        let default_timeout = sessions.network().default_timeout();
        Self {
            sessions,
            default_timeout,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionManager<T>> {
        &self.sessions
    }

    /// Runs one command. `timeout` defaults to the network default timeout.
    pub async fn execute_command(
        &self,
        device: &Device,
        command: &str,
        timeout: Option<Duration>,
    ) -> Output {
        let Some(session) = self.sessions.get_session(device).await else {
            warn!("{}", ConnectError::NotConnected(device.ip_address.clone()));
            return Output::failed(NO_ACTIVE_CONNECTION);
        };

        let timeout = timeout.unwrap_or(self.default_timeout);
        debug!("Executing on {}: {}", device.ip_address, command);
        match session.send_command(command, timeout).await {
            Ok(content) => Output::ok(content),
            Err(err) => {
                error!(
                    "Error executing command on {}: {}",
                    device.ip_address, err
                );
                Output::failed(err.to_string())
            }
        }
    }

    /// Runs commands one after another in order. A failure does not stop the
    /// remaining commands.
    pub async fn execute_commands(
        &self,
        device: &Device,
        commands: &[String],
        timeout: Option<Duration>,
    ) -> Vec<(String, Output)> {
        let mut results = Vec::with_capacity(commands.len());
        for command in commands {
            let output = self.execute_command(device, command, timeout).await;
            results.push((command.clone(), output));
        }
        results
    }

    /// Dumps the running or startup configuration with the vendor's command.
    pub async fn retrieve_config(&self, device: &Device, kind: ConfigKind) -> Output {
        let command = device.profile().config_command(kind);
        debug!(
            "Retrieving {:?} from {} with '{}'",
            kind, device.ip_address, command
        );
        self.execute_command(device, command, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkConfig;
    use crate::device::{Credentials, InMemoryCredentials};
    use crate::session::ReplayTransport;

    fn executor(transport: ReplayTransport) -> CommandExecutor<ReplayTransport> {
        let store = InMemoryCredentials::new().with("lab", Credentials::new("admin", "pw"));
        let network = NetworkConfig {
            retry_delay: 0,
            ..NetworkConfig::default()
        };
        let sessions = SessionManager::new(transport, Arc::new(store), network).expect("manager");
        CommandExecutor::new(Arc::new(sessions))
    }

    #[tokio::test]
    async fn without_session_reports_no_active_connection() {
        let transport = ReplayTransport::new().with_device("10.0.0.1", "sw#");
        let executor = executor(transport.clone());

        let output = executor
            .execute_command(&Device::new("10.0.0.1"), "show clock", None)
            .await;
        assert_eq!(output, Output::failed(NO_ACTIVE_CONNECTION));
        assert_eq!(transport.commands_sent("10.0.0.1"), 0);
    }

    #[tokio::test]
    async fn batch_continues_after_failure() {
        let transport = ReplayTransport::new()
            .with_device("10.0.0.1", "sw#")
            .with_output("10.0.0.1", "show clock", true, "10:00:00 UTC")
            .with_output("10.0.0.1", "show version", true, "IOS 15.2");
        let executor = executor(transport.clone());
        let mut device = Device::new("10.0.0.1").with_credential("lab");
        executor
            .sessions()
            .connect(&mut device)
            .await
            .expect("connect");

        let commands = ["show clock", "show bogus", "show version"]
            .map(str::to_string)
            .to_vec();
        let results = executor.execute_commands(&device, &commands, None).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0], ("show clock".to_string(), Output::ok("10:00:00 UTC")));
        assert!(!results[1].1.success);
        assert!(results[1].1.content.contains("show bogus"));
        assert_eq!(results[2].1, Output::ok("IOS 15.2"));
    }

    #[tokio::test]
    async fn config_retrieval_uses_vendor_command() {
        let transport = ReplayTransport::new()
            .with_device("10.0.0.2", "<HUAWEI>")
            .with_output("10.0.0.2", "display current-configuration", true, "sysname HUAWEI");
        let executor = executor(transport);
        let mut device = Device::new("10.0.0.2")
            .with_vendor("Huawei")
            .with_credential("lab");
        executor
            .sessions()
            .connect(&mut device)
            .await
            .expect("connect");

        let output = executor
            .retrieve_config(&device, ConfigKind::RunningConfig)
            .await;
        assert_eq!(output, Output::ok("sysname HUAWEI"));
    }
}
