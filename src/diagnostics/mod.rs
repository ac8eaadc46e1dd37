//! Diagnostic workflows.
//!
//! A workflow is a named command list from [`DiagnosticsConfig`]. Running it
//! executes every command in order on a connected device and passes each
//! successful output to the workflow's [`Analyzer`]. The findings are
//! gathered in a [`DiagnosticResult`].

use std::time::Instant;

use log::{error, info, warn};

use crate::config::DiagnosticsConfig;
use crate::device::Device;
use crate::error::ConnectError;
use crate::executor::CommandExecutor;
use crate::session::Transport;

pub use analyzers::Analyzer;
pub use result::{CommandResult, DiagnosticResult, Issue, IssueKind, Severity};

pub mod analyzers;
mod result;

/// Runs configured workflows against devices.
pub struct DiagnosticEngine<T: Transport> {
    executor: CommandExecutor<T>,
    config: DiagnosticsConfig,
}

impl<T: Transport> DiagnosticEngine<T> {
    pub fn new(executor: CommandExecutor<T>, config: DiagnosticsConfig) -> Self {
        Self { executor, config }
    }

    pub fn config(&self) -> &DiagnosticsConfig {
        &self.config
    }

    /// Runs one workflow. Problems are reported in the result, never raised.
    pub async fn run_workflow(&self, device: &Device, workflow_name: &str) -> DiagnosticResult {
        let started = Instant::now();

        let workflow = match self.config.workflows.get(workflow_name) {
            None => {
                let err = ConnectError::WorkflowNotFound(workflow_name.to_string());
                error!("{}", err);
                return DiagnosticResult::failed(device, workflow_name, err.to_string());
            }
            Some(workflow) if !workflow.enabled => {
                let err = ConnectError::WorkflowDisabled(workflow_name.to_string());
                warn!("{}", err);
                return DiagnosticResult::failed(device, workflow_name, err.to_string());
            }
            Some(workflow) => workflow,
        };

        if !self.executor.sessions().is_connected(device) {
            let summary = format!("Device {} is not connected", device.ip_address);
            error!("{}", summary);
            return DiagnosticResult::failed(device, workflow_name, summary);
        }

        info!(
            "Running workflow '{}' on {}",
            workflow_name, device.ip_address
        );
        let analyzer = Analyzer::for_workflow(workflow_name);
        let mut result = DiagnosticResult::new(device, workflow_name);

        for command in &workflow.commands {
            let command_started = Instant::now();
            let output = self.executor.execute_command(device, command, None).await;
            result.add_command_result(CommandResult::new(
                command.as_str(),
                output.success,
                output.content.as_str(),
                command_started.elapsed(),
            ));

            if output.success {
                for issue in analyzer.analyze(command, &output.content, &self.config.thresholds) {
                    result.add_issue(issue);
                }
            }
        }

        result.finish(started.elapsed());
        info!(
            "Workflow '{}' completed on {}: {}",
            workflow_name, device.ip_address, result.summary
        );
        result
    }

    /// Runs several workflows one after another on the same device.
    pub async fn run_multiple_workflows(
        &self,
        device: &Device,
        workflow_names: &[String],
    ) -> Vec<DiagnosticResult> {
        let mut results = Vec::with_capacity(workflow_names.len());
        for name in workflow_names {
            results.push(self.run_workflow(device, name).await);
        }
        results
    }

    /// Configured workflow keys, sorted.
    pub fn available_workflows(&self) -> Vec<String> {
        self.config.workflows.keys().cloned().collect()
    }
}
