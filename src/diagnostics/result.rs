//! Diagnostic findings and their aggregation.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::device::Device;

/// Issue severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Normal,
    Info,
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Normal => "normal",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Kinds of findings the analyzers produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    InterfaceDown,
    InterfaceErrDisabled,
    HighCpu,
    HighMemory,
    NoDefaultRoute,
    PingFailure,
    LogError,
    LogWarning,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::InterfaceDown => "interface_down",
            IssueKind::InterfaceErrDisabled => "interface_err_disabled",
            IssueKind::HighCpu => "high_cpu",
            IssueKind::HighMemory => "high_memory",
            IssueKind::NoDefaultRoute => "no_default_route",
            IssueKind::PingFailure => "ping_failure",
            IssueKind::LogError => "log_error",
            IssueKind::LogWarning => "log_warning",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One classified finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    #[serde(rename = "type")]
    pub issue_type: IssueKind,
    pub severity: Severity,
    pub description: String,
    #[serde(default)]
    pub details: Option<Map<String, Value>>,
    #[serde(default)]
    pub recommendation: Option<String>,
}

impl Issue {
    pub fn new(issue_type: IssueKind, severity: Severity, description: impl Into<String>) -> Self {
        Self {
            issue_type,
            severity,
            description: description.into(),
            details: None,
            recommendation: None,
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details
            .get_or_insert_with(Map::new)
            .insert(key.to_string(), value.into());
        self
    }

    pub fn with_recommendation(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendation = Some(recommendation.into());
        self
    }
}

/// Outcome of one executed command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    pub command: String,
    pub output: String,
    pub success: bool,
    pub error_message: Option<String>,
    #[serde(with = "duration_secs")]
    pub execution_time: Duration,
}

impl CommandResult {
    pub fn new(command: impl Into<String>, success: bool, output: impl Into<String>, execution_time: Duration) -> Self {
        let output = output.into();
        Self {
            command: command.into(),
            error_message: (!success).then(|| output.clone()),
            output,
            success,
            execution_time,
        }
    }
}

/// Everything one workflow run produced for one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticResult {
    pub device_ip: String,
    pub device_hostname: Option<String>,
    pub workflow_name: String,
    pub timestamp: DateTime<Utc>,
    command_results: Vec<CommandResult>,
    issues: Vec<Issue>,
    overall_severity: Severity,
    pub summary: String,
    #[serde(with = "duration_secs")]
    pub execution_time: Duration,
    success: bool,
}

impl DiagnosticResult {
    pub fn new(device: &Device, workflow_name: impl Into<String>) -> Self {
        Self {
            device_ip: device.ip_address.clone(),
            device_hostname: device.hostname.clone(),
            workflow_name: workflow_name.into(),
            timestamp: Utc::now(),
            command_results: Vec::new(),
            issues: Vec::new(),
            overall_severity: Severity::Normal,
            summary: String::new(),
            execution_time: Duration::ZERO,
            success: true,
        }
    }

    /// A run that could not start; `summary` says why.
    pub fn failed(device: &Device, workflow_name: impl Into<String>, summary: impl Into<String>) -> Self {
        let mut result = Self::new(device, workflow_name);
        result.success = false;
        result.summary = summary.into();
        result
    }

    pub fn add_issue(&mut self, issue: Issue) {
        self.overall_severity = self.overall_severity.max(match issue.severity {
            Severity::Normal => Severity::Info,
            other => other,
        });
        self.issues.push(issue);
    }

    pub fn add_command_result(&mut self, result: CommandResult) {
        if !result.success {
            self.success = false;
        }
        self.command_results.push(result);
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn command_results(&self) -> &[CommandResult] {
        &self.command_results
    }

    pub fn overall_severity(&self) -> Severity {
        self.overall_severity
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn critical_issues(&self) -> Vec<&Issue> {
        self.issues_with(Severity::Critical)
    }

    pub fn warning_issues(&self) -> Vec<&Issue> {
        self.issues_with(Severity::Warning)
    }

    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }

    fn issues_with(&self, severity: Severity) -> Vec<&Issue> {
        self.issues.iter().filter(|i| i.severity == severity).collect()
    }

    /// Summary text derived from the issues and command outcomes.
    pub fn derive_summary(&self) -> String {
        let critical = self.critical_issues().len();
        let warnings = self.warning_issues().len();
        let findings = if critical > 0 {
            format!("Found {critical} critical issue(s) and {warnings} warning(s)")
        } else if warnings > 0 {
            format!("Found {warnings} warning(s), no critical issues")
        } else {
            "All checks passed, no issues found".to_string()
        };

        let failed = self.command_results.iter().filter(|r| !r.success).count();
        if failed > 0 {
            format!(
                "{failed} of {} command(s) failed; {findings}",
                self.command_results.len()
            )
        } else {
            findings
        }
    }

    /// Stamps the elapsed time and summary once the run is over.
    pub fn finish(&mut self, execution_time: Duration) {
        self.execution_time = execution_time;
        self.summary = self.derive_summary();
    }
}

/// Durations as fractional seconds.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}
