//! Output classifiers, one per built-in workflow.
//!
//! Each rule is a pure function over the command text and its output.
//! Nothing here touches a session.

use once_cell::sync::Lazy;
use regex::Regex;

use super::result::{Issue, IssueKind, Severity};
use crate::config::Thresholds;

fn compile(pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(re) => re,
        Err(err) => panic!("invalid analyzer regex {pattern:?}: {err}"),
    }
}

static INTERFACE_DOWN: Lazy<Regex> = Lazy::new(|| compile(r"(?i)\bis\s+(administratively\s+)?down"));
/// Leftmost "<name> is", so a leading "Interface" keyword is skipped.
static SUBJECT_INTERFACE: Lazy<Regex> = Lazy::new(|| compile(r"(?i)(\S+)\s+is\s+"));
static FIRST_TOKEN: Lazy<Regex> = Lazy::new(|| compile(r"(\S+)"));
static CPU_UTILIZATION: Lazy<Regex> = Lazy::new(|| compile(r"(?i)CPU utilization.*?(\d+)%"));
static PERCENT_CPU: Lazy<Regex> = Lazy::new(|| compile(r"(?i)(\d+)%\s+CPU"));
static MEMORY_USED: Lazy<Regex> = Lazy::new(|| compile(r"(?i)(\d+)%.*?used"));
static PING_ZERO_SUCCESS: Lazy<Regex> =
    Lazy::new(|| compile(r"(?i)success rate is 0 percent|(?:^|\D)0 (?:packets )?received"));

const LOG_ERROR_KEYWORDS: &[&str] = &["error", "critical", "alert", "emergency", "fail"];
const LOG_WARNING_KEYWORDS: &[&str] = &["warning", "notice"];

/// Which classifier a workflow feeds its output to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Analyzer {
    InterfaceHealth,
    CpuMemory,
    Connectivity,
    LogAnalysis,
    /// Unknown workflows still run their commands but yield no issues.
    Noop,
}

impl Analyzer {
    pub fn for_workflow(name: &str) -> Analyzer {
        match name {
            "interface_health" => Analyzer::InterfaceHealth,
            "cpu_memory" => Analyzer::CpuMemory,
            "connectivity" => Analyzer::Connectivity,
            "log_analysis" => Analyzer::LogAnalysis,
            _ => Analyzer::Noop,
        }
    }

    pub fn analyze(&self, command: &str, output: &str, thresholds: &Thresholds) -> Vec<Issue> {
        match self {
            Analyzer::InterfaceHealth => interface_health(output),
            Analyzer::CpuMemory => cpu_memory(command, output, thresholds),
            Analyzer::Connectivity => connectivity(command, output),
            Analyzer::LogAnalysis => log_analysis(output),
            Analyzer::Noop => Vec::new(),
        }
    }
}

/// Down and error-disabled interfaces.
pub fn interface_health(output: &str) -> Vec<Issue> {
    let mut issues = Vec::new();
    for line in output.lines() {
        let lower = line.to_lowercase();

        if lower.contains("down") && lower.contains("line protocol") {
            // "Gi0/1 is up, line protocol is down" belongs to Gi0/1.
            let phrase = INTERFACE_DOWN.captures(line);
            let name = SUBJECT_INTERFACE
                .captures(line)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().trim_end_matches(','))
                .filter(|name| !name.eq_ignore_ascii_case("protocol"));
            if let (Some(phrase), Some(name)) = (phrase, name) {
                let admin_down = phrase.get(1).is_some();
                let (severity, state) = if admin_down {
                    (Severity::Warning, "administratively down")
                } else {
                    (Severity::Critical, "down")
                };
                issues.push(
                    Issue::new(
                        IssueKind::InterfaceDown,
                        severity,
                        format!("Interface {name} is {state}"),
                    )
                    .with_detail("interface", name)
                    .with_detail("admin_down", admin_down)
                    .with_recommendation("Check interface configuration and physical connectivity"),
                );
            }
        }

        if lower.contains("err-disabled") || lower.contains("error-disabled") {
            if let Some(name) = FIRST_TOKEN.find(line).map(|m| m.as_str()) {
                issues.push(
                    Issue::new(
                        IssueKind::InterfaceErrDisabled,
                        Severity::Critical,
                        format!("Interface {name} is error-disabled"),
                    )
                    .with_detail("interface", name)
                    .with_recommendation("Check for port security violations or spanning tree issues"),
                );
            }
        }
    }
    issues
}

fn percent(re: &Regex, text: &str) -> Option<u32> {
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

fn threshold_severity(value: u32, warning: u32, critical: u32) -> Option<(Severity, u32)> {
    if value >= critical {
        Some((Severity::Critical, critical))
    } else if value >= warning {
        Some((Severity::Warning, warning))
    } else {
        None
    }
}

/// CPU and memory utilization against the configured thresholds.
pub fn cpu_memory(command: &str, output: &str, thresholds: &Thresholds) -> Vec<Issue> {
    let command = command.to_lowercase();
    let mut issues = Vec::new();

    if command.contains("cpu") {
        let usage = percent(&CPU_UTILIZATION, output).or_else(|| percent(&PERCENT_CPU, output));
        if let Some(usage) = usage
            && let Some((severity, threshold)) =
                threshold_severity(usage, thresholds.cpu_warning, thresholds.cpu_critical)
        {
            let (description, recommendation) = match severity {
                Severity::Critical => (
                    format!("Critical CPU usage: {usage}%"),
                    "Investigate high CPU processes and consider optimization",
                ),
                _ => (
                    format!("High CPU usage: {usage}%"),
                    "Monitor CPU usage and investigate if sustained",
                ),
            };
            issues.push(
                Issue::new(IssueKind::HighCpu, severity, description)
                    .with_detail("cpu_usage", usage)
                    .with_detail("threshold", threshold)
                    .with_recommendation(recommendation),
            );
        }
    }

    if command.contains("memory") {
        if let Some(usage) = percent(&MEMORY_USED, output)
            && let Some((severity, threshold)) =
                threshold_severity(usage, thresholds.memory_warning, thresholds.memory_critical)
        {
            let (description, recommendation) = match severity {
                Severity::Critical => (
                    format!("Critical memory usage: {usage}%"),
                    "Check for memory leaks and consider memory upgrade",
                ),
                _ => (
                    format!("High memory usage: {usage}%"),
                    "Monitor memory usage trends",
                ),
            };
            issues.push(
                Issue::new(IssueKind::HighMemory, severity, description)
                    .with_detail("memory_usage", usage)
                    .with_detail("threshold", threshold)
                    .with_recommendation(recommendation),
            );
        }
    }

    issues
}

/// Default route presence and ping reachability.
pub fn connectivity(command: &str, output: &str) -> Vec<Issue> {
    let command = command.to_lowercase();
    let mut issues = Vec::new();

    if command.contains("route")
        && !output.to_lowercase().contains("default")
        && !output.contains("0.0.0.0")
    {
        issues.push(
            Issue::new(
                IssueKind::NoDefaultRoute,
                Severity::Warning,
                "No default route found",
            )
            .with_recommendation("Configure default gateway if required"),
        );
    }

    if command.contains("ping") && PING_ZERO_SUCCESS.is_match(output) {
        issues.push(
            Issue::new(IssueKind::PingFailure, Severity::Critical, "Ping test failed")
                .with_recommendation("Check routing and connectivity to target"),
        );
    }

    issues
}

/// Error and warning lines in a log dump.
pub fn log_analysis(output: &str) -> Vec<Issue> {
    output
        .lines()
        .filter_map(|line| {
            let lower = line.to_lowercase();
            let text = line.trim();
            if LOG_ERROR_KEYWORDS.iter().any(|k| lower.contains(k)) {
                Some(
                    Issue::new(
                        IssueKind::LogError,
                        Severity::Critical,
                        format!("Error found in logs: {text}"),
                    )
                    .with_detail("line", text)
                    .with_recommendation("Investigate and resolve error condition"),
                )
            } else if LOG_WARNING_KEYWORDS.iter().any(|k| lower.contains(k)) {
                Some(
                    Issue::new(
                        IssueKind::LogWarning,
                        Severity::Warning,
                        format!("Warning found in logs: {text}"),
                    )
                    .with_detail("line", text)
                    .with_recommendation("Review warning and take action if needed"),
                )
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> Thresholds {
        Thresholds::default()
    }

    #[test]
    fn workflow_names_select_analyzers() {
        assert_eq!(Analyzer::for_workflow("interface_health"), Analyzer::InterfaceHealth);
        assert_eq!(Analyzer::for_workflow("log_analysis"), Analyzer::LogAnalysis);
        assert_eq!(Analyzer::for_workflow("custom_checks"), Analyzer::Noop);
        assert!(
            Analyzer::Noop
                .analyze("show logging", "System Error: boom", &thresholds())
                .is_empty()
        );
    }

    #[test]
    fn down_interface_is_critical() {
        let issues = interface_health("GigabitEthernet0/1 is down, line protocol is down");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].issue_type, IssueKind::InterfaceDown);
        assert_eq!(issues[0].severity, Severity::Critical);
        assert_eq!(issues[0].description, "Interface GigabitEthernet0/1 is down");
        let details = issues[0].details.as_ref().expect("details");
        assert_eq!(details["interface"], "GigabitEthernet0/1");
        assert_eq!(details["admin_down"], false);
    }

    #[test]
    fn admin_down_interface_is_warning() {
        let issues =
            interface_health("GigabitEthernet0/2 is administratively down, line protocol is down");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Warning);
        assert_eq!(
            issues[0].description,
            "Interface GigabitEthernet0/2 is administratively down"
        );
    }

    #[test]
    fn protocol_down_is_attributed_to_leading_interface() {
        let issues = interface_health("Vlan10 is up, line protocol is down");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Critical);
        assert_eq!(
            issues[0].details.as_ref().expect("details")["interface"],
            "Vlan10"
        );
    }

    #[test]
    fn interface_keyword_prefix_is_skipped() {
        let issues =
            interface_health("Interface GigabitEthernet0/1 is down, line protocol is down");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Critical);
        assert_eq!(issues[0].description, "Interface GigabitEthernet0/1 is down");

        let issues = interface_health("  Interface Vlan20 is up, line protocol is down");
        assert_eq!(issues.len(), 1);
        assert_eq!(
            issues[0].details.as_ref().expect("details")["interface"],
            "Vlan20"
        );
    }

    #[test]
    fn bare_protocol_line_is_not_an_interface() {
        assert!(interface_health("  line protocol is down").is_empty());
    }

    #[test]
    fn healthy_and_err_disabled_interfaces() {
        let output = "\
GigabitEthernet0/3 is up, line protocol is up
Gi0/4      uplink       err-disabled 1   auto   auto 10/100/1000BaseTX";
        let issues = interface_health(output);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].issue_type, IssueKind::InterfaceErrDisabled);
        assert_eq!(issues[0].severity, Severity::Critical);
        assert_eq!(issues[0].description, "Interface Gi0/4 is error-disabled");
    }

    #[test]
    fn critical_cpu_records_usage() {
        let issues = cpu_memory(
            "show processes cpu",
            "CPU utilization for five seconds: 95%/10%; one minute: 40%",
            &thresholds(),
        );
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].issue_type, IssueKind::HighCpu);
        assert_eq!(issues[0].severity, Severity::Critical);
        let details = issues[0].details.as_ref().expect("details");
        assert_eq!(details["cpu_usage"], 95);
        assert_eq!(details["threshold"], 90);
    }

    #[test]
    fn alternate_cpu_phrasing_and_warning_threshold() {
        let issues = cpu_memory("display cpu-usage", "85% CPU in use", &thresholds());
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Warning);
        assert_eq!(issues[0].description, "High CPU usage: 85%");
    }

    #[test]
    fn cpu_below_threshold_and_unrelated_command_yield_nothing() {
        assert!(cpu_memory("show processes cpu", "CPU utilization for five seconds: 12%/1%", &thresholds()).is_empty());
        assert!(cpu_memory("show version", "CPU utilization 99%", &thresholds()).is_empty());
    }

    #[test]
    fn memory_usage_against_custom_thresholds() {
        let custom = Thresholds {
            memory_warning: 50,
            memory_critical: 70,
            ..Thresholds::default()
        };
        let issues = cpu_memory("show memory statistics", "Processor pool 75% used", &custom);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].issue_type, IssueKind::HighMemory);
        assert_eq!(issues[0].severity, Severity::Critical);
        assert_eq!(issues[0].details.as_ref().expect("details")["memory_usage"], 75);
    }

    #[test]
    fn missing_default_route_is_warning() {
        let issues = connectivity("show ip route", "C 10.0.0.0/24 is directly connected, Vlan10");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].issue_type, IssueKind::NoDefaultRoute);
        assert_eq!(issues[0].severity, Severity::Warning);

        assert!(connectivity("show ip route", "S* 0.0.0.0/0 [1/0] via 10.0.0.254").is_empty());
        assert!(connectivity("show ip route", "Gateway of last resort is DEFAULT").is_empty());
    }

    #[test]
    fn ping_zero_success_is_critical() {
        let cisco = connectivity("ping 8.8.8.8", "Success rate is 0 percent (0/5)");
        assert_eq!(cisco.len(), 1);
        assert_eq!(cisco[0].issue_type, IssueKind::PingFailure);

        let linux = connectivity("ping 8.8.8.8", "5 packets transmitted, 0 received, 100% packet loss");
        assert_eq!(linux.len(), 1);
    }

    #[test]
    fn ping_with_replies_is_not_a_failure() {
        assert!(connectivity("ping 8.8.8.8", "Success rate is 100 percent (5/5)").is_empty());
        assert!(connectivity("ping 8.8.8.8", "10 packets transmitted, 10 received, 0% packet loss").is_empty());
    }

    #[test]
    fn log_lines_are_classified() {
        let issues = log_analysis("System Error: link flap\nNotice: config saved\n  all good  ");
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].issue_type, IssueKind::LogError);
        assert_eq!(issues[0].severity, Severity::Critical);
        assert_eq!(issues[0].description, "Error found in logs: System Error: link flap");
        assert_eq!(issues[1].issue_type, IssueKind::LogWarning);
        assert_eq!(issues[1].severity, Severity::Warning);
        assert_eq!(
            issues[1].details.as_ref().expect("details")["line"],
            "Notice: config saved"
        );
    }

    #[test]
    fn error_keyword_wins_over_warning_keyword() {
        let issues = log_analysis("%SYS-4-WARNING: power supply failed");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].issue_type, IssueKind::LogError);
    }
}
