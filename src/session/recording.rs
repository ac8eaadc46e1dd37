use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::*;

/// How much of a session the recorder keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionRecordLevel {
    Off,
    /// Connection and command events, no raw shell data.
    KeyEventsOnly,
    #[default]
    Full,
}

/// One timestamped event in a recording.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SessionRecordEntry {
    /// Milliseconds since the Unix epoch.
    pub ts_ms: i64,
    pub event: SessionEvent,
}

/// Failure class stored with a failed connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RecordedFailure {
    Configuration,
    Timeout,
    Authentication,
    Transport,
}

impl From<FailureKind> for RecordedFailure {
    fn from(kind: FailureKind) -> Self {
        match kind {
            FailureKind::Configuration => RecordedFailure::Configuration,
            FailureKind::Timeout => RecordedFailure::Timeout,
            FailureKind::Authentication => RecordedFailure::Authentication,
            FailureKind::Transport => RecordedFailure::Transport,
        }
    }
}

/// Supported recorded event types.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionEvent {
    ConnectionEstablished {
        device_addr: String,
        #[serde(alias = "prompt")]
        prompt_after: String,
    },
    ConnectionFailed {
        device_addr: String,
        #[serde(rename = "failure")]
        kind: RecordedFailure,
        #[serde(default)]
        message: String,
    },
    ConnectionClosed {
        #[serde(default)]
        device_addr: Option<String>,
        reason: String,
    },
    CommandOutput {
        #[serde(default)]
        device_addr: Option<String>,
        command: String,
        success: bool,
        content: String,
    },
    RawChunk {
        data: String,
    },
}

/// Shared, append-only log of session events.
///
/// Clones share the same buffer, so one recorder can be handed to a
/// transport and read back by the caller after the run.
#[derive(Debug, Clone, Default)]
pub struct SessionRecorder {
    level: SessionRecordLevel,
    entries: Arc<std::sync::Mutex<Vec<SessionRecordEntry>>>,
}

impl SessionRecorder {
    pub fn new(level: SessionRecordLevel) -> Self {
        Self {
            level,
            entries: Arc::default(),
        }
    }

    pub fn level(&self) -> SessionRecordLevel {
        self.level
    }

    fn buffer(&self) -> Result<std::sync::MutexGuard<'_, Vec<SessionRecordEntry>>, ConnectError> {
        self.entries
            .lock()
            .map_err(|e| ConnectError::RecordError(format!("recorder poisoned: {e}")))
    }

    /// Appends an event unless recording is off.
    pub fn record_event(&self, event: SessionEvent) -> Result<(), ConnectError> {
        if self.level == SessionRecordLevel::Off {
            return Ok(());
        }
        let ts_ms = Utc::now().timestamp_millis();
        self.buffer()?.push(SessionRecordEntry { ts_ms, event });
        Ok(())
    }

    /// Appends raw shell output; only kept at [`SessionRecordLevel::Full`].
    pub fn record_raw_chunk(&self, data: String) -> Result<(), ConnectError> {
        match self.level {
            SessionRecordLevel::Full => self.record_event(SessionEvent::RawChunk { data }),
            _ => Ok(()),
        }
    }

    pub fn entries(&self) -> Result<Vec<SessionRecordEntry>, ConnectError> {
        Ok(self.buffer()?.clone())
    }

    pub fn clear(&self) -> Result<(), ConnectError> {
        self.buffer()?.clear();
        Ok(())
    }

    /// One JSON object per line, oldest first.
    pub fn to_jsonl(&self) -> Result<String, ConnectError> {
        let lines = self
            .buffer()?
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ConnectError::RecordError(format!("cannot encode entry: {e}")))?;
        Ok(lines.join("\n"))
    }

    /// Loads a recording written by [`SessionRecorder::to_jsonl`]. Blank lines are skipped.
    pub fn from_jsonl(jsonl: &str) -> Result<Self, ConnectError> {
        let entries = jsonl
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                serde_json::from_str::<SessionRecordEntry>(line).map_err(|e| {
                    ConnectError::RecordError(format!("line {}: {e}", index + 1))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            level: SessionRecordLevel::Full,
            entries: Arc::new(std::sync::Mutex::new(entries)),
        })
    }
}

#[derive(Debug, Clone)]
enum ConnectStep {
    Established { prompt: String },
    Failed { kind: RecordedFailure, message: String },
}

#[derive(Debug, Clone)]
struct RecordedOutput {
    command: String,
    success: bool,
    content: String,
}

#[derive(Debug, Default)]
struct ReplayHost {
    steps: VecDeque<ConnectStep>,
    outputs: Vec<RecordedOutput>,
    attempts: usize,
    severed: Arc<AtomicBool>,
    commands: Arc<AtomicUsize>,
}

/// Offline transport that plays back recorded sessions.
///
/// Connection events are consumed in order per device; the last successful
/// connection is reused for every later attempt. Command outputs are matched
/// by command text, preferring the next one in recording order.
#[derive(Debug, Clone, Default)]
pub struct ReplayTransport {
    hosts: Arc<std::sync::Mutex<HashMap<String, ReplayHost>>>,
}

impl ReplayTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a transport from a recorder snapshot.
    pub fn from_recorder(recorder: &SessionRecorder) -> Result<Self, ConnectError> {
        let transport = Self::new();
        for entry in recorder.entries()? {
            transport.push_event(entry.event);
        }
        Ok(transport)
    }

    /// Build a transport from JSONL recording data.
    pub fn from_jsonl(jsonl: &str) -> Result<Self, ConnectError> {
        Self::from_recorder(&SessionRecorder::from_jsonl(jsonl)?)
    }

    /// Adds one recorded event. Command outputs without a device address are skipped.
    pub fn push_event(&self, event: SessionEvent) {
        let mut hosts = self.hosts();
        match event {
            SessionEvent::ConnectionEstablished {
                device_addr,
                prompt_after,
            } => {
                hosts
                    .entry(device_addr)
                    .or_default()
                    .steps
                    .push_back(ConnectStep::Established {
                        prompt: prompt_after,
                    });
            }
            SessionEvent::ConnectionFailed {
                device_addr,
                kind,
                message,
            } => {
                hosts
                    .entry(device_addr)
                    .or_default()
                    .steps
                    .push_back(ConnectStep::Failed { kind, message });
            }
            SessionEvent::CommandOutput {
                device_addr,
                command,
                success,
                content,
            } => {
                let Some(device_addr) = device_addr else {
                    warn!("Recorded output for '{}' has no device, skipped", command);
                    return;
                };
                hosts
                    .entry(device_addr)
                    .or_default()
                    .outputs
                    .push(RecordedOutput {
                        command,
                        success,
                        content,
                    });
            }
            SessionEvent::ConnectionClosed { .. } | SessionEvent::RawChunk { .. } => {}
        }
    }

    /// Registers a device that accepts connections with the given prompt.
    pub fn with_device(self, device_addr: &str, prompt: &str) -> Self {
        self.push_event(SessionEvent::ConnectionEstablished {
            device_addr: device_addr.to_string(),
            prompt_after: prompt.to_string(),
        });
        self
    }

    /// Queues a failed connection attempt ahead of later ones.
    pub fn with_failure(self, device_addr: &str, kind: RecordedFailure) -> Self {
        self.push_event(SessionEvent::ConnectionFailed {
            device_addr: device_addr.to_string(),
            kind,
            message: "recorded failure".to_string(),
        });
        self
    }

    /// Adds a recorded command output for a device.
    pub fn with_output(self, device_addr: &str, command: &str, success: bool, content: &str) -> Self {
        self.push_event(SessionEvent::CommandOutput {
            device_addr: Some(device_addr.to_string()),
            command: command.to_string(),
            success,
            content: content.to_string(),
        });
        self
    }

    /// Number of connection attempts made against a device.
    pub fn attempts(&self, device_addr: &str) -> usize {
        self.hosts().get(device_addr).map_or(0, |h| h.attempts)
    }

    /// Number of commands sent to a device across all sessions.
    pub fn commands_sent(&self, device_addr: &str) -> usize {
        self.hosts()
            .get(device_addr)
            .map_or(0, |h| h.commands.load(Ordering::Acquire))
    }

    /// Simulates a dropped link: every open session to the device dies.
    pub fn sever(&self, device_addr: &str) {
        if let Some(host) = self.hosts().get(device_addr) {
            host.severed.store(true, Ordering::Release);
        }
    }

    fn hosts(&self) -> std::sync::MutexGuard<'_, HashMap<String, ReplayHost>> {
        self.hosts
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn next_step(&self, device_addr: &str) -> Result<ReplaySession, ConnectError> {
        let mut hosts = self.hosts();
        let Some(host) = hosts.get_mut(device_addr) else {
            return Err(ConnectError::ReplayMismatchError(format!(
                "no recorded connection for {device_addr}"
            )));
        };
        host.attempts += 1;

        let reuse_last = host.steps.len() == 1
            && matches!(host.steps.front(), Some(ConnectStep::Established { .. }));
        let step = if reuse_last {
            host.steps.front().cloned()
        } else {
            host.steps.pop_front()
        };
        match step {
            Some(ConnectStep::Established { prompt }) => {
                let severed = Arc::new(AtomicBool::new(false));
                host.severed = severed.clone();
                Ok(ReplaySession {
                    device_addr: device_addr.to_string(),
                    prompt,
                    outputs: host.outputs.clone(),
                    cursor: 0,
                    closed: false,
                    severed,
                    commands: host.commands.clone(),
                })
            }
            Some(ConnectStep::Failed { kind, message }) => Err(match kind {
                RecordedFailure::Timeout => ConnectError::ConnectTimeout(device_addr.to_string()),
                RecordedFailure::Authentication => {
                    ConnectError::AuthFailed(device_addr.to_string())
                }
                RecordedFailure::Configuration | RecordedFailure::Transport => {
                    ConnectError::TransportFailed(format!("{device_addr}: {message}"))
                }
            }),
            None => Err(ConnectError::ReplayMismatchError(format!(
                "recorded connections for {device_addr} exhausted"
            ))),
        }
    }
}

impl Transport for ReplayTransport {
    type Session = ReplaySession;

    async fn open(&self, target: &ConnectTarget) -> Result<ReplaySession, ConnectError> {
        let session = self.next_step(&target.host)?;
        debug!("{} replay session opened, prompt {:?}", target.host, session.prompt);
        Ok(session)
    }
}

/// A session that answers commands from a recording.
#[derive(Debug)]
pub struct ReplaySession {
    device_addr: String,
    prompt: String,
    outputs: Vec<RecordedOutput>,
    cursor: usize,
    closed: bool,
    severed: Arc<AtomicBool>,
    commands: Arc<AtomicUsize>,
}

impl ReplaySession {
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    fn replay_next(&mut self, command: &str) -> Result<String, ConnectError> {
        // Next match after the cursor first, then the earliest one.
        let found = (self.cursor..self.outputs.len())
            .chain(0..self.cursor)
            .find(|&index| self.outputs[index].command == command);
        let Some(index) = found else {
            return Err(ConnectError::ReplayMismatchError(format!(
                "no replayable output found for command '{command}' on {}",
                self.device_addr
            )));
        };
        self.cursor = index + 1;
        let recorded = &self.outputs[index];
        if recorded.success {
            Ok(recorded.content.clone())
        } else {
            Err(ConnectError::ExecFailed(recorded.content.clone()))
        }
    }
}

impl ShellSession for ReplaySession {
    async fn send_command(
        &mut self,
        command: &str,
        _timeout: Duration,
    ) -> Result<String, ConnectError> {
        if self.is_closed() {
            return Err(ConnectError::ConnectClosedError);
        }
        self.commands.fetch_add(1, Ordering::AcqRel);
        self.replay_next(command)
    }

    async fn probe(&mut self, expect: &Regex, _timeout: Duration) -> Result<(), ConnectError> {
        if self.is_closed() {
            return Err(ConnectError::ConnectClosedError);
        }
        if expect.is_match(&self.prompt) {
            Ok(())
        } else {
            Err(ConnectError::ExecTimeout(self.prompt.clone()))
        }
    }

    async fn close(&mut self) -> Result<(), ConnectError> {
        self.closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed || self.severed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Credentials;

    const FIXTURE: &str = r#"{"ts_ms":1,"event":{"kind":"connection_failed","device_addr":"10.0.0.1","failure":"timeout","message":"no answer"}}
{"ts_ms":2,"event":{"kind":"connection_established","device_addr":"10.0.0.1","prompt_after":"core-sw1#"}}
{"ts_ms":3,"event":{"kind":"raw_chunk","data":"show clock\r\n"}}
{"ts_ms":4,"event":{"kind":"command_output","device_addr":"10.0.0.1","command":"show clock","success":true,"content":"10:00:00 UTC"}}
{"ts_ms":5,"event":{"kind":"connection_closed","device_addr":"10.0.0.1","reason":"client_close_called"}}
"#;

    fn target(host: &str) -> ConnectTarget {
        ConnectTarget::new(
            &Device::new(host),
            &Credentials::new("admin", "pw"),
            Duration::from_secs(1),
            ConnectionSecurityOptions::default(),
        )
    }

    fn closed(reason: &str) -> SessionEvent {
        SessionEvent::ConnectionClosed {
            device_addr: Some("10.0.0.1".to_string()),
            reason: reason.to_string(),
        }
    }

    #[test]
    fn level_decides_what_is_kept() {
        let counts = [
            SessionRecordLevel::Off,
            SessionRecordLevel::KeyEventsOnly,
            SessionRecordLevel::Full,
        ]
        .map(|level| {
            let recorder = SessionRecorder::new(level);
            recorder.record_raw_chunk("sw1#".to_string()).expect("raw");
            recorder.record_event(closed("done")).expect("event");
            recorder.entries().expect("entries").len()
        });
        assert_eq!(counts, [0, 1, 2]);
    }

    #[test]
    fn clones_share_one_buffer() {
        let recorder = SessionRecorder::default();
        let handed_out = recorder.clone();
        handed_out.record_event(closed("first")).expect("event");
        assert_eq!(recorder.entries().expect("entries").len(), 1);

        recorder.clear().expect("clear");
        assert!(handed_out.entries().expect("entries").is_empty());
    }

    #[test]
    fn jsonl_export_can_be_replayed() {
        let recorder = SessionRecorder::new(SessionRecordLevel::KeyEventsOnly);
        recorder
            .record_event(SessionEvent::ConnectionEstablished {
                device_addr: "10.0.0.7".to_string(),
                prompt_after: "lab-r1#".to_string(),
            })
            .expect("connect");
        recorder
            .record_event(SessionEvent::CommandOutput {
                device_addr: Some("10.0.0.7".to_string()),
                command: "show version".to_string(),
                success: true,
                content: "IOS XE 17.9".to_string(),
            })
            .expect("output");

        let jsonl = recorder.to_jsonl().expect("encode");
        assert_eq!(jsonl.lines().count(), 2);
        let restored = SessionRecorder::from_jsonl(&format!("\n{jsonl}\n\n")).expect("decode");
        assert_eq!(restored.level(), SessionRecordLevel::Full);
        assert_eq!(restored.entries().expect("entries").len(), 2);
        assert!(ReplayTransport::from_recorder(&restored).is_ok());
    }

    #[test]
    fn bad_jsonl_line_is_reported_by_number() {
        let input = format!("{}\n{{not json", FIXTURE.lines().next().unwrap_or_default());
        let err = SessionRecorder::from_jsonl(&input).expect_err("garbage");
        assert!(matches!(err, ConnectError::RecordError(ref msg) if msg.starts_with("line 2:")));
    }

    #[test]
    fn failure_kind_is_stored_as_snake_case() {
        let event = SessionEvent::ConnectionFailed {
            device_addr: "10.0.0.1".to_string(),
            kind: FailureKind::Authentication.into(),
            message: "denied".to_string(),
        };
        let json = serde_json::to_string(&event).expect("encode");
        assert!(json.contains("\"failure\":\"authentication\""));
    }

    #[tokio::test]
    async fn replay_consumes_failures_then_reuses_last_connection() {
        let transport = ReplayTransport::from_jsonl(FIXTURE).expect("fixture");
        let err = transport
            .open(&target("10.0.0.1"))
            .await
            .expect_err("first attempt times out");
        assert!(err.is_timeout());

        let mut first = transport.open(&target("10.0.0.1")).await.expect("connect");
        assert_eq!(first.prompt(), "core-sw1#");
        let _second = transport.open(&target("10.0.0.1")).await.expect("reconnect");
        assert_eq!(transport.attempts("10.0.0.1"), 3);

        let out = first
            .send_command("show clock", Duration::from_secs(1))
            .await
            .expect("replayed output");
        assert_eq!(out, "10:00:00 UTC");
        assert_eq!(transport.commands_sent("10.0.0.1"), 1);
    }

    #[tokio::test]
    async fn replay_reports_unknown_commands_and_hosts() {
        let transport = ReplayTransport::new().with_device("10.0.0.2", "edge#");
        let mut session = transport.open(&target("10.0.0.2")).await.expect("connect");
        let err = session
            .send_command("show version", Duration::from_secs(1))
            .await
            .expect_err("not recorded");
        assert!(matches!(err, ConnectError::ReplayMismatchError(_)));

        let err = transport
            .open(&target("10.0.0.9"))
            .await
            .expect_err("unknown host");
        assert!(matches!(err, ConnectError::ReplayMismatchError(_)));
    }

    #[tokio::test]
    async fn failed_recorded_output_becomes_exec_failure() {
        let transport = ReplayTransport::new()
            .with_device("10.0.0.3", "sw#")
            .with_output("10.0.0.3", "show bogus", false, "% Invalid input");
        let mut session = transport.open(&target("10.0.0.3")).await.expect("connect");
        let err = session
            .send_command("show bogus", Duration::from_secs(1))
            .await
            .expect_err("failed output");
        assert!(matches!(err, ConnectError::ExecFailed(ref text) if text == "% Invalid input"));
    }

    #[tokio::test]
    async fn severed_session_fails_probe() {
        let transport = ReplayTransport::new().with_device("10.0.0.4", "sw#");
        let mut session = transport.open(&target("10.0.0.4")).await.expect("connect");
        let expect = Regex::new("#|>").expect("regex");
        session
            .probe(&expect, Duration::from_secs(1))
            .await
            .expect("alive");

        transport.sever("10.0.0.4");
        assert!(session.is_closed());
        assert!(session.probe(&expect, Duration::from_secs(1)).await.is_err());
    }

    #[tokio::test]
    async fn probe_fails_when_prompt_does_not_match() {
        let transport = ReplayTransport::new().with_device("10.0.0.5", "[admin@mt] $");
        let mut session = transport.open(&target("10.0.0.5")).await.expect("connect");
        let expect = Regex::new("#|>").expect("regex");
        assert!(session.probe(&expect, Duration::from_secs(1)).await.is_err());
    }
}
