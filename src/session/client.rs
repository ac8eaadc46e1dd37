use std::sync::atomic::{AtomicBool, Ordering};

use async_ssh2_tokio::Config;
use async_ssh2_tokio::client::{AuthMethod, Client};
use log::trace;
use russh::ChannelMsg;
use tokio::sync::mpsc;

use super::*;
use crate::prompt::{self, PromptMatcher};

const CHANNEL_DEPTH: usize = 256;
const IDLE_CHANNEL_TIMEOUT: Duration = Duration::from_secs(60);

/// Moves bytes between the SSH channel and the shell's queues until either
/// side goes away, then flags the shell as closed.
async fn pump(
    mut channel: russh::Channel<russh::client::Msg>,
    mut outgoing: mpsc::Receiver<String>,
    incoming: mpsc::Sender<String>,
    device_addr: String,
    closed: Arc<AtomicBool>,
) {
    let reason = loop {
        tokio::select! {
            Some(line) = outgoing.recv() => {
                if let Err(err) = channel.data(line.as_bytes()).await {
                    break format!("write failed: {err}");
                }
            }
            Some(msg) = channel.wait() => match msg {
                ChannelMsg::Data { data } => {
                    let text = String::from_utf8_lossy(&data).into_owned();
                    if incoming.send(text).await.is_err() {
                        break "shell dropped".to_string();
                    }
                }
                ChannelMsg::ExitStatus { exit_status } => {
                    let _ = channel.eof().await;
                    break format!("exit status {exit_status}");
                }
                ChannelMsg::Eof | ChannelMsg::Close => break "remote closed".to_string(),
                _ => {}
            },
            else => break "channel gone".to_string(),
        }
    };
    closed.store(true, Ordering::Release);
    debug!("{} channel pump stopped: {}", device_addr, reason);
}

/// Interactive SSH shells over `async-ssh2-tokio`.
#[derive(Debug, Clone, Default)]
pub struct SshTransport {
    recorder: Option<SessionRecorder>,
}

impl SshTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records every session this transport opens.
    pub fn with_recorder(recorder: SessionRecorder) -> Self {
        Self {
            recorder: Some(recorder),
        }
    }

    pub fn recorder(&self) -> Option<&SessionRecorder> {
        self.recorder.as_ref()
    }
}

impl Transport for SshTransport {
    type Session = SshShell;

    async fn open(&self, target: &ConnectTarget) -> Result<SshShell, ConnectError> {
        match SshShell::open(target, self.recorder.clone()).await {
            Ok(shell) => Ok(shell),
            Err(err) => {
                if let Some(recorder) = self.recorder.as_ref() {
                    let _ = recorder.record_event(SessionEvent::ConnectionFailed {
                        device_addr: target.host.clone(),
                        kind: err.kind().into(),
                        message: err.to_string(),
                    });
                }
                Err(err)
            }
        }
    }
}

/// One interactive shell channel on an SSH connection.
///
/// A background task pumps channel data in both directions; this side
/// talks to it through two mpsc queues.
pub struct SshShell {
    client: Client,
    sender: mpsc::Sender<String>,
    recv: mpsc::Receiver<String>,
    matcher: PromptMatcher,
    prompt: String,
    device_addr: String,
    io_closed: Arc<AtomicBool>,
    recorder: Option<SessionRecorder>,
}

impl SshShell {
    async fn open(
        target: &ConnectTarget,
        recorder: Option<SessionRecorder>,
    ) -> Result<SshShell, ConnectError> {
        let device_addr = target.host.clone();
        let matcher = PromptMatcher::for_profile(target.profile)?;

        let client = tokio::time::timeout(target.timeout, Self::dial(target))
            .await
            .map_err(|_| {
                ConnectError::ConnectTimeout(format!(
                    "{}:{} after {:?}",
                    target.host, target.port, target.timeout
                ))
            })??;
        debug!("{} authenticated as {}", device_addr, target.username);

        let mut channel = client.get_channel().await?;
        channel
            .request_pty(false, "vt100", 512, 200, 0, 0, &[])
            .await?;
        channel.request_shell(false).await?;

        let (to_device, outgoing) = mpsc::channel::<String>(CHANNEL_DEPTH);
        let (incoming, from_device) = mpsc::channel::<String>(CHANNEL_DEPTH);
        let io_closed = Arc::new(AtomicBool::new(false));
        tokio::spawn(pump(
            channel,
            outgoing,
            incoming,
            device_addr.clone(),
            io_closed.clone(),
        ));

        let mut shell = SshShell {
            client,
            sender: to_device,
            recv: from_device,
            matcher,
            prompt: String::new(),
            device_addr,
            io_closed,
            recorder,
        };

        let initial = match shell.read_until_prompt(target.timeout).await {
            Ok(initial) => initial,
            Err(ConnectError::ExecTimeout(partial)) => {
                return Err(ConnectError::InitTimeout(if partial.is_empty() {
                    "waiting for initial prompt".to_string()
                } else {
                    partial
                }));
            }
            Err(err) => return Err(err),
        };
        shell.prompt = prompt::last_line(&initial).to_string();

        if let (Some(enable), Some(secret)) =
            (target.profile.enable_command, target.enable_password())
        {
            shell.enable(enable, secret, target.timeout).await?;
        }
        if let Some(paging) = target.profile.paging_command {
            shell.send_command(paging, target.timeout).await?;
        }

        if let Some(recorder) = shell.recorder.as_ref() {
            let _ = recorder.record_event(SessionEvent::ConnectionEstablished {
                device_addr: shell.device_addr.clone(),
                prompt_after: shell.prompt.clone(),
            });
        }
        info!(
            "{} shell ready ({}), prompt {:?}",
            shell.device_addr, target.profile.name, shell.prompt
        );
        Ok(shell)
    }

    async fn dial(target: &ConnectTarget) -> Result<Client, ConnectError> {
        let config = Config {
            preferred: target.security.preferred(),
            inactivity_timeout: Some(IDLE_CHANNEL_TIMEOUT),
            ..Default::default()
        };
        let client = Client::connect_with_config(
            (target.host.clone(), target.port),
            &target.username,
            AuthMethod::with_password(target.password()),
            target.security.server_check.clone(),
            config,
        )
        .await?;
        Ok(client)
    }

    /// Raises privileges, answering the password request if one shows up.
    async fn enable(
        &mut self,
        command: &str,
        secret: &str,
        timeout: Duration,
    ) -> Result<(), ConnectError> {
        self.sender.send(format!("{command}\n")).await?;
        let matcher = self.matcher.clone();
        let reply = self
            .read_until(timeout, |buffer| {
                prompt::wants_password(buffer) || matcher.is_prompt(buffer)
            })
            .await?;
        let reply = if prompt::wants_password(&reply) {
            self.sender.send(format!("{secret}\n")).await?;
            self.read_until_prompt(timeout).await?
        } else {
            reply
        };

        self.prompt = prompt::last_line(&reply).to_string();
        if !self.prompt.trim_end().ends_with('#') {
            return Err(ConnectError::AuthFailed(format!(
                "{}: enable rejected",
                self.device_addr
            )));
        }
        debug!("{} entered privileged mode", self.device_addr);
        Ok(())
    }

    async fn read_until_prompt(&mut self, timeout: Duration) -> Result<String, ConnectError> {
        let matcher = self.matcher.clone();
        self.read_until(timeout, |buffer| matcher.is_prompt(buffer))
            .await
    }

    /// Reads shell output until `done` accepts the buffer.
    ///
    /// Pagination markers are answered with a space and removed. On timeout
    /// the partial output is returned inside [`ConnectError::ExecTimeout`].
    async fn read_until<F>(&mut self, timeout: Duration, done: F) -> Result<String, ConnectError>
    where
        F: Fn(&str) -> bool,
    {
        let recv = &mut self.recv;
        let sender = &self.sender;
        let recorder = self.recorder.as_ref();
        let mut buffer = String::new();

        let result = tokio::time::timeout(timeout, async {
            loop {
                let Some(data) = recv.recv().await else {
                    return Err(ConnectError::ChannelDisconnectError);
                };
                trace!("{:?}", data);
                if let Some(recorder) = recorder {
                    let _ = recorder.record_raw_chunk(data.clone());
                }
                buffer.push_str(&data);

                if prompt::has_more_marker(&buffer) {
                    prompt::strip_more_marker(&mut buffer);
                    sender.send(" ".to_string()).await?;
                    continue;
                }
                if done(&buffer) {
                    return Ok(());
                }
            }
        })
        .await;

        match result {
            Ok(Ok(())) => Ok(buffer),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(ConnectError::ExecTimeout(buffer)),
        }
    }

    fn record_command(&self, command: &str, success: bool, content: &str) {
        if let Some(recorder) = self.recorder.as_ref() {
            let _ = recorder.record_event(SessionEvent::CommandOutput {
                device_addr: Some(self.device_addr.clone()),
                command: command.to_string(),
                success,
                content: content.to_string(),
            });
        }
    }
}

impl ShellSession for SshShell {
    async fn send_command(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> Result<String, ConnectError> {
        // Drop anything left over from a previous command.
        while self.recv.try_recv().is_ok() {}

        self.sender.send(format!("{command}\n")).await?;

        match self.read_until_prompt(timeout).await {
            Ok(raw) => {
                self.prompt = prompt::last_line(&raw).to_string();
                let content = prompt::extract_output(command, &raw, &self.matcher);
                self.record_command(command, true, &content);
                Ok(content)
            }
            Err(err) => {
                self.record_command(command, false, &err.to_string());
                Err(err)
            }
        }
    }

    async fn probe(&mut self, expect: &Regex, timeout: Duration) -> Result<(), ConnectError> {
        while self.recv.try_recv().is_ok() {}
        self.sender.send("\n".to_string()).await?;
        self.read_until(timeout, |buffer| expect.is_match(buffer))
            .await
            .map(|_| ())
    }

    async fn close(&mut self) -> Result<(), ConnectError> {
        if let Some(recorder) = self.recorder.as_ref() {
            let _ = recorder.record_event(SessionEvent::ConnectionClosed {
                device_addr: Some(self.device_addr.clone()),
                reason: "closed by engine".to_string(),
            });
        }
        self.recv.close();

        if self.is_closed() {
            debug!("{} shell already gone", self.device_addr);
            return Ok(());
        }
        // Give the device a chance to log the logout before the TCP teardown on drop.
        let logout = self.sender.send("exit\n".to_string()).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        logout?;
        debug!("{} logged out", self.device_addr);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.client.is_closed() || self.io_closed.load(Ordering::Acquire)
    }
}
