//! Sidecar driver process management.
//!
//! The driver owns the real messaging connection and speaks newline-delimited
//! JSON: commands on stdin, responses and lifecycle events on stdout.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{EventSender, MessageId, Transport, TransportError, TransportEvent};
use crate::common::config::TransportSettings;

/// Env var telling the driver where to persist authentication material.
pub const SESSION_DIR_ENV: &str = "WA_BRIDGE_SESSION_DIR";

#[derive(Debug, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum DriverCommand<'a> {
    Initialize,
    Send { to: &'a str, text: &'a str },
    Logout,
}

#[derive(Debug, Serialize)]
struct CommandFrame<'a> {
    id: u64,
    #[serde(flatten)]
    command: DriverCommand<'a>,
}

#[derive(Debug, Deserialize, PartialEq)]
struct ResponseFrame {
    id: u64,
    ok: bool,
    #[serde(default, rename = "msgId")]
    msg_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
enum EventFrame {
    Qr {
        data: String,
    },
    Authenticated,
    Ready {
        #[serde(default)]
        info: Option<Value>,
    },
    AuthFailure {
        #[serde(default)]
        message: String,
    },
    Disconnected {
        #[serde(default)]
        reason: String,
    },
}

impl From<EventFrame> for TransportEvent {
    fn from(frame: EventFrame) -> Self {
        match frame {
            EventFrame::Qr { data } => TransportEvent::ScanCode(data),
            EventFrame::Authenticated => TransportEvent::Authenticated,
            EventFrame::Ready { info } => TransportEvent::Ready(info),
            EventFrame::AuthFailure { message } => TransportEvent::AuthFailure(message),
            EventFrame::Disconnected { reason } => TransportEvent::Disconnected(reason),
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(untagged)]
enum Inbound {
    Response(ResponseFrame),
    Event(EventFrame),
}

fn parse_line(line: &str) -> Option<Inbound> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str(trimmed) {
        Ok(inbound) => Some(inbound),
        Err(e) => {
            warn!("Ignoring unparseable driver line ({}): {}", e, trimmed);
            None
        }
    }
}

type PendingMap = DashMap<u64, oneshot::Sender<ResponseFrame>>;

/// Shortest gap between two driver spawns.
const RESPAWN_MIN_INTERVAL: Duration = Duration::from_secs(1);

/// One spawned driver process and the requests waiting on it.
struct Driver {
    child: Child,
    stdin: ChildStdin,
    pending: Arc<PendingMap>,
    /// Cancelled by the stdout reader once the driver's output has closed.
    output_closed: CancellationToken,
    spawned_at: Instant,
}

impl Driver {
    /// A driver is usable only while its output is open and it has not exited.
    fn is_alive(&mut self) -> bool {
        if self.output_closed.is_cancelled() {
            debug!("Driver output closed");
            return false;
        }
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                info!("Driver exited ({})", status);
                false
            }
            Err(e) => {
                warn!("Failed to poll driver status: {}", e);
                false
            }
        }
    }

    async fn write_line(&mut self, line: &str) -> Result<(), TransportError> {
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}

/// Transport backed by a long-running driver process.
pub struct SidecarTransport {
    settings: TransportSettings,
    events: EventSender,
    next_id: AtomicU64,
    shutting_down: Arc<AtomicBool>,
    driver: Mutex<Option<Driver>>,
}

impl SidecarTransport {
    pub fn new(settings: TransportSettings, events: EventSender) -> Self {
        Self {
            settings,
            events,
            next_id: AtomicU64::new(0),
            shutting_down: Arc::new(AtomicBool::new(false)),
            driver: Mutex::new(None),
        }
    }

    /// Spawn the driver unless a live one is already running.
    async fn ensure_running(&self) -> Result<(), TransportError> {
        let mut guard = self.driver.lock().await;

        let mut last_spawn = None;
        if let Some(driver) = guard.as_mut() {
            if driver.is_alive() {
                return Ok(());
            }
            info!("Respawning transport driver");
            last_spawn = Some(driver.spawned_at);
        }
        // kill_on_drop reaps a driver that is still half alive
        *guard = None;

        if let Some(spawned_at) = last_spawn {
            let wait = RESPAWN_MIN_INTERVAL.saturating_sub(spawned_at.elapsed());
            if !wait.is_zero() {
                debug!("Driver crashed quickly, delaying respawn by {:?}", wait);
                tokio::time::sleep(wait).await;
            }
        }

        *guard = Some(self.spawn_driver()?);
        Ok(())
    }

    fn spawn_driver(&self) -> Result<Driver, TransportError> {
        let mut child = Command::new(&self.settings.command)
            .args(&self.settings.args)
            .env(SESSION_DIR_ENV, &self.settings.session_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                if err.kind() == std::io::ErrorKind::NotFound {
                    TransportError::Spawn(format!(
                        "driver command '{}' not found",
                        self.settings.command
                    ))
                } else {
                    TransportError::Spawn(err.to_string())
                }
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::Spawn("driver stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::Spawn("driver stdout unavailable".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(log_stderr(stderr));
        }

        let pending = Arc::new(PendingMap::new());
        let output_closed = CancellationToken::new();
        tokio::spawn(read_stdout(
            stdout,
            pending.clone(),
            output_closed.clone(),
            self.events.clone(),
            self.shutting_down.clone(),
        ));

        info!(
            "Started transport driver: {} {}",
            self.settings.command,
            self.settings.args.join(" ")
        );

        Ok(Driver {
            child,
            stdin,
            pending,
            output_closed,
            spawned_at: Instant::now(),
        })
    }

    /// Write one command and wait for its correlated response.
    async fn request(&self, command: DriverCommand<'_>) -> Result<ResponseFrame, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut line = serde_json::to_string(&CommandFrame { id, command })
            .map_err(|e| TransportError::Io(e.to_string()))?;
        line.push('\n');

        let (sender, receiver) = oneshot::channel();
        let pending = {
            let mut guard = self.driver.lock().await;
            let driver = guard.as_mut().ok_or(TransportError::Closed)?;

            // Register before the liveness check; the reader closes output
            // before it clears waiters
            driver.pending.insert(id, sender);
            if driver.output_closed.is_cancelled() {
                driver.pending.remove(&id);
                return Err(TransportError::Closed);
            }

            if let Err(e) = driver.write_line(&line).await {
                driver.pending.remove(&id);
                return Err(e);
            }
            driver.pending.clone()
        };

        let frame = match tokio::time::timeout(self.settings.request_timeout(), receiver).await {
            Ok(Ok(frame)) => frame,
            Ok(Err(_)) => return Err(TransportError::Closed),
            Err(_) => {
                pending.remove(&id);
                return Err(TransportError::Timeout);
            }
        };

        if frame.ok {
            Ok(frame)
        } else {
            Err(TransportError::Rejected(
                frame
                    .error
                    .unwrap_or_else(|| "unknown driver error".to_string()),
            ))
        }
    }

    /// Stops the driver process; no disconnect event is emitted for it.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);

        let Some(mut driver) = self.driver.lock().await.take() else {
            return;
        };

        if let Err(e) = driver.child.kill().await {
            // failed kill often means the process is already dead
            warn!("Failed to stop transport driver: {}", e);
            return;
        }

        match tokio::time::timeout(Duration::from_secs(5), driver.child.wait()).await {
            Ok(Ok(status)) => info!("Transport driver exited with status: {}", status),
            Ok(Err(e)) => warn!("Failed to wait for transport driver: {}", e),
            Err(_) => warn!("Transport driver did not exit after 5 seconds, may be stuck"),
        }
    }
}

#[async_trait]
impl Transport for SidecarTransport {
    async fn initialize(&self) -> Result<(), TransportError> {
        self.ensure_running().await?;
        self.request(DriverCommand::Initialize).await.map(|_| ())
    }

    async fn send_message(&self, address: &str, text: &str) -> Result<MessageId, TransportError> {
        let frame = self
            .request(DriverCommand::Send { to: address, text })
            .await?;

        frame
            .msg_id
            .map(MessageId::new)
            .ok_or_else(|| TransportError::Rejected("driver response missing msgId".to_string()))
    }

    async fn logout(&self) -> Result<(), TransportError> {
        self.request(DriverCommand::Logout).await.map(|_| ())
    }
}

/// Route stdout lines: responses to their waiters, events to the reducer.
async fn read_stdout(
    stdout: ChildStdout,
    pending: Arc<PendingMap>,
    output_closed: CancellationToken,
    events: EventSender,
    shutting_down: Arc<AtomicBool>,
) {
    let mut lines = BufReader::new(stdout).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read driver stdout: {}", e);
                break;
            }
        };

        match parse_line(&line) {
            Some(Inbound::Response(frame)) => match pending.remove(&frame.id) {
                Some((_, waiter)) => {
                    // waiter may have timed out already
                    let _ = waiter.send(frame);
                }
                None => debug!("Dropping response for unknown request id {}", frame.id),
            },
            Some(Inbound::Event(frame)) => {
                if events.send(frame.into()).is_err() {
                    debug!("Event receiver dropped, stopping driver reader");
                    break;
                }
            }
            None => {}
        }
    }

    // Mark the driver dead first, then fail in-flight requests with Closed
    output_closed.cancel();
    pending.clear();

    if !shutting_down.load(Ordering::SeqCst) {
        let _ = events.send(TransportEvent::Disconnected(
            "driver process exited".to_string(),
        ));
    }
}

// Driver logs go to stderr
async fn log_stderr(stderr: ChildStderr) {
    let reader = BufReader::new(stderr);
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await.ok().flatten() {
        let lowercase_line = line.to_lowercase();
        if lowercase_line.contains("error") || lowercase_line.contains("fatal") {
            tracing::error!("driver stderr: {}", line);
        } else {
            tracing::debug!("driver stderr: {}", line);
        }
    }
}
