//! Reconnect supervisor: re-initializes the transport after a drop.
//!
//! One request produces exactly one `initialize()` call. Requests are handled
//! serially, so at most one initialization is in flight. Failures are
//! recorded and never retried here; the transport's next event drives the
//! next attempt.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::transport::Transport;

/// Why a (re)initialization was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectReason {
    Startup,
    Disconnected(String),
    Logout,
}

impl fmt::Display for ReconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ReconnectReason::Startup => write!(f, "startup"),
            ReconnectReason::Disconnected(reason) => write!(f, "disconnected: {reason}"),
            ReconnectReason::Logout => write!(f, "logout"),
        }
    }
}

/// Counters for initialization activity.
#[derive(Debug, Default)]
pub struct ReconnectStats {
    requested: AtomicU64,
    attempts: AtomicU64,
    failures: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl ReconnectStats {
    pub fn requested(&self) -> u64 {
        self.requested.load(Ordering::SeqCst)
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::SeqCst)
    }

    pub fn last_error(&self) -> Option<String> {
        match self.last_error.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn record_failure(&self, error: String) {
        self.failures.fetch_add(1, Ordering::SeqCst);
        let mut last = match self.last_error.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("Reconnect stats lock poisoned, recovering");
                poisoned.into_inner()
            }
        };
        *last = Some(error);
    }
}

/// Cheap, cloneable entry point for requesting a reconnect.
#[derive(Clone)]
pub struct ReconnectHandle {
    sender: mpsc::UnboundedSender<ReconnectReason>,
    stats: Arc<ReconnectStats>,
}

impl ReconnectHandle {
    /// Queue one initialization attempt. Never blocks.
    pub fn request(&self, reason: ReconnectReason) {
        self.stats.requested.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(reason).is_err() {
            warn!("Reconnect supervisor stopped; request dropped");
        }
    }

    pub fn stats(&self) -> &ReconnectStats {
        &self.stats
    }
}

pub struct ReconnectSupervisor {
    transport: Arc<dyn Transport>,
    receiver: mpsc::UnboundedReceiver<ReconnectReason>,
    stats: Arc<ReconnectStats>,
}

impl ReconnectSupervisor {
    pub fn new(transport: Arc<dyn Transport>) -> (Self, ReconnectHandle) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let stats = Arc::new(ReconnectStats::default());

        let supervisor = Self {
            transport,
            receiver,
            stats: stats.clone(),
        };
        (supervisor, ReconnectHandle { sender, stats })
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            let reason = tokio::select! {
                _ = cancel.cancelled() => break,
                next = self.receiver.recv() => match next {
                    Some(reason) => reason,
                    None => break,
                },
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.attempt(reason) => {}
            }
        }
        debug!("Reconnect supervisor stopped");
    }

    async fn attempt(&self, reason: ReconnectReason) {
        let attempt = self.stats.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Initializing transport (attempt {}, {})", attempt, reason);

        if let Err(e) = self.transport.initialize().await {
            warn!("Init error ({}): {}", reason, e);
            self.stats.record_failure(e.to_string());
        }
    }
}
