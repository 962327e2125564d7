//! Session record shared between the event reducer and request handlers.
//!
//! Every write replaces the whole record under one lock, so readers always
//! see a complete snapshot.

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, RwLock};
use tokio::sync::watch;

/// Lifecycle phase of the transport session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
pub enum Phase {
    #[default]
    #[serde(rename = "booting")]
    Booting,
    #[serde(rename = "qr")]
    AwaitingScan,
    #[serde(rename = "authenticated")]
    Authenticated,
    #[serde(rename = "ready")]
    Ready,
    #[serde(rename = "auth_failure")]
    AuthFailed,
    #[serde(rename = "disconnected")]
    Disconnected,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Booting,
        Phase::AwaitingScan,
        Phase::Authenticated,
        Phase::Ready,
        Phase::AuthFailed,
        Phase::Disconnected,
    ];

    /// Wire name used in JSON responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Booting => "booting",
            Phase::AwaitingScan => "qr",
            Phase::Authenticated => "authenticated",
            Phase::Ready => "ready",
            Phase::AuthFailed => "auth_failure",
            Phase::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rendered scan code handed to callers (a data URL).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct LoginArtifact(String);

impl LoginArtifact {
    pub fn new(rendered: impl Into<String>) -> Self {
        Self(rendered.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Current lifecycle state of the bridge.
///
/// Readiness is derived from the phase, so a stale "ready" flag after a
/// disconnect cannot exist.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub(super) phase: Phase,
    pub(super) login_artifact: Option<LoginArtifact>,
    pub(super) client_info: Option<Value>,
    pub(super) last_failure: Option<String>,
}

impl SessionState {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Sole gate for sending messages.
    pub fn ready(&self) -> bool {
        self.phase == Phase::Ready
    }

    pub fn login_artifact(&self) -> Option<&LoginArtifact> {
        self.login_artifact.as_ref()
    }

    pub fn client_info(&self) -> Option<&Value> {
        self.client_info.as_ref()
    }

    /// Reason attached to the most recent auth failure or disconnect.
    pub fn last_failure(&self) -> Option<&str> {
        self.last_failure.as_deref()
    }
}

/// Process-wide handle to the session record.
///
/// Cloning is shallow; all clones share the same record.
#[derive(Clone)]
pub struct SessionStore {
    state: Arc<RwLock<SessionState>>,
    revision: Arc<watch::Sender<u64>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            state: Arc::new(RwLock::new(SessionState::default())),
            revision: Arc::new(revision),
        }
    }

    /// Consistent copy of the whole record.
    pub fn snapshot(&self) -> SessionState {
        let state = match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("Session lock poisoned during snapshot, recovering");
                poisoned.into_inner()
            }
        };
        state.clone()
    }

    /// Replace the record with the value computed from the current one.
    ///
    /// The write lock is held for the whole computation, so concurrent
    /// updates are serialized. `f` must not block.
    pub(crate) fn update<R>(&self, f: impl FnOnce(&SessionState) -> (SessionState, R)) -> R {
        let mut state = match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("Session lock poisoned during update, recovering");
                poisoned.into_inner()
            }
        };
        let (next, output) = f(&state);
        *state = next;
        drop(state);

        self.revision.send_modify(|r| *r += 1);
        output
    }

    /// Number of updates applied since start.
    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// Watch the update counter (one tick per applied input).
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }
}
