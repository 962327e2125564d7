//! Session state machine.
//!
//! [`transition`] is a pure function over the session record. The
//! [`EventReducer`] task is the single consumer of transport events: it
//! renders scan codes outside the lock, applies the transition as a whole
//! record replace, then runs the resulting effect.

use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::state::{LoginArtifact, Phase, SessionState, SessionStore};
use super::supervisor::{ReconnectHandle, ReconnectReason};
use crate::transport::{EventReceiver, TransportEvent};
use crate::ui::qr::{render_terminal, ArtifactRenderer};

/// Input to the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionInput {
    /// New scan code; `None` when rendering failed.
    ScanCode(Option<LoginArtifact>),
    Authenticated,
    Ready(Option<Value>),
    AuthFailure(String),
    Disconnected(String),
    /// Local logout succeeded.
    LoggedOut,
}

/// Follow-up work requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Reconnect(ReconnectReason),
}

pub fn transition(state: &SessionState, input: SessionInput) -> (SessionState, Option<Effect>) {
    match input {
        SessionInput::ScanCode(artifact) => (
            SessionState {
                phase: Phase::AwaitingScan,
                login_artifact: artifact,
                ..state.clone()
            },
            None,
        ),
        // Already past authentication; a late duplicate changes nothing
        SessionInput::Authenticated if state.phase == Phase::Ready => (state.clone(), None),
        SessionInput::Authenticated => (
            SessionState {
                phase: Phase::Authenticated,
                login_artifact: None,
                ..state.clone()
            },
            None,
        ),
        SessionInput::Ready(info) => (
            SessionState {
                phase: Phase::Ready,
                login_artifact: None,
                client_info: info.or_else(|| state.client_info.clone()),
                last_failure: None,
            },
            None,
        ),
        SessionInput::AuthFailure(reason) => (
            SessionState {
                phase: Phase::AuthFailed,
                login_artifact: None,
                last_failure: Some(reason),
                ..state.clone()
            },
            None,
        ),
        SessionInput::Disconnected(reason) => (
            SessionState {
                phase: Phase::Disconnected,
                login_artifact: None,
                last_failure: Some(reason.clone()),
                ..state.clone()
            },
            Some(Effect::Reconnect(ReconnectReason::Disconnected(reason))),
        ),
        SessionInput::LoggedOut => (
            SessionState {
                phase: Phase::Disconnected,
                login_artifact: None,
                client_info: None,
                last_failure: None,
            },
            Some(Effect::Reconnect(ReconnectReason::Logout)),
        ),
    }
}

/// Apply one input to the store and run its effect. Returns the new phase.
pub(crate) fn apply_input(
    store: &SessionStore,
    reconnect: &ReconnectHandle,
    input: SessionInput,
) -> Phase {
    let (phase, effect) = store.update(|current| {
        let (next, effect) = transition(current, input);
        let phase = next.phase;
        (next, (phase, effect))
    });

    if let Some(Effect::Reconnect(reason)) = effect {
        reconnect.request(reason);
    }
    phase
}

/// Single writer of session state for transport events.
pub struct EventReducer {
    store: SessionStore,
    renderer: Arc<dyn ArtifactRenderer>,
    reconnect: ReconnectHandle,
    print_qr: bool,
}

impl EventReducer {
    pub fn new(
        store: SessionStore,
        renderer: Arc<dyn ArtifactRenderer>,
        reconnect: ReconnectHandle,
        print_qr: bool,
    ) -> Self {
        Self {
            store,
            renderer,
            reconnect,
            print_qr,
        }
    }

    pub fn spawn(self, events: EventReceiver, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(events, cancel))
    }

    /// Consume events in emission order until the channel closes or `cancel` fires.
    pub async fn run(self, mut events: EventReceiver, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = events.recv() => match next {
                    Some(event) => {
                        self.apply(event);
                    }
                    None => {
                        debug!("Transport event channel closed");
                        break;
                    }
                },
            }
        }
        debug!("Event reducer stopped");
    }

    pub fn apply(&self, event: TransportEvent) -> Phase {
        let name = event.name();
        let input = self.to_input(event);
        let phase = apply_input(&self.store, &self.reconnect, input);
        debug!("Applied {} event, phase is now {}", name, phase);
        phase
    }

    fn to_input(&self, event: TransportEvent) -> SessionInput {
        match event {
            TransportEvent::ScanCode(raw) => {
                if self.print_qr {
                    if let Some(qr) = render_terminal(&raw) {
                        println!("Scan this code to log in:\n{qr}");
                    }
                }
                match self.renderer.render(&raw) {
                    Ok(artifact) => {
                        info!("New login code available");
                        SessionInput::ScanCode(Some(artifact))
                    }
                    Err(e) => {
                        warn!("Failed to render login code: {}", e);
                        SessionInput::ScanCode(None)
                    }
                }
            }
            TransportEvent::Authenticated => {
                info!("Session authenticated");
                SessionInput::Authenticated
            }
            TransportEvent::Ready(info) => {
                info!("Session READY");
                SessionInput::Ready(info)
            }
            TransportEvent::AuthFailure(reason) => {
                error!("Auth failure: {}", reason);
                SessionInput::AuthFailure(reason)
            }
            TransportEvent::Disconnected(reason) => {
                warn!("Disconnected: {}", reason);
                SessionInput::Disconnected(reason)
            }
        }
    }
}
