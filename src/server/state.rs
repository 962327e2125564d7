use serde_json::Value;
use std::sync::Arc;

use crate::common::config::MessageSettings;
use crate::common::BridgeError;
use crate::server::recipient::{normalize_recipient, to_address};
use crate::session::reducer::apply_input;
use crate::session::{LoginArtifact, ReconnectHandle, SessionInput, SessionState, SessionStore};
use crate::transport::{MessageId, Transport};

/// Shared state behind every request handler.
///
/// Reads take one snapshot of the session record. Only `send_message` and
/// `logout` call into the transport, and neither holds the session lock
/// while awaiting it.
#[derive(Clone)]
pub struct BridgeState {
    session: SessionStore,
    transport: Arc<dyn Transport>,
    reconnect: ReconnectHandle,
    messages: Arc<MessageSettings>,
}

impl BridgeState {
    pub fn new(
        session: SessionStore,
        transport: Arc<dyn Transport>,
        reconnect: ReconnectHandle,
        messages: MessageSettings,
    ) -> Self {
        Self {
            session,
            transport,
            reconnect,
            messages: Arc::new(messages),
        }
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn reconnect(&self) -> &ReconnectHandle {
        &self.reconnect
    }

    /// Current phase and readiness. Never fails.
    pub fn status(&self) -> SessionState {
        self.session.snapshot()
    }

    pub fn login_artifact(&self) -> Result<LoginArtifact, BridgeError> {
        let snapshot = self.session.snapshot();

        if snapshot.ready() {
            return Err(BridgeError::AlreadyAuthenticated);
        }
        snapshot
            .login_artifact()
            .cloned()
            .ok_or(BridgeError::NoArtifactAvailable(snapshot.phase()))
    }

    /// Identity metadata of the logged-in account, if known.
    pub fn account_info(&self) -> Option<Value> {
        self.session.snapshot().client_info().cloned()
    }

    /// Validate and dispatch one message. A failed send leaves the session
    /// untouched.
    pub async fn send_message(&self, to: &str, message: &str) -> Result<MessageId, BridgeError> {
        if !self.session.snapshot().ready() {
            return Err(BridgeError::NotReady);
        }

        let recipient = normalize_recipient(to).ok_or(BridgeError::InvalidRecipient)?;
        let address = to_address(&recipient);
        let text = if message.is_empty() {
            self.messages.default_text.as_str()
        } else {
            message
        };

        self.transport
            .send_message(&address, text)
            .await
            .map_err(BridgeError::SendFailed)
    }

    /// Log the account out; on success the session drops to `Disconnected`
    /// and one re-initialization is requested.
    pub async fn logout(&self) -> Result<(), BridgeError> {
        self.transport
            .logout()
            .await
            .map_err(BridgeError::LogoutFailed)?;

        apply_input(&self.session, &self.reconnect, SessionInput::LoggedOut);
        Ok(())
    }
}
