//! Transport collaborator: the component that owns the messaging connection.
//!
//! Lifecycle events flow out over an ordered channel; commands flow in
//! through the [`Transport`] trait.

pub mod sidecar;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

pub use sidecar::SidecarTransport;

/// Lifecycle events, delivered in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Raw scan-code payload that must be rendered for a human.
    ScanCode(String),
    Authenticated,
    /// Session usable; carries identity metadata when the transport has it.
    Ready(Option<Value>),
    AuthFailure(String),
    Disconnected(String),
}

impl TransportEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TransportEvent::ScanCode(_) => "qr",
            TransportEvent::Authenticated => "authenticated",
            TransportEvent::Ready(_) => "ready",
            TransportEvent::AuthFailure(_) => "auth_failure",
            TransportEvent::Disconnected(_) => "disconnected",
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<TransportEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Ordered event channel; the producer side never blocks.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Delivery acknowledgment returned by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport rejected request: {0}")]
    Rejected(String),
    #[error("transport connection closed")]
    Closed,
    #[error("transport request timed out")]
    Timeout,
    #[error("failed to start transport driver: {0}")]
    Spawn(String),
    #[error("transport I/O error: {0}")]
    Io(String),
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Start (or restart) the connection. Progress is reported as events.
    async fn initialize(&self) -> Result<(), TransportError>;

    /// Send `text` to a fully-qualified transport address.
    async fn send_message(&self, address: &str, text: &str) -> Result<MessageId, TransportError>;

    async fn logout(&self) -> Result<(), TransportError>;
}
