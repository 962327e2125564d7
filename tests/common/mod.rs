#![allow(dead_code)]

pub mod config_test_utils;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request},
    Router,
};
use http_body_util::BodyExt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wa_bridge::common::config::{MessageSettings, RateLimitSettings, DEFAULT_BODY_LIMIT_BYTES};
use wa_bridge::server::rate_limit::RateLimiter;
use wa_bridge::server::{routes, BridgeState};
use wa_bridge::session::{LoginArtifact, SessionRuntime, SessionStore};
use wa_bridge::transport::{
    event_channel, EventSender, MessageId, Transport, TransportError, TransportEvent,
};
use wa_bridge::ui::qr::{ArtifactRenderer, RenderError};

//===============
// Fake transport
//===============

/// In-memory transport recording every call.
#[derive(Default)]
pub struct FakeTransport {
    pub init_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub sent: Mutex<Vec<(String, String)>>,
    pub fail_init: AtomicBool,
    pub fail_send: AtomicBool,
    pub fail_logout: AtomicBool,
}

impl FakeTransport {
    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().expect("sent lock").clone()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn initialize(&self) -> Result<(), TransportError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_init.load(Ordering::SeqCst) {
            return Err(TransportError::Rejected("browser failed to launch".to_string()));
        }
        Ok(())
    }

    async fn send_message(&self, address: &str, text: &str) -> Result<MessageId, TransportError> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(TransportError::Rejected("Evaluation failed".to_string()));
        }
        let mut sent = self.sent.lock().expect("sent lock");
        sent.push((address.to_string(), text.to_string()));
        Ok(MessageId::new(format!("msg-{}", sent.len())))
    }

    async fn logout(&self) -> Result<(), TransportError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_logout.load(Ordering::SeqCst) {
            return Err(TransportError::Rejected("not logged in".to_string()));
        }
        Ok(())
    }
}

//===============
// Renderers
//===============

/// Deterministic renderer: `rendered:<raw>`.
pub struct EchoRenderer;

impl ArtifactRenderer for EchoRenderer {
    fn render(&self, raw: &str) -> Result<LoginArtifact, RenderError> {
        if raw.is_empty() {
            return Err(RenderError::Empty);
        }
        Ok(LoginArtifact::new(format!("rendered:{raw}")))
    }
}

//===============
// Harness
//===============

/// Session core running against a [`FakeTransport`].
pub struct Harness {
    pub transport: Arc<FakeTransport>,
    pub events: EventSender,
    pub state: BridgeState,
    pub cancel: CancellationToken,
    runtime: Option<SessionRuntime>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_renderer(Arc::new(EchoRenderer))
    }

    pub fn with_renderer(renderer: Arc<dyn ArtifactRenderer>) -> Self {
        let transport = Arc::new(FakeTransport::default());
        let (events, receiver) = event_channel();
        let cancel = CancellationToken::new();

        let runtime = SessionRuntime::spawn(
            transport.clone(),
            receiver,
            renderer,
            false,
            cancel.clone(),
        );
        let state = BridgeState::new(
            runtime.store.clone(),
            transport.clone(),
            runtime.reconnect.clone(),
            MessageSettings::default(),
        );

        Self {
            transport,
            events,
            state,
            cancel,
            runtime: Some(runtime),
        }
    }

    pub fn store(&self) -> &SessionStore {
        self.state.session()
    }

    /// Emit one event and wait until the reducer has applied it.
    pub async fn emit(&self, event: TransportEvent) {
        let target = self.store().revision() + 1;
        self.events.send(event).expect("reducer running");
        wait_for_revision(self.store(), target).await;
    }

    /// Emit several events back to back, then wait for all of them.
    pub async fn emit_all(&self, events: Vec<TransportEvent>) {
        let target = self.store().revision() + events.len() as u64;
        for event in events {
            self.events.send(event).expect("reducer running");
        }
        wait_for_revision(self.store(), target).await;
    }

    pub async fn make_ready(&self) {
        self.emit_all(vec![
            TransportEvent::ScanCode("2@raw".to_string()),
            TransportEvent::Authenticated,
            TransportEvent::Ready(Some(serde_json::json!({"pushname": "Ana"}))),
        ])
        .await;
    }

    pub fn router(&self) -> Router {
        self.router_with_limit(RateLimitSettings::default())
    }

    pub fn router_with_limit(&self, limits: RateLimitSettings) -> Router {
        routes::create_router(
            &self.state,
            Arc::new(RateLimiter::new(&limits)),
            DEFAULT_BODY_LIMIT_BYTES,
        )
    }

    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(runtime) = self.runtime.take() {
            runtime.join().await;
        }
    }
}

pub async fn wait_for_revision(store: &SessionStore, target: u64) {
    let mut revisions = store.subscribe();
    tokio::time::timeout(Duration::from_secs(2), revisions.wait_for(|r| *r >= target))
        .await
        .expect("reducer applied events in time")
        .expect("store alive");
}

/// Poll `condition` until it holds (2s limit).
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition reached in time");
}

//===============
// HTTP helpers
//===============

pub fn build_get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .expect("Failed to build request")
}

pub fn build_post_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .body(Body::empty())
        .expect("Failed to build request")
}

pub fn build_json_request(uri: &str, json: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::to_vec(&json).expect("Failed to serialize JSON"),
        ))
        .expect("Failed to build request")
}

pub async fn extract_json(response: axum::response::Response) -> serde_json::Value {
    let body_bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to collect body")
        .to_bytes();
    serde_json::from_slice(&body_bytes).expect("Failed to parse JSON")
}
