mod common;

use common::{wait_until, Harness};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use wa_bridge::common::BridgeError;
use wa_bridge::session::{LoginArtifact, Phase, ReconnectReason};
use wa_bridge::transport::TransportEvent;
use wa_bridge::ui::qr::{ArtifactRenderer, RenderError};

struct FailingRenderer;

impl ArtifactRenderer for FailingRenderer {
    fn render(&self, _raw: &str) -> Result<LoginArtifact, RenderError> {
        Err(RenderError::Empty)
    }
}

fn qr(raw: &str) -> TransportEvent {
    TransportEvent::ScanCode(raw.to_string())
}

#[tokio::test]
async fn fresh_session_is_booting_and_not_ready() {
    let harness = Harness::new();

    let status = harness.state.status();
    assert_eq!(status.phase(), Phase::Booting);
    assert!(!status.ready());
    assert_eq!(harness.store().revision(), 0);
    assert_eq!(harness.transport.init_calls(), 0);

    harness.shutdown().await;
}

#[tokio::test]
async fn full_login_flow_reaches_ready() {
    let harness = Harness::new();

    harness.emit(qr("2@abc")).await;
    let status = harness.state.status();
    assert_eq!(status.phase(), Phase::AwaitingScan);
    assert_eq!(
        status.login_artifact().map(LoginArtifact::as_str),
        Some("rendered:2@abc")
    );

    harness.emit(TransportEvent::Authenticated).await;
    let status = harness.state.status();
    assert_eq!(status.phase(), Phase::Authenticated);
    assert!(!status.ready());
    assert!(status.login_artifact().is_none());

    harness
        .emit(TransportEvent::Ready(Some(json!({"pushname": "Ana"}))))
        .await;
    let status = harness.state.status();
    assert_eq!(status.phase(), Phase::Ready);
    assert!(status.ready());
    assert_eq!(harness.state.account_info(), Some(json!({"pushname": "Ana"})));

    harness.shutdown().await;
}

#[tokio::test]
async fn newer_scan_code_replaces_older_one() {
    let harness = Harness::new();

    harness.emit_all(vec![qr("first"), qr("second")]).await;

    let artifact = harness.state.login_artifact().expect("artifact present");
    assert_eq!(artifact.as_str(), "rendered:second");

    harness.shutdown().await;
}

#[tokio::test]
async fn render_failure_leaves_no_artifact() {
    let harness = Harness::with_renderer(Arc::new(FailingRenderer));

    harness.emit(qr("2@abc")).await;

    assert_eq!(harness.state.status().phase(), Phase::AwaitingScan);
    let err = harness.state.login_artifact().expect_err("nothing to show");
    assert!(matches!(err, BridgeError::NoArtifactAvailable(Phase::AwaitingScan)));

    harness.shutdown().await;
}

#[tokio::test]
async fn disconnect_requests_exactly_one_reconnect() {
    let harness = Harness::new();
    harness.make_ready().await;

    harness
        .emit(TransportEvent::Disconnected("NAVIGATION".to_string()))
        .await;

    let status = harness.state.status();
    assert_eq!(status.phase(), Phase::Disconnected);
    assert!(!status.ready());
    assert_eq!(status.last_failure(), Some("NAVIGATION"));

    let transport = harness.transport.clone();
    wait_until(|| transport.init_calls() == 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.transport.init_calls(), 1);
    assert_eq!(harness.state.reconnect().stats().requested(), 1);

    harness.shutdown().await;
}

#[tokio::test]
async fn disconnect_keeps_client_info_until_logout() {
    let harness = Harness::new();
    harness.make_ready().await;

    harness
        .emit(TransportEvent::Disconnected("CONFLICT".to_string()))
        .await;
    assert_eq!(harness.state.account_info(), Some(json!({"pushname": "Ana"})));

    harness.emit(TransportEvent::Ready(None)).await;
    assert!(harness.state.status().ready());
    assert_eq!(harness.state.account_info(), Some(json!({"pushname": "Ana"})));

    harness.shutdown().await;
}

#[tokio::test]
async fn auth_failure_is_not_ready_and_not_retried() {
    let harness = Harness::new();

    harness.emit(qr("2@abc")).await;
    harness
        .emit(TransportEvent::AuthFailure("bad session".to_string()))
        .await;

    let status = harness.state.status();
    assert_eq!(status.phase(), Phase::AuthFailed);
    assert!(!status.ready());
    assert_eq!(status.last_failure(), Some("bad session"));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.transport.init_calls(), 0);

    harness.shutdown().await;
}

#[tokio::test]
async fn late_authenticated_does_not_demote_ready_session() {
    let harness = Harness::new();
    harness.make_ready().await;

    harness.emit(TransportEvent::Authenticated).await;

    assert_eq!(harness.state.status().phase(), Phase::Ready);

    harness.shutdown().await;
}

#[tokio::test]
async fn successful_logout_resets_session_and_reinitializes_once() {
    let harness = Harness::new();
    harness.make_ready().await;

    harness.state.logout().await.expect("logout succeeds");

    let status = harness.state.status();
    assert_eq!(status.phase(), Phase::Disconnected);
    assert!(!status.ready());
    assert!(harness.state.account_info().is_none());
    assert_eq!(harness.transport.logout_calls(), 1);

    let transport = harness.transport.clone();
    wait_until(|| transport.init_calls() == 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.transport.init_calls(), 1);

    harness.shutdown().await;
}

#[tokio::test]
async fn failed_logout_leaves_session_untouched() {
    let harness = Harness::new();
    harness.make_ready().await;
    harness.transport.fail_logout.store(true, Ordering::SeqCst);
    let before = harness.state.status();

    let err = harness.state.logout().await.expect_err("logout fails");

    assert!(matches!(err, BridgeError::LogoutFailed(_)));
    assert_eq!(harness.state.status(), before);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(harness.transport.init_calls(), 0);

    harness.shutdown().await;
}

#[tokio::test]
async fn failed_initialization_is_recorded_without_touching_state() {
    let harness = Harness::new();
    harness.transport.fail_init.store(true, Ordering::SeqCst);

    harness.state.reconnect().request(ReconnectReason::Startup);

    let reconnect = harness.state.reconnect().clone();
    wait_until(|| reconnect.stats().failures() == 1).await;
    assert_eq!(harness.state.status().phase(), Phase::Booting);
    assert!(reconnect
        .stats()
        .last_error()
        .is_some_and(|e| e.contains("browser failed to launch")));

    harness.shutdown().await;
}

#[tokio::test]
async fn revision_counts_every_applied_event() {
    let harness = Harness::new();

    harness
        .emit_all(vec![
            qr("a"),
            qr("b"),
            TransportEvent::Authenticated,
            TransportEvent::Ready(None),
            TransportEvent::Authenticated,
        ])
        .await;

    assert_eq!(harness.store().revision(), 5);
    assert_eq!(harness.state.status().phase(), Phase::Ready);

    harness.shutdown().await;
}

#[tokio::test]
async fn reducer_stops_on_cancel() {
    let harness = Harness::new();
    let events = harness.events.clone();

    harness.shutdown().await;

    assert!(events.send(TransportEvent::Authenticated).is_err());
}

#[cfg(unix)]
#[tokio::test]
async fn crashing_driver_keeps_being_reinitialized() {
    use tokio_util::sync::CancellationToken;
    use wa_bridge::common::config::TransportSettings;
    use wa_bridge::session::SessionRuntime;
    use wa_bridge::transport::{event_channel, SidecarTransport};
    use wa_bridge::ui::qr::QrDataUrlRenderer;

    let (events, receiver) = event_channel();
    let sidecar = Arc::new(SidecarTransport::new(
        TransportSettings {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), "read line; exit 1".to_string()],
            request_timeout_secs: 30,
            ..TransportSettings::default()
        },
        events,
    ));
    let cancel = CancellationToken::new();
    let runtime = SessionRuntime::spawn(
        sidecar.clone(),
        receiver,
        Arc::new(QrDataUrlRenderer::default()),
        false,
        cancel.clone(),
    );

    runtime.reconnect.request(ReconnectReason::Startup);

    let reconnect = runtime.reconnect.clone();
    tokio::time::timeout(Duration::from_secs(10), async {
        while reconnect.stats().attempts() < 3 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("every driver exit leads to a fresh attempt");

    assert_eq!(runtime.store.snapshot().phase(), Phase::Disconnected);
    assert!(reconnect
        .stats()
        .last_error()
        .is_some_and(|e| !e.contains("timed out")));

    cancel.cancel();
    runtime.join().await;
    sidecar.shutdown().await;
}
