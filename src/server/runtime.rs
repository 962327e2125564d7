//! Runtime lifecycle: wire the session core, start the server, and shutdown.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::common::config::AppConfig;
use crate::server::rate_limit::RateLimiter;
use crate::server::{routes, BridgeState};
use crate::session::{ReconnectReason, SessionRuntime};
use crate::transport::{self, SidecarTransport, Transport};
use crate::ui::qr::{ArtifactRenderer, QrDataUrlRenderer};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Starts an Axum server on `addr` and returns `(bound_port, handle)`.
pub async fn start_local_server(
    app: axum::Router,
    addr: SocketAddr,
) -> Result<(u16, axum_server::Handle)> {
    let listener = std::net::TcpListener::bind(addr).with_context(|| {
        format!(
            "Failed to bind to {addr} - port already in use.\n\n\
             Is another wa-bridge instance running?\n\
             Or is another service using this port?"
        )
    })?;

    listener
        .set_nonblocking(true)
        .context("Failed to set listener to non-blocking mode")?;

    let port = listener.local_addr()?.port();

    // Spawn HTTP server in background
    let server_handle = axum_server::Handle::new();
    let server_handle_clone = server_handle.clone();

    tokio::spawn(async move {
        if let Err(e) = axum_server::from_tcp(listener)
            .handle(server_handle_clone)
            .serve(app.into_make_service_with_connect_info::<SocketAddr>())
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((port, server_handle))
}

/// Periodically forget rate-limit windows that have ended.
fn spawn_limiter_pruning(limiter: Arc<RateLimiter>, cancel: CancellationToken) -> JoinHandle<()> {
    let period = limiter.window().max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => limiter.prune(Instant::now()),
            }
        }
    })
}

/// Run the bridge until Ctrl+C.
pub async fn run(config: AppConfig) -> Result<()> {
    let root_token = CancellationToken::new();

    let (event_sender, event_receiver) = transport::event_channel();
    let sidecar = Arc::new(SidecarTransport::new(config.transport.clone(), event_sender));
    let transport: Arc<dyn Transport> = sidecar.clone();
    let renderer: Arc<dyn ArtifactRenderer> = Arc::new(QrDataUrlRenderer::default());

    let session = SessionRuntime::spawn(
        transport.clone(),
        event_receiver,
        renderer,
        config.display.print_qr,
        root_token.child_token(),
    );
    let state = BridgeState::new(
        session.store.clone(),
        transport,
        session.reconnect.clone(),
        config.messages.clone(),
    );

    let limiter = Arc::new(RateLimiter::new(&config.rate_limit));
    let pruning = spawn_limiter_pruning(limiter.clone(), root_token.child_token());
    let app = routes::create_router(&state, limiter, config.body_limit_bytes);

    let (port, server_handle) = start_local_server(app, config.bind_addr()).await?;
    tracing::info!("Bridge UP on :{}", port);

    session.reconnect.request(ReconnectReason::Startup);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    tracing::info!("Ctrl+C received - initiating graceful shutdown");

    shutdown(server_handle, root_token, session, sidecar, pruning).await;
    Ok(())
}

//==========
// SHUTDOWN
//==========

/// Stop accepting connections, stop background tasks, then the driver.
async fn shutdown(
    server_handle: axum_server::Handle,
    root_token: CancellationToken,
    session: SessionRuntime,
    sidecar: Arc<SidecarTransport>,
    pruning: JoinHandle<()>,
) {
    server_handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
    tracing::info!("Server stopped accepting new connections");

    // Reducer and supervisor stop first so the driver exit does not
    // trigger a reconnect
    root_token.cancel();
    session.join().await;
    let _ = pruning.await;

    sidecar.shutdown().await;
    tracing::info!("Server shutdown complete");
}
