//! Fixed-window request limiting per client address.

use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use dashmap::DashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::common::config::RateLimitSettings;
use crate::common::BridgeError;

#[derive(Debug, Clone, Copy)]
struct WindowCounter {
    started: Instant,
    hits: u32,
}

/// Outcome of counting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_after: Duration,
}

pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    clients: DashMap<IpAddr, WindowCounter>,
}

impl RateLimiter {
    pub fn new(settings: &RateLimitSettings) -> Self {
        Self {
            window: settings.window(),
            max_requests: settings.max_requests,
            clients: DashMap::new(),
        }
    }

    /// Count one request from `client` at `now`.
    pub fn check(&self, client: IpAddr, now: Instant) -> Decision {
        let mut counter = self.clients.entry(client).or_insert(WindowCounter {
            started: now,
            hits: 0,
        });

        if now.duration_since(counter.started) >= self.window {
            *counter = WindowCounter {
                started: now,
                hits: 0,
            };
        }
        counter.hits = counter.hits.saturating_add(1);

        Decision {
            allowed: counter.hits <= self.max_requests,
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(counter.hits),
            reset_after: self
                .window
                .saturating_sub(now.duration_since(counter.started)),
        }
    }

    /// Forget clients whose window has ended.
    pub fn prune(&self, now: Instant) {
        self.clients
            .retain(|_, counter| now.duration_since(counter.started) < self.window);
    }

    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

/// Middleware: reject over-limit callers with 429 and report quota headers.
pub async fn enforce(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    // absent when served without connect info (tests, in-process calls)
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

    let decision = limiter.check(client, Instant::now());

    let mut response = if decision.allowed {
        next.run(request).await
    } else {
        tracing::debug!("Rate limit exceeded for {}", client);
        BridgeError::RateLimited.into_response()
    };

    let reset_secs = decision.reset_after.as_secs_f64().ceil() as u64;
    let headers = response.headers_mut();
    headers.insert("ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("ratelimit-remaining", HeaderValue::from(decision.remaining));
    headers.insert("ratelimit-reset", HeaderValue::from(reset_secs));
    response
}
