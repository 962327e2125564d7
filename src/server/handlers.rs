//! HTTP handlers: thin JSON adapters over [`BridgeState`] operations.

use axum::body::Bytes;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::common::BridgeError;
use crate::server::BridgeState;
use crate::SERVICE_NAME;

/// `POST /send` body. Fields may be strings or numbers.
#[derive(Debug, Default, Deserialize)]
pub struct SendRequest {
    #[serde(default)]
    pub to: Option<Value>,
    #[serde(default)]
    pub message: Option<Value>,
}

impl SendRequest {
    /// Lenient parse: a missing or malformed body is an empty request.
    pub fn from_body(body: &[u8]) -> Self {
        serde_json::from_slice(body).unwrap_or_default()
    }
}

/// Text form of a body field. Falsy values (`false`, `0`) read as empty.
fn field_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) if n.as_f64() == Some(0.0) => String::new(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(true)) => "true".to_string(),
        _ => String::new(),
    }
}

pub async fn root(State(state): State<BridgeState>) -> Json<Value> {
    let snapshot = state.status();
    Json(json!({
        "ok": true,
        "service": SERVICE_NAME,
        "state": snapshot.phase(),
        "logged": snapshot.ready(),
    }))
}

pub async fn status(State(state): State<BridgeState>) -> Json<Value> {
    let snapshot = state.status();
    let mut body = json!({
        "ok": true,
        "state": snapshot.phase(),
        "logged": snapshot.ready(),
    });
    if let Some(reason) = snapshot.last_failure() {
        body["reason"] = Value::String(reason.to_string());
    }
    Json(body)
}

pub async fn qr(State(state): State<BridgeState>) -> Response {
    match state.login_artifact() {
        Ok(artifact) => Json(json!({ "ok": true, "qr": artifact })).into_response(),
        Err(BridgeError::AlreadyAuthenticated) => Json(json!({
            "ok": true,
            "qr": null,
            "note": "already_logged",
        }))
        .into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn about(State(state): State<BridgeState>) -> Json<Value> {
    Json(json!({
        "ok": true,
        "clientInfo": state.account_info(),
    }))
}

pub async fn send(
    State(state): State<BridgeState>,
    body: Bytes,
) -> Result<Json<Value>, BridgeError> {
    let request = SendRequest::from_body(&body);
    let to = field_text(request.to.as_ref());
    let message = field_text(request.message.as_ref());

    match state.send_message(&to, &message).await {
        Ok(msg_id) => Ok(Json(json!({ "ok": true, "msgId": msg_id }))),
        Err(e) => {
            if matches!(e, BridgeError::SendFailed(_)) {
                tracing::error!("Send error: {}", e);
            } else {
                tracing::debug!("Send rejected: {}", e);
            }
            Err(e)
        }
    }
}

pub async fn logout(State(state): State<BridgeState>) -> Result<Json<Value>, BridgeError> {
    state.logout().await.map_err(|e| {
        tracing::error!("Logout error: {}", e);
        e
    })?;
    tracing::info!("Logged out, re-initializing transport");
    Ok(Json(json!({ "ok": true })))
}
