//! HTTP route handlers.
//!
//! All handlers are thin - they delegate to services for business logic.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request, StatusCode},
    response::IntoResponse,
    routing::{any, get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::api::{ApiError, ApiResult, AppState};
use crate::protocol_constants::{APP_NAME, GENA_CALLBACK_PATH, MAX_GENA_BODY_SIZE};
use crate::sonos::gena::NotifyError;

// ─────────────────────────────────────────────────────────────────────────────
// GENA Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Validates required GENA headers and extracts SID and SEQ values.
///
/// Missing `NT`/`NTS` is a bad request; wrong values and a missing `SID`
/// are precondition failures, as UPnP eventing prescribes.
fn validate_gena_headers(headers: &HeaderMap) -> ApiResult<(String, Option<u32>)> {
    let header_str = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    match (header_str("NT"), header_str("NTS")) {
        (None, _) | (_, None) => {
            log::warn!("[GENA] NOTIFY missing NT or NTS header");
            return Err(ApiError::BadRequest("missing NT or NTS header".into()));
        }
        (Some("upnp:event"), Some("upnp:propchange")) => {}
        (nt, nts) => {
            log::warn!("[GENA] NOTIFY with NT {:?}, NTS {:?}", nt, nts);
            return Err(ApiError::PreconditionFailed(
                "invalid NT or NTS header".into(),
            ));
        }
    }

    let sid = match header_str("SID") {
        Some(s) if !s.trim().is_empty() => s.trim().to_string(),
        _ => {
            log::warn!("[GENA] NOTIFY missing SID header");
            return Err(ApiError::PreconditionFailed("missing SID header".into()));
        }
    };

    let seq = match header_str("SEQ") {
        None => None,
        Some(raw) => Some(
            raw.trim()
                .parse::<u32>()
                .map_err(|_| ApiError::BadRequest(format!("invalid SEQ header: {raw}")))?,
        ),
    };

    Ok((sid, seq))
}

fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Creates the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/state", get(get_current_state))
        .route("/api/refresh", post(handle_refresh))
        .route(GENA_CALLBACK_PATH, any(handle_gena_notify))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": APP_NAME,
        "port": state.network.get_port(),
        "devices": state.topology.snapshot().devices.len(),
    }))
}

/// Controller state plus the current topology snapshot.
async fn get_current_state(State(state): State<AppState>) -> impl IntoResponse {
    let topology = state.topology.snapshot();
    Json(json!({
        "controller": state.router.snapshot(),
        "topology": &*topology,
    }))
}

async fn handle_refresh(State(state): State<AppState>) -> impl IntoResponse {
    state.discovery_service.trigger_refresh();
    StatusCode::ACCEPTED
}

async fn handle_gena_notify(
    State(state): State<AppState>,
    req: Request<Body>,
) -> ApiResult<StatusCode> {
    let (parts, body) = req.into_parts();

    // Only accept NOTIFY method (used by UPnP/GENA)
    if parts.method.as_str() != "NOTIFY" {
        return Err(ApiError::MethodNotAllowed(parts.method.to_string()));
    }

    let (sid, seq) = validate_gena_headers(&parts.headers)?;

    if content_length(&parts.headers).is_some_and(|len| len > MAX_GENA_BODY_SIZE) {
        return Err(ApiError::PayloadTooLarge(MAX_GENA_BODY_SIZE));
    }
    let body_bytes = axum::body::to_bytes(body, MAX_GENA_BODY_SIZE)
        .await
        .map_err(|e| {
            log::warn!("[GENA] Failed to read NOTIFY body: {}", e);
            ApiError::BadRequest("failed to read body".into())
        })?;

    match state
        .discovery_service
        .handle_gena_notify(&sid, seq, &String::from_utf8_lossy(&body_bytes))
    {
        Ok(events) => {
            log::debug!(
                "[GENA] NOTIFY {} (SEQ {:?}): {} event(s)",
                sid,
                seq,
                events.len()
            );
            Ok(StatusCode::OK)
        }
        Err(NotifyError::UnknownSid(sid)) => {
            log::debug!("[GENA] NOTIFY for unknown SID {}", sid);
            Err(ApiError::PreconditionFailed(format!(
                "unknown subscription {sid}"
            )))
        }
    }
}
