//! HTTP listener.
//!
//! Receives GENA `NOTIFY` callbacks from the speakers and exposes a small
//! read-only status surface. Handlers are thin and delegate to services.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::context::NetworkContext;
use crate::error::ErrorCode;
use crate::services::{CommandRouter, DiscoveryService, TopologyStore};

pub mod http;

/// Errors returned to the HTTP peer.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed request (missing required header, unreadable body).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Header present but wrong, or the subscription is not ours.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),
}

impl ErrorCode for ApiError {
    fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::PreconditionFailed(_) => "precondition_failed",
            Self::PayloadTooLarge(_) => "payload_too_large",
            Self::MethodNotAllowed(_) => "method_not_allowed",
        }
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::PreconditionFailed(_) => StatusCode::PRECONDITION_FAILED,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Shared state for the listener's handlers.
#[derive(Clone)]
pub struct AppState {
    pub discovery_service: Arc<DiscoveryService>,
    pub router: Arc<CommandRouter>,
    pub topology: Arc<TopologyStore>,
    pub network: NetworkContext,
}

/// Binds the listener on all interfaces. Port 0 picks an ephemeral port.
///
/// # Errors
/// The bind error, unchanged.
pub async fn bind_listener(port: u16) -> std::io::Result<tokio::net::TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tokio::net::TcpListener::bind(addr).await
}

/// Serves the listener until `cancel` fires.
///
/// Publishes the bound port to the [`NetworkContext`] first so that the
/// callback URL is valid before any subscription goes out.
///
/// # Errors
/// Errors from reading the bound address or from the server itself.
pub async fn serve(
    listener: tokio::net::TcpListener,
    state: AppState,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let port = listener.local_addr()?.port();
    state.network.set_port(port);
    log::info!(
        "[Listener] Listening on 0.0.0.0:{} (callback {})",
        port,
        state.network.gena_callback_url()
    );

    let app = http::create_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
}
