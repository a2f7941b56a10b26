//! HTTP listener for path-based proofs.
//!
//! Serves `/.well-known/acme-challenge/:token` from a token-keyed
//! [`ChallengeRegistry`]: the raw key authorization as `text/plain` with
//! 200, or 404 when the token is unknown.

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::ChallengeRegistry;

/// Route the ACME server fetches.
pub const CHALLENGE_ROUTE: &str = "/.well-known/acme-challenge/:token";

/// Build the challenge router.
pub fn router(registry: ChallengeRegistry) -> Router {
    Router::new()
        .route(CHALLENGE_ROUTE, get(serve_challenge))
        .with_state(registry)
}

async fn serve_challenge(
    State(registry): State<ChallengeRegistry>,
    Path(token): Path<String>,
) -> Response {
    match registry.lookup(&token) {
        Some(key_auth) => {
            debug!(token = %token, "challenge served");
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/plain")],
                key_auth,
            )
                .into_response()
        }
        None => {
            warn!(token = %token, "challenge token not found");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

/// Serve challenges on `addr` until `shutdown` is cancelled.
pub async fn serve(
    addr: SocketAddr,
    registry: ChallengeRegistry,
    shutdown: CancellationToken,
) -> crate::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| crate::SrvError::Server(format!("failed to bind http {addr}: {e}")))?;
    serve_listener(listener, registry, shutdown).await
}

/// Serve challenges on an already-bound listener until `shutdown` is cancelled.
pub async fn serve_listener(
    listener: TcpListener,
    registry: ChallengeRegistry,
    shutdown: CancellationToken,
) -> crate::Result<()> {
    info!(addr = ?listener.local_addr().ok(), "challenge http listener started");

    axum::serve(listener, router(registry))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| crate::SrvError::Server(format!("http listener failed: {e}")))?;

    info!("challenge http listener stopped");
    Ok(())
}
