//! HTTP serving: the static frontend plus the `/action` dispatch endpoint.

mod action;

pub use action::{ActionRequest, ActionResponse, dispatch};

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use tower_http::services::ServeDir;
use tracing::info;

use crate::app::AppContext;

/// Builds the router: `POST /action` for the frontend protocol, everything
/// else served from the static html directory.
pub fn router(ctx: Arc<AppContext>, html_dir: &Path) -> Router {
    Router::new()
        .route("/action", post(handle_action))
        .fallback_service(ServeDir::new(html_dir))
        .with_state(ctx)
}

async fn handle_action(
    State(ctx): State<Arc<AppContext>>,
    Json(request): Json<ActionRequest>,
) -> Json<ActionResponse> {
    Json(dispatch(&ctx, request).await)
}

/// Binds and serves until ctrl-c.
///
/// # Errors
///
/// Returns an error when the listener cannot bind or the server fails.
pub async fn run(ctx: Arc<AppContext>, addr: SocketAddr, html_dir: &Path) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind failed: {addr}"))?;
    info!("Listening on http://{addr}/");

    axum::serve(listener, router(ctx, html_dir))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("server failed")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tower::ServiceExt;

    #[tokio::test]
    async fn action_route_answers_envelopes() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Arc::new(AppContext::new(dir.path()));
        let app = router(ctx, dir.path());

        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/action")
            .header("content-type", "application/json")
            .body(axum::body::Body::from(
                r#"{"module":"aria2","action":"getConfig","data":null}"#,
            ))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        let envelope: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(envelope["module"], "aria2");
        assert_eq!(envelope["err"], "");
    }
}
