//! HTTP search service
//!
//! Routes:
//! - `GET /health` connectivity probe
//! - `POST /multi` and `POST /api/search` multi-query search
//! - `GET /stats` collection statistics
//!
//! Searches are synchronous (model inference, blocking HTTP), so every one
//! runs on the blocking pool under a deadline.

use crate::error::{KbError, Result};
use crate::retrieval::{SearchEngine, SearchRequest, SearchResponse};
use crate::store::{CollectionStats, STATS_SAMPLE};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

#[derive(Clone)]
pub struct AppState {
    engine: Arc<SearchEngine>,
    timeout: Duration,
}

impl AppState {
    pub fn new(engine: Arc<SearchEngine>) -> Self {
        let timeout = Duration::from_secs(engine.config().timeout_secs);
        Self { engine, timeout }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run blocking work on the blocking pool, bounded by the request deadline
    async fn run_blocking<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let task = tokio::task::spawn_blocking(work);
        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(KbError::Other(anyhow::anyhow!(
                "search task failed: {}",
                join_error
            ))),
            Err(_) => Err(KbError::Timeout {
                limit: self.timeout,
            }),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/multi", post(search))
        .route("/api/search", post(search))
        .route("/stats", get(stats))
        .fallback(not_found)
        .with_state(state)
}

/// Bind `addr` and serve until `shutdown` resolves
pub async fn serve<S>(state: AppState, addr: &str, shutdown: S) -> Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await.map_err(|e| KbError::Io {
        source: e,
        context: format!("Failed to bind {}", addr),
    })?;
    tracing::info!("Knowledge base service listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| KbError::Io {
            source: e,
            context: "Server error".to_string(),
        })
}

async fn health(State(state): State<AppState>) -> Response {
    let store = state.engine.store().clone();
    let probe = state
        .run_blocking(move || {
            store.heartbeat()?;
            Ok((store.name().to_string(), store.count()?))
        })
        .await;

    match probe {
        Ok((backend, count)) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "backend": backend, "count": count })),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!("Health probe failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "degraded", "message": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn search(State(state): State<AppState>, body: Bytes) -> Response {
    // An empty body is an empty payload, which yields the empty-question answer
    let parsed = if body.iter().all(u8::is_ascii_whitespace) {
        Ok(json!({}))
    } else {
        serde_json::from_slice(&body)
    };
    let payload: Value = match parsed {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!("Rejecting malformed body: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "invalid_json" })),
            )
                .into_response();
        }
    };

    let request = SearchRequest::from_payload(&payload, state.engine.config());
    let engine = state.engine.clone();
    match state.run_blocking(move || engine.search(&request)).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => {
            tracing::error!("Search failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(SearchResponse::error(e.to_string())),
            )
                .into_response()
        }
    }
}

async fn stats(State(state): State<AppState>) -> Response {
    let store = state.engine.store().clone();
    let collected = state
        .run_blocking(move || Ok(CollectionStats::collect(store.as_ref(), STATS_SAMPLE)?))
        .await;

    match collected {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "not_found" }))).into_response()
}
