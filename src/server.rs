//! HTTP surface of the pipeline: FAQ generation, live progress over SSE and
//! the invocation log.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Json;
use axum::Router;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use log::{info, warn};
use serde::Deserialize;
use serde_json::json;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::{Stream, StreamExt};

use crate::config::PartialCredentials;
use crate::error::{FetchError, PipelineError};
use crate::pipeline::{Pipeline, PipelineResult};
use crate::progress::ProgressHub;
use crate::storage::LogEntry;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Shared state of the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub hub: ProgressHub,
    /// Keys used when a request does not carry its own
    pub default_credentials: PartialCredentials,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/faq", post(generate_faq))
        .route("/api/progress", get(progress_stream))
        .route("/api/logs", get(list_logs).delete(clear_logs))
        .route("/health", get(health))
        .with_state(state)
}

/// Binds `addr` and serves [`router`] until the process stops.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .await
        .context("HTTP server failed")
}

/// JSON error body with the status it is served with.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(error: PipelineError) -> Self {
        let status = match &error {
            PipelineError::Fetch(FetchError::InvalidUrl { .. }) => StatusCode::BAD_REQUEST,
            PipelineError::Fetch(_) | PipelineError::Search(_) => StatusCode::BAD_GATEWAY,
            PipelineError::Extract(_) | PipelineError::NoKeywords => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
        };

        Self {
            status,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FaqRequest {
    url: String,
    session_id: Option<String>,
    #[serde(flatten)]
    credentials: PartialCredentials,
}

async fn generate_faq(
    State(state): State<AppState>,
    payload: Result<Json<FaqRequest>, JsonRejection>,
) -> Result<Json<PipelineResult>, ApiError> {
    let Json(FaqRequest {
        url,
        session_id,
        credentials,
    }) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    if url.trim().is_empty() {
        return Err(ApiError::bad_request("URL is required"));
    }
    let credentials = credentials
        .or(&state.default_credentials)
        .into_credentials()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    // The invocation owns its collaborators so a client hanging up cannot
    // cancel it halfway: the log entry is still written and the session closed.
    let pipeline = Arc::clone(&state.pipeline);
    let hub = state.hub.clone();
    let invocation = tokio::spawn(async move {
        match session_id {
            Some(session_id) => {
                let sink = hub.sink(&session_id);
                let outcome = pipeline.run_with_events(&url, &credentials, &sink).await;
                hub.close(&session_id);
                outcome
            }
            None => pipeline.run(&url, &credentials).await,
        }
    });

    let outcome = invocation
        .await
        .map_err(|e| ApiError::internal(format!("FAQ invocation failed: {e}")))?;
    outcome.map(Json).map_err(ApiError::from)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProgressQuery {
    session_id: Option<String>,
}

async fn progress_stream(
    State(state): State<AppState>,
    Query(query): Query<ProgressQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let session_id = query
        .session_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing sessionId"))?;

    state.hub.cleanup();
    let rx = state.hub.subscribe(&session_id);
    info!("Progress stream opened for session {session_id}");

    let connected = Event::default()
        .data(json!({ "type": "connected", "sessionId": session_id }).to_string());
    let updates = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(event) => serde_json::to_string(&event)
            .ok()
            .map(|data| Ok::<_, Infallible>(Event::default().data(data))),
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            warn!("Progress subscriber lagged, {skipped} events skipped");
            None
        }
    });
    let stream = tokio_stream::once(Ok(connected)).chain(updates);

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL)))
}

async fn list_logs(State(state): State<AppState>) -> Json<Vec<LogEntry>> {
    Json(state.pipeline.log_store().entries().await)
}

async fn clear_logs(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .pipeline
        .log_store()
        .clear()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to clear logs: {e}")))?;
    Ok(Json(json!({ "message": "Logs cleared" })))
}

async fn health() -> &'static str {
    "ok"
}
