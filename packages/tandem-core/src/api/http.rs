//! HTTP route handlers.
//!
//! Thin handlers that parse requests, delegate to the services and map
//! [`TandemError`] to JSON error responses.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, Method, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::response::{api_error, api_ok, api_success};
use crate::api::AppState;
use crate::error::TandemError;
use crate::events::BroadcastEvent;
use crate::protocol_constants::SERVICE_ID;
use crate::services::{SessionAction, SyncPush};

/// Creates the application router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/sessions", get(list_sessions).post(session_action))
        .route("/api/sessions/{id}", get(get_session))
        .route("/api/sessions/{id}/events", get(session_events))
        .route("/api/sync", axum::routing::post(sync_push))
        .route("/api/sync/{id}", get(sync_snapshot))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Liveness probe.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = match state.manager.session_count().await {
        Ok(count) => json!(count),
        Err(e) => {
            log::warn!("[Server] Health check could not count sessions: {}", e);
            Value::Null
        }
    };
    api_success(json!({
        "status": "ok",
        "service": SERVICE_ID,
        "store": state.manager.backend_name(),
        "sessions": sessions,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionsQuery {
    user_id: Option<String>,
}

async fn list_sessions(
    State(state): State<AppState>,
    Query(query): Query<SessionsQuery>,
) -> Result<Response, TandemError> {
    let user_id = query
        .user_id
        .ok_or_else(|| TandemError::InvalidRequest("userId query parameter is required".into()))?;
    let sessions = state.manager.sessions_for_user(&user_id).await?;
    Ok(api_success(sessions).into_response())
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, TandemError> {
    let session = state.manager.get_session(&id).await?;
    Ok(api_success(session).into_response())
}

async fn session_action(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, TandemError> {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return Ok(json_rejected(rejection)),
    };
    let action = SessionAction::from_json(&body)?;
    let reply = state.manager.dispatch(action).await?;
    Ok(api_success(reply).into_response())
}

async fn sync_snapshot(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, TandemError> {
    let snapshot = state.sync_engine.snapshot(&id).await?;
    Ok(api_success(snapshot).into_response())
}

async fn sync_push(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, TandemError> {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return Ok(json_rejected(rejection)),
    };
    let push = SyncPush::from_json(&body)?;
    state.sync_engine.push(push).await?;
    Ok(api_ok().into_response())
}

/// Server-sent events for one session.
///
/// Polling `/api/sync/{id}` stays authoritative; this stream only lowers
/// latency for clients that listen.
async fn session_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, TandemError> {
    let session_id = state.manager.get_session(&id).await?.id;
    log::debug!("[Server] Event stream opened for {}", session_id);

    let stream = BroadcastStream::new(state.event_bridge.subscribe()).filter_map(move |result| {
        match result {
            Ok(event) if event.session_id() == session_id => to_sse_event(&event).map(Ok),
            Ok(_) => None,
            Err(e) => {
                log::debug!("[Server] Event stream lagged: {}", e);
                None
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

fn to_sse_event(event: &BroadcastEvent) -> Option<Event> {
    let name = match event {
        BroadcastEvent::Session(_) => "session",
        BroadcastEvent::Playback(_) => "playback",
    };
    match Event::default().event(name).json_data(event) {
        Ok(event) => Some(event),
        Err(e) => {
            log::warn!("[Server] Could not encode event: {}", e);
            None
        }
    }
}

fn json_rejected(rejection: JsonRejection) -> Response {
    api_error(StatusCode::BAD_REQUEST, "invalid_request", rejection.body_text()).into_response()
}
