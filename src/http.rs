//! HTTP surface: an `axum` router that turns `GET`/`POST` requests under a
//! configurable prefix into [`orchestrator`] calls and translates the
//! result back into a JSON response.
//!
//! The suspend/resume behavior a callback-based HTTP server would need to
//! hand-roll is here just the `async fn` body of [`get_handler`]/
//! [`post_handler`] `.await`ing [`orchestrator::handle_get`]/
//! [`orchestrator::handle_post`]: the connection yields without blocking
//! and resumes exactly when the bus reply arrives.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use dbus::nonblock::SyncConnection;
use tracing::{error, info_span, Instrument};

use crate::error::GatewayError;
use crate::json::{self, Value};
use crate::orchestrator;

#[derive(Clone)]
struct AppState {
    conn: Arc<SyncConnection>,
}

/// Builds the router. Routes are relative; the caller nests this under
/// whatever prefix the CLI was given.
pub fn router(conn: Arc<SyncConnection>) -> Router {
    Router::new()
        .route("/{*path}", get(get_handler).post(post_handler))
        .with_state(AppState { conn })
}

fn json_response(status: StatusCode, value: &Value) -> Response {
    (status, [(header::CONTENT_TYPE, "application/json")], json::to_string(value)).into_response()
}

fn respond(result: Result<Value, GatewayError>) -> Response {
    match result {
        Ok(value) => json_response(StatusCode::OK, &value),
        Err(err) => {
            error!(error = %err, "request failed");
            let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            json_response(status, &err.error_body())
        }
    }
}

async fn get_handler(State(state): State<AppState>, Path(path): Path<String>) -> Response {
    let url = format!("/{path}");
    let span = info_span!("get", url = %url);
    respond(orchestrator::handle_get(&state.conn, &url).instrument(span).await)
}

async fn post_handler(State(state): State<AppState>, Path(path): Path<String>, body: String) -> Response {
    let url = format!("/{path}");
    let span = info_span!("post", url = %url);
    respond(orchestrator::handle_post(&state.conn, &url, &body).instrument(span).await)
}
