use axum::{
    extract::{rejection::BytesRejection, State},
    Json,
};
use bytes::Bytes;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::session::validate_session_id;
use crate::sink::LogEntry;

use super::error::ApiError;
use super::AppState;

#[derive(Serialize)]
pub(super) struct HealthResponse {
    status: &'static str,
}

pub(super) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[derive(Serialize)]
pub(super) struct StatusResponse {
    status: &'static str,
    port: u16,
    debug_dir: String,
    active_sessions: Vec<String>,
}

pub(super) async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "running",
        port: state.port,
        debug_dir: state.sessions.debug_dir().display().to_string(),
        active_sessions: state.sessions.ids(),
    })
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct CreateSessionRequest {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Serialize)]
pub(super) struct CreateSessionResponse {
    session_id: String,
    log_file: String,
}

pub(super) async fn session_create(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<CreateSessionResponse>, ApiError> {
    let req: CreateSessionRequest = parse_body(&body?)?;
    let session = state.sessions.create(req.name).await?;
    Ok(Json(CreateSessionResponse {
        session_id: session.id,
        log_file: session.log_file.display().to_string(),
    }))
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct AppendLogRequest {
    #[serde(rename = "sessionId", default)]
    session_id: Option<String>,
    #[serde(flatten)]
    entry: LogEntry,
}

#[derive(Serialize)]
pub(super) struct AppendLogResponse {
    ok: bool,
}

pub(super) async fn log_append(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<AppendLogResponse>, ApiError> {
    let req: AppendLogRequest = parse_body(&body?)?;
    let session_id = req
        .session_id
        .filter(|id| !id.is_empty())
        .ok_or(ApiError::SessionIdRequired)?;
    validate_session_id(&session_id).map_err(ApiError::InvalidSessionId)?;

    let target = state.sessions.resolve(&session_id);
    if !target.is_registered() {
        tracing::debug!(
            session_id = %session_id,
            path = %target.path().display(),
            "unregistered session, appending to reconstructed path"
        );
    }
    state.sink.append(target.path(), &req.entry).await?;

    Ok(Json(AppendLogResponse { ok: true }))
}

pub(super) async fn not_found() -> ApiError {
    ApiError::NotFound
}

/// Parse a JSON request body without looking at `Content-Type`.
///
/// `navigator.sendBeacon` posts JSON as `text/plain`, so the `Json`
/// extractor's content-type check would reject it. An empty body reads as
/// `{}`.
fn parse_body<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| {
        if e.is_data() {
            ApiError::InvalidRequest(e.to_string())
        } else {
            ApiError::InvalidJson(e.to_string())
        }
    })
}
