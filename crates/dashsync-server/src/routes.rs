//! HTTP routes
//!
//! | method | path | purpose |
//! |---|---|---|
//! | POST | `/presence/heartbeat` | mark a session live, returns the online count |
//! | POST | `/presence/disconnect` | explicit close, JSON or bare-text body |
//! | GET | `/presence` | online count |
//! | POST | `/refresh-data` | token-gated forced refresh |
//! | GET | `/status` | refresh bookkeeping and current snapshot info |
//! | GET | `/dataset` | current raw payload |

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use dashsync_core::{RawDatasetParser, RefreshState, SnapshotInfo, SyncService};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::debug;

/// Header carrying the webhook token
pub const REFRESH_TOKEN_HEADER: &str = "x-refresh-token";

/// Longest accepted session identifier, in bytes
pub const MAX_SESSION_ID_LEN: usize = 128;

/// The service the routes operate on
pub type Service = SyncService<RawDatasetParser>;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<Service>,
}

/// Build the router over a service
pub fn router(service: Arc<Service>) -> Router {
    Router::new()
        .route("/presence", get(presence_count))
        .route("/presence/heartbeat", post(heartbeat))
        .route("/presence/disconnect", post(disconnect))
        .route("/refresh-data", post(refresh_data))
        .route("/status", get(status))
        .route("/dataset", get(dataset))
        .layer(CorsLayer::permissive())
        .with_state(AppState { service })
}

/// Request errors rendered as `{"ok": false, "error": ...}`
#[derive(Debug)]
pub enum ApiError {
    InvalidSession(&'static str),
    Unauthorized,
}

#[derive(Serialize)]
struct ErrorBody {
    ok: bool,
    error: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::InvalidSession(reason) => (StatusCode::BAD_REQUEST, reason),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
        };
        (status, Json(ErrorBody { ok: false, error })).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct SessionRequest {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct OnlineResponse {
    pub online: usize,
}

#[derive(Debug, Serialize)]
pub struct RefreshAccepted {
    pub ok: bool,
    pub accepted: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub refresh: RefreshState,
    pub snapshot: Option<SnapshotInfo>,
    pub online: usize,
    pub webhook_enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

fn validate_session_id(id: &str) -> Result<&str, ApiError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(ApiError::InvalidSession("empty session id"));
    }
    if id.len() > MAX_SESSION_ID_LEN {
        return Err(ApiError::InvalidSession("session id too long"));
    }
    Ok(id)
}

async fn presence_count(State(state): State<AppState>) -> Json<OnlineResponse> {
    Json(OnlineResponse {
        online: state.service.presence().count(),
    })
}

async fn heartbeat(
    State(state): State<AppState>,
    Json(request): Json<SessionRequest>,
) -> Result<Json<OnlineResponse>, ApiError> {
    let id = validate_session_id(&request.session_id)?;
    let presence = state.service.presence();
    presence.heartbeat(id);
    Ok(Json(OnlineResponse {
        online: presence.count(),
    }))
}

/// Beacon transports may send the identifier as JSON, a JSON string, or
/// plain text, often without a content type
async fn disconnect(State(state): State<AppState>, body: Bytes) -> Result<StatusCode, ApiError> {
    let raw = if let Ok(request) = serde_json::from_slice::<SessionRequest>(&body) {
        request.session_id
    } else if let Ok(id) = serde_json::from_slice::<String>(&body) {
        id
    } else {
        String::from_utf8_lossy(&body).into_owned()
    };

    let id = validate_session_id(&raw)?;
    let removed = state.service.presence().disconnect(id);
    debug!(session = id, removed, "Presence disconnect");
    Ok(StatusCode::NO_CONTENT)
}

async fn refresh_data(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
) -> Result<Json<RefreshAccepted>, ApiError> {
    let token = headers
        .get(REFRESH_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .or(query.token.as_deref());

    let receipt = state
        .service
        .gate()
        .handle(token)
        .map_err(|_| ApiError::Unauthorized)?;

    Ok(Json(RefreshAccepted {
        ok: true,
        accepted: true,
        timestamp: receipt.accepted_at,
    }))
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let service = &state.service;
    Json(StatusResponse {
        refresh: service.refresh_status(),
        snapshot: service.cache().read().map(|s| s.info()),
        online: service.presence().count(),
        webhook_enabled: service.gate().is_enabled(),
    })
}

async fn dataset(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(snapshot) = state.service.cache().read() else {
        return StatusCode::NO_CONTENT.into_response();
    };

    let etag = format!("\"{}\"", snapshot.fingerprint().to_hex());
    let matches = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == etag);
    if matches {
        return (StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response();
    }

    (
        [
            (header::ETAG, etag),
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::LAST_MODIFIED,
                snapshot
                    .fetched_at()
                    .format("%a, %d %b %Y %H:%M:%S GMT")
                    .to_string(),
            ),
        ],
        snapshot.dataset().bytes().clone(),
    )
        .into_response()
}
