//! HTTP retrieval surface (`spec.md` §6), feature-gated behind `server`.
//!
//! Thin axum adapter: no business logic lives here, only request parsing,
//! dispatch to `RetrievalEngine`/`RetentionManager`, and the exact
//! status-code mapping `spec.md` §6 and §7 specify. Grounded on the
//! axum/tower-http stack confirmed present in the pack's `estuary-flow`
//! workspace.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::error::DesArcError;
use crate::retention::RetentionAction;
use crate::retrieval::zones::ZoneDispatcher;
use crate::retention::RetentionManager;

pub struct AppState {
    pub dispatcher: Arc<ZoneDispatcher>,
    pub retention: Arc<RetentionManager>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/files/:uid", get(get_file))
        .route("/files/:uid/retention-policy", put(set_retention_policy))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn map_error(e: &DesArcError) -> StatusCode {
    match e {
        DesArcError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        DesArcError::NotFound(_) => StatusCode::NOT_FOUND,
        DesArcError::CorruptShard(_) => StatusCode::INTERNAL_SERVER_ERROR,
        DesArcError::Backend(_) => StatusCode::BAD_GATEWAY,
        DesArcError::ShardTooLarge(_) => StatusCode::BAD_REQUEST,
    }
}

impl IntoResponse for DesArcError {
    fn into_response(self) -> Response {
        let status = map_error(&self);
        (status, self.to_string()).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct GetFileQuery {
    created_at: DateTime<Utc>,
}

async fn get_file(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<String>,
    Query(query): Query<GetFileQuery>,
) -> Result<Vec<u8>, DesArcError> {
    state.dispatcher.get(uid.as_bytes(), query.created_at).await
}

#[derive(Debug, Deserialize)]
struct RetentionPolicyRequest {
    created_at: DateTime<Utc>,
    due_date: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct RetentionPolicyResponse {
    uid: String,
    created_at: DateTime<Utc>,
    location: &'static str,
    retention_until: DateTime<Utc>,
    action: &'static str,
}

async fn set_retention_policy(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<String>,
    Json(body): Json<RetentionPolicyRequest>,
) -> Result<Json<RetentionPolicyResponse>, DesArcError> {
    let action = state.retention.set_retention(uid.as_bytes(), body.created_at, body.due_date).await?;
    Ok(Json(RetentionPolicyResponse {
        uid,
        created_at: body.created_at,
        location: "extended_retention",
        retention_until: body.due_date,
        action: match action {
            RetentionAction::Moved => "moved",
            RetentionAction::Updated => "updated",
        },
    }))
}

async fn health() -> StatusCode {
    StatusCode::OK
}
