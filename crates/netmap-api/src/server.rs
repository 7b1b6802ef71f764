//! Axum server and routes.

use crate::error::ApiError;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use netmap_types::{
    normalize, unwrap_restore_payload, AdminAuth, AdminGrant, AuditCleanupRequest,
    AuditCleanupResponse, AuditEntry, AuditListOptions, CreateDeviceResponse,
    DeleteDeviceResponse, Device, DeviceDraft, DeviceId, DeviceLifecycle, DevicePatch,
    ImportResponse, RestoreResponse, UpdateDeviceResponse,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

pub struct AppState {
    pub lifecycle: Arc<dyn DeviceLifecycle>,
    pub auth: AdminAuth,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(handle_health))
        .route("/api/devices", get(handle_list).post(handle_create))
        .route("/api/devices/import", post(handle_import))
        .route("/api/devices/restore", post(handle_restore))
        .route(
            "/api/devices/:id",
            get(handle_get).put(handle_update).delete(handle_delete),
        )
        .route("/api/admin/audit", get(handle_audit_list))
        .route("/api/admin/audit/cleanup", post(handle_audit_cleanup))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Unwrap a JSON body, turning axum's rejection into our error shape.
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(v)| v)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

fn parse_timestamp(field: &str, raw: &str) -> Result<DateTime<Utc>, ApiError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ApiError::BadRequest(format!("{field}: {e}")))
}

#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    #[serde(default)]
    pub token: Option<String>,
}

/// Admin credential from the `X-Admin-Token` header, else the `token` query parameter.
fn admin_grant(
    state: &AppState,
    headers: &HeaderMap,
    query_token: Option<&str>,
) -> Result<AdminGrant, ApiError> {
    let header_token = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());
    let grant = state.auth.verify(header_token.or(query_token));
    if grant.is_err() {
        tracing::warn!("rejected admin request");
    }
    Ok(grant?)
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn handle_list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Device>>, ApiError> {
    Ok(Json(state.lifecycle.list().await?))
}

async fn handle_create(
    State(state): State<Arc<AppState>>,
    body: Result<Json<DeviceDraft>, JsonRejection>,
) -> Result<Json<CreateDeviceResponse>, ApiError> {
    let draft = json_body(body)?;
    let id = state.lifecycle.create(draft).await?;
    Ok(Json(CreateDeviceResponse { id }))
}

async fn handle_import(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Vec<DeviceDraft>>, JsonRejection>,
) -> Result<Json<ImportResponse>, ApiError> {
    let drafts = json_body(body)?;
    let created = state.lifecycle.import(drafts).await?;
    Ok(Json(ImportResponse { created }))
}

async fn handle_get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Device>, ApiError> {
    Ok(Json(state.lifecycle.get(DeviceId(id)).await?))
}

async fn handle_update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    body: Result<Json<DevicePatch>, JsonRejection>,
) -> Result<Json<UpdateDeviceResponse>, ApiError> {
    let patch = json_body(body)?;
    let prev = state.lifecycle.update(DeviceId(id), patch).await?;
    Ok(Json(UpdateDeviceResponse {
        status: "updated".to_string(),
        prev,
    }))
}

async fn handle_delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<DeleteDeviceResponse>, ApiError> {
    let snapshot = state.lifecycle.delete(DeviceId(id)).await?;
    Ok(Json(DeleteDeviceResponse {
        status: "deleted".to_string(),
        snapshot,
    }))
}

async fn handle_restore(
    State(state): State<Arc<AppState>>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<RestoreResponse>, ApiError> {
    // A missing or unreadable body is the same failure as an empty snapshot.
    let raw = body.map(|Json(v)| v).unwrap_or(serde_json::Value::Null);
    let snapshot = normalize(unwrap_restore_payload(&raw))?;
    let outcome = state.lifecycle.restore(snapshot).await?;
    Ok(Json(RestoreResponse {
        restored: true,
        id: outcome.id,
        preserved_id: outcome.preserved,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditListQuery {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub since: Option<String>,
    #[serde(default)]
    pub until: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

async fn handle_audit_list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(q): Query<AuditListQuery>,
) -> Result<Json<Vec<AuditEntry>>, ApiError> {
    let grant = admin_grant(&state, &headers, q.token.as_deref())?;
    let opts = AuditListOptions {
        since: q
            .since
            .as_deref()
            .map(|s| parse_timestamp("since", s))
            .transpose()?,
        until: q
            .until
            .as_deref()
            .map(|s| parse_timestamp("until", s))
            .transpose()?,
        limit: q.limit,
        offset: q.offset,
    };
    Ok(Json(state.lifecycle.audit_list(&grant, &opts).await?))
}

async fn handle_audit_cleanup(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(q): Query<TokenQuery>,
    body: Result<Json<AuditCleanupRequest>, JsonRejection>,
) -> Result<Json<AuditCleanupResponse>, ApiError> {
    let grant = admin_grant(&state, &headers, q.token.as_deref())?;
    let req = json_body(body)?;
    let before = parse_timestamp("before", &req.before)?;
    let removed = state.lifecycle.audit_cleanup(&grant, before).await?;
    Ok(Json(AuditCleanupResponse { removed }))
}
