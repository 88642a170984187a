//! REST surface over the durable notification store.
//! This is the polling path: offline users catch up here after reconnecting.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::auth::middleware::Claims;
use crate::db::models::Notification;
use crate::notify::store;
use crate::state::AppState;

fn default_limit() -> i64 {
    200
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct UpdatedResponse {
    pub updated: usize,
}

/// GET /notifications — List the caller's notifications, newest first.
pub async fn list_notifications(
    State(state): State<AppState>,
    claims: Claims,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Notification>>, StatusCode> {
    let db = state.db.clone();
    let user_id = claims.sub;
    let limit = query.limit.clamp(1, 1000);
    let offset = query.offset.max(0);

    let rows = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        store::list_for_user(&conn, user_id, query.unread_only, limit, offset)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(Json(rows))
}

/// GET /notifications/unread-count
pub async fn unread_count(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<CountResponse>, StatusCode> {
    let db = state.db.clone();
    let user_id = claims.sub;

    let count = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        store::unread_count(&conn, user_id).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(Json(CountResponse { count }))
}

/// POST /notifications/mark-read — Mark all of the caller's unread
/// notifications as read. Idempotent.
pub async fn mark_all_read(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<UpdatedResponse>, StatusCode> {
    let db = state.db.clone();
    let user_id = claims.sub;

    let updated = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        store::mark_all_read(&conn, user_id).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(Json(UpdatedResponse { updated }))
}

/// POST /notifications/{id}/mark-read — Mark one notification as read.
/// 404 when the record does not exist or belongs to another user.
pub async fn mark_single_read(
    State(state): State<AppState>,
    claims: Claims,
    Path(notif_id): Path<i64>,
) -> Result<Json<UpdatedResponse>, (StatusCode, String)> {
    let db = state.db.clone();
    let user_id = claims.sub;

    let matched = tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "DB lock".to_string()))?;
        store::mark_read(&conn, notif_id, user_id)
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
    })
    .await
    .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "Task join error".to_string()))??;

    if matched == 0 {
        return Err((StatusCode::NOT_FOUND, "Notification not found".to_string()));
    }
    Ok(Json(UpdatedResponse { updated: 1 }))
}
