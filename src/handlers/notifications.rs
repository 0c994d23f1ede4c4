//! Notifications API Handlers
//! /api/notifications エンドポイント - 受信箱の閲覧と既読化

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::Identity;
use crate::handlers::{clamp_paging, db_error, error_response, ApiError, Pagination};
use crate::models::{notification_to_response, Notification, NotificationResponse};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct NotificationListResponse {
    pub success: bool,
    pub notifications: Vec<NotificationResponse>,
    pub unread_count: i64,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub success: bool,
}

#[derive(Debug, Deserialize)]
pub struct ListNotificationsQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// GET /api/notifications - 自分の受信箱（新しい順）
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Query(query): Query<ListNotificationsQuery>,
) -> Result<Json<NotificationListResponse>, ApiError> {
    let (page, limit, offset) = clamp_paging(query.page, query.limit);

    let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM notifications WHERE user_id = ?")
        .bind(&identity.id)
        .fetch_one(&state.db)
        .await
        .map_err(|e| db_error(&state, e))?;

    let unread: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM notifications WHERE user_id = ? AND is_read = 0")
            .bind(&identity.id)
            .fetch_one(&state.db)
            .await
            .map_err(|e| db_error(&state, e))?;

    let rows: Vec<Notification> = sqlx::query_as(
        "SELECT * FROM notifications WHERE user_id = ? ORDER BY created_at_ms DESC LIMIT ? OFFSET ?",
    )
    .bind(&identity.id)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.db)
    .await
    .map_err(|e| db_error(&state, e))?;

    Ok(Json(NotificationListResponse {
        success: true,
        notifications: rows.iter().map(notification_to_response).collect(),
        unread_count: unread.0,
        pagination: Pagination::new(total.0, page, limit),
    }))
}

/// PUT /api/notifications/:notification_id/read - 既読化（自分の通知のみ）
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(notification_id): Path<i64>,
) -> Result<Json<MarkReadResponse>, ApiError> {
    let result = sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ? AND user_id = ?")
        .bind(notification_id)
        .bind(&identity.id)
        .execute(&state.db)
        .await
        .map_err(|e| db_error(&state, e))?;

    if result.rows_affected() == 0 {
        return Err(error_response(
            StatusCode::NOT_FOUND,
            "Notification not found".to_string(),
        ));
    }

    Ok(Json(MarkReadResponse { success: true }))
}
