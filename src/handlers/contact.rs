//! Contact API Handlers
//! /api/contact エンドポイント - 公開フォーム（書き込み専用）

use axum::{extract::State, http::StatusCode, response::Json};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::handlers::{db_error, error_response, ApiError};
use crate::models::ContactRequest;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ContactResponse {
    pub success: bool,
    pub message: String,
}

/// POST /api/contact - お問い合わせ送信
pub async fn submit_contact(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ContactRequest>,
) -> Result<(StatusCode, Json<ContactResponse>), ApiError> {
    if req.name.trim().is_empty() || req.message.trim().is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "name and message are required".to_string(),
        ));
    }
    if !req.email.contains('@') {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "A valid email is required".to_string(),
        ));
    }

    let now_ms = Utc::now().timestamp_millis();
    sqlx::query(
        "INSERT INTO contact_messages (name, email, subject, message, created_at_ms) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(req.name.trim())
    .bind(req.email.trim())
    .bind(&req.subject)
    .bind(req.message.trim())
    .bind(now_ms)
    .execute(&state.db)
    .await
    .map_err(|e| db_error(&state, e))?;

    info!("Contact message received from {}", req.email);

    Ok((
        StatusCode::CREATED,
        Json(ContactResponse {
            success: true,
            message: "Message received".to_string(),
        }),
    ))
}
