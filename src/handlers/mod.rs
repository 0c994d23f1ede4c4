//! API Handlers
//! リソースごとのハンドラと共通レスポンスヘルパー

pub mod artworks;
pub mod auth;
pub mod cart;
pub mod commissions;
pub mod contact;
pub mod courses;
pub mod dashboard;
pub mod notifications;
pub mod orders;
pub mod users;
pub mod wishlist;

use axum::{http::StatusCode, response::Json};
use serde::Serialize;
use tracing::{error, warn};

use crate::AppState;

// ========================================
// エラーレスポンス
// ========================================

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn error_response(status: StatusCode, message: String) -> ApiError {
    warn!("API Error: {}", message);
    (
        status,
        Json(ErrorResponse {
            success: false,
            error: message,
            details: None,
        }),
    )
}

/// ストレージ失敗は500。詳細は非本番のみレスポンスに含める。
pub fn db_error(state: &AppState, e: sqlx::Error) -> ApiError {
    error!("DB error: {}", e);
    let details = if state.config.production {
        None
    } else {
        Some(e.to_string())
    };
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            success: false,
            error: "Database error".to_string(),
            details,
        }),
    )
}

// ========================================
// ページネーション
// ========================================

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub total: i64,
    pub page: i64,
    pub pages: i64,
    pub limit: i64,
}

impl Pagination {
    pub fn new(total: i64, page: i64, limit: i64) -> Self {
        let pages = if total == 0 { 0 } else { (total + limit - 1) / limit };
        Self { total, page, pages, limit }
    }
}

/// page/limit クエリの正規化（limit は最大100、デフォルト20）
pub fn clamp_paging(page: Option<i64>, limit: Option<i64>) -> (i64, i64, i64) {
    let page = page.unwrap_or(1).max(1);
    let limit = limit.unwrap_or(20).clamp(1, 100);
    let offset = (page - 1) * limit;
    (page, limit, offset)
}
