//! Users API Handlers
//! /api/users エンドポイント - プロフィールと公開アーティスト一覧

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::auth::Identity;
use crate::handlers::{clamp_paging, db_error, error_response, ApiError, Pagination};
use crate::models::{
    role, user_to_public_response, user_to_response, PublicUserResponse, UpdateProfileRequest,
    User, UserResponse,
};
use crate::AppState;

// ========================================
// Response Types
// ========================================

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub success: bool,
    pub user: UserResponse,
}

#[derive(Debug, Serialize)]
pub struct PublicProfileResponse {
    pub success: bool,
    pub user: PublicUserResponse,
}

#[derive(Debug, Serialize)]
pub struct ArtistListResponse {
    pub success: bool,
    pub artists: Vec<PublicUserResponse>,
    pub pagination: Pagination,
}

// ========================================
// Query Parameters
// ========================================

#[derive(Debug, Deserialize)]
pub struct ListArtistsQuery {
    pub search: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

// ========================================
// Handlers
// ========================================

/// GET /api/users/me - 自分のプロフィール取得
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<ProfileResponse>, ApiError> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&identity.id)
        .fetch_optional(&state.db)
        .await
        .map_err(|e| db_error(&state, e))?;

    let user = user
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "User not found".to_string()))?;

    Ok(Json(ProfileResponse {
        success: true,
        user: user_to_response(&user),
    }))
}

/// PUT /api/users/me - プロフィール更新（部分更新）
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<ProfileResponse>, ApiError> {
    if let Some(name) = &req.name {
        if name.trim().is_empty() {
            return Err(error_response(
                StatusCode::BAD_REQUEST,
                "name must not be empty".to_string(),
            ));
        }
    }

    let now_ms = Utc::now().timestamp_millis();
    sqlx::query(
        r#"
        UPDATE users SET
            name = COALESCE(?, name),
            bio = COALESCE(?, bio),
            avatar_url = COALESCE(?, avatar_url),
            specialty = COALESCE(?, specialty),
            updated_at_ms = ?
        WHERE id = ?
        "#,
    )
    .bind(req.name.as_ref().map(|s| s.trim().to_string()))
    .bind(&req.bio)
    .bind(&req.avatar_url)
    .bind(&req.specialty)
    .bind(now_ms)
    .bind(&identity.id)
    .execute(&state.db)
    .await
    .map_err(|e| db_error(&state, e))?;

    info!("Profile updated: user={}", identity.id);

    let user: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&identity.id)
        .fetch_one(&state.db)
        .await
        .map_err(|e| db_error(&state, e))?;

    Ok(Json(ProfileResponse {
        success: true,
        user: user_to_response(&user),
    }))
}

/// GET /api/users/artists - 公開アーティスト一覧
pub async fn list_artists(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListArtistsQuery>,
) -> Result<Json<ArtistListResponse>, ApiError> {
    let (page, limit, offset) = clamp_paging(query.page, query.limit);
    let pattern = query
        .search
        .as_deref()
        .map(|s| format!("%{}%", s.trim()));

    let (total, artists): ((i64,), Vec<User>) = if let Some(pattern) = &pattern {
        let total = sqlx::query_as(
            "SELECT COUNT(*) FROM users WHERE role = ? AND is_active = 1 AND (name LIKE ? OR specialty LIKE ?)",
        )
        .bind(role::ARTIST)
        .bind(pattern)
        .bind(pattern)
        .fetch_one(&state.db)
        .await
        .map_err(|e| db_error(&state, e))?;

        let rows = sqlx::query_as(
            r#"
            SELECT * FROM users
            WHERE role = ? AND is_active = 1 AND (name LIKE ? OR specialty LIKE ?)
            ORDER BY created_at_ms DESC LIMIT ? OFFSET ?
            "#,
        )
        .bind(role::ARTIST)
        .bind(pattern)
        .bind(pattern)
        .bind(limit)
        .bind(offset)
        .fetch_all(&state.db)
        .await
        .map_err(|e| db_error(&state, e))?;
        (total, rows)
    } else {
        let total = sqlx::query_as("SELECT COUNT(*) FROM users WHERE role = ? AND is_active = 1")
            .bind(role::ARTIST)
            .fetch_one(&state.db)
            .await
            .map_err(|e| db_error(&state, e))?;

        let rows = sqlx::query_as(
            "SELECT * FROM users WHERE role = ? AND is_active = 1 ORDER BY created_at_ms DESC LIMIT ? OFFSET ?",
        )
        .bind(role::ARTIST)
        .bind(limit)
        .bind(offset)
        .fetch_all(&state.db)
        .await
        .map_err(|e| db_error(&state, e))?;
        (total, rows)
    };

    Ok(Json(ArtistListResponse {
        success: true,
        artists: artists.iter().map(user_to_public_response).collect(),
        pagination: Pagination::new(total.0, page, limit),
    }))
}

/// GET /api/users/:user_id - 公開プロフィール（メールは含めない）
pub async fn get_public_profile(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<PublicProfileResponse>, ApiError> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ? AND is_active = 1")
        .bind(&user_id)
        .fetch_optional(&state.db)
        .await
        .map_err(|e| db_error(&state, e))?;

    let user = user
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "User not found".to_string()))?;

    Ok(Json(PublicProfileResponse {
        success: true,
        user: user_to_public_response(&user),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_state;
    use uuid::Uuid;

    async fn seed_user(state: &Arc<AppState>, name: &str, user_role: &str) -> String {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO users (id, email, password_hash, name, role, is_active, created_at_ms, updated_at_ms) VALUES (?, ?, 'h', ?, ?, 1, 0, 0)",
        )
        .bind(&id)
        .bind(format!("{}@x.com", Uuid::new_v4()))
        .bind(name)
        .bind(user_role)
        .execute(&state.db)
        .await
        .unwrap();
        id
    }

    #[tokio::test]
    async fn artist_directory_only_lists_active_artists() {
        let state = test_state().await;
        seed_user(&state, "Painter", role::ARTIST).await;
        seed_user(&state, "Shopper", role::BUYER).await;
        let inactive = seed_user(&state, "Gone", role::ARTIST).await;
        sqlx::query("UPDATE users SET is_active = 0 WHERE id = ?")
            .bind(&inactive)
            .execute(&state.db)
            .await
            .unwrap();

        let Json(body) = list_artists(
            State(state.clone()),
            Query(ListArtistsQuery {
                search: None,
                page: None,
                limit: None,
            }),
        )
        .await
        .unwrap();

        assert_eq!(body.pagination.total, 1);
        assert_eq!(body.artists[0].name, "Painter");
    }

    #[tokio::test]
    async fn profile_update_is_partial() {
        let state = test_state().await;
        let id = seed_user(&state, "A", role::ARTIST).await;
        let identity = Identity {
            id: id.clone(),
            role: role::ARTIST.to_string(),
            email: "a@x.com".to_string(),
            name: "A".to_string(),
        };

        let Json(body) = update_profile(
            State(state.clone()),
            identity,
            Json(UpdateProfileRequest {
                name: None,
                bio: Some("oil on canvas".to_string()),
                avatar_url: None,
                specialty: None,
            }),
        )
        .await
        .unwrap();

        assert_eq!(body.user.name, "A");
        assert_eq!(body.user.bio.as_deref(), Some("oil on canvas"));
    }
}
