//! Wishlist API Handlers
//! /api/wishlist エンドポイント - 購入者のウィッシュリスト（数量なし、重複不可）

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::auth::{require_role, Identity};
use crate::handlers::cart::resolve_catalog_item;
use crate::handlers::{db_error, error_response, ApiError};
use crate::models::{role, AddWishlistItemRequest, WishlistItem};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct WishlistResponse {
    pub success: bool,
    pub items: Vec<WishlistItem>,
}

#[derive(Debug, Serialize)]
pub struct WishlistMutationResponse {
    pub success: bool,
    pub item: WishlistItem,
}

#[derive(Debug, Serialize)]
pub struct WishlistRemoveResponse {
    pub success: bool,
}

/// GET /api/wishlist - ウィッシュリスト取得
pub async fn get_wishlist(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<WishlistResponse>, ApiError> {
    require_role(&identity, &[role::BUYER])?;

    let items: Vec<WishlistItem> =
        sqlx::query_as("SELECT * FROM wishlist_items WHERE user_id = ? ORDER BY added_at_ms DESC")
            .bind(&identity.id)
            .fetch_all(&state.db)
            .await
            .map_err(|e| db_error(&state, e))?;

    Ok(Json(WishlistResponse {
        success: true,
        items,
    }))
}

/// POST /api/wishlist/items - 追加（重複は 400）
pub async fn add_item(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(req): Json<AddWishlistItemRequest>,
) -> Result<(StatusCode, Json<WishlistMutationResponse>), ApiError> {
    require_role(&identity, &[role::BUYER])?;

    let resolved = resolve_catalog_item(&state, req.item_type, &req.item_id).await?;

    let existing: Option<(String,)> = sqlx::query_as(
        "SELECT id FROM wishlist_items WHERE user_id = ? AND item_type = ? AND item_id = ?",
    )
    .bind(&identity.id)
    .bind(req.item_type.as_str())
    .bind(&req.item_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| db_error(&state, e))?;
    if existing.is_some() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Item already in wishlist".to_string(),
        ));
    }

    let item = WishlistItem {
        id: Uuid::new_v4().to_string(),
        user_id: identity.id.clone(),
        item_type: req.item_type.as_str().to_string(),
        item_id: req.item_id.clone(),
        title: resolved.title,
        price: resolved.price,
        thumbnail_url: resolved.thumbnail_url,
        added_at_ms: Utc::now().timestamp_millis(),
    };

    sqlx::query(
        r#"
        INSERT INTO wishlist_items (id, user_id, item_type, item_id, title, price, thumbnail_url, added_at_ms)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&item.id)
    .bind(&item.user_id)
    .bind(&item.item_type)
    .bind(&item.item_id)
    .bind(&item.title)
    .bind(item.price)
    .bind(&item.thumbnail_url)
    .bind(item.added_at_ms)
    .execute(&state.db)
    .await
    .map_err(|e| db_error(&state, e))?;

    info!(
        "Wishlist add: user={}, {}={}",
        identity.id, item.item_type, item.item_id
    );

    Ok((
        StatusCode::CREATED,
        Json(WishlistMutationResponse {
            success: true,
            item,
        }),
    ))
}

/// DELETE /api/wishlist/items/:item_id - 1件削除（存在しなくても成功）
pub async fn remove_item(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(item_id): Path<String>,
) -> Result<Json<WishlistRemoveResponse>, ApiError> {
    require_role(&identity, &[role::BUYER])?;

    sqlx::query("DELETE FROM wishlist_items WHERE id = ? AND user_id = ?")
        .bind(&item_id)
        .bind(&identity.id)
        .execute(&state.db)
        .await
        .map_err(|e| db_error(&state, e))?;

    Ok(Json(WishlistRemoveResponse { success: true }))
}

/// DELETE /api/wishlist - 全削除
pub async fn clear_wishlist(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<WishlistRemoveResponse>, ApiError> {
    require_role(&identity, &[role::BUYER])?;

    sqlx::query("DELETE FROM wishlist_items WHERE user_id = ?")
        .bind(&identity.id)
        .execute(&state.db)
        .await
        .map_err(|e| db_error(&state, e))?;

    Ok(Json(WishlistRemoveResponse { success: true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ItemType;
    use crate::test_state;

    async fn seed_user(state: &Arc<AppState>, user_role: &str) -> Identity {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO users (id, email, password_hash, name, role, is_active, created_at_ms, updated_at_ms) VALUES (?, ?, 'h', 'N', ?, 1, 0, 0)",
        )
        .bind(&id)
        .bind(format!("{}@x.com", id))
        .bind(user_role)
        .execute(&state.db)
        .await
        .unwrap();
        Identity {
            id,
            role: user_role.to_string(),
            email: "t@x.com".to_string(),
            name: "N".to_string(),
        }
    }

    async fn seed_course(state: &Arc<AppState>, artist_id: &str, published: bool) -> String {
        let id = Uuid::new_v4().to_string();
        let (status, approved) = if published { ("published", 1) } else { ("draft", 0) };
        sqlx::query(
            r#"
            INSERT INTO courses (id, artist_id, title, description, price, lessons, status, is_approved, created_at_ms, updated_at_ms)
            VALUES (?, ?, 'Inking', '', 3000, '[]', ?, ?, 0, 0)
            "#,
        )
        .bind(&id)
        .bind(artist_id)
        .bind(status)
        .bind(approved)
        .execute(&state.db)
        .await
        .unwrap();
        id
    }

    #[tokio::test]
    async fn duplicate_wishlist_add_is_rejected() {
        let state = test_state().await;
        let artist = seed_user(&state, role::ARTIST).await;
        let buyer = seed_user(&state, role::BUYER).await;
        let course_id = seed_course(&state, &artist.id, true).await;

        let req = || AddWishlistItemRequest {
            item_type: ItemType::Course,
            item_id: course_id.clone(),
        };

        let (status, Json(body)) = add_item(State(state.clone()), buyer.clone(), Json(req()))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body.item.price, 3000.0);

        let err = add_item(State(state.clone()), buyer.clone(), Json(req()))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert_eq!(err.1.error, "Item already in wishlist");

        let Json(list) = get_wishlist(State(state.clone()), buyer).await.unwrap();
        assert_eq!(list.items.len(), 1);
    }

    #[tokio::test]
    async fn unpublished_course_cannot_be_wished() {
        let state = test_state().await;
        let artist = seed_user(&state, role::ARTIST).await;
        let buyer = seed_user(&state, role::BUYER).await;
        let draft_id = seed_course(&state, &artist.id, false).await;

        let err = add_item(
            State(state.clone()),
            buyer,
            Json(AddWishlistItemRequest {
                item_type: ItemType::Course,
                item_id: draft_id,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }
}
