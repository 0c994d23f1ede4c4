//! Cart API Handlers
//! /api/cart エンドポイント - 購入者のカート（追加時点のスナップショット保持）

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
use crate::handlers::{db_error, error_response, ApiError};
use crate::models::{
    artwork_status, course_status, parse_string_list, role, AddCartItemRequest, Artwork, CartItem,
    Course, ItemType, UpdateCartQuantityRequest,
};
use crate::AppState;

// ========================================
// Response Types
// ========================================

#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub success: bool,
    pub items: Vec<CartItem>,
    pub total: f64,
}

#[derive(Debug, Serialize)]
pub struct CartMutationResponse {
    pub success: bool,
    pub item: CartItem,
}

#[derive(Debug, Serialize)]
pub struct CartRemoveResponse {
    pub success: bool,
}

// ========================================
// カタログ参照の解決（cart / wishlist 共通）
// ========================================

/// 追加時にカタログから写し取るスナップショット
pub(super) struct ResolvedCatalogItem {
    pub title: String,
    pub price: f64,
    pub thumbnail_url: Option<String>,
    /// 作品のみ在庫を持つ。講座は None
    pub stock: Option<i64>,
}

/// (item_type, item_id) を実在のカタログ項目へ解決する。
/// 存在しなければ 404、存在するが購入可能な状態でなければ 400。
pub(super) async fn resolve_catalog_item(
    state: &AppState,
    item_type: ItemType,
    item_id: &str,
) -> Result<ResolvedCatalogItem, ApiError> {
    match item_type {
        ItemType::Artwork => {
            let artwork: Option<Artwork> = sqlx::query_as("SELECT * FROM artworks WHERE id = ?")
                .bind(item_id)
                .fetch_optional(&state.db)
                .await
                .map_err(|e| db_error(state, e))?;
            let artwork = artwork.ok_or_else(|| {
                error_response(StatusCode::NOT_FOUND, "Item not found".to_string())
            })?;
            if artwork.status != artwork_status::APPROVED {
                return Err(error_response(
                    StatusCode::BAD_REQUEST,
                    "Artwork is not available".to_string(),
                ));
            }
            Ok(ResolvedCatalogItem {
                title: artwork.title,
                price: artwork.price,
                thumbnail_url: parse_string_list(&artwork.images).into_iter().next(),
                stock: Some(artwork.stock),
            })
        }
        ItemType::Course => {
            let course: Option<Course> = sqlx::query_as("SELECT * FROM courses WHERE id = ?")
                .bind(item_id)
                .fetch_optional(&state.db)
                .await
                .map_err(|e| db_error(state, e))?;
            let course = course.ok_or_else(|| {
                error_response(StatusCode::NOT_FOUND, "Item not found".to_string())
            })?;
            if course.status != course_status::PUBLISHED || course.is_approved != 1 {
                return Err(error_response(
                    StatusCode::BAD_REQUEST,
                    "Course is not available".to_string(),
                ));
            }
            Ok(ResolvedCatalogItem {
                title: course.title,
                price: course.price as f64,
                thumbnail_url: course.thumbnail_url,
                stock: None,
            })
        }
    }
}

// ========================================
// Handlers
// ========================================

/// GET /api/cart - カート取得（合計は都度計算）
pub async fn get_cart(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<CartResponse>, ApiError> {
    require_role(&identity, &[role::BUYER])?;

    let items: Vec<CartItem> =
        sqlx::query_as("SELECT * FROM cart_items WHERE user_id = ? ORDER BY added_at_ms DESC")
            .bind(&identity.id)
            .fetch_all(&state.db)
            .await
            .map_err(|e| db_error(&state, e))?;

    let total = items.iter().map(|i| i.price * i.quantity as f64).sum();

    Ok(Json(CartResponse {
        success: true,
        items,
        total,
    }))
}

/// POST /api/cart/items - カート追加（重複は数量をマージ）
pub async fn add_item(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(req): Json<AddCartItemRequest>,
) -> Result<(StatusCode, Json<CartMutationResponse>), ApiError> {
    require_role(&identity, &[role::BUYER])?;

    if req.quantity < 1 {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "quantity must be at least 1".to_string(),
        ));
    }

    let resolved = resolve_catalog_item(&state, req.item_type, &req.item_id).await?;
    // 講座は数量の概念を持たない
    let requested = match req.item_type {
        ItemType::Artwork => req.quantity,
        ItemType::Course => 1,
    };

    let existing: Option<CartItem> = sqlx::query_as(
        "SELECT * FROM cart_items WHERE user_id = ? AND item_type = ? AND item_id = ?",
    )
    .bind(&identity.id)
    .bind(req.item_type.as_str())
    .bind(&req.item_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| db_error(&state, e))?;

    let merged = match (&existing, req.item_type) {
        (Some(row), ItemType::Artwork) => row.quantity + requested,
        _ => requested,
    };

    if let Some(stock) = resolved.stock {
        if merged > stock {
            return Err(error_response(
                StatusCode::BAD_REQUEST,
                format!("Only {} available in stock", stock),
            ));
        }
    }

    let now_ms = Utc::now().timestamp_millis();
    let item = match existing {
        Some(row) => {
            sqlx::query("UPDATE cart_items SET quantity = ? WHERE id = ?")
                .bind(merged)
                .bind(&row.id)
                .execute(&state.db)
                .await
                .map_err(|e| db_error(&state, e))?;
            CartItem {
                quantity: merged,
                ..row
            }
        }
        None => {
            let item = CartItem {
                id: Uuid::new_v4().to_string(),
                user_id: identity.id.clone(),
                item_type: req.item_type.as_str().to_string(),
                item_id: req.item_id.clone(),
                title: resolved.title,
                price: resolved.price,
                thumbnail_url: resolved.thumbnail_url,
                quantity: merged,
                added_at_ms: now_ms,
            };
            sqlx::query(
                r#"
                INSERT INTO cart_items (id, user_id, item_type, item_id, title, price, thumbnail_url, quantity, added_at_ms)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&item.id)
            .bind(&item.user_id)
            .bind(&item.item_type)
            .bind(&item.item_id)
            .bind(&item.title)
            .bind(item.price)
            .bind(&item.thumbnail_url)
            .bind(item.quantity)
            .bind(item.added_at_ms)
            .execute(&state.db)
            .await
            .map_err(|e| db_error(&state, e))?;
            item
        }
    };

    info!(
        "Cart add: user={}, {}={}, quantity={}",
        identity.id, item.item_type, item.item_id, item.quantity
    );

    Ok((
        StatusCode::CREATED,
        Json(CartMutationResponse {
            success: true,
            item,
        }),
    ))
}

/// PUT /api/cart/items/:item_id - 数量変更（現在の在庫で再チェック）
pub async fn update_quantity(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(item_id): Path<String>,
    Json(req): Json<UpdateCartQuantityRequest>,
) -> Result<Json<CartMutationResponse>, ApiError> {
    require_role(&identity, &[role::BUYER])?;

    if req.quantity < 1 {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "quantity must be at least 1".to_string(),
        ));
    }

    let row: Option<CartItem> = sqlx::query_as("SELECT * FROM cart_items WHERE id = ? AND user_id = ?")
        .bind(&item_id)
        .bind(&identity.id)
        .fetch_optional(&state.db)
        .await
        .map_err(|e| db_error(&state, e))?;
    let row = row.ok_or_else(|| {
        error_response(StatusCode::NOT_FOUND, "Cart item not found".to_string())
    })?;

    if let Some(item_type) = ItemType::parse(&row.item_type) {
        let resolved = resolve_catalog_item(&state, item_type, &row.item_id).await?;
        if let Some(stock) = resolved.stock {
            if req.quantity > stock {
                return Err(error_response(
                    StatusCode::BAD_REQUEST,
                    format!("Only {} available in stock", stock),
                ));
            }
        }
    }

    sqlx::query("UPDATE cart_items SET quantity = ? WHERE id = ?")
        .bind(req.quantity)
        .bind(&row.id)
        .execute(&state.db)
        .await
        .map_err(|e| db_error(&state, e))?;

    Ok(Json(CartMutationResponse {
        success: true,
        item: CartItem {
            quantity: req.quantity,
            ..row
        },
    }))
}

/// DELETE /api/cart/items/:item_id - 1件削除（存在しなくても成功）
pub async fn remove_item(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(item_id): Path<String>,
) -> Result<Json<CartRemoveResponse>, ApiError> {
    require_role(&identity, &[role::BUYER])?;

    sqlx::query("DELETE FROM cart_items WHERE id = ? AND user_id = ?")
        .bind(&item_id)
        .bind(&identity.id)
        .execute(&state.db)
        .await
        .map_err(|e| db_error(&state, e))?;

    Ok(Json(CartRemoveResponse { success: true }))
}

/// DELETE /api/cart - 全削除
pub async fn clear_cart(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<CartRemoveResponse>, ApiError> {
    require_role(&identity, &[role::BUYER])?;

    sqlx::query("DELETE FROM cart_items WHERE user_id = ?")
        .bind(&identity.id)
        .execute(&state.db)
        .await
        .map_err(|e| db_error(&state, e))?;

    info!("Cart cleared: user={}", identity.id);

    Ok(Json(CartRemoveResponse { success: true }))
}

#[cfg(test)]
mod tests {
    use super::*;
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

    async fn seed_artwork(state: &Arc<AppState>, artist_id: &str, status: &str, stock: i64) -> String {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO artworks (id, artist_id, title, description, category, price, stock, images, tags, status, views, likes, created_at_ms, updated_at_ms)
            VALUES (?, ?, 'Dusk', '', 'painting', 120.0, ?, '["http://localhost:8080/media/a/1.jpg"]', '[]', ?, 0, 0, 0, 0)
            "#,
        )
        .bind(&id)
        .bind(artist_id)
        .bind(stock)
        .bind(status)
        .execute(&state.db)
        .await
        .unwrap();
        id
    }

    #[tokio::test]
    async fn duplicate_adds_merge_quantities_up_to_stock() {
        let state = test_state().await;
        let artist = seed_user(&state, role::ARTIST).await;
        let buyer = seed_user(&state, role::BUYER).await;
        let artwork_id = seed_artwork(&state, &artist.id, "approved", 3).await;

        let add = |qty: i64| {
            add_item(
                State(state.clone()),
                buyer.clone(),
                Json(AddCartItemRequest {
                    item_type: ItemType::Artwork,
                    item_id: artwork_id.clone(),
                    quantity: qty,
                }),
            )
        };

        let (status, Json(first)) = add(2).await.unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(first.item.quantity, 2);
        assert_eq!(first.item.title, "Dusk");

        let (_, Json(second)) = add(1).await.unwrap();
        assert_eq!(second.item.quantity, 3);
        assert_eq!(second.item.id, first.item.id);

        // 在庫 3 を超えるマージは拒否
        let err = add(1).await.unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert!(err.1.error.contains("Only 3 available"));

        let Json(cart) = get_cart(State(state.clone()), buyer).await.unwrap();
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.total, 360.0);
    }

    #[tokio::test]
    async fn unapproved_artwork_cannot_be_added() {
        let state = test_state().await;
        let artist = seed_user(&state, role::ARTIST).await;
        let buyer = seed_user(&state, role::BUYER).await;
        let pending = seed_artwork(&state, &artist.id, "pending", 1).await;

        let err = add_item(
            State(state.clone()),
            buyer.clone(),
            Json(AddCartItemRequest {
                item_type: ItemType::Artwork,
                item_id: pending,
                quantity: 1,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);

        let err = add_item(
            State(state.clone()),
            buyer,
            Json(AddCartItemRequest {
                item_type: ItemType::Artwork,
                item_id: "missing".to_string(),
                quantity: 1,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn removal_is_idempotent() {
        let state = test_state().await;
        let buyer = seed_user(&state, role::BUYER).await;

        let Json(body) = remove_item(
            State(state.clone()),
            buyer.clone(),
            Path("does-not-exist".to_string()),
        )
        .await
        .unwrap();
        assert!(body.success);

        let Json(body) = clear_cart(State(state.clone()), buyer).await.unwrap();
        assert!(body.success);
    }

    #[tokio::test]
    async fn quantity_update_rechecks_current_stock() {
        let state = test_state().await;
        let artist = seed_user(&state, role::ARTIST).await;
        let buyer = seed_user(&state, role::BUYER).await;
        let artwork_id = seed_artwork(&state, &artist.id, "approved", 5).await;

        let (_, Json(added)) = add_item(
            State(state.clone()),
            buyer.clone(),
            Json(AddCartItemRequest {
                item_type: ItemType::Artwork,
                item_id: artwork_id.clone(),
                quantity: 1,
            }),
        )
        .await
        .unwrap();

        // 追加後に在庫が減った場合
        sqlx::query("UPDATE artworks SET stock = 2 WHERE id = ?")
            .bind(&artwork_id)
            .execute(&state.db)
            .await
            .unwrap();

        let err = update_quantity(
            State(state.clone()),
            buyer.clone(),
            Path(added.item.id.clone()),
            Json(UpdateCartQuantityRequest { quantity: 4 }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);

        let Json(ok) = update_quantity(
            State(state.clone()),
            buyer,
            Path(added.item.id),
            Json(UpdateCartQuantityRequest { quantity: 2 }),
        )
        .await
        .unwrap();
        assert_eq!(ok.item.quantity, 2);
    }
}
