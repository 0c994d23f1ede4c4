//! Orders API Handlers
//! /api/orders エンドポイント - 注文作成（全明細検証後に書き込み）と履歴

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::auth::{require_role, Identity};
use crate::handlers::{clamp_paging, db_error, error_response, ApiError, Pagination};
use crate::models::{
    artwork_status, course_status, notification_kind, order_status, order_to_response,
    payout_status, role, Artwork, Course, CreateOrderRequest, ItemType, Order, OrderItem,
    OrderResponse, UpdateOrderStatusRequest,
};
use crate::notify::send_notification;
use crate::AppState;

// ========================================
// Response Types
// ========================================

#[derive(Debug, Serialize)]
pub struct OrderDetailResponse {
    pub success: bool,
    pub order: OrderResponse,
}

#[derive(Debug, Serialize)]
pub struct OrderListResponse {
    pub success: bool,
    pub orders: Vec<OrderResponse>,
    pub pagination: Pagination,
}

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

// ========================================
// 明細の検証
// ========================================

/// 検証済みの注文明細。価格はサーバ側カタログの値のみを信用する
struct ResolvedLine {
    item_type: ItemType,
    item_id: String,
    title: String,
    price: f64,
    artist_id: String,
}

/// 1明細を検証する。どれか1つでも失敗したら注文全体を拒否する
async fn resolve_line(
    state: &AppState,
    item_type: ItemType,
    item_id: &str,
) -> Result<ResolvedLine, ApiError> {
    match item_type {
        ItemType::Artwork => {
            let artwork: Option<Artwork> = sqlx::query_as("SELECT * FROM artworks WHERE id = ?")
                .bind(item_id)
                .fetch_optional(&state.db)
                .await
                .map_err(|e| db_error(state, e))?;
            let artwork = artwork.ok_or_else(|| {
                error_response(
                    StatusCode::BAD_REQUEST,
                    format!("Artwork {} not found", item_id),
                )
            })?;
            if artwork.status != artwork_status::APPROVED {
                return Err(error_response(
                    StatusCode::BAD_REQUEST,
                    format!("Artwork \"{}\" is no longer available", artwork.title),
                ));
            }
            Ok(ResolvedLine {
                item_type,
                item_id: artwork.id,
                title: artwork.title,
                price: artwork.price,
                artist_id: artwork.artist_id,
            })
        }
        ItemType::Course => {
            let course: Option<Course> = sqlx::query_as("SELECT * FROM courses WHERE id = ?")
                .bind(item_id)
                .fetch_optional(&state.db)
                .await
                .map_err(|e| db_error(state, e))?;
            let course = course.ok_or_else(|| {
                error_response(
                    StatusCode::BAD_REQUEST,
                    format!("Course {} not found", item_id),
                )
            })?;
            if course.status != course_status::PUBLISHED || course.is_approved != 1 {
                return Err(error_response(
                    StatusCode::BAD_REQUEST,
                    format!("Course \"{}\" is not available", course.title),
                ));
            }
            Ok(ResolvedLine {
                item_type,
                item_id: course.id,
                title: course.title,
                price: course.price as f64,
                artist_id: course.artist_id,
            })
        }
    }
}

async fn order_items(state: &AppState, order_id: &str) -> Result<Vec<OrderItem>, ApiError> {
    sqlx::query_as("SELECT * FROM order_items WHERE order_id = ? ORDER BY id")
        .bind(order_id)
        .fetch_all(&state.db)
        .await
        .map_err(|e| db_error(state, e))
}

// ========================================
// Handlers
// ========================================

/// POST /api/orders - 注文作成（購入者のみ）
///
/// 全明細を検証してから書き込む。検証に1件でも失敗したら何も書かない。
/// 後続の売却処理・受講登録・通知はベストエフォート。
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderDetailResponse>), ApiError> {
    require_role(&identity, &[role::BUYER])?;

    if req.items.is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Order must contain at least one item".to_string(),
        ));
    }
    if req.payment_ref.trim().is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "payment_ref is required".to_string(),
        ));
    }

    // 書き込み前に全明細を検証
    let mut lines = Vec::with_capacity(req.items.len());
    for item in &req.items {
        lines.push(resolve_line(&state, item.item_type, &item.item_id).await?);
    }

    let total: f64 = lines.iter().map(|l| l.price).sum();
    let now_ms = Utc::now().timestamp_millis();
    let order_id = Uuid::new_v4().to_string();
    let shipping_json = req
        .shipping_address
        .as_ref()
        .map(|v| v.to_string());

    sqlx::query(
        r#"
        INSERT INTO orders (id, buyer_id, total, payment_ref, shipping_address, status, payout_status, created_at_ms)
        VALUES (?, ?, ?, ?, ?, 'completed', 'pending', ?)
        "#,
    )
    .bind(&order_id)
    .bind(&identity.id)
    .bind(total)
    .bind(req.payment_ref.trim())
    .bind(&shipping_json)
    .bind(now_ms)
    .execute(&state.db)
    .await
    .map_err(|e| db_error(&state, e))?;

    for line in &lines {
        sqlx::query(
            "INSERT INTO order_items (order_id, item_type, item_id, title, price) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&order_id)
        .bind(line.item_type.as_str())
        .bind(&line.item_id)
        .bind(&line.title)
        .bind(line.price)
        .execute(&state.db)
        .await
        .map_err(|e| db_error(&state, e))?;
    }

    info!(
        "Order created: id={}, buyer={}, items={}, total={}",
        order_id,
        identity.id,
        lines.len(),
        total
    );

    // ここから先はベストエフォート。注文自体は既に成立している
    send_notification(
        &state.db,
        &identity.id,
        notification_kind::ORDER_CONFIRMED,
        &format!("Your order of {} item(s) has been confirmed", lines.len()),
        serde_json::json!({ "order_id": order_id, "total": total }),
    )
    .await;

    for line in &lines {
        match line.item_type {
            ItemType::Artwork => {
                if let Err(e) = sqlx::query(
                    "UPDATE artworks SET status = 'sold', sold_at_ms = ?, updated_at_ms = ? WHERE id = ?",
                )
                .bind(now_ms)
                .bind(now_ms)
                .bind(&line.item_id)
                .execute(&state.db)
                .await
                {
                    tracing::warn!("Failed to mark artwork {} sold: {}", line.item_id, e);
                }
                send_notification(
                    &state.db,
                    &line.artist_id,
                    notification_kind::ARTWORK_SOLD,
                    &format!("Your artwork \"{}\" has been sold", line.title),
                    serde_json::json!({ "order_id": order_id, "artwork_id": line.item_id }),
                )
                .await;
            }
            ItemType::Course => {
                if let Err(e) = sqlx::query(
                    "INSERT OR IGNORE INTO course_students (course_id, user_id, enrolled_at_ms) VALUES (?, ?, ?)",
                )
                .bind(&line.item_id)
                .bind(&identity.id)
                .bind(now_ms)
                .execute(&state.db)
                .await
                {
                    tracing::warn!("Failed to enroll buyer in course {}: {}", line.item_id, e);
                }
                send_notification(
                    &state.db,
                    &line.artist_id,
                    notification_kind::COURSE_ENROLLMENT,
                    &format!("{} purchased your course \"{}\"", identity.name, line.title),
                    serde_json::json!({ "order_id": order_id, "course_id": line.item_id }),
                )
                .await;
            }
        }
    }

    let order: Order = sqlx::query_as("SELECT * FROM orders WHERE id = ?")
        .bind(&order_id)
        .fetch_one(&state.db)
        .await
        .map_err(|e| db_error(&state, e))?;
    let items = order_items(&state, &order_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(OrderDetailResponse {
            success: true,
            order: order_to_response(&order, items),
        }),
    ))
}

/// GET /api/orders - 自分の注文履歴（購入者のみ、新しい順）
pub async fn list_my_orders(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<OrderListResponse>, ApiError> {
    require_role(&identity, &[role::BUYER])?;

    let (page, limit, offset) = clamp_paging(query.page, query.limit);

    let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders WHERE buyer_id = ?")
        .bind(&identity.id)
        .fetch_one(&state.db)
        .await
        .map_err(|e| db_error(&state, e))?;

    let orders: Vec<Order> = sqlx::query_as(
        "SELECT * FROM orders WHERE buyer_id = ? ORDER BY created_at_ms DESC LIMIT ? OFFSET ?",
    )
    .bind(&identity.id)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.db)
    .await
    .map_err(|e| db_error(&state, e))?;

    let mut responses = Vec::with_capacity(orders.len());
    for order in &orders {
        let items = order_items(&state, &order.id).await?;
        responses.push(order_to_response(order, items));
    }

    Ok(Json(OrderListResponse {
        success: true,
        orders: responses,
        pagination: Pagination::new(total.0, page, limit),
    }))
}

/// GET /api/orders/all - 全注文（管理者のみ）
pub async fn list_all_orders(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<OrderListResponse>, ApiError> {
    require_role(&identity, &[role::ADMIN])?;

    let (page, limit, offset) = clamp_paging(query.page, query.limit);

    let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders")
        .fetch_one(&state.db)
        .await
        .map_err(|e| db_error(&state, e))?;

    let orders: Vec<Order> =
        sqlx::query_as("SELECT * FROM orders ORDER BY created_at_ms DESC LIMIT ? OFFSET ?")
            .bind(limit)
            .bind(offset)
            .fetch_all(&state.db)
            .await
            .map_err(|e| db_error(&state, e))?;

    let mut responses = Vec::with_capacity(orders.len());
    for order in &orders {
        let items = order_items(&state, &order.id).await?;
        responses.push(order_to_response(order, items));
    }

    Ok(Json(OrderListResponse {
        success: true,
        orders: responses,
        pagination: Pagination::new(total.0, page, limit),
    }))
}

/// PUT /api/orders/:order_id/status - 配送/支払状況の更新（管理者のみ）
pub async fn update_order_status(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(order_id): Path<String>,
    Json(req): Json<UpdateOrderStatusRequest>,
) -> Result<Json<OrderDetailResponse>, ApiError> {
    require_role(&identity, &[role::ADMIN])?;

    if let Some(s) = &req.status {
        if !order_status::ALL.contains(&s.as_str()) {
            return Err(error_response(
                StatusCode::BAD_REQUEST,
                format!("Invalid order status: {}", s),
            ));
        }
    }
    if let Some(s) = &req.payout_status {
        if !payout_status::ALL.contains(&s.as_str()) {
            return Err(error_response(
                StatusCode::BAD_REQUEST,
                format!("Invalid payout status: {}", s),
            ));
        }
    }

    let order: Option<Order> = sqlx::query_as("SELECT * FROM orders WHERE id = ?")
        .bind(&order_id)
        .fetch_optional(&state.db)
        .await
        .map_err(|e| db_error(&state, e))?;
    let order = order
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "Order not found".to_string()))?;

    sqlx::query(
        "UPDATE orders SET status = COALESCE(?, status), payout_status = COALESCE(?, payout_status) WHERE id = ?",
    )
    .bind(&req.status)
    .bind(&req.payout_status)
    .bind(&order_id)
    .execute(&state.db)
    .await
    .map_err(|e| db_error(&state, e))?;

    // 配送状況が実際に変わったときだけ購入者へ通知
    if let Some(new_status) = &req.status {
        if *new_status != order.status {
            send_notification(
                &state.db,
                &order.buyer_id,
                notification_kind::ORDER_STATUS,
                &format!("Your order is now {}", new_status),
                serde_json::json!({ "order_id": order_id, "status": new_status }),
            )
            .await;
        }
    }

    info!("Order status updated: id={}", order_id);

    let updated: Order = sqlx::query_as("SELECT * FROM orders WHERE id = ?")
        .bind(&order_id)
        .fetch_one(&state.db)
        .await
        .map_err(|e| db_error(&state, e))?;
    let items = order_items(&state, &order_id).await?;

    Ok(Json(OrderDetailResponse {
        success: true,
        order: order_to_response(&updated, items),
    }))
}
