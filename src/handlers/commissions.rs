//! Commissions API Handlers
//! /api/commissions エンドポイント - 制作依頼とメッセージスレッド

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

use crate::auth::{is_admin, require_role, Identity};
use crate::handlers::{clamp_paging, db_error, error_response, ApiError, Pagination};
use crate::models::{
    commission_status, notification_kind, role, AddCommissionMessageRequest, Commission,
    CommissionMessage, CommissionResponse, CreateCommissionRequest, UpdateCommissionStatusRequest,
    User,
};
use crate::notify::send_notification;
use crate::AppState;

// ========================================
// Response Types
// ========================================

#[derive(Debug, Serialize)]
pub struct CommissionDetailResponse {
    pub success: bool,
    pub commission: CommissionResponse,
}

#[derive(Debug, Serialize)]
pub struct CommissionListResponse {
    pub success: bool,
    pub commissions: Vec<CommissionResponse>,
    pub pagination: Pagination,
}

#[derive(Debug, Deserialize)]
pub struct ListCommissionsQuery {
    pub status: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

// ========================================
// Helpers
// ========================================

async fn fetch_commission(state: &AppState, id: &str) -> Result<Commission, ApiError> {
    let row: Option<Commission> = sqlx::query_as("SELECT * FROM commissions WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await
        .map_err(|e| db_error(state, e))?;
    row.ok_or_else(|| error_response(StatusCode::NOT_FOUND, "Commission not found".to_string()))
}

async fn user_name(state: &AppState, user_id: &str) -> Result<Option<String>, ApiError> {
    let row: Option<(String,)> = sqlx::query_as("SELECT name FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&state.db)
        .await
        .map_err(|e| db_error(state, e))?;
    Ok(row.map(|(name,)| name))
}

/// 依頼 + 当事者名 + メッセージスレッドを1つのレスポンスへ
async fn commission_response(
    state: &AppState,
    commission: &Commission,
) -> Result<CommissionResponse, ApiError> {
    let messages: Vec<CommissionMessage> = sqlx::query_as(
        "SELECT * FROM commission_messages WHERE commission_id = ? ORDER BY sent_at_ms, id",
    )
    .bind(&commission.id)
    .fetch_all(&state.db)
    .await
    .map_err(|e| db_error(state, e))?;

    Ok(CommissionResponse {
        id: commission.id.clone(),
        buyer_id: commission.buyer_id.clone(),
        buyer_name: user_name(state, &commission.buyer_id).await?,
        artist_id: commission.artist_id.clone(),
        artist_name: user_name(state, &commission.artist_id).await?,
        title: commission.title.clone(),
        description: commission.description.clone(),
        budget: commission.budget,
        deadline_ms: commission.deadline_ms,
        status: commission.status.clone(),
        messages,
        created_at_ms: commission.created_at_ms,
        updated_at_ms: commission.updated_at_ms,
    })
}

/// 当事者（依頼者/アーティスト）か管理者だけが閲覧できる
fn can_view(identity: &Identity, commission: &Commission) -> bool {
    identity.id == commission.buyer_id
        || identity.id == commission.artist_id
        || is_admin(identity)
}

// ========================================
// Handlers
// ========================================

/// POST /api/commissions - 依頼作成（購入者のみ）
///
/// 依頼文は最初のメッセージとしてスレッドにも積む。
pub async fn create_commission(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(req): Json<CreateCommissionRequest>,
) -> Result<(StatusCode, Json<CommissionDetailResponse>), ApiError> {
    require_role(&identity, &[role::BUYER])?;

    if req.title.trim().is_empty() || req.description.trim().is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "title and description are required".to_string(),
        ));
    }
    if req.budget < 0.0 {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "budget must not be negative".to_string(),
        ));
    }

    let artist: Option<User> =
        sqlx::query_as("SELECT * FROM users WHERE id = ? AND role = ? AND is_active = 1")
            .bind(&req.artist_id)
            .bind(role::ARTIST)
            .fetch_optional(&state.db)
            .await
            .map_err(|e| db_error(&state, e))?;
    let artist = artist.ok_or_else(|| {
        error_response(StatusCode::BAD_REQUEST, "Artist not found".to_string())
    })?;

    let now_ms = Utc::now().timestamp_millis();
    let commission_id = Uuid::new_v4().to_string();

    sqlx::query(
        r#"
        INSERT INTO commissions (id, buyer_id, artist_id, title, description, budget, deadline_ms, status, created_at_ms, updated_at_ms)
        VALUES (?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?)
        "#,
    )
    .bind(&commission_id)
    .bind(&identity.id)
    .bind(&artist.id)
    .bind(req.title.trim())
    .bind(req.description.trim())
    .bind(req.budget)
    .bind(req.deadline_ms)
    .bind(now_ms)
    .bind(now_ms)
    .execute(&state.db)
    .await
    .map_err(|e| db_error(&state, e))?;

    sqlx::query(
        "INSERT INTO commission_messages (commission_id, sender_role, content, sent_at_ms) VALUES (?, 'buyer', ?, ?)",
    )
    .bind(&commission_id)
    .bind(req.description.trim())
    .bind(now_ms)
    .execute(&state.db)
    .await
    .map_err(|e| db_error(&state, e))?;

    send_notification(
        &state.db,
        &artist.id,
        notification_kind::COMMISSION_REQUEST,
        &format!("{} requested a commission: \"{}\"", identity.name, req.title.trim()),
        serde_json::json!({ "commission_id": commission_id }),
    )
    .await;

    info!(
        "Commission created: id={}, buyer={}, artist={}",
        commission_id, identity.id, artist.id
    );

    let commission = fetch_commission(&state, &commission_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(CommissionDetailResponse {
            success: true,
            commission: commission_response(&state, &commission).await?,
        }),
    ))
}

/// GET /api/commissions - 自分に関係する依頼一覧（管理者は全件）
pub async fn list_commissions(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Query(query): Query<ListCommissionsQuery>,
) -> Result<Json<CommissionListResponse>, ApiError> {
    let (page, limit, offset) = clamp_paging(query.page, query.limit);

    // ロールで自分側のカラムに絞る
    let (scope_sql, scope_bind): (&str, Option<&str>) = match identity.role.as_str() {
        r if r == role::ADMIN => ("", None),
        r if r == role::ARTIST => (" AND artist_id = ?", Some(identity.id.as_str())),
        _ => (" AND buyer_id = ?", Some(identity.id.as_str())),
    };
    let status_sql = if query.status.is_some() {
        " AND status = ?"
    } else {
        ""
    };

    let count_sql = format!(
        "SELECT COUNT(*) FROM commissions WHERE 1=1{}{}",
        scope_sql, status_sql
    );
    let mut count_query = sqlx::query_as::<_, (i64,)>(&count_sql);
    if let Some(id) = scope_bind {
        count_query = count_query.bind(id);
    }
    if let Some(s) = &query.status {
        count_query = count_query.bind(s);
    }
    let total = count_query
        .fetch_one(&state.db)
        .await
        .map_err(|e| db_error(&state, e))?;

    let list_sql = format!(
        "SELECT * FROM commissions WHERE 1=1{}{} ORDER BY updated_at_ms DESC LIMIT ? OFFSET ?",
        scope_sql, status_sql
    );
    let mut list_query = sqlx::query_as::<_, Commission>(&list_sql);
    if let Some(id) = scope_bind {
        list_query = list_query.bind(id);
    }
    if let Some(s) = &query.status {
        list_query = list_query.bind(s);
    }
    let rows = list_query
        .bind(limit)
        .bind(offset)
        .fetch_all(&state.db)
        .await
        .map_err(|e| db_error(&state, e))?;

    let mut commissions = Vec::with_capacity(rows.len());
    for row in &rows {
        commissions.push(commission_response(&state, row).await?);
    }

    Ok(Json(CommissionListResponse {
        success: true,
        commissions,
        pagination: Pagination::new(total.0, page, limit),
    }))
}

/// GET /api/commissions/:commission_id - 依頼詳細（当事者と管理者のみ）
pub async fn get_commission(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(commission_id): Path<String>,
) -> Result<Json<CommissionDetailResponse>, ApiError> {
    let commission = fetch_commission(&state, &commission_id).await?;
    if !can_view(&identity, &commission) {
        return Err(error_response(
            StatusCode::FORBIDDEN,
            "Not a participant in this commission".to_string(),
        ));
    }

    Ok(Json(CommissionDetailResponse {
        success: true,
        commission: commission_response(&state, &commission).await?,
    }))
}

/// POST /api/commissions/:commission_id/messages - メッセージ追記（当事者のみ）
pub async fn add_message(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(commission_id): Path<String>,
    Json(req): Json<AddCommissionMessageRequest>,
) -> Result<Json<CommissionDetailResponse>, ApiError> {
    if req.content.trim().is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "content must not be empty".to_string(),
        ));
    }

    let commission = fetch_commission(&state, &commission_id).await?;
    // 送信者は当事者のどちらか。管理者でも第三者は書き込めない
    let (sender_role, recipient_id) = if identity.id == commission.buyer_id {
        ("buyer", commission.artist_id.clone())
    } else if identity.id == commission.artist_id {
        ("artist", commission.buyer_id.clone())
    } else {
        return Err(error_response(
            StatusCode::FORBIDDEN,
            "Not a participant in this commission".to_string(),
        ));
    };

    let now_ms = Utc::now().timestamp_millis();
    sqlx::query(
        "INSERT INTO commission_messages (commission_id, sender_role, content, sent_at_ms) VALUES (?, ?, ?, ?)",
    )
    .bind(&commission_id)
    .bind(sender_role)
    .bind(req.content.trim())
    .bind(now_ms)
    .execute(&state.db)
    .await
    .map_err(|e| db_error(&state, e))?;

    sqlx::query("UPDATE commissions SET updated_at_ms = ? WHERE id = ?")
        .bind(now_ms)
        .bind(&commission_id)
        .execute(&state.db)
        .await
        .map_err(|e| db_error(&state, e))?;

    send_notification(
        &state.db,
        &recipient_id,
        notification_kind::COMMISSION_MESSAGE,
        &format!("New message on commission \"{}\"", commission.title),
        serde_json::json!({ "commission_id": commission_id }),
    )
    .await;

    let updated = fetch_commission(&state, &commission_id).await?;
    Ok(Json(CommissionDetailResponse {
        success: true,
        commission: commission_response(&state, &updated).await?,
    }))
}

/// PUT /api/commissions/:commission_id/status - 状態遷移（担当アーティストのみ）
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(commission_id): Path<String>,
    Json(req): Json<UpdateCommissionStatusRequest>,
) -> Result<Json<CommissionDetailResponse>, ApiError> {
    let commission = fetch_commission(&state, &commission_id).await?;

    // 管理者であっても担当アーティスト本人以外は遷移できない
    if identity.id != commission.artist_id {
        return Err(error_response(
            StatusCode::FORBIDDEN,
            "Only the assigned artist can update this commission".to_string(),
        ));
    }
    if !commission_status::TRANSITION_TARGETS.contains(&req.status.as_str()) {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            format!("Invalid commission status: {}", req.status),
        ));
    }

    let now_ms = Utc::now().timestamp_millis();
    sqlx::query("UPDATE commissions SET status = ?, updated_at_ms = ? WHERE id = ?")
        .bind(&req.status)
        .bind(now_ms)
        .bind(&commission_id)
        .execute(&state.db)
        .await
        .map_err(|e| db_error(&state, e))?;

    send_notification(
        &state.db,
        &commission.buyer_id,
        notification_kind::COMMISSION_STATUS,
        &format!(
            "Your commission \"{}\" is now {}",
            commission.title, req.status
        ),
        serde_json::json!({ "commission_id": commission_id, "status": req.status }),
    )
    .await;

    info!(
        "Commission status: id={}, status={}",
        commission_id, req.status
    );

    let updated = fetch_commission(&state, &commission_id).await?;
    Ok(Json(CommissionDetailResponse {
        success: true,
        commission: commission_response(&state, &updated).await?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_state;

    async fn seed_user(state: &Arc<AppState>, user_role: &str, name: &str) -> Identity {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO users (id, email, password_hash, name, role, is_active, created_at_ms, updated_at_ms) VALUES (?, ?, 'h', ?, ?, 1, 0, 0)",
        )
        .bind(&id)
        .bind(format!("{}@x.com", id))
        .bind(name)
        .bind(user_role)
        .execute(&state.db)
        .await
        .unwrap();
        Identity {
            id,
            role: user_role.to_string(),
            email: "t@x.com".to_string(),
            name: name.to_string(),
        }
    }

    async fn seed_commission(
        state: &Arc<AppState>,
        buyer: &Identity,
        artist: &Identity,
    ) -> String {
        let (_, Json(body)) = create_commission(
            State(state.clone()),
            buyer.clone(),
            Json(CreateCommissionRequest {
                artist_id: artist.id.clone(),
                title: "Pet portrait".to_string(),
                description: "A4 watercolor of my cat".to_string(),
                budget: 200.0,
                deadline_ms: None,
            }),
        )
        .await
        .unwrap();
        body.commission.id
    }

    #[tokio::test]
    async fn creation_seeds_the_message_thread() {
        let state = test_state().await;
        let buyer = seed_user(&state, role::BUYER, "Mika").await;
        let artist = seed_user(&state, role::ARTIST, "Ren").await;

        let id = seed_commission(&state, &buyer, &artist).await;
        let Json(body) = get_commission(State(state.clone()), buyer.clone(), Path(id))
            .await
            .unwrap();

        assert_eq!(body.commission.status, "pending");
        assert_eq!(body.commission.buyer_name.as_deref(), Some("Mika"));
        assert_eq!(body.commission.artist_name.as_deref(), Some("Ren"));
        assert_eq!(body.commission.messages.len(), 1);
        assert_eq!(body.commission.messages[0].sender_role, "buyer");
        assert_eq!(body.commission.messages[0].content, "A4 watercolor of my cat");
    }

    #[tokio::test]
    async fn only_participants_can_view_or_message() {
        let state = test_state().await;
        let buyer = seed_user(&state, role::BUYER, "Mika").await;
        let artist = seed_user(&state, role::ARTIST, "Ren").await;
        let stranger = seed_user(&state, role::BUYER, "Kai").await;
        let admin = seed_user(&state, role::ADMIN, "Ops").await;

        let id = seed_commission(&state, &buyer, &artist).await;

        let err = get_commission(State(state.clone()), stranger.clone(), Path(id.clone()))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::FORBIDDEN);

        // 管理者は閲覧できるが書き込めない
        get_commission(State(state.clone()), admin.clone(), Path(id.clone()))
            .await
            .unwrap();
        let err = add_message(
            State(state.clone()),
            admin,
            Path(id.clone()),
            Json(AddCommissionMessageRequest {
                content: "checking in".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::FORBIDDEN);

        let Json(body) = add_message(
            State(state.clone()),
            artist,
            Path(id),
            Json(AddCommissionMessageRequest {
                content: "Happy to take this on".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(body.commission.messages.len(), 2);
        assert_eq!(body.commission.messages[1].sender_role, "artist");
    }

    #[tokio::test]
    async fn only_the_assigned_artist_moves_the_status() {
        let state = test_state().await;
        let buyer = seed_user(&state, role::BUYER, "Mika").await;
        let artist = seed_user(&state, role::ARTIST, "Ren").await;
        let admin = seed_user(&state, role::ADMIN, "Ops").await;

        let id = seed_commission(&state, &buyer, &artist).await;

        let err = update_status(
            State(state.clone()),
            admin,
            Path(id.clone()),
            Json(UpdateCommissionStatusRequest {
                status: "accepted".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::FORBIDDEN);

        // cancelled は遷移先として受け付けない
        let err = update_status(
            State(state.clone()),
            artist.clone(),
            Path(id.clone()),
            Json(UpdateCommissionStatusRequest {
                status: "cancelled".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);

        let Json(body) = update_status(
            State(state.clone()),
            artist,
            Path(id),
            Json(UpdateCommissionStatusRequest {
                status: "accepted".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(body.commission.status, "accepted");

        // 依頼者に状態変更の通知が届く
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ? AND kind = 'commission_status'",
        )
        .bind(&buyer.id)
        .fetch_one(&state.db)
        .await
        .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn listing_is_scoped_by_role() {
        let state = test_state().await;
        let buyer = seed_user(&state, role::BUYER, "Mika").await;
        let other_buyer = seed_user(&state, role::BUYER, "Kai").await;
        let artist = seed_user(&state, role::ARTIST, "Ren").await;
        let admin = seed_user(&state, role::ADMIN, "Ops").await;

        seed_commission(&state, &buyer, &artist).await;
        seed_commission(&state, &other_buyer, &artist).await;

        let query = || {
            Query(ListCommissionsQuery {
                status: None,
                page: None,
                limit: None,
            })
        };

        let Json(mine) = list_commissions(State(state.clone()), buyer, query())
            .await
            .unwrap();
        assert_eq!(mine.pagination.total, 1);

        let Json(assigned) = list_commissions(State(state.clone()), artist, query())
            .await
            .unwrap();
        assert_eq!(assigned.pagination.total, 2);

        let Json(all) = list_commissions(State(state.clone()), admin, query())
            .await
            .unwrap();
        assert_eq!(all.pagination.total, 2);
    }
}
