//! Artworks API Handlers
//! /api/artworks エンドポイント - 作品CRUD、審査状態機械、一覧フィルタ

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::auth::{is_admin, require_role, Identity, MaybeIdentity};
use crate::handlers::{clamp_paging, db_error, error_response, ApiError, Pagination};
use crate::media;
use crate::models::{
    artwork_status, artwork_to_response, notification_kind, parse_string_list, role, Artwork,
    ArtworkResponse, CreateArtworkRequest, RejectRequest, UpdateArtworkRequest,
    ARTWORK_CATEGORIES, REJECTION_REASONS,
};
use crate::notify::send_notification;
use crate::AppState;

// ========================================
// Response Types
// ========================================

#[derive(Debug, Serialize)]
pub struct ArtworkListResponse {
    pub success: bool,
    pub artworks: Vec<ArtworkResponse>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct ArtworkDetailResponse {
    pub success: bool,
    pub artwork: ArtworkResponse,
}

#[derive(Debug, Serialize)]
pub struct ArtworkDeleteResponse {
    pub success: bool,
    pub message: String,
}

// ========================================
// Query Parameters
// ========================================

#[derive(Debug, Deserialize)]
pub struct ListArtworksQuery {
    pub category: Option<String>,
    pub artist_id: Option<String>,
    pub status: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub search: Option<String>,
    pub sort: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// 公開一覧は常に approved。明示の status 指定は
/// 管理者か、自分の作品に絞ったアーティストにのみ許す（"all" で全件）。
fn effective_status(query: &ListArtworksQuery, viewer: &Option<Identity>) -> Option<String> {
    let requested = match &query.status {
        Some(s) => s,
        None => return Some(artwork_status::APPROVED.to_string()),
    };
    let privileged = match viewer {
        Some(v) if v.role == role::ADMIN => true,
        Some(v) if v.role == role::ARTIST => {
            query.artist_id.as_deref() == Some(v.id.as_str())
        }
        _ => false,
    };
    if !privileged {
        return Some(artwork_status::APPROVED.to_string());
    }
    if requested == "all" {
        None
    } else {
        Some(requested.clone())
    }
}

fn push_filters<'a>(
    qb: &mut QueryBuilder<'a, Sqlite>,
    query: &'a ListArtworksQuery,
    status: &'a Option<String>,
    pattern: &'a Option<String>,
) {
    if let Some(s) = status {
        qb.push(" AND status = ").push_bind(s);
    }
    if let Some(c) = &query.category {
        qb.push(" AND category = ").push_bind(c);
    }
    if let Some(a) = &query.artist_id {
        qb.push(" AND artist_id = ").push_bind(a);
    }
    if let Some(p) = query.min_price {
        qb.push(" AND price >= ").push_bind(p);
    }
    if let Some(p) = query.max_price {
        qb.push(" AND price <= ").push_bind(p);
    }
    if let Some(pat) = pattern {
        qb.push(" AND (title LIKE ")
            .push_bind(pat)
            .push(" OR description LIKE ")
            .push_bind(pat)
            .push(")");
    }
}

// ========================================
// Handlers
// ========================================

/// GET /api/artworks - 作品一覧（フィルタ/ソート/ページネーション）
pub async fn list_artworks(
    State(state): State<Arc<AppState>>,
    MaybeIdentity(viewer): MaybeIdentity,
    Query(query): Query<ListArtworksQuery>,
) -> Result<Json<ArtworkListResponse>, ApiError> {
    let (page, limit, offset) = clamp_paging(query.page, query.limit);
    let status = effective_status(&query, &viewer);
    let pattern = query.search.as_deref().map(|s| format!("%{}%", s.trim()));

    let order = match query.sort.as_deref() {
        None | Some("newest") => "created_at_ms DESC",
        Some("oldest") => "created_at_ms ASC",
        Some("price_asc") => "price ASC",
        Some("price_desc") => "price DESC",
        // rating データは持たないため人気順の別名として受ける
        Some("popular") | Some("rating") => "views DESC, likes DESC",
        Some("title") => "title COLLATE NOCASE ASC",
        Some(other) => {
            return Err(error_response(
                StatusCode::BAD_REQUEST,
                format!("Invalid sort: {}", other),
            ));
        }
    };

    let mut count_qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM artworks WHERE 1=1");
    push_filters(&mut count_qb, &query, &status, &pattern);
    let total: (i64,) = count_qb
        .build_query_as()
        .fetch_one(&state.db)
        .await
        .map_err(|e| db_error(&state, e))?;

    let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM artworks WHERE 1=1");
    push_filters(&mut qb, &query, &status, &pattern);
    qb.push(" ORDER BY ")
        .push(order)
        .push(" LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    let artworks: Vec<Artwork> = qb
        .build_query_as()
        .fetch_all(&state.db)
        .await
        .map_err(|e| db_error(&state, e))?;

    Ok(Json(ArtworkListResponse {
        success: true,
        artworks: artworks.iter().map(artwork_to_response).collect(),
        pagination: Pagination::new(total.0, page, limit),
    }))
}

/// GET /api/artworks/:artwork_id - 作品詳細
///
/// 閲覧カウンタを読み取りの副作用としてインクリメントする。
/// 未承認の作品は所有アーティストと管理者以外には見せない。
pub async fn get_artwork(
    State(state): State<Arc<AppState>>,
    MaybeIdentity(viewer): MaybeIdentity,
    Path(artwork_id): Path<String>,
) -> Result<Json<ArtworkDetailResponse>, ApiError> {
    let artwork: Option<Artwork> = sqlx::query_as("SELECT * FROM artworks WHERE id = ?")
        .bind(&artwork_id)
        .fetch_optional(&state.db)
        .await
        .map_err(|e| db_error(&state, e))?;

    let mut artwork = artwork.ok_or_else(|| {
        error_response(StatusCode::NOT_FOUND, "Artwork not found".to_string())
    })?;

    if artwork.status != artwork_status::APPROVED {
        let allowed = viewer
            .as_ref()
            .map(|v| v.id == artwork.artist_id || v.role == role::ADMIN)
            .unwrap_or(false);
        if !allowed {
            return Err(error_response(
                StatusCode::FORBIDDEN,
                "Artwork is not publicly visible".to_string(),
            ));
        }
    }

    sqlx::query("UPDATE artworks SET views = views + 1 WHERE id = ?")
        .bind(&artwork.id)
        .execute(&state.db)
        .await
        .map_err(|e| db_error(&state, e))?;
    artwork.views += 1;

    Ok(Json(ArtworkDetailResponse {
        success: true,
        artwork: artwork_to_response(&artwork),
    }))
}

/// POST /api/artworks - 作品登録（アーティストのみ、常に pending で開始）
pub async fn create_artwork(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(req): Json<CreateArtworkRequest>,
) -> Result<(StatusCode, Json<ArtworkDetailResponse>), ApiError> {
    require_role(&identity, &[role::ARTIST])?;

    if req.title.trim().is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "title is required".to_string(),
        ));
    }
    if !ARTWORK_CATEGORIES.contains(&req.category.as_str()) {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            format!("Invalid category: {}", req.category),
        ));
    }
    if req.price < 0.0 {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "price must not be negative".to_string(),
        ));
    }
    if req.stock < 0 {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "stock must not be negative".to_string(),
        ));
    }
    if req.images.is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "At least one image is required".to_string(),
        ));
    }

    let now_ms = Utc::now().timestamp_millis();
    let artwork = Artwork {
        id: Uuid::new_v4().to_string(),
        artist_id: identity.id.clone(),
        title: req.title.trim().to_string(),
        description: req.description,
        category: req.category,
        price: req.price,
        stock: req.stock,
        images: serde_json::to_string(&req.images).unwrap_or_else(|_| "[]".to_string()),
        tags: serde_json::to_string(&req.tags).unwrap_or_else(|_| "[]".to_string()),
        status: artwork_status::PENDING.to_string(),
        rejection_reason: None,
        views: 0,
        likes: 0,
        approved_at_ms: None,
        sold_at_ms: None,
        created_at_ms: now_ms,
        updated_at_ms: now_ms,
    };

    sqlx::query(
        r#"
        INSERT INTO artworks (
            id, artist_id, title, description, category, price, stock,
            images, tags, status, views, likes, created_at_ms, updated_at_ms
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0, ?, ?)
        "#,
    )
    .bind(&artwork.id)
    .bind(&artwork.artist_id)
    .bind(&artwork.title)
    .bind(&artwork.description)
    .bind(&artwork.category)
    .bind(artwork.price)
    .bind(artwork.stock)
    .bind(&artwork.images)
    .bind(&artwork.tags)
    .bind(&artwork.status)
    .bind(now_ms)
    .bind(now_ms)
    .execute(&state.db)
    .await
    .map_err(|e| db_error(&state, e))?;

    info!("Artwork created: id={}, artist={}", artwork.id, artwork.artist_id);

    Ok((
        StatusCode::CREATED,
        Json(ArtworkDetailResponse {
            success: true,
            artwork: artwork_to_response(&artwork),
        }),
    ))
}

/// PUT /api/artworks/:artwork_id - 作品更新（所有者のみ）
///
/// どのフィールドを変更しても status は pending に戻る（再審査）。
/// 差し替えで外れた画像はベストエフォートで削除する。
pub async fn update_artwork(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(artwork_id): Path<String>,
    Json(req): Json<UpdateArtworkRequest>,
) -> Result<Json<ArtworkDetailResponse>, ApiError> {
    let artwork: Option<Artwork> = sqlx::query_as("SELECT * FROM artworks WHERE id = ?")
        .bind(&artwork_id)
        .fetch_optional(&state.db)
        .await
        .map_err(|e| db_error(&state, e))?;

    let artwork = artwork.ok_or_else(|| {
        error_response(StatusCode::NOT_FOUND, "Artwork not found".to_string())
    })?;

    if artwork.artist_id != identity.id {
        return Err(error_response(
            StatusCode::FORBIDDEN,
            "Not the owner of this artwork".to_string(),
        ));
    }
    // sold は注文確定でのみ到達する終端状態
    if artwork.status == artwork_status::SOLD {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Artwork has already been sold".to_string(),
        ));
    }

    if let Some(c) = &req.category {
        if !ARTWORK_CATEGORIES.contains(&c.as_str()) {
            return Err(error_response(
                StatusCode::BAD_REQUEST,
                format!("Invalid category: {}", c),
            ));
        }
    }
    if matches!(req.price, Some(p) if p < 0.0) {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "price must not be negative".to_string(),
        ));
    }
    if matches!(req.stock, Some(s) if s < 0) {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "stock must not be negative".to_string(),
        ));
    }
    if matches!(&req.images, Some(images) if images.is_empty()) {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "At least one image is required".to_string(),
        ));
    }

    // 差し替えで外れる画像を控えておく
    let removed_images: Vec<String> = match &req.images {
        Some(new_images) => parse_string_list(&artwork.images)
            .into_iter()
            .filter(|old| !new_images.contains(old))
            .collect(),
        None => Vec::new(),
    };

    let images_json = req
        .images
        .as_ref()
        .map(|v| serde_json::to_string(v).unwrap_or_else(|_| "[]".to_string()));
    let tags_json = req
        .tags
        .as_ref()
        .map(|v| serde_json::to_string(v).unwrap_or_else(|_| "[]".to_string()));

    let now_ms = Utc::now().timestamp_millis();
    sqlx::query(
        r#"
        UPDATE artworks SET
            title = COALESCE(?, title),
            description = COALESCE(?, description),
            category = COALESCE(?, category),
            price = COALESCE(?, price),
            stock = COALESCE(?, stock),
            images = COALESCE(?, images),
            tags = COALESCE(?, tags),
            status = 'pending',
            rejection_reason = NULL,
            approved_at_ms = NULL,
            updated_at_ms = ?
        WHERE id = ?
        "#,
    )
    .bind(&req.title)
    .bind(&req.description)
    .bind(&req.category)
    .bind(req.price)
    .bind(req.stock)
    .bind(&images_json)
    .bind(&tags_json)
    .bind(now_ms)
    .bind(&artwork_id)
    .execute(&state.db)
    .await
    .map_err(|e| db_error(&state, e))?;

    media::delete_assets(&state.config, &removed_images).await;

    info!("Artwork updated, back to review: id={}", artwork_id);

    let updated: Artwork = sqlx::query_as("SELECT * FROM artworks WHERE id = ?")
        .bind(&artwork_id)
        .fetch_one(&state.db)
        .await
        .map_err(|e| db_error(&state, e))?;

    Ok(Json(ArtworkDetailResponse {
        success: true,
        artwork: artwork_to_response(&updated),
    }))
}

/// DELETE /api/artworks/:artwork_id - 作品削除（所有者または管理者）
pub async fn delete_artwork(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(artwork_id): Path<String>,
) -> Result<Json<ArtworkDeleteResponse>, ApiError> {
    let artwork: Option<Artwork> = sqlx::query_as("SELECT * FROM artworks WHERE id = ?")
        .bind(&artwork_id)
        .fetch_optional(&state.db)
        .await
        .map_err(|e| db_error(&state, e))?;

    let artwork = artwork.ok_or_else(|| {
        error_response(StatusCode::NOT_FOUND, "Artwork not found".to_string())
    })?;

    if artwork.artist_id != identity.id && !is_admin(&identity) {
        return Err(error_response(
            StatusCode::FORBIDDEN,
            "Not the owner of this artwork".to_string(),
        ));
    }

    sqlx::query("DELETE FROM artworks WHERE id = ?")
        .bind(&artwork_id)
        .execute(&state.db)
        .await
        .map_err(|e| db_error(&state, e))?;

    // 画像アセットの掃除はベストエフォート
    media::delete_assets(&state.config, &parse_string_list(&artwork.images)).await;

    info!("Artwork deleted: id={}", artwork_id);

    Ok(Json(ArtworkDeleteResponse {
        success: true,
        message: "Artwork deleted".to_string(),
    }))
}

/// PUT /api/artworks/:artwork_id/approve - 承認（管理者のみ、pending からのみ）
pub async fn approve_artwork(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(artwork_id): Path<String>,
) -> Result<Json<ArtworkDetailResponse>, ApiError> {
    require_role(&identity, &[role::ADMIN])?;

    let artwork: Option<Artwork> = sqlx::query_as("SELECT * FROM artworks WHERE id = ?")
        .bind(&artwork_id)
        .fetch_optional(&state.db)
        .await
        .map_err(|e| db_error(&state, e))?;

    let artwork = artwork.ok_or_else(|| {
        error_response(StatusCode::NOT_FOUND, "Artwork not found".to_string())
    })?;

    if artwork.status != artwork_status::PENDING {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Artwork is not pending review".to_string(),
        ));
    }

    let now_ms = Utc::now().timestamp_millis();
    sqlx::query(
        "UPDATE artworks SET status = 'approved', rejection_reason = NULL, approved_at_ms = ?, updated_at_ms = ? WHERE id = ?",
    )
    .bind(now_ms)
    .bind(now_ms)
    .bind(&artwork_id)
    .execute(&state.db)
    .await
    .map_err(|e| db_error(&state, e))?;

    send_notification(
        &state.db,
        &artwork.artist_id,
        notification_kind::ARTWORK_APPROVED,
        &format!("Your artwork \"{}\" has been approved", artwork.title),
        serde_json::json!({ "artwork_id": artwork.id }),
    )
    .await;

    info!("Artwork approved: id={}", artwork_id);

    let updated: Artwork = sqlx::query_as("SELECT * FROM artworks WHERE id = ?")
        .bind(&artwork_id)
        .fetch_one(&state.db)
        .await
        .map_err(|e| db_error(&state, e))?;

    Ok(Json(ArtworkDetailResponse {
        success: true,
        artwork: artwork_to_response(&updated),
    }))
}

/// PUT /api/artworks/:artwork_id/reject - 却下（管理者のみ、理由は閉じた列挙）
pub async fn reject_artwork(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(artwork_id): Path<String>,
    Json(req): Json<RejectRequest>,
) -> Result<Json<ArtworkDetailResponse>, ApiError> {
    require_role(&identity, &[role::ADMIN])?;

    if !REJECTION_REASONS.contains(&req.reason.as_str()) {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            format!("Invalid rejection reason: {}", req.reason),
        ));
    }

    let artwork: Option<Artwork> = sqlx::query_as("SELECT * FROM artworks WHERE id = ?")
        .bind(&artwork_id)
        .fetch_optional(&state.db)
        .await
        .map_err(|e| db_error(&state, e))?;

    let artwork = artwork.ok_or_else(|| {
        error_response(StatusCode::NOT_FOUND, "Artwork not found".to_string())
    })?;

    if artwork.status != artwork_status::PENDING {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Artwork is not pending review".to_string(),
        ));
    }

    let now_ms = Utc::now().timestamp_millis();
    sqlx::query(
        "UPDATE artworks SET status = ?, rejection_reason = ?, updated_at_ms = ? WHERE id = ?",
    )
    .bind(artwork_status::REJECTED)
    .bind(&req.reason)
    .bind(now_ms)
    .bind(&artwork_id)
    .execute(&state.db)
    .await
    .map_err(|e| db_error(&state, e))?;

    send_notification(
        &state.db,
        &artwork.artist_id,
        notification_kind::ARTWORK_REJECTED,
        &format!("Your artwork \"{}\" was rejected", artwork.title),
        serde_json::json!({ "artwork_id": artwork.id, "reason": req.reason }),
    )
    .await;

    info!("Artwork rejected: id={}, reason={}", artwork_id, req.reason);

    let updated: Artwork = sqlx::query_as("SELECT * FROM artworks WHERE id = ?")
        .bind(&artwork_id)
        .fetch_one(&state.db)
        .await
        .map_err(|e| db_error(&state, e))?;

    Ok(Json(ArtworkDetailResponse {
        success: true,
        artwork: artwork_to_response(&updated),
    }))
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

    fn create_req() -> CreateArtworkRequest {
        CreateArtworkRequest {
            title: "Sunset".to_string(),
            description: "oil".to_string(),
            category: "painting".to_string(),
            price: 10.5,
            stock: 3,
            images: vec!["http://localhost:8080/media/a/1.jpg".to_string()],
            tags: vec![],
        }
    }

    fn empty_query() -> ListArtworksQuery {
        ListArtworksQuery {
            category: None,
            artist_id: None,
            status: None,
            min_price: None,
            max_price: None,
            search: None,
            sort: None,
            page: None,
            limit: None,
        }
    }

    #[tokio::test]
    async fn created_artwork_starts_pending() {
        let state = test_state().await;
        let artist = seed_user(&state, role::ARTIST).await;

        let (status, Json(body)) =
            create_artwork(State(state.clone()), artist, Json(create_req()))
                .await
                .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body.artwork.status, "pending");
        assert_eq!(body.artwork.price, 10.5);
        assert_eq!(body.artwork.stock, 3);
    }

    #[tokio::test]
    async fn buyers_cannot_create_artworks() {
        let state = test_state().await;
        let buyer = seed_user(&state, role::BUYER).await;
        let err = create_artwork(State(state.clone()), buyer, Json(create_req()))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn pending_artworks_are_hidden_from_the_public() {
        let state = test_state().await;
        let artist = seed_user(&state, role::ARTIST).await;
        let (_, Json(created)) =
            create_artwork(State(state.clone()), artist.clone(), Json(create_req()))
                .await
                .unwrap();

        // 公開一覧には出ない
        let Json(list) = list_artworks(
            State(state.clone()),
            MaybeIdentity(None),
            Query(empty_query()),
        )
        .await
        .unwrap();
        assert_eq!(list.pagination.total, 0);

        // 詳細も第三者には 403
        let stranger = seed_user(&state, role::BUYER).await;
        let err = get_artwork(
            State(state.clone()),
            MaybeIdentity(Some(stranger)),
            Path(created.artwork.id.clone()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::FORBIDDEN);

        // 所有者は自分の作品を status=all で一覧できる
        let mut query = empty_query();
        query.artist_id = Some(artist.id.clone());
        query.status = Some("all".to_string());
        let Json(list) = list_artworks(
            State(state.clone()),
            MaybeIdentity(Some(artist)),
            Query(query),
        )
        .await
        .unwrap();
        assert_eq!(list.pagination.total, 1);
    }

    #[tokio::test]
    async fn non_privileged_status_filter_falls_back_to_approved() {
        let state = test_state().await;
        let artist = seed_user(&state, role::ARTIST).await;
        create_artwork(State(state.clone()), artist, Json(create_req()))
            .await
            .unwrap();

        let mut query = empty_query();
        query.status = Some("pending".to_string());
        let Json(list) = list_artworks(
            State(state.clone()),
            MaybeIdentity(None),
            Query(query),
        )
        .await
        .unwrap();
        assert_eq!(list.pagination.total, 0);
    }

    #[tokio::test]
    async fn admin_approve_sets_timestamp_and_notifies_artist() {
        let state = test_state().await;
        let artist = seed_user(&state, role::ARTIST).await;
        let admin = seed_user(&state, role::ADMIN).await;
        let (_, Json(created)) =
            create_artwork(State(state.clone()), artist.clone(), Json(create_req()))
                .await
                .unwrap();

        let Json(body) = approve_artwork(
            State(state.clone()),
            admin,
            Path(created.artwork.id.clone()),
        )
        .await
        .unwrap();
        assert_eq!(body.artwork.status, "approved");
        assert!(body.artwork.approved_at_ms.is_some());

        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ? AND kind = 'artwork_approved'",
        )
        .bind(&artist.id)
        .fetch_one(&state.db)
        .await
        .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn owner_edit_resets_approved_artwork_to_pending() {
        let state = test_state().await;
        let artist = seed_user(&state, role::ARTIST).await;
        let admin = seed_user(&state, role::ADMIN).await;
        let (_, Json(created)) =
            create_artwork(State(state.clone()), artist.clone(), Json(create_req()))
                .await
                .unwrap();
        approve_artwork(State(state.clone()), admin, Path(created.artwork.id.clone()))
            .await
            .unwrap();

        let Json(body) = update_artwork(
            State(state.clone()),
            artist,
            Path(created.artwork.id.clone()),
            Json(UpdateArtworkRequest {
                title: Some("Sunrise".to_string()),
                description: None,
                category: None,
                price: None,
                stock: None,
                images: None,
                tags: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(body.artwork.status, "pending");
        assert!(body.artwork.approved_at_ms.is_none());
        assert_eq!(body.artwork.title, "Sunrise");
    }

    #[tokio::test]
    async fn reject_requires_a_known_reason() {
        let state = test_state().await;
        let artist = seed_user(&state, role::ARTIST).await;
        let admin = seed_user(&state, role::ADMIN).await;
        let (_, Json(created)) =
            create_artwork(State(state.clone()), artist, Json(create_req()))
                .await
                .unwrap();

        let err = reject_artwork(
            State(state.clone()),
            admin.clone(),
            Path(created.artwork.id.clone()),
            Json(RejectRequest {
                reason: "did not like it".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);

        let Json(body) = reject_artwork(
            State(state.clone()),
            admin,
            Path(created.artwork.id),
            Json(RejectRequest {
                reason: "poor_quality".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(body.artwork.status, "rejected");
        assert_eq!(body.artwork.rejection_reason.as_deref(), Some("poor_quality"));
    }

    #[tokio::test]
    async fn sort_keys_are_a_closed_set() {
        let state = test_state().await;

        let mut query = empty_query();
        query.sort = Some("fanciness".to_string());
        let err = list_artworks(State(state.clone()), MaybeIdentity(None), Query(query))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);

        // rating は人気順の別名として受け付ける
        for sort in ["newest", "oldest", "price_asc", "price_desc", "popular", "rating", "title"] {
            let mut query = empty_query();
            query.sort = Some(sort.to_string());
            list_artworks(State(state.clone()), MaybeIdentity(None), Query(query))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn viewing_increments_the_counter() {
        let state = test_state().await;
        let artist = seed_user(&state, role::ARTIST).await;
        let (_, Json(created)) =
            create_artwork(State(state.clone()), artist.clone(), Json(create_req()))
                .await
                .unwrap();

        let Json(first) = get_artwork(
            State(state.clone()),
            MaybeIdentity(Some(artist.clone())),
            Path(created.artwork.id.clone()),
        )
        .await
        .unwrap();
        let Json(second) = get_artwork(
            State(state.clone()),
            MaybeIdentity(Some(artist)),
            Path(created.artwork.id),
        )
        .await
        .unwrap();
        assert_eq!(first.artwork.views, 1);
        assert_eq!(second.artwork.views, 2);
    }
}
