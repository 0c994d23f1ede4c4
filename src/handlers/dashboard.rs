//! Dashboard API Handlers
//! /api/dashboard エンドポイント - アーティスト向け集計（並行取得）

use axum::{extract::State, response::Json};
use chrono::{Datelike, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::auth::{require_role, Identity};
use crate::db::DbPool;
use crate::handlers::{db_error, ApiError};
use crate::models::{
    artwork_to_response, commission_status, course_to_response, notification_to_response, role,
    Artwork, ArtworkResponse, Course, CourseResponse, Notification, NotificationResponse,
};
use crate::AppState;

// ========================================
// Response Types
// ========================================

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub success: bool,
    pub artworks: Vec<ArtworkResponse>,
    pub recent_sales: Vec<RecentSale>,
    pub commissions: CommissionOverview,
    pub notifications: Vec<NotificationResponse>,
    pub unread_notifications: i64,
    pub top_artworks: Vec<TopArtwork>,
    pub courses: Vec<CourseResponse>,
    pub course_students: Vec<CourseStudent>,
    /// 今年の月別売上（1月〜12月）
    pub monthly_revenue: [f64; 12],
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct RecentSale {
    pub order_id: String,
    pub buyer_name: String,
    pub title: String,
    pub price: f64,
    pub created_at_ms: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct CommissionOverviewRow {
    pub id: String,
    pub title: String,
    pub status: String,
    pub budget: f64,
    pub buyer_name: String,
    pub updated_at_ms: i64,
}

#[derive(Debug, Serialize)]
pub struct CommissionOverview {
    pub total: i64,
    pub pending: i64,
    pub accepted: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub rejected: i64,
    pub items: Vec<CommissionOverviewRow>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct TopArtwork {
    pub id: String,
    pub title: String,
    pub sales_count: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct CourseStudent {
    pub course_id: String,
    pub course_title: String,
    pub student_id: String,
    pub student_name: String,
    pub enrolled_at_ms: i64,
}

// ========================================
// 個別の集計クエリ
// ========================================

async fn own_artworks(db: &DbPool, artist_id: &str) -> Result<Vec<Artwork>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM artworks WHERE artist_id = ? ORDER BY created_at_ms DESC")
        .bind(artist_id)
        .fetch_all(db)
        .await
}

/// このアーティストの作品/講座を含む直近の売上明細
async fn recent_sales(db: &DbPool, artist_id: &str) -> Result<Vec<RecentSale>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT o.id AS order_id, u.name AS buyer_name, oi.title AS title,
               oi.price AS price, o.created_at_ms AS created_at_ms
        FROM order_items oi
        JOIN orders o ON o.id = oi.order_id
        JOIN users u ON u.id = o.buyer_id
        WHERE (oi.item_type = 'artwork' AND oi.item_id IN (SELECT id FROM artworks WHERE artist_id = ?))
           OR (oi.item_type = 'course' AND oi.item_id IN (SELECT id FROM courses WHERE artist_id = ?))
        ORDER BY o.created_at_ms DESC
        LIMIT 10
        "#,
    )
    .bind(artist_id)
    .bind(artist_id)
    .fetch_all(db)
    .await
}

async fn commission_rows(
    db: &DbPool,
    artist_id: &str,
) -> Result<Vec<CommissionOverviewRow>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT c.id, c.title, c.status, c.budget, u.name AS buyer_name, c.updated_at_ms
        FROM commissions c
        JOIN users u ON u.id = c.buyer_id
        WHERE c.artist_id = ?
        ORDER BY c.updated_at_ms DESC
        "#,
    )
    .bind(artist_id)
    .fetch_all(db)
    .await
}

async fn latest_notifications(
    db: &DbPool,
    user_id: &str,
) -> Result<Vec<Notification>, sqlx::Error> {
    sqlx::query_as(
        "SELECT * FROM notifications WHERE user_id = ? ORDER BY created_at_ms DESC LIMIT 20",
    )
    .bind(user_id)
    .fetch_all(db)
    .await
}

async fn unread_count(db: &DbPool, user_id: &str) -> Result<i64, sqlx::Error> {
    let row: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM notifications WHERE user_id = ? AND is_read = 0")
            .bind(user_id)
            .fetch_one(db)
            .await?;
    Ok(row.0)
}

async fn top_artworks(db: &DbPool, artist_id: &str) -> Result<Vec<TopArtwork>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT a.id, a.title, COUNT(oi.id) AS sales_count
        FROM artworks a
        JOIN order_items oi ON oi.item_type = 'artwork' AND oi.item_id = a.id
        WHERE a.artist_id = ?
        GROUP BY a.id, a.title
        ORDER BY sales_count DESC
        LIMIT 5
        "#,
    )
    .bind(artist_id)
    .fetch_all(db)
    .await
}

async fn own_courses(db: &DbPool, artist_id: &str) -> Result<Vec<Course>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM courses WHERE artist_id = ? ORDER BY created_at_ms DESC")
        .bind(artist_id)
        .fetch_all(db)
        .await
}

async fn course_students(db: &DbPool, artist_id: &str) -> Result<Vec<CourseStudent>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT cs.course_id, c.title AS course_title, u.id AS student_id,
               u.name AS student_name, cs.enrolled_at_ms
        FROM course_students cs
        JOIN courses c ON c.id = cs.course_id
        JOIN users u ON u.id = cs.user_id
        WHERE c.artist_id = ?
        ORDER BY cs.enrolled_at_ms DESC
        "#,
    )
    .bind(artist_id)
    .fetch_all(db)
    .await
}

/// 今年の月別売上。月は strftime で注文時刻から求める
async fn monthly_revenue(db: &DbPool, artist_id: &str) -> Result<[f64; 12], sqlx::Error> {
    let year = format!("{}", Utc::now().year());
    let rows: Vec<(i64, f64)> = sqlx::query_as(
        r#"
        SELECT CAST(strftime('%m', o.created_at_ms / 1000, 'unixepoch') AS INTEGER) AS month,
               SUM(oi.price) AS revenue
        FROM orders o
        JOIN order_items oi ON oi.order_id = o.id
        WHERE strftime('%Y', o.created_at_ms / 1000, 'unixepoch') = ?
          AND ((oi.item_type = 'artwork' AND oi.item_id IN (SELECT id FROM artworks WHERE artist_id = ?))
            OR (oi.item_type = 'course' AND oi.item_id IN (SELECT id FROM courses WHERE artist_id = ?)))
        GROUP BY month
        "#,
    )
    .bind(&year)
    .bind(artist_id)
    .bind(artist_id)
    .fetch_all(db)
    .await?;

    let mut revenue = [0.0; 12];
    for (month, amount) in rows {
        if (1..=12).contains(&month) {
            revenue[(month - 1) as usize] = amount;
        }
    }
    Ok(revenue)
}

// ========================================
// Handler
// ========================================

/// GET /api/dashboard - アーティストダッシュボード
///
/// 一連の集計を並行に取得して1レスポンスへまとめる。どれか1つでも失敗したら 500。
pub async fn get_dashboard(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<DashboardResponse>, ApiError> {
    require_role(&identity, &[role::ARTIST])?;

    let db = &state.db;
    let artist_id = identity.id.as_str();

    let (artworks, sales, commissions, notifications, unread, top, courses, students, revenue) =
        tokio::join!(
            own_artworks(db, artist_id),
            recent_sales(db, artist_id),
            commission_rows(db, artist_id),
            latest_notifications(db, artist_id),
            unread_count(db, artist_id),
            top_artworks(db, artist_id),
            own_courses(db, artist_id),
            course_students(db, artist_id),
            monthly_revenue(db, artist_id),
        );

    let artworks = artworks.map_err(|e| db_error(&state, e))?;
    let sales = sales.map_err(|e| db_error(&state, e))?;
    let commission_items = commissions.map_err(|e| db_error(&state, e))?;
    let notifications = notifications.map_err(|e| db_error(&state, e))?;
    let unread = unread.map_err(|e| db_error(&state, e))?;
    let top = top.map_err(|e| db_error(&state, e))?;
    let courses = courses.map_err(|e| db_error(&state, e))?;
    let students = students.map_err(|e| db_error(&state, e))?;
    let revenue = revenue.map_err(|e| db_error(&state, e))?;

    let count_status =
        |s: &str| commission_items.iter().filter(|c| c.status == s).count() as i64;
    let overview = CommissionOverview {
        total: commission_items.len() as i64,
        pending: count_status(commission_status::PENDING),
        accepted: count_status(commission_status::ACCEPTED),
        in_progress: count_status(commission_status::IN_PROGRESS),
        completed: count_status(commission_status::COMPLETED),
        rejected: count_status(commission_status::REJECTED),
        items: commission_items,
    };

    // 受講者数は同時取得した登録行から数える
    let courses = courses
        .iter()
        .map(|c| {
            let enrolled = students.iter().filter(|s| s.course_id == c.id).count() as i64;
            course_to_response(c, enrolled)
        })
        .collect();

    Ok(Json(DashboardResponse {
        success: true,
        artworks: artworks.iter().map(artwork_to_response).collect(),
        recent_sales: sales,
        commissions: overview,
        notifications: notifications.iter().map(notification_to_response).collect(),
        unread_notifications: unread,
        top_artworks: top,
        courses,
        course_students: students,
        monthly_revenue: revenue,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_state;
    use axum::http::StatusCode;
    use uuid::Uuid;

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

    #[tokio::test]
    async fn dashboard_is_artist_only() {
        let state = test_state().await;
        let buyer = seed_user(&state, role::BUYER, "Mika").await;

        let err = get_dashboard(State(state.clone()), buyer).await.unwrap_err();
        assert_eq!(err.0, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn dashboard_aggregates_only_this_artists_activity() {
        let state = test_state().await;
        let artist = seed_user(&state, role::ARTIST, "Ren").await;
        let other = seed_user(&state, role::ARTIST, "Aoi").await;
        let buyer = seed_user(&state, role::BUYER, "Mika").await;

        let now_ms = Utc::now().timestamp_millis();
        let artwork_id = Uuid::new_v4().to_string();
        let other_artwork = Uuid::new_v4().to_string();
        for (id, owner) in [(&artwork_id, &artist.id), (&other_artwork, &other.id)] {
            sqlx::query(
                r#"
                INSERT INTO artworks (id, artist_id, title, description, category, price, stock, images, tags, status, views, likes, created_at_ms, updated_at_ms)
                VALUES (?, ?, 'Dusk', '', 'painting', 100.0, 1, '[]', '[]', 'sold', 0, 0, 0, 0)
                "#,
            )
            .bind(id)
            .bind(owner)
            .execute(&state.db)
            .await
            .unwrap();
        }

        // 両アーティストの作品が1件ずつ売れている
        for (order, item) in [("o1", &artwork_id), ("o2", &other_artwork)] {
            sqlx::query(
                "INSERT INTO orders (id, buyer_id, total, payment_ref, status, payout_status, created_at_ms) VALUES (?, ?, 100.0, 'p', 'completed', 'pending', ?)",
            )
            .bind(order)
            .bind(&buyer.id)
            .bind(now_ms)
            .execute(&state.db)
            .await
            .unwrap();
            sqlx::query(
                "INSERT INTO order_items (order_id, item_type, item_id, title, price) VALUES (?, 'artwork', ?, 'Dusk', 100.0)",
            )
            .bind(order)
            .bind(item)
            .execute(&state.db)
            .await
            .unwrap();
        }

        let Json(body) = get_dashboard(State(state.clone()), artist).await.unwrap();

        assert_eq!(body.artworks.len(), 1);
        assert_eq!(body.recent_sales.len(), 1);
        assert_eq!(body.recent_sales[0].buyer_name, "Mika");
        assert_eq!(body.top_artworks.len(), 1);
        assert_eq!(body.top_artworks[0].sales_count, 1);

        // 今月の売上に計上される
        let month = (Utc::now().month() - 1) as usize;
        assert_eq!(body.monthly_revenue[month], 100.0);
        assert_eq!(body.monthly_revenue.iter().sum::<f64>(), 100.0);
    }
}
