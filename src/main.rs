use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    response::Json,
    routing::{delete, get, post, put},
    Router,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

mod auth;
mod db;
mod handlers;
mod media;
mod models;
mod notify;

use db::DbPool;

// ========================================
// 設定
// ========================================

/// 起動時に一度だけ構築する不変設定。各コンポーネントへは参照で渡す。
#[derive(Clone)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub cookie_name: String,
    pub allowed_origin: String,
    pub bind_addr: String,
    pub db_path: String,
    pub media_data_dir: PathBuf,
    pub media_base_url: String,
    pub production: bool,
}

impl AppConfig {
    fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        Ok(Self {
            jwt_secret: std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            token_ttl_hours: std::env::var("TOKEN_TTL_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(24),
            cookie_name: std::env::var("SESSION_COOKIE_NAME")
                .unwrap_or_else(|_| "token".to_string()),
            allowed_origin: std::env::var("ALLOWED_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "art_market.db".to_string()),
            media_data_dir: PathBuf::from(
                std::env::var("MEDIA_DATA_DIR").unwrap_or_else(|_| "/data/art".to_string()),
            ),
            media_base_url: std::env::var("MEDIA_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080/media".to_string())
                .trim_end_matches('/')
                .to_string(),
            production: std::env::var("APP_ENV")
                .map(|v| v == "production")
                .unwrap_or(false),
        })
    }
}

/// 共有アプリケーション状態
pub struct AppState {
    pub db: DbPool,
    pub config: AppConfig,
}

#[cfg(test)]
pub fn test_config() -> AppConfig {
    AppConfig {
        jwt_secret: "test-secret".to_string(),
        token_ttl_hours: 24,
        cookie_name: "token".to_string(),
        allowed_origin: "http://localhost:5173".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        db_path: ":memory:".to_string(),
        media_data_dir: PathBuf::from("/tmp/art-market-test"),
        media_base_url: "http://localhost:8080/media".to_string(),
        production: false,
    }
}

#[cfg(test)]
pub async fn test_state() -> Arc<AppState> {
    Arc::new(AppState {
        db: db::test_db().await,
        config: test_config(),
    })
}

// ========================================
// ヘルスチェック
// ========================================

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    service: String,
    version: String,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "art-market-api".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ========================================
// ルーター
// ========================================

fn build_router(state: Arc<AppState>) -> Result<Router> {
    let cors = CorsLayer::new()
        .allow_origin(
            state
                .config
                .allowed_origin
                .parse::<HeaderValue>()
                .context("invalid ALLOWED_ORIGIN")?,
        )
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true);

    let app = Router::new()
        .route("/api/health", get(health_check))
        // 認証
        .route("/api/auth/register", post(handlers::auth::register))
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/logout", post(handlers::auth::logout))
        .route("/api/auth/me", get(handlers::auth::me))
        // ユーザ
        .route("/api/users/me", get(handlers::users::get_profile))
        .route("/api/users/me", put(handlers::users::update_profile))
        .route("/api/users/artists", get(handlers::users::list_artists))
        .route("/api/users/:user_id", get(handlers::users::get_public_profile))
        // 作品
        .route("/api/artworks", get(handlers::artworks::list_artworks))
        .route("/api/artworks", post(handlers::artworks::create_artwork))
        .route("/api/artworks/:artwork_id", get(handlers::artworks::get_artwork))
        .route("/api/artworks/:artwork_id", put(handlers::artworks::update_artwork))
        .route("/api/artworks/:artwork_id", delete(handlers::artworks::delete_artwork))
        .route("/api/artworks/:artwork_id/approve", put(handlers::artworks::approve_artwork))
        .route("/api/artworks/:artwork_id/reject", put(handlers::artworks::reject_artwork))
        // 講座
        .route("/api/courses", get(handlers::courses::list_courses))
        .route("/api/courses", post(handlers::courses::create_course))
        .route("/api/courses/:course_id", get(handlers::courses::get_course))
        .route("/api/courses/:course_id", put(handlers::courses::update_course))
        .route("/api/courses/:course_id", delete(handlers::courses::delete_course))
        .route("/api/courses/:course_id/lessons", post(handlers::courses::add_lesson))
        .route("/api/courses/:course_id/publish", put(handlers::courses::publish_course))
        .route("/api/courses/:course_id/enroll", post(handlers::courses::enroll))
        .route("/api/courses/:course_id/enrollment", get(handlers::courses::check_enrollment))
        .route("/api/courses/:course_id/approve", put(handlers::courses::approve_course))
        .route("/api/courses/:course_id/reject", put(handlers::courses::reject_course))
        // カート
        .route("/api/cart", get(handlers::cart::get_cart))
        .route("/api/cart", delete(handlers::cart::clear_cart))
        .route("/api/cart/items", post(handlers::cart::add_item))
        .route("/api/cart/items/:item_id", put(handlers::cart::update_quantity))
        .route("/api/cart/items/:item_id", delete(handlers::cart::remove_item))
        // ウィッシュリスト
        .route("/api/wishlist", get(handlers::wishlist::get_wishlist))
        .route("/api/wishlist", delete(handlers::wishlist::clear_wishlist))
        .route("/api/wishlist/items", post(handlers::wishlist::add_item))
        .route("/api/wishlist/items/:item_id", delete(handlers::wishlist::remove_item))
        // 注文
        .route("/api/orders", post(handlers::orders::create_order))
        .route("/api/orders", get(handlers::orders::list_my_orders))
        .route("/api/orders/all", get(handlers::orders::list_all_orders))
        .route("/api/orders/:order_id/status", put(handlers::orders::update_order_status))
        // コミッション
        .route("/api/commissions", post(handlers::commissions::create_commission))
        .route("/api/commissions", get(handlers::commissions::list_commissions))
        .route("/api/commissions/:commission_id", get(handlers::commissions::get_commission))
        .route("/api/commissions/:commission_id/messages", post(handlers::commissions::add_message))
        .route("/api/commissions/:commission_id/status", put(handlers::commissions::update_status))
        // ダッシュボード
        .route("/api/dashboard", get(handlers::dashboard::get_dashboard))
        // 通知
        .route("/api/notifications", get(handlers::notifications::list_notifications))
        .route("/api/notifications/:notification_id/read", put(handlers::notifications::mark_read))
        // お問い合わせ
        .route("/api/contact", post(handlers::contact::submit_contact))
        .layer(cors)
        .with_state(state);

    Ok(app)
}

// ========================================
// メイン
// ========================================

#[tokio::main]
async fn main() -> Result<()> {
    // ログ初期化
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = AppConfig::from_env()?;
    let db = db::init_db(&config.db_path).await?;

    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(AppState { db, config });
    let app = build_router(state)?;

    info!("🚀 Art Market API Server listening on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
