//! Database Module
//! SQLite を使用した users/artworks/courses/orders/commissions の管理

use anyhow::Result;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use tracing::info;

/// データベース接続プール
pub type DbPool = Pool<Sqlite>;

/// データベースを初期化
pub async fn init_db(db_path: &str) -> Result<DbPool> {
    // SQLite接続文字列
    let db_url = format!("sqlite:{}?mode=rwc", db_path);

    info!("Initializing database: {}", db_path);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    // スキーマ作成
    create_schema(&pool).await?;

    info!("Database initialized successfully");
    Ok(pool)
}

/// テスト用のインメモリDB（1コネクション固定）
#[cfg(test)]
pub async fn test_db() -> DbPool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    create_schema(&pool).await.expect("schema");
    pool
}

/// スキーマ作成
async fn create_schema(pool: &DbPool) -> Result<()> {
    // users テーブル（論理削除のみ）
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            name TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'buyer',
            bio TEXT,
            avatar_url TEXT,
            specialty TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at_ms INTEGER NOT NULL,
            updated_at_ms INTEGER NOT NULL
        )
    "#)
    .execute(pool)
    .await?;

    // artworks テーブル（images/tags は JSON TEXT）
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS artworks (
            id TEXT PRIMARY KEY,
            artist_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            category TEXT NOT NULL,
            price REAL NOT NULL,
            stock INTEGER NOT NULL DEFAULT 1,
            images TEXT NOT NULL DEFAULT '[]',
            tags TEXT NOT NULL DEFAULT '[]',
            status TEXT NOT NULL DEFAULT 'pending',
            rejection_reason TEXT,
            views INTEGER NOT NULL DEFAULT 0,
            likes INTEGER NOT NULL DEFAULT 0,
            approved_at_ms INTEGER,
            sold_at_ms INTEGER,
            created_at_ms INTEGER NOT NULL,
            updated_at_ms INTEGER NOT NULL,
            FOREIGN KEY (artist_id) REFERENCES users(id)
        )
    "#)
    .execute(pool)
    .await?;

    // courses テーブル（lessons は JSON TEXT、価格は最小通貨単位の整数）
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS courses (
            id TEXT PRIMARY KEY,
            artist_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            price INTEGER NOT NULL,
            thumbnail_url TEXT,
            lessons TEXT NOT NULL DEFAULT '[]',
            status TEXT NOT NULL DEFAULT 'draft',
            is_approved INTEGER NOT NULL DEFAULT 0,
            rejection_reason TEXT,
            created_at_ms INTEGER NOT NULL,
            updated_at_ms INTEGER NOT NULL,
            FOREIGN KEY (artist_id) REFERENCES users(id)
        )
    "#)
    .execute(pool)
    .await?;

    // course_students テーブル（受講登録、冪等追加）
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS course_students (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            course_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            enrolled_at_ms INTEGER NOT NULL,
            FOREIGN KEY (course_id) REFERENCES courses(id),
            UNIQUE(course_id, user_id)
        )
    "#)
    .execute(pool)
    .await?;

    // cart_items テーブル（追加時スナップショット + 数量）
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS cart_items (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            item_type TEXT NOT NULL,
            item_id TEXT NOT NULL,
            title TEXT NOT NULL,
            price REAL NOT NULL,
            thumbnail_url TEXT,
            quantity INTEGER NOT NULL DEFAULT 1,
            added_at_ms INTEGER NOT NULL,
            UNIQUE(user_id, item_type, item_id)
        )
    "#)
    .execute(pool)
    .await?;

    // wishlist_items テーブル（数量なし、重複禁止）
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS wishlist_items (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            item_type TEXT NOT NULL,
            item_id TEXT NOT NULL,
            title TEXT NOT NULL,
            price REAL NOT NULL,
            thumbnail_url TEXT,
            added_at_ms INTEGER NOT NULL,
            UNIQUE(user_id, item_type, item_id)
        )
    "#)
    .execute(pool)
    .await?;

    // commissions テーブル
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS commissions (
            id TEXT PRIMARY KEY,
            buyer_id TEXT NOT NULL,
            artist_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            budget REAL NOT NULL,
            deadline_ms INTEGER,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at_ms INTEGER NOT NULL,
            updated_at_ms INTEGER NOT NULL,
            FOREIGN KEY (buyer_id) REFERENCES users(id),
            FOREIGN KEY (artist_id) REFERENCES users(id)
        )
    "#)
    .execute(pool)
    .await?;

    // commission_messages テーブル（追記専用）
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS commission_messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            commission_id TEXT NOT NULL,
            sender_role TEXT NOT NULL,
            content TEXT NOT NULL,
            sent_at_ms INTEGER NOT NULL,
            FOREIGN KEY (commission_id) REFERENCES commissions(id)
        )
    "#)
    .execute(pool)
    .await?;

    // orders テーブル（作成後は status/payout_status のみ可変）
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS orders (
            id TEXT PRIMARY KEY,
            buyer_id TEXT NOT NULL,
            total REAL NOT NULL,
            payment_ref TEXT NOT NULL,
            shipping_address TEXT,
            status TEXT NOT NULL DEFAULT 'completed',
            payout_status TEXT NOT NULL DEFAULT 'pending',
            created_at_ms INTEGER NOT NULL,
            FOREIGN KEY (buyer_id) REFERENCES users(id)
        )
    "#)
    .execute(pool)
    .await?;

    // order_items テーブル（サーバ側で解決したスナップショット）
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS order_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            order_id TEXT NOT NULL,
            item_type TEXT NOT NULL,
            item_id TEXT NOT NULL,
            title TEXT NOT NULL,
            price REAL NOT NULL,
            FOREIGN KEY (order_id) REFERENCES orders(id)
        )
    "#)
    .execute(pool)
    .await?;

    // notifications テーブル（受信箱、書き込み中心）
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS notifications (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            message TEXT NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}',
            is_read INTEGER NOT NULL DEFAULT 0,
            created_at_ms INTEGER NOT NULL
        )
    "#)
    .execute(pool)
    .await?;

    // contact_messages テーブル（公開フォーム）
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS contact_messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            subject TEXT,
            message TEXT NOT NULL,
            created_at_ms INTEGER NOT NULL
        )
    "#)
    .execute(pool)
    .await?;

    // インデックス作成
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_artworks_artist ON artworks(artist_id)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_artworks_status ON artworks(status)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_artworks_category ON artworks(category)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_courses_artist ON courses(artist_id)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_cart_items_user ON cart_items(user_id)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_wishlist_items_user ON wishlist_items(user_id)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_commissions_buyer ON commissions(buyer_id)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_commissions_artist ON commissions(artist_id)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_commission_messages_commission ON commission_messages(commission_id)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_orders_buyer ON orders(buyer_id)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_order_items_order ON order_items(order_id)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_order_items_item ON order_items(item_type, item_id)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_course_students_course ON course_students(course_id)")
        .execute(pool).await?;

    Ok(())
}
