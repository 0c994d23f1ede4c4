//! 通知書き込み
//! 各ワークフローの副作用としての受信箱書き込み。ベストエフォートで、
//! 失敗はログに残すだけで主処理の結果は変えない。

use chrono::Utc;
use tracing::warn;

use crate::db::DbPool;

/// 通知を1件書き込む。失敗しても warn ログのみ。
pub async fn send_notification(
    db: &DbPool,
    user_id: &str,
    kind: &str,
    message: &str,
    metadata: serde_json::Value,
) {
    let now_ms = Utc::now().timestamp_millis();
    let result = sqlx::query(
        r#"
        INSERT INTO notifications (user_id, kind, message, metadata, is_read, created_at_ms)
        VALUES (?, ?, ?, ?, 0, ?)
        "#,
    )
    .bind(user_id)
    .bind(kind)
    .bind(message)
    .bind(metadata.to_string())
    .bind(now_ms)
    .execute(db)
    .await;

    if let Err(e) = result {
        warn!("Failed to write notification (not critical): user={}, kind={}, err={}", user_id, kind, e);
    }
}
