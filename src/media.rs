//! メディアアセット削除
//! 静的配信ホストの URL をローカルパスへ逆引きして削除する。
//! ベストエフォートで、失敗はログに残すだけ。

use std::path::PathBuf;
use tokio::fs;
use tracing::{info, warn};

use crate::AppConfig;

/// 画像URL群をベストエフォートで削除する（作品削除・画像差し替え時）
pub async fn delete_assets(config: &AppConfig, urls: &[String]) {
    for url in urls {
        let Some(path) = url_to_local_path(config, url) else {
            // 外部ホストのURLは対象外
            continue;
        };
        match fs::remove_file(&path).await {
            Ok(_) => info!("Deleted asset: {:?}", path),
            Err(e) => warn!("Failed to delete asset (not critical): {:?}, err={}", path, e),
        }
    }
}

fn url_to_local_path(config: &AppConfig, url: &str) -> Option<PathBuf> {
    let rel = url.strip_prefix(&config.media_base_url)?;
    let rel = rel.trim_start_matches('/');
    // パストラバーサルは配信ディレクトリ外を指すので拒否
    if rel.is_empty() || rel.split('/').any(|seg| seg == "..") {
        return None;
    }
    Some(config.media_data_dir.join(rel))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_config;

    #[test]
    fn maps_served_urls_back_to_local_paths() {
        let config = test_config();
        let path = url_to_local_path(&config, &format!("{}/artworks/a1/01.jpg", config.media_base_url));
        assert_eq!(path, Some(config.media_data_dir.join("artworks/a1/01.jpg")));
    }

    #[test]
    fn foreign_and_traversal_urls_are_ignored() {
        let config = test_config();
        assert_eq!(url_to_local_path(&config, "https://elsewhere.example/x.jpg"), None);
        let evil = format!("{}/../secrets", config.media_base_url);
        assert_eq!(url_to_local_path(&config, &evil), None);
    }
}
