//! 認証モジュール
//! セッショントークン発行/検証、パスワードハッシュ、リクエスト識別の解決

use axum::{extract::FromRequestParts, http::request::Parts, http::StatusCode};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use thiserror::Error;

use crate::handlers::{error_response, ApiError};
use crate::models::{role, User};
use crate::{AppConfig, AppState};

/// トークンに埋め込むクレーム。role/email は参考値で、
/// リクエスト処理時には必ずDBの現在値を使う。
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub email: String,
    pub exp: usize,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Token expired")]
    Expired,
    #[error("Invalid token")]
    Invalid,
}

/// 検証済みのリクエスト識別（DBの現在値で解決済み）
#[derive(Debug, Clone)]
pub struct Identity {
    pub id: String,
    pub role: String,
    pub email: String,
    pub name: String,
}

/// 認証が任意のエンドポイント用
#[derive(Debug, Clone)]
pub struct MaybeIdentity(pub Option<Identity>);

// ========================================
// トークン / パスワード
// ========================================

pub fn create_token(user: &User, config: &AppConfig) -> Result<String, jsonwebtoken::errors::Error> {
    let exp = (Utc::now() + Duration::hours(config.token_ttl_hours)).timestamp() as usize;
    let claims = Claims {
        sub: user.id.clone(),
        role: user.role.clone(),
        email: user.email.clone(),
        exp,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, TokenError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
        _ => TokenError::Invalid,
    })
}

pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

// ========================================
// セッションクッキー
// ========================================

/// HttpOnly + SameSite=Strict のセッションクッキーを生成
pub fn session_cookie(config: &AppConfig, token: String) -> Cookie<'static> {
    Cookie::build((config.cookie_name.clone(), token))
        .http_only(true)
        .same_site(SameSite::Strict)
        .path("/")
        .build()
}

/// ログアウト用にクッキーを無効化
pub fn clear_session_cookie(config: &AppConfig) -> Cookie<'static> {
    Cookie::build((config.cookie_name.clone(), ""))
        .http_only(true)
        .same_site(SameSite::Strict)
        .path("/")
        .build()
}

// ========================================
// Extractor
// ========================================

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar
            .get(&state.config.cookie_name)
            .map(|c| c.value().to_string())
            .ok_or_else(|| {
                error_response(
                    StatusCode::UNAUTHORIZED,
                    "Authentication required".to_string(),
                )
            })?;

        let claims = verify_token(&token, &state.config.jwt_secret)
            .map_err(|e| error_response(StatusCode::UNAUTHORIZED, e.to_string()))?;

        // 古いクレームを信用せず、常に現在のユーザ行を読み直す
        let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(&claims.sub)
            .fetch_optional(&state.db)
            .await
            .map_err(|e| {
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("DB error: {}", e),
                )
            })?;

        match user {
            Some(u) if u.is_active == 1 => Ok(Identity {
                id: u.id,
                role: u.role,
                email: u.email,
                name: u.name,
            }),
            _ => Err(error_response(
                StatusCode::UNAUTHORIZED,
                "User not found or deactivated".to_string(),
            )),
        }
    }
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for MaybeIdentity {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(MaybeIdentity(
            Identity::from_request_parts(parts, state).await.ok(),
        ))
    }
}

// ========================================
// 認可
// ========================================

pub fn require_role(identity: &Identity, allowed: &[&str]) -> Result<(), ApiError> {
    if allowed.contains(&identity.role.as_str()) {
        Ok(())
    } else {
        Err(error_response(
            StatusCode::FORBIDDEN,
            "Forbidden: insufficient role".to_string(),
        ))
    }
}

pub fn is_admin(identity: &Identity) -> bool {
    identity.role == role::ADMIN
}
