//! Auth API Handlers
//! /api/auth エンドポイント - 登録/ログイン/ログアウト/本人確認

use axum::{extract::State, http::StatusCode, response::Json};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::auth::{
    clear_session_cookie, create_token, hash_password, session_cookie, verify_password, Identity,
};
use crate::handlers::{db_error, error_response, ApiError};
use crate::models::{
    role, user_to_response, LoginRequest, RegisterRequest, User, UserResponse,
};
use crate::AppState;

// ========================================
// Response Types
// ========================================

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub user: UserResponse,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub success: bool,
    pub user: UserResponse,
}

// ========================================
// Handlers
// ========================================

/// POST /api/auth/register - ユーザ登録（セッションクッキーを設定）
pub async fn register(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, CookieJar, Json<AuthResponse>), ApiError> {
    let email = req.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "A valid email is required".to_string(),
        ));
    }
    if req.password.len() < 6 {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Password must be at least 6 characters".to_string(),
        ));
    }
    if req.name.trim().is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "name is required".to_string(),
        ));
    }

    // ロールは buyer / artist のみ自己申告可（デフォルト buyer）
    let user_role = match req.role.as_deref() {
        None | Some(role::BUYER) => role::BUYER,
        Some(role::ARTIST) => role::ARTIST,
        Some(other) => {
            return Err(error_response(
                StatusCode::BAD_REQUEST,
                format!("Invalid role: {}", other),
            ));
        }
    };

    // 重複チェック
    let existing: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM users WHERE email = ?")
        .bind(&email)
        .fetch_optional(&state.db)
        .await
        .map_err(|e| db_error(&state, e))?;

    if existing.is_some() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Email already registered".to_string(),
        ));
    }

    let password_hash = hash_password(&req.password).map_err(|e| {
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Password hashing failed: {}", e),
        )
    })?;

    let now_ms = Utc::now().timestamp_millis();
    let user = User {
        id: Uuid::new_v4().to_string(),
        email,
        password_hash,
        name: req.name.trim().to_string(),
        role: user_role.to_string(),
        bio: None,
        avatar_url: None,
        specialty: None,
        is_active: 1,
        created_at_ms: now_ms,
        updated_at_ms: now_ms,
    };

    sqlx::query(
        r#"
        INSERT INTO users (id, email, password_hash, name, role, is_active, created_at_ms, updated_at_ms)
        VALUES (?, ?, ?, ?, ?, 1, ?, ?)
        "#,
    )
    .bind(&user.id)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.name)
    .bind(&user.role)
    .bind(now_ms)
    .bind(now_ms)
    .execute(&state.db)
    .await
    .map_err(|e| db_error(&state, e))?;

    let token = create_token(&user, &state.config).map_err(|e| {
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Token issue failed: {}", e),
        )
    })?;

    info!("User registered: id={}, role={}", user.id, user.role);

    let jar = jar.add(session_cookie(&state.config, token.clone()));
    Ok((
        StatusCode::CREATED,
        jar,
        Json(AuthResponse {
            success: true,
            user: user_to_response(&user),
            token,
        }),
    ))
}

/// POST /api/auth/login - ログイン
///
/// 失敗理由（ユーザ不在 / パスワード不一致）は区別せず同じ応答を返す。
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), ApiError> {
    let email = req.email.trim().to_lowercase();

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = ?")
        .bind(&email)
        .fetch_optional(&state.db)
        .await
        .map_err(|e| db_error(&state, e))?;

    let invalid = || error_response(StatusCode::BAD_REQUEST, "Invalid credentials".to_string());

    let user = user.ok_or_else(invalid)?;
    if user.is_active != 1 || !verify_password(&req.password, &user.password_hash) {
        return Err(invalid());
    }

    let token = create_token(&user, &state.config).map_err(|e| {
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Token issue failed: {}", e),
        )
    })?;

    info!("User logged in: id={}", user.id);

    let jar = jar.add(session_cookie(&state.config, token.clone()));
    Ok((
        jar,
        Json(AuthResponse {
            success: true,
            user: user_to_response(&user),
            token,
        }),
    ))
}

/// POST /api/auth/logout - セッションクッキーを破棄（常に成功）
pub async fn logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> (CookieJar, Json<MessageResponse>) {
    let jar = jar.remove(clear_session_cookie(&state.config));
    (
        jar,
        Json(MessageResponse {
            success: true,
            message: "Logged out".to_string(),
        }),
    )
}

/// GET /api/auth/me - 現在の識別を返す
pub async fn me(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<MeResponse>, ApiError> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&identity.id)
        .fetch_optional(&state.db)
        .await
        .map_err(|e| db_error(&state, e))?;

    let user = user.ok_or_else(|| {
        error_response(StatusCode::NOT_FOUND, "User not found".to_string())
    })?;

    Ok(Json(MeResponse {
        success: true,
        user: user_to_response(&user),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_state;

    fn register_req(email: &str, role: Option<&str>) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: "secret1".to_string(),
            name: "A".to_string(),
            role: role.map(|r| r.to_string()),
        }
    }

    #[tokio::test]
    async fn register_defaults_to_buyer_and_returns_201() {
        let state = test_state().await;
        let (status, _jar, Json(body)) = register(
            State(state.clone()),
            CookieJar::new(),
            Json(register_req("a@x.com", None)),
        )
        .await
        .unwrap();

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body.user.role, "buyer");
        assert!(!body.token.is_empty());
    }

    #[tokio::test]
    async fn register_rejects_duplicate_email() {
        let state = test_state().await;
        register(
            State(state.clone()),
            CookieJar::new(),
            Json(register_req("a@x.com", None)),
        )
        .await
        .unwrap();

        let err = register(
            State(state.clone()),
            CookieJar::new(),
            Json(register_req("a@x.com", None)),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert_eq!(err.1 .0.error, "Email already registered");
    }

    #[tokio::test]
    async fn register_rejects_admin_role() {
        let state = test_state().await;
        let err = register(
            State(state.clone()),
            CookieJar::new(),
            Json(register_req("a@x.com", Some("admin"))),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn login_with_wrong_password_is_generic_400() {
        let state = test_state().await;
        register(
            State(state.clone()),
            CookieJar::new(),
            Json(register_req("a@x.com", None)),
        )
        .await
        .unwrap();

        let err = login(
            State(state.clone()),
            CookieJar::new(),
            Json(LoginRequest {
                email: "a@x.com".to_string(),
                password: "wrong!".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert_eq!(err.1 .0.error, "Invalid credentials");

        // 未登録メールでも同じ応答
        let err = login(
            State(state.clone()),
            CookieJar::new(),
            Json(LoginRequest {
                email: "nobody@x.com".to_string(),
                password: "secret1".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.1 .0.error, "Invalid credentials");
    }

    #[tokio::test]
    async fn login_succeeds_with_correct_password() {
        let state = test_state().await;
        register(
            State(state.clone()),
            CookieJar::new(),
            Json(register_req("a@x.com", Some("artist"))),
        )
        .await
        .unwrap();

        let (jar, Json(body)) = login(
            State(state.clone()),
            CookieJar::new(),
            Json(LoginRequest {
                email: "A@X.COM".to_string(),
                password: "secret1".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(body.user.role, "artist");
        assert!(jar.get(&state.config.cookie_name).is_some());
    }
}
