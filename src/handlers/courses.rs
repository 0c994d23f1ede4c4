//! Courses API Handlers
//! /api/courses エンドポイント - 講座CRUD、公開/承認フロー、受講登録

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
    course_status, course_to_response, notification_kind, parse_lessons, role, Course,
    CourseResponse, CreateCourseRequest, Lesson, RejectRequest, UpdateCourseRequest,
};
use crate::notify::send_notification;
use crate::AppState;

// ========================================
// Response Types
// ========================================

#[derive(Debug, Serialize)]
pub struct CourseListResponse {
    pub success: bool,
    pub courses: Vec<CourseResponse>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct CourseDetailResponse {
    pub success: bool,
    pub course: CourseResponse,
}

#[derive(Debug, Serialize)]
pub struct CourseDeleteResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct EnrollResponse {
    pub success: bool,
    pub enrolled: bool,
    pub already_enrolled: bool,
}

#[derive(Debug, Serialize)]
pub struct EnrollmentCheckResponse {
    pub success: bool,
    pub enrolled: bool,
}

// ========================================
// Query Parameters
// ========================================

#[derive(Debug, Deserialize)]
pub struct ListCoursesQuery {
    pub artist_id: Option<String>,
    pub search: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
    /// "all" は管理者か自分の講座に絞ったアーティストのみ有効
    pub scope: Option<String>,
}

// ========================================
// Helpers
// ========================================

fn is_purchasable(course: &Course) -> bool {
    course.status == course_status::PUBLISHED && course.is_approved == 1
}

async fn student_count(state: &AppState, course_id: &str) -> Result<i64, ApiError> {
    let count: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM course_students WHERE course_id = ?")
            .bind(course_id)
            .fetch_one(&state.db)
            .await
            .map_err(|e| db_error(state, e))?;
    Ok(count.0)
}

async fn fetch_course(state: &AppState, course_id: &str) -> Result<Course, ApiError> {
    let course: Option<Course> = sqlx::query_as("SELECT * FROM courses WHERE id = ?")
        .bind(course_id)
        .fetch_optional(&state.db)
        .await
        .map_err(|e| db_error(state, e))?;
    course.ok_or_else(|| error_response(StatusCode::NOT_FOUND, "Course not found".to_string()))
}

async fn detail_response(
    state: &AppState,
    course: &Course,
) -> Result<Json<CourseDetailResponse>, ApiError> {
    let students = student_count(state, &course.id).await?;
    Ok(Json(CourseDetailResponse {
        success: true,
        course: course_to_response(course, students),
    }))
}

// ========================================
// Handlers
// ========================================

/// GET /api/courses - 講座一覧（公開側は published かつ承認済みのみ）
pub async fn list_courses(
    State(state): State<Arc<AppState>>,
    MaybeIdentity(viewer): MaybeIdentity,
    Query(query): Query<ListCoursesQuery>,
) -> Result<Json<CourseListResponse>, ApiError> {
    let (page, limit, offset) = clamp_paging(query.page, query.limit);
    let pattern = query.search.as_deref().map(|s| format!("%{}%", s.trim()));

    let privileged = match &viewer {
        Some(v) if v.role == role::ADMIN => true,
        Some(v) if v.role == role::ARTIST => query.artist_id.as_deref() == Some(v.id.as_str()),
        _ => false,
    };
    let show_all = privileged && query.scope.as_deref() == Some("all");

    let push_filters = |qb: &mut QueryBuilder<Sqlite>| {
        if !show_all {
            qb.push(" AND status = 'published' AND is_approved = 1");
        }
        if let Some(a) = &query.artist_id {
            qb.push(" AND artist_id = ").push_bind(a.clone());
        }
        if let Some(pat) = &pattern {
            qb.push(" AND (title LIKE ")
                .push_bind(pat.clone())
                .push(" OR description LIKE ")
                .push_bind(pat.clone())
                .push(")");
        }
    };

    let mut count_qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM courses WHERE 1=1");
    push_filters(&mut count_qb);
    let total: (i64,) = count_qb
        .build_query_as()
        .fetch_one(&state.db)
        .await
        .map_err(|e| db_error(&state, e))?;

    let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM courses WHERE 1=1");
    push_filters(&mut qb);
    qb.push(" ORDER BY created_at_ms DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    let courses: Vec<Course> = qb
        .build_query_as()
        .fetch_all(&state.db)
        .await
        .map_err(|e| db_error(&state, e))?;

    let mut responses = Vec::with_capacity(courses.len());
    for course in &courses {
        let students = student_count(&state, &course.id).await?;
        responses.push(course_to_response(course, students));
    }

    Ok(Json(CourseListResponse {
        success: true,
        courses: responses,
        pagination: Pagination::new(total.0, page, limit),
    }))
}

/// GET /api/courses/:course_id - 講座詳細（未公開は所有者/管理者のみ）
pub async fn get_course(
    State(state): State<Arc<AppState>>,
    MaybeIdentity(viewer): MaybeIdentity,
    Path(course_id): Path<String>,
) -> Result<Json<CourseDetailResponse>, ApiError> {
    let course = fetch_course(&state, &course_id).await?;

    if !is_purchasable(&course) {
        let allowed = viewer
            .as_ref()
            .map(|v| v.id == course.artist_id || v.role == role::ADMIN)
            .unwrap_or(false);
        if !allowed {
            return Err(error_response(
                StatusCode::FORBIDDEN,
                "Course is not publicly visible".to_string(),
            ));
        }
    }

    detail_response(&state, &course).await
}

/// POST /api/courses - 講座作成（アーティストのみ、draft で開始）
pub async fn create_course(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(req): Json<CreateCourseRequest>,
) -> Result<(StatusCode, Json<CourseDetailResponse>), ApiError> {
    require_role(&identity, &[role::ARTIST])?;

    if req.title.trim().is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "title is required".to_string(),
        ));
    }
    if req.price < 0 {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "price must not be negative".to_string(),
        ));
    }

    let now_ms = Utc::now().timestamp_millis();
    let course = Course {
        id: Uuid::new_v4().to_string(),
        artist_id: identity.id.clone(),
        title: req.title.trim().to_string(),
        description: req.description,
        price: req.price,
        thumbnail_url: req.thumbnail_url,
        lessons: "[]".to_string(),
        status: course_status::DRAFT.to_string(),
        is_approved: 0,
        rejection_reason: None,
        created_at_ms: now_ms,
        updated_at_ms: now_ms,
    };

    sqlx::query(
        r#"
        INSERT INTO courses (
            id, artist_id, title, description, price, thumbnail_url,
            lessons, status, is_approved, created_at_ms, updated_at_ms
        ) VALUES (?, ?, ?, ?, ?, ?, '[]', 'draft', 0, ?, ?)
        "#,
    )
    .bind(&course.id)
    .bind(&course.artist_id)
    .bind(&course.title)
    .bind(&course.description)
    .bind(course.price)
    .bind(&course.thumbnail_url)
    .bind(now_ms)
    .bind(now_ms)
    .execute(&state.db)
    .await
    .map_err(|e| db_error(&state, e))?;

    info!("Course created: id={}, artist={}", course.id, course.artist_id);

    Ok((
        StatusCode::CREATED,
        Json(CourseDetailResponse {
            success: true,
            course: course_to_response(&course, 0),
        }),
    ))
}

/// PUT /api/courses/:course_id - 講座更新（所有者のみ、draft に戻る）
pub async fn update_course(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(course_id): Path<String>,
    Json(req): Json<UpdateCourseRequest>,
) -> Result<Json<CourseDetailResponse>, ApiError> {
    let course = fetch_course(&state, &course_id).await?;
    if course.artist_id != identity.id {
        return Err(error_response(
            StatusCode::FORBIDDEN,
            "Not the owner of this course".to_string(),
        ));
    }
    if matches!(req.price, Some(p) if p < 0) {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "price must not be negative".to_string(),
        ));
    }

    let now_ms = Utc::now().timestamp_millis();
    sqlx::query(
        r#"
        UPDATE courses SET
            title = COALESCE(?, title),
            description = COALESCE(?, description),
            price = COALESCE(?, price),
            thumbnail_url = COALESCE(?, thumbnail_url),
            status = 'draft',
            is_approved = 0,
            rejection_reason = NULL,
            updated_at_ms = ?
        WHERE id = ?
        "#,
    )
    .bind(&req.title)
    .bind(&req.description)
    .bind(req.price)
    .bind(&req.thumbnail_url)
    .bind(now_ms)
    .bind(&course_id)
    .execute(&state.db)
    .await
    .map_err(|e| db_error(&state, e))?;

    info!("Course updated, back to draft: id={}", course_id);

    let updated = fetch_course(&state, &course_id).await?;
    detail_response(&state, &updated).await
}

/// DELETE /api/courses/:course_id - 講座削除（所有者または管理者）
pub async fn delete_course(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(course_id): Path<String>,
) -> Result<Json<CourseDeleteResponse>, ApiError> {
    let course = fetch_course(&state, &course_id).await?;
    if course.artist_id != identity.id && !is_admin(&identity) {
        return Err(error_response(
            StatusCode::FORBIDDEN,
            "Not the owner of this course".to_string(),
        ));
    }

    sqlx::query("DELETE FROM course_students WHERE course_id = ?")
        .bind(&course_id)
        .execute(&state.db)
        .await
        .map_err(|e| db_error(&state, e))?;
    sqlx::query("DELETE FROM courses WHERE id = ?")
        .bind(&course_id)
        .execute(&state.db)
        .await
        .map_err(|e| db_error(&state, e))?;

    if let Some(thumb) = &course.thumbnail_url {
        media::delete_assets(&state.config, std::slice::from_ref(thumb)).await;
    }

    info!("Course deleted: id={}", course_id);

    Ok(Json(CourseDeleteResponse {
        success: true,
        message: "Course deleted".to_string(),
    }))
}

/// POST /api/courses/:course_id/lessons - レッスン追加（所有者のみ、draft に戻る）
pub async fn add_lesson(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(course_id): Path<String>,
    Json(req): Json<Lesson>,
) -> Result<Json<CourseDetailResponse>, ApiError> {
    let course = fetch_course(&state, &course_id).await?;
    if course.artist_id != identity.id {
        return Err(error_response(
            StatusCode::FORBIDDEN,
            "Not the owner of this course".to_string(),
        ));
    }
    if req.title.trim().is_empty() || req.video_url.trim().is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Lesson title and video_url are required".to_string(),
        ));
    }

    let mut lessons = parse_lessons(&course.lessons);
    lessons.push(req);
    let lessons_json = serde_json::to_string(&lessons).unwrap_or_else(|_| "[]".to_string());

    let now_ms = Utc::now().timestamp_millis();
    sqlx::query(
        "UPDATE courses SET lessons = ?, status = 'draft', is_approved = 0, updated_at_ms = ? WHERE id = ?",
    )
    .bind(&lessons_json)
    .bind(now_ms)
    .bind(&course_id)
    .execute(&state.db)
    .await
    .map_err(|e| db_error(&state, e))?;

    info!("Lesson added: course={}, lessons={}", course_id, lessons.len());

    let updated = fetch_course(&state, &course_id).await?;
    detail_response(&state, &updated).await
}

/// PUT /api/courses/:course_id/publish - 公開（所有者のみ、レッスン1件以上必須）
pub async fn publish_course(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(course_id): Path<String>,
) -> Result<Json<CourseDetailResponse>, ApiError> {
    let course = fetch_course(&state, &course_id).await?;
    if course.artist_id != identity.id {
        return Err(error_response(
            StatusCode::FORBIDDEN,
            "Not the owner of this course".to_string(),
        ));
    }
    if parse_lessons(&course.lessons).is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Course must have at least one lesson to publish".to_string(),
        ));
    }

    let now_ms = Utc::now().timestamp_millis();
    sqlx::query("UPDATE courses SET status = 'published', updated_at_ms = ? WHERE id = ?")
        .bind(now_ms)
        .bind(&course_id)
        .execute(&state.db)
        .await
        .map_err(|e| db_error(&state, e))?;

    info!("Course published: id={}", course_id);

    let updated = fetch_course(&state, &course_id).await?;
    detail_response(&state, &updated).await
}

/// POST /api/courses/:course_id/enroll - 受講登録（購入者のみ、冪等）
pub async fn enroll(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(course_id): Path<String>,
) -> Result<Json<EnrollResponse>, ApiError> {
    require_role(&identity, &[role::BUYER])?;

    let course = fetch_course(&state, &course_id).await?;
    if !is_purchasable(&course) {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Course is not available for enrollment".to_string(),
        ));
    }

    let now_ms = Utc::now().timestamp_millis();
    let result = sqlx::query(
        "INSERT OR IGNORE INTO course_students (course_id, user_id, enrolled_at_ms) VALUES (?, ?, ?)",
    )
    .bind(&course_id)
    .bind(&identity.id)
    .bind(now_ms)
    .execute(&state.db)
    .await
    .map_err(|e| db_error(&state, e))?;

    let newly_enrolled = result.rows_affected() > 0;
    if newly_enrolled {
        send_notification(
            &state.db,
            &course.artist_id,
            notification_kind::COURSE_ENROLLMENT,
            &format!("{} enrolled in your course \"{}\"", identity.name, course.title),
            serde_json::json!({ "course_id": course.id, "student_id": identity.id }),
        )
        .await;
        info!("Enrollment: course={}, student={}", course_id, identity.id);
    }

    Ok(Json(EnrollResponse {
        success: true,
        enrolled: true,
        already_enrolled: !newly_enrolled,
    }))
}

/// GET /api/courses/:course_id/enrollment - 受講確認
pub async fn check_enrollment(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(course_id): Path<String>,
) -> Result<Json<EnrollmentCheckResponse>, ApiError> {
    let enrolled: Option<(i64,)> = sqlx::query_as(
        "SELECT 1 FROM course_students WHERE course_id = ? AND user_id = ?",
    )
    .bind(&course_id)
    .bind(&identity.id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| db_error(&state, e))?;

    Ok(Json(EnrollmentCheckResponse {
        success: true,
        enrolled: enrolled.is_some(),
    }))
}

/// PUT /api/courses/:course_id/approve - 承認（管理者のみ、published が前提）
pub async fn approve_course(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(course_id): Path<String>,
) -> Result<Json<CourseDetailResponse>, ApiError> {
    require_role(&identity, &[role::ADMIN])?;

    let course = fetch_course(&state, &course_id).await?;
    if course.status != course_status::PUBLISHED {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Course is not published".to_string(),
        ));
    }

    let now_ms = Utc::now().timestamp_millis();
    sqlx::query(
        "UPDATE courses SET is_approved = 1, rejection_reason = NULL, updated_at_ms = ? WHERE id = ?",
    )
    .bind(now_ms)
    .bind(&course_id)
    .execute(&state.db)
    .await
    .map_err(|e| db_error(&state, e))?;

    send_notification(
        &state.db,
        &course.artist_id,
        notification_kind::COURSE_APPROVED,
        &format!("Your course \"{}\" has been approved", course.title),
        serde_json::json!({ "course_id": course.id }),
    )
    .await;

    info!("Course approved: id={}", course_id);

    let updated = fetch_course(&state, &course_id).await?;
    detail_response(&state, &updated).await
}

/// PUT /api/courses/:course_id/reject - 却下（管理者のみ、理由必須）
pub async fn reject_course(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(course_id): Path<String>,
    Json(req): Json<RejectRequest>,
) -> Result<Json<CourseDetailResponse>, ApiError> {
    require_role(&identity, &[role::ADMIN])?;

    if req.reason.trim().is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "A rejection reason is required".to_string(),
        ));
    }

    let course = fetch_course(&state, &course_id).await?;

    let now_ms = Utc::now().timestamp_millis();
    sqlx::query(
        "UPDATE courses SET status = ?, is_approved = 0, rejection_reason = ?, updated_at_ms = ? WHERE id = ?",
    )
    .bind(course_status::REJECTED)
    .bind(req.reason.trim())
    .bind(now_ms)
    .bind(&course_id)
    .execute(&state.db)
    .await
    .map_err(|e| db_error(&state, e))?;

    send_notification(
        &state.db,
        &course.artist_id,
        notification_kind::COURSE_REJECTED,
        &format!("Your course \"{}\" was rejected", course.title),
        serde_json::json!({ "course_id": course.id, "reason": req.reason }),
    )
    .await;

    info!("Course rejected: id={}", course_id);

    let updated = fetch_course(&state, &course_id).await?;
    detail_response(&state, &updated).await
}
