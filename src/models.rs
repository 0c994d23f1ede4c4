//! Data Models
//! User, Artwork, Course, Order, Commission などのデータ構造定義

use serde::{Deserialize, Deserializer, Serialize};

// ========================================
// ステータス定数
// ========================================

pub mod role {
    pub const BUYER: &str = "buyer";
    pub const ARTIST: &str = "artist";
    pub const ADMIN: &str = "admin";
}

pub mod artwork_status {
    pub const PENDING: &str = "pending";
    pub const APPROVED: &str = "approved";
    pub const REJECTED: &str = "rejected";
    pub const SOLD: &str = "sold";
}

pub mod course_status {
    pub const DRAFT: &str = "draft";
    pub const PUBLISHED: &str = "published";
    pub const REJECTED: &str = "rejected";
}

pub mod commission_status {
    pub const PENDING: &str = "pending";
    pub const ACCEPTED: &str = "accepted";
    pub const REJECTED: &str = "rejected";
    pub const IN_PROGRESS: &str = "in_progress";
    pub const COMPLETED: &str = "completed";
    // データモデル上は存在するが、どの遷移ハンドラも設定しない（仕様確認待ち）
    pub const CANCELLED: &str = "cancelled";

    /// アーティストが遷移先として指定できる値
    pub const TRANSITION_TARGETS: &[&str] = &[ACCEPTED, REJECTED, IN_PROGRESS, COMPLETED];
}

pub mod order_status {
    pub const COMPLETED: &str = "completed";
    pub const PROCESSING: &str = "processing";
    pub const SHIPPED: &str = "shipped";
    pub const DELIVERED: &str = "delivered";
    pub const CANCELLED: &str = "cancelled";

    pub const ALL: &[&str] = &[COMPLETED, PROCESSING, SHIPPED, DELIVERED, CANCELLED];
}

pub mod payout_status {
    pub const PENDING: &str = "pending";
    pub const PROCESSING: &str = "processing";
    pub const PAID: &str = "paid";

    pub const ALL: &[&str] = &[PENDING, PROCESSING, PAID];
}

pub mod notification_kind {
    pub const ORDER_CONFIRMED: &str = "order_confirmed";
    pub const ORDER_STATUS: &str = "order_status";
    pub const ARTWORK_SOLD: &str = "artwork_sold";
    pub const ARTWORK_APPROVED: &str = "artwork_approved";
    pub const ARTWORK_REJECTED: &str = "artwork_rejected";
    pub const COURSE_APPROVED: &str = "course_approved";
    pub const COURSE_REJECTED: &str = "course_rejected";
    pub const COURSE_ENROLLMENT: &str = "course_enrollment";
    pub const COMMISSION_REQUEST: &str = "commission_request";
    pub const COMMISSION_STATUS: &str = "commission_status";
    pub const COMMISSION_MESSAGE: &str = "commission_message";
}

/// 作品カテゴリ（閉じた列挙）
pub const ARTWORK_CATEGORIES: &[&str] = &[
    "painting",
    "sculpture",
    "photography",
    "digital",
    "drawing",
    "printmaking",
    "mixed_media",
    "other",
];

/// 却下理由（閉じた列挙）
pub const REJECTION_REASONS: &[&str] = &[
    "inappropriate_content",
    "copyright_violation",
    "poor_quality",
    "incomplete_information",
    "other",
];

// ========================================
// ポリモーフィック参照（artwork | course）
// ========================================

/// カート/ウィッシュリスト/注文の行が参照するカタログ種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Artwork,
    Course,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Artwork => "artwork",
            ItemType::Course => "course",
        }
    }

    pub fn parse(s: &str) -> Option<ItemType> {
        match s {
            "artwork" => Some(ItemType::Artwork),
            "course" => Some(ItemType::Course),
            _ => None,
        }
    }
}

// ========================================
// User
// ========================================

/// User (DB row)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub role: String,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub specialty: Option<String>,
    pub is_active: i64,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub specialty: Option<String>,
}

/// 本人向けプロフィール（API返却用）
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: String,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub specialty: Option<String>,
    pub created_at_ms: i64,
}

/// 公開プロフィール（メールアドレスは含めない）
#[derive(Debug, Serialize)]
pub struct PublicUserResponse {
    pub id: String,
    pub name: String,
    pub role: String,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub specialty: Option<String>,
}

pub fn user_to_response(u: &User) -> UserResponse {
    UserResponse {
        id: u.id.clone(),
        email: u.email.clone(),
        name: u.name.clone(),
        role: u.role.clone(),
        bio: u.bio.clone(),
        avatar_url: u.avatar_url.clone(),
        specialty: u.specialty.clone(),
        created_at_ms: u.created_at_ms,
    }
}

pub fn user_to_public_response(u: &User) -> PublicUserResponse {
    PublicUserResponse {
        id: u.id.clone(),
        name: u.name.clone(),
        role: u.role.clone(),
        bio: u.bio.clone(),
        avatar_url: u.avatar_url.clone(),
        specialty: u.specialty.clone(),
    }
}

// ========================================
// Artwork
// ========================================

/// Artwork (DB row)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Artwork {
    pub id: String,
    pub artist_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub price: f64,
    pub stock: i64,
    pub images: String,
    pub tags: String,
    pub status: String,
    pub rejection_reason: Option<String>,
    pub views: i64,
    pub likes: i64,
    pub approved_at_ms: Option<i64>,
    pub sold_at_ms: Option<i64>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateArtworkRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub category: String,
    #[serde(deserialize_with = "lenient_f64")]
    pub price: f64,
    #[serde(default = "default_stock", deserialize_with = "lenient_i64")]
    pub stock: i64,
    pub images: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_stock() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
pub struct UpdateArtworkRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_opt_i64")]
    pub stock: Option<i64>,
    pub images: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
}

/// 却下リクエスト（理由は閉じた列挙）
#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub reason: String,
}

/// Artwork レスポンス（API返却用）
#[derive(Debug, Serialize)]
pub struct ArtworkResponse {
    pub id: String,
    pub artist_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub price: f64,
    pub stock: i64,
    pub images: Vec<String>,
    pub tags: Vec<String>,
    pub status: String,
    pub rejection_reason: Option<String>,
    pub views: i64,
    pub likes: i64,
    pub approved_at_ms: Option<i64>,
    pub sold_at_ms: Option<i64>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

pub fn artwork_to_response(a: &Artwork) -> ArtworkResponse {
    ArtworkResponse {
        id: a.id.clone(),
        artist_id: a.artist_id.clone(),
        title: a.title.clone(),
        description: a.description.clone(),
        category: a.category.clone(),
        price: a.price,
        stock: a.stock,
        images: parse_string_list(&a.images),
        tags: parse_string_list(&a.tags),
        status: a.status.clone(),
        rejection_reason: a.rejection_reason.clone(),
        views: a.views,
        likes: a.likes,
        approved_at_ms: a.approved_at_ms,
        sold_at_ms: a.sold_at_ms,
        created_at_ms: a.created_at_ms,
        updated_at_ms: a.updated_at_ms,
    }
}

// ========================================
// Course
// ========================================

/// Course (DB row)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Course {
    pub id: String,
    pub artist_id: String,
    pub title: String,
    pub description: String,
    pub price: i64,
    pub thumbnail_url: Option<String>,
    pub lessons: String,
    pub status: String,
    pub is_approved: i64,
    pub rejection_reason: Option<String>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

/// レッスン（courses.lessons JSON の要素）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lesson {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub video_url: String,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCourseRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(deserialize_with = "lenient_i64")]
    pub price: i64,
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCourseRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_i64")]
    pub price: Option<i64>,
    pub thumbnail_url: Option<String>,
}

/// Course レスポンス（API返却用）
#[derive(Debug, Serialize)]
pub struct CourseResponse {
    pub id: String,
    pub artist_id: String,
    pub title: String,
    pub description: String,
    pub price: i64,
    pub thumbnail_url: Option<String>,
    pub lessons: Vec<Lesson>,
    pub status: String,
    pub is_approved: bool,
    pub rejection_reason: Option<String>,
    pub student_count: i64,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

pub fn course_to_response(c: &Course, student_count: i64) -> CourseResponse {
    CourseResponse {
        id: c.id.clone(),
        artist_id: c.artist_id.clone(),
        title: c.title.clone(),
        description: c.description.clone(),
        price: c.price,
        thumbnail_url: c.thumbnail_url.clone(),
        lessons: parse_lessons(&c.lessons),
        status: c.status.clone(),
        is_approved: c.is_approved == 1,
        rejection_reason: c.rejection_reason.clone(),
        student_count,
        created_at_ms: c.created_at_ms,
        updated_at_ms: c.updated_at_ms,
    }
}

// ========================================
// Cart / Wishlist
// ========================================

/// CartItem (DB row) — 追加時点のスナップショットを保持
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CartItem {
    pub id: String,
    pub user_id: String,
    pub item_type: String,
    pub item_id: String,
    pub title: String,
    pub price: f64,
    pub thumbnail_url: Option<String>,
    pub quantity: i64,
    pub added_at_ms: i64,
}

/// WishlistItem (DB row)
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct WishlistItem {
    pub id: String,
    pub user_id: String,
    pub item_type: String,
    pub item_id: String,
    pub title: String,
    pub price: f64,
    pub thumbnail_url: Option<String>,
    pub added_at_ms: i64,
}

#[derive(Debug, Deserialize)]
pub struct AddCartItemRequest {
    pub item_type: ItemType,
    pub item_id: String,
    #[serde(default = "default_quantity", deserialize_with = "lenient_i64")]
    pub quantity: i64,
}

fn default_quantity() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
pub struct UpdateCartQuantityRequest {
    #[serde(deserialize_with = "lenient_i64")]
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct AddWishlistItemRequest {
    pub item_type: ItemType,
    pub item_id: String,
}

// ========================================
// Commission
// ========================================

/// Commission (DB row)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Commission {
    pub id: String,
    pub buyer_id: String,
    pub artist_id: String,
    pub title: String,
    pub description: String,
    pub budget: f64,
    pub deadline_ms: Option<i64>,
    pub status: String,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

/// CommissionMessage (DB row) — 追記専用
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CommissionMessage {
    pub id: i64,
    pub commission_id: String,
    pub sender_role: String,
    pub content: String,
    pub sent_at_ms: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateCommissionRequest {
    pub artist_id: String,
    pub title: String,
    pub description: String,
    #[serde(deserialize_with = "lenient_f64")]
    pub budget: f64,
    pub deadline_ms: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AddCommissionMessageRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCommissionStatusRequest {
    pub status: String,
}

/// Commission レスポンス（メッセージスレッド込み）
#[derive(Debug, Serialize)]
pub struct CommissionResponse {
    pub id: String,
    pub buyer_id: String,
    pub buyer_name: Option<String>,
    pub artist_id: String,
    pub artist_name: Option<String>,
    pub title: String,
    pub description: String,
    pub budget: f64,
    pub deadline_ms: Option<i64>,
    pub status: String,
    pub messages: Vec<CommissionMessage>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

// ========================================
// Order
// ========================================

/// Order (DB row)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Order {
    pub id: String,
    pub buyer_id: String,
    pub total: f64,
    pub payment_ref: String,
    pub shipping_address: Option<String>,
    pub status: String,
    pub payout_status: String,
    pub created_at_ms: i64,
}

/// OrderItem (DB row)
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: String,
    pub item_type: String,
    pub item_id: String,
    pub title: String,
    pub price: f64,
}

/// クライアントから信用するのは (item_type, item_id) のみ
#[derive(Debug, Deserialize)]
pub struct OrderItemRef {
    pub item_type: ItemType,
    pub item_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<OrderItemRef>,
    pub payment_ref: String,
    pub shipping_address: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: Option<String>,
    pub payout_status: Option<String>,
}

/// Order レスポンス（明細込み）
#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub buyer_id: String,
    pub items: Vec<OrderItem>,
    pub total: f64,
    pub payment_ref: String,
    pub shipping_address: Option<serde_json::Value>,
    pub status: String,
    pub payout_status: String,
    pub created_at_ms: i64,
}

pub fn order_to_response(o: &Order, items: Vec<OrderItem>) -> OrderResponse {
    OrderResponse {
        id: o.id.clone(),
        buyer_id: o.buyer_id.clone(),
        items,
        total: o.total,
        payment_ref: o.payment_ref.clone(),
        shipping_address: o
            .shipping_address
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok()),
        status: o.status.clone(),
        payout_status: o.payout_status.clone(),
        created_at_ms: o.created_at_ms,
    }
}

// ========================================
// Notification
// ========================================

/// Notification (DB row)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Notification {
    pub id: i64,
    pub user_id: String,
    pub kind: String,
    pub message: String,
    pub metadata: String,
    pub is_read: i64,
    pub created_at_ms: i64,
}

#[derive(Debug, Serialize)]
pub struct NotificationResponse {
    pub id: i64,
    pub kind: String,
    pub message: String,
    pub metadata: serde_json::Value,
    pub is_read: bool,
    pub created_at_ms: i64,
}

pub fn notification_to_response(n: &Notification) -> NotificationResponse {
    NotificationResponse {
        id: n.id,
        kind: n.kind.clone(),
        message: n.message.clone(),
        metadata: serde_json::from_str(&n.metadata).unwrap_or(serde_json::Value::Null),
        is_read: n.is_read == 1,
        created_at_ms: n.created_at_ms,
    }
}

// ========================================
// Contact
// ========================================

#[derive(Debug, Deserialize)]
pub struct ContactRequest {
    pub name: String,
    pub email: String,
    pub subject: Option<String>,
    pub message: String,
}

// ========================================
// 共通ヘルパー
// ========================================

/// JSON TEXT カラム → Vec<String>（壊れた値は空扱い）
pub fn parse_string_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

pub fn parse_lessons(raw: &str) -> Vec<Lesson> {
    serde_json::from_str(raw).unwrap_or_default()
}

/// フォーム由来の "10.50" のような文字列数値も受け付ける
pub fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(f64),
        Text(String),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Num(n) => Ok(n),
        Raw::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| serde::de::Error::custom(format!("invalid number: {}", s))),
    }
}

pub fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(i64),
        Text(String),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Num(n) => Ok(n),
        Raw::Text(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| serde::de::Error::custom(format!("invalid integer: {}", s))),
    }
}

pub fn lenient_opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(f64),
        Text(String),
    }
    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Num(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid number: {}", s))),
    }
}

pub fn lenient_opt_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(i64),
        Text(String),
    }
    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Num(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid integer: {}", s))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct PriceProbe {
        #[serde(deserialize_with = "lenient_f64")]
        price: f64,
        #[serde(deserialize_with = "lenient_i64")]
        stock: i64,
    }

    #[test]
    fn lenient_numbers_accept_strings_and_numbers() {
        let p: PriceProbe = serde_json::from_str(r#"{"price":"10.50","stock":"3"}"#).unwrap();
        assert_eq!(p.price, 10.5);
        assert_eq!(p.stock, 3);

        let p: PriceProbe = serde_json::from_str(r#"{"price":12,"stock":1}"#).unwrap();
        assert_eq!(p.price, 12.0);
        assert_eq!(p.stock, 1);

        assert!(serde_json::from_str::<PriceProbe>(r#"{"price":"abc","stock":1}"#).is_err());
    }

    #[test]
    fn item_type_round_trip() {
        assert_eq!(ItemType::Artwork.as_str(), "artwork");
        assert_eq!(ItemType::parse("course"), Some(ItemType::Course));
        assert_eq!(ItemType::parse("bundle"), None);

        let t: ItemType = serde_json::from_str(r#""artwork""#).unwrap();
        assert_eq!(t, ItemType::Artwork);
    }

    #[test]
    fn broken_json_columns_fall_back_to_empty() {
        assert!(parse_string_list("not json").is_empty());
        assert_eq!(parse_string_list(r#"["a","b"]"#), vec!["a", "b"]);
        assert!(parse_lessons("{}").is_empty());
    }
}
