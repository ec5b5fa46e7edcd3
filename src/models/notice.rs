use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::Priority;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "notice_category", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NoticeCategory {
    General,
    Maintenance,
    Meeting,
    Event,
    Billing,
    Security,
    Emergency,
}

impl Default for NoticeCategory {
    fn default() -> Self {
        Self::General
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Notice {
    pub id: Uuid,
    pub society_id: Uuid,
    pub title: String,
    pub content: String,
    pub category: NoticeCategory,
    pub priority: Priority,
    pub attachment_url: Option<String>,
    pub created_by: Uuid,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct NoticeRow {
    #[sqlx(flatten)]
    pub notice: Notice,
    pub created_by_name: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NoticeResponse {
    pub id: Uuid,
    pub society: Uuid,
    pub title: String,
    pub content: String,
    pub category: NoticeCategory,
    pub priority: Priority,
    pub attachment_url: Option<String>,
    pub created_by: Uuid,
    pub created_by_name: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<NoticeRow> for NoticeResponse {
    fn from(row: NoticeRow) -> Self {
        let n = row.notice;
        Self {
            id: n.id,
            society: n.society_id,
            title: n.title,
            content: n.content,
            category: n.category,
            priority: n.priority,
            attachment_url: n.attachment_url,
            created_by: n.created_by,
            created_by_name: row.created_by_name,
            is_active: n.is_active,
            created_at: n.created_at,
            updated_at: n.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateNoticeRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1))]
    pub content: String,
    pub category: Option<NoticeCategory>,
    pub priority: Option<Priority>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateNoticeRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(min = 1))]
    pub content: Option<String>,
    pub category: Option<NoticeCategory>,
    pub priority: Option<Priority>,
    pub is_active: Option<bool>,
}
