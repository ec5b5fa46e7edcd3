use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::UserSummary;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "event_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Meeting,
    Festival,
    Maintenance,
    Social,
    Sports,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Event {
    pub id: Uuid,
    pub society_id: Uuid,
    pub title: String,
    pub description: String,
    pub event_type: EventType,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub location: String,
    pub created_by: Uuid,
    pub is_recurring: bool,
    pub recurrence_pattern: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct EventRow {
    #[sqlx(flatten)]
    pub event: Event,
    pub created_by_name: Option<String>,
    pub attendees_count: i64,
    pub is_attending: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EventResponse {
    pub id: Uuid,
    pub society: Uuid,
    pub title: String,
    pub description: String,
    pub event_type: EventType,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub location: String,
    pub created_by: Uuid,
    pub created_by_name: Option<String>,
    pub is_recurring: bool,
    pub recurrence_pattern: String,
    pub attendees_count: i64,
    pub is_attending: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<EventRow> for EventResponse {
    fn from(row: EventRow) -> Self {
        let e = row.event;
        Self {
            id: e.id,
            society: e.society_id,
            title: e.title,
            description: e.description,
            event_type: e.event_type,
            start_date: e.start_date,
            end_date: e.end_date,
            location: e.location,
            created_by: e.created_by,
            created_by_name: row.created_by_name,
            is_recurring: e.is_recurring,
            recurrence_pattern: e.recurrence_pattern,
            attendees_count: row.attendees_count,
            is_attending: row.is_attending,
            created_at: e.created_at,
            updated_at: e.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EventDetailResponse {
    #[serde(flatten)]
    pub event: EventResponse,
    pub attendees: Vec<UserSummary>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateEventRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1))]
    pub description: String,
    pub event_type: EventType,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    #[validate(length(max = 200))]
    pub location: Option<String>,
    pub is_recurring: Option<bool>,
    #[validate(length(max = 50))]
    pub recurrence_pattern: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateEventRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(min = 1))]
    pub description: Option<String>,
    pub event_type: Option<EventType>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    #[validate(length(max = 200))]
    pub location: Option<String>,
    pub is_recurring: Option<bool>,
    #[validate(length(max = 50))]
    pub recurrence_pattern: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RsvpResponse {
    pub message: String,
    pub is_attending: bool,
    pub attendees_count: i64,
}
