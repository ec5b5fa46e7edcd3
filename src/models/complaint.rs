use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::UserSummary;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "complaint_category", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplaintCategory {
    Plumbing,
    Electrical,
    Civil,
    Carpentry,
    Cleaning,
    Security,
    Lift,
    Generator,
    Water,
    Other,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "priority_level", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Medium
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "complaint_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplaintStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
    Rejected,
}

impl Default for ComplaintStatus {
    fn default() -> Self {
        Self::Open
    }
}

impl ComplaintStatus {
    /// OPEN -> IN_PROGRESS -> RESOLVED -> CLOSED, with REJECTED reachable
    /// until the complaint is resolved. CLOSED and REJECTED are terminal.
    /// Re-assigning an IN_PROGRESS complaint keeps it IN_PROGRESS.
    pub fn can_transition_to(self, next: ComplaintStatus) -> bool {
        use ComplaintStatus::*;
        match (self, next) {
            (a, b) if a == b => a == InProgress,
            (Open, InProgress) | (Open, Resolved) | (Open, Rejected) => true,
            (InProgress, Resolved) | (InProgress, Rejected) => true,
            (Resolved, Closed) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Complaint {
    pub id: Uuid,
    pub society_id: Uuid,
    pub flat_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub category: ComplaintCategory,
    pub priority: Priority,
    pub status: ComplaintStatus,
    pub photo1: Option<String>,
    pub photo2: Option<String>,
    pub photo3: Option<String>,
    pub created_by: Uuid,
    pub assigned_to: Option<Uuid>,
    pub resolution_notes: String,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ComplaintListRow {
    #[sqlx(flatten)]
    pub complaint: Complaint,
    pub created_by_name: Option<String>,
    pub assigned_to_name: Option<String>,
    pub flat_number: Option<String>,
    pub updates_count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ComplaintResponse {
    pub id: Uuid,
    pub society: Uuid,
    pub flat: Option<Uuid>,
    pub flat_number: Option<String>,
    pub title: String,
    pub description: String,
    pub category: ComplaintCategory,
    pub priority: Priority,
    pub status: ComplaintStatus,
    pub photos: Vec<String>,
    pub created_by: Uuid,
    pub created_by_name: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub assigned_to_name: Option<String>,
    pub resolution_notes: String,
    pub resolved_at: Option<DateTime<Utc>>,
    pub updates_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ComplaintListRow> for ComplaintResponse {
    fn from(row: ComplaintListRow) -> Self {
        let c = row.complaint;
        let photos = [c.photo1, c.photo2, c.photo3].into_iter().flatten().collect();
        Self {
            id: c.id,
            society: c.society_id,
            flat: c.flat_id,
            flat_number: row.flat_number,
            title: c.title,
            description: c.description,
            category: c.category,
            priority: c.priority,
            status: c.status,
            photos,
            created_by: c.created_by,
            created_by_name: row.created_by_name,
            assigned_to: c.assigned_to,
            assigned_to_name: row.assigned_to_name,
            resolution_notes: c.resolution_notes,
            resolved_at: c.resolved_at,
            updates_count: row.updates_count,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ComplaintDetailResponse {
    #[serde(flatten)]
    pub complaint: ComplaintResponse,
    pub created_by_detail: Option<UserSummary>,
    pub assigned_to_detail: Option<UserSummary>,
    pub updates: Vec<ComplaintUpdateResponse>,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct ComplaintUpdateResponse {
    pub id: Uuid,
    pub complaint: Uuid,
    pub message: String,
    pub updated_by: Uuid,
    pub updated_by_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateComplaintRequest {
    pub flat: Option<Uuid>,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1))]
    pub description: String,
    pub category: ComplaintCategory,
    pub priority: Option<Priority>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateComplaintRequest {
    pub flat: Option<Uuid>,
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(min = 1))]
    pub description: Option<String>,
    pub category: Option<ComplaintCategory>,
    pub priority: Option<Priority>,
    /// Only ADMIN and COMMITTEE may move the status directly.
    pub status: Option<ComplaintStatus>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AddComplaintUpdateRequest {
    #[validate(length(min = 1, message = "This field is required"))]
    pub message: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignComplaintRequest {
    pub assigned_to: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ResolveComplaintRequest {
    pub resolution_notes: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RejectComplaintRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ComplaintStatsResponse {
    pub total: i64,
    pub open: i64,
    pub in_progress: i64,
    pub resolved: i64,
    pub closed: i64,
    pub rejected: i64,
}
