use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "visitor_purpose", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VisitorPurpose {
    Personal,
    Delivery,
    Service,
    Official,
    Other,
}

impl Default for VisitorPurpose {
    fn default() -> Self {
        Self::Personal
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "visitor_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VisitorStatus {
    Pending,
    Approved,
    InPremises,
    Exited,
    Rejected,
}

impl Default for VisitorStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl VisitorStatus {
    /// PENDING -> APPROVED -> IN_PREMISES -> EXITED, or REJECTED before entry.
    pub fn can_transition_to(self, next: VisitorStatus) -> bool {
        use VisitorStatus::*;
        matches!(
            (self, next),
            (Pending, Approved)
                | (Pending, Rejected)
                | (Approved, Rejected)
                | (Approved, InPremises)
                | (InPremises, Exited)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Visitor {
    pub id: Uuid,
    pub society_id: Uuid,
    pub flat_id: Uuid,
    pub name: String,
    pub phone: String,
    pub purpose: VisitorPurpose,
    pub photo_url: Option<String>,
    pub vehicle_number: String,
    pub status: VisitorStatus,
    pub entry_time: Option<DateTime<Utc>>,
    pub exit_time: Option<DateTime<Utc>>,
    pub approved_by: Option<Uuid>,
    pub pre_approved: bool,
    pub checked_in_by: Option<Uuid>,
    pub checked_out_by: Option<Uuid>,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct VisitorRow {
    #[sqlx(flatten)]
    pub visitor: Visitor,
    pub flat_number: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VisitorResponse {
    pub id: Uuid,
    pub society: Uuid,
    pub flat: Uuid,
    pub flat_number: String,
    pub name: String,
    pub phone: String,
    pub purpose: VisitorPurpose,
    pub photo_url: Option<String>,
    pub vehicle_number: String,
    pub status: VisitorStatus,
    pub entry_time: Option<DateTime<Utc>>,
    pub exit_time: Option<DateTime<Utc>>,
    pub approved_by: Option<Uuid>,
    pub pre_approved: bool,
    pub checked_in_by: Option<Uuid>,
    pub checked_out_by: Option<Uuid>,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<VisitorRow> for VisitorResponse {
    fn from(row: VisitorRow) -> Self {
        let v = row.visitor;
        Self {
            id: v.id,
            society: v.society_id,
            flat: v.flat_id,
            flat_number: row.flat_number,
            name: v.name,
            phone: v.phone,
            purpose: v.purpose,
            photo_url: v.photo_url,
            vehicle_number: v.vehicle_number,
            status: v.status,
            entry_time: v.entry_time,
            exit_time: v.exit_time,
            approved_by: v.approved_by,
            pre_approved: v.pre_approved,
            checked_in_by: v.checked_in_by,
            checked_out_by: v.checked_out_by,
            notes: v.notes,
            created_at: v.created_at,
            updated_at: v.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateVisitorRequest {
    pub flat: Uuid,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1, max = 15))]
    pub phone: String,
    pub purpose: Option<VisitorPurpose>,
    #[validate(length(max = 20))]
    pub vehicle_number: Option<String>,
    pub pre_approved: Option<bool>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateVisitorRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 15))]
    pub phone: Option<String>,
    pub purpose: Option<VisitorPurpose>,
    #[validate(length(max = 20))]
    pub vehicle_number: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CheckInRequest {
    pub entry_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CheckOutRequest {
    pub exit_time: Option<DateTime<Utc>>,
}
