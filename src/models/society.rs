use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::{BillStatus, UserSummary};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Society {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub pincode: String,
    pub registration_number: String,
    pub total_flats: i32,
    pub total_floors: i32,
    pub amenities: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateSocietyRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1))]
    pub address: String,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(min = 1, max = 100))]
    pub state: String,
    #[validate(length(min = 1, max = 10))]
    pub pincode: String,
    #[validate(length(max = 100))]
    pub registration_number: Option<String>,
    #[validate(range(min = 0))]
    pub total_flats: i32,
    #[validate(range(min = 0))]
    pub total_floors: i32,
    pub amenities: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateSocietyRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(length(min = 1))]
    pub address: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub city: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub state: Option<String>,
    #[validate(length(min = 1, max = 10))]
    pub pincode: Option<String>,
    #[validate(length(max = 100))]
    pub registration_number: Option<String>,
    #[validate(range(min = 0))]
    pub total_flats: Option<i32>,
    #[validate(range(min = 0))]
    pub total_floors: Option<i32>,
    pub amenities: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Block {
    pub id: Uuid,
    pub society_id: Uuid,
    pub name: String,
    pub floors: i32,
    pub units_per_floor: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, FromRow, ToSchema)]
pub struct BlockResponse {
    pub id: Uuid,
    pub society: Uuid,
    pub society_name: String,
    pub name: String,
    pub floors: i32,
    pub units_per_floor: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateBlockRequest {
    pub society: Uuid,
    #[validate(length(min = 1, max = 50))]
    pub name: String,
    #[validate(range(min = 1, max = 200))]
    pub floors: i32,
    #[validate(range(min = 1, max = 99))]
    pub units_per_floor: i32,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateBlockRequest {
    #[validate(length(min = 1, max = 50))]
    pub name: Option<String>,
    #[validate(range(min = 1, max = 200))]
    pub floors: Option<i32>,
    #[validate(range(min = 1, max = 99))]
    pub units_per_floor: Option<i32>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateBlockWithFlatsRequest {
    pub society: Uuid,
    #[validate(length(min = 1, max = 50))]
    pub name: String,
    #[validate(range(min = 1, max = 200))]
    pub floors: i32,
    #[validate(range(min = 1, max = 99))]
    pub units_per_floor: i32,
    #[validate(length(min = 1, max = 10))]
    pub bhk: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RegenerateFlatsResponse {
    pub message: String,
    pub flats_count: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "occupancy_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OccupancyStatus {
    Owner,
    Tenant,
    Vacant,
}

impl Default for OccupancyStatus {
    fn default() -> Self {
        Self::Owner
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Flat {
    pub id: Uuid,
    pub society_id: Uuid,
    pub block_id: Option<Uuid>,
    pub flat_number: String,
    pub floor: i32,
    pub bhk: String,
    pub area_sqft: Option<Decimal>,
    pub occupancy_status: OccupancyStatus,
    pub owner_id: Option<Uuid>,
    pub current_resident_id: Option<Uuid>,
    pub parking_slots: i32,
    pub parking_numbers: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Flat row joined with the names the list payload shows.
#[derive(Debug, Clone, FromRow)]
pub struct FlatListRow {
    #[sqlx(flatten)]
    pub flat: Flat,
    pub block_name: Option<String>,
    pub owner_first_name: Option<String>,
    pub owner_last_name: Option<String>,
    pub resident_first_name: Option<String>,
    pub resident_last_name: Option<String>,
    pub has_overdue: bool,
    pub latest_bill_status: Option<BillStatus>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FlatResponse {
    pub id: Uuid,
    pub society: Uuid,
    pub block: Option<Uuid>,
    pub block_name: Option<String>,
    pub flat_number: String,
    pub floor: i32,
    pub bhk: String,
    pub area_sqft: Option<Decimal>,
    pub occupancy_status: OccupancyStatus,
    pub owner: Option<Uuid>,
    pub owner_name: Option<String>,
    pub current_resident: Option<Uuid>,
    pub resident_name: Option<String>,
    pub parking_slots: i32,
    pub parking_numbers: String,
    /// `overdue` when any unpaid bill is past its due date, otherwise `paid`.
    pub maintenance_status: String,
    pub latest_bill_status: Option<BillStatus>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FlatDetailResponse {
    pub id: Uuid,
    pub society: Society,
    pub block: Option<Uuid>,
    pub block_name: Option<String>,
    pub flat_number: String,
    pub floor: i32,
    pub bhk: String,
    pub area_sqft: Option<Decimal>,
    pub occupancy_status: OccupancyStatus,
    pub owner: Option<UserSummary>,
    pub current_resident: Option<UserSummary>,
    pub parking_slots: i32,
    pub parking_numbers: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateFlatRequest {
    pub society: Uuid,
    pub block: Option<Uuid>,
    #[validate(length(min = 1, max = 20))]
    pub flat_number: String,
    pub floor: i32,
    #[validate(length(min = 1, max = 10))]
    pub bhk: Option<String>,
    pub area_sqft: Option<Decimal>,
    pub occupancy_status: Option<OccupancyStatus>,
    pub owner: Option<Uuid>,
    pub current_resident: Option<Uuid>,
    #[validate(range(min = 0))]
    pub parking_slots: Option<i32>,
    #[validate(length(max = 100))]
    pub parking_numbers: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateFlatRequest {
    pub block: Option<Uuid>,
    #[validate(length(min = 1, max = 20))]
    pub flat_number: Option<String>,
    pub floor: Option<i32>,
    #[validate(length(min = 1, max = 10))]
    pub bhk: Option<String>,
    pub area_sqft: Option<Decimal>,
    pub occupancy_status: Option<OccupancyStatus>,
    /// `null` clears the owner.
    #[serde(default, deserialize_with = "crate::utils::double_option")]
    #[schema(value_type = Option<Uuid>)]
    pub owner: Option<Option<Uuid>>,
    /// `null` clears the resident.
    #[serde(default, deserialize_with = "crate::utils::double_option")]
    #[schema(value_type = Option<Uuid>)]
    pub current_resident: Option<Option<Uuid>>,
    #[validate(range(min = 0))]
    pub parking_slots: Option<i32>,
    #[validate(length(max = 100))]
    pub parking_numbers: Option<String>,
}

// Dashboard
#[derive(Debug, Serialize, ToSchema)]
pub struct DashboardResponse {
    pub blocks: Vec<DashboardBlock>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DashboardBlock {
    pub name: String,
    pub floors: Vec<DashboardFloor>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DashboardFloor {
    pub floor: i32,
    pub flats: Vec<DashboardFlat>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DashboardFlat {
    pub id: Uuid,
    pub flat_number: String,
    pub floor: i32,
    pub bhk: String,
    pub occupancy_status: OccupancyStatus,
    pub maintenance_status: String,
    pub block_name: String,
    pub current_bill_id: Option<Uuid>,
    pub current_bill_status: BillStatus,
    pub current_resident: Option<UserSummary>,
    pub owner: Option<UserSummary>,
}
