use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::FlatResponse;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "bill_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillStatus {
    Unpaid,
    Partial,
    Paid,
    Overdue,
}

impl Default for BillStatus {
    fn default() -> Self {
        Self::Unpaid
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Bill {
    pub id: Uuid,
    pub society_id: Uuid,
    pub flat_id: Uuid,
    pub billing_month: NaiveDate,
    pub due_date: NaiveDate,
    pub maintenance_charge: Decimal,
    pub water_charge: Decimal,
    pub parking_charge: Decimal,
    pub electricity_charge: Decimal,
    pub other_charges: Decimal,
    pub late_fee: Decimal,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub status: BillStatus,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bill {
    pub fn charges(&self) -> BillCharges {
        BillCharges {
            maintenance_charge: self.maintenance_charge,
            water_charge: self.water_charge,
            parking_charge: self.parking_charge,
            electricity_charge: self.electricity_charge,
            other_charges: self.other_charges,
            late_fee: self.late_fee,
        }
    }

    pub fn balance(&self) -> Decimal {
        self.total_amount - self.paid_amount
    }
}

/// The charge components a bill total is derived from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BillCharges {
    pub maintenance_charge: Decimal,
    pub water_charge: Decimal,
    pub parking_charge: Decimal,
    pub electricity_charge: Decimal,
    pub other_charges: Decimal,
    pub late_fee: Decimal,
}

#[derive(Debug, Clone, FromRow)]
pub struct BillListRow {
    #[sqlx(flatten)]
    pub bill: Bill,
    pub flat_number: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BillResponse {
    pub id: Uuid,
    pub society: Uuid,
    pub flat: Uuid,
    pub flat_number: String,
    pub billing_month: NaiveDate,
    pub due_date: NaiveDate,
    pub maintenance_charge: Decimal,
    pub water_charge: Decimal,
    pub parking_charge: Decimal,
    pub electricity_charge: Decimal,
    pub other_charges: Decimal,
    pub late_fee: Decimal,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub balance_amount: Decimal,
    pub status: BillStatus,
    pub notes: String,
    pub payments: Vec<PaymentResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BillDetailResponse {
    #[serde(flatten)]
    pub bill: BillResponse,
    pub flat_detail: FlatResponse,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateBillRequest {
    pub flat: Uuid,
    pub billing_month: NaiveDate,
    pub due_date: NaiveDate,
    pub maintenance_charge: Option<Decimal>,
    pub water_charge: Option<Decimal>,
    pub parking_charge: Option<Decimal>,
    pub electricity_charge: Option<Decimal>,
    pub other_charges: Option<Decimal>,
    pub late_fee: Option<Decimal>,
    pub notes: Option<String>,
}

impl CreateBillRequest {
    pub fn charges(&self) -> BillCharges {
        BillCharges {
            maintenance_charge: self.maintenance_charge.unwrap_or_default(),
            water_charge: self.water_charge.unwrap_or_default(),
            parking_charge: self.parking_charge.unwrap_or_default(),
            electricity_charge: self.electricity_charge.unwrap_or_default(),
            other_charges: self.other_charges.unwrap_or_default(),
            late_fee: self.late_fee.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateBillRequest {
    pub billing_month: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub maintenance_charge: Option<Decimal>,
    pub water_charge: Option<Decimal>,
    pub parking_charge: Option<Decimal>,
    pub electricity_charge: Option<Decimal>,
    pub other_charges: Option<Decimal>,
    pub late_fee: Option<Decimal>,
    pub notes: Option<String>,
}

impl UpdateBillRequest {
    /// Charges after applying this patch on top of the stored bill.
    pub fn merged_charges(&self, bill: &Bill) -> BillCharges {
        BillCharges {
            maintenance_charge: self.maintenance_charge.unwrap_or(bill.maintenance_charge),
            water_charge: self.water_charge.unwrap_or(bill.water_charge),
            parking_charge: self.parking_charge.unwrap_or(bill.parking_charge),
            electricity_charge: self.electricity_charge.unwrap_or(bill.electricity_charge),
            other_charges: self.other_charges.unwrap_or(bill.other_charges),
            late_fee: self.late_fee.unwrap_or(bill.late_fee),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BillStatsResponse {
    pub total_bills: i64,
    pub unpaid: i64,
    pub partial: i64,
    pub paid: i64,
    pub overdue: i64,
    pub total_amount: Decimal,
    pub total_paid: Decimal,
    pub total_pending: Decimal,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "payment_method", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    Online,
    Cheque,
    Upi,
    Card,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "payment_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
    Refunded,
}

impl Default for PaymentStatus {
    fn default() -> Self {
        Self::Pending
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Payment {
    pub id: Uuid,
    pub bill_id: Uuid,
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub transaction_id: String,
    pub receipt_number: String,
    pub paid_by: Uuid,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct PaymentRow {
    #[sqlx(flatten)]
    pub payment: Payment,
    pub paid_by_first_name: String,
    pub paid_by_last_name: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub bill: Uuid,
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub transaction_id: String,
    pub receipt_number: String,
    pub paid_by: Uuid,
    pub paid_by_name: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

impl From<PaymentRow> for PaymentResponse {
    fn from(row: PaymentRow) -> Self {
        let p = row.payment;
        Self {
            id: p.id,
            bill: p.bill_id,
            amount: p.amount,
            payment_method: p.payment_method,
            payment_status: p.payment_status,
            transaction_id: p.transaction_id,
            receipt_number: p.receipt_number,
            paid_by: p.paid_by,
            paid_by_name: super::full_name(&row.paid_by_first_name, &row.paid_by_last_name),
            notes: p.notes,
            created_at: p.created_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RecordPaymentRequest {
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    #[validate(length(max = 100))]
    pub transaction_id: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MarkPaidRequest {
    pub notes: Option<String>,
}
