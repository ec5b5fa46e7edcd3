//! Bill arithmetic and the payment workflow.
//!
//! `total_amount` and `status` are always derived here and never taken from a
//! request. `paid_amount` only moves inside [`record_payment`], in the same
//! transaction as the payment row, with the bill locked.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use sqlx::{Connection, PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::models::{Bill, BillCharges, BillStatus, Payment, PaymentMethod, PaymentStatus};
use crate::permissions::can_pay_bill;

const RECEIPT_CONSTRAINT: &str = "payments_receipt_number_key";
const RECEIPT_ATTEMPTS: usize = 5;

pub fn compute_total(charges: &BillCharges) -> Decimal {
    charges.maintenance_charge
        + charges.water_charge
        + charges.parking_charge
        + charges.electricity_charge
        + charges.other_charges
        + charges.late_fee
}

pub fn derive_status(total: Decimal, paid: Decimal, due_date: NaiveDate, today: NaiveDate) -> BillStatus {
    if paid >= total {
        BillStatus::Paid
    } else if paid > Decimal::ZERO {
        BillStatus::Partial
    } else if due_date < today {
        BillStatus::Overdue
    } else {
        BillStatus::Unpaid
    }
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// `overdue` when any unsettled bill of the flat is past due.
pub fn maintenance_status(has_overdue: bool) -> &'static str {
    if has_overdue {
        "overdue"
    } else {
        "paid"
    }
}

/// Billing month (first day) and due date of the placeholder bill a new flat starts with.
pub fn default_bill_dates(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let month = today.with_day(1).unwrap_or(today);
    (month, month + Duration::days(30))
}

pub fn receipt_number(now: DateTime<Utc>, suffix: u8) -> String {
    format!(
        "RCP{}{:03}{:02}",
        now.format("%Y%m%d%H%M%S"),
        now.timestamp_subsec_millis() % 1000,
        suffix % 100
    )
}

fn next_receipt_number() -> String {
    receipt_number(Utc::now(), rand::thread_rng().gen_range(0..100))
}

pub fn validate_payment(bill: &Bill, amount: Decimal) -> AppResult<()> {
    if amount <= Decimal::ZERO {
        return Err(AppError::field("amount", "Amount must be greater than zero"));
    }
    if bill.status == BillStatus::Paid {
        return Err(AppError::BadRequest("Bill is already fully paid".to_string()));
    }
    let balance = bill.balance();
    if amount > balance {
        return Err(AppError::field(
            "amount",
            format!("Amount exceeds the outstanding balance of {}", balance),
        ));
    }
    Ok(())
}

/// Flips unpaid bills whose due date has passed to OVERDUE.
pub async fn refresh_overdue(pool: &PgPool) -> AppResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE bills
        SET status = 'OVERDUE', updated_at = NOW()
        WHERE status = 'UNPAID' AND paid_amount = 0 AND due_date < CURRENT_DATE
        "#,
    )
    .execute(pool)
    .await?;

    if result.rows_affected() > 0 {
        tracing::debug!(count = result.rows_affected(), "bills marked overdue");
    }
    Ok(result.rows_affected())
}

pub const DEFAULT_BILL_NOTES: &str = "Default utility bill created automatically";

/// Inserts the zero-charge bill for the current month unless the flat already has one.
pub async fn create_default_bill(
    conn: &mut PgConnection,
    society_id: Uuid,
    flat_id: Uuid,
) -> AppResult<()> {
    let today = today();
    let (billing_month, due_date) = default_bill_dates(today);
    let status = derive_status(Decimal::ZERO, Decimal::ZERO, due_date, today);

    sqlx::query(
        r#"
        INSERT INTO bills (society_id, flat_id, billing_month, due_date, total_amount,
                           paid_amount, status, notes)
        VALUES ($1, $2, $3, $4, 0, 0, $5, $6)
        ON CONFLICT (flat_id, billing_month) DO NOTHING
        "#,
    )
    .bind(society_id)
    .bind(flat_id)
    .bind(billing_month)
    .bind(due_date)
    .bind(status)
    .bind(DEFAULT_BILL_NOTES)
    .execute(conn)
    .await?;

    Ok(())
}

#[derive(Debug)]
pub struct NewPayment {
    /// `None` settles the whole outstanding balance.
    pub amount: Option<Decimal>,
    pub method: PaymentMethod,
    pub transaction_id: String,
    pub notes: String,
}

#[derive(sqlx::FromRow)]
struct LockedBill {
    #[sqlx(flatten)]
    bill: Bill,
    current_resident_id: Option<Uuid>,
}

/// Records a successful payment and applies it to the bill.
pub async fn record_payment(
    pool: &PgPool,
    user: &AuthUser,
    bill_id: Uuid,
    payment: NewPayment,
) -> AppResult<Payment> {
    let (all, society) = user.scope().bind_values();
    let mut tx = pool.begin().await?;

    let locked = sqlx::query_as::<_, LockedBill>(
        r#"
        SELECT b.*, f.current_resident_id
        FROM bills b
        JOIN flats f ON f.id = b.flat_id
        WHERE b.id = $1 AND ($2::bool OR b.society_id = $3)
        FOR UPDATE OF b
        "#,
    )
    .bind(bill_id)
    .bind(all)
    .bind(society)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound("Bill not found".to_string()))?;

    if !can_pay_bill(user, locked.current_resident_id) {
        return Err(AppError::Forbidden);
    }

    let bill = locked.bill;
    let amount = payment.amount.unwrap_or_else(|| bill.balance());
    validate_payment(&bill, amount)?;

    let mut attempt = 0;
    let created = loop {
        attempt += 1;
        let mut savepoint = tx.begin().await?;
        let inserted = sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (bill_id, amount, payment_method, payment_status,
                                  transaction_id, receipt_number, paid_by, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(bill.id)
        .bind(amount)
        .bind(payment.method)
        .bind(PaymentStatus::Success)
        .bind(&payment.transaction_id)
        .bind(next_receipt_number())
        .bind(user.user_id)
        .bind(&payment.notes)
        .fetch_one(&mut *savepoint)
        .await;

        match inserted {
            Ok(row) => {
                savepoint.commit().await?;
                break row;
            }
            Err(e) if attempt < RECEIPT_ATTEMPTS && is_receipt_collision(&e) => {
                tracing::warn!(attempt, "receipt number collision, retrying");
                savepoint.rollback().await?;
            }
            Err(e) => return Err(e.into()),
        }
    };

    let paid = bill.paid_amount + amount;
    let status = derive_status(bill.total_amount, paid, bill.due_date, today());
    sqlx::query("UPDATE bills SET paid_amount = $2, status = $3, updated_at = NOW() WHERE id = $1")
        .bind(bill.id)
        .bind(paid)
        .bind(status)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(
        bill_id = %bill.id,
        receipt = %created.receipt_number,
        amount = %amount,
        ?status,
        "payment recorded"
    );
    Ok(created)
}

fn is_receipt_collision(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|db| db.is_unique_violation() && db.constraint() == Some(RECEIPT_CONSTRAINT))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::prelude::FromPrimitive;

    fn dec(v: f64) -> Decimal {
        Decimal::from_f64(v).unwrap().round_dp(2)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn bill(total: f64, paid: f64, status: BillStatus) -> Bill {
        Bill {
            id: Uuid::new_v4(),
            society_id: Uuid::new_v4(),
            flat_id: Uuid::new_v4(),
            billing_month: date(2024, 5, 1),
            due_date: date(2024, 5, 31),
            maintenance_charge: dec(total),
            water_charge: Decimal::ZERO,
            parking_charge: Decimal::ZERO,
            electricity_charge: Decimal::ZERO,
            other_charges: Decimal::ZERO,
            late_fee: Decimal::ZERO,
            total_amount: dec(total),
            paid_amount: dec(paid),
            status,
            notes: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_total_is_sum_of_charges() {
        let charges = BillCharges {
            maintenance_charge: dec(2500.0),
            water_charge: dec(300.5),
            parking_charge: dec(500.0),
            electricity_charge: dec(120.25),
            other_charges: dec(0.0),
            late_fee: dec(100.0),
        };
        assert_eq!(compute_total(&charges), dec(3520.75));
        assert_eq!(compute_total(&BillCharges::default()), Decimal::ZERO);
    }

    #[test]
    fn test_status_derivation() {
        let due = date(2024, 5, 31);
        let before = date(2024, 5, 30);
        let after = date(2024, 6, 1);

        assert_eq!(derive_status(dec(100.0), dec(100.0), due, after), BillStatus::Paid);
        assert_eq!(derive_status(dec(100.0), dec(150.0), due, before), BillStatus::Paid);
        assert_eq!(derive_status(dec(100.0), dec(40.0), due, after), BillStatus::Partial);
        assert_eq!(derive_status(dec(100.0), dec(0.0), due, after), BillStatus::Overdue);
        assert_eq!(derive_status(dec(100.0), dec(0.0), due, before), BillStatus::Unpaid);
        // due today is not yet overdue
        assert_eq!(derive_status(dec(100.0), dec(0.0), due, due), BillStatus::Unpaid);
        assert_eq!(derive_status(dec(0.0), dec(0.0), due, after), BillStatus::Paid);
    }

    #[test]
    fn test_receipt_number_format() {
        let now = DateTime::parse_from_rfc3339("2024-03-05T07:08:09.042Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(receipt_number(now, 7), "RCP2024030507080904207");
        assert_eq!(receipt_number(now, 99).len(), 22);

        let generated = next_receipt_number();
        assert!(generated.starts_with("RCP"));
        assert!(generated[3..].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_validate_payment() {
        let open = bill(1000.0, 200.0, BillStatus::Partial);
        assert!(validate_payment(&open, dec(800.0)).is_ok());
        assert!(matches!(
            validate_payment(&open, dec(800.01)),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            validate_payment(&open, Decimal::ZERO),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            validate_payment(&open, dec(-5.0)),
            Err(AppError::Validation(_))
        ));

        let settled = bill(1000.0, 1000.0, BillStatus::Paid);
        assert!(matches!(
            validate_payment(&settled, dec(1.0)),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_default_bill_dates() {
        let (month, due) = default_bill_dates(date(2024, 2, 17));
        assert_eq!(month, date(2024, 2, 1));
        assert_eq!(due, date(2024, 3, 2));
    }

    #[test]
    fn test_maintenance_status() {
        assert_eq!(maintenance_status(true), "overdue");
        assert_eq!(maintenance_status(false), "paid");
    }
}
