use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::FromRow;
use utoipa::IntoParams;
use uuid::Uuid;
use validator::Validate;

use crate::api::society::fetch_flat_row;
use crate::error::{AppError, AppResult};
use crate::middleware::{AppState, AuthUser};
use crate::models::{
    Bill, BillDetailResponse, BillListRow, BillResponse, BillStatsResponse, BillStatus,
    CreateBillRequest, MarkPaidRequest, PaymentMethod, PaymentResponse, PaymentRow,
    PaymentStatus, RecordPaymentRequest, UpdateBillRequest, UserRole,
};
use crate::permissions::{authorize, Action, Module};
use crate::services::billing_service::{self, NewPayment};
use crate::utils::{order_by, search_pattern, ApiJson, PageParams, Paginated};
use crate::utils::pagination::{BillPage, PaymentPage};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/bills", get(list_bills).post(create_bill))
        .route("/bills/my_bills", get(my_bills))
        .route("/bills/stats", get(bill_stats))
        .route(
            "/bills/:id",
            get(get_bill).put(update_bill).patch(update_bill).delete(delete_bill),
        )
        .route("/bills/:id/record_payment", post(record_payment))
        .route("/bills/:id/mark_paid", post(mark_paid))
        .route("/payments", get(list_payments))
        .route("/payments/:id", get(get_payment))
}

const BILL_SELECT: &str = r#"
    SELECT b.*, f.flat_number
    FROM bills b
    JOIN flats f ON f.id = b.flat_id
"#;

const PAYMENT_SELECT: &str = r#"
    SELECT p.*, u.first_name AS paid_by_first_name, u.last_name AS paid_by_last_name
    FROM payments p
    JOIN users u ON u.id = p.paid_by
"#;

/// Residents only see bills of the flat they live in.
fn resident_filter(auth_user: &AuthUser) -> Option<Uuid> {
    (auth_user.role == UserRole::Resident).then_some(auth_user.user_id)
}

fn bill_response(row: BillListRow, payments: Vec<PaymentResponse>) -> BillResponse {
    let b = row.bill;
    BillResponse {
        id: b.id,
        society: b.society_id,
        flat: b.flat_id,
        flat_number: row.flat_number,
        billing_month: b.billing_month,
        due_date: b.due_date,
        maintenance_charge: b.maintenance_charge,
        water_charge: b.water_charge,
        parking_charge: b.parking_charge,
        electricity_charge: b.electricity_charge,
        other_charges: b.other_charges,
        late_fee: b.late_fee,
        total_amount: b.total_amount,
        paid_amount: b.paid_amount,
        balance_amount: b.total_amount - b.paid_amount,
        status: b.status,
        notes: b.notes,
        payments,
        created_at: b.created_at,
        updated_at: b.updated_at,
    }
}

/// Attaches each bill's payments, oldest first.
async fn with_payments(state: &AppState, rows: Vec<BillListRow>) -> AppResult<Vec<BillResponse>> {
    let ids: Vec<Uuid> = rows.iter().map(|r| r.bill.id).collect();
    let payments = sqlx::query_as::<_, PaymentRow>(&format!(
        "{} WHERE p.bill_id = ANY($1) ORDER BY p.created_at",
        PAYMENT_SELECT
    ))
    .bind(&ids)
    .fetch_all(&state.pool)
    .await?;

    let mut by_bill: HashMap<Uuid, Vec<PaymentResponse>> = HashMap::new();
    for row in payments {
        by_bill
            .entry(row.payment.bill_id)
            .or_default()
            .push(row.into());
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            let payments = by_bill.remove(&row.bill.id).unwrap_or_default();
            bill_response(row, payments)
        })
        .collect())
}

async fn fetch_bill_row(state: &AppState, auth_user: &AuthUser, id: Uuid) -> AppResult<BillListRow> {
    let (all, society) = auth_user.scope().bind_values();
    sqlx::query_as::<_, BillListRow>(&format!(
        r#"{} WHERE b.id = $1 AND ($2::bool OR b.society_id = $3)
              AND ($4::uuid IS NULL OR f.current_resident_id = $4)"#,
        BILL_SELECT
    ))
    .bind(id)
    .bind(all)
    .bind(society)
    .bind(resident_filter(auth_user))
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Bill not found".to_string()))
}

async fn bill_payload(state: &AppState, auth_user: &AuthUser, id: Uuid) -> AppResult<BillResponse> {
    let row = fetch_bill_row(state, auth_user, id).await?;
    let mut bills = with_payments(state, vec![row]).await?;
    bills
        .pop()
        .ok_or_else(|| AppError::NotFound("Bill not found".to_string()))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct BillFilters {
    pub status: Option<BillStatus>,
    pub flat: Option<Uuid>,
    pub billing_month: Option<NaiveDate>,
    /// Matches the flat number
    pub search: Option<String>,
    /// `billing_month`, `due_date`, `total_amount`, prefixed with `-` for descending
    pub ordering: Option<String>,
}

/// List bills
#[utoipa::path(
    get,
    path = "/api/billing/bills",
    tag = "billing",
    security(("bearer_auth" = [])),
    params(PageParams, BillFilters),
    responses((status = 200, description = "Bills", body = BillPage))
)]
pub async fn list_bills(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(page): Query<PageParams>,
    Query(filters): Query<BillFilters>,
) -> AppResult<Json<Paginated<BillResponse>>> {
    authorize(&auth_user, Module::Bill, Action::List)?;
    billing_service::refresh_overdue(&state.pool).await?;

    let page = page.resolve(&state.config);
    let (all, society) = auth_user.scope().bind_values();
    let search = search_pattern(filters.search.as_deref());
    let order = order_by(
        filters.ordering.as_deref(),
        &[
            ("billing_month", "b.billing_month"),
            ("due_date", "b.due_date"),
            ("total_amount", "b.total_amount"),
        ],
        "b.billing_month DESC, f.flat_number ASC",
    );

    let filter = r#"
        WHERE ($1::bool OR b.society_id = $2)
          AND ($3::uuid IS NULL OR f.current_resident_id = $3)
          AND ($4::bill_status IS NULL OR b.status = $4)
          AND ($5::uuid IS NULL OR b.flat_id = $5)
          AND ($6::date IS NULL OR b.billing_month = $6)
          AND ($7::text IS NULL OR f.flat_number ILIKE $7)
    "#;

    let (count,): (i64,) = sqlx::query_as(&format!(
        "SELECT COUNT(*) FROM bills b JOIN flats f ON f.id = b.flat_id {}",
        filter
    ))
    .bind(all)
    .bind(society)
    .bind(resident_filter(&auth_user))
    .bind(filters.status)
    .bind(filters.flat)
    .bind(filters.billing_month)
    .bind(&search)
    .fetch_one(&state.pool)
    .await?;

    let rows = sqlx::query_as::<_, BillListRow>(&format!(
        "{} {} ORDER BY {} LIMIT $8 OFFSET $9",
        BILL_SELECT, filter, order
    ))
    .bind(all)
    .bind(society)
    .bind(resident_filter(&auth_user))
    .bind(filters.status)
    .bind(filters.flat)
    .bind(filters.billing_month)
    .bind(&search)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&state.pool)
    .await?;

    let results = with_payments(&state, rows).await?;
    Ok(Json(Paginated::new(results, count, page)))
}

/// Bills of the flats the caller currently lives in
#[utoipa::path(
    get,
    path = "/api/billing/bills/my_bills",
    tag = "billing",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Bills, newest month first", body = Vec<BillResponse>))
)]
pub async fn my_bills(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<Vec<BillResponse>>> {
    authorize(&auth_user, Module::Bill, Action::MyBills)?;
    billing_service::refresh_overdue(&state.pool).await?;

    let rows = sqlx::query_as::<_, BillListRow>(&format!(
        "{} WHERE f.current_resident_id = $1 ORDER BY b.billing_month DESC",
        BILL_SELECT
    ))
    .bind(auth_user.user_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(with_payments(&state, rows).await?))
}

/// Get a bill with its flat and payments
#[utoipa::path(
    get,
    path = "/api/billing/bills/{id}",
    tag = "billing",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Bill ID")),
    responses(
        (status = 200, description = "Bill", body = BillDetailResponse),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_bill(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<BillDetailResponse>> {
    authorize(&auth_user, Module::Bill, Action::Retrieve)?;

    let bill = bill_payload(&state, &auth_user, id).await?;
    let flat = fetch_flat_row(&state, auth_user.scope(), bill.flat).await?;

    Ok(Json(BillDetailResponse {
        bill,
        flat_detail: flat.into(),
    }))
}

/// Create a bill; total and status are derived from the charges
#[utoipa::path(
    post,
    path = "/api/billing/bills",
    tag = "billing",
    security(("bearer_auth" = [])),
    request_body = CreateBillRequest,
    responses(
        (status = 201, description = "Created", body = BillResponse),
        (status = 400, description = "Validation error"),
        (status = 403, description = "Admins and committee only"),
        (status = 409, description = "Flat already billed for this month")
    )
)]
pub async fn create_bill(
    State(state): State<AppState>,
    auth_user: AuthUser,
    ApiJson(payload): ApiJson<CreateBillRequest>,
) -> AppResult<(StatusCode, Json<BillResponse>)> {
    authorize(&auth_user, Module::Bill, Action::Create)?;
    payload.validate()?;

    let charges = payload.charges();
    check_charges(&[
        ("maintenance_charge", charges.maintenance_charge),
        ("water_charge", charges.water_charge),
        ("parking_charge", charges.parking_charge),
        ("electricity_charge", charges.electricity_charge),
        ("other_charges", charges.other_charges),
        ("late_fee", charges.late_fee),
    ])?;

    let flat = fetch_flat_row(&state, auth_user.scope(), payload.flat)
        .await
        .map_err(|_| AppError::field("flat", "Invalid flat"))?;

    let total = billing_service::compute_total(&charges);
    let status = billing_service::derive_status(
        total,
        Decimal::ZERO,
        payload.due_date,
        billing_service::today(),
    );

    let bill = sqlx::query_as::<_, Bill>(
        r#"
        INSERT INTO bills (society_id, flat_id, billing_month, due_date,
                           maintenance_charge, water_charge, parking_charge,
                           electricity_charge, other_charges, late_fee,
                           total_amount, paid_amount, status, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 0, $12, $13)
        RETURNING *
        "#,
    )
    .bind(flat.flat.society_id)
    .bind(flat.flat.id)
    .bind(payload.billing_month)
    .bind(payload.due_date)
    .bind(charges.maintenance_charge)
    .bind(charges.water_charge)
    .bind(charges.parking_charge)
    .bind(charges.electricity_charge)
    .bind(charges.other_charges)
    .bind(charges.late_fee)
    .bind(total)
    .bind(status)
    .bind(payload.notes.as_deref().unwrap_or(""))
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(bill_id = %bill.id, flat = %flat.flat.flat_number, total = %total, "bill created");
    Ok((StatusCode::CREATED, Json(bill_payload(&state, &auth_user, bill.id).await?)))
}

fn check_charges(charges: &[(&'static str, Decimal)]) -> AppResult<()> {
    match charges.iter().find(|(_, value)| value.is_sign_negative() && !value.is_zero()) {
        Some((field, _)) => Err(AppError::field(field, "Charge cannot be negative")),
        None => Ok(()),
    }
}

/// Update charges, dates or notes; total and status are recomputed
#[utoipa::path(
    put,
    path = "/api/billing/bills/{id}",
    tag = "billing",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Bill ID")),
    request_body = UpdateBillRequest,
    responses(
        (status = 200, description = "Updated", body = BillResponse),
        (status = 404, description = "Not found")
    )
)]
pub async fn update_bill(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<UpdateBillRequest>,
) -> AppResult<Json<BillResponse>> {
    authorize(&auth_user, Module::Bill, Action::Update)?;
    payload.validate()?;

    fetch_bill_row(&state, &auth_user, id).await?;

    // paid_amount is read under the row lock so a concurrent payment cannot
    // leave a stale status behind.
    let mut tx = state.pool.begin().await?;
    let current = sqlx::query_as::<_, Bill>("SELECT * FROM bills WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Bill not found".to_string()))?;
    let charges = payload.merged_charges(&current);
    check_charges(&[
        ("maintenance_charge", charges.maintenance_charge),
        ("water_charge", charges.water_charge),
        ("parking_charge", charges.parking_charge),
        ("electricity_charge", charges.electricity_charge),
        ("other_charges", charges.other_charges),
        ("late_fee", charges.late_fee),
    ])?;

    let due_date = payload.due_date.unwrap_or(current.due_date);
    let total = billing_service::compute_total(&charges);
    let status = billing_service::derive_status(
        total,
        current.paid_amount,
        due_date,
        billing_service::today(),
    );

    sqlx::query(
        r#"
        UPDATE bills SET
            billing_month = COALESCE($2, billing_month),
            due_date = $3,
            maintenance_charge = $4,
            water_charge = $5,
            parking_charge = $6,
            electricity_charge = $7,
            other_charges = $8,
            late_fee = $9,
            total_amount = $10,
            status = $11,
            notes = COALESCE($12, notes),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(payload.billing_month)
    .bind(due_date)
    .bind(charges.maintenance_charge)
    .bind(charges.water_charge)
    .bind(charges.parking_charge)
    .bind(charges.electricity_charge)
    .bind(charges.other_charges)
    .bind(charges.late_fee)
    .bind(total)
    .bind(status)
    .bind(&payload.notes)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    Ok(Json(bill_payload(&state, &auth_user, id).await?))
}

/// Delete a bill and its payments
#[utoipa::path(
    delete,
    path = "/api/billing/bills/{id}",
    tag = "billing",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Bill ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_bill(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    authorize(&auth_user, Module::Bill, Action::Destroy)?;
    fetch_bill_row(&state, &auth_user, id).await?;

    sqlx::query("DELETE FROM bills WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Pay towards a bill
#[utoipa::path(
    post,
    path = "/api/billing/bills/{id}/record_payment",
    tag = "billing",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Bill ID")),
    request_body = RecordPaymentRequest,
    responses(
        (status = 201, description = "Payment recorded", body = PaymentResponse),
        (status = 400, description = "Bill already paid or amount exceeds balance"),
        (status = 403, description = "Not the resident of this flat"),
        (status = 404, description = "Not found")
    )
)]
pub async fn record_payment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<RecordPaymentRequest>,
) -> AppResult<(StatusCode, Json<PaymentResponse>)> {
    authorize(&auth_user, Module::Bill, Action::RecordPayment)?;
    payload.validate()?;

    let payment = billing_service::record_payment(
        &state.pool,
        &auth_user,
        id,
        NewPayment {
            amount: Some(payload.amount),
            method: payload.payment_method,
            transaction_id: payload.transaction_id.unwrap_or_default(),
            notes: payload.notes.unwrap_or_default(),
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(payment_payload(&state, payment.id).await?)))
}

/// Settle the outstanding balance with a cash payment
#[utoipa::path(
    post,
    path = "/api/billing/bills/{id}/mark_paid",
    tag = "billing",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Bill ID")),
    request_body = MarkPaidRequest,
    responses(
        (status = 200, description = "Bill paid in full", body = BillResponse),
        (status = 400, description = "Bill already paid"),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Not found")
    )
)]
pub async fn mark_paid(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    payload: Option<ApiJson<MarkPaidRequest>>,
) -> AppResult<Json<BillResponse>> {
    authorize(&auth_user, Module::Bill, Action::MarkPaid)?;
    let notes = payload
        .and_then(|ApiJson(p)| p.notes)
        .unwrap_or_else(|| "Marked as paid by admin".to_string());

    billing_service::record_payment(
        &state.pool,
        &auth_user,
        id,
        NewPayment {
            amount: None,
            method: PaymentMethod::Cash,
            transaction_id: String::new(),
            notes,
        },
    )
    .await?;

    Ok(Json(bill_payload(&state, &auth_user, id).await?))
}

#[derive(Debug, FromRow)]
struct StatsRow {
    total_bills: i64,
    unpaid: i64,
    partial: i64,
    paid: i64,
    overdue: i64,
    total_amount: Decimal,
    total_paid: Decimal,
}

/// Bill counts per status and money totals
#[utoipa::path(
    get,
    path = "/api/billing/bills/stats",
    tag = "billing",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Statistics", body = BillStatsResponse))
)]
pub async fn bill_stats(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<BillStatsResponse>> {
    authorize(&auth_user, Module::Bill, Action::Stats)?;
    billing_service::refresh_overdue(&state.pool).await?;

    let (all, society) = auth_user.scope().bind_values();
    let row = sqlx::query_as::<_, StatsRow>(
        r#"
        SELECT COUNT(*) AS total_bills,
               COUNT(*) FILTER (WHERE b.status = 'UNPAID') AS unpaid,
               COUNT(*) FILTER (WHERE b.status = 'PARTIAL') AS partial,
               COUNT(*) FILTER (WHERE b.status = 'PAID') AS paid,
               COUNT(*) FILTER (WHERE b.status = 'OVERDUE') AS overdue,
               COALESCE(SUM(b.total_amount), 0) AS total_amount,
               COALESCE(SUM(b.paid_amount), 0) AS total_paid
        FROM bills b
        JOIN flats f ON f.id = b.flat_id
        WHERE ($1::bool OR b.society_id = $2)
          AND ($3::uuid IS NULL OR f.current_resident_id = $3)
        "#,
    )
    .bind(all)
    .bind(society)
    .bind(resident_filter(&auth_user))
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(BillStatsResponse {
        total_bills: row.total_bills,
        unpaid: row.unpaid,
        partial: row.partial,
        paid: row.paid,
        overdue: row.overdue,
        total_amount: row.total_amount,
        total_paid: row.total_paid,
        total_pending: row.total_amount - row.total_paid,
    }))
}

// ---------------------------------------------------------------------------
// Payments
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PaymentFilters {
    pub payment_method: Option<PaymentMethod>,
    pub payment_status: Option<PaymentStatus>,
    pub bill: Option<Uuid>,
}

/// Residents only see payments they made.
fn payer_filter(auth_user: &AuthUser) -> Option<Uuid> {
    (auth_user.role == UserRole::Resident).then_some(auth_user.user_id)
}

async fn payment_payload(state: &AppState, id: Uuid) -> AppResult<PaymentResponse> {
    sqlx::query_as::<_, PaymentRow>(&format!("{} WHERE p.id = $1", PAYMENT_SELECT))
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .map(PaymentResponse::from)
        .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))
}

/// List payments
#[utoipa::path(
    get,
    path = "/api/billing/payments",
    tag = "billing",
    security(("bearer_auth" = [])),
    params(PageParams, PaymentFilters),
    responses((status = 200, description = "Payments, newest first", body = PaymentPage))
)]
pub async fn list_payments(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(page): Query<PageParams>,
    Query(filters): Query<PaymentFilters>,
) -> AppResult<Json<Paginated<PaymentResponse>>> {
    authorize(&auth_user, Module::Payment, Action::List)?;

    let page = page.resolve(&state.config);
    let (all, society) = auth_user.scope().bind_values();

    let filter = r#"
        JOIN bills b ON b.id = p.bill_id
        WHERE ($1::bool OR b.society_id = $2)
          AND ($3::uuid IS NULL OR p.paid_by = $3)
          AND ($4::payment_method IS NULL OR p.payment_method = $4)
          AND ($5::payment_status IS NULL OR p.payment_status = $5)
          AND ($6::uuid IS NULL OR p.bill_id = $6)
    "#;

    let (count,): (i64,) =
        sqlx::query_as(&format!("SELECT COUNT(*) FROM payments p {}", filter))
            .bind(all)
            .bind(society)
            .bind(payer_filter(&auth_user))
            .bind(filters.payment_method)
            .bind(filters.payment_status)
            .bind(filters.bill)
            .fetch_one(&state.pool)
            .await?;

    let rows = sqlx::query_as::<_, PaymentRow>(&format!(
        "{} {} ORDER BY p.created_at DESC LIMIT $7 OFFSET $8",
        PAYMENT_SELECT, filter
    ))
    .bind(all)
    .bind(society)
    .bind(payer_filter(&auth_user))
    .bind(filters.payment_method)
    .bind(filters.payment_status)
    .bind(filters.bill)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&state.pool)
    .await?;

    let results = rows.into_iter().map(PaymentResponse::from).collect();
    Ok(Json(Paginated::new(results, count, page)))
}

/// Get a payment
#[utoipa::path(
    get,
    path = "/api/billing/payments/{id}",
    tag = "billing",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Payment ID")),
    responses(
        (status = 200, description = "Payment", body = PaymentResponse),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_payment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PaymentResponse>> {
    authorize(&auth_user, Module::Payment, Action::Retrieve)?;

    let (all, society) = auth_user.scope().bind_values();
    let row = sqlx::query_as::<_, PaymentRow>(&format!(
        r#"{} JOIN bills b ON b.id = p.bill_id
           WHERE p.id = $1 AND ($2::bool OR b.society_id = $3)
             AND ($4::uuid IS NULL OR p.paid_by = $4)"#,
        PAYMENT_SELECT
    ))
    .bind(id)
    .bind(all)
    .bind(society)
    .bind(payer_filter(&auth_user))
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))?;

    Ok(Json(row.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: UserRole) -> AuthUser {
        AuthUser {
            user_id: Uuid::new_v4(),
            role,
            society_id: Some(Uuid::new_v4()),
        }
    }

    #[test]
    fn test_resident_filters() {
        let resident = user(UserRole::Resident);
        assert_eq!(resident_filter(&resident), Some(resident.user_id));
        assert_eq!(payer_filter(&resident), Some(resident.user_id));

        for role in [UserRole::Admin, UserRole::Committee, UserRole::Security] {
            assert_eq!(resident_filter(&user(role)), None);
            assert_eq!(payer_filter(&user(role)), None);
        }
    }

    #[test]
    fn test_negative_charges_rejected() {
        let ok = [("water_charge", Decimal::new(1050, 2)), ("late_fee", Decimal::ZERO)];
        assert!(check_charges(&ok).is_ok());

        let bad = [("water_charge", Decimal::ONE), ("late_fee", Decimal::new(-1, 0))];
        match check_charges(&bad) {
            Err(AppError::Validation(fields)) => assert!(fields.contains_key("late_fee")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}
