//! Postgres backed checks. `#[sqlx::test]` creates a throwaway database per
//! test from `DATABASE_URL` and applies the migrations to it.

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use sqlx::PgPool;
use tower::ServiceExt;
use uuid::Uuid;

use society_backend::{
    models::{BillStatus, User, UserRole},
    services::{billing_service, AuthService},
    AppState, Config,
};

const SECRET: &str = "db-test-secret";

async fn society(pool: &PgPool, name: &str) -> Uuid {
    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO societies (name, address, city, state, pincode)
        VALUES ($1, '1 Lake Road', 'Pune', 'MH', '411001')
        RETURNING id
        "#,
    )
    .bind(name)
    .fetch_one(pool)
    .await
    .unwrap();
    id
}

async fn user(pool: &PgPool, username: &str, role: UserRole, society: Option<Uuid>) -> User {
    sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (username, password_hash, first_name, role, society_id)
        VALUES ($1, 'unused', $1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(username)
    .bind(role)
    .bind(society)
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn flat(pool: &PgPool, society: Uuid, number: &str, resident: Option<Uuid>) -> Uuid {
    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO flats (society_id, flat_number, floor, current_resident_id)
        VALUES ($1, $2, 1, $3)
        RETURNING id
        "#,
    )
    .bind(society)
    .bind(number)
    .bind(resident)
    .fetch_one(pool)
    .await
    .unwrap();
    id
}

/// A bill of `total` maintenance, due `due_in_days` from today.
#[allow(clippy::too_many_arguments)]
async fn bill(
    pool: &PgPool,
    society: Uuid,
    flat: Uuid,
    month: u32,
    total: i64,
    paid: i64,
    status: BillStatus,
    due_in_days: i32,
) -> Uuid {
    let (id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO bills (society_id, flat_id, billing_month, due_date,
                           maintenance_charge, total_amount, paid_amount, status)
        VALUES ($1, $2, $3, CURRENT_DATE + $4, $5, $5, $6, $7)
        RETURNING id
        "#,
    )
    .bind(society)
    .bind(flat)
    .bind(NaiveDate::from_ymd_opt(2024, month, 1).unwrap())
    .bind(due_in_days)
    .bind(Decimal::new(total, 0))
    .bind(Decimal::new(paid, 0))
    .bind(status)
    .fetch_one(pool)
    .await
    .unwrap();
    id
}

async fn stored_bill(pool: &PgPool, id: Uuid) -> (Decimal, BillStatus) {
    sqlx::query_as("SELECT paid_amount, status FROM bills WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
        .unwrap()
}

fn token(user: &User) -> String {
    AuthService::new(Config::for_tests(SECRET))
        .generate_access_token(user)
        .unwrap()
}

async fn send(
    pool: &PgPool,
    method: Method,
    uri: &str,
    caller: &User,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let app = society_backend::app(AppState {
        pool: pool.clone(),
        config: Config::for_tests(SECRET),
    });
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token(caller)));
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[sqlx::test(migrations = "./migrations")]
async fn test_other_society_records_are_not_found(pool: PgPool) {
    let green = society(&pool, "Green Acres").await;
    let blue = society(&pool, "Blue Ridge").await;
    let resident = user(&pool, "a101", UserRole::Resident, Some(green)).await;
    let green_committee = user(&pool, "green_committee", UserRole::Committee, Some(green)).await;
    let blue_committee = user(&pool, "blue_committee", UserRole::Committee, Some(blue)).await;

    let flat_id = flat(&pool, green, "A-101", Some(resident.id)).await;
    let bill_id = bill(&pool, green, flat_id, 1, 1000, 0, BillStatus::Unpaid, 10).await;
    let (complaint_id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO complaints (society_id, flat_id, title, description, category, created_by)
        VALUES ($1, $2, 'Lift stuck', 'Lift stuck on floor 3', 'ELECTRICAL', $3)
        RETURNING id
        "#,
    )
    .bind(green)
    .bind(flat_id)
    .bind(resident.id)
    .fetch_one(&pool)
    .await
    .unwrap();

    let uris = [
        format!("/api/billing/bills/{}", bill_id),
        format!("/api/society/flats/{}", flat_id),
        format!("/api/complaints/{}", complaint_id),
    ];
    for uri in &uris {
        let (status, body) = send(&pool, Method::GET, uri, &blue_committee, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{}", uri);
        assert_eq!(body["error"]["code"], "NOT_FOUND");

        let (status, _) = send(&pool, Method::GET, uri, &green_committee, None).await;
        assert_eq!(status, StatusCode::OK, "{}", uri);
    }
}

#[sqlx::test(migrations = "./migrations")]
async fn test_residents_only_see_their_own_bills(pool: PgPool) {
    let green = society(&pool, "Green Acres").await;
    let asha = user(&pool, "a101", UserRole::Resident, Some(green)).await;
    let ravi = user(&pool, "a102", UserRole::Resident, Some(green)).await;
    let asha_flat = flat(&pool, green, "A-101", Some(asha.id)).await;
    let ravi_flat = flat(&pool, green, "A-102", Some(ravi.id)).await;
    let asha_bill = bill(&pool, green, asha_flat, 1, 1000, 0, BillStatus::Unpaid, 10).await;
    let ravi_bill = bill(&pool, green, ravi_flat, 1, 1200, 0, BillStatus::Unpaid, 10).await;

    let (status, body) = send(&pool, Method::GET, "/api/billing/bills", &asha, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["results"][0]["id"], asha_bill.to_string());

    let (status, body) = send(&pool, Method::GET, "/api/billing/bills/my_bills", &asha, None).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<_> = body.as_array().unwrap().iter().map(|b| b["id"].clone()).collect();
    assert_eq!(ids, [json!(asha_bill.to_string())]);

    let uri = format!("/api/billing/bills/{}", ravi_bill);
    let (status, _) = send(&pool, Method::GET, &uri, &asha, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_payments_move_bill_to_partial_then_paid(pool: PgPool) {
    let green = society(&pool, "Green Acres").await;
    let asha = user(&pool, "a101", UserRole::Resident, Some(green)).await;
    let flat_id = flat(&pool, green, "A-101", Some(asha.id)).await;
    let bill_id = bill(&pool, green, flat_id, 1, 1000, 0, BillStatus::Unpaid, 10).await;
    let uri = format!("/api/billing/bills/{}/record_payment", bill_id);

    let (status, body) = send(
        &pool,
        Method::POST,
        &uri,
        &asha,
        Some(json!({"amount": "400.00", "payment_method": "UPI"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert!(body["receipt_number"].as_str().unwrap().starts_with("RCP"));
    assert_eq!(stored_bill(&pool, bill_id).await, (Decimal::new(400, 0), BillStatus::Partial));

    // more than the remaining 600
    let (status, body) = send(
        &pool,
        Method::POST,
        &uri,
        &asha,
        Some(json!({"amount": "700.00", "payment_method": "UPI"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["fields"]["amount"].is_array());

    let (status, _) = send(
        &pool,
        Method::POST,
        &uri,
        &asha,
        Some(json!({"amount": "600.00", "payment_method": "CASH"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(stored_bill(&pool, bill_id).await, (Decimal::new(1000, 0), BillStatus::Paid));

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM payments WHERE bill_id = $1")
        .bind(bill_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 2);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_bill_edit_rederives_status_from_paid_amount(pool: PgPool) {
    let green = society(&pool, "Green Acres").await;
    let committee = user(&pool, "committee", UserRole::Committee, Some(green)).await;
    let flat_id = flat(&pool, green, "A-101", None).await;
    let bill_id = bill(&pool, green, flat_id, 1, 1000, 400, BillStatus::Partial, 10).await;

    let (status, body) = send(
        &pool,
        Method::PUT,
        &format!("/api/billing/bills/{}", bill_id),
        &committee,
        Some(json!({"maintenance_charge": "400.00"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["status"], "PAID");
    assert_eq!(stored_bill(&pool, bill_id).await, (Decimal::new(400, 0), BillStatus::Paid));
}

#[sqlx::test(migrations = "./migrations")]
async fn test_refresh_overdue_flips_only_unpaid_past_due(pool: PgPool) {
    let green = society(&pool, "Green Acres").await;
    let flat_id = flat(&pool, green, "A-101", None).await;
    let late = bill(&pool, green, flat_id, 1, 1000, 0, BillStatus::Unpaid, -5).await;
    let late_partial = bill(&pool, green, flat_id, 2, 1000, 300, BillStatus::Partial, -5).await;
    let upcoming = bill(&pool, green, flat_id, 3, 1000, 0, BillStatus::Unpaid, 5).await;

    assert_eq!(billing_service::refresh_overdue(&pool).await.unwrap(), 1);

    assert_eq!(stored_bill(&pool, late).await.1, BillStatus::Overdue);
    assert_eq!(stored_bill(&pool, late_partial).await.1, BillStatus::Partial);
    assert_eq!(stored_bill(&pool, upcoming).await.1, BillStatus::Unpaid);

    // already flipped
    assert_eq!(billing_service::refresh_overdue(&pool).await.unwrap(), 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_admin_user_edit_is_scoped_to_own_society(pool: PgPool) {
    let green = society(&pool, "Green Acres").await;
    let blue = society(&pool, "Blue Ridge").await;
    let green_admin = user(&pool, "green_admin", UserRole::Admin, Some(green)).await;
    let root = user(&pool, "root", UserRole::Admin, None).await;
    let blue_resident = user(&pool, "b101", UserRole::Resident, Some(blue)).await;
    let uri = format!("/api/auth/users/{}", blue_resident.id);

    let (status, _) = send(
        &pool,
        Method::PUT,
        &uri,
        &green_admin,
        Some(json!({"first_name": "Changed"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &pool,
        Method::PUT,
        &uri,
        &root,
        Some(json!({"society": Uuid::new_v4()})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["fields"]["society"].is_array());

    let (status, body) = send(
        &pool,
        Method::PUT,
        &uri,
        &root,
        Some(json!({"society": green})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["society"], green.to_string());
}

#[sqlx::test(migrations = "./migrations")]
async fn test_generated_flats_get_a_default_bill(pool: PgPool) {
    let green = society(&pool, "Green Acres").await;
    let admin = user(&pool, "admin", UserRole::Admin, Some(green)).await;

    let (status, body) = send(
        &pool,
        Method::POST,
        "/api/society/blocks/create_with_flats",
        &admin,
        Some(json!({"society": green, "name": "A", "floors": 2, "units_per_floor": 2})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);

    let notes: Vec<(String,)> = sqlx::query_as(
        "SELECT b.notes FROM bills b JOIN flats f ON f.id = b.flat_id WHERE f.society_id = $1",
    )
    .bind(green)
    .fetch_all(&pool)
    .await
    .unwrap();
    assert_eq!(notes.len(), 4);
    assert!(notes
        .iter()
        .all(|(n,)| n == billing_service::DEFAULT_BILL_NOTES));
}
