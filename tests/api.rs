//! Router level checks that are answered before any query runs, so the pool
//! is connected lazily and never actually opened.

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;
use uuid::Uuid;

use society_backend::{
    models::{User, UserRole},
    services::AuthService,
    AppState, Config,
};

const SECRET: &str = "integration-secret";

fn test_app() -> Router {
    let config = Config::for_tests(SECRET);
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect_lazy(&config.database_url)
        .unwrap();
    society_backend::app(AppState { pool, config })
}

fn user(role: UserRole) -> User {
    User {
        id: Uuid::new_v4(),
        username: "tester".into(),
        password_hash: String::new(),
        email: None,
        first_name: "Test".into(),
        last_name: "User".into(),
        role,
        society_id: Some(Uuid::new_v4()),
        phone: String::new(),
        emergency_contact: String::new(),
        address: String::new(),
        is_active: true,
        date_joined: Utc::now(),
        last_login_at: None,
        updated_at: Utc::now(),
    }
}

fn token(role: UserRole) -> String {
    AuthService::new(Config::for_tests(SECRET))
        .generate_access_token(&user(role))
        .unwrap()
}

fn request(method: Method, uri: &str, bearer: Option<&str>, body: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(req: Request<Body>) -> (StatusCode, Value) {
    let response = test_app().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_health() {
    let (status, body) = send(request(Method::GET, "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_openapi_document_lists_routes() {
    let (status, body) = send(request(Method::GET, "/api-docs/openapi.json", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    let paths = body["paths"].as_object().unwrap();
    assert!(paths.contains_key("/api/billing/bills/{id}/record_payment"));
    assert!(paths.contains_key("/api/society/flats/dashboard"));
    assert!(paths.contains_key("/api/alerts/active"));
    assert!(body["components"]["securitySchemes"]["bearer_auth"].is_object());
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    for uri in ["/api/society/flats", "/api/billing/bills", "/api/auth/profile"] {
        let (status, body) = send(request(Method::GET, uri, None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", uri);
        assert_eq!(body["success"], false);
    }
}

#[tokio::test]
async fn test_refresh_token_cannot_authenticate() {
    let refresh = AuthService::new(Config::for_tests(SECRET))
        .generate_refresh_token(&user(UserRole::Admin))
        .unwrap();
    let (status, _) = send(request(Method::GET, "/api/visitors", Some(&refresh), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_foreign_signature_is_rejected() {
    let forged = AuthService::new(Config::for_tests("someone-else"))
        .generate_access_token(&user(UserRole::Admin))
        .unwrap();
    let (status, _) = send(request(Method::GET, "/api/events", Some(&forged), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_resident_cannot_post_notice() {
    let (status, body) = send(request(
        Method::POST,
        "/api/notices",
        Some(&token(UserRole::Resident)),
        Some(r#"{"title": "Water tank cleaning", "content": "Sunday 9am"}"#),
    ))
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_role_gates() {
    let id = Uuid::new_v4();
    let cases = [
        (UserRole::Resident, Method::DELETE, format!("/api/billing/bills/{}", id)),
        (UserRole::Committee, Method::POST, format!("/api/billing/bills/{}/mark_paid", id)),
        (UserRole::Security, Method::GET, "/api/society/flats/directory".to_string()),
        (UserRole::Committee, Method::GET, "/api/contact/submissions".to_string()),
        (UserRole::Resident, Method::POST, format!("/api/visitors/{}/approve", id)),
        (UserRole::Committee, Method::POST, format!("/api/visitors/{}/check_in", id)),
        (UserRole::Security, Method::POST, format!("/api/complaints/{}/resolve", id)),
        (UserRole::Resident, Method::POST, format!("/api/society/blocks/{}/regenerate_flats", id)),
        (UserRole::Security, Method::DELETE, format!("/api/alerts/{}", id)),
    ];

    for (role, method, uri) in cases {
        let (status, _) = send(request(method.clone(), &uri, Some(&token(role)), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{:?} {} {}", role, method, uri);
    }
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let (status, body) = send(request(
        Method::POST,
        "/api/auth/login",
        None,
        Some(r#"{"username": "a101", "password": "#),
    ))
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_validation_errors_name_fields() {
    let (status, body) = send(request(
        Method::POST,
        "/api/contact/submit",
        None,
        Some(r#"{"name": "Asha", "email": "not-an-email", "subject": "Hi", "message": "Hello"}"#),
    ))
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert!(body["error"]["fields"]["email"].is_array());

    let (status, body) = send(request(
        Method::POST,
        "/api/notices",
        Some(&token(UserRole::Admin)),
        Some(&json!({"title": "", "content": "body"}).to_string()),
    ))
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["fields"]["title"].is_array());
}

#[tokio::test]
async fn test_upcoming_window_is_bounded() {
    let (status, body) = send(request(
        Method::GET,
        "/api/events/upcoming?days=-1",
        Some(&token(UserRole::Resident)),
        None,
    ))
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["fields"]["days"].is_array());
}

#[tokio::test]
async fn test_block_layout_is_checked_before_insert() {
    let mut root = user(UserRole::Admin);
    root.society_id = None;
    let admin = AuthService::new(Config::for_tests(SECRET))
        .generate_access_token(&root)
        .unwrap();
    let society = Uuid::new_v4();
    let cases = [
        (json!({"society": society, "name": "Sunrise Tower East", "floors": 1, "units_per_floor": 1}), "name"),
        (json!({"society": society, "name": "A", "floors": 5000, "units_per_floor": 4}), "floors"),
        (json!({"society": society, "name": "A", "floors": 11, "units_per_floor": 101}), "units_per_floor"),
    ];

    for (payload, field) in cases {
        let (status, body) = send(request(
            Method::POST,
            "/api/society/blocks/create_with_flats",
            Some(&admin),
            Some(&payload.to_string()),
        ))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", payload);
        assert!(body["error"]["fields"][field].is_array(), "{}", body);
    }
}
