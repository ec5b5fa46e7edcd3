use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::{AppState, AuthUser};
use crate::models::{
    AdminUpdateUserRequest, ChangePasswordRequest, LoginRequest, LoginResponse,
    RefreshTokenRequest, RegisterRequest, TokenResponse, UpdateProfileRequest, User,
    UserResponse, UserRole,
};
use crate::permissions::{authorize, Action, Module};
use crate::services::{auth_service::TokenType, AuthService};
use crate::utils::{
    search_pattern,
    validators::{check_phone, sanitize_string, username_from_flat_number},
    ApiJson, PageParams, Paginated,
};
use crate::utils::pagination::UserPage;

#[derive(serde::Serialize, utoipa::ToSchema)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: &str) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.to_string(),
        })
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/refresh", post(refresh_token))
        .route("/logout", post(logout))
        .route("/register", post(register))
        .route(
            "/profile",
            get(get_profile).put(update_profile).patch(update_profile),
        )
        .route("/change-password", post(change_password))
        .route("/users", get(list_users))
        .route("/users/:id", put(update_user).patch(update_user))
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

async fn ensure_society_exists(state: &AppState, society_id: Option<Uuid>) -> AppResult<()> {
    let Some(society_id) = society_id else {
        return Ok(());
    };
    let (exists,): (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM societies WHERE id = $1)")
        .bind(society_id)
        .fetch_one(&state.pool)
        .await?;
    if exists {
        Ok(())
    } else {
        Err(AppError::field("society", "Invalid society"))
    }
}

async fn ensure_email_free(state: &AppState, email: Option<&str>, except: Option<Uuid>) -> AppResult<()> {
    let Some(email) = email else {
        return Ok(());
    };
    let (taken,): (bool,) = sqlx::query_as(
        "SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(email) = LOWER($1) AND ($2::uuid IS NULL OR id <> $2))",
    )
    .bind(email)
    .bind(except)
    .fetch_one(&state.pool)
    .await?;

    if taken {
        return Err(AppError::field("email", "A user with this email already exists"));
    }
    Ok(())
}

/// Login with username and password
#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Access and refresh tokens", body = LoginResponse),
        (status = 400, description = "Missing fields"),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    payload.validate()?;

    let user = AuthService::get_user_by_username(&state.pool, payload.username.trim())
        .await?
        .filter(|u| u.is_active)
        .ok_or(AppError::Unauthorized)?;

    if !AuthService::verify_password(&payload.password, &user.password_hash) {
        tracing::debug!(username = %user.username, "login rejected");
        return Err(AppError::Unauthorized);
    }

    AuthService::update_last_login(&state.pool, user.id).await?;
    let tokens = AuthService::new(state.config.clone())
        .issue_tokens(&state.pool, &user)
        .await?;

    tracing::info!(user_id = %user.id, "user logged in");
    Ok(Json(LoginResponse {
        access: tokens.access,
        refresh: tokens.refresh,
        user: user.into(),
    }))
}

/// Exchange a refresh token for a new token pair
#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    tag = "auth",
    request_body = RefreshTokenRequest,
    responses(
        (status = 200, description = "Rotated tokens", body = TokenResponse),
        (status = 401, description = "Refresh token invalid, expired or already used")
    )
)]
pub async fn refresh_token(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RefreshTokenRequest>,
) -> AppResult<Json<TokenResponse>> {
    let auth_service = AuthService::new(state.config.clone());
    let claims = auth_service.verify_token(&payload.refresh)?;

    if claims.token_type != TokenType::Refresh {
        return Err(AppError::Unauthorized);
    }

    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AppError::Unauthorized)?;

    // rotation: a refresh token works once
    let token_hash = AuthService::hash_token(&payload.refresh);
    if !AuthService::delete_refresh_token(&state.pool, &token_hash).await? {
        return Err(AppError::Unauthorized);
    }

    let user = AuthService::get_user_by_id(&state.pool, user_id)
        .await
        .map_err(|_| AppError::Unauthorized)?;
    if !user.is_active {
        return Err(AppError::Unauthorized);
    }

    let tokens = auth_service.issue_tokens(&state.pool, &user).await?;
    Ok(Json(tokens))
}

/// Revoke a refresh token
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "auth",
    security(("bearer_auth" = [])),
    request_body = RefreshTokenRequest,
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn logout(
    State(state): State<AppState>,
    auth_user: AuthUser,
    ApiJson(payload): ApiJson<RefreshTokenRequest>,
) -> AppResult<Json<MessageResponse>> {
    let token_hash = AuthService::hash_token(&payload.refresh);
    sqlx::query("DELETE FROM refresh_tokens WHERE token_hash = $1 AND user_id = $2")
        .bind(&token_hash)
        .bind(auth_user.user_id)
        .execute(&state.pool)
        .await?;

    Ok(MessageResponse::ok("Logged out"))
}

/// Self-service resident registration
#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Resident account created", body = UserResponse),
        (status = 400, description = "Validation error")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(mut payload): ApiJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    payload.email = blank_to_none(payload.email.take());
    payload.validate()?;

    if payload.password != payload.password_confirm {
        return Err(AppError::field("password_confirm", "Passwords do not match"));
    }

    let username = username_from_flat_number(&payload.flat_number);
    if username.is_empty() {
        return Err(AppError::field("flat_number", "Please enter a valid flat number"));
    }
    check_phone("phone", payload.phone.as_deref())?;
    check_phone("emergency_contact", payload.emergency_contact.as_deref())?;

    if AuthService::get_user_by_username(&state.pool, &username)
        .await?
        .is_some()
    {
        return Err(AppError::field("flat_number", "This flat number is already registered"));
    }
    ensure_email_free(&state, payload.email.as_deref(), None).await?;

    ensure_society_exists(&state, payload.society).await?;

    let password_hash = AuthService::hash_password(&payload.password)?;
    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (username, password_hash, email, first_name, last_name, role,
                           society_id, phone, emergency_contact)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(&username)
    .bind(&password_hash)
    .bind(&payload.email)
    .bind(sanitize_string(&payload.first_name))
    .bind(sanitize_string(payload.last_name.as_deref().unwrap_or("")))
    .bind(UserRole::Resident)
    .bind(payload.society)
    .bind(payload.phone.as_deref().unwrap_or(""))
    .bind(payload.emergency_contact.as_deref().unwrap_or(""))
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(user_id = %user.id, %username, "resident registered");
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// Current user profile
#[utoipa::path(
    get,
    path = "/api/auth/profile",
    tag = "auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Profile", body = UserResponse),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn get_profile(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<UserResponse>> {
    authorize(&auth_user, Module::User, Action::Profile)?;
    let user = AuthService::get_user_by_id(&state.pool, auth_user.user_id).await?;
    Ok(Json(user.into()))
}

/// Update own profile; role, username and society are read-only
#[utoipa::path(
    put,
    path = "/api/auth/profile",
    tag = "auth",
    security(("bearer_auth" = [])),
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated profile", body = UserResponse),
        (status = 400, description = "Validation error")
    )
)]
pub async fn update_profile(
    State(state): State<AppState>,
    auth_user: AuthUser,
    ApiJson(mut payload): ApiJson<UpdateProfileRequest>,
) -> AppResult<Json<UserResponse>> {
    authorize(&auth_user, Module::User, Action::Profile)?;
    payload.email = blank_to_none(payload.email.take());
    payload.validate()?;
    check_phone("phone", payload.phone.as_deref())?;
    check_phone("emergency_contact", payload.emergency_contact.as_deref())?;
    ensure_email_free(&state, payload.email.as_deref(), Some(auth_user.user_id)).await?;

    let user = sqlx::query_as::<_, User>(
        r#"
        UPDATE users SET
            email = COALESCE($2, email),
            first_name = COALESCE($3, first_name),
            last_name = COALESCE($4, last_name),
            phone = COALESCE($5, phone),
            emergency_contact = COALESCE($6, emergency_contact),
            address = COALESCE($7, address),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(auth_user.user_id)
    .bind(&payload.email)
    .bind(payload.first_name.as_deref().map(sanitize_string))
    .bind(payload.last_name.as_deref().map(sanitize_string))
    .bind(&payload.phone)
    .bind(&payload.emergency_contact)
    .bind(&payload.address)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(user.into()))
}

/// Change own password
#[utoipa::path(
    post,
    path = "/api/auth/change-password",
    tag = "auth",
    security(("bearer_auth" = [])),
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Wrong old password or mismatched confirmation")
    )
)]
pub async fn change_password(
    State(state): State<AppState>,
    auth_user: AuthUser,
    ApiJson(payload): ApiJson<ChangePasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    authorize(&auth_user, Module::User, Action::ChangePassword)?;
    payload.validate()?;

    if payload.new_password != payload.new_password_confirm {
        return Err(AppError::field("new_password_confirm", "Passwords do not match"));
    }

    let user = AuthService::get_user_by_id(&state.pool, auth_user.user_id).await?;
    if !AuthService::verify_password(&payload.old_password, &user.password_hash) {
        return Err(AppError::field("old_password", "Wrong password"));
    }

    let password_hash = AuthService::hash_password(&payload.new_password)?;
    sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
        .bind(user.id)
        .bind(&password_hash)
        .execute(&state.pool)
        .await?;

    // other sessions have to log in again
    sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
        .bind(user.id)
        .execute(&state.pool)
        .await?;

    tracing::info!(user_id = %user.id, "password changed");
    Ok(MessageResponse::ok("Password changed successfully"))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserFilters {
    pub role: Option<UserRole>,
    pub search: Option<String>,
}

/// Users of the admin's society, or every user for a society-less admin
#[utoipa::path(
    get,
    path = "/api/auth/users",
    tag = "auth",
    security(("bearer_auth" = [])),
    params(PageParams, UserFilters),
    responses(
        (status = 200, description = "Users", body = UserPage),
        (status = 403, description = "Admins only")
    )
)]
pub async fn list_users(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(page): Query<PageParams>,
    Query(filters): Query<UserFilters>,
) -> AppResult<Json<Paginated<UserResponse>>> {
    authorize(&auth_user, Module::User, Action::List)?;

    let page = page.resolve(&state.config);
    let (all, society) = auth_user.scope().bind_values();
    let search = search_pattern(filters.search.as_deref());

    let filter = r#"
        FROM users
        WHERE ($1::bool OR society_id = $2)
          AND ($3::user_role IS NULL OR role = $3)
          AND ($4::text IS NULL OR username ILIKE $4 OR first_name ILIKE $4
               OR last_name ILIKE $4 OR email ILIKE $4)
    "#;

    let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) {}", filter))
        .bind(all)
        .bind(society)
        .bind(filters.role)
        .bind(&search)
        .fetch_one(&state.pool)
        .await?;

    let users = sqlx::query_as::<_, User>(&format!(
        "SELECT * {} ORDER BY username LIMIT $5 OFFSET $6",
        filter
    ))
    .bind(all)
    .bind(society)
    .bind(filters.role)
    .bind(&search)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&state.pool)
    .await?;

    let results = users.into_iter().map(UserResponse::from).collect();
    Ok(Json(Paginated::new(results, count, page)))
}

/// Admin edit of another user's society and contact details; role is immutable here
#[utoipa::path(
    put,
    path = "/api/auth/users/{id}",
    tag = "auth",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = AdminUpdateUserRequest,
    responses(
        (status = 200, description = "Updated user", body = UserResponse),
        (status = 403, description = "Admins only"),
        (status = 404, description = "User not found in the caller's society")
    )
)]
pub async fn update_user(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    ApiJson(mut payload): ApiJson<AdminUpdateUserRequest>,
) -> AppResult<Json<UserResponse>> {
    authorize(&auth_user, Module::User, Action::Update)?;
    payload.email = blank_to_none(payload.email.take());
    payload.validate()?;
    check_phone("phone", payload.phone.as_deref())?;
    check_phone("emergency_contact", payload.emergency_contact.as_deref())?;

    // users outside the caller's society look the same as missing ones
    let (all, society) = auth_user.scope().bind_values();
    sqlx::query_as::<_, (Uuid,)>(
        "SELECT id FROM users WHERE id = $1 AND ($2::bool OR society_id = $3)",
    )
    .bind(id)
    .bind(all)
    .bind(society)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    if let Some(own_society) = auth_user.society_id {
        if payload.society.is_some_and(|s| s != own_society) {
            return Err(AppError::field("society", "You can only assign users to your own society"));
        }
    }
    ensure_society_exists(&state, payload.society).await?;
    ensure_email_free(&state, payload.email.as_deref(), Some(id)).await?;

    let user = sqlx::query_as::<_, User>(
        r#"
        UPDATE users SET
            email = COALESCE($2, email),
            first_name = COALESCE($3, first_name),
            last_name = COALESCE($4, last_name),
            society_id = COALESCE($5, society_id),
            phone = COALESCE($6, phone),
            emergency_contact = COALESCE($7, emergency_contact),
            address = COALESCE($8, address),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(&payload.email)
    .bind(payload.first_name.as_deref().map(sanitize_string))
    .bind(payload.last_name.as_deref().map(sanitize_string))
    .bind(payload.society)
    .bind(&payload.phone)
    .bind(&payload.emergency_contact)
    .bind(&payload.address)
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(admin_id = %auth_user.user_id, user_id = %id, "user updated by admin");
    Ok(Json(user.into()))
}
