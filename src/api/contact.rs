use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::{AppState, AuthUser};
use crate::models::{ContactRequest, ContactResponse, ContactSubmission};
use crate::permissions::{authorize, Action, Module};
use crate::utils::{validators::sanitize_string, ApiJson, PageParams, Paginated};
use crate::utils::pagination::ContactPage;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/submit", post(submit))
        .route("/submissions", get(list_submissions))
        .route("/submissions/:id/read", post(mark_read))
}

/// Send a message from the public contact form
#[utoipa::path(
    post,
    path = "/api/contact/submit",
    tag = "contact",
    request_body = ContactRequest,
    responses(
        (status = 201, description = "Message received", body = ContactResponse),
        (status = 400, description = "Validation error")
    )
)]
pub async fn submit(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<ContactRequest>,
) -> AppResult<(StatusCode, Json<ContactResponse>)> {
    payload.validate()?;
    for (field, value) in [
        ("name", &payload.name),
        ("subject", &payload.subject),
        ("message", &payload.message),
    ] {
        if value.trim().is_empty() {
            return Err(AppError::field(field, "This field is required"));
        }
    }

    let submission = sqlx::query_as::<_, ContactSubmission>(
        r#"
        INSERT INTO contact_submissions (name, email, subject, message)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(sanitize_string(&payload.name))
    .bind(payload.email.trim().to_lowercase())
    .bind(sanitize_string(&payload.subject))
    .bind(payload.message.trim())
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(submission_id = %submission.id, "contact form submitted");
    Ok((
        StatusCode::CREATED,
        Json(ContactResponse {
            success: true,
            message: "Thank you for contacting us. We will get back to you soon.".to_string(),
            data: submission,
        }),
    ))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SubmissionFilters {
    pub is_read: Option<bool>,
}

/// Contact form inbox
#[utoipa::path(
    get,
    path = "/api/contact/submissions",
    tag = "contact",
    security(("bearer_auth" = [])),
    params(PageParams, SubmissionFilters),
    responses(
        (status = 200, description = "Submissions, newest first", body = ContactPage),
        (status = 403, description = "Admins only")
    )
)]
pub async fn list_submissions(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(page): Query<PageParams>,
    Query(filters): Query<SubmissionFilters>,
) -> AppResult<Json<Paginated<ContactSubmission>>> {
    authorize(&auth_user, Module::Contact, Action::List)?;
    let page = page.resolve(&state.config);

    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM contact_submissions WHERE ($1::bool IS NULL OR is_read = $1)",
    )
    .bind(filters.is_read)
    .fetch_one(&state.pool)
    .await?;

    let submissions = sqlx::query_as::<_, ContactSubmission>(
        r#"
        SELECT * FROM contact_submissions
        WHERE ($1::bool IS NULL OR is_read = $1)
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(filters.is_read)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(Paginated::new(submissions, count, page)))
}

/// Mark a submission as read
#[utoipa::path(
    post,
    path = "/api/contact/submissions/{id}/read",
    tag = "contact",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Submission ID")),
    responses(
        (status = 200, description = "Marked read", body = ContactSubmission),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Not found")
    )
)]
pub async fn mark_read(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ContactSubmission>> {
    authorize(&auth_user, Module::Contact, Action::MarkRead)?;

    let submission = sqlx::query_as::<_, ContactSubmission>(
        "UPDATE contact_submissions SET is_read = TRUE WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Submission not found".to_string()))?;

    Ok(Json(submission))
}
