use axum::{
    extract::{Multipart, Path, Query, State},
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
use crate::models::{
    CreateNoticeRequest, Notice, NoticeCategory, NoticeResponse, NoticeRow, Priority,
    UpdateNoticeRequest,
};
use crate::permissions::{authorize, require_society, Action, Module};
use crate::services::file_service::{read_upload, UploadKind};
use crate::services::FileService;
use crate::utils::{order_by, search_pattern, ApiJson, PageParams, Paginated};
use crate::utils::pagination::NoticePage;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_notices).post(create_notice))
        .route(
            "/:id",
            get(get_notice)
                .put(update_notice)
                .patch(update_notice)
                .delete(delete_notice),
        )
        .route("/:id/attachment", post(upload_attachment))
}

const NOTICE_SELECT: &str = r#"
    SELECT n.*, NULLIF(TRIM(u.first_name || ' ' || u.last_name), '') AS created_by_name
    FROM notices n
    LEFT JOIN users u ON u.id = n.created_by
"#;

/// Inactive notices are hidden from everyone but staff.
async fn fetch_notice(state: &AppState, auth_user: &AuthUser, id: Uuid) -> AppResult<NoticeRow> {
    let (all, society) = auth_user.scope().bind_values();
    sqlx::query_as::<_, NoticeRow>(&format!(
        "{} WHERE n.id = $1 AND ($2::bool OR n.society_id = $3) AND ($4 OR n.is_active)",
        NOTICE_SELECT
    ))
    .bind(id)
    .bind(all)
    .bind(society)
    .bind(auth_user.is_staff())
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Notice not found".to_string()))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NoticeFilters {
    pub category: Option<NoticeCategory>,
    pub priority: Option<Priority>,
    /// Matches title or content
    pub search: Option<String>,
    /// `created_at`, `priority`, prefixed with `-` for descending
    pub ordering: Option<String>,
}

/// List active notices
#[utoipa::path(
    get,
    path = "/api/notices",
    tag = "notices",
    security(("bearer_auth" = [])),
    params(PageParams, NoticeFilters),
    responses((status = 200, description = "Notices", body = NoticePage))
)]
pub async fn list_notices(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(page): Query<PageParams>,
    Query(filters): Query<NoticeFilters>,
) -> AppResult<Json<Paginated<NoticeResponse>>> {
    authorize(&auth_user, Module::Notice, Action::List)?;

    let page = page.resolve(&state.config);
    let (all, society) = auth_user.scope().bind_values();
    let search = search_pattern(filters.search.as_deref());
    let order = order_by(
        filters.ordering.as_deref(),
        &[("created_at", "n.created_at"), ("priority", "n.priority")],
        "n.created_at DESC",
    );

    let filter = r#"
        WHERE n.is_active
          AND ($1::bool OR n.society_id = $2)
          AND ($3::notice_category IS NULL OR n.category = $3)
          AND ($4::priority_level IS NULL OR n.priority = $4)
          AND ($5::text IS NULL OR n.title ILIKE $5 OR n.content ILIKE $5)
    "#;

    let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM notices n {}", filter))
        .bind(all)
        .bind(society)
        .bind(filters.category)
        .bind(filters.priority)
        .bind(&search)
        .fetch_one(&state.pool)
        .await?;

    let rows = sqlx::query_as::<_, NoticeRow>(&format!(
        "{} {} ORDER BY {} LIMIT $6 OFFSET $7",
        NOTICE_SELECT, filter, order
    ))
    .bind(all)
    .bind(society)
    .bind(filters.category)
    .bind(filters.priority)
    .bind(&search)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&state.pool)
    .await?;

    let results = rows.into_iter().map(NoticeResponse::from).collect();
    Ok(Json(Paginated::new(results, count, page)))
}

/// Get a notice
#[utoipa::path(
    get,
    path = "/api/notices/{id}",
    tag = "notices",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Notice ID")),
    responses(
        (status = 200, description = "Notice", body = NoticeResponse),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_notice(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<NoticeResponse>> {
    authorize(&auth_user, Module::Notice, Action::Retrieve)?;
    Ok(Json(fetch_notice(&state, &auth_user, id).await?.into()))
}

/// Post a notice to the caller's society
#[utoipa::path(
    post,
    path = "/api/notices",
    tag = "notices",
    security(("bearer_auth" = [])),
    request_body = CreateNoticeRequest,
    responses(
        (status = 201, description = "Created", body = NoticeResponse),
        (status = 400, description = "Validation error or no society"),
        (status = 403, description = "Admins and committee only")
    )
)]
pub async fn create_notice(
    State(state): State<AppState>,
    auth_user: AuthUser,
    ApiJson(payload): ApiJson<CreateNoticeRequest>,
) -> AppResult<(StatusCode, Json<NoticeResponse>)> {
    authorize(&auth_user, Module::Notice, Action::Create)?;
    payload.validate()?;
    let society_id = require_society(&auth_user)?;

    let notice = sqlx::query_as::<_, Notice>(
        r#"
        INSERT INTO notices (society_id, title, content, category, priority, created_by, is_active)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(society_id)
    .bind(payload.title.trim())
    .bind(&payload.content)
    .bind(payload.category.unwrap_or_default())
    .bind(payload.priority.unwrap_or_default())
    .bind(auth_user.user_id)
    .bind(payload.is_active.unwrap_or(true))
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(notice_id = %notice.id, category = ?notice.category, "notice posted");
    Ok((
        StatusCode::CREATED,
        Json(fetch_notice(&state, &auth_user, notice.id).await?.into()),
    ))
}

/// Edit or deactivate a notice
#[utoipa::path(
    put,
    path = "/api/notices/{id}",
    tag = "notices",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Notice ID")),
    request_body = UpdateNoticeRequest,
    responses(
        (status = 200, description = "Updated", body = NoticeResponse),
        (status = 403, description = "Admins and committee only"),
        (status = 404, description = "Not found")
    )
)]
pub async fn update_notice(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<UpdateNoticeRequest>,
) -> AppResult<Json<NoticeResponse>> {
    authorize(&auth_user, Module::Notice, Action::Update)?;
    payload.validate()?;
    fetch_notice(&state, &auth_user, id).await?;

    sqlx::query(
        r#"
        UPDATE notices SET
            title = COALESCE($2, title),
            content = COALESCE($3, content),
            category = COALESCE($4, category),
            priority = COALESCE($5, priority),
            is_active = COALESCE($6, is_active),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(payload.title.as_deref().map(str::trim))
    .bind(&payload.content)
    .bind(payload.category)
    .bind(payload.priority)
    .bind(payload.is_active)
    .execute(&state.pool)
    .await?;

    Ok(Json(fetch_notice(&state, &auth_user, id).await?.into()))
}

/// Delete a notice
#[utoipa::path(
    delete,
    path = "/api/notices/{id}",
    tag = "notices",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Notice ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_notice(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    authorize(&auth_user, Module::Notice, Action::Destroy)?;
    let notice = fetch_notice(&state, &auth_user, id).await?.notice;

    sqlx::query("DELETE FROM notices WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;

    if let Some(url) = notice.attachment_url {
        FileService::new(&state.config).await?.delete_by_url(&url).await;
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Attach a document or image to a notice
#[utoipa::path(
    post,
    path = "/api/notices/{id}/attachment",
    tag = "notices",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Notice ID")),
    request_body(content = String, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Attachment stored", body = NoticeResponse),
        (status = 400, description = "Bad file"),
        (status = 403, description = "Admins and committee only")
    )
)]
pub async fn upload_attachment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> AppResult<Json<NoticeResponse>> {
    authorize(&auth_user, Module::Notice, Action::Upload)?;
    let current = fetch_notice(&state, &auth_user, id).await?.notice;

    let file = read_upload(&mut multipart, "attachment", UploadKind::Document).await?;
    let file_service = FileService::new(&state.config).await?;
    let url = file_service.upload_file("notices", file).await?;

    sqlx::query("UPDATE notices SET attachment_url = $2, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .bind(&url)
        .execute(&state.pool)
        .await?;

    if let Some(previous) = current.attachment_url {
        file_service.delete_by_url(&previous).await;
    }

    Ok(Json(fetch_notice(&state, &auth_user, id).await?.into()))
}
