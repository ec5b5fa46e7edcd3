use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use sqlx::FromRow;
use utoipa::IntoParams;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::{AppState, AuthUser};
use crate::models::{
    AddComplaintUpdateRequest, AssignComplaintRequest, Complaint, ComplaintCategory,
    ComplaintDetailResponse, ComplaintListRow, ComplaintResponse, ComplaintStatsResponse,
    ComplaintStatus, ComplaintUpdateResponse, CreateComplaintRequest, Priority,
    RejectComplaintRequest, ResolveComplaintRequest, UpdateComplaintRequest, UserRole,
    UserSummary,
};
use crate::permissions::{authorize, can_modify_complaint, require_society, Action, Module};
use crate::services::file_service::{read_upload, UploadKind};
use crate::services::FileService;
use crate::utils::{order_by, search_pattern, ApiJson, PageParams, Paginated};
use crate::utils::pagination::ComplaintPage;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_complaints).post(create_complaint))
        .route("/stats", get(complaint_stats))
        .route(
            "/:id",
            get(get_complaint)
                .put(update_complaint)
                .patch(update_complaint)
                .delete(delete_complaint),
        )
        .route("/:id/add_update", post(add_update))
        .route("/:id/assign", post(assign))
        .route("/:id/resolve", post(resolve))
        .route("/:id/close", post(close))
        .route("/:id/reject", post(reject))
        .route("/:id/photo", post(upload_photo))
}

const COMPLAINT_SELECT: &str = r#"
    SELECT c.*,
           NULLIF(TRIM(cb.first_name || ' ' || cb.last_name), '') AS created_by_name,
           NULLIF(TRIM(asg.first_name || ' ' || asg.last_name), '') AS assigned_to_name,
           f.flat_number,
           (SELECT COUNT(*) FROM complaint_updates cu WHERE cu.complaint_id = c.id) AS updates_count
    FROM complaints c
    JOIN users cb ON cb.id = c.created_by
    LEFT JOIN users asg ON asg.id = c.assigned_to
    LEFT JOIN flats f ON f.id = c.flat_id
"#;

/// Residents only see complaints they filed.
fn creator_filter(auth_user: &AuthUser) -> Option<Uuid> {
    (auth_user.role == UserRole::Resident).then_some(auth_user.user_id)
}

async fn fetch_complaint(state: &AppState, auth_user: &AuthUser, id: Uuid) -> AppResult<ComplaintListRow> {
    let (all, society) = auth_user.scope().bind_values();
    sqlx::query_as::<_, ComplaintListRow>(&format!(
        r#"{} WHERE c.id = $1 AND ($2::bool OR c.society_id = $3)
              AND ($4::uuid IS NULL OR c.created_by = $4)"#,
        COMPLAINT_SELECT
    ))
    .bind(id)
    .bind(all)
    .bind(society)
    .bind(creator_filter(auth_user))
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Complaint not found".to_string()))
}

/// Loads a complaint the caller may change.
async fn fetch_for_change(state: &AppState, auth_user: &AuthUser, id: Uuid) -> AppResult<Complaint> {
    let row = fetch_complaint(state, auth_user, id).await?;
    if !can_modify_complaint(auth_user, row.complaint.created_by) {
        return Err(AppError::Forbidden);
    }
    Ok(row.complaint)
}

fn check_transition(current: ComplaintStatus, next: ComplaintStatus) -> AppResult<()> {
    if current.can_transition_to(next) {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!(
            "Cannot move complaint from {:?} to {:?}",
            current, next
        )))
    }
}

/// Zero rows means another request moved the complaint after it was read.
fn ensure_still(rows_affected: u64, expected: ComplaintStatus) -> AppResult<()> {
    if rows_affected == 0 {
        Err(AppError::BadRequest(format!(
            "Complaint is no longer {:?}",
            expected
        )))
    } else {
        Ok(())
    }
}

async fn append_update(
    conn: impl sqlx::PgExecutor<'_>,
    complaint_id: Uuid,
    user_id: Uuid,
    message: &str,
) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO complaint_updates (complaint_id, message, updated_by) VALUES ($1, $2, $3)",
    )
    .bind(complaint_id)
    .bind(message)
    .bind(user_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Flat a complaint may point at: one in the caller's society.
async fn check_flat(state: &AppState, society_id: Uuid, flat: Option<Uuid>) -> AppResult<()> {
    let Some(flat) = flat else {
        return Ok(());
    };
    let (exists,): (bool,) =
        sqlx::query_as("SELECT EXISTS(SELECT 1 FROM flats WHERE id = $1 AND society_id = $2)")
            .bind(flat)
            .bind(society_id)
            .fetch_one(&state.pool)
            .await?;
    if exists {
        Ok(())
    } else {
        Err(AppError::field("flat", "Invalid flat"))
    }
}

async fn complaint_payload(state: &AppState, auth_user: &AuthUser, id: Uuid) -> AppResult<ComplaintResponse> {
    Ok(fetch_complaint(state, auth_user, id).await?.into())
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ComplaintFilters {
    pub category: Option<ComplaintCategory>,
    pub priority: Option<Priority>,
    pub status: Option<ComplaintStatus>,
    pub flat: Option<Uuid>,
    /// Matches title or description
    pub search: Option<String>,
    /// `created_at`, `priority`, `status`, prefixed with `-` for descending
    pub ordering: Option<String>,
}

/// List complaints
#[utoipa::path(
    get,
    path = "/api/complaints",
    tag = "complaints",
    security(("bearer_auth" = [])),
    params(PageParams, ComplaintFilters),
    responses((status = 200, description = "Complaints", body = ComplaintPage))
)]
pub async fn list_complaints(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(page): Query<PageParams>,
    Query(filters): Query<ComplaintFilters>,
) -> AppResult<Json<Paginated<ComplaintResponse>>> {
    authorize(&auth_user, Module::Complaint, Action::List)?;

    let page = page.resolve(&state.config);
    let (all, society) = auth_user.scope().bind_values();
    let search = search_pattern(filters.search.as_deref());
    let order = order_by(
        filters.ordering.as_deref(),
        &[
            ("created_at", "c.created_at"),
            ("priority", "c.priority"),
            ("status", "c.status"),
        ],
        "c.created_at DESC",
    );

    let filter = r#"
        WHERE ($1::bool OR c.society_id = $2)
          AND ($3::uuid IS NULL OR c.created_by = $3)
          AND ($4::complaint_category IS NULL OR c.category = $4)
          AND ($5::priority_level IS NULL OR c.priority = $5)
          AND ($6::complaint_status IS NULL OR c.status = $6)
          AND ($7::uuid IS NULL OR c.flat_id = $7)
          AND ($8::text IS NULL OR c.title ILIKE $8 OR c.description ILIKE $8)
    "#;

    let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM complaints c {}", filter))
        .bind(all)
        .bind(society)
        .bind(creator_filter(&auth_user))
        .bind(filters.category)
        .bind(filters.priority)
        .bind(filters.status)
        .bind(filters.flat)
        .bind(&search)
        .fetch_one(&state.pool)
        .await?;

    let rows = sqlx::query_as::<_, ComplaintListRow>(&format!(
        "{} {} ORDER BY {} LIMIT $9 OFFSET $10",
        COMPLAINT_SELECT, filter, order
    ))
    .bind(all)
    .bind(society)
    .bind(creator_filter(&auth_user))
    .bind(filters.category)
    .bind(filters.priority)
    .bind(filters.status)
    .bind(filters.flat)
    .bind(&search)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&state.pool)
    .await?;

    let results = rows.into_iter().map(ComplaintResponse::from).collect();
    Ok(Json(Paginated::new(results, count, page)))
}

/// Get a complaint with its update trail
#[utoipa::path(
    get,
    path = "/api/complaints/{id}",
    tag = "complaints",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Complaint ID")),
    responses(
        (status = 200, description = "Complaint", body = ComplaintDetailResponse),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_complaint(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ComplaintDetailResponse>> {
    authorize(&auth_user, Module::Complaint, Action::Retrieve)?;

    let row = fetch_complaint(&state, &auth_user, id).await?;
    let people = [Some(row.complaint.created_by), row.complaint.assigned_to];
    let mut summaries = Vec::with_capacity(2);
    for person in people {
        let summary = match person {
            Some(user_id) => {
                sqlx::query_as::<_, UserSummary>(
                    "SELECT id, first_name, last_name, email, phone FROM users WHERE id = $1",
                )
                .bind(user_id)
                .fetch_optional(&state.pool)
                .await?
            }
            None => None,
        };
        summaries.push(summary);
    }
    let assigned_to_detail = summaries.pop().flatten();
    let created_by_detail = summaries.pop().flatten();

    let updates = sqlx::query_as::<_, ComplaintUpdateResponse>(
        r#"
        SELECT cu.id, cu.complaint_id AS complaint, cu.message, cu.updated_by,
               NULLIF(TRIM(u.first_name || ' ' || u.last_name), '') AS updated_by_name,
               cu.created_at
        FROM complaint_updates cu
        JOIN users u ON u.id = cu.updated_by
        WHERE cu.complaint_id = $1
        ORDER BY cu.created_at
        "#,
    )
    .bind(id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(ComplaintDetailResponse {
        complaint: row.into(),
        created_by_detail,
        assigned_to_detail,
        updates,
    }))
}

/// File a complaint in the caller's society
#[utoipa::path(
    post,
    path = "/api/complaints",
    tag = "complaints",
    security(("bearer_auth" = [])),
    request_body = CreateComplaintRequest,
    responses(
        (status = 201, description = "Created", body = ComplaintResponse),
        (status = 400, description = "Validation error or no society")
    )
)]
pub async fn create_complaint(
    State(state): State<AppState>,
    auth_user: AuthUser,
    ApiJson(payload): ApiJson<CreateComplaintRequest>,
) -> AppResult<(StatusCode, Json<ComplaintResponse>)> {
    authorize(&auth_user, Module::Complaint, Action::Create)?;
    payload.validate()?;
    let society_id = require_society(&auth_user)?;
    check_flat(&state, society_id, payload.flat).await?;

    let complaint = sqlx::query_as::<_, Complaint>(
        r#"
        INSERT INTO complaints (society_id, flat_id, title, description, category, priority, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(society_id)
    .bind(payload.flat)
    .bind(payload.title.trim())
    .bind(&payload.description)
    .bind(payload.category)
    .bind(payload.priority.unwrap_or_default())
    .bind(auth_user.user_id)
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(complaint_id = %complaint.id, category = ?complaint.category, "complaint filed");
    Ok((
        StatusCode::CREATED,
        Json(complaint_payload(&state, &auth_user, complaint.id).await?),
    ))
}

/// Edit a complaint. Residents may edit their own, but only staff move the status.
#[utoipa::path(
    put,
    path = "/api/complaints/{id}",
    tag = "complaints",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Complaint ID")),
    request_body = UpdateComplaintRequest,
    responses(
        (status = 200, description = "Updated", body = ComplaintResponse),
        (status = 400, description = "Invalid status transition"),
        (status = 403, description = "Not yours"),
        (status = 404, description = "Not found")
    )
)]
pub async fn update_complaint(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<UpdateComplaintRequest>,
) -> AppResult<Json<ComplaintResponse>> {
    authorize(&auth_user, Module::Complaint, Action::Update)?;
    payload.validate()?;

    let current = fetch_for_change(&state, &auth_user, id).await?;
    if let Some(next) = payload.status {
        if !auth_user.is_staff() {
            return Err(AppError::Forbidden);
        }
        if next != current.status {
            check_transition(current.status, next)?;
        }
    }
    check_flat(&state, current.society_id, payload.flat).await?;

    let result = sqlx::query(
        r#"
        UPDATE complaints SET
            flat_id = COALESCE($2, flat_id),
            title = COALESCE($3, title),
            description = COALESCE($4, description),
            category = COALESCE($5, category),
            priority = COALESCE($6, priority),
            status = COALESCE($7, status),
            resolved_at = CASE WHEN $7 = 'RESOLVED' AND resolved_at IS NULL THEN NOW() ELSE resolved_at END,
            updated_at = NOW()
        WHERE id = $1 AND ($7::complaint_status IS NULL OR status = $8)
        "#,
    )
    .bind(id)
    .bind(payload.flat)
    .bind(payload.title.as_deref().map(str::trim))
    .bind(&payload.description)
    .bind(payload.category)
    .bind(payload.priority)
    .bind(payload.status)
    .bind(current.status)
    .execute(&state.pool)
    .await?;
    ensure_still(result.rows_affected(), current.status)?;

    Ok(Json(complaint_payload(&state, &auth_user, id).await?))
}

/// Delete a complaint
#[utoipa::path(
    delete,
    path = "/api/complaints/{id}",
    tag = "complaints",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Complaint ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not yours"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_complaint(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    authorize(&auth_user, Module::Complaint, Action::Destroy)?;
    fetch_for_change(&state, &auth_user, id).await?;

    sqlx::query("DELETE FROM complaints WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Add a message to the complaint's update trail
#[utoipa::path(
    post,
    path = "/api/complaints/{id}/add_update",
    tag = "complaints",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Complaint ID")),
    request_body = AddComplaintUpdateRequest,
    responses(
        (status = 201, description = "Update added", body = ComplaintUpdateResponse),
        (status = 400, description = "Message is required"),
        (status = 403, description = "Not yours")
    )
)]
pub async fn add_update(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<AddComplaintUpdateRequest>,
) -> AppResult<(StatusCode, Json<ComplaintUpdateResponse>)> {
    authorize(&auth_user, Module::Complaint, Action::AddUpdate)?;
    if payload.message.trim().is_empty() {
        return Err(AppError::field("message", "This field is required"));
    }
    payload.validate()?;
    fetch_for_change(&state, &auth_user, id).await?;

    let update = sqlx::query_as::<_, ComplaintUpdateResponse>(
        r#"
        WITH inserted AS (
            INSERT INTO complaint_updates (complaint_id, message, updated_by)
            VALUES ($1, $2, $3)
            RETURNING *
        )
        SELECT i.id, i.complaint_id AS complaint, i.message, i.updated_by,
               NULLIF(TRIM(u.first_name || ' ' || u.last_name), '') AS updated_by_name,
               i.created_at
        FROM inserted i
        JOIN users u ON u.id = i.updated_by
        "#,
    )
    .bind(id)
    .bind(payload.message.trim())
    .bind(auth_user.user_id)
    .fetch_one(&state.pool)
    .await?;

    Ok((StatusCode::CREATED, Json(update)))
}

#[derive(FromRow)]
struct Assignee {
    first_name: String,
    last_name: String,
}

/// Assign a complaint (to the caller when no assignee is given); moves it to IN_PROGRESS
#[utoipa::path(
    post,
    path = "/api/complaints/{id}/assign",
    tag = "complaints",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Complaint ID")),
    request_body = AssignComplaintRequest,
    responses(
        (status = 200, description = "Assigned", body = ComplaintResponse),
        (status = 400, description = "Invalid assignee or status"),
        (status = 403, description = "Admins and committee only")
    )
)]
pub async fn assign(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<AssignComplaintRequest>,
) -> AppResult<Json<ComplaintResponse>> {
    authorize(&auth_user, Module::Complaint, Action::Assign)?;

    let current = fetch_complaint(&state, &auth_user, id).await?.complaint;
    check_transition(current.status, ComplaintStatus::InProgress)?;

    let assignee_id = payload.assigned_to.unwrap_or(auth_user.user_id);
    let assignee = sqlx::query_as::<_, Assignee>(
        "SELECT first_name, last_name FROM users WHERE id = $1 AND is_active",
    )
    .bind(assignee_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::field("assigned_to", "Invalid user"))?;

    let mut tx = state.pool.begin().await?;
    let result = sqlx::query(
        r#"
        UPDATE complaints SET assigned_to = $2, status = 'IN_PROGRESS', updated_at = NOW()
        WHERE id = $1 AND status = $3
        "#,
    )
    .bind(id)
    .bind(assignee_id)
    .bind(current.status)
    .execute(&mut *tx)
    .await?;
    ensure_still(result.rows_affected(), current.status)?;

    let message = format!(
        "Complaint assigned to {}",
        crate::models::full_name(&assignee.first_name, &assignee.last_name)
    );
    append_update(&mut *tx, id, auth_user.user_id, &message).await?;
    tx.commit().await?;

    tracing::info!(complaint_id = %id, assigned_to = %assignee_id, "complaint assigned");
    Ok(Json(complaint_payload(&state, &auth_user, id).await?))
}

/// Mark a complaint resolved
#[utoipa::path(
    post,
    path = "/api/complaints/{id}/resolve",
    tag = "complaints",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Complaint ID")),
    request_body = ResolveComplaintRequest,
    responses(
        (status = 200, description = "Resolved", body = ComplaintResponse),
        (status = 400, description = "Invalid status transition"),
        (status = 403, description = "Admins and committee only")
    )
)]
pub async fn resolve(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    payload: Option<ApiJson<ResolveComplaintRequest>>,
) -> AppResult<Json<ComplaintResponse>> {
    authorize(&auth_user, Module::Complaint, Action::Resolve)?;
    let notes = payload
        .and_then(|ApiJson(p)| p.resolution_notes)
        .unwrap_or_default();

    let current = fetch_complaint(&state, &auth_user, id).await?.complaint;
    check_transition(current.status, ComplaintStatus::Resolved)?;

    let mut tx = state.pool.begin().await?;
    let result = sqlx::query(
        r#"
        UPDATE complaints
        SET status = 'RESOLVED', resolution_notes = $2, resolved_at = NOW(), updated_at = NOW()
        WHERE id = $1 AND status = $3
        "#,
    )
    .bind(id)
    .bind(&notes)
    .bind(current.status)
    .execute(&mut *tx)
    .await?;
    ensure_still(result.rows_affected(), current.status)?;

    let message = if notes.trim().is_empty() {
        "Complaint resolved".to_string()
    } else {
        format!("Complaint resolved: {}", notes.trim())
    };
    append_update(&mut *tx, id, auth_user.user_id, &message).await?;
    tx.commit().await?;

    tracing::info!(complaint_id = %id, "complaint resolved");
    Ok(Json(complaint_payload(&state, &auth_user, id).await?))
}

/// Close a resolved complaint
#[utoipa::path(
    post,
    path = "/api/complaints/{id}/close",
    tag = "complaints",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Complaint ID")),
    responses(
        (status = 200, description = "Closed", body = ComplaintResponse),
        (status = 400, description = "Complaint is not resolved"),
        (status = 403, description = "Admins and committee only")
    )
)]
pub async fn close(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ComplaintResponse>> {
    authorize(&auth_user, Module::Complaint, Action::Close)?;

    let current = fetch_complaint(&state, &auth_user, id).await?.complaint;
    check_transition(current.status, ComplaintStatus::Closed)?;

    let mut tx = state.pool.begin().await?;
    let result = sqlx::query(
        "UPDATE complaints SET status = 'CLOSED', updated_at = NOW() WHERE id = $1 AND status = $2",
    )
    .bind(id)
    .bind(current.status)
    .execute(&mut *tx)
    .await?;
    ensure_still(result.rows_affected(), current.status)?;
    append_update(&mut *tx, id, auth_user.user_id, "Complaint closed").await?;
    tx.commit().await?;

    Ok(Json(complaint_payload(&state, &auth_user, id).await?))
}

/// Reject an open or in-progress complaint
#[utoipa::path(
    post,
    path = "/api/complaints/{id}/reject",
    tag = "complaints",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Complaint ID")),
    request_body = RejectComplaintRequest,
    responses(
        (status = 200, description = "Rejected", body = ComplaintResponse),
        (status = 400, description = "Invalid status transition"),
        (status = 403, description = "Admins and committee only")
    )
)]
pub async fn reject(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    payload: Option<ApiJson<RejectComplaintRequest>>,
) -> AppResult<Json<ComplaintResponse>> {
    authorize(&auth_user, Module::Complaint, Action::Reject)?;
    let reason = payload.and_then(|ApiJson(p)| p.reason).unwrap_or_default();

    let current = fetch_complaint(&state, &auth_user, id).await?.complaint;
    check_transition(current.status, ComplaintStatus::Rejected)?;

    let mut tx = state.pool.begin().await?;
    let result = sqlx::query(
        r#"
        UPDATE complaints SET status = 'REJECTED', resolution_notes = $2, updated_at = NOW()
        WHERE id = $1 AND status = $3
        "#,
    )
    .bind(id)
    .bind(&reason)
    .bind(current.status)
    .execute(&mut *tx)
    .await?;
    ensure_still(result.rows_affected(), current.status)?;

    let message = if reason.trim().is_empty() {
        "Complaint rejected".to_string()
    } else {
        format!("Complaint rejected: {}", reason.trim())
    };
    append_update(&mut *tx, id, auth_user.user_id, &message).await?;
    tx.commit().await?;

    tracing::info!(complaint_id = %id, "complaint rejected");
    Ok(Json(complaint_payload(&state, &auth_user, id).await?))
}

/// Attach a photo; a complaint holds at most three
#[utoipa::path(
    post,
    path = "/api/complaints/{id}/photo",
    tag = "complaints",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Complaint ID")),
    request_body(content = String, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Photo attached", body = ComplaintResponse),
        (status = 400, description = "Bad file or all photo slots used"),
        (status = 403, description = "Not yours")
    )
)]
pub async fn upload_photo(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> AppResult<Json<ComplaintResponse>> {
    authorize(&auth_user, Module::Complaint, Action::Upload)?;

    let current = fetch_for_change(&state, &auth_user, id).await?;
    let slot = free_photo_slot(&current)
        .ok_or_else(|| AppError::BadRequest("A complaint can have at most 3 photos".to_string()))?;

    let file = read_upload(&mut multipart, "photo", UploadKind::Image).await?;
    let file_service = FileService::new(&state.config).await?;
    let url = file_service.upload_file("complaints", file).await?;

    sqlx::query(&format!(
        "UPDATE complaints SET {} = $2, updated_at = NOW() WHERE id = $1",
        slot
    ))
    .bind(id)
    .bind(&url)
    .execute(&state.pool)
    .await?;

    Ok(Json(complaint_payload(&state, &auth_user, id).await?))
}

fn free_photo_slot(complaint: &Complaint) -> Option<&'static str> {
    [
        ("photo1", &complaint.photo1),
        ("photo2", &complaint.photo2),
        ("photo3", &complaint.photo3),
    ]
    .into_iter()
    .find(|(_, url)| url.is_none())
    .map(|(column, _)| column)
}

#[derive(Debug, FromRow)]
struct StatsRow {
    total: i64,
    open: i64,
    in_progress: i64,
    resolved: i64,
    closed: i64,
    rejected: i64,
}

/// Complaint counts per status
#[utoipa::path(
    get,
    path = "/api/complaints/stats",
    tag = "complaints",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Statistics", body = ComplaintStatsResponse))
)]
pub async fn complaint_stats(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<ComplaintStatsResponse>> {
    authorize(&auth_user, Module::Complaint, Action::Stats)?;

    let (all, society) = auth_user.scope().bind_values();
    let row = sqlx::query_as::<_, StatsRow>(
        r#"
        SELECT COUNT(*) AS total,
               COUNT(*) FILTER (WHERE status = 'OPEN') AS open,
               COUNT(*) FILTER (WHERE status = 'IN_PROGRESS') AS in_progress,
               COUNT(*) FILTER (WHERE status = 'RESOLVED') AS resolved,
               COUNT(*) FILTER (WHERE status = 'CLOSED') AS closed,
               COUNT(*) FILTER (WHERE status = 'REJECTED') AS rejected
        FROM complaints
        WHERE ($1::bool OR society_id = $2)
          AND ($3::uuid IS NULL OR created_by = $3)
        "#,
    )
    .bind(all)
    .bind(society)
    .bind(creator_filter(&auth_user))
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(ComplaintStatsResponse {
        total: row.total,
        open: row.open,
        in_progress: row.in_progress,
        resolved: row.resolved,
        closed: row.closed,
        rejected: row.rejected,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn complaint(photos: [Option<&str>; 3]) -> Complaint {
        Complaint {
            id: Uuid::new_v4(),
            society_id: Uuid::new_v4(),
            flat_id: None,
            title: "Leaking tap".into(),
            description: "Kitchen tap leaks".into(),
            category: ComplaintCategory::Plumbing,
            priority: Priority::Medium,
            status: ComplaintStatus::Open,
            photo1: photos[0].map(String::from),
            photo2: photos[1].map(String::from),
            photo3: photos[2].map(String::from),
            created_by: Uuid::new_v4(),
            assigned_to: None,
            resolution_notes: String::new(),
            resolved_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_free_photo_slot() {
        assert_eq!(free_photo_slot(&complaint([None, None, None])), Some("photo1"));
        assert_eq!(free_photo_slot(&complaint([Some("a"), None, Some("c")])), Some("photo2"));
        assert_eq!(free_photo_slot(&complaint([Some("a"), Some("b"), Some("c")])), None);
    }

    #[test]
    fn test_transitions() {
        use ComplaintStatus::*;
        assert!(check_transition(Open, InProgress).is_ok());
        assert!(check_transition(InProgress, Resolved).is_ok());
        assert!(check_transition(Resolved, Closed).is_ok());
        assert!(check_transition(Open, Rejected).is_ok());
        assert!(matches!(check_transition(Closed, Open), Err(AppError::BadRequest(_))));
        assert!(matches!(check_transition(Open, Closed), Err(AppError::BadRequest(_))));
        assert!(matches!(check_transition(Rejected, InProgress), Err(AppError::BadRequest(_))));
        assert!(matches!(check_transition(Resolved, Rejected), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_only_residents_are_filtered() {
        let resident = AuthUser {
            user_id: Uuid::new_v4(),
            role: UserRole::Resident,
            society_id: None,
        };
        assert_eq!(creator_filter(&resident), Some(resident.user_id));
        let committee = AuthUser { role: UserRole::Committee, ..resident.clone() };
        assert_eq!(creator_filter(&committee), None);
    }

    #[test]
    fn test_lost_transition_race_is_bad_request() {
        assert!(ensure_still(1, ComplaintStatus::Open).is_ok());
        assert!(matches!(
            ensure_still(0, ComplaintStatus::Resolved),
            Err(AppError::BadRequest(msg)) if msg == "Complaint is no longer Resolved"
        ));
    }
}
