use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::{AppState, AuthUser};
use crate::models::{
    CheckInRequest, CheckOutRequest, CreateVisitorRequest, UpdateVisitorRequest, Visitor,
    VisitorPurpose, VisitorResponse, VisitorRow, VisitorStatus,
};
use crate::permissions::{authorize, Action, Module};
use crate::services::file_service::{read_upload, UploadKind};
use crate::services::FileService;
use crate::utils::{
    order_by, search_pattern,
    validators::{check_phone, sanitize_string},
    ApiJson, PageParams, Paginated,
};
use crate::utils::pagination::VisitorPage;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_visitors).post(create_visitor))
        .route("/active", get(active_visitors))
        .route("/pending", get(pending_visitors))
        .route(
            "/:id",
            get(get_visitor)
                .put(update_visitor)
                .patch(update_visitor)
                .delete(delete_visitor),
        )
        .route("/:id/approve", post(approve))
        .route("/:id/reject", post(reject))
        .route("/:id/check_in", post(check_in))
        .route("/:id/check_out", post(check_out))
        .route("/:id/photo", post(upload_photo))
}

const VISITOR_SELECT: &str = r#"
    SELECT v.*, f.flat_number
    FROM visitors v
    JOIN flats f ON f.id = v.flat_id
"#;

async fn fetch_visitor(state: &AppState, auth_user: &AuthUser, id: Uuid) -> AppResult<VisitorRow> {
    let (all, society) = auth_user.scope().bind_values();
    sqlx::query_as::<_, VisitorRow>(&format!(
        "{} WHERE v.id = $1 AND ($2::bool OR v.society_id = $3)",
        VISITOR_SELECT
    ))
    .bind(id)
    .bind(all)
    .bind(society)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Visitor not found".to_string()))
}

fn check_transition(current: VisitorStatus, next: VisitorStatus) -> AppResult<()> {
    if current.can_transition_to(next) {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!(
            "Cannot move visitor from {:?} to {:?}",
            current, next
        )))
    }
}

/// Moves a visitor along the gate workflow and records who did it.
async fn transition(
    state: &AppState,
    auth_user: &AuthUser,
    id: Uuid,
    next: VisitorStatus,
    at: Option<DateTime<Utc>>,
) -> AppResult<VisitorResponse> {
    let current = fetch_visitor(state, auth_user, id).await?.visitor;
    check_transition(current.status, next)?;

    let at = at.unwrap_or_else(Utc::now);
    // $3 guards against a concurrent move away from the status checked above.
    let sql = match next {
        VisitorStatus::Approved => {
            "UPDATE visitors SET status = $2, approved_by = $4, updated_at = NOW() WHERE id = $1 AND status = $3"
        }
        VisitorStatus::InPremises => {
            "UPDATE visitors SET status = $2, checked_in_by = $4, entry_time = $5, updated_at = NOW() WHERE id = $1 AND status = $3"
        }
        VisitorStatus::Exited => {
            "UPDATE visitors SET status = $2, checked_out_by = $4, exit_time = $5, updated_at = NOW() WHERE id = $1 AND status = $3"
        }
        _ => "UPDATE visitors SET status = $2, updated_at = NOW() WHERE id = $1 AND status = $3",
    };

    let mut query = sqlx::query(sql).bind(id).bind(next).bind(current.status);
    if next != VisitorStatus::Rejected {
        query = query.bind(auth_user.user_id);
    }
    if matches!(next, VisitorStatus::InPremises | VisitorStatus::Exited) {
        query = query.bind(at);
    }
    let result = query.execute(&state.pool).await?;
    if result.rows_affected() == 0 {
        return Err(AppError::BadRequest(format!(
            "Visitor is no longer {:?}",
            current.status
        )));
    }

    tracing::info!(visitor_id = %id, from = ?current.status, to = ?next, "visitor status changed");
    Ok(fetch_visitor(state, auth_user, id).await?.into())
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct VisitorFilters {
    pub status: Option<VisitorStatus>,
    pub purpose: Option<VisitorPurpose>,
    pub flat: Option<Uuid>,
    pub pre_approved: Option<bool>,
    /// Matches name, phone or vehicle number
    pub search: Option<String>,
    /// `created_at`, `entry_time`, prefixed with `-` for descending
    pub ordering: Option<String>,
}

/// List visitors
#[utoipa::path(
    get,
    path = "/api/visitors",
    tag = "visitors",
    security(("bearer_auth" = [])),
    params(PageParams, VisitorFilters),
    responses((status = 200, description = "Visitors", body = VisitorPage))
)]
pub async fn list_visitors(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(page): Query<PageParams>,
    Query(filters): Query<VisitorFilters>,
) -> AppResult<Json<Paginated<VisitorResponse>>> {
    authorize(&auth_user, Module::Visitor, Action::List)?;

    let page = page.resolve(&state.config);
    let (all, society) = auth_user.scope().bind_values();
    let search = search_pattern(filters.search.as_deref());
    let order = order_by(
        filters.ordering.as_deref(),
        &[("created_at", "v.created_at"), ("entry_time", "v.entry_time")],
        "v.created_at DESC",
    );

    let filter = r#"
        WHERE ($1::bool OR v.society_id = $2)
          AND ($3::visitor_status IS NULL OR v.status = $3)
          AND ($4::visitor_purpose IS NULL OR v.purpose = $4)
          AND ($5::uuid IS NULL OR v.flat_id = $5)
          AND ($6::bool IS NULL OR v.pre_approved = $6)
          AND ($7::text IS NULL OR v.name ILIKE $7 OR v.phone ILIKE $7 OR v.vehicle_number ILIKE $7)
    "#;

    let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM visitors v {}", filter))
        .bind(all)
        .bind(society)
        .bind(filters.status)
        .bind(filters.purpose)
        .bind(filters.flat)
        .bind(filters.pre_approved)
        .bind(&search)
        .fetch_one(&state.pool)
        .await?;

    let rows = sqlx::query_as::<_, VisitorRow>(&format!(
        "{} {} ORDER BY {} LIMIT $8 OFFSET $9",
        VISITOR_SELECT, filter, order
    ))
    .bind(all)
    .bind(society)
    .bind(filters.status)
    .bind(filters.purpose)
    .bind(filters.flat)
    .bind(filters.pre_approved)
    .bind(&search)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&state.pool)
    .await?;

    let results = rows.into_iter().map(VisitorResponse::from).collect();
    Ok(Json(Paginated::new(results, count, page)))
}

async fn visitors_with_status(
    state: &AppState,
    auth_user: &AuthUser,
    status: VisitorStatus,
) -> AppResult<Vec<VisitorResponse>> {
    let (all, society) = auth_user.scope().bind_values();
    let rows = sqlx::query_as::<_, VisitorRow>(&format!(
        "{} WHERE ($1::bool OR v.society_id = $2) AND v.status = $3 ORDER BY v.created_at DESC",
        VISITOR_SELECT
    ))
    .bind(all)
    .bind(society)
    .bind(status)
    .fetch_all(&state.pool)
    .await?;
    Ok(rows.into_iter().map(VisitorResponse::from).collect())
}

/// Visitors currently inside the premises
#[utoipa::path(
    get,
    path = "/api/visitors/active",
    tag = "visitors",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Visitors in premises", body = Vec<VisitorResponse>))
)]
pub async fn active_visitors(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<Vec<VisitorResponse>>> {
    authorize(&auth_user, Module::Visitor, Action::Active)?;
    Ok(Json(
        visitors_with_status(&state, &auth_user, VisitorStatus::InPremises).await?,
    ))
}

/// Visitors waiting for approval
#[utoipa::path(
    get,
    path = "/api/visitors/pending",
    tag = "visitors",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Pending visitors", body = Vec<VisitorResponse>))
)]
pub async fn pending_visitors(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<Vec<VisitorResponse>>> {
    authorize(&auth_user, Module::Visitor, Action::Pending)?;
    Ok(Json(
        visitors_with_status(&state, &auth_user, VisitorStatus::Pending).await?,
    ))
}

/// Get a visitor
#[utoipa::path(
    get,
    path = "/api/visitors/{id}",
    tag = "visitors",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Visitor ID")),
    responses(
        (status = 200, description = "Visitor", body = VisitorResponse),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_visitor(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<VisitorResponse>> {
    authorize(&auth_user, Module::Visitor, Action::Retrieve)?;
    Ok(Json(fetch_visitor(&state, &auth_user, id).await?.into()))
}

/// Register a visitor for a flat; pre-approved visitors skip the approval step
#[utoipa::path(
    post,
    path = "/api/visitors",
    tag = "visitors",
    security(("bearer_auth" = [])),
    request_body = CreateVisitorRequest,
    responses(
        (status = 201, description = "Created", body = VisitorResponse),
        (status = 400, description = "Validation error")
    )
)]
pub async fn create_visitor(
    State(state): State<AppState>,
    auth_user: AuthUser,
    ApiJson(payload): ApiJson<CreateVisitorRequest>,
) -> AppResult<(StatusCode, Json<VisitorResponse>)> {
    authorize(&auth_user, Module::Visitor, Action::Create)?;
    payload.validate()?;
    check_phone("phone", Some(&payload.phone))?;

    let (all, society) = auth_user.scope().bind_values();
    let (society_id,): (Uuid,) = sqlx::query_as(
        "SELECT society_id FROM flats WHERE id = $1 AND ($2::bool OR society_id = $3)",
    )
    .bind(payload.flat)
    .bind(all)
    .bind(society)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::field("flat", "Invalid flat"))?;

    let pre_approved = payload.pre_approved.unwrap_or(false);
    let (status, approved_by) = if pre_approved {
        (VisitorStatus::Approved, Some(auth_user.user_id))
    } else {
        (VisitorStatus::Pending, None)
    };

    let visitor = sqlx::query_as::<_, Visitor>(
        r#"
        INSERT INTO visitors (society_id, flat_id, name, phone, purpose, vehicle_number,
                              status, approved_by, pre_approved, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(society_id)
    .bind(payload.flat)
    .bind(sanitize_string(&payload.name))
    .bind(payload.phone.trim())
    .bind(payload.purpose.unwrap_or_default())
    .bind(payload.vehicle_number.as_deref().map(str::trim).unwrap_or(""))
    .bind(status)
    .bind(approved_by)
    .bind(pre_approved)
    .bind(payload.notes.as_deref().unwrap_or(""))
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(visitor_id = %visitor.id, flat_id = %visitor.flat_id, ?status, "visitor registered");
    Ok((
        StatusCode::CREATED,
        Json(fetch_visitor(&state, &auth_user, visitor.id).await?.into()),
    ))
}

/// Edit visitor details
#[utoipa::path(
    put,
    path = "/api/visitors/{id}",
    tag = "visitors",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Visitor ID")),
    request_body = UpdateVisitorRequest,
    responses(
        (status = 200, description = "Updated", body = VisitorResponse),
        (status = 403, description = "Gate staff only"),
        (status = 404, description = "Not found")
    )
)]
pub async fn update_visitor(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<UpdateVisitorRequest>,
) -> AppResult<Json<VisitorResponse>> {
    authorize(&auth_user, Module::Visitor, Action::Update)?;
    payload.validate()?;
    check_phone("phone", payload.phone.as_deref())?;
    fetch_visitor(&state, &auth_user, id).await?;

    sqlx::query(
        r#"
        UPDATE visitors SET
            name = COALESCE($2, name),
            phone = COALESCE($3, phone),
            purpose = COALESCE($4, purpose),
            vehicle_number = COALESCE($5, vehicle_number),
            notes = COALESCE($6, notes),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(payload.name.as_deref().map(sanitize_string))
    .bind(payload.phone.as_deref().map(str::trim))
    .bind(payload.purpose)
    .bind(payload.vehicle_number.as_deref().map(str::trim))
    .bind(&payload.notes)
    .execute(&state.pool)
    .await?;

    Ok(Json(fetch_visitor(&state, &auth_user, id).await?.into()))
}

/// Delete a visitor record
#[utoipa::path(
    delete,
    path = "/api/visitors/{id}",
    tag = "visitors",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Visitor ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_visitor(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    authorize(&auth_user, Module::Visitor, Action::Destroy)?;
    fetch_visitor(&state, &auth_user, id).await?;

    sqlx::query("DELETE FROM visitors WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Approve a pending visitor
#[utoipa::path(
    post,
    path = "/api/visitors/{id}/approve",
    tag = "visitors",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Visitor ID")),
    responses(
        (status = 200, description = "Approved", body = VisitorResponse),
        (status = 400, description = "Visitor is not pending")
    )
)]
pub async fn approve(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<VisitorResponse>> {
    authorize(&auth_user, Module::Visitor, Action::Approve)?;
    Ok(Json(
        transition(&state, &auth_user, id, VisitorStatus::Approved, None).await?,
    ))
}

/// Turn a visitor away before entry
#[utoipa::path(
    post,
    path = "/api/visitors/{id}/reject",
    tag = "visitors",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Visitor ID")),
    responses(
        (status = 200, description = "Rejected", body = VisitorResponse),
        (status = 400, description = "Visitor already entered")
    )
)]
pub async fn reject(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<VisitorResponse>> {
    authorize(&auth_user, Module::Visitor, Action::Reject)?;
    Ok(Json(
        transition(&state, &auth_user, id, VisitorStatus::Rejected, None).await?,
    ))
}

/// Let an approved visitor in
#[utoipa::path(
    post,
    path = "/api/visitors/{id}/check_in",
    tag = "visitors",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Visitor ID")),
    request_body = CheckInRequest,
    responses(
        (status = 200, description = "Checked in", body = VisitorResponse),
        (status = 400, description = "Visitor is not approved"),
        (status = 403, description = "Admins and security only")
    )
)]
pub async fn check_in(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    payload: Option<ApiJson<CheckInRequest>>,
) -> AppResult<Json<VisitorResponse>> {
    authorize(&auth_user, Module::Visitor, Action::CheckIn)?;
    let entry_time = payload.and_then(|ApiJson(p)| p.entry_time);
    Ok(Json(
        transition(&state, &auth_user, id, VisitorStatus::InPremises, entry_time).await?,
    ))
}

/// Record a visitor leaving
#[utoipa::path(
    post,
    path = "/api/visitors/{id}/check_out",
    tag = "visitors",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Visitor ID")),
    request_body = CheckOutRequest,
    responses(
        (status = 200, description = "Checked out", body = VisitorResponse),
        (status = 400, description = "Visitor is not in the premises"),
        (status = 403, description = "Admins and security only")
    )
)]
pub async fn check_out(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    payload: Option<ApiJson<CheckOutRequest>>,
) -> AppResult<Json<VisitorResponse>> {
    authorize(&auth_user, Module::Visitor, Action::CheckOut)?;
    let exit_time = payload.and_then(|ApiJson(p)| p.exit_time);
    Ok(Json(
        transition(&state, &auth_user, id, VisitorStatus::Exited, exit_time).await?,
    ))
}

/// Attach or replace the visitor's photo
#[utoipa::path(
    post,
    path = "/api/visitors/{id}/photo",
    tag = "visitors",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Visitor ID")),
    request_body(content = String, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Photo stored", body = VisitorResponse),
        (status = 400, description = "Bad file")
    )
)]
pub async fn upload_photo(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> AppResult<Json<VisitorResponse>> {
    authorize(&auth_user, Module::Visitor, Action::Upload)?;
    let current = fetch_visitor(&state, &auth_user, id).await?.visitor;

    let file = read_upload(&mut multipart, "photo", UploadKind::Image).await?;
    let file_service = FileService::new(&state.config).await?;
    let url = file_service.upload_file("visitors", file).await?;

    sqlx::query("UPDATE visitors SET photo_url = $2, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .bind(&url)
        .execute(&state.pool)
        .await?;

    if let Some(previous) = current.photo_url {
        file_service.delete_by_url(&previous).await;
    }

    Ok(Json(fetch_visitor(&state, &auth_user, id).await?.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_workflow() {
        use VisitorStatus::*;
        assert!(check_transition(Pending, Approved).is_ok());
        assert!(check_transition(Approved, InPremises).is_ok());
        assert!(check_transition(InPremises, Exited).is_ok());
        assert!(check_transition(Approved, Rejected).is_ok());
    }

    #[test]
    fn test_gate_workflow_rejects_skips() {
        use VisitorStatus::*;
        for (from, to) in [
            (Pending, InPremises),
            (Pending, Exited),
            (InPremises, Rejected),
            (Exited, InPremises),
            (Rejected, Approved),
            (Approved, Approved),
        ] {
            assert!(
                matches!(check_transition(from, to), Err(AppError::BadRequest(_))),
                "{:?} -> {:?} should be refused",
                from,
                to
            );
        }
    }
}
