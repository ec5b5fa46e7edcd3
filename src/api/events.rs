use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::{AppState, AuthUser};
use crate::models::{
    CreateEventRequest, Event, EventDetailResponse, EventResponse, EventRow, EventType,
    RsvpResponse, UpdateEventRequest, UserSummary,
};
use crate::permissions::{authorize, require_society, Action, Module};
use crate::utils::{order_by, search_pattern, ApiJson, PageParams, Paginated};
use crate::utils::pagination::EventPage;

const DEFAULT_UPCOMING_DAYS: i64 = 30;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_events).post(create_event))
        .route("/upcoming", get(upcoming_events))
        .route(
            "/:id",
            get(get_event)
                .put(update_event)
                .patch(update_event)
                .delete(delete_event),
        )
        .route("/:id/rsvp", post(rsvp))
}

// $1 is always the caller, for `is_attending`.
const EVENT_SELECT: &str = r#"
    SELECT e.*,
           NULLIF(TRIM(u.first_name || ' ' || u.last_name), '') AS created_by_name,
           (SELECT COUNT(*) FROM event_attendees ea WHERE ea.event_id = e.id) AS attendees_count,
           EXISTS(
               SELECT 1 FROM event_attendees ea WHERE ea.event_id = e.id AND ea.user_id = $1
           ) AS is_attending
    FROM events e
    LEFT JOIN users u ON u.id = e.created_by
"#;

async fn fetch_event(state: &AppState, auth_user: &AuthUser, id: Uuid) -> AppResult<EventRow> {
    let (all, society) = auth_user.scope().bind_values();
    sqlx::query_as::<_, EventRow>(&format!(
        "{} WHERE e.id = $2 AND ($3::bool OR e.society_id = $4)",
        EVENT_SELECT
    ))
    .bind(auth_user.user_id)
    .bind(id)
    .bind(all)
    .bind(society)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Event not found".to_string()))
}

fn check_dates(start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> AppResult<()> {
    match end {
        Some(end) if end < start => Err(AppError::field(
            "end_date",
            "End date cannot be before the start date",
        )),
        _ => Ok(()),
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EventFilters {
    pub event_type: Option<EventType>,
    pub is_recurring: Option<bool>,
    /// Events starting at or after this instant
    pub start_date: Option<DateTime<Utc>>,
    /// Events starting at or before this instant
    pub end_date: Option<DateTime<Utc>>,
    /// Matches title, description or location
    pub search: Option<String>,
    /// `start_date`, `created_at`, prefixed with `-` for descending
    pub ordering: Option<String>,
}

/// List events
#[utoipa::path(
    get,
    path = "/api/events",
    tag = "events",
    security(("bearer_auth" = [])),
    params(PageParams, EventFilters),
    responses((status = 200, description = "Events", body = EventPage))
)]
pub async fn list_events(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(page): Query<PageParams>,
    Query(filters): Query<EventFilters>,
) -> AppResult<Json<Paginated<EventResponse>>> {
    authorize(&auth_user, Module::Event, Action::List)?;

    let page = page.resolve(&state.config);
    let (all, society) = auth_user.scope().bind_values();
    let search = search_pattern(filters.search.as_deref());
    let order = order_by(
        filters.ordering.as_deref(),
        &[("start_date", "e.start_date"), ("created_at", "e.created_at")],
        "e.start_date ASC",
    );

    // $1 stays bound in the count query so both share the numbering.
    let filter = r#"
        WHERE ($2::bool OR e.society_id = $3)
          AND ($4::event_type IS NULL OR e.event_type = $4)
          AND ($5::bool IS NULL OR e.is_recurring = $5)
          AND ($6::timestamptz IS NULL OR e.start_date >= $6)
          AND ($7::timestamptz IS NULL OR e.start_date <= $7)
          AND ($8::text IS NULL OR e.title ILIKE $8 OR e.description ILIKE $8 OR e.location ILIKE $8)
    "#;

    let (count,): (i64,) = sqlx::query_as(&format!(
        "SELECT COUNT(*) FROM events e {}",
        filter
    ))
    .bind(auth_user.user_id)
    .bind(all)
    .bind(society)
    .bind(filters.event_type)
    .bind(filters.is_recurring)
    .bind(filters.start_date)
    .bind(filters.end_date)
    .bind(&search)
    .fetch_one(&state.pool)
    .await?;

    let rows = sqlx::query_as::<_, EventRow>(&format!(
        "{} {} ORDER BY {} LIMIT $9 OFFSET $10",
        EVENT_SELECT, filter, order
    ))
    .bind(auth_user.user_id)
    .bind(all)
    .bind(society)
    .bind(filters.event_type)
    .bind(filters.is_recurring)
    .bind(filters.start_date)
    .bind(filters.end_date)
    .bind(&search)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&state.pool)
    .await?;

    let results = rows.into_iter().map(EventResponse::from).collect();
    Ok(Json(Paginated::new(results, count, page)))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UpcomingParams {
    /// Look-ahead window in days, 30 when omitted
    pub days: Option<i64>,
}

/// Events starting within the next `days` days
#[utoipa::path(
    get,
    path = "/api/events/upcoming",
    tag = "events",
    security(("bearer_auth" = [])),
    params(UpcomingParams),
    responses(
        (status = 200, description = "Upcoming events, soonest first", body = Vec<EventResponse>),
        (status = 400, description = "Negative window")
    )
)]
pub async fn upcoming_events(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(params): Query<UpcomingParams>,
) -> AppResult<Json<Vec<EventResponse>>> {
    authorize(&auth_user, Module::Event, Action::Upcoming)?;

    let days = params.days.unwrap_or(DEFAULT_UPCOMING_DAYS);
    if !(0..=3650).contains(&days) {
        return Err(AppError::field("days", "Must be between 0 and 3650"));
    }
    let now = Utc::now();
    let until = now + Duration::days(days);

    let (all, society) = auth_user.scope().bind_values();
    let rows = sqlx::query_as::<_, EventRow>(&format!(
        r#"{} WHERE ($2::bool OR e.society_id = $3)
              AND e.start_date >= $4 AND e.start_date <= $5
           ORDER BY e.start_date"#,
        EVENT_SELECT
    ))
    .bind(auth_user.user_id)
    .bind(all)
    .bind(society)
    .bind(now)
    .bind(until)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(rows.into_iter().map(EventResponse::from).collect()))
}

/// Get an event with its attendees
#[utoipa::path(
    get,
    path = "/api/events/{id}",
    tag = "events",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Event ID")),
    responses(
        (status = 200, description = "Event", body = EventDetailResponse),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_event(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<EventDetailResponse>> {
    authorize(&auth_user, Module::Event, Action::Retrieve)?;
    let event = fetch_event(&state, &auth_user, id).await?;

    let attendees = sqlx::query_as::<_, UserSummary>(
        r#"
        SELECT u.id, u.first_name, u.last_name, u.email, u.phone
        FROM event_attendees ea
        JOIN users u ON u.id = ea.user_id
        WHERE ea.event_id = $1
        ORDER BY ea.created_at
        "#,
    )
    .bind(id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(EventDetailResponse {
        event: event.into(),
        attendees,
    }))
}

/// Schedule an event in the caller's society
#[utoipa::path(
    post,
    path = "/api/events",
    tag = "events",
    security(("bearer_auth" = [])),
    request_body = CreateEventRequest,
    responses(
        (status = 201, description = "Created", body = EventResponse),
        (status = 400, description = "Validation error or no society"),
        (status = 403, description = "Admins and committee only")
    )
)]
pub async fn create_event(
    State(state): State<AppState>,
    auth_user: AuthUser,
    ApiJson(payload): ApiJson<CreateEventRequest>,
) -> AppResult<(StatusCode, Json<EventResponse>)> {
    authorize(&auth_user, Module::Event, Action::Create)?;
    payload.validate()?;
    check_dates(payload.start_date, payload.end_date)?;
    let society_id = require_society(&auth_user)?;

    let event = sqlx::query_as::<_, Event>(
        r#"
        INSERT INTO events (society_id, title, description, event_type, start_date, end_date,
                            location, created_by, is_recurring, recurrence_pattern)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(society_id)
    .bind(payload.title.trim())
    .bind(&payload.description)
    .bind(payload.event_type)
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(payload.location.as_deref().unwrap_or(""))
    .bind(auth_user.user_id)
    .bind(payload.is_recurring.unwrap_or(false))
    .bind(payload.recurrence_pattern.as_deref().unwrap_or(""))
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(event_id = %event.id, start = %event.start_date, "event scheduled");
    Ok((
        StatusCode::CREATED,
        Json(fetch_event(&state, &auth_user, event.id).await?.into()),
    ))
}

/// Edit an event
#[utoipa::path(
    put,
    path = "/api/events/{id}",
    tag = "events",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Event ID")),
    request_body = UpdateEventRequest,
    responses(
        (status = 200, description = "Updated", body = EventResponse),
        (status = 403, description = "Admins and committee only"),
        (status = 404, description = "Not found")
    )
)]
pub async fn update_event(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<UpdateEventRequest>,
) -> AppResult<Json<EventResponse>> {
    authorize(&auth_user, Module::Event, Action::Update)?;
    payload.validate()?;

    let current = fetch_event(&state, &auth_user, id).await?.event;
    check_dates(
        payload.start_date.unwrap_or(current.start_date),
        payload.end_date.or(current.end_date),
    )?;

    sqlx::query(
        r#"
        UPDATE events SET
            title = COALESCE($2, title),
            description = COALESCE($3, description),
            event_type = COALESCE($4, event_type),
            start_date = COALESCE($5, start_date),
            end_date = COALESCE($6, end_date),
            location = COALESCE($7, location),
            is_recurring = COALESCE($8, is_recurring),
            recurrence_pattern = COALESCE($9, recurrence_pattern),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(payload.title.as_deref().map(str::trim))
    .bind(&payload.description)
    .bind(payload.event_type)
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(&payload.location)
    .bind(payload.is_recurring)
    .bind(&payload.recurrence_pattern)
    .execute(&state.pool)
    .await?;

    Ok(Json(fetch_event(&state, &auth_user, id).await?.into()))
}

/// Delete an event
#[utoipa::path(
    delete,
    path = "/api/events/{id}",
    tag = "events",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Event ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_event(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    authorize(&auth_user, Module::Event, Action::Destroy)?;
    fetch_event(&state, &auth_user, id).await?;

    sqlx::query("DELETE FROM events WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Toggle the caller's attendance
#[utoipa::path(
    post,
    path = "/api/events/{id}/rsvp",
    tag = "events",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Event ID")),
    responses(
        (status = 200, description = "Attendance toggled", body = RsvpResponse),
        (status = 404, description = "Not found")
    )
)]
pub async fn rsvp(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<RsvpResponse>> {
    authorize(&auth_user, Module::Event, Action::Rsvp)?;
    fetch_event(&state, &auth_user, id).await?;

    let mut tx = state.pool.begin().await?;
    let removed = sqlx::query("DELETE FROM event_attendees WHERE event_id = $1 AND user_id = $2")
        .bind(id)
        .bind(auth_user.user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected()
        > 0;

    if !removed {
        sqlx::query(
            "INSERT INTO event_attendees (event_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(id)
        .bind(auth_user.user_id)
        .execute(&mut *tx)
        .await?;
    }

    let (attendees_count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM event_attendees WHERE event_id = $1")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
    tx.commit().await?;

    Ok(Json(RsvpResponse {
        message: if removed { "RSVP removed" } else { "RSVP added" }.to_string(),
        is_attending: !removed,
        attendees_count,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_dates() {
        let start = Utc::now();
        assert!(check_dates(start, None).is_ok());
        assert!(check_dates(start, Some(start)).is_ok());
        assert!(check_dates(start, Some(start + Duration::hours(2))).is_ok());
        assert!(matches!(
            check_dates(start, Some(start - Duration::minutes(1))),
            Err(AppError::Validation(_))
        ));
    }
}
