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
use crate::models::{
    AcknowledgeResponse, AlertResponse, AlertRow, AlertSeverity, AlertType, CreateAlertRequest,
    EmergencyAlert, UnacknowledgedCountResponse, UpdateAlertRequest,
};
use crate::permissions::{authorize, require_society, Action, Module};
use crate::utils::{order_by, search_pattern, ApiJson, PageParams, Paginated};
use crate::utils::pagination::AlertPage;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_alerts).post(create_alert))
        .route("/active", get(active_alerts))
        .route("/unacknowledged_count", get(unacknowledged_count))
        .route(
            "/:id",
            get(get_alert)
                .put(update_alert)
                .patch(update_alert)
                .delete(delete_alert),
        )
        .route("/:id/acknowledge", post(acknowledge))
}

// $1 is always the caller, for `is_acknowledged`.
const ALERT_SELECT: &str = r#"
    SELECT a.*,
           NULLIF(TRIM(u.first_name || ' ' || u.last_name), '') AS created_by_name,
           EXISTS(
               SELECT 1 FROM alert_acknowledgements ack
               WHERE ack.alert_id = a.id AND ack.user_id = $1
           ) AS is_acknowledged
    FROM emergency_alerts a
    LEFT JOIN users u ON u.id = a.created_by
"#;

const LIVE: &str = "a.is_active AND (a.expires_at IS NULL OR a.expires_at > NOW())";

const UNACKNOWLEDGED: &str = r#"NOT EXISTS(
    SELECT 1 FROM alert_acknowledgements ack WHERE ack.alert_id = a.id AND ack.user_id = $1
)"#;

const SEVERITY_RANK: &str = r#"CASE a.severity
    WHEN 'CRITICAL' THEN 0 WHEN 'HIGH' THEN 1 WHEN 'MEDIUM' THEN 2 ELSE 3
END"#;

async fn fetch_alert(state: &AppState, auth_user: &AuthUser, id: Uuid) -> AppResult<AlertRow> {
    let (all, society) = auth_user.scope().bind_values();
    sqlx::query_as::<_, AlertRow>(&format!(
        "{} WHERE a.id = $2 AND ($3::bool OR a.society_id = $4)",
        ALERT_SELECT
    ))
    .bind(auth_user.user_id)
    .bind(id)
    .bind(all)
    .bind(society)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Alert not found".to_string()))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AlertFilters {
    /// Hide inactive and expired alerts
    #[serde(default)]
    pub active_only: bool,
    pub alert_type: Option<AlertType>,
    pub severity: Option<AlertSeverity>,
    pub is_active: Option<bool>,
    /// Matches title or message
    pub search: Option<String>,
    /// `created_at`, `severity`, prefixed with `-` for descending
    pub ordering: Option<String>,
}

/// List alerts
#[utoipa::path(
    get,
    path = "/api/alerts",
    tag = "alerts",
    security(("bearer_auth" = [])),
    params(PageParams, AlertFilters),
    responses((status = 200, description = "Alerts", body = AlertPage))
)]
pub async fn list_alerts(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(page): Query<PageParams>,
    Query(filters): Query<AlertFilters>,
) -> AppResult<Json<Paginated<AlertResponse>>> {
    authorize(&auth_user, Module::Alert, Action::List)?;

    let page = page.resolve(&state.config);
    let (all, society) = auth_user.scope().bind_values();
    let search = search_pattern(filters.search.as_deref());
    let order = order_by(
        filters.ordering.as_deref(),
        &[("created_at", "a.created_at"), ("severity", "a.severity")],
        "a.created_at DESC",
    );

    // $1 stays bound in the count query so both share the numbering.
    let filter = format!(
        r#"
        WHERE ($2::bool OR a.society_id = $3)
          AND (NOT $4 OR ({live}))
          AND ($5::alert_type IS NULL OR a.alert_type = $5)
          AND ($6::alert_severity IS NULL OR a.severity = $6)
          AND ($7::bool IS NULL OR a.is_active = $7)
          AND ($8::text IS NULL OR a.title ILIKE $8 OR a.message ILIKE $8)
        "#,
        live = LIVE
    );

    let (count,): (i64,) =
        sqlx::query_as(&format!("SELECT COUNT(*) FROM emergency_alerts a {}", filter))
            .bind(auth_user.user_id)
            .bind(all)
            .bind(society)
            .bind(filters.active_only)
            .bind(filters.alert_type)
            .bind(filters.severity)
            .bind(filters.is_active)
            .bind(&search)
            .fetch_one(&state.pool)
            .await?;

    let rows = sqlx::query_as::<_, AlertRow>(&format!(
        "{} {} ORDER BY {} LIMIT $9 OFFSET $10",
        ALERT_SELECT, filter, order
    ))
    .bind(auth_user.user_id)
    .bind(all)
    .bind(society)
    .bind(filters.active_only)
    .bind(filters.alert_type)
    .bind(filters.severity)
    .bind(filters.is_active)
    .bind(&search)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&state.pool)
    .await?;

    let results = rows.into_iter().map(AlertResponse::from).collect();
    Ok(Json(Paginated::new(results, count, page)))
}

/// Live alerts the caller has not acknowledged yet, critical first
#[utoipa::path(
    get,
    path = "/api/alerts/active",
    tag = "alerts",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Alerts", body = Vec<AlertResponse>))
)]
pub async fn active_alerts(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<Vec<AlertResponse>>> {
    authorize(&auth_user, Module::Alert, Action::Active)?;

    let (all, society) = auth_user.scope().bind_values();
    let rows = sqlx::query_as::<_, AlertRow>(&format!(
        "{} WHERE ($2::bool OR a.society_id = $3) AND {} AND {} ORDER BY {}, a.created_at DESC",
        ALERT_SELECT, LIVE, UNACKNOWLEDGED, SEVERITY_RANK
    ))
    .bind(auth_user.user_id)
    .bind(all)
    .bind(society)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(rows.into_iter().map(AlertResponse::from).collect()))
}

/// Number of live alerts the caller has not acknowledged
#[utoipa::path(
    get,
    path = "/api/alerts/unacknowledged_count",
    tag = "alerts",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Count", body = UnacknowledgedCountResponse))
)]
pub async fn unacknowledged_count(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<UnacknowledgedCountResponse>> {
    authorize(&auth_user, Module::Alert, Action::UnacknowledgedCount)?;

    let (all, society) = auth_user.scope().bind_values();
    let (count,): (i64,) = sqlx::query_as(&format!(
        "SELECT COUNT(*) FROM emergency_alerts a WHERE ($2::bool OR a.society_id = $3) AND {} AND {}",
        LIVE, UNACKNOWLEDGED
    ))
    .bind(auth_user.user_id)
    .bind(all)
    .bind(society)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(UnacknowledgedCountResponse { count }))
}

/// Get an alert
#[utoipa::path(
    get,
    path = "/api/alerts/{id}",
    tag = "alerts",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Alert ID")),
    responses(
        (status = 200, description = "Alert", body = AlertResponse),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_alert(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<AlertResponse>> {
    authorize(&auth_user, Module::Alert, Action::Retrieve)?;
    Ok(Json(fetch_alert(&state, &auth_user, id).await?.into()))
}

/// Raise an alert in the caller's society
#[utoipa::path(
    post,
    path = "/api/alerts",
    tag = "alerts",
    security(("bearer_auth" = [])),
    request_body = CreateAlertRequest,
    responses(
        (status = 201, description = "Created", body = AlertResponse),
        (status = 400, description = "Validation error or no society"),
        (status = 403, description = "Admins and committee only")
    )
)]
pub async fn create_alert(
    State(state): State<AppState>,
    auth_user: AuthUser,
    ApiJson(payload): ApiJson<CreateAlertRequest>,
) -> AppResult<(StatusCode, Json<AlertResponse>)> {
    authorize(&auth_user, Module::Alert, Action::Create)?;
    payload.validate()?;
    let society_id = require_society(&auth_user)?;

    let alert = sqlx::query_as::<_, EmergencyAlert>(
        r#"
        INSERT INTO emergency_alerts (society_id, title, message, alert_type, severity,
                                      created_by, is_active, expires_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(society_id)
    .bind(payload.title.trim())
    .bind(&payload.message)
    .bind(payload.alert_type)
    .bind(payload.severity.unwrap_or_default())
    .bind(auth_user.user_id)
    .bind(payload.is_active.unwrap_or(true))
    .bind(payload.expires_at)
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(
        alert_id = %alert.id,
        severity = ?alert.severity,
        alert_type = ?alert.alert_type,
        "alert raised"
    );
    Ok((
        StatusCode::CREATED,
        Json(fetch_alert(&state, &auth_user, alert.id).await?.into()),
    ))
}

/// Edit or deactivate an alert
#[utoipa::path(
    put,
    path = "/api/alerts/{id}",
    tag = "alerts",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Alert ID")),
    request_body = UpdateAlertRequest,
    responses(
        (status = 200, description = "Updated", body = AlertResponse),
        (status = 403, description = "Admins and committee only"),
        (status = 404, description = "Not found")
    )
)]
pub async fn update_alert(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<UpdateAlertRequest>,
) -> AppResult<Json<AlertResponse>> {
    authorize(&auth_user, Module::Alert, Action::Update)?;
    payload.validate()?;
    fetch_alert(&state, &auth_user, id).await?;

    sqlx::query(
        r#"
        UPDATE emergency_alerts SET
            title = COALESCE($2, title),
            message = COALESCE($3, message),
            alert_type = COALESCE($4, alert_type),
            severity = COALESCE($5, severity),
            is_active = COALESCE($6, is_active),
            expires_at = COALESCE($7, expires_at),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(payload.title.as_deref().map(str::trim))
    .bind(&payload.message)
    .bind(payload.alert_type)
    .bind(payload.severity)
    .bind(payload.is_active)
    .bind(payload.expires_at)
    .execute(&state.pool)
    .await?;

    Ok(Json(fetch_alert(&state, &auth_user, id).await?.into()))
}

/// Delete an alert
#[utoipa::path(
    delete,
    path = "/api/alerts/{id}",
    tag = "alerts",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Alert ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_alert(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    authorize(&auth_user, Module::Alert, Action::Destroy)?;
    fetch_alert(&state, &auth_user, id).await?;

    sqlx::query("DELETE FROM emergency_alerts WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Acknowledge an alert; repeating it is harmless
#[utoipa::path(
    post,
    path = "/api/alerts/{id}/acknowledge",
    tag = "alerts",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Alert ID")),
    responses(
        (status = 200, description = "Acknowledged", body = AcknowledgeResponse),
        (status = 404, description = "Not found")
    )
)]
pub async fn acknowledge(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<AcknowledgeResponse>> {
    authorize(&auth_user, Module::Alert, Action::Acknowledge)?;
    fetch_alert(&state, &auth_user, id).await?;

    sqlx::query(
        "INSERT INTO alert_acknowledgements (alert_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(id)
    .bind(auth_user.user_id)
    .execute(&state.pool)
    .await?;

    Ok(Json(AcknowledgeResponse {
        message: "Alert acknowledged".to_string(),
        is_acknowledged: true,
    }))
}
