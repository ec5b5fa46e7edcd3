use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
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
    BillStatus, Block, BlockResponse, CreateBlockRequest, CreateBlockWithFlatsRequest,
    CreateFlatRequest, CreateSocietyRequest, DashboardBlock, DashboardFlat, DashboardFloor,
    DashboardResponse, FlatDetailResponse, FlatListRow, FlatResponse, OccupancyStatus,
    RegenerateFlatsResponse, Society, UpdateBlockRequest, UpdateFlatRequest,
    UpdateSocietyRequest, UserSummary,
};
use crate::permissions::{authorize, Action, Module, SocietyScope};
use crate::services::{billing_service, flat_service};
use crate::utils::{
    order_by, search_pattern,
    validators::{check_bhk, sanitize_string},
    ApiJson, PageParams, Paginated,
};
use crate::utils::pagination::{BlockPage, FlatPage, SocietyPage};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/societies", get(list_societies).post(create_society))
        .route(
            "/societies/:id",
            get(get_society)
                .put(update_society)
                .patch(update_society)
                .delete(delete_society),
        )
        .route("/blocks", get(list_blocks).post(create_block))
        .route("/blocks/create_with_flats", post(create_block_with_flats))
        .route(
            "/blocks/:id",
            get(get_block)
                .put(update_block)
                .patch(update_block)
                .delete(delete_block),
        )
        .route("/blocks/:id/regenerate_flats", post(regenerate_flats))
        .route("/flats", get(list_flats).post(create_flat))
        .route("/flats/my_society", get(my_society_flats))
        .route("/flats/directory", get(directory))
        .route("/flats/dashboard", get(dashboard))
        .route(
            "/flats/:id",
            get(get_flat).put(update_flat).patch(update_flat).delete(delete_flat),
        )
}

/// Rejects references to a society outside the caller's scope.
fn ensure_society_in_scope(scope: SocietyScope, field: &str, society_id: Uuid) -> AppResult<()> {
    if scope.contains(society_id) {
        Ok(())
    } else {
        Err(AppError::field(field, "Invalid society"))
    }
}

async fn ensure_user_exists(state: &AppState, field: &str, user_id: Option<Uuid>) -> AppResult<()> {
    let Some(user_id) = user_id else {
        return Ok(());
    };
    let (exists,): (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
        .bind(user_id)
        .fetch_one(&state.pool)
        .await?;
    if exists {
        Ok(())
    } else {
        Err(AppError::field(field, "Invalid user"))
    }
}

// ---------------------------------------------------------------------------
// Societies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SocietyFilters {
    /// Matches name, city or registration number
    pub search: Option<String>,
    /// `name`, `created_at`, prefixed with `-` for descending
    pub ordering: Option<String>,
}

/// List societies (public, used by the registration form)
#[utoipa::path(
    get,
    path = "/api/society/societies",
    tag = "society",
    params(PageParams, SocietyFilters),
    responses((status = 200, description = "Societies", body = SocietyPage))
)]
pub async fn list_societies(
    State(state): State<AppState>,
    Query(page): Query<PageParams>,
    Query(filters): Query<SocietyFilters>,
) -> AppResult<Json<Paginated<Society>>> {
    let page = page.resolve(&state.config);
    let search = search_pattern(filters.search.as_deref());
    let order = order_by(
        filters.ordering.as_deref(),
        &[("name", "name"), ("created_at", "created_at")],
        "name ASC",
    );

    let filter = r#"
        FROM societies
        WHERE ($1::text IS NULL OR name ILIKE $1 OR city ILIKE $1 OR registration_number ILIKE $1)
    "#;

    let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) {}", filter))
        .bind(&search)
        .fetch_one(&state.pool)
        .await?;

    let societies = sqlx::query_as::<_, Society>(&format!(
        "SELECT * {} ORDER BY {} LIMIT $2 OFFSET $3",
        filter, order
    ))
    .bind(&search)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(Paginated::new(societies, count, page)))
}

async fn fetch_society(state: &AppState, scope: SocietyScope, id: Uuid) -> AppResult<Society> {
    let (all, society) = scope.bind_values();
    sqlx::query_as::<_, Society>("SELECT * FROM societies WHERE id = $1 AND ($2::bool OR id = $3)")
        .bind(id)
        .bind(all)
        .bind(society)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Society not found".to_string()))
}

/// Get a society
#[utoipa::path(
    get,
    path = "/api/society/societies/{id}",
    tag = "society",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Society ID")),
    responses(
        (status = 200, description = "Society", body = Society),
        (status = 404, description = "Not found or outside your society")
    )
)]
pub async fn get_society(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Society>> {
    authorize(&auth_user, Module::Society, Action::Retrieve)?;
    Ok(Json(fetch_society(&state, auth_user.scope(), id).await?))
}

/// Create a society
#[utoipa::path(
    post,
    path = "/api/society/societies",
    tag = "society",
    security(("bearer_auth" = [])),
    request_body = CreateSocietyRequest,
    responses(
        (status = 201, description = "Created", body = Society),
        (status = 403, description = "Admins only")
    )
)]
pub async fn create_society(
    State(state): State<AppState>,
    auth_user: AuthUser,
    ApiJson(payload): ApiJson<CreateSocietyRequest>,
) -> AppResult<(StatusCode, Json<Society>)> {
    authorize(&auth_user, Module::Society, Action::Create)?;
    payload.validate()?;

    let society = sqlx::query_as::<_, Society>(
        r#"
        INSERT INTO societies (name, address, city, state, pincode, registration_number,
                               total_flats, total_floors, amenities)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(sanitize_string(&payload.name))
    .bind(&payload.address)
    .bind(sanitize_string(&payload.city))
    .bind(sanitize_string(&payload.state))
    .bind(sanitize_string(&payload.pincode))
    .bind(payload.registration_number.as_deref().unwrap_or(""))
    .bind(payload.total_flats)
    .bind(payload.total_floors)
    .bind(payload.amenities.as_deref().unwrap_or(""))
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(society_id = %society.id, name = %society.name, "society created");
    Ok((StatusCode::CREATED, Json(society)))
}

/// Update a society
#[utoipa::path(
    put,
    path = "/api/society/societies/{id}",
    tag = "society",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Society ID")),
    request_body = UpdateSocietyRequest,
    responses(
        (status = 200, description = "Updated", body = Society),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Not found")
    )
)]
pub async fn update_society(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<UpdateSocietyRequest>,
) -> AppResult<Json<Society>> {
    authorize(&auth_user, Module::Society, Action::Update)?;
    payload.validate()?;
    fetch_society(&state, auth_user.scope(), id).await?;

    let society = sqlx::query_as::<_, Society>(
        r#"
        UPDATE societies SET
            name = COALESCE($2, name),
            address = COALESCE($3, address),
            city = COALESCE($4, city),
            state = COALESCE($5, state),
            pincode = COALESCE($6, pincode),
            registration_number = COALESCE($7, registration_number),
            total_flats = COALESCE($8, total_flats),
            total_floors = COALESCE($9, total_floors),
            amenities = COALESCE($10, amenities),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(payload.name.as_deref().map(sanitize_string))
    .bind(&payload.address)
    .bind(payload.city.as_deref().map(sanitize_string))
    .bind(payload.state.as_deref().map(sanitize_string))
    .bind(&payload.pincode)
    .bind(&payload.registration_number)
    .bind(payload.total_flats)
    .bind(payload.total_floors)
    .bind(&payload.amenities)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(society))
}

/// Delete a society and everything in it
#[utoipa::path(
    delete,
    path = "/api/society/societies/{id}",
    tag = "society",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Society ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_society(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    authorize(&auth_user, Module::Society, Action::Destroy)?;
    fetch_society(&state, auth_user.scope(), id).await?;

    sqlx::query("DELETE FROM societies WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;

    tracing::info!(society_id = %id, "society deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Blocks
// ---------------------------------------------------------------------------

const BLOCK_SELECT: &str = r#"
    SELECT bl.id, bl.society_id AS society, s.name AS society_name, bl.name,
           bl.floors, bl.units_per_floor, bl.created_at, bl.updated_at
    FROM blocks bl
    JOIN societies s ON s.id = bl.society_id
"#;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct BlockFilters {
    pub society: Option<Uuid>,
    pub search: Option<String>,
    /// `name`, `created_at`, prefixed with `-` for descending
    pub ordering: Option<String>,
}

async fn fetch_block(state: &AppState, scope: SocietyScope, id: Uuid) -> AppResult<Block> {
    let (all, society) = scope.bind_values();
    sqlx::query_as::<_, Block>(
        "SELECT * FROM blocks WHERE id = $1 AND ($2::bool OR society_id = $3)",
    )
    .bind(id)
    .bind(all)
    .bind(society)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Block not found".to_string()))
}

async fn block_response(state: &AppState, id: Uuid) -> AppResult<BlockResponse> {
    sqlx::query_as::<_, BlockResponse>(&format!("{} WHERE bl.id = $1", BLOCK_SELECT))
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Block not found".to_string()))
}

/// List blocks
#[utoipa::path(
    get,
    path = "/api/society/blocks",
    tag = "society",
    security(("bearer_auth" = [])),
    params(PageParams, BlockFilters),
    responses((status = 200, description = "Blocks", body = BlockPage))
)]
pub async fn list_blocks(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(page): Query<PageParams>,
    Query(filters): Query<BlockFilters>,
) -> AppResult<Json<Paginated<BlockResponse>>> {
    authorize(&auth_user, Module::Block, Action::List)?;

    let page = page.resolve(&state.config);
    let (all, society) = auth_user.scope().bind_values();
    let search = search_pattern(filters.search.as_deref());
    let order = order_by(
        filters.ordering.as_deref(),
        &[("name", "bl.name"), ("created_at", "bl.created_at")],
        "bl.name ASC",
    );

    let filter = r#"
        WHERE ($1::bool OR bl.society_id = $2)
          AND ($3::uuid IS NULL OR bl.society_id = $3)
          AND ($4::text IS NULL OR bl.name ILIKE $4)
    "#;

    let (count,): (i64,) =
        sqlx::query_as(&format!("SELECT COUNT(*) FROM blocks bl {}", filter))
            .bind(all)
            .bind(society)
            .bind(filters.society)
            .bind(&search)
            .fetch_one(&state.pool)
            .await?;

    let blocks = sqlx::query_as::<_, BlockResponse>(&format!(
        "{} {} ORDER BY {} LIMIT $5 OFFSET $6",
        BLOCK_SELECT, filter, order
    ))
    .bind(all)
    .bind(society)
    .bind(filters.society)
    .bind(&search)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(Paginated::new(blocks, count, page)))
}

/// Get a block
#[utoipa::path(
    get,
    path = "/api/society/blocks/{id}",
    tag = "society",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Block ID")),
    responses(
        (status = 200, description = "Block", body = BlockResponse),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_block(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<BlockResponse>> {
    authorize(&auth_user, Module::Block, Action::Retrieve)?;
    let block = fetch_block(&state, auth_user.scope(), id).await?;
    Ok(Json(block_response(&state, block.id).await?))
}

/// Create a block without flats
#[utoipa::path(
    post,
    path = "/api/society/blocks",
    tag = "society",
    security(("bearer_auth" = [])),
    request_body = CreateBlockRequest,
    responses(
        (status = 201, description = "Created", body = BlockResponse),
        (status = 403, description = "Admins only"),
        (status = 409, description = "Block name already used in this society")
    )
)]
pub async fn create_block(
    State(state): State<AppState>,
    auth_user: AuthUser,
    ApiJson(payload): ApiJson<CreateBlockRequest>,
) -> AppResult<(StatusCode, Json<BlockResponse>)> {
    authorize(&auth_user, Module::Block, Action::Create)?;
    payload.validate()?;
    ensure_society_in_scope(auth_user.scope(), "society", payload.society)?;
    let name = sanitize_string(&payload.name);
    flat_service::check_layout(&name, payload.floors, payload.units_per_floor)?;

    let block = sqlx::query_as::<_, Block>(
        r#"
        INSERT INTO blocks (society_id, name, floors, units_per_floor)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(payload.society)
    .bind(&name)
    .bind(payload.floors)
    .bind(payload.units_per_floor)
    .fetch_one(&state.pool)
    .await?;

    Ok((StatusCode::CREATED, Json(block_response(&state, block.id).await?)))
}

/// Create a block and generate its flats
#[utoipa::path(
    post,
    path = "/api/society/blocks/create_with_flats",
    tag = "society",
    security(("bearer_auth" = [])),
    request_body = CreateBlockWithFlatsRequest,
    responses(
        (status = 201, description = "Block created with floors x units flats", body = BlockResponse),
        (status = 400, description = "Validation error"),
        (status = 403, description = "Admins only")
    )
)]
pub async fn create_block_with_flats(
    State(state): State<AppState>,
    auth_user: AuthUser,
    ApiJson(payload): ApiJson<CreateBlockWithFlatsRequest>,
) -> AppResult<(StatusCode, Json<BlockResponse>)> {
    authorize(&auth_user, Module::Block, Action::CreateWithFlats)?;
    payload.validate()?;
    check_bhk(payload.bhk.as_deref())?;
    ensure_society_in_scope(auth_user.scope(), "society", payload.society)?;
    let name = sanitize_string(&payload.name);
    flat_service::check_layout(&name, payload.floors, payload.units_per_floor)?;

    let (block, _) = flat_service::create_with_flats(
        &state.pool,
        payload.society,
        &name,
        payload.floors,
        payload.units_per_floor,
        payload.bhk.as_deref().unwrap_or(flat_service::DEFAULT_BHK),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(block_response(&state, block.id).await?)))
}

/// Update a block; existing flats are left alone until regenerated
#[utoipa::path(
    put,
    path = "/api/society/blocks/{id}",
    tag = "society",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Block ID")),
    request_body = UpdateBlockRequest,
    responses(
        (status = 200, description = "Updated", body = BlockResponse),
        (status = 404, description = "Not found")
    )
)]
pub async fn update_block(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<UpdateBlockRequest>,
) -> AppResult<Json<BlockResponse>> {
    authorize(&auth_user, Module::Block, Action::Update)?;
    payload.validate()?;
    let current = fetch_block(&state, auth_user.scope(), id).await?;
    let name = payload.name.as_deref().map(sanitize_string);
    flat_service::check_layout(
        name.as_deref().unwrap_or(&current.name),
        payload.floors.unwrap_or(current.floors),
        payload.units_per_floor.unwrap_or(current.units_per_floor),
    )?;

    sqlx::query(
        r#"
        UPDATE blocks SET
            name = COALESCE($2, name),
            floors = COALESCE($3, floors),
            units_per_floor = COALESCE($4, units_per_floor),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(payload.floors)
    .bind(payload.units_per_floor)
    .execute(&state.pool)
    .await?;

    Ok(Json(block_response(&state, id).await?))
}

/// Delete a block and its flats
#[utoipa::path(
    delete,
    path = "/api/society/blocks/{id}",
    tag = "society",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Block ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_block(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    authorize(&auth_user, Module::Block, Action::Destroy)?;
    fetch_block(&state, auth_user.scope(), id).await?;

    sqlx::query("DELETE FROM blocks WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Rebuild a block's flats from its current floors and units per floor
#[utoipa::path(
    post,
    path = "/api/society/blocks/{id}/regenerate_flats",
    tag = "society",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Block ID")),
    responses(
        (status = 200, description = "Flats regenerated", body = RegenerateFlatsResponse),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Not found")
    )
)]
pub async fn regenerate_flats(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<RegenerateFlatsResponse>> {
    authorize(&auth_user, Module::Block, Action::RegenerateFlats)?;
    let block = fetch_block(&state, auth_user.scope(), id).await?;
    flat_service::check_layout(&block.name, block.floors, block.units_per_floor)?;

    let flats_count = flat_service::regenerate_flats(&state.pool, &block).await?;

    Ok(Json(RegenerateFlatsResponse {
        message: format!("Regenerated {} flats for block {}", flats_count, block.name),
        flats_count,
    }))
}

// ---------------------------------------------------------------------------
// Flats
// ---------------------------------------------------------------------------

const FLAT_SELECT: &str = r#"
    SELECT f.*, bl.name AS block_name,
           o.first_name AS owner_first_name, o.last_name AS owner_last_name,
           r.first_name AS resident_first_name, r.last_name AS resident_last_name,
           EXISTS(
               SELECT 1 FROM bills x
               WHERE x.flat_id = f.id AND x.status <> 'PAID' AND x.due_date < CURRENT_DATE
           ) AS has_overdue,
           (
               SELECT x.status FROM bills x
               WHERE x.flat_id = f.id
               ORDER BY x.billing_month DESC
               LIMIT 1
           ) AS latest_bill_status
    FROM flats f
    LEFT JOIN blocks bl ON bl.id = f.block_id
    LEFT JOIN users o ON o.id = f.owner_id
    LEFT JOIN users r ON r.id = f.current_resident_id
"#;

fn joined_name(first: Option<String>, last: Option<String>) -> Option<String> {
    first.map(|first| crate::models::full_name(&first, last.as_deref().unwrap_or("")))
}

impl From<FlatListRow> for FlatResponse {
    fn from(row: FlatListRow) -> Self {
        let f = row.flat;
        Self {
            id: f.id,
            society: f.society_id,
            block: f.block_id,
            block_name: row.block_name,
            flat_number: f.flat_number,
            floor: f.floor,
            bhk: f.bhk,
            area_sqft: f.area_sqft,
            occupancy_status: f.occupancy_status,
            owner: f.owner_id,
            owner_name: joined_name(row.owner_first_name, row.owner_last_name),
            current_resident: f.current_resident_id,
            resident_name: joined_name(row.resident_first_name, row.resident_last_name),
            parking_slots: f.parking_slots,
            parking_numbers: f.parking_numbers,
            maintenance_status: billing_service::maintenance_status(row.has_overdue).to_string(),
            latest_bill_status: row.latest_bill_status,
            created_at: f.created_at,
            updated_at: f.updated_at,
        }
    }
}

/// Flat payload for a flat in the caller's scope.
pub(crate) async fn fetch_flat_row(
    state: &AppState,
    scope: SocietyScope,
    id: Uuid,
) -> AppResult<FlatListRow> {
    let (all, society) = scope.bind_values();
    sqlx::query_as::<_, FlatListRow>(&format!(
        "{} WHERE f.id = $1 AND ($2::bool OR f.society_id = $3)",
        FLAT_SELECT
    ))
    .bind(id)
    .bind(all)
    .bind(society)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Flat not found".to_string()))
}

async fn user_summary(state: &AppState, id: Option<Uuid>) -> AppResult<Option<UserSummary>> {
    let Some(id) = id else {
        return Ok(None);
    };
    let summary = sqlx::query_as::<_, UserSummary>(
        "SELECT id, first_name, last_name, email, phone FROM users WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(&state.pool)
    .await?;
    Ok(summary)
}

async fn flat_detail(state: &AppState, row: FlatListRow) -> AppResult<FlatDetailResponse> {
    let f = row.flat;
    let society = sqlx::query_as::<_, Society>("SELECT * FROM societies WHERE id = $1")
        .bind(f.society_id)
        .fetch_one(&state.pool)
        .await?;

    Ok(FlatDetailResponse {
        id: f.id,
        society,
        block: f.block_id,
        block_name: row.block_name,
        flat_number: f.flat_number,
        floor: f.floor,
        bhk: f.bhk,
        area_sqft: f.area_sqft,
        occupancy_status: f.occupancy_status,
        owner: user_summary(state, f.owner_id).await?,
        current_resident: user_summary(state, f.current_resident_id).await?,
        parking_slots: f.parking_slots,
        parking_numbers: f.parking_numbers,
        created_at: f.created_at,
        updated_at: f.updated_at,
    })
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FlatFilters {
    pub society: Option<Uuid>,
    pub block: Option<Uuid>,
    pub floor: Option<i32>,
    pub occupancy_status: Option<OccupancyStatus>,
    /// Matches flat number, owner or resident names
    pub search: Option<String>,
    /// `flat_number`, `floor`, prefixed with `-` for descending
    pub ordering: Option<String>,
}

/// List flats
#[utoipa::path(
    get,
    path = "/api/society/flats",
    tag = "society",
    security(("bearer_auth" = [])),
    params(PageParams, FlatFilters),
    responses((status = 200, description = "Flats", body = FlatPage))
)]
pub async fn list_flats(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(page): Query<PageParams>,
    Query(filters): Query<FlatFilters>,
) -> AppResult<Json<Paginated<FlatResponse>>> {
    authorize(&auth_user, Module::Flat, Action::List)?;

    let page = page.resolve(&state.config);
    let (all, society) = auth_user.scope().bind_values();
    let search = search_pattern(filters.search.as_deref());
    let order = order_by(
        filters.ordering.as_deref(),
        &[("flat_number", "f.flat_number"), ("floor", "f.floor")],
        "f.flat_number ASC",
    );

    let filter = r#"
        WHERE ($1::bool OR f.society_id = $2)
          AND ($3::uuid IS NULL OR f.society_id = $3)
          AND ($4::uuid IS NULL OR f.block_id = $4)
          AND ($5::int IS NULL OR f.floor = $5)
          AND ($6::occupancy_status IS NULL OR f.occupancy_status = $6)
          AND ($7::text IS NULL OR f.flat_number ILIKE $7
               OR o.first_name ILIKE $7 OR o.last_name ILIKE $7
               OR r.first_name ILIKE $7 OR r.last_name ILIKE $7)
    "#;

    let (count,): (i64,) = sqlx::query_as(&format!(
        r#"SELECT COUNT(*) FROM flats f
           LEFT JOIN users o ON o.id = f.owner_id
           LEFT JOIN users r ON r.id = f.current_resident_id
           {}"#,
        filter
    ))
    .bind(all)
    .bind(society)
    .bind(filters.society)
    .bind(filters.block)
    .bind(filters.floor)
    .bind(filters.occupancy_status)
    .bind(&search)
    .fetch_one(&state.pool)
    .await?;

    let rows = sqlx::query_as::<_, FlatListRow>(&format!(
        "{} {} ORDER BY {} LIMIT $8 OFFSET $9",
        FLAT_SELECT, filter, order
    ))
    .bind(all)
    .bind(society)
    .bind(filters.society)
    .bind(filters.block)
    .bind(filters.floor)
    .bind(filters.occupancy_status)
    .bind(&search)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(&state.pool)
    .await?;

    let results = rows.into_iter().map(FlatResponse::from).collect();
    Ok(Json(Paginated::new(results, count, page)))
}

/// Get a flat with owner, resident and society
#[utoipa::path(
    get,
    path = "/api/society/flats/{id}",
    tag = "society",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Flat ID")),
    responses(
        (status = 200, description = "Flat", body = FlatDetailResponse),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_flat(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<FlatDetailResponse>> {
    authorize(&auth_user, Module::Flat, Action::Retrieve)?;
    let row = fetch_flat_row(&state, auth_user.scope(), id).await?;
    Ok(Json(flat_detail(&state, row).await?))
}

/// Create a flat; its current-month placeholder bill is created with it
#[utoipa::path(
    post,
    path = "/api/society/flats",
    tag = "society",
    security(("bearer_auth" = [])),
    request_body = CreateFlatRequest,
    responses(
        (status = 201, description = "Created", body = FlatResponse),
        (status = 400, description = "Validation error"),
        (status = 403, description = "Admins only")
    )
)]
pub async fn create_flat(
    State(state): State<AppState>,
    auth_user: AuthUser,
    ApiJson(payload): ApiJson<CreateFlatRequest>,
) -> AppResult<(StatusCode, Json<FlatResponse>)> {
    authorize(&auth_user, Module::Flat, Action::Create)?;
    payload.validate()?;
    check_bhk(payload.bhk.as_deref())?;
    ensure_society_in_scope(auth_user.scope(), "society", payload.society)?;

    if let Some(block_id) = payload.block {
        let block = fetch_block(&state, auth_user.scope(), block_id)
            .await
            .map_err(|_| AppError::field("block", "Invalid block"))?;
        if block.society_id != payload.society {
            return Err(AppError::field("block", "Block belongs to another society"));
        }
    }
    ensure_user_exists(&state, "owner", payload.owner).await?;
    ensure_user_exists(&state, "current_resident", payload.current_resident).await?;

    let new_flat = flat_service::NewFlat {
        society_id: payload.society,
        block_id: payload.block,
        flat_number: sanitize_string(&payload.flat_number),
        floor: payload.floor,
        bhk: payload
            .bhk
            .clone()
            .unwrap_or_else(|| flat_service::DEFAULT_BHK.to_string()),
        area_sqft: payload.area_sqft,
        occupancy_status: payload.occupancy_status.unwrap_or_default(),
        owner_id: payload.owner,
        current_resident_id: payload.current_resident,
        parking_slots: payload.parking_slots.unwrap_or(0),
        parking_numbers: payload.parking_numbers.clone().unwrap_or_default(),
    };

    let mut tx = state.pool.begin().await?;
    let flat = flat_service::insert_flat(&mut tx, &new_flat).await?;
    tx.commit().await?;

    tracing::info!(flat_id = %flat.id, flat_number = %flat.flat_number, "flat created");
    let row = fetch_flat_row(&state, SocietyScope::All, flat.id).await?;
    Ok((StatusCode::CREATED, Json(row.into())))
}

/// Update a flat; `owner` or `current_resident` set to null clears them
#[utoipa::path(
    put,
    path = "/api/society/flats/{id}",
    tag = "society",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Flat ID")),
    request_body = UpdateFlatRequest,
    responses(
        (status = 200, description = "Updated", body = FlatResponse),
        (status = 404, description = "Not found")
    )
)]
pub async fn update_flat(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<UpdateFlatRequest>,
) -> AppResult<Json<FlatResponse>> {
    authorize(&auth_user, Module::Flat, Action::Update)?;
    payload.validate()?;
    check_bhk(payload.bhk.as_deref())?;

    let current = fetch_flat_row(&state, auth_user.scope(), id).await?;
    if let Some(block_id) = payload.block {
        let block = fetch_block(&state, auth_user.scope(), block_id)
            .await
            .map_err(|_| AppError::field("block", "Invalid block"))?;
        if block.society_id != current.flat.society_id {
            return Err(AppError::field("block", "Block belongs to another society"));
        }
    }
    ensure_user_exists(&state, "owner", payload.owner.flatten()).await?;
    ensure_user_exists(&state, "current_resident", payload.current_resident.flatten()).await?;

    sqlx::query(
        r#"
        UPDATE flats SET
            block_id = COALESCE($2, block_id),
            flat_number = COALESCE($3, flat_number),
            floor = COALESCE($4, floor),
            bhk = COALESCE($5, bhk),
            area_sqft = COALESCE($6, area_sqft),
            occupancy_status = COALESCE($7, occupancy_status),
            owner_id = CASE WHEN $8 THEN $9 ELSE owner_id END,
            current_resident_id = CASE WHEN $10 THEN $11 ELSE current_resident_id END,
            parking_slots = COALESCE($12, parking_slots),
            parking_numbers = COALESCE($13, parking_numbers),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(payload.block)
    .bind(payload.flat_number.as_deref().map(sanitize_string))
    .bind(payload.floor)
    .bind(&payload.bhk)
    .bind(payload.area_sqft)
    .bind(payload.occupancy_status)
    .bind(payload.owner.is_some())
    .bind(payload.owner.flatten())
    .bind(payload.current_resident.is_some())
    .bind(payload.current_resident.flatten())
    .bind(payload.parking_slots)
    .bind(&payload.parking_numbers)
    .execute(&state.pool)
    .await?;

    let row = fetch_flat_row(&state, auth_user.scope(), id).await?;
    Ok(Json(row.into()))
}

/// Delete a flat together with its bills and visitors
#[utoipa::path(
    delete,
    path = "/api/society/flats/{id}",
    tag = "society",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Flat ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_flat(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    authorize(&auth_user, Module::Flat, Action::Destroy)?;
    fetch_flat_row(&state, auth_user.scope(), id).await?;

    sqlx::query("DELETE FROM flats WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Every flat in the caller's own society
#[utoipa::path(
    get,
    path = "/api/society/flats/my_society",
    tag = "society",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Flats", body = Vec<FlatResponse>))
)]
pub async fn my_society_flats(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<Vec<FlatResponse>>> {
    authorize(&auth_user, Module::Flat, Action::MySociety)?;
    let Some(society_id) = auth_user.society_id else {
        return Ok(Json(Vec::new()));
    };

    let rows = sqlx::query_as::<_, FlatListRow>(&format!(
        "{} WHERE f.society_id = $1 ORDER BY f.flat_number",
        FLAT_SELECT
    ))
    .bind(society_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(rows.into_iter().map(FlatResponse::from).collect()))
}

/// Resident directory: occupied flats of the caller's society
#[utoipa::path(
    get,
    path = "/api/society/flats/directory",
    tag = "society",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Flats with a current resident", body = Vec<FlatDetailResponse>),
        (status = 403, description = "Admins only")
    )
)]
pub async fn directory(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<Vec<FlatDetailResponse>>> {
    authorize(&auth_user, Module::Flat, Action::Directory)?;
    let Some(society_id) = auth_user.society_id else {
        return Ok(Json(Vec::new()));
    };

    let rows = sqlx::query_as::<_, FlatListRow>(&format!(
        "{} WHERE f.society_id = $1 AND f.current_resident_id IS NOT NULL ORDER BY f.flat_number",
        FLAT_SELECT
    ))
    .bind(society_id)
    .fetch_all(&state.pool)
    .await?;

    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
        entries.push(flat_detail(&state, row).await?);
    }
    Ok(Json(entries))
}

#[derive(Debug, FromRow)]
struct DashboardRow {
    id: Uuid,
    block_id: Option<Uuid>,
    block_name: Option<String>,
    flat_number: String,
    floor: i32,
    bhk: String,
    occupancy_status: OccupancyStatus,
    has_overdue: bool,
    current_bill_id: Option<Uuid>,
    current_bill_status: Option<BillStatus>,
    resident_id: Option<Uuid>,
    resident_first_name: Option<String>,
    resident_last_name: Option<String>,
    resident_email: Option<String>,
    resident_phone: Option<String>,
    owner_id: Option<Uuid>,
    owner_first_name: Option<String>,
    owner_last_name: Option<String>,
    owner_email: Option<String>,
    owner_phone: Option<String>,
}

fn summary(
    id: Option<Uuid>,
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
) -> Option<UserSummary> {
    id.map(|id| UserSummary {
        id,
        first_name: first_name.unwrap_or_default(),
        last_name: last_name.unwrap_or_default(),
        email,
        phone: phone.unwrap_or_default(),
    })
}

impl DashboardRow {
    fn into_flat(self) -> (Option<Uuid>, DashboardFlat) {
        let flat = DashboardFlat {
            id: self.id,
            flat_number: self.flat_number,
            floor: self.floor,
            bhk: self.bhk,
            occupancy_status: self.occupancy_status,
            maintenance_status: billing_service::maintenance_status(self.has_overdue).to_string(),
            block_name: self.block_name.unwrap_or_else(|| NO_BLOCK.to_string()),
            current_bill_id: self.current_bill_id,
            current_bill_status: self.current_bill_status.unwrap_or(BillStatus::Unpaid),
            current_resident: summary(
                self.resident_id,
                self.resident_first_name,
                self.resident_last_name,
                self.resident_email,
                self.resident_phone,
            ),
            owner: summary(
                self.owner_id,
                self.owner_first_name,
                self.owner_last_name,
                self.owner_email,
                self.owner_phone,
            ),
        };
        (self.block_id, flat)
    }
}

const NO_BLOCK: &str = "No Block";

fn floors_of(flats: Vec<DashboardFlat>) -> Vec<DashboardFloor> {
    let mut by_floor: BTreeMap<i32, Vec<DashboardFlat>> = BTreeMap::new();
    for flat in flats {
        by_floor.entry(flat.floor).or_default().push(flat);
    }
    by_floor
        .into_iter()
        .rev()
        .map(|(floor, mut flats)| {
            flats.sort_by(|a, b| a.flat_number.cmp(&b.flat_number));
            DashboardFloor { floor, flats }
        })
        .collect()
}

/// Blocks in name order (empty ones included), floors top down, flats ascending.
/// Flats without a block close the list under "No Block".
fn build_dashboard(blocks: &[Block], flats: Vec<(Option<Uuid>, DashboardFlat)>) -> DashboardResponse {
    let mut by_block: BTreeMap<Option<Uuid>, Vec<DashboardFlat>> = BTreeMap::new();
    for (block_id, flat) in flats {
        by_block.entry(block_id).or_default().push(flat);
    }

    let mut result: Vec<DashboardBlock> = blocks
        .iter()
        .map(|block| DashboardBlock {
            name: block.name.clone(),
            floors: floors_of(by_block.remove(&Some(block.id)).unwrap_or_default()),
        })
        .collect();

    if let Some(unassigned) = by_block.remove(&None) {
        result.push(DashboardBlock {
            name: NO_BLOCK.to_string(),
            floors: floors_of(unassigned),
        });
    }

    DashboardResponse { blocks: result }
}

/// Apartment dashboard grouped by block and floor with maintenance status
#[utoipa::path(
    get,
    path = "/api/society/flats/dashboard",
    tag = "society",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Dashboard", body = DashboardResponse))
)]
pub async fn dashboard(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<DashboardResponse>> {
    authorize(&auth_user, Module::Flat, Action::Dashboard)?;

    let (all, society) = auth_user.scope().bind_values();
    let (billing_month, _) = billing_service::default_bill_dates(billing_service::today());

    let blocks = sqlx::query_as::<_, Block>(
        "SELECT * FROM blocks WHERE ($1::bool OR society_id = $2) ORDER BY name, created_at",
    )
    .bind(all)
    .bind(society)
    .fetch_all(&state.pool)
    .await?;

    let rows = sqlx::query_as::<_, DashboardRow>(
        r#"
        SELECT f.id, f.block_id, bl.name AS block_name, f.flat_number, f.floor, f.bhk,
               f.occupancy_status,
               EXISTS(
                   SELECT 1 FROM bills x
                   WHERE x.flat_id = f.id AND x.status <> 'PAID' AND x.due_date < CURRENT_DATE
               ) AS has_overdue,
               cb.id AS current_bill_id, cb.status AS current_bill_status,
               r.id AS resident_id, r.first_name AS resident_first_name,
               r.last_name AS resident_last_name, r.email AS resident_email,
               r.phone AS resident_phone,
               o.id AS owner_id, o.first_name AS owner_first_name,
               o.last_name AS owner_last_name, o.email AS owner_email,
               o.phone AS owner_phone
        FROM flats f
        LEFT JOIN blocks bl ON bl.id = f.block_id
        LEFT JOIN bills cb ON cb.flat_id = f.id AND cb.billing_month = $3
        LEFT JOIN users r ON r.id = f.current_resident_id
        LEFT JOIN users o ON o.id = f.owner_id
        WHERE ($1::bool OR f.society_id = $2)
        "#,
    )
    .bind(all)
    .bind(society)
    .bind(billing_month)
    .fetch_all(&state.pool)
    .await?;

    let flats = rows.into_iter().map(DashboardRow::into_flat).collect();
    Ok(Json(build_dashboard(&blocks, flats)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn block(name: &str) -> Block {
        Block {
            id: Uuid::new_v4(),
            society_id: Uuid::new_v4(),
            name: name.to_string(),
            floors: 2,
            units_per_floor: 2,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn flat(number: &str, floor: i32) -> DashboardFlat {
        DashboardFlat {
            id: Uuid::new_v4(),
            flat_number: number.to_string(),
            floor,
            bhk: "2BHK".into(),
            occupancy_status: OccupancyStatus::Vacant,
            maintenance_status: "paid".into(),
            block_name: String::new(),
            current_bill_id: None,
            current_bill_status: BillStatus::Unpaid,
            current_resident: None,
            owner: None,
        }
    }

    #[test]
    fn test_dashboard_grouping() {
        let a = block("A");
        let b = block("B");
        let flats = vec![
            (Some(a.id), flat("A-102", 1)),
            (Some(a.id), flat("A-201", 2)),
            (Some(a.id), flat("A-101", 1)),
            (None, flat("G-1", 0)),
        ];

        let dashboard = build_dashboard(&[a, b], flats);
        let names: Vec<_> = dashboard.blocks.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, ["A", "B", "No Block"]);

        let a_floors = &dashboard.blocks[0].floors;
        assert_eq!(a_floors.iter().map(|f| f.floor).collect::<Vec<_>>(), [2, 1]);
        let first_floor: Vec<_> = a_floors[1].flats.iter().map(|f| f.flat_number.as_str()).collect();
        assert_eq!(first_floor, ["A-101", "A-102"]);

        assert!(dashboard.blocks[1].floors.is_empty());
        assert_eq!(dashboard.blocks[2].floors[0].flats[0].flat_number, "G-1");
    }

    #[test]
    fn test_dashboard_without_unassigned_flats() {
        let a = block("A");
        let dashboard = build_dashboard(&[a], Vec::new());
        assert_eq!(dashboard.blocks.len(), 1);
    }

    #[test]
    fn test_joined_name() {
        assert_eq!(joined_name(Some("Asha".into()), Some("Rao".into())), Some("Asha Rao".into()));
        assert_eq!(joined_name(Some("Asha".into()), None), Some("Asha".into()));
        assert_eq!(joined_name(None, Some("Rao".into())), None);
    }

    #[test]
    fn test_society_scope_guard() {
        let mine = Uuid::new_v4();
        assert!(ensure_society_in_scope(SocietyScope::Society(mine), "society", mine).is_ok());
        assert!(matches!(
            ensure_society_in_scope(SocietyScope::Society(mine), "society", Uuid::new_v4()),
            Err(AppError::Validation(_))
        ));
        assert!(ensure_society_in_scope(SocietyScope::All, "society", mine).is_ok());
    }
}
