use std::collections::HashMap;

use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Block, Flat, OccupancyStatus};
use crate::services::billing_service;

pub const DEFAULT_BHK: &str = "2BHK";

/// Width of `flats.flat_number`.
pub const MAX_FLAT_NUMBER_LEN: usize = 20;
pub const MAX_FLOORS: i32 = 200;
/// Two digit units keep `{floor}{unit:02}` unambiguous.
pub const MAX_UNITS_PER_FLOOR: i32 = 99;

/// `{block}-{floor}{unit:02}`, e.g. `A-305`.
pub fn flat_number(block_name: &str, floor: i32, unit: i32) -> String {
    format!("{}-{}{:02}", block_name, floor, unit)
}

/// Recovers the unit of a generated flat number, given the floor it sits on.
/// Only the part after the last `-` is read, so a renamed block still parses.
pub fn parse_unit(flat_number: &str, floor: i32) -> Option<i32> {
    let (_, position) = flat_number.rsplit_once('-')?;
    position
        .strip_prefix(floor.to_string().as_str())?
        .parse()
        .ok()
}

/// Rejects block dimensions whose flats could not be numbered or stored.
pub fn check_layout(name: &str, floors: i32, units_per_floor: i32) -> AppResult<()> {
    if !(1..=MAX_FLOORS).contains(&floors) {
        return Err(AppError::field(
            "floors",
            format!("Ensure this value is between 1 and {}", MAX_FLOORS),
        ));
    }
    if !(1..=MAX_UNITS_PER_FLOOR).contains(&units_per_floor) {
        return Err(AppError::field(
            "units_per_floor",
            format!("Ensure this value is between 1 and {}", MAX_UNITS_PER_FLOOR),
        ));
    }
    let longest = flat_number(name, floors, units_per_floor);
    if longest.chars().count() > MAX_FLAT_NUMBER_LEN {
        return Err(AppError::field(
            "name",
            format!(
                "Block name is too long: flat number {} exceeds {} characters",
                longest, MAX_FLAT_NUMBER_LEN
            ),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewFlat {
    pub society_id: Uuid,
    pub block_id: Option<Uuid>,
    pub flat_number: String,
    pub floor: i32,
    pub bhk: String,
    pub area_sqft: Option<Decimal>,
    pub occupancy_status: OccupancyStatus,
    pub owner_id: Option<Uuid>,
    pub current_resident_id: Option<Uuid>,
    pub parking_slots: i32,
    pub parking_numbers: String,
}

impl NewFlat {
    fn vacant(block: &Block, floor: i32, unit: i32, bhk: &str) -> Self {
        Self {
            society_id: block.society_id,
            block_id: Some(block.id),
            flat_number: flat_number(&block.name, floor, unit),
            floor,
            bhk: bhk.to_string(),
            area_sqft: None,
            occupancy_status: OccupancyStatus::Vacant,
            owner_id: None,
            current_resident_id: None,
            parking_slots: 0,
            parking_numbers: String::new(),
        }
    }
}

/// Every flat of a block, floor by floor, units ascending.
pub fn plan_block(block: &Block, bhk: &str) -> Vec<NewFlat> {
    (1..=block.floors)
        .flat_map(|floor| (1..=block.units_per_floor).map(move |unit| (floor, unit)))
        .map(|(floor, unit)| NewFlat::vacant(block, floor, unit, bhk))
        .collect()
}

/// Layout for a block whose dimensions changed. Occupied flats keep their
/// owner, resident, occupancy and bhk when their position still exists.
pub fn plan_regeneration(block: &Block, existing: &[Flat], default_bhk: &str) -> Vec<NewFlat> {
    let occupied: HashMap<(i32, i32), &Flat> = existing
        .iter()
        .filter(|f| f.owner_id.is_some() || f.current_resident_id.is_some())
        .filter_map(|f| {
            parse_unit(&f.flat_number, f.floor).map(|unit| ((f.floor, unit), f))
        })
        .collect();

    (1..=block.floors)
        .flat_map(|floor| (1..=block.units_per_floor).map(move |unit| (floor, unit)))
        .map(|(floor, unit)| {
            let mut flat = NewFlat::vacant(block, floor, unit, default_bhk);
            if let Some(previous) = occupied.get(&(floor, unit)) {
                flat.owner_id = previous.owner_id;
                flat.current_resident_id = previous.current_resident_id;
                flat.occupancy_status = previous.occupancy_status;
                flat.bhk = previous.bhk.clone();
            }
            flat
        })
        .collect()
}

/// Inserts a flat together with its placeholder bill for the current month.
pub async fn insert_flat(conn: &mut PgConnection, flat: &NewFlat) -> AppResult<Flat> {
    let created = sqlx::query_as::<_, Flat>(
        r#"
        INSERT INTO flats (society_id, block_id, flat_number, floor, bhk, area_sqft,
                           occupancy_status, owner_id, current_resident_id,
                           parking_slots, parking_numbers)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING *
        "#,
    )
    .bind(flat.society_id)
    .bind(flat.block_id)
    .bind(&flat.flat_number)
    .bind(flat.floor)
    .bind(&flat.bhk)
    .bind(flat.area_sqft)
    .bind(flat.occupancy_status)
    .bind(flat.owner_id)
    .bind(flat.current_resident_id)
    .bind(flat.parking_slots)
    .bind(&flat.parking_numbers)
    .fetch_one(&mut *conn)
    .await?;

    billing_service::create_default_bill(conn, created.society_id, created.id).await?;
    Ok(created)
}

pub async fn create_with_flats(
    pool: &PgPool,
    society_id: Uuid,
    name: &str,
    floors: i32,
    units_per_floor: i32,
    bhk: &str,
) -> AppResult<(Block, usize)> {
    let mut tx = pool.begin().await?;

    let block = sqlx::query_as::<_, Block>(
        r#"
        INSERT INTO blocks (society_id, name, floors, units_per_floor)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(society_id)
    .bind(name)
    .bind(floors)
    .bind(units_per_floor)
    .fetch_one(&mut *tx)
    .await?;

    let plan = plan_block(&block, bhk);
    for flat in &plan {
        insert_flat(&mut tx, flat).await?;
    }

    tx.commit().await?;

    tracing::info!(block_id = %block.id, flats = plan.len(), "block created with flats");
    Ok((block, plan.len()))
}

pub async fn regenerate_flats(pool: &PgPool, block: &Block) -> AppResult<usize> {
    let mut tx = pool.begin().await?;

    let existing = sqlx::query_as::<_, Flat>(
        "SELECT * FROM flats WHERE block_id = $1 ORDER BY floor, flat_number FOR UPDATE",
    )
    .bind(block.id)
    .fetch_all(&mut *tx)
    .await?;

    let default_bhk = existing
        .first()
        .map(|f| f.bhk.clone())
        .unwrap_or_else(|| DEFAULT_BHK.to_string());
    let plan = plan_regeneration(block, &existing, &default_bhk);

    sqlx::query("DELETE FROM flats WHERE block_id = $1")
        .bind(block.id)
        .execute(&mut *tx)
        .await?;

    for flat in &plan {
        insert_flat(&mut tx, flat).await?;
    }

    tx.commit().await?;

    tracing::info!(
        block_id = %block.id,
        removed = existing.len(),
        created = plan.len(),
        "flats regenerated"
    );
    Ok(plan.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn block(name: &str, floors: i32, units: i32) -> Block {
        Block {
            id: Uuid::new_v4(),
            society_id: Uuid::new_v4(),
            name: name.to_string(),
            floors,
            units_per_floor: units,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn flat_from(new: &NewFlat) -> Flat {
        Flat {
            id: Uuid::new_v4(),
            society_id: new.society_id,
            block_id: new.block_id,
            flat_number: new.flat_number.clone(),
            floor: new.floor,
            bhk: new.bhk.clone(),
            area_sqft: None,
            occupancy_status: new.occupancy_status,
            owner_id: new.owner_id,
            current_resident_id: new.current_resident_id,
            parking_slots: 0,
            parking_numbers: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_flat_number() {
        assert_eq!(flat_number("A", 1, 1), "A-101");
        assert_eq!(flat_number("A", 3, 12), "A-312");
        assert_eq!(flat_number("Tower", 12, 4), "Tower-1204");
    }

    #[test]
    fn test_parse_unit() {
        assert_eq!(parse_unit("A-101", 1), Some(1));
        assert_eq!(parse_unit("A-1204", 12), Some(4));
        assert_eq!(parse_unit("North-Wing-305", 3), Some(5));
        assert_eq!(parse_unit("A-101", 2), None);
        assert_eq!(parse_unit("G1", 1), None);
    }

    #[test]
    fn test_check_layout() {
        assert!(check_layout("A", 12, 4).is_ok());
        assert!(check_layout("Sunrise Tower", 200, 99).is_ok());

        let field_of = |r: AppResult<()>| match r {
            Err(AppError::Validation(fields)) => fields.keys().next().cloned(),
            _ => None,
        };
        // Sunrise Tower East-101 is 22 characters
        assert_eq!(field_of(check_layout("Sunrise Tower East", 1, 1)), Some("name".into()));
        assert_eq!(field_of(check_layout("A", 201, 1)), Some("floors".into()));
        assert_eq!(field_of(check_layout("A", 11, 101)), Some("units_per_floor".into()));
        assert_eq!(field_of(check_layout("A", 0, 4)), Some("floors".into()));
    }

    #[test]
    fn test_plan_block_layout() {
        let b = block("B", 2, 3);
        let plan = plan_block(&b, DEFAULT_BHK);
        let numbers: Vec<_> = plan.iter().map(|f| f.flat_number.as_str()).collect();
        assert_eq!(numbers, ["B-101", "B-102", "B-103", "B-201", "B-202", "B-203"]);
        assert!(plan.iter().all(|f| f.occupancy_status == OccupancyStatus::Vacant));
        assert!(plan.iter().all(|f| f.block_id == Some(b.id) && f.bhk == "2BHK"));
        assert_eq!(plan[4].floor, 2);
    }

    #[test]
    fn test_regeneration_keeps_occupied_positions() {
        let old = block("C", 2, 2);
        let owner = Uuid::new_v4();
        let resident = Uuid::new_v4();

        let mut existing: Vec<Flat> = plan_block(&old, "3BHK").iter().map(flat_from).collect();
        // C-102 is owned and let out, C-202 only has an owner
        existing[1].owner_id = Some(owner);
        existing[1].current_resident_id = Some(resident);
        existing[1].occupancy_status = OccupancyStatus::Tenant;
        existing[1].bhk = "2.5BHK".into();
        existing[3].owner_id = Some(owner);
        existing[3].occupancy_status = OccupancyStatus::Owner;

        // shrink to one floor, grow to three units
        let resized = Block { floors: 1, units_per_floor: 3, ..old };
        let plan = plan_regeneration(&resized, &existing, "3BHK");

        assert_eq!(plan.len(), 3);
        let kept = plan.iter().find(|f| f.flat_number == "C-102").unwrap();
        assert_eq!(kept.owner_id, Some(owner));
        assert_eq!(kept.current_resident_id, Some(resident));
        assert_eq!(kept.occupancy_status, OccupancyStatus::Tenant);
        assert_eq!(kept.bhk, "2.5BHK");

        let fresh = plan.iter().find(|f| f.flat_number == "C-103").unwrap();
        assert_eq!(fresh.occupancy_status, OccupancyStatus::Vacant);
        assert_eq!(fresh.owner_id, None);
        assert_eq!(fresh.bhk, "3BHK");

        assert!(plan.iter().all(|f| f.flat_number != "C-202"));
    }

    #[test]
    fn test_regeneration_survives_rename() {
        let old = block("A", 1, 2);
        let owner = Uuid::new_v4();
        let mut existing: Vec<Flat> = plan_block(&old, DEFAULT_BHK).iter().map(flat_from).collect();
        for flat in &mut existing {
            flat.owner_id = Some(owner);
            flat.occupancy_status = OccupancyStatus::Owner;
        }

        let renamed = Block { name: "Tower A".into(), ..old };
        let plan = plan_regeneration(&renamed, &existing, DEFAULT_BHK);

        let numbers: Vec<_> = plan.iter().map(|f| f.flat_number.as_str()).collect();
        assert_eq!(numbers, ["Tower A-101", "Tower A-102"]);
        assert!(plan.iter().all(|f| f.owner_id == Some(owner)));
        assert!(plan.iter().all(|f| f.occupancy_status == OccupancyStatus::Owner));
    }
}
