//! HTTP handlers for tank management and calibration lookups

use axum::{
    extract::{Path, Query, State},
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::{check_permission, CurrentUser};
use crate::models::Tank;
use crate::services::tank::{CalibrationConversion, CreateTankInput, TankService, UpdateTankInput};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListTanksQuery {
    pub station_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct HeightQuery {
    pub height: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct VolumeQuery {
    pub volume: Decimal,
}

/// List tanks
pub async fn list_tanks(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<ListTanksQuery>,
) -> AppResult<Json<Vec<Tank>>> {
    check_permission(&current_user.0, "tanks", "read")?;
    let service = TankService::new(state.db);
    let tanks = service
        .list_tanks(current_user.0.company_id, query.station_id)
        .await?;
    Ok(Json(tanks))
}

/// Provision a tank
pub async fn create_tank(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateTankInput>,
) -> AppResult<Json<Tank>> {
    check_permission(&current_user.0, "tanks", "write")?;
    let service = TankService::new(state.db);
    let tank = service.create_tank(current_user.0.company_id, input).await?;
    Ok(Json(tank))
}

/// Get a tank
pub async fn get_tank(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(tank_id): Path<Uuid>,
) -> AppResult<Json<Tank>> {
    check_permission(&current_user.0, "tanks", "read")?;
    let service = TankService::new(state.db);
    let tank = service.get_tank(current_user.0.company_id, tank_id).await?;
    Ok(Json(tank))
}

/// Update a tank
pub async fn update_tank(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(tank_id): Path<Uuid>,
    Json(input): Json<UpdateTankInput>,
) -> AppResult<Json<Tank>> {
    check_permission(&current_user.0, "tanks", "write")?;
    let service = TankService::new(state.db);
    let tank = service
        .update_tank(current_user.0.company_id, tank_id, input)
        .await?;
    Ok(Json(tank))
}

/// Convert a gauge height to a volume
pub async fn volume_at(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(tank_id): Path<Uuid>,
    Query(query): Query<HeightQuery>,
) -> AppResult<Json<CalibrationConversion>> {
    check_permission(&current_user.0, "tanks", "read")?;
    let service = TankService::new(state.db);
    let conversion = service
        .volume_at(current_user.0.company_id, tank_id, query.height)
        .await?;
    Ok(Json(conversion))
}

/// Convert a volume to a gauge height
pub async fn height_at(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(tank_id): Path<Uuid>,
    Query(query): Query<VolumeQuery>,
) -> AppResult<Json<CalibrationConversion>> {
    check_permission(&current_user.0, "tanks", "read")?;
    let service = TankService::new(state.db);
    let conversion = service
        .height_at(current_user.0.company_id, tank_id, query.volume)
        .await?;
    Ok(Json(conversion))
}
