//! HTTP handlers for the stock ledger, initial states and stock queries

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::{check_permission, CurrentUser};
use crate::models::{InventoryCount, StockMovement, StockSnapshot, TankInitialState};
use crate::services::initial_state::{
    CorrectInitialStateInput, CreateInitialStateInput, InitialStateService, Mutability,
};
use crate::services::stock_ledger::{
    AppendMovementInput, CancelMovementsInput, CancellationResult, CurrentStock,
    MovementHistoryQuery, RecordInventoryCountInput, StockLedgerService,
};
use crate::services::stock_query::{LowStockAlert, StockAtQuery, StockQueryService, VarianceReport};
use crate::AppState;
use shared::PaginatedResponse;

#[derive(Debug, Deserialize)]
pub struct AlertsQuery {
    pub station_id: Option<Uuid>,
}

/// Get a tank's initial state
pub async fn get_initial_state(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(tank_id): Path<Uuid>,
) -> AppResult<Json<TankInitialState>> {
    check_permission(&current_user.0, "stock", "read")?;
    let service = InitialStateService::new(state.db.clone(), state.audit());
    let initial = service.get(current_user.0.company_id, tank_id).await?;
    Ok(Json(initial))
}

/// Create a tank's initial state
pub async fn create_initial_state(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(tank_id): Path<Uuid>,
    Json(input): Json<CreateInitialStateInput>,
) -> AppResult<(StatusCode, Json<TankInitialState>)> {
    check_permission(&current_user.0, "stock", "write")?;
    let service = InitialStateService::new(state.db.clone(), state.audit());
    let initial = service
        .create(current_user.0.company_id, current_user.0.user_id, tank_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(initial)))
}

/// Correct a tank's initial state
pub async fn correct_initial_state(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(tank_id): Path<Uuid>,
    Json(input): Json<CorrectInitialStateInput>,
) -> AppResult<Json<TankInitialState>> {
    check_permission(&current_user.0, "stock", "admin")?;
    let service = InitialStateService::new(state.db.clone(), state.audit());
    let initial = service
        .correct(current_user.0.company_id, current_user.0.user_id, tank_id, input)
        .await?;
    Ok(Json(initial))
}

/// Delete a tank's initial state
pub async fn delete_initial_state(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(tank_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    check_permission(&current_user.0, "stock", "admin")?;
    let service = InitialStateService::new(state.db.clone(), state.audit());
    service
        .delete(current_user.0.company_id, current_user.0.user_id, tank_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Whether the initial state can still be changed
pub async fn get_mutability(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(tank_id): Path<Uuid>,
) -> AppResult<Json<Mutability>> {
    check_permission(&current_user.0, "stock", "read")?;
    let service = InitialStateService::new(state.db.clone(), state.audit());
    let mutability = service
        .mutability(current_user.0.company_id, tank_id)
        .await?;
    Ok(Json(mutability))
}

/// Append a movement to a tank's ledger
pub async fn append_movement(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(tank_id): Path<Uuid>,
    Json(input): Json<AppendMovementInput>,
) -> AppResult<(StatusCode, Json<StockMovement>)> {
    check_permission(&current_user.0, "stock", "write")?;
    let service = StockLedgerService::new(state.db.clone(), state.audit());
    let movement = service
        .append(current_user.0.company_id, current_user.0.user_id, tank_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(movement)))
}

/// Movement history of a tank
pub async fn list_movements(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(tank_id): Path<Uuid>,
    Query(query): Query<MovementHistoryQuery>,
) -> AppResult<Json<PaginatedResponse<StockMovement>>> {
    check_permission(&current_user.0, "stock", "read")?;
    let service = StockLedgerService::new(state.db.clone(), state.audit());
    let movements = service
        .list_movements(current_user.0.company_id, tank_id, query)
        .await?;
    Ok(Json(movements))
}

/// Current stock of a tank
pub async fn current_stock(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(tank_id): Path<Uuid>,
) -> AppResult<Json<CurrentStock>> {
    check_permission(&current_user.0, "stock", "read")?;
    let service = StockLedgerService::new(state.db.clone(), state.audit());
    let stock = service
        .current_stock(current_user.0.company_id, tank_id)
        .await?;
    Ok(Json(stock))
}

/// Theoretical stock of a tank at a point in time
pub async fn stock_at(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(tank_id): Path<Uuid>,
    Query(query): Query<StockAtQuery>,
) -> AppResult<Json<StockSnapshot>> {
    check_permission(&current_user.0, "stock", "read")?;
    let service = StockQueryService::new(state.db.clone(), state.config.stock.clone());
    let snapshot = service
        .theoretical_stock_at(current_user.0.company_id, tank_id, query.as_of)
        .await?;
    Ok(Json(snapshot))
}

/// Record a physical gauge reading
pub async fn record_inventory_count(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(tank_id): Path<Uuid>,
    Json(input): Json<RecordInventoryCountInput>,
) -> AppResult<(StatusCode, Json<InventoryCount>)> {
    check_permission(&current_user.0, "stock", "write")?;
    let service = StockLedgerService::new(state.db.clone(), state.audit());
    let count = service
        .record_inventory_count(current_user.0.company_id, current_user.0.user_id, tank_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(count)))
}

/// Append the inverse of a movement
pub async fn compensate_movement(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(movement_id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<StockMovement>)> {
    check_permission(&current_user.0, "stock", "write")?;
    let service = StockLedgerService::new(state.db.clone(), state.audit());
    let movement = service
        .compensate(current_user.0.company_id, current_user.0.user_id, movement_id)
        .await?;
    Ok((StatusCode::CREATED, Json(movement)))
}

/// Cancel every movement carrying an origin reference
pub async fn cancel_movements(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CancelMovementsInput>,
) -> AppResult<Json<CancellationResult>> {
    check_permission(&current_user.0, "stock", "write")?;
    let service = StockLedgerService::new(state.db.clone(), state.audit());
    let result = service
        .cancel_movements_for(current_user.0.company_id, current_user.0.user_id, input)
        .await?;
    Ok(Json(result))
}

/// Delivery variance against its purchase order
pub async fn delivery_variance(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(delivery_id): Path<Uuid>,
) -> AppResult<Json<VarianceReport>> {
    check_permission(&current_user.0, "stock", "read")?;
    let service = StockQueryService::new(state.db.clone(), state.config.stock.clone());
    let report = service
        .delivery_variance(current_user.0.company_id, delivery_id)
        .await?;
    Ok(Json(report))
}

/// Tanks at or below their stock threshold
pub async fn low_stock_alerts(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<AlertsQuery>,
) -> AppResult<Json<Vec<LowStockAlert>>> {
    check_permission(&current_user.0, "stock", "read")?;
    let service = StockQueryService::new(state.db.clone(), state.config.stock.clone());
    let alerts = service
        .low_stock_alerts(current_user.0.company_id, query.station_id)
        .await?;
    Ok(Json(alerts))
}
