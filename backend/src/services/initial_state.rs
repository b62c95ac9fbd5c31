//! Initial state service
//!
//! Creates the one-time starting point of a tank's stock history and guards
//! every later change to it. A correction never edits ledger rows in place:
//! it books a compensating negative adjustment and a fresh initial stock
//! entry, then retires the superseded pair so the tank stays correctable
//! until real activity is recorded.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{CachedTankStock, MovementKind, Tank, TankInitialState};
use crate::services::audit::{AuditEvent, AuditService};
use crate::services::stock_ledger::{fetch_cache, insert_movement, ledger_head, write_cache};
use crate::services::tank::{fetch_tank, TankService};
use shared::{
    plan_from, plan_movement, validate_gauge_height, validate_price, validate_threshold,
    MovementRequest, MutationCensus, StockError, INITIAL_STATE_ORIGIN,
};

/// Initial state service for creating, correcting and deleting starting points
#[derive(Clone)]
pub struct InitialStateService {
    db: PgPool,
    audit: AuditService,
}

#[derive(Debug, FromRow)]
struct InitialStateRow {
    id: Uuid,
    tank_id: Uuid,
    gauge_height: Decimal,
    computed_volume: Decimal,
    initialized_at: DateTime<Utc>,
    recorded_by: Uuid,
    updated_at: Option<DateTime<Utc>>,
    updated_by: Option<Uuid>,
}

impl From<InitialStateRow> for TankInitialState {
    fn from(row: InitialStateRow) -> Self {
        TankInitialState {
            id: row.id,
            tank_id: row.tank_id,
            gauge_height: row.gauge_height,
            computed_volume: row.computed_volume,
            initialized_at: row.initialized_at,
            recorded_by: row.recorded_by,
            locked: false,
            updated_at: row.updated_at,
            updated_by: row.updated_by,
        }
    }
}

/// Input for creating an initial state
#[derive(Debug, Deserialize)]
pub struct CreateInitialStateInput {
    pub gauge_height: Decimal,
    /// Defaults to now
    pub initialized_at: Option<DateTime<Utc>>,
    pub min_stock_threshold: Option<Decimal>,
}

/// Input for correcting an initial state
#[derive(Debug, Default, Deserialize)]
pub struct CorrectInitialStateInput {
    pub gauge_height: Option<Decimal>,
    pub min_stock_threshold: Option<Decimal>,
    /// Used when no fuel price is recorded for the tank
    pub unit_cost: Option<Decimal>,
    pub sale_price: Option<Decimal>,
}

/// Whether the initial state may still be changed, and why
#[derive(Debug, Clone, Serialize)]
pub struct Mutability {
    pub tank_id: Uuid,
    pub can_mutate: bool,
    pub movement_count: i64,
    pub bookkeeping_count: i64,
}

impl InitialStateService {
    /// Create a new InitialStateService instance
    pub fn new(db: PgPool, audit: AuditService) -> Self {
        Self { db, audit }
    }

    /// Get the initial state with its derived lock flag
    pub async fn get(&self, company_id: Uuid, tank_id: Uuid) -> AppResult<TankInitialState> {
        let mut conn = self.db.acquire().await?;
        fetch_tank(&mut *conn, company_id, tank_id).await?;

        let mut state = fetch_initial_state(&mut conn, tank_id)
            .await?
            .ok_or(AppError::NotConfigured(tank_id))?;
        state.locked = !census(&mut conn, tank_id).await?.permits_mutation();

        Ok(state)
    }

    /// Record the starting gauge reading of a tank
    pub async fn create(
        &self,
        company_id: Uuid,
        user_id: Uuid,
        tank_id: Uuid,
        input: CreateInitialStateInput,
    ) -> AppResult<TankInitialState> {
        validate_threshold("min_stock_threshold", input.min_stock_threshold)?;

        let mut tx = self.db.begin().await?;
        let tank = TankService::lock_tank(&mut tx, company_id, tank_id).await?;

        if fetch_initial_state(&mut tx, tank_id).await?.is_some() {
            return Err(StockError::AlreadyInitialized { tank_id }.into());
        }

        let volume = volume_for(&tank, input.gauge_height)?;
        let initialized_at = input.initialized_at.unwrap_or_else(Utc::now);

        let row = sqlx::query_as::<_, InitialStateRow>(
            r#"
            INSERT INTO tank_initial_states (tank_id, gauge_height, computed_volume, initialized_at, recorded_by)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, tank_id, gauge_height, computed_volume, initialized_at, recorded_by,
                      updated_at, updated_by
            "#,
        )
        .bind(tank_id)
        .bind(input.gauge_height)
        .bind(volume)
        .bind(initialized_at)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        book_initial_stock(&mut tx, &tank, volume, initialized_at, user_id).await?;

        let price = TankService::fuel_price(&mut tx, &tank).await?;
        write_cache(
            &mut tx,
            &CachedTankStock {
                tank_id,
                theoretical_quantity: volume,
                real_quantity: Some(volume),
                last_calculated_at: Utc::now(),
                weighted_average_cost: price.as_ref().map(|p| p.purchase_price),
                sale_price: price.as_ref().map(|p| p.sale_price),
                min_stock_threshold: input.min_stock_threshold,
            },
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            %tank_id,
            gauge_height = %input.gauge_height,
            volume = %volume,
            "Initial state created"
        );

        let state = TankInitialState::from(row);
        self.audit.record(AuditEvent::new(
            company_id,
            user_id,
            "create",
            "tank_initial_state",
            Some(state.id),
            serde_json::json!({
                "tank_id": tank_id,
                "gauge_height": state.gauge_height,
                "computed_volume": state.computed_volume,
            }),
        ));

        Ok(state)
    }

    /// Movement counts behind the mutation guard
    pub async fn mutability(&self, company_id: Uuid, tank_id: Uuid) -> AppResult<Mutability> {
        let mut conn = self.db.acquire().await?;
        fetch_tank(&mut *conn, company_id, tank_id).await?;
        let census = census(&mut conn, tank_id).await?;

        Ok(Mutability {
            tank_id,
            can_mutate: census.permits_mutation(),
            movement_count: census.total,
            bookkeeping_count: census.bookkeeping,
        })
    }

    /// Correct the initial state while only its own bookkeeping entry exists
    pub async fn correct(
        &self,
        company_id: Uuid,
        user_id: Uuid,
        tank_id: Uuid,
        input: CorrectInitialStateInput,
    ) -> AppResult<TankInitialState> {
        validate_threshold("min_stock_threshold", input.min_stock_threshold)?;
        validate_price("unit_cost", input.unit_cost)?;
        validate_price("sale_price", input.sale_price)?;

        let mut tx = self.db.begin().await?;
        let tank = TankService::lock_tank(&mut tx, company_id, tank_id).await?;

        let initial = fetch_initial_state(&mut tx, tank_id)
            .await?
            .ok_or(AppError::NotConfigured(tank_id))?;

        let census = census(&mut tx, tank_id).await?;
        if let Err(e) = census.ensure_mutable(tank_id) {
            tracing::warn!(
                %tank_id,
                movement_count = census.total,
                bookkeeping_count = census.bookkeeping,
                "Initial state correction refused"
            );
            return Err(e.into());
        }

        let now = Utc::now();
        let mut volume = initial.computed_volume;

        if let Some(height) = input.gauge_height {
            volume = volume_for(&tank, height)?;

            let mut superseded = sqlx::query_scalar::<_, Uuid>(
                "SELECT id FROM stock_movements WHERE tank_id = $1 AND status = 'validated'",
            )
            .bind(tank_id)
            .fetch_all(&mut *tx)
            .await?;

            // Compensating entry for the full previous volume
            if initial.computed_volume > Decimal::ZERO {
                let head = ledger_head(&mut tx, &tank).await?;
                let effect = plan_movement(
                    &head,
                    MovementKind::NegativeAdjustment,
                    initial.computed_volume,
                )?;
                let request = MovementRequest::new(
                    MovementKind::NegativeAdjustment,
                    initial.computed_volume,
                    now,
                    INITIAL_STATE_ORIGIN,
                    "correction",
                    user_id,
                );
                let reversal = insert_movement(&mut tx, tank_id, &request, effect).await?;
                superseded.push(reversal.id);
            }

            // The replacement entry stands for the same starting point
            book_initial_stock(&mut tx, &tank, volume, initial.initialized_at, user_id).await?;

            // The superseded pair stays in the history but leaves the census
            sqlx::query("UPDATE stock_movements SET status = 'cancelled' WHERE id = ANY($1)")
                .bind(&superseded)
                .execute(&mut *tx)
                .await?;

            sqlx::query(
                "UPDATE tank_initial_states SET gauge_height = $1, computed_volume = $2 WHERE id = $3",
            )
            .bind(height)
            .bind(volume)
            .bind(initial.id)
            .execute(&mut *tx)
            .await?;
        }

        let row = sqlx::query_as::<_, InitialStateRow>(
            r#"
            UPDATE tank_initial_states
            SET updated_at = $1, updated_by = $2
            WHERE id = $3
            RETURNING id, tank_id, gauge_height, computed_volume, initialized_at, recorded_by,
                      updated_at, updated_by
            "#,
        )
        .bind(now)
        .bind(user_id)
        .bind(initial.id)
        .fetch_one(&mut *tx)
        .await?;

        let previous = fetch_cache(&mut tx, tank_id).await?;
        let price = TankService::fuel_price(&mut tx, &tank).await?;
        let (unit_cost, sale_price) = match &price {
            Some(p) => (Some(p.purchase_price), Some(p.sale_price)),
            None => (input.unit_cost, input.sale_price),
        };
        if price.is_none() {
            tracing::debug!(%tank_id, "No fuel price recorded, using supplied values");
        }

        write_cache(
            &mut tx,
            &CachedTankStock {
                tank_id,
                theoretical_quantity: volume,
                real_quantity: Some(volume),
                last_calculated_at: now,
                weighted_average_cost: unit_cost
                    .or_else(|| previous.as_ref().and_then(|c| c.weighted_average_cost)),
                sale_price: sale_price.or_else(|| previous.as_ref().and_then(|c| c.sale_price)),
                min_stock_threshold: input
                    .min_stock_threshold
                    .or_else(|| previous.as_ref().and_then(|c| c.min_stock_threshold)),
            },
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            %tank_id,
            previous_volume = %initial.computed_volume,
            volume = %volume,
            "Initial state corrected"
        );

        let state = TankInitialState::from(row);
        self.audit.record(AuditEvent::new(
            company_id,
            user_id,
            "correct",
            "tank_initial_state",
            Some(state.id),
            serde_json::json!({
                "tank_id": tank_id,
                "previous_gauge_height": initial.gauge_height,
                "previous_volume": initial.computed_volume,
                "gauge_height": state.gauge_height,
                "computed_volume": state.computed_volume,
            }),
        ));

        Ok(state)
    }

    /// Delete the initial state with its bookkeeping entries and cached stock
    pub async fn delete(&self, company_id: Uuid, user_id: Uuid, tank_id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;
        TankService::lock_tank(&mut tx, company_id, tank_id).await?;

        let initial = fetch_initial_state(&mut tx, tank_id)
            .await?
            .ok_or(AppError::NotConfigured(tank_id))?;
        census(&mut tx, tank_id).await?.ensure_mutable(tank_id)?;

        let removed = sqlx::query(
            r#"
            DELETE FROM stock_movements
            WHERE tank_id = $1
              AND kind IN ('initial_stock', 'positive_adjustment', 'negative_adjustment')
            "#,
        )
        .bind(tank_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query("DELETE FROM cached_tank_stocks WHERE tank_id = $1")
            .bind(tank_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM tank_initial_states WHERE id = $1")
            .bind(initial.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(%tank_id, removed_movements = removed, "Initial state deleted");

        self.audit.record(AuditEvent::new(
            company_id,
            user_id,
            "delete",
            "tank_initial_state",
            Some(initial.id),
            serde_json::json!({
                "tank_id": tank_id,
                "gauge_height": initial.gauge_height,
                "computed_volume": initial.computed_volume,
            }),
        ));

        Ok(())
    }
}

pub(crate) async fn fetch_initial_state(
    conn: &mut PgConnection,
    tank_id: Uuid,
) -> AppResult<Option<TankInitialState>> {
    let row = sqlx::query_as::<_, InitialStateRow>(
        r#"
        SELECT id, tank_id, gauge_height, computed_volume, initialized_at, recorded_by,
               updated_at, updated_by
        FROM tank_initial_states
        WHERE tank_id = $1
        "#,
    )
    .bind(tank_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(TankInitialState::from))
}

/// Active movement counts for the mutation guard
pub(crate) async fn census(conn: &mut PgConnection, tank_id: Uuid) -> AppResult<MutationCensus> {
    let (total, bookkeeping) = sqlx::query_as::<_, (i64, i64)>(
        r#"
        SELECT
            COUNT(*) FILTER (WHERE status = 'validated'),
            COUNT(*) FILTER (
                WHERE status = 'validated'
                  AND kind IN ('initial_stock', 'positive_adjustment', 'negative_adjustment')
            )
        FROM stock_movements
        WHERE tank_id = $1
        "#,
    )
    .bind(tank_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(MutationCensus { total, bookkeeping })
}

fn volume_for(tank: &Tank, gauge_height: Decimal) -> AppResult<Decimal> {
    let curve = tank.curve()?;
    validate_gauge_height(gauge_height, curve)?;

    let volume = curve.volume_at(gauge_height);
    if volume > tank.capacity {
        return Err(StockError::validation(
            "gauge_height",
            format!(
                "computed volume {} L exceeds tank capacity {} L",
                volume, tank.capacity
            ),
        )
        .into());
    }

    Ok(volume)
}

/// Write the synthetic initial stock entry, always counted from an empty tank
async fn book_initial_stock(
    conn: &mut PgConnection,
    tank: &Tank,
    volume: Decimal,
    at: DateTime<Utc>,
    user_id: Uuid,
) -> AppResult<()> {
    let effect = plan_from(
        tank.id,
        tank.capacity,
        Decimal::ZERO,
        MovementKind::InitialStock,
        volume,
    )?;
    let request = MovementRequest::new(
        MovementKind::InitialStock,
        volume,
        at,
        INITIAL_STATE_ORIGIN,
        tank.id.to_string(),
        user_id,
    );
    insert_movement(conn, tank.id, &request, effect).await?;
    Ok(())
}
