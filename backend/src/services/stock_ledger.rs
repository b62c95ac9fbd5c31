//! Stock movement ledger service
//!
//! The only place where a tank's stock changes are recorded. Every write
//! locks the tank row, re-reads the latest active movement inside the same
//! transaction, plans the movement with the shared ledger rules and then
//! writes the movement and the cached stock row together.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::{CachedTankStock, InventoryCount, MovementKind, StockMovement, Tank};
use crate::services::audit::{AuditEvent, AuditService};
use crate::services::initial_state::fetch_initial_state;
use crate::services::tank::{fetch_tank, TankService};
use shared::{
    compensation_for, plan_movement, refresh_cache, validate_gauge_height, validate_origin,
    validate_price, LedgerHead, MovementEffect, MovementRequest, PaginatedResponse, Pagination,
    StockError, COMPENSATION_ORIGIN,
};

/// Stock ledger service for appending, cancelling and compensating movements
#[derive(Clone)]
pub struct StockLedgerService {
    db: PgPool,
    audit: AuditService,
}

pub(crate) const MOVEMENT_COLUMNS: &str = "id, tank_id, sequence, kind, quantity, movement_at, \
     stock_before, stock_after, unit_cost, recorded_by, origin_module, origin_reference, \
     status, delivery_id, sale_id, inventory_count_id, created_at";

/// Row for movement queries
#[derive(Debug, FromRow)]
pub(crate) struct StockMovementRow {
    id: Uuid,
    tank_id: Uuid,
    sequence: i64,
    kind: String,
    quantity: Decimal,
    movement_at: DateTime<Utc>,
    stock_before: Decimal,
    stock_after: Decimal,
    unit_cost: Option<Decimal>,
    recorded_by: Uuid,
    origin_module: String,
    origin_reference: String,
    status: String,
    delivery_id: Option<Uuid>,
    sale_id: Option<Uuid>,
    inventory_count_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl StockMovementRow {
    pub(crate) fn into_movement(self) -> AppResult<StockMovement> {
        Ok(StockMovement {
            id: self.id,
            tank_id: self.tank_id,
            sequence: self.sequence,
            kind: self.kind.parse()?,
            quantity: self.quantity,
            movement_at: self.movement_at,
            stock_before: self.stock_before,
            stock_after: self.stock_after,
            unit_cost: self.unit_cost,
            recorded_by: self.recorded_by,
            origin_module: self.origin_module,
            origin_reference: self.origin_reference,
            status: self.status.parse()?,
            delivery_id: self.delivery_id,
            sale_id: self.sale_id,
            inventory_count_id: self.inventory_count_id,
            created_at: self.created_at,
        })
    }
}

/// Row for the cached stock
#[derive(Debug, FromRow)]
struct CachedStockRow {
    tank_id: Uuid,
    theoretical_quantity: Decimal,
    real_quantity: Option<Decimal>,
    last_calculated_at: DateTime<Utc>,
    weighted_average_cost: Option<Decimal>,
    sale_price: Option<Decimal>,
    min_stock_threshold: Option<Decimal>,
}

impl From<CachedStockRow> for CachedTankStock {
    fn from(row: CachedStockRow) -> Self {
        CachedTankStock {
            tank_id: row.tank_id,
            theoretical_quantity: row.theoretical_quantity,
            real_quantity: row.real_quantity,
            last_calculated_at: row.last_calculated_at,
            weighted_average_cost: row.weighted_average_cost,
            sale_price: row.sale_price,
            min_stock_threshold: row.min_stock_threshold,
        }
    }
}

/// Input for appending a movement
#[derive(Debug, Deserialize, Validate)]
pub struct AppendMovementInput {
    /// One of the movement kinds; checked by the ledger, not by serde
    pub kind: String,
    pub quantity: Decimal,
    /// Defaults to now
    pub movement_at: Option<DateTime<Utc>>,
    #[validate(length(min = 1, max = 64))]
    pub origin_module: String,
    #[validate(length(min = 1, max = 128))]
    pub origin_reference: String,
    pub unit_cost: Option<Decimal>,
    pub delivery_id: Option<Uuid>,
    pub sale_id: Option<Uuid>,
    pub inventory_count_id: Option<Uuid>,
}

impl AppendMovementInput {
    fn into_request(self, recorded_by: Uuid) -> AppResult<MovementRequest> {
        self.validate()?;
        validate_origin(&self.origin_module, &self.origin_reference)?;
        validate_price("unit_cost", self.unit_cost)?;

        let kind: MovementKind = self.kind.parse()?;
        if kind == MovementKind::InitialStock {
            return Err(StockError::validation(
                "kind",
                "initial_stock movements are written by the initial-state operations",
            )
            .into());
        }

        Ok(MovementRequest {
            kind,
            quantity: self.quantity,
            movement_at: self.movement_at.unwrap_or_else(Utc::now),
            origin_module: self.origin_module,
            origin_reference: self.origin_reference,
            recorded_by,
            unit_cost: self.unit_cost,
            delivery_id: self.delivery_id,
            sale_id: self.sale_id,
            inventory_count_id: self.inventory_count_id,
        })
    }
}

/// Input for cancelling movements by origin
#[derive(Debug, Deserialize, Validate)]
pub struct CancelMovementsInput {
    #[validate(length(min = 1, max = 128))]
    pub origin_reference: String,
}

/// Input for recording a physical gauge reading
#[derive(Debug, Deserialize)]
pub struct RecordInventoryCountInput {
    pub gauge_height: Decimal,
    /// Defaults to now
    pub counted_at: Option<DateTime<Utc>>,
    /// Book the difference as a positive/negative adjustment
    #[serde(default)]
    pub apply_adjustment: bool,
}

/// Query options for the movement history
#[derive(Debug, Default, Deserialize)]
pub struct MovementHistoryQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    #[serde(default)]
    pub include_cancelled: bool,
}

impl MovementHistoryQuery {
    pub fn pagination(&self) -> Pagination {
        let defaults = Pagination::default();
        Pagination {
            page: self.page.unwrap_or(defaults.page),
            per_page: self.per_page.unwrap_or(defaults.per_page),
        }
    }
}

/// Current stock of a tank
#[derive(Debug, Clone, Serialize)]
pub struct CurrentStock {
    pub tank_id: Uuid,
    pub quantity: Decimal,
    pub capacity: Decimal,
    pub cached: Option<CachedTankStock>,
}

/// Result of a cancellation
#[derive(Debug, Clone, Serialize)]
pub struct CancellationResult {
    pub origin_reference: String,
    pub cancelled: u64,
}

impl StockLedgerService {
    /// Create a new StockLedgerService instance
    pub fn new(db: PgPool, audit: AuditService) -> Self {
        Self { db, audit }
    }

    /// Append a movement to a tank's ledger
    pub async fn append(
        &self,
        company_id: Uuid,
        user_id: Uuid,
        tank_id: Uuid,
        input: AppendMovementInput,
    ) -> AppResult<StockMovement> {
        let request = input.into_request(user_id)?;

        let mut tx = self.db.begin().await?;
        let tank = TankService::lock_tank(&mut tx, company_id, tank_id).await?;

        let movement = match append_in(&mut tx, &tank, &request).await {
            Ok(movement) => movement,
            Err(e) => {
                tracing::warn!(%tank_id, kind = %request.kind, quantity = %request.quantity, "Movement rejected: {}", e);
                return Err(e);
            }
        };

        tx.commit().await?;

        tracing::info!(
            %tank_id,
            kind = %movement.kind,
            quantity = %movement.quantity,
            stock_before = %movement.stock_before,
            stock_after = %movement.stock_after,
            "Stock movement recorded"
        );

        self.audit
            .record(AuditEvent::movement(company_id, user_id, "append", &movement));

        Ok(movement)
    }

    /// Soft-cancel every active movement carrying an origin reference.
    ///
    /// The cached stock is left untouched; balances are restored by
    /// compensating entries, not by cancellation.
    pub async fn cancel_movements_for(
        &self,
        company_id: Uuid,
        user_id: Uuid,
        input: CancelMovementsInput,
    ) -> AppResult<CancellationResult> {
        input.validate()?;

        let mut tx = self.db.begin().await?;

        // Lock every affected tank in a stable order before touching its ledger
        let tank_ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT t.id
            FROM tanks t
            JOIN stations s ON s.id = t.station_id
            WHERE s.company_id = $2
              AND t.id IN (
                  SELECT tank_id FROM stock_movements
                  WHERE origin_reference = $1 AND status = 'validated'
              )
            ORDER BY t.id
            FOR UPDATE OF t
            "#,
        )
        .bind(&input.origin_reference)
        .bind(company_id)
        .fetch_all(&mut *tx)
        .await?;

        let result = sqlx::query(
            r#"
            UPDATE stock_movements
            SET status = 'cancelled'
            WHERE origin_reference = $1 AND status = 'validated' AND tank_id = ANY($2)
            "#,
        )
        .bind(&input.origin_reference)
        .bind(&tank_ids)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let cancelled = result.rows_affected();
        tracing::info!(origin_reference = %input.origin_reference, cancelled, "Movements cancelled");

        self.audit.record(AuditEvent::new(
            company_id,
            user_id,
            "cancel",
            "stock_movement",
            None,
            serde_json::json!({
                "origin_reference": input.origin_reference,
                "cancelled": cancelled,
                "tank_ids": tank_ids,
            }),
        ));

        Ok(CancellationResult {
            origin_reference: input.origin_reference,
            cancelled,
        })
    }

    /// Append the inverse of an active movement
    pub async fn compensate(
        &self,
        company_id: Uuid,
        user_id: Uuid,
        movement_id: Uuid,
    ) -> AppResult<StockMovement> {
        let tank_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT m.tank_id
            FROM stock_movements m
            JOIN tanks t ON t.id = m.tank_id
            JOIN stations s ON s.id = t.station_id
            WHERE m.id = $1 AND s.company_id = $2
            "#,
        )
        .bind(movement_id)
        .bind(company_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Stock movement".to_string()))?;

        let mut tx = self.db.begin().await?;
        let tank = TankService::lock_tank(&mut tx, company_id, tank_id).await?;

        let sql = format!("SELECT {} FROM stock_movements WHERE id = $1", MOVEMENT_COLUMNS);
        let original = sqlx::query_as::<_, StockMovementRow>(&sql)
            .bind(movement_id)
            .fetch_one(&mut *tx)
            .await?
            .into_movement()?;

        let already_compensated = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM stock_movements
                WHERE tank_id = $1 AND origin_module = $2 AND origin_reference = $3
                  AND status = 'validated'
            )
            "#,
        )
        .bind(tank_id)
        .bind(COMPENSATION_ORIGIN)
        .bind(movement_id.to_string())
        .fetch_one(&mut *tx)
        .await?;

        if already_compensated {
            return Err(StockError::validation("movement", "movement has already been compensated").into());
        }

        let (kind, quantity) = compensation_for(&original)?;
        let request = MovementRequest::new(
            kind,
            quantity,
            Utc::now(),
            COMPENSATION_ORIGIN,
            movement_id.to_string(),
            user_id,
        );

        let movement = append_in(&mut tx, &tank, &request).await?;
        tx.commit().await?;

        tracing::info!(
            %tank_id,
            compensated = %movement_id,
            kind = %movement.kind,
            stock_after = %movement.stock_after,
            "Compensating movement recorded"
        );

        self.audit
            .record(AuditEvent::movement(company_id, user_id, "compensate", &movement));

        Ok(movement)
    }

    /// Stock after the latest active movement, else the initial volume, else zero
    pub async fn current_stock(&self, company_id: Uuid, tank_id: Uuid) -> AppResult<CurrentStock> {
        let mut conn = self.db.acquire().await?;
        let tank = fetch_tank(&mut *conn, company_id, tank_id).await?;
        let head = ledger_head(&mut conn, &tank).await?;
        let cached = fetch_cache(&mut conn, tank_id).await?;

        tracing::debug!(%tank_id, quantity = %head.stock_before(), "Current stock read");

        Ok(CurrentStock {
            tank_id,
            quantity: head.stock_before(),
            capacity: tank.capacity,
            cached,
        })
    }

    /// Movement history, newest first
    pub async fn list_movements(
        &self,
        company_id: Uuid,
        tank_id: Uuid,
        query: MovementHistoryQuery,
    ) -> AppResult<PaginatedResponse<StockMovement>> {
        fetch_tank(&self.db, company_id, tank_id).await?;
        let pagination = query.pagination();

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM stock_movements WHERE tank_id = $1 AND ($2 OR status = 'validated')",
        )
        .bind(tank_id)
        .bind(query.include_cancelled)
        .fetch_one(&self.db)
        .await?;

        let sql = format!(
            r#"
            SELECT {}
            FROM stock_movements
            WHERE tank_id = $1 AND ($2 OR status = 'validated')
            ORDER BY movement_at DESC, sequence DESC
            LIMIT $3 OFFSET $4
            "#,
            MOVEMENT_COLUMNS
        );

        let movements = sqlx::query_as::<_, StockMovementRow>(&sql)
            .bind(tank_id)
            .bind(query.include_cancelled)
            .bind(pagination.limit())
            .bind(pagination.offset())
            .fetch_all(&self.db)
            .await?
            .into_iter()
            .map(StockMovementRow::into_movement)
            .collect::<AppResult<Vec<_>>>()?;

        Ok(PaginatedResponse::new(
            movements,
            &pagination,
            total.max(0) as u64,
        ))
    }

    /// Record a physical gauge reading and optionally book the difference
    pub async fn record_inventory_count(
        &self,
        company_id: Uuid,
        user_id: Uuid,
        tank_id: Uuid,
        input: RecordInventoryCountInput,
    ) -> AppResult<InventoryCount> {
        let mut tx = self.db.begin().await?;
        let tank = TankService::lock_tank(&mut tx, company_id, tank_id).await?;

        let curve = tank.curve()?;
        validate_gauge_height(input.gauge_height, curve)?;
        let real_volume = curve.volume_at(input.gauge_height);
        let counted_at = input.counted_at.unwrap_or_else(Utc::now);

        let theoretical_volume = ledger_head(&mut tx, &tank).await?.stock_before();
        let difference = real_volume - theoretical_volume;

        let count_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO inventory_counts
                (tank_id, gauge_height, real_volume, theoretical_volume, difference, counted_at, recorded_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(tank_id)
        .bind(input.gauge_height)
        .bind(real_volume)
        .bind(theoretical_volume)
        .bind(difference)
        .bind(counted_at)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        let mut adjustment_movement_id = None;
        if input.apply_adjustment && !difference.is_zero() {
            let kind = if difference > Decimal::ZERO {
                MovementKind::PositiveAdjustment
            } else {
                MovementKind::NegativeAdjustment
            };
            let mut request = MovementRequest::new(
                kind,
                difference.abs(),
                counted_at,
                "inventory",
                count_id.to_string(),
                user_id,
            );
            request.inventory_count_id = Some(count_id);

            let movement = append_in(&mut tx, &tank, &request).await?;
            adjustment_movement_id = Some(movement.id);

            sqlx::query("UPDATE inventory_counts SET adjustment_movement_id = $1 WHERE id = $2")
                .bind(movement.id)
                .bind(count_id)
                .execute(&mut *tx)
                .await?;
        }

        let now = Utc::now();
        let mut cache = match fetch_cache(&mut tx, tank_id).await? {
            Some(cache) => cache,
            None => CachedTankStock {
                tank_id,
                theoretical_quantity: ledger_head(&mut tx, &tank).await?.stock_before(),
                real_quantity: None,
                last_calculated_at: now,
                weighted_average_cost: None,
                sale_price: None,
                min_stock_threshold: None,
            },
        };
        cache.real_quantity = Some(real_volume);
        cache.last_calculated_at = now;
        write_cache(&mut tx, &cache).await?;

        tx.commit().await?;

        tracing::info!(
            %tank_id,
            real = %real_volume,
            theoretical = %theoretical_volume,
            difference = %difference,
            adjusted = adjustment_movement_id.is_some(),
            "Inventory count recorded"
        );

        let count = InventoryCount {
            id: count_id,
            tank_id,
            gauge_height: input.gauge_height,
            real_volume,
            theoretical_volume,
            difference,
            counted_at,
            recorded_by: user_id,
            adjustment_movement_id,
        };

        self.audit.record(AuditEvent::new(
            company_id,
            user_id,
            "inventory_count",
            "tank",
            Some(tank_id),
            serde_json::json!({
                "count_id": count.id,
                "real_volume": count.real_volume,
                "theoretical_volume": count.theoretical_volume,
                "difference": count.difference,
            }),
        ));

        Ok(count)
    }
}

/// Plan and write a movement inside the caller's transaction.
///
/// The caller must already hold the tank lock.
pub(crate) async fn append_in(
    conn: &mut PgConnection,
    tank: &Tank,
    request: &MovementRequest,
) -> AppResult<StockMovement> {
    if let Some(initial) = fetch_initial_state(&mut *conn, tank.id).await? {
        if request.movement_at < initial.initialized_at {
            return Err(StockError::validation(
                "movement_at",
                "movement is dated before the tank initialization",
            )
            .into());
        }
    }

    let head = ledger_head(&mut *conn, tank).await?;
    head.ensure_chronological(request.movement_at)?;
    let effect = plan_movement(&head, request.kind, request.quantity)?;
    let movement = insert_movement(&mut *conn, tank.id, request, effect).await?;

    let previous = fetch_cache(&mut *conn, tank.id).await?;
    let cache = refresh_cache(
        previous.as_ref(),
        tank.id,
        effect,
        request.unit_cost,
        Utc::now(),
    );
    write_cache(&mut *conn, &cache).await?;

    Ok(movement)
}

/// Latest active movement and initial volume of a tank
pub(crate) async fn ledger_head(conn: &mut PgConnection, tank: &Tank) -> AppResult<LedgerHead> {
    let latest = sqlx::query_as::<_, (Decimal, DateTime<Utc>)>(
        r#"
        SELECT stock_after, movement_at
        FROM stock_movements
        WHERE tank_id = $1 AND status = 'validated'
        ORDER BY movement_at DESC, sequence DESC
        LIMIT 1
        "#,
    )
    .bind(tank.id)
    .fetch_optional(&mut *conn)
    .await?;

    let initial_volume = fetch_initial_state(&mut *conn, tank.id)
        .await?
        .map(|s| s.computed_volume);

    Ok(LedgerHead {
        tank_id: tank.id,
        capacity: tank.capacity,
        latest_stock_after: latest.map(|(stock_after, _)| stock_after),
        latest_movement_at: latest.map(|(_, movement_at)| movement_at),
        initial_volume,
    })
}

/// Write a movement row with a precomputed effect
pub(crate) async fn insert_movement(
    conn: &mut PgConnection,
    tank_id: Uuid,
    request: &MovementRequest,
    effect: MovementEffect,
) -> AppResult<StockMovement> {
    let sql = format!(
        r#"
        INSERT INTO stock_movements (
            tank_id, kind, quantity, movement_at, stock_before, stock_after, unit_cost,
            recorded_by, origin_module, origin_reference, delivery_id, sale_id, inventory_count_id
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        RETURNING {}
        "#,
        MOVEMENT_COLUMNS
    );

    sqlx::query_as::<_, StockMovementRow>(&sql)
        .bind(tank_id)
        .bind(request.kind.as_str())
        .bind(request.quantity)
        .bind(request.movement_at)
        .bind(effect.stock_before)
        .bind(effect.stock_after)
        .bind(request.unit_cost)
        .bind(request.recorded_by)
        .bind(&request.origin_module)
        .bind(&request.origin_reference)
        .bind(request.delivery_id)
        .bind(request.sale_id)
        .bind(request.inventory_count_id)
        .fetch_one(&mut *conn)
        .await?
        .into_movement()
}

pub(crate) async fn fetch_cache(
    conn: &mut PgConnection,
    tank_id: Uuid,
) -> AppResult<Option<CachedTankStock>> {
    let row = sqlx::query_as::<_, CachedStockRow>(
        r#"
        SELECT tank_id, theoretical_quantity, real_quantity, last_calculated_at,
               weighted_average_cost, sale_price, min_stock_threshold
        FROM cached_tank_stocks
        WHERE tank_id = $1
        "#,
    )
    .bind(tank_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(CachedTankStock::from))
}

/// Upsert the cached stock row; only ledger write paths call this
pub(crate) async fn write_cache(conn: &mut PgConnection, cache: &CachedTankStock) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO cached_tank_stocks (
            tank_id, theoretical_quantity, real_quantity, last_calculated_at,
            weighted_average_cost, sale_price, min_stock_threshold
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (tank_id) DO UPDATE SET
            theoretical_quantity = EXCLUDED.theoretical_quantity,
            real_quantity = EXCLUDED.real_quantity,
            last_calculated_at = EXCLUDED.last_calculated_at,
            weighted_average_cost = EXCLUDED.weighted_average_cost,
            sale_price = EXCLUDED.sale_price,
            min_stock_threshold = EXCLUDED.min_stock_threshold
        "#,
    )
    .bind(cache.tank_id)
    .bind(cache.theoretical_quantity)
    .bind(cache.real_quantity)
    .bind(cache.last_calculated_at)
    .bind(cache.weighted_average_cost)
    .bind(cache.sale_price)
    .bind(cache.min_stock_threshold)
    .execute(&mut *conn)
    .await?;

    Ok(())
}
