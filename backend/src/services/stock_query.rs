//! Read-side stock queries: point-in-time replay, delivery variance and
//! low-stock alerts

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::config::StockConfig;
use crate::error::{AppError, AppResult};
use crate::models::{Delivery, PurchaseOrderLine, StockSnapshot, VarianceResult};
use crate::services::initial_state::fetch_initial_state;
use crate::services::stock_ledger::{StockMovementRow, MOVEMENT_COLUMNS};
use crate::services::tank::fetch_tank;
use shared::{detect_delivery_variance, replay_snapshot, select_matching_line};

/// Stock query service
#[derive(Clone)]
pub struct StockQueryService {
    db: PgPool,
    config: StockConfig,
}

/// Query for a point-in-time stock
#[derive(Debug, Deserialize)]
pub struct StockAtQuery {
    pub as_of: DateTime<Utc>,
}

/// Outcome of a delivery variance check
#[derive(Debug, Clone, Serialize)]
pub struct VarianceReport {
    pub delivery_id: Uuid,
    pub purchase_order_line_id: Option<Uuid>,
    pub tolerance_percentage: Decimal,
    /// `None` when the delivery is within tolerance or has no matching line
    pub variance: Option<VarianceResult>,
}

/// A tank at or below its stock threshold
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct LowStockAlert {
    pub tank_id: Uuid,
    pub station_id: Uuid,
    pub code: String,
    pub theoretical_quantity: Decimal,
    pub threshold: Decimal,
    pub capacity: Decimal,
}

#[derive(Debug, FromRow)]
struct PurchaseOrderLineRow {
    id: Uuid,
    tank_id: Uuid,
    ordered_quantity: Decimal,
    unit_price: Option<Decimal>,
    expected_date: chrono::NaiveDate,
    created_at: DateTime<Utc>,
}

impl From<PurchaseOrderLineRow> for PurchaseOrderLine {
    fn from(row: PurchaseOrderLineRow) -> Self {
        PurchaseOrderLine {
            id: row.id,
            tank_id: row.tank_id,
            ordered_quantity: row.ordered_quantity,
            unit_price: row.unit_price,
            expected_date: row.expected_date,
            created_at: row.created_at,
        }
    }
}

impl StockQueryService {
    /// Create a new StockQueryService instance
    pub fn new(db: PgPool, config: StockConfig) -> Self {
        Self { db, config }
    }

    /// Theoretical stock at `as_of`, replayed from the initial state
    pub async fn theoretical_stock_at(
        &self,
        company_id: Uuid,
        tank_id: Uuid,
        as_of: DateTime<Utc>,
    ) -> AppResult<StockSnapshot> {
        let mut conn = self.db.acquire().await?;
        fetch_tank(&mut *conn, company_id, tank_id).await?;

        let initial = fetch_initial_state(&mut conn, tank_id)
            .await?
            .ok_or(AppError::NotConfigured(tank_id))?;

        let sql = format!(
            r#"
            SELECT {}
            FROM stock_movements
            WHERE tank_id = $1 AND status = 'validated'
              AND movement_at >= $2 AND movement_at <= $3
            ORDER BY movement_at, sequence
            "#,
            MOVEMENT_COLUMNS
        );

        let movements = sqlx::query_as::<_, StockMovementRow>(&sql)
            .bind(tank_id)
            .bind(initial.initialized_at)
            .bind(as_of)
            .fetch_all(&mut *conn)
            .await?
            .into_iter()
            .map(StockMovementRow::into_movement)
            .collect::<AppResult<Vec<_>>>()?;

        let snapshot = replay_snapshot(&initial, &movements, as_of)?;

        tracing::debug!(
            %tank_id,
            %as_of,
            volume = %snapshot.volume,
            movements = movements.len(),
            "Stock replayed"
        );

        Ok(snapshot)
    }

    /// Compare a delivery with its purchase-order line
    pub async fn delivery_variance(
        &self,
        company_id: Uuid,
        delivery_id: Uuid,
    ) -> AppResult<VarianceReport> {
        let delivery = sqlx::query_as::<_, (Uuid, Uuid, Decimal, DateTime<Utc>, Option<String>)>(
            r#"
            SELECT d.id, d.tank_id, d.declared_quantity, d.delivered_at, d.supplier_reference
            FROM deliveries d
            JOIN tanks t ON t.id = d.tank_id
            JOIN stations s ON s.id = t.station_id
            WHERE d.id = $1 AND s.company_id = $2
            "#,
        )
        .bind(delivery_id)
        .bind(company_id)
        .fetch_optional(&self.db)
        .await?
        .map(|d| Delivery {
            id: d.0,
            tank_id: d.1,
            declared_quantity: d.2,
            delivered_at: d.3,
            supplier_reference: d.4,
        })
        .ok_or_else(|| AppError::NotFound("Delivery".to_string()))?;

        let window = self.config.variance_window_days;
        let day = delivery.delivered_at.date_naive();

        let lines: Vec<PurchaseOrderLine> = sqlx::query_as::<_, PurchaseOrderLineRow>(
            r#"
            SELECT id, tank_id, ordered_quantity, unit_price, expected_date, created_at
            FROM purchase_order_lines
            WHERE tank_id = $1
              AND expected_date BETWEEN $2 AND $3
            "#,
        )
        .bind(delivery.tank_id)
        .bind(day - chrono::Duration::days(window))
        .bind(day + chrono::Duration::days(window))
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .map(PurchaseOrderLine::from)
        .collect();

        let tolerance = self.config.variance_tolerance();
        let line = select_matching_line(&delivery, &lines, window);
        let variance = line.and_then(|l| detect_delivery_variance(&delivery, l, tolerance));

        if let Some(v) = &variance {
            tracing::warn!(
                %delivery_id,
                direction = ?v.direction,
                percentage = %v.percentage_difference,
                "Delivery variance beyond tolerance"
            );
        }

        Ok(VarianceReport {
            delivery_id,
            purchase_order_line_id: line.map(|l| l.id),
            tolerance_percentage: (tolerance * Decimal::ONE_HUNDRED).normalize(),
            variance,
        })
    }

    /// Tanks whose cached stock is at or below their threshold
    pub async fn low_stock_alerts(
        &self,
        company_id: Uuid,
        station_id: Option<Uuid>,
    ) -> AppResult<Vec<LowStockAlert>> {
        let alerts = sqlx::query_as::<_, LowStockAlert>(
            r#"
            SELECT t.id AS tank_id, t.station_id, t.code,
                   c.theoretical_quantity,
                   COALESCE(c.min_stock_threshold, t.alert_threshold) AS threshold,
                   t.capacity
            FROM tanks t
            JOIN stations s ON s.id = t.station_id
            JOIN cached_tank_stocks c ON c.tank_id = t.id
            WHERE s.company_id = $1
              AND ($2::uuid IS NULL OR t.station_id = $2)
              AND t.status = 'active'
              AND COALESCE(c.min_stock_threshold, t.alert_threshold) IS NOT NULL
              AND c.theoretical_quantity <= COALESCE(c.min_stock_threshold, t.alert_threshold)
            ORDER BY t.station_id, t.code
            "#,
        )
        .bind(company_id)
        .bind(station_id)
        .fetch_all(&self.db)
        .await?;

        Ok(alerts)
    }
}
