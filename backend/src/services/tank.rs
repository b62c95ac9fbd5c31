//! Tank management service: provisioning, calibration and price lookups

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgExecutor, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::{FuelPrice, Tank, TankStatus};
use shared::{
    ensure_recalibration_allowed, validate_capacity, validate_threshold, CalibrationCurve,
    StockError,
};

/// Tank service for managing tanks and their calibration curves
#[derive(Clone)]
pub struct TankService {
    db: PgPool,
}

const TANK_SELECT: &str = r#"
    SELECT t.id, t.station_id, t.fuel_type_id, t.code, t.capacity, t.status,
           t.alert_threshold, t.calibration, t.created_at, t.updated_at
    FROM tanks t
    JOIN stations s ON s.id = t.station_id
"#;

/// Row for tank queries; calibration is normalized on conversion
#[derive(Debug, FromRow)]
struct TankRow {
    id: Uuid,
    station_id: Uuid,
    fuel_type_id: Uuid,
    code: String,
    capacity: Decimal,
    status: String,
    alert_threshold: Option<Decimal>,
    calibration: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TankRow {
    fn into_tank(self) -> AppResult<Tank> {
        let calibration = match &self.calibration {
            None | Some(serde_json::Value::Null) => None,
            Some(raw) => Some(
                CalibrationCurve::from_json(raw)
                    .map_err(|e| StockError::calibration(self.id, e))?,
            ),
        };

        Ok(Tank {
            id: self.id,
            station_id: self.station_id,
            fuel_type_id: self.fuel_type_id,
            code: self.code,
            capacity: self.capacity,
            status: self.status.parse()?,
            alert_threshold: self.alert_threshold,
            calibration,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Input for provisioning a tank
#[derive(Debug, Deserialize, Validate)]
pub struct CreateTankInput {
    pub station_id: Uuid,
    pub fuel_type_id: Uuid,
    #[validate(length(min = 1, max = 32))]
    pub code: String,
    pub capacity: Decimal,
    pub status: Option<TankStatus>,
    pub alert_threshold: Option<Decimal>,
    /// Raw calibration points; field-name variants are accepted
    pub calibration: Option<serde_json::Value>,
}

/// Input for updating a tank
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTankInput {
    #[validate(length(min = 1, max = 32))]
    pub code: Option<String>,
    pub capacity: Option<Decimal>,
    pub status: Option<TankStatus>,
    pub alert_threshold: Option<Decimal>,
    pub calibration: Option<serde_json::Value>,
}

/// Result of a calibration lookup
#[derive(Debug, Clone, Serialize)]
pub struct CalibrationConversion {
    pub tank_id: Uuid,
    pub height: Decimal,
    pub volume: Decimal,
}

impl TankService {
    /// Create a new TankService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Provision a tank at one of the company's stations
    pub async fn create_tank(&self, company_id: Uuid, input: CreateTankInput) -> AppResult<Tank> {
        input.validate()?;

        let station_exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM stations WHERE id = $1 AND company_id = $2)",
        )
        .bind(input.station_id)
        .bind(company_id)
        .fetch_one(&self.db)
        .await?;

        if !station_exists {
            return Err(AppError::NotFound("Station".to_string()));
        }

        let curve = parse_curve(input.calibration.as_ref())?;
        validate_capacity(input.capacity, curve.as_ref())?;
        validate_threshold("alert_threshold", input.alert_threshold)?;

        let code_taken = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM tanks WHERE station_id = $1 AND code = $2)",
        )
        .bind(input.station_id)
        .bind(&input.code)
        .fetch_one(&self.db)
        .await?;

        if code_taken {
            return Err(AppError::DuplicateEntry(format!("tank code {}", input.code)));
        }

        let tank_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO tanks (station_id, fuel_type_id, code, capacity, status, alert_threshold, calibration)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(input.station_id)
        .bind(input.fuel_type_id)
        .bind(&input.code)
        .bind(input.capacity)
        .bind(input.status.unwrap_or_default().as_str())
        .bind(input.alert_threshold)
        .bind(curve.as_ref().map(|c| c.to_json()))
        .fetch_one(&self.db)
        .await?;

        tracing::info!(%tank_id, code = %input.code, capacity = %input.capacity, "Tank provisioned");

        self.get_tank(company_id, tank_id).await
    }

    /// Get a tank visible to the company
    pub async fn get_tank(&self, company_id: Uuid, tank_id: Uuid) -> AppResult<Tank> {
        fetch_tank(&self.db, company_id, tank_id).await
    }

    /// List the company's tanks, optionally for one station
    pub async fn list_tanks(
        &self,
        company_id: Uuid,
        station_id: Option<Uuid>,
    ) -> AppResult<Vec<Tank>> {
        let sql = format!(
            "{} WHERE s.company_id = $1 AND ($2::uuid IS NULL OR t.station_id = $2) ORDER BY t.station_id, t.code",
            TANK_SELECT
        );

        let rows = sqlx::query_as::<_, TankRow>(&sql)
            .bind(company_id)
            .bind(station_id)
            .fetch_all(&self.db)
            .await?;

        rows.into_iter().map(TankRow::into_tank).collect()
    }

    /// Update tank attributes and calibration
    pub async fn update_tank(
        &self,
        company_id: Uuid,
        tank_id: Uuid,
        input: UpdateTankInput,
    ) -> AppResult<Tank> {
        input.validate()?;

        let mut tx = self.db.begin().await?;
        let existing = Self::lock_tank(&mut tx, company_id, tank_id).await?;

        let curve = match input.calibration.as_ref() {
            Some(raw) => parse_curve(Some(raw))?,
            None => existing.calibration.clone(),
        };
        if curve != existing.calibration {
            let initialized = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM tank_initial_states WHERE tank_id = $1)",
            )
            .bind(tank_id)
            .fetch_one(&mut *tx)
            .await?;
            ensure_recalibration_allowed(tank_id, initialized)?;
        }
        let capacity = input.capacity.unwrap_or(existing.capacity);
        let alert_threshold = input.alert_threshold.or(existing.alert_threshold);
        validate_capacity(capacity, curve.as_ref())?;
        validate_threshold("alert_threshold", alert_threshold)?;

        if let Some(cached) = sqlx::query_scalar::<_, Decimal>(
            "SELECT theoretical_quantity FROM cached_tank_stocks WHERE tank_id = $1",
        )
        .bind(tank_id)
        .fetch_optional(&mut *tx)
        .await?
        {
            if cached > capacity {
                return Err(AppError::Validation {
                    field: "capacity".to_string(),
                    message: format!("Tank currently holds {} L, more than {} L", cached, capacity),
                    message_fr: format!("La cuve contient {} L, plus que {} L", cached, capacity),
                });
            }
        }

        sqlx::query(
            r#"
            UPDATE tanks
            SET code = $1, capacity = $2, status = $3, alert_threshold = $4,
                calibration = $5, updated_at = now()
            WHERE id = $6
            "#,
        )
        .bind(input.code.as_deref().unwrap_or(&existing.code))
        .bind(capacity)
        .bind(input.status.unwrap_or(existing.status).as_str())
        .bind(alert_threshold)
        .bind(curve.as_ref().map(|c| c.to_json()))
        .bind(tank_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(%tank_id, "Tank updated");

        self.get_tank(company_id, tank_id).await
    }

    /// Volume for a dip height on the tank's curve
    pub async fn volume_at(
        &self,
        company_id: Uuid,
        tank_id: Uuid,
        height: Decimal,
    ) -> AppResult<CalibrationConversion> {
        let tank = self.get_tank(company_id, tank_id).await?;
        let curve = tank.curve()?;
        Ok(CalibrationConversion {
            tank_id,
            height,
            volume: curve.volume_at(height),
        })
    }

    /// Dip height for a volume on the tank's curve
    pub async fn height_at(
        &self,
        company_id: Uuid,
        tank_id: Uuid,
        volume: Decimal,
    ) -> AppResult<CalibrationConversion> {
        let tank = self.get_tank(company_id, tank_id).await?;
        let curve = tank.curve()?;
        Ok(CalibrationConversion {
            tank_id,
            height: curve.height_at(volume),
            volume,
        })
    }

    /// Load a tank and lock its row for the rest of the transaction.
    ///
    /// Every ledger write takes this lock first so appends to the same tank
    /// are serialized and always read the latest committed movement.
    pub async fn lock_tank(
        conn: &mut PgConnection,
        company_id: Uuid,
        tank_id: Uuid,
    ) -> AppResult<Tank> {
        let sql = format!(
            "{} WHERE t.id = $1 AND s.company_id = $2 FOR UPDATE OF t",
            TANK_SELECT
        );

        sqlx::query_as::<_, TankRow>(&sql)
            .bind(tank_id)
            .bind(company_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound("Tank".to_string()))?
            .into_tank()
    }

    /// Current price of the tank's fuel at its station
    pub async fn fuel_price(
        conn: &mut PgConnection,
        tank: &Tank,
    ) -> AppResult<Option<FuelPrice>> {
        let price = sqlx::query_as::<_, (Uuid, Uuid, Decimal, Decimal, DateTime<Utc>)>(
            r#"
            SELECT fuel_type_id, station_id, purchase_price, sale_price, effective_from
            FROM fuel_prices
            WHERE fuel_type_id = $1 AND station_id = $2 AND effective_from <= now()
            ORDER BY effective_from DESC
            LIMIT 1
            "#,
        )
        .bind(tank.fuel_type_id)
        .bind(tank.station_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(price.map(|p| FuelPrice {
            fuel_type_id: p.0,
            station_id: p.1,
            purchase_price: p.2,
            sale_price: p.3,
            effective_from: p.4,
        }))
    }
}

/// Fetch a tank scoped to a company through any executor
pub(crate) async fn fetch_tank<'e, E>(executor: E, company_id: Uuid, tank_id: Uuid) -> AppResult<Tank>
where
    E: PgExecutor<'e>,
{
    let sql = format!("{} WHERE t.id = $1 AND s.company_id = $2", TANK_SELECT);

    sqlx::query_as::<_, TankRow>(&sql)
        .bind(tank_id)
        .bind(company_id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::NotFound("Tank".to_string()))?
        .into_tank()
}

fn parse_curve(raw: Option<&serde_json::Value>) -> AppResult<Option<CalibrationCurve>> {
    match raw {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(value) => CalibrationCurve::from_json(value)
            .map(Some)
            .map_err(|e| AppError::Validation {
                field: "calibration".to_string(),
                message: e.to_string(),
                message_fr: format!("Barremage invalide: {}", e),
            }),
    }
}
