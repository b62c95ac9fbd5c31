//! Tank and fuel pricing models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calibration::CalibrationCurve;
use crate::error::StockError;

/// A fuel storage tank at a station
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tank {
    pub id: Uuid,
    pub station_id: Uuid,
    pub fuel_type_id: Uuid,
    /// Short station-local code (e.g., "T1")
    pub code: String,
    /// Maximum capacity in litres
    pub capacity: Decimal,
    pub status: TankStatus,
    /// Low-stock alert threshold in litres
    pub alert_threshold: Option<Decimal>,
    pub calibration: Option<CalibrationCurve>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tank {
    /// Calibration curve, or a configuration error naming the tank
    pub fn curve(&self) -> Result<&CalibrationCurve, StockError> {
        self.calibration
            .as_ref()
            .ok_or_else(|| StockError::Configuration {
                tank_id: self.id,
                message: "tank has no calibration curve".to_string(),
            })
    }
}

/// Operational status of a tank
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TankStatus {
    #[default]
    Active,
    Inactive,
    Maintenance,
}

impl TankStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TankStatus::Active => "active",
            TankStatus::Inactive => "inactive",
            TankStatus::Maintenance => "maintenance",
        }
    }
}

impl std::str::FromStr for TankStatus {
    type Err = StockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(TankStatus::Active),
            "inactive" => Ok(TankStatus::Inactive),
            "maintenance" => Ok(TankStatus::Maintenance),
            other => Err(StockError::validation(
                "status",
                format!("unknown tank status '{}'", other),
            )),
        }
    }
}

impl std::fmt::Display for TankStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current purchase and sale price of a fuel type at a station
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FuelPrice {
    pub fuel_type_id: Uuid,
    pub station_id: Uuid,
    pub purchase_price: Decimal,
    pub sale_price: Decimal,
    pub effective_from: DateTime<Utc>,
}
