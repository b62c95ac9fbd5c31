//! Stock ledger models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StockError;

/// Kind of a stock movement
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    /// Delivery into the tank
    Entry,
    /// Sale or transfer out of the tank
    Exit,
    /// Sets the stock to an absolute value
    Adjustment,
    /// Synthetic entry written when the initial state is created
    InitialStock,
    PositiveAdjustment,
    NegativeAdjustment,
}

impl MovementKind {
    pub const ALL: [MovementKind; 6] = [
        MovementKind::Entry,
        MovementKind::Exit,
        MovementKind::Adjustment,
        MovementKind::InitialStock,
        MovementKind::PositiveAdjustment,
        MovementKind::NegativeAdjustment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Entry => "entry",
            MovementKind::Exit => "exit",
            MovementKind::Adjustment => "adjustment",
            MovementKind::InitialStock => "initial_stock",
            MovementKind::PositiveAdjustment => "positive_adjustment",
            MovementKind::NegativeAdjustment => "negative_adjustment",
        }
    }

    /// Kinds that accompany an initial-state edit cycle
    pub fn is_bookkeeping(&self) -> bool {
        matches!(
            self,
            MovementKind::InitialStock
                | MovementKind::PositiveAdjustment
                | MovementKind::NegativeAdjustment
        )
    }
}

impl std::str::FromStr for MovementKind {
    type Err = StockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MovementKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| {
                StockError::validation("kind", format!("unknown movement kind '{}'", s))
            })
    }
}

impl std::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Movement status; cancelled movements are excluded from balances
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MovementStatus {
    #[default]
    Validated,
    Cancelled,
}

impl MovementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementStatus::Validated => "validated",
            MovementStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for MovementStatus {
    type Err = StockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "validated" => Ok(MovementStatus::Validated),
            "cancelled" => Ok(MovementStatus::Cancelled),
            other => Err(StockError::validation(
                "status",
                format!("unknown movement status '{}'", other),
            )),
        }
    }
}

/// A ledger entry for one tank
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StockMovement {
    pub id: Uuid,
    pub tank_id: Uuid,
    /// Insertion order, used to break timestamp ties
    pub sequence: i64,
    pub kind: MovementKind,
    pub quantity: Decimal,
    pub movement_at: DateTime<Utc>,
    pub stock_before: Decimal,
    pub stock_after: Decimal,
    pub unit_cost: Option<Decimal>,
    pub recorded_by: Uuid,
    /// Module that produced the movement (e.g., "delivery", "sale", "inventory")
    pub origin_module: String,
    pub origin_reference: String,
    pub status: MovementStatus,
    pub delivery_id: Option<Uuid>,
    pub sale_id: Option<Uuid>,
    pub inventory_count_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl StockMovement {
    pub fn is_active(&self) -> bool {
        self.status == MovementStatus::Validated
    }

    /// Net effect of the movement on the tank
    pub fn delta(&self) -> Decimal {
        self.stock_after - self.stock_before
    }
}

/// One-time starting point of a tank's stock history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TankInitialState {
    pub id: Uuid,
    pub tank_id: Uuid,
    pub gauge_height: Decimal,
    pub computed_volume: Decimal,
    pub initialized_at: DateTime<Utc>,
    pub recorded_by: Uuid,
    /// Derived from the ledger on read, never stored
    pub locked: bool,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<Uuid>,
}

/// Materialized per-tank stock figures, owned by the ledger write paths
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CachedTankStock {
    pub tank_id: Uuid,
    pub theoretical_quantity: Decimal,
    pub real_quantity: Option<Decimal>,
    pub last_calculated_at: DateTime<Utc>,
    pub weighted_average_cost: Option<Decimal>,
    pub sale_price: Option<Decimal>,
    pub min_stock_threshold: Option<Decimal>,
}

/// Point-in-time theoretical stock with the sums that produced it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StockSnapshot {
    pub tank_id: Uuid,
    pub as_of: DateTime<Utc>,
    pub initialized_at: DateTime<Utc>,
    pub initial_volume: Decimal,
    pub deliveries_total: Decimal,
    pub deliveries_count: i64,
    pub sales_total: Decimal,
    pub sales_count: i64,
    /// Signed sum of adjustment deltas
    pub adjustments_total: Decimal,
    pub adjustments_count: i64,
    pub volume: Decimal,
}

/// A physical gauge reading reconciled against the ledger
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InventoryCount {
    pub id: Uuid,
    pub tank_id: Uuid,
    pub gauge_height: Decimal,
    pub real_volume: Decimal,
    pub theoretical_volume: Decimal,
    /// real - theoretical
    pub difference: Decimal,
    pub counted_at: DateTime<Utc>,
    pub recorded_by: Uuid,
    pub adjustment_movement_id: Option<Uuid>,
}
