//! Delivery and purchase-order models used for variance checks

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A fuel delivery received into a tank
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub id: Uuid,
    pub tank_id: Uuid,
    pub declared_quantity: Decimal,
    pub delivered_at: DateTime<Utc>,
    pub supplier_reference: Option<String>,
}

/// A purchase-order line for fuel destined to a tank
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseOrderLine {
    pub id: Uuid,
    pub tank_id: Uuid,
    pub ordered_quantity: Decimal,
    pub unit_price: Option<Decimal>,
    pub expected_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// Direction of a delivery variance
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VarianceDirection {
    /// Less was delivered than ordered
    Shortage,
    /// More was delivered than ordered
    Overage,
}

/// A delivery that deviates from its purchase order beyond tolerance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VarianceResult {
    pub delivery_id: Uuid,
    pub purchase_order_line_id: Uuid,
    pub declared_quantity: Decimal,
    pub ordered_quantity: Decimal,
    pub direction: VarianceDirection,
    pub absolute_difference: Decimal,
    /// Difference as a percentage of the ordered quantity
    pub percentage_difference: Decimal,
}
