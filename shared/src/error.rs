//! Stock domain errors
//!
//! Every variant carries enough context (tank, quantity, before/after) to
//! render a precise message without another lookup.

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::calibration::CalibrationError;
use crate::models::MovementKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StockError {
    #[error("Tank {tank_id}: calibration is not usable: {message}")]
    Configuration { tank_id: Uuid, message: String },

    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error(
        "Tank {tank_id}: {kind} of {quantity} L would leave {stock_after} L in the tank \
         (stock before: {stock_before} L)"
    )]
    InsufficientStock {
        tank_id: Uuid,
        kind: MovementKind,
        quantity: Decimal,
        stock_before: Decimal,
        stock_after: Decimal,
    },

    #[error(
        "Tank {tank_id}: {kind} of {quantity} L would bring stock to {stock_after} L, \
         above capacity of {capacity} L (stock before: {stock_before} L)"
    )]
    CapacityExceeded {
        tank_id: Uuid,
        kind: MovementKind,
        quantity: Decimal,
        stock_before: Decimal,
        stock_after: Decimal,
        capacity: Decimal,
    },

    #[error(
        "Tank {tank_id}: initial state can no longer be changed, \
         {movement_count} active movement(s) exist ({bookkeeping_count} bookkeeping)"
    )]
    ImmutableState {
        tank_id: Uuid,
        movement_count: i64,
        bookkeeping_count: i64,
    },

    #[error("Tank {tank_id} has no initial state")]
    NotConfigured { tank_id: Uuid },

    #[error("Tank {tank_id} already has an initial state")]
    AlreadyInitialized { tank_id: Uuid },

    #[error("{0} not found")]
    NotFound(String),
}

impl StockError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        StockError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Attach a tank id to a calibration failure
    pub fn calibration(tank_id: Uuid, err: CalibrationError) -> Self {
        StockError::Configuration {
            tank_id,
            message: err.to_string(),
        }
    }
}
