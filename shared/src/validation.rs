//! Validation utilities for tank and stock inputs

use rust_decimal::Decimal;

use uuid::Uuid;

use crate::calibration::CalibrationCurve;
use crate::error::StockError;
use crate::ledger::{max_quantity, QUANTITY_SCALE};

// ============================================================================
// Tank Validations
// ============================================================================

/// Gauge height must be non-negative and within the calibrated range
pub fn validate_gauge_height(height: Decimal, curve: &CalibrationCurve) -> Result<(), StockError> {
    if height < Decimal::ZERO {
        return Err(StockError::validation(
            "gauge_height",
            "gauge height cannot be negative",
        ));
    }
    if height.round_dp(QUANTITY_SCALE) != height {
        return Err(StockError::validation(
            "gauge_height",
            format!("gauge height is limited to {} decimal places", QUANTITY_SCALE),
        ));
    }
    if height > curve.max_height() {
        return Err(StockError::validation(
            "gauge_height",
            format!(
                "gauge height {} cm is beyond the calibrated maximum of {} cm",
                height,
                curve.max_height()
            ),
        ));
    }
    Ok(())
}

/// A tank's curve is frozen while an initial state was computed from it
pub fn ensure_recalibration_allowed(
    tank_id: Uuid,
    has_initial_state: bool,
) -> Result<(), StockError> {
    if has_initial_state {
        return Err(StockError::validation(
            "calibration",
            format!(
                "tank {} has an initial state computed from its current curve; delete it before recalibrating",
                tank_id
            ),
        ));
    }
    Ok(())
}

/// Tank capacity must be positive and hold the whole calibrated volume
pub fn validate_capacity(
    capacity: Decimal,
    curve: Option<&CalibrationCurve>,
) -> Result<(), StockError> {
    if capacity <= Decimal::ZERO {
        return Err(StockError::validation("capacity", "capacity must be positive"));
    }
    if capacity > max_quantity() {
        return Err(StockError::validation(
            "capacity",
            format!("capacity cannot exceed {} L", max_quantity()),
        ));
    }
    if let Some(curve) = curve {
        if curve.max_volume() > capacity {
            return Err(StockError::validation(
                "calibration",
                format!(
                    "calibrated volume {} L exceeds tank capacity {} L",
                    curve.max_volume(),
                    capacity
                ),
            ));
        }
    }
    Ok(())
}

/// Thresholds are optional but never negative
pub fn validate_threshold(field: &str, threshold: Option<Decimal>) -> Result<(), StockError> {
    match threshold {
        Some(t) if t < Decimal::ZERO => Err(StockError::validation(
            field,
            "threshold cannot be negative",
        )),
        _ => Ok(()),
    }
}

// ============================================================================
// Ledger Validations
// ============================================================================

/// Origin module and reference identify where a movement came from
pub fn validate_origin(origin_module: &str, origin_reference: &str) -> Result<(), StockError> {
    if origin_module.trim().is_empty() {
        return Err(StockError::validation(
            "origin_module",
            "origin module is required",
        ));
    }
    if origin_reference.trim().is_empty() {
        return Err(StockError::validation(
            "origin_reference",
            "origin reference is required",
        ));
    }
    Ok(())
}

/// Unit costs and prices are non-negative and fit NUMERIC(14,4)
pub fn validate_price(field: &str, price: Option<Decimal>) -> Result<(), StockError> {
    match price {
        Some(p) if p < Decimal::ZERO => Err(StockError::validation(field, "cannot be negative")),
        Some(p) if p > Decimal::new(99_999_999_999_999, 4) => {
            Err(StockError::validation(field, "is out of range"))
        }
        _ => Ok(()),
    }
}
