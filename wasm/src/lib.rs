//! WebAssembly module for fuel-station stock management
//!
//! Provides client-side computation for:
//! - Gauge height / volume conversion against a calibration curve
//! - Previewing a single movement before submitting it
//! - Offline validation of a planned batch of movements
//! - Delivery variance checks
//!
//! Quantities cross the boundary as decimal strings so no precision is lost
//! to JavaScript numbers.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use wasm_bindgen::prelude::*;

// Re-export shared types for use in JavaScript
pub use shared::models::*;
pub use shared::types::*;
pub use shared::validation::*;

use shared::{
    detect_delivery_variance, plan_from, select_matching_line, CalibrationCurve, MovementRequest,
    TankLedger, TankProfile,
};

/// Initialize the WASM module
#[wasm_bindgen(start)]
pub fn init() {
    log(&format!("fuel-station-stock wasm module loaded at {}", loaded_at()));
}

#[cfg(target_arch = "wasm32")]
fn log(message: &str) {
    web_sys::console::log_1(&JsValue::from_str(message));
}

#[cfg(not(target_arch = "wasm32"))]
fn log(_message: &str) {}

#[cfg(target_arch = "wasm32")]
fn loaded_at() -> String {
    String::from(js_sys::Date::new_0().to_iso_string())
}

#[cfg(not(target_arch = "wasm32"))]
fn loaded_at() -> String {
    Utc::now().to_rfc3339()
}

fn to_js(err: String) -> JsValue {
    JsValue::from_str(&err)
}

fn parse_decimal(field: &str, raw: &str) -> Result<Decimal, String> {
    Decimal::from_str(raw.trim()).map_err(|e| format!("{} is not a decimal: {}", field, e))
}

fn parse_curve(curve_json: &str) -> Result<CalibrationCurve, String> {
    let raw: serde_json::Value =
        serde_json::from_str(curve_json).map_err(|e| format!("Invalid curve JSON: {}", e))?;
    CalibrationCurve::from_json(&raw).map_err(|e| e.to_string())
}

/// Volume in litres for a gauge height in centimetres
#[wasm_bindgen]
pub fn volume_at_height(curve_json: &str, height: &str) -> Result<String, JsValue> {
    volume_at_height_inner(curve_json, height).map_err(to_js)
}

fn volume_at_height_inner(curve_json: &str, height: &str) -> Result<String, String> {
    let curve = parse_curve(curve_json)?;
    let height = parse_decimal("height", height)?;
    Ok(curve.volume_at(height).to_string())
}

/// Gauge height in centimetres for a volume in litres
#[wasm_bindgen]
pub fn height_at_volume(curve_json: &str, volume: &str) -> Result<String, JsValue> {
    height_at_volume_inner(curve_json, volume).map_err(to_js)
}

fn height_at_volume_inner(curve_json: &str, volume: &str) -> Result<String, String> {
    let curve = parse_curve(curve_json)?;
    let volume = parse_decimal("volume", volume)?;
    Ok(curve.height_at(volume).to_string())
}

/// Normalize a loosely-typed curve; returns the canonical points as JSON
#[wasm_bindgen]
pub fn normalize_curve(curve_json: &str) -> Result<String, JsValue> {
    parse_curve(curve_json)
        .map(|curve| curve.to_json().to_string())
        .map_err(to_js)
}

/// Stock before/after a movement, or the reason it would be rejected
#[wasm_bindgen]
pub fn preview_movement(
    stock_before: &str,
    capacity: &str,
    kind: &str,
    quantity: &str,
) -> Result<String, JsValue> {
    preview_movement_inner(stock_before, capacity, kind, quantity).map_err(to_js)
}

fn preview_movement_inner(
    stock_before: &str,
    capacity: &str,
    kind: &str,
    quantity: &str,
) -> Result<String, String> {
    let stock_before = parse_decimal("stock_before", stock_before)?;
    let capacity = parse_decimal("capacity", capacity)?;
    let quantity = parse_decimal("quantity", quantity)?;
    let kind: MovementKind = kind.parse().map_err(|e: shared::StockError| e.to_string())?;

    let effect = plan_from(Uuid::nil(), capacity, stock_before, kind, quantity)
        .map_err(|e| e.to_string())?;

    Ok(serde_json::json!({
        "kind": kind,
        "quantity": quantity,
        "stock_before": effect.stock_before,
        "stock_after": effect.stock_after,
    })
    .to_string())
}

/// A movement planned on the client
#[derive(Debug, Deserialize)]
struct PlannedMovement {
    kind: MovementKind,
    quantity: Decimal,
    movement_at: DateTime<Utc>,
    #[serde(default = "default_origin")]
    origin_module: String,
    #[serde(default)]
    origin_reference: String,
    #[serde(default)]
    unit_cost: Option<Decimal>,
}

fn default_origin() -> String {
    "offline".to_string()
}

/// A batch to validate: a tank, its starting reading and planned movements
#[derive(Debug, Deserialize)]
struct MovementBatch {
    capacity: Decimal,
    calibration: CalibrationCurve,
    gauge_height: Decimal,
    initialized_at: DateTime<Utc>,
    movements: Vec<PlannedMovement>,
}

#[derive(Debug, Serialize)]
struct BatchLine {
    index: usize,
    accepted: bool,
    stock_before: Option<Decimal>,
    stock_after: Option<Decimal>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct BatchReport {
    initial_volume: Decimal,
    final_stock: Decimal,
    accepted: usize,
    rejected: usize,
    lines: Vec<BatchLine>,
}

/// Replay a planned batch through the ledger rules.
///
/// Rejected movements are reported and skipped; later movements are planned
/// on top of the accepted ones.
#[wasm_bindgen]
pub fn validate_movement_batch(batch_json: &str) -> Result<String, JsValue> {
    validate_movement_batch_inner(batch_json).map_err(to_js)
}

fn validate_movement_batch_inner(batch_json: &str) -> Result<String, String> {
    let batch: MovementBatch =
        serde_json::from_str(batch_json).map_err(|e| format!("Invalid batch JSON: {}", e))?;

    let mut ledger = TankLedger::new(TankProfile {
        tank_id: Uuid::nil(),
        capacity: batch.capacity,
        curve: batch.calibration,
    });
    let initial = ledger
        .initialize(batch.gauge_height, batch.initialized_at, Uuid::nil())
        .map_err(|e| e.to_string())?;

    let mut lines = Vec::with_capacity(batch.movements.len());
    for (index, planned) in batch.movements.into_iter().enumerate() {
        let mut request = MovementRequest::new(
            planned.kind,
            planned.quantity,
            planned.movement_at,
            planned.origin_module,
            planned.origin_reference,
            Uuid::nil(),
        );
        request.unit_cost = planned.unit_cost;

        lines.push(match ledger.append(request) {
            Ok(movement) => BatchLine {
                index,
                accepted: true,
                stock_before: Some(movement.stock_before),
                stock_after: Some(movement.stock_after),
                error: None,
            },
            Err(e) => BatchLine {
                index,
                accepted: false,
                stock_before: None,
                stock_after: None,
                error: Some(e.to_string()),
            },
        });
    }

    let accepted = lines.iter().filter(|l| l.accepted).count();
    let report = BatchReport {
        initial_volume: initial.computed_volume,
        final_stock: ledger.current_stock(),
        accepted,
        rejected: lines.len() - accepted,
        lines,
    };

    serde_json::to_string(&report).map_err(|e| e.to_string())
}

/// Variance of a delivery against the best matching purchase-order line;
/// returns `null` when within tolerance or unmatched
#[wasm_bindgen]
pub fn check_delivery_variance(
    delivery_json: &str,
    lines_json: &str,
    tolerance: &str,
    window_days: i32,
) -> Result<String, JsValue> {
    check_delivery_variance_inner(delivery_json, lines_json, tolerance, window_days).map_err(to_js)
}

fn check_delivery_variance_inner(
    delivery_json: &str,
    lines_json: &str,
    tolerance: &str,
    window_days: i32,
) -> Result<String, String> {
    let delivery: Delivery =
        serde_json::from_str(delivery_json).map_err(|e| format!("Invalid delivery JSON: {}", e))?;
    let lines: Vec<PurchaseOrderLine> =
        serde_json::from_str(lines_json).map_err(|e| format!("Invalid lines JSON: {}", e))?;
    let tolerance = parse_decimal("tolerance", tolerance)?;

    let variance = select_matching_line(&delivery, &lines, i64::from(window_days))
        .and_then(|line| detect_delivery_variance(&delivery, line, tolerance));

    serde_json::to_string(&variance).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CURVE: &str = r#"[
        {"hauteur_cm": 0, "volume_litres": 0},
        {"hauteur_cm": 100, "volume_litres": 10000}
    ]"#;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn dec_field(value: &serde_json::Value) -> Decimal {
        dec(value.as_str().unwrap())
    }

    #[test]
    fn test_conversions() {
        assert_eq!(dec(&volume_at_height_inner(CURVE, "50").unwrap()), dec("5000"));
        assert_eq!(dec(&height_at_volume_inner(CURVE, "2500").unwrap()), dec("25"));
        assert!(volume_at_height_inner(CURVE, "fifty").is_err());
        assert!(volume_at_height_inner("[]", "50").is_err());
    }

    #[test]
    fn test_preview_movement() {
        let preview: serde_json::Value =
            serde_json::from_str(&preview_movement_inner("5000", "10000", "entry", "2000").unwrap())
                .unwrap();
        assert_eq!(dec_field(&preview["stock_after"]), dec("7000"));

        let err = preview_movement_inner("7000", "10000", "exit", "9000").unwrap_err();
        assert!(err.contains("would leave -2000"), "{}", err);

        assert!(preview_movement_inner("0", "10000", "refill", "1").is_err());

        let max = "79228162514264337593543950335";
        assert!(preview_movement_inner("5000", "10000", "entry", max).is_err());
        assert!(preview_movement_inner(max, max, "entry", "1").is_err());
        assert!(preview_movement_inner("5000", "10000", "entry", "0.004").is_err());
    }

    #[test]
    fn test_batch_skips_rejected_movements() {
        let batch = format!(
            r#"{{
                "capacity": "10000",
                "calibration": {},
                "gauge_height": "50",
                "initialized_at": "2026-01-01T06:00:00Z",
                "movements": [
                    {{"kind": "entry", "quantity": "2000", "movement_at": "2026-01-01T08:00:00Z"}},
                    {{"kind": "exit", "quantity": "9000", "movement_at": "2026-01-01T09:00:00Z"}},
                    {{"kind": "exit", "quantity": "1500", "movement_at": "2026-01-01T10:00:00Z"}}
                ]
            }}"#,
            CURVE
        );

        let report: serde_json::Value =
            serde_json::from_str(&validate_movement_batch_inner(&batch).unwrap()).unwrap();
        assert_eq!(report["accepted"], 2);
        assert_eq!(report["rejected"], 1);
        assert_eq!(dec_field(&report["final_stock"]), dec("5500"));
        assert_eq!(report["lines"][1]["accepted"], false);
    }
}

#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use super::*;
    use wasm_bindgen_test::*;

    #[wasm_bindgen_test]
    fn test_exported_conversion_reports_errors() {
        let curve = r#"[{"height": 0, "volume": 0}, {"height": 10, "volume": 800}]"#;
        let volume = volume_at_height(curve, "5").unwrap();
        assert_eq!(Decimal::from_str(&volume).unwrap(), Decimal::from(400));
        assert!(volume_at_height("[]", "5").is_err());
    }
}
