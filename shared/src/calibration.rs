//! Tank calibration (barremage) curves
//!
//! A calibration curve maps a dip-stick height in centimetres to the volume
//! in litres contained by a physical tank. Conversions in both directions are
//! monotonic piecewise-linear interpolations clamped to the calibrated range.
//!
//! Curves arrive as loosely-typed JSON (`hauteur`, `hauteur_cm`, `volume_litres`
//! and friends). They are normalized into [`CalibrationPoint`]s once, when the
//! curve is built, so the interpolation code only ever sees typed points.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

const HEIGHT_KEYS: [&str; 4] = ["height", "height_cm", "hauteur", "hauteur_cm"];
const VOLUME_KEYS: [&str; 4] = ["volume", "volume_l", "volume_litres", "volume_liters"];

/// One control point of a calibration curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    /// Dip height in centimetres
    pub height: Decimal,
    /// Contained volume in litres
    pub volume: Decimal,
}

impl CalibrationPoint {
    pub fn new(height: Decimal, volume: Decimal) -> Self {
        Self { height, volume }
    }
}

/// Reasons a calibration curve cannot be built
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalibrationError {
    #[error("calibration curve has no points")]
    Empty,

    #[error("calibration data must be a list of {{height, volume}} points")]
    NotAList,

    #[error("calibration point #{index} is malformed: {reason}")]
    MalformedPoint { index: usize, reason: String },

    #[error("calibration point #{index} has a negative height")]
    NegativeHeight { index: usize },

    #[error("calibration point #{index} has a negative volume")]
    NegativeVolume { index: usize },

    #[error("calibration point #{index} is beyond the storable range")]
    OutOfRange { index: usize },
}

/// Largest dip height a curve point may carry (NUMERIC(10,2))
pub fn max_calibrated_height() -> Decimal {
    Decimal::new(9_999_999_999, 2)
}

/// Largest volume a curve point may carry (NUMERIC(14,2))
pub fn max_calibrated_volume() -> Decimal {
    Decimal::new(99_999_999_999_999, 2)
}

/// Height/volume lookup table for a single tank.
///
/// Always holds at least one point. Points are kept twice: sorted by height
/// for [`volume_at`](Self::volume_at) and sorted by volume for
/// [`height_at`](Self::height_at). Duplicate keys keep their first occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalibrationCurve {
    points: Vec<CalibrationPoint>,
    #[serde(skip)]
    by_volume: Vec<CalibrationPoint>,
}

impl CalibrationCurve {
    /// Build a curve from points in any order
    pub fn new(points: Vec<CalibrationPoint>) -> Result<Self, CalibrationError> {
        if points.is_empty() {
            return Err(CalibrationError::Empty);
        }

        for (index, point) in points.iter().enumerate() {
            if point.height < Decimal::ZERO {
                return Err(CalibrationError::NegativeHeight { index });
            }
            if point.volume < Decimal::ZERO {
                return Err(CalibrationError::NegativeVolume { index });
            }
            if point.height > max_calibrated_height() || point.volume > max_calibrated_volume() {
                return Err(CalibrationError::OutOfRange { index });
            }
        }

        // Stable sorts keep input order among equal keys, so dedup keeps the first occurrence.
        let mut by_height = points.clone();
        by_height.sort_by(|a, b| a.height.cmp(&b.height));
        by_height.dedup_by(|later, kept| later.height == kept.height);

        let mut by_volume = points;
        by_volume.sort_by(|a, b| a.volume.cmp(&b.volume));
        by_volume.dedup_by(|later, kept| later.volume == kept.volume);

        Ok(Self {
            points: by_height,
            by_volume,
        })
    }

    /// Normalize a stored JSON curve.
    ///
    /// Accepts either a bare array of points or an object with a `points`
    /// array. Numbers may be JSON numbers or numeric strings.
    pub fn from_json(value: &Value) -> Result<Self, CalibrationError> {
        let raw = match value {
            Value::Array(items) => items,
            Value::Object(map) => match map.get("points") {
                Some(Value::Array(items)) => items,
                _ => return Err(CalibrationError::NotAList),
            },
            _ => return Err(CalibrationError::NotAList),
        };

        let points = raw
            .iter()
            .enumerate()
            .map(|(index, item)| parse_point(index, item))
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(points)
    }

    /// Canonical JSON representation (`[{"height": .., "volume": ..}, ..]`)
    pub fn to_json(&self) -> Value {
        Value::Array(
            self.points
                .iter()
                .map(|p| {
                    serde_json::json!({
                        "height": p.height.to_string(),
                        "volume": p.volume.to_string(),
                    })
                })
                .collect(),
        )
    }

    /// Points sorted by height
    pub fn points(&self) -> &[CalibrationPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn min_height(&self) -> Decimal {
        self.points[0].height
    }

    pub fn max_height(&self) -> Decimal {
        self.points[self.points.len() - 1].height
    }

    pub fn max_volume(&self) -> Decimal {
        self.by_volume[self.by_volume.len() - 1].volume
    }

    /// Volume in litres for a dip height, clamped to the calibrated range
    pub fn volume_at(&self, height: Decimal) -> Decimal {
        interpolate(&self.points, height, |p| p.height, |p| p.volume)
    }

    /// Dip height for a volume, clamped to the calibrated range
    pub fn height_at(&self, volume: Decimal) -> Decimal {
        interpolate(&self.by_volume, volume, |p| p.volume, |p| p.height)
    }
}

impl<'de> Deserialize<'de> for CalibrationCurve {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::from_json(&value).map_err(serde::de::Error::custom)
    }
}

fn interpolate(
    sorted: &[CalibrationPoint],
    x: Decimal,
    key: impl Fn(&CalibrationPoint) -> Decimal,
    value: impl Fn(&CalibrationPoint) -> Decimal,
) -> Decimal {
    let first = &sorted[0];
    let last = &sorted[sorted.len() - 1];

    if x <= key(first) {
        return value(first).round_dp(2);
    }
    if x >= key(last) {
        return value(last).round_dp(2);
    }

    for pair in sorted.windows(2) {
        let (lo, hi) = (&pair[0], &pair[1]);
        let (x_lo, x_hi) = (key(lo), key(hi));

        if x < x_lo || x > x_hi {
            continue;
        }
        if x == x_lo {
            return value(lo).round_dp(2);
        }
        if x == x_hi {
            return value(hi).round_dp(2);
        }

        // Point bounds checked in `new` keep this product below 1e21
        let (y_lo, y_hi) = (value(lo), value(hi));
        let y = y_lo + (y_hi - y_lo) * (x - x_lo) / (x_hi - x_lo);
        return y.round_dp(2);
    }

    // Unreachable for a sorted, deduplicated curve; fall back to the top point.
    value(last).round_dp(2)
}

fn parse_point(index: usize, item: &Value) -> Result<CalibrationPoint, CalibrationError> {
    let map = item
        .as_object()
        .ok_or_else(|| CalibrationError::MalformedPoint {
            index,
            reason: "expected an object".to_string(),
        })?;

    let height = first_number(index, map, &HEIGHT_KEYS, "height")?;
    let volume = first_number(index, map, &VOLUME_KEYS, "volume")?;

    Ok(CalibrationPoint { height, volume })
}

fn first_number(
    index: usize,
    map: &serde_json::Map<String, Value>,
    keys: &[&str],
    label: &str,
) -> Result<Decimal, CalibrationError> {
    let raw = keys
        .iter()
        .find_map(|k| map.get(*k))
        .ok_or_else(|| CalibrationError::MalformedPoint {
            index,
            reason: format!("missing {}", label),
        })?;

    decimal_from_json(raw).ok_or_else(|| CalibrationError::MalformedPoint {
        index,
        reason: format!("{} is not a number", label),
    })
}

fn decimal_from_json(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn normalizes_french_field_names() {
        let json = serde_json::json!([
            {"hauteur_cm": 100, "volume_litres": "10000"},
            {"hauteur": 0, "volume": 0},
        ]);
        let curve = CalibrationCurve::from_json(&json).unwrap();
        assert_eq!(curve.len(), 2);
        assert_eq!(curve.min_height(), Decimal::ZERO);
        assert_eq!(curve.volume_at(dec("50")), dec("5000.00"));
    }

    #[test]
    fn rejects_malformed_points() {
        let json = serde_json::json!([{"height": 10}]);
        assert!(matches!(
            CalibrationCurve::from_json(&json),
            Err(CalibrationError::MalformedPoint { index: 0, .. })
        ));
        assert_eq!(
            CalibrationCurve::from_json(&serde_json::json!({"foo": 1})),
            Err(CalibrationError::NotAList)
        );
        assert_eq!(
            CalibrationCurve::from_json(&serde_json::json!([])),
            Err(CalibrationError::Empty)
        );
    }

    #[test]
    fn duplicate_heights_keep_first_occurrence() {
        let curve = CalibrationCurve::new(vec![
            CalibrationPoint::new(dec("10"), dec("100")),
            CalibrationPoint::new(dec("10"), dec("999")),
            CalibrationPoint::new(dec("0"), dec("0")),
        ])
        .unwrap();
        assert_eq!(curve.len(), 2);
        assert_eq!(curve.volume_at(dec("10")), dec("100"));
    }

    #[test]
    fn single_point_curve_is_constant() {
        let curve = CalibrationCurve::new(vec![CalibrationPoint::new(dec("20"), dec("500"))]).unwrap();
        assert_eq!(curve.volume_at(dec("0")), dec("500"));
        assert_eq!(curve.volume_at(dec("80")), dec("500"));
        assert_eq!(curve.height_at(dec("1")), dec("20"));
    }

    #[test]
    fn round_trips_through_serde() {
        let curve = CalibrationCurve::new(vec![
            CalibrationPoint::new(dec("0"), dec("0")),
            CalibrationPoint::new(dec("150"), dec("30000")),
        ])
        .unwrap();
        let text = serde_json::to_string(&curve.to_json()).unwrap();
        let back: CalibrationCurve = serde_json::from_str(&text).unwrap();
        assert_eq!(back, curve);
    }
}
