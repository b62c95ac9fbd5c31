//! Delivery variance tests
//!
//! Tests for comparing declared delivery quantities with purchase orders:
//! - Purchase-order line matching window
//! - Tolerance threshold and direction
//! - Percentage computation

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    default_tolerance, detect_delivery_variance, select_matching_line, Delivery,
    PurchaseOrderLine, VarianceDirection, DEFAULT_WINDOW_DAYS,
};
use std::str::FromStr;
use uuid::Uuid;

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn delivered_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 10, 14, 30, 0).unwrap()
}

fn delivery(tank_id: Uuid, declared: &str) -> Delivery {
    Delivery {
        id: Uuid::new_v4(),
        tank_id,
        declared_quantity: dec(declared),
        delivered_at: delivered_at(),
        supplier_reference: Some("BL-2026-0410".to_string()),
    }
}

fn line(tank_id: Uuid, ordered: &str, expected: NaiveDate, created_offset_min: i64) -> PurchaseOrderLine {
    PurchaseOrderLine {
        id: Uuid::new_v4(),
        tank_id,
        ordered_quantity: dec(ordered),
        unit_price: Some(dec("1.21")),
        expected_date: expected,
        created_at: delivered_at() - Duration::days(10) + Duration::minutes(created_offset_min),
    }
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 4, d).unwrap()
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        assert_eq!(default_tolerance(), dec("0.05"));
        assert_eq!(DEFAULT_WINDOW_DAYS, 3);
    }

    #[test]
    fn test_shortage_beyond_tolerance() {
        let tank = Uuid::new_v4();
        let d = delivery(tank, "9000");
        let l = line(tank, "10000", day(10), 0);

        let variance = detect_delivery_variance(&d, &l, default_tolerance()).unwrap();
        assert_eq!(variance.direction, VarianceDirection::Shortage);
        assert_eq!(variance.absolute_difference, dec("1000"));
        assert_eq!(variance.percentage_difference, dec("10"));
        assert_eq!(variance.delivery_id, d.id);
        assert_eq!(variance.purchase_order_line_id, l.id);
    }

    #[test]
    fn test_overage_beyond_tolerance() {
        let tank = Uuid::new_v4();
        let variance = detect_delivery_variance(
            &delivery(tank, "10600"),
            &line(tank, "10000", day(10), 0),
            default_tolerance(),
        )
        .unwrap();
        assert_eq!(variance.direction, VarianceDirection::Overage);
        assert_eq!(variance.percentage_difference, dec("6"));
    }

    #[test]
    fn test_within_tolerance_is_none() {
        let tank = Uuid::new_v4();
        let l = line(tank, "10000", day(10), 0);
        assert!(detect_delivery_variance(&delivery(tank, "9600"), &l, default_tolerance()).is_none());
        assert!(detect_delivery_variance(&delivery(tank, "10000"), &l, default_tolerance()).is_none());
        // Exactly at the tolerance is still acceptable
        assert!(detect_delivery_variance(&delivery(tank, "9500"), &l, default_tolerance()).is_none());
        assert!(detect_delivery_variance(&delivery(tank, "9499.99"), &l, default_tolerance()).is_some());
    }

    #[test]
    fn test_zero_ordered_quantity_is_ignored() {
        let tank = Uuid::new_v4();
        let l = line(tank, "0", day(10), 0);
        assert!(detect_delivery_variance(&delivery(tank, "5000"), &l, default_tolerance()).is_none());
    }

    #[test]
    fn test_percentage_is_rounded() {
        let tank = Uuid::new_v4();
        let variance = detect_delivery_variance(
            &delivery(tank, "2000"),
            &line(tank, "3000", day(10), 0),
            default_tolerance(),
        )
        .unwrap();
        assert_eq!(variance.percentage_difference, dec("33.33"));
    }

    #[test]
    fn test_matching_picks_latest_line_in_window() {
        let tank = Uuid::new_v4();
        let d = delivery(tank, "10000");
        let lines = vec![
            line(tank, "8000", day(7), 0),
            line(tank, "9000", day(12), 0),
            line(tank, "9500", day(12), 5),
            line(tank, "7000", day(14), 0),
            line(Uuid::new_v4(), "6000", day(11), 0),
        ];

        let matched = select_matching_line(&d, &lines, DEFAULT_WINDOW_DAYS).unwrap();
        // Latest expected date within ±3 days, newest line on ties
        assert_eq!(matched.ordered_quantity, dec("9500"));
    }

    #[test]
    fn test_matching_window_edges() {
        let tank = Uuid::new_v4();
        let d = delivery(tank, "10000");

        let before = vec![line(tank, "10000", day(7), 0)];
        assert!(select_matching_line(&d, &before, DEFAULT_WINDOW_DAYS).is_some());

        let outside = vec![line(tank, "10000", day(6), 0), line(tank, "10000", day(14), 0)];
        assert!(select_matching_line(&d, &outside, DEFAULT_WINDOW_DAYS).is_none());

        let other_tank = vec![line(Uuid::new_v4(), "10000", day(10), 0)];
        assert!(select_matching_line(&d, &other_tank, DEFAULT_WINDOW_DAYS).is_none());
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    fn litres_strategy() -> impl Strategy<Value = Decimal> {
        (1i64..40_000).prop_map(Decimal::from)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// A variance is reported exactly when the relative gap exceeds tolerance
        #[test]
        fn prop_variance_threshold(declared in litres_strategy(), ordered in litres_strategy()) {
            let tank = Uuid::new_v4();
            let mut d = delivery(tank, "1");
            d.declared_quantity = declared;
            let mut l = line(tank, "1", day(10), 0);
            l.ordered_quantity = ordered;

            let gap = (declared - ordered).abs() / ordered;
            match detect_delivery_variance(&d, &l, default_tolerance()) {
                Some(v) => {
                    prop_assert!(gap > default_tolerance());
                    prop_assert_eq!(v.absolute_difference, (declared - ordered).abs());
                    let expected = if declared < ordered {
                        VarianceDirection::Shortage
                    } else {
                        VarianceDirection::Overage
                    };
                    prop_assert_eq!(v.direction, expected);
                    prop_assert!(v.percentage_difference >= dec("5"));
                }
                None => prop_assert!(gap <= default_tolerance()),
            }
        }

        /// Lines expected outside the window never match
        #[test]
        fn prop_window_bounds(offset in -10i64..=10) {
            let tank = Uuid::new_v4();
            let d = delivery(tank, "1000");
            let lines = vec![line(tank, "1000", day(10) + Duration::days(offset), 0)];

            let matched = select_matching_line(&d, &lines, DEFAULT_WINDOW_DAYS).is_some();
            prop_assert_eq!(matched, offset.abs() <= DEFAULT_WINDOW_DAYS);
        }
    }
}
