//! Stock ledger tests
//!
//! Tests for the per-tank movement ledger including:
//! - Stock before/after snapshots per movement kind
//! - Capacity and negative-stock guards
//! - Ledger conservation
//! - Cancellation and compensation
//! - Point-in-time replay

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    plan_from, weighted_average_cost, CalibrationCurve, CalibrationPoint, MovementKind,
    MovementRequest, MovementStatus, StockError, TankLedger, TankProfile, COMPENSATION_ORIGIN,
};
use std::str::FromStr;
use uuid::Uuid;

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 6, 0, 0).unwrap()
}

fn at(hours: i64) -> DateTime<Utc> {
    t0() + Duration::hours(hours)
}

fn operator() -> Uuid {
    Uuid::from_u128(7)
}

/// 10 000 L tank calibrated linearly over 100 cm
fn tank_ledger() -> TankLedger {
    TankLedger::new(TankProfile {
        tank_id: Uuid::new_v4(),
        capacity: dec("10000"),
        curve: CalibrationCurve::new(vec![
            CalibrationPoint::new(dec("0"), dec("0")),
            CalibrationPoint::new(dec("100"), dec("10000")),
        ])
        .unwrap(),
    })
}

fn request(kind: MovementKind, quantity: &str, hours: i64) -> MovementRequest {
    MovementRequest::new(
        kind,
        dec(quantity),
        at(hours),
        "sales",
        format!("ref-{}", hours),
        operator(),
    )
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_initial_state_sets_current_stock() {
        let mut ledger = tank_ledger();
        let state = ledger.initialize(dec("50"), t0(), operator()).unwrap();

        assert_eq!(state.computed_volume, dec("5000.00"));
        assert_eq!(ledger.current_stock(), dec("5000.00"));

        let first = &ledger.movements()[0];
        assert_eq!(first.kind, MovementKind::InitialStock);
        assert_eq!(first.stock_before, Decimal::ZERO);
        assert_eq!(first.stock_after, dec("5000.00"));

        let cache = ledger.cached().unwrap();
        assert_eq!(cache.theoretical_quantity, dec("5000.00"));
        assert_eq!(cache.real_quantity, Some(dec("5000.00")));
    }

    #[test]
    fn test_entry_records_before_and_after() {
        let mut ledger = tank_ledger();
        ledger.initialize(dec("50"), t0(), operator()).unwrap();

        let movement = ledger.append(request(MovementKind::Entry, "2000", 1)).unwrap();
        assert_eq!(movement.stock_before, dec("5000"));
        assert_eq!(movement.stock_after, dec("7000"));
        assert_eq!(ledger.current_stock(), dec("7000"));
        assert_eq!(ledger.cached().unwrap().theoretical_quantity, dec("7000"));
    }

    #[test]
    fn test_oversized_exit_is_rejected_without_effect() {
        let mut ledger = tank_ledger();
        ledger.initialize(dec("50"), t0(), operator()).unwrap();
        ledger.append(request(MovementKind::Entry, "2000", 1)).unwrap();

        let err = ledger
            .append(request(MovementKind::Exit, "9000", 2))
            .unwrap_err();
        match err {
            StockError::InsufficientStock {
                quantity,
                stock_before,
                stock_after,
                ..
            } => {
                assert_eq!(quantity, dec("9000"));
                assert_eq!(stock_before, dec("7000"));
                assert_eq!(stock_after, dec("-2000"));
            }
            other => panic!("expected InsufficientStock, got {:?}", other),
        }
        assert_eq!(ledger.current_stock(), dec("7000"));
        assert_eq!(ledger.movements().len(), 2);
    }

    #[test]
    fn test_entry_beyond_capacity_is_rejected() {
        let mut ledger = tank_ledger();
        ledger.initialize(dec("50"), t0(), operator()).unwrap();

        let err = ledger
            .append(request(MovementKind::Entry, "5000.01", 1))
            .unwrap_err();
        assert!(matches!(err, StockError::CapacityExceeded { capacity, .. } if capacity == dec("10000")));
        assert_eq!(ledger.current_stock(), dec("5000"));

        // Filling exactly to capacity is allowed
        ledger.append(request(MovementKind::Entry, "5000", 2)).unwrap();
        assert_eq!(ledger.current_stock(), dec("10000"));
    }

    #[test]
    fn test_adjustment_sets_absolute_stock() {
        let mut ledger = tank_ledger();
        ledger.initialize(dec("50"), t0(), operator()).unwrap();

        let movement = ledger.append(request(MovementKind::Adjustment, "4200", 1)).unwrap();
        assert_eq!(movement.stock_before, dec("5000"));
        assert_eq!(movement.stock_after, dec("4200"));

        let emptied = ledger.append(request(MovementKind::Adjustment, "0", 2)).unwrap();
        assert_eq!(emptied.stock_after, Decimal::ZERO);

        assert!(matches!(
            ledger.append(request(MovementKind::Adjustment, "10001", 3)),
            Err(StockError::CapacityExceeded { .. })
        ));
    }

    #[test]
    fn test_signed_adjustments_add_and_remove() {
        let mut ledger = tank_ledger();
        ledger.initialize(dec("50"), t0(), operator()).unwrap();

        ledger
            .append(request(MovementKind::PositiveAdjustment, "120.5", 1))
            .unwrap();
        ledger
            .append(request(MovementKind::NegativeAdjustment, "20.5", 2))
            .unwrap();
        assert_eq!(ledger.current_stock(), dec("5100"));
    }

    #[test]
    fn test_non_positive_quantities_are_rejected() {
        let mut ledger = tank_ledger();
        ledger.initialize(dec("50"), t0(), operator()).unwrap();

        for kind in [
            MovementKind::Entry,
            MovementKind::Exit,
            MovementKind::PositiveAdjustment,
            MovementKind::NegativeAdjustment,
        ] {
            assert!(matches!(
                ledger.append(request(kind, "0", 1)),
                Err(StockError::Validation { ref field, .. }) if field == "quantity"
            ));
        }
        assert!(matches!(
            ledger.append(request(MovementKind::Adjustment, "-1", 1)),
            Err(StockError::Validation { .. })
        ));
    }

    #[test]
    fn test_initial_stock_cannot_be_appended_directly() {
        let mut ledger = tank_ledger();
        ledger.initialize(dec("50"), t0(), operator()).unwrap();

        assert!(matches!(
            ledger.append(request(MovementKind::InitialStock, "100", 1)),
            Err(StockError::Validation { ref field, .. }) if field == "kind"
        ));
    }

    #[test]
    fn test_movement_before_initialization_is_rejected() {
        let mut ledger = tank_ledger();
        ledger.initialize(dec("50"), t0(), operator()).unwrap();

        assert!(matches!(
            ledger.append(request(MovementKind::Entry, "100", -1)),
            Err(StockError::Validation { ref field, .. }) if field == "movement_at"
        ));
    }

    #[test]
    fn test_uninitialized_tank_starts_empty() {
        let mut ledger = tank_ledger();
        assert_eq!(ledger.current_stock(), Decimal::ZERO);

        let movement = ledger.append(request(MovementKind::Entry, "800", 0)).unwrap();
        assert_eq!(movement.stock_before, Decimal::ZERO);
        assert!(matches!(
            ledger.append(request(MovementKind::Exit, "801", 1)),
            Err(StockError::InsufficientStock { .. })
        ));
    }

    #[test]
    fn test_latest_movement_orders_by_time_then_insertion() {
        let mut ledger = tank_ledger();
        ledger.initialize(dec("50"), t0(), operator()).unwrap();

        ledger.append(request(MovementKind::Entry, "1000", 5)).unwrap();
        // Same timestamp: the later insertion wins
        let second = ledger.append(request(MovementKind::Exit, "300", 5)).unwrap();
        assert_eq!(second.stock_before, dec("6000"));
        assert_eq!(ledger.latest().unwrap().id, second.id);
        assert_eq!(ledger.current_stock(), dec("5700"));

        // A back-dated movement would fork the before/after chain
        assert!(matches!(
            ledger.append(request(MovementKind::Entry, "100", 2)),
            Err(StockError::Validation { ref field, .. }) if field == "movement_at"
        ));
        assert_eq!(ledger.latest().unwrap().id, second.id);
        assert_eq!(ledger.current_stock(), dec("5700"));
        assert_eq!(ledger.movements().len(), 3);
    }

    #[test]
    fn test_back_dated_movement_keeps_stock_views_aligned() {
        let mut ledger = tank_ledger();
        ledger.initialize(dec("50"), t0(), operator()).unwrap();
        ledger.append(request(MovementKind::Entry, "2000", 10)).unwrap();

        let err = ledger.append(request(MovementKind::Exit, "1000", 5)).unwrap_err();
        assert!(matches!(err, StockError::Validation { ref field, .. } if field == "movement_at"));

        let replayed = ledger.theoretical_stock_at(at(24)).unwrap().volume;
        assert_eq!(ledger.current_stock(), dec("7000"));
        assert_eq!(ledger.cached().unwrap().theoretical_quantity, dec("7000"));
        assert_eq!(replayed, dec("7000"));

        // Dated at or after the latest movement it goes through
        ledger.append(request(MovementKind::Exit, "1000", 10)).unwrap();
        assert_eq!(ledger.current_stock(), dec("6000"));
        assert_eq!(ledger.theoretical_stock_at(at(24)).unwrap().volume, dec("6000"));
    }

    #[test]
    fn test_cancelled_latest_no_longer_bounds_dates() {
        let mut ledger = tank_ledger();
        ledger.initialize(dec("50"), t0(), operator()).unwrap();
        let mut late = request(MovementKind::Entry, "500", 10);
        late.origin_reference = "DEL-LATE".to_string();
        ledger.append(late).unwrap();
        ledger.cancel_movements_for("DEL-LATE");

        let sale = ledger.append(request(MovementKind::Exit, "200", 5)).unwrap();
        assert_eq!(sale.stock_before, dec("5000"));
        assert_eq!(ledger.current_stock(), dec("4800"));
    }

    #[test]
    fn test_oversized_quantities_are_rejected_without_panicking() {
        let tank_id = Uuid::new_v4();
        assert!(matches!(
            plan_from(tank_id, dec("10000"), dec("5000"), MovementKind::Entry, Decimal::MAX),
            Err(StockError::Validation { ref field, .. }) if field == "quantity"
        ));
        assert!(matches!(
            plan_from(tank_id, dec("10000"), dec("5000"), MovementKind::Adjustment, Decimal::MAX),
            Err(StockError::Validation { .. })
        ));
        // An out-of-range starting stock cannot overflow either
        assert!(matches!(
            plan_from(tank_id, Decimal::MAX, Decimal::MAX, MovementKind::Entry, dec("1")),
            Err(StockError::Validation { .. })
        ));
        assert!(matches!(
            plan_from(tank_id, dec("10000"), Decimal::MIN, MovementKind::Exit, dec("1")),
            Err(StockError::Validation { .. })
        ));

        let mut ledger = tank_ledger();
        ledger.initialize(dec("50"), t0(), operator()).unwrap();
        let mut huge = request(MovementKind::Entry, "1", 1);
        huge.quantity = dec("79228162514264337593543950335");
        assert!(ledger.append(huge).is_err());
        assert_eq!(ledger.current_stock(), dec("5000"));
    }

    #[test]
    fn test_quantities_are_limited_to_centilitres() {
        let tank_id = Uuid::new_v4();
        assert!(matches!(
            plan_from(tank_id, dec("10000"), dec("5000"), MovementKind::Entry, dec("0.004")),
            Err(StockError::Validation { ref field, .. }) if field == "quantity"
        ));
        // Trailing zeros are not extra precision
        let effect =
            plan_from(tank_id, dec("10000"), dec("5000"), MovementKind::Entry, dec("1.500")).unwrap();
        assert_eq!(effect.stock_after, dec("5001.5"));

        let mut ledger = tank_ledger();
        ledger.initialize(dec("50"), t0(), operator()).unwrap();
        assert!(ledger.append(request(MovementKind::Exit, "0.004", 1)).is_err());
        assert_eq!(ledger.current_stock(), dec("5000"));
    }

    #[test]
    fn test_weighted_average_cost_survives_extreme_costs() {
        assert_eq!(
            weighted_average_cost(dec("5000"), Some(Decimal::MAX), dec("2000"), dec("1.55")),
            dec("1.55")
        );
    }

    #[test]
    fn test_current_stock_read_is_idempotent() {
        let mut ledger = tank_ledger();
        ledger.initialize(dec("50"), t0(), operator()).unwrap();
        ledger.append(request(MovementKind::Exit, "1234.56", 1)).unwrap();

        let first = ledger.current_stock();
        let second = ledger.current_stock();
        assert_eq!(first, second);
        assert_eq!(first, dec("3765.44"));
    }

    #[test]
    fn test_cancellation_excludes_movements_from_balance() {
        let mut ledger = tank_ledger();
        ledger.initialize(dec("50"), t0(), operator()).unwrap();

        let mut sale = request(MovementKind::Exit, "600", 1);
        sale.origin_reference = "SALE-42".to_string();
        ledger.append(sale).unwrap();
        let mut refill = request(MovementKind::Entry, "100", 2);
        refill.origin_reference = "SALE-42".to_string();
        ledger.append(refill).unwrap();
        ledger.append(request(MovementKind::Exit, "50", 3)).unwrap();

        assert_eq!(ledger.cancel_movements_for("SALE-42"), 2);
        assert_eq!(ledger.cancel_movements_for("SALE-42"), 0);
        assert_eq!(
            ledger
                .movements()
                .iter()
                .filter(|m| m.status == MovementStatus::Cancelled)
                .count(),
            2
        );

        // The latest active movement still carries its original snapshot
        assert_eq!(ledger.current_stock(), dec("4450"));
        // Cancellation leaves the cache untouched
        assert_eq!(ledger.cached().unwrap().theoretical_quantity, dec("4450"));

        let snapshot = ledger.theoretical_stock_at(at(4)).unwrap();
        assert_eq!(snapshot.volume, dec("4950"));
        assert_eq!(snapshot.sales_count, 1);
        assert_eq!(snapshot.deliveries_count, 0);
    }

    #[test]
    fn test_compensation_appends_inverse_once() {
        let mut ledger = tank_ledger();
        ledger.initialize(dec("50"), t0(), operator()).unwrap();
        let delivery = ledger.append(request(MovementKind::Entry, "1500", 1)).unwrap();

        let inverse = ledger.compensate(delivery.id, at(2), operator()).unwrap();
        assert_eq!(inverse.kind, MovementKind::Exit);
        assert_eq!(inverse.quantity, dec("1500"));
        assert_eq!(inverse.origin_module, COMPENSATION_ORIGIN);
        assert_eq!(inverse.origin_reference, delivery.id.to_string());
        assert_eq!(ledger.current_stock(), dec("5000"));

        assert!(matches!(
            ledger.compensate(delivery.id, at(3), operator()),
            Err(StockError::Validation { .. })
        ));
    }

    #[test]
    fn test_compensating_an_adjustment_restores_previous_level() {
        let mut ledger = tank_ledger();
        ledger.initialize(dec("50"), t0(), operator()).unwrap();
        let adjustment = ledger.append(request(MovementKind::Adjustment, "3000", 1)).unwrap();

        let inverse = ledger.compensate(adjustment.id, at(2), operator()).unwrap();
        assert_eq!(inverse.kind, MovementKind::Adjustment);
        assert_eq!(inverse.stock_after, dec("5000"));
    }

    #[test]
    fn test_initial_stock_and_cancelled_movements_cannot_be_compensated() {
        let mut ledger = tank_ledger();
        ledger.initialize(dec("50"), t0(), operator()).unwrap();
        let initial_id = ledger.movements()[0].id;
        assert!(ledger.compensate(initial_id, at(1), operator()).is_err());

        let mut sale = request(MovementKind::Exit, "10", 1);
        sale.origin_reference = "SALE-1".to_string();
        let sale = ledger.append(sale).unwrap();
        ledger.cancel_movements_for("SALE-1");
        assert!(ledger.compensate(sale.id, at(2), operator()).is_err());

        assert!(matches!(
            ledger.compensate(Uuid::new_v4(), at(2), operator()),
            Err(StockError::NotFound(_))
        ));
    }

    #[test]
    fn test_theoretical_stock_replays_window() {
        let mut ledger = tank_ledger();
        ledger.initialize(dec("50"), t0(), operator()).unwrap();
        ledger.append(request(MovementKind::Entry, "2000", 1)).unwrap();
        ledger.append(request(MovementKind::Exit, "500", 2)).unwrap();
        ledger.append(request(MovementKind::Adjustment, "6000", 3)).unwrap();
        ledger.append(request(MovementKind::Exit, "1000", 10)).unwrap();

        let snapshot = ledger.theoretical_stock_at(at(3)).unwrap();
        assert_eq!(snapshot.initial_volume, dec("5000"));
        assert_eq!(snapshot.deliveries_total, dec("2000"));
        assert_eq!(snapshot.sales_total, dec("500"));
        // Adjustment from 6500 down to 6000
        assert_eq!(snapshot.adjustments_total, dec("-500"));
        assert_eq!(snapshot.adjustments_count, 1);
        assert_eq!(snapshot.volume, dec("6000"));

        let at_start = ledger.theoretical_stock_at(t0()).unwrap();
        assert_eq!(at_start.volume, dec("5000"));

        let latest = ledger.theoretical_stock_at(at(24)).unwrap();
        assert_eq!(latest.volume, ledger.current_stock());
    }

    #[test]
    fn test_theoretical_stock_requires_initial_state() {
        let ledger = tank_ledger();
        assert!(matches!(
            ledger.theoretical_stock_at(t0()),
            Err(StockError::NotConfigured { .. })
        ));

        let mut ledger = tank_ledger();
        ledger.initialize(dec("50"), t0(), operator()).unwrap();
        assert!(matches!(
            ledger.theoretical_stock_at(at(-1)),
            Err(StockError::Validation { ref field, .. }) if field == "as_of"
        ));
    }

    #[test]
    fn test_weighted_average_cost() {
        // 5000 L at 1.20 plus 2000 L at 1.55
        assert_eq!(
            weighted_average_cost(dec("5000"), Some(dec("1.20")), dec("2000"), dec("1.55")),
            dec("1.3")
        );
        // No prior cost: the new unit cost is taken as is
        assert_eq!(
            weighted_average_cost(dec("5000"), None, dec("2000"), dec("1.55")),
            dec("1.55")
        );
        assert_eq!(
            weighted_average_cost(Decimal::ZERO, Some(dec("1.20")), dec("2000"), dec("1.55")),
            dec("1.55")
        );
    }

    #[test]
    fn test_entry_cost_feeds_cache() {
        let mut ledger = tank_ledger();
        ledger.initialize(dec("50"), t0(), operator()).unwrap();

        let mut delivery = request(MovementKind::Entry, "2000", 1);
        delivery.unit_cost = Some(dec("1.50"));
        ledger.append(delivery).unwrap();
        assert_eq!(ledger.cached().unwrap().weighted_average_cost, Some(dec("1.50")));

        let mut second = request(MovementKind::Entry, "3000", 2);
        second.unit_cost = Some(dec("1.00"));
        ledger.append(second).unwrap();
        // (7000 * 1.50 + 3000 * 1.00) / 10000
        assert_eq!(ledger.cached().unwrap().weighted_average_cost, Some(dec("1.35")));
    }

    #[test]
    fn test_reconciliation_books_difference() {
        let mut ledger = tank_ledger();
        ledger.initialize(dec("50"), t0(), operator()).unwrap();
        ledger.append(request(MovementKind::Exit, "1000", 1)).unwrap();

        // Gauge shows 38 cm = 3800 L against 4000 L theoretical
        let count = ledger.reconcile(dec("38"), at(2), operator(), true).unwrap();
        assert_eq!(count.real_volume, dec("3800.00"));
        assert_eq!(count.theoretical_volume, dec("4000"));
        assert_eq!(count.difference, dec("-200"));
        assert!(count.adjustment_movement_id.is_some());

        let adjustment = ledger.latest().unwrap();
        assert_eq!(adjustment.kind, MovementKind::NegativeAdjustment);
        assert_eq!(adjustment.inventory_count_id, Some(count.id));
        assert_eq!(ledger.current_stock(), dec("3800"));
        assert_eq!(ledger.cached().unwrap().real_quantity, Some(dec("3800.00")));
    }

    #[test]
    fn test_reconciliation_without_adjustment_only_records_real_stock() {
        let mut ledger = tank_ledger();
        ledger.initialize(dec("50"), t0(), operator()).unwrap();

        let count = ledger.reconcile(dec("52"), at(1), operator(), false).unwrap();
        assert_eq!(count.difference, dec("200"));
        assert_eq!(count.adjustment_movement_id, None);
        assert_eq!(ledger.current_stock(), dec("5000"));
        assert_eq!(ledger.cached().unwrap().real_quantity, Some(dec("5200.00")));
        assert_eq!(ledger.inventory_counts().len(), 1);
    }

    #[test]
    fn test_plan_from_reports_full_context() {
        let tank_id = Uuid::new_v4();
        let err = plan_from(tank_id, dec("10000"), dec("9500"), MovementKind::Entry, dec("600"))
            .unwrap_err();
        assert_eq!(
            err,
            StockError::CapacityExceeded {
                tank_id,
                kind: MovementKind::Entry,
                quantity: dec("600"),
                stock_before: dec("9500"),
                stock_after: dec("10100"),
                capacity: dec("10000"),
            }
        );
        assert!(err.to_string().contains("10100"));
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    /// Quantity in centilitres, up to 3000 L
    fn quantity_strategy() -> impl Strategy<Value = Decimal> {
        (1i64..300_000).prop_map(|cl| Decimal::new(cl, 2))
    }

    fn movement_strategy() -> impl Strategy<Value = (bool, Decimal)> {
        (any::<bool>(), quantity_strategy())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// current stock = initial volume + accepted entries - accepted exits
        #[test]
        fn prop_ledger_conservation(
            gauge in 0i64..=100,
            movements in prop::collection::vec(movement_strategy(), 0..30)
        ) {
            let mut ledger = tank_ledger();
            let initial = ledger.initialize(Decimal::from(gauge), t0(), operator()).unwrap();

            let mut entries = Decimal::ZERO;
            let mut exits = Decimal::ZERO;
            for (i, (is_entry, quantity)) in movements.into_iter().enumerate() {
                let kind = if is_entry { MovementKind::Entry } else { MovementKind::Exit };
                let mut req = request(kind, "1", i as i64 + 1);
                req.quantity = quantity;
                if ledger.append(req).is_ok() {
                    if is_entry { entries += quantity } else { exits += quantity }
                }
            }

            prop_assert_eq!(ledger.current_stock(), initial.computed_volume + entries - exits);
        }

        /// Stock never leaves [0, capacity], whatever is attempted
        #[test]
        fn prop_stock_stays_within_bounds(
            movements in prop::collection::vec(movement_strategy(), 1..30)
        ) {
            let mut ledger = tank_ledger();
            ledger.initialize(dec("50"), t0(), operator()).unwrap();

            for (i, (is_entry, quantity)) in movements.into_iter().enumerate() {
                let kind = if is_entry { MovementKind::Entry } else { MovementKind::Exit };
                let before = ledger.current_stock();
                let mut req = request(kind, "1", i as i64 + 1);
                req.quantity = quantity;

                match ledger.append(req) {
                    Ok(m) => {
                        prop_assert_eq!(m.stock_before, before);
                        prop_assert_eq!(m.stock_after, ledger.current_stock());
                    }
                    Err(StockError::InsufficientStock { .. }) => {
                        prop_assert!(!is_entry);
                        prop_assert_eq!(ledger.current_stock(), before);
                    }
                    Err(StockError::CapacityExceeded { .. }) => {
                        prop_assert!(is_entry);
                        prop_assert_eq!(ledger.current_stock(), before);
                    }
                    Err(other) => prop_assert!(false, "unexpected error {:?}", other),
                }

                let stock = ledger.current_stock();
                prop_assert!(stock >= Decimal::ZERO && stock <= dec("10000"));
            }
        }

        /// Out-of-order timestamps never split the running balance, the
        /// cached stock and the replay
        #[test]
        fn prop_stock_views_agree_with_unordered_dates(
            movements in prop::collection::vec((movement_strategy(), 1i64..48), 0..30)
        ) {
            let mut ledger = tank_ledger();
            let initial = ledger.initialize(dec("50"), t0(), operator()).unwrap();

            let mut expected = initial.computed_volume;
            for ((is_entry, quantity), hours) in movements {
                let kind = if is_entry { MovementKind::Entry } else { MovementKind::Exit };
                let mut req = request(kind, "1", hours);
                req.quantity = quantity;
                if ledger.append(req).is_ok() {
                    if is_entry { expected += quantity } else { expected -= quantity }
                }
            }

            let replayed = ledger.theoretical_stock_at(at(48)).unwrap().volume;
            prop_assert_eq!(ledger.current_stock(), expected);
            prop_assert_eq!(ledger.cached().unwrap().theoretical_quantity, expected);
            prop_assert_eq!(replayed, expected);
        }

        /// Replaying to the latest timestamp matches the running balance
        #[test]
        fn prop_replay_matches_current_stock(
            movements in prop::collection::vec(movement_strategy(), 0..20)
        ) {
            let mut ledger = tank_ledger();
            ledger.initialize(dec("40"), t0(), operator()).unwrap();

            for (i, (is_entry, quantity)) in movements.into_iter().enumerate() {
                let kind = if is_entry { MovementKind::Entry } else { MovementKind::Exit };
                let mut req = request(kind, "1", i as i64 + 1);
                req.quantity = quantity;
                let _ = ledger.append(req);
            }

            let snapshot = ledger.theoretical_stock_at(at(100)).unwrap();
            prop_assert_eq!(snapshot.volume, ledger.current_stock());
        }
    }
}
