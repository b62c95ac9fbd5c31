//! Delivery variance detection
//!
//! A delivery is compared with the most recent purchase-order line for the
//! same tank whose expected date falls within a window around the delivery
//! date. Deviations are measured as a fraction of the ordered quantity.

use chrono::Duration;
use rust_decimal::Decimal;

use crate::models::{Delivery, PurchaseOrderLine, VarianceDirection, VarianceResult};

/// Default tolerance: 5% of the ordered quantity
pub fn default_tolerance() -> Decimal {
    Decimal::new(5, 2)
}

/// Default matching window around the delivery date, in days
pub const DEFAULT_WINDOW_DAYS: i64 = 3;

/// Most recent line for the delivery's tank expected within `window_days`
pub fn select_matching_line<'a>(
    delivery: &Delivery,
    lines: &'a [PurchaseOrderLine],
    window_days: i64,
) -> Option<&'a PurchaseOrderLine> {
    let day = delivery.delivered_at.date_naive();
    let start = day - Duration::days(window_days);
    let end = day + Duration::days(window_days);

    lines
        .iter()
        .filter(|l| l.tank_id == delivery.tank_id)
        .filter(|l| l.expected_date >= start && l.expected_date <= end)
        .max_by(|a, b| {
            a.expected_date
                .cmp(&b.expected_date)
                .then(a.created_at.cmp(&b.created_at))
        })
}

/// Variance of a delivery against its purchase-order line, or `None` when
/// within tolerance or when nothing positive was ordered
pub fn detect_delivery_variance(
    delivery: &Delivery,
    line: &PurchaseOrderLine,
    tolerance_fraction: Decimal,
) -> Option<VarianceResult> {
    let ordered = line.ordered_quantity;
    if ordered <= Decimal::ZERO {
        return None;
    }

    let declared = delivery.declared_quantity;
    let absolute_difference = (declared - ordered).abs();
    let fraction = absolute_difference / ordered;

    if fraction <= tolerance_fraction {
        return None;
    }

    let direction = if declared < ordered {
        VarianceDirection::Shortage
    } else {
        VarianceDirection::Overage
    };

    Some(VarianceResult {
        delivery_id: delivery.id,
        purchase_order_line_id: line.id,
        declared_quantity: declared,
        ordered_quantity: ordered,
        direction,
        absolute_difference,
        percentage_difference: (fraction * Decimal::ONE_HUNDRED).round_dp(2),
    })
}
