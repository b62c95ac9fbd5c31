//! Stock ledger rules
//!
//! Pure functions shared by the Postgres-backed services and the in-memory
//! [`TankLedger`](crate::book::TankLedger): computing a movement's
//! before/after snapshot, keeping the cached stock row current, deciding
//! whether an initial state may still be mutated, and replaying the ledger
//! up to a point in time.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::StockError;
use crate::models::{CachedTankStock, MovementKind, StockMovement, StockSnapshot, TankInitialState};

/// Origin module recorded on compensating movements
pub const COMPENSATION_ORIGIN: &str = "compensation";

/// Origin module recorded on initial-state bookkeeping movements
pub const INITIAL_STATE_ORIGIN: &str = "initial_state";

/// What the ledger knows about a tank just before an append
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerHead {
    pub tank_id: Uuid,
    pub capacity: Decimal,
    /// `stock_after` of the latest active movement by (timestamp, sequence)
    pub latest_stock_after: Option<Decimal>,
    /// Timestamp of that same movement
    pub latest_movement_at: Option<DateTime<Utc>>,
    pub initial_volume: Option<Decimal>,
}

impl LedgerHead {
    pub fn stock_before(&self) -> Decimal {
        self.latest_stock_after
            .or(self.initial_volume)
            .unwrap_or(Decimal::ZERO)
    }

    /// New movements may not be dated before the latest active one, so every
    /// `stock_after` stays on a single (timestamp, sequence) chain
    pub fn ensure_chronological(&self, movement_at: DateTime<Utc>) -> Result<(), StockError> {
        match self.latest_movement_at {
            Some(latest) if movement_at < latest => Err(StockError::validation(
                "movement_at",
                format!(
                    "movement is dated before the latest recorded movement at {}",
                    latest
                ),
            )),
            _ => Ok(()),
        }
    }
}

/// Largest quantity a movement or snapshot can hold (NUMERIC(14,2))
pub fn max_quantity() -> Decimal {
    Decimal::new(99_999_999_999_999, 2)
}

/// Decimal places kept for litres
pub const QUANTITY_SCALE: u32 = 2;

/// Stock snapshot around a single movement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovementEffect {
    pub stock_before: Decimal,
    pub stock_after: Decimal,
}

impl MovementEffect {
    pub fn delta(&self) -> Decimal {
        self.stock_after - self.stock_before
    }
}

/// Reject quantities that no movement kind accepts
pub fn validate_quantity(kind: MovementKind, quantity: Decimal) -> Result<(), StockError> {
    if quantity.abs() > max_quantity() {
        return Err(StockError::validation(
            "quantity",
            format!("quantity cannot exceed {} L", max_quantity()),
        ));
    }
    if quantity.round_dp(QUANTITY_SCALE) != quantity {
        return Err(StockError::validation(
            "quantity",
            format!("quantity is limited to {} decimal places", QUANTITY_SCALE),
        ));
    }

    match kind {
        MovementKind::Adjustment | MovementKind::InitialStock if quantity < Decimal::ZERO => {
            Err(StockError::validation(
                "quantity",
                format!("{} quantity cannot be negative", kind),
            ))
        }
        // An empty tank is a valid starting point and a valid absolute level
        MovementKind::Adjustment | MovementKind::InitialStock => Ok(()),
        _ if quantity <= Decimal::ZERO => Err(StockError::validation(
            "quantity",
            format!("{} quantity must be positive", kind),
        )),
        _ => Ok(()),
    }
}

/// Plan a movement on top of the ledger head
pub fn plan_movement(
    head: &LedgerHead,
    kind: MovementKind,
    quantity: Decimal,
) -> Result<MovementEffect, StockError> {
    plan_from(head.tank_id, head.capacity, head.stock_before(), kind, quantity)
}

/// Plan a movement from an explicit starting stock.
///
/// `adjustment` replaces the stock, every other kind adds or removes
/// `quantity`. The result must stay within `[0, capacity]`.
pub fn plan_from(
    tank_id: Uuid,
    capacity: Decimal,
    stock_before: Decimal,
    kind: MovementKind,
    quantity: Decimal,
) -> Result<MovementEffect, StockError> {
    validate_quantity(kind, quantity)?;

    let stock_after = match kind {
        MovementKind::Entry | MovementKind::PositiveAdjustment | MovementKind::InitialStock => {
            stock_before.checked_add(quantity)
        }
        MovementKind::Exit | MovementKind::NegativeAdjustment => stock_before.checked_sub(quantity),
        MovementKind::Adjustment => Some(quantity),
    }
    .ok_or_else(|| {
        StockError::validation(
            "quantity",
            format!("{} of {} L from {} L is out of range", kind, quantity, stock_before),
        )
    })?;

    if stock_after < Decimal::ZERO {
        return Err(StockError::InsufficientStock {
            tank_id,
            kind,
            quantity,
            stock_before,
            stock_after,
        });
    }

    if stock_after > capacity {
        return Err(StockError::CapacityExceeded {
            tank_id,
            kind,
            quantity,
            stock_before,
            stock_after,
            capacity,
        });
    }

    Ok(MovementEffect {
        stock_before,
        stock_after,
    })
}

/// Weighted-average unit cost after a quantity change valued at `unit_cost`.
///
/// Falls back to `unit_cost` when there is no usable prior stock or cost, or
/// when the resulting quantity is not positive.
pub fn weighted_average_cost(
    previous_quantity: Decimal,
    previous_cost: Option<Decimal>,
    delta: Decimal,
    unit_cost: Decimal,
) -> Decimal {
    let old_qty = previous_quantity.max(Decimal::ZERO);
    let new_qty = old_qty.checked_add(delta).unwrap_or(Decimal::ZERO);

    match previous_cost {
        Some(cost) if old_qty > Decimal::ZERO && new_qty > Decimal::ZERO => old_qty
            .checked_mul(cost)
            .zip(delta.checked_mul(unit_cost))
            .and_then(|(held, added)| held.checked_add(added))
            .and_then(|value| value.checked_div(new_qty))
            .map(|cost| cost.round_dp(4))
            .unwrap_or(unit_cost),
        _ => unit_cost,
    }
}

/// Cached row after a movement has been appended
pub fn refresh_cache(
    previous: Option<&CachedTankStock>,
    tank_id: Uuid,
    effect: MovementEffect,
    unit_cost: Option<Decimal>,
    now: DateTime<Utc>,
) -> CachedTankStock {
    let prior_quantity = previous
        .map(|c| c.theoretical_quantity)
        .unwrap_or(effect.stock_before);
    let prior_cost = previous.and_then(|c| c.weighted_average_cost);

    let weighted_average_cost = match unit_cost {
        Some(cost) => Some(weighted_average_cost(
            prior_quantity,
            prior_cost,
            effect.delta(),
            cost,
        )),
        None => prior_cost,
    };

    CachedTankStock {
        tank_id,
        theoretical_quantity: effect.stock_after,
        real_quantity: previous.and_then(|c| c.real_quantity),
        last_calculated_at: now,
        weighted_average_cost,
        sale_price: previous.and_then(|c| c.sale_price),
        min_stock_threshold: previous.and_then(|c| c.min_stock_threshold),
    }
}

/// Movement counts that decide whether the initial state may change
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutationCensus {
    /// Active movements of any kind
    pub total: i64,
    /// Active movements whose kind is bookkeeping-only
    pub bookkeeping: i64,
}

impl MutationCensus {
    pub fn from_movements<'a>(movements: impl IntoIterator<Item = &'a StockMovement>) -> Self {
        movements
            .into_iter()
            .filter(|m| m.is_active())
            .fold(Self::default(), |mut census, m| {
                census.total += 1;
                if m.kind.is_bookkeeping() {
                    census.bookkeeping += 1;
                }
                census
            })
    }

    /// Only the lone `initial_stock` entry (or nothing) may sit on the initial state
    pub fn permits_mutation(&self) -> bool {
        self.total == self.bookkeeping && self.bookkeeping <= 1
    }

    pub fn ensure_mutable(&self, tank_id: Uuid) -> Result<(), StockError> {
        if self.permits_mutation() {
            Ok(())
        } else {
            Err(StockError::ImmutableState {
                tank_id,
                movement_count: self.total,
                bookkeeping_count: self.bookkeeping,
            })
        }
    }
}

/// Inverse of a movement, as (kind, quantity)
pub fn compensation_for(movement: &StockMovement) -> Result<(MovementKind, Decimal), StockError> {
    if !movement.is_active() {
        return Err(StockError::validation(
            "movement",
            "cancelled movements are already excluded from balances",
        ));
    }

    let inverse = match movement.kind {
        MovementKind::Entry => (MovementKind::Exit, movement.quantity),
        MovementKind::Exit => (MovementKind::Entry, movement.quantity),
        MovementKind::PositiveAdjustment => (MovementKind::NegativeAdjustment, movement.quantity),
        MovementKind::NegativeAdjustment => (MovementKind::PositiveAdjustment, movement.quantity),
        MovementKind::Adjustment => (MovementKind::Adjustment, movement.stock_before),
        MovementKind::InitialStock => {
            return Err(StockError::validation(
                "movement",
                "initial stock is changed through the initial-state correction",
            ))
        }
    };

    Ok(inverse)
}

/// Theoretical stock at `as_of`: the initial volume plus the active
/// movements dated within `[initialized_at, as_of]`.
pub fn replay_snapshot(
    initial: &TankInitialState,
    movements: &[StockMovement],
    as_of: DateTime<Utc>,
) -> Result<StockSnapshot, StockError> {
    if as_of < initial.initialized_at {
        return Err(StockError::validation(
            "as_of",
            format!(
                "requested time precedes the tank initialization at {}",
                initial.initialized_at
            ),
        ));
    }

    let mut snapshot = StockSnapshot {
        tank_id: initial.tank_id,
        as_of,
        initialized_at: initial.initialized_at,
        initial_volume: initial.computed_volume,
        deliveries_total: Decimal::ZERO,
        deliveries_count: 0,
        sales_total: Decimal::ZERO,
        sales_count: 0,
        adjustments_total: Decimal::ZERO,
        adjustments_count: 0,
        volume: Decimal::ZERO,
    };

    let window = movements.iter().filter(|m| {
        m.is_active() && m.movement_at >= initial.initialized_at && m.movement_at <= as_of
    });

    for movement in window {
        match movement.kind {
            MovementKind::Entry => {
                snapshot.deliveries_total += movement.quantity;
                snapshot.deliveries_count += 1;
            }
            MovementKind::Exit => {
                snapshot.sales_total += movement.quantity;
                snapshot.sales_count += 1;
            }
            MovementKind::PositiveAdjustment => {
                snapshot.adjustments_total += movement.quantity;
                snapshot.adjustments_count += 1;
            }
            MovementKind::NegativeAdjustment => {
                snapshot.adjustments_total -= movement.quantity;
                snapshot.adjustments_count += 1;
            }
            MovementKind::Adjustment => {
                snapshot.adjustments_total += movement.delta();
                snapshot.adjustments_count += 1;
            }
            // Already counted as the initial volume
            MovementKind::InitialStock => {}
        }
    }

    snapshot.volume = snapshot.initial_volume + snapshot.deliveries_total - snapshot.sales_total
        + snapshot.adjustments_total;

    Ok(snapshot)
}
