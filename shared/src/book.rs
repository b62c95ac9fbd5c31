//! In-memory tank ledger
//!
//! [`TankLedger`] runs the full stock lifecycle of a single tank (initial
//! state, appends, cancellation, compensation, correction, reconciliation)
//! against plain vectors, using the same rules as the database services. It
//! is used for offline validation of planned movement batches and in tests.
//! It never reads a clock: every operation receives its timestamp.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calibration::CalibrationCurve;
use crate::error::StockError;
use crate::ledger::{
    compensation_for, plan_from, plan_movement, refresh_cache, replay_snapshot, LedgerHead,
    MovementEffect, MutationCensus, COMPENSATION_ORIGIN, INITIAL_STATE_ORIGIN,
};
use crate::models::{
    CachedTankStock, FuelPrice, InventoryCount, MovementKind, MovementStatus, StockMovement,
    StockSnapshot, TankInitialState,
};
use crate::validation::{ensure_recalibration_allowed, validate_gauge_height};

/// The parts of a tank the ledger needs
#[derive(Debug, Clone)]
pub struct TankProfile {
    pub tank_id: Uuid,
    pub capacity: Decimal,
    pub curve: CalibrationCurve,
}

/// A movement to append
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementRequest {
    pub kind: MovementKind,
    pub quantity: Decimal,
    pub movement_at: DateTime<Utc>,
    pub origin_module: String,
    pub origin_reference: String,
    pub recorded_by: Uuid,
    #[serde(default)]
    pub unit_cost: Option<Decimal>,
    #[serde(default)]
    pub delivery_id: Option<Uuid>,
    #[serde(default)]
    pub sale_id: Option<Uuid>,
    #[serde(default)]
    pub inventory_count_id: Option<Uuid>,
}

impl MovementRequest {
    pub fn new(
        kind: MovementKind,
        quantity: Decimal,
        movement_at: DateTime<Utc>,
        origin_module: impl Into<String>,
        origin_reference: impl Into<String>,
        recorded_by: Uuid,
    ) -> Self {
        Self {
            kind,
            quantity,
            movement_at,
            origin_module: origin_module.into(),
            origin_reference: origin_reference.into(),
            recorded_by,
            unit_cost: None,
            delivery_id: None,
            sale_id: None,
            inventory_count_id: None,
        }
    }
}

/// Changes requested on an existing initial state
#[derive(Debug, Clone, Default)]
pub struct InitialStateCorrection {
    pub gauge_height: Option<Decimal>,
    pub min_stock_threshold: Option<Decimal>,
    /// Current price for the tank's fuel at its station, if one is recorded
    pub price: Option<FuelPrice>,
    /// Used when no price record exists
    pub fallback_unit_cost: Option<Decimal>,
    pub fallback_sale_price: Option<Decimal>,
}

#[derive(Debug, Clone)]
pub struct TankLedger {
    profile: TankProfile,
    initial: Option<TankInitialState>,
    movements: Vec<StockMovement>,
    cache: Option<CachedTankStock>,
    counts: Vec<InventoryCount>,
    next_sequence: i64,
}

impl TankLedger {
    pub fn new(profile: TankProfile) -> Self {
        Self {
            profile,
            initial: None,
            movements: Vec::new(),
            cache: None,
            counts: Vec::new(),
            next_sequence: 1,
        }
    }

    pub fn profile(&self) -> &TankProfile {
        &self.profile
    }

    pub fn initial_state(&self) -> Option<TankInitialState> {
        self.initial.clone().map(|mut state| {
            state.locked = !self.can_mutate();
            state
        })
    }

    pub fn movements(&self) -> &[StockMovement] {
        &self.movements
    }

    pub fn cached(&self) -> Option<&CachedTankStock> {
        self.cache.as_ref()
    }

    pub fn inventory_counts(&self) -> &[InventoryCount] {
        &self.counts
    }

    /// Latest active movement by (timestamp, insertion order)
    pub fn latest(&self) -> Option<&StockMovement> {
        self.movements
            .iter()
            .filter(|m| m.is_active())
            .max_by(|a, b| {
                a.movement_at
                    .cmp(&b.movement_at)
                    .then(a.sequence.cmp(&b.sequence))
            })
    }

    pub fn head(&self) -> LedgerHead {
        LedgerHead {
            tank_id: self.profile.tank_id,
            capacity: self.profile.capacity,
            latest_stock_after: self.latest().map(|m| m.stock_after),
            latest_movement_at: self.latest().map(|m| m.movement_at),
            initial_volume: self.initial.as_ref().map(|s| s.computed_volume),
        }
    }

    pub fn current_stock(&self) -> Decimal {
        self.head().stock_before()
    }

    pub fn census(&self) -> MutationCensus {
        MutationCensus::from_movements(&self.movements)
    }

    pub fn can_mutate(&self) -> bool {
        self.census().permits_mutation()
    }

    /// Create the initial state from a gauge reading
    pub fn initialize(
        &mut self,
        gauge_height: Decimal,
        at: DateTime<Utc>,
        recorded_by: Uuid,
    ) -> Result<TankInitialState, StockError> {
        let tank_id = self.profile.tank_id;
        if self.initial.is_some() {
            return Err(StockError::AlreadyInitialized { tank_id });
        }

        let volume = self.volume_for(gauge_height)?;
        let effect = plan_from(
            tank_id,
            self.profile.capacity,
            Decimal::ZERO,
            MovementKind::InitialStock,
            volume,
        )?;

        let state = TankInitialState {
            id: Uuid::new_v4(),
            tank_id,
            gauge_height,
            computed_volume: volume,
            initialized_at: at,
            recorded_by,
            locked: false,
            updated_at: None,
            updated_by: None,
        };
        self.initial = Some(state);

        let request = MovementRequest::new(
            MovementKind::InitialStock,
            volume,
            at,
            INITIAL_STATE_ORIGIN,
            tank_id.to_string(),
            recorded_by,
        );
        self.push(&request, effect);

        self.cache = Some(CachedTankStock {
            tank_id,
            theoretical_quantity: volume,
            real_quantity: Some(volume),
            last_calculated_at: at,
            weighted_average_cost: None,
            sale_price: None,
            min_stock_threshold: None,
        });

        self.initial_state()
            .ok_or(StockError::NotConfigured { tank_id })
    }

    /// Append a movement; `initial_stock` is reserved for the initial-state paths
    pub fn append(&mut self, request: MovementRequest) -> Result<StockMovement, StockError> {
        if request.kind == MovementKind::InitialStock {
            return Err(StockError::validation(
                "kind",
                "initial_stock movements are written by the initial-state operations",
            ));
        }
        self.append_unchecked(request)
    }

    fn append_unchecked(&mut self, request: MovementRequest) -> Result<StockMovement, StockError> {
        if let Some(initial) = &self.initial {
            if request.movement_at < initial.initialized_at {
                return Err(StockError::validation(
                    "movement_at",
                    "movement is dated before the tank initialization",
                ));
            }
        }

        let head = self.head();
        head.ensure_chronological(request.movement_at)?;
        let effect = plan_movement(&head, request.kind, request.quantity)?;
        let movement = self.push(&request, effect);
        self.cache = Some(refresh_cache(
            self.cache.as_ref(),
            self.profile.tank_id,
            effect,
            request.unit_cost,
            request.movement_at,
        ));
        Ok(movement)
    }

    /// Soft-cancel every active movement with this origin reference
    pub fn cancel_movements_for(&mut self, origin_reference: &str) -> usize {
        let mut affected = 0;
        for movement in self
            .movements
            .iter_mut()
            .filter(|m| m.is_active() && m.origin_reference == origin_reference)
        {
            movement.status = MovementStatus::Cancelled;
            affected += 1;
        }
        affected
    }

    /// Append the inverse of an active movement
    pub fn compensate(
        &mut self,
        movement_id: Uuid,
        at: DateTime<Utc>,
        recorded_by: Uuid,
    ) -> Result<StockMovement, StockError> {
        let original = self
            .movements
            .iter()
            .find(|m| m.id == movement_id)
            .cloned()
            .ok_or_else(|| StockError::NotFound("Stock movement".to_string()))?;

        let reference = original.id.to_string();
        let already = self.movements.iter().any(|m| {
            m.is_active() && m.origin_module == COMPENSATION_ORIGIN && m.origin_reference == reference
        });
        if already {
            return Err(StockError::validation(
                "movement",
                "movement has already been compensated",
            ));
        }

        let (kind, quantity) = compensation_for(&original)?;
        let request = MovementRequest::new(
            kind,
            quantity,
            at,
            COMPENSATION_ORIGIN,
            reference,
            recorded_by,
        );
        self.append_unchecked(request)
    }

    /// Correct the initial state through compensating entries
    pub fn correct(
        &mut self,
        correction: InitialStateCorrection,
        at: DateTime<Utc>,
        editor: Uuid,
    ) -> Result<TankInitialState, StockError> {
        let tank_id = self.profile.tank_id;
        let initial = self
            .initial
            .clone()
            .ok_or(StockError::NotConfigured { tank_id })?;
        self.census().ensure_mutable(tank_id)?;

        let mut volume = initial.computed_volume;

        if let Some(height) = correction.gauge_height {
            volume = self.volume_for(height)?;
            let superseded: Vec<Uuid> = self
                .movements
                .iter()
                .filter(|m| m.is_active())
                .map(|m| m.id)
                .collect();

            let reversal = if initial.computed_volume > Decimal::ZERO {
                let effect = plan_movement(
                    &self.head(),
                    MovementKind::NegativeAdjustment,
                    initial.computed_volume,
                )?;
                let request = MovementRequest::new(
                    MovementKind::NegativeAdjustment,
                    initial.computed_volume,
                    at,
                    INITIAL_STATE_ORIGIN,
                    "correction",
                    editor,
                );
                Some(self.push(&request, effect).id)
            } else {
                None
            };

            let effect = plan_from(
                tank_id,
                self.profile.capacity,
                Decimal::ZERO,
                MovementKind::InitialStock,
                volume,
            )?;
            // The replacement entry stands for the same starting point
            let request = MovementRequest::new(
                MovementKind::InitialStock,
                volume,
                initial.initialized_at,
                INITIAL_STATE_ORIGIN,
                tank_id.to_string(),
                editor,
            );
            self.push(&request, effect);

            // The superseded bookkeeping pair stays visible but leaves the census.
            for movement in self.movements.iter_mut().filter(|m| {
                superseded.contains(&m.id) || Some(m.id) == reversal
            }) {
                movement.status = MovementStatus::Cancelled;
            }

            if let Some(state) = self.initial.as_mut() {
                state.gauge_height = height;
                state.computed_volume = volume;
            }
        }

        if let Some(state) = self.initial.as_mut() {
            state.updated_at = Some(at);
            state.updated_by = Some(editor);
        }

        let previous = self.cache.take();
        let (cost, sale_price) = match &correction.price {
            Some(price) => (Some(price.purchase_price), Some(price.sale_price)),
            None => (correction.fallback_unit_cost, correction.fallback_sale_price),
        };
        self.cache = Some(CachedTankStock {
            tank_id,
            theoretical_quantity: volume,
            real_quantity: Some(volume),
            last_calculated_at: at,
            weighted_average_cost: cost
                .or_else(|| previous.as_ref().and_then(|c| c.weighted_average_cost)),
            sale_price: sale_price.or_else(|| previous.as_ref().and_then(|c| c.sale_price)),
            min_stock_threshold: correction
                .min_stock_threshold
                .or_else(|| previous.as_ref().and_then(|c| c.min_stock_threshold)),
        });

        self.initial_state()
            .ok_or(StockError::NotConfigured { tank_id })
    }

    /// Replace the calibration curve; refused while an initial state exists
    pub fn recalibrate(&mut self, curve: CalibrationCurve) -> Result<(), StockError> {
        if curve != self.profile.curve {
            ensure_recalibration_allowed(self.profile.tank_id, self.initial.is_some())?;
        }
        self.profile.curve = curve;
        Ok(())
    }

    /// Remove the initial state together with its bookkeeping entries and cache
    pub fn delete_initial_state(&mut self) -> Result<(), StockError> {
        let tank_id = self.profile.tank_id;
        if self.initial.is_none() {
            return Err(StockError::NotConfigured { tank_id });
        }
        self.census().ensure_mutable(tank_id)?;

        self.movements.retain(|m| !m.kind.is_bookkeeping());
        self.cache = None;
        self.initial = None;
        Ok(())
    }

    pub fn theoretical_stock_at(&self, as_of: DateTime<Utc>) -> Result<StockSnapshot, StockError> {
        let initial = self.initial.as_ref().ok_or(StockError::NotConfigured {
            tank_id: self.profile.tank_id,
        })?;
        replay_snapshot(initial, &self.movements, as_of)
    }

    /// Record a physical gauge reading; optionally book the difference
    pub fn reconcile(
        &mut self,
        gauge_height: Decimal,
        at: DateTime<Utc>,
        recorded_by: Uuid,
        apply_adjustment: bool,
    ) -> Result<InventoryCount, StockError> {
        let real_volume = self.volume_for(gauge_height)?;
        let theoretical_volume = self.current_stock();
        let difference = real_volume - theoretical_volume;
        let count_id = Uuid::new_v4();

        let mut adjustment_movement_id = None;
        if apply_adjustment && !difference.is_zero() {
            let kind = if difference > Decimal::ZERO {
                MovementKind::PositiveAdjustment
            } else {
                MovementKind::NegativeAdjustment
            };
            let mut request = MovementRequest::new(
                kind,
                difference.abs(),
                at,
                "inventory",
                count_id.to_string(),
                recorded_by,
            );
            request.inventory_count_id = Some(count_id);
            adjustment_movement_id = Some(self.append_unchecked(request)?.id);
        }

        let tank_id = self.profile.tank_id;
        let theoretical_quantity = self.current_stock();
        let cache = self.cache.get_or_insert_with(|| CachedTankStock {
            tank_id,
            theoretical_quantity,
            real_quantity: None,
            last_calculated_at: at,
            weighted_average_cost: None,
            sale_price: None,
            min_stock_threshold: None,
        });
        cache.real_quantity = Some(real_volume);
        cache.last_calculated_at = at;

        let count = InventoryCount {
            id: count_id,
            tank_id: self.profile.tank_id,
            gauge_height,
            real_volume,
            theoretical_volume,
            difference,
            counted_at: at,
            recorded_by,
            adjustment_movement_id,
        };
        self.counts.push(count.clone());
        Ok(count)
    }

    fn volume_for(&self, gauge_height: Decimal) -> Result<Decimal, StockError> {
        validate_gauge_height(gauge_height, &self.profile.curve)?;
        let volume = self.profile.curve.volume_at(gauge_height);
        if volume > self.profile.capacity {
            return Err(StockError::validation(
                "gauge_height",
                format!(
                    "computed volume {} L exceeds tank capacity {} L",
                    volume, self.profile.capacity
                ),
            ));
        }
        Ok(volume)
    }

    fn push(&mut self, request: &MovementRequest, effect: MovementEffect) -> StockMovement {
        let movement = StockMovement {
            id: Uuid::new_v4(),
            tank_id: self.profile.tank_id,
            sequence: self.next_sequence,
            kind: request.kind,
            quantity: request.quantity,
            movement_at: request.movement_at,
            stock_before: effect.stock_before,
            stock_after: effect.stock_after,
            unit_cost: request.unit_cost,
            recorded_by: request.recorded_by,
            origin_module: request.origin_module.clone(),
            origin_reference: request.origin_reference.clone(),
            status: MovementStatus::Validated,
            delivery_id: request.delivery_id,
            sale_id: request.sale_id,
            inventory_count_id: request.inventory_count_id,
            created_at: request.movement_at,
        };
        self.next_sequence += 1;
        self.movements.push(movement.clone());
        movement
    }
}
