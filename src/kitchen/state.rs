//! The kitchen's owned state: the order arena and the shelves.
//!
//! # Architecture Note
//! Orders live in exactly one place, the arena map in here; shelves hold
//! ids only. Every mutation goes through this type, and this type is only
//! ever touched by the coordinator task, so the "no order on two shelves"
//! and capacity invariants have a single enforcement point. The overflow
//! policy receives `&mut KitchenState` because its probes temporarily
//! re-rate orders, but every probe restores the decay anchor verbatim
//! before returning (see [`KitchenState::projected_lifetime_on_overflow`]).

use std::collections::{BTreeMap, HashMap};

use tokio::time::Instant;

use crate::kitchen::event::ShelfSnapshot;
use crate::kitchen::KitchenError;
use crate::model::{Order, OrderId, Shelf};

/// Shelves plus the order arena. Constructed once at kitchen setup and
/// owned by the coordinator for the duration of the run.
#[derive(Debug)]
pub struct KitchenState {
    orders: HashMap<OrderId, Order>,
    /// Temperature shelves keyed by temp; BTreeMap so iteration (candidate
    /// pools, snapshots) is deterministic.
    shelves: BTreeMap<String, Shelf>,
    overflow: Shelf,
}

impl KitchenState {
    pub fn new(temperature_shelves: Vec<Shelf>, overflow: Shelf) -> Self {
        let shelves = temperature_shelves
            .into_iter()
            .map(|shelf| (shelf.shelf_type().to_string(), shelf))
            .collect();
        Self {
            orders: HashMap::new(),
            shelves,
            overflow,
        }
    }

    // =========================================================================
    // Read access
    // =========================================================================

    /// Temperature shelf types, in sorted order. Does not include overflow.
    pub fn shelf_temps(&self) -> impl Iterator<Item = &str> {
        self.shelves.keys().map(String::as_str)
    }

    pub fn shelf(&self, temp: &str) -> Option<&Shelf> {
        self.shelves.get(temp)
    }

    pub fn overflow(&self) -> &Shelf {
        &self.overflow
    }

    pub fn order(&self, id: OrderId) -> Option<&Order> {
        self.orders.get(&id)
    }

    pub(crate) fn order_mut(&mut self, id: OrderId) -> Option<&mut Order> {
        self.orders.get_mut(&id)
    }

    fn known_order(&self, id: OrderId) -> Result<&Order, KitchenError> {
        self.orders
            .get(&id)
            .ok_or_else(|| KitchenError::InvalidProcedure(format!("unknown order {id}")))
    }

    /// True when the order sits on its designated temperature shelf.
    pub fn temp_shelf_contains(&self, id: OrderId) -> bool {
        self.order(id)
            .and_then(|order| self.shelves.get(order.temp()))
            .is_some_and(|shelf| shelf.contains(id))
    }

    pub fn overflow_contains(&self, id: OrderId) -> bool {
        self.overflow.contains(id)
    }

    /// Remaining lifetime of an arena order at `now`.
    pub fn lifetime_remaining(&self, id: OrderId, now: Instant) -> Result<f64, KitchenError> {
        Ok(self.known_order(id)?.lifetime_remaining(now)?)
    }

    // =========================================================================
    // Mutation (coordinator only, plus policy probes)
    // =========================================================================

    pub fn insert_order(&mut self, order: Order) {
        self.orders.insert(order.id(), order);
    }

    /// Adds the order to its designated temperature shelf. `Ok(false)`
    /// when that shelf is full.
    pub fn place_on_temp_shelf(&mut self, id: OrderId) -> Result<bool, KitchenError> {
        let order = self
            .orders
            .get(&id)
            .ok_or_else(|| KitchenError::InvalidProcedure(format!("unknown order {id}")))?;
        let shelf = self
            .shelves
            .get_mut(order.temp())
            .ok_or_else(|| KitchenError::UnknownTemp(order.temp().to_string()))?;
        Ok(shelf.add(order)?)
    }

    /// Adds the order to the overflow shelf. `Ok(false)` when full.
    pub fn place_on_overflow(&mut self, id: OrderId) -> Result<bool, KitchenError> {
        let order = self
            .orders
            .get(&id)
            .ok_or_else(|| KitchenError::InvalidProcedure(format!("unknown order {id}")))?;
        Ok(self.overflow.add(order)?)
    }

    /// Removes the order from its designated temperature shelf; true iff
    /// it was there.
    pub fn take_from_temp_shelf(&mut self, id: OrderId) -> Result<bool, KitchenError> {
        let temp = self.known_order(id)?.temp().to_string();
        let shelf = self
            .shelves
            .get_mut(&temp)
            .ok_or(KitchenError::UnknownTemp(temp))?;
        Ok(shelf.remove(id))
    }

    /// Removes the order from the overflow shelf; true iff it was there.
    pub fn take_from_overflow(&mut self, id: OrderId) -> Result<bool, KitchenError> {
        self.known_order(id)?;
        Ok(self.overflow.remove(id))
    }

    // =========================================================================
    // Policy probes
    // =========================================================================

    /// Remaining lifetime the order would have if it sat on the overflow
    /// shelf right now.
    ///
    /// The order is momentarily re-rated to `decay_rate * overflow
    /// multiplier` and its saved anchor is written back before this
    /// returns, so the probe is observationally pure: the anchor triple
    /// after the call is bit-for-bit the one from before it.
    pub fn projected_lifetime_on_overflow(
        &mut self,
        id: OrderId,
        now: Instant,
    ) -> Result<f64, KitchenError> {
        let multiplier = self.overflow.decay_rate_multiplier();
        let order = self
            .orders
            .get_mut(&id)
            .ok_or_else(|| KitchenError::InvalidProcedure(format!("unknown order {id}")))?;
        let saved = order
            .decay_anchor()
            .ok_or(crate::model::OrderError::NotInitialized(id))?;

        let probe_rate = order.decay_rate() * multiplier;
        order.update_decay_rate(now, probe_rate)?;
        let projected = order.lifetime_remaining(now)?;
        order.restore_anchor(saved);
        Ok(projected)
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// Deep-copies every shelf for event emission: temperature shelves in
    /// type order, overflow last, orders cloned and sorted by id.
    pub fn snapshot_shelves(&self) -> Vec<ShelfSnapshot> {
        let mut snapshots: Vec<ShelfSnapshot> = self
            .shelves
            .values()
            .map(|shelf| ShelfSnapshot::capture(shelf, |id| self.orders.get(&id)))
            .collect();
        snapshots.push(ShelfSnapshot::capture(&self.overflow, |id| self.orders.get(&id)));
        snapshots
    }
}
