//! The standard policy: rank everything by remaining lifetime.
//!
//! The strategy, in three rules:
//!
//! 1. When moving orders *to* the overflow shelf, send the one that would
//!    live longest there. Long-lived orders suffer relatively least from
//!    the accelerated decay; fragile ones keep the friendlier shelf.
//! 2. When moving orders *from* the overflow shelf, rescue the one that
//!    would expire soonest, buying it time to be picked up.
//! 3. When everything is full and an order must be discarded, sacrifice
//!    the one that will expire soonest anyway.
//!
//! Candidates are gathered in sorted-id order and the first extremum wins,
//! so ties break deterministically for a given kitchen state.

use std::collections::BTreeSet;

use tokio::time::Instant;

use crate::kitchen::{KitchenError, KitchenState};
use crate::model::OrderId;
use crate::policy::OverflowPolicy;

/// [`OverflowPolicy`] that compares orders by `lifetime_remaining(now)`,
/// probing the overflow multiplier where a hypothetical move is evaluated.
#[derive(Debug, Clone, Copy, Default)]
pub struct LifetimeOverflowPolicy;

impl LifetimeOverflowPolicy {
    pub fn new() -> Self {
        Self
    }
}

impl OverflowPolicy for LifetimeOverflowPolicy {
    fn on_temp_shelf_full(
        &self,
        state: &mut KitchenState,
        incoming: OrderId,
        now: Instant,
    ) -> Result<OrderId, KitchenError> {
        let temp = order_temp(state, incoming)?;
        let shelf = state
            .shelf(&temp)
            .ok_or(KitchenError::UnknownTemp(temp))?;

        let mut candidates = shelf.order_ids();
        candidates.push(incoming);

        argmax_projected_on_overflow(state, &candidates, now)?
            .ok_or_else(|| KitchenError::InvalidProcedure("no overflow candidate".into()))
    }

    fn on_overflow_shelf_full(
        &self,
        state: &mut KitchenState,
        incoming: OrderId,
        now: Instant,
    ) -> Result<(OrderId, Option<OrderId>), KitchenError> {
        let incoming_temp = order_temp(state, incoming)?;

        // Removal pool: the incoming order, every overflow resident, and
        // the residents of each full temperature shelf whose temp could be
        // backfilled from here (the incoming's temp or some overflow
        // resident's temp).
        let eligible = eligible_temp_orders(state, &incoming_temp);
        let mut pool = vec![incoming];
        pool.extend(state.overflow().order_ids());
        pool.extend(eligible.iter().copied());

        let removal = argmin_lifetime(state, &pool, now)?
            .ok_or_else(|| KitchenError::InvalidProcedure("empty removal pool".into()))?;

        if removal == incoming {
            // The incoming order is the frailest of them all; discard it
            // without touching any shelf.
            return Ok((incoming, None));
        }

        if state.temp_shelf_contains(removal) {
            // A temperature-shelf slot opens. Rescue the frailest overflow
            // order of that temp (or the incoming order, if it matches).
            let removal_temp = order_temp(state, removal)?;
            let mut candidates = overflow_orders_of_temp(state, &removal_temp);
            if incoming_temp == removal_temp {
                candidates.push(incoming);
            }
            let replacement = argmin_lifetime(state, &candidates, now)?.ok_or_else(|| {
                KitchenError::InvalidProcedure(
                    "no replacement for vacated temperature shelf slot".into(),
                )
            })?;
            Ok((removal, Some(replacement)))
        } else {
            // An overflow slot opens. Fill it with whoever survives the
            // overflow multiplier best: the eligible temperature-shelf
            // orders of the incoming's temp, or the incoming itself.
            let mut candidates: Vec<OrderId> = Vec::new();
            for &id in &eligible {
                if order_temp(state, id)? == incoming_temp {
                    candidates.push(id);
                }
            }
            candidates.push(incoming);

            let replacement = argmax_projected_on_overflow(state, &candidates, now)?
                .ok_or_else(|| {
                    KitchenError::InvalidProcedure("no replacement for vacated overflow slot".into())
                })?;
            Ok((removal, Some(replacement)))
        }
    }

    fn on_order_removed(
        &self,
        state: &mut KitchenState,
        removed: OrderId,
        now: Instant,
    ) -> Result<Option<OrderId>, KitchenError> {
        let temp = order_temp(state, removed)?;
        let candidates = overflow_orders_of_temp(state, &temp);
        argmin_lifetime(state, &candidates, now)
    }
}

// =============================================================================
// Candidate gathering
// =============================================================================

fn order_temp(state: &KitchenState, id: OrderId) -> Result<String, KitchenError> {
    state
        .order(id)
        .map(|order| order.temp().to_string())
        .ok_or_else(|| KitchenError::InvalidProcedure(format!("unknown order {id}")))
}

/// Overflow residents of the given temperature, sorted by id.
fn overflow_orders_of_temp(state: &KitchenState, temp: &str) -> Vec<OrderId> {
    state
        .overflow()
        .order_ids()
        .into_iter()
        .filter(|&id| state.order(id).is_some_and(|order| order.temp() == temp))
        .collect()
}

/// Residents of every *full* temperature shelf whose temp is the incoming
/// order's or appears among the overflow residents. Only those shelves can
/// have their vacancy backfilled, which is what makes their orders fair
/// removal candidates.
fn eligible_temp_orders(state: &KitchenState, incoming_temp: &str) -> Vec<OrderId> {
    let mut temps: BTreeSet<String> = state
        .overflow()
        .order_ids()
        .into_iter()
        .filter_map(|id| state.order(id).map(|order| order.temp().to_string()))
        .collect();
    temps.insert(incoming_temp.to_string());

    let mut orders = Vec::new();
    for temp in temps {
        if let Some(shelf) = state.shelf(&temp) {
            if shelf.is_full() {
                orders.extend(shelf.order_ids());
            }
        }
    }
    orders
}

// =============================================================================
// Selection
// =============================================================================

fn argmin_lifetime(
    state: &KitchenState,
    candidates: &[OrderId],
    now: Instant,
) -> Result<Option<OrderId>, KitchenError> {
    let mut best: Option<(OrderId, f64)> = None;
    for &id in candidates {
        let remaining = state.lifetime_remaining(id, now)?;
        if best.is_none() || remaining < best.map(|(_, b)| b).unwrap_or(f64::INFINITY) {
            best = Some((id, remaining));
        }
    }
    Ok(best.map(|(id, _)| id))
}

fn argmax_projected_on_overflow(
    state: &mut KitchenState,
    candidates: &[OrderId],
    now: Instant,
) -> Result<Option<OrderId>, KitchenError> {
    let mut best: Option<(OrderId, f64)> = None;
    for &id in candidates {
        let projected = state.projected_lifetime_on_overflow(id, now)?;
        if best.is_none() || projected > best.map(|(_, b)| b).unwrap_or(f64::NEG_INFINITY) {
            best = Some((id, projected));
        }
    }
    Ok(best.map(|(id, _)| id))
}
