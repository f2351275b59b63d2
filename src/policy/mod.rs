//! # Overflow Policy
//!
//! When shelves saturate, something has to give. The [`OverflowPolicy`]
//! trait is the seam where that decision lives: the kitchen coordinator
//! detects *that* a shelf is full and the policy decides *which* orders to
//! move, replace or discard. The coordinator then executes the instruction
//! and treats any step it cannot carry out as an
//! [`InvalidProcedure`](crate::kitchen::KitchenError::InvalidProcedure)
//! stream error, because a policy that disagrees with the shelves about
//! reality cannot be corrected at runtime.
//!
//! All three procedures run on the coordinator task with the current
//! timestamp. They may probe "what if this order were on overflow" via
//! [`KitchenState::projected_lifetime_on_overflow`], which restores each
//! probed order's decay anchor verbatim, so a policy call never changes
//! observable kitchen state.

pub mod lifetime;

pub use lifetime::LifetimeOverflowPolicy;

use tokio::time::Instant;

use crate::kitchen::{KitchenError, KitchenState};
use crate::model::OrderId;

/// Decision procedures for shuffling orders when shelves saturate.
pub trait OverflowPolicy: Send + 'static {
    /// The incoming order's temperature shelf is full but overflow has
    /// room. Returns the order (the incoming one or a resident of that
    /// temperature shelf) that should be placed on the overflow shelf.
    fn on_temp_shelf_full(
        &self,
        state: &mut KitchenState,
        incoming: OrderId,
        now: Instant,
    ) -> Result<OrderId, KitchenError>;

    /// Every shelf the incoming order could occupy is full. Returns the
    /// order to discard as waste and, unless the incoming order itself is
    /// the waste, the order to move into the vacated slot.
    fn on_overflow_shelf_full(
        &self,
        state: &mut KitchenState,
        incoming: OrderId,
        now: Instant,
    ) -> Result<(OrderId, Option<OrderId>), KitchenError>;

    /// A temperature-shelf slot just freed up. Returns the overflow order
    /// that should be promoted into it, or `None` to leave the slot open.
    fn on_order_removed(
        &self,
        state: &mut KitchenState,
        removed: OrderId,
        now: Instant,
    ) -> Result<Option<OrderId>, KitchenError>;
}
