//! Order events: the kitchen's output stream items.

use chrono::{DateTime, Utc};
use std::fmt::{self, Display};
use tokio::time::Instant;

use crate::model::{Order, OrderId, Shelf};

/// What happened to an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderEventType {
    /// The order landed on a shelf, either on arrival or while being
    /// shuffled to or from the overflow shelf.
    AddedToShelf,
    /// A driver picked the order up for delivery.
    PickedUp,
    /// The order's decay timer expired and it was discarded.
    DecayedWaste,
    /// The order was discarded to make room, or a late driver found it
    /// already at zero freshness.
    RemovedWaste,
}

impl Display for OrderEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrderEventType::AddedToShelf => "ADDED_TO_SHELF",
            OrderEventType::PickedUp => "PICKED_UP",
            OrderEventType::DecayedWaste => "DECAYED_WASTE",
            OrderEventType::RemovedWaste => "REMOVED_WASTE",
        };
        write!(f, "{name}")
    }
}

/// A frozen-in-time copy of one shelf, taken at event emission.
#[derive(Debug, Clone)]
pub struct ShelfSnapshot {
    pub shelf_type: String,
    pub capacity: usize,
    pub decay_rate_multiplier: f64,
    /// Orders cloned from the arena at emission time, sorted by id, with
    /// their decay anchors exactly as they were at that instant.
    pub orders: Vec<Order>,
}

impl ShelfSnapshot {
    /// Deep-copies a shelf, resolving its ids against `lookup`.
    pub(crate) fn capture<'a, F>(shelf: &Shelf, lookup: F) -> Self
    where
        F: Fn(OrderId) -> Option<&'a Order>,
    {
        let orders = shelf
            .order_ids()
            .into_iter()
            .filter_map(|id| lookup(id).cloned())
            .collect();
        Self {
            shelf_type: shelf.shelf_type().to_string(),
            capacity: shelf.capacity(),
            decay_rate_multiplier: shelf.decay_rate_multiplier(),
            orders,
        }
    }
}

/// One emission of the kitchen's event stream.
#[derive(Debug, Clone)]
pub struct OrderEvent {
    /// The order as it was at emission time (cloned, anchor included).
    pub order: Order,
    pub event_type: OrderEventType,
    /// Shelf the order was added to or removed from. `None` when an
    /// incoming order was discarded without ever being placed.
    pub shelf_type: Option<String>,
    /// Wall-clock stamp, for display.
    pub date: DateTime<Utc>,
    /// Logical instant of the event; evaluate freshness against this to
    /// see the values as of emission.
    pub at: Instant,
    /// Deep-copy snapshot of every shelf, temperature shelves first (in
    /// type order) and overflow last.
    pub shelves: Vec<ShelfSnapshot>,
}
