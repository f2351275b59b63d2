//! # Kitchen Coordinator
//!
//! The kitchen owns the shelves, consumes the order stream, invokes the
//! overflow policy, schedules decay-expiry and driver-arrival timers, and
//! emits the event stream a display consumes.
//!
//! ## Structure
//!
//! - [`Kitchen`] - the facade: construct with shelves, a policy and a
//!   dispatcher, then call [`Kitchen::process_orders`].
//! - [`KitchenState`] - the order arena and shelves, the state snapshot
//!   the policy observes and the coordinator mutates.
//! - [`OrderEvent`] / [`OrderEventType`] - the stream items.
//! - [`KitchenError`] - the stream-fatal error taxonomy.
//! - `actor` (private) - the coordinator task itself.
//!
//! ## Event stream contract
//!
//! `process_orders` returns a channel of `Result<OrderEvent, KitchenError>`
//! that emits one `AddedToShelf` per shelf placement, one `PickedUp` per
//! successful driver collection, one `DecayedWaste` per decay expiry and
//! one `RemovedWaste` per policy eviction or late pickup. The channel
//! closes only after the source has completed and every pending timer has
//! fired or been canceled; it yields a final `Err` item and stops early if
//! the policy issues an infeasible instruction or the source fails.

mod actor;
pub mod error;
pub mod event;
pub mod state;

pub use error::KitchenError;
pub use event::{OrderEvent, OrderEventType, ShelfSnapshot};
pub use state::KitchenState;

use tokio::sync::mpsc;
use tracing::info;

use crate::dispatch::Dispatcher;
use crate::kitchen::actor::{KitchenActor, KitchenMsg};
use crate::model::Shelf;
use crate::policy::OverflowPolicy;
use crate::source::OrderSource;

/// The stream of order events produced by a kitchen run.
pub type EventStream = mpsc::Receiver<Result<OrderEvent, KitchenError>>;

const EVENT_BUFFER: usize = 256;
const MSG_BUFFER: usize = 64;

/// A fulfillment kitchen: temperature shelves, one overflow shelf, an
/// overflow policy and a driver dispatcher.
///
/// # Example
///
/// ```ignore
/// let kitchen = Kitchen::new(
///     LifetimeOverflowPolicy::new(),
///     UniformDispatcher::new(TimeUnit::Seconds, 2, 8),
///     vec![hot, cold, frozen],
///     overflow,
/// );
/// let mut events = kitchen.process_orders(&source);
/// while let Some(event) = events.recv().await { /* display */ }
/// ```
pub struct Kitchen<P, D> {
    state: KitchenState,
    policy: P,
    dispatcher: D,
}

impl<P: OverflowPolicy, D: Dispatcher> Kitchen<P, D> {
    pub fn new(
        policy: P,
        dispatcher: D,
        temperature_shelves: Vec<Shelf>,
        overflow_shelf: Shelf,
    ) -> Self {
        Self {
            state: KitchenState::new(temperature_shelves, overflow_shelf),
            policy,
            dispatcher,
        }
    }

    /// Temperature shelf types, not including overflow.
    pub fn shelf_temps(&self) -> impl Iterator<Item = &str> {
        self.state.shelf_temps()
    }

    pub fn shelf(&self, temp: &str) -> Option<&Shelf> {
        self.state.shelf(temp)
    }

    pub fn overflow(&self) -> &Shelf {
        self.state.overflow()
    }

    /// Subscribes to the source and starts the coordinator, returning the
    /// cold event stream. Consumes the kitchen: the coordinator task takes
    /// ownership of all state for the duration of the run.
    pub fn process_orders<S: OrderSource>(self, source: &S) -> EventStream {
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let (msg_tx, msg_rx) = mpsc::channel(MSG_BUFFER);

        // Bridge the source's order stream into coordinator messages.
        let mut orders = source.subscribe();
        let bridge_tx = msg_tx.clone();
        tokio::spawn(async move {
            while let Some(item) = orders.recv().await {
                let msg = match item {
                    Ok(order) => KitchenMsg::Incoming(Box::new(order)),
                    Err(error) => {
                        let _ = bridge_tx.send(KitchenMsg::SourceFailed(error)).await;
                        return;
                    }
                };
                if bridge_tx.send(msg).await.is_err() {
                    return;
                }
            }
            let _ = bridge_tx.send(KitchenMsg::SourceEnded).await;
        });

        info!(
            shelves = ?self.state.shelf_temps().collect::<Vec<_>>(),
            overflow_capacity = self.state.overflow().capacity(),
            "processing orders"
        );
        let actor = KitchenActor::new(
            self.state,
            self.policy,
            self.dispatcher,
            msg_rx,
            msg_tx,
            event_tx,
        );
        tokio::spawn(actor.run());

        event_rx
    }
}
