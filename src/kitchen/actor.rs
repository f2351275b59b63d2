//! The kitchen coordinator: a single task that owns all kitchen state and
//! processes messages sequentially.
//!
//! # Concurrency Model
//! Order arrivals, decay expiries and driver arrivals all enter through
//! one mpsc channel and are handled one at a time, so no two mutations of
//! the shelves, arena or timer maps can interleave. Sequential message
//! processing plays the role a coordinator mutex would: timers fire on
//! other tasks, but all they do is send a message back here.
//!
//! # Timers
//! A timer is a spawned task that sleeps and then sends a message carrying
//! an *epoch*. The coordinator remembers the epoch it last armed per order
//! and ignores any firing whose epoch is stale, which covers both flavors
//! of race: a timer aborted just after its message was queued, and a decay
//! timer superseded by a reschedule. Cancellation aborts the task and
//! drops the map entry.
//!
//! The stream completes when the source has completed and both timer maps
//! are empty: at that point every order has had its one terminal event.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::dispatch::Dispatcher;
use crate::kitchen::event::{OrderEvent, OrderEventType};
use crate::kitchen::{KitchenError, KitchenState};
use crate::model::{Order, OrderId};
use crate::policy::OverflowPolicy;
use crate::source::SourceError;

/// Messages processed by the coordinator task.
#[derive(Debug)]
pub(crate) enum KitchenMsg {
    /// A new order arrived from the source.
    Incoming(Box<Order>),
    /// The source completed normally.
    SourceEnded,
    /// The source failed; the stream fails with it.
    SourceFailed(SourceError),
    /// A decay-expiry timer fired.
    DecayExpired { order_id: OrderId, epoch: u64 },
    /// A driver-arrival timer fired.
    DriverArrived { order_id: OrderId, epoch: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    Decay,
    Driver,
}

/// Which shelf an order is being placed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShelfSlot {
    /// The order's designated temperature shelf.
    Temp,
    Overflow,
}

struct TimerEntry {
    epoch: u64,
    handle: JoinHandle<()>,
}

pub(crate) struct KitchenActor<P, D> {
    state: KitchenState,
    policy: P,
    dispatcher: D,
    inbox: mpsc::Receiver<KitchenMsg>,
    /// Clone handed to timer tasks so their firings come back as messages.
    timer_tx: mpsc::Sender<KitchenMsg>,
    events: mpsc::Sender<Result<OrderEvent, KitchenError>>,
    decay_timers: HashMap<OrderId, TimerEntry>,
    driver_timers: HashMap<OrderId, TimerEntry>,
    next_epoch: u64,
    source_done: bool,
}

impl<P: OverflowPolicy, D: Dispatcher> KitchenActor<P, D> {
    pub(crate) fn new(
        state: KitchenState,
        policy: P,
        dispatcher: D,
        inbox: mpsc::Receiver<KitchenMsg>,
        timer_tx: mpsc::Sender<KitchenMsg>,
        events: mpsc::Sender<Result<OrderEvent, KitchenError>>,
    ) -> Self {
        Self {
            state,
            policy,
            dispatcher,
            inbox,
            timer_tx,
            events,
            decay_timers: HashMap::new(),
            driver_timers: HashMap::new(),
            next_epoch: 0,
            source_done: false,
        }
    }

    /// Runs the coordinator until the stream completes or fails.
    pub(crate) async fn run(mut self) {
        info!("kitchen coordinator started");

        while let Some(msg) = self.inbox.recv().await {
            let result = match msg {
                KitchenMsg::Incoming(order) => self.handle_incoming(*order).await,
                KitchenMsg::SourceEnded => {
                    debug!("order source completed");
                    self.source_done = true;
                    Ok(())
                }
                KitchenMsg::SourceFailed(error) => Err(KitchenError::Source(error)),
                KitchenMsg::DecayExpired { order_id, epoch } => {
                    self.handle_decay_expired(order_id, epoch).await
                }
                KitchenMsg::DriverArrived { order_id, epoch } => {
                    self.handle_driver_arrived(order_id, epoch).await
                }
            };

            if let Err(error) = result {
                warn!(%error, "event stream failed");
                let _ = self.events.send(Err(error)).await;
                break;
            }

            if self.source_done && self.decay_timers.is_empty() && self.driver_timers.is_empty() {
                debug!("source complete and all timers settled");
                break;
            }
        }

        self.shutdown();
    }

    fn shutdown(&mut self) {
        for (_, entry) in self.decay_timers.drain() {
            entry.handle.abort();
        }
        for (_, entry) in self.driver_timers.drain() {
            entry.handle.abort();
        }
        info!("kitchen coordinator stopped");
    }

    // =========================================================================
    // Incoming orders
    // =========================================================================

    async fn handle_incoming(&mut self, mut order: Order) -> Result<(), KitchenError> {
        let now = Instant::now();
        let id = order.id();
        debug!(order = %id, temp = order.temp(), "order received");

        order.initialize(now);
        self.state.insert_order(order);

        // The driver is dispatched before placement is decided; if the
        // order is discarded below without ever being shelved, the driver
        // timer stays armed and its arrival finds nothing.
        self.dispatch_driver(id)?;

        if self.state.place_on_temp_shelf(id)? {
            self.order_added_to_shelf(id, ShelfSlot::Temp, now).await
        } else if !self.state.overflow().is_full() {
            let chosen = self.policy.on_temp_shelf_full(&mut self.state, id, now)?;
            self.shift_on_temp_shelf_full(id, chosen, now).await
        } else {
            let (waste, replacement) =
                self.policy.on_overflow_shelf_full(&mut self.state, id, now)?;
            self.shift_on_overflow_shelf_full(id, waste, replacement, now)
                .await
        }
    }

    /// The incoming order's temperature shelf is full and the policy chose
    /// `chosen` to go to the overflow shelf. Either the incoming order
    /// moves there directly, or a resident moves and the incoming order
    /// takes its slot.
    async fn shift_on_temp_shelf_full(
        &mut self,
        incoming: OrderId,
        chosen: OrderId,
        now: Instant,
    ) -> Result<(), KitchenError> {
        if chosen == incoming {
            if !self.state.place_on_overflow(incoming)? {
                return Err(KitchenError::InvalidProcedure(
                    "failed to add incoming order to overflow shelf".into(),
                ));
            }
            return self.order_added_to_shelf(incoming, ShelfSlot::Overflow, now).await;
        }

        if !self.state.take_from_temp_shelf(chosen)? {
            return Err(KitchenError::InvalidProcedure(
                "overflow candidate is not on its temperature shelf".into(),
            ));
        }
        if !self.state.place_on_overflow(chosen)? {
            return Err(KitchenError::InvalidProcedure(
                "failed to add overflow candidate to overflow shelf".into(),
            ));
        }
        self.order_added_to_shelf(chosen, ShelfSlot::Overflow, now).await?;

        if !self.state.place_on_temp_shelf(incoming)? {
            return Err(KitchenError::InvalidProcedure(
                "failed to place incoming order on vacated temperature shelf slot".into(),
            ));
        }
        self.order_added_to_shelf(incoming, ShelfSlot::Temp, now).await
    }

    /// Every shelf the incoming order could occupy is full; the policy
    /// chose `waste` to discard and (unless the incoming order itself is
    /// the waste) `replacement` to move into the vacated slot.
    async fn shift_on_overflow_shelf_full(
        &mut self,
        incoming: OrderId,
        waste: OrderId,
        replacement: Option<OrderId>,
        now: Instant,
    ) -> Result<(), KitchenError> {
        if self.state.take_from_temp_shelf(waste)? {
            // Waste came off a temperature shelf.
            let shelf_type = self.order_temp(waste)?;
            self.order_wasted(waste, Some(&shelf_type), true, now).await?;

            match replacement {
                Some(replacement) if replacement == incoming => {
                    // The incoming order takes the vacated slot directly.
                    if !self.state.place_on_temp_shelf(incoming)? {
                        return Err(KitchenError::InvalidProcedure(
                            "failed to place incoming order on vacated temperature shelf slot"
                                .into(),
                        ));
                    }
                    self.order_added_to_shelf(incoming, ShelfSlot::Temp, now).await
                }
                Some(replacement) => {
                    // An overflow order is rescued into the vacated slot
                    // and the incoming order takes its overflow spot.
                    if !self.state.take_from_overflow(replacement)? {
                        return Err(KitchenError::InvalidProcedure(
                            "replacement candidate is not on the overflow shelf".into(),
                        ));
                    }
                    if !self.state.place_on_temp_shelf(replacement)? {
                        return Err(KitchenError::InvalidProcedure(
                            "failed to place replacement on vacated temperature shelf slot".into(),
                        ));
                    }
                    self.order_added_to_shelf(replacement, ShelfSlot::Temp, now).await?;

                    if !self.state.place_on_overflow(incoming)? {
                        return Err(KitchenError::InvalidProcedure(
                            "failed to add incoming order to overflow shelf".into(),
                        ));
                    }
                    self.order_added_to_shelf(incoming, ShelfSlot::Overflow, now).await
                }
                None => Err(KitchenError::InvalidProcedure(
                    "replacement required when waste leaves a temperature shelf".into(),
                )),
            }
        } else if self.state.take_from_overflow(waste)? {
            // Waste came off the overflow shelf.
            let shelf_type = self.state.overflow().shelf_type().to_string();
            self.order_wasted(waste, Some(&shelf_type), true, now).await?;

            match replacement {
                Some(replacement) if replacement == incoming => {
                    if !self.state.place_on_overflow(incoming)? {
                        return Err(KitchenError::InvalidProcedure(
                            "failed to add incoming order to overflow shelf".into(),
                        ));
                    }
                    self.order_added_to_shelf(incoming, ShelfSlot::Overflow, now).await
                }
                Some(replacement) => {
                    // A temperature-shelf order moves onto overflow and the
                    // incoming order takes its temperature slot.
                    if !self.state.take_from_temp_shelf(replacement)? {
                        return Err(KitchenError::InvalidProcedure(
                            "replacement candidate is not on its temperature shelf".into(),
                        ));
                    }
                    if !self.state.place_on_overflow(replacement)? {
                        return Err(KitchenError::InvalidProcedure(
                            "failed to add replacement candidate to overflow shelf".into(),
                        ));
                    }
                    self.order_added_to_shelf(replacement, ShelfSlot::Overflow, now).await?;

                    if !self.state.place_on_temp_shelf(incoming)? {
                        return Err(KitchenError::InvalidProcedure(
                            "failed to place incoming order on vacated temperature shelf slot"
                                .into(),
                        ));
                    }
                    self.order_added_to_shelf(incoming, ShelfSlot::Temp, now).await
                }
                None => Err(KitchenError::InvalidProcedure(
                    "replacement required when waste leaves the overflow shelf".into(),
                )),
            }
        } else {
            // Waste is on no shelf: it must be the incoming order itself,
            // discarded before ever being placed. No decay timer was
            // armed; the driver timer stays armed and finds nothing.
            self.order_wasted(waste, None, false, now).await
        }
    }

    // =========================================================================
    // Timer firings
    // =========================================================================

    async fn handle_decay_expired(&mut self, id: OrderId, epoch: u64) -> Result<(), KitchenError> {
        if self.decay_timers.get(&id).map(|t| t.epoch) != Some(epoch) {
            // canceled or rescheduled after this firing was queued
            return Ok(());
        }
        self.decay_timers.remove(&id);
        let now = Instant::now();

        if self.state.take_from_temp_shelf(id)? {
            let shelf_type = self.order_temp(id)?;
            debug!(order = %id, shelf = %shelf_type, "order fully decayed");
            self.decayed_to_waste(id, &shelf_type, now).await?;
            self.refill_from_overflow(id, now).await?;
        } else if self.state.take_from_overflow(id)? {
            let shelf_type = self.state.overflow().shelf_type().to_string();
            debug!(order = %id, shelf = %shelf_type, "order fully decayed");
            self.decayed_to_waste(id, &shelf_type, now).await?;
        }
        // otherwise the order was picked up between the firing and this
        // message; nothing to do
        Ok(())
    }

    async fn handle_driver_arrived(&mut self, id: OrderId, epoch: u64) -> Result<(), KitchenError> {
        if self.driver_timers.get(&id).map(|t| t.epoch) != Some(epoch) {
            return Ok(());
        }
        self.driver_timers.remove(&id);
        let now = Instant::now();

        let on_temp_shelf = self.state.temp_shelf_contains(id);
        let on_overflow = !on_temp_shelf && self.state.overflow_contains(id);
        if !on_temp_shelf && !on_overflow {
            // already discarded (or never placed); the trip was for nothing
            debug!(order = %id, "driver arrived for an absent order");
            return Ok(());
        }

        let shelf_type = if on_temp_shelf {
            self.order_temp(id)?
        } else {
            self.state.overflow().shelf_type().to_string()
        };
        let freshness = self
            .state
            .order(id)
            .ok_or_else(|| KitchenError::InvalidProcedure(format!("unknown order {id}")))?
            .freshness(now)?;

        let removed = if on_temp_shelf {
            self.state.take_from_temp_shelf(id)?
        } else {
            self.state.take_from_overflow(id)?
        };
        debug_assert!(removed);

        if freshness <= 0.0 {
            // The decay timer's ceiling rounded past the exact zero
            // crossing; the tie goes to waste, not to the driver.
            debug!(order = %id, shelf = %shelf_type, "driver found a fully decayed order");
            self.order_wasted(id, Some(&shelf_type), true, now).await?;
        } else {
            self.cancel_timers(id);
            debug!(order = %id, shelf = %shelf_type, "order picked up");
            self.emit(id, OrderEventType::PickedUp, Some(&shelf_type), now).await?;
        }

        if on_temp_shelf {
            self.refill_from_overflow(id, now).await?;
        }
        Ok(())
    }

    // =========================================================================
    // Shared steps
    // =========================================================================

    /// Re-rates an order for the shelf it just landed on, arms a fresh
    /// decay timer and emits `AddedToShelf`.
    async fn order_added_to_shelf(
        &mut self,
        id: OrderId,
        slot: ShelfSlot,
        now: Instant,
    ) -> Result<(), KitchenError> {
        self.cancel_timer(TimerKind::Decay, id);

        let (multiplier, shelf_type) = match slot {
            ShelfSlot::Overflow => {
                let overflow = self.state.overflow();
                (overflow.decay_rate_multiplier(), overflow.shelf_type().to_string())
            }
            ShelfSlot::Temp => {
                let temp = self.order_temp(id)?;
                let shelf = self
                    .state
                    .shelf(&temp)
                    .ok_or(KitchenError::UnknownTemp(temp))?;
                (shelf.decay_rate_multiplier(), shelf.shelf_type().to_string())
            }
        };

        let order = self
            .state
            .order_mut(id)
            .ok_or_else(|| KitchenError::InvalidProcedure(format!("unknown order {id}")))?;
        let shelved_rate = order.decay_rate() * multiplier;
        order.update_decay_rate(now, shelved_rate)?;

        // Round up to the next whole time unit; the order is certainly at
        // zero freshness by the time the timer fires.
        let remaining = order.lifetime_remaining(now)?;
        let delay = order.time_unit().to_duration(remaining.ceil());
        self.arm_timer(TimerKind::Decay, id, delay);

        debug!(order = %id, shelf = %shelf_type, remaining, "order shelved");
        self.emit(id, OrderEventType::AddedToShelf, Some(&shelf_type), now).await
    }

    async fn decayed_to_waste(
        &mut self,
        id: OrderId,
        shelf_type: &str,
        now: Instant,
    ) -> Result<(), KitchenError> {
        self.cancel_timers(id);
        self.emit(id, OrderEventType::DecayedWaste, Some(shelf_type), now).await
    }

    /// Emits `RemovedWaste` for a policy eviction or a late pickup.
    /// `cancel_timers` is false only for an incoming order that was never
    /// placed, whose driver timer is deliberately left armed.
    async fn order_wasted(
        &mut self,
        id: OrderId,
        shelf_type: Option<&str>,
        cancel_timers: bool,
        now: Instant,
    ) -> Result<(), KitchenError> {
        if cancel_timers {
            self.cancel_timers(id);
        }
        debug!(order = %id, shelf = shelf_type.unwrap_or("none"), "order removed as waste");
        self.emit(id, OrderEventType::RemovedWaste, shelf_type, now).await
    }

    /// Offers a freed temperature-shelf slot to the overflow shelf.
    async fn refill_from_overflow(
        &mut self,
        removed: OrderId,
        now: Instant,
    ) -> Result<(), KitchenError> {
        let Some(promoted) = self.policy.on_order_removed(&mut self.state, removed, now)? else {
            return Ok(());
        };
        if !self.state.take_from_overflow(promoted)? {
            return Err(KitchenError::InvalidProcedure(format!(
                "promoted order {promoted} is not on the overflow shelf"
            )));
        }
        if !self.state.place_on_temp_shelf(promoted)? {
            return Err(KitchenError::InvalidProcedure(format!(
                "no room to promote order {promoted} onto its temperature shelf"
            )));
        }
        self.order_added_to_shelf(promoted, ShelfSlot::Temp, now).await
    }

    fn dispatch_driver(&mut self, id: OrderId) -> Result<(), KitchenError> {
        let order = self
            .state
            .order(id)
            .ok_or_else(|| KitchenError::InvalidProcedure(format!("unknown order {id}")))?;
        let driver = self.dispatcher.dispatch(order);
        let delay = driver.time_unit.to_duration(f64::from(driver.duration));
        debug!(order = %id, duration = driver.duration, unit = %driver.time_unit, "driver dispatched");
        self.arm_timer(TimerKind::Driver, id, delay);
        Ok(())
    }

    async fn emit(
        &mut self,
        id: OrderId,
        event_type: OrderEventType,
        shelf_type: Option<&str>,
        now: Instant,
    ) -> Result<(), KitchenError> {
        let order = self
            .state
            .order(id)
            .ok_or_else(|| KitchenError::InvalidProcedure(format!("unknown order {id}")))?
            .clone();
        let event = OrderEvent {
            order,
            event_type,
            shelf_type: shelf_type.map(str::to_string),
            date: Utc::now(),
            at: now,
            shelves: self.state.snapshot_shelves(),
        };
        // A dropped receiver just means nobody is watching anymore; the
        // simulation still runs to completion.
        let _ = self.events.send(Ok(event)).await;
        Ok(())
    }

    fn order_temp(&self, id: OrderId) -> Result<String, KitchenError> {
        self.state
            .order(id)
            .map(|order| order.temp().to_string())
            .ok_or_else(|| KitchenError::InvalidProcedure(format!("unknown order {id}")))
    }

    // =========================================================================
    // Timer plumbing
    // =========================================================================

    fn arm_timer(&mut self, kind: TimerKind, order_id: OrderId, delay: Duration) {
        let epoch = self.next_epoch;
        self.next_epoch += 1;

        let tx = self.timer_tx.clone();
        let handle = tokio::spawn(async move {
            sleep(delay).await;
            let msg = match kind {
                TimerKind::Decay => KitchenMsg::DecayExpired { order_id, epoch },
                TimerKind::Driver => KitchenMsg::DriverArrived { order_id, epoch },
            };
            let _ = tx.send(msg).await;
        });

        let map = match kind {
            TimerKind::Decay => &mut self.decay_timers,
            TimerKind::Driver => &mut self.driver_timers,
        };
        if let Some(previous) = map.insert(order_id, TimerEntry { epoch, handle }) {
            previous.handle.abort();
        }
    }

    fn cancel_timer(&mut self, kind: TimerKind, order_id: OrderId) {
        let map = match kind {
            TimerKind::Decay => &mut self.decay_timers,
            TimerKind::Driver => &mut self.driver_timers,
        };
        if let Some(entry) = map.remove(&order_id) {
            entry.handle.abort();
        }
    }

    fn cancel_timers(&mut self, order_id: OrderId) {
        self.cancel_timer(TimerKind::Decay, order_id);
        self.cancel_timer(TimerKind::Driver, order_id);
    }
}
