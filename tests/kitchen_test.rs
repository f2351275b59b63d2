//! End-to-end kitchen scenarios, run under paused Tokio time so every
//! timer fires deterministically and instantly.

use std::time::Duration;

use food_order_sim::dispatch::UniformDispatcher;
use food_order_sim::kitchen::{
    EventStream, Kitchen, KitchenError, OrderEvent, OrderEventType, ShelfSnapshot,
};
use food_order_sim::model::{Order, OrderId, OrderIdGen, OrderSpec, Shelf, TimeUnit};
use food_order_sim::policy::{LifetimeOverflowPolicy, OverflowPolicy};
use food_order_sim::source::ScriptedOrderSource;

fn order(ids: &OrderIdGen, name: &str, temp: &str, shelf_life: u32, decay_rate: f64) -> Order {
    Order::new(
        ids.next_id(),
        OrderSpec::new(name, temp, shelf_life, decay_rate),
        TimeUnit::Seconds,
    )
}

async fn collect(mut events: EventStream) -> Vec<Result<OrderEvent, KitchenError>> {
    let mut out = Vec::new();
    while let Some(item) = events.recv().await {
        out.push(item);
    }
    out
}

/// (event type, shelf type, order id) triples for terse assertions.
fn outline(events: &[Result<OrderEvent, KitchenError>]) -> Vec<(OrderEventType, Option<String>, u64)> {
    events
        .iter()
        .map(|item| {
            let event = item.as_ref().expect("stream failed");
            (event.event_type, event.shelf_type.clone(), event.order.id().0)
        })
        .collect()
}

fn terminal_events_per_order(events: &[Result<OrderEvent, KitchenError>]) -> Vec<(u64, OrderEventType)> {
    use std::collections::BTreeMap;
    let mut terminals: BTreeMap<u64, Vec<OrderEventType>> = BTreeMap::new();
    for item in events {
        let event = item.as_ref().expect("stream failed");
        if event.event_type != OrderEventType::AddedToShelf {
            terminals
                .entry(event.order.id().0)
                .or_default()
                .push(event.event_type);
        }
    }
    terminals
        .into_iter()
        .map(|(id, kinds)| {
            assert_eq!(kinds.len(), 1, "order {id} got {} terminal events", kinds.len());
            (id, kinds[0])
        })
        .collect()
}

/// Capacity and exclusivity invariants must hold in every snapshot.
fn assert_snapshots_consistent(events: &[Result<OrderEvent, KitchenError>]) {
    use std::collections::HashSet;
    for item in events {
        let event = item.as_ref().expect("stream failed");
        let mut seen: HashSet<OrderId> = HashSet::new();
        for ShelfSnapshot {
            shelf_type,
            capacity,
            orders,
            ..
        } in &event.shelves
        {
            assert!(
                orders.len() <= *capacity,
                "{shelf_type} shelf over capacity in a snapshot"
            );
            for order in orders {
                assert!(
                    seen.insert(order.id()),
                    "order {} on two shelves at once",
                    order.id()
                );
            }
        }
    }
}

// =============================================================================
// Scenarios
// =============================================================================

/// One order, enough capacity: shelved, picked up, stream completes.
#[tokio::test(start_paused = true)]
async fn single_order_is_shelved_and_picked_up() {
    let ids = OrderIdGen::new();
    let source = ScriptedOrderSource::new(vec![order(&ids, "Banana Split", "frozen", 20, 0.63)]);
    let kitchen = Kitchen::new(
        LifetimeOverflowPolicy::new(),
        UniformDispatcher::new(TimeUnit::Seconds, 0, 0),
        vec![Shelf::new("frozen", 1, 1.0)],
        Shelf::new("overflow", 1, 2.0).with_accepted_types(["frozen"]),
    );

    assert_eq!(kitchen.shelf_temps().collect::<Vec<_>>(), vec!["frozen"]);
    assert_eq!(kitchen.shelf("frozen").unwrap().capacity(), 1);
    assert!(kitchen.overflow().accepted_types().contains("frozen"));

    let events = collect(kitchen.process_orders(&source)).await;

    assert_eq!(
        outline(&events),
        vec![
            (OrderEventType::AddedToShelf, Some("frozen".into()), 0),
            (OrderEventType::PickedUp, Some("frozen".into()), 0),
        ]
    );

    // the pickup snapshot shows the frozen shelf empty again
    let last = events.last().unwrap().as_ref().unwrap();
    let frozen = last
        .shelves
        .iter()
        .find(|s| s.shelf_type == "frozen")
        .unwrap();
    assert!(frozen.orders.is_empty());
    assert_snapshots_consistent(&events);
}

/// Full temperature shelf with room on overflow: the policy moves the
/// slowest-decaying resident to overflow and the incoming order takes its
/// slot.
#[tokio::test(start_paused = true)]
async fn full_temp_shelf_shuffles_slowest_resident_to_overflow() {
    let ids = OrderIdGen::new();
    let source = ScriptedOrderSource::new(vec![
        order(&ids, "Icy Pole", "frozen", 100, 0.1),
        order(&ids, "Gelato", "frozen", 100, 0.2),
        order(&ids, "Dry Ice Special", "frozen", 10, 5.0),
    ]);
    let kitchen = Kitchen::new(
        LifetimeOverflowPolicy::new(),
        UniformDispatcher::new(TimeUnit::Seconds, 1, 1),
        vec![Shelf::new("frozen", 2, 1.0)],
        Shelf::new("overflow", 4, 2.0).with_accepted_types(["frozen"]),
    );

    let events = collect(kitchen.process_orders(&source)).await;
    let outline = outline(&events);

    // arrival processing is strictly ordered: the two residents land, then
    // the shuffle (projected overflow lifetimes 100/1.2, 100/1.4, 10/11
    // make order 0 the mover) and the incoming placement
    assert_eq!(
        outline[..4],
        [
            (OrderEventType::AddedToShelf, Some("frozen".into()), 0),
            (OrderEventType::AddedToShelf, Some("frozen".into()), 1),
            (OrderEventType::AddedToShelf, Some("overflow".into()), 0),
            (OrderEventType::AddedToShelf, Some("frozen".into()), 2),
        ]
    );

    // all three drivers arrive at t=1, before any decay timer
    assert_eq!(
        terminal_events_per_order(&events),
        vec![
            (0, OrderEventType::PickedUp),
            (1, OrderEventType::PickedUp),
            (2, OrderEventType::PickedUp),
        ]
    );
    assert_snapshots_consistent(&events);
}

/// Everything full and the incoming order is the frailest: it is
/// discarded with a null shelf, never placed, and its driver trip is a
/// no-op.
#[tokio::test(start_paused = true)]
async fn frail_incoming_order_is_discarded_without_placement() {
    let ids = OrderIdGen::new();
    let source = ScriptedOrderSource::new(vec![
        order(&ids, "Icy Pole", "frozen", 500, 0.1),
        order(&ids, "Gelato", "frozen", 500, 0.2),
        order(&ids, "Mayfly Melt", "frozen", 1, 10.0),
    ]);
    let kitchen = Kitchen::new(
        LifetimeOverflowPolicy::new(),
        UniformDispatcher::new(TimeUnit::Seconds, 1, 1),
        vec![Shelf::new("frozen", 1, 1.0)],
        Shelf::new("overflow", 1, 2.0).with_accepted_types(["frozen"]),
    );

    let events = collect(kitchen.process_orders(&source)).await;
    let outline = outline(&events);

    assert_eq!(
        outline[..4],
        [
            (OrderEventType::AddedToShelf, Some("frozen".into()), 0),
            (OrderEventType::AddedToShelf, Some("overflow".into()), 0),
            (OrderEventType::AddedToShelf, Some("frozen".into()), 1),
            (OrderEventType::RemovedWaste, None, 2),
        ]
    );

    // the discarded order got exactly one event, and no DecayedWaste ever
    assert_eq!(
        outline.iter().filter(|(_, _, id)| *id == 2).count(),
        1,
        "discarded order must not reappear"
    );
    assert!(outline
        .iter()
        .all(|(kind, _, _)| *kind != OrderEventType::DecayedWaste));

    assert_eq!(
        terminal_events_per_order(&events),
        vec![
            (0, OrderEventType::PickedUp),
            (1, OrderEventType::PickedUp),
            (2, OrderEventType::RemovedWaste),
        ]
    );
    assert_snapshots_consistent(&events);
}

/// Everything full and an overflow resident is the frailest: it is
/// discarded, the temperature-shelf order that survives overflow best
/// replaces it, and the incoming order takes the vacated temperature slot.
#[tokio::test(start_paused = true)]
async fn frail_overflow_resident_is_replaced_by_best_survivor() {
    let ids = OrderIdGen::new();
    let source = ScriptedOrderSource::new(vec![
        order(&ids, "Glacier Cake", "frozen", 1000, 0.01),
        order(&ids, "Bisque", "hot", 100, 0.5),
        order(&ids, "Flash Ramen", "hot", 60, 0.1),
        order(&ids, "Sorbet", "frozen", 300, 0.05),
    ]);
    let kitchen = Kitchen::new(
        LifetimeOverflowPolicy::new(),
        UniformDispatcher::new(TimeUnit::Seconds, 1, 1),
        vec![Shelf::new("frozen", 1, 1.0), Shelf::new("hot", 1, 1.0)],
        Shelf::new("overflow", 1, 10.0).with_accepted_types(["hot", "frozen"]),
    );

    let events = collect(kitchen.process_orders(&source)).await;
    let outline = outline(&events);

    // t=0 arrival processing:
    //   order 0 -> frozen, order 1 -> hot
    //   order 2: hot full, overflow open; projected x10 lifetimes
    //     100/6 vs 60/2 send the incoming itself to overflow
    //   order 3: all full; pool lifetimes 990 / 66.7 / 30 / 285.7 make the
    //     overflow resident (order 2) the waste; projected x10 lifetimes
    //     1000/1.1 vs 300/1.5 make order 0 the replacement
    assert_eq!(
        outline[..6],
        [
            (OrderEventType::AddedToShelf, Some("frozen".into()), 0),
            (OrderEventType::AddedToShelf, Some("hot".into()), 1),
            (OrderEventType::AddedToShelf, Some("overflow".into()), 2),
            (OrderEventType::RemovedWaste, Some("overflow".into()), 2),
            (OrderEventType::AddedToShelf, Some("overflow".into()), 0),
            (OrderEventType::AddedToShelf, Some("frozen".into()), 3),
        ]
    );

    assert_eq!(
        terminal_events_per_order(&events),
        vec![
            (0, OrderEventType::PickedUp),
            (1, OrderEventType::PickedUp),
            (2, OrderEventType::RemovedWaste),
            (3, OrderEventType::PickedUp),
        ]
    );
    assert_snapshots_consistent(&events);
}

/// Decay races the driver and wins: the order decays at t=2, and the
/// driver due at t=5 produces no event.
#[tokio::test(start_paused = true)]
async fn decay_timer_beats_a_slow_driver() {
    let ids = OrderIdGen::new();
    let source = ScriptedOrderSource::new(vec![order(&ids, "Tartare", "frozen", 2, 0.0)]);
    let kitchen = Kitchen::new(
        LifetimeOverflowPolicy::new(),
        UniformDispatcher::new(TimeUnit::Seconds, 5, 5),
        vec![Shelf::new("frozen", 1, 1.0)],
        Shelf::new("overflow", 1, 2.0).with_accepted_types(["frozen"]),
    );

    let events = collect(kitchen.process_orders(&source)).await;

    assert_eq!(
        outline(&events),
        vec![
            (OrderEventType::AddedToShelf, Some("frozen".into()), 0),
            (OrderEventType::DecayedWaste, Some("frozen".into()), 0),
        ]
    );
}

/// A late driver finds a fully decayed order: the decay timer's ceiling
/// rounded the expiry up to t=5s, but the driver lands at t=4.4s, after
/// the true zero crossing at t=4.3s. The tie goes to waste.
#[tokio::test(start_paused = true)]
async fn late_driver_finds_decayed_order() {
    let ids = OrderIdGen::new();
    // lifetime = 43 / (1 + 9) = 4.3s, decay timer armed for ceil -> 5s
    let source = ScriptedOrderSource::new(vec![order(&ids, "Affogato", "frozen", 43, 9.0)]);
    let kitchen = Kitchen::new(
        LifetimeOverflowPolicy::new(),
        UniformDispatcher::new(TimeUnit::Milliseconds, 4400, 4400),
        vec![Shelf::new("frozen", 1, 1.0)],
        Shelf::new("overflow", 1, 2.0).with_accepted_types(["frozen"]),
    );

    let events = collect(kitchen.process_orders(&source)).await;

    assert_eq!(
        outline(&events),
        vec![
            (OrderEventType::AddedToShelf, Some("frozen".into()), 0),
            (OrderEventType::RemovedWaste, Some("frozen".into()), 0),
        ]
    );
}

// =============================================================================
// Stream contract
// =============================================================================

/// Orders spread over time all settle, with exactly one terminal event
/// each, and the stream completes only after the last timer.
#[tokio::test(start_paused = true)]
async fn paced_arrivals_all_reach_a_terminal_event() {
    let ids = OrderIdGen::new();
    let source = ScriptedOrderSource::new(vec![
        order(&ids, "Ramen", "hot", 300, 0.45),
        order(&ids, "Poke", "cold", 220, 0.3),
        order(&ids, "Gelato", "frozen", 150, 0.2),
        order(&ids, "Congee", "hot", 80, 0.1),
    ])
    .with_delay_between(Duration::from_secs(3));
    let kitchen = Kitchen::new(
        LifetimeOverflowPolicy::new(),
        UniformDispatcher::new(TimeUnit::Seconds, 1, 1),
        vec![
            Shelf::new("hot", 2, 1.0),
            Shelf::new("cold", 2, 1.0),
            Shelf::new("frozen", 2, 1.0),
        ],
        Shelf::new("overflow", 2, 2.0).with_accepted_types(["hot", "cold", "frozen"]),
    );

    let events = collect(kitchen.process_orders(&source)).await;

    assert_eq!(
        terminal_events_per_order(&events),
        vec![
            (0, OrderEventType::PickedUp),
            (1, OrderEventType::PickedUp),
            (2, OrderEventType::PickedUp),
            (3, OrderEventType::PickedUp),
        ]
    );
    assert_snapshots_consistent(&events);
}

/// A policy that names an order the shelves do not hold fails the stream
/// with `InvalidProcedure` and emission stops.
#[tokio::test(start_paused = true)]
async fn infeasible_policy_instruction_fails_the_stream() {
    struct EvictGhostPolicy;

    impl OverflowPolicy for EvictGhostPolicy {
        fn on_temp_shelf_full(
            &self,
            _state: &mut food_order_sim::kitchen::KitchenState,
            _incoming: OrderId,
            _now: tokio::time::Instant,
        ) -> Result<OrderId, KitchenError> {
            Ok(OrderId(9_999))
        }

        fn on_overflow_shelf_full(
            &self,
            _state: &mut food_order_sim::kitchen::KitchenState,
            _incoming: OrderId,
            _now: tokio::time::Instant,
        ) -> Result<(OrderId, Option<OrderId>), KitchenError> {
            Ok((OrderId(9_999), None))
        }

        fn on_order_removed(
            &self,
            _state: &mut food_order_sim::kitchen::KitchenState,
            _removed: OrderId,
            _now: tokio::time::Instant,
        ) -> Result<Option<OrderId>, KitchenError> {
            Ok(None)
        }
    }

    let ids = OrderIdGen::new();
    let source = ScriptedOrderSource::new(vec![
        order(&ids, "Icy Pole", "frozen", 100, 0.1),
        order(&ids, "Gelato", "frozen", 100, 0.2),
    ]);
    let kitchen = Kitchen::new(
        EvictGhostPolicy,
        UniformDispatcher::new(TimeUnit::Seconds, 10, 10),
        vec![Shelf::new("frozen", 1, 1.0)],
        Shelf::new("overflow", 1, 2.0).with_accepted_types(["frozen"]),
    );

    let events = collect(kitchen.process_orders(&source)).await;

    let last = events.last().unwrap();
    assert!(matches!(last, Err(KitchenError::InvalidProcedure(_))));
    // only the first order's placement made it out
    assert_eq!(events.len(), 2);
    assert!(events[0].is_ok());
}

/// An order whose temperature no shelf serves fails the stream.
#[tokio::test(start_paused = true)]
async fn unknown_temperature_fails_the_stream() {
    let ids = OrderIdGen::new();
    let source = ScriptedOrderSource::new(vec![order(&ids, "Mystery Stew", "tepid", 100, 0.1)]);
    let kitchen = Kitchen::new(
        LifetimeOverflowPolicy::new(),
        UniformDispatcher::new(TimeUnit::Seconds, 1, 1),
        vec![Shelf::new("frozen", 1, 1.0)],
        Shelf::new("overflow", 1, 2.0).with_accepted_types(["frozen"]),
    );

    let events = collect(kitchen.process_orders(&source)).await;
    assert!(matches!(
        events.last(),
        Some(Err(KitchenError::UnknownTemp(temp))) if temp == "tepid"
    ));
}

/// A failing source propagates its error through the event stream.
#[tokio::test(start_paused = true)]
async fn source_failure_fails_the_stream() {
    use food_order_sim::source::JsonFileOrderSource;

    let source = JsonFileOrderSource::new(
        "/nope/missing.json",
        TimeUnit::Seconds,
        1.0,
        OrderIdGen::new(),
    );
    let kitchen = Kitchen::new(
        LifetimeOverflowPolicy::new(),
        UniformDispatcher::new(TimeUnit::Seconds, 1, 1),
        vec![Shelf::new("frozen", 1, 1.0)],
        Shelf::new("overflow", 1, 2.0).with_accepted_types(["frozen"]),
    );

    let events = collect(kitchen.process_orders(&source)).await;
    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0],
        Err(KitchenError::Source(food_order_sim::source::SourceError::Io(_)))
    ));
}
