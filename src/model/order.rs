//! The food order entity and its decay anchor.
//!
//! An [`Order`] carries immutable identity and shelf-life parameters plus a
//! mutable *decay anchor*, the triple `{added_to_shelf_at,
//! current_decay_rate, adjusted_shelf_life}` that fully determines its
//! freshness at any future instant. The anchor is rewritten whenever the
//! order changes shelves so that freshness stays continuous while the decay
//! slope changes (see [`Order::update_decay_rate`]).
//!
//! # Architecture Note
//! Identity is a process-unique monotonically increasing integer, minted by
//! an [`OrderIdGen`] owned by the run rather than a process-wide global, so
//! parallel tests and repeated runs each get their own clean sequence.
//! Equality and hashing are by id alone.

use std::fmt::{self, Display};
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;

use crate::decay;

/// Unique identifier for an order. No two distinct orders in a run share
/// an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonically increasing id generator, one per run.
///
/// Cloning shares the underlying counter, so a source and the tests that
/// feed it can mint from the same sequence.
#[derive(Debug, Clone, Default)]
pub struct OrderIdGen(Arc<AtomicU64>);

impl OrderIdGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> OrderId {
        OrderId(self.0.fetch_add(1, Ordering::SeqCst))
    }
}

/// Resolution of every time-valued field of an order (shelf life, decay
/// duration, driver durations).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeUnit {
    Seconds,
    Milliseconds,
}

impl TimeUnit {
    /// Converts a quantity of this unit into a wall duration.
    pub fn to_duration(self, units: f64) -> Duration {
        match self {
            TimeUnit::Seconds => Duration::from_secs_f64(units.max(0.0)),
            TimeUnit::Milliseconds => Duration::from_secs_f64(units.max(0.0) / 1000.0),
        }
    }

    /// Measures a wall duration in this unit.
    pub fn units_in(self, duration: Duration) -> f64 {
        match self {
            TimeUnit::Seconds => duration.as_secs_f64(),
            TimeUnit::Milliseconds => duration.as_secs_f64() * 1000.0,
        }
    }
}

impl Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeUnit::Seconds => write!(f, "SECONDS"),
            TimeUnit::Milliseconds => write!(f, "MILLISECONDS"),
        }
    }
}

impl FromStr for TimeUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SECONDS" => Ok(TimeUnit::Seconds),
            "MILLISECONDS" => Ok(TimeUnit::Milliseconds),
            other => Err(format!(
                "unknown time unit \"{other}\" (expected SECONDS or MILLISECONDS)"
            )),
        }
    }
}

/// Errors raised by order decay queries.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum OrderError {
    /// A decay query was made before [`Order::initialize`] was called.
    /// Programmer error; fatal to the event stream.
    #[error("order {0} queried for decay before initialization")]
    NotInitialized(OrderId),
}

/// The mutable decay anchor: everything needed to evaluate freshness at a
/// future instant. Rewritten atomically by [`Order::update_decay_rate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecayAnchor {
    /// Instant the current shelf residency began.
    pub added_to_shelf_at: Instant,
    /// Decay rate in effect for the current residency (original rate times
    /// the shelf's multiplier).
    pub current_decay_rate: f64,
    /// Freshness at the moment the current residency began; the "starting
    /// shelf life" of this linear segment.
    pub adjusted_shelf_life: f64,
}

/// The per-record fields of an order as they arrive from a source, e.g.
/// one element of the orders JSON array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSpec {
    pub name: String,
    pub temp: String,
    pub shelf_life: u32,
    pub decay_rate: f64,
}

impl OrderSpec {
    pub fn new(name: impl Into<String>, temp: impl Into<String>, shelf_life: u32, decay_rate: f64) -> Self {
        Self {
            name: name.into(),
            temp: temp.into(),
            shelf_life,
            decay_rate,
        }
    }
}

/// A food order placed with the kitchen.
///
/// Created by a source, initialized by the kitchen at first placement, and
/// then anchor-updated on every shelf change until it is picked up or
/// discarded.
#[derive(Debug, Clone)]
pub struct Order {
    id: OrderId,
    name: String,
    temp: String,
    shelf_life: u32,
    decay_rate: f64,
    time_unit: TimeUnit,
    birth_date: Option<Instant>,
    anchor: Option<DecayAnchor>,
}

impl Order {
    pub fn new(id: OrderId, spec: OrderSpec, time_unit: TimeUnit) -> Self {
        Self {
            id,
            name: spec.name,
            temp: spec.temp,
            shelf_life: spec.shelf_life,
            decay_rate: spec.decay_rate,
            time_unit,
            birth_date: None,
            anchor: None,
        }
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Temperature category, e.g. "hot", "cold" or "frozen".
    pub fn temp(&self) -> &str {
        &self.temp
    }

    /// Original shelf life, in this order's [`TimeUnit`].
    pub fn shelf_life(&self) -> u32 {
        self.shelf_life
    }

    /// Original decay rate, before any shelf multiplier.
    pub fn decay_rate(&self) -> f64 {
        self.decay_rate
    }

    pub fn time_unit(&self) -> TimeUnit {
        self.time_unit
    }

    /// Instant of first placement, if the order has been initialized.
    pub fn birth_date(&self) -> Option<Instant> {
        self.birth_date
    }

    /// The current decay anchor, if the order has been initialized.
    pub fn decay_anchor(&self) -> Option<DecayAnchor> {
        self.anchor
    }

    /// Writes an anchor back verbatim. Used by policy probes to undo a
    /// hypothetical re-rate exactly; pairs with [`Order::decay_anchor`].
    pub(crate) fn restore_anchor(&mut self, anchor: DecayAnchor) {
        self.anchor = Some(anchor);
    }

    /// Sets the birth anchor and seeds the decay anchor from the original
    /// parameters. Must be called before any decay query; invoked by the
    /// kitchen when the order first arrives.
    pub fn initialize(&mut self, now: Instant) {
        self.birth_date = Some(now);
        self.anchor = Some(DecayAnchor {
            added_to_shelf_at: now,
            current_decay_rate: self.decay_rate,
            adjusted_shelf_life: f64::from(self.shelf_life),
        });
    }

    fn anchor_or_err(&self) -> Result<&DecayAnchor, OrderError> {
        self.anchor.as_ref().ok_or(OrderError::NotInitialized(self.id))
    }

    /// Age within the current shelf residency, in this order's unit.
    fn residency_age(&self, now: Instant) -> Result<f64, OrderError> {
        let anchor = self.anchor_or_err()?;
        Ok(self
            .time_unit
            .units_in(now.saturating_duration_since(anchor.added_to_shelf_at)))
    }

    /// Current freshness, clamped at zero.
    pub fn freshness(&self, now: Instant) -> Result<f64, OrderError> {
        let anchor = self.anchor_or_err()?;
        let age = self.residency_age(now)?;
        Ok(decay::freshness(
            anchor.adjusted_shelf_life,
            anchor.current_decay_rate,
            age,
        ))
    }

    /// Freshness divided by the *original* shelf life. This is the value
    /// reported to displays.
    pub fn normalized_freshness(&self, now: Instant) -> Result<f64, OrderError> {
        Ok(self.freshness(now)? / f64::from(self.shelf_life))
    }

    /// Time units remaining until freshness reaches zero under the current
    /// anchor, clamped at zero.
    pub fn lifetime_remaining(&self, now: Instant) -> Result<f64, OrderError> {
        let anchor = self.anchor_or_err()?;
        let age = self.residency_age(now)?;
        let total = decay::lifetime(anchor.adjusted_shelf_life, anchor.current_decay_rate);
        Ok((total - age).max(0.0))
    }

    /// Rewrites the decay anchor for a new decay rate.
    ///
    /// The continuity rule: the adjusted shelf life becomes the freshness
    /// at `now`, the residency restarts at `now`, and decay proceeds from
    /// there at `new_rate`. Freshness is unchanged at the instant of the
    /// update; only the slope changes. Without this, moving an order
    /// between shelves would cause a freshness discontinuity.
    pub fn update_decay_rate(&mut self, now: Instant, new_rate: f64) -> Result<(), OrderError> {
        let adjusted = self.freshness(now)?;
        self.anchor = Some(DecayAnchor {
            added_to_shelf_at: now,
            current_decay_rate: new_rate,
            adjusted_shelf_life: adjusted,
        });
        Ok(())
    }
}

impl PartialEq for Order {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Order {}

impl Hash for Order {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(order: &Order) -> u64 {
        let mut hasher = DefaultHasher::new();
        order.hash(&mut hasher);
        hasher.finish()
    }

    fn frozen_order(id: u64, shelf_life: u32, decay_rate: f64) -> Order {
        Order::new(
            OrderId(id),
            OrderSpec::new("Banana Split", "frozen", shelf_life, decay_rate),
            TimeUnit::Seconds,
        )
    }

    #[test]
    fn decay_queries_before_initialize_fail() {
        let order = frozen_order(1, 20, 0.63);
        let now = Instant::now();
        assert_eq!(order.freshness(now), Err(OrderError::NotInitialized(OrderId(1))));
        assert_eq!(
            order.lifetime_remaining(now),
            Err(OrderError::NotInitialized(OrderId(1)))
        );
    }

    #[test]
    fn initialize_seeds_anchor_from_original_parameters() {
        let mut order = frozen_order(2, 20, 0.63);
        let now = Instant::now();
        order.initialize(now);

        let anchor = order.decay_anchor().unwrap();
        assert_eq!(anchor.added_to_shelf_at, now);
        assert_eq!(anchor.current_decay_rate, 0.63);
        assert_eq!(anchor.adjusted_shelf_life, 20.0);
        assert_eq!(order.birth_date(), Some(now));
        assert_eq!(order.freshness(now).unwrap(), 20.0);
    }

    #[tokio::test(start_paused = true)]
    async fn freshness_decays_with_age() {
        let mut order = frozen_order(3, 300, 0.45);
        let start = Instant::now();
        order.initialize(start);

        tokio::time::advance(Duration::from_secs(100)).await;
        let now = Instant::now();
        let expected = 300.0 - 100.0 * 1.45;
        assert!((order.freshness(now).unwrap() - expected).abs() < 1e-9);
        assert!((order.normalized_freshness(now).unwrap() - expected / 300.0).abs() < 1e-12);
    }

    #[tokio::test(start_paused = true)]
    async fn lifetime_remaining_is_zero_iff_freshness_is_zero() {
        let mut order = frozen_order(4, 300, 0.45);
        order.initialize(Instant::now());

        tokio::time::advance(Duration::from_secs(206)).await;
        let now = Instant::now();
        assert!(order.freshness(now).unwrap() > 0.0);
        assert!(order.lifetime_remaining(now).unwrap() > 0.0);

        tokio::time::advance(Duration::from_secs(1)).await;
        let now = Instant::now();
        assert_eq!(order.freshness(now).unwrap(), 0.0);
        assert_eq!(order.lifetime_remaining(now).unwrap(), 0.0);
    }

    /// The continuity rule: freshness immediately before and after a rate
    /// update at the same instant is bit-identical.
    #[tokio::test(start_paused = true)]
    async fn update_decay_rate_preserves_freshness_at_the_instant() {
        let mut order = frozen_order(5, 300, 0.45);
        order.initialize(Instant::now());

        tokio::time::advance(Duration::from_secs(50)).await;
        let now = Instant::now();
        let before = order.freshness(now).unwrap();
        order.update_decay_rate(now, 0.45 * 2.0).unwrap();
        let after = order.freshness(now).unwrap();
        assert_eq!(before.to_bits(), after.to_bits());
        assert_eq!(order.decay_anchor().unwrap().current_decay_rate, 0.9);
    }

    /// Re-rating to some rate and immediately back at the same `now`
    /// leaves the remaining lifetime unchanged.
    #[tokio::test(start_paused = true)]
    async fn update_decay_rate_round_trips_at_a_fixed_instant() {
        let mut order = frozen_order(6, 120, 0.25);
        order.initialize(Instant::now());

        tokio::time::advance(Duration::from_secs(13)).await;
        let now = Instant::now();
        let before = order.lifetime_remaining(now).unwrap();
        order.update_decay_rate(now, 0.25 * 3.0).unwrap();
        order.update_decay_rate(now, 0.25).unwrap();
        let after = order.lifetime_remaining(now).unwrap();
        assert!((before - after).abs() < 1e-9);
    }

    #[test]
    fn equality_and_hashing_are_by_id_alone() {
        let a = frozen_order(7, 20, 0.63);
        let mut b = frozen_order(7, 500, 0.01);
        b.initialize(Instant::now());
        let c = frozen_order(8, 20, 0.63);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn time_unit_parses_case_insensitively() {
        assert_eq!("seconds".parse::<TimeUnit>().unwrap(), TimeUnit::Seconds);
        assert_eq!("MILLISECONDS".parse::<TimeUnit>().unwrap(), TimeUnit::Milliseconds);
        assert!("fortnights".parse::<TimeUnit>().is_err());
    }

    #[test]
    fn time_unit_round_trips_durations() {
        let unit = TimeUnit::Milliseconds;
        let d = unit.to_duration(1500.0);
        assert_eq!(d, Duration::from_millis(1500));
        assert!((unit.units_in(d) - 1500.0).abs() < 1e-9);
    }

    #[test]
    fn order_spec_deserializes_camel_case_records() {
        let json = r#"{"name": "McFlury", "temp": "frozen", "shelfLife": 375, "decayRate": 0.4}"#;
        let spec: OrderSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec, OrderSpec::new("McFlury", "frozen", 375, 0.4));
    }
}
