//! # Food Order Simulator
//!
//! > **An event-driven fulfillment kitchen in Rust.**
//!
//! A stream of food orders arrives at a kitchen; each order is placed on a
//! capacity-bounded shelf, a driver is dispatched to collect it, and its
//! freshness decays over time. If freshness reaches zero before pickup the
//! order is waste. Temperature shelves are small, so a shared overflow
//! shelf with accelerated decay takes spillover, and an overflow policy
//! decides what to move, replace or discard when everything is full.
//!
//! ## Concurrency Model
//!
//! The kitchen coordinator is an actor: one Tokio task owns the shelves,
//! the order arena and the timer maps, and processes messages (order
//! arrivals, decay expiries, driver arrivals) strictly sequentially. No
//! locks are needed for kitchen state; timers and sources only ever send
//! messages. See [`kitchen`] for the full contract.
//!
//! ## Module Tour
//!
//! - [`decay`] - the pure decay formula.
//! - [`model`] - [`Order`](model::Order) with its decay anchor, and
//!   [`Shelf`](model::Shelf).
//! - [`policy`] - the [`OverflowPolicy`](policy::OverflowPolicy) seam and
//!   the lifetime-ranked standard policy.
//! - [`kitchen`] - the coordinator: state, actor, events, errors.
//! - [`source`] - order sources (JSON file with Poisson batching, scripted
//!   lists for tests).
//! - [`dispatch`] - driver dispatch with bounded-random trip durations.
//! - [`display`] - the text display sink and its tally.
//! - [`runtime`] - tracing setup.
//!
//! ## Running the Simulator
//!
//! ```bash
//! # defaults: orders.json, SECONDS, 3.25 orders/sec, drivers 2-8s
//! cargo run
//!
//! # with coordinator diagnostics
//! RUST_LOG=food_order_sim=debug cargo run
//! ```
//!
//! ## Testing
//!
//! Unit tests sit next to the code; end-to-end scenarios live in `tests/`
//! and run under paused Tokio time, so even multi-second simulations
//! finish instantly and deterministically.

pub mod decay;
pub mod dispatch;
pub mod display;
pub mod kitchen;
pub mod model;
pub mod policy;
pub mod runtime;
pub mod source;
