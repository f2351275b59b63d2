//! # Domain Models
//!
//! The data types the rest of the system is built around: [`Order`] with
//! its decay anchor, and [`Shelf`], the bounded id-set orders sit on.
//!
//! These types carry their own small invariants (anchor continuity,
//! capacity, accepted temperatures) but no coordination logic: placement
//! decisions, timers and event emission all live in [`crate::kitchen`],
//! the single owner and mutator of both.

pub mod order;
pub mod shelf;

pub use order::*;
pub use shelf::*;
