//! Error types for the kitchen coordinator.

use thiserror::Error;

use crate::model::{OrderError, ShelfError};
use crate::source::SourceError;

/// Errors that terminate the event stream.
///
/// None of these are recovered at runtime: an uninitialized decay query or
/// a rejected temperature is a programming error, an infeasible policy
/// instruction means the policy and the shelves disagree about reality,
/// and a failed source has nothing further to feed the kitchen. The
/// coordinator emits the error as the stream's final item and stops.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum KitchenError {
    #[error(transparent)]
    NotInitialized(#[from] OrderError),

    #[error(transparent)]
    InvalidOrderType(#[from] ShelfError),

    /// The overflow policy returned an instruction the coordinator could
    /// not execute, e.g. removing an order that is on no shelf or adding
    /// to a full shelf.
    #[error("policy returned an infeasible instruction: {0}")]
    InvalidProcedure(String),

    /// An order arrived with a temperature no configured shelf serves.
    #[error("no shelf registered for temperature \"{0}\"")]
    UnknownTemp(String),

    #[error(transparent)]
    Source(#[from] SourceError),
}
