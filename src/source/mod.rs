//! # Order Sources
//!
//! Where orders come from. A source hands back a fresh, lazy channel of
//! orders on every [`OrderSource::subscribe`] call; the kitchen bridges
//! that channel into its coordinator. Errors travel in-band: a source that
//! cannot read or parse its input emits one [`SourceError`] item and ends,
//! and the kitchen fails its event stream with it.

pub mod json_file;
pub mod scripted;

pub use json_file::JsonFileOrderSource;
pub use scripted::ScriptedOrderSource;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::model::Order;

/// A lazy stream of orders, one subscription's worth.
pub type OrderStream = mpsc::Receiver<Result<Order, SourceError>>;

/// Errors a source can emit in-band before ending its stream.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SourceError {
    #[error("failed to read order file: {0}")]
    Io(String),
    #[error("failed to parse order file: {0}")]
    Parse(String),
}

/// A producer of finite order streams.
pub trait OrderSource: Send + Sync {
    /// Starts a fresh run of the sequence. Each call restarts from the
    /// beginning, with newly minted ids.
    fn subscribe(&self) -> OrderStream;
}
