//! # Event Display
//!
//! Consumes a kitchen's event stream and renders each event as text: the
//! event itself, the order, the frozen-in-time contents of every shelf,
//! and a running tally line. Output goes to stdout, a log file, or both;
//! the log file is truncated at the start of each run.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tracing::error;

use crate::kitchen::{EventStream, KitchenError, OrderEvent, OrderEventType, ShelfSnapshot};
use crate::model::{Order, OrderId};

/// Running counts across one run's events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventTally {
    /// Distinct orders seen in any event.
    pub received: usize,
    pub picked_up: usize,
    pub decayed: usize,
    pub removed: usize,
}

#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("failed to write display output: {0}")]
    Io(#[from] std::io::Error),
    /// The kitchen's stream failed; the error has already been rendered.
    #[error(transparent)]
    Stream(#[from] KitchenError),
}

/// A consumer of kitchen event streams.
#[async_trait]
pub trait OrderEventSink {
    /// Drains the stream to completion, returning the final tally.
    async fn consume(&mut self, events: EventStream) -> Result<EventTally, DisplayError>;
}

/// Text renderer for order events.
pub struct TextDisplay {
    log_path: Option<PathBuf>,
    to_stdout: bool,
    verbose: bool,
}

impl TextDisplay {
    pub fn new(log_path: Option<PathBuf>, to_stdout: bool, verbose: bool) -> Self {
        Self {
            log_path,
            to_stdout,
            verbose,
        }
    }

    fn format_event(&self, event: &OrderEvent, tally: EventTally) -> String {
        let shelf = event.shelf_type.as_deref().unwrap_or("no");
        let mut out = format!(
            "\n\n{} - {} shelf\n{}\n{}",
            event.event_type,
            shelf,
            self.format_order(&event.order, event),
            event.date.format("%Y-%m-%d %H:%M:%S%.3f UTC"),
        );
        for snapshot in &event.shelves {
            out.push('\n');
            out.push_str(&self.format_shelf(snapshot, event));
        }
        out.push('\n');
        out.push_str(&format!(
            "orders received: {}, picked up: {}, decayed: {}, removed: {}",
            tally.received, tally.picked_up, tally.decayed, tally.removed
        ));
        out
    }

    fn format_shelf(&self, snapshot: &ShelfSnapshot, event: &OrderEvent) -> String {
        let mut out = format!("{} shelf size: {}", snapshot.shelf_type, snapshot.orders.len());
        for order in &snapshot.orders {
            out.push('\n');
            out.push_str(&self.format_order(order, event));
        }
        out
    }

    fn format_order(&self, order: &Order, event: &OrderEvent) -> String {
        let normalized = order.normalized_freshness(event.at).unwrap_or_default();
        if self.verbose {
            let freshness = order.freshness(event.at).unwrap_or_default();
            let remaining = order.lifetime_remaining(event.at).unwrap_or_default();
            // addedToShelfAge renders the anchor's added_to_shelf_at as
            // time units elapsed at the event instant
            let (shelf_age, rate, adjusted) = order
                .decay_anchor()
                .map(|a| {
                    (
                        order
                            .time_unit()
                            .units_in(event.at.saturating_duration_since(a.added_to_shelf_at)),
                        a.current_decay_rate,
                        a.adjusted_shelf_life,
                    )
                })
                .unwrap_or_default();
            format!(
                "Order{{id={}, name='{}', temp='{}', shelfLife={}, decayRate={:.2}, \
                 normalizedDecayValue={:.4}, decayValue={:.2}, decayDuration={:.2}, \
                 addedToShelfAge={:.2}, currentDecayRate={:.2}, adjustedShelfLife={:.2}}}",
                order.id(),
                order.name(),
                order.temp(),
                order.shelf_life(),
                order.decay_rate(),
                normalized,
                freshness,
                remaining,
                shelf_age,
                rate,
                adjusted,
            )
        } else {
            format!(
                "Order{{id={}, name='{}', temp='{}', shelfLife={}, decayRate={:.2}, \
                 normalizedDecayValue={:.4}}}",
                order.id(),
                order.name(),
                order.temp(),
                order.shelf_life(),
                order.decay_rate(),
                normalized,
            )
        }
    }

    fn write_line(&self, writer: &mut Option<BufWriter<File>>, line: &str) -> std::io::Result<()> {
        if let Some(writer) = writer {
            writeln!(writer, "{line}")?;
        }
        if self.to_stdout {
            println!("{line}");
        }
        Ok(())
    }
}

#[async_trait]
impl OrderEventSink for TextDisplay {
    async fn consume(&mut self, mut events: EventStream) -> Result<EventTally, DisplayError> {
        let mut writer = match &self.log_path {
            Some(path) => Some(BufWriter::new(File::create(path)?)),
            None => None,
        };

        let mut seen: HashSet<OrderId> = HashSet::new();
        let mut tally = EventTally::default();

        while let Some(item) = events.recv().await {
            match item {
                Ok(event) => {
                    seen.insert(event.order.id());
                    tally.received = seen.len();
                    match event.event_type {
                        OrderEventType::PickedUp => tally.picked_up += 1,
                        OrderEventType::DecayedWaste => tally.decayed += 1,
                        OrderEventType::RemovedWaste => tally.removed += 1,
                        OrderEventType::AddedToShelf => {}
                    }
                    let line = self.format_event(&event, tally);
                    self.write_line(&mut writer, &line)?;
                }
                Err(stream_error) => {
                    error!(%stream_error, "event stream failed");
                    let line = format!("\n\nstream failed: {stream_error}");
                    self.write_line(&mut writer, &line)?;
                    if let Some(writer) = &mut writer {
                        writer.flush()?;
                    }
                    return Err(stream_error.into());
                }
            }
        }

        if let Some(writer) = &mut writer {
            writer.flush()?;
        }
        Ok(tally)
    }
}
