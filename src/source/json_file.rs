//! JSON file order source with Poisson-batched emission.
//!
//! The file is a top-level JSON array of order records:
//!
//! ```json
//! [
//!   { "name": "Banana Split", "temp": "frozen", "shelfLife": 20, "decayRate": 0.63 },
//!   { "name": "McFlury", "temp": "frozen", "shelfLife": 375, "decayRate": 0.4 }
//! ]
//! ```
//!
//! Orders are emitted serially but time-grouped into "batches": every time
//! unit a batch is released whose size is drawn from a Poisson
//! distribution around the configured average (e.g. 3.25 orders per
//! second). A zero-size draw simply means a quiet interval.

use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::debug;

use crate::model::{Order, OrderIdGen, OrderSpec, TimeUnit};
use crate::source::{OrderSource, OrderStream, SourceError};

const STREAM_BUFFER: usize = 32;

/// Reads an orders JSON file and streams its orders in Poisson batches.
pub struct JsonFileOrderSource {
    path: PathBuf,
    time_unit: TimeUnit,
    average_orders_per_unit: f64,
    ids: OrderIdGen,
}

impl JsonFileOrderSource {
    pub fn new(
        path: impl Into<PathBuf>,
        time_unit: TimeUnit,
        average_orders_per_unit: f64,
        ids: OrderIdGen,
    ) -> Self {
        Self {
            path: path.into(),
            time_unit,
            average_orders_per_unit,
            ids,
        }
    }

}

impl OrderSource for JsonFileOrderSource {
    fn subscribe(&self) -> OrderStream {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let path = self.path.clone();
        let unit = self.time_unit;
        let mean = self.average_orders_per_unit;
        let ids = self.ids.clone();

        tokio::spawn(async move {
            let text = match tokio::fs::read_to_string(&path).await {
                Ok(text) => text,
                Err(error) => {
                    let _ = tx.send(Err(SourceError::Io(error.to_string()))).await;
                    return;
                }
            };
            let specs: Vec<OrderSpec> = match serde_json::from_str(&text) {
                Ok(specs) => specs,
                Err(error) => {
                    let _ = tx.send(Err(SourceError::Parse(error.to_string()))).await;
                    return;
                }
            };
            debug!(path = %path.display(), orders = specs.len(), "order file loaded");

            let mut rng = StdRng::from_entropy();
            let mut pending = specs.into_iter().peekable();
            while pending.peek().is_some() {
                sleep(unit.to_duration(1.0)).await;
                let batch_size = poisson_sample(&mut rng, mean);
                for _ in 0..batch_size {
                    let Some(spec) = pending.next() else { break };
                    let order = Order::new(ids.next_id(), spec, unit);
                    if tx.send(Ok(order)).await.is_err() {
                        return;
                    }
                }
            }
        });

        rx
    }
}

/// Draws a Poisson-distributed batch size (Knuth's product-of-uniforms
/// method; fine for the small means a kitchen sees).
fn poisson_sample<R: Rng>(rng: &mut R, mean: f64) -> usize {
    let threshold = (-mean).exp();
    let mut count = 0usize;
    let mut product: f64 = 1.0;
    loop {
        product *= rng.gen::<f64>();
        if product <= threshold {
            return count;
        }
        count += 1;
    }
}
