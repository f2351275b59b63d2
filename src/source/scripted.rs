//! An in-memory order source for tests and demos.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;

use crate::model::Order;
use crate::source::{OrderSource, OrderStream};

/// Emits a fixed list of orders, optionally pacing them with a fixed delay
/// between consecutive emissions. Each subscription replays the list from
/// the start.
#[derive(Debug, Clone)]
pub struct ScriptedOrderSource {
    orders: Vec<Order>,
    delay_between: Option<Duration>,
}

impl ScriptedOrderSource {
    pub fn new(orders: Vec<Order>) -> Self {
        Self {
            orders,
            delay_between: None,
        }
    }

    /// Waits `delay` before every order after the first.
    pub fn with_delay_between(mut self, delay: Duration) -> Self {
        self.delay_between = Some(delay);
        self
    }
}

impl OrderSource for ScriptedOrderSource {
    fn subscribe(&self) -> OrderStream {
        let (tx, rx) = mpsc::channel(self.orders.len().max(1));
        let orders = self.orders.clone();
        let delay_between = self.delay_between;

        tokio::spawn(async move {
            for (index, order) in orders.into_iter().enumerate() {
                if index > 0 {
                    if let Some(delay) = delay_between {
                        sleep(delay).await;
                    }
                }
                if tx.send(Ok(order)).await.is_err() {
                    return;
                }
            }
        });

        rx
    }
}
