//! # Driver Dispatch
//!
//! The kitchen asks a [`Dispatcher`] for a driver the moment an order
//! arrives; the returned [`Driver`] says how long the trip takes, and the
//! kitchen arms a driver-arrival timer for it. What happens when the
//! driver shows up (pickup, or a wasted trip) is the kitchen's business.

use rand::Rng;

use crate::model::{Order, OrderId, TimeUnit};

/// A driver en route to collect one order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Driver {
    pub order_id: OrderId,
    pub time_unit: TimeUnit,
    /// Trip duration in `time_unit`s.
    pub duration: u32,
}

/// Dispatches drivers to pick up orders.
pub trait Dispatcher: Send + 'static {
    fn dispatch(&self, order: &Order) -> Driver;
}

/// Dispatcher whose drivers take a uniformly random whole number of time
/// units within `[min, max]`, both inclusive. Setting `min == max` gives
/// fixed-duration drivers, which tests lean on.
#[derive(Debug, Clone, Copy)]
pub struct UniformDispatcher {
    time_unit: TimeUnit,
    min_duration: u32,
    max_duration: u32,
}

impl UniformDispatcher {
    /// `min_duration` must not exceed `max_duration`.
    pub fn new(time_unit: TimeUnit, min_duration: u32, max_duration: u32) -> Self {
        debug_assert!(min_duration <= max_duration);
        Self {
            time_unit,
            min_duration,
            max_duration,
        }
    }
}

impl Dispatcher for UniformDispatcher {
    fn dispatch(&self, order: &Order) -> Driver {
        let duration = rand::thread_rng().gen_range(self.min_duration..=self.max_duration);
        Driver {
            order_id: order.id(),
            time_unit: self.time_unit,
            duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{OrderId, OrderSpec};

    fn order() -> Order {
        Order::new(
            OrderId(1),
            OrderSpec::new("Pad Thai", "hot", 300, 0.45),
            TimeUnit::Seconds,
        )
    }

    #[test]
    fn durations_stay_within_the_configured_bounds() {
        let dispatcher = UniformDispatcher::new(TimeUnit::Seconds, 2, 8);
        for _ in 0..200 {
            let driver = dispatcher.dispatch(&order());
            assert!((2..=8).contains(&driver.duration));
            assert_eq!(driver.order_id, OrderId(1));
            assert_eq!(driver.time_unit, TimeUnit::Seconds);
        }
    }

    #[test]
    fn equal_bounds_give_fixed_durations() {
        let dispatcher = UniformDispatcher::new(TimeUnit::Milliseconds, 5, 5);
        for _ in 0..20 {
            assert_eq!(dispatcher.dispatch(&order()).duration, 5);
        }
    }
}
