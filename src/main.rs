//! Command-line entry point for the food order simulator.
//!
//! Wires the JSON file source, the uniform driver dispatcher, the three
//! temperature shelves plus overflow, the lifetime overflow policy and the
//! text display into one run. Invoke with no arguments for the defaults,
//! or with all fourteen positionals to configure a run; any other argument
//! count prints the argument list and exits non-zero.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use tracing::{error, info};

use food_order_sim::dispatch::UniformDispatcher;
use food_order_sim::display::{OrderEventSink, TextDisplay};
use food_order_sim::kitchen::Kitchen;
use food_order_sim::model::{OrderIdGen, Shelf, TimeUnit};
use food_order_sim::policy::LifetimeOverflowPolicy;
use food_order_sim::runtime::setup_tracing;
use food_order_sim::source::JsonFileOrderSource;

/// Display output lands here, overwritten per run.
const OUTPUT_FILE: &str = "food-order-sim.log";

const TEMPERATURES: [&str; 3] = ["hot", "cold", "frozen"];

/// All positionals must be supplied together, or none at all.
const EXPECTED_ARGS: usize = 14;

#[derive(Debug, Parser)]
#[command(
    name = "food-order-sim",
    about = "Simulates a fulfillment kitchen: orders stream in, decay on shelves, and are \
             collected by dispatched drivers",
    after_help = "Supply all fourteen arguments, or none to use the defaults."
)]
struct Cli {
    /// File path of the food order JSON file
    #[arg(default_value = "orders.json")]
    orders_file: PathBuf,

    /// Time unit for the simulation (SECONDS or MILLISECONDS)
    #[arg(default_value = "SECONDS")]
    time_unit: TimeUnit,

    /// Average number of orders emitted per time unit
    #[arg(default_value_t = 3.25)]
    average_orders_per_unit: f64,

    /// Minimum driver trip duration in time units
    #[arg(default_value_t = 2)]
    driver_min_duration: u32,

    /// Maximum driver trip duration in time units
    #[arg(default_value_t = 8)]
    driver_max_duration: u32,

    /// Hot shelf order capacity
    #[arg(default_value_t = 15)]
    hot_capacity: usize,

    /// Hot shelf decay rate multiplier
    #[arg(default_value_t = 1.0)]
    hot_multiplier: f64,

    /// Cold shelf order capacity
    #[arg(default_value_t = 15)]
    cold_capacity: usize,

    /// Cold shelf decay rate multiplier
    #[arg(default_value_t = 1.0)]
    cold_multiplier: f64,

    /// Frozen shelf order capacity
    #[arg(default_value_t = 15)]
    frozen_capacity: usize,

    /// Frozen shelf decay rate multiplier
    #[arg(default_value_t = 1.0)]
    frozen_multiplier: f64,

    /// Overflow shelf order capacity
    #[arg(default_value_t = 20)]
    overflow_capacity: usize,

    /// Overflow shelf decay rate multiplier
    #[arg(default_value_t = 2.0)]
    overflow_multiplier: f64,

    /// Show extra order fields (decay anchor) in the display output
    #[arg(
        value_parser = clap::builder::BoolishValueParser::new(),
        action = clap::ArgAction::Set,
        default_value = "false"
    )]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    setup_tracing();

    let supplied = std::env::args().count().saturating_sub(1);
    if supplied != 0 && supplied != EXPECTED_ARGS {
        let _ = Cli::command().print_long_help();
        eprintln!("\nwrong number of arguments: got {supplied}, expected {EXPECTED_ARGS} or none");
        return ExitCode::from(2);
    }

    let cli = Cli::parse();
    if cli.driver_min_duration > cli.driver_max_duration {
        eprintln!(
            "minimum driver duration ({}) exceeds maximum ({})",
            cli.driver_min_duration, cli.driver_max_duration
        );
        return ExitCode::from(2);
    }

    info!(
        orders_file = %cli.orders_file.display(),
        time_unit = %cli.time_unit,
        average_orders_per_unit = cli.average_orders_per_unit,
        driver_min = cli.driver_min_duration,
        driver_max = cli.driver_max_duration,
        "starting food order simulation"
    );

    let source = JsonFileOrderSource::new(
        cli.orders_file.clone(),
        cli.time_unit,
        cli.average_orders_per_unit,
        OrderIdGen::new(),
    );
    let dispatcher = UniformDispatcher::new(
        cli.time_unit,
        cli.driver_min_duration,
        cli.driver_max_duration,
    );

    let temperature_shelves = vec![
        Shelf::new("hot", cli.hot_capacity, cli.hot_multiplier),
        Shelf::new("cold", cli.cold_capacity, cli.cold_multiplier),
        Shelf::new("frozen", cli.frozen_capacity, cli.frozen_multiplier),
    ];
    let overflow = Shelf::new("overflow", cli.overflow_capacity, cli.overflow_multiplier)
        .with_accepted_types(TEMPERATURES);

    let kitchen = Kitchen::new(
        LifetimeOverflowPolicy::new(),
        dispatcher,
        temperature_shelves,
        overflow,
    );
    let events = kitchen.process_orders(&source);

    let mut display = TextDisplay::new(Some(PathBuf::from(OUTPUT_FILE)), true, cli.verbose);
    match display.consume(events).await {
        Ok(tally) => {
            info!(
                received = tally.received,
                picked_up = tally.picked_up,
                decayed = tally.decayed,
                removed = tally.removed,
                "simulation complete"
            );
            ExitCode::SUCCESS
        }
        Err(error) => {
            error!(%error, "simulation failed");
            ExitCode::FAILURE
        }
    }
}
