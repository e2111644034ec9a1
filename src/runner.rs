//! The `tbhiv` command-line driver.
//!
//! Loads parameters and forcings, builds or loads a state vector, optionally applies
//! the annual event, evaluates the derivative one or more times and writes
//! `aggregates.csv` and `derivative.csv` to the output directory.

use std::path::PathBuf;

use clap::Parser;
use log::{debug, info, LevelFilter};

use crate::config::{load_forcings, load_parameters, load_state};
use crate::engine::{Aggregates, Model, NUM_AGGREGATES};
use crate::error::ModelError;
use crate::event::apply_annual_event;
use crate::execution_stats::{log_execution_statistics, ExecutionProfilingCollector};
use crate::layout::{Compartment, DiseaseState, Stratum, NUM_AGES, STATE_LEN};
use crate::log::set_log_level;
use crate::report::{write_aggregates, write_derivative};

/// Susceptibles per single-year age in the demonstration population.
const DEMONSTRATION_COHORT: f64 = 100_000.0;

#[derive(Parser, Debug)]
#[command(name = "tbhiv", version, about)]
pub struct Args {
    /// Parameters as JSON: a named object or a flat array
    #[arg(short, long)]
    pub parameters: PathBuf,

    /// Forcings at the evaluation time as JSON: a named object or a flat array
    #[arg(short, long)]
    pub forcings: PathBuf,

    /// State vector as a JSON array or an `index,value` CSV. Defaults to a
    /// demonstration population.
    #[arg(short, long)]
    pub state: Option<PathBuf>,

    /// Evaluation time
    #[arg(short, long, default_value = "0")]
    pub time: f64,

    /// Number of auxiliary outputs
    #[arg(short, long, default_value_t = NUM_AGGREGATES)]
    pub aux: usize,

    /// Apply the annual ageing and birth event before evaluating
    #[arg(long)]
    pub annual_event: bool,

    /// Number of times to evaluate the derivative, for timing
    #[arg(short, long, default_value = "1")]
    pub repeat: usize,

    /// Directory for `aggregates.csv` and `derivative.csv`
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Log level, e.g. `info` or `trace`. Logging is off by default.
    #[arg(short, long)]
    pub log_level: Option<LevelFilter>,
}

/// 100,000 HIV-negative susceptibles at every age plus 1% smear-positive
/// drug-susceptible cases.
#[must_use]
pub fn demonstration_state() -> Vec<f64> {
    let mut state = vec![0.0; STATE_LEN];
    for age in 0..NUM_AGES {
        let susceptible = Compartment::new(Stratum::HivNegative, DiseaseState::Susceptible, age);
        state[susceptible.index()] = DEMONSTRATION_COHORT;
        let case = Compartment::new(Stratum::HivNegative, DiseaseState::SmearPosDsNaive, age);
        state[case.index()] = DEMONSTRATION_COHORT / 100.0;
    }
    state
}

/// Runs the driver with parsed arguments and returns the aggregates of the last
/// evaluation.
///
/// # Errors
///
/// Returns an error if an input cannot be loaded, the model rejects its inputs, or an
/// output file cannot be written.
pub fn run_with_args(args: &Args) -> Result<Aggregates, ModelError> {
    if let Some(level) = args.log_level {
        set_log_level(level);
    }
    debug!("{args:?}");

    let parameters = load_parameters(&args.parameters)?;
    let forcings = load_forcings(&args.forcings)?;
    let mut state = match &args.state {
        Some(path) => load_state(path)?,
        None => {
            info!("No state given; seeding the demonstration population");
            demonstration_state()
        }
    };
    let model = Model::new(parameters)?;

    if args.annual_event {
        apply_annual_event(args.time, &mut state, forcings.birth_rate)?;
    }

    let repeat = args.repeat.max(1);
    let mut derivative = vec![0.0; STATE_LEN];
    let mut aux = vec![0.0; args.aux];
    let mut collector = ExecutionProfilingCollector::new();
    let mut aggregates = Aggregates::default();
    for _ in 0..repeat {
        aggregates = model.derivative_into(args.time, &state, &forcings, &mut derivative, &mut aux)?;
        collector.refresh();
    }
    log_execution_statistics(&collector.compute_final_statistics(repeat));

    write_aggregates(&args.output_dir.join("aggregates.csv"), &aux)?;
    write_derivative(&args.output_dir.join("derivative.csv"), &derivative)?;
    println!(
        "t = {}: population {:.1}, TB incidence {:.1}, TB deaths {:.1}",
        args.time,
        aggregates.totals.total,
        aggregates.new_cases_hiv_negative
            + aggregates.new_cases_hiv_positive
            + aggregates.new_cases_on_art,
        aggregates.tb_deaths()
    );
    Ok(aggregates)
}

/// Parses the process arguments and runs the driver.
///
/// # Errors
///
/// See [`run_with_args`].
pub fn run() -> Result<Aggregates, ModelError> {
    run_with_args(&Args::parse())
}
