//! An age-structured TB–HIV co-transmission compartmental model.
//!
//! The population is split by single-year age (0 to 80+), HIV status and CD4 category,
//! time on antiretroviral therapy, and fifteen TB disease and treatment states. The
//! crate provides the two pieces an ODE integrator needs:
//!
//! * [`Model::derivative`], the rate of change of every compartment at one time,
//!   together with 42 population aggregates (prevalence, incidence, deaths,
//!   notifications);
//! * [`apply_annual_event`], the discrete yearly ageing and births step.
//!
//! Both operate on a flat state vector of [`STATE_LEN`] entries whose order is fixed by
//! the [`layout`] module. Integration itself is left to the caller.
//!
//! ```no_run
//! use tbhiv::{apply_annual_event, Forcings, Model, Parameters, NUM_AGGREGATES, STATE_LEN};
//!
//! # fn main() -> Result<(), tbhiv::ModelError> {
//! let model = Model::new(Parameters::default())?;
//! let forcings = Forcings::default();
//! let mut state = vec![1_000.0; STATE_LEN];
//!
//! let evaluation = model.derivative(0.0, &state, &forcings, NUM_AGGREGATES)?;
//! println!("TB deaths per year: {}", evaluation.aggregates.tb_deaths());
//!
//! apply_annual_event(1.0, &mut state, forcings.birth_rate)?;
//! # Ok(())
//! # }
//! ```
pub mod art;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod execution_stats;
pub mod flows;
pub mod forcings;
pub mod hiv;
pub mod infection;
pub mod layout;
pub mod log;
pub mod macros;
pub mod mortality;
pub mod natural_history;
pub mod numeric;
pub mod parameters;
pub mod population;
pub mod report;
pub mod runner;

pub use engine::{Aggregates, Evaluation, Model, AGGREGATE_NAMES, NUM_AGGREGATES};
pub use error::ModelError;
pub use event::apply_annual_event;
pub use forcings::Forcings;
pub use layout::{Compartment, DiseaseState, Stratum, STATE_LEN};
pub use parameters::Parameters;

// Re-exports for the crate's macros and for downstream test code.
pub use approx;
