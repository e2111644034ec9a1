//! The yearly demographic event: everyone ages one year and the year's births enter
//! as HIV-negative susceptibles at age 0.

use log::debug;

use crate::error::{check_len, ModelError};
use crate::layout::{age_blocks, Compartment, DiseaseState, Stratum, MAX_AGE, STATE_LEN};

/// Ages `state` by one year in place and adds births. Returns the number of births.
///
/// Age 80 is a plus-group: it receives both the previous age 79 and the previous age
/// 80, so nobody leaves the model. Births are `birth_rate` per 1000 of the population
/// before the shift.
///
/// # Errors
///
/// Returns `ModelError::ConfigError` if `state` is not a full state vector. The state
/// is left untouched in that case.
pub fn apply_annual_event(time: f64, state: &mut [f64], birth_rate: f64) -> Result<f64, ModelError> {
    check_len("state vector", state.len(), STATE_LEN)?;
    let previous = state.to_vec();
    let total: f64 = previous.iter().sum();
    let births = birth_rate * total / 1000.0;

    for block in age_blocks() {
        let range = block.range();
        let (from, to) = (&previous[range.clone()], &mut state[range]);
        to[MAX_AGE] = from[MAX_AGE - 1] + from[MAX_AGE];
        to[1..MAX_AGE].copy_from_slice(&from[..MAX_AGE - 1]);
        to[0] = 0.0;
    }
    let newborn = Compartment::new(Stratum::HivNegative, DiseaseState::Susceptible, 0);
    state[newborn.index()] = births;

    debug!("annual event at t = {time}: population {total:.1}, births {births:.1}");
    Ok(births)
}
