//! Loading of parameters, forcings and state vectors from files.
//!
//! Parameters and forcings are JSON, either an object with named fields or a flat
//! array in reference order. A state vector is a JSON array of [`STATE_LEN`] numbers
//! or a CSV file with an `index,value` header, where compartments not listed are zero.

use std::fs;
use std::path::Path;

use log::info;
use serde::de::DeserializeOwned;
use serde_derive::Deserialize;

use crate::error::{check_len, ModelError};
use crate::forcings::Forcings;
use crate::layout::STATE_LEN;
use crate::parameters::Parameters;

#[derive(Deserialize)]
#[serde(untagged)]
enum Input<T> {
    Flat(Vec<f64>),
    Named(T),
}

fn parse<T: DeserializeOwned>(
    content: &str,
    from_values: impl Fn(&[f64]) -> Result<T, ModelError>,
) -> Result<T, ModelError> {
    match serde_json::from_str::<Input<T>>(content)? {
        Input::Flat(values) => from_values(&values),
        Input::Named(named) => Ok(named),
    }
}

/// # Errors
///
/// Returns an error if `content` is not valid JSON for either form, or if the
/// values fail validation.
pub fn parse_parameters(content: &str) -> Result<Parameters, ModelError> {
    let parameters = parse(content, Parameters::from_values)?;
    parameters.validate()?;
    Ok(parameters)
}

/// # Errors
///
/// Returns an error if `content` is not valid JSON for either form, or if the
/// values fail validation.
pub fn parse_forcings(content: &str) -> Result<Forcings, ModelError> {
    let forcings = parse(content, Forcings::from_values)?;
    forcings.validate()?;
    Ok(forcings)
}

/// # Errors
///
/// Returns an error if the file cannot be read or does not hold valid parameters.
pub fn load_parameters(path: &Path) -> Result<Parameters, ModelError> {
    info!("Loading parameters from {}", path.display());
    parse_parameters(&fs::read_to_string(path)?)
}

/// # Errors
///
/// Returns an error if the file cannot be read or does not hold valid forcings.
pub fn load_forcings(path: &Path) -> Result<Forcings, ModelError> {
    info!("Loading forcings from {}", path.display());
    parse_forcings(&fs::read_to_string(path)?)
}

#[derive(Deserialize)]
struct StateRow {
    index: usize,
    value: f64,
}

/// Loads a state vector; a `.csv` extension selects the sparse CSV form.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, has the wrong length,
/// names an index twice or out of range, or holds a negative or non-finite count.
pub fn load_state(path: &Path) -> Result<Vec<f64>, ModelError> {
    info!("Loading state from {}", path.display());
    let is_csv = path
        .extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("csv"));
    let state = if is_csv {
        read_state_csv(csv::Reader::from_path(path)?)?
    } else {
        let state: Vec<f64> = serde_json::from_str(&fs::read_to_string(path)?)?;
        check_len("state vector", state.len(), STATE_LEN)?;
        state
    };
    if let Some(index) = state.iter().position(|value| !value.is_finite() || *value < 0.0) {
        return Err(ModelError::ConfigError(format!(
            "state entry {index} is {}, expected a nonnegative count",
            state[index]
        )));
    }
    Ok(state)
}

fn read_state_csv<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<Vec<f64>, ModelError> {
    let mut state = vec![0.0; STATE_LEN];
    let mut seen = vec![false; STATE_LEN];
    for row in reader.deserialize() {
        let StateRow { index, value } = row?;
        if index >= STATE_LEN {
            return Err(ModelError::ConfigError(format!(
                "state index {index} is out of range 0..{STATE_LEN}"
            )));
        }
        if seen[index] {
            return Err(ModelError::ConfigError(format!(
                "state index {index} appears more than once"
            )));
        }
        seen[index] = true;
        state[index] = value;
    }
    Ok(state)
}
