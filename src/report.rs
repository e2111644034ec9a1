//! CSV output of one evaluation: the named aggregates and the derivative of every
//! compartment with its decoded position in the layout.

use std::ffi::OsStr;
use std::fs::{create_dir_all, File};
use std::path::Path;

use csv::Writer;
use log::info;
use serde_derive::Serialize;

use crate::engine::AGGREGATE_NAMES;
use crate::error::{check_len, ModelError};
use crate::layout::{Compartment, Stratum, STATE_LEN};

#[derive(Serialize)]
struct AggregateRow<'a> {
    name: &'a str,
    value: f64,
}

#[derive(Serialize)]
struct CompartmentRow {
    index: usize,
    stratum: &'static str,
    cd4: Option<usize>,
    duration: Option<usize>,
    state: &'static str,
    age: usize,
    value: f64,
}

impl CompartmentRow {
    fn new(compartment: &Compartment, index: usize, value: f64) -> Self {
        let (stratum, duration) = match compartment.stratum {
            Stratum::HivNegative => ("hiv_negative", None),
            Stratum::HivPositive { .. } => ("hiv_positive", None),
            Stratum::OnArt { duration, .. } => ("on_art", Some(duration)),
        };
        CompartmentRow {
            index,
            stratum,
            cd4: compartment.stratum.cd4(),
            duration,
            state: compartment.state.code(),
            age: compartment.age,
            value,
        }
    }
}

// Checks that the path names a CSV file and creates its parent directories.
fn generate_validate_filepath(path: &Path) -> Result<File, ModelError> {
    match path.extension().and_then(OsStr::to_str) {
        Some("csv") => {
            if let Some(parent) = path.parent() {
                create_dir_all(parent)?;
            }
            Ok(File::create(path)?)
        }
        _ => Err(ModelError::ReportError(format!(
            "report output files must be CSVs, got {}",
            path.display()
        ))),
    }
}

/// Writes `name,value` rows for the auxiliary outputs. Slots past the named
/// aggregates are written as `unused_<i>`.
///
/// # Errors
///
/// Returns `ModelError::ReportError` for a non-CSV path, or an I/O or CSV error.
pub fn write_aggregates(path: &Path, aux: &[f64]) -> Result<(), ModelError> {
    let mut writer = Writer::from_writer(generate_validate_filepath(path)?);
    for (i, value) in aux.iter().enumerate() {
        let name = AGGREGATE_NAMES
            .get(i)
            .map_or_else(|| format!("unused_{i}"), |name| (*name).to_string());
        writer.serialize(AggregateRow {
            name: &name,
            value: *value,
        })?;
    }
    writer.flush()?;
    info!("Wrote {} aggregates to {}", aux.len(), path.display());
    Ok(())
}

/// Writes one row per compartment of `derivative`.
///
/// # Errors
///
/// Returns `ModelError::ConfigError` if `derivative` is not a full state vector,
/// `ModelError::ReportError` for a non-CSV path, or an I/O or CSV error.
pub fn write_derivative(path: &Path, derivative: &[f64]) -> Result<(), ModelError> {
    check_len("derivative", derivative.len(), STATE_LEN)?;
    let mut writer = Writer::from_writer(generate_validate_filepath(path)?);
    for (index, value) in derivative.iter().enumerate() {
        let compartment = Compartment::from_index(index).ok_or_else(|| {
            ModelError::ReportError(format!("index {index} is outside the layout"))
        })?;
        writer.serialize(CompartmentRow::new(&compartment, index, *value))?;
    }
    writer.flush()?;
    info!("Wrote derivative to {}", path.display());
    Ok(())
}
