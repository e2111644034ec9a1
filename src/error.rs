use std::fmt::{self, Debug, Display};
use std::io;

/// Provides `ModelError` and maps other errors to
/// convert to a `ModelError`
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub enum ModelError {
    IoError(io::Error),
    JsonError(serde_json::Error),
    CSVError(csv::Error),
    /// The caller broke an input contract: wrong vector length, out of range
    /// value, or too few auxiliary output slots.
    ConfigError(String),
    ReportError(String),
}

impl From<io::Error> for ModelError {
    fn from(error: io::Error) -> Self {
        ModelError::IoError(error)
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(error: serde_json::Error) -> Self {
        ModelError::JsonError(error)
    }
}

impl From<csv::Error> for ModelError {
    fn from(error: csv::Error) -> Self {
        ModelError::CSVError(error)
    }
}

impl From<String> for ModelError {
    fn from(error: String) -> Self {
        ModelError::ConfigError(error)
    }
}

impl From<&str> for ModelError {
    fn from(error: &str) -> Self {
        ModelError::ConfigError(error.to_string())
    }
}

impl std::error::Error for ModelError {}

impl Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Error: {self:?}")?;
        Ok(())
    }
}

/// Checks that a caller supplied slice has exactly `expected` entries.
pub(crate) fn check_len(what: &str, actual: usize, expected: usize) -> Result<(), ModelError> {
    if actual == expected {
        Ok(())
    } else {
        Err(ModelError::ConfigError(format!(
            "{what} has {actual} entries, expected {expected}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_converts_to_config_error() {
        let err: ModelError = "bad input".into();
        assert!(matches!(err, ModelError::ConfigError(ref msg) if msg == "bad input"));
    }

    #[test]
    fn check_len_reports_both_lengths() {
        assert!(check_len("state", 3, 3).is_ok());
        match check_len("state", 2, 3) {
            Err(ModelError::ConfigError(msg)) => {
                assert_eq!(msg, "state has 2 entries, expected 3");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn display_wraps_debug() {
        let err = ModelError::ReportError("x".to_string());
        assert_eq!(err.to_string(), "Error: ReportError(\"x\")");
    }
}
