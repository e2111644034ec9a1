//! Logging configuration for the model and its command-line driver.
//!
//! The crate logs through the five `log` macros, re-exported here: `error!`, `warn!`,
//! `info!`, `debug!` and `trace!`. Loading inputs and running the driver log at `info!`
//! and `debug!`; each derivative evaluation logs one `trace!` line.
//!
//! Logging is _disabled_ by default. The driver turns it on with `--log-level <level>`;
//! library users call one of:
//!
//!  - `enable_logging()`: turns on all log messages
//!  - `disable_logging()`: turns off all log messages
//!  - `set_log_level(level: LevelFilter)`: enables only messages with priority at least `level`
//!
//! Per-module filters are set with `set_module_filter()` / `set_module_filters()` and
//! cleared with `remove_module_filter()`:
//!
//! ```rust
//! use tbhiv::log::{set_log_level, set_module_filter, LevelFilter};
//!
//! // Loader and runner messages, plus one line per derivative evaluation.
//! set_log_level(LevelFilter::Info);
//! set_module_filter("tbhiv::engine", LevelFilter::Trace);
//! ```
#[cfg(feature = "logging")]
mod standard_logger;

#[cfg(not(feature = "logging"))]
mod null_logger;

pub use log::{debug, error, info, trace, warn, LevelFilter};

use rustc_hash::FxHashMap;
use std::collections::hash_map::Entry;
#[cfg(feature = "logging")]
use log4rs::Handle;
use std::sync::LazyLock;
use std::sync::{Mutex, MutexGuard};

// Logging disabled
const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::Off;
// The engine traces every evaluation; an integrator calls it many thousands of times.
const DEFAULT_MODULE_FILTERS: [(&str, LevelFilter); 1] = [("tbhiv::engine", LevelFilter::Debug)];

static LOG_CONFIGURATION: LazyLock<Mutex<LogConfiguration>> = LazyLock::new(Mutex::default);

/// A level filter for every log target under a module path (e.g. `"tbhiv::config"`).
#[derive(Debug, PartialEq)]
struct ModuleLogConfiguration {
    module: String,
    level: LevelFilter,
}

impl From<(&str, LevelFilter)> for ModuleLogConfiguration {
    fn from((module, level): (&str, LevelFilter)) -> Self {
        Self {
            module: module.to_string(),
            level,
        }
    }
}

/// The global level, the module filters and, with the `logging` feature, the handle of
/// the installed logger. The public functions below operate on the one global instance.
#[derive(Debug)]
pub(in crate::log) struct LogConfiguration {
    /// Level for targets with no module filter. `LevelFilter::Off` disables logging.
    pub(in crate::log) global_log_level: LevelFilter,
    pub(in crate::log) module_configurations: FxHashMap<String, ModuleLogConfiguration>,

    #[cfg(feature = "logging")]
    root_handle: Option<Handle>,
}

impl Default for LogConfiguration {
    fn default() -> Self {
        let module_configurations = DEFAULT_MODULE_FILTERS
            .map(|(module, level)| (module.to_string(), (module, level).into()));
        Self {
            global_log_level: DEFAULT_LOG_LEVEL,
            module_configurations: module_configurations.into_iter().collect(),

            #[cfg(feature = "logging")]
            root_handle: None,
        }
    }
}

impl LogConfiguration {
    pub(in crate::log) fn set_log_level(&mut self, level: LevelFilter) {
        self.global_log_level = level;
        self.set_config();
    }

    /// Returns true if the configuration changed.
    fn insert_module_filter(&mut self, module: &str, level: LevelFilter) -> bool {
        match self.module_configurations.entry(module.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().level == level {
                    return false;
                }
                entry.get_mut().level = level;
            }
            Entry::Vacant(entry) => {
                entry.insert((module, level).into());
            }
        }
        true
    }

    pub(in crate::log) fn set_module_filters(&mut self, module_filters: &[(&str, LevelFilter)]) {
        let mut mutated = false;
        for (module, level) in module_filters {
            mutated |= self.insert_module_filter(module, *level);
        }
        if mutated {
            self.set_config();
        }
    }

    pub(in crate::log) fn remove_module_filter(&mut self, module: &str) {
        if self.module_configurations.remove(module).is_some() {
            self.set_config();
        }
    }
}

/// Turns on every log message. Equivalent to `set_log_level(LevelFilter::Trace)`.
pub fn enable_logging() {
    set_log_level(LevelFilter::Trace);
}

/// Equivalent to `set_log_level(LevelFilter::Off)`.
pub fn disable_logging() {
    set_log_level(LevelFilter::Off);
}

/// Sets the global log level.
pub fn set_log_level(level: LevelFilter) {
    get_log_configuration().set_log_level(level);
}

pub fn set_module_filter(module_path: &str, level_filter: LevelFilter) {
    get_log_configuration().set_module_filters(&[(module_path, level_filter)]);
}

/// Removes the filter for `module_path`, so the global level applies to it again.
pub fn remove_module_filter(module_path: &str) {
    get_log_configuration().remove_module_filter(module_path);
}

/// Sets several module filters, rebuilding the logger at most once.
pub fn set_module_filters(module_filters: &[(&str, LevelFilter)]) {
    get_log_configuration().set_module_filters(module_filters);
}

fn get_log_configuration() -> MutexGuard<'static, LogConfiguration> {
    LOG_CONFIGURATION.lock().expect("Mutex poisoned")
}

#[cfg(test)]
mod tests {
    use super::{
        get_log_configuration, remove_module_filter, set_log_level, set_module_filter,
        set_module_filters,
    };
    use log::{error, trace, LevelFilter};
    use std::sync::{LazyLock, Mutex};

    // The logger is global.
    static TEST_MUTEX: LazyLock<Mutex<()>> = LazyLock::new(Mutex::default);

    #[test]
    fn global_level_is_stored() {
        let _guard = TEST_MUTEX.lock().expect("Mutex poisoned");
        set_log_level(LevelFilter::Error);
        assert_eq!(get_log_configuration().global_log_level, LevelFilter::Error);
        error!("global level set to error");
        trace!("not emitted");

        set_log_level(LevelFilter::Trace);
        assert_eq!(get_log_configuration().global_log_level, LevelFilter::Trace);
        set_log_level(LevelFilter::Off);
    }

    #[test]
    fn engine_trace_is_filtered_by_default() {
        let _guard = TEST_MUTEX.lock().expect("Mutex poisoned");
        let config = get_log_configuration();
        assert_eq!(
            config
                .module_configurations
                .get("tbhiv::engine")
                .map(|filter| filter.level),
            Some(LevelFilter::Debug)
        );
    }

    #[test]
    fn module_filters_can_be_set_and_removed() {
        let _guard = TEST_MUTEX.lock().expect("Mutex poisoned");
        set_module_filters(&[
            ("tbhiv::config", LevelFilter::Warn),
            ("tbhiv::runner", LevelFilter::Debug),
        ]);
        set_module_filter("tbhiv::config", LevelFilter::Info);
        {
            let config = get_log_configuration();
            assert_eq!(
                config.module_configurations.get("tbhiv::config"),
                Some(&("tbhiv::config", LevelFilter::Info).into())
            );
            assert!(config.module_configurations.contains_key("tbhiv::runner"));
        }

        remove_module_filter("tbhiv::config");
        remove_module_filter("tbhiv::runner");
        let config = get_log_configuration();
        assert!(!config.module_configurations.contains_key("tbhiv::config"));
        assert!(config.module_configurations.contains_key("tbhiv::engine"));
    }
}
