//! Timing and memory profile of a batch of derivative evaluations.

// Loss of precision is allowable in this module's use cases.
#![allow(clippy::cast_precision_loss)]

use std::time::{Duration, Instant};

use bytesize::ByteSize;
use humantime::format_duration;
use log::{debug, error, info};
use serde_derive::Serialize;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Minimum time between memory polls.
const REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Final statistics. The per-evaluation figures are zero when nothing was evaluated.
#[derive(Debug, Serialize)]
pub struct ExecutionStatistics {
    pub max_memory_usage: u64,
    pub cpu_time: Duration,
    pub wall_time: Duration,

    pub evaluations: usize,
    pub cpu_time_per_evaluation: Duration,
    pub wall_time_per_evaluation: Duration,
}

pub struct ExecutionProfilingCollector {
    start_time: Instant,
    last_refresh: Instant,
    /// Accumulated CPU milliseconds of the process when the collector was created
    start_cpu_time: u64,
    max_memory_usage: u64,
    system: System,
    /// `None` where `sysinfo` cannot see the current process
    process_id: Option<Pid>,
}

impl Default for ExecutionProfilingCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionProfilingCollector {
    #[must_use]
    pub fn new() -> ExecutionProfilingCollector {
        let process_id = sysinfo::get_current_pid().ok();
        let now = Instant::now();
        let mut collector = ExecutionProfilingCollector {
            start_time: now,
            last_refresh: now,
            start_cpu_time: 0,
            max_memory_usage: 0,
            system: System::new(),
            process_id,
        };
        if let Some(process_id) = process_id {
            debug!("Process ID: {}", process_id);
            collector.update_system_info(ProcessRefreshKind::nothing().with_cpu().with_memory());
            if let Some(process) = collector.system.process(process_id) {
                collector.max_memory_usage = process.memory();
                collector.start_cpu_time = process.accumulated_cpu_time();
            }
        }
        collector
    }

    /// Polls memory use if at least [`REFRESH_INTERVAL`] has passed since the last
    /// poll. Cheap enough to call after every evaluation.
    #[inline]
    pub fn refresh(&mut self) {
        if self.last_refresh.elapsed() >= REFRESH_INTERVAL {
            self.poll_memory();
            self.last_refresh = Instant::now();
        }
    }

    fn poll_memory(&mut self) {
        if let Some(pid) = self.process_id {
            self.update_system_info(ProcessRefreshKind::nothing().with_memory());
            if let Some(process) = self.system.process(pid) {
                self.max_memory_usage = self.max_memory_usage.max(process.memory());
            }
        }
    }

    #[inline]
    fn update_system_info(&mut self, process_refresh_kind: ProcessRefreshKind) {
        if let Some(pid) = self.process_id {
            if self.system.refresh_processes_specifics(
                ProcessesToUpdate::Some(&[pid]),
                true,
                process_refresh_kind,
            ) < 1
            {
                error!("could not refresh process statistics");
            }
        }
    }

    pub fn compute_final_statistics(&mut self, evaluations: usize) -> ExecutionStatistics {
        let mut cpu_time_millis = 0;
        if let Some(pid) = self.process_id {
            self.update_system_info(ProcessRefreshKind::nothing().with_cpu().with_memory());
            if let Some(process) = self.system.process(pid) {
                self.max_memory_usage = self.max_memory_usage.max(process.memory());
                cpu_time_millis = process
                    .accumulated_cpu_time()
                    .saturating_sub(self.start_cpu_time);
            }
        }

        let cpu_time = Duration::from_millis(cpu_time_millis);
        let wall_time = self.start_time.elapsed();
        let (cpu_time_per_evaluation, wall_time_per_evaluation) = if evaluations > 0 {
            (
                Duration::from_secs_f64(cpu_time_millis as f64 / evaluations as f64 / 1000.0),
                Duration::from_secs_f64(wall_time.as_secs_f64() / evaluations as f64),
            )
        } else {
            (Duration::ZERO, Duration::ZERO)
        };

        ExecutionStatistics {
            max_memory_usage: self.max_memory_usage,
            cpu_time,
            wall_time,
            evaluations,
            cpu_time_per_evaluation,
            wall_time_per_evaluation,
        }
    }
}

/// Logs execution statistics at `info!` level.
pub fn log_execution_statistics(stats: &ExecutionStatistics) {
    info!("Execution complete.");
    if stats.max_memory_usage == 0 {
        info!("Memory and CPU statistics are not available on your platform.");
    } else {
        info!("Max memory usage: {}", ByteSize::b(stats.max_memory_usage));
        info!("CPU time: {}", format_duration(stats.cpu_time));
    }
    info!("Wall time: {}", format_duration(stats.wall_time));

    if stats.evaluations > 0 {
        info!("Derivative evaluations: {}", stats.evaluations);
        info!(
            "Wall time per evaluation: {}",
            format_duration(stats.wall_time_per_evaluation)
        );
        if stats.max_memory_usage > 0 {
            info!(
                "CPU time per evaluation: {}",
                format_duration(stats.cpu_time_per_evaluation)
            );
        }
    }
}
