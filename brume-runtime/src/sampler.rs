//! Per-container CPU utilization sampling
//!
//! Reads process CPU time from `/proc/<pid>/stat` and reports utilization
//! between two reads. Read-only: nothing here writes back into cluster
//! state.

use std::time::{Duration, Instant};
use tokio::fs;
use tracing::debug;

use brume_core::{ContainerRecord, Error, ProcessId, Result};

/// One utilization reading for a monitored container
#[derive(Debug, Clone, PartialEq)]
pub struct CpuSample {
    /// Container name the sample belongs to
    pub container: String,
    /// Sampled process id
    pub pid: ProcessId,
    /// CPU utilization over the sampling window, in percent
    pub cpu_percent: f64,
}

/// Samples CPU utilization for the process ids a cluster exposes
///
/// Containers whose process vanished between launch and sampling are skipped
/// rather than reported as errors.
#[derive(Debug, Clone)]
pub struct UtilizationSampler {
    window: Duration,
}

impl UtilizationSampler {
    /// Default sampling window
    pub const DEFAULT_WINDOW: Duration = Duration::from_secs(1);

    /// Create a sampler with the default window
    #[must_use]
    pub fn new() -> Self {
        Self {
            window: Self::DEFAULT_WINDOW,
        }
    }

    /// Override the sampling window
    #[must_use]
    pub const fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Sample CPU utilization for every record with a live process
    pub async fn sample(&self, records: &[ContainerRecord]) -> Vec<CpuSample> {
        let mut first = Vec::with_capacity(records.len());
        let started = Instant::now();

        for record in records {
            first.push(read_cpu_ticks(record.pid).await.ok());
        }

        tokio::time::sleep(self.window).await;
        let elapsed = started.elapsed();

        let mut samples = Vec::new();
        for (record, before) in records.iter().zip(first) {
            let Some(before) = before else {
                debug!(container = %record.name, pid = record.pid.as_raw(), "Process gone, skipping");
                continue;
            };
            let Ok(after) = read_cpu_ticks(record.pid).await else {
                debug!(container = %record.name, pid = record.pid.as_raw(), "Process exited mid-sample");
                continue;
            };

            samples.push(CpuSample {
                container: record.name.clone(),
                pid: record.pid,
                cpu_percent: cpu_percent(before, after, elapsed),
            });
        }

        samples
    }
}

impl Default for UtilizationSampler {
    fn default() -> Self {
        Self::new()
    }
}

/// Total CPU time (utime + stime) of a process, in clock ticks
async fn read_cpu_ticks(pid: ProcessId) -> Result<u64> {
    let path = format!("/proc/{pid}/stat");
    let content = fs::read_to_string(&path).await?;
    parse_stat_ticks(&content).ok_or_else(|| Error::InvalidConfig {
        message: format!("Malformed {path}"),
    })
}

/// Parse utime + stime out of a `/proc/<pid>/stat` line
///
/// The comm field may contain spaces, so fields are counted from the closing
/// parenthesis. utime and stime are fields 14 and 15 (1-indexed), i.e. the
/// 12th and 13th after comm.
fn parse_stat_ticks(stat: &str) -> Option<u64> {
    let after_comm = &stat[stat.rfind(')')? + 1..];
    let fields: Vec<&str> = after_comm.split_whitespace().collect();

    let utime: u64 = fields.get(11)?.parse().ok()?;
    let stime: u64 = fields.get(12)?.parse().ok()?;
    Some(utime + stime)
}

/// Convert a tick delta over a wall-clock window into a percentage
fn cpu_percent(before: u64, after: u64, elapsed: Duration) -> f64 {
    let ticks_per_sec = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if ticks_per_sec <= 0 || elapsed.is_zero() {
        return 0.0;
    }

    #[allow(clippy::cast_precision_loss)]
    let cpu_secs = after.saturating_sub(before) as f64 / ticks_per_sec as f64;
    (cpu_secs / elapsed.as_secs_f64()) * 100.0
}
