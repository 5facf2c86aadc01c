// Metrics collection and tracking

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use conversion_core::{PartialFailure, RunOutcome, RunReport};
use serde::Serialize;

/// Counters for conversion runs
#[derive(Debug, Default)]
pub struct ConversionMetrics {
    pub requests: AtomicU64,
    pub started: AtomicU64,
    pub succeeded: AtomicU64,
    pub timed_out: AtomicU64,
    pub synthesis_failed: AtomicU64,
    pub merge_failed: AtomicU64,
    pub cancelled: AtomicU64,
    pub chapters_dropped: AtomicU64,
    pub total_run_time_ms: AtomicU64,
}

impl ConversionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_started(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_finished(&self, report: &RunReport, elapsed: Duration) {
        let counter = match report.outcome {
            RunOutcome::Success(_) => &self.succeeded,
            RunOutcome::TimedOut => &self.timed_out,
            RunOutcome::SynthesisFailed(_) => &self.synthesis_failed,
            RunOutcome::MergeFailed(_) => &self.merge_failed,
            RunOutcome::Cancelled => &self.cancelled,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        let dropped = report
            .dropped
            .iter()
            .filter(|d| matches!(d, PartialFailure::ChapterMergeFailed { .. }))
            .count() as u64;
        self.chapters_dropped.fetch_add(dropped, Ordering::Relaxed);
        self.total_run_time_ms
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn finished(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
            + self.timed_out.load(Ordering::Relaxed)
            + self.synthesis_failed.load(Ordering::Relaxed)
            + self.merge_failed.load(Ordering::Relaxed)
            + self.cancelled.load(Ordering::Relaxed)
    }

    pub fn avg_run_time_ms(&self) -> f64 {
        let count = self.finished();
        if count == 0 {
            return 0.0;
        }
        let total = self.total_run_time_ms.load(Ordering::Relaxed);
        total as f64 / count as f64
    }

    pub fn snapshot(&self) -> ConversionStats {
        ConversionStats {
            requests: self.requests.load(Ordering::Relaxed),
            started: self.started.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            synthesis_failed: self.synthesis_failed.load(Ordering::Relaxed),
            merge_failed: self.merge_failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            chapters_dropped: self.chapters_dropped.load(Ordering::Relaxed),
            avg_run_time_ms: self.avg_run_time_ms(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConversionStats {
    pub requests: u64,
    pub started: u64,
    pub succeeded: u64,
    pub timed_out: u64,
    pub synthesis_failed: u64,
    pub merge_failed: u64,
    pub cancelled: u64,
    pub chapters_dropped: u64,
    pub avg_run_time_ms: f64,
}

#[derive(Serialize)]
pub struct SystemMetrics {
    pub cpu_usage_percent: f32,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub memory_usage_percent: f32,
    pub uptime_seconds: u64,
    pub system_load: Option<f64>,
}

impl SystemMetrics {
    pub fn collect(uptime: Duration) -> Self {
        let mut system = sysinfo::System::new();
        system.refresh_cpu();
        system.refresh_memory();

        let cpu_usage = system.global_cpu_info().cpu_usage();
        let memory_used = system.used_memory();
        let memory_total = system.total_memory();
        let memory_usage_percent = if memory_total > 0 {
            (memory_used as f64 / memory_total as f64 * 100.0) as f32
        } else {
            0.0
        };

        Self {
            cpu_usage_percent: cpu_usage,
            memory_used_mb: memory_used / 1024 / 1024,
            memory_total_mb: memory_total / 1024 / 1024,
            memory_usage_percent,
            uptime_seconds: uptime.as_secs(),
            system_load: load_average(),
        }
    }
}

#[cfg(unix)]
fn load_average() -> Option<f64> {
    std::fs::read_to_string("/proc/loadavg")
        .ok()
        .and_then(|loadavg| loadavg.split_whitespace().next()?.parse().ok())
}

#[cfg(not(unix))]
fn load_average() -> Option<f64> {
    None
}

#[derive(Serialize)]
pub struct MetricsResponse {
    pub timestamp: DateTime<Utc>,
    pub system: SystemMetrics,
    pub conversions: ConversionStats,
}
