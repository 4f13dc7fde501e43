//! Run metrics and end-of-run reporting

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Counters shared by every unit of a run
#[derive(Clone)]
pub struct RunMetrics {
    inner: Arc<RwLock<MetricsInner>>,
}

struct MetricsInner {
    units_completed: u64,
    generation_failures: u64,
    cached_generations: u64,
    scoring_errors: u64,
    suites_written: u64,
    suite_write_failures: u64,
    /// Unit durations, trimmed to the most recent entries
    durations: Vec<Duration>,
    started: std::time::Instant,
}

impl Default for MetricsInner {
    fn default() -> Self {
        Self {
            units_completed: 0,
            generation_failures: 0,
            cached_generations: 0,
            scoring_errors: 0,
            suites_written: 0,
            suite_write_failures: 0,
            durations: Vec::new(),
            started: std::time::Instant::now(),
        }
    }
}

impl RunMetrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(MetricsInner::default())),
        }
    }

    /// Record one finished (test case × model) unit
    pub fn record_unit(
        &self,
        duration: Duration,
        generation_failed: bool,
        cached: bool,
        scoring_errors: usize,
    ) {
        let mut inner = self.inner.write();
        inner.units_completed += 1;
        if generation_failed {
            inner.generation_failures += 1;
        }
        if cached {
            inner.cached_generations += 1;
        }
        inner.scoring_errors += scoring_errors as u64;

        inner.durations.push(duration);
        if inner.durations.len() > 1000 {
            inner.durations.drain(0..500);
        }
    }

    pub fn increment_suites_written(&self) {
        self.inner.write().suites_written += 1;
    }

    pub fn increment_suite_write_failures(&self) {
        self.inner.write().suite_write_failures += 1;
    }

    pub fn units_completed(&self) -> u64 {
        self.inner.read().units_completed
    }

    pub fn generation_failures(&self) -> u64 {
        self.inner.read().generation_failures
    }

    pub fn scoring_errors(&self) -> u64 {
        self.inner.read().scoring_errors
    }

    pub fn suites_written(&self) -> u64 {
        self.inner.read().suites_written
    }

    /// Average unit duration
    pub fn average_duration(&self) -> Option<Duration> {
        let inner = self.inner.read();
        if inner.durations.is_empty() {
            return None;
        }

        let total: Duration = inner.durations.iter().sum();
        Some(total / inner.durations.len() as u32)
    }

    /// p95 unit duration
    pub fn p95_duration(&self) -> Option<Duration> {
        let inner = self.inner.read();
        if inner.durations.is_empty() {
            return None;
        }

        let mut sorted = inner.durations.clone();
        sorted.sort();
        let index = (sorted.len() as f64 * 0.95) as usize;
        Some(sorted[index.min(sorted.len() - 1)])
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let average_duration = self.average_duration();
        let p95_duration = self.p95_duration();
        let inner = self.inner.read();
        MetricsSnapshot {
            units_completed: inner.units_completed,
            generation_failures: inner.generation_failures,
            cached_generations: inner.cached_generations,
            scoring_errors: inner.scoring_errors,
            suites_written: inner.suites_written,
            suite_write_failures: inner.suite_write_failures,
            average_duration,
            p95_duration,
            elapsed: inner.started.elapsed(),
        }
    }

    /// Emit the end-of-run summary line
    pub fn log_summary(&self) {
        let snapshot = self.snapshot();
        info!(
            units = snapshot.units_completed,
            generation_failures = snapshot.generation_failures,
            cached = snapshot.cached_generations,
            scoring_errors = snapshot.scoring_errors,
            suites_written = snapshot.suites_written,
            suite_write_failures = snapshot.suite_write_failures,
            avg_unit_ms = snapshot.average_duration.map(|d| d.as_millis()).unwrap_or(0),
            elapsed_ms = snapshot.elapsed.as_millis(),
            "Run metrics"
        );
    }
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub units_completed: u64,
    pub generation_failures: u64,
    pub cached_generations: u64,
    pub scoring_errors: u64,
    pub suites_written: u64,
    pub suite_write_failures: u64,
    pub average_duration: Option<Duration>,
    pub p95_duration: Option<Duration>,
    pub elapsed: Duration,
}

impl MetricsSnapshot {
    /// Share of units whose generation failed (0.0 - 1.0)
    pub fn failure_rate(&self) -> f64 {
        if self.units_completed == 0 {
            0.0
        } else {
            self.generation_failures as f64 / self.units_completed as f64
        }
    }

    /// Format metrics for display
    pub fn format(&self) -> String {
        format!(
            r#"Run Metrics:
  Units Completed: {}
  Generation Failures: {} ({:.2}%)
  Cached Generations: {}
  Scoring Errors: {}
  Suites Written: {}
  Suite Write Failures: {}
  Average Unit Duration: {}
  P95 Unit Duration: {}
  Elapsed: {:.1}s"#,
            self.units_completed,
            self.generation_failures,
            self.failure_rate() * 100.0,
            self.cached_generations,
            self.scoring_errors,
            self.suites_written,
            self.suite_write_failures,
            format_duration(self.average_duration),
            format_duration(self.p95_duration),
            self.elapsed.as_secs_f64(),
        )
    }
}

fn format_duration(duration: Option<Duration>) -> String {
    match duration {
        Some(d) => format!("{:.2}ms", d.as_secs_f64() * 1000.0),
        None => "N/A".to_string(),
    }
}
