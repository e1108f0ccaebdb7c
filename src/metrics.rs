use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Wall-clock durations of the partition tasks a stage ran
#[derive(Debug, Clone, Default)]
pub struct TaskTimings {
    durations: Arc<Mutex<Vec<Duration>>>,
}

impl TaskTimings {
    /// Create an empty timing record
    pub fn new() -> Self {
        Self::default()
    }

    /// Record how long one task took
    pub fn record(&self, elapsed: Duration) {
        self.durations.lock().push(elapsed);
    }

    /// Number of recorded tasks
    pub fn count(&self) -> usize {
        self.durations.lock().len()
    }

    /// Slowest task, the one the barrier waited on
    pub fn max(&self) -> Duration {
        self.durations
            .lock()
            .iter()
            .copied()
            .max()
            .unwrap_or_default()
    }

    /// Mean task duration
    pub fn mean(&self) -> Duration {
        let durations = self.durations.lock();
        if durations.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = durations.iter().sum();
        total / durations.len() as u32
    }
}

/// Per-stage metrics collector
///
/// Clones share the same counters, so every partition worker of a stage can
/// hold its own handle.
#[derive(Debug, Clone)]
pub struct StageMetrics {
    /// Inputs handed to the stage (lines, groups or buckets)
    records_in: Arc<AtomicU64>,
    /// Outputs the stage produced
    records_out: Arc<AtomicU64>,
    /// Inputs skipped because they could not be parsed
    malformed: Arc<AtomicU64>,
    timings: TaskTimings,
    /// First task start and last task end
    span: Arc<Mutex<Option<(Instant, Instant)>>>,
}

impl StageMetrics {
    /// Create a new metrics collector for a stage
    pub fn new() -> Self {
        Self {
            records_in: Arc::new(AtomicU64::new(0)),
            records_out: Arc::new(AtomicU64::new(0)),
            malformed: Arc::new(AtomicU64::new(0)),
            timings: TaskTimings::new(),
            span: Arc::new(Mutex::new(None)),
        }
    }

    /// Count one input handed to the stage
    pub fn record_in(&self) {
        self.records_in.fetch_add(1, Ordering::Relaxed);
    }

    /// Count `n` outputs produced by the stage
    pub fn record_out(&self, n: u64) {
        self.records_out.fetch_add(n, Ordering::Relaxed);
    }

    /// Count one skipped malformed input
    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished task that began at `started`
    pub fn record_task(&self, started: Instant) {
        let finished = Instant::now();
        self.timings.record(finished.duration_since(started));

        let mut span = self.span.lock();
        *span = Some(match *span {
            Some((first, last)) => (first.min(started), last.max(finished)),
            None => (started, finished),
        });
    }

    /// Total inputs seen so far
    pub fn total_in(&self) -> u64 {
        self.records_in.load(Ordering::Relaxed)
    }

    /// Total outputs produced so far
    pub fn total_out(&self) -> u64 {
        self.records_out.load(Ordering::Relaxed)
    }

    /// Total malformed inputs skipped so far
    pub fn total_malformed(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    /// Time from the first task's start to the last task's end.
    ///
    /// Zero until a task has finished, so waiting on an earlier stage is
    /// never charged to this one.
    pub fn elapsed(&self) -> Duration {
        match *self.span.lock() {
            Some((first, last)) => last.duration_since(first),
            None => Duration::ZERO,
        }
    }

    /// Input records per second over the stage's own running time
    pub fn throughput_rps(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            0.0
        } else {
            self.total_in() as f64 / elapsed
        }
    }

    /// Get a snapshot of current metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_in: self.total_in(),
            records_out: self.total_out(),
            malformed: self.total_malformed(),
            tasks: self.timings.count(),
            throughput_rps: self.throughput_rps(),
            slowest_task_ms: self.timings.max().as_secs_f64() * 1000.0,
            mean_task_ms: self.timings.mean().as_secs_f64() * 1000.0,
            elapsed_secs: self.elapsed().as_secs_f64(),
        }
    }
}

impl Default for StageMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A snapshot of stage metrics at a point in time
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub records_in: u64,
    pub records_out: u64,
    pub malformed: u64,
    pub tasks: usize,
    pub throughput_rps: f64,
    pub slowest_task_ms: f64,
    pub mean_task_ms: f64,
    pub elapsed_secs: f64,
}

impl MetricsSnapshot {
    /// Format metrics as a human-readable string
    pub fn format(&self) -> String {
        format!(
            "In: {}, Out: {}, Malformed: {}, Tasks: {}, Throughput: {:.2} rec/s, \
             Slowest task: {:.2}ms, Mean task: {:.2}ms, Elapsed: {:.2}s",
            self.records_in,
            self.records_out,
            self.malformed,
            self.tasks,
            self.throughput_rps,
            self.slowest_task_ms,
            self.mean_task_ms,
            self.elapsed_secs
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_timings() {
        let timings = TaskTimings::new();
        assert_eq!(timings.max(), Duration::ZERO);
        assert_eq!(timings.mean(), Duration::ZERO);

        timings.record(Duration::from_millis(10));
        timings.record(Duration::from_millis(30));
        assert_eq!(timings.count(), 2);
        assert_eq!(timings.max(), Duration::from_millis(30));
        assert_eq!(timings.mean(), Duration::from_millis(20));
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = StageMetrics::new();
        let handle = metrics.clone();
        for _ in 0..100 {
            handle.record_in();
        }
        handle.record_out(40);
        handle.record_malformed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.records_in, 100);
        assert_eq!(snapshot.records_out, 40);
        assert_eq!(snapshot.malformed, 1);
        assert!(snapshot.format().contains("Malformed: 1"));
    }

    #[test]
    fn test_elapsed_starts_with_first_task() {
        let metrics = StageMetrics::new();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(metrics.elapsed(), Duration::ZERO);
        assert_eq!(metrics.throughput_rps(), 0.0);

        let started = Instant::now();
        metrics.record_in();
        metrics.record_task(started);

        let elapsed = metrics.elapsed();
        assert!(elapsed < Duration::from_millis(50), "{:?}", elapsed);
        assert_eq!(metrics.snapshot().tasks, 1);
    }

    #[test]
    fn test_elapsed_spans_overlapping_tasks() {
        let metrics = StageMetrics::new();
        let first = Instant::now();
        std::thread::sleep(Duration::from_millis(5));
        let second = Instant::now();
        metrics.record_task(second);
        metrics.record_task(first);

        assert!(metrics.elapsed() >= Duration::from_millis(5));
        assert!(metrics.timings.max() >= Duration::from_millis(5));
    }
}
