// Coordinator metrics module
//
// Provides lightweight counters for launches, PID resolution and OCR session traffic

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Coordinator counters
///
/// Uses atomic operations so the orchestrator, the session controller and the
/// backend reader tasks can share one instance behind an `Arc` without locks.
#[derive(Debug)]
pub struct Metrics {
    /// Processes spawned successfully (games, agents, textractor)
    pub launches: AtomicU64,

    /// Spawn attempts that produced no process
    pub launch_failures: AtomicU64,

    /// PID lookups that found the process
    pub pids_found: AtomicU64,

    /// PID lookups that gave up at the timeout
    pub pid_timeouts: AtomicU64,

    /// Total time spent waiting on PID lookups in milliseconds
    pub pid_wait_ms: AtomicU64,

    /// Agents started
    pub agents_started: AtomicU64,

    /// Agents skipped (no script or agent executable configured)
    pub agents_skipped: AtomicU64,

    /// Backend log lines that produced an event
    pub lines_classified: AtomicU64,

    /// Backend log lines dropped as known noise
    pub lines_suppressed: AtomicU64,

    /// Structured error events received from the backend
    pub backend_errors: AtomicU64,

    /// Session state transitions
    pub state_transitions: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            launches: AtomicU64::new(0),
            launch_failures: AtomicU64::new(0),
            pids_found: AtomicU64::new(0),
            pid_timeouts: AtomicU64::new(0),
            pid_wait_ms: AtomicU64::new(0),
            agents_started: AtomicU64::new(0),
            agents_skipped: AtomicU64::new(0),
            lines_classified: AtomicU64::new(0),
            lines_suppressed: AtomicU64::new(0),
            backend_errors: AtomicU64::new(0),
            state_transitions: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_launch(&self, succeeded: bool) {
        if succeeded {
            self.launches.fetch_add(1, Ordering::Relaxed);
        } else {
            self.launch_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record the outcome of a PID lookup and how long it waited
    pub fn record_pid_lookup(&self, found: bool, waited: Duration) {
        if found {
            self.pids_found.fetch_add(1, Ordering::Relaxed);
        } else {
            self.pid_timeouts.fetch_add(1, Ordering::Relaxed);
        }
        self.pid_wait_ms
            .fetch_add(waited.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_agent_started(&self) {
        self.agents_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_agent_skipped(&self) {
        self.agents_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_line(&self, suppressed: bool) {
        if suppressed {
            self.lines_suppressed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.lines_classified.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_backend_error(&self) {
        self.backend_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transition(&self) {
        self.state_transitions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average wait per PID lookup in milliseconds
    pub fn avg_pid_wait_ms(&self) -> f64 {
        let total = self.pid_wait_ms.load(Ordering::Relaxed);
        let count = self.pids_found.load(Ordering::Relaxed) + self.pid_timeouts.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Coordinator Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Launches: {} ok, {} failed; agents: {} started, {} skipped",
            self.launches.load(Ordering::Relaxed),
            self.launch_failures.load(Ordering::Relaxed),
            self.agents_started.load(Ordering::Relaxed),
            self.agents_skipped.load(Ordering::Relaxed)
        );
        tracing::info!(
            "PID lookups: {} found, {} timed out (avg wait {:.0}ms)",
            self.pids_found.load(Ordering::Relaxed),
            self.pid_timeouts.load(Ordering::Relaxed),
            self.avg_pid_wait_ms()
        );
        tracing::info!(
            "OCR log lines: {} classified, {} suppressed; backend errors: {}; transitions: {}",
            self.lines_classified.load(Ordering::Relaxed),
            self.lines_suppressed.load(Ordering::Relaxed),
            self.backend_errors.load(Ordering::Relaxed),
            self.state_transitions.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
