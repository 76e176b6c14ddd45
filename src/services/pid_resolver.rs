use crate::metrics::Metrics;
use crate::services::process::{ProcessId, ProcessTable};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Default delay between process-table polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Default give-up point for a PID lookup.
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Outcome of a PID lookup. `NotFound` is a normal result, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PidLookup {
    Found(ProcessId),
    NotFound,
}

impl PidLookup {
    pub fn pid(self) -> Option<ProcessId> {
        match self {
            PidLookup::Found(pid) => Some(pid),
            PidLookup::NotFound => None,
        }
    }

    pub fn is_found(self) -> bool {
        matches!(self, PidLookup::Found(_))
    }

    /// Value handed to companions on the command line; `-1` when not found.
    pub fn as_arg(self) -> String {
        match self {
            PidLookup::Found(pid) => pid.to_string(),
            PidLookup::NotFound => "-1".to_string(),
        }
    }
}

impl fmt::Display for PidLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PidLookup::Found(pid) => write!(f, "PID {}", pid),
            PidLookup::NotFound => f.write_str("not found"),
        }
    }
}

/// Polls a [`ProcessTable`] until a named process appears or a timeout passes.
///
/// Each attempt is followed by an awaited timer sleep, so a lookup never
/// blocks the runtime and self-terminates once the timeout has elapsed.
pub struct PidResolver<T: ProcessTable> {
    table: T,
    metrics: Arc<Metrics>,
}

impl<T: ProcessTable> PidResolver<T> {
    pub fn new(table: T, metrics: Arc<Metrics>) -> Self {
        Self { table, metrics }
    }

    pub fn table(&self) -> &T {
        &self.table
    }

    /// Resolve `process_name` to the first matching PID.
    ///
    /// Returns within `timeout + poll_interval` (plus query time). A failed
    /// query counts as "no match this tick" and is retried. A zero
    /// `poll_interval` is treated as one millisecond.
    pub async fn resolve(
        &self,
        process_name: &str,
        poll_interval: Duration,
        timeout: Duration,
    ) -> PidLookup {
        let poll_interval = poll_interval.max(Duration::from_millis(1));
        let start = Instant::now();

        loop {
            match self.table.find_by_name(process_name).await {
                Ok(pids) => {
                    if let Some(&pid) = pids.first() {
                        tracing::info!("Resolved {} to PID {}", process_name, pid);
                        self.metrics.record_pid_lookup(true, start.elapsed());
                        return PidLookup::Found(pid);
                    }
                }
                Err(e) => {
                    tracing::debug!("Process query for {} failed: {}", process_name, e);
                }
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                tracing::warn!(
                    "Gave up looking for {} after {:.1}s",
                    process_name,
                    elapsed.as_secs_f64()
                );
                self.metrics.record_pid_lookup(false, elapsed);
                return PidLookup::NotFound;
            }

            let remaining = timeout - elapsed;
            tracing::debug!(
                "{} not running yet, retrying in {:?} ({} retries left)",
                process_name,
                poll_interval,
                remaining.as_millis() / poll_interval.as_millis().max(1)
            );
            tokio::time::sleep(poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Table that fails a fixed number of queries, then reports a PID.
    struct FlakyTable {
        failures: usize,
        calls: AtomicUsize,
    }

    impl ProcessTable for FlakyTable {
        fn find_by_name(&self, _name: &str) -> impl Future<Output = std::io::Result<Vec<ProcessId>>> + Send {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let failures = self.failures;
            async move {
                if call < failures {
                    Err(std::io::Error::other("listing failed"))
                } else {
                    Ok(vec![31, 32])
                }
            }
        }
    }

    #[test]
    fn test_pid_lookup_arg() {
        assert_eq!(PidLookup::Found(1234).as_arg(), "1234");
        assert_eq!(PidLookup::NotFound.as_arg(), "-1");
        assert_eq!(PidLookup::NotFound.pid(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_errors_are_retried() {
        let table = FlakyTable {
            failures: 2,
            calls: AtomicUsize::new(0),
        };
        let resolver = PidResolver::new(table, Arc::new(Metrics::new()));

        let result = resolver
            .resolve("Game.exe", Duration::from_millis(1000), Duration::from_secs(30))
            .await;

        assert_eq!(result, PidLookup::Found(31));
        assert_eq!(resolver.table().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_makes_one_attempt() {
        let table = FlakyTable {
            failures: usize::MAX,
            calls: AtomicUsize::new(0),
        };
        let metrics = Arc::new(Metrics::new());
        let resolver = PidResolver::new(table, metrics.clone());

        let result = resolver
            .resolve("Game.exe", Duration::from_millis(1000), Duration::ZERO)
            .await;

        assert_eq!(result, PidLookup::NotFound);
        assert_eq!(resolver.table().calls.load(Ordering::SeqCst), 1);
        assert_eq!(metrics.pid_timeouts.load(Ordering::Relaxed), 1);
    }
}
