//! Active babysitter tracking and the shutdown barrier.

use super::SitterOutcome;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

/// What `quit` observed once every babysitter had stopped.
#[derive(Debug, Default)]
pub struct QuiescenceReport {
    /// Babysitters started over the tracker's lifetime.
    pub started: usize,
    /// Babysitters stopped over the tracker's lifetime.
    pub stopped: usize,
    /// Outcome of each joined babysitter, by name.
    pub outcomes: Vec<(String, SitterOutcome)>,
    /// Babysitters whose task panicked or was aborted, with the join error.
    pub failures: Vec<(String, String)>,
}

/// Counts active babysitters and owns their task handles.
///
/// The count only changes through [`SitterTracker::start`] and the drop of
/// the returned [`SitterGuard`], so it always equals started minus stopped.
pub struct SitterTracker {
    active: AtomicUsize,
    started: AtomicUsize,
    stopped: AtomicUsize,
    handles: Mutex<Vec<(String, JoinHandle<SitterOutcome>)>>,
    poll_interval: Duration,
}

impl SitterTracker {
    /// Creates a tracker whose `quit` checks the count every `poll_interval`.
    #[must_use]
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            active: AtomicUsize::new(0),
            started: AtomicUsize::new(0),
            stopped: AtomicUsize::new(0),
            handles: Mutex::new(Vec::new()),
            poll_interval,
        }
    }

    /// Registers a babysitter as active.
    ///
    /// The babysitter counts as active until the guard is stopped or dropped.
    pub fn start(self: &Arc<Self>, name: impl Into<String>) -> SitterGuard {
        let name = name.into();
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.started.fetch_add(1, Ordering::SeqCst);
        trace!(sitter = %name, active, "Added active sitter");

        SitterGuard {
            tracker: Arc::clone(self),
            name,
        }
    }

    fn stop(&self, name: &str) {
        match self
            .active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        {
            Ok(previous) => {
                self.stopped.fetch_add(1, Ordering::SeqCst);
                trace!(sitter = %name, active = previous - 1, "Stopped active sitter");
            }
            Err(_) => error!(sitter = %name, "Sitter stopped with no active sitters"),
        }
    }

    /// Starts a babysitter and spawns its task.
    ///
    /// The guard is handed to the task, which stops it when it terminates.
    pub fn spawn<F, Fut>(self: &Arc<Self>, name: impl Into<String>, task: F)
    where
        F: FnOnce(SitterGuard) -> Fut,
        Fut: Future<Output = SitterOutcome> + Send + 'static,
    {
        let name = name.into();
        let guard = self.start(name.clone());
        let handle = tokio::spawn(task(guard));
        self.handles.lock().push((name, handle));
    }

    /// Returns the number of active babysitters.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Returns the number of babysitters started so far.
    #[must_use]
    pub fn started_count(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Returns the number of babysitters stopped so far.
    #[must_use]
    pub fn stopped_count(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Returns true when no babysitter is active.
    #[must_use]
    pub fn is_quiescent(&self) -> bool {
        self.active_count() == 0
    }

    /// Blocks until no babysitter is active, then joins the spawned tasks.
    ///
    /// The count is checked immediately and then every poll interval.
    pub async fn quit(&self) -> QuiescenceReport {
        debug!(active = self.active_count(), "Waiting for all sitters to stop");
        while !self.is_quiescent() {
            tokio::time::sleep(self.poll_interval).await;
        }

        let handles: Vec<_> = {
            let mut h = self.handles.lock();
            std::mem::take(&mut *h)
        };

        let mut report = QuiescenceReport::default();
        for (name, handle) in handles {
            match handle.await {
                Ok(outcome) => report.outcomes.push((name, outcome)),
                Err(join_error) => {
                    warn!(sitter = %name, error = %join_error, "Sitter task did not finish cleanly");
                    report.failures.push((name, join_error.to_string()));
                }
            }
        }

        report.started = self.started_count();
        report.stopped = self.stopped_count();
        debug!(started = report.started, stopped = report.stopped, "All sitters stopped");
        report
    }
}

impl Default for SitterTracker {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl std::fmt::Debug for SitterTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SitterTracker")
            .field("active", &self.active_count())
            .field("started", &self.started_count())
            .field("stopped", &self.stopped_count())
            .finish()
    }
}

/// Keeps one babysitter counted as active. Stops it exactly once, on
/// [`SitterGuard::stop`] or drop, including during a panic unwind.
#[derive(Debug)]
pub struct SitterGuard {
    tracker: Arc<SitterTracker>,
    name: String,
}

impl SitterGuard {
    /// Returns the babysitter's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stops the babysitter.
    pub fn stop(self) {}
}

impl Drop for SitterGuard {
    fn drop(&mut self) {
        self.tracker.stop(&self.name);
    }
}
