//! Periodic background task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Default period of the pattern analysis.
pub const DEFAULT_ANALYSIS_INTERVAL: Duration = Duration::from_secs(30);

/// Runs a callback on a fixed period until stopped.
///
/// Each start creates a fresh cancellation token, so stop() + start()
/// works. Dropping the task stops it.
pub struct IntervalTask {
    name: &'static str,
    running: AtomicBool,
    cancel_token: Mutex<CancellationToken>,
}

impl IntervalTask {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            running: AtomicBool::new(false),
            cancel_token: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Spawn the loop on the current tokio runtime. The first tick fires one
    /// full `period` after starting.
    ///
    /// Returns false if already running or if called outside a runtime.
    pub fn start<F>(&self, period: Duration, tick: F) -> bool
    where
        F: Fn() + Send + Sync + 'static,
    {
        if self.is_running() {
            tracing::warn!(task = self.name, "Interval task already running");
            return false;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(task = self.name, "No tokio runtime, interval task not started");
            return false;
        };

        let token = CancellationToken::new();
        let cancelled = token.child_token();
        *self
            .cancel_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = token;

        self.running.store(true, Ordering::Release);
        let name = self.name;

        runtime.spawn(async move {
            tracing::info!(task = name, period_ms = period.as_millis() as u64, "Interval task started");
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut ticks = 0u64;

            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    _ = interval.tick() => {
                        ticks += 1;
                        tick();
                    }
                }
            }

            tracing::info!(task = name, ticks, "Interval task stopped");
        });
        true
    }

    pub fn stop(&self) {
        self.cancel_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
        self.running.store(false, Ordering::Release);
    }
}

impl Drop for IntervalTask {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for IntervalTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntervalTask")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        (count, move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_on_period() {
        let task = IntervalTask::new("test");
        let (count, tick) = counter();
        assert!(task.start(Duration::from_secs(30), tick));
        assert!(task.is_running());

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(66)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_future_ticks() {
        let task = IntervalTask::new("test");
        let (count, tick) = counter();
        task.start(Duration::from_secs(10), tick);

        tokio::time::sleep(Duration::from_secs(15)).await;
        task.stop();
        assert!(!task.is_running());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_stop() {
        let task = IntervalTask::new("test");
        let (count, tick) = counter();
        let tick = Arc::new(tick);

        let t = Arc::clone(&tick);
        task.start(Duration::from_secs(10), move || t());
        assert!(!task.start(Duration::from_secs(10), || {}));
        task.stop();

        let t = Arc::clone(&tick);
        assert!(task.start(Duration::from_secs(10), move || t()));
        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_start_outside_runtime_is_refused() {
        let task = IntervalTask::new("test");
        assert!(!task.start(Duration::from_secs(1), || {}));
        assert!(!task.is_running());
    }
}
