//! Background task that periodically removes expired entries

use std::sync::Weak;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

/// Something the sweeper can run an eviction pass over
pub(crate) trait Sweep: Send + Sync + 'static {
    /// Remove expired entries, returning how many were removed
    fn sweep(&self) -> usize;
}

/// Handle to a running sweep task
///
/// The task stops when `stop` is called, when the handle is dropped, or when
/// the swept target has been dropped.
pub(crate) struct Sweeper {
    stop_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl Sweeper {
    /// Spawn a sweep task on the current tokio runtime.
    ///
    /// Returns `None` when called outside a runtime; the cache then relies on
    /// lazy expiry and explicit `delete_expired` calls.
    pub(crate) fn spawn<S: Sweep>(target: Weak<S>, every: Duration) -> Option<Self> {
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!("No tokio runtime available, background sweep disabled");
                return None;
            }
        };

        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let handle = runtime.spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            debug!(interval = ?every, "Cache sweeper started");

            loop {
                tokio::select! {
                    // Fires on an explicit stop and when the sender is dropped
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        let Some(target) = target.upgrade() else {
                            break;
                        };
                        let removed = target.sweep();
                        if removed > 0 {
                            debug!(removed, "Swept expired cache entries");
                        }
                    }
                }
            }

            debug!("Cache sweeper stopped");
        });

        Some(Self {
            stop_tx: Some(stop_tx),
            handle,
        })
    }

    /// Signal the task to stop after its current pass
    pub(crate) fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct CountingTarget {
        passes: AtomicUsize,
    }

    impl Sweep for CountingTarget {
        fn sweep(&self) -> usize {
            self.passes.fetch_add(1, Ordering::Relaxed);
            0
        }
    }

    #[test]
    fn test_spawn_outside_runtime() {
        let target = Arc::new(CountingTarget::default());
        assert!(Sweeper::spawn(Arc::downgrade(&target), Duration::from_millis(5)).is_none());
    }

    #[tokio::test]
    async fn test_sweeps_periodically() {
        let target = Arc::new(CountingTarget::default());
        let _sweeper = Sweeper::spawn(Arc::downgrade(&target), Duration::from_millis(5)).unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(target.passes.load(Ordering::Relaxed) >= 2);
    }

    #[tokio::test]
    async fn test_stop_ends_task() {
        let target = Arc::new(CountingTarget::default());
        let mut sweeper =
            Sweeper::spawn(Arc::downgrade(&target), Duration::from_millis(5)).unwrap();
        assert!(sweeper.is_running());

        sweeper.stop();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!sweeper.is_running());

        let passes = target.passes.load(Ordering::Relaxed);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(target.passes.load(Ordering::Relaxed), passes);
    }

    #[tokio::test]
    async fn test_stops_when_target_dropped() {
        let target = Arc::new(CountingTarget::default());
        let sweeper = Sweeper::spawn(Arc::downgrade(&target), Duration::from_millis(5)).unwrap();

        drop(target);
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(!sweeper.is_running());
    }
}
