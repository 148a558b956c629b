//! Background task that periodically purges expired entries.

use crate::manager::CacheManager;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

pub(crate) struct Sweeper {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Sweeper {
    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signal the task and wait up to `timeout`. Returns false if the task had
    /// to be aborted.
    pub(crate) async fn stop(self, timeout: Duration) -> bool {
        let _ = self.shutdown_tx.send(true);
        let abort = self.handle.abort_handle();
        match tokio::time::timeout(timeout, self.handle).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!(error = %e, "Cache sweeper terminated abnormally");
                true
            }
            Err(_) => {
                abort.abort();
                false
            }
        }
    }
}

pub(crate) fn spawn(manager: Weak<CacheManager>, every: Duration) -> Sweeper {
    spawn_pass(every, move || manager.upgrade().map(|m| m.purge_expired()))
}

/// Run `pass` every `every` until stopped. A pass returning `None` ends the
/// task.
fn spawn_pass<F>(every: Duration, pass: F) -> Sweeper
where
    F: Fn() -> Option<usize> + Send + Sync + 'static,
{
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(run(Arc::new(pass), every, shutdown_rx));
    Sweeper {
        shutdown_tx,
        handle,
    }
}

async fn run<F>(pass: Arc<F>, every: Duration, mut shutdown_rx: watch::Receiver<bool>)
where
    F: Fn() -> Option<usize> + Send + Sync + 'static,
{
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // First tick completes immediately.
    interval.tick().await;

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = interval.tick() => {
                let pass = pass.clone();
                // Panics in a pass surface here as a JoinError.
                match tokio::task::spawn_blocking(move || pass()).await {
                    Ok(Some(purged)) => {
                        metrics::counter!("cache.sweep.runs").increment(1);
                        if purged > 0 {
                            info!(purged = purged, "Cache sweep removed expired entries");
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        metrics::counter!("cache.sweep.errors").increment(1);
                        error!(error = %e, "Cache sweep failed, will retry next cycle");
                    }
                }
            }
        }
    }

    debug!("Cache sweeper stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use domaingate_core::config::CacheConfig;
    use domaingate_core::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    async fn wait_until_empty(mgr: &CacheManager) -> usize {
        let mut remaining = mgr.total_entry_count();
        for _ in 0..40 {
            if remaining == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
            remaining = mgr.total_entry_count();
        }
        remaining
    }

    #[tokio::test]
    async fn test_sweeper_purges_without_reads() {
        let clock = ManualClock::starting_now();
        let config = CacheConfig {
            sweep_interval_secs: 1,
            ..CacheConfig::default()
        };
        let mgr = Arc::new(CacheManager::with_clock(&config, Arc::new(clock.clone())));
        mgr.set("a.com", "k", "v", Some(Duration::from_secs(1))).unwrap();
        mgr.start_sweeper();

        clock.advance_secs(5);
        assert_eq!(wait_until_empty(&mgr).await, 0);
        assert_eq!(mgr.stats("a.com").unwrap().total_expired, 1);

        mgr.shutdown().await;
    }

    #[tokio::test]
    async fn test_sweeper_exits_when_manager_dropped() {
        let config = CacheConfig {
            sweep_interval_secs: 1,
            ..CacheConfig::default()
        };
        let mgr = Arc::new(CacheManager::new(&config));
        let weak = Arc::downgrade(&mgr);
        let sweeper = super::spawn(weak, Duration::from_millis(10));
        drop(mgr);

        assert!(sweeper.stop(Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_panicking_pass_does_not_stop_sweeper() {
        let clock = ManualClock::starting_now();
        let mgr = Arc::new(CacheManager::with_clock(
            &CacheConfig::default(),
            Arc::new(clock.clone()),
        ));
        mgr.set("a.com", "k", "v", Some(Duration::from_secs(1))).unwrap();
        clock.advance_secs(5);

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let weak = Arc::downgrade(&mgr);
        let sweeper = spawn_pass(Duration::from_millis(20), move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("first sweep pass fails");
            }
            weak.upgrade().map(|m| m.purge_expired())
        });

        assert_eq!(wait_until_empty(&mgr).await, 0);
        assert!(calls.load(Ordering::SeqCst) >= 2);
        assert_eq!(mgr.stats("a.com").unwrap().total_expired, 1);
        assert!(sweeper.stop(Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_stop_gives_up_after_timeout() {
        let (shutdown_tx, _) = watch::channel(false);
        let sweeper = Sweeper {
            shutdown_tx,
            handle: tokio::spawn(std::future::pending::<()>()),
        };

        let started = Instant::now();
        assert!(!sweeper.stop(Duration::from_millis(200)).await);
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
