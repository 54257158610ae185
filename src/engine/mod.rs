//! Feature engines: independent polling loops over one session's gateway.
//!
//! Each engine owns its own timer and reentrancy guard; engines never
//! coordinate with each other beyond sharing the gateway, the clock, and
//! the session identity. A tick that fires while the previous tick of the
//! same engine is still running is dropped, not queued.

pub mod farm;
pub mod field;
pub mod friend;
pub mod limits;
pub mod task;
pub mod warehouse;

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Pause between pipeline steps inside one tick.
pub(crate) const STEP_DELAY: Duration = Duration::from_millis(500);
/// Pause between per-item calls inside one step.
pub(crate) const ITEM_DELAY: Duration = Duration::from_millis(300);
/// Pause between consecutive friend visits.
pub(crate) const VISIT_DELAY: Duration = Duration::from_millis(800);

/// Drive one engine's polling loop: an initial delay, then a fixed-period
/// tick until the session stops. Missed ticks are delayed, never bunched.
pub(crate) async fn run_loop<F, Fut>(
    start_delay: Duration,
    period: Duration,
    stop: CancellationToken,
    mut tick: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    tokio::select! {
        _ = stop.cancelled() => return,
        _ = tokio::time::sleep(start_delay) => {}
    }

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    interval.tick().await;

    loop {
        tick().await;
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = interval.tick() => {}
        }
    }
}

/// Reentrancy guard: at most one tick of an engine runs at a time.
pub(crate) struct TickGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> TickGuard<'a> {
    /// Take the guard, or `None` when the previous tick is still running.
    pub(crate) fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        if flag.swap(true, Ordering::SeqCst) {
            None
        } else {
            Some(Self { flag })
        }
    }
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_guard_excludes_overlap() {
        let flag = AtomicBool::new(false);
        let first = TickGuard::acquire(&flag);
        assert!(first.is_some());
        assert!(TickGuard::acquire(&flag).is_none());
        drop(first);
        assert!(TickGuard::acquire(&flag).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_stops_on_cancel() {
        let stop = CancellationToken::new();
        let count = std::sync::Arc::new(AtomicBool::new(false));

        let loop_count = count.clone();
        let loop_stop = stop.clone();
        let handle = tokio::spawn(run_loop(
            Duration::from_secs(1),
            Duration::from_secs(5),
            loop_stop,
            move || {
                let count = loop_count.clone();
                async move {
                    count.store(true, Ordering::SeqCst);
                }
            },
        ));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(count.load(Ordering::SeqCst));
        stop.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_cancel_before_start_skips_tick() {
        let stop = CancellationToken::new();
        stop.cancel();
        let ran = std::sync::Arc::new(AtomicBool::new(false));
        let tick_ran = ran.clone();
        run_loop(Duration::from_secs(1), Duration::from_secs(5), stop, move || {
            let ran = tick_ran.clone();
            async move {
                ran.store(true, Ordering::SeqCst);
            }
        })
        .await;
        assert!(!ran.load(Ordering::SeqCst));
    }
}
