use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Something that can get the user's attention.
pub trait AlertSink: Send + Sync {
    fn ring(&self);
}

/// Writes a terminal bell to stderr.
pub struct TerminalBell;

impl AlertSink for TerminalBell {
    fn ring(&self) {
        eprint!("\x07");
    }
}

/// Repeating alert for an unconfirmed urgent notice.
///
/// Every `interval` the loop asks `still_needed`; while it answers `true`
/// the sink rings, and the first `false` ends the loop. The loop also ends
/// on [`AlertLoop::stop`] and when the handle is dropped.
pub struct AlertLoop {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl AlertLoop {
    pub fn start<F, Fut>(interval: Duration, still_needed: F, sink: Arc<dyn AlertSink>) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut rings = 0u32;

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!(rings, "alert loop cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        if !still_needed().await {
                            info!(rings, "alert no longer needed");
                            break;
                        }
                        sink.ring();
                        rings += 1;
                    }
                }
            }
        });

        Self { cancel, handle }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for AlertLoop {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSink {
        rings: AtomicUsize,
    }

    impl AlertSink for CountingSink {
        fn ring(&self) {
            self.rings.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn always() -> impl Fn() -> std::future::Ready<bool> + Send + Sync + 'static {
        || std::future::ready(true)
    }

    async fn advance(secs: u64) {
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_rings_every_interval() {
        let sink = Arc::new(CountingSink::default());
        let alert = AlertLoop::start(Duration::from_secs(10), always(), sink.clone());

        advance(25).await;
        // Ticks at 0, 10 and 20 seconds.
        assert_eq!(sink.rings.load(Ordering::SeqCst), 3);
        assert!(alert.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_condition_clears() {
        let sink = Arc::new(CountingSink::default());
        let needed = Arc::new(AtomicBool::new(true));
        let flag = needed.clone();
        let alert = AlertLoop::start(
            Duration::from_secs(10),
            move || std::future::ready(flag.load(Ordering::SeqCst)),
            sink.clone(),
        );

        advance(15).await;
        assert_eq!(sink.rings.load(Ordering::SeqCst), 2);

        needed.store(false, Ordering::SeqCst);
        advance(30).await;
        assert_eq!(sink.rings.load(Ordering::SeqCst), 2);
        assert!(!alert.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels() {
        let sink = Arc::new(CountingSink::default());
        let alert = AlertLoop::start(Duration::from_secs(10), always(), sink.clone());
        advance(1).await;
        alert.stop();
        advance(60).await;

        assert_eq!(sink.rings.load(Ordering::SeqCst), 1);
        assert!(!alert.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels() {
        let sink = Arc::new(CountingSink::default());
        let alert = AlertLoop::start(Duration::from_secs(10), always(), sink.clone());
        advance(1).await;
        drop(alert);
        advance(60).await;

        assert_eq!(sink.rings.load(Ordering::SeqCst), 1);
        // The sink is only held by the test once the task has exited.
        assert_eq!(Arc::strong_count(&sink), 1);
    }
}
