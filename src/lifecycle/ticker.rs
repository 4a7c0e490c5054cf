//! Self-stoppable periodic ticker

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::events::LifecycleEvent;

struct Running {
    /// Held while a tick is sent; cleared by `stop`
    active: Arc<Mutex<bool>>,
    task: JoinHandle<()>,
}

/// Emits [`LifecycleEvent::Tick`] once per period until stopped
#[derive(Default)]
pub struct Ticker {
    running: Option<Running>,
}

impl Ticker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start ticking. The first tick fires one full period after start.
    ///
    /// Returns false if the ticker was already running. Must be called from
    /// within a tokio runtime.
    pub fn start(&mut self, period: Duration, tx: UnboundedSender<LifecycleEvent>) -> bool {
        if self.is_running() {
            return false;
        }

        let active = Arc::new(Mutex::new(true));
        let flag = Arc::clone(&active);

        let task = tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticks.tick().await;

                let sent = {
                    let active = flag.lock();
                    *active && tx.send(LifecycleEvent::Tick { at: Utc::now() }).is_ok()
                };
                if !sent {
                    tracing::debug!("Lifecycle ticker exiting");
                    break;
                }
            }
        });

        tracing::info!("Lifecycle ticker started ({:?} period)", period);
        self.running = Some(Running { active, task });
        true
    }

    /// Stop ticking. Safe to call any number of times; once it returns no
    /// further ticks are sent.
    pub fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            *running.active.lock() = false;
            running.task.abort();
            tracing::info!("Lifecycle ticker stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|r| !r.task.is_finished())
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn test_ticks_until_stopped() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut ticker = Ticker::new();
        assert!(ticker.start(Duration::from_secs(60), tx));
        assert!(ticker.is_running());

        tokio::time::sleep(Duration::from_secs(121)).await;
        assert!(matches!(rx.recv().await, Some(LifecycleEvent::Tick { .. })));
        assert!(matches!(rx.recv().await, Some(LifecycleEvent::Tick { .. })));

        ticker.stop();
        ticker.stop();
        assert!(!ticker.is_running());

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut ticker = Ticker::new();
        assert!(ticker.start(Duration::from_secs(1), tx.clone()));
        assert!(!ticker.start(Duration::from_secs(1), tx));
        ticker.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_tick_before_first_period() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut ticker = Ticker::new();
        ticker.start(Duration::from_secs(60), tx);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(rx.try_recv().is_err());
        ticker.stop();
    }
}
