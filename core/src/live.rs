use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

use crate::backend::TelemetrySource;
use crate::sample::TelemetrySample;
use crate::window::{AppendOutcome, SharedWindow};

const CHANNEL_DEPTH: usize = 64;

/// Running live update subscription. Dropping it tears the tasks down.
pub struct LiveFeed {
    subscriber: JoinHandle<()>,
    producer: Option<JoinHandle<()>>,
}

impl LiveFeed {
    pub fn stop(self) {
        drop(self);
    }

    pub fn is_running(&self) -> bool {
        !self.subscriber.is_finished()
    }
}

impl Drop for LiveFeed {
    fn drop(&mut self) {
        if let Some(producer) = &self.producer {
            producer.abort();
        }
        self.subscriber.abort();
    }
}

/// Appends every delivered sample to whatever the window holds at delivery time.
pub fn subscribe(window: SharedWindow, mut rx: mpsc::Receiver<TelemetrySample>) -> LiveFeed {
    let subscriber = tokio::spawn(async move {
        while let Some(sample) = rx.recv().await {
            let time = sample.time;
            match window.write().await.append(sample) {
                AppendOutcome::Appended { evicted } => {
                    trace!("live sample {} appended", time);
                    if let Some(old) = evicted {
                        trace!("evicted {}", old.time);
                    }
                }
                AppendOutcome::Buffered => debug!("live sample {} buffered until history loads", time),
                AppendOutcome::Rejected => {}
            }
        }
        debug!("live feed closed");
    });
    LiveFeed {
        subscriber,
        producer: None,
    }
}

/// Polls the latest sample and forwards only ones newer than the last forwarded.
/// Ends on session expiry or when nobody is listening.
pub fn spawn_poller(
    source: Arc<dyn TelemetrySource>,
    tx: mpsc::Sender<TelemetrySample>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last: Option<DateTime<Utc>> = None;
        loop {
            ticker.tick().await;
            match source.fetch_latest().await {
                Ok(Some(sample)) => {
                    if last.map_or(true, |t| sample.time > t) {
                        last = Some(sample.time);
                        if tx.send(sample).await.is_err() {
                            debug!("live subscriber gone, polling stopped");
                            break;
                        }
                    }
                }
                Ok(None) => {}
                Err(e) if e.is_session_expired() => {
                    warn!("live polling stopped: {}", e);
                    break;
                }
                Err(e) => warn!("live poll failed: {}", e),
            }
        }
    })
}

pub fn start_polling(window: SharedWindow, source: Arc<dyn TelemetrySource>, period: Duration) -> LiveFeed {
    let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
    let mut feed = subscribe(window, rx);
    feed.producer = Some(spawn_poller(source, tx, period));
    feed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBackend;
    use crate::sample::sample_at;
    use crate::window::TelemetryWindow;
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn hour(h: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + ChronoDuration::hours(h)
    }

    #[tokio::test]
    async fn handler_sees_window_replaced_after_subscription() {
        let window = TelemetryWindow::with_days(2).shared();
        let (tx, rx) = mpsc::channel(8);
        let feed = subscribe(window.clone(), rx);

        // Contents swapped after the subscription was set up.
        window.write().await.initialize(vec![sample_at(hour(0), 1.0), sample_at(hour(47), 2.0)]);

        tx.send(sample_at(hour(49), 3.0)).await.unwrap();
        drop(tx);
        while feed.is_running() {
            tokio::task::yield_now().await;
        }

        let times: Vec<_> = window.read().await.samples().map(|s| s.time).collect();
        assert_eq!(times, vec![hour(47), hour(49)]);
    }

    #[tokio::test]
    async fn early_samples_wait_for_history() {
        let window = TelemetryWindow::with_days(2).shared();
        let (tx, rx) = mpsc::channel(8);
        let feed = subscribe(window.clone(), rx);

        tx.send(sample_at(hour(3), 0.0)).await.unwrap();
        drop(tx);
        while feed.is_running() {
            tokio::task::yield_now().await;
        }
        assert!(window.read().await.is_empty());

        window.write().await.initialize(vec![sample_at(hour(2), 0.0)]);
        assert_eq!(window.read().await.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn poller_forwards_only_new_samples() {
        let backend = Arc::new(MockBackend::new());
        backend.set_latest(Some(sample_at(hour(1), 0.0)));
        let (tx, mut rx) = mpsc::channel(8);
        let poller = spawn_poller(backend.clone(), tx, Duration::from_secs(30));

        assert_eq!(rx.recv().await.unwrap().time, hour(1));
        tokio::time::sleep(Duration::from_secs(31)).await;
        backend.set_latest(Some(sample_at(hour(2), 0.0)));
        assert_eq!(rx.recv().await.unwrap().time, hour(2));
        poller.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn poller_stops_on_session_expiry() {
        let backend = Arc::new(MockBackend::new());
        backend.expire_session();
        let (tx, mut rx) = mpsc::channel(8);
        let poller = spawn_poller(backend, tx, Duration::from_secs(30));

        assert!(rx.recv().await.is_none());
        assert!(poller.await.is_ok());
    }
}
