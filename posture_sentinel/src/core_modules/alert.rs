// THEORY:
// An alert crosses from the frame loop into the outside world here. The monitor
// decides *when* to alert and calls `AlertSink::notify` exactly once for that tick.
// What happens next (a sound, a log line, a push message) is somebody else's job
// and can take arbitrarily long, so `notify` must return immediately.
//
// `AlertDispatcher` is the standard sink: it hands the alert to a background task
// over a small bounded channel and returns. The task runs the slow `Notifier` with a
// delivery timeout. If deliveries back up and the queue is full, the new alert is
// dropped with a warning; the frame loop never waits on delivery.

use crate::error::NotifyError;
use async_trait::async_trait;
use log::{debug, warn};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const ALERT_QUEUE_DEPTH: usize = 4;

/// A bad-posture warning raised by a `PostureMonitor`.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    /// The stream the alert belongs to.
    pub stream: String,
    /// Session time at which the alert fired.
    pub at: Duration,
    /// How long posture had been continuously bad.
    pub bad_for: Duration,
    /// 1 for the first alert of the session, then counting up.
    pub sequence: u64,
}

impl Alert {
    pub fn message(&self) -> String {
        format!(
            "POSTURE WARNING! You've had bad posture for too long! ({}: {:.1}s)",
            self.stream,
            self.bad_for.as_secs_f64()
        )
    }
}

/// The synchronous hook the monitor calls. Implementations must not block.
pub trait AlertSink: Send + Sync {
    fn notify(&self, alert: &Alert);
}

impl<F> AlertSink for F
where
    F: Fn(&Alert) + Send + Sync,
{
    fn notify(&self, alert: &Alert) {
        self(alert)
    }
}

/// The slow side of alert delivery, run off the frame loop.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn deliver(&self, alert: &Alert) -> Result<(), NotifyError>;
}

/// Fire-and-forget `AlertSink` that feeds a background `Notifier` task.
#[derive(Debug, Clone)]
pub struct AlertDispatcher {
    tx: mpsc::Sender<Alert>,
}

impl AlertDispatcher {
    /// Spawns the delivery task. It exits once every dispatcher clone has been dropped.
    pub fn spawn<N: Notifier>(notifier: N, delivery_timeout: Duration) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Alert>(ALERT_QUEUE_DEPTH);

        let task = tokio::spawn(async move {
            while let Some(alert) = rx.recv().await {
                match tokio::time::timeout(delivery_timeout, notifier.deliver(&alert)).await {
                    Ok(Ok(())) => debug!("alert #{} delivered for {}", alert.sequence, alert.stream),
                    Ok(Err(e)) => warn!("alert #{} delivery failed: {}", alert.sequence, e),
                    Err(_) => warn!(
                        "alert #{} delivery timed out after {:?}",
                        alert.sequence, delivery_timeout
                    ),
                }
            }
        });

        (Self { tx }, task)
    }
}

impl AlertSink for AlertDispatcher {
    fn notify(&self, alert: &Alert) {
        if let Err(e) = self.tx.try_send(alert.clone()) {
            warn!("dropping alert #{} for {}: {}", alert.sequence, alert.stream, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn alert(sequence: u64) -> Alert {
        Alert {
            stream: "desk".into(),
            at: Duration::from_secs(7),
            bad_for: Duration::from_secs(7),
            sequence,
        }
    }

    struct SlowNotifier {
        delivered: Arc<AtomicUsize>,
        delay: Duration,
    }

    #[async_trait]
    impl Notifier for SlowNotifier {
        async fn deliver(&self, _alert: &Alert) -> Result<(), NotifyError> {
            tokio::time::sleep(self.delay).await;
            self.delivered.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn message_names_stream_and_duration() {
        assert_eq!(
            alert(1).message(),
            "POSTURE WARNING! You've had bad posture for too long! (desk: 7.0s)"
        );
    }

    #[test]
    fn closures_are_sinks() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let sink = move |_: &Alert| {
            seen.fetch_add(1, Ordering::SeqCst);
        };
        sink.notify(&alert(1));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn notify_does_not_wait_for_delivery() {
        let delivered = Arc::new(AtomicUsize::new(0));
        let (dispatcher, task) = AlertDispatcher::spawn(
            SlowNotifier { delivered: delivered.clone(), delay: Duration::from_secs(30) },
            Duration::from_secs(60),
        );

        let started = tokio::time::Instant::now();
        dispatcher.notify(&alert(1));
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(delivered.load(Ordering::SeqCst), 0);

        drop(dispatcher);
        task.await.unwrap();
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_delivery_is_abandoned_after_timeout() {
        let delivered = Arc::new(AtomicUsize::new(0));
        let (dispatcher, task) = AlertDispatcher::spawn(
            SlowNotifier { delivered: delivered.clone(), delay: Duration::from_secs(30) },
            Duration::from_secs(2),
        );
        dispatcher.notify(&alert(1));
        drop(dispatcher);
        task.await.unwrap();
        assert_eq!(delivered.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_drops_instead_of_blocking() {
        let delivered = Arc::new(AtomicUsize::new(0));
        let (dispatcher, task) = AlertDispatcher::spawn(
            SlowNotifier { delivered: delivered.clone(), delay: Duration::from_secs(1) },
            Duration::from_secs(5),
        );
        for sequence in 1..=20 {
            dispatcher.notify(&alert(sequence));
        }
        drop(dispatcher);
        task.await.unwrap();

        let count = delivered.load(Ordering::SeqCst);
        assert!(count >= 1);
        assert!(count <= ALERT_QUEUE_DEPTH + 1);
    }
}
