// THEORY:
// Shutdown is a single `watch` flag. The trigger side lives with whoever owns the
// process (the runner's Ctrl-C handler); every session, connector and pause holds a
// cheap `ShutdownSignal` clone. Anything that can wait (backoff sleeps, the short
// read-retry pause, a blocked read) races against the signal, so the loop stops
// promptly instead of at the next tick boundary.

use std::time::Duration;
use tokio::sync::watch;

/// Fires the shutdown flag for every linked `ShutdownSignal`.
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, ShutdownSignal { rx })
}

impl ShutdownSignal {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been requested. Never resolves if the trigger was dropped unfired.
    pub async fn triggered(&mut self) {
        if self.rx.wait_for(|stop| *stop).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Sleeps for `duration` unless shutdown comes first. Returns `false` when interrupted.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        if self.is_triggered() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.triggered() => false,
        }
    }
}
