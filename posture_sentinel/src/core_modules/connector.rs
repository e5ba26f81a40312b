// THEORY:
// The `StreamConnector` owns the lifecycle of a frame source. It is the part of the
// sentinel that has to cope with the real world: cameras that are not up yet,
// networks that drop, streams that open but never deliver a frame.
//
// Key architectural principles:
// 1.  **One connect cycle owns all its retries**: `connect` makes up to `max_retries`
//     attempts, sleeping `backoff_base * 2^k` after failed attempt `k` (no sleep after
//     the last one). Callers never retry a failed cycle themselves.
// 2.  **Open is not enough**: an attempt only succeeds once a probe frame has been
//     read. A handle that opens but cannot produce a frame is closed before the next
//     attempt.
// 3.  **Nothing blocks forever**: opens, probes and steady-state reads are bounded by
//     `read_timeout`, and every wait races the shutdown signal.
// 4.  **Steady-state policy is counted, not guessed**: `ConnectionState` tracks
//     consecutive read failures. Below `max_consecutive_failures` the loop pauses and
//     reads the same handle again; at the threshold the handle is closed and a fresh
//     connect cycle starts.

use crate::config::ConnectorConfig;
use crate::core_modules::shutdown::ShutdownSignal;
use crate::error::{ConnectionError, OpenError, ReadFailure};
use async_trait::async_trait;
use log::{error, info, warn};
use std::time::Duration;

/// Opens handles onto a named stream source (a camera URL, a socket address, ...).
#[async_trait]
pub trait FrameSource: Send + Sync {
    type Handle: FrameHandle;

    async fn open(&self, source_id: &str) -> Result<Self::Handle, OpenError>;
}

/// One live connection to a stream.
#[async_trait]
pub trait FrameHandle: Send {
    type Frame: Send;

    /// One read. May block; the connector bounds it with the read timeout.
    async fn read_frame(&mut self) -> Result<Self::Frame, ReadFailure>;

    /// Releases everything tied to the handle. Calling it twice must be harmless.
    async fn close(&mut self);
}

pub type FrameOf<S> = <<S as FrameSource>::Handle as FrameHandle>::Frame;

pub struct StreamConnector<S: FrameSource> {
    source: S,
    source_id: String,
    config: ConnectorConfig,
    shutdown: ShutdownSignal,
}

impl<S: FrameSource> StreamConnector<S> {
    pub fn new(
        source: S,
        source_id: impl Into<String>,
        config: ConnectorConfig,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            source,
            source_id: source_id.into(),
            config,
            shutdown,
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    /// Runs one full connect cycle with exponential backoff.
    pub async fn connect(&mut self) -> Result<S::Handle, ConnectionError> {
        let max_retries = self.config.max_retries;
        let read_timeout = self.config.read_timeout();
        let mut last_error = OpenError::Unavailable("no attempt was made".to_string());

        for attempt in 0..max_retries {
            if self.shutdown.is_triggered() {
                return Err(ConnectionError::Cancelled(self.source_id.clone()));
            }
            info!(
                "Connecting to {}... (attempt {}/{})",
                self.source_id,
                attempt + 1,
                max_retries
            );

            let result =
                open_and_probe(&self.source, &self.source_id, read_timeout, &mut self.shutdown).await;

            match result {
                Ok(None) => return Err(ConnectionError::Cancelled(self.source_id.clone())),
                Ok(Some(handle)) => {
                    info!("Successfully connected to {}", self.source_id);
                    return Ok(handle);
                }
                Err(e) => {
                    warn!("Connection attempt {} to {} failed: {}", attempt + 1, self.source_id, e);
                    last_error = e;
                }
            }

            if attempt + 1 < max_retries {
                let wait = self.config.backoff_delay(attempt);
                info!("Retrying in {:.1} seconds...", wait.as_secs_f64());
                if !self.shutdown.sleep(wait).await {
                    return Err(ConnectionError::Cancelled(self.source_id.clone()));
                }
            }
        }

        error!("Failed to connect to {} after {} attempts", self.source_id, max_retries);
        Err(ConnectionError::Exhausted {
            source_id: self.source_id.clone(),
            attempts: max_retries,
            last: last_error,
        })
    }

    /// One bounded read on an established handle.
    pub async fn read_frame(&self, handle: &mut S::Handle) -> Result<FrameOf<S>, ReadFailure> {
        bounded_read(handle, self.config.read_timeout()).await
    }

    pub async fn close(&self, handle: &mut S::Handle) {
        handle.close().await;
    }
}

async fn bounded_read<H: FrameHandle>(handle: &mut H, limit: Duration) -> Result<H::Frame, ReadFailure> {
    match tokio::time::timeout(limit, handle.read_frame()).await {
        Ok(result) => result,
        Err(_) => Err(ReadFailure::Timeout(limit)),
    }
}

/// `Ok(None)` when shutdown won the race. A handle that already opened is closed first.
async fn open_and_probe<S: FrameSource>(
    source: &S,
    source_id: &str,
    limit: Duration,
    shutdown: &mut ShutdownSignal,
) -> Result<Option<S::Handle>, OpenError> {
    let opened = tokio::select! {
        opened = tokio::time::timeout(limit, source.open(source_id)) => opened,
        _ = shutdown.triggered() => return Ok(None),
    };
    let mut handle = match opened {
        Ok(opened) => opened?,
        Err(_) => return Err(OpenError::OpenTimeout(limit)),
    };

    // The probe frame only proves the stream is alive; it is not analysed.
    let probe = tokio::select! {
        probe = bounded_read(&mut handle, limit) => Some(probe),
        _ = shutdown.triggered() => None,
    };
    match probe {
        Some(Ok(_)) => Ok(Some(handle)),
        Some(Err(failure)) => {
            handle.close().await;
            Err(OpenError::NoProbeFrame(failure))
        }
        None => {
            handle.close().await;
            Ok(None)
        }
    }
}

/// What the loop should do after a failed read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// Pause briefly and read the same handle again.
    Retry { failures: u32 },
    /// Close the handle and run a fresh connect cycle.
    Reconnect { failures: u32 },
}

/// The connector-side state of one stream: the live handle and the failure count.
pub struct ConnectionState<H> {
    handle: Option<H>,
    consecutive_read_failures: u32,
}

impl<H: FrameHandle> ConnectionState<H> {
    pub fn new() -> Self {
        Self {
            handle: None,
            consecutive_read_failures: 0,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.handle.is_some()
    }

    pub fn consecutive_read_failures(&self) -> u32 {
        self.consecutive_read_failures
    }

    pub fn handle_mut(&mut self) -> Option<&mut H> {
        self.handle.as_mut()
    }

    /// Installs a freshly connected handle and resets the failure counter.
    pub fn attach(&mut self, handle: H) {
        self.handle = Some(handle);
        self.consecutive_read_failures = 0;
    }

    /// Takes the handle out so it can be closed. The state is left disconnected.
    pub fn detach(&mut self) -> Option<H> {
        self.handle.take()
    }

    pub fn record_success(&mut self) {
        self.consecutive_read_failures = 0;
    }

    pub fn record_failure(&mut self, max_consecutive_failures: u32) -> FailureAction {
        self.consecutive_read_failures = self.consecutive_read_failures.saturating_add(1);
        let failures = self.consecutive_read_failures;
        if failures >= max_consecutive_failures {
            FailureAction::Reconnect { failures }
        } else {
            FailureAction::Retry { failures }
        }
    }
}

impl<H: FrameHandle> Default for ConnectionState<H> {
    fn default() -> Self {
        Self::new()
    }
}
