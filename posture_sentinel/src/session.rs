// THEORY:
// The `session` module is the top-level API of the sentinel. A `Session` watches one
// stream from start to finish: it connects, then runs one sequential tick per frame
// until shutdown or an unrecoverable loss of the stream.
//
// Each tick runs the full stack in order:
// Stage 1: Acquisition    -> one bounded read through the `StreamConnector`.
// Stage 2: Pose           -> the external `PoseEstimator` turns the frame into landmarks.
// Stage 3: Classification -> the `PostureClassifier` produces a verdict.
// Stage 4: Temporal       -> the `PostureMonitor` updates its state and may alert.
// Stage 5: Report         -> a `TickReport` is published for display collaborators.
//
// Failures are sorted at the tick boundary. Read failures feed the consecutive
// failure policy. "No pose" and classification errors are reported and the monitor is
// left alone. Only a reconnect cycle that exhausts its retries ends the session with
// an error. A session owns all of its state, so running several streams just means
// running several sessions.

use crate::config::SentinelConfig;
use crate::core_modules::alert::AlertSink;
use crate::core_modules::classifier::{PostureClassifier, PostureVerdict};
use crate::core_modules::clock::Clock;
use crate::core_modules::connector::{
    ConnectionState, FailureAction, FrameOf, FrameSource, StreamConnector,
};
use crate::core_modules::landmarks::PoseEstimator;
use crate::core_modules::monitor::{MonitorSnapshot, PostureMonitor, PostureState};
use crate::core_modules::shutdown::ShutdownSignal;
use crate::error::{ConnectionError, ReadFailure};
use log::{debug, error, info, warn};
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Connection health as shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectorStatus {
    Connecting,
    Live,
    Retrying { failures: u32, max: u32 },
    Reconnecting,
    Disconnected,
    Stopped,
}

impl fmt::Display for ConnectorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectorStatus::Connecting => f.write_str("CONNECTING"),
            ConnectorStatus::Live => f.write_str("LIVE"),
            ConnectorStatus::Retrying { failures, max } => write!(f, "RETRYING {failures}/{max}"),
            ConnectorStatus::Reconnecting => f.write_str("RECONNECTING"),
            ConnectorStatus::Disconnected => f.write_str("DISCONNECTED"),
            ConnectorStatus::Stopped => f.write_str("STOPPED"),
        }
    }
}

impl Serialize for ConnectorStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// What happened on the pose side of a tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum PoseReport {
    /// The read failed; no frame reached the pose model.
    NoFrame,
    /// The pose model saw nobody. The monitor was not updated.
    NoPose,
    /// Landmarks were unusable. The monitor was not updated.
    ProcessingError(String),
    Classified(PostureVerdict),
}

impl PoseReport {
    pub fn status_line(&self) -> Option<String> {
        match self {
            PoseReport::NoFrame => None,
            PoseReport::NoPose => Some("No pose detected".to_string()),
            PoseReport::ProcessingError(_) => Some("Error processing pose".to_string()),
            PoseReport::Classified(verdict) => Some(verdict.angle_line()),
        }
    }
}

/// Everything a display collaborator needs for one tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickReport {
    pub stream: String,
    pub tick: u64,
    /// Session time of the tick, in seconds.
    #[serde(serialize_with = "secs")]
    pub at: Duration,
    pub connector: ConnectorStatus,
    pub pose: PoseReport,
    pub monitor: MonitorSnapshot,
}

fn secs<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64())
}

/// The result of a single `Session::tick`.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Processed(TickReport),
    ReadRetry { failures: u32 },
    Reconnected,
    Shutdown,
}

pub struct Session<S: FrameSource, P, C> {
    stream: String,
    connector: StreamConnector<S>,
    connection: ConnectionState<S::Handle>,
    estimator: P,
    classifier: PostureClassifier,
    monitor: PostureMonitor,
    clock: C,
    shutdown: ShutdownSignal,
    reports: Option<broadcast::Sender<TickReport>>,
    tick: u64,
}

impl<S, P, C> Session<S, P, C>
where
    S: FrameSource,
    P: PoseEstimator<FrameOf<S>>,
    C: Clock,
{
    pub fn new(
        stream: impl Into<String>,
        config: &SentinelConfig,
        source: S,
        estimator: P,
        alerts: Arc<dyn AlertSink>,
        clock: C,
        shutdown: ShutdownSignal,
    ) -> Self {
        let stream = stream.into();
        Self {
            connector: StreamConnector::new(
                source,
                config.source.clone(),
                config.connector.clone(),
                shutdown.clone(),
            ),
            connection: ConnectionState::new(),
            estimator,
            classifier: PostureClassifier::new(config.classifier.clone()),
            monitor: PostureMonitor::new(stream.clone(), &config.monitor, alerts),
            clock,
            shutdown,
            reports: None,
            tick: 0,
            stream,
        }
    }

    /// Publishes a `TickReport` for every tick on `reports`.
    pub fn with_reports(mut self, reports: broadcast::Sender<TickReport>) -> Self {
        self.reports = Some(reports);
        self
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    pub fn posture_state(&self) -> &PostureState {
        self.monitor.state()
    }

    pub fn consecutive_read_failures(&self) -> u32 {
        self.connection.consecutive_read_failures()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Runs until shutdown (`Ok`) or until the stream is lost for good (`Err`).
    pub async fn run(&mut self) -> Result<(), ConnectionError> {
        info!("[{}] Starting real-time posture analysis on {}", self.stream, self.connector.source_id());
        info!(
            "[{}] Warning will trigger after {:.1} seconds of bad posture",
            self.stream,
            self.monitor.warning_threshold().as_secs_f64()
        );

        let result = loop {
            match self.tick().await {
                Ok(TickOutcome::Shutdown) => break Ok(()),
                Ok(_) => {}
                Err(e) => {
                    error!("[{}] {}", self.stream, e);
                    self.publish_status(ConnectorStatus::Disconnected);
                    break Err(e);
                }
            }
        };

        self.release_handle().await;
        if result.is_ok() {
            self.publish_status(ConnectorStatus::Stopped);
        }
        info!("[{}] Posture analysis ended", self.stream);
        result
    }

    /// Runs one tick: connect if needed, read one frame and process it.
    pub async fn tick(&mut self) -> Result<TickOutcome, ConnectionError> {
        if self.shutdown.is_triggered() {
            return Ok(TickOutcome::Shutdown);
        }

        if !self.connection.is_connected() {
            self.publish_status(ConnectorStatus::Connecting);
            if !self.establish().await? {
                return Ok(TickOutcome::Shutdown);
            }
        }

        let Some(handle) = self.connection.handle_mut() else {
            return Ok(TickOutcome::Shutdown);
        };
        let read = tokio::select! {
            read = self.connector.read_frame(handle) => read,
            _ = self.shutdown.triggered() => return Ok(TickOutcome::Shutdown),
        };

        match read {
            Ok(frame) => {
                self.connection.record_success();
                Ok(TickOutcome::Processed(self.process(frame)))
            }
            Err(failure) => self.handle_read_failure(failure).await,
        }
    }

    /// Connects and installs the handle. `Ok(false)` means shutdown interrupted it.
    async fn establish(&mut self) -> Result<bool, ConnectionError> {
        match self.connector.connect().await {
            Ok(handle) => {
                self.connection.attach(handle);
                Ok(true)
            }
            Err(ConnectionError::Cancelled(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn handle_read_failure(&mut self, failure: ReadFailure) -> Result<TickOutcome, ConnectionError> {
        let max = self.connector.config().max_consecutive_failures;
        match self.connection.record_failure(max) {
            FailureAction::Retry { failures } => {
                warn!("[{}] Frame read failed ({}/{}): {}", self.stream, failures, max, failure);
                self.publish_status(ConnectorStatus::Retrying { failures, max });
                let pause = self.connector.config().read_retry_pause();
                if !self.shutdown.sleep(pause).await {
                    return Ok(TickOutcome::Shutdown);
                }
                Ok(TickOutcome::ReadRetry { failures })
            }
            FailureAction::Reconnect { failures } => {
                warn!(
                    "[{}] Frame read failed ({}/{}): {}. Too many failures, attempting to reconnect...",
                    self.stream, failures, max, failure
                );
                self.publish_status(ConnectorStatus::Reconnecting);
                self.release_handle().await;
                if !self.establish().await? {
                    return Ok(TickOutcome::Shutdown);
                }
                Ok(TickOutcome::Reconnected)
            }
        }
    }

    fn process(&mut self, frame: FrameOf<S>) -> TickReport {
        let now = self.clock.now();

        let (pose, monitor) = match self.estimator.estimate(&frame) {
            // No observation this tick: the monitor is deliberately not advanced or reset.
            None => (PoseReport::NoPose, self.monitor.snapshot(now)),
            Some(landmarks) => match self.classifier.classify(&landmarks) {
                Ok(verdict) => {
                    let snapshot = self.monitor.observe(verdict.is_good, now);
                    (PoseReport::Classified(verdict), snapshot)
                }
                Err(e) => {
                    warn!("[{}] Error processing pose landmarks: {}", self.stream, e);
                    (PoseReport::ProcessingError(e.to_string()), self.monitor.snapshot(now))
                }
            },
        };

        let report = self.report(now, ConnectorStatus::Live, pose, monitor);
        self.publish(report.clone());
        report
    }

    fn report(
        &mut self,
        at: Duration,
        connector: ConnectorStatus,
        pose: PoseReport,
        monitor: MonitorSnapshot,
    ) -> TickReport {
        self.tick += 1;
        TickReport {
            stream: self.stream.clone(),
            tick: self.tick,
            at,
            connector,
            pose,
            monitor,
        }
    }

    fn publish_status(&mut self, connector: ConnectorStatus) {
        if self.reports.is_none() {
            return;
        }
        let now = self.clock.now();
        let monitor = self.monitor.snapshot(now);
        let report = self.report(now, connector, PoseReport::NoFrame, monitor);
        self.publish(report);
    }

    fn publish(&self, report: TickReport) {
        debug!("[{}] tick {} {}", report.stream, report.tick, report.connector);
        if let Some(reports) = &self.reports {
            // No subscribers is fine; the display is optional.
            let _ = reports.send(report);
        }
    }

    async fn release_handle(&mut self) {
        if let Some(mut handle) = self.connection.detach() {
            self.connector.close(&mut handle).await;
        }
    }
}
