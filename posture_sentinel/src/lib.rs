// THEORY:
// This file is the public face of the `posture_sentinel` library. The crate watches a
// stream of pose landmarks and warns when someone has been slouching for too long.
//
// Consumers normally only touch the top layer: build a `SentinelConfig`, plug in a
// `FrameSource`, a `PoseEstimator` and an `AlertSink`, and run a `Session`. The
// `core_modules` stay public so each layer (geometry, classifier, monitor, connector)
// can be driven and tested on its own.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod session;

pub use config::{ClassifierConfig, ConnectorConfig, MonitorConfig, SentinelConfig};
pub use core_modules::alert::{Alert, AlertDispatcher, AlertSink, Notifier};
pub use core_modules::classifier::{PostureClassifier, PostureVerdict};
pub use core_modules::clock::{Clock, ManualClock, TokioClock};
pub use core_modules::connector::{FrameHandle, FrameSource, StreamConnector};
pub use core_modules::geometry::geometry::Point2D;
pub use core_modules::landmarks::{BodyPart, LandmarkSet, PoseEstimator};
pub use core_modules::monitor::{MonitorSnapshot, Posture, PostureMonitor, PostureState};
pub use core_modules::shutdown::{shutdown_channel, ShutdownSignal, ShutdownTrigger};
pub use error::{ConfigError, ConnectionError, NotifyError, OpenError, PoseError, ReadFailure};
pub use session::{ConnectorStatus, PoseReport, Session, TickOutcome, TickReport};
