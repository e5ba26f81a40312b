// THEORY:
// The `PostureMonitor` is the temporal half of the sentinel. The classifier says
// whether a single frame looks good or bad; the monitor decides whether that has gone
// on long enough to matter. It is a two-state machine (GOOD, BAD) with two timers:
//
// 1.  **Hysteresis**: entering BAD starts a clock (`bad_since`). An alert is only
//     possible once posture has been *continuously* bad for `warning_threshold`. Any
//     good frame drops back to GOOD and clears the clock, so the next bad episode
//     starts from zero. Momentary misclassifications never alert.
// 2.  **Cooldown**: after an alert, the next one waits at least `warning_cooldown`,
//     measured from the previous alert (not from the start of the episode). A long
//     slouch therefore produces an alert at the threshold and then one per cooldown.
//
// Timestamps are supplied by the caller, which keeps the machine deterministic and
// lets tests replay any sequence of verdicts. Frames without a pose are not fed in at
// all: the acquisition loop skips `observe` for them, so they neither extend nor
// reset a bad episode.

use crate::config::MonitorConfig;
use crate::core_modules::alert::{Alert, AlertSink};
use log::{debug, info};
use serde::{Serialize, Serializer};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Posture {
    Good,
    Bad,
}

/// The monitor's persistent state. `Bad` holds exactly when `bad_since` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PostureState {
    bad_since: Option<Duration>,
    /// `None` stands for "never alerted" (minus infinity).
    last_alert_at: Option<Duration>,
}

impl PostureState {
    pub fn current(&self) -> Posture {
        match self.bad_since {
            Some(_) => Posture::Bad,
            None => Posture::Good,
        }
    }

    pub fn bad_since(&self) -> Option<Duration> {
        self.bad_since
    }

    pub fn last_alert_at(&self) -> Option<Duration> {
        self.last_alert_at
    }
}

/// What the display layer needs to know about the monitor after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MonitorSnapshot {
    pub posture: Posture,
    /// Elapsed continuous bad posture. Zero while good.
    #[serde(serialize_with = "secs")]
    pub bad_duration: Duration,
    /// Time left before the warning threshold is reached. `None` while good.
    #[serde(serialize_with = "opt_secs")]
    pub until_threshold: Option<Duration>,
    /// Earliest time the next alert could fire if posture stays bad. `None` while good.
    #[serde(serialize_with = "opt_secs")]
    pub until_next_alert: Option<Duration>,
    /// An alert fired on this very tick.
    pub alert_fired: bool,
    pub alerts_sent: u64,
}

impl MonitorSnapshot {
    /// The bottom-of-screen status text.
    pub fn status_line(&self) -> String {
        match (self.posture, self.until_threshold) {
            (Posture::Good, _) => "Good Posture".to_string(),
            (Posture::Bad, Some(remaining)) if !remaining.is_zero() => format!(
                "Bad Posture: {:.1}s (Warning in {:.1}s)",
                self.bad_duration.as_secs_f64(),
                remaining.as_secs_f64()
            ),
            (Posture::Bad, _) => format!(
                "BAD POSTURE WARNING! {:.1}s",
                self.bad_duration.as_secs_f64()
            ),
        }
    }
}

fn secs<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64())
}

fn opt_secs<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(d) => serializer.serialize_some(&d.as_secs_f64()),
        None => serializer.serialize_none(),
    }
}

pub struct PostureMonitor {
    stream: String,
    warning_threshold: Duration,
    warning_cooldown: Duration,
    state: PostureState,
    alerts_sent: u64,
    sink: Arc<dyn AlertSink>,
}

impl PostureMonitor {
    pub fn new(stream: impl Into<String>, config: &MonitorConfig, sink: Arc<dyn AlertSink>) -> Self {
        Self {
            stream: stream.into(),
            warning_threshold: config.warning_threshold(),
            warning_cooldown: config.warning_cooldown(),
            state: PostureState::default(),
            alerts_sent: 0,
            sink,
        }
    }

    pub fn state(&self) -> &PostureState {
        &self.state
    }

    pub fn warning_threshold(&self) -> Duration {
        self.warning_threshold
    }

    /// Feeds one classified frame into the state machine.
    pub fn observe(&mut self, is_good: bool, now: Duration) -> MonitorSnapshot {
        let mut alert_fired = false;

        match (self.state.bad_since, is_good) {
            (None, true) => {}
            (None, false) => {
                info!("[{}] bad posture detected, timer started", self.stream);
                self.state.bad_since = Some(now);
            }
            (Some(since), true) => {
                info!(
                    "[{}] good posture restored after {:.1}s",
                    self.stream,
                    now.saturating_sub(since).as_secs_f64()
                );
                self.state.bad_since = None;
            }
            (Some(since), false) => {
                let bad_for = now.saturating_sub(since);
                if bad_for >= self.warning_threshold && self.cooldown_elapsed(now) {
                    self.state.last_alert_at = Some(now);
                    self.alerts_sent += 1;
                    let alert = Alert {
                        stream: self.stream.clone(),
                        at: now,
                        bad_for,
                        sequence: self.alerts_sent,
                    };
                    info!("[{}] {}", self.stream, alert.message());
                    self.sink.notify(&alert);
                    alert_fired = true;
                }
            }
        }

        let snapshot = MonitorSnapshot {
            alert_fired,
            ..self.snapshot(now)
        };
        debug!("[{}] {}", self.stream, snapshot.status_line());
        snapshot
    }

    /// Reads the display state at `now` without changing anything.
    pub fn snapshot(&self, now: Duration) -> MonitorSnapshot {
        let Some(since) = self.state.bad_since else {
            return MonitorSnapshot {
                posture: Posture::Good,
                bad_duration: Duration::ZERO,
                until_threshold: None,
                until_next_alert: None,
                alert_fired: false,
                alerts_sent: self.alerts_sent,
            };
        };

        let bad_duration = now.saturating_sub(since);
        let until_threshold = self.warning_threshold.saturating_sub(bad_duration);
        let until_cooldown = match self.state.last_alert_at {
            Some(last) => last.saturating_add(self.warning_cooldown).saturating_sub(now),
            None => Duration::ZERO,
        };

        MonitorSnapshot {
            posture: Posture::Bad,
            bad_duration,
            until_threshold: Some(until_threshold),
            until_next_alert: Some(until_threshold.max(until_cooldown)),
            alert_fired: false,
            alerts_sent: self.alerts_sent,
        }
    }

    /// `now` must be strictly after the previous alert, which also caps alerts at one per timestamp.
    fn cooldown_elapsed(&self, now: Duration) -> bool {
        match self.state.last_alert_at {
            None => true,
            Some(last) => now > last && now - last >= self.warning_cooldown,
        }
    }
}
