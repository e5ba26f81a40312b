// THEORY:
// The console renderer is a status-bus subscriber. Frames arrive many times a second,
// so a full status line for every tick goes to `debug!`; `info!` only gets a line
// when something a person would care about changes: the connection state, the
// posture, the kind of pose result, or an alert firing.

use log::{debug, info};
use posture_sentinel::{PoseReport, TickReport};
use posture_sentinel_status::StatusBus;
use std::collections::HashMap;
use std::mem;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// `[desk] LIVE | Neck : 20  Torso : 5 | 30 Aligned | Good Posture`
pub fn render(report: &TickReport) -> String {
    let mut parts = vec![format!("[{}] {}", report.stream, report.connector)];
    if let Some(pose) = report.pose.status_line() {
        parts.push(pose);
    }
    if let PoseReport::Classified(verdict) = &report.pose {
        parts.push(verdict.alignment_line());
    }
    if report.pose != PoseReport::NoFrame {
        parts.push(report.monitor.status_line());
    }
    parts.join(" | ")
}

fn is_notable(previous: Option<&TickReport>, next: &TickReport) -> bool {
    let Some(previous) = previous else {
        return true;
    };
    next.monitor.alert_fired
        || previous.connector != next.connector
        || previous.monitor.posture != next.monitor.posture
        || mem::discriminant(&previous.pose) != mem::discriminant(&next.pose)
}

pub fn spawn_console(bus: &StatusBus) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        let mut last: HashMap<String, TickReport> = HashMap::new();
        loop {
            match rx.recv().await {
                Ok(report) => {
                    let line = render(&report);
                    if is_notable(last.get(&report.stream), &report) {
                        info!("{line}");
                    } else {
                        debug!("{line}");
                    }
                    last.insert(report.stream.clone(), report);
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!("console skipped {skipped} status reports");
                    continue;
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use posture_sentinel::{ConnectorStatus, MonitorSnapshot, Posture, PostureVerdict};
    use std::time::Duration;

    fn report(connector: ConnectorStatus, pose: PoseReport, monitor: MonitorSnapshot) -> TickReport {
        TickReport {
            stream: "desk".into(),
            tick: 1,
            at: Duration::from_secs(1),
            connector,
            pose,
            monitor,
        }
    }

    fn good_monitor() -> MonitorSnapshot {
        MonitorSnapshot {
            posture: Posture::Good,
            bad_duration: Duration::ZERO,
            until_threshold: None,
            until_next_alert: None,
            alert_fired: false,
            alerts_sent: 0,
        }
    }

    fn bad_monitor(bad_secs: u64) -> MonitorSnapshot {
        MonitorSnapshot {
            posture: Posture::Bad,
            bad_duration: Duration::from_secs(bad_secs),
            until_threshold: Some(Duration::from_secs(7u64.saturating_sub(bad_secs))),
            until_next_alert: Some(Duration::from_secs(7u64.saturating_sub(bad_secs))),
            alert_fired: false,
            alerts_sent: 0,
        }
    }

    fn verdict(is_good: bool) -> PostureVerdict {
        PostureVerdict {
            neck_angle: 20.7,
            torso_angle: 5.2,
            is_good,
            alignment_offset: 30.0,
            is_aligned: true,
        }
    }

    #[test]
    fn renders_a_classified_frame() {
        let line = render(&report(
            ConnectorStatus::Live,
            PoseReport::Classified(verdict(true)),
            good_monitor(),
        ));
        assert_eq!(line, "[desk] LIVE | Neck : 20  Torso : 5 | 30 Aligned | Good Posture");
    }

    #[test]
    fn renders_connection_only_reports() {
        let line = render(&report(
            ConnectorStatus::Retrying { failures: 2, max: 10 },
            PoseReport::NoFrame,
            good_monitor(),
        ));
        assert_eq!(line, "[desk] RETRYING 2/10");
    }

    #[test]
    fn renders_no_pose_with_running_timer() {
        let line = render(&report(ConnectorStatus::Live, PoseReport::NoPose, bad_monitor(3)));
        assert_eq!(line, "[desk] LIVE | No pose detected | Bad Posture: 3.0s (Warning in 4.0s)");
    }

    #[test]
    fn only_meaningful_changes_are_notable() {
        let first = report(ConnectorStatus::Live, PoseReport::Classified(verdict(false)), bad_monitor(1));
        let later = report(ConnectorStatus::Live, PoseReport::Classified(verdict(false)), bad_monitor(2));
        assert!(is_notable(None, &first));
        assert!(!is_notable(Some(&first), &later));

        let mut alert = later.clone();
        alert.monitor.alert_fired = true;
        assert!(is_notable(Some(&first), &alert));

        let lost = report(ConnectorStatus::Reconnecting, PoseReport::NoFrame, bad_monitor(2));
        assert!(is_notable(Some(&first), &lost));
    }
}
