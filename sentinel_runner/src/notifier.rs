//! Default alert delivery: a log line, the terminal bell and an optional shell hook.

use async_trait::async_trait;
use log::warn;
use posture_sentinel::{Alert, Notifier, NotifyError};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

pub struct ConsoleNotifier {
    bell: bool,
    command: Option<String>,
}

impl ConsoleNotifier {
    pub fn new(bell: bool, command: Option<String>) -> Self {
        Self { bell, command }
    }
}

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn deliver(&self, alert: &Alert) -> Result<(), NotifyError> {
        warn!("{}", alert.message());

        if self.bell {
            let mut stdout = tokio::io::stdout();
            stdout
                .write_all(b"\x07")
                .await
                .map_err(|e| NotifyError(format!("terminal bell: {e}")))?;
            stdout
                .flush()
                .await
                .map_err(|e| NotifyError(format!("terminal bell: {e}")))?;
        }

        if let Some(command) = &self.command {
            run_hook(command, alert).await?;
        }
        Ok(())
    }
}

async fn run_hook(command: &str, alert: &Alert) -> Result<(), NotifyError> {
    let status = shell(command)
        .env("SENTINEL_ALERT_MESSAGE", alert.message())
        .env("SENTINEL_ALERT_STREAM", &alert.stream)
        .env("SENTINEL_ALERT_SEQUENCE", alert.sequence.to_string())
        .env("SENTINEL_ALERT_BAD_SECS", format!("{:.1}", alert.bad_for.as_secs_f64()))
        // A hook abandoned by the delivery timeout must not linger.
        .kill_on_drop(true)
        .status()
        .await
        .map_err(|e| NotifyError(format!("running `{command}`: {e}")))?;

    if status.success() {
        Ok(())
    } else {
        Err(NotifyError(format!("`{command}` exited with {status}")))
    }
}

#[cfg(windows)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

#[cfg(not(windows))]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}
