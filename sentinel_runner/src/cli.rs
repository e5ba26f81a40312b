use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "posture-sentinel",
    version,
    about = "Watches pose-landmark feeds and warns when bad posture lasts too long",
    long_about = "Connects to one or more newline-delimited JSON landmark feeds (tcp://host:port),\n\
                  classifies every frame and raises a throttled alert once bad posture has\n\
                  lasted longer than the warning threshold."
)]
pub struct Cli {
    /// Landmark feed to watch (tcp://host:port). Repeat or comma-separate for several streams.
    #[arg(short, long = "source", env = "SENTINEL_SOURCE", value_delimiter = ',')]
    pub sources: Vec<String>,

    /// TOML configuration file
    #[arg(short, long, env = "SENTINEL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Write a starter configuration file to PATH and exit
    #[arg(long, value_name = "PATH")]
    pub write_default_config: Option<PathBuf>,

    /// Seconds of continuous bad posture before the first alert
    #[arg(long, env = "SENTINEL_WARNING_THRESHOLD_SECS")]
    pub warning_threshold_secs: Option<f64>,

    /// Minimum seconds between two alerts
    #[arg(long, env = "SENTINEL_WARNING_COOLDOWN_SECS")]
    pub warning_cooldown_secs: Option<f64>,

    /// Neck inclination (degrees) at or above which posture is bad
    #[arg(long, env = "SENTINEL_NECK_THRESHOLD_DEG")]
    pub neck_threshold_deg: Option<f64>,

    /// Torso inclination (degrees) at or above which posture is bad
    #[arg(long, env = "SENTINEL_TORSO_THRESHOLD_DEG")]
    pub torso_threshold_deg: Option<f64>,

    /// Connection attempts per connect cycle
    #[arg(long, env = "SENTINEL_MAX_RETRIES")]
    pub max_retries: Option<u32>,

    /// Consecutive failed reads that force a reconnect
    #[arg(long, env = "SENTINEL_MAX_CONSECUTIVE_FAILURES")]
    pub max_consecutive_failures: Option<u32>,

    /// Upper bound on a single frame read, in milliseconds
    #[arg(long, env = "SENTINEL_READ_TIMEOUT_MS")]
    pub read_timeout_ms: Option<u64>,

    /// Shell command run on every alert (SENTINEL_ALERT_MESSAGE holds the text)
    #[arg(long, env = "SENTINEL_ALERT_COMMAND")]
    pub alert_command: Option<String>,

    /// Do not ring the terminal bell on alerts
    #[arg(long)]
    pub no_bell: bool,

    /// Serve live status over HTTP on this address (requires the `web` feature)
    #[arg(long, env = "SENTINEL_STATUS_ADDR")]
    pub status_addr: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sources_repeat_and_split_on_commas() {
        let cli = Cli::try_parse_from([
            "posture-sentinel",
            "--source",
            "tcp://desk:5000,tcp://sofa:5000",
            "-s",
            "tcp://kitchen:5000",
            "-vv",
        ])
        .unwrap();
        assert_eq!(
            cli.sources,
            vec!["tcp://desk:5000", "tcp://sofa:5000", "tcp://kitchen:5000"]
        );
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn numeric_overrides_are_parsed() {
        let cli = Cli::try_parse_from([
            "posture-sentinel",
            "--warning-threshold-secs",
            "3.5",
            "--max-retries",
            "2",
            "--no-bell",
        ])
        .unwrap();
        assert_eq!(cli.warning_threshold_secs, Some(3.5));
        assert_eq!(cli.max_retries, Some(2));
        assert!(cli.no_bell);
    }

    #[test]
    fn rejects_garbage_numbers() {
        assert!(Cli::try_parse_from(["posture-sentinel", "--max-retries", "many"]).is_err());
    }
}
