use anyhow::{Context, bail};
use clap::Parser;
use futures::future::join_all;
use log::{error, info, warn};
use posture_sentinel::{AlertDispatcher, Session, TokioClock, shutdown_channel};
use posture_sentinel_status::{ControlHandle, LatestReports, ServerConfig, StatusBus, start_server};
use std::sync::Arc;
use std::time::Duration;

mod cli;
mod config;
mod display;
mod landmark_feed;
mod notifier;

use cli::Cli;
use config::RunnerConfig;
use landmark_feed::{FeedPose, LandmarkFeed};
use notifier::ConsoleNotifier;

const STATUS_BUS_CAPACITY: usize = 64;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // --- 1. Logging ---
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .parse_default_env()
        .format_timestamp_millis()
        .init();

    if let Some(path) = &cli.write_default_config {
        RunnerConfig::default().save(path)?;
        info!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    // --- 2. Configuration ---
    let mut config = match &cli.config {
        Some(path) => RunnerConfig::load(path)?,
        None => RunnerConfig::default(),
    };
    config.apply_cli(&cli);
    config.validate()?;

    // --- 3. Status, alerts and shutdown plumbing ---
    let (trigger, shutdown) = shutdown_channel();
    let bus = StatusBus::new(STATUS_BUS_CAPACITY);
    let latest = LatestReports::default();
    let tracker = latest.track(&bus);
    let console = display::spawn_console(&bus);

    let server = match config.status.bind_addr.clone() {
        Some(bind_addr) => Some(
            start_server(
                bus.clone(),
                latest.clone(),
                ServerConfig { bind_addr },
                ControlHandle { shutdown: trigger.clone() },
            )
            .await
            .context("starting the status server")?,
        ),
        None => None,
    };

    let (dispatcher, delivery) = AlertDispatcher::spawn(
        ConsoleNotifier::new(config.alerts.bell, config.alerts.command.clone()),
        config.alerts.delivery_timeout(),
    );

    let ctrl_c = {
        let trigger = trigger.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, shutting down...");
                trigger.trigger();
            }
        })
    };

    // --- 4. One session per stream, all running concurrently ---
    let sessions = config.sources.iter().map(|source| {
        let mut session = Session::new(
            source.clone(),
            &config.sentinel_for(source),
            LandmarkFeed::new(),
            FeedPose,
            Arc::new(dispatcher.clone()),
            TokioClock::new(),
            shutdown.clone(),
        )
        .with_reports(bus.sender());
        async move {
            let result = session.run().await;
            (session.stream().to_string(), result)
        }
    });
    let results = join_all(sessions).await;

    // --- 5. Teardown ---
    ctrl_c.abort();
    if let Some(server) = server {
        server.abort();
    }
    drop(dispatcher);
    if let Err(e) = delivery.await {
        warn!("alert delivery task ended abnormally: {e}");
    }
    drop(bus);
    let _ = tokio::time::timeout(Duration::from_secs(1), console).await;
    tracker.abort();

    let lost: Vec<String> = results
        .iter()
        .filter_map(|(stream, result)| result.as_ref().err().map(|e| format!("{stream}: {e}")))
        .collect();
    if lost.is_empty() {
        return Ok(());
    }
    for line in &lost {
        error!("stream lost: {line}");
    }
    bail!("{} of {} streams were lost", lost.len(), results.len())
}
