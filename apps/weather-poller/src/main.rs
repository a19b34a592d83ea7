use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use weather_poller::cli;
use weather_poller::config::Config;
use weather_poller::console::select_input_source;
use weather_poller::export::Exporter;
use weather_poller::fetch::OpenMeteoClient;
use weather_poller::listener::CommandListener;
use weather_poller::scheduler::PollScheduler;
use weather_poller::shutdown::{forward_termination_signals, ShutdownCoordinator};
use weather_poller::store::ReadingStore;

fn init_tracing() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,weather_poller=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_names(true)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();
    let config = Config::from_env()?.with_args(&args)?;
    init_tracing()?;

    // The only fatal condition once configuration is valid.
    let store = Arc::new(ReadingStore::open(&config.database_path).with_context(|| {
        format!(
            "failed to open reading store at {}",
            config.database_path.display()
        )
    })?);
    tracing::info!(
        store = store.location(),
        latitude = config.latitude,
        longitude = config.longitude,
        timezone = config.timezone.name(),
        fetch_plan = %config.fetch_plan,
        "weather-poller starting"
    );

    let shutdown = ShutdownCoordinator::new();
    let signals = tokio::spawn(forward_termination_signals(shutdown.clone()));

    let http = reqwest::Client::builder()
        .user_agent(concat!("weather-poller/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;
    let source = OpenMeteoClient::new(http, config.source());
    let scheduler = PollScheduler::new(source, store.clone(), config.backoff(), shutdown.clone());
    let scheduler_handle = tokio::spawn(scheduler.run());

    let listener = CommandListener::new(
        select_input_source(config.input_mode),
        Exporter::new(store.clone(), config.export_path.clone()),
        config.export_limit,
        shutdown.clone(),
        config.input_poll_slice,
    );
    let listener_handle = match listener.spawn() {
        Ok(handle) => handle,
        Err(err) => {
            shutdown.signal_shutdown();
            let _ = scheduler_handle.await;
            return Err(err).context("failed to spawn command listener");
        }
    };

    match scheduler_handle.await {
        Ok(report) => tracing::info!(
            cycles = report.cycles,
            successes = report.successes,
            failures = report.failures,
            "scheduler finished"
        ),
        Err(err) => {
            tracing::error!(error = %err, "scheduler task failed");
            shutdown.signal_shutdown();
        }
    }

    match tokio::task::spawn_blocking(move || listener_handle.join()).await {
        Ok(Ok(report)) => tracing::info!(
            exports = report.exports,
            failed_exports = report.failed_exports,
            rejected_inputs = report.rejected_inputs,
            "command listener finished"
        ),
        Ok(Err(_)) => tracing::error!("command listener panicked"),
        Err(err) => tracing::error!(error = %err, "failed to join command listener"),
    }

    if let Err(err) = signals.await {
        tracing::warn!(error = %err, "signal task failed");
    }

    tracing::info!("all workers stopped");
    Ok(())
}
