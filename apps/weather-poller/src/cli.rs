use crate::console::InputMode;
use clap::Parser;
use std::path::PathBuf;

/// Command-line overrides; anything unset falls back to `WEATHER_*` env vars.
#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "weather-poller",
    version,
    about = "Poll Open-Meteo, store readings in SQLite, export the latest to XLSX"
)]
pub struct Args {
    #[arg(long)]
    pub database: Option<PathBuf>,
    #[arg(long)]
    pub export_path: Option<PathBuf>,
    #[arg(long, value_enum)]
    pub input: Option<InputMode>,
    #[arg(long)]
    pub poll_interval_seconds: Option<u64>,
    /// `combined` (one request) or `split` (weather and pressure separately)
    #[arg(long)]
    pub fetch_plan: Option<crate::fetch::FetchPlan>,
}
