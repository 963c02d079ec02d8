#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the no-smoke report heatmap.
//!
//! Reports come from `PostgREST` (configured through `SUPABASE_URL` and
//! `SUPABASE_SERVICE_ROLE_KEY`/`SUPABASE_ANON_KEY`) or from a JSON file
//! given with `--reports`. Results are printed to stdout as JSON; failures
//! are printed to stderr as a structured error body and the process exits
//! non-zero.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use commands::CliError;
use nosmoke_map_heatmap::HeatmapService;
use nosmoke_map_heatmap_models::{HeatmapQueryParams, StatsQueryParams};
use nosmoke_map_report_models::ReportSubmission;

#[derive(Parser)]
#[command(name = "nosmoke_map", about = "No-smoke report heatmap tool")]
struct Cli {
    /// TOML config file (built-in defaults when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SourceArgs {
    /// Read reports from a JSON array file instead of `PostgREST`
    #[arg(long)]
    reports: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the report heatmap as a `GeoJSON` `FeatureCollection`
    Heatmap {
        #[command(flatten)]
        source: SourceArgs,
        /// Only count reports of this category
        #[arg(long)]
        category: Option<String>,
        /// Look-back window in days
        #[arg(long, allow_hyphen_values = true)]
        days: Option<String>,
        /// Minimum reports for a cell to be shown
        #[arg(long, allow_hyphen_values = true)]
        min_reports: Option<String>,
        /// Reference point latitude
        #[arg(long, alias = "user-lat", allow_hyphen_values = true)]
        reference_lat: Option<String>,
        /// Reference point longitude
        #[arg(long, alias = "user-lon", allow_hyphen_values = true)]
        reference_lon: Option<String>,
        /// Radius around the reference point, in meters
        #[arg(long, allow_hyphen_values = true)]
        radius: Option<String>,
        /// Grid cell size, in meters
        #[arg(long, allow_hyphen_values = true)]
        grid_m: Option<String>,
    },
    /// Print report totals, category breakdown, and busiest locations
    Stats {
        #[command(flatten)]
        source: SourceArgs,
        /// Look-back window in days
        #[arg(long, allow_hyphen_values = true)]
        days: Option<String>,
    },
    /// Validate a report submission without storing it
    CheckReport {
        /// Latitude
        #[arg(long, allow_hyphen_values = true)]
        lat: Option<f64>,
        /// Longitude
        #[arg(long, allow_hyphen_values = true)]
        lon: Option<f64>,
        /// Category slug
        #[arg(long)]
        category: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    pretty_env_logger::init();
    let cli = Cli::parse();
    let pretty = cli.pretty;

    match run(cli).await {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{e}");
            match commands::to_json(&e.to_api_error(), pretty) {
                Ok(body) => eprintln!("{body}"),
                Err(_) => eprintln!("{e}"),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<String, CliError> {
    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Heatmap {
            source,
            category,
            days,
            min_reports,
            reference_lat,
            reference_lon,
            radius,
            grid_m,
        } => {
            let params = HeatmapQueryParams {
                category,
                days,
                min_reports,
                reference_lat,
                reference_lon,
                radius,
                grid_m,
            };
            let service =
                HeatmapService::new(commands::open_source(source.reports.as_deref())?, config);
            commands::heatmap(&service, &params, cli.pretty).await
        }
        Commands::Stats { source, days } => {
            let service =
                HeatmapService::new(commands::open_source(source.reports.as_deref())?, config);
            commands::stats(&service, &StatsQueryParams { days }, cli.pretty).await
        }
        Commands::CheckReport { lat, lon, category } => {
            let submission = ReportSubmission {
                lat,
                lon,
                category,
                ..ReportSubmission::default()
            };
            commands::check_report(&submission, &config, cli.pretty)
        }
    }
}
