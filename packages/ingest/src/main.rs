#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the dustwatch engine.

use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use dustwatch_alerts::AlertBuilder;
use dustwatch_alerts_models::AlertReport;
use dustwatch_cli_utils::IndicatifProgress;
use dustwatch_config::EngineConfig;
use dustwatch_ingest::{
    EstimateMode, build_alerts, cumulative, district_history, estimate, ingest_grid, prune,
    read_districts_csv, write_alerts,
};
use dustwatch_temporal_models::HistoryGranularity;

#[derive(Parser)]
#[command(name = "dustwatch", about = "District dust estimation and alerting")]
struct Cli {
    /// Config file (overrides `DUSTWATCH_CONFIG`)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load decoded grid CSV files into the sample store
    Ingest {
        /// Grid CSV files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Interpolate stored grid snapshots onto district centroids
    Estimate {
        /// District centroid CSV
        #[arg(long)]
        districts: PathBuf,
        /// Recompute snapshots that already have estimates
        #[arg(long)]
        backfill: bool,
        /// With `--backfill`, only snapshots at or after this time
        #[arg(long, requires = "backfill", value_parser = parse_time)]
        since: Option<DateTime<Utc>>,
    },
    /// Build the per-district alert report
    Alerts {
        /// District centroid CSV
        #[arg(long)]
        districts: PathBuf,
        /// Reference time (default: now)
        #[arg(long, value_parser = parse_time)]
        reference: Option<DateTime<Utc>>,
        /// Output path (default: `generated/district_alerts.json` in the data directory)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print median concentrations for one district
    History {
        /// District identifier
        district: String,
        /// `daily`, `weekly`, or `monthly`
        #[arg(long, default_value = "daily", value_parser = parse_granularity)]
        granularity: HistoryGranularity,
    },
    /// Fold raw grid files into the cumulative statistics
    Cumulative {
        /// Grid CSV files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Rebuild the cumulative statistics from scratch
    Rebuild {
        /// Every grid CSV file to replay
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Write cumulative map surfaces
    Maps {
        /// Output directory (default: `generated/maps` in the data directory)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Drop stored grid samples past the retention horizon
    Prune {
        /// Retention in hours (default: from config)
        #[arg(long)]
        retention_hours: Option<u32>,
    },
    /// Find the district closest to a point
    Nearest {
        /// District centroid CSV
        #[arg(long)]
        districts: PathBuf,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, String> {
    dustwatch_ingest::reader::parse_timestamp(raw)
        .ok_or_else(|| format!("invalid timestamp {raw:?}, expected RFC 3339 or YYYY-MM-DD HH:MM"))
}

fn parse_granularity(raw: &str) -> Result<HistoryGranularity, String> {
    raw.parse()
        .map_err(|_| format!("invalid granularity {raw:?}, expected daily, weekly or monthly"))
}

fn print_report(report: &AlertReport, notify: usize) {
    println!(
        "Alerts at {} for {} districts ({} skipped, {notify} to notify)",
        report.metadata.reference_time,
        report.districts.len(),
        report.skipped.len()
    );
    for (level, count) in report.level_counts() {
        println!("  {level:<32} {count}");
    }
    for (status, count) in report.compliance_counts() {
        println!("  {status:<32} {count}");
    }
    for storm in report.dust_storms() {
        println!(
            "  DUST STORM: {} ({}) {:.0} µg/m³",
            storm.district_name, storm.province_name, storm.pm10.now
        );
    }
}

#[allow(clippy::too_many_lines)]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = dustwatch_cli_utils::init_logger();
    let cli = Cli::parse();
    let config = EngineConfig::resolve(cli.config.as_deref())?;
    let start = Instant::now();
    let now = Utc::now();

    match cli.command {
        Commands::Ingest { files } => {
            let progress = IndicatifProgress::files_bar(&multi, "Ingesting", files.len() as u64);
            let summary = ingest_grid(&config, &files, now, &progress)?;
            println!(
                "{} files: {} new samples, {} duplicates, {} rejected rows, {} pruned",
                summary.files,
                summary.stored.inserted,
                summary.stored.duplicates,
                summary.rejected,
                summary.pruned
            );
        }
        Commands::Estimate {
            districts,
            backfill,
            since,
        } => {
            let districts = read_districts_csv(&districts)?;
            let mode = if backfill {
                EstimateMode::Backfill { since }
            } else {
                EstimateMode::Pending
            };
            let progress = IndicatifProgress::batch_bar(&multi, "Estimating");
            let summary = estimate(&config, &districts, mode, &progress)?;
            println!(
                "{} snapshots: {} estimates ({} failed)",
                summary.snapshots, summary.estimates, summary.failed
            );
        }
        Commands::Alerts {
            districts,
            reference,
            output,
        } => {
            let districts = read_districts_csv(&districts)?;
            let output = output.unwrap_or_else(|| config.store_paths().alerts_report());
            let previous: Option<AlertReport> = dustwatch_store::load_json(&output).unwrap_or_else(|e| {
                log::warn!("Ignoring unreadable previous report {}: {e}", output.display());
                None
            });

            let report = build_alerts(&config, &districts, reference.unwrap_or(now), now)?;
            let builder = AlertBuilder::new(&config.temporal, &config.classification)?;
            let notify = builder.to_notify(previous.as_ref(), &report);
            for alert in &notify {
                log::info!(
                    "Notify {} ({}): {} AQI {}",
                    alert.district_name,
                    alert.district_id,
                    alert.alert.level,
                    alert.aqi.value
                );
            }

            write_alerts(&config, &report, Some(&output))?;
            print_report(&report, notify.len());
        }
        Commands::History {
            district,
            granularity,
        } => {
            let points = district_history(&config, &district, granularity)?;
            if points.is_empty() {
                println!("No estimates for {district}");
            }
            println!("{:<12} {:>10} {:>6}", "PERIOD", "MEDIAN", "N");
            for point in points {
                println!("{:<12} {:>10.1} {:>6}", point.period, point.median, point.count);
            }
        }
        Commands::Cumulative { files } => {
            let progress = IndicatifProgress::files_bar(&multi, "Folding", files.len() as u64);
            let summary = cumulative::update_cumulative(&config, &files, now, &progress)?;
            println!(
                "{} folded ({} samples), {} already folded, {} rejected",
                summary.folded,
                summary.samples_applied,
                summary.already_folded,
                summary.rejected.len()
            );
            for (identity, reason) in &summary.rejected {
                println!("  {identity}: {reason}");
            }
        }
        Commands::Rebuild { files } => {
            let progress = IndicatifProgress::files_bar(&multi, "Loading", files.len() as u64);
            let summary = cumulative::rebuild_cumulative(&config, &files, now, &progress)?;
            println!(
                "Rebuilt from {} sources ({} samples, {} duplicate contents)",
                summary.folded, summary.samples_applied, summary.already_folded
            );
        }
        Commands::Maps { output } => {
            let metadata = cumulative::write_maps(&config, output.as_deref(), now)?;
            println!(
                "{} surfaces over {:?} ({} measurements)",
                metadata.maps.len(),
                metadata.processed_years,
                metadata.total_measurements
            );
        }
        Commands::Prune { retention_hours } => {
            let hours = retention_hours.unwrap_or(config.store.retention_hours);
            let removed = prune(&config, now, hours)?;
            println!("Removed {removed} samples older than {hours}h");
        }
        Commands::Nearest {
            districts,
            lat,
            lon,
        } => {
            let districts = read_districts_csv(&districts)?;
            match dustwatch_spatial::nearest_district(&districts, lat, lon) {
                Some((district, km)) => println!(
                    "{} {} ({}) {km:.1} km",
                    district.id, district.name, district.parent_region_name
                ),
                None => println!("No districts loaded"),
            }
        }
    }

    log::info!("Done in {:.1}s", start.elapsed().as_secs_f64());
    Ok(())
}
