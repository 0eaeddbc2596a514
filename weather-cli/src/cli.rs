use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use inquire::CustomType;
use std::path::PathBuf;
use tracing::info;
use weather_core::{Config, DefaultPipeline, RunOptions, resolve_run_date};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather-etl", version, about = "Hourly weather ETL and rolling analytics")]
pub struct Cli {
    /// Use this config file instead of the platform default.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch, transform and load observations, then write the report.
    Run {
        /// Run date as YYYY-MM-DD; defaults to today (UTC).
        #[arg(long)]
        date: Option<String>,

        /// Re-download the raw payload even if it is cached.
        #[arg(long)]
        force_download: bool,

        /// Rebuild the store from this run's batch instead of appending.
        #[arg(long)]
        force_recreate: bool,
    },

    /// Set the tracked location and day boundary; prompts for missing values.
    Configure {
        #[arg(long, allow_negative_numbers = true)]
        latitude: Option<f64>,

        #[arg(long, allow_negative_numbers = true)]
        longitude: Option<f64>,

        /// Station elevation in meters.
        #[arg(long, allow_negative_numbers = true)]
        elevation: Option<f64>,

        /// Day boundary offset from UTC in minutes (0 = UTC days).
        #[arg(long, allow_negative_numbers = true)]
        boundary_offset_minutes: Option<i32>,
    },

    /// Print the effective configuration.
    ShowConfig,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let config_path = match self.config {
            Some(path) => path,
            None => Config::config_file_path()?,
        };

        match self.command {
            Command::Run { date, force_download, force_recreate } => {
                let config = Config::load_from(&config_path)?;
                let run_date = resolve_run_date(date.as_deref(), Utc::now().date_naive())?;

                info!(%run_date, "Starting ETL pipeline");
                let mut pipeline = DefaultPipeline::from_config(&config)?;
                let summary = pipeline
                    .run(RunOptions { run_date, force_download, force_recreate })
                    .await
                    .with_context(|| format!("ETL run for {run_date} failed"))?;
                info!("ETL pipeline completed successfully");

                println!(
                    "{}: fetched {} hours, inserted {}, skipped {}",
                    summary.run_date, summary.fetched, summary.merge.inserted, summary.merge.skipped
                );
                println!("Report: {}", summary.report_path.display());
            }
            Command::Configure { latitude, longitude, elevation, boundary_offset_minutes } => {
                let mut config = Config::load_from(&config_path)?;
                let loc = &mut config.location;

                loc.latitude = prompt_or(latitude, "Latitude:", loc.latitude)?;
                loc.longitude = prompt_or(longitude, "Longitude:", loc.longitude)?;
                if let Some(e) = elevation {
                    loc.elevation_m = Some(e);
                }
                if let Some(m) = boundary_offset_minutes {
                    config.analytics.day_boundary_offset_minutes = m;
                }

                config.save_to(&config_path)?;
                println!("Configuration saved to {}", config_path.display());
            }
            Command::ShowConfig => {
                let config = Config::load_from(&config_path)?;
                println!("# {}", config_path.display());
                print!("{}", config.to_toml_string()?);
            }
        }

        Ok(())
    }
}

fn prompt_or(value: Option<f64>, message: &str, current: f64) -> anyhow::Result<f64> {
    match value {
        Some(v) => Ok(v),
        None => CustomType::<f64>::new(message)
            .with_default(current)
            .prompt()
            .with_context(|| format!("Failed to read {message}")),
    }
}
