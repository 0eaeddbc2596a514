//! One ETL run: fetch → normalize → derive → merge → aggregate → report.
//!
//! The transform stages are pure; only the merge writes to the store and
//! only the sink writes the report, after aggregation has fully succeeded.

use anyhow::Context;
use chrono::NaiveDate;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, instrument};

use crate::{
    Config,
    aggregate::WindowAggregator,
    error::{PipelineError, Result},
    merge::{MergeMode, MergeOutcome, RecordMerger},
    model::Report,
    normalize::UnitNormalizer,
    pressure::PressureDeriver,
    provider::{ObservationSource, OpenMeteoSource},
    report::{JsonReportSink, ReportSink},
    store::{ObservationStore, SqliteStore},
};

/// Parse an optional `YYYY-MM-DD` run date, defaulting to `today`.
///
/// Dates after `today` are rejected.
pub fn resolve_run_date(input: Option<&str>, today: NaiveDate) -> Result<NaiveDate> {
    let date = match input.map(str::trim).filter(|s| !s.is_empty()) {
        None => return Ok(today),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| {
            PipelineError::InvalidRunDate(format!("'{s}' is not a date, use YYYY-MM-DD"))
        })?,
    };

    if date > today {
        return Err(PipelineError::InvalidRunDate(format!("'{date}' cannot be in the future")));
    }
    Ok(date)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub run_date: NaiveDate,
    pub force_download: bool,
    pub force_recreate: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_date: NaiveDate,
    pub fetched: usize,
    pub merge: MergeOutcome,
    pub report_path: PathBuf,
    pub report: Report,
}

/// Pipeline backed by Open-Meteo, the SQLite store and JSON reports under `data_dir`.
pub type DefaultPipeline = Pipeline<OpenMeteoSource, SqliteStore, JsonReportSink>;

impl DefaultPipeline {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let db = config.database_path();
        let store = SqliteStore::open(&db)
            .with_context(|| format!("Failed to open database: {}", db.display()))?;

        Self::new(
            config,
            OpenMeteoSource::from_config(config)?,
            store,
            JsonReportSink::new(config.reports_dir()),
        )
    }
}

/// Wires the stages together for one invocation.
pub struct Pipeline<Src, St, Sink> {
    source: Src,
    store: St,
    sink: Sink,
    elevation_m: Option<f64>,
    aggregator: WindowAggregator,
}

impl<Src, St, Sink> Pipeline<Src, St, Sink>
where
    Src: ObservationSource,
    St: ObservationStore,
    Sink: ReportSink,
{
    pub fn new(config: &Config, source: Src, store: St, sink: Sink) -> anyhow::Result<Self> {
        let aggregator = WindowAggregator::new(
            config.analytics.window_days,
            config.analytics.day_boundary()?,
            config.analytics.pressure_threshold(),
        );

        Ok(Self { source, store, sink, elevation_m: config.location.elevation_m, aggregator })
    }

    pub fn store(&self) -> &St {
        &self.store
    }

    #[instrument(skip(self), fields(run_date = %opts.run_date))]
    pub async fn run(&mut self, opts: RunOptions) -> Result<RunSummary> {
        info!(force_download = opts.force_download, "Extracting raw data");
        let payload = self
            .source
            .fetch(opts.run_date, opts.force_download)
            .await
            .map_err(PipelineError::Fetch)?;

        info!("Transforming data");
        let raw = payload.observations()?;
        let normalized = UnitNormalizer::for_payload(&payload)?.normalize_all(&raw)?;

        let elevation = self.elevation_m.or(payload.elevation).ok_or_else(|| {
            PipelineError::Derivation(
                "station elevation is neither configured nor present in the payload".into(),
            )
        })?;
        let deriver = PressureDeriver::new(elevation)?;
        let enriched = deriver.derive_all(normalized)?;
        info!(rows = enriched.len(), elevation_m = deriver.elevation_m(), "Observations enriched");

        let mode = MergeMode::from_force_recreate(opts.force_recreate);
        info!(?mode, "Updating store");
        let merge = RecordMerger::new(mode).merge(&mut self.store, &enriched)?;
        info!(inserted = merge.inserted, skipped = merge.skipped, "Store updated");

        info!("Running analytics");
        let report = self.aggregator.aggregate(&self.store, opts.run_date)?;
        let report_path = self.sink.write(opts.run_date, &report)?;
        info!(path = %report_path.display(), "Report written");

        Ok(RunSummary { run_date: opts.run_date, fetched: raw.len(), merge, report_path, report })
    }
}
