//! Core library for the `weather-etl` pipeline.
//!
//! This crate defines:
//! - Configuration for the single tracked location and the analytics window
//! - The transform stages (unit normalization, station pressure derivation)
//! - The SQLite observation store and the idempotent merge into it
//! - Trailing-window analytics and the dated report artifact
//! - The Open-Meteo source the raw payload comes from
//!
//! It is used by `weather-cli`, but every stage can be driven on its own.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod merge;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod pressure;
pub mod provider;
pub mod report;
pub mod store;

pub use aggregate::{DayBoundary, PressureThreshold, PressureUnit, WindowAggregator};
pub use config::Config;
pub use error::PipelineError;
pub use merge::{MergeMode, MergeOutcome, RecordMerger};
pub use model::{
    DayNightAverages, EnrichedObservation, FetchWindow, NormalizedObservation, RawObservation,
    RawPayload, Report,
};
pub use normalize::UnitNormalizer;
pub use pipeline::{DefaultPipeline, Pipeline, RunOptions, RunSummary, resolve_run_date};
pub use pressure::PressureDeriver;
pub use provider::{ObservationSource, OpenMeteoSource};
pub use report::{JsonReportSink, ReportSink};
pub use store::{ObservationStore, SqliteStore, StoreError};
