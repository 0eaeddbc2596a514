//! Report artifacts, one per run date.

use chrono::NaiveDate;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{
    error::{PipelineError, Result},
    model::Report,
};

/// Destination for the finished report of a run.
pub trait ReportSink {
    /// Persist `report` under `run_date`, replacing any earlier artifact for that date.
    fn write(&self, run_date: NaiveDate, report: &Report) -> Result<PathBuf>;
}

/// Writes `<root>/<run_date>/report.json` as pretty-printed JSON.
#[derive(Debug, Clone)]
pub struct JsonReportSink {
    root: PathBuf,
}

impl JsonReportSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, run_date: NaiveDate) -> PathBuf {
        self.root.join(run_date.format("%Y-%m-%d").to_string()).join("report.json")
    }
}

impl ReportSink for JsonReportSink {
    fn write(&self, run_date: NaiveDate, report: &Report) -> Result<PathBuf> {
        let path = self.path_for(run_date);
        let io_err = |source: std::io::Error| PipelineError::Report { path: path.clone(), source };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let json = serde_json::to_string_pretty(report)
            .map_err(|e| io_err(std::io::Error::other(e)))?;

        // Write beside the target and rename so a crash never leaves half a report.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(io_err)?;
        fs::rename(&tmp, &path).map_err(io_err)?;

        Ok(path)
    }
}

/// Read a previously written report back.
pub fn read_report(path: &Path) -> anyhow::Result<Report> {
    use anyhow::Context;

    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read report: {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse report: {}", path.display()))
}
