use std::path::PathBuf;

use crate::store::StoreError;

/// Failures that abort a pipeline run.
///
/// Every variant is fatal for the run: nothing is retried inside the core and
/// no report is written once any of these has been raised.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Malformed or missing raw field.
    #[error("invalid observation: {0}")]
    Validation(String),

    /// Bad input to the barometric formula.
    #[error("cannot derive station pressure: {0}")]
    Derivation(String),

    /// Transactional write to the store failed; the store is unchanged.
    #[error("merge into store failed")]
    Merge(#[source] StoreError),

    /// Store could not be read for the analytics window.
    #[error("aggregation over store failed")]
    Aggregation(#[source] StoreError),

    #[error("fetching raw payload failed")]
    Fetch(#[source] anyhow::Error),

    #[error("failed to write report to {}", .path.display())]
    Report {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid run date: {0}")]
    InvalidRunDate(String),
}

impl PipelineError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub(crate) fn derivation(msg: impl Into<String>) -> Self {
        Self::Derivation(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
