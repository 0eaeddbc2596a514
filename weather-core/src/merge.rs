use serde::Serialize;
use tracing::debug;

use crate::{
    error::{PipelineError, Result},
    model::EnrichedObservation,
    store::ObservationStore,
};

/// How a batch is folded into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeMode {
    /// Insert unseen timestamps, leave existing rows untouched.
    #[default]
    AppendNew,
    /// Replace the whole table content with the batch.
    Recreate,
}

impl MergeMode {
    pub fn from_force_recreate(force_recreate: bool) -> Self {
        if force_recreate { Self::Recreate } else { Self::AppendNew }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    pub inserted: usize,
    pub skipped: usize,
}

/// Loads one run's enriched batch into the store in a single transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordMerger {
    mode: MergeMode,
}

impl RecordMerger {
    pub fn new(mode: MergeMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> MergeMode {
        self.mode
    }

    pub fn merge<S>(&self, store: &mut S, records: &[EnrichedObservation]) -> Result<MergeOutcome>
    where
        S: ObservationStore + ?Sized,
    {
        debug!(mode = ?self.mode, rows = records.len(), "Merging batch into store");

        let outcome = store.upsert(records, self.mode).map_err(PipelineError::Merge)?;

        debug!(inserted = outcome.inserted, skipped = outcome.skipped, "Merge committed");
        Ok(outcome)
    }
}
