use async_trait::async_trait;
use chrono::NaiveDate;
use std::fmt::Debug;

use crate::RawPayload;

pub mod openmeteo;

pub use openmeteo::OpenMeteoSource;

/// Producer of the raw hourly payload for a run date.
///
/// Implementations own their caching policy: `force_download` asks for a fresh
/// upstream call even when a payload for `run_date` is already on hand.
#[async_trait]
pub trait ObservationSource: Send + Sync + Debug {
    async fn fetch(&self, run_date: NaiveDate, force_download: bool) -> anyhow::Result<RawPayload>;
}
