use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Parsed upstream response as returned by the forecast API.
///
/// Only the fields the pipeline reads are modelled; unknown keys are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPayload {
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    /// Grid-cell elevation reported by the API, in meters.
    #[serde(default)]
    pub elevation: Option<f64>,
    #[serde(default)]
    pub timezone: Option<String>,
    /// Offset of the local `time` strings from UTC.
    #[serde(default)]
    pub utc_offset_seconds: Option<i32>,
    pub hourly: HourlyColumns,
}

/// The `hourly` section: one parallel array per requested variable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HourlyColumns {
    #[serde(default)]
    pub time: Vec<String>,
    #[serde(default)]
    pub temperature_2m: Vec<Option<f64>>,
    #[serde(default)]
    pub apparent_temperature: Vec<Option<f64>>,
    #[serde(default)]
    pub relative_humidity_2m: Vec<Option<f64>>,
    #[serde(default)]
    pub precipitation_probability: Vec<Option<f64>>,
    #[serde(default)]
    pub is_day: Vec<Option<i64>>,
    #[serde(default)]
    pub pressure_msl: Vec<Option<f64>>,
}

impl RawPayload {
    /// Zip the column arrays into one [`RawObservation`] per hour.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Validation`] if any column is shorter or longer
    /// than `time`.
    pub fn observations(&self) -> Result<Vec<RawObservation>> {
        let h = &self.hourly;
        let len = h.time.len();

        let columns = [
            ("temperature_2m", h.temperature_2m.len()),
            ("apparent_temperature", h.apparent_temperature.len()),
            ("relative_humidity_2m", h.relative_humidity_2m.len()),
            ("precipitation_probability", h.precipitation_probability.len()),
            ("is_day", h.is_day.len()),
            ("pressure_msl", h.pressure_msl.len()),
        ];
        for (name, n) in columns {
            if n != len {
                return Err(PipelineError::validation(format!(
                    "hourly column `{name}` has {n} values, expected {len} (one per `time`)"
                )));
            }
        }

        Ok((0..len)
            .map(|i| RawObservation {
                time: Some(h.time[i].clone()),
                temperature_2m: h.temperature_2m[i],
                apparent_temperature: h.apparent_temperature[i],
                relative_humidity_2m: h.relative_humidity_2m[i],
                precipitation_probability: h.precipitation_probability[i],
                is_day: h.is_day[i],
                pressure_msl: h.pressure_msl[i],
            })
            .collect())
    }
}

/// One hour as received, before any normalization. Lives for a single run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawObservation {
    /// Local wall-clock time, e.g. `2024-05-01T13:00`.
    pub time: Option<String>,
    pub temperature_2m: Option<f64>,
    pub apparent_temperature: Option<f64>,
    /// Percent, 0–100.
    pub relative_humidity_2m: Option<f64>,
    /// Percent, 0–100.
    pub precipitation_probability: Option<f64>,
    /// 0 or 1.
    pub is_day: Option<i64>,
    /// Sea-level reduced pressure, hPa.
    pub pressure_msl: Option<f64>,
}

/// Output of the unit normalizer: canonical units, still carrying `pressure_msl`.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedObservation {
    pub timestamp: DateTime<Utc>,
    pub temperature_c: f64,
    pub apparent_temperature_c: f64,
    pub relative_humidity: f64,
    pub precipitation_probability: f64,
    pub is_day: bool,
    pub pressure_msl: Option<f64>,
}

/// Canonical persisted record. `timestamp` is the unique merge and sort key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedObservation {
    pub timestamp: DateTime<Utc>,
    pub temperature_c: f64,
    pub apparent_temperature_c: f64,
    /// Fraction, 0–1.
    pub relative_humidity: f64,
    /// Fraction, 0–1.
    pub precipitation_probability: f64,
    pub is_day: bool,
    /// Station-level pressure, hPa.
    pub pressure_at_location: f64,
}

/// Mean temperature split by daylight flag. A side with no rows is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DayNightAverages {
    pub day: Option<f64>,
    pub night: Option<f64>,
}

/// Trailing-window analytics for one run date.
///
/// Every metric is `None` when the window holds no rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub run_date: NaiveDate,
    pub avg_temp_last7d: Option<f64>,
    pub avg_temp_by_daynight: Option<DayNightAverages>,
    #[serde(rename = "days_below_1000mmHg")]
    pub days_below_1000_mmhg: Option<u32>,
    pub hours_temp_apparent_greater_actual: Option<u32>,
}

/// Inclusive date range requested from the upstream API for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl FetchWindow {
    /// `days` whole days ending the day before `run_date`.
    pub fn for_run_date(run_date: NaiveDate, days: u32) -> Result<Self> {
        let days = days.max(1);
        let end = run_date
            .checked_sub_days(Days::new(1))
            .ok_or_else(|| PipelineError::InvalidRunDate(format!("{run_date} has no previous day")))?;
        let start = end
            .checked_sub_days(Days::new(u64::from(days - 1)))
            .ok_or_else(|| PipelineError::InvalidRunDate(format!("{run_date} is out of range")))?;

        Ok(Self { start, end })
    }
}
