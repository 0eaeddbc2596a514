use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};
use std::collections::HashMap;

use crate::{
    error::{PipelineError, Result},
    model::{NormalizedObservation, RawObservation, RawPayload},
};

const TIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S"];

/// Converts API wire units into canonical ones.
///
/// Percentages become fractions, the `is_day` code becomes a bool and local
/// `time` strings become UTC instants. Everything else passes through.
#[derive(Debug, Clone, Copy)]
pub struct UnitNormalizer {
    offset: FixedOffset,
}

impl Default for UnitNormalizer {
    fn default() -> Self {
        Self::utc()
    }
}

impl UnitNormalizer {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn utc() -> Self {
        Self::new(Utc.fix())
    }

    /// Build a normalizer for the local time reported in `payload`.
    pub fn for_payload(payload: &RawPayload) -> Result<Self> {
        let seconds = payload.utc_offset_seconds.unwrap_or(0);
        let offset = FixedOffset::east_opt(seconds).ok_or_else(|| {
            PipelineError::validation(format!("utc_offset_seconds {seconds} is out of range"))
        })?;

        Ok(Self::new(offset))
    }

    pub fn normalize(&self, raw: &RawObservation) -> Result<NormalizedObservation> {
        let time = raw.time.as_deref().ok_or_else(|| missing("time"))?;

        Ok(NormalizedObservation {
            timestamp: self.parse_local(time)?,
            temperature_c: finite("temperature_2m", raw.temperature_2m)?,
            apparent_temperature_c: finite("apparent_temperature", raw.apparent_temperature)?,
            relative_humidity: fraction("relative_humidity_2m", raw.relative_humidity_2m)?,
            precipitation_probability: fraction(
                "precipitation_probability",
                raw.precipitation_probability,
            )?,
            is_day: flag("is_day", raw.is_day)?,
            pressure_msl: raw.pressure_msl,
        })
    }

    /// Normalize a batch, failing on the first bad row.
    ///
    /// Rows that land on the same UTC instant are rejected, naming both.
    pub fn normalize_all(&self, raw: &[RawObservation]) -> Result<Vec<NormalizedObservation>> {
        let mut seen: HashMap<DateTime<Utc>, usize> = HashMap::with_capacity(raw.len());
        let mut out = Vec::with_capacity(raw.len());

        for (i, obs) in raw.iter().enumerate() {
            let normalized = self.normalize(obs).map_err(|e| match e {
                PipelineError::Validation(msg) => {
                    PipelineError::Validation(format!("row {i}: {msg}"))
                }
                other => other,
            })?;

            if let Some(first) = seen.insert(normalized.timestamp, i) {
                return Err(PipelineError::validation(format!(
                    "rows {first} and {i} share timestamp {}",
                    normalized.timestamp.to_rfc3339()
                )));
            }
            out.push(normalized);
        }

        Ok(out)
    }

    fn parse_local(&self, time: &str) -> Result<DateTime<Utc>> {
        let naive = TIME_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(time, fmt).ok())
            .ok_or_else(|| PipelineError::validation(format!("unparseable time `{time}`")))?;

        self.offset
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| PipelineError::validation(format!("ambiguous local time `{time}`")))
    }
}

fn missing(field: &str) -> PipelineError {
    PipelineError::validation(format!("missing required field `{field}`"))
}

fn finite(field: &str, value: Option<f64>) -> Result<f64> {
    let v = value.ok_or_else(|| missing(field))?;
    if !v.is_finite() {
        return Err(PipelineError::validation(format!("`{field}` is not a finite number")));
    }
    Ok(v)
}

fn fraction(field: &str, percent: Option<f64>) -> Result<f64> {
    Ok((finite(field, percent)? / 100.0).clamp(0.0, 1.0))
}

fn flag(field: &str, code: Option<i64>) -> Result<bool> {
    match code {
        Some(0) => Ok(false),
        Some(1) => Ok(true),
        Some(other) => Err(PipelineError::validation(format!(
            "`{field}` must be 0 or 1, got {other}"
        ))),
        None => Err(missing(field)),
    }
}
