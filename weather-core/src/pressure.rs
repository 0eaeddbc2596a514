use crate::{
    error::{PipelineError, Result},
    model::{EnrichedObservation, NormalizedObservation},
};

/// Standard atmosphere temperature lapse rate, K/m.
pub const LAPSE_RATE: f64 = 0.0065;
/// Standard atmosphere sea-level temperature, K.
pub const REFERENCE_TEMPERATURE_K: f64 = 288.15;
/// Barometric exponent `g·M / (R·L)`.
pub const BAROMETRIC_EXPONENT: f64 = 5.255;
/// mmHg per hPa.
pub const HPA_TO_MMHG: f64 = 0.750062;

pub fn hpa_to_mmhg(hpa: f64) -> f64 {
    hpa * HPA_TO_MMHG
}

/// Turns sea-level reduced pressure into station pressure at a fixed elevation.
///
/// `p = p_msl · (1 − L·h / T₀)^5.255`
#[derive(Debug, Clone, Copy)]
pub struct PressureDeriver {
    elevation_m: f64,
    factor: f64,
}

impl PressureDeriver {
    /// # Errors
    ///
    /// Returns [`PipelineError::Derivation`] if the elevation is not finite or
    /// lies above the top of the standard atmosphere model.
    pub fn new(elevation_m: f64) -> Result<Self> {
        if !elevation_m.is_finite() {
            return Err(PipelineError::derivation(format!(
                "station elevation {elevation_m} is not a finite number"
            )));
        }

        let base = 1.0 - (LAPSE_RATE * elevation_m) / REFERENCE_TEMPERATURE_K;
        if base <= 0.0 {
            return Err(PipelineError::derivation(format!(
                "station elevation {elevation_m} m is outside the standard atmosphere"
            )));
        }

        Ok(Self { elevation_m, factor: base.powf(BAROMETRIC_EXPONENT) })
    }

    pub fn elevation_m(&self) -> f64 {
        self.elevation_m
    }

    pub fn station_pressure(&self, pressure_msl: Option<f64>) -> Result<f64> {
        match pressure_msl {
            None => Err(PipelineError::derivation("missing `pressure_msl`")),
            Some(p) if !p.is_finite() || p <= 0.0 => Err(PipelineError::derivation(format!(
                "`pressure_msl` must be positive, got {p}"
            ))),
            Some(p) => Ok(p * self.factor),
        }
    }

    /// Replaces `pressure_msl` with `pressure_at_location`.
    pub fn derive(&self, obs: NormalizedObservation) -> Result<EnrichedObservation> {
        let pressure_at_location = self.station_pressure(obs.pressure_msl).map_err(|e| match e {
            PipelineError::Derivation(msg) => {
                PipelineError::Derivation(format!("{msg} at {}", obs.timestamp))
            }
            other => other,
        })?;

        Ok(EnrichedObservation {
            timestamp: obs.timestamp,
            temperature_c: obs.temperature_c,
            apparent_temperature_c: obs.apparent_temperature_c,
            relative_humidity: obs.relative_humidity,
            precipitation_probability: obs.precipitation_probability,
            is_day: obs.is_day,
            pressure_at_location,
        })
    }

    pub fn derive_all(&self, batch: Vec<NormalizedObservation>) -> Result<Vec<EnrichedObservation>> {
        batch.into_iter().map(|obs| self.derive(obs)).collect()
    }
}
