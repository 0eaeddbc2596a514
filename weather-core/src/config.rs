use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::aggregate::{DayBoundary, PressureThreshold, PressureUnit};

/// The single location the pipeline tracks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    pub latitude: f64,
    pub longitude: f64,
    /// Station elevation in meters. When absent the payload's `elevation` is used.
    pub elevation_m: Option<f64>,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self { latitude: 50.4547, longitude: 30.5238, elevation_m: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Whole days fetched per run, ending the day before the run date.
    pub fetch_days: u32,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.open-meteo.com/v1/forecast".to_string(),
            fetch_days: 14,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub window_days: u32,
    /// Offset of the day boundary from UTC. `0` means UTC calendar days.
    pub day_boundary_offset_minutes: i32,
    pub pressure_threshold: f64,
    pub pressure_threshold_unit: PressureUnit,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        let threshold = PressureThreshold::default();
        Self {
            window_days: 7,
            day_boundary_offset_minutes: 0,
            pressure_threshold: threshold.value,
            pressure_threshold_unit: threshold.unit,
        }
    }
}

impl AnalyticsConfig {
    pub fn day_boundary(&self) -> Result<DayBoundary> {
        DayBoundary::offset_minutes(self.day_boundary_offset_minutes).ok_or_else(|| {
            anyhow!(
                "day_boundary_offset_minutes = {} is not a valid UTC offset",
                self.day_boundary_offset_minutes
            )
        })
    }

    pub fn pressure_threshold(&self) -> PressureThreshold {
        PressureThreshold { value: self.pressure_threshold, unit: self.pressure_threshold_unit }
    }
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// data_dir = "data"
///
/// [location]
/// latitude = 50.4547
/// longitude = 30.5238
/// elevation_m = 179.0
///
/// [analytics]
/// day_boundary_offset_minutes = 180
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root for the raw payload cache, the database and the reports.
    pub data_dir: PathBuf,
    pub location: LocationConfig,
    pub api: ApiConfig,
    pub analytics: AnalyticsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            location: LocationConfig::default(),
            api: ApiConfig::default(),
            analytics: AnalyticsConfig::default(),
        }
    }
}

impl Config {
    /// Load config from `path`, or defaults if it doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        cfg.validate()?;
        Ok(cfg)
    }

    /// Save config to `path`, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml = self.to_toml_string()?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weather-task", "weather-etl")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    pub fn validate(&self) -> Result<()> {
        let loc = &self.location;
        if !(-90.0..=90.0).contains(&loc.latitude) {
            return Err(anyhow!("latitude {} is outside -90..=90", loc.latitude));
        }
        if !(-180.0..=180.0).contains(&loc.longitude) {
            return Err(anyhow!("longitude {} is outside -180..=180", loc.longitude));
        }
        if loc.elevation_m.is_some_and(|e| !e.is_finite()) {
            return Err(anyhow!("elevation_m must be a finite number"));
        }
        if self.api.fetch_days == 0 || self.analytics.window_days == 0 {
            return Err(anyhow!("fetch_days and window_days must be at least 1"));
        }
        self.analytics.day_boundary()?;
        Ok(())
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.data_dir.join("raw")
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("local.db")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.data_dir.join("reports")
    }
}
