use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use std::{path::PathBuf, time::Duration};
use tracing::{debug, info};

use crate::{Config, RawPayload, model::FetchWindow};

use super::ObservationSource;

/// Hourly variables requested from the forecast endpoint.
pub const HOURLY_FIELDS: &str = "temperature_2m,apparent_temperature,relative_humidity_2m,\
                                 precipitation_probability,is_day,pressure_msl";

/// Open-Meteo forecast API with an on-disk cache of the raw response per run date.
#[derive(Debug, Clone)]
pub struct OpenMeteoSource {
    base_url: String,
    latitude: f64,
    longitude: f64,
    fetch_days: u32,
    cache_dir: PathBuf,
    http: Client,
}

impl OpenMeteoSource {
    pub fn from_config(config: &Config) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.api.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: config.api.base_url.clone(),
            latitude: config.location.latitude,
            longitude: config.location.longitude,
            fetch_days: config.api.fetch_days,
            cache_dir: config.raw_dir(),
            http,
        })
    }

    /// `<raw_dir>/<run_date>/response.json`
    pub fn cache_path(&self, run_date: NaiveDate) -> PathBuf {
        self.cache_dir.join(run_date.format("%Y-%m-%d").to_string()).join("response.json")
    }

    fn query(&self, window: FetchWindow) -> Vec<(&'static str, String)> {
        vec![
            ("latitude", self.latitude.to_string()),
            ("longitude", self.longitude.to_string()),
            ("hourly", HOURLY_FIELDS.to_string()),
            ("timezone", "auto".to_string()),
            ("start_date", window.start.format("%Y-%m-%d").to_string()),
            ("end_date", window.end.format("%Y-%m-%d").to_string()),
        ]
    }

    async fn download(&self, run_date: NaiveDate) -> Result<String> {
        let window = FetchWindow::for_run_date(run_date, self.fetch_days)?;
        info!(start = %window.start, end = %window.end, "Requesting hourly data from Open-Meteo");

        let res = self
            .http
            .get(&self.base_url)
            .query(&self.query(window))
            .send()
            .await
            .context("Failed to send request to Open-Meteo")?;

        let status = res.status();
        let body = res.text().await.context("Failed to read Open-Meteo response body")?;

        if !status.is_success() {
            return Err(anyhow!(
                "Open-Meteo request failed with status {}: {}",
                status,
                truncate_body(&body),
            ));
        }

        Ok(body)
    }
}

#[async_trait]
impl ObservationSource for OpenMeteoSource {
    async fn fetch(&self, run_date: NaiveDate, force_download: bool) -> Result<RawPayload> {
        let path = self.cache_path(run_date);

        let cached = tokio::fs::try_exists(&path)
            .await
            .with_context(|| format!("Failed to check payload cache: {}", path.display()))?;

        let body = if !force_download && cached {
            info!(path = %path.display(), "Raw payload already cached, skipping download");
            tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read cached payload: {}", path.display()))?
        } else {
            let body = self.download(run_date).await?;
            // Validate before caching so a bad body is never reused.
            parse_payload(&body)?;

            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await.with_context(|| {
                    format!("Failed to create raw data directory: {}", parent.display())
                })?;
            }
            tokio::fs::write(&path, &body)
                .await
                .with_context(|| format!("Failed to cache payload: {}", path.display()))?;
            debug!(path = %path.display(), bytes = body.len(), "Raw payload cached");
            body
        };

        parse_payload(&body)
    }
}

fn parse_payload(body: &str) -> Result<RawPayload> {
    serde_json::from_str(body).context("Failed to parse Open-Meteo JSON")
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
