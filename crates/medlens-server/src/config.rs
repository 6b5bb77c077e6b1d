use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use medlens_ingest::{ClientConfig, HttpSourceConfig};

const DEFAULT_CHANNELS: &str = "https://t.me/lobelia4cosmetics,https://t.me/tikvahpharma";
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Settings read from the environment (after `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub source_url: Option<String>,
    pub source_token: Option<String>,
    pub channels: Vec<String>,
    pub fetch_limit: usize,
    pub page_size: usize,
    pub rate_limit_max_waits: u32,
    pub raw_dir: PathBuf,
    pub db_path: PathBuf,
    pub detector_url: Option<String>,
    pub transform_command: Option<String>,
    pub host: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let var_or = |key: &str, default: &str| var(key).unwrap_or_else(|| default.into());

        Ok(Self {
            source_url: var("MEDLENS_SOURCE_URL"),
            source_token: var("MEDLENS_SOURCE_TOKEN"),
            channels: var_or("MEDLENS_CHANNELS", DEFAULT_CHANNELS)
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect(),
            fetch_limit: parse(&var_or("MEDLENS_FETCH_LIMIT", "1000"), "MEDLENS_FETCH_LIMIT")?,
            page_size: parse(&var_or("MEDLENS_PAGE_SIZE", "100"), "MEDLENS_PAGE_SIZE")?,
            rate_limit_max_waits: parse(
                &var_or("MEDLENS_RATE_LIMIT_MAX_WAITS", "10"),
                "MEDLENS_RATE_LIMIT_MAX_WAITS",
            )?,
            raw_dir: var_or("MEDLENS_RAW_DIR", "data/raw").into(),
            db_path: var_or("MEDLENS_DB_PATH", "medlens.db").into(),
            detector_url: var("MEDLENS_DETECTOR_URL"),
            transform_command: var("MEDLENS_TRANSFORM_COMMAND"),
            host: var_or("MEDLENS_HOST", "0.0.0.0"),
            port: parse(&var_or("MEDLENS_PORT", "8000"), "MEDLENS_PORT")?,
        })
    }

    /// Connection settings for the message source; both variables must be set.
    pub fn source(&self) -> Result<HttpSourceConfig> {
        Ok(HttpSourceConfig {
            base_url: self.source_url.clone().context("MEDLENS_SOURCE_URL is not set")?,
            token: self.source_token.clone().context("MEDLENS_SOURCE_TOKEN is not set")?,
            timeout: HTTP_TIMEOUT,
        })
    }

    pub fn client(&self) -> ClientConfig {
        ClientConfig {
            page_size: self.page_size,
            rate_limit_max_waits: self.rate_limit_max_waits,
        }
    }

    pub fn detector_url(&self) -> Result<String> {
        self.detector_url.clone().context("MEDLENS_DETECTOR_URL is not set")
    }

    pub fn http_timeout(&self) -> Duration {
        HTTP_TIMEOUT
    }
}

fn parse<T>(value: &str, key: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("invalid {}: {:?}", key, value))
}
