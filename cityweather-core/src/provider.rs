use crate::{Config, WeatherSnapshot};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt::Debug;
use thiserror::Error;

pub mod openweather;

pub use openweather::OpenWeatherProvider;

/// Why a single city's fetch failed. Always recoverable by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum FetchError {
    /// Transport failure, timeout, or an unexpected HTTP status.
    #[error("network error: {0}")]
    Network(String),

    /// The provider has no data for this city name.
    #[error("city not found: {0}")]
    NotFound(String),

    /// The provider answered but the payload could not be parsed.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl FetchError {
    /// Short label for reports and UI.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::NotFound(_) => "not_found",
            Self::Malformed(_) => "malformed",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Network(format!("request timed out: {err}"))
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Source of current weather for a city name.
///
/// Implementations perform exactly one outbound call per `fetch` and never
/// retry internally.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    async fn fetch(&self, city: &str) -> Result<WeatherSnapshot, FetchError>;
}

/// Construct the OpenWeather client from config.
pub fn provider_from_config(config: &Config) -> anyhow::Result<OpenWeatherProvider> {
    let api_key = config.api_key().ok_or_else(|| {
        anyhow::anyhow!(
            "No API key configured.\n\
                 Hint: run `cityweather configure` and enter your OpenWeather API key."
        )
    })?;

    OpenWeatherProvider::with_base_url(api_key, &config.base_url, config.timeout())
}
