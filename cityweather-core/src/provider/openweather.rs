use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use crate::{
    config::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS},
    model::WeatherSnapshot,
};

use super::{FetchError, WeatherProvider};

const CURRENT_WEATHER_PATH: &str = "/data/2.5/weather";

#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: String,
    base_url: String,
    http: Client,
}

impl OpenWeatherProvider {
    pub fn new(api_key: String) -> anyhow::Result<Self> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Point the client at another endpoint (tests, proxies) with a per-call timeout.
    pub fn with_base_url(api_key: String, base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client for OpenWeather")?;

        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    async fn fetch_current(&self, city: &str) -> Result<WeatherSnapshot, FetchError> {
        let url = format!("{}{}", self.base_url, CURRENT_WEATHER_PATH);

        let res = self
            .http
            .get(&url)
            .query(&[("q", city), ("appid", self.api_key.as_str()), ("units", "metric")])
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;

        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(city.to_string()));
        }

        if !status.is_success() {
            return Err(FetchError::Network(format!(
                "OpenWeather request for '{}' failed with status {}: {}",
                city,
                status,
                truncate_body(&body),
            )));
        }

        let parsed: OwCurrentResponse = serde_json::from_str(&body).map_err(|e| {
            FetchError::Malformed(format!(
                "Failed to parse OpenWeather JSON for '{city}': {e}: {}",
                truncate_body(&body)
            ))
        })?;

        if parsed.cod.as_ref().is_some_and(is_not_found_code) {
            return Err(FetchError::NotFound(city.to_string()));
        }

        snapshot_from(parsed).ok_or_else(|| {
            FetchError::Malformed(format!(
                "OpenWeather response for '{city}' has neither temperature nor conditions"
            ))
        })
    }
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    main: Option<String>,
    description: Option<String>,
    icon: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    #[serde(default)]
    cod: Option<serde_json::Value>,
    main: Option<OwMain>,
    #[serde(default)]
    weather: Vec<OwWeather>,
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    async fn fetch(&self, city: &str) -> Result<WeatherSnapshot, FetchError> {
        if city.trim().is_empty() {
            return Err(FetchError::NotFound(city.to_string()));
        }

        tracing::debug!(city, "fetching current weather");
        self.fetch_current(city).await
    }
}

/// First condition entry wins; no entries leaves icon and condition absent.
fn snapshot_from(parsed: OwCurrentResponse) -> Option<WeatherSnapshot> {
    let temperature = parsed.main.and_then(|m| m.temp);
    let first = parsed.weather.into_iter().next();

    if temperature.is_none() && first.is_none() {
        return None;
    }

    let (condition, icon_code) = match first {
        Some(w) => (w.main.or(w.description), w.icon),
        None => (None, None),
    };

    Some(WeatherSnapshot { icon_code, temperature, condition })
}

// OpenWeather reports `cod` as a number on success and sometimes as a string on errors.
fn is_not_found_code(cod: &serde_json::Value) -> bool {
    match cod {
        serde_json::Value::Number(n) => n.as_u64() == Some(404),
        serde_json::Value::String(s) => s.trim() == "404",
        _ => false,
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> OpenWeatherProvider {
        OpenWeatherProvider::with_base_url("TEST_KEY".into(), &server.uri(), Duration::from_secs(2))
            .expect("client")
    }

    #[tokio::test]
    async fn test_fetch_success_takes_first_condition() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .and(query_param("q", "London"))
            .and(query_param("appid", "TEST_KEY"))
            .and(query_param("units", "metric"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "cod": 200,
                "name": "London",
                "main": {"temp": 15.0, "humidity": 80},
                "weather": [
                    {"main": "Clouds", "description": "broken clouds", "icon": "04d"},
                    {"main": "Mist", "description": "mist", "icon": "50d"}
                ]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let snapshot = provider(&mock_server).fetch("London").await.unwrap();

        assert_eq!(snapshot.temperature, Some(15.0));
        assert_eq!(snapshot.condition.as_deref(), Some("Clouds"));
        assert_eq!(snapshot.icon_code.as_deref(), Some("04d"));
    }

    #[tokio::test]
    async fn test_fetch_without_conditions_keeps_temperature() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "main": {"temp": -2.5},
                "weather": []
            })))
            .mount(&mock_server)
            .await;

        let snapshot = provider(&mock_server).fetch("Oslo").await.unwrap();

        assert_eq!(snapshot.temperature, Some(-2.5));
        assert_eq!(snapshot.condition, None);
        assert_eq!(snapshot.icon_code, None);
    }

    #[tokio::test]
    async fn test_fetch_404_is_not_found() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "cod": "404",
                "message": "city not found"
            })))
            .mount(&mock_server)
            .await;

        let err = provider(&mock_server).fetch("Atlantis").await.unwrap_err();
        assert_eq!(err, FetchError::NotFound("Atlantis".into()));
    }

    #[tokio::test]
    async fn test_fetch_not_found_code_in_ok_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "cod": "404",
                "message": "city not found"
            })))
            .mount(&mock_server)
            .await;

        let err = provider(&mock_server).fetch("Atlantis").await.unwrap_err();
        assert!(matches!(err, FetchError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_fetch_server_error_is_network() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
            .mount(&mock_server)
            .await;

        let err = provider(&mock_server).fetch("Paris").await.unwrap_err();
        match err {
            FetchError::Network(msg) => {
                assert!(msg.contains("503"));
                assert!(msg.contains("upstream down"));
            }
            other => panic!("expected network error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_garbage_is_malformed() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&mock_server)
            .await;

        let err = provider(&mock_server).fetch("Paris").await.unwrap_err();
        assert!(matches!(err, FetchError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_fetch_empty_object_is_malformed() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"cod": 200})))
            .mount(&mock_server)
            .await;

        let err = provider(&mock_server).fetch("Paris").await.unwrap_err();
        assert!(matches!(err, FetchError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_fetch_timeout_is_network() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"main": {"temp": 1.0}}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&mock_server)
            .await;

        let provider = OpenWeatherProvider::with_base_url(
            "TEST_KEY".into(),
            &mock_server.uri(),
            Duration::from_millis(50),
        )
        .unwrap();

        let err = provider.fetch("Paris").await.unwrap_err();
        assert!(matches!(err, FetchError::Network(_)));
    }

    #[tokio::test]
    async fn test_blank_name_skips_network() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let err = provider(&mock_server).fetch("   ").await.unwrap_err();
        assert!(matches!(err, FetchError::NotFound(_)));
    }

    #[test]
    fn truncate_body_respects_char_boundaries() {
        let body = "é".repeat(150);
        let out = truncate_body(&body);
        assert!(out.ends_with("..."));
        assert!(out.len() <= 203);
    }
}
