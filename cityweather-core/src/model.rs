use serde::{Deserialize, Serialize};
use std::fmt;

const ICON_URL_BASE: &str = "https://openweathermap.org/img/wn";

/// Store-assigned identifier of a city record. Never reused after deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CityId(pub i64);

impl fmt::Display for CityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Weather attributes extracted from one successful provider fetch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub icon_code: Option<String>,
    pub temperature: Option<f64>,
    pub condition: Option<String>,
}

/// A tracked city and its last known weather.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityRecord {
    pub id: CityId,
    pub name: String,
    pub icon_code: Option<String>,
    pub temperature: Option<f64>,
    pub condition: Option<String>,
}

impl CityRecord {
    /// A freshly added city with no weather yet.
    pub fn new(id: CityId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            icon_code: None,
            temperature: None,
            condition: None,
        }
    }

    pub fn snapshot(&self) -> WeatherSnapshot {
        WeatherSnapshot {
            icon_code: self.icon_code.clone(),
            temperature: self.temperature,
            condition: self.condition.clone(),
        }
    }

    /// Whether any weather field has ever been filled in.
    pub fn has_weather(&self) -> bool {
        self.icon_code.is_some() || self.temperature.is_some() || self.condition.is_some()
    }

    /// Replace the weather fields with a successfully fetched snapshot.
    ///
    /// `id` and `name` are left alone. Only call this with data from a
    /// successful fetch; failures must leave the record as it is.
    pub fn apply_snapshot(&mut self, snapshot: &WeatherSnapshot) {
        self.icon_code = snapshot.icon_code.clone();
        self.temperature = snapshot.temperature;
        self.condition = snapshot.condition.clone();
    }

    /// Image URL for the provider icon, if one is known.
    pub fn icon_url(&self) -> Option<String> {
        self.icon_code.as_deref().map(|icon| format!("{ICON_URL_BASE}/{icon}@2x.png"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cloudy() -> WeatherSnapshot {
        WeatherSnapshot {
            icon_code: Some("04d".into()),
            temperature: Some(15.0),
            condition: Some("Clouds".into()),
        }
    }

    #[test]
    fn new_record_has_no_weather() {
        let rec = CityRecord::new(CityId(1), "London");
        assert!(!rec.has_weather());
        assert_eq!(rec.snapshot(), WeatherSnapshot::default());
        assert_eq!(rec.icon_url(), None);
    }

    #[test]
    fn apply_snapshot_keeps_identity() {
        let mut rec = CityRecord::new(CityId(7), "London");
        rec.apply_snapshot(&cloudy());

        assert_eq!(rec.id, CityId(7));
        assert_eq!(rec.name, "London");
        assert_eq!(rec.snapshot(), cloudy());
        assert!(rec.has_weather());
    }

    #[test]
    fn apply_snapshot_replaces_all_weather_fields() {
        let mut rec = CityRecord::new(CityId(1), "Oslo");
        rec.apply_snapshot(&cloudy());

        // Temperature only: condition and icon are replaced too.
        let bare = WeatherSnapshot { temperature: Some(-3.5), ..Default::default() };
        rec.apply_snapshot(&bare);

        assert_eq!(rec.temperature, Some(-3.5));
        assert_eq!(rec.condition, None);
        assert_eq!(rec.icon_code, None);
    }

    #[test]
    fn icon_url_uses_provider_image_host() {
        let mut rec = CityRecord::new(CityId(1), "London");
        rec.apply_snapshot(&cloudy());
        assert_eq!(rec.icon_url().as_deref(), Some("https://openweathermap.org/img/wn/04d@2x.png"));
    }

    #[test]
    fn id_serializes_as_plain_integer() {
        let rec = CityRecord::new(CityId(3), "Paris");
        let json = serde_json::to_value(&rec).expect("serialize");
        assert_eq!(json["id"], 3);
        assert_eq!(json["temperature"], serde_json::Value::Null);
    }
}
