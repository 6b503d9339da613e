//! Keeps stored cities in step with the weather provider.
//!
//! A failed fetch never touches the stored record: weather fields only move
//! forward on success. Per-city failures are collected into a [`SyncReport`];
//! only store faults abort an operation.

use anyhow::Context;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::Arc,
};
use thiserror::Error;

use crate::{
    Config,
    model::{CityId, CityRecord},
    provider::{FetchError, WeatherProvider, provider_from_config},
    store::{CityStore, SqliteCityStore, StoreError},
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    #[error("city name must not be empty")]
    InvalidName,

    #[error("a city named '{0}' already exists")]
    DuplicateName(String),

    #[error("city not found: {0}")]
    NotFound(String),

    #[error("storage fault: {0}")]
    Storage(String),

    /// No weather provider is configured, so nothing can be fetched.
    #[error("weather provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateName(name) => Self::DuplicateName(name),
            StoreError::NotFound(what) => Self::NotFound(what),
            StoreError::Storage(msg) => Self::Storage(msg),
        }
    }
}

/// Outcome of one batch refresh. Keyed by city name; carries no ordering.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    pub succeeded: BTreeSet<String>,
    pub failed: BTreeMap<String, FetchError>,
}

impl SyncReport {
    /// True when every city that was attempted got fresh data.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of adding a city. The record exists even when the first fetch failed.
#[derive(Debug, Clone, PartialEq)]
pub struct AddOutcome {
    pub record: CityRecord,
    pub fetch_error: Option<FetchError>,
}

pub struct SyncEngine {
    store: Arc<dyn CityStore>,
    provider: Result<Arc<dyn WeatherProvider>, String>,
    max_concurrent: usize,
}

impl fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncEngine")
            .field("provider", &self.provider.as_ref().ok())
            .field("max_concurrent", &self.max_concurrent)
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    pub fn new(store: Arc<dyn CityStore>, provider: Arc<dyn WeatherProvider>) -> Self {
        Self {
            store,
            provider: Ok(provider),
            max_concurrent: crate::config::DEFAULT_MAX_CONCURRENT_FETCHES,
        }
    }

    /// Engine over a store alone. Reads and removals work; anything that
    /// fetches fails with [`SyncError::ProviderUnavailable`] carrying `reason`.
    pub fn without_provider(store: Arc<dyn CityStore>, reason: impl Into<String>) -> Self {
        Self {
            store,
            provider: Err(reason.into()),
            max_concurrent: crate::config::DEFAULT_MAX_CONCURRENT_FETCHES,
        }
    }

    fn provider(&self) -> Result<&Arc<dyn WeatherProvider>, SyncError> {
        self.provider.as_ref().map_err(|reason| SyncError::ProviderUnavailable(reason.clone()))
    }

    /// Cap on simultaneous provider calls during `refresh_all`.
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// SQLite store at the configured path plus the OpenWeather client.
    ///
    /// A missing API key does not fail here: the store is still usable for
    /// listing, lookups and removal, and fetching operations report why the
    /// provider is unavailable.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let db_path = config.database_path()?;
        let store: Arc<dyn CityStore> = Arc::new(
            SqliteCityStore::open(&db_path)
                .with_context(|| format!("Failed to open city store at {}", db_path.display()))?,
        );

        let engine = match provider_from_config(config) {
            Ok(provider) => Self::new(store, Arc::new(provider)),
            Err(err) => {
                tracing::debug!(error = %err, "weather provider not configured");
                Self::without_provider(store, err.to_string())
            }
        };

        Ok(engine.with_max_concurrent(config.max_concurrent_fetches()))
    }

    /// Fetch every stored city and merge successful results.
    ///
    /// Each success is committed as soon as it arrives, so dropping the
    /// returned future keeps whatever already landed. A city removed while
    /// its fetch was in flight is left out of the report.
    pub async fn refresh_all(&self) -> Result<SyncReport, SyncError> {
        let provider = self.provider()?;
        let cities = self.store.get_all()?;
        tracing::debug!(count = cities.len(), max_concurrent = self.max_concurrent, "refreshing all cities");

        let mut results = stream::iter(cities)
            .map(|city| async move {
                let outcome = provider.fetch(&city.name).await;
                (city, outcome)
            })
            .buffer_unordered(self.max_concurrent);

        let mut report = SyncReport::default();
        while let Some((city, outcome)) = results.next().await {
            match outcome {
                Ok(snapshot) => match self.store.apply_snapshot(city.id, &snapshot) {
                    Ok(_) => {
                        report.succeeded.insert(city.name);
                    }
                    Err(StoreError::NotFound(_)) => {
                        tracing::debug!(city = %city.name, "city removed during refresh, skipping");
                    }
                    Err(err) => return Err(err.into()),
                },
                Err(err) => {
                    tracing::warn!(city = %city.name, error = %err, "weather fetch failed");
                    report.failed.insert(city.name, err);
                }
            }
        }

        tracing::info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "refresh finished"
        );
        Ok(report)
    }

    /// Fetch one city by name and merge on success.
    pub async fn refresh_city(&self, name: &str) -> Result<CityRecord, SyncError> {
        let provider = self.provider()?;
        let city = self.store.get_by_name(name)?;
        let snapshot = provider.fetch(&city.name).await.inspect_err(|err| {
            tracing::warn!(city = %city.name, error = %err, "weather fetch failed");
        })?;

        Ok(self.store.apply_snapshot(city.id, &snapshot)?)
    }

    /// Insert a new city, then try once to fill in its weather.
    ///
    /// Duplicate names are an error. A failed first fetch is not: the city
    /// stays with no weather and the failure is handed back in the outcome.
    /// If the city is removed before its first fetch lands, the add reports
    /// [`SyncError::NotFound`].
    pub async fn add_city(&self, name: &str) -> Result<AddOutcome, SyncError> {
        if name.trim().is_empty() {
            return Err(SyncError::InvalidName);
        }
        let provider = self.provider()?;

        let record = self.store.insert(name)?;
        tracing::info!(city = %record.name, id = %record.id, "city added");

        match provider.fetch(&record.name).await {
            Ok(snapshot) => match self.store.apply_snapshot(record.id, &snapshot) {
                Ok(record) => Ok(AddOutcome { record, fetch_error: None }),
                Err(StoreError::NotFound(_)) => {
                    tracing::debug!(city = %record.name, "city removed before first fetch landed");
                    Err(SyncError::NotFound(record.name))
                }
                Err(err) => Err(err.into()),
            },
            Err(err) => {
                tracing::warn!(city = %record.name, error = %err, "initial weather fetch failed");
                Ok(AddOutcome { record, fetch_error: Some(err) })
            }
        }
    }

    pub fn remove_city(&self, id: CityId) -> Result<(), SyncError> {
        self.store.delete(id)?;
        tracing::info!(%id, "city removed");
        Ok(())
    }

    pub fn list_cities(&self) -> Result<Vec<CityRecord>, SyncError> {
        Ok(self.store.get_all()?)
    }

    pub fn get_by_name(&self, name: &str) -> Result<CityRecord, SyncError> {
        Ok(self.store.get_by_name(name)?)
    }
}
