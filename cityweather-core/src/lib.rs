//! Core library for the `cityweather` CLI.
//!
//! This crate defines:
//! - Configuration handling
//! - The weather provider client
//! - Persistence for the tracked city list
//! - The sync engine that merges fetched weather into stored cities
//!
//! It is used by `cityweather-cli`, but any front end can drive [`SyncEngine`]
//! and render what [`SyncEngine::list_cities`] returns.

pub mod config;
pub mod model;
pub mod provider;
pub mod store;
pub mod sync;

pub use config::Config;
pub use model::{CityId, CityRecord, WeatherSnapshot};
pub use provider::{FetchError, OpenWeatherProvider, WeatherProvider};
pub use store::{CityStore, MemoryCityStore, SqliteCityStore, StoreError};
pub use sync::{AddOutcome, SyncEngine, SyncError, SyncReport};
