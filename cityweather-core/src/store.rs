//! Persistence for city records.
//!
//! Every operation is atomic with respect to the unique-name invariant.
//! Calls are synchronous and short; backends serialize writers internally.

use crate::model::{CityId, CityRecord, WeatherSnapshot};
use thiserror::Error;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryCityStore;
pub use sqlite::SqliteCityStore;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("a city named '{0}' already exists")]
    DuplicateName(String),

    #[error("city not found: {0}")]
    NotFound(String),

    /// The backing storage is unavailable or failed.
    #[error("storage fault: {0}")]
    Storage(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

pub trait CityStore: Send + Sync {
    /// Create a record with no weather. Fails if the name is taken.
    fn insert(&self, name: &str) -> StoreResult<CityRecord>;

    fn get_by_name(&self, name: &str) -> StoreResult<CityRecord>;

    fn get_by_id(&self, id: CityId) -> StoreResult<CityRecord>;

    /// All records in insertion order.
    fn get_all(&self) -> StoreResult<Vec<CityRecord>>;

    /// Replace the record with the same id.
    fn update(&self, record: &CityRecord) -> StoreResult<()>;

    fn delete(&self, id: CityId) -> StoreResult<()>;

    fn count(&self) -> StoreResult<usize> {
        Ok(self.get_all()?.len())
    }

    /// Read the record, replace its weather fields, write it back.
    ///
    /// Backends override this to do the whole cycle under one lock.
    fn apply_snapshot(&self, id: CityId, snapshot: &WeatherSnapshot) -> StoreResult<CityRecord> {
        let mut record = self.get_by_id(id)?;
        record.apply_snapshot(snapshot);
        self.update(&record)?;
        Ok(record)
    }
}
