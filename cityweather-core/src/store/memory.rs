use parking_lot::Mutex;

use super::{CityStore, StoreError, StoreResult};
use crate::model::{CityId, CityRecord, WeatherSnapshot};

/// Volatile store kept in a `Vec`, in insertion order.
#[derive(Debug, Default)]
pub struct MemoryCityStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    records: Vec<CityRecord>,
    last_id: i64,
}

impl MemoryCityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CityStore for MemoryCityStore {
    fn insert(&self, name: &str) -> StoreResult<CityRecord> {
        let mut inner = self.inner.lock();
        if inner.records.iter().any(|c| c.name == name) {
            return Err(StoreError::DuplicateName(name.to_string()));
        }

        inner.last_id += 1;
        let record = CityRecord::new(CityId(inner.last_id), name);
        inner.records.push(record.clone());
        Ok(record)
    }

    fn get_by_name(&self, name: &str) -> StoreResult<CityRecord> {
        self.inner
            .lock()
            .records
            .iter()
            .find(|c| c.name == name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    fn get_by_id(&self, id: CityId) -> StoreResult<CityRecord> {
        self.inner
            .lock()
            .records
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("id {id}")))
    }

    fn get_all(&self) -> StoreResult<Vec<CityRecord>> {
        Ok(self.inner.lock().records.clone())
    }

    fn update(&self, record: &CityRecord) -> StoreResult<()> {
        let mut inner = self.inner.lock();

        if inner.records.iter().any(|c| c.name == record.name && c.id != record.id) {
            return Err(StoreError::DuplicateName(record.name.clone()));
        }

        let slot = inner
            .records
            .iter_mut()
            .find(|c| c.id == record.id)
            .ok_or_else(|| StoreError::NotFound(format!("id {}", record.id)))?;
        *slot = record.clone();
        Ok(())
    }

    fn delete(&self, id: CityId) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        let pos = inner
            .records
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("id {id}")))?;
        inner.records.remove(pos);
        Ok(())
    }

    fn count(&self) -> StoreResult<usize> {
        Ok(self.inner.lock().records.len())
    }

    fn apply_snapshot(&self, id: CityId, snapshot: &WeatherSnapshot) -> StoreResult<CityRecord> {
        let mut inner = self.inner.lock();
        let slot = inner
            .records
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("id {id}")))?;
        slot.apply_snapshot(snapshot);
        Ok(slot.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract;

    #[test]
    fn insert_and_lookup() {
        contract::insert_and_lookup(&MemoryCityStore::new());
    }

    #[test]
    fn duplicate_name_rejected() {
        contract::duplicate_name_rejected(&MemoryCityStore::new());
    }

    #[test]
    fn names_are_case_sensitive() {
        contract::names_are_case_sensitive(&MemoryCityStore::new());
    }

    #[test]
    fn get_all_in_insertion_order() {
        contract::get_all_in_insertion_order(&MemoryCityStore::new());
    }

    #[test]
    fn update_replaces_by_id() {
        contract::update_replaces_by_id(&MemoryCityStore::new());
    }

    #[test]
    fn update_unknown_id_fails() {
        contract::update_unknown_id_fails(&MemoryCityStore::new());
    }

    #[test]
    fn delete_is_final() {
        contract::delete_is_final(&MemoryCityStore::new());
    }

    #[test]
    fn apply_snapshot_merges() {
        contract::apply_snapshot_merges(&MemoryCityStore::new());
    }

    #[test]
    fn update_cannot_steal_another_name() {
        let store = MemoryCityStore::new();
        store.insert("London").unwrap();
        let mut paris = store.insert("Paris").unwrap();

        paris.name = "London".into();
        assert!(matches!(store.update(&paris), Err(StoreError::DuplicateName(_))));
        assert_eq!(store.get_by_id(paris.id).unwrap().name, "Paris");
    }

    #[test]
    fn concurrent_inserts_keep_names_unique() {
        let store = std::sync::Arc::new(MemoryCityStore::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || store.insert("London").is_ok())
            })
            .collect();

        let wins = handles.into_iter().map(|h| h.join().unwrap()).filter(|ok| *ok).count();
        assert_eq!(wins, 1);
        assert_eq!(store.count().unwrap(), 1);
    }
}
