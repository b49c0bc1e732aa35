//! Process-local record store.

use std::collections::BTreeMap;
use std::sync::RwLock;

use uuid::Uuid;

use super::{Record, RecordKind, RecordStore};
use crate::error::StoreError;

/// In-memory record store for tests and throwaway pipelines.
pub struct InMemoryRecordStore {
    records: RwLock<BTreeMap<(RecordKind, String), Record>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
        }
    }

    /// Total number of stored records across all kinds.
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn poisoned() -> StoreError {
        StoreError::Backend {
            message: "in-memory record store lock poisoned".into(),
        }
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn add(&self, record: Record) -> Result<String, StoreError> {
        let id = Uuid::new_v4().simple().to_string();
        let mut records = self.records.write().map_err(|_| Self::poisoned())?;
        records.insert((record.kind(), id.clone()), record);
        Ok(id)
    }

    fn update(&self, id: &str, record: Record) -> Result<(), StoreError> {
        let mut records = self.records.write().map_err(|_| Self::poisoned())?;
        let key = (record.kind(), id.to_string());
        match records.get_mut(&key) {
            Some(slot) => {
                *slot = record;
                Ok(())
            }
            None => Err(StoreError::NotFound {
                kind: key.0,
                id: key.1,
            }),
        }
    }

    fn get(&self, kind: RecordKind, id: &str) -> Result<Record, StoreError> {
        let records = self.records.read().map_err(|_| Self::poisoned())?;
        records
            .get(&(kind, id.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind,
                id: id.to_string(),
            })
    }

    fn get_all(&self, kind: RecordKind) -> Result<Vec<String>, StoreError> {
        let records = self.records.read().map_err(|_| Self::poisoned())?;
        Ok(records
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, id)| id.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DataType, State};

    #[test]
    fn test_add_get_roundtrip() {
        let store = InMemoryRecordStore::new();
        let id = store.add(Record::DataType(DataType::root("any"))).unwrap();
        let record = store.get(RecordKind::DataType, &id).unwrap();
        assert_eq!(record, Record::DataType(DataType::root("any")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_update_requires_existing_id() {
        let store = InMemoryRecordStore::new();
        let err = store
            .update("missing", Record::State(State::new("x")))
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { kind: RecordKind::State, .. }));
    }

    #[test]
    fn test_update_replaces_body() {
        let store = InMemoryRecordStore::new();
        let id = store.add(Record::State(State::new("first"))).unwrap();
        store.update(&id, Record::State(State::new("second"))).unwrap();
        match store.get(RecordKind::State, &id).unwrap() {
            Record::State(state) => assert_eq!(state.source, "second"),
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn test_get_all_filters_by_kind() {
        let store = InMemoryRecordStore::new();
        store.add(Record::State(State::new("a"))).unwrap();
        store.add(Record::State(State::new("b"))).unwrap();
        store.add(Record::DataType(DataType::root("any"))).unwrap();
        assert_eq!(store.get_all(RecordKind::State).unwrap().len(), 2);
        assert_eq!(store.get_all(RecordKind::DataType).unwrap().len(), 1);
        assert!(store.get_all(RecordKind::Transform).unwrap().is_empty());
    }
}
