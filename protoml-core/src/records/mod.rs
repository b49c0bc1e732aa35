//! Typed record persistence.
//!
//! The document index is modeled as a [`RecordStore`]: four CRUD calls over a
//! tagged [`Record`] union. Backends:
//! - [`InMemoryRecordStore`]: process-local, for tests and dry runs.
//! - [`SqliteRecordStore`]: single-file SQLite index via `rusqlite`.
//!
//! Both backends commit synchronously, so a read issued after a write
//! returns always observes it.

pub mod memory;
pub mod sqlite;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::fmt;

use crate::error::StoreError;
use crate::types::{DataGroup, DataType, InducedTransform, State, Transform};

pub use memory::InMemoryRecordStore;
pub use sqlite::SqliteRecordStore;

/// Record kinds the index distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    DataType,
    DataGroup,
    Transform,
    InducedTransform,
    State,
}

impl RecordKind {
    pub const ALL: [RecordKind; 5] = [
        RecordKind::DataType,
        RecordKind::DataGroup,
        RecordKind::Transform,
        RecordKind::InducedTransform,
        RecordKind::State,
    ];

    /// Stable short name used as the index type.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::DataType => "datatype",
            RecordKind::DataGroup => "data",
            RecordKind::Transform => "transform",
            RecordKind::InducedTransform => "itransform",
            RecordKind::State => "state",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored document, tagged with its kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum Record {
    DataType(DataType),
    DataGroup(DataGroup),
    Transform(Transform),
    InducedTransform(InducedTransform),
    State(State),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::DataType(_) => RecordKind::DataType,
            Record::DataGroup(_) => RecordKind::DataGroup,
            Record::Transform(_) => RecordKind::Transform,
            Record::InducedTransform(_) => RecordKind::InducedTransform,
            Record::State(_) => RecordKind::State,
        }
    }
}

/// CRUD access to the document index.
pub trait RecordStore: Send + Sync {
    /// Persist a new record and return its generated id.
    fn add(&self, record: Record) -> Result<String, StoreError>;

    /// Replace the record stored under `id`. The kind must not change.
    fn update(&self, id: &str, record: Record) -> Result<(), StoreError>;

    /// Fetch a record of `kind` by id.
    fn get(&self, kind: RecordKind, id: &str) -> Result<Record, StoreError>;

    /// All ids of `kind`, in a stable order.
    fn get_all(&self, kind: RecordKind) -> Result<Vec<String>, StoreError>;
}

macro_rules! typed_getter {
    ($(#[$doc:meta])* $fn_name:ident, $variant:ident, $ty:ty) => {
        $(#[$doc])*
        fn $fn_name(&self, id: &str) -> Result<$ty, StoreError> {
            match self.get(RecordKind::$variant, id)? {
                Record::$variant(value) => Ok(value),
                other => Err(StoreError::KindMismatch {
                    expected: RecordKind::$variant,
                    found: other.kind(),
                }),
            }
        }
    };
}

/// Typed helpers layered over any [`RecordStore`].
pub trait RecordStoreExt: RecordStore {
    typed_getter!(get_data_group, DataGroup, DataGroup);
    typed_getter!(get_transform, Transform, Transform);
    typed_getter!(
        /// Fetch an induced transform, decoding the body as such.
        get_induced_transform,
        InducedTransform,
        InducedTransform
    );
    typed_getter!(get_state, State, State);

    /// Look up a data type by name.
    fn find_data_type(&self, name: &str) -> Result<Option<(String, DataType)>, StoreError> {
        for id in self.get_all(RecordKind::DataType)? {
            if let Record::DataType(dtype) = self.get(RecordKind::DataType, &id)? {
                if dtype.name == name {
                    return Ok(Some((id, dtype)));
                }
            }
        }
        Ok(None)
    }

    /// Every ancestor of `name`, breadth-first, without duplicates.
    ///
    /// Fails with `NotFound` if `name` or any ancestor is missing.
    fn data_type_ancestors(&self, name: &str) -> Result<Vec<String>, StoreError> {
        let mut queue = VecDeque::from([name.to_string()]);
        let mut seen = BTreeSet::new();
        let mut ancestors = Vec::new();
        while let Some(current) = queue.pop_front() {
            let (_, dtype) =
                self.find_data_type(&current)?
                    .ok_or_else(|| StoreError::NotFound {
                        kind: RecordKind::DataType,
                        id: current.clone(),
                    })?;
            for parent in dtype.parents {
                if seen.insert(parent.clone()) {
                    ancestors.push(parent.clone());
                    queue.push_back(parent);
                }
            }
        }
        Ok(ancestors)
    }

    /// Whether `ancestor` is a strict ancestor of `child`.
    fn is_data_type_ancestor(&self, child: &str, ancestor: &str) -> Result<bool, StoreError> {
        Ok(self
            .data_type_ancestors(child)?
            .iter()
            .any(|name| name == ancestor))
    }
}

impl<T: RecordStore + ?Sized> RecordStoreExt for T {}
