//! Data-side records: the type lattice, dataset descriptions, data groups and
//! opaque state blobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A named column type. Parents form a multiple-inheritance lattice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataType {
    pub name: String,
    #[serde(default)]
    pub parents: BTreeSet<String>,
}

impl DataType {
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parents: BTreeSet::new(),
        }
    }

    pub fn with_parents<I, S>(name: impl Into<String>, parents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            parents: parents.into_iter().map(Into::into).collect(),
        }
    }
}

/// Column ownership for a dataset or data group.
///
/// `exclusive_types` must partition the columns; `tags` may overlap freely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    #[serde(default)]
    pub exclusive_types: BTreeMap<String, Vec<usize>>,
    #[serde(default)]
    pub tags: BTreeMap<String, Vec<usize>>,
}

impl ColumnSpec {
    /// The single exclusive type of a homogeneous group, if there is exactly one.
    pub fn sole_exclusive_type(&self) -> Option<&str> {
        if self.exclusive_types.len() == 1 {
            self.exclusive_types.keys().next().map(String::as_str)
        } else {
            None
        }
    }
}

/// Description of an input dataset file to ingest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetFile {
    pub path: String,
    pub file_format: String,
    pub n_rows: u64,
    pub n_cols: usize,
    pub columns: ColumnSpec,
}

/// Where a data group came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GroupSource {
    /// Split out of an ingested dataset file.
    Dataset { path: String },
    /// Written by an induced transform's output binding.
    Transform {
        induced_transform_id: String,
        output: String,
    },
}

impl GroupSource {
    /// Id of the producing induced transform, if any.
    pub fn producer(&self) -> Option<&str> {
        match self {
            Self::Dataset { .. } => None,
            Self::Transform {
                induced_transform_id,
                ..
            } => Some(induced_transform_id),
        }
    }
}

/// A homogeneous column group stored as one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataGroup {
    pub n_rows: u64,
    pub n_cols: usize,
    pub file_format: String,
    pub source: GroupSource,
    pub columns: ColumnSpec,
}

/// An opaque model/state blob produced as a side artifact of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    pub source: String,
    pub created_at: DateTime<Utc>,
}

impl State {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            created_at: Utc::now(),
        }
    }
}
