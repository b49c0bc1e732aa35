//! Dataset splitting.
//!
//! A dataset file is broken into one [`DataGroup`] per exclusive type. Actual
//! column extraction and format conversion live behind [`DatasetSplitter`];
//! the catalog only persists the groups and files the splitter hands back.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::types::{ColumnSpec, DataGroup, DatasetFile, GroupSource};

/// One group produced by a split, plus the column files backing it.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitGroup {
    pub group: DataGroup,
    /// Files written under the staging directory, in local column order.
    pub column_files: Vec<PathBuf>,
}

/// Splits a dataset file into homogeneous column groups.
pub trait DatasetSplitter: Send + Sync {
    /// `source` is the resolved dataset path; `staging_dir` is a scratch
    /// directory the splitter may write column files into.
    fn split(
        &self,
        dataset: &DatasetFile,
        source: &Path,
        staging_dir: &Path,
    ) -> Result<Vec<SplitGroup>>;
}

/// Metadata-only splitter: one group per exclusive type, no column files.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExclusiveTypeSplitter;

impl ExclusiveTypeSplitter {
    /// Column layout of the group holding `columns`, reindexed from zero.
    ///
    /// Tags are kept only for columns inside the group.
    pub fn local_columns(type_name: &str, columns: &[usize], spec: &ColumnSpec) -> ColumnSpec {
        let local: BTreeMap<usize, usize> = columns
            .iter()
            .enumerate()
            .map(|(position, &global)| (global, position))
            .collect();

        let tags = spec
            .tags
            .iter()
            .filter_map(|(tag, indices)| {
                let mapped: Vec<usize> = indices
                    .iter()
                    .filter_map(|global| local.get(global).copied())
                    .collect();
                (!mapped.is_empty()).then(|| (tag.clone(), mapped))
            })
            .collect();

        ColumnSpec {
            exclusive_types: BTreeMap::from([(type_name.to_string(), (0..columns.len()).collect())]),
            tags,
        }
    }
}

impl DatasetSplitter for ExclusiveTypeSplitter {
    fn split(
        &self,
        dataset: &DatasetFile,
        _source: &Path,
        _staging_dir: &Path,
    ) -> Result<Vec<SplitGroup>> {
        let groups = dataset
            .columns
            .exclusive_types
            .iter()
            .map(|(type_name, indices)| {
                let mut columns = indices.clone();
                columns.sort_unstable();
                SplitGroup {
                    group: DataGroup {
                        n_rows: dataset.n_rows,
                        n_cols: columns.len(),
                        file_format: dataset.file_format.clone(),
                        source: GroupSource::Dataset {
                            path: dataset.path.clone(),
                        },
                        columns: Self::local_columns(type_name, &columns, &dataset.columns),
                    },
                    column_files: Vec::new(),
                }
            })
            .collect();
        Ok(groups)
    }
}
