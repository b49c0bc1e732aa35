//! Structural checks for dataset descriptions and data group records.

use std::collections::BTreeMap;

use crate::error::ValidationError;
use crate::types::{ColumnSpec, DataGroup, DatasetFile};

fn invalid(reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidDataset {
        reason: reason.into(),
    }
}

/// Validate a dataset description before ingestion.
pub fn validate_dataset_file(dataset: &DatasetFile) -> Result<(), ValidationError> {
    if dataset.path.is_empty() {
        return Err(invalid("No path in datafile specification"));
    }
    if dataset.file_format.is_empty() {
        return Err(invalid("No file format in datafile specification"));
    }
    if dataset.n_rows == 0 {
        return Err(invalid("No rows size in datafile specification"));
    }
    if dataset.n_cols == 0 {
        return Err(invalid("No columns size in datafile specification"));
    }
    if dataset.columns.exclusive_types.is_empty() {
        return Err(invalid("No exclusive types in datafile specification"));
    }
    if dataset.columns.tags.is_empty() {
        return Err(invalid("No tags in datafile specification"));
    }
    check_columns(dataset.n_cols, &dataset.columns)
}

/// Validate a data group record. Unlike dataset files, tags may be empty.
pub fn validate_data_group(group: &DataGroup) -> Result<(), ValidationError> {
    if group.file_format.is_empty() {
        return Err(invalid("Data group has no file format"));
    }
    if group.n_cols == 0 {
        return Err(invalid("Data group has no columns"));
    }
    if group.columns.exclusive_types.is_empty() {
        return Err(invalid("Data group has no exclusive type"));
    }
    check_columns(group.n_cols, &group.columns)
}

/// Exclusive types must partition `0..n_cols`; tags only need to be in range.
///
/// Every column is accounted for individually, so a duplicated index cannot
/// hide a missing one. Ownership is tracked per claimed index, so the cost
/// follows the declared indices rather than `n_cols`.
pub fn check_columns(n_cols: usize, columns: &ColumnSpec) -> Result<(), ValidationError> {
    let mut owner: BTreeMap<usize, &str> = BTreeMap::new();
    for (etype, indices) in &columns.exclusive_types {
        for &index in indices {
            if index >= n_cols {
                return Err(invalid(format!(
                    "Type {etype} has an index not in range [0,number of cols)"
                )));
            }
            if let Some(previous) = owner.insert(index, etype.as_str()) {
                return Err(invalid(format!(
                    "Column {index} is claimed by both {previous} and {etype}"
                )));
            }
        }
    }
    if owner.len() != n_cols {
        // Keys are distinct and below n_cols, so the first mismatch is a gap.
        let gap = owner
            .keys()
            .enumerate()
            .find(|(expected, index)| expected != *index)
            .map_or(owner.len(), |(expected, _)| expected);
        return Err(invalid(format!("Column {gap} has no exclusive type")));
    }

    for (tag, indices) in &columns.tags {
        if indices.iter().any(|&index| index >= n_cols) {
            return Err(invalid(format!(
                "Tag {tag} has an index not in range [0,number of cols)"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(exclusive: &[(&str, &[usize])], tags: &[(&str, &[usize])], n_cols: usize) -> DatasetFile {
        let to_map = |pairs: &[(&str, &[usize])]| -> BTreeMap<String, Vec<usize>> {
            pairs
                .iter()
                .map(|(name, idx)| (name.to_string(), idx.to_vec()))
                .collect()
        };
        DatasetFile {
            path: "iris.csv".into(),
            file_format: "csv".into(),
            n_rows: 150,
            n_cols,
            columns: ColumnSpec {
                exclusive_types: to_map(exclusive),
                tags: to_map(tags),
            },
        }
    }

    #[test]
    fn test_well_formed_dataset() {
        let ds = dataset(
            &[("real", &[0, 1, 2, 3]), ("categorical", &[4])],
            &[("label", &[4]), ("features", &[0, 1, 2, 3])],
            5,
        );
        assert!(validate_dataset_file(&ds).is_ok());
    }

    #[test]
    fn test_header_fields_required() {
        let good = dataset(&[("real", &[0])], &[("x", &[0])], 1);

        let mut ds = good.clone();
        ds.path.clear();
        assert!(validate_dataset_file(&ds).is_err());

        let mut ds = good.clone();
        ds.file_format.clear();
        assert!(validate_dataset_file(&ds).is_err());

        let mut ds = good.clone();
        ds.n_rows = 0;
        assert!(validate_dataset_file(&ds).is_err());

        let mut ds = good.clone();
        ds.columns.tags.clear();
        assert!(validate_dataset_file(&ds).is_err());

        let mut ds = good;
        ds.columns.exclusive_types.clear();
        assert!(validate_dataset_file(&ds).is_err());
    }

    #[test]
    fn test_index_out_of_range() {
        let ds = dataset(&[("real", &[0, 3])], &[("x", &[0])], 3);
        let err = validate_dataset_file(&ds).unwrap_err();
        assert!(err.to_string().contains("not in range"));

        let ds = dataset(&[("real", &[0, 1, 2])], &[("x", &[5])], 3);
        let err = validate_dataset_file(&ds).unwrap_err();
        assert!(err.to_string().contains("Tag x"));
    }

    #[test]
    fn test_sum_preserving_permutation_is_rejected() {
        // {0, 2, 2} sums to the same value as {0, 1, 2}.
        let ds = dataset(&[("real", &[0, 2]), ("text", &[2])], &[("x", &[0])], 3);
        let err = validate_dataset_file(&ds).unwrap_err();
        assert!(err.to_string().contains("claimed by both"));
    }

    #[test]
    fn test_gap_is_rejected() {
        let ds = dataset(&[("real", &[0, 2])], &[("x", &[0])], 3);
        let err = validate_dataset_file(&ds).unwrap_err();
        assert!(err.to_string().contains("Column 1 has no exclusive type"));
    }

    #[test]
    fn test_huge_column_count_is_rejected_without_allocating() {
        let ds = dataset(&[("real", &[0])], &[("x", &[0])], usize::MAX / 4);
        let err = validate_dataset_file(&ds).unwrap_err();
        assert!(err.to_string().contains("Column 1 has no exclusive type"));

        let ds = dataset(&[("real", &[0, 1])], &[("x", &[0])], usize::MAX);
        let err = validate_dataset_file(&ds).unwrap_err();
        assert!(err.to_string().contains("Column 2 has no exclusive type"));
    }

    #[test]
    fn test_tags_may_overlap() {
        let ds = dataset(&[("real", &[0, 1])], &[("a", &[0, 1]), ("b", &[1])], 2);
        assert!(validate_dataset_file(&ds).is_ok());
    }
}
