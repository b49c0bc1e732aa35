//! Property-based tests for key derivation and column validation.

use proptest::prelude::*;

use protoml_core::keystore::{key_path, DIRECTORY_DEPTH, HEX_CHARS_PER_LEVEL};
use protoml_core::types::ColumnSpec;
use protoml_core::validator::check_columns;

// --- Key path properties ---

proptest! {
    #[test]
    fn key_path_is_deterministic(key in ".*") {
        prop_assert_eq!(key_path(&key), key_path(&key));
    }

    #[test]
    fn key_path_has_fixed_shape(key in ".*") {
        let path = key_path(&key);
        let segments: Vec<String> = path
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        prop_assert_eq!(segments.len(), DIRECTORY_DEPTH);
        for segment in segments {
            prop_assert_eq!(segment.len(), HEX_CHARS_PER_LEVEL);
            prop_assert!(segment.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
        }
    }

    #[test]
    fn distinct_suffixes_give_distinct_paths(id in "[a-z0-9]{1,32}") {
        prop_assert_ne!(key_path(&format!("{id}.data")), key_path(&format!("{id}.state")));
    }
}

// --- Exclusive type coverage ---

proptest! {
    #[test]
    fn any_partition_of_columns_is_accepted(
        assignment in proptest::collection::vec(0usize..4, 1..40),
    ) {
        let mut columns = ColumnSpec::default();
        for (index, owner) in assignment.iter().enumerate() {
            columns
                .exclusive_types
                .entry(format!("type{owner}"))
                .or_default()
                .push(index);
        }
        prop_assert!(check_columns(assignment.len(), &columns).is_ok());
    }

    #[test]
    fn duplicated_column_is_rejected(
        n_cols in 2usize..40,
        dup in 0usize..40,
    ) {
        let dup = dup % n_cols;
        let mut indices: Vec<usize> = (0..n_cols).collect();
        indices.push(dup);
        let mut columns = ColumnSpec::default();
        columns.exclusive_types.insert("real".into(), indices);
        prop_assert!(check_columns(n_cols, &columns).is_err());
    }

    #[test]
    fn missing_column_is_rejected(
        n_cols in 2usize..40,
        gap in 0usize..40,
    ) {
        let gap = gap % n_cols;
        let indices: Vec<usize> = (0..n_cols).filter(|&i| i != gap).collect();
        let mut columns = ColumnSpec::default();
        columns.exclusive_types.insert("real".into(), indices);
        prop_assert!(check_columns(n_cols, &columns).is_err());
    }
}
