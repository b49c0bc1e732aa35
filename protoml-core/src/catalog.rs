//! Write path for every record kind.
//!
//! The catalog owns the record store, the key store and the pluggable
//! checker/splitter pair. Templates and datasets are validated up front and
//! rejected when invalid; induced transforms are always stored, with their
//! `error` field reflecting the latest validation outcome.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{KeyStoreError, Result, ValidationError};
use crate::ingest::{DatasetSplitter, ExclusiveTypeSplitter};
use crate::keystore::{self, KeyStore};
use crate::records::{Record, RecordStore, RecordStoreExt};
use crate::types::{DataGroup, DataType, DatasetFile, InducedTransform, State, Transform};
use crate::validator::{
    validate_data_group, validate_dataset_file, validate_transform, ConstraintChecker,
    DeclaredConstraints, TemplateValidator,
};

/// Data types seeded by [`Catalog::bootstrap`], parents first.
pub const DEFAULT_DATA_TYPES: &[(&str, &[&str])] = &[
    ("any", &[]),
    ("numeric", &["any"]),
    ("real", &["numeric"]),
    ("integer", &["numeric"]),
    ("categorical", &["any"]),
    ("binary", &["categorical"]),
    ("text", &["any"]),
];

pub struct Catalog {
    store: Arc<dyn RecordStore>,
    keystore: KeyStore,
    checker: Arc<dyn ConstraintChecker>,
    splitter: Arc<dyn DatasetSplitter>,
    dataset_dir: Option<PathBuf>,
}

impl Catalog {
    pub fn new(store: Arc<dyn RecordStore>, keystore: KeyStore) -> Self {
        Self {
            store,
            keystore,
            checker: Arc::new(DeclaredConstraints),
            splitter: Arc::new(ExclusiveTypeSplitter),
            dataset_dir: None,
        }
    }

    pub fn with_checker(mut self, checker: Arc<dyn ConstraintChecker>) -> Self {
        self.checker = checker;
        self
    }

    pub fn with_splitter(mut self, splitter: Arc<dyn DatasetSplitter>) -> Self {
        self.splitter = splitter;
        self
    }

    /// Directory relative dataset paths are resolved against.
    pub fn with_dataset_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dataset_dir = Some(dir.into());
        self
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn keystore(&self) -> &KeyStore {
        &self.keystore
    }

    /// Seed the default type lattice. Returns how many types were added.
    pub fn bootstrap(&self) -> Result<usize> {
        let mut added = 0;
        for (name, parents) in DEFAULT_DATA_TYPES {
            if self.store.find_data_type(name)?.is_none() {
                self.add_data_type(DataType::with_parents(*name, parents.iter().copied()))?;
                added += 1;
            }
        }
        if added > 0 {
            info!(added, "Seeded default data types");
        }
        Ok(added)
    }

    pub fn add_data_type(&self, dtype: DataType) -> Result<String> {
        if dtype.name.is_empty() {
            return Err(ValidationError::InvalidDataType {
                reason: "No name in data type".into(),
            }
            .into());
        }
        if self.store.find_data_type(&dtype.name)?.is_some() {
            return Err(ValidationError::DuplicateDataType { name: dtype.name }.into());
        }
        for parent in &dtype.parents {
            if self.store.find_data_type(parent)?.is_none() {
                return Err(ValidationError::UnknownDataType {
                    name: parent.clone(),
                }
                .into());
            }
        }
        let name = dtype.name.clone();
        let id = self.store.add(Record::DataType(dtype))?;
        debug!(name = %name, id = %id, "Added data type");
        Ok(id)
    }

    /// Validate and store a template, then materialize its directory.
    pub fn add_transform(&self, transform: Transform) -> Result<String> {
        validate_transform(&transform)?;
        let name = transform.name.clone();
        let id = self.store.add(Record::Transform(transform))?;
        self.keystore.touch_dir(&keystore::transform_key(&id))?;
        info!(name = %name, transform_id = %id, "Added transform");
        Ok(id)
    }

    /// Load a JSON template from `path`; the path is stamped into `template`.
    pub fn add_transform_file(&self, path: &Path) -> Result<(Transform, String)> {
        debug!(path = %path.display(), "Adding transform from file");
        let blob = std::fs::read_to_string(path)?;
        let mut transform: Transform =
            serde_json::from_str(&blob).map_err(|e| ValidationError::InvalidTransform {
                reason: format!("Parse Error In Transform {}: {e}", path.display()),
            })?;
        transform.template = path.display().to_string();
        let id = self.add_transform(transform.clone())?;
        Ok((transform, id))
    }

    /// Validate `induced` against its template without touching the store.
    pub fn validate_induced_transform(
        &self,
        induced: &InducedTransform,
    ) -> std::result::Result<(), ValidationError> {
        TemplateValidator::new(self.store.as_ref(), self.checker.as_ref()).validate(induced)
    }

    fn stamp_diagnostics(&self, induced: &mut InducedTransform) {
        match self.validate_induced_transform(induced) {
            Ok(()) => induced.error.clear(),
            Err(err) => {
                warn!(
                    name = %induced.name,
                    template_id = %induced.template_id,
                    error = %err,
                    "Induced transform failed validation"
                );
                induced.error = err.to_string();
            }
        }
    }

    /// Store an induced transform. Validation failures are recorded on the
    /// record's `error` field rather than returned.
    pub fn add_induced_transform(&self, mut induced: InducedTransform) -> Result<String> {
        debug!(
            name = %induced.name,
            template_id = %induced.template_id,
            "Adding induced transform"
        );
        self.stamp_diagnostics(&mut induced);
        let id = self.store.add(Record::InducedTransform(induced))?;
        debug!(task_id = %id, "Added induced transform");
        Ok(id)
    }

    /// Replace an induced transform, re-running validation.
    pub fn update_induced_transform(&self, id: &str, mut induced: InducedTransform) -> Result<()> {
        self.stamp_diagnostics(&mut induced);
        self.store.update(id, Record::InducedTransform(induced))?;
        debug!(task_id = %id, "Updated induced transform");
        Ok(())
    }

    pub fn add_state(&self, state: State) -> Result<String> {
        let id = self.store.add(Record::State(state))?;
        self.keystore.touch_dir(&keystore::state_key(&id))?;
        Ok(id)
    }

    pub fn add_data_group(&self, group: DataGroup) -> Result<String> {
        validate_data_group(&group)?;
        let id = self.store.add(Record::DataGroup(group))?;
        self.keystore.touch_dir(&keystore::data_key(&id))?;
        Ok(id)
    }

    /// Split a dataset into one data group per exclusive type.
    ///
    /// Returns the new group ids in split order. Column files handed back by
    /// the splitter are moved into each group's directory as
    /// `{index:010}.{format}`.
    pub fn add_dataset_file(&self, dataset: &DatasetFile) -> Result<Vec<String>> {
        info!(path = %dataset.path, "Adding dataset file");
        validate_dataset_file(dataset)?;
        for name in dataset.columns.exclusive_types.keys() {
            if self.store.find_data_type(name)?.is_none() {
                return Err(ValidationError::UnknownDataType { name: name.clone() }.into());
            }
        }

        let source = self.resolve_dataset_path(&dataset.path);
        if !source.is_file() {
            return Err(ValidationError::InvalidDataset {
                reason: format!("Cannot find input file {}", source.display()),
            }
            .into());
        }

        let staging = self
            .keystore
            .touch_dir(&keystore::dataset_file_key(dataset))?;
        let splits = self.splitter.split(dataset, &source, &staging)?;
        for split in &splits {
            validate_data_group(&split.group)?;
        }

        let mut ids = Vec::with_capacity(splits.len());
        for split in splits {
            let format = split.group.file_format.clone();
            let id = self.store.add(Record::DataGroup(split.group))?;
            let dir = self.keystore.touch_dir(&keystore::data_key(&id))?;
            for (index, column_file) in split.column_files.iter().enumerate() {
                let target = dir.join(format!("{index:010}.{format}"));
                std::fs::rename(column_file, &target).map_err(|source| {
                    KeyStoreError::Write {
                        path: target.clone(),
                        source,
                    }
                })?;
            }
            debug!(data_id = %id, files = split.column_files.len(), "Stored data group");
            ids.push(id);
        }
        info!(path = %dataset.path, groups = ids.len(), "Dataset split into data groups");
        Ok(ids)
    }

    fn resolve_dataset_path(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        match &self.dataset_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }
}
