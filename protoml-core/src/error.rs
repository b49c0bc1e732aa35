//! Error types for the ProtoML core library.
//!
//! Uses `thiserror` for the public error surface. Each subsystem has its own
//! enum with structured variants; [`ProtoMlError`] wraps them for callers
//! that drive several subsystems at once.

use std::path::PathBuf;

use crate::records::RecordKind;
use crate::types::ConstraintClass;

/// Top-level error type for the ProtoML core library.
#[derive(Debug, thiserror::Error)]
pub enum ProtoMlError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Integrity error: {0}")]
    Integrity(#[from] IntegrityError),

    #[error("Record store error: {0}")]
    Store(#[from] StoreError),

    #[error("Key store error: {0}")]
    KeyStore(#[from] KeyStoreError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Contract violations found while checking templates, induced transforms
/// and dataset descriptions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid TemplateID {template_id}")]
    TemplateNotFound { template_id: String },

    #[error("No name in induced transform")]
    MissingName,

    #[error("Function {function} not in template {template}")]
    UnknownFunction { function: String, template: String },

    #[error("Induced {class} key '{key}' not found in template {template}")]
    UndeclaredKey {
        class: ConstraintClass,
        key: String,
        template: String,
    },

    #[error("Induced {class} key '{key}' violates its declaration: {reason}")]
    ConstraintMismatch {
        class: ConstraintClass,
        key: String,
        reason: String,
    },

    #[error("Invalid transform template: {reason}")]
    InvalidTransform { reason: String },

    #[error("Invalid dataset file: {reason}")]
    InvalidDataset { reason: String },

    #[error("Unknown data type: {name}")]
    UnknownDataType { name: String },

    #[error("Invalid data type: {reason}")]
    InvalidDataType { reason: String },

    #[error("Data type already exists: {name}")]
    DuplicateDataType { name: String },
}

/// Dangling references found while reconstructing the pipeline graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntegrityError {
    #[error("Transform {transform_id} takes in datagroup that does not exist, its id is {data_id}")]
    MissingInputData {
        transform_id: String,
        data_id: String,
    },

    #[error("Transform {transform_id} outputs datagroup that does not exist, its id is {data_id}")]
    MissingOutputData {
        transform_id: String,
        data_id: String,
    },

    #[error("Transform {transform_id} takes in a state that does not exist, its id is {state_id}")]
    MissingInputState {
        transform_id: String,
        state_id: String,
    },

    #[error("Transform {transform_id} outputs a state that does not exist, its id is {state_id}")]
    MissingOutputState {
        transform_id: String,
        state_id: String,
    },

    #[error("Pipeline contains a cycle through {vertex_id}")]
    Cycle { vertex_id: String },
}

impl IntegrityError {
    /// The id that could not be resolved (or a vertex on the cycle).
    pub fn missing_id(&self) -> &str {
        match self {
            Self::MissingInputData { data_id, .. } | Self::MissingOutputData { data_id, .. } => {
                data_id
            }
            Self::MissingInputState { state_id, .. } | Self::MissingOutputState { state_id, .. } => {
                state_id
            }
            Self::Cycle { vertex_id } => vertex_id,
        }
    }
}

/// Errors from a record store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("No {kind} record with id {id}")]
    NotFound { kind: RecordKind, id: String },

    #[error("Record kind mismatch: expected {expected}, found {found}")]
    KindMismatch {
        expected: RecordKind,
        found: RecordKind,
    },

    #[error("Record store backend failure: {message}")]
    Backend { message: String },

    #[error("Record encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Backend {
            message: err.to_string(),
        }
    }
}

/// Errors from materializing key-store paths.
#[derive(Debug, thiserror::Error)]
pub enum KeyStoreError {
    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to create file {path}: {source}")]
    CreateFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Errors surfaced synchronously by the task orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Execution context not specified for task {task_id}")]
    MissingExecutionContext { task_id: String },

    #[error("Failed to launch task {task_id}: {message}")]
    Spawn { task_id: String, message: String },

    #[error("Task {task_id} failed: {message}")]
    ProcessFailed { task_id: String, message: String },

    #[error("Task watcher has shut down")]
    WatcherStopped,

    #[error("Blocking task failed: {message}")]
    Join { message: String },

    #[error("Record store error: {0}")]
    Store(#[from] StoreError),

    #[error("Key store error: {0}")]
    KeyStore(#[from] KeyStoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::ParseError {
            message: err.to_string(),
        }
    }
}

/// A type alias for results using the top-level `ProtoMlError`.
pub type Result<T> = std::result::Result<T, ProtoMlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_validation() {
        let err = ProtoMlError::Validation(ValidationError::TemplateNotFound {
            template_id: "t-404".into(),
        });
        assert_eq!(err.to_string(), "Validation error: Invalid TemplateID t-404");
    }

    #[test]
    fn test_error_display_undeclared_key() {
        let err = ValidationError::UndeclaredKey {
            class: ConstraintClass::HyperParameters,
            key: "alpha".into(),
            template: "ridge.json".into(),
        };
        assert_eq!(
            err.to_string(),
            "Induced hyperparameter key 'alpha' not found in template ridge.json"
        );
    }

    #[test]
    fn test_integrity_error_names_missing_id() {
        let err = IntegrityError::MissingInputData {
            transform_id: "it-1".into(),
            data_id: "dg-9".into(),
        };
        assert_eq!(err.missing_id(), "dg-9");
        assert!(err.to_string().contains("it-1"));
        assert!(err.to_string().contains("dg-9"));
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::NotFound {
            kind: RecordKind::InducedTransform,
            id: "abc".into(),
        };
        assert_eq!(err.to_string(), "No itransform record with id abc");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ProtoMlError = io_err.into();
        assert!(matches!(err, ProtoMlError::Io(_)));
    }

    #[test]
    fn test_task_error_from_store() {
        let err: TaskError = StoreError::Backend {
            message: "locked".into(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Record store error: Record store backend failure: locked"
        );
    }
}
