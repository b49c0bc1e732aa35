//! # ProtoML Core
//!
//! Persistence and orchestration for ProtoML transform pipelines:
//!
//! - [`keystore`]: content-addressed directory layout for artifacts
//! - [`records`]: typed record persistence behind the [`RecordStore`] trait
//! - [`validator`]: template, induced transform and dataset checks
//! - [`catalog`]: the write path tying store, key store and validator together
//! - [`graph`]: pipeline graph reconstruction with integrity checks
//! - [`orchestrator`]: launches run processes and tracks their lifecycle

pub mod catalog;
pub mod config;
pub mod error;
pub mod graph;
pub mod ingest;
pub mod keystore;
pub mod orchestrator;
pub mod records;
pub mod types;
pub mod validator;

pub use catalog::Catalog;
pub use config::{load_config, load_config_file, ProtoMlConfig};
pub use error::{ProtoMlError, Result};
pub use graph::{GraphBuilder, PipelineGraph};
pub use ingest::{DatasetSplitter, ExclusiveTypeSplitter};
pub use keystore::KeyStore;
pub use orchestrator::{CommandLauncher, TaskOrchestrator, TaskPhase, TaskStatus};
pub use records::{InMemoryRecordStore, Record, RecordKind, RecordStore, RecordStoreExt, SqliteRecordStore};
pub use types::{DataGroup, DataType, DatasetFile, InducedTransform, State, Transform};
pub use validator::{ConstraintChecker, DeclaredConstraints, TemplateValidator};
