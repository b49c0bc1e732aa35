//! Configuration for the ProtoML workspace.
//!
//! Uses `figment` for layered configuration: defaults -> user config ->
//! workspace config -> environment -> explicit overrides. Files are read from
//! the user config directory (`config.toml` under `directories::ProjectDirs`)
//! and `<workspace>/.protoml/config.toml`.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ConfigError, StoreError};
use crate::keystore::KeyStore;
use crate::records::{InMemoryRecordStore, RecordStore, SqliteRecordStore};

/// Name of the per-workspace state directory.
pub const STATE_DIR: &str = ".protoml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtoMlConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Where artifacts live on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage root, relative to the workspace unless absolute.
    pub root_dir: PathBuf,
    /// Key-store directory, relative to `root_dir` unless absolute.
    pub state_dir: PathBuf,
    /// Base directory for relative dataset paths.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            state_dir: PathBuf::from(STATE_DIR),
            dataset_dir: None,
        }
    }
}

/// External run-time settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Program invoked as `<executable> <run_dir> <exec> <params_path>`.
    pub executable: String,
    /// How often the watcher polls in-flight processes.
    pub sweep_interval_ms: u64,
    /// Capacity of the insert and status channels.
    pub channel_capacity: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            executable: "protoml-run".into(),
            sweep_interval_ms: 100,
            channel_capacity: 64,
        }
    }
}

impl RunnerConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// SQLite file; defaults to `<state_dir>/records.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

impl ProtoMlConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.runner.executable.trim().is_empty() {
            return Err(ConfigError::Invalid {
                message: "runner.executable must not be empty".into(),
            });
        }
        if self.runner.sweep_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                message: "runner.sweep_interval_ms must be positive".into(),
            });
        }
        if self.runner.channel_capacity == 0 {
            return Err(ConfigError::Invalid {
                message: "runner.channel_capacity must be positive".into(),
            });
        }
        Ok(())
    }

    pub fn root_dir(&self, workspace: &Path) -> PathBuf {
        resolve(workspace, &self.storage.root_dir)
    }

    pub fn state_dir(&self, workspace: &Path) -> PathBuf {
        resolve(&self.root_dir(workspace), &self.storage.state_dir)
    }

    pub fn dataset_dir(&self, workspace: &Path) -> Option<PathBuf> {
        self.storage
            .dataset_dir
            .as_deref()
            .map(|dir| resolve(workspace, dir))
    }

    pub fn log_dir(&self, workspace: &Path) -> PathBuf {
        self.state_dir(workspace).join("logs")
    }

    pub fn store_path(&self, workspace: &Path) -> PathBuf {
        match &self.store.path {
            Some(path) => resolve(workspace, path),
            None => self.state_dir(workspace).join("records.db"),
        }
    }

    pub fn keystore(&self, workspace: &Path) -> KeyStore {
        KeyStore::new(self.state_dir(workspace))
    }

    /// Open the configured record store backend.
    pub fn open_record_store(&self, workspace: &Path) -> Result<Arc<dyn RecordStore>, StoreError> {
        Ok(match self.store.backend {
            StoreBackend::Sqlite => Arc::new(SqliteRecordStore::open(&self.store_path(workspace))?),
            StoreBackend::Memory => Arc::new(InMemoryRecordStore::new()),
        })
    }
}

fn base_figment(workspace: Option<&Path>) -> Figment {
    let mut figment = Figment::from(Serialized::defaults(ProtoMlConfig::default()));

    if let Some(dirs) = directories::ProjectDirs::from("dev", "protoml", "protoml") {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(STATE_DIR).join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }
    figment
}

fn finish(
    figment: Figment,
    overrides: Option<&ProtoMlConfig>,
) -> Result<ProtoMlConfig, ConfigError> {
    // PROTOML_RUNNER__EXECUTABLE, PROTOML_STORE__BACKEND, ...
    let mut figment = figment.merge(Env::prefixed("PROTOML_").split("__"));
    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }
    let config: ProtoMlConfig = figment.extract()?;
    config.validate()?;
    Ok(config)
}

/// Load configuration with layered sources.
///
/// Priority (highest first):
/// 1. Explicit overrides
/// 2. Environment variables (prefixed with `PROTOML_`)
/// 3. Workspace config (`.protoml/config.toml`)
/// 4. User config
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&ProtoMlConfig>,
) -> Result<ProtoMlConfig, ConfigError> {
    finish(base_figment(workspace), overrides)
}

/// Like [`load_config`], with `path` layered above the workspace config.
pub fn load_config_file(
    path: &Path,
    workspace: Option<&Path>,
) -> Result<ProtoMlConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    finish(base_figment(workspace).merge(Toml::file(path)), None)
}
