//! Content-addressed artifact layout.
//!
//! Every artifact key is hashed with SHA-256 and the first
//! `DIRECTORY_DEPTH * HEX_CHARS_PER_LEVEL` hex characters of the digest are
//! split into nested directory names, so `"42.itransform"` lands somewhere
//! like `<root>/3f1a/09bc/77de/e012/`. Each level holds at most `16^4`
//! children no matter how many keys are stored.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::KeyStoreError;
use crate::types::DatasetFile;

/// Number of nested directory levels derived from a key.
pub const DIRECTORY_DEPTH: usize = 4;
/// Hex characters consumed per directory level.
pub const HEX_CHARS_PER_LEVEL: usize = 4;

/// Lowercase hex SHA-256 of `key`.
pub fn hash_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Relative directory for `key`.
pub fn key_path(key: &str) -> PathBuf {
    let hashed = hash_key(key);
    (0..DIRECTORY_DEPTH)
        .map(|level| &hashed[level * HEX_CHARS_PER_LEVEL..(level + 1) * HEX_CHARS_PER_LEVEL])
        .collect()
}

/// Relative path of `filename` stored under `key`.
pub fn key_file_path(key: &str, filename: &str) -> PathBuf {
    key_path(key).join(filename)
}

pub fn data_key(data_id: &str) -> String {
    format!("{data_id}.data")
}

pub fn transform_key(transform_id: &str) -> String {
    format!("{transform_id}.transform")
}

pub fn induced_transform_key(induced_id: &str) -> String {
    format!("{induced_id}.itransform")
}

pub fn state_key(state_id: &str) -> String {
    format!("{state_id}.state")
}

/// Staging key for a dataset description; identical descriptions share it.
pub fn dataset_file_key(dataset: &DatasetFile) -> String {
    hash_key(&format!("{dataset:?}"))
}

/// Filesystem root that materializes key paths on demand.
#[derive(Debug, Clone)]
pub struct KeyStore {
    root: PathBuf,
}

impl KeyStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute directory for `key`. Nothing is created.
    pub fn path_for_key(&self, key: &str) -> PathBuf {
        self.root.join(key_path(key))
    }

    /// Absolute path of `filename` under `key`. Nothing is created.
    pub fn path_for_file(&self, key: &str, filename: &str) -> PathBuf {
        self.root.join(key_file_path(key, filename))
    }

    /// Create the directory for `key` if needed and return it.
    ///
    /// Safe to call concurrently; an existing directory is not an error.
    pub fn touch_dir(&self, key: &str) -> Result<PathBuf, KeyStoreError> {
        let path = self.path_for_key(key);
        std::fs::create_dir_all(&path).map_err(|source| KeyStoreError::CreateDir {
            path: path.clone(),
            source,
        })?;
        debug!(key, path = %path.display(), "Touched key directory");
        Ok(path)
    }

    /// Ensure `filename` exists under `key` without clobbering its contents.
    pub fn touch_file(&self, key: &str, filename: &str) -> Result<PathBuf, KeyStoreError> {
        self.touch_dir(key)?;
        let path = self.path_for_file(key, filename);
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| KeyStoreError::CreateFile {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }

    /// Create or truncate `filename` under `key` and hand back the open file.
    pub fn create_file(&self, key: &str, filename: &str) -> Result<(PathBuf, File), KeyStoreError> {
        self.touch_dir(key)?;
        let path = self.path_for_file(key, filename);
        let file = File::create(&path).map_err(|source| KeyStoreError::CreateFile {
            path: path.clone(),
            source,
        })?;
        Ok((path, file))
    }

    /// Atomically replace `filename` under `key` with `data`.
    ///
    /// Writes a `.tmp` sibling and renames it over the target.
    pub fn write_file(
        &self,
        key: &str,
        filename: &str,
        data: &[u8],
    ) -> Result<PathBuf, KeyStoreError> {
        self.touch_dir(key)?;
        let path = self.path_for_file(key, filename);
        let tmp = path.with_extension("tmp");
        let write_err = |source| KeyStoreError::Write {
            path: path.clone(),
            source,
        };
        std::fs::write(&tmp, data).map_err(write_err)?;
        std::fs::rename(&tmp, &path).map_err(write_err)?;
        Ok(path)
    }
}
