//! Task orchestration.
//!
//! [`TaskOrchestrator`] turns an induced transform id into a run: it writes
//! the run artifact set (`params`, `log`) under the task's key directory and
//! hands a [`LaunchSpec`] to the watcher actor, which owns every process
//! handle. The external run-time is invoked as
//! `<executable> <run_dir> <exec_context> <params_path>`.

pub mod process;
mod watcher;

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::RunnerConfig;
use crate::error::{StoreError, TaskError};
use crate::keystore::{self, KeyStore};
use crate::records::{RecordStore, RecordStoreExt};
use crate::types::InducedTransform;

pub use process::{
    ChildProcess, CommandLauncher, ExitOutcome, LaunchSpec, ProcessLauncher, TaskProcess,
};
use watcher::{StatusQuery, TaskInsert, Watcher};

/// Serialized induced transform handed to the run-time.
pub const PARAMS_FILE: &str = "params";
/// Combined stdout/stderr of the run.
pub const LOG_FILE: &str = "log";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPhase {
    /// Never submitted to this orchestrator.
    Unknown,
    Running,
    Succeeded,
    Failed,
}

/// Answer to a status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskStatus {
    pub task_id: String,
    pub phase: TaskPhase,
    /// Terminal error string; empty unless `phase` is `Failed`.
    pub error: String,
}

impl TaskStatus {
    pub fn new(task_id: impl Into<String>, phase: TaskPhase, error: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            phase,
            error: error.into(),
        }
    }

    pub fn finished(&self) -> bool {
        matches!(self.phase, TaskPhase::Succeeded | TaskPhase::Failed)
    }
}

pub struct TaskOrchestrator {
    store: Arc<dyn RecordStore>,
    keystore: KeyStore,
    executable: String,
    inserts: mpsc::Sender<TaskInsert>,
    queries: mpsc::Sender<StatusQuery>,
    watcher: JoinHandle<()>,
}

impl TaskOrchestrator {
    /// Spawn the watcher actor. Must be called from within a tokio runtime.
    pub fn start(
        store: Arc<dyn RecordStore>,
        keystore: KeyStore,
        launcher: Arc<dyn ProcessLauncher>,
        config: &RunnerConfig,
    ) -> Self {
        let capacity = config.channel_capacity.max(1);
        let (inserts, insert_rx) = mpsc::channel(capacity);
        let (queries, query_rx) = mpsc::channel(capacity);
        let watcher = Watcher::new(launcher, config.sweep_interval());
        let watcher = tokio::spawn(watcher.run(insert_rx, query_rx));
        info!(executable = %config.executable, "Task orchestrator started");
        Self {
            store,
            keystore,
            executable: config.executable.clone(),
            inserts,
            queries,
            watcher,
        }
    }

    /// Launch the run for `task_id`. Returns once the process has started.
    ///
    /// A task that already succeeded is not rerun. A task that is still
    /// running is killed and relaunched.
    pub async fn submit(&self, task_id: &str) -> Result<(), TaskError> {
        if self.status(task_id).await?.phase == TaskPhase::Succeeded {
            debug!(task_id, "Task already finished, not resubmitting");
            return Ok(());
        }

        let (induced, producers) = self
            .blocking({
                let task_id = task_id.to_string();
                move |store: &dyn RecordStore, _: &KeyStore| {
                    let induced = store.get_induced_transform(&task_id)?;
                    let producers = resolve_producers(store, &task_id, &induced)?;
                    Ok((induced, producers))
                }
            })
            .await?;
        if induced.exec.is_empty() {
            return Err(TaskError::MissingExecutionContext {
                task_id: task_id.to_string(),
            });
        }
        if !induced.is_valid() {
            warn!(task_id, error = %induced.error, "Submitting an induced transform that failed validation");
        }
        debug!(task_id, ?producers, "Resolved producers");

        // The previous run must be gone before its artifact set is rewritten.
        let (reply, response) = oneshot::channel();
        self.inserts
            .send(TaskInsert::Terminate {
                task_id: task_id.to_string(),
                reply,
            })
            .await
            .map_err(|_| TaskError::WatcherStopped)?;
        response.await.map_err(|_| TaskError::WatcherStopped)?;

        let params = serde_json::to_vec_pretty(&induced)?;
        let (run_dir, params_path, log_path) = self
            .blocking({
                let key = keystore::induced_transform_key(task_id);
                move |_: &dyn RecordStore, keystore: &KeyStore| {
                    let run_dir = keystore.touch_dir(&key)?;
                    let params_path = keystore.write_file(&key, PARAMS_FILE, &params)?;
                    let (log_path, _) = keystore.create_file(&key, LOG_FILE)?;
                    Ok((run_dir, params_path, log_path))
                }
            })
            .await?;

        let spec = LaunchSpec {
            task_id: task_id.to_string(),
            name: induced.name.clone(),
            program: self.executable.clone(),
            args: vec![
                run_dir.display().to_string(),
                induced.exec.clone(),
                params_path.display().to_string(),
            ],
            log_path,
        };

        let (reply, response) = oneshot::channel();
        self.inserts
            .send(TaskInsert::Launch { spec, reply })
            .await
            .map_err(|_| TaskError::WatcherStopped)?;
        response.await.map_err(|_| TaskError::WatcherStopped)?
    }

    /// Run store and filesystem work off the async executor.
    async fn blocking<T, F>(&self, work: F) -> Result<T, TaskError>
    where
        F: FnOnce(&dyn RecordStore, &KeyStore) -> Result<T, TaskError> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        let keystore = self.keystore.clone();
        tokio::task::spawn_blocking(move || work(store.as_ref(), &keystore))
            .await
            .map_err(|e| TaskError::Join {
                message: format!("Task join error: {e}"),
            })?
    }

    pub async fn status(&self, task_id: &str) -> Result<TaskStatus, TaskError> {
        let (reply, response) = oneshot::channel();
        self.queries
            .send(StatusQuery {
                task_id: task_id.to_string(),
                reply,
            })
            .await
            .map_err(|_| TaskError::WatcherStopped)?;
        response.await.map_err(|_| TaskError::WatcherStopped)
    }

    /// Whether the task has finished; a failed run surfaces as an error.
    pub async fn is_done(&self, task_id: &str) -> Result<bool, TaskError> {
        let status = self.status(task_id).await?;
        if status.phase == TaskPhase::Failed {
            return Err(TaskError::ProcessFailed {
                task_id: status.task_id,
                message: status.error,
            });
        }
        Ok(status.finished())
    }

    /// Poll until the task reaches a terminal phase.
    pub async fn wait(&self, task_id: &str, poll: Duration) -> Result<TaskStatus, TaskError> {
        loop {
            let status = self.status(task_id).await?;
            if status.finished() || status.phase == TaskPhase::Unknown {
                return Ok(status);
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Induced transforms that produce the data groups `task_id` reads.
    ///
    /// Input groups missing from the store are skipped here; the graph build
    /// reports them.
    pub fn producers(&self, task_id: &str) -> Result<Vec<String>, TaskError> {
        let induced = self.store.get_induced_transform(task_id)?;
        resolve_producers(self.store.as_ref(), task_id, &induced)
    }

    pub fn run_dir(&self, task_id: &str) -> PathBuf {
        self.keystore
            .path_for_key(&keystore::induced_transform_key(task_id))
    }

    pub fn log_path(&self, task_id: &str) -> PathBuf {
        self.keystore
            .path_for_file(&keystore::induced_transform_key(task_id), LOG_FILE)
    }

    pub fn params_path(&self, task_id: &str) -> PathBuf {
        self.keystore
            .path_for_file(&keystore::induced_transform_key(task_id), PARAMS_FILE)
    }

    /// Close both channels and wait for the watcher to kill in-flight runs.
    pub async fn shutdown(self) {
        let Self {
            inserts,
            queries,
            watcher,
            ..
        } = self;
        drop(inserts);
        drop(queries);
        if let Err(e) = watcher.await {
            warn!(error = %e, "Task watcher ended abnormally");
        }
        info!("Task orchestrator stopped");
    }
}

fn resolve_producers(
    store: &dyn RecordStore,
    task_id: &str,
    induced: &InducedTransform,
) -> Result<Vec<String>, TaskError> {
    let mut producers = BTreeSet::new();
    for data_id in induced.input_data_ids() {
        match store.get_data_group(data_id) {
            Ok(group) => {
                if let Some(producer) = group.source.producer() {
                    producers.insert(producer.to_string());
                }
            }
            Err(StoreError::NotFound { .. }) => {
                warn!(task_id, data_id, "Input data group not found");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(producers.into_iter().collect())
}
