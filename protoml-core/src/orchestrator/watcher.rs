//! The task watcher actor.
//!
//! One tokio task owns the in-flight and completed maps. Callers reach it
//! through two channels: inserts (launch or relaunch a task) and status
//! queries. Messages are served in that priority order; an interval tick
//! sweeps in-flight processes for exits when both channels are idle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::process::{ExitOutcome, LaunchSpec, ProcessLauncher, TaskProcess};
use super::{TaskPhase, TaskStatus};
use crate::error::TaskError;

/// Requests that change the set of in-flight processes.
pub(crate) enum TaskInsert {
    /// Kill any current run of the task and forget its outcome. Sent before
    /// the artifact set is rewritten, so a previous run never sees it.
    Terminate {
        task_id: String,
        reply: oneshot::Sender<()>,
    },
    /// Launch (or relaunch) a run. The reply carries the spawn result.
    Launch {
        spec: LaunchSpec,
        reply: oneshot::Sender<Result<(), TaskError>>,
    },
}

pub(crate) struct StatusQuery {
    pub task_id: String,
    pub reply: oneshot::Sender<TaskStatus>,
}

struct InFlight {
    name: String,
    process: Box<dyn TaskProcess>,
}

pub(crate) struct Watcher {
    launcher: Arc<dyn ProcessLauncher>,
    sweep_interval: Duration,
    running: HashMap<String, InFlight>,
    /// Task id to terminal error string; empty means success.
    completed: HashMap<String, String>,
}

fn failure_message(name: &str, task_id: &str, outcome: ExitOutcome) -> String {
    format!("Task {name}:{task_id} failed and returned with process state: {outcome}")
}

impl Watcher {
    pub fn new(launcher: Arc<dyn ProcessLauncher>, sweep_interval: Duration) -> Self {
        Self {
            launcher,
            sweep_interval,
            running: HashMap::new(),
            completed: HashMap::new(),
        }
    }

    /// Serve both channels until they are closed, then kill whatever is
    /// still running.
    pub async fn run(
        mut self,
        mut inserts: mpsc::Receiver<TaskInsert>,
        mut queries: mpsc::Receiver<StatusQuery>,
    ) {
        let mut interval = tokio::time::interval(self.sweep_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut inserts_open = true;
        let mut queries_open = true;

        while inserts_open || queries_open {
            tokio::select! {
                biased;

                insert = inserts.recv(), if inserts_open => match insert {
                    Some(TaskInsert::Terminate { task_id, reply }) => {
                        self.terminate(&task_id).await;
                        let _ = reply.send(());
                    }
                    Some(TaskInsert::Launch { spec, reply }) => self.handle_launch(spec, reply).await,
                    None => inserts_open = false,
                },
                query = queries.recv(), if queries_open => match query {
                    Some(query) => self.handle_query(query),
                    None => queries_open = false,
                },
                _ = interval.tick() => self.sweep(),
            }
        }

        self.terminate_all().await;
        debug!("Task watcher stopped");
    }

    /// Kill the current run of `task_id`, if any, and drop its outcome.
    async fn terminate(&mut self, task_id: &str) {
        if let Some(mut previous) = self.running.remove(task_id) {
            info!(
                task_id,
                pid = ?previous.process.pid(),
                "Terminating previous run before relaunch"
            );
            if let Err(e) = previous.process.terminate().await {
                warn!(task_id, error = %e, "Failed to terminate previous run");
            }
        }
        self.completed.remove(task_id);
    }

    async fn handle_launch(
        &mut self,
        spec: LaunchSpec,
        reply: oneshot::Sender<Result<(), TaskError>>,
    ) {
        // A concurrent submit may have launched in between; only one run
        // per task is ever kept.
        self.terminate(&spec.task_id).await;

        let result = match self.launcher.launch(&spec) {
            Ok(process) => {
                info!(task_id = %spec.task_id, pid = ?process.pid(), "Task launched");
                self.running.insert(
                    spec.task_id.clone(),
                    InFlight {
                        name: spec.name.clone(),
                        process,
                    },
                );
                Ok(())
            }
            Err(e) => {
                warn!(task_id = %spec.task_id, error = %e, "Task failed to launch");
                Err(TaskError::Spawn {
                    task_id: spec.task_id.clone(),
                    message: e.to_string(),
                })
            }
        };
        // The submitter may have gone away; nothing to do then.
        let _ = reply.send(result);
    }

    fn handle_query(&mut self, query: StatusQuery) {
        self.poll(&query.task_id);
        let status = match self.completed.get(&query.task_id) {
            Some(error) if error.is_empty() => TaskStatus::new(&query.task_id, TaskPhase::Succeeded, ""),
            Some(error) => TaskStatus::new(&query.task_id, TaskPhase::Failed, error),
            None if self.running.contains_key(&query.task_id) => {
                TaskStatus::new(&query.task_id, TaskPhase::Running, "")
            }
            None => TaskStatus::new(&query.task_id, TaskPhase::Unknown, ""),
        };
        let _ = query.reply.send(status);
    }

    /// Move every exited process to the completed map.
    fn sweep(&mut self) {
        let ids: Vec<String> = self.running.keys().cloned().collect();
        for id in ids {
            self.poll(&id);
        }
    }

    fn poll(&mut self, task_id: &str) {
        let Some(entry) = self.running.get_mut(task_id) else {
            return;
        };
        let error = match entry.process.try_exit() {
            Ok(None) => return,
            Ok(Some(outcome)) if outcome.success() => String::new(),
            Ok(Some(outcome)) => failure_message(&entry.name, task_id, outcome),
            Err(e) => format!("Task {}:{task_id} could not be polled: {e}", entry.name),
        };
        if error.is_empty() {
            info!(task_id, "Task finished");
        } else {
            warn!(task_id, error = %error, "Task failed");
        }
        self.running.remove(task_id);
        self.completed.insert(task_id.to_string(), error);
    }

    async fn terminate_all(&mut self) {
        for (task_id, mut entry) in self.running.drain() {
            info!(task_id = %task_id, pid = ?entry.process.pid(), "Terminating task on shutdown");
            if let Err(e) = entry.process.terminate().await {
                warn!(task_id = %task_id, error = %e, "Failed to terminate task");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_message() {
        assert_eq!(
            failure_message("scale", "42", ExitOutcome::exited(2)),
            "Task scale:42 failed and returned with process state: exit status 2"
        );
    }
}
