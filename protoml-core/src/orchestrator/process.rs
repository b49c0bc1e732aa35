//! OS process handles for task runs.
//!
//! The watcher only needs to poll and kill a process, so both sit behind
//! [`TaskProcess`]; [`ProcessLauncher`] creates them. [`CommandLauncher`]
//! spawns real children with `tokio::process`.

use std::fmt;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::debug;

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ExitOutcome {
    pub fn exited(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    pub fn signaled(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0) && self.signal.is_none()
    }

    pub fn from_status(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;
        Self {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (_, Some(signal)) => write!(f, "signal: {signal}"),
            (Some(code), None) => write!(f, "exit status {code}"),
            (None, None) => write!(f, "unknown exit state"),
        }
    }
}

/// A launched run the watcher can poll and kill.
#[async_trait]
pub trait TaskProcess: Send {
    fn pid(&self) -> Option<u32>;

    /// Non-blocking exit check; `None` while still running.
    fn try_exit(&mut self) -> std::io::Result<Option<ExitOutcome>>;

    /// Kill the process and reap it. A process that already exited is left alone.
    async fn terminate(&mut self) -> std::io::Result<()>;
}

/// Everything needed to start one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub task_id: String,
    pub name: String,
    pub program: String,
    pub args: Vec<String>,
    /// Receives both stdout and stderr.
    pub log_path: PathBuf,
}

pub trait ProcessLauncher: Send + Sync {
    fn launch(&self, spec: &LaunchSpec) -> std::io::Result<Box<dyn TaskProcess>>;
}

/// Spawns `spec.program` as a child process with output sent to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandLauncher;

impl ProcessLauncher for CommandLauncher {
    fn launch(&self, spec: &LaunchSpec) -> std::io::Result<Box<dyn TaskProcess>> {
        let stdout = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&spec.log_path)?;
        let stderr = stdout.try_clone()?;

        let child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true)
            .spawn()?;
        debug!(
            task_id = %spec.task_id,
            pid = ?child.id(),
            program = %spec.program,
            "Spawned task process"
        );
        Ok(Box::new(ChildProcess { child }))
    }
}

/// A real child process.
pub struct ChildProcess {
    child: Child,
}

#[async_trait]
impl TaskProcess for ChildProcess {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    fn try_exit(&mut self) -> std::io::Result<Option<ExitOutcome>> {
        Ok(self.child.try_wait()?.map(ExitOutcome::from_status))
    }

    async fn terminate(&mut self) -> std::io::Result<()> {
        if self.child.try_wait()?.is_some() {
            return Ok(());
        }
        self.child.kill().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_outcome_display() {
        assert_eq!(ExitOutcome::exited(2).to_string(), "exit status 2");
        assert_eq!(ExitOutcome::signaled(9).to_string(), "signal: 9");
        assert!(ExitOutcome::exited(0).success());
        assert!(!ExitOutcome::exited(1).success());
        assert!(!ExitOutcome::signaled(15).success());
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_launch() {
        let dir = tempfile::tempdir().unwrap();
        let spec = LaunchSpec {
            task_id: "t".into(),
            name: "t".into(),
            program: "/nonexistent/protoml-run".into(),
            args: vec![],
            log_path: dir.path().join("log"),
        };
        assert!(CommandLauncher.launch(&spec).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_child_process_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let spec = LaunchSpec {
            task_id: "t".into(),
            name: "t".into(),
            program: "sh".into(),
            args: vec!["-c".into(), "echo hello; sleep 30".into()],
            log_path: dir.path().join("log"),
        };
        let mut process = CommandLauncher.launch(&spec).unwrap();
        assert!(process.pid().is_some());
        assert_eq!(process.try_exit().unwrap(), None);

        process.terminate().await.unwrap();
        let outcome = process.try_exit().unwrap().unwrap();
        assert!(!outcome.success());
    }
}
