//! Runner module - Execution abstraction layer
//!
//! Launches one OS process per call and reports what happened to it:
//! - `ProcessRunner`: production runner (process group, rlimits, peak RSS sampling)
//! - `testing::ScriptedRunner`: canned outcomes for executor and session tests
//!
//! The runner module does NOT:
//! - Compare outputs or decide pass/fail
//! - Know about languages, harnesses or test cases

pub mod process;

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

use crate::error::ExecutionError;

pub use process::ProcessRunner;

/// Command specification for execution
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Program path or name
    pub program: String,
    /// Arguments to the program
    pub args: Vec<String>,
    /// Working directory
    pub work_dir: Option<std::path::PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            work_dir: None,
        }
    }

    /// Append arguments after the ones already present
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(|a| a.into()));
        self
    }

    pub fn with_work_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.work_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Create from a command vector (first element is program, rest are args)
    pub fn from_vec(cmd: &[String]) -> Self {
        let mut iter = cmd.iter();
        let program = iter.next().cloned().unwrap_or_default();
        Self::new(program).with_args(iter.cloned())
    }

    /// Convert to a vector of strings (program + args)
    pub fn to_vec(&self) -> Vec<String> {
        let mut v = vec![self.program.clone()];
        v.extend(self.args.iter().cloned());
        v
    }
}

/// Resource limits for execution
#[derive(Debug, Clone)]
pub struct RunLimits {
    /// Wall-clock budget
    pub timeout: Duration,
    /// Address-space cap in MB, `None` for no cap
    pub memory_mb: Option<u32>,
}

impl RunLimits {
    pub fn new(timeout: Duration, memory_mb: Option<u32>) -> Self {
        Self { timeout, memory_mb }
    }
}

/// Execution status (raw, no verdict interpretation)
#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    /// Program exited normally with given exit code
    Exited(i32),
    /// Wall-clock or CPU budget exhausted; the process group was killed
    TimeLimitExceeded,
    /// Killed by signal
    Signaled(i32),
}

impl RunStatus {
    /// Check if execution was successful (exited with code 0)
    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Exited(0))
    }
}

/// Outcome of running a program
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Wall time in milliseconds
    pub time_ms: u64,
    /// Peak resident memory in KB (0 when it could not be sampled)
    pub memory_kb: u64,
    /// Stdout content
    pub stdout: String,
    /// Stderr content
    pub stderr: String,
    /// Execution status
    pub status: RunStatus,
}

impl RunOutcome {
    /// Check if execution was successful
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Runner trait for executing programs
#[async_trait]
pub trait Runner: Send + Sync {
    /// Run a command with the given limits and optional stdin.
    ///
    /// `Err` means the process could not be started or supervised. Anything
    /// the process itself does (crash, timeout, garbage output) is an `Ok`.
    async fn run(
        &self,
        cmd: &CommandSpec,
        limits: &RunLimits,
        stdin: Option<&str>,
    ) -> Result<RunOutcome, ExecutionError>;
}

#[cfg(test)]
pub mod testing {
    //! Runner double that replays scripted outcomes

    use super::*;
    use std::sync::Mutex;

    /// One recorded invocation
    #[derive(Debug, Clone)]
    pub struct RecordedCall {
        pub command: Vec<String>,
        pub stdin: Option<String>,
        pub limits: RunLimits,
    }

    type Script = dyn Fn(&CommandSpec, Option<&str>) -> Result<RunOutcome, ExecutionError>
        + Send
        + Sync;

    pub struct ScriptedRunner {
        script: Box<Script>,
        calls: Mutex<Vec<RecordedCall>>,
    }

    impl ScriptedRunner {
        pub fn new(
            script: impl Fn(&CommandSpec, Option<&str>) -> Result<RunOutcome, ExecutionError>
                + Send
                + Sync
                + 'static,
        ) -> Self {
            Self {
                script: Box::new(script),
                calls: Mutex::new(Vec::new()),
            }
        }

        /// Runner whose every process exits 0 with the given stdout
        pub fn always(stdout: &str) -> Self {
            let stdout = stdout.to_string();
            Self::new(move |_, _| Ok(exited(0, &stdout, "")))
        }

        pub fn calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().unwrap().clone()
        }
    }

    pub fn exited(code: i32, stdout: &str, stderr: &str) -> RunOutcome {
        RunOutcome {
            time_ms: 12,
            memory_kb: 2048,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            status: RunStatus::Exited(code),
        }
    }

    pub fn timed_out() -> RunOutcome {
        RunOutcome {
            time_ms: 5000,
            memory_kb: 1024,
            stdout: String::new(),
            stderr: String::new(),
            status: RunStatus::TimeLimitExceeded,
        }
    }

    #[async_trait]
    impl Runner for ScriptedRunner {
        async fn run(
            &self,
            cmd: &CommandSpec,
            limits: &RunLimits,
            stdin: Option<&str>,
        ) -> Result<RunOutcome, ExecutionError> {
            self.calls.lock().unwrap().push(RecordedCall {
                command: cmd.to_vec(),
                stdin: stdin.map(str::to_string),
                limits: limits.clone(),
            });
            (self.script)(cmd, stdin)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_from_vec_appends_args() {
        let cmd = CommandSpec::from_vec(&["java".to_string(), "Main".to_string()])
            .with_args(["3"])
            .with_work_dir("/tmp/work");

        assert_eq!(cmd.program, "java");
        assert_eq!(cmd.to_vec(), vec!["java", "Main", "3"]);
        assert_eq!(cmd.work_dir.as_deref(), Some(Path::new("/tmp/work")));
    }

    #[test]
    fn test_empty_command_vec() {
        let cmd = CommandSpec::from_vec(&[]);
        assert!(cmd.program.is_empty());
        assert!(cmd.args.is_empty());
    }
}
