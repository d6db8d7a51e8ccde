//! Process runner
//!
//! Runs candidate programs as plain child processes contained by OS limits:
//! each child leads its own process group, gets rlimits applied between fork
//! and exec, and sees only a minimal environment. On timeout the whole group
//! is killed so forked grandchildren cannot outlive the run.

use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use nix::libc::rlim_t;
use nix::sys::resource::{setrlimit, Resource};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{CommandSpec, RunLimits, RunOutcome, RunStatus, Runner};
use crate::error::ExecutionError;

const DEFAULT_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";
const MEMORY_SAMPLE_INTERVAL: Duration = Duration::from_millis(10);
const MAX_FILE_SIZE_BYTES: u64 = 64 * 1024 * 1024;
const DEFAULT_OUTPUT_LIMIT: usize = 1024 * 1024;
/// How long the output pipes may stay open after the group is killed
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Runner that executes programs as contained child processes
pub struct ProcessRunner {
    /// Bytes kept per stream; the rest is drained and dropped
    output_limit: usize,
}

impl ProcessRunner {
    pub fn new(output_limit: usize) -> Self {
        Self { output_limit }
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_LIMIT)
    }
}

/// rlimits applied in the child before exec
#[derive(Debug, Clone, Copy)]
struct ResourceCaps {
    address_space_bytes: Option<u64>,
    cpu_secs: u64,
}

impl ResourceCaps {
    fn from_limits(limits: &RunLimits) -> Self {
        Self {
            address_space_bytes: limits.memory_mb.map(|mb| u64::from(mb) * 1024 * 1024),
            // Wall clock is enforced by the parent; CPU cap catches spinning
            // children the parent may never get to kill.
            cpu_secs: limits.timeout.as_secs_f64().ceil() as u64 + 1,
        }
    }

    fn apply(&self) -> std::io::Result<()> {
        if let Some(bytes) = self.address_space_bytes {
            setrlimit(Resource::RLIMIT_AS, bytes as rlim_t, bytes as rlim_t)?;
        }
        setrlimit(
            Resource::RLIMIT_CPU,
            self.cpu_secs as rlim_t,
            (self.cpu_secs + 1) as rlim_t,
        )?;
        setrlimit(
            Resource::RLIMIT_FSIZE,
            MAX_FILE_SIZE_BYTES as rlim_t,
            MAX_FILE_SIZE_BYTES as rlim_t,
        )?;
        setrlimit(Resource::RLIMIT_CORE, 0, 0)?;
        Ok(())
    }
}

#[async_trait]
impl Runner for ProcessRunner {
    async fn run(
        &self,
        cmd: &CommandSpec,
        limits: &RunLimits,
        stdin: Option<&str>,
    ) -> Result<RunOutcome, ExecutionError> {
        debug!(
            "Running {:?} (timeout {:?}, memory {:?} MB)",
            cmd.to_vec(),
            limits.timeout,
            limits.memory_mb
        );

        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .env_clear()
            .env(
                "PATH",
                std::env::var("PATH").unwrap_or_else(|_| DEFAULT_PATH.to_string()),
            )
            .env("LANG", "C.UTF-8")
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .process_group(0);

        match &cmd.work_dir {
            Some(dir) => {
                command.current_dir(dir).env("HOME", dir);
            }
            None => {
                command.env("HOME", std::env::temp_dir());
            }
        }

        let caps = ResourceCaps::from_limits(limits);
        // SAFETY: the hook runs between fork and exec and only issues
        // setrlimit syscalls, which are async-signal-safe.
        unsafe {
            command.pre_exec(move || caps.apply());
        }

        let started = Instant::now();
        let mut child = command.spawn().map_err(|source| ExecutionError::Spawn {
            program: cmd.program.clone(),
            source,
        })?;
        let pid = child.id();

        // Feed stdin from its own task so a child that never reads cannot
        // block us on a full pipe. Dropping the pipe closes the child's stdin.
        let stdin_task = match (stdin, child.stdin.take()) {
            (Some(input), Some(mut pipe)) => {
                let input = input.to_string();
                Some(tokio::spawn(async move {
                    let _ = pipe.write_all(input.as_bytes()).await;
                }))
            }
            _ => None,
        };
        let mut stdout = Capture::spawn(child.stdout.take(), self.output_limit);
        let mut stderr = Capture::spawn(child.stderr.take(), self.output_limit);

        let mut peak_kb = 0u64;
        let waited = tokio::time::timeout(limits.timeout, async {
            let mut sampler = tokio::time::interval(MEMORY_SAMPLE_INTERVAL);
            loop {
                tokio::select! {
                    status = child.wait() => break status,
                    _ = sampler.tick() => {
                        if let Some(kb) = peak_rss_kb(pid).await {
                            peak_kb = peak_kb.max(kb);
                        }
                    }
                }
            }
        })
        .await;
        let elapsed = started.elapsed();

        // Take down anything left in the group, including background children
        // that would otherwise keep the output pipes open.
        if let Some(pid) = pid {
            kill_group(pid);
        }

        let status = match waited {
            Ok(Ok(exit)) => classify(exit),
            Ok(Err(e)) => {
                warn!("Failed to wait for {}: {}", cmd.program, e);
                return Err(ExecutionError::Io(e));
            }
            Err(_) => {
                debug!("{} timed out after {:?}", cmd.program, limits.timeout);
                let _ = child.kill().await;
                RunStatus::TimeLimitExceeded
            }
        };

        // A process that left the group (setsid) can hold the pipes open
        // past the kill, so draining is bounded too.
        let drained = tokio::time::timeout(OUTPUT_DRAIN_GRACE, async {
            stdout.finished().await;
            stderr.finished().await;
        })
        .await;
        if drained.is_err() {
            warn!(
                "{} left output pipes open after the run; keeping partial output",
                cmd.program
            );
        }
        if let Some(task) = stdin_task {
            task.abort();
        }

        Ok(RunOutcome {
            time_ms: elapsed.as_millis() as u64,
            memory_kb: peak_kb,
            stdout: stdout.into_string(),
            stderr: stderr.into_string(),
            status,
        })
    }
}

fn classify(status: ExitStatus) -> RunStatus {
    if let Some(code) = status.code() {
        return RunStatus::Exited(code);
    }
    match status.signal() {
        Some(signal) if signal == Signal::SIGXCPU as i32 => RunStatus::TimeLimitExceeded,
        Some(signal) => RunStatus::Signaled(signal),
        None => RunStatus::Exited(-1),
    }
}

fn kill_group(pid: u32) {
    match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
        Err(e) => warn!("Failed to kill process group {}: {}", pid, e),
    }
}

/// Output stream read on its own task into a shared buffer, so whatever
/// arrived is still available when the reader is abandoned
struct Capture {
    kept: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

impl Capture {
    fn spawn<R>(reader: Option<R>, cap: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let kept = Arc::new(Mutex::new(Vec::new()));
        let task = tokio::spawn(read_capped(reader, cap, Arc::clone(&kept)));
        Self { kept, task }
    }

    async fn finished(&mut self) {
        let _ = (&mut self.task).await;
    }

    fn into_string(self) -> String {
        self.task.abort();
        let kept = self.kept.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        String::from_utf8_lossy(&kept).into_owned()
    }
}

/// Read a stream to the end, keeping at most `cap` bytes
async fn read_capped<R: AsyncRead + Unpin>(reader: Option<R>, cap: usize, kept: Arc<Mutex<Vec<u8>>>) {
    let Some(mut reader) = reader else {
        return;
    };
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let mut kept = kept.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                let room = cap.saturating_sub(kept.len());
                kept.extend_from_slice(&chunk[..n.min(room)]);
            }
        }
    }
}

async fn peak_rss_kb(pid: Option<u32>) -> Option<u64> {
    let pid = pid?;
    let status = tokio::fs::read_to_string(format!("/proc/{}/status", pid))
        .await
        .ok()?;
    parse_vm_hwm(&status)
}

fn parse_vm_hwm(status: &str) -> Option<u64> {
    status
        .lines()
        .find(|line| line.starts_with("VmHWM:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(timeout_ms: u64) -> RunLimits {
        RunLimits::new(Duration::from_millis(timeout_ms), Some(256))
    }

    fn shell(script: &str) -> CommandSpec {
        CommandSpec::new("sh").with_args(["-c", script])
    }

    #[tokio::test]
    async fn test_captures_stdout_and_stdin() {
        let runner = ProcessRunner::default();
        let outcome = runner
            .run(&CommandSpec::new("cat"), &limits(2000), Some("hello\nworld\n"))
            .await
            .unwrap();

        assert!(outcome.is_success());
        assert_eq!(outcome.stdout, "hello\nworld\n");
    }

    #[tokio::test]
    async fn test_reports_exit_code_and_stderr() {
        let runner = ProcessRunner::default();
        let outcome = runner
            .run(&shell("echo boom >&2; exit 3"), &limits(2000), None)
            .await
            .unwrap();

        assert_eq!(outcome.status, RunStatus::Exited(3));
        assert_eq!(outcome.stderr.trim(), "boom");
    }

    #[tokio::test]
    async fn test_timeout_kills_process_group() {
        let runner = ProcessRunner::default();
        let started = Instant::now();
        let outcome = runner
            .run(&shell("sleep 5 & sleep 5"), &limits(200), None)
            .await
            .unwrap();

        assert_eq!(outcome.status, RunStatus::TimeLimitExceeded);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_escaped_grandchild_cannot_hold_the_run_open() {
        let setsid_available = std::process::Command::new("setsid")
            .arg("--version")
            .output()
            .is_ok();
        if !setsid_available {
            return;
        }
        let runner = ProcessRunner::default();
        let started = Instant::now();
        let outcome = runner
            .run(
                &shell("echo partial; setsid sleep 3 & sleep 3"),
                &limits(300),
                None,
            )
            .await
            .unwrap();

        assert_eq!(outcome.status, RunStatus::TimeLimitExceeded);
        assert_eq!(outcome.stdout.trim(), "partial");
        assert!(started.elapsed() < Duration::from_secs(2), "{:?}", started.elapsed());
    }

    #[tokio::test]
    async fn test_environment_is_minimal() {
        std::env::set_var("INTERVIEW_ENGINE_SECRET", "leak");
        let runner = ProcessRunner::default();
        let outcome = runner
            .run(
                &shell("echo \"[$INTERVIEW_ENGINE_SECRET]\""),
                &limits(2000),
                None,
            )
            .await
            .unwrap();

        assert_eq!(outcome.stdout.trim(), "[]");
    }

    #[tokio::test]
    async fn test_output_is_capped() {
        let runner = ProcessRunner::new(16);
        let outcome = runner
            .run(
                &shell("i=0; while [ $i -lt 100 ]; do echo 0123456789; i=$((i+1)); done"),
                &limits(2000),
                None,
            )
            .await
            .unwrap();

        assert!(outcome.is_success());
        assert_eq!(outcome.stdout.len(), 16);
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let runner = ProcessRunner::default();
        let result = runner
            .run(
                &CommandSpec::new("definitely-not-a-real-binary-4242"),
                &limits(1000),
                None,
            )
            .await;

        assert!(matches!(result, Err(ExecutionError::Spawn { .. })));
    }

    #[test]
    fn test_parse_vm_hwm() {
        let status = "Name:\tpython3\nVmPeak:\t  20000 kB\nVmHWM:\t   8123 kB\nVmRSS:\t 8000 kB\n";
        assert_eq!(parse_vm_hwm(status), Some(8123));
        assert_eq!(parse_vm_hwm("Name:\tzombie\n"), None);
    }

    #[test]
    fn test_cpu_cap_rounds_up() {
        let caps = ResourceCaps::from_limits(&RunLimits::new(Duration::from_millis(1500), None));
        assert_eq!(caps.cpu_secs, 3);
        assert!(caps.address_space_bytes.is_none());
    }
}
