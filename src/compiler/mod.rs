//! Compiler module - Source code compilation
//!
//! Builds harnessed candidate code once per batch. Toolchains are trusted, so
//! the compile step gets a timeout and CPU cap but no address-space cap.

use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::error::ExecutionError;
use crate::languages::LanguageConfig;
use crate::runner::{CommandSpec, RunLimits, RunStatus, Runner};

/// Longest diagnostic forwarded to the candidate
const MAX_MESSAGE_CHARS: usize = 4000;

/// Result of a compilation attempt
#[derive(Debug)]
pub struct CompileResult {
    pub success: bool,
    pub message: Option<String>,
}

impl CompileResult {
    fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }
}

/// Compile source code in `work_dir` with `compile_cmd`
pub async fn compile(
    runner: &dyn Runner,
    work_dir: &Path,
    compile_cmd: &[String],
    timeout: Duration,
) -> Result<CompileResult, ExecutionError> {
    if compile_cmd.is_empty() {
        return Ok(CompileResult::ok());
    }

    debug!("Compiling with {:?}", compile_cmd);

    let spec = CommandSpec::from_vec(compile_cmd).with_work_dir(work_dir);
    let result = runner
        .run(&spec, &RunLimits::new(timeout, None), None)
        .await?;

    if result.is_success() {
        return Ok(CompileResult::ok());
    }

    let error_msg = if !result.stderr.trim().is_empty() {
        result.stderr
    } else if !result.stdout.trim().is_empty() {
        result.stdout
    } else {
        match result.status {
            RunStatus::TimeLimitExceeded => "Compilation timed out".to_string(),
            RunStatus::Signaled(_) => "Compiler crashed".to_string(),
            RunStatus::Exited(code) => format!("Compilation failed with exit code {}", code),
        }
    };

    Ok(CompileResult {
        success: false,
        message: Some(truncate(error_msg.trim(), MAX_MESSAGE_CHARS)),
    })
}

/// Compile user code for `lang_config`; interpreted languages succeed immediately
pub async fn compile_user_code(
    runner: &dyn Runner,
    work_dir: &Path,
    lang_config: &LanguageConfig,
    timeout: Duration,
) -> Result<CompileResult, ExecutionError> {
    match &lang_config.compile_command {
        Some(cmd) => compile(runner, work_dir, cmd, timeout).await,
        None => Ok(CompileResult::ok()),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}\n... (truncated)", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::testing::{exited, timed_out, ScriptedRunner};

    fn cmd() -> Vec<String> {
        vec!["g++".into(), "-o".into(), "main".into(), "main.cpp".into()]
    }

    #[tokio::test]
    async fn test_successful_compile() {
        let runner = ScriptedRunner::always("");
        let result = compile(&runner, Path::new("/tmp"), &cmd(), Duration::from_secs(10))
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.message.is_none());
        let calls = runner.calls();
        assert_eq!(calls[0].command[0], "g++");
        assert!(calls[0].limits.memory_mb.is_none());
    }

    #[tokio::test]
    async fn test_compile_error_prefers_stderr() {
        let runner = ScriptedRunner::new(|_, _| {
            Ok(exited(1, "noise", "main.cpp:3:5: error: expected ';'\n"))
        });
        let result = compile(&runner, Path::new("/tmp"), &cmd(), Duration::from_secs(10))
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(
            result.message.as_deref(),
            Some("main.cpp:3:5: error: expected ';'")
        );
    }

    #[tokio::test]
    async fn test_compile_timeout_message() {
        let runner = ScriptedRunner::new(|_, _| Ok(timed_out()));
        let result = compile(&runner, Path::new("/tmp"), &cmd(), Duration::from_secs(1))
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.message.as_deref(), Some("Compilation timed out"));
    }

    #[test]
    fn test_truncate_long_message() {
        let long = "x".repeat(10);
        assert_eq!(truncate(&long, 20), long);
        assert!(truncate(&long, 4).starts_with("xxxx\n"));
    }
}
