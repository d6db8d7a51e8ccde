//! Executor - runs candidate code against test cases
//!
//! One batch per call: a fresh workspace, one harness, at most one
//! compilation, then one process per test case. Results always line up with
//! the test cases, one per case and in the same order.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::catalog::TestCase;
use crate::compiler::compile_user_code;
use crate::config::ExecutionConfig;
use crate::error::ExecutionError;
use crate::languages::{Language, LanguageRegistry};
use crate::runner::{CommandSpec, RunLimits, RunOutcome, RunStatus, Runner};
use crate::toolchain::{cached_regex, support_for, Invocation, RESULT_MARKER};

/// Longest stderr excerpt kept in a per-case error
const MAX_ERROR_CHARS: usize = 2000;

/// Program output in two stages: decoded return value, or the raw stdout
#[derive(Debug, Clone, PartialEq)]
pub enum ProgramOutput {
    Parsed(Value),
    Raw(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    Parsed,
    Raw,
}

impl ProgramOutput {
    /// Decode the JSON after the last result marker, or keep stdout verbatim
    pub fn from_stdout(stdout: &str) -> Self {
        if let Some(at) = stdout.rfind(RESULT_MARKER) {
            let rest = &stdout[at + RESULT_MARKER.len()..];
            let payload = rest.lines().next().unwrap_or_default().trim();
            if let Ok(value) = serde_json::from_str(payload) {
                return ProgramOutput::Parsed(value);
            }
        }
        ProgramOutput::Raw(stdout.trim().to_string())
    }

    pub fn kind(&self) -> OutputKind {
        match self {
            ProgramOutput::Parsed(_) => OutputKind::Parsed,
            ProgramOutput::Raw(_) => OutputKind::Raw,
        }
    }

    /// Text form used for comparison and display
    pub fn render(&self) -> String {
        match self {
            ProgramOutput::Parsed(value) => value.to_string(),
            ProgramOutput::Raw(text) => text.clone(),
        }
    }
}

/// Outcome of one test case
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub test_index: usize,
    pub input: String,
    pub expected_output: String,
    pub actual_output: String,
    pub output_kind: OutputKind,
    pub passed: bool,
    pub execution_time_ms: u64,
    pub memory_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timed_out: bool,
}

impl ExecutionResult {
    fn failed(test_index: usize, case: &TestCase, error: String) -> Self {
        Self {
            test_index,
            input: case.input.clone(),
            expected_output: case.expected_output.clone(),
            actual_output: String::new(),
            output_kind: OutputKind::Raw,
            passed: false,
            execution_time_ms: 0,
            memory_bytes: 0,
            error: Some(error),
            timed_out: false,
        }
    }

    /// Judge one finished process
    pub fn from_outcome(test_index: usize, case: &TestCase, outcome: &RunOutcome) -> Self {
        let output = ProgramOutput::from_stdout(&outcome.stdout);
        let actual_output = output.render();

        let (passed, error, timed_out) = match &outcome.status {
            RunStatus::Exited(0) => (compare_outputs(&actual_output, &case.expected_output), None, false),
            RunStatus::TimeLimitExceeded => (
                false,
                Some(format!("Time limit exceeded after {} ms", outcome.time_ms)),
                true,
            ),
            RunStatus::Exited(code) => (
                false,
                Some(runtime_error(&outcome.stderr, || format!("Process exited with code {}", code))),
                false,
            ),
            RunStatus::Signaled(signal) => (
                false,
                Some(runtime_error(&outcome.stderr, || {
                    format!("Process was killed by signal {}", signal)
                })),
                false,
            ),
        };

        Self {
            test_index,
            input: case.input.clone(),
            expected_output: case.expected_output.clone(),
            actual_output,
            output_kind: output.kind(),
            passed,
            execution_time_ms: outcome.time_ms,
            memory_bytes: outcome.memory_kb.saturating_mul(1024),
            error,
            timed_out,
        }
    }

    /// One failed result per case for a batch that never compiled
    pub fn compile_failed_batch(test_cases: &[TestCase], message: &str) -> Vec<Self> {
        test_cases
            .iter()
            .enumerate()
            .map(|(index, case)| {
                Self::failed(index, case, format!("Compilation failed: {}", message))
            })
            .collect()
    }
}

fn runtime_error(stderr: &str, fallback: impl FnOnce() -> String) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        return fallback();
    }
    match stderr.char_indices().nth(MAX_ERROR_CHARS) {
        Some((cut, _)) => format!("{}...", &stderr[..cut]),
        None => stderr.to_string(),
    }
}

/// Lowercase, collapse whitespace and drop whitespace around punctuation
fn normalize(text: &str) -> String {
    static AROUND_PUNCTUATION: OnceLock<Option<Regex>> = OnceLock::new();
    let collapsed = text
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    match cached_regex(&AROUND_PUNCTUATION, r" ?([\[\]{}(),:;]) ?") {
        Some(re) => re.replace_all(&collapsed, "$1").into_owned(),
        None => collapsed,
    }
}

/// Two JSON documents that differ only in number formatting or letter case
fn json_equivalent(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => (x - y).abs() <= 1e-9 * x.abs().max(y.abs()).max(1.0),
            _ => false,
        },
        (Value::String(x), Value::String(y)) => x.to_lowercase() == y.to_lowercase(),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| json_equivalent(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(key, x)| ys.get(key).is_some_and(|y| json_equivalent(x, y)))
        }
        _ => a == b,
    }
}

/// Whether program output matches the expected output.
/// Case, whitespace amount and whitespace next to punctuation are ignored;
/// order and nesting are not.
pub fn compare_outputs(actual: &str, expected: &str) -> bool {
    if normalize(actual) == normalize(expected) {
        return true;
    }
    match (
        serde_json::from_str::<Value>(actual.trim()),
        serde_json::from_str::<Value>(expected.trim()),
    ) {
        (Ok(a), Ok(b)) => json_equivalent(&a, &b),
        _ => false,
    }
}

/// Runs candidate code in a throwaway workspace
pub struct Executor {
    runner: Arc<dyn Runner>,
    languages: Arc<LanguageRegistry>,
    config: ExecutionConfig,
}

impl Executor {
    pub fn new(
        runner: Arc<dyn Runner>,
        languages: Arc<LanguageRegistry>,
        config: ExecutionConfig,
    ) -> Self {
        Self {
            runner,
            languages,
            config,
        }
    }

    pub fn languages(&self) -> &LanguageRegistry {
        &self.languages
    }

    /// Run budget for one case of a problem with `base_time_ms`
    pub fn run_timeout(&self, language: Language, base_time_ms: u32) -> Duration {
        match self.languages.config(language) {
            Some(config) => {
                Duration::from_millis(u64::from(config.calculate_time_limit(base_time_ms)))
            }
            None => self.config.run_timeout,
        }
    }

    /// Run a single test case
    pub async fn execute(
        &self,
        source: &str,
        language: Language,
        test_case: &TestCase,
    ) -> Result<ExecutionResult, ExecutionError> {
        self.execute_all(source, language, std::slice::from_ref(test_case))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                ExecutionError::Io(std::io::Error::other("executor produced no result"))
            })
    }

    /// Run every test case under the default run timeout
    pub async fn execute_all(
        &self,
        source: &str,
        language: Language,
        test_cases: &[TestCase],
    ) -> Result<Vec<ExecutionResult>, ExecutionError> {
        self.execute_all_with_timeout(source, language, test_cases, self.config.run_timeout)
            .await
    }

    /// Run every test case sequentially, each under `run_timeout`
    pub async fn execute_all_with_timeout(
        &self,
        source: &str,
        language: Language,
        test_cases: &[TestCase],
        run_timeout: Duration,
    ) -> Result<Vec<ExecutionResult>, ExecutionError> {
        let lang_config = self
            .languages
            .config(language)
            .ok_or_else(|| ExecutionError::UnsupportedLanguage(language.to_string()))?;

        let harness = support_for(language).build_harness(source, test_cases);

        // Removed on drop, whichever way this function returns
        let workspace = tempfile::Builder::new()
            .prefix("interview-run-")
            .tempdir()?;
        let source_path = workspace.path().join(&lang_config.source_file);
        tokio::fs::write(&source_path, &harness.source).await?;
        debug!("Wrote harness to {}", source_path.display());

        let compiled = compile_user_code(
            self.runner.as_ref(),
            workspace.path(),
            lang_config,
            self.config.compile_timeout,
        )
        .await?;
        if !compiled.success {
            let message = compiled
                .message
                .unwrap_or_else(|| "Compilation failed".to_string());
            info!("{} submission failed to compile", language);
            return Err(ExecutionError::Compile { message });
        }

        let limits = RunLimits::new(
            run_timeout,
            lang_config
                .enforce_memory_limit
                .then_some(self.config.memory_limit_mb),
        );

        let mut results = Vec::with_capacity(test_cases.len());
        for (index, (case, invocation)) in test_cases.iter().zip(&harness.invocations).enumerate() {
            let result = match invocation {
                Invocation::Invalid { reason } => {
                    ExecutionResult::failed(index, case, format!("Invalid test input: {}", reason))
                }
                Invocation::Run { args, stdin } => {
                    let cmd = CommandSpec::from_vec(&lang_config.run_command)
                        .with_args(args.iter().cloned())
                        .with_work_dir(workspace.path());
                    let outcome = self.runner.run(&cmd, &limits, stdin.as_deref()).await?;
                    ExecutionResult::from_outcome(index, case, &outcome)
                }
            };
            debug!(
                "Test case {}: passed={} time={}ms timed_out={}",
                index, result.passed, result.execution_time_ms, result.timed_out
            );
            results.push(result);
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::testing::{exited, timed_out, ScriptedRunner};
    use crate::runner::ProcessRunner;
    use std::path::PathBuf;
    use std::sync::Mutex;

    fn case(input: &str, expected: &str) -> TestCase {
        TestCase {
            input: input.to_string(),
            expected_output: expected.to_string(),
            explanation: None,
        }
    }

    fn executor(runner: Arc<dyn Runner>) -> Executor {
        let languages = LanguageRegistry::embedded().unwrap();
        Executor::new(runner, Arc::new(languages), ExecutionConfig::default())
    }

    fn marker(json: &str) -> String {
        format!("debug line\n{}{}\n", RESULT_MARKER, json)
    }

    const PY_SUM: &str = "def solution(a, b):\n    return a + b\n";

    #[test]
    fn test_compare_outputs() {
        assert!(compare_outputs("[1, 2]", "[1,2]"));
        assert!(compare_outputs("  True ", "true"));
        assert!(compare_outputs("{\"a\": [1,  2]}", "{\"a\":[1,2]}"));
        assert!(compare_outputs("1", "1.0"));
        assert!(!compare_outputs("[2,1]", "[1,2]"));
        assert!(!compare_outputs("[[1,2]]", "[1,2]"));
    }

    #[test]
    fn test_program_output_stages() {
        assert_eq!(
            ProgramOutput::from_stdout(&marker("[1,2]")),
            ProgramOutput::Parsed(serde_json::json!([1, 2]))
        );
        assert_eq!(
            ProgramOutput::from_stdout("  hello world \n"),
            ProgramOutput::Raw("hello world".into())
        );
        let garbled = format!("{}not json", RESULT_MARKER);
        assert_eq!(ProgramOutput::from_stdout(&garbled).kind(), OutputKind::Raw);
    }

    #[tokio::test]
    async fn test_results_follow_case_order() {
        let runner = Arc::new(ScriptedRunner::new(|_, stdin| {
            let out = match stdin {
                Some("1\n2") => marker("3"),
                _ => marker("0"),
            };
            Ok(exited(0, &out, ""))
        }));
        let cases = vec![case("1\n2", "3"), case("{broken", "0"), case("5\n5", "10")];

        let results = executor(runner.clone())
            .execute_all(PY_SUM, Language::Python, &cases)
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(
            results.iter().map(|r| r.test_index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert!(results[0].passed);
        assert_eq!(results[0].output_kind, OutputKind::Parsed);
        assert!(results[1].error.as_deref().unwrap().contains("not valid JSON"));
        assert!(!results[2].passed);
        assert_eq!(results[2].actual_output, "0");
        // The invalid case never reached the runner
        assert_eq!(runner.calls().len(), 2);
        assert_eq!(runner.calls()[0].command, vec!["python3", "-u", "main.py"]);
    }

    #[tokio::test]
    async fn test_timeout_and_runtime_error_are_per_case() {
        let runner = Arc::new(ScriptedRunner::new(|_, stdin| match stdin {
            Some("1") => Ok(timed_out()),
            _ => Ok(exited(1, "", "Traceback\nZeroDivisionError: division by zero\n")),
        }));
        let cases = vec![case("1", "1"), case("2", "2")];

        let results = executor(runner)
            .execute_all(PY_SUM, Language::Python, &cases)
            .await
            .unwrap();

        assert!(results[0].timed_out);
        assert!(!results[0].passed);
        assert!(results[0].error.as_deref().unwrap().starts_with("Time limit exceeded"));
        assert!(!results[1].timed_out);
        assert!(results[1].error.as_deref().unwrap().contains("ZeroDivisionError"));
    }

    #[tokio::test]
    async fn test_compile_error_fails_whole_batch() {
        let runner = Arc::new(ScriptedRunner::new(|cmd, _| {
            if cmd.program == "g++" {
                Ok(exited(1, "", "main.cpp:4:17: error: expected ';' before '}' token"))
            } else {
                Ok(exited(0, &marker("1"), ""))
            }
        }));
        let src = "class Solution {\npublic:\n    int f(int x) {\n        return x\n    }\n};\n";

        let err = executor(runner.clone())
            .execute_all(src, Language::Cpp, &[case("1", "1"), case("2", "2")])
            .await
            .unwrap_err();

        match err {
            ExecutionError::Compile { message } => assert!(message.contains("expected ';'")),
            other => panic!("expected compile error, got {:?}", other),
        }
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_compiled_language_selects_case_by_index() {
        let runner = Arc::new(ScriptedRunner::new(|_, _| Ok(exited(0, &marker("[0,1]"), ""))));
        let src = "class Solution {\n    public int[] twoSum(int[] nums, int target) {\n        return new int[]{0, 1};\n    }\n}\n";
        let cases = vec![case("[2,7]\n9", "[0,1]"), case("[3,3]\n6", "[0,1]")];

        let results = executor(runner.clone())
            .execute_all(src, Language::Java, &cases)
            .await
            .unwrap();

        assert!(results.iter().all(|r| r.passed));
        let calls = runner.calls();
        assert_eq!(calls[0].command[0], "javac");
        assert_eq!(calls[1].command.last().map(String::as_str), Some("0"));
        assert_eq!(calls[2].command.last().map(String::as_str), Some("1"));
        // JVM heap is capped by -Xmx instead of an address-space limit
        assert!(calls[1].limits.memory_mb.is_none());
    }

    #[tokio::test]
    async fn test_workspace_is_removed_after_batch() {
        let seen: Arc<Mutex<Option<PathBuf>>> = Arc::new(Mutex::new(None));
        let seen_by_runner = seen.clone();
        let runner = Arc::new(ScriptedRunner::new(move |cmd, _| {
            let dir = cmd.work_dir.clone().unwrap();
            assert!(dir.join("main.py").exists());
            *seen_by_runner.lock().unwrap() = Some(dir);
            Ok(timed_out())
        }));

        executor(runner)
            .execute_all(PY_SUM, Language::Python, &[case("1\n2", "3")])
            .await
            .unwrap();

        let dir = seen.lock().unwrap().clone().unwrap();
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_spawn_failure_is_infrastructure() {
        let runner = Arc::new(ScriptedRunner::new(|cmd, _| {
            Err(ExecutionError::Spawn {
                program: cmd.program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            })
        }));

        let err = executor(runner)
            .execute(PY_SUM, Language::Python, &case("1\n2", "3"))
            .await
            .unwrap_err();
        assert!(err.is_infrastructure());
    }

    #[test]
    fn test_compile_failed_batch_keeps_length() {
        let cases = vec![case("1", "1"), case("2", "2")];
        let results = ExecutionResult::compile_failed_batch(&cases, "boom");
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| !r.passed));
        assert_eq!(results[1].error.as_deref(), Some("Compilation failed: boom"));
    }

    #[test]
    fn test_run_timeout_scales_by_language() {
        let exec = executor(Arc::new(ScriptedRunner::always("")));
        assert_eq!(exec.run_timeout(Language::Cpp, 2000), Duration::from_millis(2000));
        assert_eq!(exec.run_timeout(Language::Python, 2000), Duration::from_millis(5000));
    }

    fn installed(program: &str) -> bool {
        std::process::Command::new(program)
            .arg("--version")
            .output()
            .is_ok()
    }

    const THREE_SUM: &str = r#"class Solution:
    def threeSum(self, nums: List[int]) -> List[List[int]]:
        nums.sort()
        result = []
        for i in range(len(nums)):
            if i > 0 and nums[i] == nums[i - 1]:
                continue
            lo, hi = i + 1, len(nums) - 1
            while lo < hi:
                total = nums[i] + nums[lo] + nums[hi]
                if total < 0:
                    lo += 1
                elif total > 0:
                    hi -= 1
                else:
                    result.append([nums[i], nums[lo], nums[hi]])
                    while lo < hi and nums[lo] == nums[lo + 1]:
                        lo += 1
                    lo += 1
                    hi -= 1
        return result
"#;

    #[tokio::test]
    async fn test_python_three_sum_end_to_end() {
        if !installed("python3") {
            return;
        }
        let exec = executor(Arc::new(ProcessRunner::default()));
        let cases = vec![
            case("[-1,0,1,2,-1,-4]", "[[-1,-1,2],[-1,0,1]]"),
            case("[0,1,1]", "[]"),
        ];

        let results = exec
            .execute_all(THREE_SUM, Language::Python, &cases)
            .await
            .unwrap();

        assert!(results[0].passed, "{:?}", results[0]);
        assert!(results[1].passed, "{:?}", results[1]);
        assert_eq!(results[1].actual_output, "[]");
    }

    #[tokio::test]
    async fn test_python_in_place_solution_end_to_end() {
        if !installed("python3") {
            return;
        }
        let exec = executor(Arc::new(ProcessRunner::default()));
        let src = "def rotate(nums):\n    nums.reverse()\n";

        let results = exec
            .execute_all(src, Language::Python, &[case("[1,2,3]", "[3,2,1]")])
            .await
            .unwrap();
        assert!(results[0].passed, "{:?}", results[0]);
    }

    #[tokio::test]
    async fn test_cpp_compile_error_end_to_end() {
        if !installed("g++") {
            return;
        }
        let exec = executor(Arc::new(ProcessRunner::default()));
        let src = "class Solution {\npublic:\n    int twice(int x) {\n        return x * 2\n    }\n};\n";

        let err = exec
            .execute_all(src, Language::Cpp, &[case("1", "2"), case("2", "4")])
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Compile { .. }));
    }

    #[tokio::test]
    async fn test_cpp_harness_end_to_end() {
        if !installed("g++") {
            return;
        }
        let exec = executor(Arc::new(ProcessRunner::default()));
        let src = "class Solution {\npublic:\n    vector<int> twoSum(vector<int>& nums, int target) {\n        unordered_map<int, int> seen;\n        for (int i = 0; i < (int)nums.size(); i++) {\n            auto it = seen.find(target - nums[i]);\n            if (it != seen.end()) return {it->second, i};\n            seen[nums[i]] = i;\n        }\n        return {};\n    }\n};\n";

        let results = exec
            .execute_all(src, Language::Cpp, &[case("[2,7,11,15]\n9", "[0,1]")])
            .await
            .unwrap();
        assert!(results[0].passed, "{:?}", results[0]);
    }
}
