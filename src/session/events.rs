//! Wire events
//!
//! Every frame is `{"event": <snake_case name>, "data": {<camelCase fields>}}`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::model::SessionStatus;
use super::summary::{PerformanceSummary, Rating};
use crate::analyzer::AnalysisResult;
use crate::catalog::{Difficulty, Problem, TestCase};
use crate::executor::ExecutionResult;
use crate::hints::HintTrigger;
use crate::languages::Language;

#[derive(Debug, Clone, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    JoinSession {
        session_id: String,
        #[serde(default)]
        candidate_email: Option<String>,
    },
    CodeChanged {
        session_id: String,
        code: String,
        language: String,
        /// Editor cursor; opaque to the engine
        #[serde(default)]
        cursor_position: Option<Value>,
    },
    RunTests {
        session_id: String,
        code: String,
        language: String,
        #[serde(default)]
        test_cases: Option<Vec<TestCase>>,
    },
    RequestHint {
        session_id: String,
        #[serde(default)]
        code: Option<String>,
        #[serde(default)]
        language: Option<String>,
    },
    CompleteSession {
        session_id: String,
    },
    NextProblem {
        session_id: String,
    },
    RateHint {
        session_id: String,
        tier: u8,
        rating: u8,
    },
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinSession { .. } => "join_session",
            ClientEvent::CodeChanged { .. } => "code_changed",
            ClientEvent::RunTests { .. } => "run_tests",
            ClientEvent::RequestHint { .. } => "request_hint",
            ClientEvent::CompleteSession { .. } => "complete_session",
            ClientEvent::NextProblem { .. } => "next_problem",
            ClientEvent::RateHint { .. } => "rate_hint",
        }
    }
}

/// Problem as shown to the candidate; hints and complexity stay server-side
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemView {
    pub id: String,
    pub title: String,
    pub difficulty: Difficulty,
    pub description: String,
    pub starter_templates: BTreeMap<Language, String>,
    pub test_cases: Vec<TestCase>,
    pub allowed_languages: Vec<Language>,
    pub time_limit_ms: u32,
}

impl From<&Problem> for ProblemView {
    fn from(problem: &Problem) -> Self {
        Self {
            id: problem.id.clone(),
            title: problem.title.clone(),
            difficulty: problem.difficulty,
            description: problem.description.clone(),
            starter_templates: problem.starter_templates.clone(),
            test_cases: problem.test_cases.clone(),
            allowed_languages: problem.allowed_languages.clone(),
            time_limit_ms: problem.time_limit_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    Joined {
        session_id: String,
        problem: ProblemView,
        problem_index: usize,
        problem_count: usize,
        status: SessionStatus,
    },
    AnalysisResult {
        session_id: String,
        analysis: AnalysisResult,
        timestamp: DateTime<Utc>,
    },
    TestResults {
        session_id: String,
        results: Vec<ExecutionResult>,
        /// Percentage of passed cases
        score: u32,
        passed_count: usize,
        total_count: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        compile_error: Option<String>,
        timestamp: DateTime<Utc>,
    },
    Hint {
        tier: u8,
        content: String,
        trigger: HintTrigger,
        timestamp: DateTime<Utc>,
    },
    Status {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        retry_after_secs: Option<u64>,
    },
    SessionCompleted {
        overall_score: f64,
        rating: Rating,
        final_assessment: String,
        performance_summary: PerformanceSummary,
    },
    ProblemChanged {
        problem: ProblemView,
        index: usize,
    },
    Error {
        message: String,
    },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }

    pub fn status(message: impl Into<String>) -> Self {
        ServerEvent::Status {
            message: message.into(),
            retry_after_secs: None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Joined { .. } => "joined",
            ServerEvent::AnalysisResult { .. } => "analysis_result",
            ServerEvent::TestResults { .. } => "test_results",
            ServerEvent::Hint { .. } => "hint",
            ServerEvent::Status { .. } => "status",
            ServerEvent::SessionCompleted { .. } => "session_completed",
            ServerEvent::ProblemChanged { .. } => "problem_changed",
            ServerEvent::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_client_events() {
        let event: ClientEvent = serde_json::from_value(json!({
            "event": "code_changed",
            "data": {
                "sessionId": "s1",
                "code": "x = 1",
                "language": "python",
                "cursorPosition": {"line": 1, "column": 5}
            }
        }))
        .unwrap();
        match event {
            ClientEvent::CodeChanged {
                session_id,
                language,
                cursor_position,
                ..
            } => {
                assert_eq!(session_id, "s1");
                assert_eq!(language, "python");
                assert!(cursor_position.is_some());
            }
            other => panic!("unexpected event {:?}", other),
        }

        let event: ClientEvent = serde_json::from_value(json!({
            "event": "run_tests",
            "data": {
                "sessionId": "s1",
                "code": "",
                "language": "cpp",
                "testCases": [{"input": "1\n2", "expectedOutput": "3"}]
            }
        }))
        .unwrap();
        assert_eq!(event.name(), "run_tests");
    }

    #[test]
    fn test_unknown_event_is_rejected() {
        let parsed = serde_json::from_value::<ClientEvent>(json!({
            "event": "drop_tables",
            "data": {"sessionId": "s1"}
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_server_event_shape() {
        let value = serde_json::to_value(ServerEvent::Status {
            message: "wait".into(),
            retry_after_secs: Some(30),
        })
        .unwrap();
        assert_eq!(
            value,
            json!({"event": "status", "data": {"message": "wait", "retryAfterSecs": 30}})
        );

        let value = serde_json::to_value(ServerEvent::TestResults {
            session_id: "s1".into(),
            results: Vec::new(),
            score: 0,
            passed_count: 0,
            total_count: 0,
            compile_error: None,
            timestamp: Utc::now(),
        })
        .unwrap();
        assert_eq!(value["event"], "test_results");
        assert_eq!(value["data"]["passedCount"], 0);
        assert!(value["data"].get("compileError").is_none());
    }
}
