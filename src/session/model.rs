//! Session state owned by one connection

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analyzer::AnalysisResult;
use crate::catalog::{Problem, SessionPlan};
use crate::executor::ExecutionResult;
use crate::hints::HintTrigger;
use crate::languages::Language;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Abandoned,
}

/// Running counters over every analyzed code change
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub code_changes: u32,
    pub syntax_errors: u32,
    pub logic_issues: u32,
    pub average_maintainability: f64,
    pub average_complexity: f64,
    /// Analyses folded into the averages; placeholder results are skipped
    #[serde(skip)]
    samples: u32,
}

impl Metrics {
    pub fn record(&mut self, analysis: &AnalysisResult) {
        self.code_changes += 1;
        self.syntax_errors += analysis.syntax_errors.len() as u32;
        self.logic_issues += analysis.logic_issues.len() as u32;

        if !analysis.is_measured() {
            return;
        }
        self.samples += 1;
        let n = f64::from(self.samples);
        let metrics = &analysis.code_metrics;
        self.average_maintainability +=
            (metrics.maintainability_index - self.average_maintainability) / n;
        self.average_complexity +=
            (f64::from(metrics.cyclomatic_complexity) - self.average_complexity) / n;
    }
}

/// Progress on one problem of the session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemAttempt {
    pub problem_id: String,
    pub started_at: DateTime<Utc>,
    /// Runs against the problem's own test cases
    pub runs: u32,
    /// Runs against candidate-supplied cases; never scored
    pub custom_runs: u32,
    pub best_passed: usize,
    pub total_cases: usize,
    pub solved: bool,
}

impl ProblemAttempt {
    fn new(problem: &Problem) -> Self {
        Self {
            problem_id: problem.id.clone(),
            started_at: Utc::now(),
            runs: 0,
            custom_runs: 0,
            best_passed: 0,
            total_cases: problem.test_cases.len(),
            solved: false,
        }
    }
}

/// One `run_tests` batch. Never modified after creation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub source: String,
    pub language: Language,
    pub problem_id: String,
    pub timestamp: DateTime<Utc>,
    pub results: Vec<ExecutionResult>,
    pub passed_count: usize,
    pub total_count: usize,
    /// Ran candidate-supplied cases instead of the problem's
    pub custom_cases: bool,
    pub average_execution_time_ms: f64,
    pub average_memory_bytes: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compile_error: Option<String>,
}

impl Submission {
    pub fn new(
        source: String,
        language: Language,
        problem_id: String,
        results: Vec<ExecutionResult>,
        compile_error: Option<String>,
    ) -> Self {
        let passed_count = results.iter().filter(|r| r.passed).count();
        let total_count = results.len();
        let (average_execution_time_ms, average_memory_bytes) = if total_count == 0 {
            (0.0, 0.0)
        } else {
            let n = total_count as f64;
            (
                results.iter().map(|r| r.execution_time_ms as f64).sum::<f64>() / n,
                results.iter().map(|r| r.memory_bytes as f64).sum::<f64>() / n,
            )
        };

        Self {
            source,
            language,
            problem_id,
            timestamp: Utc::now(),
            results,
            passed_count,
            total_count,
            custom_cases: false,
            average_execution_time_ms,
            average_memory_bytes,
            compile_error,
        }
    }

    pub fn with_custom_cases(mut self, custom_cases: bool) -> Self {
        self.custom_cases = custom_cases;
        self
    }

    pub fn all_passed(&self) -> bool {
        self.total_count > 0 && self.passed_count == self.total_count
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HintEvent {
    pub tier: u8,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// The candidate asked for it or rated it
    pub used: bool,
    pub rating: Option<u8>,
    pub problem_id: String,
    pub trigger: HintTrigger,
}

#[derive(Debug)]
pub struct Session {
    pub session_id: String,
    pub candidate_email: Option<String>,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub problems: Vec<Problem>,
    pub current_problem: usize,
    pub attempts: Vec<ProblemAttempt>,
    pub submissions: Vec<Submission>,
    pub hint_events: Vec<HintEvent>,
    pub metrics: Metrics,
    /// Every handled event, protocol errors excluded
    pub interactions: u32,
    pub latest_analysis: Option<AnalysisResult>,
    pub analysis_scores: Vec<u8>,
    pub suggestions_given: u32,
    pub languages_used: BTreeSet<Language>,
}

impl Session {
    /// `None` when the plan has no problems
    pub fn start(plan: SessionPlan, candidate_email: Option<String>) -> Option<Self> {
        let first = plan.problems.first()?;
        let attempts = vec![ProblemAttempt::new(first)];

        Some(Self {
            session_id: plan.session_id,
            candidate_email: candidate_email.or(plan.candidate_email),
            status: SessionStatus::Active,
            started_at: Utc::now(),
            problems: plan.problems,
            current_problem: 0,
            attempts,
            submissions: Vec::new(),
            hint_events: Vec::new(),
            metrics: Metrics::default(),
            interactions: 0,
            latest_analysis: None,
            analysis_scores: Vec::new(),
            suggestions_given: 0,
            languages_used: BTreeSet::new(),
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    pub fn problem(&self) -> &Problem {
        // `start` guarantees at least one problem and `advance` stays in range
        &self.problems[self.current_problem]
    }

    pub fn has_next_problem(&self) -> bool {
        self.current_problem + 1 < self.problems.len()
    }

    /// Move to the next problem; `false` when already on the last one
    pub fn advance(&mut self) -> bool {
        if !self.has_next_problem() {
            return false;
        }
        self.current_problem += 1;
        let attempt = ProblemAttempt::new(&self.problems[self.current_problem]);
        self.attempts.push(attempt);
        true
    }

    pub fn record_analysis(&mut self, language: Language, analysis: &AnalysisResult) {
        self.metrics.record(analysis);
        self.languages_used.insert(language);
        if analysis.is_measured() {
            self.analysis_scores.push(analysis.score);
        }
        self.suggestions_given += analysis.suggestions.len() as u32;
        self.latest_analysis = Some(analysis.clone());
    }

    pub fn record_submission(&mut self, submission: Submission) {
        self.languages_used.insert(submission.language);
        if let Some(attempt) = self
            .attempts
            .iter_mut()
            .rev()
            .find(|a| a.problem_id == submission.problem_id)
        {
            if submission.custom_cases {
                attempt.custom_runs += 1;
            } else {
                attempt.runs += 1;
                attempt.total_cases = submission.total_count;
                attempt.best_passed = attempt.best_passed.max(submission.passed_count);
                attempt.solved |= submission.all_passed();
            }
        }
        self.submissions.push(submission);
    }

    pub fn record_hint(&mut self, event: HintEvent) {
        self.hint_events.push(event);
    }

    /// Latest hint of `tier` on the current problem
    pub fn hint_mut(&mut self, tier: u8) -> Option<&mut HintEvent> {
        let problem_id = self.problem().id.clone();
        self.hint_events
            .iter_mut()
            .rev()
            .find(|h| h.tier == tier && h.problem_id == problem_id)
    }

    pub fn average_analysis_score(&self) -> f64 {
        if self.analysis_scores.is_empty() {
            return 0.0;
        }
        let total: u32 = self.analysis_scores.iter().map(|s| u32::from(*s)).sum();
        f64::from(total) / self.analysis_scores.len() as f64
    }
}
