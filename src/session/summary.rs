//! End-of-session scoring and the completion record

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::model::Session;

/// Weight of the test pass rate in the overall score; analysis gets the rest
const PASS_RATE_WEIGHT: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Rating {
    Excellent,
    Good,
    Average,
    BelowAverage,
    Poor,
}

impl Rating {
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s >= 90.0 => Rating::Excellent,
            s if s >= 75.0 => Rating::Good,
            s if s >= 60.0 => Rating::Average,
            s if s >= 40.0 => Rating::BelowAverage,
            _ => Rating::Poor,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Rating::Excellent => "excellent",
            Rating::Good => "good",
            Rating::Average => "average",
            Rating::BelowAverage => "below-average",
            Rating::Poor => "poor",
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `pass_rate` in 0..=1, `average_analysis_score` in 0..=100
pub fn overall_score(pass_rate: f64, average_analysis_score: f64) -> f64 {
    let score = PASS_RATE_WEIGHT * pass_rate.clamp(0.0, 1.0) * 100.0
        + (1.0 - PASS_RATE_WEIGHT) * average_analysis_score.clamp(0.0, 100.0);
    (score * 10.0).round() / 10.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSummary {
    pub problems_attempted: usize,
    pub problems_solved: usize,
    pub total_submissions: usize,
    pub tests_passed: usize,
    pub tests_total: usize,
    /// Percentage, best run per attempted problem
    pub pass_rate: f64,
    pub average_analysis_score: f64,
    pub hints_used: usize,
    pub code_changes: u32,
    pub duration_secs: i64,
    pub languages_used: Vec<String>,
}

/// Document persisted once per completed session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRecord {
    pub session_id: String,
    pub candidate_email: Option<String>,
    pub total_interactions: u32,
    pub code_changes: u32,
    pub total_submissions: usize,
    pub hints_used: usize,
    pub suggestions_given: u32,
    pub syntax_errors: u32,
    pub logic_issues: u32,
    pub average_analysis_score: f64,
    pub average_maintainability: f64,
    pub average_complexity: f64,
    pub average_execution_time_ms: f64,
    pub average_memory_bytes: f64,
    pub problems_attempted: usize,
    pub problems_solved: usize,
    pub languages_used: Vec<String>,
    pub overall_score: f64,
    pub rating: Rating,
    pub final_assessment: String,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub record: CompletionRecord,
    pub performance: PerformanceSummary,
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn summarize(session: &Session, completed_at: DateTime<Utc>) -> SessionSummary {
    let attempted: Vec<_> = session.attempts.iter().filter(|a| a.runs > 0).collect();
    let tests_passed: usize = attempted.iter().map(|a| a.best_passed).sum();
    let tests_total: usize = attempted.iter().map(|a| a.total_cases).sum();
    let pass_rate = if tests_total == 0 {
        0.0
    } else {
        tests_passed as f64 / tests_total as f64
    };
    let problems_solved = attempted.iter().filter(|a| a.solved).count();

    let analysis_score = session.average_analysis_score();
    let overall = overall_score(pass_rate, analysis_score);
    let rating = Rating::from_score(overall);

    // Compile failures carry no timing data
    let ran: Vec<_> = session
        .submissions
        .iter()
        .filter(|s| s.compile_error.is_none() && s.total_count > 0)
        .collect();
    let average = |values: Vec<f64>| {
        if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        }
    };
    let average_execution_time_ms =
        round1(average(ran.iter().map(|s| s.average_execution_time_ms).collect()));
    let average_memory_bytes =
        round1(average(ran.iter().map(|s| s.average_memory_bytes).collect()));

    let hints_used = session.hint_events.len();
    let languages_used: Vec<String> = session
        .languages_used
        .iter()
        .map(|l| l.key().to_string())
        .collect();

    let final_assessment = assessment(
        rating,
        problems_solved,
        session.problems.len(),
        analysis_score,
        hints_used,
    );

    let performance = PerformanceSummary {
        problems_attempted: attempted.len(),
        problems_solved,
        total_submissions: session.submissions.len(),
        tests_passed,
        tests_total,
        pass_rate: round1(pass_rate * 100.0),
        average_analysis_score: round1(analysis_score),
        hints_used,
        code_changes: session.metrics.code_changes,
        duration_secs: (completed_at - session.started_at).num_seconds().max(0),
        languages_used: languages_used.clone(),
    };

    let record = CompletionRecord {
        session_id: session.session_id.clone(),
        candidate_email: session.candidate_email.clone(),
        total_interactions: session.interactions,
        code_changes: session.metrics.code_changes,
        total_submissions: session.submissions.len(),
        hints_used,
        suggestions_given: session.suggestions_given,
        syntax_errors: session.metrics.syntax_errors,
        logic_issues: session.metrics.logic_issues,
        average_analysis_score: round1(analysis_score),
        average_maintainability: round1(session.metrics.average_maintainability),
        average_complexity: round1(session.metrics.average_complexity),
        average_execution_time_ms,
        average_memory_bytes,
        problems_attempted: attempted.len(),
        problems_solved,
        languages_used,
        overall_score: overall,
        rating,
        final_assessment,
        completed_at,
    };

    SessionSummary { record, performance }
}

fn assessment(
    rating: Rating,
    solved: usize,
    total: usize,
    analysis_score: f64,
    hints_used: usize,
) -> String {
    let headline = match rating {
        Rating::Excellent => "Excellent performance: correct solutions with clean, efficient code.",
        Rating::Good => "Good performance: mostly correct solutions with reasonable code quality.",
        Rating::Average => "Average performance: partially correct solutions; code quality has room to grow.",
        Rating::BelowAverage => "Below-average performance: several tests failed and the code needs work.",
        Rating::Poor => "Poor performance: few tests passed.",
    };
    let hint_note = match hints_used {
        0 => "No hints were needed.".to_string(),
        1 => "1 hint was used.".to_string(),
        n => format!("{} hints were used.", n),
    };
    format!(
        "{} Solved {} of {} problems with an average code quality score of {:.0}/100. {}",
        headline, solved, total, analysis_score, hint_note
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Difficulty, Problem, SessionPlan};
    use crate::executor::{ExecutionResult, OutputKind};
    use crate::languages::Language;
    use crate::session::model::Submission;
    use std::collections::BTreeMap;

    #[test]
    fn test_overall_score_weights() {
        assert_eq!(overall_score(1.0, 100.0), 100.0);
        assert_eq!(overall_score(1.0, 50.0), 85.0);
        assert_eq!(overall_score(0.5, 80.0), 59.0);
        assert_eq!(overall_score(0.0, 0.0), 0.0);
    }

    #[test]
    fn test_rating_bands() {
        assert_eq!(Rating::from_score(90.0), Rating::Excellent);
        assert_eq!(Rating::from_score(89.9), Rating::Good);
        assert_eq!(Rating::from_score(75.0), Rating::Good);
        assert_eq!(Rating::from_score(60.0), Rating::Average);
        assert_eq!(Rating::from_score(40.0), Rating::BelowAverage);
        assert_eq!(Rating::from_score(39.9), Rating::Poor);
        assert_eq!(
            serde_json::to_value(Rating::BelowAverage).unwrap(),
            "below-average"
        );
    }

    fn session_with_run(passed: &[bool]) -> Session {
        let problem = Problem {
            id: "p".into(),
            title: "P".into(),
            difficulty: Difficulty::Easy,
            description: String::new(),
            starter_templates: BTreeMap::new(),
            test_cases: Vec::new(),
            allowed_languages: Vec::new(),
            time_limit_ms: 2000,
            hints: Vec::new(),
            expected_complexity: None,
        };
        let plan = SessionPlan {
            session_id: "s1".into(),
            candidate_email: None,
            problems: vec![problem],
        };
        let mut session = Session::start(plan, None).unwrap();
        let results = passed
            .iter()
            .enumerate()
            .map(|(i, p)| ExecutionResult {
                test_index: i,
                input: String::new(),
                expected_output: String::new(),
                actual_output: String::new(),
                output_kind: OutputKind::Parsed,
                passed: *p,
                execution_time_ms: 40,
                memory_bytes: 2048,
                error: None,
                timed_out: false,
            })
            .collect();
        session.record_submission(Submission::new(
            "code".into(),
            Language::Python,
            "p".into(),
            results,
            None,
        ));
        session
    }

    #[test]
    fn test_summary_from_session() {
        let mut session = session_with_run(&[true, true, false, false]);
        session.analysis_scores = vec![80, 100];

        let summary = summarize(&session, Utc::now());
        let record = &summary.record;

        // 0.7 * 50 + 0.3 * 90
        assert_eq!(record.overall_score, 62.0);
        assert_eq!(record.rating, Rating::Average);
        assert_eq!(record.problems_attempted, 1);
        assert_eq!(record.problems_solved, 0);
        assert_eq!(record.average_execution_time_ms, 40.0);
        assert_eq!(record.languages_used, vec!["python"]);
        assert_eq!(summary.performance.pass_rate, 50.0);
        assert!(record.final_assessment.starts_with("Average performance"));
        assert!(record.final_assessment.contains("No hints were needed."));
    }

    #[test]
    fn test_summary_without_activity() {
        let session = session_with_run(&[]);
        let summary = summarize(&session, Utc::now());
        assert_eq!(summary.record.overall_score, 0.0);
        assert_eq!(summary.record.rating, Rating::Poor);
        assert_eq!(summary.performance.tests_total, 0);
    }
}
