//! Prose feedback capability
//!
//! An external reviewer may add findings on top of the static analysis. The
//! engine only sees this trait; the backend behind it is opaque. Calls are
//! bounded by a timeout and any failure leaves the analysis untouched.

use async_trait::async_trait;

use crate::analyzer::AnalysisResult;
use crate::languages::Language;

/// Extra findings from a reviewer, merged into an `AnalysisResult`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Findings {
    pub logic_issues: Vec<String>,
    pub suggestions: Vec<String>,
    pub hints: Vec<String>,
}

impl Findings {
    pub fn is_empty(&self) -> bool {
        self.logic_issues.is_empty() && self.suggestions.is_empty() && self.hints.is_empty()
    }

    /// Append to `analysis`, skipping entries it already has
    pub fn merge_into(self, analysis: &mut AnalysisResult) {
        append_unique(&mut analysis.logic_issues, self.logic_issues);
        append_unique(&mut analysis.suggestions, self.suggestions);
        append_unique(&mut analysis.hints, self.hints);
    }
}

fn append_unique(target: &mut Vec<String>, items: Vec<String>) {
    for item in items {
        if !item.trim().is_empty() && !target.contains(&item) {
            target.push(item);
        }
    }
}

/// What the reviewer gets to see besides the code
#[derive(Debug, Clone, Copy)]
pub struct FeedbackContext<'a> {
    pub language: Language,
    pub problem_title: &'a str,
    pub problem_description: &'a str,
    pub analysis: &'a AnalysisResult,
}

#[async_trait]
pub trait FeedbackProvider: Send + Sync {
    async fn review(&self, code: &str, context: &FeedbackContext<'_>) -> anyhow::Result<Findings>;
}

/// Provider used when no reviewer is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFeedback;

#[async_trait]
impl FeedbackProvider for NoFeedback {
    async fn review(&self, _code: &str, _context: &FeedbackContext<'_>) -> anyhow::Result<Findings> {
        Ok(Findings::default())
    }
}
