//! Tiered hint controller
//!
//! One controller per problem attempt. Tiers only move up (0 to 3) and never
//! past 3. Each escalation emits the content for the new tier: the problem's
//! own hint when it has one, a generic template otherwise.

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use crate::analyzer::AnalysisResult;
use crate::catalog::Problem;
use crate::config::HintConfig;

/// Highest tier; escalation stops here
pub const MAX_TIER: u8 = 3;

/// Why a hint was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HintTrigger {
    Idle,
    RepeatedErrors,
    StructuralSmell,
    Requested,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HintDelivery {
    pub tier: u8,
    pub content: String,
    pub trigger: HintTrigger,
}

pub struct HintController {
    problem_id: String,
    problem_title: String,
    hints: Vec<String>,
    tier: u8,
    last_activity: Instant,
    errors_since_hint: u32,
    smell_present: bool,
    smell_hinted: bool,
    config: HintConfig,
}

impl HintController {
    pub fn new(problem: &Problem, config: HintConfig, now: Instant) -> Self {
        Self {
            problem_id: problem.id.clone(),
            problem_title: problem.title.clone(),
            hints: problem.hints.clone(),
            tier: 0,
            last_activity: now,
            errors_since_hint: 0,
            smell_present: false,
            smell_hinted: false,
            config,
        }
    }

    pub fn tier(&self) -> u8 {
        self.tier
    }

    pub fn problem_id(&self) -> &str {
        &self.problem_id
    }

    /// Fold one analysis of freshly edited code into the counters
    pub fn observe_analysis(&mut self, analysis: &AnalysisResult, now: Instant) {
        self.last_activity = now;
        self.errors_since_hint = self
            .errors_since_hint
            .saturating_add(analysis.syntax_errors.len() as u32);

        self.smell_present =
            analysis.code_metrics.loop_nesting_depth >= self.config.smell_loop_depth;
        // Re-arm once the smell is gone so a reintroduced one fires again
        if !self.smell_present {
            self.smell_hinted = false;
        }
    }

    /// The trigger that would fire now, highest priority first
    pub fn pending_trigger(&self, now: Instant) -> Option<HintTrigger> {
        if self.tier >= MAX_TIER {
            return None;
        }
        if self.smell_present && !self.smell_hinted {
            return Some(HintTrigger::StructuralSmell);
        }
        if self.errors_since_hint >= self.config.error_threshold {
            return Some(HintTrigger::RepeatedErrors);
        }
        if now.saturating_duration_since(self.last_activity) >= self.config.idle_threshold {
            return Some(HintTrigger::Idle);
        }
        None
    }

    /// Move up one tier. `None` once the terminal tier is reached.
    pub fn escalate(&mut self, trigger: HintTrigger, now: Instant) -> Option<HintDelivery> {
        if self.tier >= MAX_TIER {
            return None;
        }
        self.tier += 1;
        self.errors_since_hint = 0;
        self.last_activity = now;
        if self.smell_present {
            self.smell_hinted = true;
        }

        debug!(
            "Hint for {} escalated to tier {} ({:?})",
            self.problem_id, self.tier, trigger
        );
        Some(HintDelivery {
            tier: self.tier,
            content: self.content_for(self.tier),
            trigger,
        })
    }

    /// Explicit request: escalate, or repeat the final tier once there
    pub fn request(&mut self, now: Instant) -> HintDelivery {
        if let Some(delivery) = self.escalate(HintTrigger::Requested, now) {
            return delivery;
        }
        self.last_activity = now;
        HintDelivery {
            tier: MAX_TIER,
            content: self.content_for(MAX_TIER),
            trigger: HintTrigger::Requested,
        }
    }

    /// Start over for the next problem
    pub fn reset(&mut self, problem: &Problem, now: Instant) {
        *self = Self::new(problem, self.config.clone(), now);
    }

    fn content_for(&self, tier: u8) -> String {
        let index = usize::from(tier.saturating_sub(1));
        if let Some(hint) = self.hints.get(index).filter(|h| !h.trim().is_empty()) {
            return hint.clone();
        }
        generic_hint(&self.problem_title, tier)
    }
}

fn generic_hint(title: &str, tier: u8) -> String {
    match tier {
        1 => format!(
            "Nudge: restate '{}' in your own words and work one small example by hand before writing more code.",
            title
        ),
        2 => "Guide: think about which data structure answers your inner question in constant time; a hash map or a sorted order often removes a whole loop.".to_string(),
        _ => "Direction: write the single-pass version first. Keep what you have seen so far in a structure you can query, and return as soon as the answer is known.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{Analyzer, ProblemContext};
    use crate::catalog::Difficulty;
    use crate::languages::Language;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn problem(hints: &[&str]) -> Problem {
        Problem {
            id: "two-sum".into(),
            title: "Two Sum".into(),
            difficulty: Difficulty::Easy,
            description: String::new(),
            starter_templates: BTreeMap::new(),
            test_cases: Vec::new(),
            allowed_languages: Vec::new(),
            time_limit_ms: 2000,
            hints: hints.iter().map(|h| h.to_string()).collect(),
            expected_complexity: Some("O(n)".into()),
        }
    }

    fn with_errors(count: usize) -> AnalysisResult {
        let mut analysis = AnalysisResult::neutral();
        analysis.degraded = false;
        analysis.syntax_errors = (0..count).map(|i| format!("Line {}: bad", i + 1)).collect();
        analysis
    }

    #[test]
    fn test_tiers_are_monotonic_and_capped() {
        let start = Instant::now();
        let mut hints = HintController::new(&problem(&[]), HintConfig::default(), start);

        let tiers: Vec<u8> = (0..5).map(|_| hints.request(start).tier).collect();
        assert_eq!(tiers, vec![1, 2, 3, 3, 3]);
        assert_eq!(hints.tier(), 3);
        assert_eq!(hints.escalate(HintTrigger::Idle, start), None);
        assert_eq!(hints.pending_trigger(start + Duration::from_secs(600)), None);
    }

    #[test]
    fn test_problem_hints_come_first() {
        let start = Instant::now();
        let mut hints =
            HintController::new(&problem(&["first", "second"]), HintConfig::default(), start);

        assert_eq!(hints.request(start).content, "first");
        assert_eq!(hints.request(start).content, "second");
        assert!(hints.request(start).content.starts_with("Direction:"));
    }

    #[test]
    fn test_idle_trigger() {
        let start = Instant::now();
        let hints = HintController::new(&problem(&[]), HintConfig::default(), start);

        assert_eq!(hints.pending_trigger(start + Duration::from_secs(119)), None);
        assert_eq!(
            hints.pending_trigger(start + Duration::from_secs(120)),
            Some(HintTrigger::Idle)
        );
    }

    #[test]
    fn test_errors_accumulate_and_reset_on_escalation() {
        let start = Instant::now();
        let mut hints = HintController::new(&problem(&[]), HintConfig::default(), start);

        hints.observe_analysis(&with_errors(2), start);
        assert_eq!(hints.pending_trigger(start), None);
        hints.observe_analysis(&with_errors(1), start);
        assert_eq!(hints.pending_trigger(start), Some(HintTrigger::RepeatedErrors));

        let delivery = hints.escalate(HintTrigger::RepeatedErrors, start).unwrap();
        assert_eq!(delivery.tier, 1);
        assert_eq!(hints.pending_trigger(start), None);
    }

    #[test]
    fn test_reset_returns_to_tier_zero() {
        let start = Instant::now();
        let mut hints = HintController::new(&problem(&[]), HintConfig::default(), start);
        hints.request(start);
        hints.request(start);

        let mut next = problem(&["fresh"]);
        next.id = "valid-parentheses".into();
        hints.reset(&next, start);

        assert_eq!(hints.tier(), 0);
        assert_eq!(hints.problem_id(), "valid-parentheses");
        assert_eq!(hints.request(start).content, "fresh");
    }

    #[test]
    fn test_triple_nested_loops_fire_one_smell_hint() {
        let source = "\
def three_sum(nums):
    out = []
    for i in range(len(nums)):
        for j in range(i + 1, len(nums)):
            for k in range(j + 1, len(nums)):
                if nums[i] + nums[j] + nums[k] == 0:
                    out.append([nums[i], nums[j], nums[k]])
    return out
";
        let analysis = Analyzer::new().analyze(source, Language::Python, &ProblemContext::default());
        assert_eq!(analysis.code_metrics.loop_nesting_depth, 3);

        let start = Instant::now();
        let mut hints = HintController::new(&problem(&[]), HintConfig::default(), start);
        hints.observe_analysis(&analysis, start);

        let trigger = hints.pending_trigger(start).unwrap();
        assert_eq!(trigger, HintTrigger::StructuralSmell);
        let delivery = hints.escalate(trigger, start).unwrap();
        assert_eq!(delivery.tier, 1);

        // The same smell does not fire twice
        hints.observe_analysis(&analysis, start);
        assert_eq!(hints.pending_trigger(start), None);
    }
}
