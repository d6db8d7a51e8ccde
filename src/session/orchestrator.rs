//! Session orchestrator
//!
//! One orchestrator per connection, driven sequentially by the connection
//! task. It binds the connection to at most one session and routes each
//! event through the analyzer, the executor and the hint controller.
//!
//! Per-event failures become `error` events. Nothing here tears down the
//! connection.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::events::{ClientEvent, ProblemView, ServerEvent};
use super::model::{HintEvent, Session, SessionStatus, Submission};
use super::registry::{ActiveSession, ConnectionId, SessionRegistry};
use super::summary::summarize;
use crate::analyzer::{AnalysisResult, Analyzer, ProblemContext};
use crate::catalog::{Problem, ProblemCatalog, TestCase};
use crate::config::HintConfig;
use crate::cooldown::{Cooldown, CooldownCheck};
use crate::error::{ExecutionError, SessionError};
use crate::executor::{ExecutionResult, Executor};
use crate::feedback::{FeedbackContext, FeedbackProvider};
use crate::hints::{HintController, HintDelivery};
use crate::languages::Language;
use crate::store::SessionStore;

/// Shown instead of infrastructure details
pub const UNAVAILABLE_MESSAGE: &str = "Code execution is temporarily unavailable. Please try again.";

/// Highest hint rating accepted
const MAX_HINT_RATING: u8 = 5;

/// Collaborators shared by every connection
pub struct SessionServices {
    pub catalog: Arc<dyn ProblemCatalog>,
    pub executor: Arc<Executor>,
    pub analyzer: Analyzer,
    pub feedback: Arc<dyn FeedbackProvider>,
    pub store: Arc<dyn SessionStore>,
    pub registry: Arc<SessionRegistry>,
    pub hints: HintConfig,
    pub feedback_timeout: Duration,
}

struct BoundSession {
    session: Session,
    hints: HintController,
}

pub struct SessionOrchestrator {
    connection_id: ConnectionId,
    services: Arc<SessionServices>,
    bound: Option<BoundSession>,
    cooldown: Cooldown,
}

impl SessionOrchestrator {
    pub fn new(services: Arc<SessionServices>) -> Self {
        let cooldown = Cooldown::new(services.hints.cooldown);
        Self {
            connection_id: Uuid::new_v4(),
            services,
            bound: None,
            cooldown,
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn session_id(&self) -> Option<&str> {
        self.bound.as_ref().map(|b| b.session.session_id.as_str())
    }

    /// Handle one client event; failures come back as an `error` event
    pub async fn handle(&mut self, event: ClientEvent) -> Vec<ServerEvent> {
        let name = event.name();
        debug!("[{}] Handling {}", self.connection_id, name);

        match self.dispatch(event).await {
            Ok(events) => events,
            Err(e) => {
                debug!("[{}] {} rejected: {}", self.connection_id, name, e);
                vec![ServerEvent::error(e.to_string())]
            }
        }
    }

    async fn dispatch(&mut self, event: ClientEvent) -> Result<Vec<ServerEvent>, SessionError> {
        match event {
            ClientEvent::JoinSession {
                session_id,
                candidate_email,
            } => self.join(session_id, candidate_email).await,
            ClientEvent::CodeChanged {
                session_id,
                code,
                language,
                ..
            } => self.code_changed(&session_id, code, &language).await,
            ClientEvent::RunTests {
                session_id,
                code,
                language,
                test_cases,
            } => self.run_tests(&session_id, code, &language, test_cases).await,
            ClientEvent::RequestHint {
                session_id,
                language,
                ..
            } => self.request_hint(&session_id, language.as_deref()),
            ClientEvent::CompleteSession { session_id } => self.complete(&session_id).await,
            ClientEvent::NextProblem { session_id } => self.next_problem(&session_id),
            ClientEvent::RateHint {
                session_id,
                tier,
                rating,
            } => self.rate_hint(&session_id, tier, rating),
        }
    }

    async fn join(
        &mut self,
        session_id: String,
        candidate_email: Option<String>,
    ) -> Result<Vec<ServerEvent>, SessionError> {
        if let Some(bound) = &self.bound {
            return Err(SessionError::AlreadyJoined(bound.session.session_id.clone()));
        }
        if self.services.registry.is_session_active(&session_id) {
            return Err(SessionError::ActiveElsewhere(session_id));
        }

        let plan = match self.services.catalog.session_plan(&session_id).await {
            Ok(Some(plan)) => plan,
            Ok(None) => return Err(SessionError::NotFound(session_id)),
            Err(e) => {
                error!("Problem catalog unavailable for {}: {:#}", session_id, e);
                return Err(SessionError::Unavailable(
                    "The problem catalog is temporarily unavailable. Please try again.".into(),
                ));
            }
        };
        let Some(mut session) = Session::start(plan, candidate_email) else {
            warn!("Session {} has no problems", session_id);
            return Err(SessionError::NotFound(session_id));
        };

        self.services.registry.insert(
            self.connection_id,
            ActiveSession {
                session_id: session.session_id.clone(),
                candidate_email: session.candidate_email.clone(),
                joined_at: Utc::now(),
            },
        )?;

        session.interactions += 1;
        let hints = HintController::new(session.problem(), self.services.hints.clone(), Instant::now());
        let joined = ServerEvent::Joined {
            session_id: session.session_id.clone(),
            problem: ProblemView::from(session.problem()),
            problem_index: 0,
            problem_count: session.problems.len(),
            status: session.status,
        };

        info!(
            "[{}] Joined session {} ({} problems)",
            self.connection_id,
            session.session_id,
            session.problems.len()
        );
        self.bound = Some(BoundSession { session, hints });
        Ok(vec![joined])
    }

    async fn code_changed(
        &mut self,
        session_id: &str,
        code: String,
        language: &str,
    ) -> Result<Vec<ServerEvent>, SessionError> {
        let services = Arc::clone(&self.services);
        let bound = bound_session(&mut self.bound, session_id)?;
        bound.session.interactions += 1;

        let problem = bound.session.problem().clone();
        let language = resolve_language(&services, &problem, language)?;

        let context = ProblemContext {
            expected_complexity: problem.expected_complexity.clone(),
        };
        let mut analysis = analyze_off_thread(services.analyzer, code.clone(), language, context).await;
        review(&services, &code, language, &problem, &mut analysis).await;

        let now = Instant::now();
        bound.session.record_analysis(language, &analysis);
        bound.hints.observe_analysis(&analysis, now);

        let mut events = vec![ServerEvent::AnalysisResult {
            session_id: session_id.to_string(),
            analysis,
            timestamp: Utc::now(),
        }];
        events.extend(auto_hint(bound, &mut self.cooldown, now));
        Ok(events)
    }

    async fn run_tests(
        &mut self,
        session_id: &str,
        code: String,
        language: &str,
        test_cases: Option<Vec<TestCase>>,
    ) -> Result<Vec<ServerEvent>, SessionError> {
        let services = Arc::clone(&self.services);
        let bound = bound_session(&mut self.bound, session_id)?;
        bound.session.interactions += 1;

        let problem = bound.session.problem().clone();
        let language = resolve_language(&services, &problem, language)?;
        let (cases, custom_cases) = match test_cases {
            Some(cases) if !cases.is_empty() => (cases, true),
            _ => (problem.test_cases.clone(), false),
        };
        if cases.is_empty() {
            return Err(SessionError::NoTestCases);
        }

        let run_timeout = services.executor.run_timeout(language, problem.time_limit_ms);
        let outcome = services
            .executor
            .execute_all_with_timeout(&code, language, &cases, run_timeout)
            .await;
        let (results, compile_error) = match outcome {
            Ok(results) => (results, None),
            Err(ExecutionError::Compile { message }) => (
                ExecutionResult::compile_failed_batch(&cases, &message),
                Some(message),
            ),
            Err(e) => {
                error!(
                    "[{}] Execution infrastructure failed for {}: {}",
                    session_id, language, e
                );
                return Err(SessionError::Unavailable(UNAVAILABLE_MESSAGE.to_string()));
            }
        };

        let submission = Submission::new(code, language, problem.id.clone(), results, compile_error)
            .with_custom_cases(custom_cases);
        let passed_count = submission.passed_count;
        let total_count = submission.total_count;
        let event = ServerEvent::TestResults {
            session_id: session_id.to_string(),
            results: submission.results.clone(),
            score: pass_percentage(passed_count, total_count),
            passed_count,
            total_count,
            compile_error: submission.compile_error.clone(),
            timestamp: submission.timestamp,
        };
        info!(
            "[{}] {} run on {}: {}/{} passed",
            session_id, language, problem.id, passed_count, total_count
        );
        bound.session.record_submission(submission);
        Ok(vec![event])
    }

    fn request_hint(
        &mut self,
        session_id: &str,
        language: Option<&str>,
    ) -> Result<Vec<ServerEvent>, SessionError> {
        let services = Arc::clone(&self.services);
        let bound = bound_session(&mut self.bound, session_id)?;
        bound.session.interactions += 1;

        if let Some(language) = language {
            let problem = bound.session.problem();
            let language = resolve_language(&services, problem, language)?;
            bound.session.languages_used.insert(language);
        }

        let now = Instant::now();
        if let CooldownCheck::Suppressed { remaining } = self.cooldown.check(now) {
            let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
            return Ok(vec![ServerEvent::Status {
                message: format!("Next hint available in {} seconds", secs),
                retry_after_secs: Some(secs),
            }]);
        }

        let delivery = bound.hints.request(now);
        self.cooldown.mark_dispatched(now);
        Ok(vec![deliver(bound, delivery, true)])
    }

    async fn complete(&mut self, session_id: &str) -> Result<Vec<ServerEvent>, SessionError> {
        let services = Arc::clone(&self.services);
        let bound = bound_session(&mut self.bound, session_id)?;
        bound.session.interactions += 1;
        bound.session.status = SessionStatus::Completed;
        self.cooldown.cancel();

        let summary = summarize(&bound.session, Utc::now());
        if let Err(e) = services.store.persist(&summary.record).await {
            error!("Failed to persist completion record for {}: {:#}", session_id, e);
        }
        services.registry.remove(self.connection_id);

        info!(
            "[{}] Session {} completed: {:.1} ({})",
            self.connection_id, session_id, summary.record.overall_score, summary.record.rating
        );
        Ok(vec![ServerEvent::SessionCompleted {
            overall_score: summary.record.overall_score,
            rating: summary.record.rating,
            final_assessment: summary.record.final_assessment,
            performance_summary: summary.performance,
        }])
    }

    fn next_problem(&mut self, session_id: &str) -> Result<Vec<ServerEvent>, SessionError> {
        let bound = bound_session(&mut self.bound, session_id)?;
        bound.session.interactions += 1;

        if !bound.session.advance() {
            return Ok(vec![ServerEvent::status(
                "This is the last problem in the session",
            )]);
        }
        let problem = bound.session.problem();
        bound.hints.reset(problem, Instant::now());

        debug!("[{}] Moved to problem {}", session_id, problem.id);
        Ok(vec![ServerEvent::ProblemChanged {
            problem: ProblemView::from(problem),
            index: bound.session.current_problem,
        }])
    }

    fn rate_hint(
        &mut self,
        session_id: &str,
        tier: u8,
        rating: u8,
    ) -> Result<Vec<ServerEvent>, SessionError> {
        let bound = bound_session(&mut self.bound, session_id)?;
        bound.session.interactions += 1;

        if !(1..=MAX_HINT_RATING).contains(&rating) {
            return Err(SessionError::InvalidRating(rating));
        }
        let hint = bound
            .session
            .hint_mut(tier)
            .ok_or(SessionError::HintNotFound(tier))?;
        hint.rating = Some(rating);
        hint.used = true;
        Ok(Vec::new())
    }

    /// Periodic check for idle-triggered hints
    pub fn on_idle_tick(&mut self) -> Vec<ServerEvent> {
        let Some(bound) = self.bound.as_mut().filter(|b| b.session.is_active()) else {
            return Vec::new();
        };
        auto_hint(bound, &mut self.cooldown, Instant::now())
            .into_iter()
            .collect()
    }

    /// Transport is gone. An unfinished session is abandoned without a summary.
    pub fn disconnect(&mut self) {
        self.cooldown.cancel();
        let Some(mut bound) = self.bound.take() else {
            return;
        };
        if bound.session.is_active() {
            bound.session.status = SessionStatus::Abandoned;
            info!(
                "[{}] Session {} abandoned after {} interactions",
                self.connection_id, bound.session.session_id, bound.session.interactions
            );
        }
        self.services.registry.remove(self.connection_id);
    }
}

impl Drop for SessionOrchestrator {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn bound_session<'a>(
    bound: &'a mut Option<BoundSession>,
    session_id: &str,
) -> Result<&'a mut BoundSession, SessionError> {
    let bound = bound.as_mut().ok_or(SessionError::NotJoined)?;
    if bound.session.session_id != session_id {
        return Err(SessionError::WrongSession {
            expected: bound.session.session_id.clone(),
            got: session_id.to_string(),
        });
    }
    if !bound.session.is_active() {
        return Err(SessionError::NotActive(session_id.to_string()));
    }
    Ok(bound)
}

fn resolve_language(
    services: &SessionServices,
    problem: &Problem,
    name: &str,
) -> Result<Language, SessionError> {
    let language = services
        .executor
        .languages()
        .resolve(name)
        .ok_or_else(|| SessionError::UnsupportedLanguage(name.to_string()))?;
    if !problem.allows(language) {
        return Err(SessionError::LanguageNotAllowed {
            language: language.to_string(),
            problem: problem.id.clone(),
        });
    }
    Ok(language)
}

async fn analyze_off_thread(
    analyzer: Analyzer,
    code: String,
    language: Language,
    context: ProblemContext,
) -> AnalysisResult {
    match tokio::task::spawn_blocking(move || analyzer.analyze(&code, language, &context)).await {
        Ok(analysis) => analysis,
        Err(e) => {
            warn!("Analysis task failed: {}", e);
            AnalysisResult::neutral()
        }
    }
}

/// Merge external findings when the reviewer answers in time
async fn review(
    services: &SessionServices,
    code: &str,
    language: Language,
    problem: &Problem,
    analysis: &mut AnalysisResult,
) {
    let context = FeedbackContext {
        language,
        problem_title: &problem.title,
        problem_description: &problem.description,
        analysis,
    };
    let reviewed = tokio::time::timeout(
        services.feedback_timeout,
        services.feedback.review(code, &context),
    )
    .await;

    match reviewed {
        Ok(Ok(findings)) => findings.merge_into(analysis),
        Ok(Err(e)) => warn!("Feedback provider failed: {:#}", e),
        Err(_) => warn!(
            "Feedback provider timed out after {} ms",
            services.feedback_timeout.as_millis()
        ),
    }
}

/// Fire a pending automatic hint if the cooldown allows it. A deferred hint
/// keeps its counters and fires on a later cycle.
fn auto_hint(bound: &mut BoundSession, cooldown: &mut Cooldown, now: Instant) -> Option<ServerEvent> {
    let trigger = bound.hints.pending_trigger(now)?;
    if !cooldown.check(now).is_permitted() {
        debug!("Hint ({:?}) deferred by cooldown", trigger);
        return None;
    }
    let delivery = bound.hints.escalate(trigger, now)?;
    cooldown.mark_dispatched(now);
    Some(deliver(bound, delivery, false))
}

fn deliver(bound: &mut BoundSession, delivery: HintDelivery, requested: bool) -> ServerEvent {
    let timestamp = Utc::now();
    bound.session.record_hint(HintEvent {
        tier: delivery.tier,
        content: delivery.content.clone(),
        timestamp,
        used: requested,
        rating: None,
        problem_id: bound.hints.problem_id().to_string(),
        trigger: delivery.trigger,
    });
    ServerEvent::Hint {
        tier: delivery.tier,
        content: delivery.content,
        trigger: delivery.trigger,
        timestamp,
    }
}

fn pass_percentage(passed: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((passed as f64 / total as f64) * 100.0).round() as u32
}
