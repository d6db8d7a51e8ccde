//! Error taxonomy for the engine
//!
//! Candidate faults (compile errors, timeouts, garbled output) are reported as
//! data in results wherever possible. Only infrastructure failures travel as
//! `Err` values out of the executor.

use thiserror::Error;

/// Errors produced while executing a batch of test cases
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Candidate code failed to build. Reported once per batch.
    #[error("Compilation failed: {message}")]
    Compile { message: String },

    /// Compiler or interpreter could not be started
    #[error("Failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Temporary workspace or pipe I/O failed
    #[error("Workspace I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),
}

impl ExecutionError {
    /// Infrastructure errors are fatal to the current run but never the session
    pub fn is_infrastructure(&self) -> bool {
        !matches!(self, ExecutionError::Compile { .. })
    }
}

/// Internal analyzer failures. Never surfaced to candidates.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Source too large to analyze ({0} bytes)")]
    InputTooLarge(usize),

    #[error("Invalid heuristic pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Heuristic panicked: {0}")]
    Panicked(String),
}

/// Per-event protocol errors returned to the client as `error` events
#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    #[error("No active session. Join a session first")]
    NotJoined,

    #[error("Session {0} is already joined on this connection")]
    AlreadyJoined(String),

    #[error("Session {0} is already active on another connection")]
    ActiveElsewhere(String),

    #[error("Event targets session {got} but this connection is bound to {expected}")]
    WrongSession { expected: String, got: String },

    #[error("Session {0} is no longer active")]
    NotActive(String),

    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Language {language} is not allowed for problem {problem}")]
    LanguageNotAllowed { language: String, problem: String },

    #[error("No test cases to run")]
    NoTestCases,

    #[error("Hint rating must be between 1 and 5, got {0}")]
    InvalidRating(u8),

    #[error("No tier {0} hint has been given for the current problem")]
    HintNotFound(u8),

    /// Infrastructure failure; the message is safe to show to the candidate
    #[error("{0}")]
    Unavailable(String),
}
