//! Error types for the IVAN domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum. [`Error`] carries only what
//! ends a run: tool and grammar failures never leave the loop.

use thiserror::Error;

/// The top-level error type returned by an agent run.
///
/// Only fatal conditions reach this type. Grammar failures are recovered
/// into an apology thought and tool failures into a `ToolResult::error`,
/// so in practice a run fails with a backend error, the cycle bound, a
/// caller deadline or a cancellation.
#[derive(Debug, Error)]
pub enum Error {
    // --- Model backend errors ---
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    // --- Loop termination policy ---
    #[error("Cycle limit exceeded: no terminal answer after {max_cycles} model calls")]
    CycleLimitExceeded { max_cycles: u32 },

    #[error("Deadline exceeded while {stage}")]
    DeadlineExceeded { stage: &'static str },

    #[error("Run cancelled by caller")]
    Cancelled,

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures of the model backend collaborator.
///
/// The loop does not interpret these beyond success/failure; they are
/// surfaced to the caller verbatim.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Backend returned status {status_code}: {message}")]
    BadStatus { status_code: u16, message: String },

    #[error("Backend timed out: {0}")]
    Timeout(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("unknown tool type: {0}")]
    UnknownTool(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_ms}ms")]
    Timeout { tool_name: String, timeout_ms: u64 },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

/// The two failure classes shared by every response grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrammarParseError {
    /// The reply contains no recognisable payload at all
    /// (no braces, no `<response>` span, no `Action:` / `Answer:` block).
    #[error("no {grammar} payload found in model reply")]
    NoDelimiterFound { grammar: &'static str },

    /// A payload was located but is structurally invalid.
    #[error("malformed {grammar} payload: {detail}")]
    MalformedPayload {
        grammar: &'static str,
        detail: String,
    },
}

impl GrammarParseError {
    /// The stable, user-visible apology used as the thought of a failed parse.
    ///
    /// The message depends only on the grammar and the failure class, never
    /// on the offending input, so callers can match on it.
    pub fn apology(&self) -> String {
        const PREFIX: &str = "I apologize, but I couldn't parse the response format correctly.";
        match self {
            GrammarParseError::NoDelimiterFound { grammar } => {
                format!("{PREFIX} No {grammar} block found.")
            }
            GrammarParseError::MalformedPayload { grammar, .. } => {
                format!("{PREFIX} The {grammar} block was malformed.")
            }
        }
    }
}
