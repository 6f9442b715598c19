//! Error taxonomy for the interview runtime
//!
//! Each subsystem gets a small error enum; `RuntimeError` rolls them up via
//! `#[from]` so call sites that cross subsystem boundaries can use `?`
//! without manual mapping.

use thiserror::Error;

/// Errors raised by `InterviewState`.
#[derive(Error, Debug, Clone)]
pub enum StateError {
    #[error("interview is not in progress")]
    NotInProgress,

    #[error("state actor is no longer running")]
    ActorGone,
}

/// Errors raised when talking to an LLM provider.
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider returned an error: {0}")]
    Provider(String),

    #[error("could not parse model output: {0}")]
    Parse(String),
}

/// Top-level error type for the runtime.
#[derive(Error, Debug, Clone)]
pub enum RuntimeError {
    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T, E = RuntimeError> = std::result::Result<T, E>;
