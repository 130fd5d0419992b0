//! Error types for the orchestration runtime
//!
//! Each subsystem has its own error enum; `RuntimeError` is the umbrella
//! the tool surface catches at the boundary. Verification failure is not
//! an error; it drives the rollback edges of the phase engine.

use thiserror::Error;

/// Main runtime error type
#[derive(Error, Debug, Clone)]
pub enum RuntimeError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("knowledge error: {0}")]
    Knowledge(#[from] KnowledgeError),

    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Configuration errors
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("missing required configuration: {key}")]
    MissingRequired { key: String },
}

/// Phase engine errors. Malformed requests never destroy session state;
/// they surface as `Validation` and the session stays where it was.
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("session not found: {0}")]
    StateNotFound(String),
}

/// Knowledge pipeline errors
#[derive(Error, Debug, Clone)]
pub enum KnowledgeError {
    #[error("no sources survived filtering, synthesis is empty")]
    SynthesisEmpty,

    #[error("http client construction failed: {0}")]
    ClientBuild(String),
}

/// Per-source failure reasons inside the fetch fan-out. These never
/// abort the pipeline; each becomes a failed `ApiFetchResult`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    #[error("url rejected by ssrf guard")]
    SsrfBlocked,

    #[error("per-host rate limit exceeded")]
    RateLimited,

    #[error("http status {status}")]
    Http { status: u16 },

    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),
}

/// Knowledge graph store errors
#[derive(Error, Debug, Clone)]
pub enum GraphError {
    #[error("entity not found: {0}")]
    EntityNotFound(String),

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("persistence failed: {0}")]
    Persistence(String),
}

/// Result alias used across the runtime
pub type RuntimeResult<T> = Result<T, RuntimeError>;
