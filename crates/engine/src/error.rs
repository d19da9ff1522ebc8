//! Typed engine errors.
//!
//! Libraries above this crate match on these variants, so each failure class
//! the engine can raise gets its own entry. Nested workflow invocations catch
//! all of them except [`EngineError::Cancelled`], which always unwinds to the
//! top level.

use thiserror::Error;

/// Result alias used throughout the engine.
pub type EngineResult<T> = Result<T, EngineError>;

/// Every failure class the engine raises.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Document missing, unreadable, empty, or not valid YAML.
    #[error("failed to load workflow document {path}: {reason}")]
    WorkflowLoadFailed { path: String, reason: String },

    /// A required input was absent in a non-mocked run.
    #[error("required input '{0}' was not provided")]
    MissingRequiredInput(String),

    /// A `{{ … }}` token referenced data that does not exist.
    #[error("template resolution failed: {0}")]
    TemplateResolutionFailed(String),

    /// A `runIf` expression does not match the supported grammar.
    #[error("invalid runIf expression: {0}")]
    InvalidRunIf(String),

    /// Mock payload missing, ambiguous, or not valid JSON.
    #[error("invalid mock payload for stage '{stage}': {reason}")]
    InvalidMockPayload { stage: String, reason: String },

    /// Actual response status differed from `expectedStatus`.
    #[error("stage '{stage}' returned status {actual}, expected {expected}")]
    StageStatusMismatch { stage: String, expected: u16, actual: u16 },

    /// The stage was blocked by an open circuit breaker.
    #[error("stage '{stage}' blocked by open circuit breaker '{breaker}'")]
    CircuitOpen { stage: String, breaker: String },

    /// A jump-on-status self-loop was requested under a mocked run.
    #[error("stage '{0}' jumps to itself; self-jumps are not allowed in mocked runs")]
    MockedSelfJump(String),

    /// An API reference did not resolve to a catalog definition.
    #[error("API reference '{0}' does not resolve to a definition in the selected catalog version")]
    ApiReferenceUnknown(String),

    /// The selected environment has no base URL for a referenced API.
    #[error("environment '{environment}' has no base URL for API '{api}'")]
    EnvironmentUnknown { api: String, environment: String },

    /// The workflow document's version is absent from the catalog.
    #[error("catalog does not contain version '{0}'")]
    CatalogVersionUnknown(String),

    /// A `workflowRef` is not declared in `references.workflows`.
    #[error("workflow reference '{0}' is not declared in references.workflows")]
    UnknownWorkflowRef(String),

    /// Every invocation attempt of an endpoint stage raised an exception.
    #[error("stage '{stage}' failed with exception: {reason}")]
    EndpointFailed { stage: String, reason: String },

    /// An init-stage variable declaration cannot be honored.
    #[error("variable '{name}' cannot be generated: {reason}")]
    InvalidVariableSpec { name: String, reason: String },

    /// The external cancellation signal fired.
    #[error("workflow run cancelled")]
    Cancelled,

    /// Vars-file loading or resolution failed.
    #[error(transparent)]
    Vars(#[from] flowctl_util::VarsFileError),

    /// Untyped failure from a collaborator (filesystem, HTTP client setup).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
