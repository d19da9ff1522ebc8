//! Strongly typed schema definitions shared across the catalog loader, engine,
//! and CLI.
//!
//! The models defined here mirror the authoring format of workflow documents
//! and the API catalog. They intentionally preserve authoring order (via
//! `IndexMap`) so output maps, headers, and resilience pools are processed in
//! the sequence the author wrote them.

pub mod catalog;
pub mod lookup;
pub mod workflow;

pub use catalog::{ApiCatalog, ApiCatalogVersion, ApiDefinition};
pub use lookup::{get_ignore_case, get_str_ignore_case};
pub use workflow::{
    ApiReference, CircuitBreakerPolicy, EndStage, EndStageResult, EndpointStage, InitStage, MockSpec, ResiliencePools,
    RetryPolicy, StageKind, VariableKind, VariableSpec, WorkflowCallStage, WorkflowDefinition, WorkflowInput,
    WorkflowReference, WorkflowReferences, WorkflowStage,
};
pub use workflow::validation::{ValidationIssue, validate_definition};
