//! Execution state for one workflow invocation.
//!
//! An [`ExecutionContext`] is exclusively owned by a single invocation; nested
//! workflow calls construct their own with a copied `context` map, so child
//! writes never propagate outward. The template resolver never sees the live
//! context: resolution sites build a borrowed [`TemplateContext`] snapshot,
//! optionally binding the current stage's [`ResponseContext`].

use std::collections::HashMap;
use std::path::PathBuf;

use indexmap::IndexMap;
use serde_json::Value;

use flowctl_util::Clock;

use crate::resilience::BreakerState;

/// Terminal status of a (nested) workflow invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStatus {
    /// Run completed normally.
    Ok,
    /// Run raised an error that the caller captured.
    Error,
}

impl WorkflowStatus {
    /// Rendering used by `workflow.result.status` tokens.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Ok => "Ok",
            WorkflowStatus::Error => "Error",
        }
    }
}

/// Status and message a nested workflow invocation left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageResultRecord {
    /// Terminal status.
    pub status: WorkflowStatus,
    /// End-stage result message, or the captured error text.
    pub message: Option<String>,
}

/// Response of the most recent endpoint invocation, bound while resolving a
/// stage's outputs, `set`, and `context` templates.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseContext {
    /// HTTP status code (real or mock-synthetic).
    pub status: u16,
    /// Raw response body.
    pub body: String,
    /// Response headers.
    pub headers: IndexMap<String, String>,
    /// Parsed body when it is valid JSON.
    pub json: Option<Value>,
}

/// Mutable state owned by one workflow invocation.
#[derive(Debug)]
pub struct ExecutionContext {
    /// Input values supplied by the caller or a vars file.
    pub inputs: IndexMap<String, String>,
    /// Environment variables (parent-inherited plus own env-file overlay).
    pub env_variables: HashMap<String, String>,
    /// Workflow-scoped variables produced by the init stage and `set` writes.
    pub globals: IndexMap<String, String>,
    /// Shared scratchpad copied into nested invocations.
    pub context: IndexMap<String, String>,
    /// Per-stage endpoint output maps.
    pub endpoint_outputs: IndexMap<String, IndexMap<String, String>>,
    /// Per-stage nested workflow output maps.
    pub workflow_outputs: IndexMap<String, IndexMap<String, String>>,
    /// Per-stage nested workflow results.
    pub workflow_results: IndexMap<String, StageResultRecord>,
    /// Circuit-breaker states keyed by `ref` (or stage name).
    pub breakers: HashMap<String, BreakerState>,
    /// Artifact path once the output writer has run.
    pub output_file_path: Option<PathBuf>,
    /// Nesting depth, for log indentation.
    pub indent: usize,
}

impl ExecutionContext {
    /// Creates a fresh context for one invocation.
    pub fn new(
        inputs: IndexMap<String, String>,
        env_variables: HashMap<String, String>,
        inherited_context: IndexMap<String, String>,
        indent: usize,
    ) -> Self {
        Self {
            inputs,
            env_variables,
            globals: IndexMap::new(),
            context: inherited_context,
            endpoint_outputs: IndexMap::new(),
            workflow_outputs: IndexMap::new(),
            workflow_results: IndexMap::new(),
            breakers: HashMap::new(),
            output_file_path: None,
            indent,
        }
    }

    /// Builds a template snapshot without a bound response.
    pub fn snapshot<'a>(&'a self, clock: &'a dyn Clock) -> TemplateContext<'a> {
        TemplateContext {
            inputs: &self.inputs,
            env_variables: &self.env_variables,
            globals: &self.globals,
            context: &self.context,
            endpoint_outputs: &self.endpoint_outputs,
            workflow_outputs: &self.workflow_outputs,
            workflow_results: &self.workflow_results,
            response: None,
            clock,
        }
    }

    /// Builds a template snapshot with the given response bound.
    pub fn snapshot_with_response<'a>(&'a self, clock: &'a dyn Clock, response: &'a ResponseContext) -> TemplateContext<'a> {
        let mut snapshot = self.snapshot(clock);
        snapshot.response = Some(response);
        snapshot
    }
}

/// Borrowed, immutable view of an [`ExecutionContext`] taken at a template
/// resolution site.
#[derive(Clone, Copy)]
pub struct TemplateContext<'a> {
    pub inputs: &'a IndexMap<String, String>,
    pub env_variables: &'a HashMap<String, String>,
    pub globals: &'a IndexMap<String, String>,
    pub context: &'a IndexMap<String, String>,
    pub endpoint_outputs: &'a IndexMap<String, IndexMap<String, String>>,
    pub workflow_outputs: &'a IndexMap<String, IndexMap<String, String>>,
    pub workflow_results: &'a IndexMap<String, StageResultRecord>,
    pub response: Option<&'a ResponseContext>,
    pub clock: &'a dyn Clock,
}
