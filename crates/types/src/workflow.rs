//! Workflow document schema.
//!
//! A workflow document describes an ordered sequence of stages, each an HTTP
//! endpoint invocation or a nested workflow call. The structs here map the
//! YAML authoring format one-to-one; execution semantics live in the engine
//! crate. Authoring order of maps is preserved with `IndexMap` so outputs,
//! headers, and debug dumps render in the sequence the author wrote them.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub mod validation;

/// Top-level workflow definition as parsed from a workflow document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    /// Document schema/catalog version the workflow targets.
    pub version: String,
    /// Stable identifier embedded in output artifact names.
    pub id: String,
    /// Human-readable workflow name; also keys the end-stage output map.
    pub name: String,
    /// Whether the final output map is persisted as an artifact.
    #[serde(default)]
    pub output: bool,
    /// Declared workflow inputs.
    #[serde(default)]
    pub input: Vec<WorkflowInput>,
    /// External references: environment file, APIs, and nested workflows.
    #[serde(default)]
    pub references: WorkflowReferences,
    /// Optional initialization stage seeding variables and shared context.
    #[serde(default)]
    pub init_stage: Option<InitStage>,
    /// Named retry and circuit-breaker policy pools stages refer to by `ref`.
    #[serde(default)]
    pub resilience: ResiliencePools,
    /// Ordered execution stages.
    #[serde(default)]
    pub stages: Vec<WorkflowStage>,
    /// Optional end stage producing the workflow output map.
    #[serde(default)]
    pub end_stage: Option<EndStage>,
}

impl WorkflowDefinition {
    /// Finds a stage index by name, comparing case-insensitively.
    pub fn stage_index(&self, name: &str) -> Option<usize> {
        self.stages
            .iter()
            .position(|stage| stage.name.eq_ignore_ascii_case(name))
    }
}

/// A single declared workflow input.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowInput {
    /// Input name referenced as `{{input.<name>}}`.
    pub name: String,
    /// Declared primitive type; informational for the engine.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    /// Whether the input must be supplied for a non-mocked run.
    #[serde(default)]
    pub required: bool,
}

/// References a workflow resolves at load time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowReferences {
    /// Optional environment file overlaid onto the inherited variable map.
    #[serde(default)]
    pub environment_file: Option<String>,
    /// APIs endpoint stages may address through `apiRef`.
    #[serde(default)]
    pub apis: Vec<ApiReference>,
    /// Nested workflows addressable through `workflowRef`.
    #[serde(default)]
    pub workflows: Vec<WorkflowReference>,
}

impl WorkflowReferences {
    /// Resolves an `apiRef` to its catalog definition name, case-insensitively.
    pub fn api_definition_name(&self, api_ref: &str) -> Option<&str> {
        self.apis
            .iter()
            .find(|api| api.name.eq_ignore_ascii_case(api_ref))
            .map(|api| api.definition.as_str())
    }

    /// Resolves a `workflowRef` to its document path, case-insensitively.
    pub fn workflow_path(&self, workflow_ref: &str) -> Option<&str> {
        self.workflows
            .iter()
            .find(|workflow| workflow.name.eq_ignore_ascii_case(workflow_ref))
            .map(|workflow| workflow.path.as_str())
    }
}

/// Binds a local API alias to a catalog definition name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiReference {
    /// Alias used by stages (`apiRef`).
    pub name: String,
    /// Definition name inside the selected catalog version.
    pub definition: String,
}

/// Binds a local workflow alias to a document path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkflowReference {
    /// Alias used by stages (`workflowRef`).
    pub name: String,
    /// Path to the nested workflow document, relative to the containing one.
    pub path: String,
}

/// Initialization stage: dynamic variables plus shared context seeding.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InitStage {
    /// Context entries applied when the key is not already present.
    #[serde(default)]
    pub context: IndexMap<String, String>,
    /// Workflow-scoped variables produced by the dynamic value generators.
    #[serde(default)]
    pub variables: Vec<VariableSpec>,
}

/// Supported dynamic value generator kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum VariableKind {
    /// Literal value, template-resolved before storing.
    #[default]
    Fixed,
    /// Uniform integer in `[min, max]`, optionally zero-padded.
    Number,
    /// Random alphanumeric text of the requested length.
    Text,
    /// Random UUID (v4).
    Guid,
    /// Monotonic, lexicographically sortable identifier.
    Ulid,
    /// Uniform timestamp between two bounds.
    #[serde(rename = "datetime")]
    DateTime,
    /// Uniform calendar date between two bounds.
    Date,
    /// Uniform time of day between two bounds.
    Time,
    /// Arithmetic sequence `start + (index - 1) * step`.
    Sequence,
}

/// One dynamic variable declaration inside the init stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VariableSpec {
    /// Variable name, later referenced as `{{global.<name>}}`.
    pub name: String,
    /// Generator selector.
    #[serde(default, rename = "type")]
    pub kind: VariableKind,
    /// Literal value for `fixed`; may contain template tokens.
    #[serde(default)]
    pub value: Option<String>,
    /// Lower bound for `number`.
    #[serde(default)]
    pub min: Option<i64>,
    /// Upper bound for `number`.
    #[serde(default)]
    pub max: Option<i64>,
    /// Zero-pad width for `number` and `sequence`.
    #[serde(default)]
    pub pad: Option<usize>,
    /// Length for `text`.
    #[serde(default)]
    pub length: Option<usize>,
    /// Lower bound for `datetime` / `date` / `time`; may contain templates.
    #[serde(default)]
    pub from: Option<String>,
    /// Upper bound for `datetime` / `date` / `time`; may contain templates.
    #[serde(default)]
    pub to: Option<String>,
    /// First value of a `sequence`.
    #[serde(default)]
    pub start: Option<i64>,
    /// Increment of a `sequence`.
    #[serde(default)]
    pub step: Option<i64>,
}

/// Named retry and circuit-breaker pools shared by stages via `ref`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResiliencePools {
    /// Retry policies keyed by pool name.
    #[serde(default)]
    pub retries: IndexMap<String, RetryPolicy>,
    /// Circuit-breaker policies keyed by pool name.
    #[serde(default)]
    pub circuit_breakers: IndexMap<String, CircuitBreakerPolicy>,
}

/// Retry policy; active only when `maxRetries`, `delayMs`, and a non-empty
/// `httpStatus` set are all present after merging with the shared pool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Shared pool entry this policy merges with; stage fields win.
    #[serde(default, rename = "ref")]
    pub pool_ref: Option<String>,
    /// Maximum retry count on top of the initial attempt.
    #[serde(default)]
    pub max_retries: Option<u32>,
    /// Fixed delay between attempts, in milliseconds.
    #[serde(default)]
    pub delay_ms: Option<u64>,
    /// HTTP statuses that trigger a retry.
    #[serde(default)]
    pub http_status: Vec<u16>,
    /// Optional user-facing messages.
    #[serde(default)]
    pub messages: Option<RetryMessages>,
}

/// Messages attached to a retry policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RetryMessages {
    /// Logged at error level when every attempt raised an exception.
    #[serde(default)]
    pub on_exception: Option<String>,
}

/// Circuit-breaker policy; the failure-status set is inherited from the
/// stage's retry policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerPolicy {
    /// Shared pool entry this policy merges with; stage fields win.
    #[serde(default, rename = "ref")]
    pub pool_ref: Option<String>,
    /// Consecutive failures required to open the breaker.
    #[serde(default)]
    pub failure_threshold: Option<u32>,
    /// How long the breaker stays open, in milliseconds.
    #[serde(default)]
    pub break_ms: Option<i64>,
    /// Half-open successes required to fully close again.
    #[serde(default)]
    pub close_on_success_attempts: Option<u32>,
    /// Optional user-facing messages.
    #[serde(default)]
    pub messages: Option<BreakerMessages>,
}

/// Messages attached to a circuit-breaker policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BreakerMessages {
    /// Emitted when the breaker opens.
    #[serde(default)]
    pub on_open: Option<String>,
    /// Emitted when a request is blocked by an open breaker.
    #[serde(default)]
    pub on_blocked: Option<String>,
}

/// One execution stage. Shared fields live here; kind-specific fields are
/// carried by the flattened [`StageKind`] variant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStage {
    /// Stage name, unique within the workflow.
    pub name: String,
    /// Optional gating predicate; a false result skips the stage.
    #[serde(default)]
    pub run_if: Option<String>,
    /// Optional pre-execution delay in seconds (0..=60).
    #[serde(default)]
    pub delay_seconds: Option<u64>,
    /// Optional message template emitted after the stage completes.
    #[serde(default)]
    pub message: Option<String>,
    /// Key/template pairs printed when the debug flag is on.
    #[serde(default)]
    pub debug: Option<IndexMap<String, String>>,
    /// Kind-specific payload.
    #[serde(flatten)]
    pub kind: StageKind,
}

impl WorkflowStage {
    /// Returns the endpoint payload when this is an endpoint stage.
    pub fn endpoint(&self) -> Option<&EndpointStage> {
        match &self.kind {
            StageKind::Endpoint(endpoint) => Some(endpoint),
            StageKind::Workflow(_) => None,
        }
    }

    /// Returns the nested-workflow payload when this is a workflow stage.
    pub fn workflow_call(&self) -> Option<&WorkflowCallStage> {
        match &self.kind {
            StageKind::Workflow(call) => Some(call),
            StageKind::Endpoint(_) => None,
        }
    }
}

/// Tagged stage variant; the engine dispatches on this.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind")]
pub enum StageKind {
    /// HTTP endpoint invocation.
    Endpoint(EndpointStage),
    /// Recursive workflow call.
    Workflow(WorkflowCallStage),
}

/// Endpoint-kind stage fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EndpointStage {
    /// API alias declared in `references.apis`.
    pub api_ref: String,
    /// Endpoint path; may contain `{placeholder}` and `{{template}}` tokens.
    pub endpoint: String,
    /// HTTP method.
    pub http_verb: String,
    /// Expected response status; a mismatch fails the stage.
    #[serde(default)]
    pub expected_status: Option<u16>,
    /// Header templates.
    #[serde(default)]
    pub headers: Option<IndexMap<String, String>>,
    /// Query parameter templates.
    #[serde(default)]
    pub query: Option<IndexMap<String, String>>,
    /// Request body template.
    #[serde(default)]
    pub body: Option<String>,
    /// Mock definition consulted on mocked runs.
    #[serde(default)]
    pub mock: Option<MockSpec>,
    /// Retry policy, merged with the shared pool entry it references.
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
    /// Circuit-breaker policy, merged with the shared pool entry it references.
    #[serde(default)]
    pub circuit_breaker: Option<CircuitBreakerPolicy>,
    /// Status → stage-name branch table; `endStage` terminates the loop.
    #[serde(default)]
    pub jump_on_status: Option<IndexMap<u16, String>>,
    /// Output-key → template bindings resolved against the response.
    #[serde(default)]
    pub output: Option<IndexMap<String, String>>,
    /// Global-variable writes applied after the stage completes.
    #[serde(default)]
    pub set: Option<IndexMap<String, String>>,
    /// Shared-context writes applied after the stage completes.
    #[serde(default)]
    pub context: Option<IndexMap<String, String>>,
}

/// Workflow-kind stage fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowCallStage {
    /// Workflow alias declared in `references.workflows`.
    pub workflow_ref: String,
    /// Explicit input templates; absent means sibling vars-file seeding.
    #[serde(default)]
    pub inputs: Option<IndexMap<String, String>>,
    /// Mock definition; its `output` map substitutes the nested run.
    #[serde(default)]
    pub mock: Option<MockSpec>,
}

/// Mock definition for a stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MockSpec {
    /// Inline JSON payload template. Mutually exclusive with `payloadFile`.
    #[serde(default)]
    pub payload: Option<String>,
    /// Path to a JSON payload file, relative to the workflow document.
    #[serde(default)]
    pub payload_file: Option<String>,
    /// Synthetic response status; falls back to `expectedStatus`, then 200.
    #[serde(default)]
    pub status: Option<u16>,
    /// For workflow stages: template map published as the nested output.
    #[serde(default)]
    pub output: Option<IndexMap<String, String>>,
}

/// End stage producing the workflow output map.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EndStage {
    /// Output-key → template map resolved after the last stage.
    #[serde(default)]
    pub output: IndexMap<String, String>,
    /// Whether JSON-looking output values are embedded as parsed JSON.
    #[serde(default)]
    pub output_json: Option<bool>,
    /// Shared-context writes applied after output resolution.
    #[serde(default)]
    pub context: Option<IndexMap<String, String>>,
    /// Result metadata surfaced to a calling workflow.
    #[serde(default)]
    pub result: Option<EndStageResult>,
}

/// Result metadata of a completed workflow.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EndStageResult {
    /// Message template visible to the caller as `workflow.result.message`.
    #[serde(default)]
    pub message: Option<String>,
}
