//! Structural validation for workflow definitions.
//!
//! These checks run before execution so authoring mistakes surface as a
//! single readable report instead of mid-run failures. The engine assumes a
//! validated document: unique stage names, known references, bounded delays.

use std::collections::HashSet;
use std::fmt;

use super::{StageKind, WorkflowDefinition};

/// Maximum accepted `delaySeconds` value.
const MAX_DELAY_SECONDS: u64 = 60;

/// One structural problem found in a workflow definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Stage the issue belongs to, when stage-scoped.
    pub stage: Option<String>,
    /// Human-readable description.
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.stage {
            Some(stage) => write!(formatter, "stage '{}': {}", stage, self.message),
            None => formatter.write_str(&self.message),
        }
    }
}

/// Validates a parsed workflow definition, returning every issue found.
///
/// An empty result means the document is structurally sound; execution-time
/// concerns (catalog environments, template resolution) are checked later.
pub fn validate_definition(definition: &WorkflowDefinition) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    let mut seen_names: HashSet<String> = HashSet::new();
    for stage in &definition.stages {
        if !seen_names.insert(stage.name.to_ascii_lowercase()) {
            issues.push(ValidationIssue {
                stage: Some(stage.name.clone()),
                message: "duplicate stage name".into(),
            });
        }
    }

    for stage in &definition.stages {
        if let Some(delay) = stage.delay_seconds
            && delay > MAX_DELAY_SECONDS
        {
            issues.push(ValidationIssue {
                stage: Some(stage.name.clone()),
                message: format!("delaySeconds {} exceeds the allowed maximum of {}", delay, MAX_DELAY_SECONDS),
            });
        }

        match &stage.kind {
            StageKind::Endpoint(endpoint) => {
                if definition.references.api_definition_name(&endpoint.api_ref).is_none() {
                    issues.push(ValidationIssue {
                        stage: Some(stage.name.clone()),
                        message: format!("apiRef '{}' is not declared in references.apis", endpoint.api_ref),
                    });
                }
                if endpoint.http_verb.trim().is_empty() {
                    issues.push(ValidationIssue {
                        stage: Some(stage.name.clone()),
                        message: "httpVerb must not be empty".into(),
                    });
                }
                if let Some(mock) = &endpoint.mock
                    && mock.payload.is_some()
                    && mock.payload_file.is_some()
                {
                    issues.push(ValidationIssue {
                        stage: Some(stage.name.clone()),
                        message: "mock declares both payload and payloadFile".into(),
                    });
                }
                if let Some(jump_table) = &endpoint.jump_on_status {
                    for target in jump_table.values() {
                        if target.eq_ignore_ascii_case("endStage") {
                            continue;
                        }
                        if definition.stage_index(target).is_none() {
                            issues.push(ValidationIssue {
                                stage: Some(stage.name.clone()),
                                message: format!("jumpOnStatus target '{}' is not a known stage", target),
                            });
                        }
                    }
                }
            }
            StageKind::Workflow(call) => {
                if definition.references.workflow_path(&call.workflow_ref).is_none() {
                    issues.push(ValidationIssue {
                        stage: Some(stage.name.clone()),
                        message: format!("workflowRef '{}' is not declared in references.workflows", call.workflow_ref),
                    });
                }
            }
        }
    }

    issues
}
