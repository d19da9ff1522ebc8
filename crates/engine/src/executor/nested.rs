//! Nested workflow stage execution.
//!
//! A workflow-kind stage resolves its `workflowRef` against the containing
//! document, loads the referenced document with the parent's environment map
//! inherited, seeds inputs (explicit templates, or a sibling `.wfvars` file
//! when no top-level vars override is active), and recurses into the
//! executor. The child gets a copy of the parent's `context` map, so its
//! writes never propagate outward. Nested errors are captured into the
//! parent's `workflowResults` rather than unwinding; only cancellation
//! escapes.

use indexmap::IndexMap;
use tracing::{info, warn};

use flowctl_types::{WorkflowCallStage, WorkflowStage};
use flowctl_util::VarsFile;

use crate::context::{ExecutionContext, StageResultRecord, WorkflowStatus};
use crate::document::WorkflowDocument;
use crate::error::{EngineError, EngineResult};
use crate::template::resolve_template;

use super::{RunOptions, WorkflowExecutionResult, WorkflowExecutor};

/// Executes one workflow-kind stage, recording outputs and result under the
/// parent context.
pub(crate) async fn execute_workflow_stage(
    executor: &WorkflowExecutor,
    document: &WorkflowDocument,
    context: &mut ExecutionContext,
    stage: &WorkflowStage,
    call: &WorkflowCallStage,
    options: &RunOptions,
) -> EngineResult<()> {
    if options.mocked
        && let Some(output_map) = call.mock.as_ref().and_then(|mock| mock.output.as_ref())
    {
        let mut outputs = IndexMap::new();
        {
            let snapshot = context.snapshot(executor.clock());
            for (key, template) in output_map {
                outputs.insert(key.clone(), resolve_template(template, &snapshot)?);
            }
        }
        context.workflow_outputs.insert(stage.name.clone(), outputs);
        context.workflow_results.insert(
            stage.name.clone(),
            StageResultRecord {
                status: WorkflowStatus::Ok,
                message: None,
            },
        );
        return Ok(());
    }

    let outcome = run_nested(executor, document, context, call, options).await;
    match outcome {
        Ok(result) => {
            context.workflow_outputs.insert(stage.name.clone(), result.output);
            context.workflow_results.insert(
                stage.name.clone(),
                StageResultRecord {
                    status: WorkflowStatus::Ok,
                    message: result.result_message,
                },
            );
        }
        // Cancellation is never captured; it unwinds to the top level.
        Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
        Err(error) => {
            warn!(stage = %stage.name, "nested workflow failed: {}", error);
            context.workflow_results.insert(
                stage.name.clone(),
                StageResultRecord {
                    status: WorkflowStatus::Error,
                    message: Some(error.to_string()),
                },
            );
        }
    }

    Ok(())
}

async fn run_nested(
    executor: &WorkflowExecutor,
    document: &WorkflowDocument,
    context: &ExecutionContext,
    call: &WorkflowCallStage,
    options: &RunOptions,
) -> EngineResult<WorkflowExecutionResult> {
    let reference_path = document
        .definition
        .references
        .workflow_path(&call.workflow_ref)
        .ok_or_else(|| EngineError::UnknownWorkflowRef(call.workflow_ref.clone()))?;
    let child_path = document.directory().join(reference_path);

    let child_document = WorkflowDocument::load(&child_path, &document.environment_variables)?;

    let inputs = match &call.inputs {
        Some(input_templates) => {
            let snapshot = context.snapshot(executor.clock());
            let mut inputs = IndexMap::new();
            for (key, template) in input_templates {
                inputs.insert(key.clone(), resolve_template(template, &snapshot)?);
            }
            inputs
        }
        None => {
            let vars_path = child_path.with_extension("wfvars");
            if vars_path.exists() && !options.vars_override_active {
                let vars = VarsFile::load(&vars_path)?;
                let resolution = vars.resolve(&options.environment, &child_document.definition.version)?;
                info!(
                    workflow = %child_document.definition.name,
                    vars_file = %vars_path.display(),
                    "seeding nested inputs from sibling vars file"
                );
                resolution.values
            } else {
                IndexMap::new()
            }
        }
    };

    let pad = "  ".repeat(context.indent);
    info!(workflow = %child_document.definition.name, "{}entering nested workflow", pad);
    let result = Box::pin(executor.run_document(&child_document, inputs, context.context.clone(), context.indent + 1, options)).await;
    info!(workflow = %child_document.definition.name, "{}nested workflow returned", pad);
    result
}
