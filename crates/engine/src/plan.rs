//! Dry-run plan rendering.
//!
//! A plan is a static, human-readable walk of the document: stage order,
//! kinds, endpoints or workflow references, gating conditions, and resilience
//! refs. Nothing is resolved or invoked.

use std::fmt::Write as _;

use flowctl_types::StageKind;

use crate::document::WorkflowDocument;

/// Renders an execution plan for display.
pub fn render_plan(document: &WorkflowDocument) -> String {
    let definition = &document.definition;
    let mut plan = String::new();

    let _ = writeln!(
        plan,
        "workflow '{}' (id {}, version {}) - {} stage(s)",
        definition.name,
        definition.id,
        definition.version,
        definition.stages.len()
    );

    if let Some(init) = &definition.init_stage {
        if !init.variables.is_empty() {
            let names: Vec<&str> = init.variables.iter().map(|variable| variable.name.as_str()).collect();
            let _ = writeln!(plan, "  init: variables [{}]", names.join(", "));
        }
        if !init.context.is_empty() {
            let keys: Vec<&str> = init.context.keys().map(String::as_str).collect();
            let _ = writeln!(plan, "  init: context [{}]", keys.join(", "));
        }
    }

    for (position, stage) in definition.stages.iter().enumerate() {
        let mut line = match &stage.kind {
            StageKind::Endpoint(endpoint) => {
                format!("  {}. {} [endpoint {} {} via {}]", position + 1, stage.name, endpoint.http_verb, endpoint.endpoint, endpoint.api_ref)
            }
            StageKind::Workflow(call) => {
                format!("  {}. {} [workflow {}]", position + 1, stage.name, call.workflow_ref)
            }
        };

        if let Some(run_if) = &stage.run_if {
            let _ = write!(line, " if {}", run_if);
        }
        if let Some(delay) = stage.delay_seconds.filter(|delay| *delay > 0) {
            let _ = write!(line, " delay {}s", delay);
        }
        if let StageKind::Endpoint(endpoint) = &stage.kind {
            if let Some(retry) = &endpoint.retry {
                let _ = write!(line, " retry[{}]", retry.pool_ref.as_deref().unwrap_or("inline"));
            }
            if let Some(breaker) = &endpoint.circuit_breaker {
                let _ = write!(line, " breaker[{}]", breaker.pool_ref.as_deref().unwrap_or(&stage.name));
            }
            if let Some(jump_table) = &endpoint.jump_on_status {
                let branches: Vec<String> = jump_table.iter().map(|(status, target)| format!("{}→{}", status, target)).collect();
                let _ = write!(line, " jump[{}]", branches.join(", "));
            }
        }

        plan.push_str(&line);
        plan.push('\n');
    }

    if let Some(end) = &definition.end_stage
        && !end.output.is_empty()
    {
        let keys: Vec<&str> = end.output.keys().map(String::as_str).collect();
        let _ = writeln!(plan, "  end: output [{}]", keys.join(", "));
    }

    plan
}
