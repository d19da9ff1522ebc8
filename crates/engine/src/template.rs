//! Template resolution.
//!
//! Any string in a workflow document may contain `{{ token }}` placeholders.
//! A token is a root followed by segments, with `.` and `:` interchangeable
//! separators except inside the `stage:json(...)` form. Resolution is strict:
//! a token naming data that is not present fails with
//! [`EngineError::TemplateResolutionFailed`]. The run-if evaluator uses the
//! lenient variant, where absence reads as null.
//!
//! Scalar JSON leaves serialize as: strings as their content, numbers in
//! canonical form, booleans as `true`/`false`, null as the empty string, and
//! objects/arrays as their compact JSON text.

use serde_json::Value;

use flowctl_types::lookup::get_ignore_case;
use indexmap::IndexMap;

use crate::context::TemplateContext;
use crate::error::{EngineError, EngineResult};

/// Resolves every `{{ … }}` occurrence in the input string.
///
/// Text outside tokens is preserved verbatim; an unterminated `{{` leaves the
/// remainder untouched. Resolution is idempotent once all tokens have
/// expanded.
pub fn resolve_template(input: &str, context: &TemplateContext) -> EngineResult<String> {
    let mut output = String::new();
    let mut remaining = input;

    while let Some(start) = remaining.find("{{") {
        let (before, from_token) = remaining.split_at(start);
        output.push_str(before);

        let Some(end) = from_token.find("}}") else {
            // Unterminated token marker: preserve the rest as-is.
            output.push_str(from_token);
            return Ok(output);
        };

        let token = from_token[2..end].trim();
        output.push_str(&resolve_token(token, context)?);
        remaining = &from_token[end + 2..];
    }

    output.push_str(remaining);
    Ok(output)
}

/// Resolves a single token (without the surrounding braces), strictly.
pub fn resolve_token(token: &str, context: &TemplateContext) -> EngineResult<String> {
    if token.len() >= 11 && token[..11].eq_ignore_ascii_case("stage:json(") {
        return resolve_stage_json(token, context);
    }

    let segments: Vec<&str> = token.split(['.', ':']).map(str::trim).collect();
    let Some(root) = segments.first().copied().filter(|root| !root.is_empty()) else {
        return Err(EngineError::TemplateResolutionFailed(format!("empty token '{}'", token)));
    };

    match root.to_ascii_lowercase().as_str() {
        "input" => scoped_value(&segments, context.inputs, "input"),
        "global" => scoped_value(&segments, context.globals, "global"),
        "context" => scoped_value(&segments, context.context, "context"),
        "env" => resolve_env(&segments, context),
        "system" => resolve_system(&segments, context),
        "endpoint" => stage_output(&segments, context.endpoint_outputs, "endpoint"),
        "workflow" => stage_output(&segments, context.workflow_outputs, "workflow"),
        "stage" => resolve_stage(&segments, context),
        "response" => resolve_response(&segments, context),
        other => Err(EngineError::TemplateResolutionFailed(format!("unknown token root '{}'", other))),
    }
}

/// Lenient token resolution for the run-if evaluator: absent data is null.
pub fn resolve_token_lenient(token: &str, context: &TemplateContext) -> Option<String> {
    resolve_token(token, context).ok()
}

/// Serializes a JSON leaf the way templates expect.
pub(crate) fn format_json_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn scoped_value(segments: &[&str], scope: &IndexMap<String, String>, root: &str) -> EngineResult<String> {
    if segments.len() < 2 {
        return Err(EngineError::TemplateResolutionFailed(format!("{} token is missing a name", root)));
    }
    let name = segments[1..].join(".");
    get_ignore_case(scope, &name)
        .cloned()
        .ok_or_else(|| EngineError::TemplateResolutionFailed(format!("{} '{}' is not defined", root, name)))
}

fn resolve_env(segments: &[&str], context: &TemplateContext) -> EngineResult<String> {
    if segments.len() < 2 {
        return Err(EngineError::TemplateResolutionFailed("env token is missing a name".into()));
    }
    let name = segments[1..].join(".");

    if let Some(value) = flowctl_types::get_str_ignore_case(context.env_variables, &name) {
        return Ok(value.to_string());
    }
    // Fall back to the process environment.
    std::env::var(&name).map_err(|_| EngineError::TemplateResolutionFailed(format!("environment variable '{}' is not set", name)))
}

fn resolve_system(segments: &[&str], context: &TemplateContext) -> EngineResult<String> {
    let (Some(unit), Some(instant)) = (segments.get(1), segments.get(2)) else {
        return Err(EngineError::TemplateResolutionFailed(
            "system token must be system.<datetime|date|time>.<now|utcnow>".into(),
        ));
    };

    let utc = instant.eq_ignore_ascii_case("utcnow");
    if !utc && !instant.eq_ignore_ascii_case("now") {
        return Err(EngineError::TemplateResolutionFailed(format!("unknown system instant '{}'", instant)));
    }

    let formatted = if unit.eq_ignore_ascii_case("datetime") {
        if utc {
            context.clock.now_utc().to_rfc3339()
        } else {
            context.clock.now_local().to_rfc3339()
        }
    } else if unit.eq_ignore_ascii_case("date") {
        if utc {
            context.clock.now_utc().format("%Y-%m-%d").to_string()
        } else {
            context.clock.now_local().format("%Y-%m-%d").to_string()
        }
    } else if unit.eq_ignore_ascii_case("time") {
        if utc {
            context.clock.now_utc().format("%H:%M:%S").to_string()
        } else {
            context.clock.now_local().format("%H:%M:%S").to_string()
        }
    } else {
        return Err(EngineError::TemplateResolutionFailed(format!("unknown system unit '{}'", unit)));
    };

    Ok(formatted)
}

fn stage_output(
    segments: &[&str],
    outputs: &IndexMap<String, IndexMap<String, String>>,
    root: &str,
) -> EngineResult<String> {
    if segments.len() < 4 || !segments[2].eq_ignore_ascii_case("output") {
        return Err(EngineError::TemplateResolutionFailed(format!(
            "{} token must be {}.<stage>.output.<key>",
            root, root
        )));
    }
    let stage = segments[1];
    let key = segments[3..].join(".");

    get_ignore_case(outputs, stage)
        .and_then(|map| get_ignore_case(map, &key))
        .cloned()
        .ok_or_else(|| EngineError::TemplateResolutionFailed(format!("{} output '{}' of stage '{}' is not available", root, key, stage)))
}

fn resolve_stage(segments: &[&str], context: &TemplateContext) -> EngineResult<String> {
    let (Some(stage), Some(selector)) = (segments.get(1), segments.get(2)) else {
        return Err(EngineError::TemplateResolutionFailed(
            "stage token must be stage.<stage>.output.<key> or stage.<stage>.workflow.{output|result}.<key>".into(),
        ));
    };

    if selector.eq_ignore_ascii_case("workflow") {
        let Some(kind) = segments.get(3) else {
            return Err(EngineError::TemplateResolutionFailed(format!(
                "stage '{}' workflow token is missing a selector",
                stage
            )));
        };
        if kind.eq_ignore_ascii_case("result") {
            let field = segments.get(4).copied().unwrap_or_default();
            let record = get_ignore_case(context.workflow_results, stage).ok_or_else(|| {
                EngineError::TemplateResolutionFailed(format!("stage '{}' has no workflow result", stage))
            })?;
            return match field.to_ascii_lowercase().as_str() {
                "status" => Ok(record.status.as_str().to_string()),
                "message" => Ok(record.message.clone().unwrap_or_default()),
                other => Err(EngineError::TemplateResolutionFailed(format!(
                    "unknown workflow result field '{}' on stage '{}'",
                    other, stage
                ))),
            };
        }
        if kind.eq_ignore_ascii_case("output") {
            let key = segments[4..].join(".");
            return get_ignore_case(context.workflow_outputs, stage)
                .and_then(|map| get_ignore_case(map, &key))
                .cloned()
                .ok_or_else(|| {
                    EngineError::TemplateResolutionFailed(format!("workflow output '{}' of stage '{}' is not available", key, stage))
                });
        }
        return Err(EngineError::TemplateResolutionFailed(format!(
            "unknown stage workflow selector '{}' on stage '{}'",
            kind, stage
        )));
    }

    if selector.eq_ignore_ascii_case("output") {
        let key = segments[3..].join(".");
        // Workflow results carry no outputs; check workflow outputs, then
        // endpoint outputs, in that order.
        let value = get_ignore_case(context.workflow_outputs, stage)
            .and_then(|map| get_ignore_case(map, &key))
            .or_else(|| get_ignore_case(context.endpoint_outputs, stage).and_then(|map| get_ignore_case(map, &key)));
        return value
            .cloned()
            .ok_or_else(|| EngineError::TemplateResolutionFailed(format!("output '{}' of stage '{}' is not available", key, stage)));
    }

    Err(EngineError::TemplateResolutionFailed(format!(
        "unknown stage selector '{}' on stage '{}'",
        selector, stage
    )))
}

fn resolve_response(segments: &[&str], context: &TemplateContext) -> EngineResult<String> {
    let Some(response) = context.response else {
        return Err(EngineError::TemplateResolutionFailed(
            "response token used without a bound response".into(),
        ));
    };
    let Some(first) = segments.get(1) else {
        return Err(EngineError::TemplateResolutionFailed("response token is missing a selector".into()));
    };

    if first.eq_ignore_ascii_case("status") && segments.len() == 2 {
        return Ok(response.status.to_string());
    }
    // `body` is a reserved terminator: it always returns the raw body and is
    // checked before any JSON path traversal.
    if first.eq_ignore_ascii_case("body") && segments.len() == 2 {
        return Ok(response.body.clone());
    }
    if first.eq_ignore_ascii_case("headers") {
        let name = segments[2..].join(".");
        return get_ignore_case(&response.headers, &name)
            .cloned()
            .ok_or_else(|| EngineError::TemplateResolutionFailed(format!("response header '{}' is not present", name)));
    }

    let json = response.json.as_ref().ok_or_else(|| {
        EngineError::TemplateResolutionFailed("response body is not JSON; only status, body, and headers are addressable".into())
    })?;
    let value = walk_json_path(json, &segments[1..])
        .ok_or_else(|| EngineError::TemplateResolutionFailed(format!("response path '{}' did not resolve", segments[1..].join("."))))?;
    Ok(format_json_value(value))
}

fn resolve_stage_json(token: &str, context: &TemplateContext) -> EngineResult<String> {
    let close = token
        .find(')')
        .ok_or_else(|| EngineError::TemplateResolutionFailed(format!("unterminated stage:json token '{}'", token)))?;
    let inner = token[11..close].trim();
    let trailing = token[close + 1..].trim_start_matches(['.', ':']);

    // Inside stage:json(...) only `.` separates: <stage>.output.<key>.
    let inner_segments: Vec<&str> = inner.split('.').map(str::trim).collect();
    if inner_segments.len() < 3 || !inner_segments[1].eq_ignore_ascii_case("output") {
        return Err(EngineError::TemplateResolutionFailed(format!(
            "stage:json inner expression '{}' must be <stage>.output.<key>",
            inner
        )));
    }
    let stage = inner_segments[0];
    let key = inner_segments[2..].join(".");

    let raw = get_ignore_case(context.workflow_outputs, stage)
        .and_then(|map| get_ignore_case(map, &key))
        .or_else(|| get_ignore_case(context.endpoint_outputs, stage).and_then(|map| get_ignore_case(map, &key)))
        .ok_or_else(|| EngineError::TemplateResolutionFailed(format!("output '{}' of stage '{}' is not available", key, stage)))?;

    let parsed: Value = serde_json::from_str(raw)
        .map_err(|error| EngineError::TemplateResolutionFailed(format!("output '{}' of stage '{}' is not JSON: {}", key, stage, error)))?;

    if trailing.is_empty() {
        return Ok(format_json_value(&parsed));
    }

    let path_segments: Vec<&str> = trailing.split('.').map(str::trim).collect();
    let value = walk_json_path(&parsed, &path_segments).ok_or_else(|| {
        EngineError::TemplateResolutionFailed(format!("path '{}' did not resolve inside output '{}' of stage '{}'", trailing, key, stage))
    })?;
    Ok(format_json_value(value))
}

/// Walks objects by key and arrays by integer index.
fn walk_json_path<'v>(root: &'v Value, segments: &[&str]) -> Option<&'v Value> {
    let mut current = root;
    for segment in segments {
        match current {
            Value::Object(map) => current = map.get(*segment)?,
            Value::Array(items) => current = items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        }
    }
    Some(current)
}
