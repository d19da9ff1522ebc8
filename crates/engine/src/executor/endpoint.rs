//! Endpoint stage execution.
//!
//! One endpoint stage runs through a fixed pipeline: circuit-breaker gate,
//! attempt loop (mock branch or real invocation, fixed-delay retries),
//! breaker update with the final status, expected-status check, output
//! binding, `set`/`context` writes, message emission, and the jump-on-status
//! decision. Retries consume transient failures silently apart from a
//! one-line warning; breaker transitions emit their configured messages but
//! never change error semantics.

use std::time::Duration;

use indexmap::IndexMap;
use tracing::{error, info, warn};

use flowctl_api::{ResolvedRequest, encode_path_value, join_endpoint};
use flowctl_types::lookup::get_ignore_case;
use flowctl_types::{EndpointStage, WorkflowStage};

use crate::context::{ExecutionContext, ResponseContext, TemplateContext};
use crate::document::WorkflowDocument;
use crate::error::{EngineError, EngineResult};
use crate::mock::build_mock_response;
use crate::resilience::{BreakerTransition, EffectiveRetry, effective_breaker, effective_retry};
use crate::template::resolve_template;

use super::{RunOptions, WorkflowExecutor};

/// Output key the engine always populates after a successful stage.
const HTTP_STATUS_KEY: &str = "http_status";

/// Response plus the request echo needed for 400/404 observability.
struct StageResponse {
    response: ResponseContext,
    request_url: String,
    request_body: Option<String>,
}

/// Executes one endpoint stage; returns the jump target, if any.
pub(crate) async fn execute_endpoint_stage(
    executor: &WorkflowExecutor,
    document: &WorkflowDocument,
    context: &mut ExecutionContext,
    stage: &WorkflowStage,
    endpoint: &EndpointStage,
    base_urls: &IndexMap<String, String>,
    options: &RunOptions,
) -> EngineResult<Option<String>> {
    let pools = &document.definition.resilience;
    let retry = effective_retry(endpoint.retry.as_ref(), pools);
    let breaker = effective_breaker(&stage.name, endpoint.circuit_breaker.as_ref(), retry.as_ref(), pools);

    if let Some(policy) = &breaker {
        let now = executor.clock().now_utc();
        let blocked = context.breakers.entry(policy.key.clone()).or_default().is_blocked(now);
        if blocked {
            emit_breaker_message(policy.on_blocked.as_deref(), "request blocked by open circuit breaker", context, executor);
            return Err(EngineError::CircuitOpen {
                stage: stage.name.clone(),
                breaker: policy.key.clone(),
            });
        }
    }

    let outcome = run_attempt_loop(executor, document, context, stage, endpoint, base_urls, options, retry.as_ref()).await?;
    let status = outcome.response.status;

    if let Some(policy) = &breaker {
        let now = executor.clock().now_utc();
        let is_failure = policy.counts_as_failure(status);
        let transition = context.breakers.entry(policy.key.clone()).or_default().record(is_failure, policy, now);
        if transition == BreakerTransition::Opened {
            emit_breaker_message(policy.on_open.as_deref(), "circuit breaker opened", context, executor);
        }
    }

    if status == 400 {
        error!(stage = %stage.name, "endpoint returned 400: {}", outcome.response.body);
        if options.verbose && let Some(body) = &outcome.request_body {
            error!(stage = %stage.name, "request body was: {}", body);
        }
    }
    if status == 404 {
        error!(stage = %stage.name, "endpoint returned 404 for {}", outcome.request_url);
    }

    if let Some(expected) = endpoint.expected_status
        && expected != status
    {
        return Err(EngineError::StageStatusMismatch {
            stage: stage.name.clone(),
            expected,
            actual: status,
        });
    }

    bind_outputs(executor, context, stage, endpoint, &outcome.response)?;
    apply_side_effects(executor, context, endpoint, &outcome.response)?;

    if let Some(message) = &stage.message {
        let rendered = {
            let snapshot = context.snapshot_with_response(executor.clock(), &outcome.response);
            resolve_template(message, &snapshot)?
        };
        info!(stage = %stage.name, "{}", rendered);
    }

    decide_jump(executor, stage, endpoint, status, options)
}

/// Where stage attempts come from: a mock definition or a prepared request.
enum AttemptSource<'a> {
    Mock(&'a flowctl_types::MockSpec),
    Http(ResolvedRequest),
}

/// Runs the attempt loop until a non-retryable response or exhausted retries.
#[allow(clippy::too_many_arguments)]
async fn run_attempt_loop(
    executor: &WorkflowExecutor,
    document: &WorkflowDocument,
    context: &ExecutionContext,
    stage: &WorkflowStage,
    endpoint: &EndpointStage,
    base_urls: &IndexMap<String, String>,
    options: &RunOptions,
    retry: Option<&EffectiveRetry>,
) -> EngineResult<StageResponse> {
    // The request (or mock) is identical across attempts; template failures
    // surface before the first invocation.
    let source = match endpoint.mock.as_ref().filter(|_| options.mocked) {
        Some(mock) => AttemptSource::Mock(mock),
        None => {
            let snapshot = context.snapshot(executor.clock());
            AttemptSource::Http(build_request(endpoint, base_urls, &snapshot)?)
        }
    };

    let max_attempts = retry.map(|policy| policy.max_retries + 1).unwrap_or(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        if executor.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let outcome = match &source {
            AttemptSource::Mock(mock) => {
                let snapshot = context.snapshot(executor.clock());
                let response = build_mock_response(&stage.name, mock, endpoint.expected_status, document.directory(), &snapshot)?;
                StageResponse {
                    request_url: endpoint.endpoint.clone(),
                    request_body: None,
                    response,
                }
            }
            AttemptSource::Http(request) => {
                let invocation = tokio::select! {
                    _ = executor.cancellation().cancelled() => return Err(EngineError::Cancelled),
                    invocation = executor.invoker().invoke(request.clone()) => invocation,
                };
                match invocation {
                    Ok(invocation) => StageResponse {
                        response: ResponseContext {
                            status: invocation.status,
                            body: invocation.body,
                            headers: invocation.headers,
                            json: invocation.json,
                        },
                        request_url: invocation.request_url,
                        request_body: invocation.request_body,
                    },
                    Err(exception) => {
                        if retry.is_some() && attempt < max_attempts {
                            warn!(stage = %stage.name, "invocation raised: {}", exception);
                            sleep_before_retry(executor, stage, retry, attempt, max_attempts).await?;
                            continue;
                        }
                        if let Some(template) = retry.and_then(|policy| policy.on_exception.as_deref()) {
                            let snapshot = context.snapshot(executor.clock());
                            let message = resolve_template(template, &snapshot).unwrap_or_else(|_| template.to_string());
                            error!(stage = %stage.name, "{}", message);
                        }
                        return Err(EngineError::EndpointFailed {
                            stage: stage.name.clone(),
                            reason: exception.to_string(),
                        });
                    }
                }
            }
        };

        if should_retry_status(retry, outcome.response.status, attempt, max_attempts) {
            sleep_before_retry(executor, stage, retry, attempt, max_attempts).await?;
            continue;
        }
        return Ok(outcome);
    }
}

fn should_retry_status(retry: Option<&EffectiveRetry>, status: u16, attempt: u32, max_attempts: u32) -> bool {
    retry.is_some_and(|policy| policy.retries_status(status)) && attempt < max_attempts
}

async fn sleep_before_retry(
    executor: &WorkflowExecutor,
    stage: &WorkflowStage,
    retry: Option<&EffectiveRetry>,
    attempt: u32,
    max_attempts: u32,
) -> EngineResult<()> {
    let delay_ms = retry.map(|policy| policy.delay_ms).unwrap_or_default();
    warn!(stage = %stage.name, "retrying in {}ms (retry {}/{})", delay_ms, attempt, max_attempts - 1);
    executor.sleep(Duration::from_millis(delay_ms)).await
}

/// Resolves endpoint templates and placeholders into a concrete request.
fn build_request(endpoint: &EndpointStage, base_urls: &IndexMap<String, String>, snapshot: &TemplateContext) -> EngineResult<ResolvedRequest> {
    let base = get_ignore_case(base_urls, &endpoint.api_ref)
        .ok_or_else(|| EngineError::ApiReferenceUnknown(endpoint.api_ref.clone()))?;

    let path = resolve_template(&endpoint.endpoint, snapshot)?;
    let path = fill_path_placeholders(&path, snapshot);
    let url = join_endpoint(base, &path);

    let mut headers = IndexMap::new();
    if let Some(header_map) = &endpoint.headers {
        for (name, template) in header_map {
            headers.insert(name.clone(), resolve_template(template, snapshot)?);
        }
    }

    let mut query = IndexMap::new();
    if let Some(query_map) = &endpoint.query {
        for (name, template) in query_map {
            query.insert(name.clone(), resolve_template(template, snapshot)?);
        }
    }

    let body = match &endpoint.body {
        Some(template) => Some(resolve_template(template, snapshot)?),
        None => None,
    };

    Ok(ResolvedRequest {
        method: endpoint.http_verb.clone(),
        url,
        headers,
        query,
        body,
    })
}

/// Fills single-brace `{name}` path placeholders from inputs, globals, and
/// context, percent-encoding the substituted value. Unknown placeholders are
/// left untouched.
fn fill_path_placeholders(path: &str, snapshot: &TemplateContext) -> String {
    let mut output = String::with_capacity(path.len());
    let mut rest = path;

    while let Some(start) = rest.find('{') {
        let (before, from_brace) = rest.split_at(start);
        output.push_str(before);
        let Some(end) = from_brace.find('}') else {
            output.push_str(from_brace);
            return output;
        };
        let name = from_brace[1..end].trim();
        let value = get_ignore_case(snapshot.inputs, name)
            .or_else(|| get_ignore_case(snapshot.globals, name))
            .or_else(|| get_ignore_case(snapshot.context, name));
        match value {
            Some(value) => output.push_str(&encode_path_value(value)),
            None => output.push_str(&from_brace[..=end]),
        }
        rest = &from_brace[end + 1..];
    }

    output.push_str(rest);
    output
}

fn bind_outputs(
    executor: &WorkflowExecutor,
    context: &mut ExecutionContext,
    stage: &WorkflowStage,
    endpoint: &EndpointStage,
    response: &ResponseContext,
) -> EngineResult<()> {
    let mut outputs = IndexMap::new();
    {
        let snapshot = context.snapshot_with_response(executor.clock(), response);
        if let Some(output_map) = &endpoint.output {
            for (key, template) in output_map {
                outputs.insert(key.clone(), resolve_template(template, &snapshot)?);
            }
        }
    }
    if get_ignore_case(&outputs, HTTP_STATUS_KEY).is_none() {
        outputs.insert(HTTP_STATUS_KEY.to_string(), response.status.to_string());
    }
    context.endpoint_outputs.insert(stage.name.clone(), outputs);
    Ok(())
}

fn apply_side_effects(
    executor: &WorkflowExecutor,
    context: &mut ExecutionContext,
    endpoint: &EndpointStage,
    response: &ResponseContext,
) -> EngineResult<()> {
    if let Some(set_map) = &endpoint.set {
        for (key, template) in set_map {
            let value = {
                let snapshot = context.snapshot_with_response(executor.clock(), response);
                resolve_template(template, &snapshot)?
            };
            context.globals.insert(key.clone(), value);
        }
    }
    if let Some(context_map) = &endpoint.context {
        for (key, template) in context_map {
            let value = {
                let snapshot = context.snapshot_with_response(executor.clock(), response);
                resolve_template(template, &snapshot)?
            };
            context.context.insert(key.clone(), value);
        }
    }
    Ok(())
}

fn decide_jump(
    executor: &WorkflowExecutor,
    stage: &WorkflowStage,
    endpoint: &EndpointStage,
    status: u16,
    options: &RunOptions,
) -> EngineResult<Option<String>> {
    let Some(target) = endpoint.jump_on_status.as_ref().and_then(|table| table.get(&status)) else {
        return Ok(None);
    };

    if target.eq_ignore_ascii_case(&stage.name) {
        if options.mocked {
            return Err(EngineError::MockedSelfJump(stage.name.clone()));
        }
        let prompt = format!("stage '{}' mapped status {} back to itself; repeat the stage?", stage.name, status);
        if !executor.confirmer().confirm(&prompt) {
            info!(stage = %stage.name, "self-jump declined; continuing sequentially");
            return Ok(None);
        }
    }

    Ok(Some(target.clone()))
}

fn emit_breaker_message(template: Option<&str>, fallback: &str, context: &ExecutionContext, executor: &WorkflowExecutor) {
    let message = match template {
        Some(template) => {
            let snapshot = context.snapshot(executor.clock());
            resolve_template(template, &snapshot).unwrap_or_else(|_| template.to_string())
        }
        None => fallback.to_string(),
    };
    warn!("{}", message);
}
