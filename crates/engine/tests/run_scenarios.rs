//! End-to-end execution scenarios driven through a scripted invoker.
//!
//! Documents are written to a temp directory, the catalog is built in code,
//! and the invoker replays a fixed response script while recording every
//! request it receives.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::TimeZone;
use indexmap::IndexMap;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use flowctl_api::{EndpointInvoker, InvocationResult, ResolvedRequest};
use flowctl_engine::{EngineError, RunOptions, WorkflowDocument, WorkflowExecutor};
use flowctl_types::ApiCatalog;
use flowctl_util::FixedClock;

/// One scripted reply: an HTTP response or a transport exception.
enum Script {
    Respond(u16, &'static str),
    Fail(&'static str),
}

/// Replays a response script in order and records every request.
struct ScriptedInvoker {
    script: Mutex<VecDeque<Script>>,
    calls: Mutex<Vec<ResolvedRequest>>,
}

impl ScriptedInvoker {
    fn new(script: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn calls(&self) -> Vec<ResolvedRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl EndpointInvoker for ScriptedInvoker {
    async fn invoke(&self, request: ResolvedRequest) -> anyhow::Result<InvocationResult> {
        self.calls.lock().unwrap().push(request.clone());
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted invoker ran out of responses for {}", request.url))?;

        match step {
            Script::Respond(status, body) => Ok(InvocationResult {
                status,
                body: body.to_string(),
                headers: IndexMap::new(),
                json: serde_json::from_str(body).ok(),
                request_url: request.url.clone(),
                method: request.method.clone(),
                request_body: request.body,
            }),
            Script::Fail(reason) => Err(anyhow!("{}", reason)),
        }
    }
}

fn catalog() -> ApiCatalog {
    serde_json::from_value(json!([
        {
            "version": "1.0",
            "baseUrl": { "test": "http://things.test" },
            "definitions": [
                { "name": "things-api" }
            ]
        }
    ]))
    .expect("build catalog")
}

fn write_document(dir: &Path, name: &str, content: &str) -> WorkflowDocument {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("write workflow document");
    WorkflowDocument::load(&path, &HashMap::new()).expect("load workflow document")
}

fn executor(invoker: Arc<ScriptedInvoker>) -> WorkflowExecutor {
    let clock = FixedClock::new(chrono::Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap());
    WorkflowExecutor::new(catalog(), invoker, Arc::new(clock))
}

fn options() -> RunOptions {
    RunOptions {
        environment: "test".into(),
        vars_override_active: false,
        mocked: false,
        verbose: false,
        debug: false,
    }
}

#[tokio::test]
async fn happy_path_threads_stage_outputs_into_the_end_output() {
    let invoker = ScriptedInvoker::new(vec![
        Script::Respond(200, "{\"id\":\"abc\"}"),
        Script::Respond(200, "{\"ok\":true}"),
    ]);
    let dir = tempfile::tempdir().expect("temp dir");
    let document = write_document(
        dir.path(),
        "happy.yaml",
        r#"
version: "1.0"
id: happy
name: happy
references:
  apis:
    - name: things
      definition: things-api
stages:
  - name: a
    kind: Endpoint
    apiRef: things
    endpoint: /things
    httpVerb: POST
    expectedStatus: 200
    output:
      id: "{{response.id}}"
      raw: "{{response.body}}"
  - name: b
    kind: Endpoint
    apiRef: things
    endpoint: /things/{{endpoint.a.output.id}}/confirm
    httpVerb: POST
    expectedStatus: 200
    body: "{{endpoint.a.output.raw}}"
endStage:
  output:
    id: "{{endpoint.a.output.id}}"
"#,
    );

    let result = executor(invoker.clone()).execute(&document, IndexMap::new(), &options()).await.expect("run workflow");

    assert_eq!(result.output.get("id").map(String::as_str), Some("abc"));
    assert_eq!(invoker.call_count(), 2);

    let calls = invoker.calls();
    assert_eq!(calls[1].url, "http://things.test/things/abc/confirm");
    assert_eq!(calls[1].body.as_deref(), Some("{\"id\":\"abc\"}"));
}

#[tokio::test]
async fn retry_until_success_makes_exactly_the_scripted_attempts() {
    let invoker = ScriptedInvoker::new(vec![
        Script::Respond(500, "{}"),
        Script::Respond(500, "{}"),
        Script::Respond(200, "{\"ok\":true}"),
    ]);
    let dir = tempfile::tempdir().expect("temp dir");
    let document = write_document(
        dir.path(),
        "retry.yaml",
        r#"
version: "1.0"
id: retry
name: retry
references:
  apis:
    - name: things
      definition: things-api
stages:
  - name: flaky
    kind: Endpoint
    apiRef: things
    endpoint: /flaky
    httpVerb: GET
    expectedStatus: 200
    retry:
      maxRetries: 2
      delayMs: 1
      httpStatus: [500]
endStage:
  output:
    status: "{{endpoint.flaky.output.http_status}}"
"#,
    );

    let result = executor(invoker.clone()).execute(&document, IndexMap::new(), &options()).await.expect("run workflow");

    assert_eq!(invoker.call_count(), 3);
    assert_eq!(result.output.get("status").map(String::as_str), Some("200"));
}

#[tokio::test]
async fn retry_exhausted_on_exception_surfaces_the_failure() {
    let invoker = ScriptedInvoker::new(vec![Script::Fail("boom"), Script::Fail("boom"), Script::Fail("boom")]);
    let dir = tempfile::tempdir().expect("temp dir");
    let document = write_document(
        dir.path(),
        "exceptions.yaml",
        r#"
version: "1.0"
id: exceptions
name: exceptions
references:
  apis:
    - name: things
      definition: things-api
stages:
  - name: doomed
    kind: Endpoint
    apiRef: things
    endpoint: /doomed
    httpVerb: GET
    retry:
      maxRetries: 2
      delayMs: 1
      httpStatus: [500]
      messages:
        onException: "giving up on doomed"
"#,
    );

    let error = executor(invoker.clone())
        .execute(&document, IndexMap::new(), &options())
        .await
        .expect_err("expected failure");

    assert_eq!(invoker.call_count(), 3);
    assert!(error.to_string().contains("failed with exception"));
    assert!(error.to_string().contains("boom"));
}

#[tokio::test]
async fn open_circuit_breaker_blocks_the_second_stage() {
    let invoker = ScriptedInvoker::new(vec![Script::Respond(500, "{}"), Script::Respond(500, "{}")]);
    let dir = tempfile::tempdir().expect("temp dir");
    let document = write_document(
        dir.path(),
        "breaker.yaml",
        r#"
version: "1.0"
id: breaker
name: breaker
references:
  apis:
    - name: things
      definition: things-api
resilience:
  retries:
    transient:
      maxRetries: 1
      delayMs: 1
      httpStatus: [500]
  circuitBreakers:
    cb:
      failureThreshold: 1
      breakMs: 60000
      messages:
        onOpen: "breaker opened"
        onBlocked: "breaker blocked a request"
stages:
  - name: first
    kind: Endpoint
    apiRef: things
    endpoint: /first
    httpVerb: GET
    retry:
      ref: transient
    circuitBreaker:
      ref: cb
  - name: second
    kind: Endpoint
    apiRef: things
    endpoint: /second
    httpVerb: GET
    retry:
      ref: transient
    circuitBreaker:
      ref: cb
"#,
    );

    let error = executor(invoker.clone())
        .execute(&document, IndexMap::new(), &options())
        .await
        .expect_err("expected circuit open");

    // Stage one exhausts its retry (two calls); stage two never reaches the
    // invoker.
    assert_eq!(invoker.call_count(), 2);
    assert!(matches!(error, EngineError::CircuitOpen { .. }));
    assert!(error.to_string().contains("second"));
}

#[tokio::test]
async fn mocked_self_jump_is_rejected() {
    let invoker = ScriptedInvoker::new(Vec::new());
    let dir = tempfile::tempdir().expect("temp dir");
    let document = write_document(
        dir.path(),
        "selfjump.yaml",
        r#"
version: "1.0"
id: selfjump
name: selfjump
references:
  apis:
    - name: things
      definition: things-api
stages:
  - name: loop
    kind: Endpoint
    apiRef: things
    endpoint: /loop
    httpVerb: GET
    mock:
      status: 200
      payload: "{}"
    jumpOnStatus:
      200: loop
"#,
    );

    let mut mocked = options();
    mocked.mocked = true;
    let error = executor(invoker.clone())
        .execute(&document, IndexMap::new(), &mocked)
        .await
        .expect_err("expected mocked self-jump rejection");

    assert!(matches!(error, EngineError::MockedSelfJump(_)));
    assert_eq!(invoker.call_count(), 0);
}

#[tokio::test]
async fn nested_workflow_inherits_vars_file_inputs_and_isolates_context() {
    let invoker = ScriptedInvoker::new(Vec::new());
    let dir = tempfile::tempdir().expect("temp dir");

    std::fs::write(
        dir.path().join("child.yaml"),
        r#"
version: "1.0"
id: child
name: child
input:
  - name: username
    required: true
endStage:
  output:
    username: "{{input.username}}"
  context:
    seed: "child-overwrote"
  result:
    message: "hello {{input.username}}"
"#,
    )
    .expect("write child document");
    std::fs::write(dir.path().join("child.wfvars"), "test:\n  username: u\n").expect("write child vars file");

    let document = write_document(
        dir.path(),
        "parent.yaml",
        r#"
version: "1.0"
id: parent
name: parent
references:
  workflows:
    - name: child
      path: child.yaml
initStage:
  context:
    seed: "parent-seed"
stages:
  - name: call
    kind: Workflow
    workflowRef: child
endStage:
  output:
    status: "{{stage.call.workflow.result.status}}"
    message: "{{stage.call.workflow.result.message}}"
    username: "{{stage.call.workflow.output.username}}"
    seed: "{{context.seed}}"
"#,
    );

    let result = executor(invoker.clone()).execute(&document, IndexMap::new(), &options()).await.expect("run workflow");

    assert_eq!(result.output.get("status").map(String::as_str), Some("Ok"));
    assert_eq!(result.output.get("message").map(String::as_str), Some("hello u"));
    assert_eq!(result.output.get("username").map(String::as_str), Some("u"));
    // The child's context write stayed in the child.
    assert_eq!(result.output.get("seed").map(String::as_str), Some("parent-seed"));
    assert_eq!(invoker.call_count(), 0);
}

#[tokio::test]
async fn nested_failure_is_captured_and_the_parent_continues() {
    let invoker = ScriptedInvoker::new(Vec::new());
    let dir = tempfile::tempdir().expect("temp dir");

    // Child demands an input nobody provides.
    std::fs::write(
        dir.path().join("strict.yaml"),
        r#"
version: "1.0"
id: strict
name: strict
input:
  - name: must_have
    required: true
"#,
    )
    .expect("write child document");

    let document = write_document(
        dir.path(),
        "tolerant.yaml",
        r#"
version: "1.0"
id: tolerant
name: tolerant
references:
  workflows:
    - name: strict
      path: strict.yaml
stages:
  - name: call
    kind: Workflow
    workflowRef: strict
endStage:
  output:
    status: "{{stage.call.workflow.result.status}}"
    message: "{{stage.call.workflow.result.message}}"
"#,
    );

    let result = executor(invoker.clone()).execute(&document, IndexMap::new(), &options()).await.expect("run workflow");

    assert_eq!(result.output.get("status").map(String::as_str), Some("Error"));
    assert!(result.output.get("message").expect("message present").contains("must_have"));
}

#[tokio::test]
async fn run_if_list_membership_gates_the_stage() {
    async fn run_with(gate: &str, script: Vec<Script>) -> (usize, Result<(), EngineError>) {
        let invoker = ScriptedInvoker::new(script);
        let dir = tempfile::tempdir().expect("temp dir");
        let document = write_document(
            dir.path(),
            "gated.yaml",
            &format!(
                r#"
version: "1.0"
id: gated
name: gated
references:
  apis:
    - name: things
      definition: things-api
stages:
  - name: a
    kind: Endpoint
    apiRef: things
    endpoint: /a
    httpVerb: GET
  - name: b
    kind: Endpoint
    apiRef: things
    endpoint: /b
    httpVerb: GET
    runIf: "{{{{stage:a.output.http_status}}}} in {gate}"
"#,
                gate = gate
            ),
        );

        let outcome = executor(invoker.clone()).execute(&document, IndexMap::new(), &options()).await;
        (invoker.call_count(), outcome.map(|_| ()))
    }

    let (calls, outcome) = run_with("[200,201]", vec![Script::Respond(201, "{}"), Script::Respond(200, "{}")]).await;
    outcome.expect("gated run succeeds");
    assert_eq!(calls, 2);

    let (calls, outcome) = run_with("[500]", vec![Script::Respond(201, "{}")]).await;
    outcome.expect("skipped run succeeds");
    assert_eq!(calls, 1);
}

#[tokio::test]
async fn missing_required_input_fails_unless_mocked() {
    let dir = tempfile::tempdir().expect("temp dir");
    let content = r#"
version: "1.0"
id: inputs
name: inputs
input:
  - name: username
    required: true
stages: []
"#;
    let document = write_document(dir.path(), "inputs.yaml", content);

    let invoker = ScriptedInvoker::new(Vec::new());
    let error = executor(invoker.clone())
        .execute(&document, IndexMap::new(), &options())
        .await
        .expect_err("expected missing input");
    assert!(matches!(error, EngineError::MissingRequiredInput(name) if name == "username"));

    let mut mocked = options();
    mocked.mocked = true;
    executor(invoker).execute(&document, IndexMap::new(), &mocked).await.expect("mocked run skips input enforcement");
}

#[tokio::test]
async fn output_artifact_is_written_with_embedded_json() {
    let invoker = ScriptedInvoker::new(vec![Script::Respond(200, "{\"items\":[1,2]}")]);
    let dir = tempfile::tempdir().expect("temp dir");
    let document = write_document(
        dir.path(),
        "artifact.yaml",
        r#"
version: "1.0"
id: artifact
name: artifact
output: true
references:
  apis:
    - name: things
      definition: things-api
stages:
  - name: fetch
    kind: Endpoint
    apiRef: things
    endpoint: /items
    httpVerb: GET
    output:
      payload: "{{response.body}}"
endStage:
  output:
    payload: "{{endpoint.fetch.output.payload}}"
"#,
    );

    let result = executor(invoker).execute(&document, IndexMap::new(), &options()).await.expect("run workflow");

    let path = result.output_file_path.expect("artifact path");
    assert!(path.exists());
    let file_name = path.file_name().and_then(|name| name.to_str()).expect("artifact name");
    assert!(file_name.starts_with("artifact.artifact."));
    assert!(file_name.ends_with(".workflow.output"));

    let parsed: Value = serde_json::from_str(&std::fs::read_to_string(&path).expect("read artifact")).expect("parse artifact");
    assert_eq!(parsed["payload"]["items"][1], 2);
}

#[tokio::test]
async fn cancellation_is_never_swallowed() {
    let invoker = ScriptedInvoker::new(vec![Script::Respond(200, "{}")]);
    let dir = tempfile::tempdir().expect("temp dir");
    let document = write_document(
        dir.path(),
        "cancel.yaml",
        r#"
version: "1.0"
id: cancel
name: cancel
references:
  apis:
    - name: things
      definition: things-api
stages:
  - name: only
    kind: Endpoint
    apiRef: things
    endpoint: /only
    httpVerb: GET
"#,
    );

    let token = CancellationToken::new();
    token.cancel();
    let error = executor(invoker.clone())
        .with_cancellation(token)
        .execute(&document, IndexMap::new(), &options())
        .await
        .expect_err("expected cancellation");

    assert!(matches!(error, EngineError::Cancelled));
    assert_eq!(invoker.call_count(), 0);
}

#[tokio::test]
async fn jump_on_status_short_circuits_to_the_end_stage() {
    let invoker = ScriptedInvoker::new(vec![Script::Respond(409, "{}")]);
    let dir = tempfile::tempdir().expect("temp dir");
    let document = write_document(
        dir.path(),
        "jump.yaml",
        r#"
version: "1.0"
id: jump
name: jump
references:
  apis:
    - name: things
      definition: things-api
stages:
  - name: create
    kind: Endpoint
    apiRef: things
    endpoint: /things
    httpVerb: POST
    jumpOnStatus:
      409: endStage
  - name: never
    kind: Endpoint
    apiRef: things
    endpoint: /never
    httpVerb: GET
endStage:
  output:
    status: "{{endpoint.create.output.http_status}}"
"#,
    );

    let result = executor(invoker.clone()).execute(&document, IndexMap::new(), &options()).await.expect("run workflow");

    assert_eq!(invoker.call_count(), 1);
    assert_eq!(result.output.get("status").map(String::as_str), Some("409"));
}

#[tokio::test]
async fn mocked_workflow_stage_publishes_its_mock_output() {
    let invoker = ScriptedInvoker::new(Vec::new());
    let dir = tempfile::tempdir().expect("temp dir");

    // The referenced document never runs, but the reference must resolve.
    std::fs::write(
        dir.path().join("real.yaml"),
        "version: \"1.0\"\nid: real\nname: real\nstages: []\n",
    )
    .expect("write referenced document");

    let document = write_document(
        dir.path(),
        "mockwf.yaml",
        r#"
version: "1.0"
id: mockwf
name: mockwf
references:
  workflows:
    - name: real
      path: real.yaml
initStage:
  context:
    tenant: acme
stages:
  - name: call
    kind: Workflow
    workflowRef: real
    mock:
      output:
        score: "{{context.tenant}}-42"
endStage:
  output:
    score: "{{stage.call.workflow.output.score}}"
    status: "{{stage.call.workflow.result.status}}"
"#,
    );

    let mut mocked = options();
    mocked.mocked = true;
    let result = executor(invoker.clone()).execute(&document, IndexMap::new(), &mocked).await.expect("run workflow");

    assert_eq!(result.output.get("score").map(String::as_str), Some("acme-42"));
    assert_eq!(result.output.get("status").map(String::as_str), Some("Ok"));
}

#[tokio::test]
async fn init_stage_variables_feed_templates() {
    let invoker = ScriptedInvoker::new(vec![Script::Respond(200, "{}")]);
    let dir = tempfile::tempdir().expect("temp dir");
    let document = write_document(
        dir.path(),
        "init.yaml",
        r#"
version: "1.0"
id: init
name: init
references:
  apis:
    - name: things
      definition: things-api
initStage:
  variables:
    - name: correlation
      type: guid
    - name: batch
      type: sequence
      start: 7
stages:
  - name: ping
    kind: Endpoint
    apiRef: things
    endpoint: /ping
    httpVerb: GET
    headers:
      X-Correlation-Id: "{{global.correlation}}"
endStage:
  output:
    batch: "{{global.batch}}"
"#,
    );

    let result = executor(invoker.clone()).execute(&document, IndexMap::new(), &options()).await.expect("run workflow");

    assert_eq!(result.output.get("batch").map(String::as_str), Some("7"));
    let calls = invoker.calls();
    let correlation = calls[0].headers.get("X-Correlation-Id").expect("correlation header");
    assert_eq!(correlation.len(), 36);
}

#[tokio::test]
async fn unexpected_status_fails_the_stage() {
    let invoker = ScriptedInvoker::new(vec![Script::Respond(500, "{\"error\":\"down\"}")]);
    let dir = tempfile::tempdir().expect("temp dir");
    let document = write_document(
        dir.path(),
        "mismatch.yaml",
        r#"
version: "1.0"
id: mismatch
name: mismatch
references:
  apis:
    - name: things
      definition: things-api
stages:
  - name: strict
    kind: Endpoint
    apiRef: things
    endpoint: /strict
    httpVerb: GET
    expectedStatus: 200
"#,
    );

    let error = executor(invoker.clone())
        .execute(&document, IndexMap::new(), &options())
        .await
        .expect_err("expected status mismatch");

    assert!(matches!(
        error,
        EngineError::StageStatusMismatch { expected: 200, actual: 500, .. }
    ));
    assert_eq!(invoker.call_count(), 1);
}

#[tokio::test]
async fn set_and_context_writes_reach_later_stages() {
    let invoker = ScriptedInvoker::new(vec![
        Script::Respond(200, "{\"token\":\"t-1\"}"),
        Script::Respond(200, "{}"),
    ]);
    let dir = tempfile::tempdir().expect("temp dir");
    let document = write_document(
        dir.path(),
        "sideeffects.yaml",
        r#"
version: "1.0"
id: sideeffects
name: sideeffects
references:
  apis:
    - name: things
      definition: things-api
stages:
  - name: login
    kind: Endpoint
    apiRef: things
    endpoint: /login
    httpVerb: POST
    set:
      token: "{{response.token}}"
    context:
      session: "sess-{{response.token}}"
  - name: use
    kind: Endpoint
    apiRef: things
    endpoint: /use
    httpVerb: GET
    headers:
      Authorization: "Bearer {{global.token}}"
      X-Session: "{{context.session}}"
endStage:
  output:
    token: "{{global.token}}"
"#,
    );

    let result = executor(invoker.clone()).execute(&document, IndexMap::new(), &options()).await.expect("run workflow");

    assert_eq!(result.output.get("token").map(String::as_str), Some("t-1"));
    let calls = invoker.calls();
    assert_eq!(calls[1].headers.get("Authorization").map(String::as_str), Some("Bearer t-1"));
    assert_eq!(calls[1].headers.get("X-Session").map(String::as_str), Some("sess-t-1"));
}

#[tokio::test]
async fn backward_jump_replays_an_earlier_stage() {
    let invoker = ScriptedInvoker::new(vec![
        Script::Respond(200, "{}"),
        Script::Respond(425, "{}"),
        Script::Respond(200, "{}"),
        Script::Respond(200, "{}"),
    ]);
    let dir = tempfile::tempdir().expect("temp dir");
    let document = write_document(
        dir.path(),
        "replay.yaml",
        r#"
version: "1.0"
id: replay
name: replay
references:
  apis:
    - name: things
      definition: things-api
stages:
  - name: submit
    kind: Endpoint
    apiRef: things
    endpoint: /submit
    httpVerb: POST
  - name: poll
    kind: Endpoint
    apiRef: things
    endpoint: /poll
    httpVerb: GET
    jumpOnStatus:
      425: submit
endStage:
  output:
    status: "{{endpoint.poll.output.http_status}}"
"#,
    );

    let result = executor(invoker.clone()).execute(&document, IndexMap::new(), &options()).await.expect("run workflow");

    // submit, poll (425, jump back), submit, poll.
    assert_eq!(invoker.call_count(), 4);
    assert_eq!(result.output.get("status").map(String::as_str), Some("200"));
}

#[tokio::test]
async fn mock_status_still_drives_the_retry_policy() {
    let invoker = ScriptedInvoker::new(Vec::new());
    let dir = tempfile::tempdir().expect("temp dir");
    let document = write_document(
        dir.path(),
        "mockretry.yaml",
        r#"
version: "1.0"
id: mockretry
name: mockretry
references:
  apis:
    - name: things
      definition: things-api
stages:
  - name: flaky
    kind: Endpoint
    apiRef: things
    endpoint: /flaky
    httpVerb: GET
    mock:
      status: 500
      payload: "{\"mocked\": true}"
    retry:
      maxRetries: 1
      delayMs: 1
      httpStatus: [500]
endStage:
  output:
    status: "{{endpoint.flaky.output.http_status}}"
"#,
    );

    let mut mocked = options();
    mocked.mocked = true;
    let result = executor(invoker.clone()).execute(&document, IndexMap::new(), &mocked).await.expect("run workflow");

    // The synthetic 500 exhausts the retry without reaching the invoker;
    // without an expectedStatus the stage then completes.
    assert_eq!(invoker.call_count(), 0);
    assert_eq!(result.output.get("status").map(String::as_str), Some("500"));
}

#[tokio::test]
async fn query_and_body_templates_resolve_into_the_request() {
    let invoker = ScriptedInvoker::new(vec![Script::Respond(200, "{}")]);
    let dir = tempfile::tempdir().expect("temp dir");
    let document = write_document(
        dir.path(),
        "request.yaml",
        r#"
version: "1.0"
id: request
name: request
input:
  - name: term
    required: true
references:
  apis:
    - name: things
      definition: things-api
stages:
  - name: search
    kind: Endpoint
    apiRef: things
    endpoint: /search
    httpVerb: POST
    query:
      q: "{{input.term}}"
      page: "1"
    body: "{\"query\": \"{{input.term}}\"}"
"#,
    );

    let inputs: IndexMap<String, String> = [("term".to_string(), "widgets".to_string())].into_iter().collect();
    executor(invoker.clone()).execute(&document, inputs, &options()).await.expect("run workflow");

    let calls = invoker.calls();
    assert_eq!(calls[0].query.get("q").map(String::as_str), Some("widgets"));
    assert_eq!(calls[0].query.get("page").map(String::as_str), Some("1"));
    assert_eq!(calls[0].body.as_deref(), Some("{\"query\": \"widgets\"}"));
}
