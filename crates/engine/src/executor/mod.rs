//! Workflow execution.
//!
//! [`WorkflowExecutor`] drives a loaded document stage by stage: run-if
//! gating, delays, debug dumps, dispatch by stage kind, jump-on-status
//! handling, end-stage output resolution, and artifact writing. Endpoint and
//! nested-workflow stages live in their own submodules; this module owns the
//! loop and the services every stage shares.
//!
//! Stages execute strictly sequentially. The only suspension points are HTTP
//! calls, delay/retry sleeps, and nested recursion, and a single cancellation
//! token threads through all of them.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use flowctl_api::{EndpointInvoker, combine_base_url};
use flowctl_types::lookup::get_ignore_case;
use flowctl_types::{ApiCatalog, StageKind, WorkflowDefinition};
use flowctl_util::Clock;

use crate::context::ExecutionContext;
use crate::document::WorkflowDocument;
use crate::error::{EngineError, EngineResult};
use crate::output;
use crate::run_if::evaluate_run_if;
use crate::template::resolve_template;
use crate::values::DynamicValueService;

pub mod endpoint;
pub mod nested;

/// Reserved jump target that terminates the stage loop.
const END_STAGE_TARGET: &str = "endStage";

/// Interactive confirmation port; the CLI installs a prompt, tests install
/// fixed answers.
pub trait Confirmer: Send + Sync {
    /// Returns whether the user approved the prompt.
    fn confirm(&self, prompt: &str) -> bool;
}

/// Non-interactive default: every prompt is declined.
#[derive(Debug, Default, Clone, Copy)]
pub struct DenyAllConfirmer;

impl Confirmer for DenyAllConfirmer {
    fn confirm(&self, _prompt: &str) -> bool {
        false
    }
}

/// Per-run flags and selections supplied by the caller.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Target environment name used for catalog and vars-file resolution.
    pub environment: String,
    /// Whether a top-level vars file suppressed sibling-wfvars seeding.
    pub vars_override_active: bool,
    /// Mocked run: endpoint stages are satisfied by their mock definitions.
    pub mocked: bool,
    /// Verbose diagnostics (request body dumps on 400).
    pub verbose: bool,
    /// Resolve and print stage debug maps.
    pub debug: bool,
}

/// Outcome of one workflow invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowExecutionResult {
    /// Resolved end-stage output map.
    pub output: IndexMap<String, String>,
    /// Artifact path when the definition asked for one.
    pub output_file_path: Option<PathBuf>,
    /// Resolved end-stage result message, surfaced to a calling workflow.
    pub result_message: Option<String>,
}

/// Executes workflow documents against an API catalog.
pub struct WorkflowExecutor {
    catalog: ApiCatalog,
    invoker: Arc<dyn EndpointInvoker>,
    clock: Arc<dyn Clock>,
    confirmer: Arc<dyn Confirmer>,
    values: DynamicValueService,
    cancellation: CancellationToken,
}

impl WorkflowExecutor {
    /// Creates an executor with a deny-all confirmer and a fresh cancellation
    /// token.
    pub fn new(catalog: ApiCatalog, invoker: Arc<dyn EndpointInvoker>, clock: Arc<dyn Clock>) -> Self {
        Self {
            catalog,
            invoker,
            clock,
            confirmer: Arc::new(DenyAllConfirmer),
            values: DynamicValueService::new(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Installs an interactive confirmation port.
    pub fn with_confirmer(mut self, confirmer: Arc<dyn Confirmer>) -> Self {
        self.confirmer = confirmer;
        self
    }

    /// Installs an external cancellation token.
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Runs a top-level workflow document.
    pub async fn execute(
        &self,
        document: &WorkflowDocument,
        inputs: IndexMap<String, String>,
        options: &RunOptions,
    ) -> EngineResult<WorkflowExecutionResult> {
        self.run_document(document, inputs, IndexMap::new(), 0, options).await
    }

    /// Runs one document at the given nesting depth. Nested stages re-enter
    /// here through [`nested::execute_workflow_stage`].
    pub(crate) async fn run_document(
        &self,
        document: &WorkflowDocument,
        inputs: IndexMap<String, String>,
        inherited_context: IndexMap<String, String>,
        indent: usize,
        options: &RunOptions,
    ) -> EngineResult<WorkflowExecutionResult> {
        let definition = &document.definition;
        let pad = "  ".repeat(indent);
        info!(workflow = %definition.name, environment = %options.environment, "{}workflow started", pad);
        let run_started = Instant::now();

        let base_urls = self.resolve_api_base_urls(definition, &options.environment)?;

        if !options.mocked {
            for input in &definition.input {
                if input.required && get_ignore_case(&inputs, &input.name).is_none() {
                    return Err(EngineError::MissingRequiredInput(input.name.clone()));
                }
            }
        }

        let mut context = ExecutionContext::new(inputs, document.environment_variables.clone(), inherited_context, indent);
        self.run_init_stage(definition, &mut context)?;

        let mut index = 0usize;
        while index < definition.stages.len() {
            if self.cancellation.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            let stage = &definition.stages[index];

            if let Some(run_if) = &stage.run_if {
                let should_run = {
                    let snapshot = context.snapshot(self.clock.as_ref());
                    evaluate_run_if(run_if, &snapshot)?
                };
                if !should_run {
                    info!(stage = %stage.name, "{}stage skipped by runIf", pad);
                    index += 1;
                    continue;
                }
            }

            if let Some(delay) = stage.delay_seconds.filter(|delay| *delay > 0) {
                info!(stage = %stage.name, delay_seconds = delay, "{}delaying stage", pad);
                self.sleep(Duration::from_secs(delay)).await?;
            }

            if options.debug && let Some(debug_map) = &stage.debug {
                let snapshot = context.snapshot(self.clock.as_ref());
                for (key, template) in debug_map {
                    match resolve_template(template, &snapshot) {
                        Ok(rendered) => info!("{}debug {} = {}", pad, key, rendered),
                        Err(error) => info!("{}debug {} failed to resolve: {}", pad, key, error),
                    }
                }
            }

            info!(stage = %stage.name, "{}stage started", pad);
            let stage_started = Instant::now();

            let jump_target = match &stage.kind {
                StageKind::Endpoint(endpoint_stage) => {
                    endpoint::execute_endpoint_stage(self, document, &mut context, stage, endpoint_stage, &base_urls, options).await?
                }
                StageKind::Workflow(call) => {
                    nested::execute_workflow_stage(self, document, &mut context, stage, call, options).await?;
                    if let Some(message) = &stage.message {
                        let rendered = {
                            let snapshot = context.snapshot(self.clock.as_ref());
                            resolve_template(message, &snapshot)?
                        };
                        info!(stage = %stage.name, "{}{}", pad, rendered);
                    }
                    None
                }
            };

            info!(
                stage = %stage.name,
                elapsed_ms = stage_started.elapsed().as_millis() as u64,
                "{}stage completed",
                pad
            );

            match jump_target {
                Some(target) if target.eq_ignore_ascii_case(END_STAGE_TARGET) => {
                    info!(stage = %stage.name, "{}jumping to end stage", pad);
                    break;
                }
                Some(target) => match definition.stage_index(&target) {
                    Some(target_index) => {
                        info!(stage = %stage.name, target = %target, "{}jumping", pad);
                        index = target_index;
                    }
                    None => {
                        warn!(stage = %stage.name, target = %target, "{}jump target is not a known stage; continuing", pad);
                        index += 1;
                    }
                },
                None => index += 1,
            }
        }

        let (output_map, result_message, embed_json) = self.run_end_stage(definition, &mut context)?;

        let output_file_path = if definition.output {
            let path = output::write_artifact(document.directory(), definition, &output_map, embed_json)?;
            info!(path = %path.display(), "{}wrote output artifact", pad);
            context.output_file_path = Some(path.clone());
            Some(path)
        } else {
            None
        };

        info!(
            workflow = %definition.name,
            elapsed_ms = run_started.elapsed().as_millis() as u64,
            "{}workflow completed",
            pad
        );

        Ok(WorkflowExecutionResult {
            output: output_map,
            output_file_path,
            result_message,
        })
    }

    fn run_init_stage(&self, definition: &WorkflowDefinition, context: &mut ExecutionContext) -> EngineResult<()> {
        let Some(init) = &definition.init_stage else {
            return Ok(());
        };

        for variable in &init.variables {
            let value = {
                let snapshot = context.snapshot(self.clock.as_ref());
                self.values.generate(variable, &snapshot)?
            };
            context.globals.insert(variable.name.clone(), value);
        }

        for (key, template) in &init.context {
            // Parent-provided context keys win over init seeding.
            if get_ignore_case(&context.context, key).is_some() {
                continue;
            }
            let value = {
                let snapshot = context.snapshot(self.clock.as_ref());
                resolve_template(template, &snapshot)?
            };
            context.context.insert(key.clone(), value);
        }

        Ok(())
    }

    fn run_end_stage(
        &self,
        definition: &WorkflowDefinition,
        context: &mut ExecutionContext,
    ) -> EngineResult<(IndexMap<String, String>, Option<String>, bool)> {
        let Some(end) = &definition.end_stage else {
            return Ok((IndexMap::new(), None, true));
        };

        let mut output_map = IndexMap::new();
        {
            let snapshot = context.snapshot(self.clock.as_ref());
            for (key, template) in &end.output {
                output_map.insert(key.clone(), resolve_template(template, &snapshot)?);
            }
        }
        context.workflow_outputs.insert(definition.name.clone(), output_map.clone());

        if let Some(context_map) = &end.context {
            for (key, template) in context_map {
                let value = {
                    let snapshot = context.snapshot(self.clock.as_ref());
                    resolve_template(template, &snapshot)?
                };
                context.context.insert(key.clone(), value);
            }
        }

        let result_message = match end.result.as_ref().and_then(|result| result.message.as_ref()) {
            Some(template) => {
                let snapshot = context.snapshot(self.clock.as_ref());
                Some(resolve_template(template, &snapshot)?)
            }
            None => None,
        };

        Ok((output_map, result_message, end.output_json.unwrap_or(true)))
    }

    /// Builds the `apiRef → base URL` table for one document.
    fn resolve_api_base_urls(&self, definition: &WorkflowDefinition, environment: &str) -> EngineResult<IndexMap<String, String>> {
        let version = self
            .catalog
            .find_version(&definition.version)
            .ok_or_else(|| EngineError::CatalogVersionUnknown(definition.version.clone()))?;

        let mut base_urls = IndexMap::new();
        for api in &definition.references.apis {
            let catalog_definition = version
                .find_definition(&api.definition)
                .ok_or_else(|| EngineError::ApiReferenceUnknown(api.definition.clone()))?;
            let base = version
                .base_url_for(catalog_definition, environment)
                .ok_or_else(|| EngineError::EnvironmentUnknown {
                    api: api.name.clone(),
                    environment: environment.to_string(),
                })?;
            base_urls.insert(api.name.clone(), combine_base_url(base, catalog_definition.base_path.as_deref())?);
        }
        Ok(base_urls)
    }

    /// Sleeps, racing the cancellation token; cancellation is never swallowed.
    pub(crate) async fn sleep(&self, duration: Duration) -> EngineResult<()> {
        tokio::select! {
            _ = self.cancellation.cancelled() => Err(EngineError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub(crate) fn invoker(&self) -> &dyn EndpointInvoker {
        self.invoker.as_ref()
    }

    pub(crate) fn confirmer(&self) -> &dyn Confirmer {
        self.confirmer.as_ref()
    }

    pub(crate) fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}
