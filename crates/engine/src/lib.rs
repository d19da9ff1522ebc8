//! # Flowctl Engine
//!
//! Executes declarative HTTP workflow documents: an ordered sequence of
//! stages, each an endpoint invocation or a nested workflow call. Parameter
//! templates resolve against a layered variable scope (inputs, globals,
//! shared context, environment, prior stage outputs, and the live response),
//! endpoint stages run behind retry and circuit-breaker policies, and the
//! final output map can be persisted as a JSON artifact.
//!
//! ## Architecture
//!
//! - [`document`]: loading workflow documents with environment inheritance
//! - [`template`]: `{{ … }}` token resolution against a context snapshot
//! - [`run_if`]: the stage gating predicate language
//! - [`values`]: dynamic value generators for init-stage variables
//! - [`mock`]: mock payload loading for mocked runs
//! - [`resilience`]: retry/breaker policy merging and the breaker state machine
//! - [`executor`]: the stage loop and the per-kind stage executors
//! - [`output`]: the end-stage output artifact writer
//! - [`plan`]: static dry-run plan rendering
//!
//! ## Usage
//!
//! ```no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! use flowctl_api::HttpEndpointInvoker;
//! use flowctl_engine::{RunOptions, WorkflowDocument, WorkflowExecutor};
//! use flowctl_util::SystemClock;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let document = WorkflowDocument::load("workflows/order-sync.yaml".as_ref(), &HashMap::new())?;
//! let catalog = serde_json::from_str(&std::fs::read_to_string("workflows/api-catalog.json")?)?;
//!
//! let executor = WorkflowExecutor::new(catalog, Arc::new(HttpEndpointInvoker::new()?), Arc::new(SystemClock));
//! let options = RunOptions {
//!     environment: "dev".into(),
//!     vars_override_active: false,
//!     mocked: false,
//!     verbose: false,
//!     debug: false,
//! };
//! let result = executor.execute(&document, Default::default(), &options).await?;
//! println!("{:?}", result.output);
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod document;
pub mod error;
pub mod executor;
pub mod mock;
pub mod output;
pub mod plan;
pub mod resilience;
pub mod run_if;
pub mod template;
pub mod values;

pub use context::{ExecutionContext, ResponseContext, StageResultRecord, TemplateContext, WorkflowStatus};
pub use document::WorkflowDocument;
pub use error::{EngineError, EngineResult};
pub use executor::{Confirmer, DenyAllConfirmer, RunOptions, WorkflowExecutionResult, WorkflowExecutor};
pub use plan::render_plan;
pub use run_if::{RunIfExpression, evaluate_run_if};
pub use template::{resolve_template, resolve_token, resolve_token_lenient};
pub use values::DynamicValueService;
