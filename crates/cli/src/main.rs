//! Flowctl command-line entry point.
//!
//! Loads a workflow document and its API catalog, validates the document,
//! optionally prints a dry-run plan, and otherwise executes the workflow
//! against the selected environment. Any failure exits with code 1.

use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, error};

use flowctl_api::HttpEndpointInvoker;
use flowctl_engine::{Confirmer, RunOptions, WorkflowDocument, WorkflowExecutor, render_plan};
use flowctl_types::{ApiCatalog, validate_definition};
use flowctl_util::{SystemClock, VarsFile, load_env_file};

/// Declarative HTTP workflow runner.
#[derive(Debug, Parser)]
#[command(name = "flowctl", version, about)]
struct Cli {
    /// Path to the workflow document to execute.
    #[arg(long)]
    workflow: PathBuf,

    /// Target environment name (selects catalog base URLs and vars scopes).
    #[arg(long)]
    env: String,

    /// Path to the API catalog; defaults to api-catalog.json next to the
    /// workflow document.
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Environment file overlaid onto the workflow's variable map.
    #[arg(long)]
    envfile: Option<PathBuf>,

    /// Vars file (.wfvars) seeding the top-level workflow inputs.
    #[arg(long)]
    varsfile: Option<PathBuf>,

    /// Refresh cached API descriptors before running.
    #[arg(long)]
    refresh_cache: bool,

    /// Load, validate, and print the plan without executing.
    #[arg(long)]
    dry_run: bool,

    /// Satisfy endpoint stages from their mock definitions.
    #[arg(long)]
    mocked: bool,

    /// Verbose diagnostics.
    #[arg(long)]
    verbose: bool,

    /// Resolve and print stage debug maps.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(report) => {
            error!("{:#}", report);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(if verbose { Level::DEBUG } else { Level::INFO })
        .try_init();
}

async fn run(cli: Cli) -> Result<()> {
    let inherited_env = match &cli.envfile {
        Some(path) => load_env_file(path)?,
        None => HashMap::new(),
    };

    let document = WorkflowDocument::load(&cli.workflow, &inherited_env)?;

    let issues = validate_definition(&document.definition);
    if !issues.is_empty() {
        for issue in &issues {
            error!("validation: {}", issue);
        }
        bail!("workflow '{}' failed validation with {} issue(s)", document.definition.name, issues.len());
    }

    let catalog = load_catalog(cli.catalog.as_deref(), &document)?;
    if catalog.find_version(&document.definition.version).is_none() {
        bail!("catalog does not contain version '{}'", document.definition.version);
    }

    if cli.refresh_cache {
        // Descriptor caching lives in out-of-band tooling; nothing to do here.
        debug!("refresh-cache requested; no cached descriptors to refresh");
    }

    let (inputs, vars_override_active) = match &cli.varsfile {
        Some(path) => {
            if path.extension().and_then(|extension| extension.to_str()) != Some("wfvars") {
                bail!("varsfile '{}' must have the .wfvars extension", path.display());
            }
            let vars = VarsFile::load(path)?;
            let resolution = vars.resolve(&cli.env, &document.definition.version)?;
            (resolution.values, true)
        }
        None => (Default::default(), false),
    };

    if cli.dry_run {
        print!("{}", render_plan(&document));
        return Ok(());
    }

    let cancellation = CancellationToken::new();
    let signal_token = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_token.cancel();
        }
    });

    let invoker = Arc::new(HttpEndpointInvoker::new()?);
    let executor = WorkflowExecutor::new(catalog, invoker, Arc::new(SystemClock))
        .with_confirmer(Arc::new(StdinConfirmer))
        .with_cancellation(cancellation);

    let options = RunOptions {
        environment: cli.env.clone(),
        vars_override_active,
        mocked: cli.mocked,
        verbose: cli.verbose,
        debug: cli.debug,
    };

    let result = executor.execute(&document, inputs, &options).await?;

    let rendered = flowctl_engine::output::render_output(&result.output, true);
    println!("{}", serde_json::to_string_pretty(&rendered)?);
    if let Some(path) = &result.output_file_path {
        println!("output written to {}", path.display());
    }

    Ok(())
}

fn load_catalog(explicit: Option<&Path>, document: &WorkflowDocument) -> Result<ApiCatalog> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => document.directory().join("api-catalog.json"),
    };
    let content = std::fs::read_to_string(&path).with_context(|| format!("failed to read API catalog {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse API catalog {}", path.display()))
}

/// Confirms self-jump prompts on the terminal.
struct StdinConfirmer;

impl Confirmer for StdinConfirmer {
    fn confirm(&self, prompt: &str) -> bool {
        print!("{} [y/N] ", prompt);
        let _ = io::stdout().flush();
        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}
