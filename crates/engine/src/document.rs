//! Workflow document loading.
//!
//! A document couples a parsed [`WorkflowDefinition`] with its absolute path
//! (nested references resolve against the containing directory) and the
//! effective environment variable map: the parent's map with the document's
//! own environment file overlaid, child values winning.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use flowctl_types::WorkflowDefinition;
use flowctl_util::{load_env_file, overlay_env};
use tracing::debug;

use crate::error::{EngineError, EngineResult};

/// A loaded workflow document, immutable during execution.
#[derive(Debug, Clone)]
pub struct WorkflowDocument {
    /// Parsed definition.
    pub definition: WorkflowDefinition,
    /// Absolute path the document was loaded from.
    pub file_path: PathBuf,
    /// Effective environment variables for this document.
    pub environment_variables: HashMap<String, String>,
}

impl WorkflowDocument {
    /// Loads a document, inheriting the given environment variable map.
    ///
    /// The document's `references.environmentFile` (resolved against the
    /// document directory) overlays the inherited map.
    pub fn load(path: &Path, inherited_env: &HashMap<String, String>) -> EngineResult<Self> {
        let load_failed = |reason: String| EngineError::WorkflowLoadFailed {
            path: path.display().to_string(),
            reason,
        };

        let content = fs::read_to_string(path).map_err(|error| load_failed(error.to_string()))?;
        if content.trim().is_empty() {
            return Err(load_failed("document is empty".into()));
        }

        let definition: WorkflowDefinition = serde_yaml::from_str(&content).map_err(|error| load_failed(error.to_string()))?;

        let file_path = fs::canonicalize(path).map_err(|error| load_failed(error.to_string()))?;
        let directory = file_path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));

        let environment_variables = match &definition.references.environment_file {
            Some(env_file) => {
                let env_path = directory.join(env_file);
                let own = load_env_file(&env_path).map_err(|error| load_failed(error.to_string()))?;
                overlay_env(inherited_env, own)
            }
            None => inherited_env.clone(),
        };

        debug!(path = %file_path.display(), workflow = %definition.name, "loaded workflow document");

        Ok(Self {
            definition,
            file_path,
            environment_variables,
        })
    }

    /// Directory containing the document; relative references resolve here.
    pub fn directory(&self) -> &Path {
        self.file_path.parent().unwrap_or_else(|| Path::new("."))
    }
}
