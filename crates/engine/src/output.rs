//! Output artifact writing.
//!
//! When a workflow declares `output: true`, its end-stage output map is
//! persisted under `<workflowDir>/output/` as pretty-printed JSON. The file
//! name embeds a ULID so rapid successive runs never collide. String values
//! that parse as a JSON object or array are embedded as parsed JSON unless
//! the end stage set `outputJson: false`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use ulid::Ulid;

use flowctl_types::WorkflowDefinition;

use crate::error::EngineResult;

/// Writes the output artifact and returns its path.
pub fn write_artifact(
    document_dir: &Path,
    definition: &WorkflowDefinition,
    output: &IndexMap<String, String>,
    embed_json: bool,
) -> EngineResult<PathBuf> {
    let output_dir = document_dir.join("output");
    fs::create_dir_all(&output_dir).with_context(|| format!("create output directory {}", output_dir.display()))?;

    let file_name = format!("{}.{}.{}.workflow.output", safe_name(&definition.name), definition.id, Ulid::new());
    let path = output_dir.join(file_name);

    let rendered = render_output(output, embed_json);
    let content = serde_json::to_string_pretty(&rendered).context("serialize workflow output")?;
    fs::write(&path, content).with_context(|| format!("write output artifact {}", path.display()))?;

    Ok(path)
}

/// Renders the output map as a JSON object, embedding object/array-valued
/// strings as parsed JSON when requested.
pub fn render_output(output: &IndexMap<String, String>, embed_json: bool) -> Value {
    let mut object = Map::new();
    for (key, value) in output {
        let rendered = if embed_json {
            match serde_json::from_str::<Value>(value) {
                Ok(parsed @ (Value::Object(_) | Value::Array(_))) => parsed,
                _ => Value::String(value.clone()),
            }
        } else {
            Value::String(value.clone())
        };
        object.insert(key.clone(), rendered);
    }
    Value::Object(object)
}

/// Filesystem-safe rendering of a workflow name.
fn safe_name(name: &str) -> String {
    let mut safe = String::with_capacity(name.len());
    let mut last_was_dash = false;
    for character in name.chars() {
        if character.is_ascii_alphanumeric() {
            safe.push(character.to_ascii_lowercase());
            last_was_dash = false;
        } else if !last_was_dash {
            safe.push('-');
            last_was_dash = true;
        }
    }
    safe.trim_matches('-').to_string()
}
