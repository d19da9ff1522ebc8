//! Environment-file loading and overlay.
//!
//! Environment files use the dotenv dialect: `KEY=VALUE` per line, an
//! optional `export ` prefix, `#` comments, quoted values unquoted, blank
//! lines ignored. Parsing is delegated to `dotenvy`; nothing here touches the
//! process environment, the values flow into the execution context instead.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};

/// Loads an environment file into a plain map without mutating the process
/// environment.
pub fn load_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let iter = dotenvy::from_path_iter(path).with_context(|| format!("failed to open environment file {}", path.display()))?;

    let mut variables = HashMap::new();
    for entry in iter {
        let (key, value) = entry.with_context(|| format!("failed to parse environment file {}", path.display()))?;
        variables.insert(key, value);
    }
    Ok(variables)
}

/// Overlays `child` onto `base`; child entries win on key collisions.
///
/// A nested workflow inherits its parent's environment map and applies its
/// own environment file on top, so a caller-supplied file reaches nested
/// documents unless they override a key themselves.
pub fn overlay_env(base: &HashMap<String, String>, child: HashMap<String, String>) -> HashMap<String, String> {
    let mut merged = base.clone();
    merged.extend(child);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn parses_dotenv_dialect() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join(".env");
        fs::write(
            &path,
            "# comment\nexport API_KEY=secret\nREGION=\"eu-west\"\n\nEMPTY=\n",
        )
        .expect("write env file");

        let variables = load_env_file(&path).expect("load env file");
        assert_eq!(variables.get("API_KEY").map(String::as_str), Some("secret"));
        assert_eq!(variables.get("REGION").map(String::as_str), Some("eu-west"));
        assert_eq!(variables.get("EMPTY").map(String::as_str), Some(""));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().expect("create temp dir");
        assert!(load_env_file(&dir.path().join("absent.env")).is_err());
    }

    #[test]
    fn overlay_prefers_child_values() {
        let mut base = HashMap::new();
        base.insert("A".to_string(), "parent".to_string());
        base.insert("B".to_string(), "parent".to_string());

        let mut child = HashMap::new();
        child.insert("B".to_string(), "child".to_string());
        child.insert("C".to_string(), "child".to_string());

        let merged = overlay_env(&base, child);
        assert_eq!(merged.get("A").map(String::as_str), Some("parent"));
        assert_eq!(merged.get("B").map(String::as_str), Some("child"));
        assert_eq!(merged.get("C").map(String::as_str), Some("child"));
    }
}
