//! Layered vars-file (`.wfvars`) parsing and resolution.
//!
//! A vars file is line-oriented `key: value` with scope headers. A bare
//! `global:` header opens the defaults block, any other bare `<name>:` header
//! opens an environment block, and a `version: <ver>` directive inside an
//! environment block opens a version sub-scope. Resolution layers
//! global → environment → (environment, version), each overriding the
//! former, and records the winning layer per key.

use std::fmt;
use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use thiserror::Error;

/// Errors raised while loading or resolving a vars file.
#[derive(Debug, Error)]
pub enum VarsFileError {
    #[error("failed to read vars file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("vars file line {line} is not a 'key: value' entry or scope header")]
    Malformed { line: usize },
    #[error("vars file declares environments but not '{environment}', and has no global values")]
    MissingEnvironment { environment: String },
}

/// The layer a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarsSource {
    /// Global defaults block.
    Global,
    /// Environment block.
    Environment(String),
    /// Version sub-scope of an environment block.
    Version { environment: String, version: String },
}

impl fmt::Display for VarsSource {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarsSource::Global => formatter.write_str("global"),
            VarsSource::Environment(environment) => write!(formatter, "env({})", environment),
            VarsSource::Version { environment, version } => write!(formatter, "version({}, {})", environment, version),
        }
    }
}

/// Result of resolving a vars file for one `(environment, version)` pair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VarsResolution {
    /// Effective key/value map after layering.
    pub values: IndexMap<String, String>,
    /// Winning layer per key.
    pub sources: IndexMap<String, VarsSource>,
}

/// Parsed vars file, ready for per-environment resolution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VarsFile {
    globals: IndexMap<String, String>,
    environments: IndexMap<String, EnvironmentScope>,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct EnvironmentScope {
    values: IndexMap<String, String>,
    versions: IndexMap<String, IndexMap<String, String>>,
}

/// Parser position while walking the file top to bottom.
enum Scope {
    Global,
    Environment(String),
    Version { environment: String, version: String },
}

impl VarsFile {
    /// Loads and parses a vars file from disk.
    pub fn load(path: &Path) -> Result<Self, VarsFileError> {
        let content = fs::read_to_string(path).map_err(|source| VarsFileError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parses vars-file content.
    pub fn parse(content: &str) -> Result<Self, VarsFileError> {
        let mut file = VarsFile::default();
        let mut scope = Scope::Global;

        for (index, raw_line) in content.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            // Bare `<name>:` lines are scope headers.
            if let Some(header) = line.strip_suffix(':')
                && !header.contains(':')
                && !header.trim().is_empty()
            {
                let header = header.trim();
                if header.eq_ignore_ascii_case("global") {
                    scope = Scope::Global;
                } else {
                    file.environments.entry(header.to_string()).or_default();
                    scope = Scope::Environment(header.to_string());
                }
                continue;
            }

            let Some((key, value)) = line.split_once(':') else {
                return Err(VarsFileError::Malformed { line: index + 1 });
            };
            let key = key.trim().to_string();
            let value = value.trim().to_string();
            if key.is_empty() {
                return Err(VarsFileError::Malformed { line: index + 1 });
            }

            // `version: <ver>` inside an environment block opens a sub-scope.
            if key.eq_ignore_ascii_case("version")
                && let Scope::Environment(environment) | Scope::Version { environment, .. } = &scope
            {
                let environment = environment.clone();
                file.environments
                    .entry(environment.clone())
                    .or_default()
                    .versions
                    .entry(value.clone())
                    .or_default();
                scope = Scope::Version {
                    environment,
                    version: value,
                };
                continue;
            }

            match &scope {
                Scope::Global => {
                    file.globals.insert(key, value);
                }
                Scope::Environment(environment) => {
                    file.environments.entry(environment.clone()).or_default().values.insert(key, value);
                }
                Scope::Version { environment, version } => {
                    file.environments
                        .entry(environment.clone())
                        .or_default()
                        .versions
                        .entry(version.clone())
                        .or_default()
                        .insert(key, value);
                }
            }
        }

        Ok(file)
    }

    /// Layers global → environment → (environment, version) values.
    pub fn resolve(&self, environment: &str, version: &str) -> Result<VarsResolution, VarsFileError> {
        let environment_scope = self
            .environments
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(environment))
            .map(|(_, scope)| scope);

        if environment_scope.is_none() && self.globals.is_empty() && !self.environments.is_empty() {
            return Err(VarsFileError::MissingEnvironment {
                environment: environment.to_string(),
            });
        }

        let mut resolution = VarsResolution::default();
        for (key, value) in &self.globals {
            resolution.values.insert(key.clone(), value.clone());
            resolution.sources.insert(key.clone(), VarsSource::Global);
        }

        if let Some(scope) = environment_scope {
            for (key, value) in &scope.values {
                resolution.values.insert(key.clone(), value.clone());
                resolution.sources.insert(key.clone(), VarsSource::Environment(environment.to_string()));
            }

            let version_values = scope
                .versions
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(version))
                .map(|(_, values)| values);
            if let Some(values) = version_values {
                for (key, value) in values {
                    resolution.values.insert(key.clone(), value.clone());
                    resolution.sources.insert(
                        key.clone(),
                        VarsSource::Version {
                            environment: environment.to_string(),
                            version: version.to_string(),
                        },
                    );
                }
            }
        }

        Ok(resolution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
global:
  username: default-user
  region: us

dev:
  username: dev-user
  version: 1.0
  region: eu

prod:
  username: prod-user
";

    #[test]
    fn layers_global_environment_and_version() {
        let file = VarsFile::parse(SAMPLE).expect("parse vars file");
        let resolution = file.resolve("dev", "1.0").expect("resolve dev 1.0");

        assert_eq!(resolution.values.get("username").map(String::as_str), Some("dev-user"));
        assert_eq!(resolution.values.get("region").map(String::as_str), Some("eu"));
        assert_eq!(resolution.sources.get("username"), Some(&VarsSource::Environment("dev".into())));
        assert_eq!(
            resolution.sources.get("region"),
            Some(&VarsSource::Version {
                environment: "dev".into(),
                version: "1.0".into()
            })
        );
    }

    #[test]
    fn falls_back_to_globals_for_unknown_version() {
        let file = VarsFile::parse(SAMPLE).expect("parse vars file");
        let resolution = file.resolve("prod", "9.9").expect("resolve prod");

        assert_eq!(resolution.values.get("username").map(String::as_str), Some("prod-user"));
        assert_eq!(resolution.values.get("region").map(String::as_str), Some("us"));
        assert_eq!(resolution.sources.get("region"), Some(&VarsSource::Global));
    }

    #[test]
    fn missing_environment_without_globals_is_an_error() {
        let file = VarsFile::parse("dev:\n  username: dev-user\n").expect("parse vars file");
        let error = file.resolve("staging", "1.0").expect_err("expected missing environment");
        assert!(matches!(error, VarsFileError::MissingEnvironment { .. }));
    }

    #[test]
    fn missing_environment_with_globals_resolves_to_globals() {
        let file = VarsFile::parse("global:\n  username: u\ndev:\n  username: d\n").expect("parse vars file");
        let resolution = file.resolve("staging", "1.0").expect("resolve staging");
        assert_eq!(resolution.values.get("username").map(String::as_str), Some("u"));
    }

    #[test]
    fn reparse_reproduces_identical_resolution() {
        let file = VarsFile::parse(SAMPLE).expect("parse vars file");
        let first = file.resolve("dev", "1.0").expect("resolve");
        let reparsed = VarsFile::parse(SAMPLE).expect("reparse vars file");
        let second = reparsed.resolve("dev", "1.0").expect("re-resolve");
        assert_eq!(first, second);
    }

    #[test]
    fn rejects_lines_without_separator() {
        let error = VarsFile::parse("global:\n  not-a-pair\n").expect_err("expected malformed line");
        assert!(matches!(error, VarsFileError::Malformed { line: 2 }));
    }

    #[test]
    fn environment_lookup_is_case_insensitive() {
        let file = VarsFile::parse(SAMPLE).expect("parse vars file");
        let resolution = file.resolve("DEV", "1.0").expect("resolve DEV");
        assert_eq!(resolution.values.get("username").map(String::as_str), Some("dev-user"));
    }
}
