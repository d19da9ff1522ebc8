//! API catalog schema.
//!
//! The catalog is an ordered list of versions; each version carries an
//! environment → base-URL map and the API definitions addressable from
//! workflow documents. Lookups are case-insensitive to match identifier
//! comparison rules everywhere else in the system.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::lookup::get_ignore_case;

/// Ordered list of catalog versions, as parsed from `api-catalog.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ApiCatalog(pub Vec<ApiCatalogVersion>);

impl ApiCatalog {
    /// Finds a catalog version by its version string.
    pub fn find_version(&self, version: &str) -> Option<&ApiCatalogVersion> {
        self.0.iter().find(|entry| entry.version.eq_ignore_ascii_case(version))
    }
}

/// One catalog version: base URLs per environment plus API definitions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApiCatalogVersion {
    /// Version string workflow documents select with their `version` field.
    pub version: String,
    /// Environment → base-URL fallback map for APIs without their own.
    #[serde(default)]
    pub base_url: IndexMap<String, String>,
    /// API definitions available in this version.
    #[serde(default)]
    pub definitions: Vec<ApiDefinition>,
}

impl ApiCatalogVersion {
    /// Finds an API definition by name.
    pub fn find_definition(&self, name: &str) -> Option<&ApiDefinition> {
        self.definitions.iter().find(|definition| definition.name.eq_ignore_ascii_case(name))
    }

    /// Resolves the base URL for an API in a given environment.
    ///
    /// The API's own `baseUrl` map wins; the version-level map is the
    /// fallback. Returns `None` when the environment appears in neither.
    pub fn base_url_for<'a>(&'a self, definition: &'a ApiDefinition, environment: &str) -> Option<&'a str> {
        definition
            .base_url
            .as_ref()
            .and_then(|own| get_ignore_case(own, environment))
            .or_else(|| get_ignore_case(&self.base_url, environment))
            .map(String::as_str)
    }
}

/// One API definition inside a catalog version.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApiDefinition {
    /// Definition name referenced from `references.apis[].definition`.
    pub name: String,
    /// OpenAPI descriptor location; consumed by out-of-band tooling.
    #[serde(default)]
    pub swagger_url: Option<String>,
    /// Per-environment base-URL override for this API.
    #[serde(default)]
    pub base_url: Option<IndexMap<String, String>>,
    /// Path prefix appended to the resolved base URL.
    #[serde(default)]
    pub base_path: Option<String>,
}
