//! Raw resource definitions as found in the JSON resource files.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default = "default_true")]
    pub nullable: bool,
    /// SQL default expression (e.g. `NOW()`); the column may then be omitted on create.
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default = "default_true")]
    pub filterable: bool,
    #[serde(default)]
    pub comment: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub allowed: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Display name, also the i18n key of the resource (lowercased), e.g. "Book".
    pub name: String,
    /// Route segment under the API prefix. Defaults to the lowercased name.
    #[serde(default)]
    pub path_segment: Option<String>,
    /// Table name. Defaults to the path segment.
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    pub columns: Vec<ColumnConfig>,
    #[serde(default = "default_operations")]
    pub operations: Vec<String>,
    #[serde(default)]
    pub validation: HashMap<String, ValidationRule>,
    /// Rows inserted by `db seed`.
    #[serde(default)]
    pub seed: Vec<serde_json::Map<String, serde_json::Value>>,
}

fn default_api_version() -> String {
    "1.0".into()
}

fn default_primary_key() -> String {
    "id".into()
}

pub const ALL_OPERATIONS: &[&str] = &["list", "create", "read", "update", "delete"];

fn default_operations() -> Vec<String> {
    ALL_OPERATIONS.iter().map(|s| s.to_string()).collect()
}

impl ResourceConfig {
    pub fn path_segment(&self) -> String {
        self.path_segment
            .clone()
            .unwrap_or_else(|| self.name.to_lowercase())
    }

    pub fn table_name(&self) -> String {
        self.table.clone().unwrap_or_else(|| self.path_segment())
    }
}

/// Resource files may hold a single resource object or an array of them.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum ResourceFile {
    One(ResourceConfig),
    Many(Vec<ResourceConfig>),
}

impl ResourceFile {
    pub fn into_vec(self) -> Vec<ResourceConfig> {
        match self {
            ResourceFile::One(r) => vec![r],
            ResourceFile::Many(v) => v,
        }
    }
}
