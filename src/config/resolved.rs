//! Resolved resource model: config validated and flattened for runtime use.

use crate::config::ValidationRule;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Column types understood by the schema, the filter translator and both stores.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    BigInt,
    Float,
    Text,
    Bool,
    Uuid,
    Timestamp,
    Date,
    Json,
}

impl ColumnType {
    pub fn parse(name: &str) -> Option<ColumnType> {
        let lower = name.trim().to_lowercase();
        Some(match lower.as_str() {
            "int" | "integer" | "int4" | "serial" | "smallint" => ColumnType::Integer,
            "bigint" | "int8" | "bigserial" => ColumnType::BigInt,
            "float" | "double" | "double precision" | "real" | "numeric" | "decimal" => ColumnType::Float,
            "text" | "string" | "varchar" | "character varying" => ColumnType::Text,
            "bool" | "boolean" => ColumnType::Bool,
            "uuid" => ColumnType::Uuid,
            "timestamp" | "timestamptz" | "timestamp with time zone" | "datetime" => ColumnType::Timestamp,
            "date" => ColumnType::Date,
            "json" | "jsonb" => ColumnType::Json,
            _ => return None,
        })
    }

    /// PostgreSQL type for DDL and parameter casts.
    pub fn pg_type(self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::BigInt => "bigint",
            ColumnType::Float => "double precision",
            ColumnType::Text => "text",
            ColumnType::Bool => "boolean",
            ColumnType::Uuid => "uuid",
            ColumnType::Timestamp => "timestamptz",
            ColumnType::Date => "date",
            ColumnType::Json => "jsonb",
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::BigInt)
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer() || self == ColumnType::Float
    }

    /// Whether LIKE-style pattern matching applies.
    pub fn is_textual(self) -> bool {
        matches!(
            self,
            ColumnType::Text | ColumnType::Uuid | ColumnType::Timestamp | ColumnType::Date
        )
    }
}

#[derive(Clone, Debug)]
pub struct ColumnInfo {
    pub name: String,
    pub column_type: ColumnType,
    pub is_primary_key: bool,
    pub nullable: bool,
    /// Whether the store fills the column when omitted (serial key, SQL default).
    pub has_default: bool,
    pub default_expression: Option<String>,
    pub filterable: bool,
}

#[derive(Clone, Debug)]
pub struct Resource {
    pub name: String,
    pub table_name: String,
    pub path_segment: String,
    pub api_version: String,
    pub primary_key: String,
    pub columns: Vec<ColumnInfo>,
    pub operations: Vec<String>,
    pub validation: HashMap<String, ValidationRule>,
    pub seed: Vec<Map<String, Value>>,
}

impl Resource {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn allows(&self, operation: &str) -> bool {
        self.operations.iter().any(|o| o == operation)
    }

    /// i18n key for the resource name, e.g. "book".
    pub fn i18n_key(&self) -> String {
        self.name.to_lowercase()
    }
}

#[derive(Clone, Debug, Default)]
pub struct ResourceRegistry {
    resources: Vec<Arc<Resource>>,
    by_segment: HashMap<String, Arc<Resource>>,
}

impl ResourceRegistry {
    pub fn new(resources: Vec<Resource>) -> Self {
        let resources: Vec<Arc<Resource>> = resources.into_iter().map(Arc::new).collect();
        let by_segment = resources
            .iter()
            .map(|r| (r.path_segment.clone(), Arc::clone(r)))
            .collect();
        ResourceRegistry {
            resources,
            by_segment,
        }
    }

    pub fn by_segment(&self, segment: &str) -> Option<Arc<Resource>> {
        self.by_segment.get(segment).cloned()
    }

    pub fn by_name(&self, name: &str) -> Option<Arc<Resource>> {
        self.resources
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(name))
            .cloned()
    }

    pub fn resources(&self) -> &[Arc<Resource>] {
        &self.resources
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_column_types_case_insensitively() {
        assert_eq!(ColumnType::parse("Integer"), Some(ColumnType::Integer));
        assert_eq!(ColumnType::parse("BIGSERIAL"), Some(ColumnType::BigInt));
        assert_eq!(ColumnType::parse("varchar"), Some(ColumnType::Text));
        assert_eq!(ColumnType::parse("timestamptz"), Some(ColumnType::Timestamp));
        assert_eq!(ColumnType::parse("money"), None);
    }
}
