//! Config validation: unique names, primary keys, column types and rule references.

use crate::config::{ColumnType, ResourceConfig, ALL_OPERATIONS};
use crate::error::ConfigError;
use regex::Regex;
use std::collections::HashSet;

pub fn validate(resources: &[ResourceConfig]) -> Result<(), ConfigError> {
    let mut names = HashSet::new();
    let mut segments = HashSet::new();
    let mut tables = HashSet::new();

    for r in resources {
        if r.name.trim().is_empty() {
            return Err(ConfigError::Validation("resource name must not be empty".into()));
        }
        if !names.insert(r.name.to_lowercase()) {
            return Err(ConfigError::Duplicate {
                kind: "resource",
                name: r.name.clone(),
            });
        }
        let segment = r.path_segment();
        if !is_identifier(&segment) {
            return Err(ConfigError::Validation(format!(
                "{}: path segment '{}' must be alphanumeric or '_'/'-'",
                r.name, segment
            )));
        }
        if !segments.insert(segment.clone()) {
            return Err(ConfigError::Duplicate {
                kind: "path segment",
                name: segment,
            });
        }
        if !tables.insert(r.table_name()) {
            return Err(ConfigError::Duplicate {
                kind: "table",
                name: r.table_name(),
            });
        }

        let mut column_names = HashSet::new();
        for c in &r.columns {
            if !column_names.insert(c.name.as_str()) {
                return Err(ConfigError::Duplicate {
                    kind: "column",
                    name: format!("{}.{}", r.name, c.name),
                });
            }
            if ColumnType::parse(&c.type_).is_none() {
                return Err(ConfigError::UnknownColumnType {
                    resource: r.name.clone(),
                    column: c.name.clone(),
                    type_name: c.type_.clone(),
                });
            }
        }

        let pk = r
            .columns
            .iter()
            .find(|c| c.name == r.primary_key)
            .ok_or_else(|| ConfigError::InvalidPrimaryKey {
                resource: r.name.clone(),
                column: r.primary_key.clone(),
            })?;
        if !ColumnType::parse(&pk.type_).map(ColumnType::is_integer).unwrap_or(false) {
            return Err(ConfigError::InvalidPrimaryKey {
                resource: r.name.clone(),
                column: r.primary_key.clone(),
            });
        }

        for op in &r.operations {
            if !ALL_OPERATIONS.contains(&op.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "{}: unknown operation '{}'",
                    r.name, op
                )));
            }
        }

        for (col, rule) in &r.validation {
            if !column_names.contains(col.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "{}: validation rule for unknown column '{}'",
                    r.name, col
                )));
            }
            if let Some(pattern) = &rule.pattern {
                Regex::new(pattern).map_err(|e| {
                    ConfigError::Validation(format!("{}.{}: invalid pattern: {}", r.name, col, e))
                })?;
            }
        }
    }

    Ok(())
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
