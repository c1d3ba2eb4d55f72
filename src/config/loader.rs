//! Load resource definitions from a directory of JSON files and resolve them.

use crate::config::resolved::{ColumnInfo, ColumnType, Resource, ResourceRegistry};
use crate::config::types::{ResourceConfig, ResourceFile};
use crate::config::validate;
use crate::error::ConfigError;
use std::path::Path;

/// Build the resource registry from raw configs (validates first).
pub fn resolve(configs: &[ResourceConfig]) -> Result<ResourceRegistry, ConfigError> {
    validate(configs)?;

    let mut resources = Vec::with_capacity(configs.len());
    for r in configs {
        let mut columns = Vec::with_capacity(r.columns.len());
        for c in &r.columns {
            let column_type = ColumnType::parse(&c.type_).ok_or_else(|| ConfigError::UnknownColumnType {
                resource: r.name.clone(),
                column: c.name.clone(),
                type_name: c.type_.clone(),
            })?;
            let is_primary_key = c.name == r.primary_key;
            columns.push(ColumnInfo {
                name: c.name.clone(),
                column_type,
                is_primary_key,
                nullable: c.nullable && !is_primary_key,
                has_default: is_primary_key || c.default.is_some(),
                default_expression: c.default.clone(),
                filterable: c.filterable,
            });
        }
        resources.push(Resource {
            name: r.name.clone(),
            table_name: r.table_name(),
            path_segment: r.path_segment(),
            api_version: r.api_version.clone(),
            primary_key: r.primary_key.clone(),
            columns,
            operations: r.operations.clone(),
            validation: r.validation.clone(),
            seed: r.seed.clone(),
        });
    }

    Ok(ResourceRegistry::new(resources))
}

/// Read every `*.json` file in `dir` (sorted by file name). Each holds one resource or an array.
pub async fn load_from_dir(dir: impl AsRef<Path>) -> Result<Vec<ResourceConfig>, ConfigError> {
    let dir = dir.as_ref();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", dir.display(), e)))?;

    let mut paths = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ConfigError::Load(e.to_string()))?
    {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut out = Vec::new();
    for path in paths {
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
        let file: ResourceFile = serde_json::from_str(&raw)
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
        tracing::debug!(path = %path.display(), "loaded resource file");
        out.extend(file.into_vec());
    }
    Ok(out)
}

/// Load and resolve in one step.
pub async fn load_registry(dir: impl AsRef<Path>) -> Result<ResourceRegistry, ConfigError> {
    let configs = load_from_dir(dir).await?;
    resolve(&configs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn book_config() -> ResourceConfig {
        serde_json::from_value(json!({
            "name": "Book",
            "columns": [
                { "name": "id", "type": "integer" },
                { "name": "title", "type": "text", "nullable": false }
            ],
            "validation": { "title": { "max_length": 200 } }
        }))
        .expect("book config")
    }

    #[test]
    fn resolve_applies_defaults() {
        let registry = resolve(&[book_config()]).expect("resolve");
        let book = registry.by_segment("book").expect("book resource");
        assert_eq!(book.table_name, "book");
        assert_eq!(book.api_version, "1.0");
        assert_eq!(book.primary_key, "id");
        let id = book.column("id").expect("id column");
        assert!(id.is_primary_key && id.has_default && !id.nullable);
        let title = book.column("title").expect("title column");
        assert!(!title.nullable && !title.has_default);
        assert!(book.allows("delete"));
    }

    #[test]
    fn rejects_duplicate_path_segments() {
        let err = resolve(&[book_config(), book_config()]).unwrap_err();
        assert!(matches!(err, ConfigError::Duplicate { kind: "resource", .. }));
    }

    #[test]
    fn rejects_non_integer_primary_key() {
        let mut cfg = book_config();
        cfg.primary_key = "title".into();
        let err = resolve(&[cfg]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPrimaryKey { .. }));
    }

    #[test]
    fn rejects_unknown_column_type() {
        let mut cfg = book_config();
        cfg.columns[1].type_ = "money".into();
        let err = resolve(&[cfg]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownColumnType { .. }));
    }

    #[test]
    fn rejects_rules_for_unknown_columns() {
        let mut cfg = book_config();
        cfg.validation.insert("author".into(), Default::default());
        assert!(matches!(resolve(&[cfg]).unwrap_err(), ConfigError::Validation(_)));
    }

    #[tokio::test]
    async fn loads_single_and_array_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("book.json"),
            serde_json::to_string(&book_config()).expect("json"),
        )
        .expect("write book");
        std::fs::write(
            dir.path().join("more.json"),
            r#"[{ "name": "Author", "columns": [{ "name": "id", "type": "bigint" }, { "name": "name", "type": "text" }] }]"#,
        )
        .expect("write authors");
        std::fs::write(dir.path().join("README.txt"), "ignored").expect("write txt");

        let registry = load_registry(dir.path()).await.expect("registry");
        assert_eq!(registry.resources().len(), 2);
        assert!(registry.by_segment("author").is_some());
        assert!(registry.by_name("book").is_some());
    }
}
