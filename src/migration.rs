//! Resource tables: DDL (create if missing, drop) and seed rows.

use crate::config::{ColumnType, Resource};
use crate::error::AppError;
use crate::filter::FilterTranslator;
use crate::record::Records;
use crate::sql::quoted;
use crate::store::RecordStore;
use sqlx::PgPool;
use std::sync::Arc;

/// CREATE TABLE IF NOT EXISTS with a serial primary key and the declared column constraints.
pub fn create_table_sql(resource: &Resource) -> String {
    let mut col_defs: Vec<String> = Vec::new();
    for c in &resource.columns {
        if c.is_primary_key {
            let serial = match c.column_type {
                ColumnType::BigInt => "BIGSERIAL",
                _ => "SERIAL",
            };
            col_defs.push(format!("{} {} PRIMARY KEY", quoted(&c.name), serial));
            continue;
        }
        let mut def = format!("{} {}", quoted(&c.name), c.column_type.pg_type());
        if !c.nullable {
            def.push_str(" NOT NULL");
        }
        if let Some(ref d) = c.default_expression {
            def.push_str(" DEFAULT ");
            def.push_str(d);
        }
        col_defs.push(def);
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
        quoted(&resource.table_name),
        col_defs.join(",\n  ")
    )
}

pub fn drop_table_sql(resource: &Resource) -> String {
    format!("DROP TABLE IF EXISTS {} CASCADE", quoted(&resource.table_name))
}

/// Create every resource table that does not exist yet, in declaration order.
pub async fn apply_migrations(pool: &PgPool, resources: &[Arc<Resource>]) -> Result<(), AppError> {
    for r in resources {
        let sql = create_table_sql(r);
        tracing::debug!(sql = %sql, "migration");
        sqlx::query(&sql).execute(pool).await?;
        tracing::info!(table = %r.table_name, "table ready");
    }
    Ok(())
}

/// Drop resource tables in reverse declaration order.
pub async fn drop_tables(pool: &PgPool, resources: &[Arc<Resource>]) -> Result<(), AppError> {
    for r in resources.iter().rev() {
        sqlx::query(&drop_table_sql(r)).execute(pool).await?;
        tracing::info!(table = %r.table_name, "table dropped");
    }
    Ok(())
}

/// Insert each resource's seed rows unless an identical row exists. Returns rows created.
pub async fn seed(store: &dyn RecordStore, resources: &[Arc<Resource>]) -> Result<usize, AppError> {
    let translator = FilterTranslator::new(store.operators());
    let mut session = store.session().await?;
    let mut created = 0;
    for r in resources {
        let records = Records::new(Arc::clone(r), translator.clone());
        for row in &r.seed {
            if records.find_one(&mut session, row).await?.is_none() {
                records.create(&mut session, row, false).await?;
                created += 1;
            }
        }
    }
    session.commit().await?;
    tracing::info!(created, "seed rows inserted");
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, ResourceConfig};
    use crate::store::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn seeding_twice_inserts_once() {
        let cfg: ResourceConfig = serde_json::from_value(json!({
            "name": "Book",
            "columns": [
                { "name": "id", "type": "integer" },
                { "name": "title", "type": "text", "nullable": false }
            ],
            "seed": [{ "title": "Dune" }, { "title": "Emma" }]
        }))
        .expect("config");
        let registry = resolve(&[cfg]).expect("resolve");
        let store = MemoryStore::new();
        store.create_tables(registry.resources()).await.unwrap();
        assert_eq!(seed(&store, registry.resources()).await.unwrap(), 2);
        assert_eq!(seed(&store, registry.resources()).await.unwrap(), 0);
        assert_eq!(store.committed_len("book"), 2);
    }

    #[test]
    fn ddl_for_a_resource() {
        let cfg: ResourceConfig = serde_json::from_value(json!({
            "name": "Book",
            "columns": [
                { "name": "id", "type": "integer" },
                { "name": "title", "type": "text", "nullable": false },
                { "name": "in_print", "type": "boolean", "default": "TRUE" }
            ]
        }))
        .expect("config");
        let book = resolve(&[cfg]).expect("resolve").by_segment("book").expect("book");
        assert_eq!(
            create_table_sql(&book),
            "CREATE TABLE IF NOT EXISTS \"book\" (\n  \"id\" SERIAL PRIMARY KEY,\n  \
             \"title\" text NOT NULL,\n  \"in_print\" boolean DEFAULT TRUE\n)"
        );
        assert_eq!(drop_table_sql(&book), "DROP TABLE IF EXISTS \"book\" CASCADE");
    }
}
