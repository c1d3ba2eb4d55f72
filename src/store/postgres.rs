//! PostgreSQL store over a sqlx pool. Each session lazily opens one transaction.

use super::{Query, RecordStore, Row, Session, StoreSession};
use crate::config::Resource;
use crate::error::{AppError, ConfigError};
use crate::filter::FilterOp;
use crate::migration;
use crate::sql::{self, QueryBuf};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{ConnectOptions, Postgres, Transaction};
use std::str::FromStr;
use std::sync::Arc;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    echo: bool,
}

impl PgStore {
    pub fn new(pool: PgPool, echo: bool) -> Self {
        PgStore { pool, echo }
    }

    pub async fn connect(database_url: &str, max_connections: u32, echo: bool) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(PgStore::new(pool, echo))
    }
}

#[async_trait]
impl RecordStore for PgStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn operators(&self) -> &[FilterOp] {
        &FilterOp::ALL
    }

    async fn session(&self) -> Result<Session, AppError> {
        Ok(Session::new(Box::new(PgSession {
            pool: self.pool.clone(),
            tx: None,
            echo: self.echo,
        })))
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn create_tables(&self, resources: &[Arc<Resource>]) -> Result<(), AppError> {
        migration::apply_migrations(&self.pool, resources).await
    }

    async fn drop_tables(&self, resources: &[Arc<Resource>]) -> Result<(), AppError> {
        migration::drop_tables(&self.pool, resources).await
    }
}

struct PgSession {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
    echo: bool,
}

impl PgSession {
    async fn tx(&mut self) -> Result<&mut Transaction<'static, Postgres>, AppError> {
        if self.tx.is_none() {
            self.tx = Some(self.pool.begin().await?);
        }
        self.tx
            .as_mut()
            .ok_or_else(|| AppError::Programming("transaction not open".into()))
    }

    fn log(&self, q: &QueryBuf) {
        if self.echo {
            tracing::info!(sql = %q.sql, params = ?q.params, "query");
        } else {
            tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        }
    }

    async fn fetch_optional(&mut self, q: QueryBuf) -> Result<Option<Row>, AppError> {
        self.log(&q);
        let tx = self.tx().await?;
        let mut query = sqlx::query(&q.sql);
        for p in q.params.iter().cloned() {
            query = query.bind(p);
        }
        let row = query.fetch_optional(&mut **tx).await?;
        Ok(row.map(|r| row_to_json(&r)))
    }
}

#[async_trait]
impl StoreSession for PgSession {
    async fn count(&mut self, query: &Query) -> Result<u64, AppError> {
        let q = sql::count(query);
        self.log(&q);
        let tx = self.tx().await?;
        let mut scalar = sqlx::query_scalar::<_, i64>(&q.sql);
        for p in q.params.iter().cloned() {
            scalar = scalar.bind(p);
        }
        let n = scalar.fetch_one(&mut **tx).await?;
        Ok(n.max(0) as u64)
    }

    async fn fetch(&mut self, query: &Query) -> Result<Vec<Row>, AppError> {
        let q = sql::select(query);
        self.log(&q);
        let tx = self.tx().await?;
        let mut select = sqlx::query(&q.sql);
        for p in q.params.iter().cloned() {
            select = select.bind(p);
        }
        let rows = select.fetch_all(&mut **tx).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn get(&mut self, resource: &Resource, id: i64) -> Result<Option<Row>, AppError> {
        self.fetch_optional(sql::select_by_id(resource, id)).await
    }

    async fn insert(&mut self, resource: &Resource, fields: &Row) -> Result<Row, AppError> {
        self.fetch_optional(sql::insert(resource, fields))
            .await?
            .ok_or_else(|| AppError::Programming(format!("insert into {} returned no row", resource.table_name)))
    }

    async fn update(&mut self, resource: &Resource, id: i64, fields: &Row) -> Result<Option<Row>, AppError> {
        self.fetch_optional(sql::update(resource, id, fields)).await
    }

    async fn delete(&mut self, resource: &Resource, id: i64) -> Result<bool, AppError> {
        Ok(self.fetch_optional(sql::delete(resource, id)).await?.is_some())
    }

    async fn commit(&mut self) -> Result<(), AppError> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), AppError> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }
}

/// Create the database named in `database_url` if it does not exist, via the `postgres` database.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), AppError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url)
        .map_err(|e| ConfigError::Load(format!("invalid DATABASE_URL: {}", e)))?;
    let mut conn: sqlx::PgConnection = opts.connect().await?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if !exists.0 {
        sqlx::query(&format!("CREATE DATABASE {}", sql::quoted(&db_name)))
            .execute(&mut conn)
            .await?;
        tracing::info!(database = %db_name, "database created");
    }
    Ok(())
}

/// Drop the database named in `database_url`, if it exists.
pub async fn drop_database(database_url: &str) -> Result<(), AppError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url)
        .map_err(|e| ConfigError::Load(format!("invalid DATABASE_URL: {}", e)))?;
    let mut conn: sqlx::PgConnection = opts.connect().await?;
    sqlx::query(&format!("DROP DATABASE IF EXISTS {}", sql::quoted(&db_name)))
        .execute(&mut conn)
        .await?;
    tracing::info!(database = %db_name, "database dropped");
    Ok(())
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), AppError> {
    let path_start = url
        .rfind('/')
        .ok_or_else(|| ConfigError::Load("DATABASE_URL: no path".into()))?
        + 1;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let db_name = path_and_query.split('?').next().unwrap_or("").trim();
    let base = url.get(..path_start).unwrap_or(url);
    Ok((format!("{}postgres", base), db_name.to_string()))
}

fn row_to_json(row: &PgRow) -> Row {
    use sqlx::Column;
    use sqlx::Row as _;
    row.columns()
        .iter()
        .map(|col| (col.name().to_string(), cell_to_value(row, col.name())))
        .collect()
}

fn cell_to_value(row: &PgRow, name: &str) -> Value {
    use sqlx::Row as _;
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f32>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n as f64) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<serde_json::Value>, _>(name) {
        return j;
    }
    Value::Null
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_url_points_at_postgres_database() {
        let (admin, name) = parse_db_name_from_url("postgres://u:p@localhost:5432/library?sslmode=disable").unwrap();
        assert_eq!(admin, "postgres://u:p@localhost:5432/postgres");
        assert_eq!(name, "library");
    }
}
