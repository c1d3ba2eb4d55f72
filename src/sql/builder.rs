//! Builds parameterized SELECT, COUNT, INSERT, UPDATE, DELETE from a resolved resource.

use crate::config::{ColumnInfo, ColumnType, Resource};
use crate::filter::Predicate;
use crate::sql::PgBindValue;
use crate::store::{Query, Row};
use serde_json::Value;

/// Quote identifier for PostgreSQL (safe: only from config).
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

#[derive(Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<PgBindValue>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf::default()
    }

    /// Push a value and return its placeholder, cast to the column type (e.g. `$2::timestamptz`).
    fn push_param(&mut self, column_type: ColumnType, v: &Value) -> String {
        self.params.push(PgBindValue::for_column(column_type, v));
        format!("${}::{}", self.params.len(), column_type.pg_type())
    }
}

fn select_column_list(resource: &Resource) -> String {
    resource
        .columns
        .iter()
        .map(|c| quoted(&c.name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn column_type(resource: &Resource, name: &str) -> ColumnType {
    resource
        .column(name)
        .map(|c| c.column_type)
        .unwrap_or(ColumnType::Text)
}

fn condition(q: &mut QueryBuf, resource: &Resource, predicate: &Predicate) -> String {
    let col = quoted(predicate.column());
    let ty = column_type(resource, predicate.column());
    match predicate {
        Predicate::Compare { cmp, value, .. } => {
            let ph = q.push_param(ty, value);
            format!("{} {} {}", col, cmp.sql(), ph)
        }
        Predicate::IsNull { negated: false, .. } => format!("{} IS NULL", col),
        Predicate::IsNull { negated: true, .. } => format!("{} IS NOT NULL", col),
        Predicate::In { values, negated, .. } if values.is_empty() => {
            if *negated { "1 = 1".into() } else { "1 = 0".into() }
        }
        Predicate::In { values, negated, .. } => {
            let placeholders: Vec<String> = values.iter().map(|v| q.push_param(ty, v)).collect();
            let not = if *negated { "NOT " } else { "" };
            format!("{} {}IN ({})", col, not, placeholders.join(", "))
        }
        Predicate::Like {
            pattern,
            case_insensitive,
            negated,
            ..
        } => {
            let ph = q.push_param(ColumnType::Text, &Value::String(pattern.clone()));
            let not = if *negated { "NOT " } else { "" };
            let op = if *case_insensitive { "ILIKE" } else { "LIKE" };
            format!("{}::text {}{} {}", col, not, op, ph)
        }
    }
}

fn where_clause(q: &mut QueryBuf, resource: &Resource, predicates: &[Predicate]) -> String {
    if predicates.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = predicates.iter().map(|p| condition(q, resource, p)).collect();
    format!(" WHERE {}", parts.join(" AND "))
}

fn range_clause(query: &Query) -> String {
    match query.limit() {
        Some(limit) => format!(" LIMIT {} OFFSET {}", limit, query.offset()),
        None => String::new(),
    }
}

/// SELECT with the query's predicates, ORDER BY pk, then LIMIT/OFFSET when sliced.
pub fn select(query: &Query) -> QueryBuf {
    let resource = query.resource();
    let mut q = QueryBuf::new();
    let where_sql = where_clause(&mut q, resource, query.predicates());
    q.sql = format!(
        "SELECT {} FROM {}{} ORDER BY {}{}",
        select_column_list(resource),
        quoted(&resource.table_name),
        where_sql,
        quoted(&resource.primary_key),
        range_clause(query)
    );
    q
}

/// COUNT(*) of the selection. A sliced query counts the rows inside the slice.
pub fn count(query: &Query) -> QueryBuf {
    let resource = query.resource();
    let mut q = QueryBuf::new();
    let where_sql = where_clause(&mut q, resource, query.predicates());
    let table = quoted(&resource.table_name);
    q.sql = if query.range().is_some() {
        format!(
            "SELECT COUNT(*) FROM (SELECT 1 FROM {}{} ORDER BY {}{}) sub",
            table,
            where_sql,
            quoted(&resource.primary_key),
            range_clause(query)
        )
    } else {
        format!("SELECT COUNT(*) FROM {}{}", table, where_sql)
    };
    q
}

/// SELECT by primary key.
pub fn select_by_id(resource: &Resource, id: i64) -> QueryBuf {
    let mut q = QueryBuf::new();
    let pk = primary_key_type(resource);
    let ph = q.push_param(pk, &Value::from(id));
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} = {}",
        select_column_list(resource),
        quoted(&resource.table_name),
        quoted(&resource.primary_key),
        ph
    );
    q
}

/// INSERT: columns present in `fields`, plus NULL for omitted columns without a default.
/// Omitted columns with a default (serial key, SQL default) are left to the database.
pub fn insert(resource: &Resource, fields: &Row) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for c in &resource.columns {
        let value = match fields.get(&c.name) {
            Some(v) => v.clone(),
            None if c.has_default => continue,
            None => Value::Null,
        };
        placeholders.push(q.push_param(c.column_type, &value));
        cols.push(quoted(&c.name));
    }
    let table = quoted(&resource.table_name);
    let returning = select_column_list(resource);
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table, returning)
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            table,
            cols.join(", "),
            placeholders.join(", "),
            returning
        )
    };
    q
}

/// UPDATE by id: SET only known, non-key columns present in `fields`. With nothing to set
/// this degrades to a SELECT by id so callers still get the current row back.
pub fn update(resource: &Resource, id: i64, fields: &Row) -> QueryBuf {
    let settable: Vec<(&ColumnInfo, &Value)> = fields
        .iter()
        .filter(|(k, _)| **k != resource.primary_key)
        .filter_map(|(k, v)| resource.column(k).map(|c| (c, v)))
        .collect();
    if settable.is_empty() {
        return select_by_id(resource, id);
    }
    let mut q = QueryBuf::new();
    let sets: Vec<String> = settable
        .into_iter()
        .map(|(c, v)| format!("{} = {}", quoted(&c.name), q.push_param(c.column_type, v)))
        .collect();
    let id_ph = q.push_param(primary_key_type(resource), &Value::from(id));
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = {} RETURNING {}",
        quoted(&resource.table_name),
        sets.join(", "),
        quoted(&resource.primary_key),
        id_ph,
        select_column_list(resource)
    );
    q
}

/// DELETE by id.
pub fn delete(resource: &Resource, id: i64) -> QueryBuf {
    let mut q = QueryBuf::new();
    let ph = q.push_param(primary_key_type(resource), &Value::from(id));
    q.sql = format!(
        "DELETE FROM {} WHERE {} = {} RETURNING {}",
        quoted(&resource.table_name),
        quoted(&resource.primary_key),
        ph,
        quoted(&resource.primary_key)
    );
    q
}

fn primary_key_type(resource: &Resource) -> ColumnType {
    column_type(resource, &resource.primary_key)
}
