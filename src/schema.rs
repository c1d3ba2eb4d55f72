//! Per-resource (de)serialization: camelCase on the wire, snake_case columns in the store.

use crate::case::{keys_to_camel_case, to_camel_case, to_snake_case};
use crate::config::{ColumnInfo, ColumnType, Resource};
use crate::error::{AppError, FieldError};
use crate::record::{integral_f64, Record};
use crate::service::RequestValidator;
use crate::store::Row;
use serde_json::{Number, Value};
use std::sync::Arc;

pub const UNKNOWN_FIELD: &str = "Unknown field.";
pub const MISSING_FIELD: &str = "Missing data for required field.";
pub const NULL_FIELD: &str = "Field may not be null.";

#[derive(Clone, Debug)]
pub struct ResourceSchema {
    resource: Arc<Resource>,
}

impl ResourceSchema {
    pub fn new(resource: Arc<Resource>) -> Self {
        ResourceSchema { resource }
    }

    pub fn resource(&self) -> &Arc<Resource> {
        &self.resource
    }

    pub fn dump(&self, record: &Record) -> Value {
        self.dump_row(record.values())
    }

    pub fn dump_row(&self, row: &Row) -> Value {
        Value::Object(keys_to_camel_case(row.clone()))
    }

    /// Validate a request body and return it as a snake_case row.
    ///
    /// `partial` loads skip the required-field check (PATCH). All problems are collected
    /// into one validation error keyed by the client-facing field name.
    pub fn load(&self, body: &Value, partial: bool) -> Result<Row, AppError> {
        let obj = body
            .as_object()
            .ok_or_else(|| AppError::field("_schema", "Invalid input type."))?;
        let mut errors = Vec::new();
        let mut row = Row::new();
        for (key, value) in obj {
            let name = to_snake_case(key);
            let column = match self.resource.column(&name) {
                Some(c) if !c.is_primary_key => c,
                _ => {
                    errors.push(FieldError::new(key.clone(), UNKNOWN_FIELD));
                    continue;
                }
            };
            match deserialize(column, value) {
                Ok(v) => {
                    if let Some(rule) = self.resource.validation.get(&column.name) {
                        for message in RequestValidator::check(&v, rule) {
                            errors.push(FieldError::new(key.clone(), message));
                        }
                    }
                    row.insert(name, v);
                }
                Err(message) => errors.push(FieldError::new(key.clone(), message)),
            }
        }
        if !partial {
            for c in self.resource.columns.iter().filter(|c| !c.is_primary_key) {
                if !row.contains_key(&c.name) && self.is_required(c) && !errors_for(&errors, &c.name) {
                    errors.push(FieldError::new(to_camel_case(&c.name), MISSING_FIELD));
                }
            }
        }
        if errors.is_empty() {
            Ok(row)
        } else {
            Err(AppError::validation(errors))
        }
    }

    fn is_required(&self, column: &ColumnInfo) -> bool {
        let by_rule = self
            .resource
            .validation
            .get(&column.name)
            .and_then(|r| r.required)
            .unwrap_or(false);
        by_rule || (!column.nullable && !column.has_default)
    }
}

fn errors_for(errors: &[FieldError], column: &str) -> bool {
    errors.iter().any(|e| to_snake_case(&e.field) == column)
}

fn deserialize(column: &ColumnInfo, v: &Value) -> Result<Value, &'static str> {
    if v.is_null() {
        return if column.nullable { Ok(Value::Null) } else { Err(NULL_FIELD) };
    }
    match column.column_type {
        ColumnType::Integer | ColumnType::BigInt => match v {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().and_then(integral_f64))
                .map(Value::from)
                .ok_or("Not a valid integer."),
            Value::String(s) => s.trim().parse::<i64>().map(Value::from).map_err(|_| "Not a valid integer."),
            _ => Err("Not a valid integer."),
        },
        ColumnType::Float => match v {
            Value::Number(_) => Ok(v.clone()),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or("Not a valid number."),
            _ => Err("Not a valid number."),
        },
        ColumnType::Text => v.as_str().map(|_| v.clone()).ok_or("Not a valid string."),
        ColumnType::Bool => match v {
            Value::Bool(_) => Ok(v.clone()),
            Value::Number(n) if n.as_i64() == Some(1) => Ok(Value::Bool(true)),
            Value::Number(n) if n.as_i64() == Some(0) => Ok(Value::Bool(false)),
            Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "t" | "yes" | "y" | "on" | "1" => Ok(Value::Bool(true)),
                "false" | "f" | "no" | "n" | "off" | "0" => Ok(Value::Bool(false)),
                _ => Err("Not a valid boolean."),
            },
            _ => Err("Not a valid boolean."),
        },
        ColumnType::Uuid => v
            .as_str()
            .and_then(|s| uuid::Uuid::parse_str(s).ok())
            .map(|u| Value::String(u.to_string()))
            .ok_or("Not a valid UUID."),
        ColumnType::Timestamp => v
            .as_str()
            .and_then(parse_datetime)
            .map(Value::String)
            .ok_or("Not a valid datetime."),
        ColumnType::Date => v
            .as_str()
            .and_then(|s| chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
            .map(|d| Value::String(d.to_string()))
            .ok_or("Not a valid date."),
        ColumnType::Json => Ok(v.clone()),
    }
}

/// RFC 3339, or a naive ISO 8601 datetime taken as UTC.
fn parse_datetime(s: &str) -> Option<String> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&chrono::Utc).to_rfc3339());
    }
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc().to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, ResourceConfig};
    use serde_json::json;

    fn schema() -> ResourceSchema {
        let cfg: ResourceConfig = serde_json::from_value(json!({
            "name": "Book",
            "columns": [
                { "name": "id", "type": "integer" },
                { "name": "title", "type": "text", "nullable": false },
                { "name": "page_count", "type": "integer" },
                { "name": "published_at", "type": "timestamptz" },
                { "name": "in_print", "type": "boolean", "nullable": false, "default": "TRUE" }
            ],
            "validation": { "title": { "max_length": 5 } }
        }))
        .expect("config");
        ResourceSchema::new(resolve(&[cfg]).expect("resolve").by_segment("book").expect("book"))
    }

    fn messages(err: AppError) -> Vec<(String, String)> {
        err.field_errors()
            .expect("field errors")
            .into_iter()
            .map(|e| (e.field, e.message))
            .collect()
    }

    #[test]
    fn load_accepts_camel_case_and_returns_columns() {
        let row = schema()
            .load(&json!({ "title": "Dune", "pageCount": "412", "inPrint": "false" }), false)
            .expect("load");
        assert_eq!(row["page_count"], json!(412));
        assert_eq!(row["in_print"], json!(false));
    }

    #[test]
    fn load_collects_every_problem() {
        let err = schema()
            .load(&json!({ "id": 3, "colour": "red", "pageCount": "many", "inPrint": null }), false)
            .unwrap_err();
        let mut got = messages(err);
        got.sort();
        assert_eq!(
            got,
            vec![
                ("colour".to_string(), UNKNOWN_FIELD.to_string()),
                ("id".to_string(), UNKNOWN_FIELD.to_string()),
                ("inPrint".to_string(), NULL_FIELD.to_string()),
                ("pageCount".to_string(), "Not a valid integer.".to_string()),
                ("title".to_string(), MISSING_FIELD.to_string()),
            ]
        );
    }

    #[test]
    fn partial_load_skips_required_but_applies_rules() {
        let s = schema();
        assert!(s.load(&json!({ "pageCount": 3 }), true).is_ok());
        let err = s.load(&json!({ "title": "Too long" }), true).unwrap_err();
        assert_eq!(
            messages(err),
            vec![("title".to_string(), "Longer than maximum length 5.".to_string())]
        );
    }

    #[test]
    fn integers_outside_the_i64_range_are_rejected() {
        let s = schema();
        for count in [json!(1e20), json!(-1e19), json!(9.3e18), json!(2.5)] {
            let err = s.load(&json!({ "pageCount": count }), true).unwrap_err();
            assert_eq!(
                messages(err),
                vec![("pageCount".to_string(), "Not a valid integer.".to_string())],
                "{}",
                count
            );
        }
        let row = s.load(&json!({ "pageCount": 4.0e3 }), true).expect("load");
        assert_eq!(row["page_count"], json!(4000));
    }

    #[test]
    fn non_object_body_is_rejected() {
        let err = schema().load(&json!([1, 2]), false).unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[test]
    fn timestamps_are_normalized() {
        let row = schema()
            .load(&json!({ "title": "Emma", "publishedAt": "1815-12-23T00:00:00" }), false)
            .expect("load");
        assert_eq!(row["published_at"], json!("1815-12-23T00:00:00+00:00"));
    }

    #[test]
    fn dump_rewrites_keys() {
        let mut row = Row::new();
        row.insert("page_count".into(), json!(1));
        assert_eq!(schema().dump_row(&row), json!({ "pageCount": 1 }));
    }
}
