//! Declarative filters: `(field, operator, value)` triples translated into typed predicates.
//!
//! Operators form a closed set. Each store advertises which of them it can evaluate and the
//! translator is built once from that capability list, so an operator a store cannot run is
//! rejected the same way as an unknown token.

use crate::config::{ColumnInfo, ColumnType, Resource};
use serde_json::{Number, Value};
use std::fmt;
use thiserror::Error;

/// Literal accepted in place of a JSON `null` by equality filters.
pub const NULL_SENTINEL: &str = "null";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Like,
    ILike,
    NotLike,
}

impl FilterOp {
    pub const ALL: [FilterOp; 11] = [
        FilterOp::Eq,
        FilterOp::Ne,
        FilterOp::Lt,
        FilterOp::Le,
        FilterOp::Gt,
        FilterOp::Ge,
        FilterOp::In,
        FilterOp::NotIn,
        FilterOp::Like,
        FilterOp::ILike,
        FilterOp::NotLike,
    ];

    /// Resolve an operator token. Symbolic and suffixed spellings map to the same operator.
    pub fn parse(token: &str) -> Option<FilterOp> {
        let token = token.trim().trim_end_matches('_').trim_start_matches("__");
        let token = token.trim_end_matches("__");
        Some(match token.to_ascii_lowercase().as_str() {
            "eq" | "=" | "==" => FilterOp::Eq,
            "ne" | "neq" | "!=" | "<>" => FilterOp::Ne,
            "lt" | "<" => FilterOp::Lt,
            "le" | "lte" | "<=" => FilterOp::Le,
            "gt" | ">" => FilterOp::Gt,
            "ge" | "gte" | ">=" => FilterOp::Ge,
            "in" => FilterOp::In,
            "notin" | "not_in" => FilterOp::NotIn,
            "like" => FilterOp::Like,
            "ilike" => FilterOp::ILike,
            "notlike" | "not_like" => FilterOp::NotLike,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Ne => "ne",
            FilterOp::Lt => "lt",
            FilterOp::Le => "le",
            FilterOp::Gt => "gt",
            FilterOp::Ge => "ge",
            FilterOp::In => "in",
            FilterOp::NotIn => "notin",
            FilterOp::Like => "like",
            FilterOp::ILike => "ilike",
            FilterOp::NotLike => "notlike",
        }
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    pub fn sql(self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Ne => "<>",
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
        }
    }
}

/// A boolean condition over one column of a resource.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    Compare {
        column: String,
        cmp: Comparison,
        value: Value,
    },
    IsNull {
        column: String,
        negated: bool,
    },
    In {
        column: String,
        values: Vec<Value>,
        negated: bool,
    },
    Like {
        column: String,
        pattern: String,
        case_insensitive: bool,
        negated: bool,
    },
}

impl Predicate {
    pub fn column(&self) -> &str {
        match self {
            Predicate::Compare { column, .. }
            | Predicate::IsNull { column, .. }
            | Predicate::In { column, .. }
            | Predicate::Like { column, .. } => column,
        }
    }

    pub fn eq(column: impl Into<String>, value: Value) -> Predicate {
        let column = column.into();
        if value.is_null() {
            Predicate::IsNull {
                column,
                negated: false,
            }
        } else {
            Predicate::Compare {
                column,
                cmp: Comparison::Eq,
                value,
            }
        }
    }
}

/// One raw filter triple.
#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: String,
    pub value: Value,
}

impl Filter {
    pub fn new(field: impl Into<String>, op: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter {
            field: field.into(),
            op: op.into(),
            value: value.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("invalid filters: expected a list of [field, operator, value] triples, got {0}")]
    InvalidFilters(String),
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
    #[error("invalid filter column: {0}")]
    UnknownColumn(String),
    #[error("invalid filter operator: {0}")]
    UnknownOperator(String),
    #[error("invalid filter value for column {column}: {value}")]
    InvalidValue { column: String, value: String },
}

/// Parse filters from dynamic JSON, e.g. the `filters` query parameter.
pub fn parse_filters(value: &Value) -> Result<Vec<Filter>, FilterError> {
    let items = value
        .as_array()
        .ok_or_else(|| FilterError::InvalidFilters(json_kind(value).into()))?;
    items.iter().map(parse_filter).collect()
}

fn parse_filter(item: &Value) -> Result<Filter, FilterError> {
    let triple = match item.as_array() {
        Some(t) if t.len() == 3 => t,
        _ => return Err(FilterError::InvalidFilter(item.to_string())),
    };
    let field = triple[0]
        .as_str()
        .ok_or_else(|| FilterError::InvalidFilter(item.to_string()))?;
    let op = triple[1]
        .as_str()
        .ok_or_else(|| FilterError::InvalidFilter(item.to_string()))?;
    Ok(Filter::new(field, op, triple[2].clone()))
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Clone, Debug)]
pub struct FilterTranslator {
    supported: Vec<FilterOp>,
}

impl Default for FilterTranslator {
    fn default() -> Self {
        FilterTranslator::new(&FilterOp::ALL)
    }
}

impl FilterTranslator {
    pub fn new(supported: &[FilterOp]) -> Self {
        FilterTranslator {
            supported: supported.to_vec(),
        }
    }

    pub fn supports(&self, op: FilterOp) -> bool {
        self.supported.contains(&op)
    }

    /// Translate every filter; the resulting predicates are meant to be AND-ed in order.
    pub fn translate(&self, resource: &Resource, filters: &[Filter]) -> Result<Vec<Predicate>, FilterError> {
        filters.iter().map(|f| self.predicate(resource, f)).collect()
    }

    pub fn predicate(&self, resource: &Resource, filter: &Filter) -> Result<Predicate, FilterError> {
        let column = resource
            .column(&filter.field)
            .filter(|c| c.filterable)
            .ok_or_else(|| FilterError::UnknownColumn(filter.field.clone()))?;
        let op = FilterOp::parse(&filter.op)
            .filter(|op| self.supports(*op))
            .ok_or_else(|| FilterError::UnknownOperator(filter.op.clone()))?;

        let name = column.name.clone();
        let predicate = match op {
            FilterOp::In | FilterOp::NotIn => {
                let raw: Vec<Value> = match &filter.value {
                    Value::Array(items) => items.clone(),
                    Value::String(s) => s.split(',').map(|p| Value::String(p.to_string())).collect(),
                    other => vec![other.clone()],
                };
                let values = raw
                    .iter()
                    .map(|v| coerce(column, v))
                    .collect::<Result<Vec<_>, _>>()?;
                Predicate::In {
                    column: name,
                    values,
                    negated: op == FilterOp::NotIn,
                }
            }
            FilterOp::Like | FilterOp::ILike | FilterOp::NotLike => {
                let pattern = match (&filter.value, column.column_type.is_textual()) {
                    (Value::String(s), true) => s.clone(),
                    _ => return Err(invalid_value(column, &filter.value)),
                };
                Predicate::Like {
                    column: name,
                    pattern,
                    case_insensitive: op == FilterOp::ILike,
                    negated: op == FilterOp::NotLike,
                }
            }
            FilterOp::Eq | FilterOp::Ne if is_null(&filter.value) => Predicate::IsNull {
                column: name,
                negated: op == FilterOp::Ne,
            },
            _ => {
                let cmp = match op {
                    FilterOp::Eq => Comparison::Eq,
                    FilterOp::Ne => Comparison::Ne,
                    FilterOp::Lt => Comparison::Lt,
                    FilterOp::Le => Comparison::Le,
                    FilterOp::Gt => Comparison::Gt,
                    _ => Comparison::Ge,
                };
                Predicate::Compare {
                    column: name,
                    cmp,
                    value: coerce(column, &filter.value)?,
                }
            }
        };
        Ok(predicate)
    }
}

fn is_null(v: &Value) -> bool {
    v.is_null() || v.as_str() == Some(NULL_SENTINEL)
}

fn invalid_value(column: &ColumnInfo, v: &Value) -> FilterError {
    FilterError::InvalidValue {
        column: column.name.clone(),
        value: v.to_string(),
    }
}

/// Coerce a raw filter value to the column's type (`"2"` becomes `2` for integer columns).
pub fn coerce(column: &ColumnInfo, v: &Value) -> Result<Value, FilterError> {
    let out = match (column.column_type, v) {
        (ColumnType::Integer | ColumnType::BigInt, Value::Number(n)) => n.as_i64().map(Value::from),
        (ColumnType::Integer | ColumnType::BigInt, Value::String(s)) => {
            s.trim().parse::<i64>().ok().map(Value::from)
        }
        (ColumnType::Float, Value::Number(n)) => Some(Value::Number(n.clone())),
        (ColumnType::Float, Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
        (ColumnType::Bool, Value::Bool(b)) => Some(Value::Bool(*b)),
        (ColumnType::Bool, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(Value::Bool(true)),
            "false" | "0" => Some(Value::Bool(false)),
            _ => None,
        },
        (ColumnType::Uuid, Value::String(s)) => uuid::Uuid::parse_str(s.trim())
            .ok()
            .map(|u| Value::String(u.to_string())),
        (ColumnType::Text, Value::Number(n)) => Some(Value::String(n.to_string())),
        (ColumnType::Text | ColumnType::Timestamp | ColumnType::Date, Value::String(s)) => {
            Some(Value::String(s.clone()))
        }
        (ColumnType::Json, other) if !other.is_null() => Some(other.clone()),
        _ => None,
    };
    out.ok_or_else(|| invalid_value(column, v))
}
