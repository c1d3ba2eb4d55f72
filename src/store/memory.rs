//! In-process store. Tables are created on first use; each session reads a private working
//! copy and replays its writes onto the shared tables on commit. Updates and deletes only
//! touch rows that are still committed (or that the session inserted itself), so a row
//! deleted by another session stays deleted.

use super::{Query, RecordStore, Row, Session, StoreSession};
use crate::config::{ColumnInfo, Resource};
use crate::error::AppError;
use crate::filter::{Comparison, FilterOp, Predicate};
use async_trait::async_trait;
use regex::RegexBuilder;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock};

#[derive(Clone, Debug, Default)]
struct Table {
    next_id: i64,
    rows: BTreeMap<i64, Row>,
}

type Tables = HashMap<String, Table>;

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Committed row count of a table (0 when absent).
    pub fn committed_len(&self, table: &str) -> usize {
        self.tables
            .read()
            .map(|t| t.get(table).map(|t| t.rows.len()).unwrap_or(0))
            .unwrap_or(0)
    }
}

fn poisoned<T>(_: T) -> AppError {
    AppError::Programming("memory store lock poisoned".into())
}

#[async_trait]
impl RecordStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn operators(&self) -> &[FilterOp] {
        &FilterOp::ALL
    }

    async fn session(&self) -> Result<Session, AppError> {
        Ok(Session::new(Box::new(MemorySession {
            shared: Arc::clone(&self.tables),
            working: None,
            log: Vec::new(),
            inserted: HashSet::new(),
        })))
    }

    async fn ping(&self) -> Result<(), AppError> {
        self.tables.read().map(|_| ()).map_err(poisoned)
    }

    async fn create_tables(&self, resources: &[Arc<Resource>]) -> Result<(), AppError> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        for r in resources {
            tables.entry(r.table_name.clone()).or_default();
        }
        Ok(())
    }

    async fn drop_tables(&self, resources: &[Arc<Resource>]) -> Result<(), AppError> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        for r in resources {
            tables.remove(&r.table_name);
        }
        Ok(())
    }
}

#[derive(Debug)]
enum Change {
    Insert { table: String, id: i64, row: Row },
    Update { table: String, id: i64, fields: Row },
    Delete { table: String, id: i64 },
}

struct MemorySession {
    shared: Arc<RwLock<Tables>>,
    working: Option<Tables>,
    log: Vec<Change>,
    /// Rows inserted by this session and not yet committed.
    inserted: HashSet<(String, i64)>,
}

impl MemorySession {
    fn working(&mut self) -> Result<&mut Tables, AppError> {
        if self.working.is_none() {
            let snapshot = self.shared.read().map_err(poisoned)?.clone();
            self.working = Some(snapshot);
        }
        self.working
            .as_mut()
            .ok_or_else(|| AppError::Programming("memory session has no working copy".into()))
    }

    fn table(&mut self, name: &str) -> Result<&mut Table, AppError> {
        Ok(self.working()?.entry(name.to_string()).or_default())
    }

    /// Reserve an id on the shared table so concurrent sessions never hand out the same key.
    fn next_id(&self, table: &str) -> Result<i64, AppError> {
        let mut shared = self.shared.write().map_err(poisoned)?;
        let t = shared.entry(table.to_string()).or_default();
        let max_committed = t.rows.keys().next_back().copied().unwrap_or(0);
        t.next_id = t.next_id.max(max_committed) + 1;
        Ok(t.next_id)
    }

    /// Whether `id` is still visible to writes: committed, or inserted by this session.
    /// A row that vanished from the shared table is dropped from the working copy too.
    fn still_present(&mut self, table: &str, id: i64) -> Result<bool, AppError> {
        if self.inserted.contains(&(table.to_string(), id)) {
            return Ok(true);
        }
        let committed = self
            .shared
            .read()
            .map_err(poisoned)?
            .get(table)
            .is_some_and(|t| t.rows.contains_key(&id));
        if !committed {
            self.table(table)?.rows.remove(&id);
        }
        Ok(committed)
    }

    fn selected(&mut self, query: &Query) -> Result<Vec<Row>, AppError> {
        let resource = Arc::clone(query.resource());
        let table = self.table(&resource.table_name)?;
        let matching = table
            .rows
            .values()
            .filter(|row| query.predicates().iter().all(|p| matches(row, p)));
        let (start, stop) = query.range().unwrap_or((0, u64::MAX));
        Ok(matching
            .skip(start as usize)
            .take(stop.saturating_sub(start).min(usize::MAX as u64) as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl StoreSession for MemorySession {
    async fn count(&mut self, query: &Query) -> Result<u64, AppError> {
        Ok(self.selected(query)?.len() as u64)
    }

    async fn fetch(&mut self, query: &Query) -> Result<Vec<Row>, AppError> {
        self.selected(query)
    }

    async fn get(&mut self, resource: &Resource, id: i64) -> Result<Option<Row>, AppError> {
        Ok(self.table(&resource.table_name)?.rows.get(&id).cloned())
    }

    async fn insert(&mut self, resource: &Resource, fields: &Row) -> Result<Row, AppError> {
        let id = match fields.get(&resource.primary_key).and_then(Value::as_i64) {
            Some(id) => id,
            None => self.next_id(&resource.table_name)?,
        };
        let mut row = Row::new();
        for c in &resource.columns {
            let value = if c.is_primary_key {
                Value::from(id)
            } else {
                match fields.get(&c.name) {
                    Some(v) => v.clone(),
                    None => default_value(c),
                }
            };
            check_not_null(resource, c, &value)?;
            row.insert(c.name.clone(), value);
        }
        let table = self.table(&resource.table_name)?;
        if table.rows.contains_key(&id) {
            return Err(AppError::Programming(format!(
                "duplicate key value violates unique constraint on {}.{}",
                resource.table_name, resource.primary_key
            )));
        }
        table.rows.insert(id, row.clone());
        self.inserted.insert((resource.table_name.clone(), id));
        self.log.push(Change::Insert {
            table: resource.table_name.clone(),
            id,
            row: row.clone(),
        });
        Ok(row)
    }

    async fn update(&mut self, resource: &Resource, id: i64, fields: &Row) -> Result<Option<Row>, AppError> {
        if !self.still_present(&resource.table_name, id)? {
            return Ok(None);
        }
        let mut changed = Row::new();
        for (k, v) in fields {
            if *k == resource.primary_key {
                continue;
            }
            if let Some(c) = resource.column(k) {
                check_not_null(resource, c, v)?;
                changed.insert(k.clone(), v.clone());
            }
        }
        let table = self.table(&resource.table_name)?;
        let Some(row) = table.rows.get_mut(&id) else {
            return Ok(None);
        };
        row.extend(changed.clone());
        let row = row.clone();
        self.log.push(Change::Update {
            table: resource.table_name.clone(),
            id,
            fields: changed,
        });
        Ok(Some(row))
    }

    async fn delete(&mut self, resource: &Resource, id: i64) -> Result<bool, AppError> {
        if !self.still_present(&resource.table_name, id)? {
            return Ok(false);
        }
        let table = self.table(&resource.table_name)?;
        let deleted = table.rows.remove(&id).is_some();
        if deleted {
            self.log.push(Change::Delete {
                table: resource.table_name.clone(),
                id,
            });
        }
        Ok(deleted)
    }

    async fn commit(&mut self) -> Result<(), AppError> {
        if !self.log.is_empty() {
            let mut shared = self.shared.write().map_err(poisoned)?;
            for change in self.log.drain(..) {
                match change {
                    Change::Insert { table, id, row } => {
                        shared.entry(table).or_default().rows.insert(id, row);
                    }
                    // Rows deleted by another session since stay deleted.
                    Change::Update { table, id, fields } => {
                        if let Some(row) = shared.get_mut(&table).and_then(|t| t.rows.get_mut(&id)) {
                            row.extend(fields);
                        }
                    }
                    Change::Delete { table, id } => {
                        if let Some(t) = shared.get_mut(&table) {
                            t.rows.remove(&id);
                        }
                    }
                }
            }
        }
        self.inserted.clear();
        self.working = None;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), AppError> {
        self.log.clear();
        self.inserted.clear();
        self.working = None;
        Ok(())
    }
}

fn check_not_null(resource: &Resource, column: &ColumnInfo, value: &Value) -> Result<(), AppError> {
    if value.is_null() && !column.nullable {
        return Err(AppError::Programming(format!(
            "null value in column {}.{} violates not-null constraint",
            resource.table_name, column.name
        )));
    }
    Ok(())
}

/// Evaluate the handful of SQL default expressions a resource file may declare.
fn default_value(column: &ColumnInfo) -> Value {
    let Some(expr) = column.default_expression.as_deref() else {
        return Value::Null;
    };
    let trimmed = expr.trim();
    match trimmed.to_ascii_uppercase().as_str() {
        "NOW()" | "CURRENT_TIMESTAMP" => return Value::String(chrono::Utc::now().to_rfc3339()),
        "CURRENT_DATE" => return Value::String(chrono::Utc::now().date_naive().to_string()),
        "TRUE" => return Value::Bool(true),
        "FALSE" => return Value::Bool(false),
        "NULL" => return Value::Null,
        _ => {}
    }
    if let Some(text) = trimmed.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        return Value::String(text.replace("''", "'"));
    }
    serde_json::from_str::<Value>(trimmed).unwrap_or(Value::Null)
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ if a == b => Some(Ordering::Equal),
        _ => None,
    }
}

/// SQL semantics: comparisons against NULL are never true.
fn matches(row: &Row, predicate: &Predicate) -> bool {
    let cell = row.get(predicate.column()).filter(|v| !v.is_null());
    match predicate {
        Predicate::IsNull { negated, .. } => cell.is_none() == !negated,
        Predicate::Compare { cmp, value, .. } => {
            let Some(ord) = cell.and_then(|c| compare(c, value)) else {
                return false;
            };
            match cmp {
                Comparison::Eq => ord == Ordering::Equal,
                Comparison::Ne => ord != Ordering::Equal,
                Comparison::Lt => ord == Ordering::Less,
                Comparison::Le => ord != Ordering::Greater,
                Comparison::Gt => ord == Ordering::Greater,
                Comparison::Ge => ord != Ordering::Less,
            }
        }
        Predicate::In { values, negated, .. } if values.is_empty() => *negated,
        Predicate::In { values, negated, .. } => match cell {
            Some(c) => values.iter().any(|v| compare(c, v) == Some(Ordering::Equal)) != *negated,
            None => false,
        },
        Predicate::Like {
            pattern,
            case_insensitive,
            negated,
            ..
        } => {
            let text = match cell {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => return false,
            };
            like(pattern, &text, *case_insensitive) != *negated
        }
    }
}

/// `%` matches any run of characters, `_` exactly one.
fn like(pattern: &str, text: &str, case_insensitive: bool) -> bool {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    for c in pattern.chars() {
        match c {
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    RegexBuilder::new(&re)
        .case_insensitive(case_insensitive)
        .dot_matches_new_line(true)
        .build()
        .map(|re| re.is_match(text))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, ResourceConfig};
    use serde_json::json;

    fn resource() -> Arc<Resource> {
        let cfg: ResourceConfig = serde_json::from_value(json!({
            "name": "Dummy",
            "columns": [
                { "name": "id", "type": "integer" },
                { "name": "txt", "type": "text" },
                { "name": "active", "type": "boolean", "nullable": false, "default": "TRUE" }
            ]
        }))
        .expect("config");
        resolve(&[cfg]).expect("resolve").by_segment("dummy").expect("dummy")
    }

    fn row(pairs: Value) -> Row {
        pairs.as_object().cloned().expect("object")
    }

    #[test]
    fn like_translates_wildcards() {
        assert!(like("%_1%", "obj_1", false));
        assert!(!like("%_1%", "obj_2", false));
        assert!(like("a.c", "a.c", false));
        assert!(!like("a.c", "abc", false));
        assert!(like("OBJ%", "obj_3", true));
        assert!(!like("OBJ%", "obj_3", false));
    }

    #[test]
    fn comparisons_with_null_never_match() {
        let r = row(json!({ "id": 1, "txt": null }));
        let p = Predicate::Compare { column: "txt".into(), cmp: Comparison::Ne, value: json!("x") };
        assert!(!matches(&r, &p));
        assert!(matches(&r, &Predicate::IsNull { column: "txt".into(), negated: false }));
        let notin = Predicate::In { column: "txt".into(), values: vec![json!("x")], negated: true };
        assert!(!matches(&r, &notin));
    }

    #[tokio::test]
    async fn writes_are_invisible_to_other_sessions_until_commit() {
        let store = MemoryStore::new();
        let resource = resource();
        let mut writer = store.session().await.expect("session");
        let created = writer
            .insert(&resource, &row(json!({ "txt": "a" })))
            .await
            .expect("insert");
        assert_eq!(created["id"], json!(1));
        assert_eq!(created["active"], json!(true));
        assert_eq!(store.committed_len("dummy"), 0);

        let mut reader = store.session().await.expect("session");
        assert_eq!(Query::new(Arc::clone(&resource)).count(&mut reader).await.expect("count"), 0);

        writer.commit().await.expect("commit");
        assert_eq!(store.committed_len("dummy"), 1);
        let mut reader = store.session().await.expect("session");
        assert_eq!(Query::new(resource).count(&mut reader).await.expect("count"), 1);
    }

    #[tokio::test]
    async fn rollback_discards_writes_and_ids_stay_unique() {
        let store = MemoryStore::new();
        let resource = resource();
        let mut s = store.session().await.expect("session");
        s.insert(&resource, &row(json!({ "txt": "a" }))).await.expect("insert");
        s.rollback().await.expect("rollback");
        let second = s.insert(&resource, &row(json!({ "txt": "b" }))).await.expect("insert");
        s.commit().await.expect("commit");
        assert_eq!(second["id"], json!(2));
        assert_eq!(store.committed_len("dummy"), 1);
    }

    #[tokio::test]
    async fn a_row_deleted_elsewhere_is_not_brought_back() {
        let store = MemoryStore::new();
        let resource = resource();
        let mut setup = store.session().await.expect("session");
        setup.insert(&resource, &row(json!({ "txt": "a" }))).await.expect("insert");
        setup.commit().await.expect("commit");

        let mut a = store.session().await.expect("session");
        assert!(Query::new(Arc::clone(&resource)).get(&mut a, 1).await.expect("get").is_some());

        let mut b = store.session().await.expect("session");
        assert!(b.delete(&resource, 1).await.expect("delete"));
        b.commit().await.expect("commit");
        assert_eq!(store.committed_len("dummy"), 0);

        let updated = a.update(&resource, 1, &row(json!({ "txt": "b" }))).await.expect("update");
        assert!(updated.is_none());
        assert!(!a.delete(&resource, 1).await.expect("delete"));
        a.commit().await.expect("commit");
        assert_eq!(store.committed_len("dummy"), 0);
    }

    #[tokio::test]
    async fn concurrent_updates_merge_by_column() {
        let store = MemoryStore::new();
        let resource = resource();
        let mut setup = store.session().await.expect("session");
        setup.insert(&resource, &row(json!({ "txt": "a" }))).await.expect("insert");
        setup.commit().await.expect("commit");

        let mut a = store.session().await.expect("session");
        let mut b = store.session().await.expect("session");
        a.update(&resource, 1, &row(json!({ "txt": "from a" }))).await.expect("update");
        b.update(&resource, 1, &row(json!({ "active": false }))).await.expect("update");
        b.commit().await.expect("commit");
        a.commit().await.expect("commit");

        let mut reader = store.session().await.expect("session");
        let stored = Query::new(resource).get(&mut reader, 1).await.expect("get").expect("row");
        assert_eq!(stored["txt"], json!("from a"));
        assert_eq!(stored["active"], json!(false));
    }

    #[tokio::test]
    async fn own_inserts_can_be_updated_before_commit() {
        let store = MemoryStore::new();
        let resource = resource();
        let mut s = store.session().await.expect("session");
        s.insert(&resource, &row(json!({ "txt": "a" }))).await.expect("insert");
        let updated = s.update(&resource, 1, &row(json!({ "txt": "b" }))).await.expect("update");
        assert_eq!(updated.expect("row")["txt"], json!("b"));
        s.commit().await.expect("commit");
        let mut reader = store.session().await.expect("session");
        let stored = Query::new(resource).get(&mut reader, 1).await.expect("get").expect("row");
        assert_eq!(stored["txt"], json!("b"));
    }

    #[tokio::test]
    async fn not_null_is_enforced() {
        let store = MemoryStore::new();
        let resource = resource();
        let mut s = store.session().await.expect("session");
        let err = s
            .insert(&resource, &row(json!({ "txt": "a", "active": null })))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Programming(_)));
    }

    #[test]
    fn default_expressions() {
        let mut c = resource().column("active").cloned().expect("column");
        assert_eq!(default_value(&c), json!(true));
        c.default_expression = Some("'it''s'".into());
        assert_eq!(default_value(&c), json!("it's"));
        c.default_expression = Some("42".into());
        assert_eq!(default_value(&c), json!(42));
        c.default_expression = Some("now()".into());
        assert!(default_value(&c).is_string());
    }
}
