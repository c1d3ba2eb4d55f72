//! Records of one resource and the CRUD operations on them.

use crate::config::Resource;
use crate::error::AppError;
use crate::filter::{Filter, FilterTranslator, Predicate};
use crate::store::{Query, Row, Session};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Primary key of a record: a non-negative integer, or a string of ASCII digits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(pub i64);

impl RecordId {
    pub fn from_json(v: &Value) -> Result<Self, AppError> {
        match v {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().and_then(integral_f64))
                .map(RecordId)
                .ok_or_else(|| AppError::InvalidId(n.to_string())),
            Value::String(s) => s.parse(),
            other => Err(AppError::InvalidId(other.to_string())),
        }
    }
}

/// `f` as an `i64` when it is a whole number inside the `i64` range.
pub(crate) fn integral_f64(f: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, which is already out of range.
    let in_range = f >= i64::MIN as f64 && f < i64::MAX as f64;
    (f.fract() == 0.0 && in_range).then_some(f as i64)
}

impl FromStr for RecordId {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AppError::InvalidId(s.to_string()));
        }
        s.parse::<i64>()
            .map(RecordId)
            .map_err(|_| AppError::InvalidId(s.to_string()))
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<RecordId> for Value {
    fn from(id: RecordId) -> Value {
        Value::from(id.0)
    }
}

/// One stored row with its primary key pulled out.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    id: RecordId,
    values: Row,
}

impl Record {
    pub fn from_row(resource: &Resource, values: Row) -> Result<Self, AppError> {
        let id = values
            .get(&resource.primary_key)
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                AppError::Programming(format!("{} row without integer {}", resource.name, resource.primary_key))
            })?;
        Ok(Record {
            id: RecordId(id),
            values,
        })
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn values(&self) -> &Row {
        &self.values
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    pub fn into_values(self) -> Row {
        self.values
    }
}

/// CRUD over the records of one resource. Writes take a `commit` flag: `false` leaves the
/// change staged in the session for the caller to commit with other writes.
#[derive(Clone, Debug)]
pub struct Records {
    resource: Arc<Resource>,
    translator: FilterTranslator,
}

impl Records {
    pub fn new(resource: Arc<Resource>, translator: FilterTranslator) -> Self {
        Records { resource, translator }
    }

    pub fn resource(&self) -> &Arc<Resource> {
        &self.resource
    }

    pub fn all(&self) -> Query {
        Query::new(Arc::clone(&self.resource))
    }

    /// All rows matching every filter, in order.
    pub fn filter(&self, filters: &[Filter]) -> Result<Query, AppError> {
        let predicates = self.translator.translate(&self.resource, filters)?;
        Ok(predicates.into_iter().fold(self.all(), Query::filter))
    }

    pub async fn get_by_id(&self, session: &mut Session, id: RecordId) -> Result<Option<Record>, AppError> {
        let row = self.all().get(session, id.0).await?;
        row.map(|r| Record::from_row(&self.resource, r)).transpose()
    }

    /// First record whose columns equal `criteria`.
    pub async fn find_one(&self, session: &mut Session, criteria: &Row) -> Result<Option<Record>, AppError> {
        let mut query = self.all();
        for (k, v) in criteria {
            self.known_column(k)?;
            query = query.filter(Predicate::eq(k.clone(), v.clone()));
        }
        let row = query.first(session).await?;
        row.map(|r| Record::from_row(&self.resource, r)).transpose()
    }

    pub async fn find_or_create(&self, session: &mut Session, criteria: &Row, commit: bool) -> Result<Record, AppError> {
        match self.find_one(session, criteria).await? {
            Some(found) => Ok(found),
            None => self.create(session, criteria, commit).await,
        }
    }

    pub async fn create(&self, session: &mut Session, fields: &Row, commit: bool) -> Result<Record, AppError> {
        for k in fields.keys() {
            self.known_column(k)?;
        }
        let row = session.insert(&self.resource, fields).await?;
        if commit {
            session.commit().await?;
        }
        tracing::debug!(resource = %self.resource.name, commit, "record created");
        Record::from_row(&self.resource, row)
    }

    /// Set `fields` on `record`. Every key must name a column of the resource.
    pub async fn update(
        &self,
        session: &mut Session,
        record: &Record,
        fields: &Row,
        commit: bool,
    ) -> Result<Record, AppError> {
        for k in fields.keys() {
            self.known_column(k)?;
        }
        let row = session
            .update(&self.resource, record.id.0, fields)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} {}", self.resource.name, record.id)))?;
        if commit {
            session.commit().await?;
        }
        tracing::debug!(resource = %self.resource.name, id = %record.id, commit, "record updated");
        Record::from_row(&self.resource, row)
    }

    pub async fn delete(&self, session: &mut Session, record: &Record, commit: bool) -> Result<(), AppError> {
        if !session.delete(&self.resource, record.id.0).await? {
            return Err(AppError::NotFound(format!("{} {}", self.resource.name, record.id)));
        }
        if commit {
            session.commit().await?;
        }
        tracing::debug!(resource = %self.resource.name, id = %record.id, commit, "record deleted");
        Ok(())
    }

    fn known_column(&self, name: &str) -> Result<(), AppError> {
        if self.resource.has_column(name) {
            Ok(())
        } else {
            tracing::error!(resource = %self.resource.name, column = %name, "unknown column");
            Err(AppError::Programming(format!("{} has no column {}", self.resource.name, name)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, ResourceConfig};
    use crate::store::{MemoryStore, RecordStore};
    use serde_json::json;

    fn records() -> Records {
        let cfg: ResourceConfig = serde_json::from_value(json!({
            "name": "Dummy",
            "columns": [
                { "name": "id", "type": "integer" },
                { "name": "txt", "type": "text" }
            ]
        }))
        .expect("config");
        let resource = resolve(&[cfg]).expect("resolve").by_segment("dummy").expect("dummy");
        Records::new(resource, FilterTranslator::default())
    }

    fn row(v: Value) -> Row {
        v.as_object().cloned().expect("object")
    }

    async fn seeded(store: &MemoryStore, records: &Records) -> Session {
        let mut s = store.session().await.expect("session");
        for (i, txt) in ["obj_1", "obj_2", "obj_3"].iter().enumerate() {
            let fields = row(json!({ "txt": txt }));
            let last = i == 2;
            records.create(&mut s, &fields, last).await.expect("create");
        }
        s.insert(records.resource(), &row(json!({ "txt": null }))).await.expect("insert");
        s.commit().await.expect("commit");
        s
    }

    #[test]
    fn record_ids() {
        assert_eq!("12".parse::<RecordId>().unwrap(), RecordId(12));
        assert!("-1".parse::<RecordId>().is_err());
        assert!("1a".parse::<RecordId>().is_err());
        assert!("".parse::<RecordId>().is_err());
        assert_eq!(RecordId::from_json(&json!(4)).unwrap(), RecordId(4));
        assert_eq!(RecordId::from_json(&json!(4.0)).unwrap(), RecordId(4));
        assert!(matches!(RecordId::from_json(&json!(4.5)), Err(AppError::InvalidId(_))));
        assert!(matches!(RecordId::from_json(&json!(1e300)), Err(AppError::InvalidId(_))));
        assert!(matches!(RecordId::from_json(&json!(9.3e18)), Err(AppError::InvalidId(_))));
        assert!(matches!(RecordId::from_json(&json!([1])), Err(AppError::InvalidId(_))));
    }

    #[tokio::test]
    async fn filters_select_matching_records() {
        let store = MemoryStore::new();
        let records = records();
        let mut s = seeded(&store, &records).await;

        let q = records.filter(&[Filter::new("txt", "eq", "obj_2")]).unwrap();
        let rows = q.all(&mut s).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["txt"], json!("obj_2"));

        let as_list = records.filter(&[Filter::new("id", "in", json!([1, 2]))]).unwrap();
        let as_text = records.filter(&[Filter::new("id", "in", "1,2")]).unwrap();
        assert_eq!(as_list.all(&mut s).await.unwrap(), as_text.all(&mut s).await.unwrap());

        let nulls = records.filter(&[Filter::new("txt", "eq", "null")]).unwrap();
        let rows = nulls.all(&mut s).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0]["txt"].is_null());

        let combined = records
            .filter(&[Filter::new("id", "ge", 2), Filter::new("txt", "like", "%_3")])
            .unwrap();
        assert_eq!(combined.count(&mut s).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unknown_column_or_operator_is_rejected() {
        let records = records();
        assert!(matches!(
            records.filter(&[Filter::new("nope", "eq", 1)]),
            Err(AppError::Filter(crate::filter::FilterError::UnknownColumn(_)))
        ));
        assert!(matches!(
            records.filter(&[Filter::new("txt", "between", 1)]),
            Err(AppError::Filter(crate::filter::FilterError::UnknownOperator(_)))
        ));
    }

    #[tokio::test]
    async fn update_with_unknown_field_is_a_programming_error() {
        let store = MemoryStore::new();
        let records = records();
        let mut s = seeded(&store, &records).await;
        let record = records.get_by_id(&mut s, RecordId(1)).await.unwrap().expect("record");
        let err = records
            .update(&mut s, &record, &row(json!({ "colour": "red" })), true)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Programming(_)));

        let updated = records
            .update(&mut s, &record, &row(json!({ "txt": "changed" })), true)
            .await
            .unwrap();
        assert_eq!(updated.get("txt"), Some(&json!("changed")));
    }

    #[tokio::test]
    async fn staged_writes_wait_for_commit() {
        let store = MemoryStore::new();
        let records = records();
        let mut s = store.session().await.unwrap();
        records.create(&mut s, &row(json!({ "txt": "a" })), false).await.unwrap();
        records.create(&mut s, &row(json!({ "txt": "b" })), false).await.unwrap();
        assert_eq!(s.pending(), 2);
        assert_eq!(store.committed_len("dummy"), 0);
        s.commit().await.unwrap();
        assert_eq!(store.committed_len("dummy"), 2);
    }

    #[tokio::test]
    async fn find_or_create_and_delete() {
        let store = MemoryStore::new();
        let records = records();
        let mut s = store.session().await.unwrap();
        let criteria = row(json!({ "txt": "x" }));
        let first = records.find_or_create(&mut s, &criteria, true).await.unwrap();
        let again = records.find_or_create(&mut s, &criteria, true).await.unwrap();
        assert_eq!(first.id(), again.id());
        records.delete(&mut s, &first, true).await.unwrap();
        assert!(records.get_by_id(&mut s, first.id()).await.unwrap().is_none());
        assert!(matches!(
            records.delete(&mut s, &first, true).await,
            Err(AppError::NotFound(_))
        ));
    }
}
