//! Backing store: a lazily evaluated query object and per-request sessions.
//!
//! Every read and write goes through a [`Session`], which owns one open transaction.
//! Writes stay pending until [`Session::commit`]; dropping a session discards them.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::{drop_database, ensure_database_exists, PgStore};

use crate::config::Resource;
use crate::error::AppError;
use crate::filter::{FilterOp, Predicate};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

/// One stored row, keyed by column name.
pub type Row = Map<String, Value>;

#[async_trait]
pub trait RecordStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// Filter operators this store can evaluate.
    fn operators(&self) -> &[FilterOp];

    async fn session(&self) -> Result<Session, AppError>;

    async fn ping(&self) -> Result<(), AppError>;

    async fn create_tables(&self, resources: &[Arc<Resource>]) -> Result<(), AppError>;

    async fn drop_tables(&self, resources: &[Arc<Resource>]) -> Result<(), AppError>;
}

/// Store-specific half of a session. Implementations hold one transaction at a time and
/// start the next one after `commit`/`rollback`.
#[async_trait]
pub trait StoreSession: Send {
    async fn count(&mut self, query: &Query) -> Result<u64, AppError>;
    async fn fetch(&mut self, query: &Query) -> Result<Vec<Row>, AppError>;
    async fn get(&mut self, resource: &Resource, id: i64) -> Result<Option<Row>, AppError>;
    async fn insert(&mut self, resource: &Resource, fields: &Row) -> Result<Row, AppError>;
    async fn update(&mut self, resource: &Resource, id: i64, fields: &Row) -> Result<Option<Row>, AppError>;
    async fn delete(&mut self, resource: &Resource, id: i64) -> Result<bool, AppError>;
    async fn commit(&mut self) -> Result<(), AppError>;
    async fn rollback(&mut self) -> Result<(), AppError>;
}

pub struct Session {
    inner: Box<dyn StoreSession>,
    pending: usize,
}

impl Session {
    pub fn new(inner: Box<dyn StoreSession>) -> Self {
        Session { inner, pending: 0 }
    }

    /// Number of writes not yet committed.
    pub fn pending(&self) -> usize {
        self.pending
    }

    pub async fn commit(&mut self) -> Result<(), AppError> {
        self.inner.commit().await?;
        self.pending = 0;
        Ok(())
    }

    pub async fn rollback(&mut self) -> Result<(), AppError> {
        self.inner.rollback().await?;
        self.pending = 0;
        Ok(())
    }

    pub(crate) async fn insert(&mut self, resource: &Resource, fields: &Row) -> Result<Row, AppError> {
        let row = self.inner.insert(resource, fields).await?;
        self.pending += 1;
        Ok(row)
    }

    pub(crate) async fn update(
        &mut self,
        resource: &Resource,
        id: i64,
        fields: &Row,
    ) -> Result<Option<Row>, AppError> {
        let row = self.inner.update(resource, id, fields).await?;
        self.pending += 1;
        Ok(row)
    }

    pub(crate) async fn delete(&mut self, resource: &Resource, id: i64) -> Result<bool, AppError> {
        let deleted = self.inner.delete(resource, id).await?;
        self.pending += 1;
        Ok(deleted)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.pending > 0 {
            tracing::debug!(pending = self.pending, "session dropped with uncommitted writes");
        }
    }
}

/// A filtered, optionally sliced selection of one resource's rows, ordered by primary key.
#[derive(Clone, Debug)]
pub struct Query {
    resource: Arc<Resource>,
    predicates: Vec<Predicate>,
    range: Option<(u64, u64)>,
}

impl Query {
    pub fn new(resource: Arc<Resource>) -> Self {
        Query {
            resource,
            predicates: Vec::new(),
            range: None,
        }
    }

    pub fn resource(&self) -> &Arc<Resource> {
        &self.resource
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Zero-based half-open `[start, stop)` row range, if sliced.
    pub fn range(&self) -> Option<(u64, u64)> {
        self.range
    }

    /// Add a predicate; all predicates are combined with AND.
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Restrict to rows `[start, stop)` of the current selection. Slicing a slice narrows it.
    pub fn slice(mut self, start: u64, stop: u64) -> Self {
        let stop = stop.max(start);
        self.range = Some(match self.range {
            None => (start, stop),
            Some((base, end)) => (base.saturating_add(start).min(end), base.saturating_add(stop).min(end)),
        });
        self
    }

    pub fn limit(&self) -> Option<u64> {
        self.range.map(|(start, stop)| stop - start)
    }

    pub fn offset(&self) -> u64 {
        self.range.map(|(start, _)| start).unwrap_or(0)
    }

    pub async fn count(&self, session: &mut Session) -> Result<u64, AppError> {
        session.inner.count(self).await
    }

    pub async fn all(&self, session: &mut Session) -> Result<Vec<Row>, AppError> {
        session.inner.fetch(self).await
    }

    pub async fn first(&self, session: &mut Session) -> Result<Option<Row>, AppError> {
        let rows = self.clone().slice(0, 1).all(session).await?;
        Ok(rows.into_iter().next())
    }

    /// Fetch by primary key, ignoring predicates and range.
    pub async fn get(&self, session: &mut Session, id: i64) -> Result<Option<Row>, AppError> {
        session.inner.get(&self.resource, id).await
    }
}
