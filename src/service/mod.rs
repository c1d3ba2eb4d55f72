//! ResourceService: the operations controllers call, over the records of one resource.

mod validation;
pub use validation::RequestValidator;

use crate::config::Resource;
use crate::error::AppError;
use crate::filter::{Filter, FilterTranslator};
use crate::record::{Record, RecordId, Records};
use crate::store::{Query, Row, Session};
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct ResourceService {
    records: Records,
}

impl ResourceService {
    pub fn new(resource: Arc<Resource>, translator: FilterTranslator) -> Self {
        ResourceService {
            records: Records::new(resource, translator),
        }
    }

    pub fn resource(&self) -> &Arc<Resource> {
        self.records.resource()
    }

    pub async fn get_by_id(&self, session: &mut Session, id: RecordId) -> Result<Option<Record>, AppError> {
        self.records.get_by_id(session, id).await
    }

    /// Unsliced query over all records matching `filters`.
    pub fn list(&self, filters: &[Filter]) -> Result<Query, AppError> {
        self.records.filter(filters)
    }

    pub async fn create(&self, session: &mut Session, data: &Row) -> Result<Record, AppError> {
        self.records.create(session, data, true).await
    }

    pub async fn update(&self, session: &mut Session, item: &Record, data: &Row) -> Result<Record, AppError> {
        self.records.update(session, item, data, true).await
    }

    pub async fn delete(&self, session: &mut Session, item: &Record) -> Result<(), AppError> {
        self.records.delete(session, item, true).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, ResourceConfig};
    use crate::store::{MemoryStore, RecordStore};
    use serde_json::json;

    #[tokio::test]
    async fn service_round_trip() {
        let cfg: ResourceConfig = serde_json::from_value(json!({
            "name": "Book",
            "columns": [
                { "name": "id", "type": "integer" },
                { "name": "title", "type": "text", "nullable": false }
            ]
        }))
        .expect("config");
        let book = resolve(&[cfg]).expect("resolve").by_segment("book").expect("book");
        let service = ResourceService::new(book, FilterTranslator::default());
        let store = MemoryStore::new();
        let mut s = store.session().await.unwrap();

        let data = json!({ "title": "Dune" }).as_object().cloned().unwrap();
        let created = service.create(&mut s, &data).await.unwrap();
        assert_eq!(store.committed_len("book"), 1);

        let fetched = service.get_by_id(&mut s, created.id()).await.unwrap().expect("book");
        let patch = json!({ "title": "Emma" }).as_object().cloned().unwrap();
        let updated = service.update(&mut s, &fetched, &patch).await.unwrap();
        assert_eq!(updated.get("title"), Some(&json!("Emma")));

        let query = service.list(&[Filter::new("title", "eq", "Emma")]).unwrap();
        assert_eq!(query.count(&mut s).await.unwrap(), 1);

        service.delete(&mut s, &updated).await.unwrap();
        assert_eq!(store.committed_len("book"), 0);
    }
}
