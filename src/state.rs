//! Shared application state for all routes. Read-only after startup.

use crate::config::{Resource, ResourceRegistry};
use crate::filter::FilterTranslator;
use crate::service::ResourceService;
use crate::settings::Settings;
use crate::store::RecordStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub registry: Arc<ResourceRegistry>,
    pub settings: Arc<Settings>,
    /// Built once from the store's operator capabilities.
    pub filters: FilterTranslator,
}

impl AppState {
    pub fn new(store: Arc<dyn RecordStore>, registry: ResourceRegistry, settings: Settings) -> Self {
        let filters = FilterTranslator::new(store.operators());
        AppState {
            store,
            registry: Arc::new(registry),
            settings: Arc::new(settings),
            filters,
        }
    }

    pub fn resource(&self, segment: &str) -> Option<Arc<Resource>> {
        self.registry.by_segment(segment)
    }

    pub fn service(&self, resource: Arc<Resource>) -> ResourceService {
        ResourceService::new(resource, self.filters.clone())
    }
}
