//! rest-scaffold: generic CRUD REST scaffold driven by JSON resource definitions.

pub mod case;
pub mod config;
pub mod context;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod i18n;
pub mod migration;
pub mod pagination;
pub mod record;
pub mod response;
pub mod routes;
pub mod schema;
pub mod service;
pub mod settings;
pub mod sql;
pub mod state;
pub mod store;
pub mod telemetry;

pub use config::{load_registry, resolve, Resource, ResourceConfig, ResourceRegistry};
pub use context::RequestContext;
pub use error::{AppError, ConfigError, FieldError};
pub use filter::{Filter, FilterOp, FilterTranslator, Predicate};
pub use migration::{apply_migrations, seed};
pub use pagination::{compute as compute_pagination, PageRequest, Pagination};
pub use record::{Record, RecordId, Records};
pub use response::{Envelope, Payload, ResponseBuilder};
pub use routes::{app, common_routes, resource_routes, route_table};
pub use schema::ResourceSchema;
pub use service::ResourceService;
pub use settings::{Environment, Settings, StoreKind};
pub use state::AppState;
pub use store::{drop_database, ensure_database_exists, MemoryStore, PgStore, Query, RecordStore, Session};
