//! Resource routes. Paths are parameterized; handlers resolve the resource by segment.

use crate::handlers::resource::{create, delete, index, patch, read, replace};
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn resource_routes(state: AppState) -> Router {
    Router::new()
        .route("/:resource", get(index).post(create))
        .route("/:resource/:id", get(read).put(replace).patch(patch).delete(delete))
        .with_state(state)
}

/// One line of the route listing printed by the `routes` command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteEntry {
    pub methods: &'static str,
    pub path: String,
    pub resource: String,
}

/// Concrete routes for every configured resource and allowed operation, sorted by path.
pub fn route_table(state: &AppState) -> Vec<RouteEntry> {
    let base = state.settings.route_base();
    let mut entries = Vec::new();
    for r in state.registry.resources() {
        let collection = format!("{}/{}", base, r.path_segment);
        let item = format!("{}/:id", collection);
        let mut push = |operation: &str, methods: &'static str, path: &str| {
            if r.allows(operation) {
                entries.push(RouteEntry {
                    methods,
                    path: path.to_string(),
                    resource: r.name.clone(),
                });
            }
        };
        push("list", "GET", &collection);
        push("create", "POST", &collection);
        push("read", "GET", &item);
        push("update", "PUT, PATCH", &item);
        push("delete", "DELETE", &item);
    }
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    entries
}
