//! Router assembly: common endpoints plus the generic resource routes under the prefix.

mod common;
mod resource;

pub use common::common_routes;
pub use resource::{resource_routes, route_table, RouteEntry};

use crate::context::request_context;
use crate::state::AppState;
use axum::{middleware, Router};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Full application router with request context, body limit and request tracing.
pub fn app(state: AppState) -> Router {
    let base = state.settings.route_base();
    let resources = resource_routes(state.clone());
    let api = if base.is_empty() {
        resources
    } else {
        Router::new().nest(&base, resources)
    };
    Router::new()
        .merge(common_routes(state.clone()))
        .merge(api)
        .layer(middleware::from_fn_with_state(state.clone(), request_context))
        .layer(RequestBodyLimitLayer::new(state.settings.body_limit_bytes))
        .layer(TraceLayer::new_for_http())
}
