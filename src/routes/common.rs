//! Service endpoints outside the API prefix: liveness, readiness against the store, version.

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;

#[derive(Serialize)]
struct Status {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    store: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    resources: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VersionInfo {
    name: &'static str,
    version: &'static str,
    route_prefix: String,
}

async fn health() -> Json<Status> {
    Json(Status {
        status: "ok",
        store: None,
        resources: None,
    })
}

/// 200 when the store answers a ping, 503 otherwise.
async fn ready(State(state): State<AppState>) -> (StatusCode, Json<Status>) {
    let store = state.store.name();
    let (code, status) = match state.store.ping().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(err) => {
            tracing::warn!(store, error = %err, "readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    };
    let body = Status {
        status,
        store: Some(store),
        resources: Some(state.registry.resources().len()),
    };
    (code, Json(body))
}

async fn version(State(state): State<AppState>) -> Json<VersionInfo> {
    Json(VersionInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        route_prefix: state.settings.route_base(),
    })
}

pub fn common_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/version", get(version))
        .with_state(state)
}
