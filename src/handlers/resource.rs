//! Resource handlers: index, create, read, update (PUT/PATCH), delete.

use crate::config::Resource;
use crate::context::RequestContext;
use crate::error::AppError;
use crate::filter::{parse_filters, Filter, FilterError};
use crate::i18n::HttpVerb;
use crate::pagination::PageRequest;
use crate::record::{Record, RecordId};
use crate::response::{Envelope, ResponseBuilder};
use crate::schema::ResourceSchema;
use crate::service::ResourceService;
use crate::state::AppState;
use crate::store::Session;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::Response,
};
use serde_json::Value;
use std::sync::Arc;

type Outcome = Result<(StatusCode, Envelope), AppError>;

/// Turn a handler outcome into the HTTP response. The only place errors become envelopes.
fn respond(ctx: &RequestContext, outcome: Outcome) -> Response {
    match outcome {
        Ok((status, envelope)) => envelope.into_response_with(status),
        Err(err) => {
            if err.is_server_error() {
                tracing::error!(request_id = %ctx.id, kind = err.kind(), error = %err, "request failed");
            } else {
                tracing::debug!(request_id = %ctx.id, kind = err.kind(), error = %err, "request rejected");
            }
            let (envelope, status) = ResponseBuilder::new(ctx).error(&err);
            envelope.into_response_with(status)
        }
    }
}

fn resource_for(
    state: &AppState,
    ctx: &mut RequestContext,
    segment: &str,
    operation: &str,
) -> Result<Arc<Resource>, AppError> {
    let resource = state
        .resource(segment)
        .ok_or_else(|| AppError::NotFound(format!("resource {}", segment)))?;
    ctx.set_api_version(&resource.api_version);
    if !resource.allows(operation) {
        return Err(AppError::BadRequest("unsupported_operation".into()));
    }
    Ok(resource)
}

/// Echo the path id in `params` (as a number when it is one) and parse it.
fn item_id(ctx: &mut RequestContext, raw: &str) -> Result<RecordId, AppError> {
    let parsed = raw.parse::<RecordId>();
    let echoed = match &parsed {
        Ok(id) => Value::from(*id),
        Err(_) => Value::String(raw.to_string()),
    };
    ctx.merge_params([("id".to_string(), echoed)]);
    parsed
}

/// Missing, empty, malformed or `null` bodies are all rejected with `empty_key`.
fn parse_body(body: &Bytes, empty_key: &str) -> Result<Value, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(AppError::BadRequest(empty_key.into()));
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Null) | Err(_) => Err(AppError::BadRequest(empty_key.into())),
        Ok(v) => Ok(v),
    }
}

fn filters_param(ctx: &RequestContext) -> Result<Vec<Filter>, AppError> {
    match ctx.query().get("filters") {
        None => Ok(Vec::new()),
        Some(raw) => {
            let value: Value = serde_json::from_str(raw)
                .map_err(|_| FilterError::InvalidFilters(format!("'{}'", raw)))?;
            Ok(parse_filters(&value)?)
        }
    }
}

async fn get_or_not_found(
    service: &ResourceService,
    session: &mut Session,
    id: RecordId,
) -> Result<Record, AppError> {
    service
        .get_by_id(session, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{} {}", service.resource().name, id)))
}

pub async fn index(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    Path(segment): Path<String>,
) -> Response {
    let outcome = async {
        let resource = resource_for(&state, &mut ctx, &segment, "list")?;
        let page = PageRequest::from_params(&ctx.query(), state.settings.default_items_per_page)?;
        let filters = filters_param(&ctx)?;
        let service = state.service(Arc::clone(&resource));
        let query = service.list(&filters)?;
        let mut session = state.store.session().await?;
        let envelope = ResponseBuilder::new(&ctx)
            .paginated(&mut session, &query, &ResourceSchema::new(resource), page)
            .await?;
        Ok::<_, AppError>((StatusCode::OK, envelope))
    }
    .await;
    respond(&ctx, outcome)
}

pub async fn create(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    Path(segment): Path<String>,
    body: Bytes,
) -> Response {
    let outcome = async {
        let resource = resource_for(&state, &mut ctx, &segment, "create")?;
        let body = parse_body(&body, "empty_post_body")?;
        let schema = ResourceSchema::new(Arc::clone(&resource));
        let data = schema.load(&body, false)?;
        let service = state.service(resource);
        let mut session = state.store.session().await?;
        let item = service.create(&mut session, &data).await?;
        tracing::info!(request_id = %ctx.id, resource = %segment, id = %item.id(), "created");
        Ok::<_, AppError>((StatusCode::CREATED, ResponseBuilder::new(&ctx).single(&item, &schema)))
    }
    .await;
    respond(&ctx, outcome)
}

pub async fn read(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    Path((segment, raw_id)): Path<(String, String)>,
) -> Response {
    let outcome = async {
        let id = item_id(&mut ctx, &raw_id);
        let resource = resource_for(&state, &mut ctx, &segment, "read")?;
        let id = id?;
        let service = state.service(Arc::clone(&resource));
        let mut session = state.store.session().await?;
        let item = get_or_not_found(&service, &mut session, id).await?;
        Ok::<_, AppError>((StatusCode::OK, ResponseBuilder::new(&ctx).single(&item, &ResourceSchema::new(resource))))
    }
    .await;
    respond(&ctx, outcome)
}

async fn update_with(
    state: &AppState,
    ctx: &mut RequestContext,
    segment: &str,
    raw_id: &str,
    body: &Bytes,
    partial: bool,
) -> Outcome {
    let id = item_id(ctx, raw_id);
    let resource = resource_for(state, ctx, segment, "update")?;
    let id = id?;
    let body = parse_body(body, "empty_put_body")?;
    let schema = ResourceSchema::new(Arc::clone(&resource));
    let data = schema.load(&body, partial)?;
    let service = state.service(resource);
    let mut session = state.store.session().await?;
    let item = get_or_not_found(&service, &mut session, id).await?;
    let item = service.update(&mut session, &item, &data).await?;
    tracing::info!(request_id = %ctx.id, resource = %segment, id = %item.id(), "updated");
    Ok((StatusCode::OK, ResponseBuilder::new(ctx).single(&item, &schema)))
}

pub async fn replace(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    Path((segment, raw_id)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let outcome = update_with(&state, &mut ctx, &segment, &raw_id, &body, false).await;
    respond(&ctx, outcome)
}

pub async fn patch(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    Path((segment, raw_id)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let outcome = update_with(&state, &mut ctx, &segment, &raw_id, &body, true).await;
    respond(&ctx, outcome)
}

pub async fn delete(
    State(state): State<AppState>,
    mut ctx: RequestContext,
    Path((segment, raw_id)): Path<(String, String)>,
) -> Response {
    let outcome = async {
        let id = item_id(&mut ctx, &raw_id);
        let resource = resource_for(&state, &mut ctx, &segment, "delete")?;
        let id = id?;
        let service = state.service(Arc::clone(&resource));
        let mut session = state.store.session().await?;
        let item = get_or_not_found(&service, &mut session, id).await?;
        service.delete(&mut session, &item).await?;
        tracing::info!(request_id = %ctx.id, resource = %segment, id = %id, "deleted");
        Ok::<_, AppError>((StatusCode::OK, ResponseBuilder::new(&ctx).success(&resource, HttpVerb::Delete)))
    }
    .await;
    respond(&ctx, outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bodies_that_count_as_empty() {
        for raw in ["", "  \n", "null", "{not json"] {
            let err = parse_body(&Bytes::from(raw), "empty_post_body").unwrap_err();
            assert_eq!(err.message_key(), "empty_post_body", "{:?}", raw);
        }
        assert!(parse_body(&Bytes::from("{}"), "empty_post_body").is_ok());
    }

    #[test]
    fn filters_come_from_a_json_query_parameter() {
        let mut params = serde_json::Map::new();
        params.insert("filters".into(), Value::String(r#"[["title","like","%a%"]]"#.into()));
        let ctx = RequestContext::new(params, Default::default());
        let filters = filters_param(&ctx).unwrap();
        assert_eq!(filters, vec![Filter::new("title", "like", "%a%")]);

        let mut params = serde_json::Map::new();
        params.insert("filters".into(), Value::String("title".into()));
        let ctx = RequestContext::new(params, Default::default());
        assert!(matches!(filters_param(&ctx), Err(AppError::Filter(FilterError::InvalidFilters(_)))));
    }

    #[test]
    fn item_ids_are_echoed() {
        let mut ctx = RequestContext::new(serde_json::Map::new(), Default::default());
        assert_eq!(item_id(&mut ctx, "7").unwrap(), RecordId(7));
        assert_eq!(ctx.params["id"], Value::from(7));
        assert!(matches!(item_id(&mut ctx, "seven"), Err(AppError::InvalidId(_))));
        assert_eq!(ctx.params["id"], Value::from("seven"));
    }
}
