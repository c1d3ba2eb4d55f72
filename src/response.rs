//! Response envelope: `{apiVersion, id, params, duration}` plus exactly one of
//! `data`, `error` or `success`.

use crate::config::Resource;
use crate::context::RequestContext;
use crate::error::{AppError, FieldError};
use crate::i18n::{self, HttpVerb};
use crate::pagination::{self, PageRequest};
use crate::record::Record;
use crate::schema::ResourceSchema;
use crate::store::{Query, Session};
use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Message {
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
    pub errors: Option<Vec<FieldError>>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedData {
    pub items_per_page: u64,
    pub current_item_count: u64,
    pub page_index: u64,
    pub start_index: u64,
    pub total_items: u64,
    pub total_pages: u64,
    pub items: Vec<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Payload {
    Data(Value),
    Error(ErrorBody),
    Success(Message),
}

impl Payload {
    /// Exactly one part must be set.
    pub fn from_parts(
        data: Option<Value>,
        success: Option<Message>,
        error: Option<ErrorBody>,
    ) -> Result<Payload, AppError> {
        match (data, success, error) {
            (Some(d), None, None) => Ok(Payload::Data(d)),
            (None, Some(s), None) => Ok(Payload::Success(s)),
            (None, None, Some(e)) => Ok(Payload::Error(e)),
            (d, s, e) => Err(AppError::Programming(format!(
                "envelope needs exactly one of data/success/error, got {}",
                [d.is_some(), s.is_some(), e.is_some()].iter().filter(|x| **x).count()
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub api_version: String,
    pub id: String,
    pub params: Map<String, Value>,
    pub duration: u64,
    #[serde(flatten)]
    pub payload: Payload,
}

impl Envelope {
    pub fn new(ctx: &RequestContext, payload: Payload) -> Self {
        Envelope {
            api_version: ctx.api_version.clone(),
            id: ctx.id.to_string(),
            params: ctx.params.clone(),
            duration: ctx.duration_ms(),
            payload,
        }
    }

    pub fn into_response_with(self, status: StatusCode) -> Response {
        (status, Json(self)).into_response()
    }
}

/// Builds envelopes for one request.
pub struct ResponseBuilder<'a> {
    ctx: &'a RequestContext,
}

impl<'a> ResponseBuilder<'a> {
    pub fn new(ctx: &'a RequestContext) -> Self {
        ResponseBuilder { ctx }
    }

    pub fn single(&self, record: &Record, schema: &ResourceSchema) -> Envelope {
        Envelope::new(self.ctx, Payload::Data(schema.dump(record)))
    }

    /// Count, compute the page, slice and serialize.
    pub async fn paginated(
        &self,
        session: &mut Session,
        query: &Query,
        schema: &ResourceSchema,
        page: PageRequest,
    ) -> Result<Envelope, AppError> {
        let total_items = query.count(session).await?;
        let p = pagination::compute(page.page_index, page.start_index, page.items_per_page, total_items)?;
        let (start, stop) = p.offset_range();
        let slice = query.clone().slice(start, stop);
        let current_item_count = slice.count(session).await?;
        let rows = slice.all(session).await?;
        let data = PaginatedData {
            items_per_page: page.items_per_page,
            current_item_count,
            page_index: p.page_index,
            start_index: p.start_index,
            total_items,
            total_pages: p.total_pages,
            items: rows.iter().map(|r| schema.dump_row(r)).collect(),
        };
        let data = serde_json::to_value(data).map_err(|e| AppError::Programming(e.to_string()))?;
        Ok(Envelope::new(self.ctx, Payload::Data(data)))
    }

    pub fn error(&self, err: &AppError) -> (Envelope, StatusCode) {
        let status = err.status();
        let body = ErrorBody {
            code: status.as_u16(),
            message: i18n::translate(self.ctx.locale, &err.message_key()),
            errors: err.field_errors(),
        };
        (Envelope::new(self.ctx, Payload::Error(body)), status)
    }

    /// Localized "<Resource> successfully <verb>".
    pub fn success(&self, resource: &Resource, verb: HttpVerb) -> Envelope {
        let message = i18n::success_message(self.ctx.locale, &resource.i18n_key(), verb);
        Envelope::new(self.ctx, Payload::Success(Message { message }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, ResourceConfig};
    use crate::i18n::Locale;
    use crate::store::{MemoryStore, RecordStore};
    use serde_json::json;
    use std::sync::Arc;

    fn ctx() -> RequestContext {
        let mut ctx = RequestContext::new(Map::new(), Locale::En);
        ctx.set_api_version("1.0");
        ctx
    }

    fn book() -> Arc<Resource> {
        let cfg: ResourceConfig = serde_json::from_value(json!({
            "name": "Book",
            "columns": [
                { "name": "id", "type": "integer" },
                { "name": "title", "type": "text" }
            ]
        }))
        .expect("config");
        resolve(&[cfg]).expect("resolve").by_segment("book").expect("book")
    }

    #[test]
    fn payload_parts_are_mutually_exclusive() {
        let msg = Message { message: "ok".into() };
        let err = ErrorBody { code: 400, message: "bad".into(), errors: None };
        assert!(Payload::from_parts(None, Some(msg.clone()), Some(err)).is_err());
        assert!(Payload::from_parts(None, None, None).is_err());
        assert!(Payload::from_parts(Some(json!(1)), Some(msg.clone()), None).is_err());
        assert_eq!(Payload::from_parts(None, Some(msg.clone()), None).unwrap(), Payload::Success(msg));
    }

    #[test]
    fn envelope_serializes_camel_case_with_one_payload() {
        let env = ResponseBuilder::new(&ctx()).success(&book(), HttpVerb::Delete);
        let v = serde_json::to_value(&env).unwrap();
        assert_eq!(v["apiVersion"], json!("1.0"));
        assert_eq!(v["success"]["message"], json!("Book successfully deleted"));
        assert!(v.get("data").is_none());
        assert!(v.get("error").is_none());
        assert!(v["duration"].is_u64());
    }

    #[test]
    fn error_envelope_carries_code_and_field_errors() {
        let (env, status) = ResponseBuilder::new(&ctx()).error(&AppError::field("title", "Field may not be null."));
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let v = serde_json::to_value(&env).unwrap();
        assert_eq!(v["error"]["code"], json!(422));
        assert_eq!(v["error"]["message"], json!("Validation error"));
        assert_eq!(v["error"]["errors"][0]["field"], json!("title"));
    }

    #[tokio::test]
    async fn paginated_envelope_for_ten_items() {
        let store = MemoryStore::new();
        let book = book();
        let mut s = store.session().await.unwrap();
        for i in 0..10 {
            let fields = json!({ "title": format!("t{}", i) }).as_object().cloned().unwrap();
            s.insert(&book, &fields).await.unwrap();
        }
        s.commit().await.unwrap();

        let page = PageRequest { items_per_page: 5, page_index: Some(1), start_index: None };
        let env = ResponseBuilder::new(&ctx())
            .paginated(&mut s, &Query::new(Arc::clone(&book)), &ResourceSchema::new(book), page)
            .await
            .unwrap();
        let v = serde_json::to_value(&env).unwrap();
        let data = &v["data"];
        assert_eq!(data["currentItemCount"], json!(5));
        assert_eq!(data["totalItems"], json!(10));
        assert_eq!(data["totalPages"], json!(2));
        assert_eq!(data["startIndex"], json!(1));
        assert_eq!(data["items"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn tail_page_is_short_and_past_the_end_is_empty() {
        let store = MemoryStore::new();
        let book = book();
        let mut s = store.session().await.unwrap();
        for i in 0..7 {
            let fields = json!({ "title": format!("t{}", i) }).as_object().cloned().unwrap();
            s.insert(&book, &fields).await.unwrap();
        }
        let schema = ResourceSchema::new(Arc::clone(&book));
        let ctx = ctx();
        let builder = ResponseBuilder::new(&ctx);
        let query = Query::new(book);

        let page = PageRequest { items_per_page: 5, page_index: Some(2), start_index: None };
        let v = serde_json::to_value(builder.paginated(&mut s, &query, &schema, page).await.unwrap()).unwrap();
        assert_eq!(v["data"]["currentItemCount"], json!(2));

        let page = PageRequest { items_per_page: 5, page_index: None, start_index: Some(26) };
        let v = serde_json::to_value(builder.paginated(&mut s, &query, &schema, page).await.unwrap()).unwrap();
        assert_eq!(v["data"]["currentItemCount"], json!(0));
        assert_eq!(v["data"]["totalPages"], json!(0));
    }
}
