//! Per-request metadata: id, start time, echoed query parameters and locale.
//!
//! The middleware stores a [`RequestContext`] in the request extensions; handlers take it
//! as an extractor and own their copy for the rest of the request.

use crate::i18n::Locale;
use crate::state::AppState;
use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Query, Request, State},
    http::{header::ACCEPT_LANGUAGE, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::convert::Infallible;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct RequestContext {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub api_version: String,
    pub params: Map<String, Value>,
    pub locale: Locale,
}

impl RequestContext {
    pub fn new(params: Map<String, Value>, locale: Locale) -> Self {
        RequestContext {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            api_version: String::new(),
            params,
            locale,
        }
    }

    /// Build from the request line and headers, falling back to `default_locale`.
    pub fn from_parts(parts: &Parts, default_locale: Locale) -> Self {
        let params = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
            .map(|Query(q)| q.into_iter().map(|(k, v)| (k, Value::String(v))).collect())
            .unwrap_or_default();
        RequestContext::new(params, locale_from_headers(&parts.headers).unwrap_or(default_locale))
    }

    /// Raw query parameters as strings.
    pub fn query(&self) -> HashMap<String, String> {
        self.params
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect()
    }

    pub fn merge_params(&mut self, extra: impl IntoIterator<Item = (String, Value)>) {
        self.params.extend(extra);
    }

    pub fn set_api_version(&mut self, version: &str) {
        if self.api_version.is_empty() {
            self.api_version = version.to_string();
        }
    }

    pub fn duration_ms(&self) -> u64 {
        duration_ms(self.started_at, Utc::now())
    }
}

/// Whole milliseconds from `start` to `now`; 0 unless `start` is strictly earlier.
pub fn duration_ms(start: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    if start < now {
        (now - start).num_milliseconds().max(0) as u64
    } else {
        0
    }
}

fn locale_from_headers(headers: &HeaderMap) -> Option<Locale> {
    headers
        .get(ACCEPT_LANGUAGE)
        .and_then(|v| v.to_str().ok())
        .and_then(Locale::from_accept_language)
}

pub async fn request_context(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let (mut parts, body) = req.into_parts();
    let ctx = RequestContext::from_parts(&parts, state.settings.default_locale);
    tracing::debug!(request_id = %ctx.id, method = %parts.method, uri = %parts.uri, "request");
    parts.extensions.insert(ctx);
    next.run(Request::from_parts(parts, body)).await
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(match parts.extensions.get::<RequestContext>() {
            Some(ctx) => ctx.clone(),
            None => RequestContext::from_parts(parts, Locale::default()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request as HttpRequest;
    use chrono::Duration;

    #[test]
    fn duration_is_zero_unless_start_is_in_the_past() {
        let now = Utc::now();
        assert_eq!(duration_ms(now, now), 0);
        assert_eq!(duration_ms(now + Duration::seconds(1), now), 0);
        assert_eq!(duration_ms(now - Duration::milliseconds(1500), now), 1500);
    }

    #[test]
    fn context_echoes_query_and_picks_locale() {
        let (parts, _) = HttpRequest::builder()
            .uri("/api/book?pageIndex=2&itemsPerPage=5")
            .header(ACCEPT_LANGUAGE, "nl")
            .body(())
            .unwrap()
            .into_parts();
        let mut ctx = RequestContext::from_parts(&parts, Locale::En);
        assert_eq!(ctx.locale, Locale::Nl);
        assert_eq!(ctx.params["pageIndex"], Value::String("2".into()));
        assert_eq!(ctx.query().get("itemsPerPage").map(String::as_str), Some("5"));

        ctx.merge_params([("id".to_string(), Value::from(3))]);
        assert_eq!(ctx.params["id"], Value::from(3));
        ctx.set_api_version("1.0");
        ctx.set_api_version("2.0");
        assert_eq!(ctx.api_version, "1.0");
    }

    #[test]
    fn each_context_gets_its_own_id() {
        let a = RequestContext::new(Map::new(), Locale::En);
        let b = RequestContext::new(Map::new(), Locale::En);
        assert_ne!(a.id, b.id);
    }
}
