//! Page- and offset-based pagination arithmetic. All indices are 1-based; stop is inclusive.

use crate::error::{AppError, FieldError};
use serde::Serialize;
use std::collections::HashMap;

pub const DEFAULT_ITEMS_PER_PAGE: u64 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub start_index: u64,
    pub stop_index: u64,
    pub page_index: u64,
    pub total_pages: u64,
}

impl Pagination {
    /// Zero-based half-open range for slicing a query.
    pub fn offset_range(&self) -> (u64, u64) {
        (self.start_index - 1, self.stop_index)
    }
}

/// Largest index or page size accepted; row positions must fit a signed 64-bit OFFSET.
pub const MAX_INDEX: u64 = i64::MAX as u64;

fn too_large(field: &str) -> AppError {
    AppError::field(field, format!("Must be less than or equal to {}.", MAX_INDEX))
}

/// Compute absolute start/stop, resolved page index and total page count.
///
/// With only a start index the page is derived from it; with both, the start index is an
/// offset within the requested page. Ranges past the end are valid and select nothing.
/// A range whose end does not fit [`MAX_INDEX`] is a validation error on the index field.
pub fn compute(
    page_index: Option<u64>,
    start_index: Option<u64>,
    items_per_page: u64,
    total_items: u64,
) -> Result<Pagination, AppError> {
    let mut errors = Vec::new();
    let checked = [
        ("pageIndex", page_index),
        ("startIndex", start_index),
        ("itemsPerPage", Some(items_per_page)),
    ];
    for (field, value) in checked {
        match value {
            Some(0) => errors.push(FieldError::new(field, "Must be greater than or equal to 1.")),
            Some(n) if n > MAX_INDEX => errors.push(FieldError::new(
                field,
                format!("Must be less than or equal to {}.", MAX_INDEX),
            )),
            _ => {}
        }
    }
    if !errors.is_empty() {
        return Err(AppError::validation(errors));
    }

    let offset_pages = |start: u64| {
        if start <= total_items {
            (total_items - start).div_ceil(items_per_page)
        } else {
            0
        }
    };
    // Inclusive stop of a page that begins at `start`.
    let stop_for = |start: u64, field: &str| {
        start
            .checked_add(items_per_page - 1)
            .filter(|stop| *stop <= MAX_INDEX)
            .ok_or_else(|| too_large(field))
    };
    // First row of `page` plus `offset - 1`.
    let page_start = |page: u64, offset: u64| {
        items_per_page
            .checked_mul(page - 1)
            .and_then(|n| n.checked_add(offset))
            .ok_or_else(|| too_large("pageIndex"))
    };

    let pagination = match (page_index, start_index) {
        (Some(page), None) => {
            let start = page_start(page, 1)?;
            Pagination {
                start_index: start,
                stop_index: stop_for(start, "pageIndex")?,
                page_index: page,
                total_pages: total_items.div_ceil(items_per_page),
            }
        }
        (None, Some(start)) => Pagination {
            start_index: start,
            stop_index: stop_for(start, "startIndex")?,
            page_index: start / items_per_page + 1,
            total_pages: offset_pages(start),
        },
        (Some(page), Some(offset)) => {
            let start = page_start(page, offset)?;
            Pagination {
                start_index: start,
                stop_index: stop_for(start, "pageIndex")?,
                page_index: page,
                total_pages: offset_pages(offset),
            }
        }
        (None, None) => return Err(AppError::BadRequest("missing_page_and_start_index".into())),
    };
    Ok(pagination)
}

/// Pagination query arguments (`itemsPerPage`, `pageIndex`, `startIndex`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub items_per_page: u64,
    pub page_index: Option<u64>,
    pub start_index: Option<u64>,
}

impl PageRequest {
    /// Parse from raw query parameters, accepting camelCase and snake_case keys.
    /// Exactly one of page/start index is not required here; at least one is.
    pub fn from_params(params: &HashMap<String, String>, default_items_per_page: u64) -> Result<Self, AppError> {
        let mut errors = Vec::new();
        let mut read = |camel: &str, snake: &str| -> Option<u64> {
            let raw = params.get(camel).or_else(|| params.get(snake))?;
            match raw.trim().parse::<u64>() {
                Ok(0) => {
                    errors.push(FieldError::new(camel, "Must be greater than or equal to 1."));
                    None
                }
                Ok(n) if n > MAX_INDEX => {
                    errors.push(FieldError::new(camel, format!("Must be less than or equal to {}.", MAX_INDEX)));
                    None
                }
                Ok(n) => Some(n),
                Err(_) => {
                    errors.push(FieldError::new(camel, "Not a valid integer."));
                    None
                }
            }
        };
        let items_per_page = read("itemsPerPage", "items_per_page");
        let page_index = read("pageIndex", "page_index");
        let start_index = read("startIndex", "start_index");
        if !errors.is_empty() {
            return Err(AppError::validation(errors));
        }
        if page_index.is_none() && start_index.is_none() {
            return Err(AppError::BadRequest("missing_page_and_start_index".into()));
        }
        Ok(PageRequest {
            items_per_page: items_per_page.unwrap_or(default_items_per_page),
            page_index,
            start_index,
        })
    }
}
