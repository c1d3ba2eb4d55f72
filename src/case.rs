//! Key casing between the API (camelCase) and columns (snake_case).

use serde_json::{Map, Value};

/// "current_item_count" -> "currentItemCount". Empty segments (leading or doubled
/// underscores) are dropped.
pub fn to_camel_case(s: &str) -> String {
    let mut words = s.split('_').filter(|w| !w.is_empty());
    let Some(head) = words.next() else {
        return String::new();
    };
    words.fold(head.to_string(), |mut acc, word| {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            acc.extend(first.to_uppercase());
            acc.push_str(chars.as_str());
        }
        acc
    })
}

/// "publishedAt" -> "published_at". Snake case input comes back unchanged.
pub fn to_snake_case(s: &str) -> String {
    s.char_indices().fold(String::with_capacity(s.len() + 4), |mut acc, (i, c)| {
        if c.is_uppercase() && i > 0 {
            acc.push('_');
        }
        acc.extend(c.to_lowercase());
        acc
    })
}

/// Rewrite the top-level keys of an object to camelCase.
pub fn keys_to_camel_case(obj: Map<String, Value>) -> Map<String, Value> {
    obj.into_iter().map(|(k, v)| (to_camel_case(&k), v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn converts_identifiers() {
        assert_eq!(to_camel_case("items_per_page"), "itemsPerPage");
        assert_eq!(to_camel_case("id"), "id");
        assert_eq!(to_camel_case("_private"), "private");
        assert_eq!(to_camel_case("page__index"), "pageIndex");
        assert_eq!(to_snake_case("itemsPerPage"), "items_per_page");
        assert_eq!(to_snake_case("created_at"), "created_at");
    }

    #[test]
    fn rewrites_object_keys() {
        let Value::Object(map) = json!({ "published_at": 1, "title": "x" }) else {
            unreachable!()
        };
        let out = keys_to_camel_case(map);
        assert!(out.contains_key("publishedAt"));
        assert!(out.contains_key("title"));
    }
}
