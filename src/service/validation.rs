//! Per-column validation rules from resource config.

use crate::config::ValidationRule;
use regex::Regex;
use serde_json::Value;

pub struct RequestValidator;

impl RequestValidator {
    /// Messages for every rule `v` breaks. Null values are left to the nullability check.
    pub fn check(v: &Value, rule: &ValidationRule) -> Vec<String> {
        let mut messages = Vec::new();
        if v.is_null() {
            return messages;
        }
        if let Some(format) = &rule.format {
            if let Some(msg) = check_format(v, format) {
                messages.push(msg);
            }
        }
        if let Some(s) = v.as_str() {
            let len = s.chars().count();
            match (rule.min_length, rule.max_length) {
                (Some(min), Some(max)) if len < min as usize || len > max as usize => {
                    messages.push(format!("Length must be between {} and {}.", min, max));
                }
                (Some(min), None) if len < min as usize => {
                    messages.push(format!("Shorter than minimum length {}.", min));
                }
                (None, Some(max)) if len > max as usize => {
                    messages.push(format!("Longer than maximum length {}.", max));
                }
                _ => {}
            }
            if let Some(ref pattern) = rule.pattern {
                // Patterns are checked at config load; an invalid one here never matches.
                let matched = Regex::new(pattern).map(|re| re.is_match(s)).unwrap_or(false);
                if !matched {
                    messages.push("String does not match expected pattern.".into());
                }
            }
        }
        if let Some(ref allowed) = rule.allowed {
            if !allowed.iter().any(|a| value_eq(v, a)) {
                let choices: Vec<String> = allowed.iter().map(choice).collect();
                messages.push(format!("Must be one of: {}.", choices.join(", ")));
            }
        }
        if let Some(n) = v.as_f64() {
            match (rule.minimum, rule.maximum) {
                (Some(min), Some(max)) if n < min || n > max => {
                    messages.push(format!("Must be greater than or equal to {} and less than or equal to {}.", min, max));
                }
                (Some(min), None) if n < min => {
                    messages.push(format!("Must be greater than or equal to {}.", min));
                }
                (None, Some(max)) if n > max => {
                    messages.push(format!("Must be less than or equal to {}.", max));
                }
                _ => {}
            }
        }
        messages
    }
}

fn choice(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(s), Value::String(t)) => s == t,
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

fn check_format(v: &Value, format: &str) -> Option<String> {
    let s = v.as_str()?;
    match format.to_lowercase().as_str() {
        "email" => {
            let ok = s
                .split_once('@')
                .map(|(user, domain)| !user.is_empty() && domain.contains('.'))
                .unwrap_or(false);
            (!ok).then(|| "Not a valid email address.".to_string())
        }
        "uuid" => uuid::Uuid::parse_str(s)
            .is_err()
            .then(|| "Not a valid UUID.".to_string()),
        "url" => (!(s.starts_with("http://") || s.starts_with("https://")))
            .then(|| "Not a valid URL.".to_string()),
        _ => None,
    }
}
