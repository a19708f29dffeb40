use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Targets parsed out of a `List-Unsubscribe` header
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnsubscribeTargets {
    pub mailto: Option<String>,
    pub http: Option<String>,
}

/// Normalized view of one fetched message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub thread_id: String,
    pub subject: String,
    pub sender: String,
    pub received: DateTime<Utc>,
    pub snippet: String,
    pub body: Option<String>,
    /// Selected headers, keyed by canonical header name
    pub headers: BTreeMap<String, String>,
}

impl MessageRecord {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Body text cut to `budget` characters, falling back to the snippet
    pub fn body_within(&self, budget: usize) -> String {
        let text = match self.body.as_deref() {
            Some(body) if !body.trim().is_empty() => body,
            _ => self.snippet.as_str(),
        };
        truncate_chars(text, budget)
    }
}

/// Structured output of one classifier call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassificationVerdict {
    pub category: String,
    pub confidence: Option<f64>,
    pub reason: String,
    /// Additional schema fields (company name, topics, flags)
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ClassificationVerdict {
    pub fn new(category: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            confidence: None,
            reason: reason.into(),
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_extra(mut self, key: &str, value: serde_json::Value) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }

    pub fn flag(&self, key: &str) -> bool {
        self.extra
            .get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(|v| v.as_str())
    }

    pub fn list(&self, key: &str) -> Vec<String> {
        self.extra
            .get(key)
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Gmail filter definition created by the filter manager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterSpec {
    pub name: String,
    pub from: Option<String>,
    pub subject: Option<String>,
    pub query: Option<String>,
    pub label_name: String,
    pub skip_inbox: bool,
}

/// Truncate on a character boundary
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(body: Option<&str>) -> MessageRecord {
        let mut headers = BTreeMap::new();
        headers.insert("To".to_string(), "me@example.com".to_string());
        MessageRecord {
            id: "123".to_string(),
            thread_id: "456".to_string(),
            subject: "Test Subject".to_string(),
            sender: "Test User <test@example.com>".to_string(),
            received: Utc::now(),
            snippet: "snippet text".to_string(),
            body: body.map(str::to_string),
            headers,
        }
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let record = record(None);
        assert_eq!(record.header("to"), Some("me@example.com"));
        assert_eq!(record.header("Cc"), None);
    }

    #[test]
    fn test_body_within_falls_back_to_snippet() {
        assert_eq!(record(None).body_within(100), "snippet text");
        assert_eq!(record(Some("   ")).body_within(100), "snippet text");
        assert_eq!(record(Some("hello world")).body_within(5), "hello");
    }

    #[test]
    fn test_truncate_chars_multibyte() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn test_verdict_extra_accessors() {
        let verdict = ClassificationVerdict::new("high", "urgent")
            .with_extra("needs_response", serde_json::json!(true))
            .with_extra("topics", serde_json::json!(["contract", "deadline"]))
            .with_extra("company_name", serde_json::json!("Acme"));

        assert!(verdict.flag("needs_response"));
        assert!(!verdict.flag("time_sensitive"));
        assert_eq!(verdict.list("topics"), vec!["contract", "deadline"]);
        assert_eq!(verdict.text("company_name"), Some("Acme"));
    }
}
