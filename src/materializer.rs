//! Fetches full messages and normalizes them into `MessageRecord`s
use chrono::{DateTime, Utc};
use google_gmail1::api::{Message, MessagePart};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::client::{GmailClient, ProgressCallback};
use crate::error::{AssistantError, Result};
use crate::models::{MessageRecord, UnsubscribeTargets};

/// Headers kept on every record
const KEPT_HEADERS: &[&str] = &["From", "To", "Cc", "Subject", "Date", "List-Unsubscribe"];

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<?([a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,})>?").expect("valid regex")
});
static ANGLE_ADDR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<(.+?)>").expect("valid regex"));
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^<]+?>").expect("valid regex"));
static UNSUB_MAILTO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<mailto:([^>]+)>").expect("valid regex"));
static UNSUB_HTTP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<(https?:[^>]+)>").expect("valid regex"));

pub struct MessageMaterializer {
    client: Arc<dyn GmailClient>,
}

impl MessageMaterializer {
    pub fn new(client: Arc<dyn GmailClient>) -> Self {
        Self { client }
    }

    /// Fetch and normalize one message
    pub async fn materialize(&self, id: &str) -> Result<MessageRecord> {
        let message = self
            .client
            .get_message(id)
            .await
            .map_err(|e| AssistantError::FetchError {
                id: id.to_string(),
                reason: e.to_string(),
            })?;

        parse_message(id, &message)
    }

    /// Materialize a batch in order, skipping messages that fail
    pub async fn materialize_all(
        &self,
        ids: &[String],
        on_progress: Option<ProgressCallback>,
    ) -> Vec<MessageRecord> {
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            match self.materialize(id).await {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping message: {}", e),
            }
            if let Some(cb) = &on_progress {
                cb();
            }
        }
        debug!("Materialized {}/{} messages", records.len(), ids.len());
        records
    }
}

/// Normalize a full-format Gmail message
pub fn parse_message(requested_id: &str, message: &Message) -> Result<MessageRecord> {
    let id = message
        .id
        .clone()
        .unwrap_or_else(|| requested_id.to_string());

    let payload = message.payload.as_ref().ok_or_else(|| AssistantError::FetchError {
        id: id.clone(),
        reason: "message has no payload".to_string(),
    })?;

    let headers = kept_headers(payload);

    let subject = headers
        .get("Subject")
        .cloned()
        .unwrap_or_else(|| "No Subject".to_string());
    let sender = headers
        .get("From")
        .cloned()
        .unwrap_or_else(|| "Unknown Sender".to_string());

    let received = message
        .internal_date
        .and_then(DateTime::from_timestamp_millis)
        .or_else(|| headers.get("Date").and_then(|d| parse_email_date(d)))
        .unwrap_or_else(Utc::now);

    Ok(MessageRecord {
        thread_id: message.thread_id.clone().unwrap_or_default(),
        snippet: message.snippet.clone().unwrap_or_default(),
        body: extract_body(payload),
        id,
        subject,
        sender,
        received,
        headers,
    })
}

fn kept_headers(payload: &MessagePart) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    for header in payload.headers.iter().flatten() {
        if let (Some(name), Some(value)) = (&header.name, &header.value) {
            if let Some(canonical) = KEPT_HEADERS.iter().find(|k| k.eq_ignore_ascii_case(name)) {
                headers
                    .entry(canonical.to_string())
                    .or_insert_with(|| value.clone());
            }
        }
    }
    headers
}

fn part_text(part: &MessagePart) -> Option<String> {
    let data = part.body.as_ref()?.data.as_ref()?;
    let text = String::from_utf8_lossy(data).into_owned();
    (!text.is_empty()).then_some(text)
}

fn find_part<'a>(part: &'a MessagePart, mime: &str) -> Option<&'a MessagePart> {
    for child in part.parts.iter().flatten() {
        if child.mime_type.as_deref() == Some(mime) && part_text(child).is_some() {
            return Some(child);
        }
        if let Some(found) = find_part(child, mime) {
            return Some(found);
        }
    }
    None
}

/// Plain text part first, then stripped HTML, then the inline body
pub fn extract_body(payload: &MessagePart) -> Option<String> {
    if let Some(text) = find_part(payload, "text/plain").and_then(part_text) {
        return Some(text);
    }
    if let Some(html) = find_part(payload, "text/html").and_then(part_text) {
        return Some(strip_html(&html));
    }

    let has_parts = payload.parts.as_ref().map_or(false, |p| !p.is_empty());
    if has_parts {
        return None;
    }

    let inline = part_text(payload)?;
    if payload.mime_type.as_deref() == Some("text/html") {
        Some(strip_html(&inline))
    } else {
        Some(inline)
    }
}

/// Simple tag removal; entities and malformed markup pass through
pub fn strip_html(html: &str) -> String {
    TAG_RE.replace_all(html, "").into_owned()
}

/// Extract email address from a From-style header
pub fn extract_sender_email(from_header: &str) -> Option<String> {
    EMAIL_RE
        .captures(from_header)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_lowercase())
}

/// Address inside angle brackets, e.g. `Name <a@b.com>`
pub fn extract_angle_address(from_header: &str) -> Option<String> {
    ANGLE_ADDR_RE
        .captures(from_header)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// Extract recipient emails from a To header
pub fn extract_recipients(to_header: &str) -> Vec<String> {
    EMAIL_RE
        .captures_iter(to_header)
        .filter_map(|cap| cap.get(1))
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Parse the mailto and http targets of a `List-Unsubscribe` header
pub fn parse_list_unsubscribe(header: Option<&str>) -> UnsubscribeTargets {
    let Some(header) = header else {
        return UnsubscribeTargets::default();
    };

    UnsubscribeTargets {
        mailto: UNSUB_MAILTO_RE
            .captures(header)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string()),
        http: UNSUB_HTTP_RE
            .captures(header)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string()),
    }
}

/// Parse email date header
pub fn parse_email_date(date_str: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc2822(date_str) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(date_str) {
        return Some(dt.with_timezone(&Utc));
    }

    None
}
