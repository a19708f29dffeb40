//! Gmail API client: the mailbox message store the pipeline reads from and mutates

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use google_gmail1::{
    api::{BatchModifyMessagesRequest, Filter, FilterAction, FilterCriteria, Label, Message},
    hyper_rustls, hyper_util, Gmail,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{AssistantError, Result};
use crate::models::FilterSpec;

/// Progress callback type for per-message loops
pub type ProgressCallback = Arc<dyn Fn() + Send + Sync>;

const SCOPE_READONLY: &str = "https://www.googleapis.com/auth/gmail.readonly";
const SCOPE_SEND: &str = "https://www.googleapis.com/auth/gmail.send";
const SCOPE_MODIFY: &str = "https://www.googleapis.com/auth/gmail.modify";
const SCOPE_LABELS: &str = "https://www.googleapis.com/auth/gmail.labels";
const SCOPE_SETTINGS: &str = "https://www.googleapis.com/auth/gmail.settings.basic";

const LIST_TIMEOUT: Duration = Duration::from_secs(30);

/// Label info returned from Gmail API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelInfo {
    pub id: String,
    pub name: String,
}

/// One page of message identifiers
#[derive(Debug, Clone, Default)]
pub struct MessagePage {
    pub ids: Vec<String>,
    pub next_page_token: Option<String>,
}

/// Trait defining Gmail client operations for easier testing
#[async_trait]
pub trait GmailClient: Send + Sync {
    /// List one page of message IDs matching a query
    async fn list_message_ids_page(
        &self,
        query: &str,
        page_size: u32,
        page_token: Option<String>,
    ) -> Result<MessagePage>;

    /// Fetch a message in full format
    async fn get_message(&self, id: &str) -> Result<Message>;

    /// List all labels in the account
    async fn list_labels(&self) -> Result<Vec<LabelInfo>>;

    /// Create a new label, returning its ID
    async fn create_label(&self, name: &str) -> Result<String>;

    /// Add and remove labels across many messages in one call
    async fn batch_modify_labels(
        &self,
        message_ids: &[String],
        add_label_ids: &[String],
        remove_label_ids: &[String],
    ) -> Result<()>;

    /// Send a plain-text message, returning the sent message ID
    async fn send_message(&self, to: &str, subject: &str, body: &str) -> Result<String>;

    /// Move a message to trash
    async fn trash_message(&self, id: &str) -> Result<()>;

    /// Create a filter that applies `label_id`, returning the filter ID
    async fn create_filter(&self, filter: &FilterSpec, label_id: &str) -> Result<String>;
}

pub struct ProductionGmailClient {
    hub: Gmail<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>>,
}

impl ProductionGmailClient {
    pub fn new(
        hub: Gmail<
            hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>,
        >,
    ) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl GmailClient for ProductionGmailClient {
    async fn list_message_ids_page(
        &self,
        query: &str,
        page_size: u32,
        page_token: Option<String>,
    ) -> Result<MessagePage> {
        let mut call = self
            .hub
            .users()
            .messages_list("me")
            .q(query)
            .max_results(page_size);

        if let Some(token) = page_token.as_ref() {
            call = call.page_token(token);
        }

        let api_call = call.add_scope(SCOPE_READONLY).doit();
        let (_, response) = match tokio::time::timeout(LIST_TIMEOUT, api_call).await {
            Ok(result) => result?,
            Err(_) => {
                warn!("Gmail API messages_list call timed out after {:?}", LIST_TIMEOUT);
                return Err(AssistantError::NetworkError(format!(
                    "API call timed out after {:?}",
                    LIST_TIMEOUT
                )));
            }
        };

        let ids = response
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| m.id)
            .collect::<Vec<_>>();

        debug!("Listed {} message ids for query '{}'", ids.len(), query);
        Ok(MessagePage {
            ids,
            next_page_token: response.next_page_token,
        })
    }

    async fn get_message(&self, id: &str) -> Result<Message> {
        let (_, message) = self
            .hub
            .users()
            .messages_get("me", id)
            .format("full")
            .add_scope(SCOPE_READONLY)
            .doit()
            .await?;
        Ok(message)
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        let api_call = async {
            debug!("Calling Gmail API to list labels...");
            self.hub
                .users()
                .labels_list("me")
                .add_scope(SCOPE_LABELS)
                .doit()
                .await
        };

        let (_, response) = match tokio::time::timeout(LIST_TIMEOUT, api_call).await {
            Ok(result) => result?,
            Err(_) => {
                warn!("Gmail API list_labels call timed out after {:?}", LIST_TIMEOUT);
                return Err(AssistantError::NetworkError(format!(
                    "API call timed out after {:?}",
                    LIST_TIMEOUT
                )));
            }
        };

        let labels: Vec<LabelInfo> = response
            .labels
            .unwrap_or_default()
            .into_iter()
            .filter_map(|label| match (label.id, label.name) {
                (Some(id), Some(name)) => Some(LabelInfo { id, name }),
                _ => None,
            })
            .collect();

        debug!("Successfully parsed {} labels", labels.len());
        Ok(labels)
    }

    async fn create_label(&self, name: &str) -> Result<String> {
        let label = Label {
            name: Some(name.to_string()),
            message_list_visibility: Some("show".to_string()),
            label_list_visibility: Some("labelShow".to_string()),
            ..Default::default()
        };

        let (_, created) = self
            .hub
            .users()
            .labels_create(label, "me")
            .add_scope(SCOPE_LABELS)
            .doit()
            .await?;

        created.id.ok_or_else(|| {
            AssistantError::ApiError(format!("Created label '{}' has no ID", name))
        })
    }

    async fn batch_modify_labels(
        &self,
        message_ids: &[String],
        add_label_ids: &[String],
        remove_label_ids: &[String],
    ) -> Result<()> {
        if message_ids.is_empty() {
            return Ok(());
        }

        let request = BatchModifyMessagesRequest {
            ids: Some(message_ids.to_vec()),
            add_label_ids: (!add_label_ids.is_empty()).then(|| add_label_ids.to_vec()),
            remove_label_ids: (!remove_label_ids.is_empty()).then(|| remove_label_ids.to_vec()),
        };

        self.hub
            .users()
            .messages_batch_modify(request, "me")
            .add_scope(SCOPE_MODIFY)
            .doit()
            .await?;

        debug!(
            "Batch modified {} messages (+{:?} -{:?})",
            message_ids.len(),
            add_label_ids,
            remove_label_ids
        );
        Ok(())
    }

    async fn send_message(&self, to: &str, subject: &str, body: &str) -> Result<String> {
        let raw = build_plain_message(to, subject, body);

        let (_, sent) = self
            .hub
            .users()
            .messages_send(Message::default(), "me")
            .add_scope(SCOPE_SEND)
            .upload(
                std::io::Cursor::new(raw.into_bytes()),
                "message/rfc822".parse().map_err(|e| {
                    AssistantError::InvalidMessageFormat(format!("Invalid MIME type: {}", e))
                })?,
            )
            .await?;

        sent.id
            .ok_or_else(|| AssistantError::ApiError("Sent message has no ID".to_string()))
    }

    async fn trash_message(&self, id: &str) -> Result<()> {
        self.hub
            .users()
            .messages_trash("me", id)
            .add_scope(SCOPE_MODIFY)
            .doit()
            .await?;
        Ok(())
    }

    async fn create_filter(&self, filter: &FilterSpec, label_id: &str) -> Result<String> {
        let criteria = FilterCriteria {
            from: filter.from.clone(),
            subject: filter.subject.clone(),
            query: filter.query.clone(),
            ..Default::default()
        };

        let action = FilterAction {
            add_label_ids: Some(vec![label_id.to_string()]),
            remove_label_ids: filter.skip_inbox.then(|| vec!["INBOX".to_string()]),
            ..Default::default()
        };

        let request = Filter {
            criteria: Some(criteria),
            action: Some(action),
            ..Default::default()
        };

        let (_, created) = self
            .hub
            .users()
            .settings_filters_create(request, "me")
            .add_scope(SCOPE_SETTINGS)
            .doit()
            .await?;

        created
            .id
            .ok_or_else(|| AssistantError::ApiError(format!("Filter '{}' has no ID", filter.name)))
    }
}

// Implement GmailClient for Arc<ProductionGmailClient> to allow shared ownership
#[async_trait]
impl GmailClient for Arc<ProductionGmailClient> {
    async fn list_message_ids_page(
        &self,
        query: &str,
        page_size: u32,
        page_token: Option<String>,
    ) -> Result<MessagePage> {
        self.as_ref()
            .list_message_ids_page(query, page_size, page_token)
            .await
    }

    async fn get_message(&self, id: &str) -> Result<Message> {
        self.as_ref().get_message(id).await
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        self.as_ref().list_labels().await
    }

    async fn create_label(&self, name: &str) -> Result<String> {
        self.as_ref().create_label(name).await
    }

    async fn batch_modify_labels(
        &self,
        message_ids: &[String],
        add_label_ids: &[String],
        remove_label_ids: &[String],
    ) -> Result<()> {
        self.as_ref()
            .batch_modify_labels(message_ids, add_label_ids, remove_label_ids)
            .await
    }

    async fn send_message(&self, to: &str, subject: &str, body: &str) -> Result<String> {
        self.as_ref().send_message(to, subject, body).await
    }

    async fn trash_message(&self, id: &str) -> Result<()> {
        self.as_ref().trash_message(id).await
    }

    async fn create_filter(&self, filter: &FilterSpec, label_id: &str) -> Result<String> {
        self.as_ref().create_filter(filter, label_id).await
    }
}

/// Encode a header value per RFC 2047 when it is not plain ASCII
fn encode_header_value(value: &str) -> String {
    if value.is_ascii() {
        value.to_string()
    } else {
        format!("=?UTF-8?B?{}?=", STANDARD.encode(value.as_bytes()))
    }
}

/// Minimal RFC 822 text/plain message with a base64 body
pub fn build_plain_message(to: &str, subject: &str, body: &str) -> String {
    let encoded = STANDARD.encode(body.as_bytes());
    let wrapped = encoded
        .as_bytes()
        .chunks(76)
        .map(|line| String::from_utf8_lossy(line).into_owned())
        .collect::<Vec<_>>()
        .join("\r\n");

    format!(
        "To: {}\r\nSubject: {}\r\nMIME-Version: 1.0\r\nContent-Type: text/plain; charset=\"UTF-8\"\r\nContent-Transfer-Encoding: base64\r\n\r\n{}\r\n",
        to,
        encode_header_value(subject),
        wrapped
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_subject_is_left_alone() {
        let raw = build_plain_message("a@example.com", "Re: Hello", "Hi");
        assert!(raw.contains("To: a@example.com\r\n"));
        assert!(raw.contains("Subject: Re: Hello\r\n"));
        assert!(raw.contains("Content-Transfer-Encoding: base64"));
    }

    #[test]
    fn test_non_ascii_subject_is_encoded() {
        let raw = build_plain_message("a@example.com", "Café", "Hi");
        let expected = format!("Subject: =?UTF-8?B?{}?=", STANDARD.encode("Café"));
        assert!(raw.contains(&expected));
    }

    #[test]
    fn test_body_is_base64_and_wrapped() {
        let body = "x".repeat(200);
        let raw = build_plain_message("a@example.com", "s", &body);
        let (_, encoded) = raw.split_once("\r\n\r\n").unwrap();

        for line in encoded.trim_end().split("\r\n") {
            assert!(line.len() <= 76);
        }
        let joined: String = encoded.trim_end().split("\r\n").collect();
        assert_eq!(STANDARD.decode(joined).unwrap(), body.as_bytes());
    }
}
