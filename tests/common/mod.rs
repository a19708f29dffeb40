//! Common test utilities and fixtures

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use email_assistant::classifier::{ClassifierAdapter, TextClassifier};
use email_assistant::cli::{ProgressReporter, Prompter};
use email_assistant::client::{GmailClient, LabelInfo, MessagePage};
use email_assistant::commands::CommandContext;
use email_assistant::config::Config;
use email_assistant::error::{AssistantError, Result};
use email_assistant::models::FilterSpec;
use google_gmail1::api::{Message, MessagePart, MessagePartBody, MessagePartHeader};
use mockall::mock;
use serde_json::Value;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

fn header(name: &str, value: &str) -> MessagePartHeader {
    MessagePartHeader {
        name: Some(name.to_string()),
        value: Some(value.to_string()),
    }
}

/// A single-part plain-text message as the API returns it in full format
pub fn gmail_message(id: &str, from: &str, subject: &str, body: &str) -> Message {
    gmail_message_with_headers(id, from, subject, body, &[])
}

pub fn gmail_message_with_headers(
    id: &str,
    from: &str,
    subject: &str,
    body: &str,
    extra_headers: &[(&str, &str)],
) -> Message {
    // first occurrence wins, so extras override the defaults
    let mut headers: Vec<MessagePartHeader> =
        extra_headers.iter().map(|(n, v)| header(n, v)).collect();
    headers.extend([
        header("From", from),
        header("Subject", subject),
        header("To", "me@example.com"),
    ]);

    Message {
        id: Some(id.to_string()),
        thread_id: Some(format!("thread_{}", id)),
        snippet: Some(body.chars().take(40).collect()),
        internal_date: Some(Utc::now().timestamp_millis()),
        payload: Some(MessagePart {
            mime_type: Some("text/plain".to_string()),
            headers: Some(headers),
            body: Some(MessagePartBody {
                data: Some(body.as_bytes().to_vec()),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Same as [`gmail_message`] with a fixed receive time
pub fn gmail_message_at(id: &str, from: &str, subject: &str, received: DateTime<Utc>) -> Message {
    let mut message = gmail_message(id, from, subject, "body");
    message.internal_date = Some(received.timestamp_millis());
    message
}

pub fn label(id: &str, name: &str) -> LabelInfo {
    LabelInfo {
        id: id.to_string(),
        name: name.to_string(),
    }
}

pub fn single_page(ids: &[&str]) -> MessagePage {
    MessagePage {
        ids: ids.iter().map(|s| s.to_string()).collect(),
        next_page_token: None,
    }
}

pub fn ids(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("msg_{:04}", i)).collect()
}

// Mock implementation of GmailClient for testing
mock! {
    pub GmailClient {}

    #[async_trait::async_trait]
    impl GmailClient for GmailClient {
        async fn list_message_ids_page(
            &self,
            query: &str,
            page_size: u32,
            page_token: Option<String>,
        ) -> Result<MessagePage>;
        async fn get_message(&self, id: &str) -> Result<Message>;
        async fn list_labels(&self) -> Result<Vec<LabelInfo>>;
        async fn create_label(&self, name: &str) -> Result<String>;
        async fn batch_modify_labels(
            &self,
            message_ids: &[String],
            add_label_ids: &[String],
            remove_label_ids: &[String],
        ) -> Result<()>;
        async fn send_message(&self, to: &str, subject: &str, body: &str) -> Result<String>;
        async fn trash_message(&self, id: &str) -> Result<()>;
        async fn create_filter(&self, filter: &FilterSpec, label_id: &str) -> Result<String>;
    }
}

// Mock implementation of the LLM adapter
mock! {
    pub TextClassifier {}

    #[async_trait::async_trait]
    impl TextClassifier for TextClassifier {
        async fn complete_json(&self, model: &str, system: &str, user: &str) -> Result<Value>;
        async fn complete_text(&self, model: &str, system: &str, user: &str) -> Result<String>;
    }
}

/// Answers prompts from a fixed script; an exhausted script cancels
#[derive(Default)]
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<String>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().map(|s| s.to_string()).collect()),
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }

    fn next(&self, message: &str) -> Result<String> {
        self.asked.lock().unwrap().push(message.to_string());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AssistantError::OperationCancelled("script exhausted".to_string()))
    }
}

impl Prompter for ScriptedPrompter {
    fn text(&self, message: &str, _default: &str) -> Result<String> {
        self.next(message)
    }

    fn confirm(&self, message: &str, _default: bool) -> Result<bool> {
        Ok(self.next(message)?.eq_ignore_ascii_case("y"))
    }
}

/// Defaults with every artifact under `dir`
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.paths.artifact_dir = dir.to_path_buf();
    config
}

pub fn context_with(
    config: Config,
    client: MockGmailClient,
    classifier: MockTextClassifier,
    prompter: Arc<ScriptedPrompter>,
) -> CommandContext {
    CommandContext::new(
        config,
        Arc::new(client),
        ClassifierAdapter::new(Arc::new(classifier)),
        prompter,
        ProgressReporter::hidden(),
    )
    .unwrap()
}

pub fn context(
    dir: &Path,
    client: MockGmailClient,
    classifier: MockTextClassifier,
    answers: &[&str],
) -> CommandContext {
    context_with(
        test_config(dir),
        client,
        classifier,
        Arc::new(ScriptedPrompter::new(answers)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use email_assistant::materializer::parse_message;

    #[test]
    fn test_gmail_message_parses() {
        let record = parse_message("m1", &gmail_message("m1", "Ann <ann@a.test>", "Hi", "Hello there")).unwrap();
        assert_eq!(record.subject, "Hi");
        assert_eq!(record.sender, "Ann <ann@a.test>");
        assert_eq!(record.body.as_deref(), Some("Hello there"));
    }

    #[test]
    fn test_scripted_prompter_cancels_when_exhausted() {
        let prompter = ScriptedPrompter::new(&["y"]);
        assert!(prompter.confirm("ok?", false).unwrap());
        assert!(matches!(
            prompter.text("again?", ""),
            Err(AssistantError::OperationCancelled(_))
        ));
        assert_eq!(prompter.asked(), vec!["ok?", "again?"]);
    }
}
