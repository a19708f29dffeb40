//! Classifier adapter over a language-model completion endpoint
//!
//! The model is treated as a non-deterministic, fallible function. Nothing here
//! retries; callers that need a verdict for every message use
//! [`ClassifierAdapter::classify_or_default`].

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        ChatCompletionResponseFormat, ChatCompletionResponseFormatType,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::error::{AssistantError, Result};
use crate::models::ClassificationVerdict;

/// Text completion collaborator
#[async_trait]
pub trait TextClassifier: Send + Sync {
    /// Completion constrained to a JSON object
    async fn complete_json(&self, model: &str, system: &str, user: &str) -> Result<Value>;

    /// Free-text completion
    async fn complete_text(&self, model: &str, system: &str, user: &str) -> Result<String>;
}

/// OpenAI chat-completions backed classifier
pub struct OpenAiClassifier {
    client: Client<OpenAIConfig>,
}

impl OpenAiClassifier {
    pub fn new(api_key: &str, api_base: Option<&str>) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base) = api_base {
            config = config.with_api_base(base);
        }
        Self {
            client: Client::with_config(config),
        }
    }

    /// Build from config, reading the key from the configured environment variable
    pub fn from_config(llm: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&llm.api_key_env).map_err(|_| {
            AssistantError::ConfigError(format!(
                "{} is not set; export your OpenAI API key",
                llm.api_key_env
            ))
        })?;
        Ok(Self::new(&api_key, llm.api_base.as_deref()))
    }

    async fn complete(
        &self,
        model: &str,
        system: &str,
        user: &str,
        json_mode: bool,
    ) -> Result<String> {
        let mut builder = CreateChatCompletionRequestArgs::default();
        builder.model(model).messages([
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system)
                .build()?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user)
                .build()?
                .into(),
        ]);
        if json_mode {
            builder.response_format(ChatCompletionResponseFormat {
                r#type: ChatCompletionResponseFormatType::JsonObject,
            });
        }
        let request = builder.build()?;

        debug!("Requesting completion from {}", model);
        let response = self.client.chat().create(request).await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| {
                AssistantError::ClassificationError("model returned an empty response".to_string())
            })
    }
}

#[async_trait]
impl TextClassifier for OpenAiClassifier {
    async fn complete_json(&self, model: &str, system: &str, user: &str) -> Result<Value> {
        let content = self.complete(model, system, user, true).await?;
        serde_json::from_str(content.trim()).map_err(|e| {
            AssistantError::ClassificationError(format!("response is not valid JSON: {}", e))
        })
    }

    async fn complete_text(&self, model: &str, system: &str, user: &str) -> Result<String> {
        self.complete(model, system, user, false).await
    }
}

/// Closed set of category values with a designated fallback
#[derive(Debug, Clone)]
pub struct CategorySet {
    values: Vec<String>,
    fallback: String,
}

impl CategorySet {
    pub fn new<S: AsRef<str>>(values: &[S], fallback: &str) -> Self {
        Self {
            values: values.iter().map(|v| v.as_ref().to_string()).collect(),
            fallback: fallback.to_string(),
        }
    }

    /// Values in declared order
    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    pub fn contains(&self, value: &str) -> bool {
        self.values.iter().any(|v| v == value)
    }

    /// Canonical member for `raw`, or `None` if it is outside the set
    pub fn canonical(&self, raw: &str) -> Option<&str> {
        let raw = raw.trim();
        self.values
            .iter()
            .find(|v| v.as_str() == raw)
            .or_else(|| self.values.iter().find(|v| v.eq_ignore_ascii_case(raw)))
            .map(String::as_str)
    }

    /// Member for `raw`, falling back with a warning when it is out of set
    pub fn coerce(&self, raw: &str) -> String {
        match self.canonical(raw) {
            Some(value) => value.to_string(),
            None => {
                warn!(
                    "Classifier returned '{}' outside {:?}; using '{}'",
                    raw, self.values, self.fallback
                );
                self.fallback.clone()
            }
        }
    }
}

/// Field names the verdict is read from
#[derive(Debug, Clone)]
pub struct ExtractionSchema {
    pub category_field: String,
    pub confidence_fields: Vec<String>,
    pub reason_fields: Vec<String>,
    /// Additional enum-valued fields validated the same way as the category
    pub enum_fields: Vec<(String, CategorySet)>,
}

impl ExtractionSchema {
    pub fn new(category_field: &str) -> Self {
        Self {
            category_field: category_field.to_string(),
            confidence_fields: vec!["confidence".to_string(), "ai_confidence".to_string()],
            reason_fields: vec!["reason".to_string(), "reason_detail".to_string()],
            enum_fields: Vec::new(),
        }
    }

    pub fn with_enum_field(mut self, field: &str, set: CategorySet) -> Self {
        self.enum_fields.push((field.to_string(), set));
        self
    }
}

/// Instructions plus input for one classifier call
#[derive(Debug, Clone)]
pub struct ClassificationRequest {
    pub model: String,
    pub system: String,
    pub user: String,
}

fn read_confidence(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    parsed.is_finite().then(|| parsed.clamp(0.0, 1.0))
}

/// Parse a JSON verdict against a closed category set
pub fn parse_verdict(
    value: Value,
    categories: &CategorySet,
    schema: &ExtractionSchema,
) -> Result<ClassificationVerdict> {
    let Value::Object(mut fields) = value else {
        return Err(AssistantError::ClassificationError(
            "verdict is not a JSON object".to_string(),
        ));
    };

    let raw_category = match fields.remove(&schema.category_field) {
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
        None => {
            return Err(AssistantError::ClassificationError(format!(
                "verdict is missing '{}'",
                schema.category_field
            )))
        }
    };
    let category = categories.coerce(&raw_category);

    let confidence = schema
        .confidence_fields
        .iter()
        .find_map(|f| fields.remove(f))
        .and_then(|v| read_confidence(&v));

    let reason = schema
        .reason_fields
        .iter()
        .find_map(|f| fields.remove(f))
        .map(|v| match v {
            Value::String(s) => s,
            other => other.to_string(),
        })
        .unwrap_or_default();

    for (field, set) in &schema.enum_fields {
        let raw = fields
            .get(field)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        fields.insert(field.clone(), Value::String(set.coerce(&raw)));
    }

    Ok(ClassificationVerdict {
        category,
        confidence,
        reason,
        extra: fields,
    })
}

/// Conservative verdict used when classification fails
pub fn safe_default(
    categories: &CategorySet,
    schema: &ExtractionSchema,
    error: &AssistantError,
) -> ClassificationVerdict {
    let mut verdict = ClassificationVerdict::new(
        categories.fallback(),
        format!("AI analysis failed: {}", error),
    )
    .with_confidence(0.0);
    for (field, set) in &schema.enum_fields {
        verdict
            .extra
            .insert(field.clone(), Value::String(set.fallback().to_string()));
    }
    verdict
}

/// Sends records to the text classifier and parses structured verdicts
#[derive(Clone)]
pub struct ClassifierAdapter {
    classifier: Arc<dyn TextClassifier>,
}

impl ClassifierAdapter {
    pub fn new(classifier: Arc<dyn TextClassifier>) -> Self {
        Self { classifier }
    }

    pub async fn classify(
        &self,
        request: &ClassificationRequest,
        categories: &CategorySet,
        schema: &ExtractionSchema,
    ) -> Result<ClassificationVerdict> {
        let value = self
            .classifier
            .complete_json(&request.model, &request.system, &request.user)
            .await
            .map_err(|e| match e {
                AssistantError::ClassificationError(_) => e,
                other => AssistantError::ClassificationError(other.to_string()),
            })?;
        parse_verdict(value, categories, schema)
    }

    /// Always yields a verdict; failures become the safe default
    pub async fn classify_or_default(
        &self,
        request: &ClassificationRequest,
        categories: &CategorySet,
        schema: &ExtractionSchema,
    ) -> ClassificationVerdict {
        match self.classify(request, categories, schema).await {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!("Classification failed, substituting '{}': {}", categories.fallback(), e);
                safe_default(categories, schema, &e)
            }
        }
    }

    /// Free-text generation through the same collaborator
    pub async fn generate(&self, request: &ClassificationRequest) -> Result<String> {
        self.classifier
            .complete_text(&request.model, &request.system, &request.user)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn general() -> CategorySet {
        CategorySet::new(&["Personal", "Work", "Other"], "Other")
    }

    #[test]
    fn test_parse_verdict_in_set() {
        let verdict = parse_verdict(
            json!({"category": "Work", "confidence": 0.9, "reason": "meeting", "company_name": "Acme"}),
            &general(),
            &ExtractionSchema::new("category"),
        )
        .unwrap();

        assert_eq!(verdict.category, "Work");
        assert_eq!(verdict.confidence, Some(0.9));
        assert_eq!(verdict.reason, "meeting");
        assert_eq!(verdict.text("company_name"), Some("Acme"));
        assert!(!verdict.extra.contains_key("category"));
    }

    #[test]
    fn test_parse_verdict_case_insensitive_match() {
        let verdict = parse_verdict(
            json!({"category": "work"}),
            &general(),
            &ExtractionSchema::new("category"),
        )
        .unwrap();
        assert_eq!(verdict.category, "Work");
        assert_eq!(verdict.confidence, None);
    }

    #[test]
    fn test_out_of_set_category_is_coerced() {
        let verdict = parse_verdict(
            json!({"category": "Shopping", "reason": "store"}),
            &general(),
            &ExtractionSchema::new("category"),
        )
        .unwrap();
        assert_eq!(verdict.category, "Other");
        assert_eq!(verdict.reason, "store");
    }

    #[test]
    fn test_alternate_field_names_and_enum_fields() {
        let reasons = CategorySet::new(&["age", "ai_promotional", "ai_unsure"], "ai_unsure");
        let schema = ExtractionSchema::new("suggestion").with_enum_field("reason_category", reasons);
        let suggestions = CategorySet::new(&["strong_candidate", "keep"], "keep");

        let verdict = parse_verdict(
            json!({
                "suggestion": "strong_candidate",
                "reason_category": "made_up",
                "reason_detail": "promo blast",
                "ai_confidence": "0.75"
            }),
            &suggestions,
            &schema,
        )
        .unwrap();

        assert_eq!(verdict.category, "strong_candidate");
        assert_eq!(verdict.text("reason_category"), Some("ai_unsure"));
        assert_eq!(verdict.reason, "promo blast");
        assert_eq!(verdict.confidence, Some(0.75));
    }

    #[test]
    fn test_missing_category_is_error() {
        let result = parse_verdict(json!({"reason": "x"}), &general(), &ExtractionSchema::new("category"));
        assert!(matches!(result, Err(AssistantError::ClassificationError(_))));

        let result = parse_verdict(json!(["Work"]), &general(), &ExtractionSchema::new("category"));
        assert!(result.is_err());
    }

    #[test]
    fn test_confidence_is_clamped() {
        let verdict = parse_verdict(
            json!({"category": "Work", "confidence": 3}),
            &general(),
            &ExtractionSchema::new("category"),
        )
        .unwrap();
        assert_eq!(verdict.confidence, Some(1.0));
    }

    #[test]
    fn test_non_finite_confidence_is_dropped() {
        for raw in [json!("NaN"), json!("inf"), json!("-infinity")] {
            let verdict = parse_verdict(
                json!({"category": "Work", "confidence": raw}),
                &general(),
                &ExtractionSchema::new("category"),
            )
            .unwrap();
            assert_eq!(verdict.confidence, None);
        }

        let verdict = parse_verdict(
            json!({"category": "Work", "confidence": "-0.4"}),
            &general(),
            &ExtractionSchema::new("category"),
        )
        .unwrap();
        assert_eq!(verdict.confidence, Some(0.0));
    }

    #[test]
    fn test_safe_default_fills_enum_fields() {
        let reasons = CategorySet::new(&["age", "ai_unsure"], "ai_unsure");
        let schema = ExtractionSchema::new("suggestion").with_enum_field("reason_category", reasons);
        let err = AssistantError::ClassificationError("timeout".to_string());

        let verdict = safe_default(&CategorySet::new(&["keep"], "keep"), &schema, &err);
        assert_eq!(verdict.category, "keep");
        assert_eq!(verdict.text("reason_category"), Some("ai_unsure"));
        assert!(verdict.reason.starts_with("AI analysis failed:"));
    }
}
