use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AssistantError, Result};

/// Longest look-back accepted from config, flags or prompts
pub const MAX_LOOKBACK_DAYS: u32 = 36_500;
pub const MAX_LOOKBACK_HOURS: u32 = MAX_LOOKBACK_DAYS * 24;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub triage: TriageConfig,
    #[serde(default)]
    pub opportunities: OpportunityConfig,
    #[serde(default)]
    pub replies: ReplyConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub categorizer: CategorizerConfig,
    #[serde(default)]
    pub mutation: MutationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,
    #[serde(default = "default_credentials")]
    pub credentials: PathBuf,
    #[serde(default = "default_token_cache")]
    pub token_cache: PathBuf,
    /// Relative to `artifact_dir`
    #[serde(default = "default_action_log")]
    pub action_log: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            artifact_dir: default_artifact_dir(),
            credentials: default_credentials(),
            token_cache: default_token_cache(),
            action_log: default_action_log(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default = "default_smart_model")]
    pub triage_model: String,
    #[serde(default = "default_smart_model")]
    pub opportunity_model: String,
    #[serde(default = "default_report_model")]
    pub report_model: String,
    #[serde(default = "default_smart_model")]
    pub reply_model: String,
    #[serde(default = "default_bulk_model")]
    pub bulk_model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            api_base: None,
            triage_model: default_smart_model(),
            opportunity_model: default_smart_model(),
            report_model: default_report_model(),
            reply_model: default_smart_model(),
            bulk_model: default_bulk_model(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageConfig {
    #[serde(default = "default_triage_hours")]
    pub default_hours: u32,
    #[serde(default = "default_ai_page")]
    pub max_results: u32,
    #[serde(default)]
    pub include_read: bool,
    #[serde(default = "default_large_body_budget")]
    pub body_char_budget: usize,
    #[serde(default = "default_snapshot_body_chars")]
    pub snapshot_body_chars: usize,
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            default_hours: default_triage_hours(),
            max_results: default_ai_page(),
            include_read: false,
            body_char_budget: default_large_body_budget(),
            snapshot_body_chars: default_snapshot_body_chars(),
            preview_chars: default_preview_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpportunityConfig {
    #[serde(default = "default_opportunity_hours")]
    pub hours: u32,
    #[serde(default = "default_ai_page")]
    pub max_results: u32,
    #[serde(default = "default_large_body_budget")]
    pub body_char_budget: usize,
    #[serde(default = "default_report_snippet_chars")]
    pub report_snippet_chars: usize,
    #[serde(default = "default_high_confidence")]
    pub high_confidence: f64,
}

impl Default for OpportunityConfig {
    fn default() -> Self {
        Self {
            hours: default_opportunity_hours(),
            max_results: default_ai_page(),
            body_char_budget: default_large_body_budget(),
            report_snippet_chars: default_report_snippet_chars(),
            high_confidence: default_high_confidence(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyConfig {
    #[serde(default)]
    pub sender_name: String,
    #[serde(default = "default_signoff")]
    pub signoff: String,
    #[serde(default = "default_max_words")]
    pub max_words: u32,
    #[serde(default = "default_reply_preview_chars")]
    pub preview_chars: usize,
    #[serde(default = "default_edit_preview_chars")]
    pub edit_preview_chars: usize,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            sender_name: String::new(),
            signoff: default_signoff(),
            max_words: default_max_words(),
            preview_chars: default_reply_preview_chars(),
            edit_preview_chars: default_edit_preview_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    #[serde(default = "default_cleanup_days")]
    pub default_days: u32,
    #[serde(default = "default_ai_page")]
    pub max_results: u32,
    #[serde(default = "default_age_threshold_days")]
    pub age_threshold_days: i64,
    #[serde(default = "default_small_body_budget")]
    pub body_char_budget: usize,
    #[serde(default = "default_link_timeout_secs")]
    pub link_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            default_days: default_cleanup_days(),
            max_results: default_ai_page(),
            age_threshold_days: default_age_threshold_days(),
            body_char_budget: default_small_body_budget(),
            link_timeout_secs: default_link_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default = "default_archive_label")]
    pub label: String,
    #[serde(default = "default_scan_page")]
    pub page_size: u32,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            label: default_archive_label(),
            page_size: default_scan_page(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorizerConfig {
    #[serde(default = "default_triage_hours")]
    pub hours: u32,
    #[serde(default = "default_categorizer_max")]
    pub max_results: u32,
    #[serde(default = "default_small_body_budget")]
    pub body_char_budget: usize,
}

impl Default for CategorizerConfig {
    fn default() -> Self {
        Self {
            hours: default_triage_hours(),
            max_results: default_categorizer_max(),
            body_char_budget: default_small_body_budget(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationConfig {
    /// Provider ceiling for one batch modify call
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from(".email-assistant")
}

fn default_credentials() -> PathBuf {
    PathBuf::from("credentials.json")
}

fn default_token_cache() -> PathBuf {
    PathBuf::from(".email-assistant/token.json")
}

fn default_action_log() -> PathBuf {
    PathBuf::from("logs/action_executor_log.txt")
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_smart_model() -> String {
    "gpt-4.1".to_string()
}

fn default_report_model() -> String {
    "gpt-4".to_string()
}

fn default_bulk_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_triage_hours() -> u32 {
    24
}

fn default_opportunity_hours() -> u32 {
    72
}

fn default_cleanup_days() -> u32 {
    30
}

fn default_ai_page() -> u32 {
    50
}

fn default_categorizer_max() -> u32 {
    100
}

fn default_scan_page() -> u32 {
    500
}

fn default_large_body_budget() -> usize {
    4000
}

fn default_small_body_budget() -> usize {
    200
}

fn default_snapshot_body_chars() -> usize {
    1000
}

fn default_preview_chars() -> usize {
    300
}

fn default_report_snippet_chars() -> usize {
    500
}

fn default_high_confidence() -> f64 {
    0.8
}

fn default_signoff() -> String {
    "Best regards".to_string()
}

fn default_max_words() -> u32 {
    150
}

fn default_reply_preview_chars() -> usize {
    1000
}

fn default_edit_preview_chars() -> usize {
    500
}

fn default_age_threshold_days() -> i64 {
    730
}

fn default_link_timeout_secs() -> u64 {
    10
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36".to_string()
}

fn default_archive_label() -> String {
    "Old Stuff".to_string()
}

fn default_batch_size() -> usize {
    100
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        // If file doesn't exist, return default config with warning
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            AssistantError::ConfigError(format!("Failed to read config file: {}", e))
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| {
            AssistantError::ConfigError(format!("Failed to parse config file: {}", e))
        })?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                AssistantError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| {
            AssistantError::ConfigError(format!("Failed to serialize config: {}", e))
        })?;

        tokio::fs::write(path, content).await.map_err(|e| {
            AssistantError::ConfigError(format!("Failed to write config file: {}", e))
        })?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let windows = [
            ("triage.default_hours", self.triage.default_hours, MAX_LOOKBACK_HOURS),
            ("opportunities.hours", self.opportunities.hours, MAX_LOOKBACK_HOURS),
            ("cleanup.default_days", self.cleanup.default_days, MAX_LOOKBACK_DAYS),
            ("categorizer.hours", self.categorizer.hours, MAX_LOOKBACK_HOURS),
        ];
        for (name, value, max) in windows {
            if value == 0 {
                return Err(AssistantError::ConfigError(format!(
                    "{} must be at least 1",
                    name
                )));
            }
            if value > max {
                return Err(AssistantError::ConfigError(format!(
                    "{} must be at most {}",
                    name, max
                )));
            }
        }

        let pages = [
            ("triage.max_results", self.triage.max_results),
            ("opportunities.max_results", self.opportunities.max_results),
            ("cleanup.max_results", self.cleanup.max_results),
            ("categorizer.max_results", self.categorizer.max_results),
            ("archive.page_size", self.archive.page_size),
        ];
        for (name, value) in pages {
            if value == 0 || value > 500 {
                return Err(AssistantError::ConfigError(format!(
                    "{} must be between 1 and 500 (provider page limit)",
                    name
                )));
            }
        }

        if self.mutation.batch_size == 0 || self.mutation.batch_size > 1000 {
            return Err(AssistantError::ConfigError(
                "mutation.batch_size must be between 1 and 1000".to_string(),
            ));
        }

        let models = [
            ("llm.triage_model", &self.llm.triage_model),
            ("llm.opportunity_model", &self.llm.opportunity_model),
            ("llm.report_model", &self.llm.report_model),
            ("llm.reply_model", &self.llm.reply_model),
            ("llm.bulk_model", &self.llm.bulk_model),
        ];
        for (name, value) in models {
            if value.trim().is_empty() {
                return Err(AssistantError::ConfigError(format!(
                    "{} cannot be empty",
                    name
                )));
            }
        }

        if self.llm.api_key_env.trim().is_empty() {
            return Err(AssistantError::ConfigError(
                "llm.api_key_env cannot be empty".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.opportunities.high_confidence) {
            return Err(AssistantError::ConfigError(
                "opportunities.high_confidence must be within [0, 1]".to_string(),
            ));
        }

        if self.archive.label.trim().is_empty() {
            return Err(AssistantError::ConfigError(
                "archive.label cannot be empty".to_string(),
            ));
        }

        if self.cleanup.age_threshold_days <= 0 {
            return Err(AssistantError::ConfigError(
                "cleanup.age_threshold_days must be greater than 0".to_string(),
            ));
        }

        if self.replies.max_words == 0 {
            return Err(AssistantError::ConfigError(
                "replies.max_words must be greater than 0".to_string(),
            ));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    pub fn action_log_path(&self) -> PathBuf {
        self.paths.artifact_dir.join(&self.paths.action_log)
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        let config = Self::default();
        config.save(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.triage.default_hours, 24);
        assert_eq!(config.triage.max_results, 50);
        assert!(!config.triage.include_read);
        assert_eq!(config.triage.body_char_budget, 4000);

        assert_eq!(config.opportunities.hours, 72);
        assert_eq!(config.opportunities.high_confidence, 0.8);

        assert_eq!(config.cleanup.default_days, 30);
        assert_eq!(config.cleanup.age_threshold_days, 730);
        assert_eq!(config.cleanup.body_char_budget, 200);

        assert_eq!(config.archive.label, "Old Stuff");
        assert_eq!(config.archive.page_size, 500);
        assert_eq!(config.categorizer.max_results, 100);
        assert_eq!(config.mutation.batch_size, 100);

        assert_eq!(config.llm.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.llm.bulk_model, "gpt-3.5-turbo");
        assert_eq!(config.llm.report_model, "gpt-4");
        assert!(config.llm.api_base.is_none());
    }

    #[test]
    fn test_config_validation_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_zero_window() {
        let mut config = Config::default();
        config.triage.default_hours = 0;
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("at least 1"));
    }

    #[test]
    fn test_config_validation_window_too_long() {
        let mut config = Config::default();
        config.cleanup.default_days = MAX_LOOKBACK_DAYS + 1;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cleanup.default_days must be at most"));

        let mut config = Config::default();
        config.categorizer.hours = MAX_LOOKBACK_HOURS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_page_size_too_high() {
        let mut config = Config::default();
        config.archive.page_size = 501;
        let result = config.validate();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("archive.page_size"));
    }

    #[test]
    fn test_config_validation_batch_size_bounds() {
        let mut config = Config::default();

        config.mutation.batch_size = 0;
        assert!(config.validate().is_err());

        config.mutation.batch_size = 1001;
        assert!(config.validate().is_err());

        config.mutation.batch_size = 1;
        assert!(config.validate().is_ok());

        config.mutation.batch_size = 1000;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_empty_model() {
        let mut config = Config::default();
        config.llm.reply_model = "  ".to_string();
        let result = config.validate();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("llm.reply_model cannot be empty"));
    }

    #[test]
    fn test_config_validation_confidence_range() {
        let mut config = Config::default();
        config.opportunities.high_confidence = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_action_log_path_under_artifact_dir() {
        let config = Config::default();
        assert_eq!(
            config.action_log_path(),
            PathBuf::from(".email-assistant/logs/action_executor_log.txt")
        );
    }

    #[tokio::test]
    async fn test_config_load_save_roundtrip() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        let mut config = Config::default();
        config.replies.sender_name = "Jordan".to_string();
        config.llm.api_base = Some("http://localhost:9999/v1".to_string());
        config.save(path).await.unwrap();

        let loaded = Config::load(path).await.unwrap();

        assert_eq!(loaded.replies.sender_name, "Jordan");
        assert_eq!(
            loaded.llm.api_base.as_deref(),
            Some("http://localhost:9999/v1")
        );
        assert_eq!(loaded.archive.label, config.archive.label);
    }

    #[tokio::test]
    async fn test_config_load_nonexistent_returns_default() {
        let path = Path::new("/tmp/nonexistent-email-assistant-config-12345.toml");

        let config = Config::load(path).await.unwrap();

        assert_eq!(config.triage.default_hours, 24);
        assert_eq!(config.mutation.batch_size, 100);
    }

    #[tokio::test]
    async fn test_config_load_invalid_toml() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        tokio::fs::write(path, "this is not valid toml {[}]")
            .await
            .unwrap();

        let result = Config::load(path).await;
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Failed to parse config file"));
    }

    #[tokio::test]
    async fn test_config_partial_with_defaults() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        let partial_config = r#"
[cleanup]
default_days = 90

[archive]
label = "Archived/Unread"
"#;
        tokio::fs::write(path, partial_config).await.unwrap();

        let config = Config::load(path).await.unwrap();

        assert_eq!(config.cleanup.default_days, 90);
        assert_eq!(config.archive.label, "Archived/Unread");

        assert_eq!(config.cleanup.max_results, 50);
        assert_eq!(config.archive.page_size, 500);
        assert_eq!(config.llm.triage_model, "gpt-4.1");
    }

    #[tokio::test]
    async fn test_config_create_example() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        Config::create_example(path).await.unwrap();

        assert!(path.exists());
        let config = Config::load(path).await.unwrap();
        assert_eq!(config.opportunities.hours, 72);
    }
}
