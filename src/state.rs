//! Durable run artifacts: snapshots, narratives, response history, action log
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::error::{AssistantError, Result};

/// Structured snapshot: a timestamp plus the command's named lists
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot<T> {
    pub last_updated: DateTime<Utc>,
    #[serde(flatten)]
    pub body: T,
}

impl<T> Snapshot<T> {
    pub fn now(body: T) -> Self {
        Self {
            last_updated: Utc::now(),
            body,
        }
    }
}

/// Flat-file blob store rooted at the artifact directory
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path(name).exists()
    }

    async fn ensure_parent(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write beside the target, then rename over it
    async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
        Self::ensure_parent(path).await?;
        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp = path.with_file_name(tmp_name);

        tokio::fs::write(&tmp, contents).await?;
        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Write a snapshot, overwriting the previous run's
    pub async fn write_snapshot<T: Serialize>(&self, name: &str, snapshot: &Snapshot<T>) -> Result<PathBuf> {
        let path = self.path(name);
        let json = serde_json::to_string_pretty(snapshot)?;
        Self::write_atomic(&path, json.as_bytes()).await?;
        tracing::debug!("Saved snapshot to {:?}", path);
        Ok(path)
    }

    /// Read a predecessor's snapshot; a missing file names the command that produces it
    pub async fn read_snapshot<T: DeserializeOwned>(
        &self,
        name: &str,
        producer: &str,
    ) -> Result<Snapshot<T>> {
        let path = self.path(name);
        if !path.exists() {
            return Err(AssistantError::ResourceNotFound {
                resource: format!("{}", path.display()),
                hint: format!("Run '{}' first to create it.", producer),
            });
        }

        let json = tokio::fs::read_to_string(&path).await?;
        let snapshot: Snapshot<T> = serde_json::from_str(&json)?;
        tracing::info!(
            "Loaded snapshot {:?} (last updated {})",
            path,
            snapshot.last_updated
        );
        Ok(snapshot)
    }

    pub async fn write_text(&self, name: &str, content: &str) -> Result<PathBuf> {
        let path = self.path(name);
        Self::write_atomic(&path, content.as_bytes()).await?;
        tracing::debug!("Wrote {} bytes to {:?}", content.len(), path);
        Ok(path)
    }
}

/// One reply that was sent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RespondedEmail {
    pub subject: String,
    pub from: String,
    pub responded_at: DateTime<Utc>,
}

/// Replies sent across runs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseHistory {
    #[serde(default)]
    pub responded_emails: Vec<RespondedEmail>,
}

impl ResponseHistory {
    pub const FILE: &'static str = "response_history.json";

    pub async fn load(store: &ArtifactStore) -> Result<Self> {
        let path = store.path(Self::FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let json = tokio::fs::read_to_string(&path).await?;
        Ok(serde_json::from_str(&json)?)
    }

    pub async fn save(&self, store: &ArtifactStore) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        store.write_text(Self::FILE, &json).await?;
        Ok(())
    }

    /// Record a reply and persist immediately
    pub async fn record(store: &ArtifactStore, subject: &str, from: &str) -> Result<()> {
        let mut history = Self::load(store).await?;
        history.responded_emails.push(RespondedEmail {
            subject: subject.to_string(),
            from: from.to_string(),
            responded_at: Utc::now(),
        });
        history.save(store).await
    }
}

/// Append-only log of cleanup actions
#[derive(Debug, Clone)]
pub struct ActionLog {
    path: PathBuf,
}

impl ActionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, message: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let line = format!("[{}] {}\n", Utc::now().format("%Y-%m-%d %H:%M:%S"), message);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
