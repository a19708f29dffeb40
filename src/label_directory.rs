//! Resolves label names to provider IDs, creating missing labels on demand
use crate::client::GmailClient;
use crate::error::{AssistantError, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of resolving a set of names; callers choose to abort or continue with the subset
#[derive(Debug, Default, Clone)]
pub struct LabelResolution {
    pub resolved: HashMap<String, String>,
    pub unresolved: Vec<String>,
}

impl LabelResolution {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }

    pub fn into_result(self) -> Result<HashMap<String, String>> {
        if self.unresolved.is_empty() {
            Ok(self.resolved)
        } else {
            Err(AssistantError::PartialResolution {
                unresolved: self.unresolved,
            })
        }
    }
}

/// Run-scoped label directory
///
/// The cache lives only as long as the directory. Names are compared
/// case-insensitively, matching how Gmail treats label names.
pub struct LabelDirectory {
    client: Arc<dyn GmailClient>,
    label_cache: HashMap<String, String>, // lowercase name -> id
    create_attempted: HashSet<String>,
    loaded: bool,
}

impl LabelDirectory {
    pub fn new(client: Arc<dyn GmailClient>) -> Self {
        Self {
            client,
            label_cache: HashMap::new(),
            create_attempted: HashSet::new(),
            loaded: false,
        }
    }

    /// Loads all existing labels from Gmail into the cache
    pub async fn load_existing_labels(&mut self) -> Result<usize> {
        let labels = self.client.list_labels().await?;
        let count = labels.len();

        for label in labels {
            self.label_cache.insert(label.name.to_lowercase(), label.id);
        }

        self.loaded = true;
        debug!("Loaded {} existing labels into cache", count);
        Ok(count)
    }

    fn cache_get(&self, name: &str) -> Option<&String> {
        self.label_cache.get(&name.to_lowercase())
    }

    fn cache_insert(&mut self, name: &str, id: String) {
        self.label_cache.insert(name.to_lowercase(), id);
    }

    /// Resolve every name, failing with `PartialResolution` if any is missing
    pub async fn resolve<S: AsRef<str>>(&mut self, names: &[S]) -> Result<HashMap<String, String>> {
        self.resolve_partial(names).await?.into_result()
    }

    /// Resolve what can be resolved and report the rest
    ///
    /// Lists labels once, then issues at most one create per missing name for the
    /// lifetime of this directory. A conflict on create means another session won
    /// the race, so the name is looked up again instead of failing.
    pub async fn resolve_partial<S: AsRef<str>>(&mut self, names: &[S]) -> Result<LabelResolution> {
        if !self.loaded {
            self.load_existing_labels().await?;
        }

        let mut resolution = LabelResolution::default();
        let mut seen = HashSet::new();

        for name in names.iter().map(|n| n.as_ref()) {
            if !seen.insert(name.to_lowercase()) {
                continue;
            }

            if let Some(id) = self.cache_get(name) {
                resolution.resolved.insert(name.to_string(), id.clone());
                continue;
            }

            match self.create_once(name).await {
                Some(id) => {
                    resolution.resolved.insert(name.to_string(), id);
                }
                None => resolution.unresolved.push(name.to_string()),
            }
        }

        if !resolution.unresolved.is_empty() {
            warn!(
                "Could not resolve labels: {}",
                resolution.unresolved.join(", ")
            );
        }
        Ok(resolution)
    }

    /// Identifier for a single name
    pub async fn id_for(&mut self, name: &str) -> Result<String> {
        let mut resolved = self.resolve(&[name]).await?;
        resolved
            .remove(name)
            .ok_or_else(|| AssistantError::PartialResolution {
                unresolved: vec![name.to_string()],
            })
    }

    async fn create_once(&mut self, name: &str) -> Option<String> {
        if !self.create_attempted.insert(name.to_lowercase()) {
            debug!("Label '{}' creation already attempted this run", name);
            return None;
        }

        info!("Creating label: {}", name);
        match self.client.create_label(name).await {
            Ok(id) => {
                self.cache_insert(name, id.clone());
                Some(id)
            }
            Err(e) if e.is_conflict() => {
                debug!("Label '{}' already exists, re-resolving by name", name);
                match self.load_existing_labels().await {
                    Ok(_) => self.cache_get(name).cloned(),
                    Err(e) => {
                        warn!("Failed to re-list labels after conflict on '{}': {}", name, e);
                        None
                    }
                }
            }
            Err(e) => {
                warn!("Failed to create label '{}': {}", name, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{LabelInfo, MessagePage};
    use crate::models::FilterSpec;
    use google_gmail1::api::Message;
    use mockall::mock;

    mock! {
        LabelStore {}

        #[async_trait::async_trait]
        impl GmailClient for LabelStore {
            async fn list_message_ids_page(&self, query: &str, page_size: u32, page_token: Option<String>) -> Result<MessagePage>;
            async fn get_message(&self, id: &str) -> Result<Message>;
            async fn list_labels(&self) -> Result<Vec<LabelInfo>>;
            async fn create_label(&self, name: &str) -> Result<String>;
            async fn batch_modify_labels(&self, message_ids: &[String], add_label_ids: &[String], remove_label_ids: &[String]) -> Result<()>;
            async fn send_message(&self, to: &str, subject: &str, body: &str) -> Result<String>;
            async fn trash_message(&self, id: &str) -> Result<()>;
            async fn create_filter(&self, filter: &FilterSpec, label_id: &str) -> Result<String>;
        }
    }

    fn existing(names: &[(&str, &str)]) -> Vec<LabelInfo> {
        names
            .iter()
            .map(|(id, name)| LabelInfo {
                id: id.to_string(),
                name: name.to_string(),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_same_missing_name_is_created_once_per_run() {
        let mut client = MockLabelStore::new();
        client
            .expect_list_labels()
            .times(1)
            .returning(|| Ok(existing(&[("L_W", "Work")])));
        client
            .expect_create_label()
            .with(mockall::predicate::eq("Old Stuff"))
            .times(1)
            .returning(|_| Ok("L_OLD".to_string()));

        let mut directory = LabelDirectory::new(Arc::new(client));
        let first = directory
            .resolve(&["Old Stuff", "Work", "old stuff"])
            .await
            .unwrap();
        assert_eq!(first["Old Stuff"], "L_OLD");
        assert_eq!(first["Work"], "L_W");
        assert_eq!(first.len(), 2);

        let second = directory.resolve(&["Old Stuff"]).await.unwrap();
        assert_eq!(second["Old Stuff"], "L_OLD");
        assert_eq!(directory.id_for("OLD STUFF").await.unwrap(), "L_OLD");
    }

    #[tokio::test]
    async fn test_failed_create_leaves_name_unresolved() {
        let mut client = MockLabelStore::new();
        client
            .expect_list_labels()
            .times(1)
            .returning(|| Ok(existing(&[("L_W", "Work")])));
        client.expect_create_label().times(1).returning(|_| {
            Err(AssistantError::Forbidden("insufficient permission".to_string()))
        });

        let mut directory = LabelDirectory::new(Arc::new(client));
        let resolution = directory.resolve_partial(&["Work", "Forums"]).await.unwrap();
        assert!(!resolution.is_complete());
        assert_eq!(resolution.unresolved, vec!["Forums"]);
        assert_eq!(resolution.resolved["Work"], "L_W");

        // no second create attempt for the same name
        match directory.resolve(&["Forums"]).await {
            Err(AssistantError::PartialResolution { unresolved }) => {
                assert_eq!(unresolved, vec!["Forums"])
            }
            other => panic!("expected PartialResolution, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_conflict_relists_instead_of_failing() {
        let mut client = MockLabelStore::new();
        let mut listings = 0;
        client.expect_list_labels().times(2).returning(move || {
            listings += 1;
            if listings == 1 {
                Ok(vec![])
            } else {
                Ok(existing(&[("L_N", "Notifications")]))
            }
        });
        client
            .expect_create_label()
            .times(1)
            .returning(|_| Err(AssistantError::Conflict("exists".to_string())));

        let mut directory = LabelDirectory::new(Arc::new(client));
        assert_eq!(directory.id_for("Notifications").await.unwrap(), "L_N");
    }
}
