//! Batch label mutation
//!
//! Plans are applied best-effort and non-transactionally. Label add and remove
//! are idempotent on the provider side, so re-running a plan retries whatever
//! chunks failed before.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::client::GmailClient;

/// Default provider ceiling for one batch call
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Labels to add to and remove from one message
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct LabelChange {
    add: BTreeSet<String>,
    remove: BTreeSet<String>,
}

/// Messages that share the same label change, sent together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelBatch {
    pub add: Vec<String>,
    pub remove: Vec<String>,
    pub message_ids: Vec<String>,
}

/// Per-message label changes, grouped into batch calls on apply
#[derive(Debug, Default, Clone)]
pub struct LabelMutationPlan {
    changes: BTreeMap<String, LabelChange>,
    order: Vec<String>,
}

impl LabelMutationPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `label_id` for `message_id`; repeated requests are ignored
    pub fn add(&mut self, label_id: &str, message_id: &str) -> bool {
        self.change(message_id).add.insert(label_id.to_string())
    }

    /// Queue removal of `label_id` from `message_id`
    pub fn remove(&mut self, label_id: &str, message_id: &str) -> bool {
        self.change(message_id).remove.insert(label_id.to_string())
    }

    fn change(&mut self, message_id: &str) -> &mut LabelChange {
        if !self.changes.contains_key(message_id) {
            self.order.push(message_id.to_string());
        }
        self.changes.entry(message_id.to_string()).or_default()
    }

    /// Group messages by identical (add, remove) sets, in first-queued order
    pub fn batches(&self) -> Vec<LabelBatch> {
        let mut groups: BTreeMap<(Vec<String>, Vec<String>), Vec<String>> = BTreeMap::new();
        for id in &self.order {
            if let Some(change) = self.changes.get(id) {
                let key = (
                    change.add.iter().cloned().collect(),
                    change.remove.iter().cloned().collect(),
                );
                groups.entry(key).or_default().push(id.clone());
            }
        }
        groups
            .into_iter()
            .map(|((add, remove), message_ids)| LabelBatch {
                add,
                remove,
                message_ids,
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Number of (message, label) pairs queued
    pub fn len(&self) -> usize {
        self.changes
            .values()
            .map(|c| c.add.len() + c.remove.len())
            .sum()
    }
}

/// Outcome of applying a plan
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MutationReport {
    /// Batch calls issued, successful or not
    pub calls: usize,
    /// Message IDs touched by a successful chunk
    pub mutated: BTreeSet<String>,
    /// Message IDs in a failed chunk
    pub failed: BTreeSet<String>,
    pub failed_chunks: usize,
}

impl MutationReport {
    pub fn is_clean(&self) -> bool {
        self.failed_chunks == 0
    }
}

pub struct BatchLabelMutator {
    client: Arc<dyn GmailClient>,
    batch_size: usize,
}

impl BatchLabelMutator {
    pub fn new(client: Arc<dyn GmailClient>, batch_size: usize) -> Self {
        Self {
            client,
            batch_size: batch_size.max(1),
        }
    }

    /// Apply every batch of the plan in chunks of `batch_size`
    ///
    /// A message's additions and removals travel in the same call, so it never
    /// loses a label without gaining its new one. A failed chunk is logged and
    /// recorded; later chunks still run.
    pub async fn apply(&self, plan: &LabelMutationPlan) -> MutationReport {
        let mut report = MutationReport::default();

        for batch in plan.batches() {
            for (index, chunk) in batch.message_ids.chunks(self.batch_size).enumerate() {
                report.calls += 1;
                match self
                    .client
                    .batch_modify_labels(chunk, &batch.add, &batch.remove)
                    .await
                {
                    Ok(()) => {
                        debug!(
                            "Chunk {}: +{:?} -{:?} on {} messages",
                            index + 1,
                            batch.add,
                            batch.remove,
                            chunk.len()
                        );
                        report.mutated.extend(chunk.iter().cloned());
                    }
                    Err(e) => {
                        warn!(
                            "Chunk {} (+{:?} -{:?}) failed for {} messages: {}",
                            index + 1,
                            batch.add,
                            batch.remove,
                            chunk.len(),
                            e
                        );
                        report.failed_chunks += 1;
                        report.failed.extend(chunk.iter().cloned());
                    }
                }
            }
        }

        info!(
            "Label mutation finished: {} calls, {} messages mutated, {} failed chunks",
            report.calls,
            report.mutated.len(),
            report.failed_chunks
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_deduplicates_pairs() {
        let mut plan = LabelMutationPlan::new();
        assert!(plan.add("L1", "m1"));
        assert!(!plan.add("L1", "m1"));
        assert!(plan.add("L2", "m1"));
        assert!(plan.remove("UNREAD", "m1"));
        assert_eq!(plan.len(), 3);

        assert_eq!(
            plan.batches(),
            vec![LabelBatch {
                add: vec!["L1".to_string(), "L2".to_string()],
                remove: vec!["UNREAD".to_string()],
                message_ids: vec!["m1".to_string()],
            }]
        );
    }

    #[test]
    fn test_batches_group_messages_with_the_same_change() {
        let mut plan = LabelMutationPlan::new();
        plan.add("L_A", "m2");
        plan.add("L_B", "m1");
        plan.add("L_A", "m3");

        let batches = plan.batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].add, vec!["L_A"]);
        assert_eq!(batches[0].message_ids, vec!["m2", "m3"]);
        assert_eq!(batches[1].message_ids, vec!["m1"]);
        assert!(batches.iter().all(|b| b.remove.is_empty()));
    }

    #[test]
    fn test_empty_plan() {
        let plan = LabelMutationPlan::new();
        assert!(plan.is_empty());
        assert_eq!(plan.len(), 0);
        assert!(plan.batches().is_empty());
    }
}
