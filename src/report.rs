//! Aggregates verdicts into console, narrative and snapshot views
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::classifier::CategorySet;
use crate::error::Result;
use crate::models::{ClassificationVerdict, MessageRecord};
use crate::state::{ArtifactStore, Snapshot};

/// One materialized message paired with its verdict
#[derive(Debug, Clone)]
pub struct ClassifiedMessage {
    pub record: MessageRecord,
    pub verdict: ClassificationVerdict,
}

impl ClassifiedMessage {
    pub fn entry(&self) -> VerdictEntry {
        VerdictEntry {
            email_id: self.record.id.clone(),
            thread_id: self.record.thread_id.clone(),
            subject: self.record.subject.clone(),
            sender: self.record.sender.clone(),
            received_date: self.record.received,
            category: self.verdict.category.clone(),
            reason: self.verdict.reason.clone(),
            confidence: self.verdict.confidence,
            extra: self.verdict.extra.clone(),
        }
    }
}

/// Snapshot row: record and verdict fields side by side
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerdictEntry {
    pub email_id: String,
    pub thread_id: String,
    pub subject: String,
    pub sender: String,
    pub received_date: DateTime<Utc>,
    pub category: String,
    pub reason: String,
    pub confidence: Option<f64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorizedEmails {
    pub categorized_emails: Vec<VerdictEntry>,
}

/// Result of one categorize run, in selection order
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub title: String,
    pub generated_at: DateTime<Utc>,
    categories: Vec<String>,
    results: Vec<ClassifiedMessage>,
}

impl RunReport {
    pub fn new(title: &str, categories: &CategorySet, results: Vec<ClassifiedMessage>) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            title: title.to_string(),
            generated_at: Utc::now(),
            categories: categories.values().to_vec(),
            results,
        }
    }

    pub fn results(&self) -> &[ClassifiedMessage] {
        &self.results
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn count(&self, category: &str) -> usize {
        self.results
            .iter()
            .filter(|r| r.verdict.category == category)
            .count()
    }

    /// Counts per category in declared order, zeros included
    pub fn breakdown(&self) -> Vec<(String, usize)> {
        self.categories
            .iter()
            .map(|c| (c.clone(), self.count(c)))
            .collect()
    }

    pub fn group(&self, category: &str) -> Vec<&ClassifiedMessage> {
        self.results
            .iter()
            .filter(|r| r.verdict.category == category)
            .collect()
    }

    /// Plain summary lines for the console
    pub fn to_summary(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Total Emails Analyzed: {}\n", self.total()));
        out.push_str("Breakdown by Category:\n");
        for (category, count) in self.breakdown() {
            out.push_str(&format!("- {}: {}\n", category, count));
        }
        out
    }

    /// Flat narrative report for human review
    pub fn to_narrative(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("--- {} ---\n", self.title));
        out.push_str(&format!("Generated on: {}\n\n", self.generated_at.to_rfc3339()));
        out.push_str("--- Executive Summary ---\n");
        out.push_str(&self.to_summary());
        out.push('\n');

        out.push_str("\n--- Detailed Categorization ---\n");
        for category in &self.categories {
            let group = self.group(category);
            out.push_str(&format!(
                "\n--- Category: {} ({} emails) ---\n",
                category,
                group.len()
            ));
            if group.is_empty() {
                out.push_str("No emails in this category.\n");
                out.push_str(&format!("{}\n", "-".repeat(30)));
                continue;
            }
            for item in group {
                out.push_str(&format!(
                    "Subject: {}\nFrom: {}\nDate: {}\n",
                    item.record.subject,
                    item.record.sender,
                    item.record.received.to_rfc3339()
                ));
                out.push_str(&format!("Reason: {}\n", item.verdict.reason));
                if let Some(confidence) = item.verdict.confidence {
                    out.push_str(&format!("Confidence: {:.2}\n", confidence));
                }
                out.push_str(&format!("Email ID: {}\n", item.record.id));
                out.push_str(&format!("{}\n", "-".repeat(30)));
            }
        }
        out
    }

    pub fn to_snapshot(&self) -> Snapshot<CategorizedEmails> {
        Snapshot {
            last_updated: self.generated_at,
            body: CategorizedEmails {
                categorized_emails: self.results.iter().map(ClassifiedMessage::entry).collect(),
            },
        }
    }
}

/// Paths written for one report
#[derive(Debug, Clone)]
pub struct EmittedReport {
    pub summary: String,
    pub narrative_path: PathBuf,
    pub snapshot_path: PathBuf,
}

/// Persists report views through the artifact store
pub struct ReportEmitter {
    store: ArtifactStore,
}

impl ReportEmitter {
    pub fn new(store: ArtifactStore) -> Self {
        Self { store }
    }

    /// Write the default narrative and snapshot views
    pub async fn emit(
        &self,
        report: &RunReport,
        narrative_file: &str,
        snapshot_file: &str,
    ) -> Result<EmittedReport> {
        self.emit_with(
            report,
            narrative_file,
            &report.to_narrative(),
            snapshot_file,
            &report.to_snapshot(),
        )
        .await
    }

    /// Write caller-formatted views
    pub async fn emit_with<T: Serialize>(
        &self,
        report: &RunReport,
        narrative_file: &str,
        narrative: &str,
        snapshot_file: &str,
        snapshot: &Snapshot<T>,
    ) -> Result<EmittedReport> {
        let narrative_path = self.store.write_text(narrative_file, narrative).await?;
        let snapshot_path = self.store.write_snapshot(snapshot_file, snapshot).await?;
        tracing::info!(
            "Report {} written: {:?}, {:?}",
            report.run_id,
            narrative_path,
            snapshot_path
        );
        Ok(EmittedReport {
            summary: report.to_summary(),
            narrative_path,
            snapshot_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn classified(id: &str, category: &str) -> ClassifiedMessage {
        ClassifiedMessage {
            record: MessageRecord {
                id: id.to_string(),
                thread_id: format!("t-{}", id),
                subject: format!("Subject {}", id),
                sender: "Sender <s@example.com>".to_string(),
                received: Utc::now(),
                snippet: String::new(),
                body: None,
                headers: BTreeMap::new(),
            },
            verdict: ClassificationVerdict::new(category, "because").with_confidence(0.5),
        }
    }

    fn categories() -> CategorySet {
        CategorySet::new(&["Work", "Personal", "Other"], "Other")
    }

    #[test]
    fn test_breakdown_keeps_declared_order() {
        let report = RunReport::new(
            "Email Categorization Report",
            &categories(),
            vec![classified("1", "Other"), classified("2", "Personal"), classified("3", "Other")],
        );

        assert_eq!(
            report.breakdown(),
            vec![
                ("Work".to_string(), 0),
                ("Personal".to_string(), 1),
                ("Other".to_string(), 2)
            ]
        );
        assert_eq!(report.total(), 3);
    }

    #[test]
    fn test_narrative_lists_empty_categories() {
        let report = RunReport::new(
            "Email Categorization Report",
            &categories(),
            vec![classified("1", "Personal")],
        );
        let narrative = report.to_narrative();

        assert!(narrative.starts_with("--- Email Categorization Report ---"));
        assert!(narrative.contains("--- Category: Work (0 emails) ---\nNo emails in this category."));
        assert!(narrative.contains("--- Category: Personal (1 emails) ---"));
        assert!(narrative.contains("Confidence: 0.50"));
        assert!(narrative.contains("Email ID: 1"));
    }

    #[test]
    fn test_snapshot_preserves_order() {
        let report = RunReport::new(
            "r",
            &categories(),
            vec![classified("b", "Work"), classified("a", "Other")],
        );
        let snapshot = report.to_snapshot();
        let ids: Vec<&str> = snapshot
            .body
            .categorized_emails
            .iter()
            .map(|e| e.email_id.as_str())
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
    }
}
