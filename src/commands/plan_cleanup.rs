//! Cleanup planning: pick deletion and unsubscribe candidates among older mail

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::{check_lookback, progress_observer, prompt_positive, CommandContext, CommandOptions};
use crate::classifier::{CategorySet, ClassificationRequest, ExtractionSchema};
use crate::cli::console;
use crate::config::MAX_LOOKBACK_DAYS;
use crate::error::Result;
use crate::materializer::parse_list_unsubscribe;
use crate::models::{ClassificationVerdict, MessageRecord};
use crate::pipeline::{CategorizeJob, CategorizePipeline};
use crate::report::{ClassifiedMessage, ReportEmitter, RunReport};
use crate::selector::SelectionCriteria;
use crate::state::Snapshot;

pub const CANDIDATES_FILE: &str = "deletion_candidates.json";
pub const REPORT_FILE: &str = "deletion_plan_report.txt";

pub const SUGGESTIONS: [&str; 3] = ["strong_candidate", "possible_candidate", "keep"];

pub const REASON_CATEGORIES: [&str; 14] = [
    "age",
    "sender_rule",
    "subject_rule",
    "ai_promotional",
    "ai_social",
    "ai_outdated_alert",
    "ai_newsletter",
    "ai_general_clutter",
    "ai_transactional",
    "ai_personal",
    "ai_work_related",
    "ai_other_deletable",
    "ai_unsure",
    "manual_keep",
];

const SYSTEM_PROMPT: &str = "You are an email management assistant helping to identify emails for deletion. Be conservative with important-looking emails.";

/// One planned deletion, as stored for the execution stage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeletionCandidate {
    pub email_id: String,
    pub subject: String,
    pub sender: String,
    pub received_date: DateTime<Utc>,
    pub suggestion: String,
    pub reason_category: String,
    pub reason_detail: String,
    pub ai_confidence: Option<f64>,
    pub list_unsubscribe_mailto: Option<String>,
    pub list_unsubscribe_http: Option<String>,
}

impl DeletionCandidate {
    pub fn from_classified(item: &ClassifiedMessage) -> Self {
        let targets = parse_list_unsubscribe(item.record.header("List-Unsubscribe"));
        Self {
            email_id: item.record.id.clone(),
            subject: item.record.subject.clone(),
            sender: item.record.sender.clone(),
            received_date: item.record.received,
            suggestion: item.verdict.category.clone(),
            reason_category: item
                .verdict
                .text("reason_category")
                .unwrap_or("ai_unsure")
                .to_string(),
            reason_detail: item.verdict.reason.clone(),
            ai_confidence: item.verdict.confidence,
            list_unsubscribe_mailto: targets.mailto,
            list_unsubscribe_http: targets.http,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeletionCandidates {
    #[serde(default)]
    pub strong_candidates: Vec<DeletionCandidate>,
    #[serde(default)]
    pub possible_candidates: Vec<DeletionCandidate>,
}

impl DeletionCandidates {
    pub fn from_report(report: &RunReport) -> Self {
        let group = |suggestion: &str| {
            report
                .group(suggestion)
                .into_iter()
                .map(DeletionCandidate::from_classified)
                .collect::<Vec<_>>()
        };
        Self {
            strong_candidates: group("strong_candidate"),
            possible_candidates: group("possible_candidate"),
        }
    }

    /// Strong candidates first, then possible ones
    pub fn all(&self) -> Vec<&DeletionCandidate> {
        self.strong_candidates
            .iter()
            .chain(self.possible_candidates.iter())
            .collect()
    }

    /// Strong candidates per reason, in order of first appearance
    pub fn strong_reasons(&self) -> Vec<(String, usize)> {
        let mut counts: Vec<(String, usize)> = Vec::new();
        for candidate in &self.strong_candidates {
            match counts.iter_mut().find(|(r, _)| *r == candidate.reason_category) {
                Some((_, n)) => *n += 1,
                None => counts.push((candidate.reason_category.clone(), 1)),
            }
        }
        counts
    }
}

fn age_description(days: i64) -> String {
    if days > 0 && days % 365 == 0 {
        let years = days / 365;
        format!("Email older than {} year{}.", years, if years == 1 { "" } else { "s" })
    } else {
        format!("Email older than {} days.", days)
    }
}

struct CleanupJob {
    criteria: SelectionCriteria,
    suggestions: CategorySet,
    model: String,
    body_budget: usize,
    age_threshold_days: i64,
}

impl CategorizeJob for CleanupJob {
    fn title(&self) -> &str {
        "Email Deletion Plan Report"
    }

    fn criteria(&self) -> SelectionCriteria {
        self.criteria.clone()
    }

    fn categories(&self) -> &CategorySet {
        &self.suggestions
    }

    fn schema(&self) -> ExtractionSchema {
        ExtractionSchema::new("suggestion")
            .with_enum_field("reason_category", CategorySet::new(&REASON_CATEGORIES, "ai_unsure"))
    }

    /// Very old mail is a strong candidate without asking the model
    fn precheck(&self, record: &MessageRecord) -> Option<ClassificationVerdict> {
        let cutoff = Utc::now() - Duration::days(self.age_threshold_days);
        (record.received < cutoff).then(|| {
            ClassificationVerdict::new("strong_candidate", age_description(self.age_threshold_days))
                .with_extra("reason_category", Value::String("age".to_string()))
        })
    }

    fn request(&self, record: &MessageRecord) -> ClassificationRequest {
        let user = format!(
            r#"Analyze the following email to determine if it's a strong candidate for deletion.
Consider if it's promotional, a social media notification, an outdated alert, a newsletter the user likely no longer reads,
or general clutter. Prioritize keeping emails that seem transactional (receipts, bookings), personal, or work-related unless very old.
Email Details:
Subject: {subject}
From: {from}
Date: {date}
Snippet: {snippet}
Body (first {budget} chars): {body}
Based on this, provide a JSON response with:
- "suggestion": "strong_candidate", "possible_candidate", or "keep"
- "reason_category": "ai_promotional", "ai_social", "ai_outdated_alert", "ai_newsletter", "ai_general_clutter", "ai_transactional", "ai_personal", "ai_work_related", "ai_unsure"
- "reason_detail": A brief explanation for your suggestion.
- "ai_confidence": Your confidence in this assessment (0.0 to 1.0)."#,
            subject = record.subject,
            from = record.sender,
            date = record.received.format("%Y-%m-%d"),
            snippet = record.snippet,
            budget = self.body_budget,
            body = record.body_within(self.body_budget),
        );
        ClassificationRequest {
            model: self.model.clone(),
            system: SYSTEM_PROMPT.to_string(),
            user,
        }
    }
}

fn write_candidates(out: &mut String, candidates: &[DeletionCandidate], empty: &str) {
    if candidates.is_empty() {
        out.push_str(empty);
        out.push('\n');
        return;
    }
    for c in candidates {
        out.push_str(&format!(
            "Subject: {}\nFrom: {}\nDate: {}\n",
            c.subject,
            c.sender,
            c.received_date.to_rfc3339()
        ));
        out.push_str(&format!(
            "Reason Category: {}\nDetail: {}\n",
            c.reason_category, c.reason_detail
        ));
        if let Some(confidence) = c.ai_confidence {
            out.push_str(&format!("AI Confidence: {:.2}\n", confidence));
        }
        if let Some(mailto) = &c.list_unsubscribe_mailto {
            out.push_str(&format!("Unsubscribe Mailto: {}\n", mailto));
        }
        if let Some(http) = &c.list_unsubscribe_http {
            out.push_str(&format!("Unsubscribe HTTP: {}\n", http));
        }
        out.push_str(&format!("Email ID: {}\n{}\n", c.email_id, "-".repeat(30)));
    }
}

pub fn render_plan(report: &RunReport, candidates: &DeletionCandidates) -> String {
    let mut out = String::new();
    out.push_str("--- Email Deletion Plan Report ---\n");
    out.push_str(&format!("Generated on: {}\n\n", report.generated_at.to_rfc3339()));
    out.push_str("--- Executive Summary ---\n");
    out.push_str(&format!("Total Emails Analyzed: {}\n", report.total()));
    out.push_str(&format!(
        "Strong Deletion Candidates: {}\n",
        candidates.strong_candidates.len()
    ));
    out.push_str(&format!(
        "Possible Deletion Candidates: {}\n\n",
        candidates.possible_candidates.len()
    ));

    let reasons = candidates.strong_reasons();
    if !reasons.is_empty() {
        out.push_str("Breakdown of Strong Candidates by Reason:\n");
        for (reason, count) in &reasons {
            out.push_str(&format!("- {}: {}\n", reason, count));
        }
        out.push('\n');
    }

    out.push_str("\n--- Strong Deletion Candidates ---\n");
    write_candidates(
        &mut out,
        &candidates.strong_candidates,
        "No strong candidates identified.",
    );
    out.push_str("\n--- Possible Deletion Candidates ---\n");
    write_candidates(
        &mut out,
        &candidates.possible_candidates,
        "No possible candidates identified.",
    );
    out
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupPlanSummary {
    pub analyzed: usize,
    pub strong: usize,
    pub possible: usize,
}

pub async fn run(ctx: &CommandContext, options: &CommandOptions) -> Result<CleanupPlanSummary> {
    let settings = &ctx.config.cleanup;

    let days = match options.days {
        Some(days) => check_lookback("days", days, MAX_LOOKBACK_DAYS)?,
        None => prompt_positive(
            ctx.prompter.as_ref(),
            &format!(
                "How many days of older emails to scan (default {})? Press Enter for default:",
                settings.default_days
            ),
            settings.default_days,
            MAX_LOOKBACK_DAYS,
        )?,
    };
    let max = match options.max {
        Some(max) => max,
        None => prompt_positive(
            ctx.prompter.as_ref(),
            &format!(
                "Maximum number of emails to process (default {})? Press Enter for default:",
                settings.max_results
            ),
            settings.max_results,
            u32::MAX,
        )?,
    };

    let criteria = SelectionCriteria::new(max.min(500))
        .older_than(Duration::days(i64::from(days)))?
        .limit(max as usize);
    console::info(&format!(
        "Fetching emails with query: {} (up to {} emails)",
        criteria.to_query(),
        max
    ));

    let job = CleanupJob {
        criteria,
        suggestions: CategorySet::new(&SUGGESTIONS, "keep"),
        model: ctx.config.llm.bulk_model.clone(),
        body_budget: settings.body_char_budget,
        age_threshold_days: settings.age_threshold_days,
    };
    let (observer, bar) = progress_observer(&ctx.progress, "Analyzing emails for deletion potential");
    let outcome = CategorizePipeline::new(ctx.client.clone(), ctx.classifier.clone(), ctx.batch_size())
        .with_observer(observer)
        .run(&job)
        .await;
    bar.finish_and_clear();
    let outcome = outcome?;

    if outcome.selected == 0 {
        console::warning("No emails fetched for analysis.");
    }

    let candidates = DeletionCandidates::from_report(&outcome.report);
    let emitted = ReportEmitter::new(ctx.store.clone())
        .emit_with(
            &outcome.report,
            REPORT_FILE,
            &render_plan(&outcome.report, &candidates),
            CANDIDATES_FILE,
            &Snapshot::now(candidates.clone()),
        )
        .await?;

    console::header("--- Email Deletion Plan: Executive Summary ---");
    println!("Total Emails Analyzed: {}", outcome.report.total());
    println!("Strong Deletion Candidates: {}", candidates.strong_candidates.len());
    println!("Possible Deletion Candidates: {}", candidates.possible_candidates.len());
    let reasons = candidates.strong_reasons();
    if !reasons.is_empty() {
        println!("\nBreakdown of Strong Candidates by Reason:");
        for (reason, count) in reasons {
            println!("- {}: {}", reason, count);
        }
    }
    console::success(&format!(
        "Detailed deletion plan report saved to: {}",
        emitted.narrative_path.display()
    ));
    console::success(&format!(
        "Deletion candidates saved to JSON: {}",
        emitted.snapshot_path.display()
    ));

    info!(
        "Cleanup plan: {} strong, {} possible of {} analyzed",
        candidates.strong_candidates.len(),
        candidates.possible_candidates.len(),
        outcome.report.total()
    );
    Ok(CleanupPlanSummary {
        analyzed: outcome.report.total(),
        strong: candidates.strong_candidates.len(),
        possible: candidates.possible_candidates.len(),
    })
}
