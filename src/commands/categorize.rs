//! General categorization: sort recent mail into fixed buckets and label it

use chrono::Duration;

use super::{progress_observer, CommandContext};
use crate::classifier::{CategorySet, ClassificationRequest};
use crate::cli::console;
use crate::error::Result;
use crate::models::{truncate_chars, MessageRecord};
use crate::pipeline::{CategorizeJob, CategorizePipeline};
use crate::report::{EmittedReport, ReportEmitter};
use crate::selector::SelectionCriteria;

pub const REPORT_FILE: &str = "categorization_report.txt";
pub const SNAPSHOT_FILE: &str = "categorized_emails_general.json";

pub const CATEGORIES: [&str; 8] = [
    "Personal",
    "Work",
    "Transactional",
    "Notifications",
    "Newsletters/Promotions",
    "Forums/Groups",
    "Spam/Junk",
    "Other",
];

/// Categories that get a mailbox label of the same name
pub const LABELED_CATEGORIES: [&str; 6] = [
    "Personal",
    "Work",
    "Transactional",
    "Notifications",
    "Newsletters/Promotions",
    "Forums/Groups",
];

pub struct GeneralCategorizeJob {
    criteria: SelectionCriteria,
    categories: CategorySet,
    model: String,
    body_budget: usize,
}

impl GeneralCategorizeJob {
    pub fn new(criteria: SelectionCriteria, model: &str, body_budget: usize) -> Self {
        Self {
            criteria,
            categories: CategorySet::new(&CATEGORIES, "Other"),
            model: model.to_string(),
            body_budget,
        }
    }
}

impl CategorizeJob for GeneralCategorizeJob {
    fn title(&self) -> &str {
        "Email Categorization Report"
    }

    fn criteria(&self) -> SelectionCriteria {
        self.criteria.clone()
    }

    fn categories(&self) -> &CategorySet {
        &self.categories
    }

    fn request(&self, record: &MessageRecord) -> ClassificationRequest {
        let listing = CATEGORIES.join(", ");
        let body = record
            .body
            .as_deref()
            .map(|b| truncate_chars(b, self.body_budget))
            .unwrap_or_default();
        let user = format!(
            r#"Categorize the following email into one of these specific categories: {listing}.
Email Details:
Subject: {subject}
From: {from}
Date: {date}
Snippet: {snippet}
Body (first {budget} chars): {body}
Provide a JSON response with:
- "category": One of the specified categories.
- "reason": Brief explanation for the category.
- "confidence": Your confidence (0.0 to 1.0)."#,
            subject = record.subject,
            from = record.sender,
            date = record.received.format("%Y-%m-%d"),
            snippet = record.snippet,
            budget = self.body_budget,
        );
        ClassificationRequest {
            model: self.model.clone(),
            system: format!(
                "You are an email categorizer. Classify emails into one of these categories: {}.",
                listing
            ),
            user,
        }
    }

    fn target_label(&self, category: &str) -> Option<String> {
        LABELED_CATEGORIES
            .contains(&category)
            .then(|| category.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CategorizeSummary {
    pub classified: usize,
    pub labeled: usize,
    pub breakdown: Vec<(String, usize)>,
    pub emitted: EmittedReport,
}

pub async fn run(ctx: &CommandContext) -> Result<CategorizeSummary> {
    let settings = &ctx.config.categorizer;
    let criteria = SelectionCriteria::new(settings.max_results)
        .within_last(Duration::hours(i64::from(settings.hours)))?
        .precise()
        .skip_junk()
        .limit(settings.max_results as usize);
    console::info(&format!(
        "Fetching emails with query: '{}' (up to {} emails)",
        criteria.to_query(),
        settings.max_results
    ));

    let job = GeneralCategorizeJob::new(criteria, &ctx.config.llm.bulk_model, settings.body_char_budget);
    let (observer, bar) = progress_observer(&ctx.progress, "Categorizing emails");
    let outcome = CategorizePipeline::new(ctx.client.clone(), ctx.classifier.clone(), ctx.batch_size())
        .with_observer(observer)
        .run(&job)
        .await;
    bar.finish_and_clear();
    let outcome = outcome?;

    let emitted = ReportEmitter::new(ctx.store.clone())
        .emit(&outcome.report, REPORT_FILE, SNAPSHOT_FILE)
        .await?;

    println!("{}", emitted.summary);
    if outcome.mutation.failed_chunks > 0 {
        console::warning(&format!(
            "{} label batches failed; those emails keep their previous labels.",
            outcome.mutation.failed_chunks
        ));
    }
    console::success(&format!(
        "Finished applying labels. Total emails labeled: {}.",
        outcome.mutation.mutated.len()
    ));
    console::info(&format!("Report saved to {}", emitted.narrative_path.display()));

    Ok(CategorizeSummary {
        classified: outcome.report.total(),
        labeled: outcome.mutation.mutated.len(),
        breakdown: outcome.report.breakdown(),
        emitted,
    })
}
