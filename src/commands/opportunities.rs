//! Opportunity categorization: sponsorship and business inquiries in primary mail

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

use super::{check_lookback, progress_observer, CommandContext, CommandOptions};
use crate::classifier::{CategorySet, ClassificationRequest};
use crate::cli::console;
use crate::config::MAX_LOOKBACK_HOURS;
use crate::error::Result;
use crate::models::{truncate_chars, MessageRecord};
use crate::pipeline::{CategorizeJob, CategorizePipeline};
use crate::report::{ClassifiedMessage, RunReport};
use crate::selector::SelectionCriteria;
use crate::state::Snapshot;

pub const CATEGORIZED_FILE: &str = "categorized_emails.json";
pub const REPORT_FILE: &str = "opportunity_report.txt";
pub const REPORT_HEADER: &str = "BUSINESS AND SPONSORSHIP OPPORTUNITY REPORT";

pub const OPPORTUNITY_CATEGORIES: [&str; 3] = ["sponsorship", "business_inquiry", "other"];

const SYSTEM_PROMPT: &str = "You are a precise email categorizer. Your goal is to accurately categorize emails and extract relevant business information.";

const REPORT_SYSTEM_PROMPT: &str = "You are an executive assistant who helps identify high-quality opportunities from business emails. You excel at distinguishing personalized offers from mass marketing campaigns.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpportunityAnalysis {
    pub category: String,
    pub confidence: f64,
    pub reason: String,
    pub company_name: Option<String>,
    pub topic: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpportunityEmail {
    pub email_id: String,
    pub subject: String,
    pub from: String,
    pub received: DateTime<Utc>,
    pub body: String,
    pub analysis: OpportunityAnalysis,
}

impl OpportunityEmail {
    fn from_classified(item: &ClassifiedMessage) -> Self {
        let verdict = &item.verdict;
        Self {
            email_id: item.record.id.clone(),
            subject: item.record.subject.clone(),
            from: item.record.sender.clone(),
            received: item.record.received,
            body: item.record.body_within(usize::MAX),
            analysis: OpportunityAnalysis {
                category: verdict.category.clone(),
                confidence: verdict.confidence.unwrap_or(0.0),
                reason: verdict.reason.clone(),
                company_name: verdict.text("company_name").map(str::to_string),
                topic: verdict.text("topic").map(str::to_string),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorizedOpportunities {
    pub sponsorship_emails: Vec<OpportunityEmail>,
    pub business_emails: Vec<OpportunityEmail>,
    pub other_emails: Vec<OpportunityEmail>,
}

impl CategorizedOpportunities {
    pub fn from_report(report: &RunReport) -> Self {
        let group = |category: &str| {
            report
                .group(category)
                .into_iter()
                .map(OpportunityEmail::from_classified)
                .collect::<Vec<_>>()
        };
        Self {
            sponsorship_emails: group("sponsorship"),
            business_emails: group("business_inquiry"),
            other_emails: group("other"),
        }
    }

    /// Sponsorship and business entries, business first
    pub fn relevant(&self) -> Vec<&OpportunityEmail> {
        self.business_emails
            .iter()
            .chain(self.sponsorship_emails.iter())
            .collect()
    }
}

struct OpportunityJob {
    criteria: SelectionCriteria,
    categories: CategorySet,
    model: String,
    body_budget: usize,
}

impl CategorizeJob for OpportunityJob {
    fn title(&self) -> &str {
        "Opportunity Categorization Report"
    }

    fn criteria(&self) -> SelectionCriteria {
        self.criteria.clone()
    }

    fn categories(&self) -> &CategorySet {
        &self.categories
    }

    fn request(&self, record: &MessageRecord) -> ClassificationRequest {
        let user = format!(
            r#"You are an email categorizer for a professional. Your task is to categorize incoming emails
and identify important information.
Email to analyze:
Subject: {subject}
From: {from}
Body:
{body}
Categorize this email into one of the following:
1. "sponsorship" - Companies wanting to sponsor content or services
2. "business_inquiry" - Business-related emails, partnership offers, marketing opportunities
3. "other" - Everything else
If it's a sponsorship or business inquiry, extract the company name and the main topic/product.
Respond with a JSON object that MUST include:
{{
    "category": "sponsorship" | "business_inquiry" | "other",
    "confidence": <number between 0 and 1>,
    "reason": <explanation string>,
    "company_name": <extracted company name or null>,
    "topic": <main topic/product or null>
}}"#,
            subject = record.subject,
            from = record.sender,
            body = record.body_within(self.body_budget).trim(),
        );
        ClassificationRequest {
            model: self.model.clone(),
            system: SYSTEM_PROMPT.to_string(),
            user,
        }
    }
}

/// Prompt for the free-text opportunity report
pub fn report_request(
    emails: &[&OpportunityEmail],
    model: &str,
    snippet_chars: usize,
) -> Result<ClassificationRequest> {
    let entries: Vec<serde_json::Value> = emails
        .iter()
        .map(|email| {
            let mut snippet = truncate_chars(&email.body, snippet_chars);
            if email.body.chars().count() > snippet_chars {
                snippet.push_str("...");
            }
            serde_json::json!({
                "category": email.analysis.category,
                "from": email.from,
                "subject": email.subject,
                "company": email.analysis.company_name,
                "topic": email.analysis.topic,
                "confidence": email.analysis.confidence,
                "snippet": snippet,
            })
        })
        .collect();

    let user = format!(
        r#"You are an executive assistant tasked with filtering through business and sponsorship emails to identify the highest quality opportunities.
Please analyze these {count} business and sponsorship emails and create a structured report that:
1. Categorizes them as "High Value" or "Mass Marketing/Generic"
2. Ranks the high-value opportunities in order of priority
3. Provides brief reasoning for your assessments
Here are the emails to analyze:
{emails}
Consider the following criteria to evaluate opportunities:
1. Personalization (specifically addressed to the user, mentions specific work)
2. Authenticity (not mass-marketing, personal tone, unique request)
3. Relevance (aligns with user's work, interesting topic, reasonable offer)
4. Reputation (known company, established person, verifiable identity)
5. Specificity (clear request/opportunity with details, not vague)
Format your report with clear sections and prioritize opportunities that seem unique, personalized, and valuable."#,
        count = emails.len(),
        emails = serde_json::to_string_pretty(&entries)?,
    );

    Ok(ClassificationRequest {
        model: model.to_string(),
        system: REPORT_SYSTEM_PROMPT.to_string(),
        user,
    })
}

pub fn render_report(content: &str) -> String {
    format!("{}\n{}\n\n{}", REPORT_HEADER, "=".repeat(50), content)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpportunitySummary {
    pub sponsorship: usize,
    pub business: usize,
    pub other: usize,
    pub high_confidence: usize,
    pub report_path: Option<PathBuf>,
}

pub async fn run(ctx: &CommandContext, options: &CommandOptions) -> Result<OpportunitySummary> {
    let settings = &ctx.config.opportunities;
    let hours = match options.hours {
        Some(hours) => check_lookback("hours", hours, MAX_LOOKBACK_HOURS)?,
        None => settings.hours,
    };

    let criteria = SelectionCriteria::new(settings.max_results)
        .within_last(Duration::hours(i64::from(hours)))?
        .fragment("category:primary")
        .limit(settings.max_results as usize);
    console::info(&format!(
        "Fetching emails from the last {} hours for opportunity categorization...",
        hours
    ));

    let job = OpportunityJob {
        criteria,
        categories: CategorySet::new(&OPPORTUNITY_CATEGORIES, "other"),
        model: ctx.config.llm.opportunity_model.clone(),
        body_budget: settings.body_char_budget,
    };
    let (observer, bar) = progress_observer(&ctx.progress, "Categorizing emails");
    let outcome = CategorizePipeline::new(ctx.client.clone(), ctx.classifier.clone(), ctx.batch_size())
        .with_observer(observer)
        .run(&job)
        .await;
    bar.finish_and_clear();
    let outcome = outcome?;

    let categorized = CategorizedOpportunities::from_report(&outcome.report);
    let path = ctx
        .store
        .write_snapshot(CATEGORIZED_FILE, &Snapshot::now(categorized.clone()))
        .await?;

    console::header(&format!("Processed {} emails", outcome.report.total()));
    println!("Sponsorship requests: {}", categorized.sponsorship_emails.len());
    println!("Business inquiries: {}", categorized.business_emails.len());
    println!("Other emails: {}", categorized.other_emails.len());
    console::info(&format!("Detailed results saved to: {}", path.display()));

    console::header(&format!(
        "High Confidence Business/Sponsorship Emails (>{}):",
        settings.high_confidence
    ));
    let mut high_confidence = 0;
    for email in categorized
        .sponsorship_emails
        .iter()
        .chain(categorized.business_emails.iter())
        .filter(|e| e.analysis.confidence > settings.high_confidence)
    {
        high_confidence += 1;
        console::info(&format!("\nCategory: {}", email.analysis.category));
        println!("From: {}", email.from);
        println!("Subject: {}", email.subject);
        if let Some(company) = &email.analysis.company_name {
            println!("Company: {}", company);
        }
        if let Some(topic) = &email.analysis.topic {
            println!("Topic: {}", topic);
        }
        println!("Reason: {}\n{}", email.analysis.reason, "-".repeat(50));
    }

    let mut summary = OpportunitySummary {
        sponsorship: categorized.sponsorship_emails.len(),
        business: categorized.business_emails.len(),
        other: categorized.other_emails.len(),
        high_confidence,
        report_path: None,
    };

    let relevant = categorized.relevant();
    if relevant.is_empty() {
        console::warning("No business or sponsorship emails found to analyze for the report.");
        return Ok(summary);
    }

    console::info("Analyzing business and sponsorship emails for quality opportunities report...");
    let request = report_request(
        &relevant,
        &ctx.config.llm.report_model,
        settings.report_snippet_chars,
    )?;
    let spinner = ctx.progress.add_spinner("Generating opportunity report");
    let content = ctx.classifier.generate(&request).await;
    spinner.finish_and_clear();
    let content = content?;

    let report = render_report(&content);
    println!("\n{}\n{}", "=".repeat(50), report);
    let report_path = ctx.store.write_text(REPORT_FILE, &report).await?;
    console::success(&format!("Report saved to {}", report_path.display()));
    info!("Opportunity report written to {:?}", report_path);

    summary.report_path = Some(report_path);
    Ok(summary)
}
