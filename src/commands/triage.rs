//! Triage: find recent inbox mail that needs a personal response

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{check_lookback, progress_observer, prompt_window_hours, CommandContext, CommandOptions};
use crate::classifier::{CategorySet, ClassificationRequest, ExtractionSchema};
use crate::cli::console;
use crate::config::MAX_LOOKBACK_HOURS;
use crate::error::Result;
use crate::materializer::{extract_angle_address, extract_recipients, MessageMaterializer};
use crate::models::{truncate_chars, MessageRecord};
use crate::pipeline::{CategorizeJob, CategorizePipeline};
use crate::report::{ClassifiedMessage, ReportEmitter};
use crate::selector::{MessageSelector, ReadFilter, SelectionCriteria};
use crate::state::Snapshot;

pub const ALL_ANALYZED_FILE: &str = "all_analyzed_emails.json";
pub const NEEDS_RESPONSE_FILE: &str = "needs_response_emails.json";
pub const REPORT_FILE: &str = "needs_response_report.md";

pub const IMPORTANCE_LEVELS: [&str; 3] = ["high", "medium", "low"];

const SENT_LOOKUP_LIMIT: usize = 100;

const SYSTEM_PROMPT: &str = "You are an executive assistant who helps busy professionals prioritize their emails. \
You are EXTREMELY selective about what emails truly need a response. \
Your goal is to minimize noise and only surface emails that absolutely must be dealt with.";

static REPLY_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:re|fwd):\s*").expect("valid regex"));

/// Model verdict for one triaged email
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TriageAnalysis {
    pub importance: String,
    pub reason: String,
    #[serde(default)]
    pub needs_response: bool,
    #[serde(default)]
    pub time_sensitive: bool,
    #[serde(default)]
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzedEmail {
    #[serde(default)]
    pub email_id: String,
    #[serde(default)]
    pub thread_id: String,
    pub subject: String,
    pub from: String,
    pub received: DateTime<Utc>,
    pub body: String,
    pub analysis: TriageAnalysis,
    #[serde(default)]
    pub already_responded: bool,
}

impl AnalyzedEmail {
    pub fn status(&self) -> TriageStatus {
        if self.already_responded {
            TriageStatus::AlreadyResponded
        } else if self.analysis.time_sensitive {
            TriageStatus::Urgent
        } else if self.analysis.needs_response {
            TriageStatus::NeedsResponse
        } else {
            TriageStatus::NoResponseNeeded
        }
    }

    /// Needs a response that has not been sent yet
    pub fn is_pending(&self) -> bool {
        self.analysis.needs_response && !self.already_responded
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzedEmails {
    pub analyzed_emails: Vec<AnalyzedEmail>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeedsResponseEmails {
    pub needs_response_emails: Vec<AnalyzedEmail>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriageStatus {
    AlreadyResponded,
    Urgent,
    NeedsResponse,
    NoResponseNeeded,
}

impl TriageStatus {
    pub fn label(self) -> &'static str {
        match self {
            TriageStatus::AlreadyResponded => "✅ ALREADY RESPONDED",
            TriageStatus::Urgent => "🚨 URGENT",
            TriageStatus::NeedsResponse => "🟠 Needs Response",
            TriageStatus::NoResponseNeeded => "⚪ No Response Needed",
        }
    }
}

/// A message from the sent folder, reduced to what the responded check needs
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub subject: String,
    pub recipients: Vec<String>,
}

impl SentMessage {
    pub fn from_record(record: &MessageRecord) -> Self {
        Self {
            subject: record.subject.clone(),
            recipients: record.header("To").map(extract_recipients).unwrap_or_default(),
        }
    }
}

fn normalize_subject(subject: &str) -> String {
    REPLY_PREFIX_RE.replace(&subject.to_lowercase(), "").into_owned()
}

/// Best-effort check: the sender received a sent message with a matching subject
///
/// Subjects match when equal or when either contains the other after a leading
/// `re:`/`fwd:` is stripped. Unrelated threads with similar subjects match too.
pub fn already_responded(from: &str, subject: &str, sent: &[SentMessage]) -> bool {
    let Some(sender) = extract_angle_address(from).map(|s| s.to_lowercase()) else {
        return false;
    };
    let subject = normalize_subject(subject);

    sent.iter()
        .filter(|message| message.recipients.iter().any(|r| *r == sender))
        .any(|message| {
            let sent_subject = normalize_subject(&message.subject);
            subject == sent_subject
                || sent_subject.contains(&subject)
                || subject.contains(&sent_subject)
        })
}

fn importance_rank(importance: &str) -> u8 {
    match importance {
        "high" => 0,
        "medium" => 1,
        _ => 2,
    }
}

/// Markdown report over every analyzed email, most pressing first
pub fn render_report(
    emails: &[AnalyzedEmail],
    generated_at: DateTime<Utc>,
    preview_chars: usize,
) -> String {
    let pending = emails.iter().filter(|e| e.is_pending()).count();
    let responded = emails.iter().filter(|e| e.already_responded).count();

    let mut md = String::new();
    md.push_str("# Email Triage Report\n\n");
    md.push_str(&format!("Generated on: {}\n\n", generated_at.to_rfc3339()));
    md.push_str(&format!("**Total Emails Analyzed:** {}\n\n", emails.len()));
    md.push_str(&format!("**Emails Requiring New Response:** {}\n\n", pending));
    md.push_str(&format!("**Previously Responded To:** {}\n\n", responded));
    md.push_str("---\n\n");

    if emails.is_empty() {
        md.push_str("No emails were analyzed.\n\n");
        return md;
    }

    let mut sorted: Vec<&AnalyzedEmail> = emails.iter().collect();
    sorted.sort_by_key(|e| {
        (
            !e.analysis.time_sensitive,
            e.already_responded,
            importance_rank(&e.analysis.importance),
        )
    });

    md.push_str("## Analyzed Emails\n\n");
    for email in sorted {
        md.push_str(&format!("### {}\n\n", email.subject));
        md.push_str(&format!("**From:** {}\n\n", email.from));
        md.push_str(&format!("**Received:** {}\n\n", email.received.to_rfc3339()));
        md.push_str(&format!("**STATUS:** {}\n\n", email.status().label()));
        md.push_str(&format!(
            "**Importance:** {}\n\n",
            email.analysis.importance.to_uppercase()
        ));
        md.push_str(&format!(
            "**Time Sensitive:** {}\n\n",
            if email.analysis.time_sensitive { "YES" } else { "No" }
        ));
        md.push_str(&format!("**Topics:** {}\n\n", email.analysis.topics.join(", ")));
        md.push_str(&format!("**Reason:** {}\n\n", email.analysis.reason));
        md.push_str("**Preview:**\n");
        md.push_str(&format!("> {}...\n\n", truncate_chars(&email.body, preview_chars)));
        md.push_str("---\n\n");
    }
    md
}

struct TriageJob {
    criteria: SelectionCriteria,
    categories: CategorySet,
    model: String,
    body_budget: usize,
}

impl CategorizeJob for TriageJob {
    fn title(&self) -> &str {
        "Email Triage Report"
    }

    fn criteria(&self) -> SelectionCriteria {
        self.criteria.clone()
    }

    fn categories(&self) -> &CategorySet {
        &self.categories
    }

    fn schema(&self) -> ExtractionSchema {
        ExtractionSchema::new("importance")
    }

    fn request(&self, record: &MessageRecord) -> ClassificationRequest {
        // bodies past the budget are cut
        let body = record.body_within(self.body_budget);
        let user = format!(
            r#"You are an email importance analyzer for a busy professional.
Your task is to determine which emails CRITICALLY NEED a response and which can be ignored.
BE EXTREMELY SELECTIVE - only flag emails as needing a response if they are:
1. From real people (not automated systems)
2. Personalized (not mass marketing)
3. Require specific action or input from the recipient
4. Have clear business value, substantial opportunity, or time-sensitive importance
Automated notifications, newsletters, marketing emails should ALWAYS be marked as not needing response.
Email to analyze:
Subject: {subject}
From: {from}
Received: {received}
Body:
{body}
Classify importance:
- "high" importance: Personalized communications with clear value, time-sensitive matters that MUST be addressed
- "medium" importance: Potentially useful but less critical communications
- "low" importance: Mass marketing, newsletters, automated notifications, spam, etc.
BE STRICT about "needs_response" - only mark TRUE if it absolutely requires personal attention and response.
Respond with a JSON object that MUST include:
{{
    "importance": "high" | "medium" | "low",
    "reason": <brief explanation for the importance rating>,
    "needs_response": <boolean - true ONLY if email absolutely requires a response>,
    "time_sensitive": <boolean - true if matter is time-sensitive>,
    "topics": [<list of 1-3 key topics in the email>]
}}"#,
            subject = record.subject,
            from = record.sender,
            received = record.received.to_rfc3339(),
            body = body.trim(),
        );
        ClassificationRequest {
            model: self.model.clone(),
            system: SYSTEM_PROMPT.to_string(),
            user,
        }
    }
}

fn analyzed_email(item: &ClassifiedMessage, sent: &[SentMessage], body_chars: usize) -> AnalyzedEmail {
    let record = &item.record;
    let verdict = &item.verdict;
    let full_body = record.body.clone().unwrap_or_else(|| record.snippet.clone());
    let mut body = truncate_chars(full_body.trim(), body_chars);
    if full_body.trim().chars().count() > body_chars {
        body.push_str("...");
    }

    AnalyzedEmail {
        email_id: record.id.clone(),
        thread_id: record.thread_id.clone(),
        subject: record.subject.clone(),
        from: record.sender.clone(),
        received: record.received,
        body,
        analysis: TriageAnalysis {
            importance: verdict.category.clone(),
            reason: verdict.reason.clone(),
            needs_response: verdict.flag("needs_response"),
            time_sensitive: verdict.flag("time_sensitive"),
            topics: verdict.list("topics"),
        },
        already_responded: already_responded(&record.sender, &record.subject, sent),
    }
}

/// Sent mail over the look-back window; failures leave the check empty
async fn load_sent_messages(ctx: &CommandContext, days: i64) -> Vec<SentMessage> {
    let criteria = match SelectionCriteria::new(SENT_LOOKUP_LIMIT as u32)
        .within_last(Duration::days(days))
    {
        Ok(criteria) => criteria.in_folder("sent").limit(SENT_LOOKUP_LIMIT),
        Err(e) => {
            warn!("Could not load sent mail for the responded check: {}", e);
            return Vec::new();
        }
    };

    let ids = match MessageSelector::new(ctx.client.clone()).select(&criteria).await {
        Ok(ids) => ids,
        Err(e) => {
            warn!("Could not load sent mail for the responded check: {}", e);
            return Vec::new();
        }
    };

    MessageMaterializer::new(ctx.client.clone())
        .materialize_all(&ids, None)
        .await
        .iter()
        .map(SentMessage::from_record)
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriageSummary {
    pub analyzed: usize,
    pub needs_response: usize,
    pub already_responded: usize,
    pub urgent: usize,
}

pub async fn run(ctx: &CommandContext, options: &CommandOptions) -> Result<TriageSummary> {
    let settings = &ctx.config.triage;

    let hours = match options.hours {
        Some(hours) => check_lookback("hours", hours, MAX_LOOKBACK_HOURS)?,
        None => prompt_window_hours(ctx.prompter.as_ref(), settings.default_hours)?,
    };
    let include_read = match options.include_read {
        Some(value) => value,
        None => ctx
            .prompter
            .confirm("Include read emails in the triage?", settings.include_read)?,
    };

    let criteria = SelectionCriteria::new(settings.max_results)
        .within_last(Duration::hours(i64::from(hours)))?
        .in_folder("INBOX")
        .skip_junk()
        .read_filter(if include_read {
            ReadFilter::Any
        } else {
            ReadFilter::UnreadOnly
        })
        .limit(settings.max_results as usize);
    console::info(&format!(
        "Fetching emails from the last {} hours with query '{}'...",
        hours,
        criteria.to_query()
    ));

    let sent_days = i64::from((hours / 24).max(1));
    console::info(&format!(
        "Checking sent folder for previous responses (last {} days)...",
        sent_days
    ));
    let sent = load_sent_messages(ctx, sent_days).await;
    info!("Loaded {} sent messages", sent.len());

    let job = TriageJob {
        criteria,
        categories: CategorySet::new(&IMPORTANCE_LEVELS, "low"),
        model: ctx.config.llm.triage_model.clone(),
        body_budget: settings.body_char_budget,
    };
    let (observer, bar) = progress_observer(&ctx.progress, "Analyzing emails");
    let outcome = CategorizePipeline::new(ctx.client.clone(), ctx.classifier.clone(), ctx.batch_size())
        .with_observer(observer)
        .run(&job)
        .await;
    bar.finish_and_clear();
    let outcome = outcome?;

    let emails: Vec<AnalyzedEmail> = outcome
        .report
        .results()
        .iter()
        .map(|item| analyzed_email(item, &sent, settings.snapshot_body_chars))
        .collect();
    let pending: Vec<AnalyzedEmail> = emails.iter().filter(|e| e.is_pending()).cloned().collect();

    let summary = TriageSummary {
        analyzed: emails.len(),
        needs_response: pending.len(),
        already_responded: emails.iter().filter(|e| e.already_responded).count(),
        urgent: emails
            .iter()
            .filter(|e| e.status() == TriageStatus::Urgent)
            .count(),
    };

    let markdown = render_report(&emails, outcome.report.generated_at, settings.preview_chars);
    let emitted = ReportEmitter::new(ctx.store.clone())
        .emit_with(
            &outcome.report,
            REPORT_FILE,
            &markdown,
            ALL_ANALYZED_FILE,
            &Snapshot::now(AnalyzedEmails {
                analyzed_emails: emails.clone(),
            }),
        )
        .await?;
    ctx.store
        .write_snapshot(
            NEEDS_RESPONSE_FILE,
            &Snapshot::now(NeedsResponseEmails {
                needs_response_emails: pending,
            }),
        )
        .await?;

    print_summary(&emails, hours, outcome.skipped());
    console::info(&format!(
        "Detailed results saved to: {} and {}",
        emitted.narrative_path.display(),
        emitted.snapshot_path.display()
    ));

    info!(
        "Triage finished: {} analyzed, {} need a response",
        summary.analyzed, summary.needs_response
    );
    Ok(summary)
}

fn print_summary(emails: &[AnalyzedEmail], hours: u32, skipped: usize) {
    use crossterm::style::Stylize;

    let count = |status: TriageStatus| emails.iter().filter(|e| e.status() == status).count();

    console::header("ANALYZED EMAILS SUMMARY:");
    println!("{}", "=".repeat(50));
    println!("Processed emails from the last {} hours.", hours);
    println!("Total Emails Analyzed: {}", emails.len());
    if skipped > 0 {
        println!("Skipped (could not fetch): {}", skipped);
    }
    println!(
        "{} {}",
        TriageStatus::Urgent.label().red(),
        count(TriageStatus::Urgent)
    );
    println!(
        "{} {}",
        TriageStatus::AlreadyResponded.label().green(),
        count(TriageStatus::AlreadyResponded)
    );
    println!(
        "{} {}",
        TriageStatus::NeedsResponse.label().yellow(),
        count(TriageStatus::NeedsResponse)
    );
    println!(
        "{} {}",
        TriageStatus::NoResponseNeeded.label().cyan(),
        count(TriageStatus::NoResponseNeeded)
    );
}
