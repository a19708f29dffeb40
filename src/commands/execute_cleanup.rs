//! Cleanup execution: walk the plan and unsubscribe or trash with confirmation

use tracing::{info, warn};

use super::{plan_cleanup, prompt_choice, CommandContext};
use crate::cli::console;
use crate::error::{AssistantError, Result};
use crate::state::ActionLog;

pub const UNSUBSCRIBE_SUBJECT: &str = "Automated Unsubscribe Request";

const SUCCESS_KEYWORDS: [&str; 5] = [
    "unsubscribed",
    "removed",
    "success",
    "no longer receive",
    "manage your preferences",
];

/// Characters of the unsubscribe page checked for a confirmation
const PAGE_SAMPLE_CHARS: usize = 1024;

/// What an unsubscribe page visit showed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkVisit {
    /// 2xx with a success phrase near the top of the page
    Confirmed,
    /// 2xx but no recognizable confirmation
    Unconfirmed,
}

/// GET the unsubscribe URL and look for a confirmation phrase
pub async fn visit_unsubscribe_link(http: &reqwest::Client, url: &str) -> Result<LinkVisit> {
    let response = http
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| AssistantError::NetworkError(e.to_string()))?;

    let text = response
        .text()
        .await
        .map_err(|e| AssistantError::NetworkError(e.to_string()))?;
    let sample: String = text.chars().take(PAGE_SAMPLE_CHARS).collect::<String>().to_lowercase();

    if SUCCESS_KEYWORDS.iter().any(|k| sample.contains(k)) {
        Ok(LinkVisit::Confirmed)
    } else {
        Ok(LinkVisit::Unconfirmed)
    }
}

pub fn unsubscribe_body(original_subject: &str) -> String {
    format!(
        "This is an automated unsubscribe request regarding emails with subjects similar to: \"{}\".\n\n\
         Please remove this email address from your mailing list.\n\n\
         If this is an error, please ignore this message.\n\
         (This email was sent by an automated script based on user direction.)",
        original_subject
    )
}

/// Recipient part of a `mailto:` target, without any `?subject=` query
fn mailto_address(target: &str) -> &str {
    target.split('?').next().unwrap_or(target).trim()
}

/// Append to the action log; a write failure is only a warning
async fn note(log: &ActionLog, message: &str) {
    if let Err(e) = log.append(message).await {
        warn!("Could not write action log {:?}: {}", log.path(), e);
    }
}

/// Log to the action log and echo to the console
async fn record(log: &ActionLog, message: &str, ok: bool) {
    if ok {
        console::success(message);
    } else {
        console::error(message);
    }
    note(log, message).await;
}

async fn send_unsubscribe_email(ctx: &CommandContext, log: &ActionLog, target: &str, subject: &str) -> bool {
    let to = mailto_address(target);
    match ctx
        .client
        .send_message(to, UNSUBSCRIBE_SUBJECT, &unsubscribe_body(subject))
        .await
    {
        Ok(id) => {
            record(log, &format!("SUCCESS: Sent unsubscribe email to {}. Message ID: {}", to, id), true).await;
            true
        }
        Err(e) => {
            record(log, &format!("ERROR sending unsubscribe email to {}: {}", to, e), false).await;
            false
        }
    }
}

async fn visit_link(ctx: &CommandContext, log: &ActionLog, url: &str) -> bool {
    match visit_unsubscribe_link(&ctx.http, url).await {
        Ok(LinkVisit::Confirmed) => {
            record(log, &format!("SUCCESS: Visited unsubscribe link {}.", url), true).await;
            record(log, &format!("INFO: Unsubscribe page for {} seems to indicate success.", url), true).await;
            true
        }
        Ok(LinkVisit::Unconfirmed) => {
            record(log, &format!("SUCCESS: Visited unsubscribe link {}.", url), true).await;
            let message = format!(
                "WARNING: Visited {}, but success message not detected. Manual check might be needed.",
                url
            );
            console::warning(&message);
            note(log, &message).await;
            true
        }
        Err(e) => {
            record(log, &format!("ERROR visiting unsubscribe link {}: {}", url, e), false).await;
            false
        }
    }
}

async fn trash(ctx: &CommandContext, log: &ActionLog, id: &str) -> bool {
    match ctx.client.trash_message(id).await {
        Ok(()) => {
            record(log, &format!("SUCCESS: Moved email ID {} to trash.", id), true).await;
            true
        }
        Err(e) => {
            record(log, &format!("ERROR trashing email ID {}: {}", id, e), false).await;
            false
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub candidates: usize,
    pub processed: usize,
    pub skipped: usize,
    pub unsubscribe_emails: usize,
    pub links_visited: usize,
    pub trashed: usize,
}

fn ask(ctx: &CommandContext, message: &str) -> Result<String> {
    prompt_choice(ctx.prompter.as_ref(), message, &["y", "n", "s"], "n")
}

pub async fn run(ctx: &CommandContext) -> Result<ExecutionSummary> {
    let log = ctx.action_log();
    note(&log, "Executor started.").await;

    let plan = match ctx
        .store
        .read_snapshot::<plan_cleanup::DeletionCandidates>(plan_cleanup::CANDIDATES_FILE, "Plan cleanup")
        .await
    {
        Ok(plan) => plan.body,
        Err(e) => {
            note(&log, &format!("CRITICAL: {}. Exiting.", e)).await;
            return Err(e);
        }
    };

    let candidates = plan.all();
    let mut summary = ExecutionSummary {
        candidates: candidates.len(),
        ..Default::default()
    };
    if candidates.is_empty() {
        println!("No deletion candidates found in the plan file.");
        note(&log, "No candidates in plan file. Exiting.").await;
        return Ok(summary);
    }
    println!(
        "Loaded {} strong and {} possible candidates.",
        plan.strong_candidates.len(),
        plan.possible_candidates.len()
    );

    'candidates: for (index, candidate) in candidates.iter().enumerate() {
        println!("\n--- Processing Candidate {}/{} ---", index + 1, candidates.len());
        console::info(&format!("Subject: {}", candidate.subject));
        console::info(&format!("From: {}", candidate.sender));
        println!("Date: {}", candidate.received_date.to_rfc3339());
        println!(
            "Suggestion: {} (Reason: {} - {})",
            candidate.suggestion, candidate.reason_category, candidate.reason_detail
        );

        let skip_message = format!("User skipped all actions for email ID {}.", candidate.email_id);
        let mut acted = false;

        if let Some(mailto) = &candidate.list_unsubscribe_mailto {
            let choice = ask(
                ctx,
                &format!("  Action: Send unsubscribe email to {}? (y/n/s=skip email):", mailto),
            )?;
            match choice.as_str() {
                "y" => {
                    if send_unsubscribe_email(ctx, &log, mailto, &candidate.subject).await {
                        summary.unsubscribe_emails += 1;
                    }
                    acted = true;
                }
                "s" => {
                    note(&log, &skip_message).await;
                    summary.skipped += 1;
                    continue 'candidates;
                }
                _ => {}
            }
        }

        if let Some(url) = &candidate.list_unsubscribe_http {
            let choice = ask(
                ctx,
                &format!("  Action: Attempt to visit unsubscribe link {}? (y/n/s=skip email):", url),
            )?;
            match choice.as_str() {
                "y" => {
                    if visit_link(ctx, &log, url).await {
                        summary.links_visited += 1;
                    }
                    acted = true;
                }
                "s" => {
                    note(&log, &skip_message).await;
                    summary.skipped += 1;
                    continue 'candidates;
                }
                _ => {}
            }
        }

        let choice = ask(ctx, "  Action: Delete this email (move to trash)? (y/n/s=skip email):")?;
        match choice.as_str() {
            "y" => {
                if trash(ctx, &log, &candidate.email_id).await {
                    summary.trashed += 1;
                }
            }
            "s" => {
                note(&log, &skip_message).await;
                summary.skipped += 1;
                continue 'candidates;
            }
            _ => {
                if !acted {
                    note(
                        &log,
                        &format!(
                            "User chose not to delete or take other actions for email ID {}.",
                            candidate.email_id
                        ),
                    )
                    .await;
                }
            }
        }

        summary.processed += 1;
    }

    note(
        &log,
        &format!("Executor finished. Processed {} candidates.", summary.processed),
    )
    .await;
    info!(
        "Cleanup execution: {} processed, {} trashed, {} skipped",
        summary.processed, summary.trashed, summary.skipped
    );
    console::success("Email Action Executor finished.");
    Ok(summary)
}
