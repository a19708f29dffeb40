//! Reply drafting over the emails triage flagged as needing a response

use tracing::{info, warn};

use super::{prompt_choice, triage, CommandContext};
use crate::classifier::ClassificationRequest;
use crate::cli::console;
use crate::config::ReplyConfig;
use crate::error::Result;
use crate::materializer::{extract_angle_address, extract_sender_email};
use crate::models::truncate_chars;
use crate::state::ResponseHistory;

const SYSTEM_PROMPT: &str = "You are a professional, concise email responder who crafts helpful, direct responses to business inquiries.";

/// A generated reply split into its parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    pub subject: String,
    pub body: String,
}

/// First line is the subject (minus any `Subject:` prefix), the rest is the body
pub fn parse_draft(text: &str, original_subject: &str) -> Draft {
    let text = text.trim();
    let (first, rest) = text.split_once('\n').unwrap_or((text, ""));
    let subject = first.replace("Subject:", "").trim().to_string();
    let subject = if subject.is_empty() {
        format!("Re: {}", original_subject)
    } else {
        subject
    };
    Draft {
        subject,
        body: rest.trim().to_string(),
    }
}

/// Where a reply to `from` goes
pub fn reply_address(from: &str) -> Option<String> {
    extract_angle_address(from).or_else(|| extract_sender_email(from))
}

fn signature(settings: &ReplyConfig) -> String {
    if settings.sender_name.trim().is_empty() {
        format!("{},", settings.signoff)
    } else {
        format!("{},\n{}", settings.signoff, settings.sender_name.trim())
    }
}

/// Prompt for a first draft, or for a rewrite when `instructions` is set
pub fn draft_request(
    email: &triage::AnalyzedEmail,
    settings: &ReplyConfig,
    model: &str,
    instructions: Option<&str>,
) -> ClassificationRequest {
    let signature = signature(settings);
    let user = match instructions {
        Some(instructions) => format!(
            r#"Rewrite the email response based on these instructions:
Original Email:
Subject: {subject}
From: {from}
Preview: {preview}
Instructions for rewriting: {instructions}
Your response should maintain this format:
Subject: Re: [Original Subject]
[Email body]
{signature}"#,
            subject = email.subject,
            from = email.from,
            preview = truncate_chars(&email.body, settings.edit_preview_chars),
        ),
        None => format!(
            r#"Create a concise and helpful email response for the following inquiry:
Subject: {subject}
From: {from}
Preview: {preview}
Requirements:
1. Keep the response friendly but brief and to the point
2. Address any specific questions or requests in the email
3. Be professional and helpful
4. Always end with "{signature_inline}"
5. Include appropriate subject line with "Re: " prefix
6. Don't be overly verbose - keep it under {max_words} words
7. Don't apologize for delay unless clearly necessary
Your response should be formatted as:
Subject: Re: [Original Subject]
[Email body]
{signature}"#,
            subject = email.subject,
            from = email.from,
            preview = truncate_chars(&email.body, settings.preview_chars),
            signature_inline = signature.replace('\n', "\\n"),
            max_words = settings.max_words,
        ),
    };

    ClassificationRequest {
        model: model.to_string(),
        system: SYSTEM_PROMPT.to_string(),
        user,
    }
}

async fn generate(ctx: &CommandContext, request: &ClassificationRequest) -> Option<String> {
    let spinner = ctx.progress.add_spinner("Generating response");
    let result = ctx.classifier.generate(request).await;
    spinner.finish_and_clear();
    match result {
        Ok(text) => Some(text),
        Err(e) => {
            warn!("Failed to generate response: {}", e);
            console::error(&format!("Error generating response: {}", e));
            None
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DraftSummary {
    pub considered: usize,
    pub sent: usize,
    pub skipped: usize,
}

pub async fn run(ctx: &CommandContext) -> Result<DraftSummary> {
    let snapshot = ctx
        .store
        .read_snapshot::<triage::AnalyzedEmails>(triage::ALL_ANALYZED_FILE, "Triage")
        .await?;
    let settings = &ctx.config.replies;
    let model = &ctx.config.llm.reply_model;

    let emails: Vec<triage::AnalyzedEmail> = snapshot
        .body
        .analyzed_emails
        .into_iter()
        .filter(|e| e.analysis.needs_response)
        .collect();

    let mut summary = DraftSummary {
        considered: emails.len(),
        ..Default::default()
    };
    if emails.is_empty() {
        console::warning("No emails requiring response found. Run triage to refresh the list.");
        return Ok(summary);
    }

    let fresh = emails.iter().filter(|e| !e.already_responded).count();
    println!(
        "Found {} emails requiring response ({} new, {} already responded to).\n",
        emails.len(),
        fresh,
        emails.len() - fresh
    );

    for (index, email) in emails.iter().enumerate() {
        println!("{}", "=".repeat(50));
        println!("Email {}/{}", index + 1, emails.len());
        console::info(&format!("Subject: {}", email.subject));
        console::info(&format!("From: {}", email.from));

        if email.already_responded {
            console::success("STATUS: ✅ ALREADY RESPONDED");
            let answer = prompt_choice(
                ctx.prompter.as_ref(),
                "This email has already been responded to. Process anyway? (y/n):",
                &["y", "n"],
                "n",
            )?;
            if answer != "y" {
                println!("Skipping to next email...\n");
                summary.skipped += 1;
                continue;
            }
        }
        println!("{}", "-".repeat(50));

        let Some(mut draft_text) = generate(ctx, &draft_request(email, settings, model, None)).await else {
            println!("Failed to generate a response. Skipping to next email.");
            summary.skipped += 1;
            continue;
        };

        let recipient = reply_address(&email.from);
        loop {
            let draft = parse_draft(&draft_text, &email.subject);
            console::header("DRAFT RESPONSE:");
            println!("{}", "-".repeat(50));
            println!("To: {}", recipient.as_deref().unwrap_or("(unknown)"));
            println!("Subject: {}", draft.subject);
            println!("{}", "-".repeat(50));
            println!("{}", draft.body);
            println!("{}", "-".repeat(50));

            let choice = prompt_choice(
                ctx.prompter.as_ref(),
                "Send this response? (y/n/edit/skip):",
                &["y", "n", "edit", "skip"],
                "n",
            )?;

            match choice.as_str() {
                "y" => {
                    let Some(to) = recipient.as_deref() else {
                        console::error("Error: No email address found for recipient.");
                        summary.skipped += 1;
                        break;
                    };
                    console::info(&format!("Sending email to {}...", to));
                    match ctx.client.send_message(to, &draft.subject, &draft.body).await {
                        Ok(id) => {
                            info!("Reply {} sent to {}", id, to);
                            console::success("Email sent successfully!");
                            ResponseHistory::record(&ctx.store, &email.subject, &email.from).await?;
                            summary.sent += 1;
                        }
                        Err(e) => {
                            warn!("Failed to send reply to {}: {}", to, e);
                            console::error(&format!("Failed to send email: {}", e));
                            summary.skipped += 1;
                        }
                    }
                    break;
                }
                "edit" => {
                    let instructions = ctx
                        .prompter
                        .text("Describe how you want the email rewritten:", "")?;
                    console::info("Generating new response based on your instructions...");
                    let request = draft_request(email, settings, model, Some(instructions.trim()));
                    match generate(ctx, &request).await {
                        Some(text) => draft_text = text,
                        None => console::error("Failed to generate edited response. Keeping previous draft."),
                    }
                }
                _ => {
                    println!("Skipping this email.");
                    summary.skipped += 1;
                    break;
                }
            }
        }
        println!();
    }

    console::success("All emails processed.");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::triage::{AnalyzedEmail, TriageAnalysis};
    use chrono::Utc;

    fn email(body: &str) -> AnalyzedEmail {
        AnalyzedEmail {
            email_id: "m1".to_string(),
            thread_id: "t1".to_string(),
            subject: "Quick question".to_string(),
            from: "Ann Lee <ann@example.com>".to_string(),
            received: Utc::now(),
            body: body.to_string(),
            analysis: TriageAnalysis {
                importance: "high".to_string(),
                reason: "direct question".to_string(),
                needs_response: true,
                time_sensitive: false,
                topics: vec![],
            },
            already_responded: false,
        }
    }

    fn settings() -> ReplyConfig {
        ReplyConfig {
            sender_name: "Kris".to_string(),
            ..ReplyConfig::default()
        }
    }

    #[test]
    fn test_parse_draft_splits_subject() {
        let draft = parse_draft(
            "Subject: Re: Quick question\nHi Ann,\n\nYes.\n\nBest regards,\nKris\n",
            "Quick question",
        );
        assert_eq!(draft.subject, "Re: Quick question");
        assert_eq!(draft.body, "Hi Ann,\n\nYes.\n\nBest regards,\nKris");
    }

    #[test]
    fn test_parse_draft_without_subject_line() {
        let draft = parse_draft("Subject:\nbody", "Hello");
        assert_eq!(draft.subject, "Re: Hello");
        assert_eq!(draft.body, "body");
    }

    #[test]
    fn test_reply_address() {
        assert_eq!(
            reply_address("Ann Lee <ann@example.com>").as_deref(),
            Some("ann@example.com")
        );
        assert_eq!(reply_address("bob@example.com").as_deref(), Some("bob@example.com"));
        assert_eq!(reply_address("Nobody"), None);
    }

    #[test]
    fn test_draft_request_previews() {
        let long = email(&"y".repeat(1200));
        let first = draft_request(&long, &settings(), "gpt-4.1", None);
        assert!(first.user.contains(&"y".repeat(1000)));
        assert!(!first.user.contains(&"y".repeat(1001)));
        assert!(first.user.contains("under 150 words"));
        assert!(first.user.ends_with("Best regards,\nKris"));

        let edit = draft_request(&long, &settings(), "gpt-4.1", Some("shorter"));
        assert!(edit.user.starts_with("Rewrite the email response"));
        assert!(edit.user.contains(&"y".repeat(500)));
        assert!(!edit.user.contains(&"y".repeat(501)));
        assert!(edit.user.contains("Instructions for rewriting: shorter"));
    }
}
