//! The eight assistant commands
//!
//! Each command takes an explicit [`CommandContext`]; nothing reads ambient state.

pub mod archive_unread;
pub mod categorize;
pub mod draft_reply;
pub mod execute_cleanup;
pub mod filters;
pub mod opportunities;
pub mod plan_cleanup;
pub mod triage;

use indicatif::ProgressBar;
use std::sync::Arc;
use std::time::Duration;

use crate::classifier::ClassifierAdapter;
use crate::cli::{console, ProgressReporter, Prompter};
use crate::client::GmailClient;
use crate::config::{Config, MAX_LOOKBACK_DAYS, MAX_LOOKBACK_HOURS};
use crate::error::{AssistantError, Result};
use crate::models::truncate_chars;
use crate::pipeline::{PipelineEvent, PipelineObserver};
use crate::state::{ActionLog, ArtifactStore};

/// Everything a command needs, built once per process
pub struct CommandContext {
    pub config: Config,
    pub client: Arc<dyn GmailClient>,
    pub classifier: ClassifierAdapter,
    pub store: ArtifactStore,
    pub prompter: Arc<dyn Prompter>,
    pub progress: ProgressReporter,
    /// Used for unsubscribe link visits
    pub http: reqwest::Client,
}

impl CommandContext {
    pub fn new(
        config: Config,
        client: Arc<dyn GmailClient>,
        classifier: ClassifierAdapter,
        prompter: Arc<dyn Prompter>,
        progress: ProgressReporter,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(config.cleanup.user_agent.clone())
            .timeout(Duration::from_secs(config.cleanup.link_timeout_secs))
            .build()
            .map_err(|e| AssistantError::NetworkError(e.to_string()))?;

        Ok(Self {
            store: ArtifactStore::new(config.paths.artifact_dir.clone()),
            config,
            client,
            classifier,
            prompter,
            progress,
            http,
        })
    }

    pub fn action_log(&self) -> ActionLog {
        ActionLog::new(self.config.action_log_path())
    }

    pub fn batch_size(&self) -> usize {
        self.config.mutation.batch_size
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssistantCommand {
    Triage,
    Opportunities,
    DraftReplies,
    PlanCleanup,
    ExecuteCleanup,
    ArchiveUnread,
    Categorize,
    Filters,
}

impl AssistantCommand {
    pub const ALL: [AssistantCommand; 8] = [
        AssistantCommand::Triage,
        AssistantCommand::Opportunities,
        AssistantCommand::DraftReplies,
        AssistantCommand::PlanCleanup,
        AssistantCommand::ExecuteCleanup,
        AssistantCommand::ArchiveUnread,
        AssistantCommand::Categorize,
        AssistantCommand::Filters,
    ];

    pub fn menu_number(self) -> u8 {
        match self {
            AssistantCommand::Triage => 1,
            AssistantCommand::Opportunities => 2,
            AssistantCommand::DraftReplies => 3,
            AssistantCommand::PlanCleanup => 4,
            AssistantCommand::ExecuteCleanup => 5,
            AssistantCommand::ArchiveUnread => 6,
            AssistantCommand::Categorize => 7,
            AssistantCommand::Filters => 8,
        }
    }

    pub fn from_menu_number(number: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.menu_number() == number)
    }

    /// Short name used in status and error lines
    pub fn title(self) -> &'static str {
        match self {
            AssistantCommand::Triage => "Triage",
            AssistantCommand::Opportunities => "Opportunity categorization",
            AssistantCommand::DraftReplies => "Draft replies",
            AssistantCommand::PlanCleanup => "Plan cleanup",
            AssistantCommand::ExecuteCleanup => "Execute cleanup",
            AssistantCommand::ArchiveUnread => "Archive unread",
            AssistantCommand::Categorize => "General categorization",
            AssistantCommand::Filters => "Filter management",
        }
    }

    pub fn menu_label(self) -> &'static str {
        match self {
            AssistantCommand::Triage => "Triage important emails (Identify emails needing response)",
            AssistantCommand::Opportunities => "Categorize business opportunities",
            AssistantCommand::DraftReplies => "Draft replies to important emails",
            AssistantCommand::PlanCleanup => {
                "Plan email cleanup (Identify deletion candidates & unsubscribes)"
            }
            AssistantCommand::ExecuteCleanup => {
                "Execute email cleanup (Interactive unsubscribe & delete)"
            }
            AssistantCommand::ArchiveUnread => "Archive all unread emails (Inbox Zero)",
            AssistantCommand::Categorize => "General categorization & labeling of recent emails",
            AssistantCommand::Filters => "Manage Gmail filters",
        }
    }
}

/// Values supplied on the command line; `None` means ask
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOptions {
    pub hours: Option<u32>,
    pub days: Option<u32>,
    pub max: Option<u32>,
    pub include_read: Option<bool>,
}

pub async fn dispatch(
    command: AssistantCommand,
    ctx: &CommandContext,
    options: &CommandOptions,
) -> Result<()> {
    tracing::info!("Running command: {}", command.title());
    match command {
        AssistantCommand::Triage => triage::run(ctx, options).await.map(|_| ()),
        AssistantCommand::Opportunities => opportunities::run(ctx, options).await.map(|_| ()),
        AssistantCommand::DraftReplies => draft_reply::run(ctx).await.map(|_| ()),
        AssistantCommand::PlanCleanup => plan_cleanup::run(ctx, options).await.map(|_| ()),
        AssistantCommand::ExecuteCleanup => execute_cleanup::run(ctx).await.map(|_| ()),
        AssistantCommand::ArchiveUnread => archive_unread::run(ctx).await.map(|_| ()),
        AssistantCommand::Categorize => categorize::run(ctx).await.map(|_| ()),
        AssistantCommand::Filters => filters::run(ctx).await.map(|_| ()),
    }
}

/// Ask for a whole number in `1..=max`; blank keeps `default`
pub(crate) fn prompt_positive(
    prompter: &dyn Prompter,
    message: &str,
    default: u32,
    max: u32,
) -> Result<u32> {
    loop {
        let answer = prompter.text(message, &default.to_string())?;
        let answer = answer.trim();
        if answer.is_empty() {
            return Ok(default);
        }
        match answer.parse::<u32>() {
            Ok(value) if (1..=max).contains(&value) => return Ok(value),
            _ => console::warning(&format!("Please enter a whole number from 1 to {}.", max)),
        }
    }
}

/// Reject a look-back passed on the command line that the prompts would refuse
pub(crate) fn check_lookback(name: &str, value: u32, max: u32) -> Result<u32> {
    if value == 0 || value > max {
        return Err(AssistantError::ConfigError(format!(
            "--{} must be between 1 and {}",
            name, max
        )));
    }
    Ok(value)
}

/// Ask for a look-back window in days or hours; returns hours
pub(crate) fn prompt_window_hours(prompter: &dyn Prompter, default_hours: u32) -> Result<u32> {
    let unit = loop {
        let answer = prompter.text(
            &format!(
                "Look back for new emails in (d)ays or (h)ours? [h, default {}h]:",
                default_hours
            ),
            "h",
        )?;
        match answer.trim().to_lowercase().as_str() {
            "" | "h" => break 'h',
            "d" => break 'd',
            _ => console::warning("Please enter 'd' for days or 'h' for hours."),
        }
    };

    if unit == 'd' {
        let default_days = (default_hours / 24).max(1);
        let days = prompt_positive(
            prompter,
            "How many days back should I look?",
            default_days,
            MAX_LOOKBACK_DAYS,
        )?;
        Ok(days * 24)
    } else {
        prompt_positive(
            prompter,
            "How many hours back should I look?",
            default_hours,
            MAX_LOOKBACK_HOURS,
        )
    }
}

/// Lower-case y/n style answer, looping until it is one of `allowed`
pub(crate) fn prompt_choice(
    prompter: &dyn Prompter,
    message: &str,
    allowed: &[&str],
    default: &str,
) -> Result<String> {
    loop {
        let answer = prompter.text(message, default)?.trim().to_lowercase();
        let answer = if answer.is_empty() {
            default.to_string()
        } else {
            answer
        };
        if allowed.contains(&answer.as_str()) {
            return Ok(answer);
        }
        console::warning(&format!("  Invalid input. Please enter {}.", allowed.join(", ")));
    }
}

/// Observer that drives a progress bar from pipeline events
///
/// The caller finishes the returned bar once the run is over.
pub(crate) fn progress_observer(
    progress: &ProgressReporter,
    label: &str,
) -> (PipelineObserver, ProgressBar) {
    let bar = progress.add_progress_bar(0, label);
    let handle = bar.clone();
    let observer: PipelineObserver = Arc::new(move |event| match event {
        PipelineEvent::Selected(n) => handle.set_length(n as u64),
        PipelineEvent::Classified { subject, category } => {
            handle.inc(1);
            handle.set_message(format!("{} -> {}", truncate_chars(&subject, 40), category));
        }
        PipelineEvent::Skipped { .. } => handle.inc(1),
        PipelineEvent::Mutating(n) => tracing::info!("Applying {} label changes", n),
        PipelineEvent::LabelsResolved(n) => tracing::debug!("{} labels resolved", n),
    });
    (observer, bar)
}
