//! Command-line interface: arguments, interactive menu, prompts and progress

use clap::{Parser, Subcommand};
use crossterm::style::Stylize;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use crate::commands::{self, AssistantCommand, CommandContext, CommandOptions};
use crate::error::{AssistantError, Result};

#[derive(Parser, Debug)]
#[command(name = "email-assistant")]
#[command(version)]
#[command(about = "Gmail triage, categorization, reply drafting and cleanup assistant", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Path to OAuth2 credentials file (overrides config)
    #[arg(long)]
    pub credentials: Option<PathBuf>,

    /// Path to token cache file (overrides config)
    #[arg(long)]
    pub token_cache: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,

    /// Run one command directly; without it the interactive menu starts
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Authenticate with Gmail API
    Auth {
        /// Force re-authentication even if token exists
        #[arg(long)]
        force: bool,
    },

    /// Find recent emails that need a response
    Triage {
        /// Hours to look back (skips the window prompt)
        #[arg(long)]
        hours: Option<u32>,

        /// Include already-read emails (skips the prompt)
        #[arg(long)]
        include_read: bool,
    },

    /// Categorize business and sponsorship opportunities
    Opportunities {
        /// Hours to look back
        #[arg(long)]
        hours: Option<u32>,
    },

    /// Draft replies to emails flagged by triage
    DraftReplies,

    /// Identify deletion and unsubscribe candidates
    PlanCleanup {
        /// Only consider emails older than this many days
        #[arg(long)]
        days: Option<u32>,

        /// Maximum number of emails to process
        #[arg(long)]
        max: Option<u32>,
    },

    /// Interactively unsubscribe and delete planned candidates
    ExecuteCleanup,

    /// Label all unread inbox emails and mark them read
    ArchiveUnread,

    /// Categorize and label recent emails
    Categorize,

    /// Create the predefined Gmail filters
    Filters,

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

impl Commands {
    /// Assistant command and prompt overrides for a mailbox subcommand
    pub fn as_assistant_command(&self) -> Option<(AssistantCommand, CommandOptions)> {
        let mut options = CommandOptions::default();
        let command = match self {
            Commands::Triage { hours, include_read } => {
                options.hours = *hours;
                options.include_read = include_read.then_some(true);
                AssistantCommand::Triage
            }
            Commands::Opportunities { hours } => {
                options.hours = *hours;
                AssistantCommand::Opportunities
            }
            Commands::DraftReplies => AssistantCommand::DraftReplies,
            Commands::PlanCleanup { days, max } => {
                options.days = *days;
                options.max = *max;
                AssistantCommand::PlanCleanup
            }
            Commands::ExecuteCleanup => AssistantCommand::ExecuteCleanup,
            Commands::ArchiveUnread => AssistantCommand::ArchiveUnread,
            Commands::Categorize => AssistantCommand::Categorize,
            Commands::Filters => AssistantCommand::Filters,
            Commands::Auth { .. } | Commands::InitConfig { .. } => return None,
        };
        Some((command, options))
    }
}

/// Progress reporter using indicatif
#[derive(Clone)]
pub struct ProgressReporter {
    multi: MultiProgress,
    spinner_style: ProgressStyle,
    bar_style: ProgressStyle,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::with_multi_progress(MultiProgress::new())
    }

    /// Share a MultiProgress with the log writer so log lines print above bars
    pub fn with_multi_progress(multi: MultiProgress) -> Self {
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed:>6}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        let bar_style = ProgressStyle::default_bar()
            .template("[{elapsed:>6}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");

        Self {
            multi,
            spinner_style,
            bar_style,
        }
    }

    /// Reporter that draws nothing
    pub fn hidden() -> Self {
        Self::with_multi_progress(MultiProgress::with_draw_target(ProgressDrawTarget::hidden()))
    }

    pub fn multi_progress(&self) -> &MultiProgress {
        &self.multi
    }

    pub fn add_spinner(&self, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(self.spinner_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    pub fn add_progress_bar(&self, len: u64, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new(len));
        pb.set_style(self.bar_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Finish a spinner and clear it from the multi-progress display
    pub fn finish_spinner(&self, pb: &ProgressBar, msg: &str) {
        pb.finish_and_clear();
        println!("  ✓ {}", msg);
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Interactive input collaborator
pub trait Prompter: Send + Sync {
    /// Free text; an empty answer yields `default`
    fn text(&self, message: &str, default: &str) -> Result<String>;

    fn confirm(&self, message: &str, default: bool) -> Result<bool>;
}

/// Terminal prompts backed by inquire
#[derive(Debug, Default, Clone)]
pub struct InquirePrompter;

impl Prompter for InquirePrompter {
    fn text(&self, message: &str, default: &str) -> Result<String> {
        let mut prompt = inquire::Text::new(message);
        if !default.is_empty() {
            prompt = prompt.with_default(default);
        }
        Ok(prompt.prompt()?)
    }

    fn confirm(&self, message: &str, default: bool) -> Result<bool> {
        Ok(inquire::Confirm::new(message).with_default(default).prompt()?)
    }
}

/// Colored console lines
pub mod console {
    use crossterm::style::Stylize;

    pub fn header(msg: &str) {
        println!("\n{}", msg.bold().blue());
    }

    pub fn info(msg: &str) {
        println!("{}", msg.cyan());
    }

    pub fn success(msg: &str) {
        println!("{}", msg.green());
    }

    pub fn warning(msg: &str) {
        println!("{}", msg.yellow());
    }

    pub fn error(msg: &str) {
        eprintln!("{}", msg.red());
    }
}

/// Menu text with the eight commands and the exit entry
pub fn render_menu() -> String {
    let mut menu = String::new();
    menu.push_str(&format!("\n{}\n", "--- Email Assistant CLI ---".bold().blue()));
    menu.push_str("What would you like to do today?\n");
    for command in AssistantCommand::ALL {
        menu.push_str(&format!("{}. {}\n", command.menu_number(), command.menu_label()));
    }
    menu.push_str("0. Exit\n");
    menu
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    Exit,
    Run(AssistantCommand),
}

pub fn parse_menu_choice(input: &str) -> Option<MenuChoice> {
    let number: u8 = input.trim().parse().ok()?;
    if number == 0 {
        return Some(MenuChoice::Exit);
    }
    AssistantCommand::from_menu_number(number).map(MenuChoice::Run)
}

/// Run one command inside the error boundary
///
/// Errors are printed and swallowed; the hosting process keeps going.
pub async fn run_guarded(command: AssistantCommand, ctx: &CommandContext, options: &CommandOptions) -> bool {
    console::info(&format!("\nStarting {}...", command.title()));
    match commands::dispatch(command, ctx, options).await {
        Ok(()) => true,
        Err(AssistantError::OperationCancelled(msg)) => {
            console::warning(&format!("{} cancelled: {}", command.title(), msg));
            false
        }
        Err(e) => {
            warn!("{} failed: {}", command.title(), e);
            console::error(&format!("An error occurred during {}: {}", command.title(), e));
            if matches!(e, AssistantError::AuthError(_)) {
                console::warning("Run 'email-assistant auth --force' to re-authenticate.");
            }
            false
        }
    }
}

/// The numbered menu loop; returns when the user picks Exit
pub async fn run_menu(ctx: &CommandContext) -> Result<()> {
    loop {
        print!("{}", render_menu());
        let input = match ctx.prompter.text("Enter your choice:", "") {
            Ok(input) => input,
            Err(AssistantError::OperationCancelled(_)) => break,
            Err(e) => return Err(e),
        };

        match parse_menu_choice(&input) {
            Some(MenuChoice::Exit) => break,
            Some(MenuChoice::Run(command)) => {
                run_guarded(command, ctx, &CommandOptions::default()).await;
            }
            None => console::warning("Invalid choice. Please enter a number between 0 and 8."),
        }
    }

    info!("Exiting email assistant");
    console::success("Goodbye!");
    Ok(())
}
