//! Email Assistant
//!
//! A menu-driven Gmail assistant that pairs the Gmail API with an LLM to triage,
//! draft replies, plan and execute cleanup, and keep the mailbox labeled.
//!
//! # Overview
//!
//! Most commands are one shape: select messages with a search query, fetch and
//! parse them, classify each one into a closed set of categories, optionally
//! label the results in batches, then write a readable report and a JSON snapshot.
//! That shape lives in [`pipeline`]; each command in [`commands`] supplies the
//! query, categories, prompt and label mapping.
//!
//! # Example Usage
//!
//! ```no_run
//! use email_assistant::{auth, client::ProductionGmailClient, config::Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml".as_ref()).await?;
//!
//!     let hub = auth::initialize_gmail_hub(
//!         &config.paths.credentials,
//!         &config.paths.token_cache,
//!     ).await?;
//!
//!     let client = ProductionGmailClient::new(hub);
//!     // Hand the client to a CommandContext and dispatch commands
//!
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`auth`] - OAuth2 authentication and Gmail API initialization
//! - [`client`] - Gmail API client trait and production implementation
//! - [`classifier`] - LLM adapter, category sets and verdict parsing
//! - [`cli`] - Argument parsing, prompts, progress and the menu loop
//! - [`commands`] - The eight assistant commands
//! - [`config`] - Configuration management
//! - [`error`] - Error types and result aliases
//! - [`label_directory`] - Label name to id resolution with create-on-miss
//! - [`materializer`] - Raw message parsing into [`models::MessageRecord`]
//! - [`mutator`] - Batched label add/remove
//! - [`pipeline`] - The generic categorize-and-label pipeline
//! - [`report`] - Run reports, narratives and snapshots
//! - [`selector`] - Search query construction and paging
//! - [`state`] - Artifact store, response history and action log

pub mod auth;
pub mod classifier;
pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod label_directory;
pub mod materializer;
pub mod models;
pub mod mutator;
pub mod pipeline;
pub mod report;
pub mod selector;
pub mod state;

pub use error::{AssistantError, Result};

pub use models::{ClassificationVerdict, MessageRecord};

pub use classifier::{CategorySet, ClassifierAdapter, OpenAiClassifier, TextClassifier};

pub use client::{GmailClient, ProductionGmailClient};

pub use config::Config;

pub use pipeline::{CategorizeJob, CategorizePipeline, PipelineOutcome};

pub use report::{ReportEmitter, RunReport};

pub use cli::{Cli, Commands, ProgressReporter};

pub use commands::{AssistantCommand, CommandContext};
