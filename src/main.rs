use anyhow::Result;
use clap::Parser;
use email_assistant::auth;
use email_assistant::classifier::{ClassifierAdapter, OpenAiClassifier};
use email_assistant::cli::{self, console, Cli, Commands, InquirePrompter, ProgressReporter};
use email_assistant::client::ProductionGmailClient;
use email_assistant::commands::CommandContext;
use email_assistant::config::Config;
use email_assistant::error::AssistantError;
use indicatif::MultiProgress;
use std::io::Write;
use std::process;
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

const PROFILE_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";

/// A writer that prints through MultiProgress to avoid progress bar conflicts
#[derive(Clone)]
struct MultiProgressWriter {
    multi: Arc<MultiProgress>,
    buffer: Arc<std::sync::Mutex<Vec<u8>>>,
}

impl MultiProgressWriter {
    fn new(multi: Arc<MultiProgress>) -> Self {
        Self {
            multi,
            buffer: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }
}

impl Write for MultiProgressWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.extend_from_slice(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if let Ok(mut buffer) = self.buffer.lock() {
            if !buffer.is_empty() {
                let msg = String::from_utf8_lossy(&buffer);
                let msg = msg.trim_end_matches('\n');
                if !msg.is_empty() {
                    let _ = self.multi.println(msg);
                }
                buffer.clear();
            }
        }
        Ok(())
    }
}

impl Drop for MultiProgressWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// MakeWriter implementation for tracing
#[derive(Clone)]
struct MultiProgressMakeWriter {
    multi: Arc<MultiProgress>,
}

impl<'a> MakeWriter<'a> for MultiProgressMakeWriter {
    type Writer = MultiProgressWriter;

    fn make_writer(&'a self) -> Self::Writer {
        MultiProgressWriter::new(Arc::clone(&self.multi))
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        eprintln!("\nFor help, run: email-assistant --help");
        process::exit(1);
    }
}

fn init_tracing(cli: &Cli, multi: Arc<MultiProgress>) {
    let default_directives = if cli.verbose {
        "email_assistant=debug,info"
    } else {
        "email_assistant=info,warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));
    let make_writer = MultiProgressMakeWriter { multi };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(make_writer)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(&cli.config).await?;
    if let Some(credentials) = &cli.credentials {
        config.paths.credentials = credentials.clone();
    }
    if let Some(token_cache) = &cli.token_cache {
        config.paths.token_cache = token_cache.clone();
    }
    config.validate()?;
    Ok(config)
}

async fn run() -> Result<()> {
    // aws-lc-rs everywhere except Windows, where ring avoids the NASM/CMake toolchain
    #[cfg(not(windows))]
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    #[cfg(windows)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let multi_progress = Arc::new(MultiProgress::new());
    init_tracing(&cli, Arc::clone(&multi_progress));
    tracing::info!("Email assistant starting...");

    if let Some(Commands::InitConfig { output, force }) = &cli.command {
        if output.exists() && !force {
            return Err(AssistantError::ConfigError(format!(
                "Configuration file already exists at {:?}. Use --force to overwrite.",
                output
            ))
            .into());
        }
        Config::create_example(output).await?;
        println!("Created example configuration file at: {:?}", output);
        println!("\nKey settings to review:");
        println!("  - llm.api_key_env: environment variable holding the OpenAI key");
        println!("  - replies.sender_name: name used to sign drafted replies");
        println!("  - archive.label: label applied by archive-unread");
        println!("  - paths.artifact_dir: where reports and snapshots are written");
        return Ok(());
    }

    let config = load_config(&cli).await?;

    if let Some(Commands::Auth { force }) = &cli.command {
        if *force && auth::reset_token_cache(&config.paths.token_cache).await? {
            println!("Removed existing token cache");
        }

        let hub =
            auth::connect_gmail_hub(&config.paths.credentials, &config.paths.token_cache).await?;
        println!("Successfully authenticated with Gmail API");
        println!("Token cached at: {:?}", config.paths.token_cache);

        let (_, profile) = hub
            .users()
            .get_profile("me")
            .add_scope(PROFILE_SCOPE)
            .doit()
            .await
            .map_err(AssistantError::from)?;
        println!(
            "Connected to account: {}",
            profile.email_address.unwrap_or_default()
        );
        return Ok(());
    }

    let reporter = ProgressReporter::with_multi_progress((*multi_progress).clone());

    let auth_spinner = reporter.add_spinner("Authenticating with Gmail API...");
    let hub = auth::connect_gmail_hub(&config.paths.credentials, &config.paths.token_cache).await;
    let hub = match hub {
        Ok(hub) => {
            reporter.finish_spinner(&auth_spinner, "Gmail API authenticated");
            hub
        }
        Err(e) => {
            auth_spinner.finish_and_clear();
            console::error("Failed to initialize Gmail service. Check credentials.json and try 'email-assistant auth --force'.");
            return Err(e.into());
        }
    };

    let classifier = OpenAiClassifier::from_config(&config.llm)?;
    let ctx = CommandContext::new(
        config,
        Arc::new(ProductionGmailClient::new(hub)),
        ClassifierAdapter::new(Arc::new(classifier)),
        Arc::new(InquirePrompter),
        reporter,
    )?;

    match cli.command.as_ref().and_then(Commands::as_assistant_command) {
        Some((command, options)) => {
            if !cli::run_guarded(command, &ctx, &options).await {
                process::exit(1);
            }
        }
        None => {
            console::header("Email Assistant");
            cli::run_menu(&ctx).await?;
        }
    }

    Ok(())
}
