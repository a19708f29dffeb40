//! OAuth2 authentication management for Gmail API

use google_gmail1::{hyper_rustls, hyper_util, yup_oauth2, Gmail};
use std::env;
use std::future::Future;
use std::path::Path;
use yup_oauth2::ApplicationSecret;

use crate::error::{AssistantError, Result};

/// Gmail API scopes requested up front so every command shares one token
///
/// - gmail.readonly: triage and categorization reads
/// - gmail.send: replies and unsubscribe emails
/// - gmail.modify: batch label changes and trash
/// - gmail.settings.basic: filter creation
/// - gmail.labels: label listing and creation
pub const REQUIRED_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.readonly",
    "https://www.googleapis.com/auth/gmail.send",
    "https://www.googleapis.com/auth/gmail.modify",
    "https://www.googleapis.com/auth/gmail.settings.basic",
    "https://www.googleapis.com/auth/gmail.labels",
];

/// Type alias for Gmail Hub to simplify type signatures
pub type GmailHub =
    Gmail<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>>;

/// Initialize Gmail API hub with OAuth2 authentication
///
/// Uses the installed-app flow (browser redirect) and persists tokens to
/// `token_cache_path` so later runs refresh silently.
pub async fn initialize_gmail_hub(
    credentials_path: &Path,
    token_cache_path: &Path,
) -> Result<GmailHub> {
    let secret = application_secret(credentials_path).await?;

    if let Some(parent) = token_cache_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let auth = yup_oauth2::InstalledFlowAuthenticator::builder(
        secret,
        yup_oauth2::InstalledFlowReturnMethod::HTTPRedirect,
    )
    .persist_tokens_to_disk(token_cache_path)
    .build()
    .await
    .map_err(|e| AssistantError::AuthError(format!("Failed to build authenticator: {}", e)))?;

    // Pre-authenticate so the cached token carries every scope
    let _token = auth
        .token(REQUIRED_SCOPES)
        .await
        .map_err(|e| AssistantError::AuthError(format!("Failed to obtain token: {}", e)))?;

    if token_cache_path.exists() {
        secure_token_file(token_cache_path).await?;
    }

    let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
        .build(
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_native_roots()
                .map_err(|e| {
                    AssistantError::AuthError(format!("Failed to load TLS roots: {}", e))
                })?
                .https_or_http()
                .enable_http1()
                .build(),
        );

    Ok(Gmail::new(client, auth))
}

/// Build the hub, re-running the consent flow once if the cached token is rejected
pub async fn connect_gmail_hub(
    credentials_path: &Path,
    token_cache_path: &Path,
) -> Result<GmailHub> {
    with_reauthentication(token_cache_path, || {
        initialize_gmail_hub(credentials_path, token_cache_path)
    })
    .await
}

/// Run `attempt`; on `AuthError` drop the cached token and try once more
///
/// Without a cached token there is nothing stale to discard, so the first
/// error is returned as is.
pub async fn with_reauthentication<T, F, Fut>(token_cache_path: &Path, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match attempt().await {
        Err(AssistantError::AuthError(reason)) => {
            if !reset_token_cache(token_cache_path).await? {
                return Err(AssistantError::AuthError(reason));
            }
            tracing::warn!(
                "Cached token was rejected ({}); re-running authentication",
                reason
            );
            attempt().await
        }
        other => other,
    }
}

/// Delete the cached token so the next hub initialization re-runs the consent flow
pub async fn reset_token_cache(token_cache_path: &Path) -> Result<bool> {
    match tokio::fs::remove_file(token_cache_path).await {
        Ok(()) => {
            tracing::info!("Removed cached token at {:?}", token_cache_path);
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Read the OAuth client from `credentials_path`, falling back to the
/// `GMAIL_CLIENT_*` variables when the file is absent
pub async fn application_secret(credentials_path: &Path) -> Result<ApplicationSecret> {
    if !credentials_path.exists() {
        if let Ok(secret) = load_credentials_from_env() {
            tracing::info!("Using OAuth client from GMAIL_CLIENT_ID/GMAIL_CLIENT_SECRET");
            return Ok(secret);
        }
    }

    yup_oauth2::read_application_secret(credentials_path)
        .await
        .map_err(|e| {
            AssistantError::AuthError(format!(
                "Failed to read credentials from {}: {}",
                credentials_path.display(),
                e
            ))
        })
}

/// Load OAuth2 credentials from environment variables
///
/// - `GMAIL_CLIENT_ID`: OAuth2 client ID
/// - `GMAIL_CLIENT_SECRET`: OAuth2 client secret
/// - `GMAIL_REDIRECT_URI`: Redirect URI (optional, defaults to http://localhost:8080)
pub fn load_credentials_from_env() -> Result<ApplicationSecret> {
    let client_id = env::var("GMAIL_CLIENT_ID")
        .map_err(|_| AssistantError::ConfigError("GMAIL_CLIENT_ID not set".to_string()))?;
    let client_secret = env::var("GMAIL_CLIENT_SECRET")
        .map_err(|_| AssistantError::ConfigError("GMAIL_CLIENT_SECRET not set".to_string()))?;
    let redirect_uri =
        env::var("GMAIL_REDIRECT_URI").unwrap_or_else(|_| "http://localhost:8080".to_string());

    Ok(ApplicationSecret {
        client_id,
        client_secret,
        auth_uri: "https://accounts.google.com/o/oauth2/auth".to_string(),
        token_uri: "https://oauth2.googleapis.com/token".to_string(),
        redirect_uris: vec![redirect_uri],
        ..Default::default()
    })
}

/// Restrict the token file to its owner (0600)
#[cfg(unix)]
pub async fn secure_token_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o600);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

/// Windows uses ACLs; nothing to tighten here
#[cfg(windows)]
pub async fn secure_token_file(_path: &Path) -> Result<()> {
    Ok(())
}
