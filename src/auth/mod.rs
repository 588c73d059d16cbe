use anyhow::Context;
use async_trait::async_trait;
use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::Client;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Settings;
use crate::{ConverterError, Result};

pub mod setup;
pub mod token;

pub use token::TokenRecord;

/// Full Drive access, needed to read the input folder and write the output folder
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// Credential used for Drive API calls
#[derive(Debug)]
pub enum Credential {
    /// User-delegated OAuth token from `token.json`
    User(TokenRecord),

    /// Service account key from `credentials.json`
    Service(ServiceAccount),
}

/// Service account identity; the target folders must be shared with it
pub struct ServiceAccount {
    key_path: PathBuf,
    provider: Arc<dyn TokenProvider>,
}

impl fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("key_path", &self.key_path)
            .finish_non_exhaustive()
    }
}

impl Credential {
    /// Human-readable name of the authentication method
    pub fn kind(&self) -> &'static str {
        match self {
            Credential::User(_) => "OAuth (personal account)",
            Credential::Service(_) => "service account",
        }
    }

    /// Bearer token for the Authorization header
    pub async fn bearer_token(&self) -> Result<String> {
        match self {
            Credential::User(record) => Ok(record.token.clone()),
            Credential::Service(account) => {
                let token = account
                    .provider
                    .token(&[DRIVE_SCOPE])
                    .await
                    .with_context(|| {
                        format!(
                            "Failed to mint service account token from {}",
                            account.key_path.display()
                        )
                    })?;

                Ok(token.as_str().to_string())
            }
        }
    }
}

/// A place credentials may come from.
///
/// `Ok(None)` means the source does not apply (nothing persisted, or nothing usable),
/// `Err` means it applies but is broken. Both let the chain move on.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Name used in log messages
    fn name(&self) -> &'static str;

    /// Try to produce a credential
    async fn load(&self) -> Result<Option<Credential>>;
}

/// Ordered list of credential sources, first usable one wins
pub struct CredentialChain {
    sources: Vec<Box<dyn CredentialSource>>,
}

impl CredentialChain {
    pub fn new(sources: Vec<Box<dyn CredentialSource>>) -> Self {
        Self { sources }
    }

    /// Cached user token first, then the service account key
    pub fn from_settings(settings: &Settings, http: Client) -> Self {
        Self::new(vec![
            Box::new(UserTokenSource::new(settings.token_path(), http)),
            Box::new(ServiceAccountSource::new(settings.service_account_path())),
        ])
    }

    /// Resolve the first usable credential
    pub async fn resolve(&self) -> Result<Credential> {
        for source in &self.sources {
            match source.load().await {
                Ok(Some(credential)) => {
                    tracing::info!("Authenticated via {}", source.name());
                    return Ok(credential);
                }
                Ok(None) => {
                    tracing::debug!("Credential source {} not applicable", source.name());
                }
                Err(e) => {
                    tracing::warn!("Credential source {} failed: {:#}", source.name(), e);
                }
            }
        }

        Err(ConverterError::AuthUnavailable(
            "neither token.json nor credentials.json yielded a credential\n\n\
             Set up one of:\n\
             \x20 1. OAuth (personal account): run `drive-audio authorize` and follow the prompt\n\
             \x20 2. Service account: save its key as credentials.json in the credentials directory\n\
             \x20    and share the input and output folders with the service account e-mail"
                .to_string(),
        )
        .into())
    }
}

/// User-delegated token persisted by the authorization flow
pub struct UserTokenSource {
    path: PathBuf,
    http: Client,
}

impl UserTokenSource {
    pub fn new(path: PathBuf, http: Client) -> Self {
        Self { path, http }
    }
}

#[async_trait]
impl CredentialSource for UserTokenSource {
    fn name(&self) -> &'static str {
        "user token"
    }

    async fn load(&self) -> Result<Option<Credential>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let mut record = TokenRecord::load(&self.path)?;

        if !record.is_expired(chrono::Utc::now()) {
            return Ok(Some(Credential::User(record)));
        }

        if record.refresh_token.is_none() {
            tracing::warn!(
                "Token in {} has expired and cannot be refreshed",
                self.path.display()
            );
            return Ok(None);
        }

        record.refresh(&self.http).await?;
        record.save(&self.path)?;
        tracing::info!("Refreshed access token saved to {}", self.path.display());

        Ok(Some(Credential::User(record)))
    }
}

/// Service account key file
pub struct ServiceAccountSource {
    path: PathBuf,
}

impl ServiceAccountSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl CredentialSource for ServiceAccountSource {
    fn name(&self) -> &'static str {
        "service account"
    }

    async fn load(&self) -> Result<Option<Credential>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let account = CustomServiceAccount::from_file(&self.path).with_context(|| {
            format!("Failed to load service account key {}", self.path.display())
        })?;

        Ok(Some(Credential::Service(ServiceAccount {
            key_path: self.path.clone(),
            provider: Arc::new(account),
        })))
    }
}
