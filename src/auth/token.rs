use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Google's OAuth token endpoint
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Tokens this close to expiry are refreshed before use
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// Persisted user-delegated token (`token.json`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Current access token
    pub token: String,

    /// Refresh token, absent when consent did not grant offline access
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Endpoint used for refresh exchanges
    #[serde(default = "default_token_uri")]
    pub token_uri: String,

    #[serde(default)]
    pub client_id: String,

    #[serde(default)]
    pub client_secret: String,

    /// Scopes granted at consent time
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Access token expiry; records without one never expire locally
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,

    /// Fields written by other tools, preserved on rewrite
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Token endpoint response for both refresh and code exchanges
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,

    #[serde(default)]
    pub expires_in: Option<i64>,

    #[serde(default)]
    pub refresh_token: Option<String>,

    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Absolute expiry computed from `expires_in`
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expires_in.map(|secs| Utc::now() + Duration::seconds(secs))
    }
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

impl TokenRecord {
    /// Load a record from disk
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs_err::read_to_string(path).context("Failed to read token file")?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse token file {}", path.display()))
    }

    /// Overwrite the record on disk
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize token")?;

        fs_err::write(path, content).context("Failed to write token file")?;

        Ok(())
    }

    /// Whether the access token must be refreshed before use at `now`.
    ///
    /// A record without an expiry is used as-is; the authorization flow of
    /// older installs never wrote one.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry
            .is_some_and(|expiry| expiry <= now + Duration::seconds(TOKEN_REFRESH_MARGIN_SECS))
    }

    /// Exchange the refresh token for a new access token
    pub async fn refresh(&mut self, http: &Client) -> Result<()> {
        let refresh_token = self
            .refresh_token
            .as_deref()
            .context("Token record has no refresh token")?;

        tracing::debug!("Refreshing access token at {}", self.token_uri);

        let response = http
            .post(&self.token_uri)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await
            .with_context(|| format!("Could not send refresh request to '{}'", self.token_uri))?;

        let token = read_token_response(response).await?;

        self.expiry = token.expiry();
        self.token = token.access_token;

        Ok(())
    }
}

/// Decode a token endpoint response, surfacing the OAuth error body on failure
pub async fn read_token_response(response: reqwest::Response) -> Result<TokenResponse> {
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("Token endpoint returned HTTP {}: {}", status, body.trim());
    }

    response
        .json::<TokenResponse>()
        .await
        .context("Failed to parse token endpoint response")
}
