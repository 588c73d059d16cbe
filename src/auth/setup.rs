//! One-time interactive OAuth consent producing `token.json`.

use anyhow::Context;
use reqwest::Client;
use serde::Deserialize;
use std::io::Write;
use std::path::Path;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use url::Url;

use super::token::{read_token_response, TokenRecord, GOOGLE_TOKEN_URI};
use super::DRIVE_SCOPE;
use crate::config::Settings;
use crate::{ConverterError, Result};

/// Copy/paste redirect: Google shows the code to the operator instead of redirecting
pub const OOB_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";

/// OAuth client from `client_secret.json`
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret: String,

    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,

    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

/// Google wraps the client under the application type
#[derive(Debug, Deserialize)]
struct ClientSecretFile {
    installed: Option<OAuthClient>,
    web: Option<OAuthClient>,
}

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

impl OAuthClient {
    /// Load the client descriptor, explaining how to create one when it is missing
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConverterError::AuthSetup(format!(
                "{} not found\n\n\
                 Create an OAuth client ID in the Google Cloud console:\n\
                 \x20 1. https://console.cloud.google.com/\n\
                 \x20 2. APIs & Services -> Credentials\n\
                 \x20 3. Create credentials -> OAuth client ID\n\
                 \x20 4. Application type: Desktop app\n\
                 \x20 5. Download the JSON\n\
                 \x20 6. Save it as {}",
                path.display(),
                path.display()
            ))
            .into());
        }

        let content = fs_err::read_to_string(path)?;
        let file: ClientSecretFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        file.installed.or(file.web).ok_or_else(|| {
            ConverterError::AuthSetup(format!(
                "{} has neither an \"installed\" nor a \"web\" client",
                path.display()
            ))
            .into()
        })
    }

    /// Consent page URL for the given scopes
    pub fn authorization_url(&self, scopes: &[&str]) -> Result<Url> {
        let url = Url::parse_with_params(
            &self.auth_uri,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", OOB_REDIRECT_URI),
                ("response_type", "code"),
                ("scope", scopes.join(" ").as_str()),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .with_context(|| format!("Invalid auth_uri: {}", self.auth_uri))?;

        Ok(url)
    }

    /// Exchange an authorization code for a token record
    pub async fn exchange_code(&self, http: &Client, code: &str, scopes: &[&str]) -> Result<TokenRecord> {
        let response = http
            .post(&self.token_uri)
            .form(&[
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", OOB_REDIRECT_URI),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .with_context(|| format!("Could not send token request to '{}'", self.token_uri))?;

        let token = read_token_response(response)
            .await
            .map_err(|e| ConverterError::AuthSetup(format!("{:#}", e)))?;

        if token.refresh_token.is_none() {
            tracing::warn!("No refresh token granted; the saved token will stop working once it expires");
        }

        let granted = token
            .scope
            .as_deref()
            .map(|s| s.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .unwrap_or_else(|| scopes.iter().map(|s| s.to_string()).collect());

        Ok(TokenRecord {
            expiry: token.expiry(),
            token: token.access_token,
            refresh_token: token.refresh_token,
            token_uri: self.token_uri.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            scopes: granted,
            extra: serde_json::Map::new(),
        })
    }
}

/// Run the interactive consent flow and persist the resulting token.
///
/// The consent URL and status lines go to `output`; the authorization code is read as
/// one line from `input`.
pub async fn authorize<R, W>(settings: &Settings, http: &Client, mut input: R, mut output: W) -> Result<TokenRecord>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let client = OAuthClient::load(&settings.client_secret_path())?;
    let scopes = [DRIVE_SCOPE];
    let url = client.authorization_url(&scopes)?;

    writeln!(output, "Open this URL in your browser and grant access:")?;
    writeln!(output)?;
    writeln!(output, "{}", url)?;
    writeln!(output)?;
    write!(output, "Enter the authorization code: ")?;
    output.flush()?;

    let mut line = String::new();
    input
        .read_line(&mut line)
        .await
        .context("Failed to read authorization code")?;

    let code = line.trim();
    if code.is_empty() {
        return Err(ConverterError::AuthSetup("no authorization code entered".to_string()).into());
    }

    let record = client.exchange_code(http, code, &scopes).await?;

    let token_path = settings.token_path();
    record.save(&token_path)?;
    tracing::info!("Token saved to {}", token_path.display());

    writeln!(output)?;
    writeln!(output, "Authorization complete, token saved to {}", token_path.display())?;

    Ok(record)
}
