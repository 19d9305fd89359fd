//! Azure access token acquisition.
//!
//! Tokens come from the hosting environment's managed identity or from a
//! signed-in Azure CLI, and are cached until shortly before they expire.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Local, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use tokio::process::Command;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use vmwarden_core::{AppError, AppResult};

/// Default instance metadata endpoint for managed identity tokens.
pub const IMDS_TOKEN_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

const IMDS_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";

/// Bearer token with its expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    /// Raw bearer token.
    pub token: String,
    /// Instant the token stops being accepted.
    pub expires_at: DateTime<Utc>,
}

/// Source of bearer tokens for an OAuth scope.
#[async_trait]
pub trait TokenCredential: Send + Sync {
    /// Returns a token valid for `scope`.
    async fn get_token(&self, scope: &str) -> AppResult<AccessToken>;
}

/// Selects which credential sources are tried.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CredentialKind {
    /// Managed identity first, then the Azure CLI.
    #[default]
    Auto,
    /// Managed identity only.
    ManagedIdentity,
    /// Azure CLI only.
    Cli,
}

impl FromStr for CredentialKind {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "auto" => Ok(Self::Auto),
            "managed_identity" => Ok(Self::ManagedIdentity),
            "cli" => Ok(Self::Cli),
            other => Err(AppError::Validation(format!(
                "credential kind must be one of 'auto', 'managed_identity', 'cli', got '{other}'"
            ))),
        }
    }
}

/// Where the managed identity token endpoint lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagedIdentityEndpoint {
    /// VM instance metadata service.
    Imds {
        /// Token endpoint URL.
        url: String,
    },
    /// App Service / Functions identity endpoint.
    AppService {
        /// Value of `IDENTITY_ENDPOINT`.
        url: String,
        /// Value of `IDENTITY_HEADER`.
        header: String,
    },
}

impl Default for ManagedIdentityEndpoint {
    fn default() -> Self {
        Self::Imds {
            url: IMDS_TOKEN_ENDPOINT.to_owned(),
        }
    }
}

/// Builds the credential chain for `kind`, wrapped in a token cache.
#[must_use]
pub fn build_credential(
    kind: CredentialKind,
    http_client: reqwest::Client,
    endpoint: ManagedIdentityEndpoint,
    client_id: Option<String>,
) -> Arc<dyn TokenCredential> {
    let managed_identity: Arc<dyn TokenCredential> = Arc::new(ManagedIdentityCredential::new(
        http_client,
        endpoint,
        client_id,
    ));
    let cli: Arc<dyn TokenCredential> = Arc::new(AzureCliCredential);

    let sources = match kind {
        CredentialKind::Auto => vec![managed_identity, cli],
        CredentialKind::ManagedIdentity => vec![managed_identity],
        CredentialKind::Cli => vec![cli],
    };

    Arc::new(CachedTokenCredential::new(Arc::new(
        ChainedTokenCredential::new(sources),
    )))
}

/// Converts an OAuth v2 scope into the v1 resource form used by identity endpoints.
fn scope_to_resource(scope: &str) -> &str {
    scope.strip_suffix("/.default").unwrap_or(scope)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EpochSeconds {
    Number(i64),
    Text(String),
}

impl EpochSeconds {
    fn to_datetime(&self) -> Option<DateTime<Utc>> {
        let seconds = match self {
            Self::Number(value) => *value,
            Self::Text(value) => value.trim().parse().ok()?,
        };
        DateTime::from_timestamp(seconds, 0)
    }
}

#[derive(Debug, Deserialize)]
struct ManagedIdentityTokenResponse {
    access_token: String,
    expires_on: EpochSeconds,
}

/// Token source backed by the hosting environment's managed identity.
pub struct ManagedIdentityCredential {
    http_client: reqwest::Client,
    endpoint: ManagedIdentityEndpoint,
    client_id: Option<String>,
}

impl ManagedIdentityCredential {
    /// Creates a managed identity credential.
    ///
    /// `client_id` selects a user-assigned identity.
    #[must_use]
    pub fn new(
        http_client: reqwest::Client,
        endpoint: ManagedIdentityEndpoint,
        client_id: Option<String>,
    ) -> Self {
        Self {
            http_client,
            endpoint,
            client_id,
        }
    }

    fn request(&self, resource: &str) -> AppResult<reqwest::RequestBuilder> {
        let (raw_url, api_version) = match &self.endpoint {
            ManagedIdentityEndpoint::Imds { url } => (url, IMDS_API_VERSION),
            ManagedIdentityEndpoint::AppService { url, .. } => (url, APP_SERVICE_API_VERSION),
        };

        let mut url = url::Url::parse(raw_url).map_err(|error| {
            AppError::Internal(format!("invalid managed identity endpoint '{raw_url}': {error}"))
        })?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("api-version", api_version);
            query.append_pair("resource", resource);
            if let Some(client_id) = &self.client_id {
                query.append_pair("client_id", client_id);
            }
        }

        let builder = self.http_client.get(url);
        Ok(match &self.endpoint {
            ManagedIdentityEndpoint::Imds { .. } => builder.header("Metadata", "true"),
            ManagedIdentityEndpoint::AppService { header, .. } => {
                builder.header("X-IDENTITY-HEADER", header.as_str())
            }
        })
    }
}

#[async_trait]
impl TokenCredential for ManagedIdentityCredential {
    async fn get_token(&self, scope: &str) -> AppResult<AccessToken> {
        let response = self
            .request(scope_to_resource(scope))?
            .timeout(std::time::Duration::from_secs(5))
            .send()
            .await
            .map_err(|error| {
                AppError::Unauthorized(format!("managed identity endpoint unreachable: {error}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<response body unavailable>".to_owned());
            return Err(AppError::Unauthorized(format!(
                "managed identity token request failed with status {status}: {body}"
            )));
        }

        let payload: ManagedIdentityTokenResponse = response.json().await.map_err(|error| {
            AppError::Unauthorized(format!("invalid managed identity token response: {error}"))
        })?;
        let expires_at = payload.expires_on.to_datetime().ok_or_else(|| {
            AppError::Unauthorized("managed identity token has no valid expiry".to_owned())
        })?;

        Ok(AccessToken {
            token: payload.access_token,
            expires_at,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_on: Option<String>,
    #[serde(default, rename = "expires_on")]
    expires_on_epoch: Option<i64>,
}

impl CliTokenResponse {
    fn into_access_token(self) -> AppResult<AccessToken> {
        let expires_at = match (self.expires_on_epoch, self.expires_on.as_deref()) {
            (Some(epoch), _) => DateTime::from_timestamp(epoch, 0),
            (None, Some(local)) => parse_cli_local_time(local),
            (None, None) => None,
        }
        .ok_or_else(|| AppError::Unauthorized("azure cli token has no valid expiry".to_owned()))?;

        Ok(AccessToken {
            token: self.access_token,
            expires_at,
        })
    }
}

fn parse_cli_local_time(value: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f").ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}

/// Token source backed by `az account get-access-token`.
pub struct AzureCliCredential;

#[async_trait]
impl TokenCredential for AzureCliCredential {
    async fn get_token(&self, scope: &str) -> AppResult<AccessToken> {
        let output = Command::new("az")
            .args([
                "account",
                "get-access-token",
                "--output",
                "json",
                "--resource",
                scope_to_resource(scope),
            ])
            .output()
            .await
            .map_err(|error| AppError::Unauthorized(format!("azure cli unavailable: {error}")))?;

        if !output.status.success() {
            return Err(AppError::Unauthorized(format!(
                "azure cli token request failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let payload: CliTokenResponse = serde_json::from_slice(&output.stdout).map_err(|error| {
            AppError::Unauthorized(format!("invalid azure cli token output: {error}"))
        })?;

        payload.into_access_token()
    }
}

/// Tries each source in order and returns the first token obtained.
pub struct ChainedTokenCredential {
    sources: Vec<Arc<dyn TokenCredential>>,
}

impl ChainedTokenCredential {
    /// Creates a chain over `sources`.
    #[must_use]
    pub fn new(sources: Vec<Arc<dyn TokenCredential>>) -> Self {
        Self { sources }
    }
}

#[async_trait]
impl TokenCredential for ChainedTokenCredential {
    async fn get_token(&self, scope: &str) -> AppResult<AccessToken> {
        let mut failures = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            match source.get_token(scope).await {
                Ok(token) => return Ok(token),
                Err(error) => {
                    debug!(error = %error, "credential source unavailable");
                    failures.push(error.to_string());
                }
            }
        }

        warn!(attempts = failures.len(), "no credential source produced a token");
        Err(AppError::Unauthorized(format!(
            "no credential source produced a token: {}",
            failures.join("; ")
        )))
    }
}

/// Caches tokens per scope until shortly before they expire.
pub struct CachedTokenCredential {
    inner: Arc<dyn TokenCredential>,
    refresh_margin: Duration,
    tokens: RwLock<HashMap<String, AccessToken>>,
}

impl CachedTokenCredential {
    /// Wraps `inner` with a five minute refresh margin.
    #[must_use]
    pub fn new(inner: Arc<dyn TokenCredential>) -> Self {
        Self {
            inner,
            refresh_margin: Duration::minutes(5),
            tokens: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl TokenCredential for CachedTokenCredential {
    async fn get_token(&self, scope: &str) -> AppResult<AccessToken> {
        let fresh_until = Utc::now() + self.refresh_margin;
        if let Some(token) = self.tokens.read().await.get(scope)
            && token.expires_at > fresh_until
        {
            return Ok(token.clone());
        }

        let token = self.inner.get_token(scope).await?;
        self.tokens
            .write()
            .await
            .insert(scope.to_owned(), token.clone());
        Ok(token)
    }
}
