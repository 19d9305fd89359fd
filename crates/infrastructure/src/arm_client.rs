//! Thin Azure Resource Manager REST client.
//!
//! Handles bearer auth, retry on throttling and server errors, `nextLink`
//! paging, and long-running operation polling.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Method, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;
use vmwarden_application::OperationHandle;
use vmwarden_core::{AppError, AppResult};
use vmwarden_domain::OperationStatus;

use crate::azure_credential::TokenCredential;

/// Public Azure cloud management endpoint.
pub const DEFAULT_ARM_ENDPOINT: &str = "https://management.azure.com";

const AZURE_ASYNC_OPERATION: &str = "azure-asyncoperation";
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Connection settings for [`ArmClient`].
#[derive(Debug, Clone)]
pub struct ArmClientConfig {
    /// Management endpoint base URL.
    pub endpoint: Url,
    /// Subscription every request is scoped to.
    pub subscription_id: String,
    /// Retries after the first attempt for throttled or failed requests.
    pub max_retries: u32,
    /// First retry delay; doubles per attempt.
    pub initial_backoff: Duration,
    /// Poll delay when the provider sends no `Retry-After`.
    pub poll_interval: Duration,
}

impl ArmClientConfig {
    /// Creates a config against `endpoint` with default retry and poll settings.
    pub fn new(endpoint: &str, subscription_id: impl Into<String>) -> AppResult<Self> {
        let endpoint = Url::parse(endpoint).map_err(|error| {
            AppError::Validation(format!("invalid ARM endpoint '{endpoint}': {error}"))
        })?;
        if endpoint.cannot_be_a_base() {
            return Err(AppError::Validation(format!(
                "ARM endpoint '{endpoint}' cannot be used as a base URL"
            )));
        }

        let subscription_id = subscription_id.into();
        if subscription_id.trim().is_empty() {
            return Err(AppError::Validation(
                "subscription id must not be empty".to_owned(),
            ));
        }

        Ok(Self {
            endpoint,
            subscription_id,
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            poll_interval: Duration::from_secs(2),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArmPage<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(default)]
    next_link: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ArmErrorEnvelope {
    #[serde(default)]
    error: Option<ArmErrorBody>,
}

#[derive(Debug, Default, Deserialize)]
struct ArmErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Shared ARM REST client.
#[derive(Clone)]
pub struct ArmClient {
    http_client: reqwest::Client,
    credential: Arc<dyn TokenCredential>,
    config: Arc<ArmClientConfig>,
    scope: String,
}

impl ArmClient {
    /// Creates a client.
    #[must_use]
    pub fn new(
        http_client: reqwest::Client,
        credential: Arc<dyn TokenCredential>,
        config: ArmClientConfig,
    ) -> Self {
        let scope = format!(
            "{}/.default",
            config.endpoint.as_str().trim_end_matches('/')
        );
        Self {
            http_client,
            credential,
            config: Arc::new(config),
            scope,
        }
    }

    /// Returns the subscription id requests are scoped to.
    #[must_use]
    pub fn subscription_id(&self) -> &str {
        self.config.subscription_id.as_str()
    }

    /// Builds a subscription-scoped resource URL from unencoded path segments.
    pub fn subscription_url(&self, segments: &[&str], api_version: &str) -> AppResult<Url> {
        let mut url = self.config.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| AppError::Internal("ARM endpoint cannot be a base URL".to_owned()))?
            .pop_if_empty()
            .extend(["subscriptions", self.config.subscription_id.as_str()])
            .extend(segments);
        url.query_pairs_mut().append_pair("api-version", api_version);
        Ok(url)
    }

    /// Fetches and deserializes one resource.
    pub async fn get_json<T: DeserializeOwned>(&self, url: Url) -> AppResult<T> {
        let response = self.send(Method::GET, url, None).await?;
        read_json(response).await
    }

    /// Fetches one resource, mapping 404 to `None`.
    pub async fn get_optional<T: DeserializeOwned>(&self, url: Url) -> AppResult<Option<T>> {
        match self.get_json(url).await {
            Ok(value) => Ok(Some(value)),
            Err(AppError::NotFound(_)) => Ok(None),
            Err(error) => Err(error),
        }
    }

    /// Fetches every page of a collection.
    pub async fn list_all<T: DeserializeOwned>(&self, url: Url) -> AppResult<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(url);
        while let Some(page_url) = next.take() {
            let page: ArmPage<T> = self.get_json(page_url).await?;
            items.extend(page.value);
            next = page
                .next_link
                .filter(|link| !link.is_empty())
                .map(|link| self.follow_link(&link))
                .transpose()?;
        }

        Ok(items)
    }

    /// Sends a request whose response body is not needed.
    pub async fn execute(&self, method: Method, url: Url, body: Option<&Value>) -> AppResult<()> {
        self.send(method, url, body).await.map(|_| ())
    }

    /// Sends a request and deserializes its response body.
    pub async fn execute_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> AppResult<T> {
        let response = self.send(method, url, body).await?;
        read_json(response).await
    }

    /// Submits a long-running operation and returns a poll handle.
    pub async fn begin(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> AppResult<OperationHandle> {
        let resource_url = url.clone();
        let resource_pollable = method == Method::PUT || method == Method::PATCH;
        let response = self.send(method, url, body).await?;

        let http_status = response.status();
        let poll_header = operation_poll_url(response.headers());
        let payload = response.text().await.unwrap_or_default();
        let body = serde_json::from_str::<Value>(&payload).ok();

        let status = operation_status(http_status, body.as_ref());
        let poll_url = match poll_header {
            Some(link) => Some(self.follow_link(&link)?.to_string()),
            None if resource_pollable => Some(resource_url.to_string()),
            None => None,
        };

        Ok(OperationHandle { status, poll_url })
    }

    /// Polls a handle until the operation is terminal.
    pub async fn wait(&self, handle: &OperationHandle) -> AppResult<()> {
        match handle.status {
            OperationStatus::Succeeded => return Ok(()),
            OperationStatus::Failed => {
                return Err(AppError::Provider(
                    "provider reported the operation as failed".to_owned(),
                ));
            }
            OperationStatus::InProgress => {}
        }

        let poll_url = handle.poll_url.as_deref().ok_or_else(|| {
            AppError::Provider("operation is still running and has no poll location".to_owned())
        })?;
        let poll_url = self.follow_link(poll_url)?;

        loop {
            let response = self.send(Method::GET, poll_url.clone(), None).await?;
            let delay = retry_after(response.headers()).unwrap_or(self.config.poll_interval);
            let http_status = response.status();
            let payload = response.text().await.unwrap_or_default();
            let body = serde_json::from_str::<Value>(&payload).ok();

            match operation_status(http_status, body.as_ref()) {
                OperationStatus::Succeeded => return Ok(()),
                OperationStatus::Failed => {
                    return Err(AppError::Provider(format!(
                        "operation failed: {}",
                        operation_error(body.as_ref())
                    )));
                }
                OperationStatus::InProgress => {
                    debug!(poll_url = %poll_url, delay_ms = delay.as_millis(), "operation still running");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn follow_link(&self, link: &str) -> AppResult<Url> {
        let url = self
            .config
            .endpoint
            .join(link)
            .map_err(|error| AppError::Provider(format!("invalid link '{link}': {error}")))?;

        if url.host_str() != self.config.endpoint.host_str() {
            return Err(AppError::Provider(format!(
                "refusing to follow link to foreign host '{}'",
                url.host_str().unwrap_or_default()
            )));
        }

        Ok(url)
    }

    async fn send(&self, method: Method, url: Url, body: Option<&Value>) -> AppResult<Response> {
        let mut attempt = 0_u32;
        loop {
            let token = self.credential.get_token(&self.scope).await?;
            let mut builder = self
                .http_client
                .request(method.clone(), url.clone())
                .bearer_auth(token.token);
            if let Some(body) = body {
                builder = builder.json(body);
            }

            let retries_left = attempt < self.config.max_retries;
            match builder.send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) if retries_left && is_transient(response.status()) => {
                    let delay = retry_after(response.headers())
                        .unwrap_or_else(|| backoff(self.config.initial_backoff, attempt));
                    warn!(
                        method = %method,
                        url = %url,
                        status = %response.status(),
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis(),
                        "transient ARM response, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Ok(response) => return Err(error_from_response(response).await),
                Err(error) if retries_left => {
                    let delay = backoff(self.config.initial_backoff, attempt);
                    warn!(
                        method = %method,
                        url = %url,
                        error = %error,
                        attempt = attempt + 1,
                        "ARM transport error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => {
                    return Err(AppError::Provider(format!(
                        "ARM request {method} {url} failed: {error}"
                    )));
                }
            }

            attempt += 1;
        }
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> AppResult<T> {
    response
        .json()
        .await
        .map_err(|error| AppError::Provider(format!("invalid ARM response body: {error}")))
}

async fn error_from_response(response: Response) -> AppError {
    let status = response.status();
    let payload = response.text().await.unwrap_or_default();
    let envelope: ArmErrorEnvelope = serde_json::from_str(&payload).unwrap_or_default();

    let detail = match envelope.error {
        Some(ArmErrorBody {
            code: Some(code),
            message: Some(message),
        }) => format!("{code}: {message}"),
        Some(ArmErrorBody {
            message: Some(message),
            ..
        }) => message,
        _ if payload.trim().is_empty() => format!("HTTP {status}"),
        _ => payload,
    };

    map_status(status, detail)
}

fn map_status(status: StatusCode, detail: String) -> AppError {
    match status {
        StatusCode::BAD_REQUEST => AppError::Validation(detail),
        StatusCode::UNAUTHORIZED => AppError::Unauthorized(detail),
        StatusCode::FORBIDDEN => AppError::Forbidden(detail),
        StatusCode::NOT_FOUND => AppError::NotFound(detail),
        StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => AppError::Conflict(detail),
        StatusCode::TOO_MANY_REQUESTS => AppError::RateLimited(detail),
        _ => AppError::Provider(format!("ARM responded {status}: {detail}")),
    }
}

fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn backoff(initial: Duration, attempt: u32) -> Duration {
    initial
        .saturating_mul(2_u32.saturating_pow(attempt))
        .min(MAX_BACKOFF)
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn operation_poll_url(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AZURE_ASYNC_OPERATION)
        .or_else(|| headers.get(reqwest::header::LOCATION))
        .and_then(|value| value.to_str().ok())
        .map(ToOwned::to_owned)
}

/// Derives an operation status from an initial or poll response.
fn operation_status(http_status: StatusCode, body: Option<&Value>) -> OperationStatus {
    if http_status == StatusCode::ACCEPTED {
        return OperationStatus::InProgress;
    }

    let reported = body.and_then(|body| {
        body.get("status")
            .and_then(Value::as_str)
            .or_else(|| {
                body.pointer("/properties/provisioningState")
                    .and_then(Value::as_str)
            })
    });

    reported.map_or(OperationStatus::Succeeded, OperationStatus::from_provider)
}

fn operation_error(body: Option<&Value>) -> String {
    body.and_then(|body| body.pointer("/error/message"))
        .and_then(Value::as_str)
        .map_or_else(|| "no error details reported".to_owned(), ToOwned::to_owned)
}
