//! # Platform API Client
//!
//! HTTP client for the remote governance platform. Normalizes success and
//! error envelopes, applies bounded timeouts, and retries idempotent reads
//! on server or network failures with exponential backoff.
//!
//! Step invocations (`POST /{group}/{operation}`) are deliberately issued
//! exactly once at this layer: retry semantics for steps belong to the
//! workflow executor's per-step retry policy.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::config::{ApiAuthConfig, PlatformApiConfig};
use crate::error::{StewardError, StewardResult};

use super::types::{
    AckReceipt, AlertRecord, AnalyticsQuery, GroupStatus, MetricsSnapshot, PlatformHealth,
    StepInvocation,
};

/// Transport seam for the governance platform.
///
/// The production implementation is [`PlatformApiClient`]; tests substitute
/// a mock so executor and facade behavior can be driven deterministically.
#[async_trait]
pub trait PlatformTransport: Send + Sync {
    /// Fetch the full health snapshot
    async fn fetch_health(&self) -> StewardResult<PlatformHealth>;

    /// Fetch the per-group status map
    async fn fetch_group_status(&self) -> StewardResult<HashMap<String, GroupStatus>>;

    /// Fetch the alert list, optionally scoped to groups and bounded by limit
    async fn fetch_alerts(
        &self,
        groups: Option<&[String]>,
        limit: Option<u32>,
    ) -> StewardResult<Vec<AlertRecord>>;

    /// Acknowledge an alert server-side
    async fn acknowledge_alert(&self, alert_id: &str) -> StewardResult<AckReceipt>;

    /// Fetch a metrics snapshot from the analytics endpoint
    async fn fetch_analytics(&self, query: &AnalyticsQuery) -> StewardResult<MetricsSnapshot>;

    /// Invoke one workflow step operation against a governance group.
    ///
    /// Issued exactly once; the caller owns retry policy.
    async fn invoke_operation(
        &self,
        group: &str,
        operation: &str,
        invocation: &StepInvocation,
    ) -> StewardResult<Value>;
}

/// Build default headers from the configured credentials.
///
/// Priority: bearer token > API key. Shared by the request/response client
/// and the event stream transport so both channels authenticate identically.
pub(crate) fn build_auth_headers(
    auth: &ApiAuthConfig,
) -> StewardResult<reqwest::header::HeaderMap> {
    let mut headers = reqwest::header::HeaderMap::new();

    if !auth.bearer_token.is_empty() {
        headers.insert(
            reqwest::header::AUTHORIZATION,
            format!("Bearer {}", auth.bearer_token)
                .parse()
                .map_err(|e| StewardError::config_error(format!("Invalid bearer token: {e}")))?,
        );
        debug!("Configured Bearer token authentication");
    } else if !auth.api_key.is_empty() {
        let header_name = if auth.api_key_header.is_empty() {
            "X-API-Key"
        } else {
            &auth.api_key_header
        };
        headers.insert(
            reqwest::header::HeaderName::from_bytes(header_name.as_bytes())
                .map_err(|e| StewardError::config_error(format!("Invalid API key header name: {e}")))?,
            auth.api_key
                .parse()
                .map_err(|e| StewardError::config_error(format!("Invalid API key: {e}")))?,
        );
        debug!(header = %header_name, "Configured API key authentication");
    } else {
        warn!("Authentication section present but no credentials configured");
    }

    Ok(headers)
}

/// HTTP client for the governance platform API
#[derive(Clone)]
pub struct PlatformApiClient {
    client: Client,
    config: PlatformApiConfig,
    base_url: Url,
    /// Retry attempts for idempotent reads
    max_retries: u32,
}

impl std::fmt::Debug for PlatformApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformApiClient")
            .field("base_url", &self.base_url.as_str())
            .field("timeout_ms", &self.config.timeout_ms)
            .field("max_retries", &self.max_retries)
            .field("auth_enabled", &self.config.auth.is_some())
            .finish()
    }
}

impl PlatformApiClient {
    /// Create a new platform API client
    ///
    /// Validates the base URL and builds a `reqwest` client with the bounded
    /// request timeout and default authentication headers.
    pub fn new(config: PlatformApiConfig, max_retries: u32) -> StewardResult<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| StewardError::config_error(format!("Invalid base URL: {e}")))?;

        let mut client_builder = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(format!("steward-core/{}", env!("CARGO_PKG_VERSION")));

        if let Some(ref auth) = config.auth {
            let default_headers = build_auth_headers(auth)?;
            if !default_headers.is_empty() {
                client_builder = client_builder.default_headers(default_headers);
            }
        }

        let client = client_builder
            .build()
            .map_err(|e| StewardError::config_error(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            base_url,
            max_retries,
        })
    }

    /// Base URL the client talks to
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    fn join(&self, path: &str) -> StewardResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| StewardError::config_error(format!("Failed to construct URL: {e}")))
    }

    /// Issue an idempotent GET with retry on server/network failures.
    ///
    /// Client errors (4xx) fail immediately; 5xx and network errors retry up
    /// to `max_retries` with exponential backoff (1s, 2s, 4s, ...).
    async fn get_with_retry<T: DeserializeOwned>(&self, url: Url, what: &str) -> StewardResult<T> {
        let mut retries = 0;
        loop {
            let outcome = match self.client.get(url.clone()).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return resp.json::<T>().await.map_err(|e| {
                            error!(what, error = %e, "Failed to parse response body");
                            StewardError::Http(e)
                        });
                    }
                    let message = resp
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    if status.is_client_error() {
                        error!(what, status = %status, error = %message, "Client error");
                        return Err(StewardError::api_error(status.as_u16(), message));
                    }
                    StewardError::api_error(status.as_u16(), message)
                }
                Err(e) => StewardError::Http(e),
            };

            retries += 1;
            if retries > self.max_retries {
                error!(
                    what,
                    retries = self.max_retries,
                    "Exhausted retries for platform read"
                );
                return Err(outcome);
            }

            warn!(
                what,
                error = %outcome,
                retry = retries,
                max_retries = self.max_retries,
                "Retryable error on platform read"
            );
            let delay = Duration::from_secs(1 << (retries - 1));
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl PlatformTransport for PlatformApiClient {
    async fn fetch_health(&self) -> StewardResult<PlatformHealth> {
        let url = self.join("/system/health")?;
        debug!(url = %url, "Fetching platform health snapshot");
        self.get_with_retry(url, "system_health").await
    }

    async fn fetch_group_status(&self) -> StewardResult<HashMap<String, GroupStatus>> {
        let url = self.join("/system/status")?;
        debug!(url = %url, "Fetching per-group status map");
        self.get_with_retry(url, "system_status").await
    }

    async fn fetch_alerts(
        &self,
        groups: Option<&[String]>,
        limit: Option<u32>,
    ) -> StewardResult<Vec<AlertRecord>> {
        let mut url = self.join("/system/alerts")?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(groups) = groups {
                if !groups.is_empty() {
                    query.append_pair("groups", &groups.join(","));
                }
            }
            if let Some(limit) = limit {
                query.append_pair("limit", &limit.to_string());
            }
        }
        debug!(url = %url, "Fetching alert list");
        self.get_with_retry(url, "system_alerts").await
    }

    async fn acknowledge_alert(&self, alert_id: &str) -> StewardResult<AckReceipt> {
        let url = self.join(&format!("/system/alerts/{alert_id}/ack"))?;
        debug!(url = %url, alert_id, "Acknowledging alert");

        let resp = self.client.post(url).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json::<AckReceipt>().await?);
        }

        let message = resp
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        error!(alert_id, status = %status, error = %message, "Acknowledgement failed server-side");
        Err(StewardError::api_error(status.as_u16(), message))
    }

    async fn fetch_analytics(&self, query: &AnalyticsQuery) -> StewardResult<MetricsSnapshot> {
        let mut url = self.join("/performance/analytics")?;
        url.query_pairs_mut()
            .append_pair("time_range", &query.time_range)
            .append_pair("interval", &query.interval);
        debug!(url = %url, "Fetching performance analytics");
        self.get_with_retry(url, "performance_analytics").await
    }

    async fn invoke_operation(
        &self,
        group: &str,
        operation: &str,
        invocation: &StepInvocation,
    ) -> StewardResult<Value> {
        let url = self.join(&format!("/{group}/{operation}"))?;
        debug!(
            url = %url,
            group,
            operation,
            service_id = %invocation.service_id,
            "Invoking governance operation"
        );

        let resp = self.client.post(url).json(invocation).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json::<Value>().await?);
        }

        let message = resp
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        warn!(group, operation, status = %status, error = %message, "Operation invocation failed");
        Err(StewardError::api_error(status.as_u16(), message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation_with_defaults() {
        let client = PlatformApiClient::new(PlatformApiConfig::default(), 3).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080/");
    }

    #[test]
    fn test_client_rejects_malformed_base_url() {
        let config = PlatformApiConfig {
            base_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(PlatformApiClient::new(config, 3).is_err());
    }

    #[test]
    fn test_client_with_api_key_auth() {
        let config = PlatformApiConfig {
            auth: Some(crate::config::ApiAuthConfig {
                api_key: "secret".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let client = PlatformApiClient::new(config, 3).unwrap();
        assert!(format!("{client:?}").contains("auth_enabled: true"));
    }
}
