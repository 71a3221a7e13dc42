//! Snapshot client for the WAF's HTTP resources.
//!
//! Every call shares one contract: a non-2xx response becomes
//! [`Error::Http`] carrying the status, reason phrase and raw body; a 2xx
//! body is decoded as JSON.

use crate::{
    config::SyncConfig,
    error::{Error, Result},
    types::{BlockedIp, Event, Health, LogQuery, Readiness, Rule, Stats, UnblockResponse},
};
use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use uuid::Uuid;

/// Point-in-time resources and administrative mutations exposed by the WAF
#[async_trait]
pub trait WafApi: Send + Sync {
    /// Page of event history, newest first
    async fn get_logs(&self, query: LogQuery) -> Result<Vec<Event>>;

    /// Aggregate statistics
    async fn get_stats(&self) -> Result<Stats>;

    /// All configured rules
    async fn get_rules(&self) -> Result<Vec<Rule>>;

    /// Flip a rule's enabled flag, returning the server's copy
    async fn toggle_rule(&self, id: Uuid) -> Result<Rule>;

    /// Current blocklist
    async fn get_blocked_ips(&self) -> Result<Vec<BlockedIp>>;

    /// Remove an address from the blocklist
    async fn unblock_ip(&self, ip: &str) -> Result<UnblockResponse>;
}

/// HTTP implementation of [`WafApi`]
#[derive(Debug, Clone)]
pub struct SnapshotClient {
    client: Client,
    base_url: String,
}

impl SnapshotClient {
    /// Create a new client against `base_url`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    /// Create a client sharing an existing connection pool
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Create a client from configuration
    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;
        Ok(Self::with_client(client, config.api_base_url()?))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, method: Method, path: &str) -> Result<Response> {
        let url = self.url(path);
        debug!(%method, %url, "sending request");
        Ok(self.client.request(method, &url).send().await?)
    }

    async fn request<T: DeserializeOwned>(&self, method: Method, path: &str) -> Result<T> {
        let response = self.send(method, path).await?;
        parse_response(response).await
    }

    /// Liveness check
    pub async fn health(&self) -> Result<Health> {
        self.request(Method::GET, "/health").await
    }

    /// Readiness check.
    ///
    /// A 503 still carries a readiness report, so it is returned as data.
    pub async fn ready(&self) -> Result<Readiness> {
        let response = self.send(Method::GET, "/ready").await?;
        if response.status() == StatusCode::SERVICE_UNAVAILABLE {
            let bytes = response.bytes().await?;
            return Ok(serde_json::from_slice(&bytes)?);
        }
        parse_response(response).await
    }
}

/// Apply the shared response contract
async fn parse_response<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), "request failed");
        return Err(Error::Http {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            body,
        });
    }
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[async_trait]
impl WafApi for SnapshotClient {
    async fn get_logs(&self, query: LogQuery) -> Result<Vec<Event>> {
        let path = format!(
            "/api/logs?limit={}&offset={}",
            query.effective_limit(),
            query.offset
        );
        self.request(Method::GET, &path).await
    }

    async fn get_stats(&self) -> Result<Stats> {
        self.request(Method::GET, "/api/stats").await
    }

    async fn get_rules(&self) -> Result<Vec<Rule>> {
        self.request(Method::GET, "/api/rules").await
    }

    async fn toggle_rule(&self, id: Uuid) -> Result<Rule> {
        let path = format!("/api/rules/{id}/toggle");
        self.request(Method::PATCH, &path).await
    }

    async fn get_blocked_ips(&self) -> Result<Vec<BlockedIp>> {
        self.request(Method::GET, "/api/blocked-ips").await
    }

    async fn unblock_ip(&self, ip: &str) -> Result<UnblockResponse> {
        let path = format!("/api/blocked-ips/{}", urlencoding::encode(ip));
        self.request(Method::DELETE, &path).await
    }
}
