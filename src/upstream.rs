//! HTTP clients for the two services this console fronts: the control API
//! (nodes, users, pre-auth keys) and the optional Prometheus metrics API.
//! Stateless request executors; aggregation and failure policy live in the
//! caller.

use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use tokio::time::Duration;

/// An unresponsive control server must surface as a failed request, not a
/// hung page.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("control API unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),
    #[error("control API rejected the configured credential")]
    Unauthorized,
    #[error("resource not found upstream")]
    NotFound,
    #[error("control API returned status {0}")]
    Fault(u16),
    #[error("malformed response from control API: {0}")]
    Decode(#[source] reqwest::Error),
}

/// Issues bearer-authenticated requests against the control API. Owns base
/// URL composition: callers pass logical resource paths such as `"node"` or
/// `"user/3/preauthkey"`, never raw URLs. No retries, no caching.
pub struct UpstreamClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl UpstreamClient {
    pub fn new(base_url: &str, api_key: &str) -> anyhow::Result<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn url(&self, resource: &str) -> String {
        format!("{}/api/v1/{}", self.base_url, resource)
    }

    async fn send(
        &self,
        method: Method,
        resource: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response, UpstreamError> {
        let mut req = self
            .http
            .request(method, self.url(resource))
            .bearer_auth(&self.api_key);
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await.map_err(UpstreamError::Unreachable)?;

        match resp.status() {
            s if s.is_success() => Ok(resp),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(UpstreamError::Unauthorized),
            StatusCode::NOT_FOUND => Err(UpstreamError::NotFound),
            s => Err(UpstreamError::Fault(s.as_u16())),
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, resource: &str) -> Result<T, UpstreamError> {
        self.send(Method::GET, resource, None)
            .await?
            .json()
            .await
            .map_err(UpstreamError::Decode)
    }

    pub async fn post_json(
        &self,
        resource: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, UpstreamError> {
        self.send(Method::POST, resource, Some(body))
            .await?
            .json()
            .await
            .map_err(UpstreamError::Decode)
    }

    pub async fn put_json(
        &self,
        resource: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, UpstreamError> {
        self.send(Method::PUT, resource, Some(body))
            .await?
            .json()
            .await
            .map_err(UpstreamError::Decode)
    }

    pub async fn delete(&self, resource: &str) -> Result<serde_json::Value, UpstreamError> {
        let resp = self.send(Method::DELETE, resource, None).await?;
        // Some delete endpoints answer with an empty body.
        Ok(resp.json().await.unwrap_or(serde_json::Value::Null))
    }
}

/// Read-only client for the Prometheus query endpoint. An unconfigured URL
/// is soft-absent, not an error: the dashboard runs fine without metrics.
pub struct MetricsClient {
    http: Client,
    base_url: Option<String>,
}

impl MetricsClient {
    pub fn new(base_url: Option<&str>) -> anyhow::Result<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.map(|u| u.trim_end_matches('/').to_string()),
        })
    }

    pub async fn query(&self, expr: &str) -> Result<Option<serde_json::Value>, UpstreamError> {
        let Some(base) = &self.base_url else {
            return Ok(None);
        };

        let resp = self
            .http
            .get(format!("{base}/api/v1/query"))
            .query(&[("query", expr)])
            .send()
            .await
            .map_err(UpstreamError::Unreachable)?;

        if !resp.status().is_success() {
            return Err(UpstreamError::Fault(resp.status().as_u16()));
        }
        resp.json().await.map(Some).map_err(UpstreamError::Decode)
    }
}
