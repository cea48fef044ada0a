//! Planner service HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};
use vedit_models::{ContentAnalysis, EditPlan};

use crate::error::{PlannerError, PlannerResult};
use crate::types::{AnalyzeRequest, HealthResponse, PlanRequest};
use crate::{ContentAnalyzer, EditPlanner};

/// Configuration for the planner client.
#[derive(Debug, Clone)]
pub struct PlannerClientConfig {
    /// Base URL of the planner service
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// Max retries
    pub max_retries: u32,
    /// First retry delay, doubled on every attempt
    pub retry_base_delay: Duration,
}

impl Default for PlannerClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            timeout: Duration::from_secs(300),
            max_retries: 2,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

impl PlannerClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("PLANNER_SERVICE_URL").unwrap_or(defaults.base_url),
            timeout: std::env::var("PLANNER_SERVICE_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_retries: std::env::var("PLANNER_SERVICE_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            retry_base_delay: defaults.retry_base_delay,
        }
    }
}

/// Client for the analysis/planning service.
pub struct PlannerClient {
    http: Client,
    config: PlannerClientConfig,
}

impl PlannerClient {
    /// Create a new planner client.
    pub fn new(config: PlannerClientConfig) -> PlannerResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(PlannerError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> PlannerResult<Self> {
        Self::new(PlannerClientConfig::from_env())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Check if the planner service is healthy.
    pub async fn health_check(&self) -> PlannerResult<bool> {
        let url = self.url("health");

        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                let health: HealthResponse = response.json().await?;
                Ok(health.status == "healthy" || health.status == "ok")
            }
            Ok(response) => {
                warn!("Planner service health check failed: {}", response.status());
                Ok(false)
            }
            Err(e) => {
                warn!("Planner service health check error: {}", e);
                Ok(false)
            }
        }
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> PlannerResult<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        debug!("Sending planner request to {}", url);

        let response = self
            .with_retry(|| async {
                let response = self
                    .http
                    .post(&url)
                    .json(body)
                    .send()
                    .await
                    .map_err(|e| self.map_send_error(e))?;
                check_status(response).await
            })
            .await?;

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| PlannerError::InvalidResponse(format!("{} returned malformed JSON: {}", path, e)))
    }

    fn map_send_error(&self, e: reqwest::Error) -> PlannerError {
        if e.is_timeout() {
            PlannerError::Timeout(self.config.timeout.as_secs())
        } else {
            PlannerError::Network(e)
        }
    }

    /// Execute with retry logic.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> PlannerResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = PlannerResult<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = self.config.retry_base_delay * 2u32.pow(attempt);
                    warn!(
                        "Planner request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// 5xx and 429 are retried, other failures are final.
async fn check_status(response: Response) -> PlannerResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = format!("Planner service returned {}: {}", status, body);
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Err(PlannerError::ServiceUnavailable(message))
    } else {
        Err(PlannerError::RequestFailed(message))
    }
}

#[async_trait]
impl ContentAnalyzer for PlannerClient {
    async fn analyze(&self, request: &AnalyzeRequest) -> PlannerResult<ContentAnalysis> {
        self.post_json("analyze", request).await
    }
}

#[async_trait]
impl EditPlanner for PlannerClient {
    async fn plan(&self, request: &PlanRequest) -> PlannerResult<EditPlan> {
        self.post_json("plan", request).await
    }
}
