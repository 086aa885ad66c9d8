//! API client for communicating with the Transaction Monitor

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use monitor_lib::{
    baseline::BaselineSnapshot, reporting::AlertSummaryRow, AlertRecord, Severity,
    TransactionStatus, WindowMetric,
};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

/// API client for the Transaction Monitor
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::decode(response).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            anyhow::bail!("API error ({}): {}", status, message);
        }

        response.json().await.context("Failed to parse response")
    }

    pub async fn send_transaction(&self, request: &TransactionRequest) -> Result<TransactionVerdict> {
        self.post("api/transaction", request).await
    }

    pub async fn window_metrics(&self, window: Option<u32>) -> Result<WindowMetrics> {
        let path = match window {
            Some(window) => format!("api/metrics?window={}", window),
            None => "api/metrics".to_string(),
        };
        self.get(&path).await
    }

    pub async fn recent_alerts(&self, limit: usize) -> Result<AlertList> {
        self.get(&format!("api/alerts?limit={}", limit)).await
    }

    pub async fn alert_summary(&self, minutes: u32) -> Result<AlertSummary> {
        self.get(&format!("api/alerts/summary?minutes={}", minutes))
            .await
    }

    pub async fn baseline(&self) -> Result<BaselineView> {
        self.get("api/baseline").await
    }
}

// API request and response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub timestamp: String,
    pub status: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionVerdict {
    pub timestamp: DateTime<Utc>,
    pub anomaly_score: u32,
    pub severity: Severity,
    pub alerts: Vec<AlertRecord>,
    pub should_alert: bool,
    pub recommendation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowMetrics {
    pub window_minutes: u32,
    pub as_of: DateTime<Utc>,
    pub metrics: BTreeMap<TransactionStatus, WindowMetric>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertList {
    pub alerts: Vec<AlertRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertSummary {
    pub minutes: u32,
    pub summary: Vec<AlertSummaryRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineView {
    pub loaded: bool,
    pub baseline: BaselineSnapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
