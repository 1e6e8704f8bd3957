// src/analyze/client.rs
//! HTTP client for the remote classification service (`POST /analyze`).

use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use serde::Serialize;

use super::report::AnalysisReport;
use super::response::AnalysisResponse;
use super::{AnalysisError, Classifier};
use crate::cache::anon_hash;
use crate::config::WatchConfig;

/// Error bodies are truncated to this many chars before they reach logs.
const MAX_ERROR_BODY: usize = 200;

#[derive(Serialize)]
struct AnalyzeRequest<'a> {
    content: &'a str,
}

pub struct HttpAnalysisClient {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpAnalysisClient {
    pub fn new(
        endpoint: impl Into<String>,
        connect_timeout: Duration,
        timeout: Duration,
    ) -> Result<Self, AnalysisError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("misinfo-watch/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(connect_timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }

    pub fn from_config(cfg: &WatchConfig) -> Result<Self, AnalysisError> {
        Self::new(
            cfg.endpoint.clone(),
            Duration::from_millis(cfg.connect_timeout_ms),
            Duration::from_millis(cfg.request_timeout_ms),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Classifier for HttpAnalysisClient {
    async fn analyze(&self, text: &str) -> Result<AnalysisReport, AnalysisError> {
        counter!("analysis_requests_total").increment(1);
        let result = self.post(text).await;
        if let Err(e) = &result {
            counter!("analysis_failures_total").increment(1);
            tracing::debug!(target: "analyze", id = %anon_hash(text), error = %e, "remote call failed");
        }
        result
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

impl HttpAnalysisClient {
    async fn post(&self, text: &str) -> Result<AnalysisReport, AnalysisError> {
        let resp = self
            .http
            .post(&self.endpoint)
            .json(&AnalyzeRequest { content: text })
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(AnalysisError::Status {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY).collect(),
            });
        }

        let parsed = AnalysisResponse::parse(&body)?;
        let report = AnalysisReport::from_response(parsed);
        tracing::debug!(
            target: "analyze",
            id = %anon_hash(text),
            label = %report.label,
            "remote classification received"
        );
        Ok(report)
    }
}
