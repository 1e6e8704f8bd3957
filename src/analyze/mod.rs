// src/analyze/mod.rs
//! Analysis client: classifier abstraction, the HTTP client, a mock, and response
//! normalization into a `Label`.

pub mod client;
pub mod label;
pub mod mock;
pub mod report;
pub mod response;

pub use client::HttpAnalysisClient;
pub use label::Label;
pub use mock::MockClassifier;
pub use report::AnalysisReport;
pub use response::AnalysisResponse;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::WatchConfig;
use crate::cache::anon_hash;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum AnalysisError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<reqwest::Error> for AnalysisError {
    fn from(err: reqwest::Error) -> Self {
        AnalysisError::Transport(err.to_string())
    }
}

/// One remote classification attempt per call; no retries.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn analyze(&self, text: &str) -> Result<AnalysisReport, AnalysisError>;

    /// Name for diagnostics.
    fn name(&self) -> &'static str;

    /// Like `analyze`, but errors are logged and normalized to `Label::Failed`. The report
    /// comes back only on success.
    async fn classify_report(&self, text: &str) -> (Label, Option<AnalysisReport>) {
        match self.analyze(text).await {
            Ok(report) => (report.label, Some(report)),
            Err(e) => {
                tracing::warn!(
                    target: "analyze",
                    id = %anon_hash(text),
                    provider = self.name(),
                    error = %e,
                    "classification failed"
                );
                (Label::Failed, None)
            }
        }
    }

    async fn classify(&self, text: &str) -> Label {
        self.classify_report(text).await.0
    }
}

pub type DynClassifier = Arc<dyn Classifier>;

/// Factory: build the classifier according to config and environment.
///
/// * `MISINFO_TEST_MODE=mock` returns a deterministic keyword mock.
/// * Otherwise the HTTP client for `config.endpoint`.
pub fn build_classifier(config: &WatchConfig) -> Result<DynClassifier, AnalysisError> {
    if std::env::var("MISINFO_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        tracing::info!(target: "analyze", "using mock classifier");
        return Ok(Arc::new(MockClassifier::keyword_demo()));
    }
    let client = HttpAnalysisClient::from_config(config)?;
    tracing::info!(target: "analyze", endpoint = client.endpoint(), "using http classifier");
    Ok(Arc::new(client))
}
