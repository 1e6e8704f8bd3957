// src/analyze/mock.rs
//! Deterministic classifier for local runs and tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use super::label::Label;
use super::report::AnalysisReport;
use super::response::{AnalysisResponse, LabelScores};
use super::{AnalysisError, Classifier};

/// Keyword rules (case-insensitive substring), first match wins. Texts matching a
/// failure rule return a transport error. Calls can be held behind a gate so tests can
/// observe in-flight state.
pub struct MockClassifier {
    rules: Vec<(String, Label)>,
    failures: Vec<String>,
    fallback: Label,
    delay: Option<Duration>,
    gate: watch::Sender<bool>,
    calls: AtomicUsize,
    completed: AtomicUsize,
}

impl MockClassifier {
    pub fn new(fallback: Label) -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            rules: Vec::new(),
            failures: Vec::new(),
            fallback,
            delay: None,
            gate,
            calls: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        }
    }

    /// Rules used by `MISINFO_TEST_MODE=mock`.
    pub fn keyword_demo() -> Self {
        Self::new(Label::Opinion)
            .with_rule("vaccines cause autism", Label::Misinformation)
            .with_rule("flat", Label::Misinformation)
            .with_rule("boils at", Label::Factual)
            .with_rule("according to", Label::Factual)
            .with_delay(Duration::from_millis(50))
    }

    pub fn with_rule(mut self, needle: &str, label: Label) -> Self {
        self.rules.push((needle.to_ascii_lowercase(), label));
        self
    }

    pub fn with_failure(mut self, needle: &str) -> Self {
        self.failures.push(needle.to_ascii_lowercase());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Starts closed: every call waits until `open()`.
    pub fn gated(self) -> Self {
        self.gate.send_replace(false);
        self
    }

    pub fn open(&self) {
        self.gate.send_replace(true);
    }

    /// Calls started (including ones still waiting on the gate).
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    fn decide(&self, text: &str) -> Result<Label, AnalysisError> {
        let lower = text.to_ascii_lowercase();
        if self.failures.iter().any(|f| lower.contains(f.as_str())) {
            return Err(AnalysisError::Transport("mock failure".into()));
        }
        Ok(self
            .rules
            .iter()
            .find(|(needle, _)| lower.contains(needle.as_str()))
            .map(|(_, l)| *l)
            .unwrap_or(self.fallback))
    }
}

#[async_trait]
impl Classifier for MockClassifier {
    async fn analyze(&self, text: &str) -> Result<AnalysisReport, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut gate = self.gate.subscribe();
        // Sender lives in self, so the channel cannot close while we wait.
        let _ = gate.wait_for(|open| *open).await;
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        let outcome = self.decide(text);
        self.completed.fetch_add(1, Ordering::SeqCst);

        let label = outcome?;
        Ok(AnalysisReport::from_response(AnalysisResponse {
            summary: Some(label.as_str().to_string()),
            classification: Some(LabelScores {
                labels: Some(vec![label.as_str().to_string()]),
                scores: Some(vec![1.0]),
            }),
            ..AnalysisResponse::default()
        }))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn rules_failures_and_fallback() {
        let m = MockClassifier::new(Label::Unknown)
            .with_rule("Boils At", Label::Factual)
            .with_failure("timeout");
        assert_eq!(m.classify("Water boils at 100C").await, Label::Factual);
        assert_eq!(m.classify("trigger TIMEOUT please").await, Label::Failed);
        assert_eq!(m.classify("something else").await, Label::Unknown);
        assert_eq!(m.calls(), 3);
    }

    #[tokio::test]
    async fn gate_holds_calls_until_opened() {
        let m = Arc::new(MockClassifier::new(Label::Opinion).gated());
        let m2 = m.clone();
        let task = tokio::spawn(async move { m2.classify("x").await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(m.calls(), 1);
        assert_eq!(m.completed(), 0);
        m.open();
        assert_eq!(task.await.expect("join"), Label::Opinion);
        assert_eq!(m.completed(), 1);
    }
}
