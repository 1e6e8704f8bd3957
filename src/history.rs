//! history.rs — bounded in-memory log of recent analysis reports for detail views.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::analyze::AnalysisReport;
use crate::cache::Fingerprint;

const MAX_CAPACITY: usize = 10_000;

#[derive(Debug, Clone)]
pub struct ReportEntry {
    /// Anonymized content id (see `Fingerprint::short_id`).
    pub content_id: String,
    pub report: Arc<AnalysisReport>,
}

#[derive(Debug)]
pub struct ReportLog {
    inner: Mutex<VecDeque<ReportEntry>>,
    cap: usize,
}

impl ReportLog {
    pub fn with_capacity(cap: usize) -> Self {
        let cap = cap.clamp(1, MAX_CAPACITY);
        Self {
            inner: Mutex::new(VecDeque::with_capacity(cap)),
            cap,
        }
    }

    pub fn push(&self, fp: &Fingerprint, report: AnalysisReport) {
        let entry = ReportEntry {
            content_id: fp.short_id(),
            report: Arc::new(report),
        };
        let mut v = self.inner.lock();
        v.push_back(entry);
        while v.len() > self.cap {
            v.pop_front();
        }
    }

    /// Oldest first.
    pub fn snapshot_last_n(&self, n: usize) -> Vec<ReportEntry> {
        let v = self.inner.lock();
        let start = v.len().saturating_sub(n);
        v.iter().skip(start).cloned().collect()
    }

    pub fn latest_for(&self, fp: &Fingerprint) -> Option<Arc<AnalysisReport>> {
        let id = fp.short_id();
        let v = self.inner.lock();
        v.iter()
            .rev()
            .find(|e| e.content_id == id)
            .map(|e| e.report.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
