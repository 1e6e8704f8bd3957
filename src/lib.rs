// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod analyze;
pub mod annotate;
pub mod cache;
pub mod config;
pub mod dedup;
pub mod feed;
pub mod history;
pub mod metrics;
pub mod watcher;

// ---- Re-exports for stable public API ----
pub use analyze::{AnalysisReport, Classifier, HttpAnalysisClient, Label, MockClassifier};
pub use annotate::{Annotator, Indicator};
pub use cache::{CacheStore, Fingerprint, KvStore};
pub use config::WatchConfig;
pub use feed::{ChangeBatch, ChangeSource, Feed, FeedItem, ItemShape, Node};
pub use watcher::{ItemEvent, ItemState, WatchError, Watcher};
