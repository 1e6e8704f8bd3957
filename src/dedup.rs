// src/dedup.rs
//! Item deduplicator: admits each item identity into the pipeline exactly once.
//!
//! The claim lives on the node itself (a flag, like a `data-*` marker), so it is dropped
//! together with the node and nothing here grows with the feed.

use crate::feed::{FeedItem, Node};
use metrics::counter;

pub const DEFAULT_CLAIM_FLAG: &str = "misinfo-analyzed";

#[derive(Debug, Clone)]
pub struct Deduplicator {
    flag: String,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_CLAIM_FLAG)
    }
}

impl Deduplicator {
    pub fn new(flag: impl Into<String>) -> Self {
        Self { flag: flag.into() }
    }

    /// `true` exactly once per item identity; later calls (reinsertion, overlapping
    /// batches, ancestor and descendant both reported) return `false`.
    pub fn claim(&self, item: &FeedItem) -> bool {
        let fresh = item.node.set_flag(&self.flag);
        if fresh {
            counter!("watch_items_claimed_total").increment(1);
        } else {
            counter!("watch_items_duplicate_total").increment(1);
        }
        fresh
    }

    /// Whether `node` was ever admitted, even if it has since left the feed.
    pub fn is_claimed(&self, node: &Node) -> bool {
        node.has_flag(&self.flag)
    }
}
