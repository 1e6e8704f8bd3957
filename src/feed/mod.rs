// src/feed/mod.rs
//! Host feed model: a live tree plus a structural change stream.
//!
//! The pipeline never creates or destroys items; it only sees what a `ChangeSource`
//! reports. `Feed` is the in-process host used by the CLI and the tests; any other host
//! that can emit `ChangeBatch`es for a container can implement `ChangeSource`.

pub mod node;
pub mod shape;

pub use node::{Node, NodeBuilder, NodeId};
pub use shape::{FeedItem, ItemShape};

use parking_lot::Mutex;
use tokio::sync::mpsc;

/// One batch of structural changes under an observed container.
#[derive(Debug, Clone, Default)]
pub struct ChangeBatch {
    pub added: Vec<Node>,
    pub removed: Vec<Node>,
}

impl ChangeBatch {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

pub type ChangeStream = mpsc::UnboundedReceiver<ChangeBatch>;

/// Anything that can stream structural changes for a container subtree.
pub trait ChangeSource: Send + Sync {
    /// Starts delivering batches for changes below `container` from now on.
    fn subscribe(&self, container: &Node) -> ChangeStream;
}

#[derive(Debug, Clone)]
pub enum Mutation {
    Append { parent: Node, child: Node },
    Remove(Node),
}

struct Subscriber {
    container: Node,
    tx: mpsc::UnboundedSender<ChangeBatch>,
}

/// In-process live document. All structural changes go through `apply` so that
/// subscribers see them; indicator writes made directly on nodes are not reported.
pub struct Feed {
    root: Node,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl Default for Feed {
    fn default() -> Self {
        Self::new()
    }
}

impl Feed {
    pub fn new() -> Self {
        Self {
            root: Node::element("body").build(),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn append(&self, parent: &Node, child: impl Into<Node>) -> Node {
        let child = child.into();
        self.apply(vec![Mutation::Append {
            parent: parent.clone(),
            child: child.clone(),
        }]);
        child
    }

    pub fn remove(&self, node: &Node) {
        self.apply(vec![Mutation::Remove(node.clone())]);
    }

    /// Applies mutations in order and delivers them to subscribers as one batch each.
    pub fn apply(&self, mutations: Vec<Mutation>) {
        // (target parent, node, added?)
        let mut records: Vec<(Node, Node, bool)> = Vec::with_capacity(mutations.len());
        for m in mutations {
            match m {
                Mutation::Append { parent, child } => {
                    if let Some(old) = child.parent() {
                        records.push((old, child.clone(), false));
                    }
                    parent.append_child(child.clone());
                    records.push((parent, child, true));
                }
                Mutation::Remove(node) => {
                    if let Some(old) = node.detach() {
                        records.push((old, node, false));
                    }
                }
            }
        }
        if records.is_empty() {
            return;
        }

        let mut subs = self.subscribers.lock();
        subs.retain(|s| !s.tx.is_closed());
        for sub in subs.iter() {
            let mut batch = ChangeBatch::default();
            for (target, node, added) in &records {
                if !sub.container.contains(target) {
                    continue;
                }
                if *added {
                    batch.added.push(node.clone());
                } else {
                    batch.removed.push(node.clone());
                }
            }
            if !batch.is_empty() {
                // Receiver may have gone away between retain and send.
                let _ = sub.tx.send(batch);
            }
        }
        tracing::trace!(target: "feed", records = records.len(), "mutations applied");
    }
}

impl ChangeSource for Feed {
    fn subscribe(&self, container: &Node) -> ChangeStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(Subscriber {
            container: container.clone(),
            tx,
        });
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_changes_under_container_are_delivered() {
        let feed = Feed::new();
        let timeline = feed.append(feed.root(), Node::element("section"));
        let sidebar = feed.append(feed.root(), Node::element("aside"));

        let mut rx = feed.subscribe(&timeline);
        let a = feed.append(&timeline, Node::element("article"));
        feed.append(&sidebar, Node::element("article"));

        let batch = rx.try_recv().expect("timeline batch");
        assert_eq!(batch.added, vec![a]);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn changes_before_subscribe_are_not_replayed() {
        let feed = Feed::new();
        feed.append(feed.root(), Node::element("article"));
        let mut rx = feed.subscribe(feed.root());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn move_reports_removal_then_addition_in_one_batch() {
        let feed = Feed::new();
        let a = feed.append(feed.root(), Node::element("div"));
        let b = feed.append(feed.root(), Node::element("div"));
        let item = feed.append(&a, Node::element("article"));
        let mut rx = feed.subscribe(feed.root());

        feed.apply(vec![Mutation::Append {
            parent: b.clone(),
            child: item.clone(),
        }]);
        let batch = rx.try_recv().expect("batch");
        assert_eq!(batch.removed, vec![item.clone()]);
        assert_eq!(batch.added, vec![item.clone()]);
        assert_eq!(item.parent(), Some(b));
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let feed = Feed::new();
        drop(feed.subscribe(feed.root()));
        feed.append(feed.root(), Node::element("div"));
        assert!(feed.subscribers.lock().is_empty());
    }
}
