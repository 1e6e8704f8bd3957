// src/feed/node.rs
//! Live tree node shared between the host feed and the pipeline.
//!
//! A `Node` is a cheap handle (`Arc`) to one element of the host tree. Identity is the
//! allocation: two handles compare equal only if they point at the same element, never
//! because their content matches.

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        Self(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

struct NodeData {
    id: NodeId,
    tag: String,
    attrs: BTreeMap<String, String>,
    text: String,
    children: Mutex<Vec<Node>>,
    parent: Mutex<Weak<NodeData>>,
    flags: Mutex<HashSet<String>>,
}

#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeData>,
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Node {}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.inner.id)
            .field("tag", &self.inner.tag)
            .field("attrs", &self.inner.attrs)
            .finish()
    }
}

/// Builder for detached subtrees; attach them to a feed with `Feed::append`.
#[derive(Debug, Default)]
pub struct NodeBuilder {
    tag: String,
    attrs: BTreeMap<String, String>,
    text: String,
    children: Vec<Node>,
}

impl NodeBuilder {
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn build(self) -> Node {
        let node = Node {
            inner: Arc::new(NodeData {
                id: NodeId::next(),
                tag: self.tag,
                attrs: self.attrs,
                text: self.text,
                children: Mutex::new(Vec::new()),
                parent: Mutex::new(Weak::new()),
                flags: Mutex::new(HashSet::new()),
            }),
        };
        for child in self.children {
            node.append_child(child);
        }
        node
    }
}

impl From<NodeBuilder> for Node {
    fn from(b: NodeBuilder) -> Self {
        b.build()
    }
}

impl Node {
    pub fn element(tag: impl Into<String>) -> NodeBuilder {
        NodeBuilder {
            tag: tag.into(),
            ..NodeBuilder::default()
        }
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    pub fn tag(&self) -> &str {
        &self.inner.tag
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.inner.attrs.get(name).map(String::as_str)
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.inner.attrs.contains_key(name)
    }

    /// Text owned directly by this node (not its descendants).
    pub fn own_text(&self) -> &str {
        &self.inner.text
    }

    /// Concatenated text of this node and all descendants, in document order.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        out.push_str(self.own_text());
        for child in self.children() {
            child.collect_text(out);
        }
    }

    /// Snapshot of the current children.
    pub fn children(&self) -> Vec<Node> {
        self.inner.children.lock().clone()
    }

    pub fn parent(&self) -> Option<Node> {
        self.inner
            .parent
            .lock()
            .upgrade()
            .map(|inner| Node { inner })
    }

    /// Topmost ancestor; `self` when detached.
    pub fn top(&self) -> Node {
        let mut cur = self.clone();
        while let Some(p) = cur.parent() {
            cur = p;
        }
        cur
    }

    /// All descendants in pre-order, excluding `self`.
    pub fn descendants(&self) -> Vec<Node> {
        let mut out = Vec::new();
        let mut stack: Vec<Node> = self.children().into_iter().rev().collect();
        while let Some(n) = stack.pop() {
            stack.extend(n.children().into_iter().rev());
            out.push(n);
        }
        out
    }

    pub fn find_first(&self, pred: impl Fn(&Node) -> bool) -> Option<Node> {
        self.descendants().into_iter().find(|n| pred(n))
    }

    pub fn find_all(&self, pred: impl Fn(&Node) -> bool) -> Vec<Node> {
        self.descendants().into_iter().filter(|n| pred(n)).collect()
    }

    /// True if `other` is `self` or lies anywhere below it.
    pub fn contains(&self, other: &Node) -> bool {
        let mut cur = Some(other.clone());
        while let Some(n) = cur {
            if n == *self {
                return true;
            }
            cur = n.parent();
        }
        false
    }

    /// Sets `flag` on this node. Returns `true` only for the call that set it.
    pub fn set_flag(&self, flag: &str) -> bool {
        self.inner.flags.lock().insert(flag.to_string())
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.inner.flags.lock().contains(flag)
    }

    /// Appends `child`, detaching it from any previous parent first.
    pub fn append_child(&self, child: Node) {
        child.detach();
        *child.inner.parent.lock() = Arc::downgrade(&self.inner);
        self.inner.children.lock().push(child);
    }

    /// Appends `child` unless an existing child matches `exists`; check and insert happen
    /// under one lock. Returns whether the child was inserted.
    pub fn append_child_unless(&self, child: Node, exists: impl Fn(&Node) -> bool) -> bool {
        let mut children = self.inner.children.lock();
        if children.iter().any(|c| exists(c)) {
            return false;
        }
        *child.inner.parent.lock() = Arc::downgrade(&self.inner);
        children.push(child);
        true
    }

    /// Removes every child matching `pred` and then appends `replacement` (if any), all
    /// under one lock. Returns the number of children removed.
    pub fn replace_children_where(
        &self,
        pred: impl Fn(&Node) -> bool,
        replacement: Option<Node>,
    ) -> usize {
        let mut children = self.inner.children.lock();
        let before = children.len();
        children.retain(|c| {
            let hit = pred(c);
            if hit {
                *c.inner.parent.lock() = Weak::new();
            }
            !hit
        });
        let removed = before - children.len();
        if let Some(r) = replacement {
            *r.inner.parent.lock() = Arc::downgrade(&self.inner);
            children.push(r);
        }
        removed
    }

    /// Detaches this node from its parent. Returns the former parent.
    pub fn detach(&self) -> Option<Node> {
        let parent = self.parent()?;
        parent.inner.children.lock().retain(|c| c != self);
        *self.inner.parent.lock() = Weak::new();
        Some(parent)
    }
}
