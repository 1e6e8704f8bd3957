// src/watcher.rs
//! Feed observer and per-item pipeline.
//!
//! `Watcher` owns its subscription: `start` subscribes to a container's change stream and
//! spawns the observer loop, `stop` ends it. Each admitted item runs
//! claim -> cache lookup -> (hit: final badge) | (miss: pending badge -> remote call ->
//! final badge or cleared) on its own task, with a cancellation token that fires when the
//! item leaves the feed.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use metrics::counter;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::analyze::{build_classifier, AnalysisReport, DynClassifier, Label};
use crate::annotate::{Annotator, Indicator};
use crate::cache::{CacheStore, Fingerprint, JsonFileStore, Resolution};
use crate::config::WatchConfig;
use crate::dedup::Deduplicator;
use crate::feed::{ChangeBatch, ChangeSource, FeedItem, ItemShape, Node, NodeId};
use crate::history::{ReportEntry, ReportLog};
use crate::metrics::ensure_metrics_described;

const EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WatchError {
    #[error("watcher is already observing a container")]
    AlreadyStarted,

    #[error("watcher is not running")]
    NotStarted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    Unseen,
    Claimed,
    Pending,
    Labeled(Label),
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemEvent {
    Claimed(NodeId),
    Pending { node: NodeId, coalesced: bool },
    Labeled { node: NodeId, label: Label, cached: bool },
    Failed(NodeId),
    Cancelled(NodeId),
}

impl ItemEvent {
    pub fn node(&self) -> NodeId {
        match self {
            ItemEvent::Claimed(n) | ItemEvent::Failed(n) | ItemEvent::Cancelled(n) => *n,
            ItemEvent::Pending { node, .. } | ItemEvent::Labeled { node, .. } => *node,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ItemEvent::Labeled { .. } | ItemEvent::Failed(_) | ItemEvent::Cancelled(_)
        )
    }
}

struct Tracked {
    node: Node,
    state: ItemState,
    cancel: CancellationToken,
}

struct Pipeline {
    shape: ItemShape,
    dedup: Deduplicator,
    cache: CacheStore,
    classifier: DynClassifier,
    annotator: Annotator,
    limiter: Arc<Semaphore>,
    reports: Arc<ReportLog>,
    items: Mutex<HashMap<NodeId, Tracked>>,
    events: broadcast::Sender<ItemEvent>,
}

struct Observer {
    container: Node,
    /// Topmost ancestor of `container` at start.
    document: Node,
    stop: CancellationToken,
    task: JoinHandle<()>,
}

pub struct Watcher {
    pipeline: Arc<Pipeline>,
    observer: Mutex<Option<Observer>>,
}

impl Watcher {
    pub fn new(cfg: &WatchConfig, classifier: DynClassifier, cache: CacheStore) -> Self {
        ensure_metrics_described();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            pipeline: Arc::new(Pipeline {
                shape: cfg.item_shape(),
                dedup: Deduplicator::new(cfg.claim_flag.clone()),
                cache,
                classifier,
                annotator: Annotator::new(),
                limiter: Arc::new(Semaphore::new(cfg.max_concurrent_requests.max(1))),
                reports: Arc::new(ReportLog::with_capacity(cfg.report_capacity)),
                items: Mutex::new(HashMap::new()),
                events,
            }),
            observer: Mutex::new(None),
        }
    }

    /// HTTP classifier (or the mock, see `build_classifier`) over the JSON file cache.
    pub fn from_config(cfg: &WatchConfig) -> anyhow::Result<Self> {
        let classifier = build_classifier(cfg)?;
        let store = Arc::new(JsonFileStore::new(&cfg.cache_path));
        info!(target: "watcher", cache = %store.path().display(), "using file-backed label cache");
        Ok(Self::new(
            cfg,
            classifier,
            CacheStore::new(store, cfg.key_prefix.clone()),
        ))
    }

    /// Begins observing additions under `container`. Items already present are not
    /// scanned; call `scan` for those. Must be called from within a Tokio runtime.
    pub fn start(&self, source: &dyn ChangeSource, container: Node) -> Result<(), WatchError> {
        let mut slot = self.observer.lock();
        if slot.is_some() {
            return Err(WatchError::AlreadyStarted);
        }

        let mut rx = source.subscribe(&container);
        let stop = CancellationToken::new();
        let token = stop.clone();
        let pipeline = self.pipeline.clone();
        let observed = container.clone();
        let task = tokio::spawn(async move {
            info!(target: "watcher", container = %container.id(), "observing feed");
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    batch = rx.recv() => match batch {
                        Some(batch) => pipeline.on_batch(&container, batch),
                        None => {
                            debug!(target: "watcher", "change stream closed");
                            break;
                        }
                    },
                }
            }
            info!(target: "watcher", container = %container.id(), "observer stopped");
        });

        let document = observed.top();
        *slot = Some(Observer {
            container: observed,
            document,
            stop,
            task,
        });
        Ok(())
    }

    /// Ends observation. Items still inside the container run to completion; items that
    /// left it without a removal record (e.g. the container itself was detached) are
    /// cancelled and forgotten.
    pub async fn stop(&self) -> Result<(), WatchError> {
        let observer = self.observer.lock().take().ok_or(WatchError::NotStarted)?;
        observer.stop.cancel();
        if let Err(e) = observer.task.await {
            error!(target: "watcher", error = %e, "observer task ended abnormally");
        }
        let pruned = self
            .pipeline
            .prune_outside(&observer.document, &observer.container);
        debug!(target: "watcher", pruned, "observer stopped; detached items forgotten");
        Ok(())
    }

    /// Number of items the pipeline currently tracks.
    pub fn tracked(&self) -> usize {
        self.pipeline.items.lock().len()
    }

    pub fn is_running(&self) -> bool {
        self.observer.lock().is_some()
    }

    /// Initial pass over items already under `container`. Returns how many were admitted.
    pub fn scan(&self, container: &Node) -> usize {
        let items = self.pipeline.shape.extract(container);
        let mut admitted = 0;
        for item in items {
            if self.pipeline.dedup.claim(&item) {
                self.pipeline.admit(item);
                admitted += 1;
            }
        }
        debug!(target: "watcher", admitted, "initial scan done");
        admitted
    }

    /// Runs the pipeline again for an item whose last attempt failed.
    pub fn retrigger(&self, node: &Node) -> bool {
        let Some(item) = self.pipeline.shape.to_item(node) else {
            return false;
        };
        let cancel = {
            let mut items = self.pipeline.items.lock();
            match items.get_mut(&node.id()) {
                Some(t) if t.state == ItemState::Failed => {
                    t.state = ItemState::Claimed;
                    t.cancel = CancellationToken::new();
                    t.cancel.clone()
                }
                _ => return false,
            }
        };
        debug!(target: "watcher", node = %node.id(), "retriggering failed item");
        self.pipeline.emit(ItemEvent::Claimed(node.id()));
        self.pipeline.spawn_process(item, cancel);
        true
    }

    /// `None` for an item that was claimed but has since left the feed.
    pub fn state_of(&self, node: &Node) -> Option<ItemState> {
        if let Some(t) = self.pipeline.items.lock().get(&node.id()) {
            return Some(t.state);
        }
        if self.pipeline.dedup.is_claimed(node) {
            None
        } else {
            Some(ItemState::Unseen)
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ItemEvent> {
        self.pipeline.events.subscribe()
    }

    pub fn recent_reports(&self, n: usize) -> Vec<ReportEntry> {
        self.pipeline.reports.snapshot_last_n(n)
    }

    pub fn report_for(&self, text: &str) -> Option<Arc<AnalysisReport>> {
        self.pipeline.reports.latest_for(&Fingerprint::of(text.trim()))
    }

    pub fn cache(&self) -> &CacheStore {
        &self.pipeline.cache
    }

    pub fn annotator(&self) -> &Annotator {
        &self.pipeline.annotator
    }

    pub fn shape(&self) -> &ItemShape {
        &self.pipeline.shape
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        if let Some(observer) = self.observer.lock().take() {
            observer.stop.cancel();
        }
    }
}

impl Pipeline {
    fn on_batch(self: &Arc<Self>, container: &Node, batch: ChangeBatch) {
        for removed in &batch.removed {
            // Moved within the container: still part of the feed.
            if container.contains(removed) {
                continue;
            }
            self.forget_subtree(removed);
        }

        for added in &batch.added {
            if !container.contains(added) {
                continue;
            }
            for item in self.shape.extract(added) {
                if self.dedup.claim(&item) {
                    self.admit(item);
                } else if !self.items.lock().contains_key(&item.node.id()) {
                    self.resume(item);
                }
            }
        }
    }

    fn forget_subtree(&self, root: &Node) {
        let mut ids = vec![root.id()];
        ids.extend(root.descendants().iter().map(Node::id));
        let mut items = self.items.lock();
        for id in ids {
            if let Some(t) = items.remove(&id) {
                t.cancel.cancel();
            }
        }
    }

    /// A claimed item came back after it was forgotten (removed, then re-inserted by the
    /// host). Whatever its last run left on the node is stale: a pending badge would never
    /// resolve, so it is cleared and the item goes through the pipeline again.
    fn resume(self: &Arc<Self>, item: FeedItem) {
        if self.annotator.current(&item) == Some(Indicator::Pending) {
            self.annotator.clear(&item);
        }
        debug!(target: "watcher", node = %item.node.id(), "claimed item re-entered the feed");
        self.admit(item);
    }

    fn admit(self: &Arc<Self>, item: FeedItem) {
        let id = item.node.id();
        let cancel = CancellationToken::new();
        self.items.lock().insert(
            id,
            Tracked {
                node: item.node.clone(),
                state: ItemState::Claimed,
                cancel: cancel.clone(),
            },
        );
        self.emit(ItemEvent::Claimed(id));
        self.spawn_process(item, cancel);
    }

    /// Forgets items no longer under `container`, or whose `container` is no longer part
    /// of `document`.
    fn prune_outside(&self, document: &Node, container: &Node) -> usize {
        let attached = document.contains(container);
        let mut items = self.items.lock();
        let before = items.len();
        items.retain(|_, t| {
            let keep = attached && container.contains(&t.node);
            if !keep {
                t.cancel.cancel();
            }
            keep
        });
        before - items.len()
    }

    fn spawn_process(self: &Arc<Self>, item: FeedItem, cancel: CancellationToken) {
        let this = self.clone();
        tokio::spawn(async move { this.process(item, cancel).await });
    }

    async fn process(&self, item: FeedItem, cancel: CancellationToken) {
        let id = item.node.id();
        let fp = Fingerprint::of(&item.text);

        let resolution = match self.cache.resolve(&fp, self.dispatcher(&fp, &item.text)).await {
            Ok(r) => r,
            Err(e) => {
                error!(target: "watcher", id = %fp, error = %e, "cache read failed; classifying remotely");
                self.cache
                    .attach_or_dispatch(&fp, self.dispatcher(&fp, &item.text))
            }
        };

        let pending = match resolution {
            Resolution::Hit(label) => {
                debug!(target: "watcher", node = %id, id = %fp, %label, "cache hit");
                self.complete(&item, &cancel, label, true);
                return;
            }
            Resolution::InFlight(p) => p,
        };

        if cancel.is_cancelled() {
            self.cache.release(pending);
            self.cancelled(id);
            return;
        }
        self.annotator.show_pending(&item);
        self.set_state(id, ItemState::Pending);
        self.emit(ItemEvent::Pending {
            node: id,
            coalesced: pending.coalesced,
        });

        let result = pending.future.clone();
        let label = tokio::select! {
            _ = cancel.cancelled() => {
                self.cache.release(pending);
                self.cancelled(id);
                return;
            }
            label = result => label,
        };
        self.complete(&item, &cancel, label, false);
    }

    /// Remote call for one fingerprint, gated by the concurrency limiter.
    fn dispatcher(
        &self,
        fp: &Fingerprint,
        text: &str,
    ) -> impl FnOnce() -> BoxFuture<'static, Label> {
        let classifier = self.classifier.clone();
        let limiter = self.limiter.clone();
        let reports = self.reports.clone();
        let fp = fp.clone();
        let text = text.to_string();
        move || {
            async move {
                let Ok(_permit) = limiter.acquire_owned().await else {
                    warn!(target: "watcher", id = %fp, "request limiter closed");
                    return Label::Failed;
                };
                let (label, report) = classifier.classify_report(&text).await;
                if let Some(report) = report {
                    reports.push(&fp, report);
                }
                label
            }
            .boxed()
        }
    }

    fn complete(&self, item: &FeedItem, cancel: &CancellationToken, label: Label, cached: bool) {
        let id = item.node.id();
        if cancel.is_cancelled() {
            self.cancelled(id);
            return;
        }
        self.annotator.show_final(item, label);
        if label == Label::Failed {
            self.set_state(id, ItemState::Failed);
            self.emit(ItemEvent::Failed(id));
        } else {
            self.set_state(id, ItemState::Labeled(label));
            self.emit(ItemEvent::Labeled {
                node: id,
                label,
                cached,
            });
        }
    }

    fn cancelled(&self, id: NodeId) {
        counter!("watch_items_cancelled_total").increment(1);
        debug!(target: "watcher", node = %id, "item left the feed before completion");
        self.emit(ItemEvent::Cancelled(id));
    }

    fn set_state(&self, id: NodeId, state: ItemState) {
        if let Some(t) = self.items.lock().get_mut(&id) {
            t.state = state;
        }
    }

    fn emit(&self, ev: ItemEvent) {
        // No subscribers is fine.
        let _ = self.events.send(ev);
    }
}
