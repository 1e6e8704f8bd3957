// src/cache/mod.rs
//! Cache store: content fingerprint -> label, consulted before any remote call.
//!
//! Three layers, checked in order:
//! 1. session memo (labels already resolved in this process, immutable once set),
//! 2. in-flight map (one shared future per fingerprint still waiting on the service),
//! 3. the durable `KvStore`.
//!
//! Memo and in-flight map sit behind one lock, and every check-then-insert on them
//! happens inside a single critical section. That is what bounds remote calls to one per
//! uncached fingerprint.

pub mod store;

pub use store::{JsonFileStore, KvStore, MemoryStore};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use metrics::counter;
use parking_lot::Mutex;
use thiserror::Error;

use crate::analyze::Label;

pub const DEFAULT_KEY_PREFIX: &str = "misinfo_";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage data is corrupt: {0}")]
    Corrupt(String),
}

/// Short, anonymized id for logs. Raw item text never goes to logs.
pub fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Cache and coalescing key derived from item text. Identical text, identical key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(text: &str) -> Self {
        Self(text.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn storage_key(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.0)
    }

    pub fn short_id(&self) -> String {
        anon_hash(&self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_id())
    }
}

pub type SharedLabel = Shared<BoxFuture<'static, Label>>;

/// Handle on an in-flight classification. Await `future`; if the waiter gives up, hand
/// the handle back through `CacheStore::release`.
pub struct Pending {
    pub fingerprint: Fingerprint,
    pub future: SharedLabel,
    /// `true` when this waiter attached to a call someone else started.
    pub coalesced: bool,
    seq: u64,
}

pub enum Resolution {
    Hit(Label),
    InFlight(Pending),
}

struct InFlight {
    seq: u64,
    future: SharedLabel,
    waiters: usize,
}

#[derive(Default)]
struct Session {
    memo: HashMap<Fingerprint, Label>,
    inflight: HashMap<Fingerprint, InFlight>,
    next_seq: u64,
}

struct Inner {
    store: Arc<dyn KvStore>,
    prefix: String,
    session: Mutex<Session>,
}

#[derive(Clone)]
pub struct CacheStore {
    inner: Arc<Inner>,
}

impl CacheStore {
    pub fn new(store: Arc<dyn KvStore>, prefix: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                prefix: prefix.into(),
                session: Mutex::new(Session::default()),
            }),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), DEFAULT_KEY_PREFIX)
    }

    /// Label already resolved in this session, without touching storage.
    pub fn peek(&self, fp: &Fingerprint) -> Option<Label> {
        self.inner.session.lock().memo.get(fp).copied()
    }

    pub fn in_flight(&self) -> usize {
        self.inner.session.lock().inflight.len()
    }

    pub async fn get(&self, fp: &Fingerprint) -> Result<Option<Label>, StorageError> {
        if let Some(l) = self.peek(fp) {
            return Ok(Some(l));
        }
        let key = fp.storage_key(&self.inner.prefix);
        let Some(raw) = self.inner.store.get(&key).await? else {
            return Ok(None);
        };
        match Label::from_stored(&raw) {
            Some(label) => {
                self.inner.session.lock().memo.entry(fp.clone()).or_insert(label);
                Ok(Some(label))
            }
            None => {
                tracing::warn!(target: "cache", id = %fp, value = %raw, "ignoring unrecognized cached value");
                Ok(None)
            }
        }
    }

    /// Writes a resolved label. `Failed` is never written.
    pub async fn set(&self, fp: &Fingerprint, label: Label) -> Result<(), StorageError> {
        if !label.is_cacheable() {
            return Ok(());
        }
        self.inner.session.lock().memo.entry(fp.clone()).or_insert(label);
        self.inner.persist(fp, label).await
    }

    /// Cache lookup followed, on a miss, by attaching to or starting the remote call.
    /// `dispatch` only runs if no call for `fp` is in flight.
    pub async fn resolve<F>(&self, fp: &Fingerprint, dispatch: F) -> Result<Resolution, StorageError>
    where
        F: FnOnce() -> BoxFuture<'static, Label>,
    {
        if let Some(res) = self.attach_existing(fp) {
            return Ok(res);
        }
        if let Some(label) = self.get(fp).await? {
            counter!("cache_hits_total").increment(1);
            return Ok(Resolution::Hit(label));
        }
        Ok(self.attach_or_dispatch(fp, dispatch))
    }

    /// Synchronous step: memo hit, else attach to the in-flight call, else register and
    /// start a new one. No suspension point between the checks and the insert.
    pub fn attach_or_dispatch<F>(&self, fp: &Fingerprint, dispatch: F) -> Resolution
    where
        F: FnOnce() -> BoxFuture<'static, Label>,
    {
        let mut session = self.inner.session.lock();
        if let Some(res) = Self::attach_locked(&mut session, fp) {
            return res;
        }

        counter!("cache_misses_total").increment(1);
        session.next_seq += 1;
        let seq = session.next_seq;
        let inner = self.inner.clone();
        let key = fp.clone();
        let work = dispatch();
        let future = async move {
            let label = work.await;
            inner.finish(&key, seq, label).await;
            label
        }
        .boxed()
        .shared();

        session.inflight.insert(
            fp.clone(),
            InFlight {
                seq,
                future: future.clone(),
                waiters: 1,
            },
        );
        tracing::debug!(target: "cache", id = %fp, "remote call dispatched");
        Resolution::InFlight(Pending {
            fingerprint: fp.clone(),
            future,
            coalesced: false,
            seq,
        })
    }

    /// A waiter gave up. When it was the last one, the in-flight entry is dropped, which
    /// drops the remote call with it.
    pub fn release(&self, pending: Pending) {
        let Pending {
            fingerprint,
            future,
            seq,
            ..
        } = pending;
        drop(future);
        let mut session = self.inner.session.lock();
        let last = match session.inflight.get_mut(&fingerprint) {
            Some(entry) if entry.seq == seq => {
                entry.waiters = entry.waiters.saturating_sub(1);
                entry.waiters == 0
            }
            _ => false,
        };
        if last {
            session.inflight.remove(&fingerprint);
            tracing::debug!(target: "cache", id = %fingerprint, "in-flight call abandoned");
        }
    }

    fn attach_existing(&self, fp: &Fingerprint) -> Option<Resolution> {
        Self::attach_locked(&mut self.inner.session.lock(), fp)
    }

    fn attach_locked(session: &mut Session, fp: &Fingerprint) -> Option<Resolution> {
        if let Some(label) = session.memo.get(fp) {
            counter!("cache_hits_total").increment(1);
            return Some(Resolution::Hit(*label));
        }
        let entry = session.inflight.get_mut(fp)?;
        entry.waiters += 1;
        counter!("cache_coalesced_total").increment(1);
        Some(Resolution::InFlight(Pending {
            fingerprint: fp.clone(),
            future: entry.future.clone(),
            coalesced: true,
            seq: entry.seq,
        }))
    }
}

impl Inner {
    async fn finish(&self, fp: &Fingerprint, seq: u64, label: Label) {
        {
            let mut session = self.session.lock();
            if label.is_cacheable() {
                session.memo.entry(fp.clone()).or_insert(label);
            }
            if session.inflight.get(fp).is_some_and(|e| e.seq == seq) {
                session.inflight.remove(fp);
            }
        }
        if label.is_cacheable() {
            if let Err(e) = self.persist(fp, label).await {
                tracing::warn!(target: "cache", id = %fp, error = %e, "cache write failed; label kept for this session");
            }
        }
    }

    async fn persist(&self, fp: &Fingerprint, label: Label) -> Result<(), StorageError> {
        let key = fp.storage_key(&self.prefix);
        let res = self.store.set(&key, label.as_str()).await;
        if res.is_err() {
            counter!("cache_storage_errors_total").increment(1);
        }
        res
    }
}
