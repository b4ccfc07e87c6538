//! Shared fixtures: a store with switchable failures and suspendable calls,
//! a counting translator, and a cache harness on a manual clock.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;

use transcache::clock::{Clock, ManualClock};
use transcache::config::CacheConfig;
use transcache::metrics::MetricsRegistry;
use transcache::translate::fingerprint::CacheKey;
use transcache::translate::store::{MemoryStore, PersistentStore, StoreError, StoreResult};
use transcache::translate::tiered::TieredCache;
use transcache::translate::{
    BackendPreference, TranslateError, TranslateOutcome, TranslateRequest, Translator,
};

/// 2023-11-14T22:13:20Z
pub const T0: i64 = 1_700_000_000_000;
pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// A parked store call: signals when it is reached, resumes when released.
struct Hold {
    reached: oneshot::Sender<()>,
    release: oneshot::Receiver<()>,
}

/// Test side of a `Hold`.
pub struct Gate {
    pub reached: oneshot::Receiver<()>,
    pub release: oneshot::Sender<()>,
}

impl FlakyStore {
    fn arm(slot: &Mutex<Option<Hold>>) -> Gate {
        let (reached_tx, reached_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        *slot.lock() = Some(Hold {
            reached: reached_tx,
            release: release_rx,
        });
        Gate {
            reached: reached_rx,
            release: release_tx,
        }
    }

    async fn pass(slot: &Mutex<Option<Hold>>) {
        let hold = slot.lock().take();
        if let Some(hold) = hold {
            let _ = hold.reached.send(());
            let _ = hold.release.await;
        }
    }
}

/// `MemoryStore` whose reads and writes can be made to fail, or be held
/// open so other requests run while one is suspended on the store.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    held_read: Mutex<Option<Hold>>,
    held_write: Mutex<Option<Hold>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Suspend the next `get_many` until the returned gate is released.
    pub fn hold_next_read(&self) -> Gate {
        Self::arm(&self.held_read)
    }

    /// Suspend the next `set_one` until the returned gate is released.
    pub fn hold_next_write(&self) -> Gate {
        Self::arm(&self.held_write)
    }

    fn check(&self, flag: &AtomicBool) -> StoreResult<()> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("injected failure".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PersistentStore for FlakyStore {
    async fn get_many(&self, keys: &[String]) -> StoreResult<HashMap<String, Value>> {
        self.check(&self.fail_reads)?;
        let found = self.inner.get_many(keys).await;
        Self::pass(&self.held_read).await;
        found
    }

    async fn get_all(&self, prefix: &str) -> StoreResult<HashMap<String, Value>> {
        self.check(&self.fail_reads)?;
        self.inner.get_all(prefix).await
    }

    async fn set_one(&self, key: &str, value: Value) -> StoreResult<()> {
        self.check(&self.fail_writes)?;
        Self::pass(&self.held_write).await;
        self.inner.set_one(key, value).await
    }

    async fn remove_many(&self, keys: &[String]) -> StoreResult<()> {
        self.check(&self.fail_writes)?;
        self.inner.remove_many(keys).await
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum StubMode {
    Succeed,
    BackendFailure,
    Error,
}

/// Translator that prefixes the text and counts calls.
pub struct StubTranslator {
    pub calls: AtomicUsize,
    mode: StubMode,
}

impl StubTranslator {
    pub fn new(mode: StubMode) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            mode,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Translator for StubTranslator {
    async fn translate(
        &self,
        request: &TranslateRequest,
    ) -> Result<TranslateOutcome, TranslateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            StubMode::Succeed => Ok(TranslateOutcome::translated(
                format!("[{}] {}", request.target_lang, request.source_text),
                request.backend.as_str(),
            )),
            StubMode::BackendFailure => Ok(TranslateOutcome::failed("quota exhausted")),
            StubMode::Error => Err(TranslateError::ApiError("server error: 503".into())),
        }
    }
}

pub struct Harness {
    pub cache: Arc<TieredCache>,
    pub store: Arc<FlakyStore>,
    pub clock: Arc<ManualClock>,
    pub metrics: Arc<MetricsRegistry>,
}

impl Harness {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_store(config, Arc::new(FlakyStore::new()), Arc::new(ManualClock::new(T0)))
    }

    /// A second cache over the same store and clock, as after a restart.
    pub fn restart(&self) -> Self {
        Self::with_store(
            self.cache.config().clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.clock),
        )
    }

    fn with_store(config: CacheConfig, store: Arc<FlakyStore>, clock: Arc<ManualClock>) -> Self {
        let metrics = Arc::new(MetricsRegistry::new());
        let cache = Arc::new(TieredCache::new(
            config,
            Arc::clone(&store) as Arc<dyn PersistentStore>,
            Arc::clone(&clock) as Arc<dyn Clock>,
            Arc::clone(&metrics),
        ));
        Self {
            cache,
            store,
            clock,
            metrics,
        }
    }

    pub fn key(&self, text: &str) -> CacheKey {
        self.cache.key_for(text, "auto", "fr", BackendPreference::Gemini)
    }

    pub fn persisted(&self, key: &CacheKey) -> bool {
        self.store.inner.contains(key.as_str())
    }
}

pub fn outcome(text: &str) -> TranslateOutcome {
    TranslateOutcome::translated(text, "gemini")
}
