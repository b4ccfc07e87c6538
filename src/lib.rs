//! transcache: two-tier translation result cache for a selection-translate extension.
//! Main library: tracing setup, cache/service wiring, message handling.

pub mod clock;
pub mod config;
pub mod metrics;
pub mod router;
pub mod state_machine;
pub mod translate;

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use clock::{Clock, SystemClock};
use config::CacheConfig;
use metrics::{MetricsRegistry, MetricsSnapshot};
use translate::service::TranslationService;
use translate::sqlite_cache::SqliteStore;
use translate::store::{PersistentStore, StoreError};
use translate::tiered::TieredCache;
use translate::{BackendPreference, Translator};

/// Shared state for one process: a single cache instance handed out by `Arc`.
pub struct AppContext {
    pub cache: Arc<TieredCache>,
    pub metrics: Arc<MetricsRegistry>,
    pub service: Arc<TranslationService>,
}

impl AppContext {
    pub fn new(
        config: CacheConfig,
        store: Arc<dyn PersistentStore>,
        clock: Arc<dyn Clock>,
        translator: Arc<dyn Translator>,
        backend: BackendPreference,
    ) -> Self {
        let metrics = Arc::new(MetricsRegistry::new());
        let cache = Arc::new(TieredCache::new(config, store, clock, Arc::clone(&metrics)));
        let service = Arc::new(TranslationService::new(
            translator,
            Arc::clone(&cache),
            backend,
            Arc::clone(&metrics),
        ));
        Self {
            cache,
            metrics,
            service,
        }
    }

    /// Wire a SQLite-backed cache at `db_path`, with config from the environment.
    pub fn open(
        db_path: &Path,
        translator: Arc<dyn Translator>,
        backend: BackendPreference,
    ) -> Result<Self, StoreError> {
        let config = CacheConfig::from_env().unwrap_or_else(|e| {
            warn!(error = %e, "cache config invalid, using defaults");
            CacheConfig::default()
        });
        let store = Arc::new(SqliteStore::open(db_path)?);
        info!(
            max_size_bytes = config.max_size_bytes,
            ttl_secs = config.ttl_secs,
            backend = %backend,
            "translation cache ready"
        );
        Ok(Self::new(config, store, Arc::new(SystemClock), translator, backend))
    }

    /// Latency percentiles and hit/miss/eviction counters recorded so far.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Handle one message from the extension channel.
    pub async fn handle(&self, message: Value) -> Value {
        router::dispatch_value(&self.service, message).await
    }
}

/// Install the global tracing subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("transcache=debug")),
        )
        .with_target(true)
        .with_thread_ids(true)
        .try_init();
}
