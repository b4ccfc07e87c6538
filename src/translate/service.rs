//! Translation service: validation, cache-through lookup, backend call, write-back.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::normalize::validate_input;
use super::tiered::TieredCache;
use super::{BackendPreference, TranslateError, TranslateOutcome, TranslateRequest, Translator};
use crate::metrics::{metric_names, MetricsRegistry, RequestIds};

/// Outcome returned to the UI, flagged with where it came from.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslateResponse {
    #[serde(flatten)]
    pub outcome: TranslateOutcome,
    pub from_cache: bool,
}

pub struct TranslationService {
    translator: Arc<dyn Translator>,
    cache: Arc<TieredCache>,
    backend: BackendPreference,
    metrics: Arc<MetricsRegistry>,
}

impl TranslationService {
    pub fn new(
        translator: Arc<dyn Translator>,
        cache: Arc<TieredCache>,
        backend: BackendPreference,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            translator,
            cache,
            backend,
            metrics,
        }
    }

    pub fn cache(&self) -> &Arc<TieredCache> {
        &self.cache
    }

    pub fn backend(&self) -> BackendPreference {
        self.backend
    }

    /// Translate `text`, answering from the cache when possible.
    /// Only successful backend outcomes are cached; backend errors propagate.
    pub async fn translate(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<TranslateResponse, TranslateError> {
        let ids = RequestIds::new();
        let text = validate_input(text, target_lang)?;
        let key = self.cache.key_for(&text, source_lang, target_lang, self.backend);

        if let Some(hit) = self.cache.lookup(&key).await {
            debug!(
                trace_id = %ids.trace_id,
                key = %key,
                tier = ?hit.tier,
                "translation served from cache"
            );
            return Ok(TranslateResponse {
                outcome: hit.result,
                from_cache: true,
            });
        }

        let request = TranslateRequest {
            request_id: ids.request_id.clone(),
            source_text: text,
            source_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
            backend: self.backend,
        };

        let start = Instant::now();
        let outcome = match self.translator.translate(&request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    trace_id = %ids.trace_id,
                    request_id = %ids.request_id,
                    backend = %self.backend,
                    error = %e,
                    "translation failed"
                );
                return Err(e);
            }
        };
        self.metrics
            .record(metric_names::TRANSLATE_DONE, start.elapsed().as_micros() as f64);

        if outcome.success {
            self.cache.store(&key, outcome.clone()).await;
        }
        info!(
            trace_id = %ids.trace_id,
            request_id = %ids.request_id,
            backend = %self.backend,
            success = outcome.success,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "translation done"
        );

        Ok(TranslateResponse {
            outcome,
            from_cache: false,
        })
    }
}
