//! Translation request/outcome types, the backend adapter trait, and the
//! two-tier result cache that sits in front of it.

pub mod cache;
pub mod entry;
pub mod fingerprint;
pub mod normalize;
pub mod service;
pub mod sqlite_cache;
pub mod store;
pub mod tiered;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which remote service (or fan-out over all of them) the user prefers.
/// The wire name is part of the cache fingerprint and must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendPreference {
    Gemini,
    OpenRouter,
    LibreTranslate,
    Both,
}

impl BackendPreference {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendPreference::Gemini => "gemini",
            BackendPreference::OpenRouter => "openrouter",
            BackendPreference::LibreTranslate => "libretranslate",
            BackendPreference::Both => "both",
        }
    }
}

impl std::fmt::Display for BackendPreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Translation request handed to a backend.
#[derive(Debug, Clone, Serialize)]
pub struct TranslateRequest {
    pub request_id: String,
    pub source_text: String,
    pub source_lang: String,
    pub target_lang: String,
    pub backend: BackendPreference,
}

/// Outcome reported by a backend. The cache treats it as an opaque
/// serializable payload; unknown fields are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslateOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translated_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TranslateOutcome {
    /// A successful translation produced by `service`.
    pub fn translated(text: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            success: true,
            translated_text: Some(text.into()),
            detected_language: None,
            service: Some(service.into()),
            error: None,
            extra: serde_json::Map::new(),
        }
    }

    /// A backend-reported failure. Never cached.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            translated_text: None,
            detected_language: None,
            service: None,
            error: Some(error.into()),
            extra: serde_json::Map::new(),
        }
    }
}

/// Translator trait (adapter for the remote backends).
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, request: &TranslateRequest) -> Result<TranslateOutcome, TranslateError>;
}

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0} is not configured")]
    NotConfigured(String),
    #[error("API error: {0}")]
    ApiError(String),
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
    #[error("translation timeout")]
    Timeout,
}
