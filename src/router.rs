//! Message dispatcher for the cache-facing actions of the extension channel.
//! Requests are `action`-tagged JSON; responses always carry `success`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::translate::service::TranslationService;
use crate::translate::tiered::CacheStats;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    #[serde(rename_all = "camelCase")]
    Translate {
        text: String,
        target_language: String,
        #[serde(default = "default_source_language")]
        source_language: String,
    },
    GetCacheStats,
    ClearCache,
}

fn default_source_language() -> String {
    "auto".to_string()
}

#[derive(Serialize)]
struct StatsResponse {
    success: bool,
    stats: CacheStats,
}

#[derive(Serialize)]
struct ClearResponse {
    success: bool,
    cleared: usize,
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
}

/// Handle one typed request.
pub async fn dispatch(service: &TranslationService, request: Request) -> Value {
    match request {
        Request::Translate {
            text,
            target_language,
            source_language,
        } => match service
            .translate(&text, &source_language, &target_language)
            .await
        {
            Ok(response) => to_json(&response),
            Err(e) => error_response(e.to_string()),
        },
        Request::GetCacheStats => {
            let stats = service.cache().stats().await;
            to_json(&StatsResponse {
                success: true,
                stats,
            })
        }
        Request::ClearCache => {
            let cleared = service.cache().clear_all().await;
            to_json(&ClearResponse {
                success: true,
                cleared,
            })
        }
    }
}

/// Handle a raw message. Unknown or malformed actions get an error response.
pub async fn dispatch_value(service: &TranslationService, message: Value) -> Value {
    let action = message
        .get("action")
        .and_then(Value::as_str)
        .map(str::to_string);

    match serde_json::from_value::<Request>(message) {
        Ok(request) => dispatch(service, request).await,
        Err(e) => match action {
            Some(action) if !is_known_action(&action) => {
                error_response(format!("Unknown action: {action}"))
            }
            _ => {
                warn!(error = %e, "malformed request");
                error_response(format!("Invalid request: {e}"))
            }
        },
    }
}

fn is_known_action(action: &str) -> bool {
    matches!(action, "translate" | "getCacheStats" | "clearCache")
}

fn error_response(error: String) -> Value {
    to_json(&ErrorResponse {
        success: false,
        error,
    })
}

fn to_json<T: Serialize>(body: &T) -> Value {
    serde_json::to_value(body).unwrap_or_else(|e| {
        warn!(error = %e, "response serialization failed");
        let mut fallback = serde_json::Map::new();
        fallback.insert("success".into(), Value::Bool(false));
        fallback.insert("error".into(), Value::String(e.to_string()));
        Value::Object(fallback)
    })
}
