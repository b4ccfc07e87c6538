//! Input validation ahead of fingerprinting.
//! The cache keys on the trimmed text, so every caller goes through here first.

use super::TranslateError;

/// Longest selection accepted, in characters.
pub const MAX_TEXT_LENGTH: usize = 5000;

/// Validate a translation request and return the trimmed source text.
pub fn validate_input(text: &str, target_lang: &str) -> Result<String, TranslateError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(TranslateError::InvalidInput("Invalid text input".into()));
    }

    if target_lang.trim().is_empty() {
        return Err(TranslateError::InvalidInput("Invalid target language".into()));
    }

    if text.chars().count() > MAX_TEXT_LENGTH {
        return Err(TranslateError::InvalidInput(format!(
            "Text too long. Please select text with less than {MAX_TEXT_LENGTH} characters."
        )));
    }

    Ok(trimmed.to_string())
}
