//! Active language selection shared by the session and the voice controller.

use std::sync::{Arc, RwLock};

use docuchat_core::config::SUPPORTED_LANGUAGES;

use crate::error::ChatError;

/// Fallback when the locale names nothing we support.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Whether `code` is one of the supported language codes.
pub fn is_supported(code: &str) -> bool {
    SUPPORTED_LANGUAGES.contains(&code)
}

/// Pick a language from a locale string such as `pt-BR` or `de_DE.UTF-8`.
///
/// Only the primary subtag is considered.
pub fn detect_language(locale: &str) -> &'static str {
    let primary = locale
        .split(['-', '_', '.'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    SUPPORTED_LANGUAGES
        .iter()
        .copied()
        .find(|code| *code == primary)
        .unwrap_or(DEFAULT_LANGUAGE)
}

/// Session-scoped language code. Clones share the same value.
#[derive(Debug, Clone)]
pub struct SharedLanguage {
    code: Arc<RwLock<String>>,
}

impl Default for SharedLanguage {
    fn default() -> Self {
        Self::new(DEFAULT_LANGUAGE)
    }
}

impl SharedLanguage {
    /// Create from a code, falling back to the default when unsupported.
    pub fn new(code: &str) -> Self {
        let code = if is_supported(code) {
            code
        } else {
            DEFAULT_LANGUAGE
        };
        Self {
            code: Arc::new(RwLock::new(code.to_string())),
        }
    }

    pub fn get(&self) -> String {
        match self.code.read() {
            Ok(code) => code.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn set(&self, code: &str) -> Result<(), ChatError> {
        if !is_supported(code) {
            return Err(ChatError::UnsupportedLanguage(code.to_string()));
        }
        let mut guard = match self.code.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        tracing::debug!(from = %*guard, to = %code, "Language changed");
        *guard = code.to_string();
        Ok(())
    }
}
