//! Editable prompt template passed through to the answering backend.
//!
//! The `{context}`, `{history}` and `{question}` placeholders are filled in by
//! the backend; this layer never substitutes them.

use std::sync::RwLock;

/// The template used when the user has not supplied one.
pub fn default_template(language: &str) -> String {
    format!(
        "You are an expert assistant. Answer in {language}. Use the provided document chunks to \
         answer the user's question. Cite sources using [chunk_index] where relevant.\n\n\
         Context:\n{{context}}\n\nChat History:\n{{history}}\n\nQuestion: {{question}}\n\nAnswer:"
    )
}

/// Holds the user-edited template. Empty means "use the default".
#[derive(Debug, Default)]
pub struct PromptTemplateStore {
    template: RwLock<String>,
}

impl PromptTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the template unconditionally.
    pub fn set_template(&self, text: impl Into<String>) {
        let text = text.into();
        tracing::debug!(len = text.len(), "Prompt template updated");
        match self.template.write() {
            Ok(mut guard) => *guard = text,
            Err(poisoned) => *poisoned.into_inner() = text,
        }
    }

    /// The raw stored template, possibly empty.
    pub fn template(&self) -> String {
        match self.template.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_custom(&self) -> bool {
        !self.template().is_empty()
    }

    /// The template to send: the stored one, or the default for `language`.
    pub fn resolve(&self, language: &str) -> String {
        let template = self.template();
        if template.is_empty() {
            default_template(language)
        } else {
            template
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_template_embeds_language_and_placeholders() {
        let template = default_template("en");
        assert!(template.starts_with("You are an expert assistant. Answer in en."));
        assert!(template.contains("{context}"));
        assert!(template.contains("{history}"));
        assert!(template.contains("{question}"));
        assert!(template.ends_with("Answer:"));
    }

    #[test]
    fn test_empty_store_resolves_to_default() {
        let store = PromptTemplateStore::new();
        assert!(!store.is_custom());
        assert_eq!(store.template(), "");
        assert_eq!(store.resolve("fr"), default_template("fr"));
    }

    #[test]
    fn test_custom_template_passes_through_verbatim() {
        let store = PromptTemplateStore::new();
        store.set_template("Q: {question}\nCTX: {context}");
        assert!(store.is_custom());
        assert_eq!(store.resolve("de"), "Q: {question}\nCTX: {context}");
    }

    #[test]
    fn test_clearing_template_restores_default() {
        let store = PromptTemplateStore::new();
        store.set_template("custom");
        store.set_template("");
        assert_eq!(store.resolve("ja"), default_template("ja"));
    }

    #[test]
    fn test_whitespace_template_is_kept() {
        let store = PromptTemplateStore::new();
        store.set_template("  ");
        assert_eq!(store.resolve("en"), "  ");
    }
}
