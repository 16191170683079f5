use crate::config::{expand_template, AiBackend, TEMPLATE_SLOT};
use crate::errors::DashError;

pub mod factory;
pub mod gemini;
pub mod ollama;

pub const DEFAULT_PROMPT_TEMPLATE: &str = "The following is the output of a system check run \
from a terminal dashboard. Explain what it shows and, if something looks wrong, suggest how \
to fix it.\n\n%s";

/// A text-generation collaborator used by the explain hotkey.
pub trait TextGenerator: Send + Sync {
    fn backend(&self) -> AiBackend;

    /// `DashError::AiClient` means the backend cannot be constructed at all;
    /// any other error is a failed request.
    fn generate(&self, prompt: &str, model: &str) -> Result<String, DashError>;
}

pub fn build_prompt(template: &str, text: &str) -> String {
    let template = if template.trim().is_empty() {
        DEFAULT_PROMPT_TEMPLATE
    } else {
        template
    };
    if template.contains(TEMPLATE_SLOT) {
        expand_template(template, text)
    } else {
        format!("{template}\n\n{text}")
    }
}

#[cfg(test)]
mod tests {
    use super::{build_prompt, DEFAULT_PROMPT_TEMPLATE};

    #[test]
    fn prompt_uses_slot_default_or_appends() {
        assert_eq!(build_prompt("Why? %s", "disk full"), "Why? disk full");
        assert_eq!(build_prompt("Summarize", "disk full"), "Summarize\n\ndisk full");
        let fallback = build_prompt("", "disk full");
        assert!(fallback.ends_with("disk full"));
        assert!(fallback.starts_with(&DEFAULT_PROMPT_TEMPLATE[..20]));
    }
}
