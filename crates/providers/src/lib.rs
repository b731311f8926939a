//! LLM provider implementations for Backchannel.
//!
//! All providers implement the `backchannel_core::Provider` trait, and
//! [`ProviderCompletionService`] adapts one into the chat/summarize
//! boundary the orchestrator uses.

pub mod completion;
pub mod openai_compat;

use std::sync::Arc;

use backchannel_config::AppConfig;
use backchannel_core::provider::Provider;

pub use completion::{DEFAULT_SYSTEM_PROMPT, ProviderCompletionService};
pub use openai_compat::OpenAiCompatProvider;

/// Build the configured provider.
///
/// Never fails: a missing API key is reported when the provider is first
/// used.
pub fn build_from_config(config: &AppConfig) -> Arc<dyn Provider> {
    let name = config.provider.as_str();
    let base_url = config
        .providers
        .get(name)
        .and_then(|p| p.api_url.clone())
        .unwrap_or_else(|| default_base_url(name));

    let api_key = if name == "ollama" {
        Some(config.provider_api_key().unwrap_or_else(|| "ollama".into()))
    } else {
        config.provider_api_key()
    };

    Arc::new(OpenAiCompatProvider::new(name, base_url, api_key))
}

/// Build the completion service the orchestrator talks to.
pub fn completion_service_from_config(config: &AppConfig) -> ProviderCompletionService {
    let service = ProviderCompletionService::new(build_from_config(config), &config.model)
        .with_temperature(config.temperature)
        .with_max_tokens(config.max_tokens);

    match &config.system_prompt {
        Some(prompt) => service.with_system_prompt(prompt),
        None => service,
    }
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "gemini" => "https://generativelanguage.googleapis.com/v1beta/openai".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}
