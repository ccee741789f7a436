//! Construct a concrete `LlmProvider` for a given model tier from config.

use std::sync::Arc;

use crate::config::{EmbeddingConfig, LlmConfig};
use crate::error::LlmError;
use crate::llm::embedding::GeminiEmbeddingProvider;
use crate::llm::gemini::GeminiProvider;
use crate::llm::openrouter::OpenRouterProvider;
use crate::llm::{EmbeddingProvider, LlmProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    Fast,
    Moderate,
    Pro,
    Flash,
}

pub fn create_provider(config: &LlmConfig, tier: ModelTier) -> Result<Arc<dyn LlmProvider>, LlmError> {
    if config.api_key.is_empty() {
        return Err(LlmError::NotConfigured {
            tier: format!("{tier:?}"),
        });
    }

    let model = match tier {
        ModelTier::Fast => &config.model_fast,
        ModelTier::Moderate => &config.model_moderate,
        ModelTier::Pro => &config.model_pro,
        ModelTier::Flash => &config.model_flash,
    }
    .clone();

    let provider: Arc<dyn LlmProvider> = match config.provider.as_str() {
        "gemini" => Arc::new(GeminiProvider::new(config.api_key.clone(), model)),
        "openrouter" => Arc::new(OpenRouterProvider::new(config.api_key.clone(), model)),
        other => {
            return Err(LlmError::NotConfigured {
                tier: format!("unknown provider '{other}' for tier {tier:?}"),
            })
        }
    };

    Ok(provider)
}

/// Only `gemini` backs embeddings today; `openrouter` is chat-only in this
/// deployment, so an `openrouter`-configured embedding section is an error
/// rather than a silent fallback.
pub fn create_embedding_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>, LlmError> {
    if config.api_key.is_empty() {
        return Err(LlmError::NotConfigured {
            tier: "embedding".to_string(),
        });
    }

    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiEmbeddingProvider::new(config.api_key.clone(), config.model.clone()))),
        other => Err(LlmError::NotConfigured {
            tier: format!("unknown embedding provider '{other}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_api_key_is_not_configured() {
        let config = LlmConfig {
            provider: "gemini".to_string(),
            api_key: String::new(),
            model_fast: "x".to_string(),
            model_moderate: "x".to_string(),
            model_pro: "x".to_string(),
            model_flash: "x".to_string(),
            max_turns: 10,
        };
        assert!(create_provider(&config, ModelTier::Fast).is_err());
    }

    #[test]
    fn unknown_provider_errors() {
        let config = LlmConfig {
            provider: "made-up".to_string(),
            api_key: "key".to_string(),
            model_fast: "x".to_string(),
            model_moderate: "x".to_string(),
            model_pro: "x".to_string(),
            model_flash: "x".to_string(),
            max_turns: 10,
        };
        assert!(create_provider(&config, ModelTier::Fast).is_err());
    }
}
