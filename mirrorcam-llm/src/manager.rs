use crate::config::*;
use crate::error::{LLMError, Result};
use crate::providers::{AnalysisProvider, BackendProvider, OpenAIVisionProvider};
use std::env;
use std::sync::Arc;

/// Builds the provider selected by `config`, reading API keys from the
/// environment when the provider needs one.
pub fn build_provider(config: &AnalysisConfig) -> Result<Arc<dyn AnalysisProvider>> {
    match config.provider {
        Provider::Backend => {
            tracing::info!("Using analysis backend at {}", config.url);
            Ok(Arc::new(BackendProvider::from_config(config)))
        }
        Provider::OpenAI => {
            let var = Provider::OpenAI.env_var_name().unwrap_or("OPENAI_API_KEY");
            let key = env::var(var).map_err(|_| LLMError::MissingApiKey("OpenAI".to_string()))?;
            build_openai(config, key)
        }
    }
}

/// Same as [`build_provider`] for OpenAI, with an explicit key.
pub fn build_openai(config: &AnalysisConfig, api_key: String) -> Result<Arc<dyn AnalysisProvider>> {
    let api_key = api_key.trim().to_string();
    if api_key.is_empty() || api_key.len() > 1000 {
        return Err(LLMError::MissingApiKey("OpenAI".to_string()));
    }
    tracing::info!("Using OpenAI vision model {}", config.model);
    Ok(Arc::new(OpenAIVisionProvider::from_config(config).with_api_key(api_key)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_backend_provider() {
        let provider = build_provider(&AnalysisConfig::default()).unwrap();
        assert_eq!(provider.name(), "backend");
    }

    #[test]
    fn test_build_openai_with_key() {
        let config = AnalysisConfig {
            provider: Provider::OpenAI,
            url: DEFAULT_OPENAI_URL.to_string(),
            ..AnalysisConfig::default()
        };
        let provider = build_openai(&config, "sk-test123".to_string()).unwrap();
        assert_eq!(provider.name(), "openai");
    }

    #[test]
    fn test_build_openai_rejects_empty_key() {
        let config = AnalysisConfig::default();
        assert!(matches!(
            build_openai(&config, "  ".to_string()),
            Err(LLMError::MissingApiKey(_))
        ));
        assert!(build_openai(&config, "a".repeat(2000)).is_err());
    }
}
