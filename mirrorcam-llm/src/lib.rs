pub mod config;
pub mod error;
pub mod manager;
pub mod prompt;
pub mod providers;

#[cfg(test)]
mod providers_tests;

pub use config::*;
pub use error::*;
pub use manager::{build_openai, build_provider};
pub use providers::{AnalysisProvider, BackendProvider, OpenAIVisionProvider};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_enum() {
        assert_eq!(Provider::OpenAI.env_var_name(), Some("OPENAI_API_KEY"));
        assert_eq!(Provider::Backend.env_var_name(), None);
        assert_eq!(Provider::OpenAI.as_str(), "openai");
    }

    #[test]
    fn test_provider_from_str() {
        assert_eq!(Provider::from_str("openai"), Some(Provider::OpenAI));
        assert_eq!(Provider::from_str("Backend"), Some(Provider::Backend));
        assert_eq!(Provider::from_str("invalid"), None);
    }

    #[test]
    fn test_analysis_config_default() {
        let config = AnalysisConfig::default();
        assert_eq!(config.provider, Provider::Backend);
        assert_eq!(config.url, DEFAULT_BACKEND_URL);
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.max_tokens, 1000);
    }

    #[test]
    fn test_image_request_serialization() {
        let request = ImageRequest::new("data:image/jpeg;base64,AAAA");
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, r#"{"image":"data:image/jpeg;base64,AAAA"}"#);

        let request = request.with_id("clothing_0_1");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["id"], "clothing_0_1");
    }
}
