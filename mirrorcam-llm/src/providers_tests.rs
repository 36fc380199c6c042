#[cfg(test)]
mod providers_tests {
    use crate::providers::*;
    use crate::config::*;

    #[test]
    fn test_openai_provider_creation() {
        let provider = OpenAIVisionProvider::new();
        assert_eq!(provider.name(), "openai");
        assert!(!provider.has_api_key());
    }

    #[test]
    fn test_openai_provider_with_key() {
        let provider = OpenAIVisionProvider::new().with_api_key("sk-test123".to_string());
        assert!(provider.has_api_key());
    }

    #[test]
    fn test_backend_provider_creation() {
        let provider = BackendProvider::from_config(&AnalysisConfig::default());
        assert_eq!(provider.name(), "backend");
        assert_eq!(provider.url(), DEFAULT_BACKEND_URL);
    }

    #[test]
    fn test_providers_are_object_safe() {
        let providers: Vec<Box<dyn AnalysisProvider>> = vec![
            Box::new(OpenAIVisionProvider::new()),
            Box::new(BackendProvider::new(DEFAULT_BACKEND_URL)),
        ];
        let names: Vec<_> = providers.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["openai", "backend"]);
    }

    #[test]
    fn test_trait_object_rejects_remote_image() {
        let provider: Box<dyn AnalysisProvider> = Box::new(BackendProvider::new(DEFAULT_BACKEND_URL));
        let result = tokio_test::block_on(provider.analyse(ImageRequest::new("file:///tmp/a.jpg")));
        assert!(matches!(result, Err(crate::error::LLMError::InvalidRequest(_))));
    }
}
