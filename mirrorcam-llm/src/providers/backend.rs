use async_trait::async_trait;
use crate::config::*;
use crate::error::{LLMError, Result};
use crate::providers::trait_impl::AnalysisProvider;
use crate::providers::{truncate_body, validate_image};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

/// Posts `{"image": <data url>}` to a backend endpoint that holds the
/// vision-model credentials, and reads `{"result": ...}` back.
pub struct BackendProvider {
    client: Client,
    url: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct BackendReply {
    result: Option<String>,
    error: Option<String>,
}

impl BackendProvider {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.url.clone()).with_timeout(Duration::from_secs(config.timeout_secs))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl AnalysisProvider for BackendProvider {
    fn name(&self) -> &'static str {
        "backend"
    }

    async fn analyse(&self, request: ImageRequest) -> Result<AnalysisResponse> {
        validate_image(&request)?;

        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(LLMError::InvalidRequest(format!("Invalid backend URL: {}", self.url)));
        }

        tracing::debug!("Posting image {:?} to {}", request.id, self.url);

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        let reply = parse_reply(&text);

        if !status.is_success() {
            let message = reply
                .ok()
                .and_then(|r| r.error)
                .unwrap_or_else(|| truncate_body(&text));
            return Err(LLMError::Service(format!("HTTP {}: {}", status, message)));
        }

        let reply = reply?;
        match (reply.result, reply.error) {
            (Some(result), _) => Ok(AnalysisResponse {
                result,
                provider: self.name().to_string(),
                model: None,
            }),
            (None, Some(error)) => Err(LLMError::Service(error)),
            (None, None) => Err(LLMError::InvalidResponse("Response has no result".to_string())),
        }
    }
}

fn parse_reply(text: &str) -> Result<BackendReply> {
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reply_result() {
        let reply = parse_reply(r#"{"result":"Red dress, no stain"}"#).unwrap();
        assert_eq!(reply.result.as_deref(), Some("Red dress, no stain"));
        assert!(reply.error.is_none());
    }

    #[test]
    fn test_parse_reply_error() {
        let reply = parse_reply(r#"{"error":"No image provided"}"#).unwrap();
        assert!(reply.result.is_none());
        assert_eq!(reply.error.as_deref(), Some("No image provided"));
    }

    #[test]
    fn test_parse_reply_garbage() {
        assert!(matches!(parse_reply("<html>"), Err(LLMError::Json(_))));
    }

    #[tokio::test]
    async fn test_rejects_non_data_url() {
        let provider = BackendProvider::new(DEFAULT_BACKEND_URL);
        let err = provider
            .analyse(ImageRequest::new("https://example.com/a.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, LLMError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_rejects_bad_url_scheme() {
        let provider = BackendProvider::new("ftp://localhost/api");
        let err = provider
            .analyse(ImageRequest::new("data:image/jpeg;base64,AAAA"))
            .await
            .unwrap_err();
        assert!(matches!(err, LLMError::InvalidRequest(_)));
    }
}
