use async_trait::async_trait;
use crate::config::*;
use crate::error::{LLMError, Result};
use crate::prompt::resolve_prompt;
use crate::providers::trait_impl::AnalysisProvider;
use crate::providers::{truncate_body, validate_image};
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use parking_lot::RwLock;

/// Sends the crop straight to the OpenAI chat completions API as an
/// `image_url` content part next to the text prompt.
pub struct OpenAIVisionProvider {
    api_key: Arc<RwLock<Option<String>>>,
    client: Client,
    base_url: String,
    model: String,
    max_tokens: u32,
    timeout: Duration,
    prompt: Option<String>,
}

impl OpenAIVisionProvider {
    pub fn new() -> Self {
        Self::from_config(&AnalysisConfig {
            provider: Provider::OpenAI,
            url: DEFAULT_OPENAI_URL.to_string(),
            ..AnalysisConfig::default()
        })
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            api_key: Arc::new(RwLock::new(None)),
            client: Client::new(),
            base_url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.timeout_secs),
            prompt: config.prompt.clone(),
        }
    }

    pub fn with_api_key(mut self, api_key: String) -> Self {
        self.set_api_key(api_key);
        self
    }

    pub fn set_api_key(&mut self, key: String) {
        *self.api_key.write() = Some(key);
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.read().is_some()
    }

    fn get_api_key(&self) -> Result<String> {
        self.api_key
            .read()
            .as_ref()
            .cloned()
            .ok_or_else(|| LLMError::MissingApiKey("OpenAI".to_string()))
    }

    fn build_body(&self, request: &ImageRequest) -> serde_json::Value {
        json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": resolve_prompt(self.prompt.as_deref()) },
                    { "type": "image_url", "image_url": { "url": request.image } },
                ],
            }],
            "max_tokens": self.max_tokens.min(4096),
        })
    }
}

impl Default for OpenAIVisionProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AnalysisProvider for OpenAIVisionProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn analyse(&self, request: ImageRequest) -> Result<AnalysisResponse> {
        let api_key = self.get_api_key()?;
        validate_image(&request)?;

        if !self.base_url.starts_with("https://") {
            return Err(LLMError::InvalidRequest("Invalid base URL".to_string()));
        }

        let api_key_prefix = match api_key.get(..8) {
            Some(prefix) if api_key.len() > 8 => prefix,
            _ => "***",
        };
        tracing::debug!("Sending image to OpenAI with key {}...", api_key_prefix);

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(&self.build_body(&request))
            .send()
            .await?;

        let status = response.status();

        if status == 429 {
            return Err(LLMError::RateLimit);
        }

        if status == 401 || status == 403 {
            return Err(LLMError::AuthenticationFailed);
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LLMError::InvalidResponse(format!(
                "HTTP {}: {}",
                status,
                truncate_body(&text)
            )));
        }

        let json: serde_json::Value = response.json().await?;
        let content = parse_completion(&json)?;
        tracing::info!("OpenAI vision analysis received ({} chars)", content.len());

        Ok(AnalysisResponse {
            result: content,
            provider: self.name().to_string(),
            model: Some(json["model"].as_str().unwrap_or(&self.model).to_string()),
        })
    }
}

/// Pulls the first choice's message text out of a chat completion body.
fn parse_completion(json: &serde_json::Value) -> Result<String> {
    let choices = json.get("choices").and_then(|c| c.as_array()).ok_or_else(|| {
        LLMError::InvalidResponse("Invalid response format: no choices array".to_string())
    })?;

    let choice = choices
        .first()
        .ok_or_else(|| LLMError::InvalidResponse("No choices in response".to_string()))?;

    choice["message"]["content"]
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| LLMError::InvalidResponse("Choice has no message content".to_string()))
}
