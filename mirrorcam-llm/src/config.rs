use serde::{Deserialize, Serialize};

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:5000/api/analyse-clothing";
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_VISION_MODEL: &str = "gpt-4o";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Self-hosted backend that forwards the image to a vision model.
    Backend,
    /// Direct call to the OpenAI chat completions API.
    OpenAI,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Backend => "backend",
            Provider::OpenAI => "openai",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "backend" => Some(Provider::Backend),
            "openai" => Some(Provider::OpenAI),
            _ => None,
        }
    }

    pub fn env_var_name(&self) -> Option<&'static str> {
        match self {
            Provider::Backend => None,
            Provider::OpenAI => Some("OPENAI_API_KEY"),
        }
    }
}

/// Settings for the analysis service a finalized crop is sent to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub provider: Provider,
    /// Backend endpoint, or base URL for the OpenAI provider.
    pub url: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Overrides the built-in clothing prompt when set.
    pub prompt: Option<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            provider: Provider::Backend,
            url: DEFAULT_BACKEND_URL.to_string(),
            model: DEFAULT_VISION_MODEL.to_string(),
            max_tokens: 1000,
            timeout_secs: 120,
            prompt: None,
        }
    }
}

/// One image handed to the analysis service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRequest {
    /// `data:image/jpeg;base64,...` URL of the image.
    pub image: String,
    /// Correlation id, usually the crop id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl ImageRequest {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    /// Natural-language description returned by the service.
    pub result: String,
    pub provider: String,
    pub model: Option<String>,
}
