pub mod trait_impl;
pub mod openai;
pub mod backend;

pub use trait_impl::AnalysisProvider;
pub use openai::OpenAIVisionProvider;
pub use backend::BackendProvider;
pub use crate::config::Provider;

/// Rejects anything that is not an inline base64 image.
pub(crate) fn validate_image(request: &crate::config::ImageRequest) -> crate::error::Result<()> {
    if !request.image.starts_with("data:image/") || !request.image.contains(";base64,") {
        return Err(crate::error::LLMError::InvalidRequest(
            "image must be a base64 data URL".to_string(),
        ));
    }
    Ok(())
}

/// Truncates an error body so a misbehaving service cannot flood the logs.
pub(crate) fn truncate_body(text: &str) -> String {
    if text.len() > 500 {
        let mut end = 500;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text[..end].to_string()
    } else {
        text.to_string()
    }
}
