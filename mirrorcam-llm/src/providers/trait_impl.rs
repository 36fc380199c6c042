use async_trait::async_trait;
use crate::config::*;
use crate::error::Result;

#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &'static str;

    /// Send one image and wait for the textual analysis
    async fn analyse(&self, request: ImageRequest) -> Result<AnalysisResponse>;
}
