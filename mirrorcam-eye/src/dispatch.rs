//! Hands the chosen crop to the analysis service

use crate::processing::Crop;
use mirrorcam_llm::{AnalysisProvider, ImageRequest};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Result of the single analysis call a session makes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Analysed { text: String, provider: String },
    Failed { message: String },
}

impl DispatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DispatchOutcome::Analysed { .. })
    }
}

/// Submits a crop's data URL. No retries.
#[derive(Clone)]
pub struct Dispatcher {
    provider: Arc<dyn AnalysisProvider>,
}

impl Dispatcher {
    pub fn new(provider: Arc<dyn AnalysisProvider>) -> Self {
        Self { provider }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub async fn dispatch(&self, crop: &Crop) -> DispatchOutcome {
        info!(
            "Dispatching crop {} ({}%) to {}",
            crop.id,
            crop.score,
            self.provider.name()
        );
        let request = ImageRequest::new(crop.data_url()).with_id(crop.id.clone());
        match self.provider.analyse(request).await {
            Ok(response) => DispatchOutcome::Analysed {
                text: response.result,
                provider: response.provider,
            },
            Err(e) => {
                error!("Analysis of crop {} failed: {}", crop.id, e);
                DispatchOutcome::Failed {
                    message: e.to_string(),
                }
            }
        }
    }
}
