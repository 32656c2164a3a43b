mod gemini_client;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::rewrite::RewriteRequest;

pub use gemini_client::{
    DEFAULT_API_BASE_URL, DEFAULT_DETECTION_MODEL, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_REWRITE_MODEL, GeminiClient, GeminiConfig,
};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("api key is not configured")]
    MissingApiKey,
    #[error("failed to build http client: {0}")]
    ClientBuild(String),
    #[error("network error: {0}")]
    Transport(String),
    #[error("{status}: {message}")]
    Api { status: String, message: String },
    #[error("response blocked by safety filters: {0}")]
    Blocked(String),
    #[error("failed to decode model response")]
    Decode(#[source] serde_json::Error),
}

/// Score/label pair as returned by the detection model, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DetectionPayload {
    #[serde(default, deserialize_with = "lenient_score")]
    pub score: Option<f64>,
    #[serde(default)]
    pub label: Option<String>,
}

fn lenient_score<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value.as_f64())
}

#[async_trait]
pub trait RewriteService: Send + Sync {
    fn is_configured(&self) -> bool;

    async fn rewrite(&self, request: &RewriteRequest) -> Result<String, ServiceError>;
}

#[async_trait]
pub trait DetectionService: Send + Sync {
    fn is_configured(&self) -> bool;

    async fn detect(&self, text: &str) -> Result<DetectionPayload, ServiceError>;
}
