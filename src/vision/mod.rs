pub mod client;
pub mod prompts;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use crate::capture::{CapturedImage, ImageFormat};
use crate::config::{ConfigSection, VisionConfig};
use crate::error::{ConfigError, VisionError};

pub use client::VisionClient;
pub use prompts::QueryPrompt;

/// Image handed to a vision model.
#[derive(Clone, Debug)]
pub enum ImageRef {
    Inline { bytes: Vec<u8>, format: ImageFormat },
    Url(String),
}

impl ImageRef {
    pub fn from_capture(image: &CapturedImage) -> Self {
        ImageRef::Inline {
            bytes: image.bytes.clone(),
            format: image.format,
        }
    }

    /// URL as sent to the API; inline images become base64 `data:` URIs.
    pub fn to_url(&self) -> String {
        match self {
            ImageRef::Inline { bytes, format } => {
                format!("data:{};base64,{}", format.mime(), STANDARD.encode(bytes))
            }
            ImageRef::Url(url) => url.clone(),
        }
    }
}

/// Vision-language model able to read the client's screens.
#[async_trait]
pub trait VisionExtractor: Send + Sync {
    fn name(&self) -> &str;

    async fn analyze_text(&self, image: &ImageRef, prompt: &str) -> Result<String, VisionError>;

    /// Parsed JSON object. `schema`, when given, is sent as a strict response schema.
    async fn analyze_json(&self, image: &ImageRef, prompt: &str, schema: Option<&Value>) -> Result<Value, VisionError>;
}

/// Whether screenshots are interpreted at all. Chosen once from config.
#[derive(Clone)]
pub enum Extraction {
    Present(Arc<dyn VisionExtractor>),
    Absent,
}

impl Extraction {
    /// `vision.enabled` without a resolvable API key is an error, not a silent fallback.
    pub fn from_config(config: &VisionConfig) -> Result<Self, ConfigError> {
        if !config.enabled {
            info!("👁️ [VISION] Extraction disabled");
            return Ok(Extraction::Absent);
        }
        let api_key = config.resolve_api_key().ok_or_else(|| {
            ConfigError::invalid(
                ConfigSection::Vision,
                "enabled but no API key (set DASHSCOPE_API_KEY or vision.api_key)",
            )
        })?;
        let client = VisionClient::from_config(config, api_key)
            .map_err(|e| ConfigError::invalid(ConfigSection::Vision, e.to_string()))?;
        info!("👁️ [VISION] Using {} at {}", config.model, config.base_url());
        Ok(Extraction::Present(Arc::new(client)))
    }

    pub fn extractor(&self) -> Option<&Arc<dyn VisionExtractor>> {
        match self {
            Extraction::Present(e) => Some(e),
            Extraction::Absent => None,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Extraction::Present(_))
    }
}

/// Parses a JSON object out of a model answer that may wrap it in prose or
/// code fences (outermost braces win).
pub fn extract_json(text: &str) -> Result<Value, VisionError> {
    let start = text.find('{');
    let end = text.rfind('}');
    let slice = match (start, end) {
        (Some(s), Some(e)) if s < e => &text[s..=e],
        _ => return Err(VisionError::Malformed(format!("no JSON object in: {}", preview(text)))),
    };
    let value: Value =
        serde_json::from_str(slice).map_err(|e| VisionError::Malformed(format!("{}: {}", e, preview(text))))?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(VisionError::Malformed(format!("expected an object: {}", preview(text))))
    }
}

fn preview(text: &str) -> String {
    text.chars().take(120).collect()
}
