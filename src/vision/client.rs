use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImageArgs,
        ChatCompletionRequestMessageContentPartTextArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContentPart,
        CreateChatCompletionRequestArgs, ImageDetail, ImageUrlArgs, ResponseFormat, ResponseFormatJsonSchema,
    },
    Client,
};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

use super::{extract_json, ImageRef, VisionExtractor};
use crate::config::VisionConfig;
use crate::error::VisionError;

/// DashScope (OpenAI-compatible) vision client.
#[derive(Clone)]
pub struct VisionClient {
    client: Client<OpenAIConfig>,
    model: String,
    timeout: Duration,
}

impl VisionClient {
    pub fn new(api_key: String, base_url: String, model: String, timeout: Duration) -> Result<Self, VisionError> {
        let config = OpenAIConfig::new().with_api_key(api_key).with_api_base(base_url);
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VisionError::Api(format!("http client: {}", e)))?;
        let client = Client::with_config(config).with_http_client(http);
        Ok(Self { client, model, timeout })
    }

    pub fn from_config(config: &VisionConfig, api_key: String) -> Result<Self, VisionError> {
        Self::new(
            api_key,
            config.base_url(),
            config.model.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    async fn complete(
        &self,
        image: &ImageRef,
        prompt: &str,
        response_format: Option<ResponseFormat>,
    ) -> Result<String, VisionError> {
        let parts: Vec<ChatCompletionRequestUserMessageContentPart> = vec![
            ChatCompletionRequestMessageContentPartImageArgs::default()
                .image_url(ImageUrlArgs::default().url(image.to_url()).detail(ImageDetail::High).build()?)
                .build()?
                .into(),
            ChatCompletionRequestMessageContentPartTextArgs::default()
                .text(prompt)
                .build()?
                .into(),
        ];

        let message: ChatCompletionRequestMessage =
            ChatCompletionRequestUserMessageArgs::default().content(parts).build()?.into();

        let mut request = CreateChatCompletionRequestArgs::default();
        request.model(&self.model).messages(vec![message]);
        if let Some(format) = response_format {
            request.response_format(format);
        }
        let request = request.build()?;

        info!("👁️ [VISION] Sending screenshot to {}...", self.model);
        let response = tokio::time::timeout(self.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| VisionError::Timeout(self.timeout))??;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| VisionError::Malformed("empty completion".to_string()))?;

        info!("👁️ [VISION] Response received ({} chars)", content.len());
        Ok(content)
    }
}

#[async_trait]
impl VisionExtractor for VisionClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn analyze_text(&self, image: &ImageRef, prompt: &str) -> Result<String, VisionError> {
        self.complete(image, prompt, None).await
    }

    async fn analyze_json(&self, image: &ImageRef, prompt: &str, schema: Option<&Value>) -> Result<Value, VisionError> {
        let format = match schema {
            Some(schema) => ResponseFormat::JsonSchema {
                json_schema: ResponseFormatJsonSchema {
                    description: None,
                    name: "extraction".to_string(),
                    schema: Some(schema.clone()),
                    strict: Some(true),
                },
            },
            None => ResponseFormat::JsonObject,
        };
        let content = self.complete(image, prompt, Some(format)).await?;
        extract_json(&content).inspect_err(|e| warn!("⚠️ [VISION] Unparseable answer: {}", e))
    }
}
