//! Ollama-hosted vision model backend

use crate::backend::{Generation, GenerationRequest, ModelInfo, VisionBackend};
use crate::ollama::{
    ChatMessage, ChatRequest, EvalStats, GenerateRequest, ModelOptions, OllamaClient,
};
use crate::prompt::PromptStyle;
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};

/// Placeholder the Ollama runner replaces with the first attached image
const RAW_IMAGE_TAG: &str = "[img-0]";

/// Vision model served by a local Ollama instance
pub struct OllamaVision {
    client: OllamaClient,
}

impl OllamaVision {
    pub fn new(client: OllamaClient) -> Self {
        Self { client }
    }

    /// Backend talking to Ollama on its default address
    pub fn default_backend() -> Result<Self> {
        Ok(Self::new(OllamaClient::default_client()?))
    }
}

#[async_trait]
impl VisionBackend for OllamaVision {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn load(&self, model: &str) -> Result<ModelInfo> {
        let show = self.client.show(model).await?;
        self.client
            .load(model)
            .await
            .with_context(|| format!("Failed to load '{}' into Ollama", model))?;

        Ok(ModelInfo {
            name: model.to_string(),
            backend: self.name().to_string(),
            details: show.details.summary(),
        })
    }

    async fn generate(&self, request: GenerationRequest<'_>) -> Result<Generation> {
        let png = request.image.png_bytes().await?;
        let image_b64 = general_purpose::STANDARD.encode(&png);
        let options = Some(ModelOptions {
            temperature: Some(request.temperature),
            num_predict: Some(request.max_tokens),
        });

        let (text, stats) = match request.style {
            PromptStyle::Chat => {
                let response = self
                    .client
                    .chat(&chat_request(&request, image_b64, options))
                    .await?;
                (response.message.content, response.stats)
            }
            PromptStyle::Plain => {
                let response = self
                    .client
                    .generate(&plain_request(&request, image_b64, options))
                    .await?;
                (response.response, response.stats)
            }
        };

        Ok(to_generation(text, stats))
    }
}

/// User turn rendered through the model's chat template
fn chat_request(
    request: &GenerationRequest<'_>,
    image_b64: String,
    options: Option<ModelOptions>,
) -> ChatRequest {
    ChatRequest {
        model: request.model.to_string(),
        messages: vec![ChatMessage {
            role: "user".to_string(),
            content: request.prompt.to_string(),
            images: Some(vec![image_b64]),
        }],
        stream: Some(false),
        options,
    }
}

/// Bare prompt with no template
///
/// Raw mode skips the template that would place the image, so the prompt
/// names it with the runner's `[img-0]` tag itself.
fn plain_request(
    request: &GenerationRequest<'_>,
    image_b64: String,
    options: Option<ModelOptions>,
) -> GenerateRequest {
    GenerateRequest {
        model: request.model.to_string(),
        prompt: Some(format!("{RAW_IMAGE_TAG}\n{}", request.prompt)),
        images: Some(vec![image_b64]),
        raw: Some(true),
        stream: Some(false),
        options,
    }
}

fn to_generation(text: String, stats: EvalStats) -> Generation {
    Generation {
        text,
        prompt_tokens: stats.prompt_eval_count,
        generation_tokens: stats.eval_count.unwrap_or_default(),
        generation_tps: stats.tokens_per_second(),
    }
}
