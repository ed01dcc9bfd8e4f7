//! Google Gemini vision backend
//!
//! Sends the receipt image inline with the instruction to Gemini's
//! `generateContent` endpoint and returns the text answer.

use crate::backend::{Generation, GenerationRequest, ModelInfo, VisionBackend};
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use std::time::Instant;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Configuration for Gemini API client
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API key for Google Gemini
    pub api_key: String,
    /// Base URL of the REST API
    pub base_url: String,
    /// Request timeout in seconds; `None` waits for generation to finish
    pub timeout_secs: Option<u64>,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: API_BASE.to_string(),
            timeout_secs: None,
        }
    }

    /// Create config from environment variable
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .context("GEMINI_API_KEY environment variable not set")?;
        Ok(Self::new(api_key))
    }
}

/// Gemini API client for receipt reading
pub struct GeminiVision {
    config: GeminiConfig,
    client: reqwest::Client,
}

impl GeminiVision {
    /// Create a new Gemini client
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(std::time::Duration::from_secs(secs));
        }
        let client = builder.build().context("Failed to create HTTP client")?;

        Ok(Self { config, client })
    }

    /// Create client from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(GeminiConfig::from_env()?)
    }

    fn model_url(&self, model: &str) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!("{}/models/{}", self.config.base_url.trim_end_matches('/'), model)
    }
}

#[async_trait]
impl VisionBackend for GeminiVision {
    fn name(&self) -> &'static str {
        "gemini"
    }

    /// Gemini models are hosted; loading only confirms the model exists
    async fn load(&self, model: &str) -> Result<ModelInfo> {
        let response = self
            .client
            .get(self.model_url(model))
            .header("x-goog-api-key", &self.config.api_key)
            .send()
            .await
            .context("Failed to send request to Gemini API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Gemini model lookup failed ({}): {}", status, error_text);
        }

        let model_response: GeminiModel = response
            .json()
            .await
            .context("Failed to parse Gemini model description")?;

        Ok(ModelInfo {
            name: model.to_string(),
            backend: self.name().to_string(),
            details: model_response.display_name,
        })
    }

    async fn generate(&self, request: GenerationRequest<'_>) -> Result<Generation> {
        let png = request.image.png_bytes().await?;
        let body = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![
                    GeminiPart::Text {
                        text: request.prompt.to_string(),
                    },
                    GeminiPart::InlineData {
                        inline_data: InlineData {
                            mime_type: "image/png".to_string(),
                            data: general_purpose::STANDARD.encode(&png),
                        },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            },
        };

        let started = Instant::now();
        let response = self
            .client
            .post(format!("{}:generateContent", self.model_url(request.model)))
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .context("Failed to send request to Gemini API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Gemini API error ({}): {}", status, error_text);
        }

        let gemini_response: GeminiResponse = response
            .json()
            .await
            .context("Failed to parse Gemini response")?;

        into_generation(gemini_response, started.elapsed().as_secs_f64())
    }
}

fn into_generation(response: GeminiResponse, elapsed_secs: f64) -> Result<Generation> {
    let text: String = response
        .candidates
        .first()
        .map(|candidate| {
            candidate
                .content
                .parts
                .iter()
                .filter_map(|part| part.text.as_deref())
                .collect()
        })
        .unwrap_or_default();

    if text.is_empty() {
        anyhow::bail!("No text in Gemini response");
    }

    let usage = response.usage_metadata.unwrap_or_default();
    let generation_tokens = usage.candidates_token_count.unwrap_or_default();
    let generation_tps = if elapsed_secs > 0.0 {
        generation_tokens as f64 / elapsed_secs
    } else {
        0.0
    };

    Ok(Generation {
        text,
        prompt_tokens: usage.prompt_token_count,
        generation_tokens,
        generation_tps,
    })
}

/// Gemini API request structure
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

/// Gemini API response structure
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: Option<u64>,
    #[serde(default)]
    candidates_token_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiModel {
    #[serde(default)]
    display_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> GeminiConfig {
        GeminiConfig::new("test-key")
    }

    #[test]
    fn test_gemini_config_default() {
        let config = test_config();
        assert_eq!(config.api_key, "test-key");
        assert_eq!(config.base_url, API_BASE);
        assert_eq!(config.timeout_secs, None);
    }

    #[test]
    fn test_model_url_accepts_prefixed_names() {
        let client = GeminiVision::new(test_config()).unwrap();
        assert_eq!(
            client.model_url("models/gemini-2.5-flash"),
            client.model_url("gemini-2.5-flash")
        );
        assert!(client.model_url("gemini-2.5-flash").ends_with("/models/gemini-2.5-flash"));
    }

    #[test]
    fn test_request_serialization() {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![
                    GeminiPart::Text {
                        text: "Read this receipt".to_string(),
                    },
                    GeminiPart::InlineData {
                        inline_data: InlineData {
                            mime_type: "image/png".to_string(),
                            data: "aGVsbG8=".to_string(),
                        },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                temperature: 0.5,
                max_output_tokens: 2000,
            },
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "Read this receipt");
        assert_eq!(json["contents"][0]["parts"][1]["inline_data"]["mime_type"], "image/png");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 2000);
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{
            "candidates": [{"content": {"role": "model", "parts": [
                {"text": "```json\n{\"vendor_name\": "},
                {"text": "\"Acme\"}\n```"}
            ]}}],
            "usageMetadata": {"promptTokenCount": 300, "candidatesTokenCount": 40}
        }"#;
        let response: GeminiResponse = serde_json::from_str(body).unwrap();
        let generation = into_generation(response, 2.0).unwrap();

        assert_eq!(generation.text, "```json\n{\"vendor_name\": \"Acme\"}\n```");
        assert_eq!(generation.prompt_tokens, Some(300));
        assert_eq!(generation.generation_tokens, 40);
        assert!((generation.generation_tps - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_response_is_an_error() {
        let response: GeminiResponse = serde_json::from_str(r#"{"candidates": []}"#).unwrap();
        assert!(into_generation(response, 1.0).is_err());
    }

    // Requires GEMINI_API_KEY and makes a billable API call
    // Run with: cargo test -p llm_bridge test_gemini_load_integration -- --ignored
    #[tokio::test]
    #[ignore]
    async fn test_gemini_load_integration() {
        let backend = GeminiVision::from_env().unwrap();
        let info = backend.load("gemini-2.5-flash").await.unwrap();
        assert_eq!(info.backend, "gemini");
    }
}
