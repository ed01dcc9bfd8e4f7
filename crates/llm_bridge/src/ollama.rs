//! Ollama HTTP API client

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Configuration for Ollama client
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    /// Base URL for Ollama API (default: http://localhost:11434)
    pub base_url: String,
    /// Request timeout in seconds; `None` waits for generation to finish
    pub timeout_secs: Option<u64>,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            timeout_secs: None,
        }
    }
}

/// Ollama API client
pub struct OllamaClient {
    config: OllamaConfig,
    client: reqwest::Client,
}

impl OllamaClient {
    /// Create a new Ollama client
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(std::time::Duration::from_secs(secs));
        }
        let client = builder.build().context("Failed to create HTTP client")?;

        Ok(Self { config, client })
    }

    /// Create a client with default configuration
    pub fn default_client() -> Result<Self> {
        Self::new(OllamaConfig::default())
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Send a chat request to Ollama
    ///
    /// The server applies the model's chat template to the messages.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let response = self
            .client
            .post(self.url("/api/chat"))
            .json(request)
            .send()
            .await
            .context("Failed to send request to Ollama")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama API error ({}): {}", status, error_text);
        }

        response
            .json()
            .await
            .context("Failed to parse Ollama chat response")
    }

    /// Send a completion request to Ollama
    pub async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        let response = self
            .client
            .post(self.url("/api/generate"))
            .json(request)
            .send()
            .await
            .context("Failed to send request to Ollama")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama API error ({}): {}", status, error_text);
        }

        response
            .json()
            .await
            .context("Failed to parse Ollama generate response")
    }

    /// Look up a locally available model
    pub async fn show(&self, model: &str) -> Result<ShowResponse> {
        let response = self
            .client
            .post(self.url("/api/show"))
            .json(&ShowRequest {
                model: model.to_string(),
            })
            .send()
            .await
            .context("Failed to send request to Ollama")?;

        if !response.status().is_success() {
            anyhow::bail!(
                "Model '{}' is not available on {} ({})",
                model,
                self.config.base_url,
                response.status()
            );
        }

        response
            .json()
            .await
            .context("Failed to parse Ollama show response")
    }

    /// Load a model's weights into memory without generating anything
    pub async fn load(&self, model: &str) -> Result<()> {
        let request = GenerateRequest {
            model: model.to_string(),
            prompt: None,
            images: None,
            raw: None,
            stream: Some(false),
            options: None,
        };
        let response = self.generate(&request).await?;
        if !response.done {
            anyhow::bail!("Ollama did not finish loading '{}'", model);
        }
        Ok(())
    }
}

/// Sampling options shared by chat and generate
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ModelOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Maximum number of tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
}

/// Chat request to Ollama
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<ModelOptions>,
}

/// A chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    /// Base64-encoded images attached to this message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

/// Chat response from Ollama
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub model: String,
    pub message: ChatMessage,
    pub done: bool,
    #[serde(flatten)]
    pub stats: EvalStats,
}

/// Completion request to Ollama
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
    /// Skip the model's prompt template
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<ModelOptions>,
}

/// Completion response from Ollama
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateResponse {
    pub model: String,
    #[serde(default)]
    pub response: String,
    pub done: bool,
    #[serde(flatten)]
    pub stats: EvalStats,
}

/// Token accounting reported with a finished response
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct EvalStats {
    #[serde(default)]
    pub prompt_eval_count: Option<u64>,
    #[serde(default)]
    pub eval_count: Option<u64>,
    /// Nanoseconds spent generating
    #[serde(default)]
    pub eval_duration: Option<u64>,
}

impl EvalStats {
    /// Generation throughput in tokens per second
    pub fn tokens_per_second(&self) -> f64 {
        match (self.eval_count, self.eval_duration) {
            (Some(count), Some(nanos)) if nanos > 0 => count as f64 / (nanos as f64 / 1e9),
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct ShowRequest {
    model: String,
}

/// Model description from `/api/show`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShowResponse {
    #[serde(default)]
    pub details: ModelDetails,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelDetails {
    #[serde(default)]
    pub family: Option<String>,
    #[serde(default)]
    pub parameter_size: Option<String>,
    #[serde(default)]
    pub quantization_level: Option<String>,
}

impl ModelDetails {
    /// Short human-readable summary, e.g. `qwen25vl 3.8B Q4_K_M`
    pub fn summary(&self) -> Option<String> {
        let parts: Vec<&str> = [
            self.family.as_deref(),
            self.parameter_size.as_deref(),
            self.quantization_level.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ollama_config_default() {
        let config = OllamaConfig::default();
        assert_eq!(config.base_url, "http://localhost:11434");
        assert_eq!(config.timeout_secs, None);
    }

    #[test]
    fn test_url_joining() {
        let client = OllamaClient::new(OllamaConfig {
            base_url: "http://gpu-box:11434/".to_string(),
            timeout_secs: Some(5),
        })
        .unwrap();
        assert_eq!(client.url("/api/chat"), "http://gpu-box:11434/api/chat");
    }

    #[test]
    fn test_chat_request_serialization() {
        let request = ChatRequest {
            model: "qwen2.5vl:3b".to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: "Hello".to_string(),
                images: Some(vec!["aGVsbG8=".to_string()]),
            }],
            stream: Some(false),
            options: Some(ModelOptions {
                temperature: Some(0.7),
                num_predict: Some(2000),
            }),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "qwen2.5vl:3b");
        assert_eq!(json["messages"][0]["images"][0], "aGVsbG8=");
        assert_eq!(json["options"]["num_predict"], 2000);
        assert_eq!(json["stream"], false);
    }

    #[test]
    fn test_load_request_omits_prompt() {
        let request = GenerateRequest {
            model: "qwen2.5vl:3b".to_string(),
            prompt: None,
            images: None,
            raw: None,
            stream: Some(false),
            options: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("prompt").is_none());
        assert!(json.get("options").is_none());
    }

    #[test]
    fn test_generate_response_stats() {
        let body = r#"{
            "model": "qwen2.5vl:3b",
            "created_at": "2025-01-01T00:00:00Z",
            "response": "{\"vendor_name\": \"Acme\"}",
            "done": true,
            "prompt_eval_count": 812,
            "eval_count": 120,
            "eval_duration": 2000000000
        }"#;
        let response: GenerateResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.stats.prompt_eval_count, Some(812));
        assert_eq!(response.stats.eval_count, Some(120));
        assert!((response.stats.tokens_per_second() - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_load_response_has_empty_text() {
        let body = r#"{"model": "qwen2.5vl:3b", "created_at": "2025-01-01T00:00:00Z", "response": "", "done": true}"#;
        let response: GenerateResponse = serde_json::from_str(body).unwrap();
        assert!(response.done);
        assert_eq!(response.stats.tokens_per_second(), 0.0);
    }

    #[test]
    fn test_model_details_summary() {
        let show: ShowResponse = serde_json::from_str(
            r#"{"details": {"family": "qwen25vl", "parameter_size": "3.8B", "quantization_level": "Q4_K_M"}}"#,
        )
        .unwrap();
        assert_eq!(show.details.summary().as_deref(), Some("qwen25vl 3.8B Q4_K_M"));
        assert_eq!(ModelDetails::default().summary(), None);
    }
}
