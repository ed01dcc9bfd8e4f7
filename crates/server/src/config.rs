//! Server configuration
//!
//! Every setting can be given as an environment variable (optionally via a
//! `.env` file) or as a command-line flag.

use clap::builder::BoolishValueParser;
use clap::{Parser, ValueEnum};
use core_pipeline::intake::{IntakeLimits, DEFAULT_MAX_BYTES, DEFAULT_MAX_DIMENSION};
use llm_bridge::{CurrencyRule, GenerationSettings, PromptConfig, PromptStyle};
use std::fmt;

/// Which model backend serves generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// Local models served by Ollama
    Ollama,
    /// Hosted Google Gemini models
    Gemini,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Ollama => f.write_str("ollama"),
            BackendKind::Gemini => f.write_str("gemini"),
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "receiptscan-server")]
#[command(about = "Receipt and invoice extraction service backed by a vision-language model", long_about = None)]
pub struct Config {
    /// Address to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// Verbose logging
    #[arg(long, env = "DEBUG", value_parser = BoolishValueParser::new())]
    pub debug: bool,

    /// Model identifier passed to the backend
    #[arg(long, env = "MODEL_NAME", default_value = "qwen2.5vl:3b")]
    pub model_name: String,

    /// Maximum number of tokens to generate
    #[arg(long, env = "MAX_TOKENS", default_value_t = 2000)]
    pub max_tokens: u32,

    /// Sampling temperature
    #[arg(long, env = "TEMPERATURE", default_value_t = 0.7)]
    pub temperature: f32,

    /// Maximum image payload in bytes
    #[arg(long, env = "MAX_IMAGE_SIZE", default_value_t = DEFAULT_MAX_BYTES)]
    pub max_image_size: usize,

    /// Images are downscaled so neither side exceeds this many pixels
    #[arg(long, env = "MAX_IMAGE_DIMENSION", default_value_t = DEFAULT_MAX_DIMENSION)]
    pub max_image_dimension: u32,

    /// Model backend
    #[arg(long, env = "MODEL_BACKEND", value_enum, default_value_t = BackendKind::Ollama)]
    pub backend: BackendKind,

    /// Base URL of the Ollama API
    #[arg(long, env = "OLLAMA_URL", default_value = "http://localhost:11434")]
    pub ollama_url: String,

    /// API key for the Gemini backend
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    /// Prompt framing: plain (no chat template) or chat
    #[arg(long, env = "PROMPT_STYLE", default_value = "plain")]
    pub prompt_style: PromptStyle,

    /// Currency code forced on monetary fields, or "auto" to read it from the receipt
    #[arg(long, env = "PROMPT_CURRENCY", default_value = "IDR")]
    pub prompt_currency: CurrencyRule,

    /// Load the model at startup instead of on the first request
    #[arg(long, env = "PRELOAD_MODEL", value_parser = BoolishValueParser::new())]
    pub preload_model: bool,

    /// Timeout for downloading images given by URL
    #[arg(long, env = "URL_FETCH_TIMEOUT_SECS", default_value_t = 10)]
    pub url_fetch_timeout_secs: u64,
}

impl Config {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn intake_limits(&self) -> IntakeLimits {
        IntakeLimits {
            max_bytes: self.max_image_size,
            max_dimension: self.max_image_dimension,
        }
    }

    pub fn generation_settings(&self) -> GenerationSettings {
        GenerationSettings {
            model_name: self.model_name.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            prompt: PromptConfig {
                style: self.prompt_style,
                currency: self.prompt_currency.clone(),
            },
        }
    }

    /// Request body ceiling: the image limit plus room for multipart framing
    pub fn body_limit(&self) -> usize {
        self.max_image_size.saturating_add(1024 * 1024)
    }

    /// Default tracing filter when `RUST_LOG` is not set
    pub fn log_filter(&self) -> &'static str {
        if self.debug {
            "debug"
        } else {
            "info"
        }
    }
}

/// Built-in defaults, independent of the process environment
#[cfg(test)]
impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            debug: false,
            model_name: "qwen2.5vl:3b".to_string(),
            max_tokens: 2000,
            temperature: 0.7,
            max_image_size: DEFAULT_MAX_BYTES,
            max_image_dimension: DEFAULT_MAX_DIMENSION,
            backend: BackendKind::Ollama,
            ollama_url: "http://localhost:11434".to_string(),
            gemini_api_key: None,
            prompt_style: PromptStyle::Plain,
            prompt_currency: CurrencyRule::Fixed("IDR".to_string()),
            preload_model: false,
            url_fetch_timeout_secs: 10,
        }
    }
}
