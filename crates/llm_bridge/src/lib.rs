//! LLM Bridge for vision-language models
//!
//! Provides the model gateway used to read receipts: a lazily loaded,
//! shared model handle in front of a pluggable backend. Backends are
//! provided for local models via the Ollama HTTP API and for hosted
//! Gemini models.
//!
//! Copyright (c) 2025 Michael A Wright

pub mod backend;
pub mod gateway;
pub mod gemini;
pub mod ollama;
pub mod prompt;
pub mod staging;
pub mod vision;

pub use backend::{
    Generation, GenerationRequest, ImageInput, ImagePayload, ModelInfo, VisionBackend,
};
pub use gateway::{GatewayError, GenerationSettings, ModelGateway};
pub use gemini::{GeminiConfig, GeminiVision};
pub use ollama::{OllamaClient, OllamaConfig};
pub use prompt::{CurrencyRule, PromptConfig, PromptStyle};
pub use vision::OllamaVision;
