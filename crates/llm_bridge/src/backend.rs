//! Seam between the gateway and a concrete vision-language model

use crate::prompt::PromptStyle;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::borrow::Cow;
use std::path::Path;

/// How a backend wants to receive the image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageInput {
    /// A PNG file on disk
    File,
    /// PNG bytes in memory
    Memory,
}

/// The image as handed to [`VisionBackend::generate`]
#[derive(Debug, Clone, Copy)]
pub enum ImagePayload<'a> {
    File(&'a Path),
    Png(&'a [u8]),
}

impl ImagePayload<'_> {
    /// PNG bytes, reading the file if necessary
    pub async fn png_bytes(&self) -> Result<Cow<'_, [u8]>> {
        match self {
            ImagePayload::Png(bytes) => Ok(Cow::Borrowed(*bytes)),
            ImagePayload::File(path) => tokio::fs::read(path)
                .await
                .map(Cow::Owned)
                .with_context(|| format!("Failed to read staged image {}", path.display())),
        }
    }
}

/// One generation call
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub style: PromptStyle,
    pub image: ImagePayload<'a>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Text produced by the model plus throughput metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Generation {
    pub text: String,
    pub prompt_tokens: Option<u64>,
    pub generation_tokens: u64,
    /// Tokens per second during generation
    pub generation_tps: f64,
}

/// A model that has been loaded and is ready for generation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub name: String,
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// A vision-language model backend
#[async_trait]
pub trait VisionBackend: Send + Sync {
    /// Short identifier, e.g. `ollama`
    fn name(&self) -> &'static str;

    fn image_input(&self) -> ImageInput {
        ImageInput::Memory
    }

    /// Load (or verify) the named model; may take tens of seconds
    async fn load(&self, model: &str) -> Result<ModelInfo>;

    async fn generate(&self, request: GenerationRequest<'_>) -> Result<Generation>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_png_payload_is_borrowed() {
        let bytes = [0x89u8, b'P', b'N', b'G'];
        let payload = ImagePayload::Png(&bytes);
        let read = payload.png_bytes().await.unwrap();
        assert!(matches!(read, Cow::Borrowed(_)));
        assert_eq!(&*read, &bytes);
    }

    #[tokio::test]
    async fn test_file_payload_is_read() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"staged").unwrap();

        let payload = ImagePayload::File(file.path());
        assert_eq!(&*payload.png_bytes().await.unwrap(), b"staged");
    }

    #[tokio::test]
    async fn test_missing_file_payload_errors() {
        let payload = ImagePayload::File(Path::new("/nonexistent/receipt.png"));
        let err = payload.png_bytes().await.unwrap_err();
        assert!(err.to_string().contains("Failed to read staged image"));
    }
}
