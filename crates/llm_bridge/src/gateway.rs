//! Model gateway
//!
//! Owns the single shared model handle. The handle is created on first use
//! behind a one-time initialization guard: concurrent first requests wait
//! on the same load instead of loading the weights twice. A failed load
//! leaves the guard empty, so a later request tries again.

use crate::backend::{Generation, GenerationRequest, ModelInfo, VisionBackend};
use crate::prompt::PromptConfig;
use crate::staging::StagedImage;
use core_pipeline::NormalizedImage;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{error, info};

/// Server-side generation parameters; not adjustable per request
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub model_name: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub prompt: PromptConfig,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model_name: "qwen2.5vl:3b".to_string(),
            max_tokens: 2000,
            temperature: 0.7,
            prompt: PromptConfig::default(),
        }
    }
}

/// Gateway failures
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The model could not be loaded
    #[error("Model initialization failed for '{model}': {reason}")]
    ModelUnavailable { model: String, reason: String },

    /// The image could not be prepared for the backend
    #[error("Failed to stage image: {0}")]
    Staging(#[from] std::io::Error),

    /// The backend failed while generating
    #[error("{0}")]
    Generation(String),
}

/// Shared entry point to the vision-language model
pub struct ModelGateway {
    backend: Arc<dyn VisionBackend>,
    settings: GenerationSettings,
    prompt: String,
    handle: OnceCell<ModelInfo>,
}

impl ModelGateway {
    pub fn new(backend: Arc<dyn VisionBackend>, settings: GenerationSettings) -> Self {
        let prompt = settings.prompt.render();
        Self {
            backend,
            settings,
            prompt,
            handle: OnceCell::new(),
        }
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Whether the model handle has been initialized
    pub fn is_loaded(&self) -> bool {
        self.handle.initialized()
    }

    /// Load the model if this is the first use
    pub async fn ensure_loaded(&self) -> Result<&ModelInfo, GatewayError> {
        let model = &self.settings.model_name;
        self.handle
            .get_or_try_init(|| async {
                info!(model = %model, backend = self.backend.name(), "Loading model");
                match self.backend.load(model).await {
                    Ok(info) => {
                        info!(model = %model, details = ?info.details, "Model loaded successfully");
                        Ok(info)
                    }
                    Err(e) => {
                        error!(model = %model, error = %format!("{e:#}"), "Failed to load model");
                        Err(GatewayError::ModelUnavailable {
                            model: model.clone(),
                            reason: format!("{e:#}"),
                        })
                    }
                }
            })
            .await
    }

    /// Run the extraction prompt against an image
    ///
    /// The staged image, including any temporary file, is released before
    /// this returns, whichever way it returns.
    pub async fn generate(&self, image: &NormalizedImage) -> Result<Generation, GatewayError> {
        self.ensure_loaded().await?;

        let staged = StagedImage::stage(image, self.backend.image_input())?;
        let request = GenerationRequest {
            model: &self.settings.model_name,
            prompt: &self.prompt,
            style: self.settings.prompt.style,
            image: staged.payload(),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };

        info!(
            max_tokens = self.settings.max_tokens,
            style = %self.settings.prompt.style,
            image_hash = %image.content_hash,
            "Generating response from model"
        );
        let generation = self.backend.generate(request).await.map_err(|e| {
            error!(error = %format!("{e:#}"), "Model inference failed");
            GatewayError::Generation(format!("{e:#}"))
        })?;

        info!(
            tokens = generation.generation_tokens,
            tps = %format!("{:.1}", generation.generation_tps),
            "Model generated response"
        );
        Ok(generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ImageInput, ImagePayload};
    use async_trait::async_trait;
    use core_pipeline::intake::{decode_and_normalize, IntakeLimits};
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
    use std::io::Cursor;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct StubBackend {
        loads: AtomicUsize,
        fail_loads: AtomicUsize,
        fail_generation: bool,
        input: Option<ImageInput>,
        seen_path: Mutex<Option<PathBuf>>,
    }

    #[async_trait]
    impl VisionBackend for StubBackend {
        fn name(&self) -> &'static str {
            "stub"
        }

        fn image_input(&self) -> ImageInput {
            self.input.unwrap_or(ImageInput::Memory)
        }

        async fn load(&self, model: &str) -> anyhow::Result<ModelInfo> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.fail_loads.load(Ordering::SeqCst) > 0 {
                self.fail_loads.fetch_sub(1, Ordering::SeqCst);
                anyhow::bail!("weights not found");
            }
            Ok(ModelInfo {
                name: model.to_string(),
                backend: "stub".to_string(),
                details: None,
            })
        }

        async fn generate(&self, request: GenerationRequest<'_>) -> anyhow::Result<Generation> {
            if let ImagePayload::File(path) = request.image {
                assert!(path.exists());
                *self.seen_path.lock().unwrap() = Some(path.to_path_buf());
            }
            if self.fail_generation {
                anyhow::bail!("out of memory");
            }
            Ok(Generation {
                text: format!("```json\n{{\"model\": \"{}\"}}\n```", request.model),
                prompt_tokens: Some(10),
                generation_tokens: 8,
                generation_tps: 4.0,
            })
        }
    }

    fn sample_image() -> NormalizedImage {
        let img = ImageBuffer::from_pixel(8, 8, Rgb([200u8, 200u8, 200u8]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        decode_and_normalize(&bytes, &IntakeLimits::default()).unwrap()
    }

    fn gateway(backend: Arc<StubBackend>) -> ModelGateway {
        ModelGateway::new(backend, GenerationSettings::default())
    }

    #[tokio::test]
    async fn test_not_loaded_until_first_use() {
        let backend = Arc::new(StubBackend::default());
        let gateway = gateway(backend.clone());
        assert!(!gateway.is_loaded());

        let generation = gateway.generate(&sample_image()).await.unwrap();
        assert!(generation.text.contains("qwen2.5vl:3b"));
        assert!(gateway.is_loaded());
        assert_eq!(gateway.ensure_loaded().await.unwrap().name, "qwen2.5vl:3b");
        assert_eq!(backend.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handle_is_reused() {
        let backend = Arc::new(StubBackend::default());
        let gateway = gateway(backend.clone());

        for _ in 0..3 {
            gateway.generate(&sample_image()).await.unwrap();
        }
        assert_eq!(backend.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_first_requests_load_once() {
        let backend = Arc::new(StubBackend::default());
        let gateway = Arc::new(gateway(backend.clone()));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let gateway = gateway.clone();
                tokio::spawn(async move { gateway.ensure_loaded().await.map(|_| ()) })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(backend.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_load_is_retried_later() {
        let backend = Arc::new(StubBackend {
            fail_loads: AtomicUsize::new(1),
            ..StubBackend::default()
        });
        let gateway = gateway(backend.clone());

        let err = gateway.generate(&sample_image()).await.unwrap_err();
        assert!(matches!(err, GatewayError::ModelUnavailable { .. }));
        assert!(err.to_string().contains("weights not found"));
        assert!(!gateway.is_loaded());

        gateway.generate(&sample_image()).await.unwrap();
        assert!(gateway.is_loaded());
        assert_eq!(backend.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_temp_file_removed_after_success() {
        let backend = Arc::new(StubBackend {
            input: Some(ImageInput::File),
            ..StubBackend::default()
        });
        let gateway = gateway(backend.clone());

        gateway.generate(&sample_image()).await.unwrap();
        let path = backend.seen_path.lock().unwrap().clone().unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_temp_file_removed_after_generation_failure() {
        let backend = Arc::new(StubBackend {
            input: Some(ImageInput::File),
            fail_generation: true,
            ..StubBackend::default()
        });
        let gateway = gateway(backend.clone());

        let err = gateway.generate(&sample_image()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Generation(ref msg) if msg == "out of memory"));
        let path = backend.seen_path.lock().unwrap().clone().unwrap();
        assert!(!path.exists());
    }
}
