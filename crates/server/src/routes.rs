//! HTTP routes
//!
//! - `GET /health` reports whether the model has been loaded
//! - `GET /models` lists the configured model and suggestions
//! - `POST /extract` turns a receipt image into JSON

use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    extract::{
        multipart::MultipartError, DefaultBodyLimit, FromRequest, Multipart, Request, State,
    },
    http::{header::CONTENT_TYPE, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use core_pipeline::{extract_json_object, intake, IntakeError, IntakeLimits, NormalizedImage};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

/// Models known to read receipts reasonably well
pub const RECOMMENDED_MODELS: [&str; 4] = [
    "qwen2.5vl:3b",
    "qwen2.5vl:7b",
    "llava:7b",
    "llama3.2-vision:11b",
];

pub fn router(state: AppState) -> Router {
    let body_limit = state.config().body_limit();

    Router::new()
        .route("/health", get(health_check))
        .route("/models", get(list_models))
        .route("/extract", post(extract_receipt))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    model: String,
    model_loaded: bool,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        model: state.config().model_name.clone(),
        model_loaded: state.gateway().is_loaded(),
    })
}

#[derive(Debug, Serialize)]
struct ModelsResponse {
    current_model: String,
    backend: &'static str,
    max_tokens: u32,
    temperature: f32,
    prompt_style: String,
    recommended_models: Vec<&'static str>,
}

async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    let settings = state.gateway().settings();
    Json(ModelsResponse {
        current_model: settings.model_name.clone(),
        backend: state.gateway().backend_name(),
        max_tokens: settings.max_tokens,
        temperature: settings.temperature,
        prompt_style: settings.prompt.style.to_string(),
        recommended_models: RECOMMENDED_MODELS.to_vec(),
    })
}

#[derive(Debug, Deserialize)]
struct UrlRequest {
    #[serde(default)]
    image_url: Option<String>,
}

async fn extract_receipt(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<serde_json::Value>, ApiError> {
    let request_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("extract", %request_id);

    async move {
        let image = receive_image(&state, request).await?;
        tracing::info!(
            width = image.width(),
            height = image.height(),
            original_width = image.original_size.0,
            original_height = image.original_size.1,
            bytes = image.source_bytes,
            hash = %image.content_hash,
            "Image accepted"
        );

        let generation = state.gateway().generate(&image).await?;

        match extract_json_object(&generation.text) {
            Ok(result) => {
                if result.is_empty() {
                    tracing::warn!("Model returned an empty JSON object");
                }
                let receipt = result.to_receipt();
                tracing::info!(
                    fields = result.len(),
                    vendor = receipt.vendor_name.as_deref().unwrap_or("unknown"),
                    items = receipt.items.len(),
                    total_due = ?receipt.total_due,
                    "Successfully extracted receipt data"
                );
                Ok(Json(result.into_value()))
            }
            Err(source) => Err(ApiError::Extraction {
                source,
                raw_response: generation.text,
            }),
        }
    }
    .instrument(span)
    .await
}

/// Read the image from a multipart upload or a JSON `image_url`
async fn receive_image(state: &AppState, request: Request) -> Result<NormalizedImage, ApiError> {
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(request, state)
            .await
            .map_err(|e| IntakeError::InvalidBody {
                reason: e.body_text(),
            })?;
        receive_upload(state, multipart).await
    } else if content_type.starts_with("application/json") {
        let Json(body) = Json::<UrlRequest>::from_request(request, state)
            .await
            .map_err(|e| IntakeError::InvalidBody {
                reason: e.body_text(),
            })?;
        let url = body.image_url.ok_or(IntakeError::MissingSource)?;
        Ok(state.fetcher().fetch(&url, state.limits()).await?)
    } else {
        Err(IntakeError::MissingSource.into())
    }
}

async fn receive_upload(
    state: &AppState,
    mut multipart: Multipart,
) -> Result<NormalizedImage, ApiError> {
    let limits = state.limits();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| upload_failed(e, 0, limits))?
    {
        if field.name() != Some("image") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        intake::check_filename(&filename)?;

        // Stop reading as soon as the ceiling is crossed
        let mut bytes = Vec::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| upload_failed(e, bytes.len(), limits))?
        {
            intake::check_size(bytes.len() + chunk.len(), limits)?;
            bytes.extend_from_slice(&chunk);
        }

        return Ok(intake::accept_upload(&filename, &bytes, limits)?);
    }

    Err(IntakeError::MissingSource.into())
}

/// A request body cut off by the body limit is an oversized upload
fn upload_failed(err: MultipartError, received: usize, limits: &IntakeLimits) -> IntakeError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        IntakeError::TooLarge {
            size: received,
            max: limits.max_bytes,
        }
    } else {
        IntakeError::UploadFailed {
            reason: err.body_text(),
        }
    }
}
