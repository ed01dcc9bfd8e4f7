//! Remote image download for `{"image_url": ...}` requests
//!
//! Single attempt with a bounded timeout; any failure is the client's
//! problem and is reported as a 400.

use core_pipeline::intake::{self, IntakeError, IntakeLimits, NormalizedImage};
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;

/// HTTP client used for image URLs
#[derive(Clone)]
pub struct ImageFetcher {
    client: reqwest::Client,
}

impl ImageFetcher {
    pub fn new(timeout_secs: u64) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { client })
    }

    /// Download, validate and normalize the image at `url`
    pub async fn fetch(
        &self,
        url: &str,
        limits: &IntakeLimits,
    ) -> Result<NormalizedImage, IntakeError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(IntakeError::MissingSource);
        }
        let parsed = reqwest::Url::parse(url).map_err(|e| IntakeError::FetchFailed {
            reason: format!("invalid URL: {e}"),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(IntakeError::FetchFailed {
                reason: format!("unsupported URL scheme '{}'", parsed.scheme()),
            });
        }

        tracing::info!(url = %parsed, "Fetching remote image");
        let mut response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(fetch_failed)?;

        if !response.status().is_success() {
            return Err(IntakeError::FetchFailed {
                reason: format!("server responded with {}", response.status()),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        intake::check_content_type(content_type.as_deref())?;

        let declared = response
            .content_length()
            .map(|len| usize::try_from(len).unwrap_or(usize::MAX));
        if let Some(declared) = declared {
            intake::check_size(declared, limits)?;
        }

        // Chunked responses carry no length; stop once the ceiling is crossed
        let mut bytes = Vec::with_capacity(declared.unwrap_or_default());
        while let Some(chunk) = response.chunk().await.map_err(fetch_failed)? {
            intake::check_size(bytes.len() + chunk.len(), limits)?;
            bytes.extend_from_slice(&chunk);
        }

        intake::accept_remote(content_type.as_deref(), &bytes, limits)
    }
}

fn fetch_failed(e: reqwest::Error) -> IntakeError {
    let reason = if e.is_timeout() {
        "request timed out".to_string()
    } else {
        e.to_string()
    };
    IntakeError::FetchFailed { reason }
}
