//! Image intake
//!
//! Validates an incoming receipt image and normalizes it for the model:
//! - Source checks (filename extension for uploads, content type for URLs)
//! - Byte-size ceiling
//! - Decoding
//! - Conversion to 8-bit RGB
//! - Downscaling so the longest side fits the configured dimension

use image::{imageops::FilterType, DynamicImage, ImageFormat};
use sha2::{Digest, Sha256};
use std::io::Cursor;
use thiserror::Error;

/// Upload extensions accepted by [`accept_upload`]
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];

/// Default byte ceiling: 10 MiB
pub const DEFAULT_MAX_BYTES: usize = 10 * 1024 * 1024;

/// Default longest side after normalization
pub const DEFAULT_MAX_DIMENSION: u32 = 1024;

/// Limits applied to every incoming image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntakeLimits {
    /// Maximum payload size in bytes
    pub max_bytes: usize,
    /// Maximum width or height after normalization
    pub max_dimension: u32,
}

impl Default for IntakeLimits {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }
}

/// Rejection of an incoming image
///
/// Every variant is a client error.
#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("No image file provided")]
    MissingSource,

    #[error("No file selected")]
    NoFileSelected,

    #[error("File type not allowed. Allowed types: {}", ALLOWED_EXTENSIONS.join(", "))]
    DisallowedExtension { filename: String },

    #[error("URL does not point to an image (content type: {content_type})")]
    NotAnImage { content_type: String },

    #[error("File too large. Max size: {max} bytes")]
    TooLarge { size: usize, max: usize },

    #[error("Failed to fetch image URL: {reason}")]
    FetchFailed { reason: String },

    #[error("Invalid request body: {reason}")]
    InvalidBody { reason: String },

    #[error("Failed to read uploaded file: {reason}")]
    UploadFailed { reason: String },

    #[error("Invalid image file")]
    InvalidImage(#[source] image::ImageError),
}

/// A decoded image ready for the model
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    /// RGB pixels, downscaled if needed
    pub image: DynamicImage,
    /// Size of the payload as received
    pub source_bytes: usize,
    /// Dimensions before downscaling
    pub original_size: (u32, u32),
    /// SHA-256 of the normalized pixels, for log correlation
    pub content_hash: String,
}

impl NormalizedImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Encode as PNG
    pub fn to_png(&self) -> Result<Vec<u8>, image::ImageError> {
        let mut png_bytes = Vec::new();
        self.image
            .write_to(&mut Cursor::new(&mut png_bytes), ImageFormat::Png)?;
        Ok(png_bytes)
    }
}

/// Accept a multipart upload
pub fn accept_upload(
    filename: &str,
    bytes: &[u8],
    limits: &IntakeLimits,
) -> Result<NormalizedImage, IntakeError> {
    check_filename(filename)?;
    check_size(bytes.len(), limits)?;

    tracing::info!(filename, size = bytes.len(), "Processing uploaded image");
    decode_and_normalize(bytes, limits)
}

/// Accept an image downloaded from a URL
pub fn accept_remote(
    content_type: Option<&str>,
    bytes: &[u8],
    limits: &IntakeLimits,
) -> Result<NormalizedImage, IntakeError> {
    check_content_type(content_type)?;
    check_size(bytes.len(), limits)?;

    tracing::info!(size = bytes.len(), "Processing remote image");
    decode_and_normalize(bytes, limits)
}

/// Upload filename must be present and carry an allowed extension
///
/// Checked before any bytes are read.
pub fn check_filename(filename: &str) -> Result<(), IntakeError> {
    if filename.is_empty() {
        return Err(IntakeError::NoFileSelected);
    }
    if !is_allowed_filename(filename) {
        return Err(IntakeError::DisallowedExtension {
            filename: filename.to_string(),
        });
    }
    Ok(())
}

/// True when the filename has an allowed extension (case-insensitive)
pub fn is_allowed_filename(filename: &str) -> bool {
    match filename.rsplit_once('.') {
        Some((_, ext)) => ALLOWED_EXTENSIONS
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(ext)),
        None => false,
    }
}

/// Content type must start with `image/`
pub fn check_content_type(content_type: Option<&str>) -> Result<(), IntakeError> {
    let content_type = content_type.unwrap_or_default();
    if content_type.trim().to_ascii_lowercase().starts_with("image/") {
        Ok(())
    } else {
        Err(IntakeError::NotAnImage {
            content_type: if content_type.is_empty() {
                "missing".to_string()
            } else {
                content_type.to_string()
            },
        })
    }
}

pub fn check_size(size: usize, limits: &IntakeLimits) -> Result<(), IntakeError> {
    if size > limits.max_bytes {
        Err(IntakeError::TooLarge {
            size,
            max: limits.max_bytes,
        })
    } else {
        Ok(())
    }
}

/// Decode image bytes, convert to RGB and fit within the dimension limit
pub fn decode_and_normalize(
    bytes: &[u8],
    limits: &IntakeLimits,
) -> Result<NormalizedImage, IntakeError> {
    let decoded = image::load_from_memory(bytes).map_err(|e| {
        tracing::error!(error = %e, "Failed to load image");
        IntakeError::InvalidImage(e)
    })?;

    let original_size = (decoded.width(), decoded.height());
    let rgb = if matches!(decoded, DynamicImage::ImageRgb8(_)) {
        decoded
    } else {
        tracing::debug!(color = ?decoded.color(), "Converting image to RGB");
        DynamicImage::ImageRgb8(decoded.to_rgb8())
    };
    let image = fit_within(rgb, limits.max_dimension);
    let content_hash = compute_image_hash(image.as_bytes());

    Ok(NormalizedImage {
        image,
        source_bytes: bytes.len(),
        original_size,
        content_hash,
    })
}

/// Downscale preserving aspect ratio so neither side exceeds `max_dimension`
fn fit_within(image: DynamicImage, max_dimension: u32) -> DynamicImage {
    if max_dimension == 0 || (image.width() <= max_dimension && image.height() <= max_dimension) {
        return image;
    }

    tracing::info!(
        width = image.width(),
        height = image.height(),
        max_dimension,
        "Resizing image"
    );
    let resized = image.resize(max_dimension, max_dimension, FilterType::Lanczos3);
    DynamicImage::ImageRgb8(resized.to_rgb8())
}

/// Compute SHA-256 hash of raw RGB pixel data
///
/// Returns a 64-character hexadecimal string.
fn compute_image_hash(pixels: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pixels);
    format!("{:x}", hasher.finalize())
}
