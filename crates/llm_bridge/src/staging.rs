//! Scoped staging of the image handed to a backend
//!
//! Backends that take a file path get a PNG in a private temporary file
//! that is removed when the [`StagedImage`] is dropped, on success and on
//! every error path alike. In-memory backends skip the filesystem.

use crate::backend::{ImageInput, ImagePayload};
use core_pipeline::NormalizedImage;
use std::io::Write;
use tempfile::NamedTempFile;

/// PNG-encoded image, optionally backed by a temporary file
#[derive(Debug)]
pub enum StagedImage {
    Memory(Vec<u8>),
    File(NamedTempFile),
}

impl StagedImage {
    /// Encode the image and stage it the way the backend expects
    pub fn stage(image: &NormalizedImage, input: ImageInput) -> std::io::Result<Self> {
        let png = image.to_png().map_err(std::io::Error::other)?;

        match input {
            ImageInput::Memory => Ok(StagedImage::Memory(png)),
            ImageInput::File => {
                let mut file = tempfile::Builder::new()
                    .prefix("receipt-")
                    .suffix(".png")
                    .tempfile()?;
                file.write_all(&png)?;
                file.flush()?;
                tracing::debug!(path = %file.path().display(), size = png.len(), "Staged image");
                Ok(StagedImage::File(file))
            }
        }
    }

    pub fn payload(&self) -> ImagePayload<'_> {
        match self {
            StagedImage::Memory(png) => ImagePayload::Png(png),
            StagedImage::File(file) => ImagePayload::File(file.path()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_pipeline::intake::{decode_and_normalize, IntakeLimits};
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
    use std::io::Cursor;
    use std::path::PathBuf;

    fn sample_image() -> NormalizedImage {
        let img = ImageBuffer::from_pixel(16, 16, Rgb([0u8, 128u8, 255u8]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        decode_and_normalize(&bytes, &IntakeLimits::default()).unwrap()
    }

    fn staged_path(staged: &StagedImage) -> PathBuf {
        match staged.payload() {
            ImagePayload::File(path) => path.to_path_buf(),
            ImagePayload::Png(_) => panic!("expected a staged file"),
        }
    }

    #[test]
    fn test_memory_staging_has_no_file() {
        let staged = StagedImage::stage(&sample_image(), ImageInput::Memory).unwrap();
        match staged.payload() {
            ImagePayload::Png(bytes) => assert!(image::load_from_memory(bytes).is_ok()),
            ImagePayload::File(_) => panic!("expected in-memory payload"),
        }
    }

    #[test]
    fn test_file_staging_writes_png() {
        let staged = StagedImage::stage(&sample_image(), ImageInput::File).unwrap();
        let path = staged_path(&staged);

        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("png"));
        let decoded = image::open(&path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 16));
    }

    #[test]
    fn test_file_removed_on_drop() {
        let staged = StagedImage::stage(&sample_image(), ImageInput::File).unwrap();
        let path = staged_path(&staged);
        assert!(path.exists());

        drop(staged);
        assert!(!path.exists());
    }
}
