use super::{DecodedImage, ImageInput};
use foodlens_shared::{ErrorDetail, ErrorKind};
use image::imageops::FilterType;

const SUPPORTED_CONTENT_TYPES: &[&str] =
    &["image/jpeg", "image/jpg", "image/png", "image/webp"];

/// Checks and normalizes an upload before it ever reaches the model:
/// content-type and size gates run before the (expensive) decode, then the
/// pixels are converted to RGB and downscaled to fit the dimension bound.
#[derive(Debug, Clone)]
pub struct Validator {
    max_bytes: usize,
    max_dimension: u32,
    min_dimension: u32,
}

impl Validator {
    pub fn new(max_bytes: usize, max_dimension: u32, min_dimension: u32) -> Self {
        Self {
            max_bytes,
            max_dimension,
            min_dimension,
        }
    }

    pub fn validate(&self, input: &ImageInput) -> Result<DecodedImage, ErrorDetail> {
        let content_type = input.content_type.to_ascii_lowercase();
        if !SUPPORTED_CONTENT_TYPES.contains(&content_type.as_str()) {
            return Err(ErrorDetail::new(
                ErrorKind::Validation,
                format!("unsupported content type {:?}", input.content_type),
            )
            .with_suggestion("upload a JPEG, PNG or WebP image"));
        }

        let claimed = input.declared_len.max(input.bytes.len());
        if claimed > self.max_bytes {
            return Err(ErrorDetail::new(
                ErrorKind::Validation,
                format!(
                    "image is {} bytes, larger than the {} byte limit",
                    claimed, self.max_bytes
                ),
            ));
        }

        let decoded = image::load_from_memory(&input.bytes).map_err(|e| {
            ErrorDetail::new(ErrorKind::Decode, format!("could not decode image: {e}"))
                .with_suggestion("the file may be corrupt; try re-exporting it")
        })?;

        // Alpha channels and palette formats all collapse to RGB here.
        let mut pixels = decoded.to_rgb8();

        if pixels.width() > self.max_dimension || pixels.height() > self.max_dimension {
            // Lanczos trades speed for quality; this runs once per request.
            pixels = image::DynamicImage::ImageRgb8(pixels)
                .resize(self.max_dimension, self.max_dimension, FilterType::Lanczos3)
                .to_rgb8();
        }

        if pixels.width() < self.min_dimension || pixels.height() < self.min_dimension {
            return Err(ErrorDetail::new(
                ErrorKind::Validation,
                format!(
                    "image is {}x{}, below the {} px minimum",
                    pixels.width(),
                    pixels.height(),
                    self.min_dimension
                ),
            )
            .with_suggestion("upload a larger photo"));
        }

        Ok(DecodedImage { pixels })
    }
}
