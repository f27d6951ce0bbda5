//! Image processing for thread uploads.
//!
//! Browsers post base64 payloads that can be arbitrarily large; the
//! processor decodes, caps the long edge so agent-bound images stay a
//! reasonable size, and re-encodes in the original format.

use ai_thread_common::{Result, ThreadError};
use image::imageops::FilterType;
use image::ImageFormat;
use std::io::Cursor;
use tracing::debug;

/// Longest edge kept after processing.
pub const MAX_IMAGE_EDGE: u32 = 1568;

pub struct ProcessedImage {
    pub data: Vec<u8>,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
}

pub trait ImageProcessor: Send + Sync {
    fn process(&self, data: &[u8], mime_type: &str) -> Result<ProcessedImage>;
}

/// Decode, downscale when oversized, re-encode.
pub struct ResizingImageProcessor {
    max_edge: u32,
}

impl Default for ResizingImageProcessor {
    fn default() -> Self {
        Self {
            max_edge: MAX_IMAGE_EDGE,
        }
    }
}

impl ResizingImageProcessor {
    pub fn new(max_edge: u32) -> Self {
        Self { max_edge }
    }
}

impl ImageProcessor for ResizingImageProcessor {
    fn process(&self, data: &[u8], mime_type: &str) -> Result<ProcessedImage> {
        let format = ImageFormat::from_mime_type(mime_type).ok_or_else(|| {
            ThreadError::InvalidInput(format!("unsupported image type: {mime_type}"))
        })?;
        let decoded = image::load_from_memory_with_format(data, format)
            .map_err(|e| ThreadError::InvalidInput(format!("image decoding failed: {e}")))?;

        let (original_w, original_h) = (decoded.width(), decoded.height());
        let resized = if original_w.max(original_h) > self.max_edge {
            debug!(
                width = original_w,
                height = original_h,
                max_edge = self.max_edge,
                "downscaling uploaded image"
            );
            decoded.resize(self.max_edge, self.max_edge, FilterType::Triangle)
        } else {
            decoded
        };

        let mut data = Vec::new();
        resized
            .write_to(&mut Cursor::new(&mut data), format)
            .map_err(|e| ThreadError::Backend(format!("image encoding failed: {e}")))?;

        Ok(ProcessedImage {
            width: resized.width(),
            height: resized.height(),
            data,
            mime_type: format.to_mime_type().to_string(),
        })
    }
}
