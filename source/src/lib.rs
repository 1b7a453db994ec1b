//! Frame sources for the fairy-tale studio.
//!
//! - [`MjpegSource`]: network camera streaming `multipart/x-mixed-replace` JPEG
//! - [`StillImageSource`]: a single image file, replayed on every read

mod mjpeg;
mod still;

pub use mjpeg::{MjpegSource, MultipartParser};
pub use still::StillImageSource;

use fairytale_common::frame::Frame;
use image::ImageReader;
use std::io::Cursor;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("HTTP connection failed: {0}")]
    HttpConnect(reqwest::Error),
    #[error("HTTP stream error: {0}")]
    HttpStream(reqwest::Error),
    #[error("HTTP status {0}")]
    HttpStatus(u16),
    #[error("failed to decode image: {0}")]
    Decode(String),
    #[error("failed to open {path}: {message}")]
    Open { path: String, message: String },
}

/// Decode any image format the `image` crate understands into a BGR frame.
pub fn decode_image(encoded: &[u8]) -> Result<Frame, SourceError> {
    let img = ImageReader::new(Cursor::new(encoded))
        .with_guessed_format()
        .map_err(|e| SourceError::Decode(e.to_string()))?
        .decode()
        .map_err(|e| SourceError::Decode(e.to_string()))?;
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();
    Frame::from_rgb(height as usize, width as usize, rgb.into_raw())
        .map_err(|e| SourceError::Decode(e.to_string()))
}
