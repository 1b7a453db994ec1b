use fairytale_common::frame::Frame;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("frame too large to encode: {0}x{1}")]
    TooLarge(usize, usize),
    #[error("JPEG encoding failed: {0}")]
    Jpeg(String),
}

/// Encode a BGR frame as a baseline JPEG at `quality` (1-100).
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>, EncodeError> {
    let width = u16::try_from(frame.width())
        .map_err(|_| EncodeError::TooLarge(frame.width(), frame.height()))?;
    let height = u16::try_from(frame.height())
        .map_err(|_| EncodeError::TooLarge(frame.width(), frame.height()))?;

    let rgb = frame.to_rgb();
    let mut out = Vec::with_capacity(rgb.len() / 4);
    let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
    encoder
        .encode(&rgb, width as u32, height as u32, ExtendedColorType::Rgb8)
        .map_err(|e| EncodeError::Jpeg(e.to_string()))?;
    Ok(out)
}
