use fairytale_common::frame::{Frame, FrameError};
use tracing::trace;

/// Byte order of one pixel in a display buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    /// blue, green, red; one byte each
    Bgr8,
}

/// Pixels in the order a bottom-up display surface expects: row 0 of the
/// buffer is the bottom scanline of the source frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplaySurfaceBuffer {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
    pub layout: PixelLayout,
}

/// Flip the frame vertically into a fresh buffer tagged with its size and
/// native BGR layout. Frames that are not non-empty BGR are rejected, so a
/// buffer's length always matches its layout.
pub fn to_display_buffer(frame: &Frame) -> Result<DisplaySurfaceBuffer, FrameError> {
    frame.ensure_bgr()?;
    let mut data = Vec::with_capacity(frame.data().len());
    for y in (0..frame.height()).rev() {
        data.extend_from_slice(frame.row(y));
    }
    Ok(DisplaySurfaceBuffer {
        data,
        width: frame.width(),
        height: frame.height(),
        layout: PixelLayout::Bgr8,
    })
}

/// Whatever shows pixels to the user. The studio presents once per preview
/// tick and once per processed result.
pub trait DisplaySurface: Send {
    fn present(&mut self, buffer: DisplaySurfaceBuffer);
}

/// Headless surface holding the last presented buffer, like a texture slot.
#[derive(Debug, Default)]
pub struct SurfaceSlot {
    current: Option<DisplaySurfaceBuffer>,
    presented: u64,
}

impl SurfaceSlot {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn current(&self) -> Option<&DisplaySurfaceBuffer> {
        self.current.as_ref()
    }

    /// Number of buffers presented so far.
    pub fn presented(&self) -> u64 {
        self.presented
    }
}

impl DisplaySurface for SurfaceSlot {
    fn present(&mut self, buffer: DisplaySurfaceBuffer) {
        self.presented += 1;
        trace!(
            width = buffer.width,
            height = buffer.height,
            presented = self.presented,
            "surface updated"
        );
        self.current = Some(buffer);
    }
}
