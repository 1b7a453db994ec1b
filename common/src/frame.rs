/// Channel count of every frame the pipeline accepts (blue, green, red).
pub const BGR_CHANNELS: usize = 3;

/// A captured camera frame: an 8-bit pixel buffer in BGR channel order.
///
/// Layout is row-major, `height` rows of `width * channels` bytes, row 0 at
/// the top of the image.
///
/// The shape is fixed at construction. Pipeline stages never modify a frame
/// in place; they build a new one with [`Frame::with_pixels`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
    height: usize,
    width: usize,
    channels: usize,
    pub captured_at_ms: i64,
    pub seq: u64,
}

impl Frame {
    /// Wrap a raw buffer. Only checks that the buffer length matches the
    /// declared shape; use [`Frame::ensure_bgr`] to check the shape itself.
    pub fn from_raw(
        height: usize,
        width: usize,
        channels: usize,
        data: Vec<u8>,
    ) -> Result<Self, FrameError> {
        let expected = height * width * channels;
        if data.len() != expected {
            return Err(FrameError::LengthMismatch {
                got: data.len(),
                expected,
            });
        }
        Ok(Self {
            data,
            height,
            width,
            channels,
            captured_at_ms: 0,
            seq: 0,
        })
    }

    /// A frame where every pixel is the same BGR triple.
    pub fn solid(height: usize, width: usize, bgr: [u8; 3]) -> Self {
        let data = bgr
            .iter()
            .copied()
            .cycle()
            .take(height * width * BGR_CHANNELS)
            .collect();
        Self {
            data,
            height,
            width,
            channels: BGR_CHANNELS,
            captured_at_ms: 0,
            seq: 0,
        }
    }

    /// Convert a tightly packed RGB8 buffer (as decoded by the `image` crate)
    /// into a BGR frame.
    pub fn from_rgb(height: usize, width: usize, mut rgb: Vec<u8>) -> Result<Self, FrameError> {
        if rgb.len() != height * width * BGR_CHANNELS {
            return Err(FrameError::LengthMismatch {
                got: rgb.len(),
                expected: height * width * BGR_CHANNELS,
            });
        }
        for px in rgb.chunks_exact_mut(BGR_CHANNELS) {
            px.swap(0, 2);
        }
        Self::from_raw(height, width, BGR_CHANNELS, rgb)
    }

    pub fn with_timestamp(mut self, captured_at_ms: i64, seq: u64) -> Self {
        self.captured_at_ms = captured_at_ms;
        self.seq = seq;
        self
    }

    /// Build a frame of the same shape and capture metadata around new pixels.
    ///
    /// Panics if `data` does not match the shape; stages always allocate
    /// their output from the input's length.
    pub fn with_pixels(&self, data: Vec<u8>) -> Self {
        assert_eq!(data.len(), self.data.len(), "stage output changed frame size");
        Self {
            data,
            height: self.height,
            width: self.width,
            channels: self.channels,
            captured_at_ms: self.captured_at_ms,
            seq: self.seq,
        }
    }

    /// Fails with [`FrameError::InvalidFrame`] unless the frame has non-zero
    /// height and width and exactly three channels.
    pub fn ensure_bgr(&self) -> Result<(), FrameError> {
        if self.height == 0 || self.width == 0 || self.channels != BGR_CHANNELS {
            return Err(FrameError::InvalidFrame {
                height: self.height,
                width: self.width,
                channels: self.channels,
            });
        }
        Ok(())
    }

    // -- Accessors ---------------------------------------------------------------

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// (height, width, channels)
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.height, self.width, self.channels)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Bytes in one scanline.
    pub fn stride(&self) -> usize {
        self.width * self.channels
    }

    /// One scanline, top row first.
    pub fn row(&self, y: usize) -> &[u8] {
        let stride = self.stride();
        &self.data[y * stride..(y + 1) * stride]
    }

    /// Pixel bytes at (x, y), in BGR order.
    pub fn pixel(&self, x: usize, y: usize) -> &[u8] {
        let start = y * self.stride() + x * self.channels;
        &self.data[start..start + self.channels]
    }

    /// Copy out the pixels as RGB8 for encoders that expect that order.
    pub fn to_rgb(&self) -> Vec<u8> {
        let mut rgb = self.data.clone();
        if self.channels == BGR_CHANNELS {
            for px in rgb.chunks_exact_mut(BGR_CHANNELS) {
                px.swap(0, 2);
            }
        }
        rgb
    }
}

/// Where frames come from: a camera, a network stream, a file.
///
/// The orchestration loop is the only reader. `None` means no frame is
/// available right now (device not open, stream stalled, end of input);
/// callers treat it as a normal outcome.
pub trait FrameSource: Send {
    fn try_read_frame(&mut self) -> Option<Frame>;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn try_read_frame(&mut self) -> Option<Frame> {
        (**self).try_read_frame()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("invalid frame: {height}x{width} with {channels} channels, expected non-empty BGR")]
    InvalidFrame {
        height: usize,
        width: usize,
        channels: usize,
    },
    #[error("frame buffer is {got} bytes, shape requires {expected}")]
    LengthMismatch { got: usize, expected: usize },
}
