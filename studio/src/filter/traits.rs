use fairytale_common::frame::Frame;

/// One image-to-image step of the stylization pipeline.
///
/// Implementations receive a validated BGR frame and return a new frame of
/// the same shape. They hold only their parameters, never per-call state.
pub trait FrameStage: Send + Sync {
    fn apply(&self, frame: &Frame) -> Frame;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}

/// Mirror an out-of-range index back into `0..len`, excluding the edge
/// sample itself (`gfedcb|abcdefgh|gfedcba`).
pub(crate) fn reflect_101(index: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let last = len as isize - 1;
    let mut i = index;
    loop {
        if i < 0 {
            i = -i;
        } else if i > last {
            i = 2 * last - i;
        } else {
            return i as usize;
        }
    }
}
