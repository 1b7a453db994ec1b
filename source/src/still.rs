use chrono::Utc;
use fairytale_common::frame::{Frame, FrameSource};
use std::path::Path;
use tracing::{error, info};

use crate::{decode_image, SourceError};

/// Replays one image file as if it were a camera.
///
/// The file is decoded once at startup. Every read hands out a copy stamped
/// with the current time, so downstream code sees a fresh capture each tick.
pub struct StillImageSource {
    frame: Option<Frame>,
    seq: u64,
}

impl StillImageSource {
    /// Load `path`. A file that cannot be read or decoded leaves the source
    /// permanently unavailable rather than failing startup.
    pub fn open(path: &Path) -> Self {
        let frame = match load(path) {
            Ok(frame) => {
                info!(
                    path = %path.display(),
                    width = frame.width(),
                    height = frame.height(),
                    "loaded still image source"
                );
                Some(frame)
            }
            Err(e) => {
                error!(error = %e, "still image source unavailable");
                None
            }
        };
        Self {
            frame,
            seq: 0,
        }
    }
}

fn load(path: &Path) -> Result<Frame, SourceError> {
    let bytes = std::fs::read(path).map_err(|e| SourceError::Open {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    decode_image(&bytes)
}

impl FrameSource for StillImageSource {
    fn try_read_frame(&mut self) -> Option<Frame> {
        let frame = self.frame.as_ref()?;
        self.seq += 1;
        Some(frame.clone().with_timestamp(Utc::now().timestamp_millis(), self.seq))
    }

    fn name(&self) -> &str {
        "still"
    }
}
