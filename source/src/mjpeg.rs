use bytes::BytesMut;
use chrono::Utc;
use fairytale_common::frame::{Frame, FrameSource};
use futures_util::StreamExt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::{decode_image, SourceError};

const BOUNDARY: &[u8] = b"--frame\r\n";
const HEADER_END: &[u8] = b"\r\n\r\n";

/// Parse state for the MJPEG multipart stream.
enum ParseState {
    /// Looking for the boundary marker `--frame\r\n`.
    SeekingBoundary,
    /// Found boundary, now looking for end of headers `\r\n\r\n`.
    SeekingHeaderEnd,
    /// Collecting JPEG bytes until the next boundary.
    CollectingJpeg,
}

/// Incremental splitter for a `multipart/x-mixed-replace` body.
///
/// Chunks arrive with arbitrary boundaries; `push` returns every JPEG part
/// completed by the new bytes.
pub struct MultipartParser {
    buffer: BytesMut,
    state: ParseState,
    jpeg_start: usize,
}

impl Default for MultipartParser {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartParser {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(256 * 1024),
            state: ParseState::SeekingBoundary,
            jpeg_start: 0,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(chunk);
        let mut parts = Vec::new();

        loop {
            match self.state {
                ParseState::SeekingBoundary => {
                    if let Some(pos) = find_subsequence(&self.buffer, BOUNDARY) {
                        // Discard everything up to and including the boundary
                        let _ = self.buffer.split_to(pos + BOUNDARY.len());
                        self.state = ParseState::SeekingHeaderEnd;
                    } else {
                        // Keep last few bytes in case boundary spans chunks
                        if self.buffer.len() > BOUNDARY.len() {
                            let _ = self.buffer.split_to(self.buffer.len() - BOUNDARY.len());
                        }
                        break;
                    }
                }
                ParseState::SeekingHeaderEnd => {
                    if let Some(pos) = find_subsequence(&self.buffer, HEADER_END) {
                        let _ = self.buffer.split_to(pos + HEADER_END.len());
                        self.jpeg_start = 0;
                        self.state = ParseState::CollectingJpeg;
                    } else {
                        break;
                    }
                }
                ParseState::CollectingJpeg => {
                    if let Some(pos) =
                        find_subsequence(&self.buffer[self.jpeg_start..], BOUNDARY)
                    {
                        let jpeg_end = self.jpeg_start + pos;
                        // Strip trailing \r\n before boundary
                        let end = if jpeg_end >= 2
                            && self.buffer[jpeg_end - 2] == b'\r'
                            && self.buffer[jpeg_end - 1] == b'\n'
                        {
                            jpeg_end - 2
                        } else {
                            jpeg_end
                        };

                        let part = self.buffer[..end].to_vec();
                        let _ = self.buffer.split_to(jpeg_end + BOUNDARY.len());
                        if !part.is_empty() {
                            parts.push(part);
                        }
                        self.state = ParseState::SeekingHeaderEnd;
                    } else {
                        // Avoid re-scanning bytes already searched
                        self.jpeg_start = self.buffer.len().saturating_sub(BOUNDARY.len());
                        break;
                    }
                }
            }
        }

        parts
    }
}

/// Network camera source reading an MJPEG-over-HTTP stream.
///
/// A background task decodes every part into a BGR frame and keeps only
/// the newest one. Reads return that frame while it is fresh enough, so a
/// stalled or disconnected stream shows up as "no frame available".
pub struct MjpegSource {
    latest: Arc<Mutex<Option<Frame>>>,
    max_frame_age_ms: i64,
    task: JoinHandle<()>,
}

impl MjpegSource {
    /// Start streaming from `url`. Must be called inside a tokio runtime.
    pub fn spawn(url: &str, max_frame_age_ms: u64) -> Self {
        let latest = Arc::new(Mutex::new(None));
        let task = tokio::spawn(run_stream(url.to_string(), Arc::clone(&latest)));
        Self {
            latest,
            max_frame_age_ms: max_frame_age_ms as i64,
            task,
        }
    }
}

impl FrameSource for MjpegSource {
    fn try_read_frame(&mut self) -> Option<Frame> {
        let guard = self.latest.lock().ok()?;
        let frame = guard.as_ref()?;
        let age_ms = Utc::now().timestamp_millis() - frame.captured_at_ms;
        if age_ms > self.max_frame_age_ms {
            debug!(age_ms, max = self.max_frame_age_ms, "latest MJPEG frame is stale");
            return None;
        }
        Some(frame.clone())
    }

    fn name(&self) -> &str {
        "mjpeg"
    }
}

impl Drop for MjpegSource {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Consume the stream forever, reconnecting with exponential backoff.
async fn run_stream(url: String, latest: Arc<Mutex<Option<Frame>>>) {
    let mut backoff = Duration::from_secs(2);
    let max_backoff = Duration::from_secs(30);

    loop {
        info!(url, "connecting to MJPEG stream");
        match consume_stream(&url, &latest).await {
            Ok(()) => {
                info!("stream ended cleanly, reconnecting");
                backoff = Duration::from_secs(2);
            }
            Err(e) => {
                error!(error = %e, "stream error, reconnecting in {:?}", backoff);
            }
        }
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(max_backoff);
    }
}

async fn consume_stream(url: &str, latest: &Mutex<Option<Frame>>) -> Result<(), SourceError> {
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(SourceError::HttpConnect)?;
    let response = client
        .get(url)
        .send()
        .await
        .map_err(SourceError::HttpConnect)?;

    if !response.status().is_success() {
        return Err(SourceError::HttpStatus(response.status().as_u16()));
    }

    info!(status = %response.status(), "connected to MJPEG stream");

    let mut byte_stream = response.bytes_stream();
    let mut parser = MultipartParser::new();
    let mut seq: u64 = 0;

    while let Some(chunk) = byte_stream.next().await {
        let chunk = chunk.map_err(SourceError::HttpStream)?;
        for jpeg in parser.push(&chunk) {
            match decode_image(&jpeg) {
                Ok(frame) => {
                    seq += 1;
                    let frame = frame.with_timestamp(Utc::now().timestamp_millis(), seq);
                    if let Ok(mut slot) = latest.lock() {
                        *slot = Some(frame);
                    }
                }
                Err(e) => {
                    warn!(error = %e, bytes = jpeg.len(), "failed to decode MJPEG part, skipping");
                }
            }
        }
    }

    Ok(())
}

/// Find the position of `needle` in `haystack`.
fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
