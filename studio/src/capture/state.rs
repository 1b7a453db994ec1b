use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use fairytale_common::frame::{Frame, FrameError, FrameSource};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::display::{to_display_buffer, DisplaySurface};
use crate::filter::Pipeline;
use crate::storage::{PersistenceSink, StorageError, JPEG_MIME};

use super::encoder::{encode_jpeg, EncodeError};
use super::keys::artifact_filename_for;

/// Externally visible state of the studio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// Showing the live feed. A trigger may be pending for the next tick.
    Previewing,
    /// A captured frame is being stylized.
    Processing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// Capture will run on the next tick.
    Accepted,
    /// A capture is already pending or in flight; this trigger is discarded.
    Dropped,
}

/// What a single tick did.
#[derive(Debug)]
pub enum TickOutcome {
    /// A live frame was rendered.
    Previewed,
    /// The source had nothing to show.
    NoFrame,
    /// A frame was captured and handed to the stylization worker.
    CycleStarted,
    /// Stylization is still running; the preview was refreshed meanwhile.
    Processing,
    /// The capture cycle ended, successfully or not.
    CycleFinished(Result<CycleReport, CaptureError>),
}

/// Result of a completed capture cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub filename: String,
    pub path: PathBuf,
    pub jpeg_bytes: usize,
    pub published: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("no frame available from the source")]
    CaptureUnavailable,
    #[error(transparent)]
    InvalidFrame(#[from] FrameError),
    #[error("failed to encode photo: {0}")]
    Encode(#[from] EncodeError),
    #[error("failed to save photo: {0}")]
    Storage(#[from] StorageError),
    #[error("stylization did not finish within {0:?}")]
    StylizeTimedOut(Duration),
    #[error("stylization worker failed: {0}")]
    WorkerFailed(String),
}

struct CycleJob {
    handle: JoinHandle<Result<Frame, FrameError>>,
    started: Instant,
    filename: String,
}

enum Phase {
    Previewing { armed: bool },
    Processing(CycleJob),
}

/// Capture-and-process orchestrator.
///
/// Owns the frame source (its only reader), the display surface and the
/// persistence sink. Everything happens inside [`Studio::tick`]; triggers
/// only arm the next tick.
pub struct Studio<S, D> {
    source: S,
    display: D,
    sink: PersistenceSink,
    pipeline: Arc<Pipeline>,
    jpeg_quality: u8,
    timeout: Option<Duration>,
    phase: Phase,
    /// Worker of a timed-out cycle. It cannot be interrupted, so no new
    /// cycle starts until it has finished.
    abandoned: Option<JoinHandle<Result<Frame, FrameError>>>,
}

impl<S: FrameSource, D: DisplaySurface> Studio<S, D> {
    pub fn new(source: S, display: D, sink: PersistenceSink, pipeline: Pipeline) -> Self {
        Self {
            source,
            display,
            sink,
            pipeline: Arc::new(pipeline),
            jpeg_quality: 95,
            timeout: None,
            phase: Phase::Previewing { armed: false },
            abandoned: None,
        }
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    /// Give up on a stylization that runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn state(&self) -> CaptureState {
        match self.phase {
            Phase::Previewing { .. } => CaptureState::Previewing,
            Phase::Processing(_) => CaptureState::Processing,
        }
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    /// Ask for a capture on the next tick. Only one capture may be pending
    /// or in flight; extra triggers are dropped, not queued.
    pub fn trigger(&mut self) -> TriggerOutcome {
        if self.abandoned_worker_running() {
            debug!("abandoned stylization still running, dropping trigger");
            return TriggerOutcome::Dropped;
        }
        match &mut self.phase {
            Phase::Previewing { armed } if !*armed => {
                *armed = true;
                debug!("capture trigger accepted");
                TriggerOutcome::Accepted
            }
            Phase::Previewing { .. } => {
                debug!("capture already pending, dropping trigger");
                TriggerOutcome::Dropped
            }
            Phase::Processing(_) => {
                debug!("capture in progress, dropping trigger");
                TriggerOutcome::Dropped
            }
        }
    }

    fn abandoned_worker_running(&mut self) -> bool {
        match &self.abandoned {
            Some(handle) if handle.is_finished() => {
                debug!("abandoned stylization worker finished");
                self.abandoned = None;
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    pub async fn tick(&mut self) -> TickOutcome {
        let phase = std::mem::replace(&mut self.phase, Phase::Previewing { armed: false });
        match phase {
            Phase::Previewing { armed: false } => {
                if self.render_preview() {
                    TickOutcome::Previewed
                } else {
                    TickOutcome::NoFrame
                }
            }
            Phase::Previewing { armed: true } => self.begin_cycle(),
            Phase::Processing(job) => self.poll_cycle(job).await,
        }
    }

    fn render_preview(&mut self) -> bool {
        let Some(frame) = self.source.try_read_frame() else {
            return false;
        };
        match to_display_buffer(&frame) {
            Ok(buffer) => {
                self.display.present(buffer);
                true
            }
            Err(e) => {
                debug!(error = %e, source = self.source.name(), "skipping malformed preview frame");
                false
            }
        }
    }

    fn begin_cycle(&mut self) -> TickOutcome {
        let Some(frame) = self.source.try_read_frame() else {
            warn!(source = self.source.name(), "capture requested but no frame is available");
            return TickOutcome::CycleFinished(Err(CaptureError::CaptureUnavailable));
        };

        let filename = artifact_filename_for(frame.captured_at_ms);
        info!(
            filename,
            width = frame.width(),
            height = frame.height(),
            "applying fairy tale effect"
        );

        let pipeline = Arc::clone(&self.pipeline);
        let handle = tokio::task::spawn_blocking(move || pipeline.stylize(&frame));
        self.phase = Phase::Processing(CycleJob {
            handle,
            started: Instant::now(),
            filename,
        });
        TickOutcome::CycleStarted
    }

    async fn poll_cycle(&mut self, job: CycleJob) -> TickOutcome {
        if !job.handle.is_finished() {
            if let Some(timeout) = self.timeout {
                if job.started.elapsed() >= timeout {
                    // the blocking worker cannot be interrupted; its result is discarded
                    self.abandoned = Some(job.handle);
                    let err = CaptureError::StylizeTimedOut(timeout);
                    error!(error = %err, filename = job.filename, "capture cycle abandoned");
                    return TickOutcome::CycleFinished(Err(err));
                }
            }
            self.phase = Phase::Processing(job);
            self.render_preview();
            return TickOutcome::Processing;
        }

        let elapsed_ms = job.started.elapsed().as_millis() as u64;
        let stylized = match job.handle.await {
            Ok(Ok(frame)) => frame,
            Ok(Err(e)) => {
                error!(error = %e, filename = job.filename, "captured frame rejected");
                return TickOutcome::CycleFinished(Err(e.into()));
            }
            Err(e) => {
                error!(error = %e, filename = job.filename, "stylization worker failed");
                return TickOutcome::CycleFinished(Err(CaptureError::WorkerFailed(e.to_string())));
            }
        };
        debug!(elapsed_ms, "fairy tale effect applied");

        let result = self.finish_cycle(stylized, job.filename).await;
        if let Err(e) = &result {
            error!(error = %e, "capture cycle failed");
        }
        TickOutcome::CycleFinished(result)
    }

    async fn finish_cycle(
        &mut self,
        stylized: Frame,
        filename: String,
    ) -> Result<CycleReport, CaptureError> {
        self.display.present(to_display_buffer(&stylized)?);

        let jpeg = encode_jpeg(&stylized, self.jpeg_quality)?;
        let path = self.sink.write_artifact(&jpeg, &filename).await?;
        info!(path = %path.display(), bytes = jpeg.len(), "photo processed and saved");

        let published = match self.sink.publish_to_gallery(&path, &filename, JPEG_MIME).await {
            Ok(()) => self.sink.has_gallery(),
            Err(e) => {
                warn!(error = %e, filename, "gallery publish failed");
                false
            }
        };

        Ok(CycleReport {
            filename,
            path,
            jpeg_bytes: jpeg.len(),
            published,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::SurfaceSlot;
    use crate::filter::StylizeParams;
    use crate::storage::{DirectoryGallery, FsStore};
    use std::path::Path;

    /// Source that hands out a fixed frame, or nothing.
    struct FixedSource {
        frame: Option<Frame>,
        /// Yield the frame a single time, then report unavailable.
        once: bool,
    }

    impl FixedSource {
        fn solid() -> Self {
            Self::of(Frame::solid(4, 4, [100, 150, 200]).with_timestamp(1_704_164_645_000, 1))
        }

        fn of(frame: Frame) -> Self {
            Self {
                frame: Some(frame),
                once: false,
            }
        }

        fn unavailable() -> Self {
            Self {
                frame: None,
                once: false,
            }
        }
    }

    impl FrameSource for FixedSource {
        fn try_read_frame(&mut self) -> Option<Frame> {
            if self.once {
                self.frame.take()
            } else {
                self.frame.clone()
            }
        }
    }

    fn studio_in(
        dir: &Path,
        source: FixedSource,
    ) -> Studio<FixedSource, SurfaceSlot> {
        Studio::new(
            source,
            SurfaceSlot::new(),
            PersistenceSink::FilesystemOnly(FsStore::new(dir)),
            Pipeline::new(StylizeParams::default()),
        )
    }

    fn jpeg_count(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .filter(|e| e.path().extension().is_some_and(|ext| ext == "jpg"))
                    .count()
            })
            .unwrap_or(0)
    }

    async fn run_until_finished<S: FrameSource, D: DisplaySurface>(
        studio: &mut Studio<S, D>,
    ) -> Result<CycleReport, CaptureError> {
        for _ in 0..2000 {
            if let TickOutcome::CycleFinished(result) = studio.tick().await {
                return result;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("capture cycle never finished");
    }

    #[tokio::test]
    async fn preview_ticks_render_frames() {
        let dir = tempfile::tempdir().unwrap();
        let mut studio = studio_in(dir.path(), FixedSource::solid());
        assert!(matches!(studio.tick().await, TickOutcome::Previewed));
        assert!(matches!(studio.tick().await, TickOutcome::Previewed));
        assert_eq!(studio.display().presented(), 2);
        assert_eq!(studio.state(), CaptureState::Previewing);
    }

    #[tokio::test]
    async fn preview_without_frames_renders_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut studio = studio_in(dir.path(), FixedSource::unavailable());
        assert!(matches!(studio.tick().await, TickOutcome::NoFrame));
        assert_eq!(studio.display().presented(), 0);
    }

    #[tokio::test]
    async fn full_cycle_writes_one_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let mut studio = studio_in(dir.path(), FixedSource::solid());

        assert_eq!(studio.trigger(), TriggerOutcome::Accepted);
        assert!(matches!(studio.tick().await, TickOutcome::CycleStarted));
        assert_eq!(studio.state(), CaptureState::Processing);

        let report = run_until_finished(&mut studio).await.unwrap();
        assert_eq!(studio.state(), CaptureState::Previewing);
        assert!(report.filename.starts_with("processed_photo_"));
        assert!(report.filename.ends_with(".jpg"));
        assert!(!report.published);
        assert_eq!(jpeg_count(dir.path()), 1);

        // the processed result was presented, bottom-up, same size
        let shown = studio.display().current().unwrap();
        assert_eq!(shown.data.len(), 48);
        assert!(shown.data.iter().any(|&v| v != 0));
        let stylized = Pipeline::new(StylizeParams::default())
            .stylize(&Frame::solid(4, 4, [100, 150, 200]))
            .unwrap();
        assert_eq!(&shown.data[..3], stylized.pixel(0, 3));

        let written = image::open(&report.path).unwrap();
        assert_eq!((written.width(), written.height()), (4, 4));
    }

    #[tokio::test]
    async fn trigger_without_frame_stays_previewing() {
        let dir = tempfile::tempdir().unwrap();
        let mut studio = studio_in(dir.path(), FixedSource::unavailable());

        assert_eq!(studio.trigger(), TriggerOutcome::Accepted);
        match studio.tick().await {
            TickOutcome::CycleFinished(Err(CaptureError::CaptureUnavailable)) => {}
            other => panic!("expected CaptureUnavailable, got {other:?}"),
        }
        assert_eq!(studio.state(), CaptureState::Previewing);
        assert_eq!(jpeg_count(dir.path()), 0);

        // the next trigger is accepted again
        assert_eq!(studio.trigger(), TriggerOutcome::Accepted);
    }

    #[tokio::test]
    async fn trigger_during_processing_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let mut studio = studio_in(dir.path(), FixedSource::solid());

        assert_eq!(studio.trigger(), TriggerOutcome::Accepted);
        assert!(matches!(studio.tick().await, TickOutcome::CycleStarted));
        assert_eq!(studio.trigger(), TriggerOutcome::Dropped);

        run_until_finished(&mut studio).await.unwrap();
        for _ in 0..5 {
            assert!(matches!(studio.tick().await, TickOutcome::Previewed));
        }
        assert_eq!(jpeg_count(dir.path()), 1);
    }

    #[tokio::test]
    async fn second_trigger_before_tick_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let mut studio = studio_in(dir.path(), FixedSource::solid());
        assert_eq!(studio.trigger(), TriggerOutcome::Accepted);
        assert_eq!(studio.trigger(), TriggerOutcome::Dropped);
        assert!(matches!(studio.tick().await, TickOutcome::CycleStarted));
        run_until_finished(&mut studio).await.unwrap();
        assert_eq!(jpeg_count(dir.path()), 1);
    }

    #[tokio::test]
    async fn invalid_frame_is_reported_and_recovered() {
        let dir = tempfile::tempdir().unwrap();
        let source = FixedSource::of(Frame::from_raw(4, 4, 2, vec![0; 32]).unwrap());
        let mut studio = studio_in(dir.path(), source);
        studio.trigger();
        studio.tick().await;
        let err = run_until_finished(&mut studio).await.unwrap_err();
        assert!(matches!(err, CaptureError::InvalidFrame(_)));
        assert_eq!(studio.state(), CaptureState::Previewing);
        assert_eq!(jpeg_count(dir.path()), 0);
    }

    #[tokio::test]
    async fn storage_failure_is_reported_after_display() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();
        let mut source = FixedSource::solid();
        source.once = true;
        let mut studio = studio_in(&blocker, source);

        studio.trigger();
        studio.tick().await;
        let err = run_until_finished(&mut studio).await.unwrap_err();
        assert!(matches!(err, CaptureError::Storage(_)));
        assert_eq!(studio.state(), CaptureState::Previewing);
        // the stylized frame was shown even though saving failed
        assert_eq!(studio.display().presented(), 1);
    }

    #[tokio::test]
    async fn gallery_failure_does_not_fail_the_cycle() {
        let out = tempfile::tempdir().unwrap();
        let blocker = out.path().join("gallery-file");
        std::fs::write(&blocker, b"x").unwrap();
        let sink = PersistenceSink::FilesystemPlusGallery(
            FsStore::new(out.path()),
            DirectoryGallery::new(&blocker),
        );
        let mut studio = Studio::new(
            FixedSource::solid(),
            SurfaceSlot::new(),
            sink,
            Pipeline::new(StylizeParams::default()),
        );

        studio.trigger();
        studio.tick().await;
        let report = run_until_finished(&mut studio).await.unwrap();
        assert!(!report.published);
        assert!(report.path.exists());
    }

    #[tokio::test]
    async fn gallery_publish_is_reported() {
        let out = tempfile::tempdir().unwrap();
        let pictures = tempfile::tempdir().unwrap();
        let sink = PersistenceSink::FilesystemPlusGallery(
            FsStore::new(out.path()),
            DirectoryGallery::new(pictures.path()),
        );
        let mut studio = Studio::new(
            FixedSource::solid(),
            SurfaceSlot::new(),
            sink,
            Pipeline::new(StylizeParams::default()),
        );

        studio.trigger();
        studio.tick().await;
        let report = run_until_finished(&mut studio).await.unwrap();
        assert!(report.published);
        assert!(pictures.path().join(&report.filename).exists());
    }

    #[tokio::test]
    async fn zero_timeout_abandons_the_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let big = Frame::solid(240, 320, [10, 20, 30]).with_timestamp(1_704_164_645_000, 1);
        let mut studio =
            studio_in(dir.path(), FixedSource::of(big)).with_timeout(Some(Duration::from_nanos(1)));

        studio.trigger();
        assert!(matches!(studio.tick().await, TickOutcome::CycleStarted));
        std::thread::sleep(Duration::from_millis(2));
        match studio.tick().await {
            // the worker may already be done on a fast machine
            TickOutcome::CycleFinished(Err(CaptureError::StylizeTimedOut(_)))
            | TickOutcome::CycleFinished(Ok(_)) => {}
            other => panic!("expected the cycle to end, got {other:?}"),
        }
        assert_eq!(studio.state(), CaptureState::Previewing);
    }

    #[tokio::test]
    async fn no_new_cycle_while_timed_out_worker_runs() {
        let dir = tempfile::tempdir().unwrap();
        let big = Frame::solid(480, 640, [10, 20, 30]).with_timestamp(1_704_164_645_000, 1);
        let mut studio =
            studio_in(dir.path(), FixedSource::of(big)).with_timeout(Some(Duration::from_nanos(1)));

        assert_eq!(studio.trigger(), TriggerOutcome::Accepted);
        assert!(matches!(studio.tick().await, TickOutcome::CycleStarted));
        match studio.tick().await {
            TickOutcome::CycleFinished(Err(CaptureError::StylizeTimedOut(_))) => {}
            other => panic!("expected StylizeTimedOut, got {other:?}"),
        }
        assert_eq!(studio.state(), CaptureState::Previewing);

        // the abandoned worker is still busy with the 640x480 frame
        assert_eq!(studio.trigger(), TriggerOutcome::Dropped);
        assert!(matches!(studio.tick().await, TickOutcome::Previewed));

        let mut accepted = false;
        for _ in 0..6000 {
            if studio.trigger() == TriggerOutcome::Accepted {
                accepted = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(accepted, "trigger never accepted after the abandoned worker finished");
        assert_eq!(jpeg_count(dir.path()), 0);
    }

    #[tokio::test]
    async fn malformed_preview_frames_are_not_presented() {
        let dir = tempfile::tempdir().unwrap();
        let source = FixedSource::of(Frame::from_raw(2, 2, 2, vec![0; 8]).unwrap());
        let mut studio = studio_in(dir.path(), source);
        assert!(matches!(studio.tick().await, TickOutcome::NoFrame));
        assert_eq!(studio.display().presented(), 0);
    }

    #[tokio::test]
    async fn preview_keeps_rendering_while_processing() {
        let dir = tempfile::tempdir().unwrap();
        let big = Frame::solid(240, 320, [10, 20, 30]).with_timestamp(1_704_164_645_000, 1);
        let mut studio = studio_in(dir.path(), FixedSource::of(big));
        studio.trigger();
        studio.tick().await;

        let mut processing_ticks: u64 = 0;
        loop {
            match studio.tick().await {
                TickOutcome::Processing => processing_ticks += 1,
                TickOutcome::CycleFinished(result) => {
                    result.unwrap();
                    break;
                }
                other => panic!("unexpected tick outcome {other:?}"),
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        // one preview per in-flight tick plus the processed result
        assert_eq!(studio.display().presented(), processing_ticks + 1);
    }
}
