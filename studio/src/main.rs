mod capture;
mod display;
mod filter;
mod storage;
mod trigger;

use capture::state::{Studio, TickOutcome, TriggerOutcome};
use display::SurfaceSlot;
use fairytale_common::config::{Config, SourceConfig};
use fairytale_common::frame::FrameSource;
use fairytale_source::{MjpegSource, StillImageSource};
use filter::{Pipeline, StylizeParams};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use trigger::Command;

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load_or_default(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        source = config.source.kind,
        fps = config.preview.fps,
        sigma_s = config.stylize.sigma_s,
        sigma_r = config.stylize.sigma_r,
        output_dir = %config.output.dir.display(),
        gallery = config.gallery.enabled,
        "starting fairy tale studio"
    );

    let source = open_source(&config.source);
    let sink = storage::sink_from_config(
        &config.output.dir,
        config.gallery.enabled,
        config.gallery.dir.as_deref(),
    );
    let pipeline = Pipeline::new(StylizeParams::from(&config.stylize));
    let timeout = match config.stylize.timeout_ms {
        0 => None,
        ms => Some(Duration::from_millis(ms)),
    };

    let studio = Studio::new(source, SurfaceSlot::new(), sink, pipeline)
        .with_jpeg_quality(config.output.jpeg_quality)
        .with_timeout(timeout);

    let (tx, rx) = mpsc::channel(8);
    if let Err(e) = trigger::spawn_stdin_commands(tx) {
        warn!(error = %e, "failed to start command input, only ctrl-c will work");
    }
    info!("press enter (or type c) to capture, q to quit");

    let period = Duration::from_secs_f64(1.0 / config.preview.fps);
    run_studio_loop(studio, rx, period).await;
    info!("studio stopped");
}

fn open_source(config: &SourceConfig) -> Box<dyn FrameSource> {
    match (config.kind.as_str(), &config.path) {
        ("still", Some(path)) => {
            info!(path = %path.display(), "using still image source");
            Box::new(StillImageSource::open(path))
        }
        _ => {
            info!(url = config.url, "using MJPEG stream source");
            Box::new(MjpegSource::spawn(&config.url, config.max_frame_age_ms))
        }
    }
}

async fn run_studio_loop<S: FrameSource>(
    mut studio: Studio<S, SurfaceSlot>,
    mut commands: mpsc::Receiver<Command>,
    period: Duration,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut commands_open = true;
    let mut frames: u64 = 0;
    let mut saved: u64 = 0;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match studio.tick().await {
                    TickOutcome::Previewed => {
                        frames += 1;
                        if frames % 300 == 0 {
                            debug!(frames, "preview running");
                        }
                    }
                    TickOutcome::NoFrame | TickOutcome::Processing => {}
                    TickOutcome::CycleStarted => debug!("capture cycle started"),
                    TickOutcome::CycleFinished(Ok(report)) => {
                        saved += 1;
                        info!(
                            filename = report.filename,
                            path = %report.path.display(),
                            bytes = report.jpeg_bytes,
                            published = report.published,
                            saved,
                            "capture cycle complete"
                        );
                    }
                    // the studio has already logged the failure
                    TickOutcome::CycleFinished(Err(_)) => {}
                }
            }
            command = commands.recv(), if commands_open => match command {
                Some(Command::Capture) => {
                    if studio.trigger() == TriggerOutcome::Dropped {
                        info!(state = ?studio.state(), "busy, capture ignored");
                    }
                }
                Some(Command::Quit) => {
                    info!("quit requested");
                    break;
                }
                None => commands_open = false,
            },
            result = &mut shutdown => {
                if let Err(e) = result {
                    error!(error = %e, "failed to listen for ctrl-c");
                }
                info!("shutting down");
                break;
            }
        }
    }

    info!(
        frames,
        saved,
        presented = studio.display().presented(),
        "studio loop exited"
    );
}
