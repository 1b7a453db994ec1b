use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
    #[serde(default)]
    pub stylize: StylizeConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub gallery: GalleryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// "mjpeg" (network camera) or "still" (image file).
    #[serde(default = "default_source_kind")]
    pub kind: String,
    #[serde(default = "default_stream_url")]
    pub url: String,
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_max_frame_age_ms")]
    pub max_frame_age_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreviewConfig {
    #[serde(default = "default_fps")]
    pub fps: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StylizeConfig {
    #[serde(default = "default_denoise_ksize")]
    pub denoise_ksize: usize,
    #[serde(default = "default_sigma_s")]
    pub sigma_s: f32,
    #[serde(default = "default_sigma_r")]
    pub sigma_r: f32,
    /// Feed the denoised frame into the abstraction stage instead of the
    /// raw capture.
    #[serde(default)]
    pub feed_denoised: bool,
    /// 0 disables the watchdog.
    #[serde(default)]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct GalleryConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Falls back to the user's pictures directory when unset.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: default_source_kind(),
            url: default_stream_url(),
            path: None,
            max_frame_age_ms: default_max_frame_age_ms(),
        }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self { fps: default_fps() }
    }
}

impl Default for StylizeConfig {
    fn default() -> Self {
        Self {
            denoise_ksize: default_denoise_ksize(),
            sigma_s: default_sigma_s(),
            sigma_r: default_sigma_r(),
            feed_denoised: false,
            timeout_ms: 0,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::parse(&content)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.stylize;
        if s.denoise_ksize == 0 || s.denoise_ksize % 2 == 0 {
            return Err(ConfigError::Invalid(format!(
                "stylize.denoise_ksize must be odd and positive, got {}",
                s.denoise_ksize
            )));
        }
        if !(s.sigma_s > 0.0 && s.sigma_s <= 200.0) {
            return Err(ConfigError::Invalid(format!(
                "stylize.sigma_s must be in (0, 200], got {}",
                s.sigma_s
            )));
        }
        if !(s.sigma_r > 0.0 && s.sigma_r <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "stylize.sigma_r must be in (0, 1], got {}",
                s.sigma_r
            )));
        }
        if !(1..=100).contains(&self.output.jpeg_quality) {
            return Err(ConfigError::Invalid(format!(
                "output.jpeg_quality must be in 1..=100, got {}",
                self.output.jpeg_quality
            )));
        }
        if !(self.preview.fps > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "preview.fps must be positive, got {}",
                self.preview.fps
            )));
        }
        match self.source.kind.as_str() {
            "mjpeg" => {}
            "still" if self.source.path.is_some() => {}
            "still" => {
                return Err(ConfigError::Invalid(
                    "source.path is required when source.kind = \"still\"".into(),
                ))
            }
            other => {
                return Err(ConfigError::Invalid(format!(
                    "unknown source.kind {other:?}, expected \"mjpeg\" or \"still\""
                )))
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_source_kind() -> String {
    "mjpeg".into()
}
fn default_stream_url() -> String {
    "http://127.0.0.1:8080/stream".into()
}
fn default_max_frame_age_ms() -> u64 {
    1000
}
fn default_fps() -> f64 {
    30.0
}
fn default_denoise_ksize() -> usize {
    7
}
fn default_sigma_s() -> f32 {
    150.0
}
fn default_sigma_r() -> f32 {
    0.25
}
fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_jpeg_quality() -> u8 {
    95
}
fn default_log_level() -> String {
    "info".into()
}
