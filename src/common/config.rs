use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::common::error::{FaceGateError, Result};

pub const DEFAULT_CONFIG_PATH: &str = "configs/facegate.toml";

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub recognizer: RecognizerConfig,
    #[serde(default)]
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub recognition: RecognitionConfig,
    #[serde(default)]
    pub enrollment: EnrollmentConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CameraConfig {
    /// 999 means auto-detect
    #[serde(default)]
    pub device_index: u32,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_warmup_frames")]
    pub warmup_frames: u32,
    #[serde(default = "default_warmup_delay")]
    pub warmup_delay_ms: u64,
    /// Upper bound on how long a single frame read may wait.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            width: default_width(),
            height: default_height(),
            warmup_frames: default_warmup_frames(),
            warmup_delay_ms: default_warmup_delay(),
            poll_timeout_ms: default_poll_timeout(),
        }
    }
}

fn default_width() -> u32 { 640 }
fn default_height() -> u32 { 480 }
fn default_warmup_frames() -> u32 { 2 }
fn default_warmup_delay() -> u64 { 50 }
fn default_poll_timeout() -> u64 { 10 }

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DetectorConfig {
    #[serde(default = "default_detector_path")]
    pub model_path: PathBuf,
    #[serde(default = "default_min_face_size")]
    pub min_face_size: u32,
    #[serde(default = "default_score_thresh")]
    pub score_thresh: f64,
    #[serde(default = "default_pyramid_scale")]
    pub pyramid_scale_factor: f32,
    #[serde(default = "default_window_step")]
    pub slide_window_step: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: default_detector_path(),
            min_face_size: default_min_face_size(),
            score_thresh: default_score_thresh(),
            pyramid_scale_factor: default_pyramid_scale(),
            slide_window_step: default_window_step(),
        }
    }
}

fn default_detector_path() -> PathBuf { PathBuf::from("models/seeta_fd_frontal_v1.0.bin") }
fn default_min_face_size() -> u32 { 60 }
fn default_score_thresh() -> f64 { 2.0 }
fn default_pyramid_scale() -> f32 { 0.8 }
fn default_window_step() -> u32 { 4 }

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecognizerBackend {
    #[default]
    Onnx,
    Lbph,
}

impl RecognizerBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecognizerBackend::Onnx => "onnx",
            RecognizerBackend::Lbph => "lbph",
        }
    }
}

impl std::fmt::Display for RecognizerBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecognizerConfig {
    #[serde(default)]
    pub backend: RecognizerBackend,
    #[serde(default = "default_recognizer_path")]
    pub model_path: PathBuf,
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    #[serde(default = "default_normalization")]
    pub normalization_value: f32,
    #[serde(default = "default_lbph_grid")]
    pub lbph_grid_x: u32,
    #[serde(default = "default_lbph_grid")]
    pub lbph_grid_y: u32,
    #[serde(default = "default_lbph_face_size")]
    pub lbph_face_size: u32,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            backend: RecognizerBackend::default(),
            model_path: default_recognizer_path(),
            input_size: default_input_size(),
            normalization_value: default_normalization(),
            lbph_grid_x: default_lbph_grid(),
            lbph_grid_y: default_lbph_grid(),
            lbph_face_size: default_lbph_face_size(),
        }
    }
}

fn default_recognizer_path() -> PathBuf { PathBuf::from("models/facenet.onnx") }
fn default_input_size() -> u32 { 160 }
fn default_normalization() -> f32 { 127.5 }
fn default_lbph_grid() -> u32 { 8 }
fn default_lbph_face_size() -> u32 { 96 }

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MatcherConfig {
    /// Maximum cosine distance accepted as a positive match.
    #[serde(default = "default_distance_threshold")]
    pub distance_threshold: f32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self { distance_threshold: default_distance_threshold() }
    }
}

fn default_distance_threshold() -> f32 { 0.45 }

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecognitionConfig {
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_true")]
    pub rebuild_gallery_on_start: bool,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            rebuild_gallery_on_start: true,
        }
    }
}

fn default_tick_interval() -> u64 { 30 }
fn default_true() -> bool { true }

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EnrollmentConfig {
    #[serde(default = "default_capture_timeout")]
    pub capture_timeout_secs: u64,
    /// Extra border kept around the detected box, as a fraction of its size.
    #[serde(default = "default_crop_margin")]
    pub crop_margin: f32,
    #[serde(default)]
    pub manual_capture: bool,
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            capture_timeout_secs: default_capture_timeout(),
            crop_margin: default_crop_margin(),
            manual_capture: false,
        }
    }
}

fn default_capture_timeout() -> u64 { 7 }
fn default_crop_margin() -> f32 { 0.2 }

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { data_dir: default_data_dir() }
    }
}

fn default_data_dir() -> PathBuf { PathBuf::from("Datos") }

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PerformanceConfig {
    #[serde(default = "default_optimization_level")]
    pub optimization_level: u32,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self { optimization_level: default_optimization_level() }
    }
}

fn default_optimization_level() -> u32 { 3 }

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct PreviewConfig {
    #[serde(default)]
    pub ascii_width: Option<usize>,
    #[serde(default)]
    pub ascii_height: Option<usize>,
}

impl Config {
    /// Loads `path` when given, otherwise the default location, falling back to
    /// built-in defaults when no file exists there.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    Self::load_from_path(default_path)
                } else {
                    tracing::info!("No config at {}, using built-in defaults", DEFAULT_CONFIG_PATH);
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FaceGateError::Config(format!(
                "Config file not found: {}", path.display()
            )));
        }

        tracing::info!("Loading config from: {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| FaceGateError::Config(format!("Config parse error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.camera.width == 0 || self.camera.width > 4096 {
            return Err(FaceGateError::Config(format!(
                "Camera width must be between 1 and 4096, got {}", self.camera.width
            )));
        }
        if self.camera.height == 0 || self.camera.height > 4096 {
            return Err(FaceGateError::Config(format!(
                "Camera height must be between 1 and 4096, got {}", self.camera.height
            )));
        }

        // Cosine distance lives in [0, 2]
        if !(0.0..=2.0).contains(&self.matcher.distance_threshold) {
            return Err(FaceGateError::Config(format!(
                "Distance threshold must be between 0.0 and 2.0, got {}",
                self.matcher.distance_threshold
            )));
        }

        if self.detector.min_face_size < 20 {
            return Err(FaceGateError::Config(format!(
                "Detector min face size must be at least 20, got {}",
                self.detector.min_face_size
            )));
        }
        if !(0.01..1.0).contains(&self.detector.pyramid_scale_factor) {
            return Err(FaceGateError::Config(format!(
                "Pyramid scale factor must be in (0, 1), got {}",
                self.detector.pyramid_scale_factor
            )));
        }
        if self.detector.slide_window_step == 0 {
            return Err(FaceGateError::Config("Slide window step must be positive".into()));
        }

        if self.recognizer.input_size == 0 || self.recognizer.input_size > 1024 {
            return Err(FaceGateError::Config(format!(
                "Recognizer input size must be between 1 and 1024, got {}",
                self.recognizer.input_size
            )));
        }
        if self.recognizer.lbph_grid_x == 0 || self.recognizer.lbph_grid_y == 0 {
            return Err(FaceGateError::Config("LBPH grid must be at least 1x1".into()));
        }
        if self.recognizer.lbph_face_size < 3 * self.recognizer.lbph_grid_x.max(self.recognizer.lbph_grid_y) {
            return Err(FaceGateError::Config(format!(
                "LBPH face size {} is too small for a {}x{} grid",
                self.recognizer.lbph_face_size,
                self.recognizer.lbph_grid_x,
                self.recognizer.lbph_grid_y
            )));
        }

        if self.recognition.tick_interval_ms == 0 || self.recognition.tick_interval_ms > 1000 {
            return Err(FaceGateError::Config(format!(
                "Tick interval must be between 1 and 1000 ms, got {}",
                self.recognition.tick_interval_ms
            )));
        }

        if self.enrollment.capture_timeout_secs < 1 || self.enrollment.capture_timeout_secs > 120 {
            return Err(FaceGateError::Config(format!(
                "Capture timeout must be between 1 and 120 seconds, got {}",
                self.enrollment.capture_timeout_secs
            )));
        }
        if !(0.0..=1.0).contains(&self.enrollment.crop_margin) {
            return Err(FaceGateError::Config(format!(
                "Crop margin must be between 0.0 and 1.0, got {}",
                self.enrollment.crop_margin
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.matcher.distance_threshold, 0.45);
        assert_eq!(config.recognition.tick_interval_ms, 30);
        assert_eq!(config.storage.data_dir, PathBuf::from("Datos"));
        assert_eq!(config.recognizer.backend, RecognizerBackend::Onnx);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config = Config::from_toml(
            r#"
            [recognizer]
            backend = "lbph"

            [matcher]
            distance_threshold = 0.3
            "#,
        )
        .unwrap();

        assert_eq!(config.recognizer.backend, RecognizerBackend::Lbph);
        assert_eq!(config.matcher.distance_threshold, 0.3);
        assert_eq!(config.camera.width, 640);
        assert_eq!(config.enrollment.capture_timeout_secs, 7);
    }

    #[test]
    fn shipped_config_matches_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join(DEFAULT_CONFIG_PATH);
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.detector.model_path, DetectorConfig::default().model_path);
        assert_eq!(config.recognizer.backend, RecognizerBackend::Onnx);
        assert_eq!(config.enrollment.crop_margin, 0.2);
        assert_eq!(config.preview.ascii_width, None);
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let err = Config::from_toml("[matcher]\ndistance_threshold = 3.5\n").unwrap_err();
        assert!(matches!(err, FaceGateError::Config(_)));
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let err = Config::load(Some(Path::new("/nonexistent/facegate.toml"))).unwrap_err();
        assert!(matches!(err, FaceGateError::Config(_)));
    }
}
