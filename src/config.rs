use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{PlateError, Result};

const DEFAULT_MAX_WIDTH: u32 = 800;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 15;
const DEFAULT_MAX_DOWNLOAD_BYTES: u64 = 20 * 1024 * 1024;
const DEFAULT_PROCESSING_BUDGET_SECS: u64 = 60;
pub const DEFAULT_ALPHABET: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
pub const DEFAULT_PLATE_PATTERN: &str = r"^[A-Z0-9]{6,10}$";

/// All tunables of the detector, fixed once at process start.
///
/// `Default` yields the reference constants. A TOML file may override any
/// subset of fields; missing keys keep their defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub acquire: AcquireConfig,
    pub preprocess: PreprocessConfig,
    pub candidates: CandidateConfig,
    pub recognition: RecognitionConfig,
    pub selection: SelectionConfig,
    /// Overall wall-clock budget for one detection; `None` disables the check
    pub processing_budget_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AcquireConfig {
    /// Images wider than this are scaled down to exactly this width
    pub max_width: u32,
    pub fetch_timeout_secs: u64,
    pub max_download_bytes: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub clahe_clip_limit: f32,
    pub clahe_tiles: u32,
    pub denoise_strength: f32,
    pub denoise_patch_size: u32,
    pub denoise_search_size: u32,
    pub threshold_block_size: u32,
    pub threshold_offset: f32,
    pub dilate_iterations: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CandidateConfig {
    pub max_contours: usize,
    pub min_aspect_ratio: f32,
    pub max_aspect_ratio: f32,
    /// Candidates must be strictly wider than this
    pub min_width: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    pub alphabet: String,
    pub padding: u32,
    pub height_ths: f32,
    pub width_ths: f32,
    /// Directory holding `text-detection.rten` and `text-recognition.rten`
    pub models_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    pub plate_pattern: String,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            acquire: AcquireConfig::default(),
            preprocess: PreprocessConfig::default(),
            candidates: CandidateConfig::default(),
            recognition: RecognitionConfig::default(),
            selection: SelectionConfig::default(),
            processing_budget_secs: Some(DEFAULT_PROCESSING_BUDGET_SECS),
        }
    }
}

impl Default for AcquireConfig {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_MAX_WIDTH,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            max_download_bytes: DEFAULT_MAX_DOWNLOAD_BYTES,
        }
    }
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            clahe_clip_limit: 3.0,
            clahe_tiles: 8,
            denoise_strength: 30.0,
            denoise_patch_size: 7,
            denoise_search_size: 21,
            threshold_block_size: 11,
            threshold_offset: 2.0,
            dilate_iterations: 1,
        }
    }
}

impl Default for CandidateConfig {
    fn default() -> Self {
        Self {
            max_contours: 15,
            min_aspect_ratio: 2.0,
            max_aspect_ratio: 5.0,
            min_width: 100,
        }
    }
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            alphabet: DEFAULT_ALPHABET.to_string(),
            padding: 10,
            height_ths: 0.5,
            width_ths: 0.5,
            models_dir: None,
        }
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            plate_pattern: DEFAULT_PLATE_PATTERN.to_string(),
        }
    }
}

impl AcquireConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl DetectorConfig {
    /// Parse a TOML document, falling back to defaults for absent keys.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: DetectorConfig =
            toml::from_str(raw).map_err(|e| PlateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| PlateError::Config(format!("read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&raw)
    }

    pub fn processing_budget(&self) -> Option<Duration> {
        self.processing_budget_secs.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<()> {
        let pre = &self.preprocess;
        if self.acquire.max_width == 0 {
            return Err(PlateError::Config("acquire.max_width must be > 0".into()));
        }
        if pre.clahe_tiles == 0 {
            return Err(PlateError::Config("preprocess.clahe_tiles must be > 0".into()));
        }
        if pre.clahe_clip_limit <= 0.0 {
            return Err(PlateError::Config(
                "preprocess.clahe_clip_limit must be positive".into(),
            ));
        }
        if pre.threshold_block_size < 3 || pre.threshold_block_size % 2 == 0 {
            return Err(PlateError::Config(format!(
                "preprocess.threshold_block_size must be odd and >= 3, got {}",
                pre.threshold_block_size
            )));
        }
        if pre.denoise_patch_size % 2 == 0 || pre.denoise_search_size % 2 == 0 {
            return Err(PlateError::Config(
                "preprocess.denoise_patch_size and denoise_search_size must be odd".into(),
            ));
        }
        if pre.denoise_strength <= 0.0 {
            return Err(PlateError::Config(
                "preprocess.denoise_strength must be positive".into(),
            ));
        }

        let cand = &self.candidates;
        if cand.min_aspect_ratio > cand.max_aspect_ratio {
            return Err(PlateError::Config(format!(
                "candidates.min_aspect_ratio ({}) exceeds max_aspect_ratio ({})",
                cand.min_aspect_ratio, cand.max_aspect_ratio
            )));
        }

        let rec = &self.recognition;
        if rec.alphabet.is_empty() {
            return Err(PlateError::Config("recognition.alphabet is empty".into()));
        }
        if rec.height_ths < 0.0 || rec.width_ths < 0.0 {
            return Err(PlateError::Config(
                "recognition.height_ths and width_ths must be non-negative".into(),
            ));
        }

        regex::Regex::new(&self.selection.plate_pattern)
            .map_err(|e| PlateError::Config(format!("selection.plate_pattern: {}", e)))?;

        Ok(())
    }
}
