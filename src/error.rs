use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the plate detection pipeline.
///
/// `Acquisition`, `Decode`, `EmptyImage` and `Timeout` abort a single
/// detection. `Recognition` is raised by a [`crate::detection::ocr::TextRecognizer`]
/// and is absorbed by the pipeline, which treats it as "no hypotheses".
#[derive(Error, Debug)]
pub enum PlateError {
    /// Image bytes could not be fetched or read
    #[error("failed to acquire image from {source_ref}: {reason}")]
    Acquisition { source_ref: String, reason: String },

    /// Bytes were retrieved but are not a decodable image
    #[error("failed to decode image from {source_ref}: {reason}")]
    Decode { source_ref: String, reason: String },

    #[error("image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    /// Network fetch or the overall processing budget ran out
    #[error("{stage} timed out after {budget:?}")]
    Timeout { stage: &'static str, budget: Duration },

    /// OCR engine failed on one invocation
    #[error("recognition failed: {0}")]
    Recognition(String),

    #[error("failed to load OCR model {path}: {reason}")]
    ModelLoad { path: PathBuf, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to write debug output: {0}")]
    Debug(String),
}

impl PlateError {
    /// Whether this error aborts a detection rather than being skipped locally.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PlateError::Recognition(_))
    }
}

pub type Result<T> = std::result::Result<T, PlateError>;
