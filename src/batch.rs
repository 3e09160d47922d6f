use std::path::{Path, PathBuf};

use log::warn;
use serde::Serialize;

use crate::debug::DebugOutput;
use crate::detection::acquire::ImageLocation;
use crate::detection::DetectionPipeline;
use crate::error::{PlateError, Result};
use crate::models::FinalResult;

pub const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

/// Whether `path` has a supported image extension (case-insensitive).
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

/// Image files directly inside `dir`, sorted by name.
pub fn scan_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| PlateError::Acquisition {
        source_ref: dir.display().to_string(),
        reason: e.to_string(),
    })?;

    let mut images = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| PlateError::Acquisition {
            source_ref: dir.display().to_string(),
            reason: e.to_string(),
        })?;
        let path = entry.path();
        if path.is_file() && is_image_file(&path) {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

/// Result for one file of a batch run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchEntry {
    pub path: PathBuf,
    pub text: Option<String>,
    pub confidence: f32,
    /// Set when the pipeline failed on this file
    pub error: Option<String>,
}

impl BatchEntry {
    fn from_outcome(path: PathBuf, outcome: Result<FinalResult>) -> Self {
        match outcome {
            Ok(result) => {
                let (text, confidence) = result.into_pair();
                Self {
                    path,
                    text,
                    confidence,
                    error: None,
                }
            }
            Err(e) => Self {
                path,
                text: None,
                confidence: 0.0,
                error: Some(e.to_string()),
            },
        }
    }

    pub fn is_detected(&self) -> bool {
        self.text.is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub entries: Vec<BatchEntry>,
}

impl BatchReport {
    pub fn detections(&self) -> usize {
        self.entries.iter().filter(|e| e.is_detected()).count()
    }

    /// Files processed successfully without a plate.
    pub fn misses(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.error.is_none() && !e.is_detected())
            .count()
    }

    pub fn failures(&self) -> usize {
        self.entries.iter().filter(|e| e.error.is_some()).count()
    }

    /// Mean confidence over files with a detection; `None` if there are none.
    pub fn average_confidence(&self) -> Option<f32> {
        let detected: Vec<f32> = self
            .entries
            .iter()
            .filter(|e| e.is_detected())
            .map(|e| e.confidence)
            .collect();
        if detected.is_empty() {
            return None;
        }
        Some(detected.iter().sum::<f32>() / detected.len() as f32)
    }
}

/// Run the pipeline on every image in `dir`.
///
/// Per-file failures are recorded in the report rather than aborting the run.
/// `on_start` is called before each file and `on_entry` as it finishes.
/// With debug output enabled, each file gets a subdirectory named after it.
pub fn run_batch(
    pipeline: &DetectionPipeline,
    dir: &Path,
    mut on_start: impl FnMut(&Path),
    mut on_entry: impl FnMut(&BatchEntry),
) -> Result<BatchReport> {
    let mut report = BatchReport::default();
    for path in scan_images(dir)? {
        on_start(&path);
        let outcome = item_debug(pipeline, &path).and_then(|debug_out| {
            pipeline.detect_with_debug(&ImageLocation::from(path.as_path()), debug_out.as_ref())
        });
        if let Err(e) = &outcome {
            warn!("Error processing {}: {}", path.display(), e);
        }
        let entry = BatchEntry::from_outcome(path, outcome);
        on_entry(&entry);
        report.entries.push(entry);
    }
    Ok(report)
}

fn item_debug(pipeline: &DetectionPipeline, path: &Path) -> Result<Option<DebugOutput>> {
    let Some(out) = pipeline.debug_output() else {
        return Ok(None);
    };
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    out.for_item(&name).map(Some)
}
