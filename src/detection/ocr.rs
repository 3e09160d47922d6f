use std::collections::HashSet;
use std::path::{Path, PathBuf};

use image::RgbImage;
use log::debug;
pub use ocrs::{ImageSource, OcrEngine}; // Re-export for use in other modules
use ocrs::{OcrEngineParams, TextItem};
use rten::Model;

use crate::config::RecognitionConfig;
use crate::error::{PlateError, Result};
use crate::models::{RecognitionHypothesis, RegionCandidate};

const DETECTION_MODEL: &str = "text-detection.rten";
const RECOGNITION_MODEL: &str = "text-recognition.rten";

/// Reads text lines from an RGB image.
///
/// Implementations are shared between threads for the lifetime of the
/// process, so `recognize` must be safe to call concurrently.
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, image: &RgbImage) -> Result<Vec<RecognitionHypothesis>>;
}

/// Standard ocrs model cache location (`$HOME/.cache/ocrs`)
pub fn default_models_dir() -> Result<PathBuf> {
    let home_dir = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| PlateError::ModelLoad {
            path: PathBuf::from("~/.cache/ocrs"),
            reason: "neither HOME nor USERPROFILE is set".to_string(),
        })?;
    Ok(Path::new(&home_dir).join(".cache/ocrs"))
}

/// Load the detection and recognition models from `models_dir`.
pub fn init_ocr_engine(models_dir: &Path) -> Result<OcrEngine> {
    let detection_model_path = models_dir.join(DETECTION_MODEL);
    let recognition_model_path = models_dir.join(RECOGNITION_MODEL);

    for path in [&detection_model_path, &recognition_model_path] {
        if !path.exists() {
            return Err(PlateError::ModelLoad {
                path: path.clone(),
                reason: "model file not found; download the ocrs models first".to_string(),
            });
        }
    }

    let load = |path: &Path| {
        Model::load_file(path).map_err(|e| PlateError::ModelLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    };
    let detection_model = load(&detection_model_path)?;
    let recognition_model = load(&recognition_model_path)?;

    OcrEngine::new(OcrEngineParams {
        detection_model: Some(detection_model),
        recognition_model: Some(recognition_model),
        ..Default::default()
    })
    .map_err(|e| PlateError::ModelLoad {
        path: models_dir.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Restricts recognized text to a fixed character set.
#[derive(Debug, Clone)]
pub struct Alphabet {
    allowed: HashSet<char>,
}

impl Alphabet {
    pub fn new(chars: &str) -> Self {
        Self {
            allowed: chars.chars().collect(),
        }
    }

    pub fn contains(&self, c: char) -> bool {
        self.allowed.contains(&c)
    }

    /// Map `raw` onto the alphabet and score how much of it fit.
    ///
    /// Letters outside the alphabet whose uppercase form is allowed are folded
    /// and count half; other characters are dropped. Whitespace is ignored.
    /// Returns `None` when nothing survives.
    pub fn restrict(&self, raw: &str) -> Option<(String, f32)> {
        let mut text = String::with_capacity(raw.len());
        let mut score = 0.0f32;
        let mut seen = 0usize;

        for c in raw.chars().filter(|c| !c.is_whitespace()) {
            seen += 1;
            if self.contains(c) {
                text.push(c);
                score += 1.0;
            } else {
                let upper = c.to_ascii_uppercase();
                if upper != c && self.contains(upper) {
                    text.push(upper);
                    score += 0.5;
                }
            }
        }

        if text.is_empty() {
            return None;
        }
        Some((text, (score / seen as f32).clamp(0.0, 1.0)))
    }
}

/// A recognized line with its axis-aligned extent.
#[derive(Debug, Clone, PartialEq)]
pub struct TextBox {
    pub text: String,
    pub confidence: f32,
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl TextBox {
    fn right(&self) -> f32 {
        self.left + self.width
    }

    fn center_y(&self) -> f32 {
        self.top + self.height / 2.0
    }

    fn absorb(&mut self, other: TextBox) {
        let own_len = self.text.chars().count() as f32;
        let other_len = other.text.chars().count() as f32;
        self.confidence =
            (self.confidence * own_len + other.confidence * other_len) / (own_len + other_len);
        self.text.push_str(&other.text);

        let right = self.right().max(other.right());
        let bottom = (self.top + self.height).max(other.top + other.height);
        self.left = self.left.min(other.left);
        self.top = self.top.min(other.top);
        self.width = right - self.left;
        self.height = bottom - self.top;
    }
}

fn mean_height(row: &[TextBox]) -> f32 {
    row.iter().map(|b| b.height).sum::<f32>() / row.len() as f32
}

/// Join boxes that sit on one row and nearly touch.
///
/// Boxes share a row when their vertical centres are within half the row's
/// mean height and their heights differ by less than `height_ths` of it.
/// Neighbours in a row merge when the horizontal gap is below `width_ths`
/// times their mean height. Output is ordered top to bottom, left to right.
pub fn merge_text_boxes(mut boxes: Vec<TextBox>, height_ths: f32, width_ths: f32) -> Vec<TextBox> {
    if boxes.len() < 2 {
        return boxes;
    }
    boxes.sort_by(|a, b| a.center_y().total_cmp(&b.center_y()));

    let mut rows: Vec<Vec<TextBox>> = Vec::new();
    for b in boxes {
        let fits = rows.last().is_some_and(|row| {
            let row_h = mean_height(row);
            let row_cy = row.iter().map(TextBox::center_y).sum::<f32>() / row.len() as f32;
            (row_cy - b.center_y()).abs() < 0.5 * row_h
                && (row_h - b.height).abs() < height_ths * row_h
        });
        match rows.last_mut() {
            Some(row) if fits => row.push(b),
            _ => rows.push(vec![b]),
        }
    }

    let mut merged = Vec::new();
    for mut row in rows {
        row.sort_by(|a, b| a.left.total_cmp(&b.left));
        let mut iter = row.into_iter();
        let Some(mut current) = iter.next() else {
            continue;
        };
        for next in iter {
            let gap = next.left - current.right();
            let limit = width_ths * (current.height + next.height) / 2.0;
            if gap < limit {
                current.absorb(next);
            } else {
                merged.push(std::mem::replace(&mut current, next));
            }
        }
        merged.push(current);
    }
    merged
}

/// Crop `region` grown by `padding` pixels, clamped to the image.
pub fn crop_with_padding(
    image: &RgbImage,
    region: &RegionCandidate,
    padding: u32,
) -> Option<RgbImage> {
    let padded = region.padded(padding, image.dimensions());
    if padded.width == 0 || padded.height == 0 {
        return None;
    }
    let view = image::imageops::crop_imm(image, padded.x, padded.y, padded.width, padded.height);
    Some(view.to_image())
}

/// [`TextRecognizer`] backed by the ocrs neural OCR engine.
///
/// The engine holds immutable model weights and runs inference through
/// `&self`, so one instance serves every thread without locking.
pub struct OcrsRecognizer {
    engine: OcrEngine,
    alphabet: Alphabet,
    height_ths: f32,
    width_ths: f32,
}

impl OcrsRecognizer {
    pub fn new(engine: OcrEngine, config: &RecognitionConfig) -> Self {
        Self {
            engine,
            alphabet: Alphabet::new(&config.alphabet),
            height_ths: config.height_ths,
            width_ths: config.width_ths,
        }
    }

    /// Load models from `config.models_dir` or the default cache location.
    pub fn from_config(config: &RecognitionConfig) -> Result<Self> {
        let models_dir = match &config.models_dir {
            Some(dir) => dir.clone(),
            None => default_models_dir()?,
        };
        debug!("Loading OCR models from {}", models_dir.display());
        let engine = init_ocr_engine(&models_dir)?;
        Ok(Self::new(engine, config))
    }
}

impl TextRecognizer for OcrsRecognizer {
    fn recognize(&self, image: &RgbImage) -> Result<Vec<RecognitionHypothesis>> {
        let recognition_err = |e: &dyn std::fmt::Display| PlateError::Recognition(e.to_string());

        let img_source = ImageSource::from_bytes(image.as_raw(), image.dimensions())
            .map_err(|e| recognition_err(&e))?;
        let ocr_input = self
            .engine
            .prepare_input(img_source)
            .map_err(|e| recognition_err(&e))?;

        let word_rects = self
            .engine
            .detect_words(&ocr_input)
            .map_err(|e| recognition_err(&e))?;
        let line_rects = self.engine.find_text_lines(&ocr_input, &word_rects);
        let lines = self
            .engine
            .recognize_text(&ocr_input, &line_rects)
            .map_err(|e| recognition_err(&e))?;

        let boxes: Vec<TextBox> = lines
            .iter()
            .flatten()
            .filter_map(|line| {
                let (text, confidence) = self.alphabet.restrict(&line.to_string())?;
                let rect = line.bounding_rect();
                Some(TextBox {
                    text,
                    confidence,
                    left: rect.left() as f32,
                    top: rect.top() as f32,
                    width: rect.width() as f32,
                    height: rect.height() as f32,
                })
            })
            .collect();

        Ok(merge_text_boxes(boxes, self.height_ths, self.width_ths)
            .into_iter()
            .map(|b| RecognitionHypothesis::new(b.text, b.confidence))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_box(text: &str, left: f32, top: f32, width: f32, height: f32) -> TextBox {
        TextBox {
            text: text.to_string(),
            confidence: 1.0,
            left,
            top,
            width,
            height,
        }
    }

    #[test]
    fn restrict_drops_separators_and_folds_case() {
        let alphabet = Alphabet::new(crate::config::DEFAULT_ALPHABET);
        let (text, conf) = alphabet.restrict("MH 12-ab").unwrap();
        assert_eq!(text, "MH12AB");
        // M H 1 2 count 1, a b count 0.5, '-' counts 0
        assert!((conf - 5.0 / 7.0).abs() < 1e-6);
        assert!(alphabet.restrict(" -- ").is_none());
    }

    #[test]
    fn neighbouring_words_on_a_row_are_merged() {
        let boxes = vec![
            text_box("AB3456", 70.0, 10.0, 60.0, 20.0),
            text_box("MH12", 10.0, 11.0, 55.0, 20.0),
        ];
        let merged = merge_text_boxes(boxes, 0.5, 0.5);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].text, "MH12AB3456");
        assert_eq!(merged[0].left, 10.0);
    }

    #[test]
    fn distant_or_mismatched_boxes_stay_apart() {
        let boxes = vec![
            text_box("MH12", 10.0, 10.0, 40.0, 20.0),
            text_box("FAR", 200.0, 10.0, 40.0, 20.0),
            text_box("LOWER", 10.0, 60.0, 40.0, 20.0),
            text_box("TALL", 55.0, 0.0, 40.0, 45.0),
        ];
        let merged = merge_text_boxes(boxes, 0.5, 0.5);
        let texts: Vec<&str> = merged.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(texts.len(), 4);
        assert!(texts.contains(&"FAR"));
        assert!(texts.contains(&"LOWER"));
    }

    #[test]
    fn merged_confidence_is_length_weighted() {
        let mut a = text_box("AAAA", 0.0, 0.0, 40.0, 20.0);
        a.confidence = 1.0;
        let mut b = text_box("BB", 42.0, 0.0, 20.0, 20.0);
        b.confidence = 0.4;
        let merged = merge_text_boxes(vec![a, b], 0.5, 0.5);
        assert_eq!(merged.len(), 1);
        assert!((merged[0].confidence - 0.8).abs() < 1e-6);
    }
}
