use image::{GrayImage, Luma};
use serde::Serialize;

/// Axis-aligned region of the normalized image likely to hold plate text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegionCandidate {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl RegionCandidate {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f32 / self.height as f32
    }

    /// Grow the box by `padding` on every side, clamped to `bounds`.
    pub fn padded(&self, padding: u32, bounds: (u32, u32)) -> RegionCandidate {
        let (bound_w, bound_h) = bounds;
        let x1 = self.x.saturating_sub(padding);
        let y1 = self.y.saturating_sub(padding);
        let x2 = (self.x + self.width + padding).min(bound_w);
        let y2 = (self.y + self.height + padding).min(bound_h);
        RegionCandidate {
            x: x1,
            y: y1,
            width: x2.saturating_sub(x1),
            height: y2.saturating_sub(y1),
        }
    }
}

/// One text line reported by the recognizer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecognitionHypothesis {
    pub text: String,
    /// Always within [0, 1]
    pub confidence: f32,
    /// Candidate the text was read from; `None` for whole-image reads
    pub region: Option<RegionCandidate>,
}

impl RecognitionHypothesis {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            text: text.into(),
            confidence,
            region: None,
        }
    }

    pub fn with_region(mut self, region: RegionCandidate) -> Self {
        self.region = Some(region);
        self
    }
}

/// Where a plate match was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOrigin {
    Region,
    FullImage,
}

/// A hypothesis whose text passed the plate validator.
///
/// Only built by [`crate::detection::selection::select_best`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlateMatch {
    pub hypothesis: RecognitionHypothesis,
    pub origin: MatchOrigin,
}

impl PlateMatch {
    pub(crate) fn new(hypothesis: RecognitionHypothesis, origin: MatchOrigin) -> Self {
        Self { hypothesis, origin }
    }

    pub fn text(&self) -> &str {
        &self.hypothesis.text
    }

    pub fn confidence(&self) -> f32 {
        self.hypothesis.confidence
    }
}

/// Outcome of one detection.
#[derive(Debug, Clone, PartialEq)]
pub enum FinalResult {
    Detected(PlateMatch),
    /// Successful run that found no plate-shaped text
    NoDetection,
}

impl FinalResult {
    pub fn text(&self) -> Option<&str> {
        match self {
            FinalResult::Detected(m) => Some(m.text()),
            FinalResult::NoDetection => None,
        }
    }

    pub fn confidence(&self) -> f32 {
        match self {
            FinalResult::Detected(m) => m.confidence(),
            FinalResult::NoDetection => 0.0,
        }
    }

    pub fn is_detected(&self) -> bool {
        matches!(self, FinalResult::Detected(_))
    }

    /// The `(text, confidence)` pair handed to callers.
    pub fn into_pair(self) -> (Option<String>, f32) {
        match self {
            FinalResult::Detected(m) => (Some(m.hypothesis.text), m.hypothesis.confidence),
            FinalResult::NoDetection => (None, 0.0),
        }
    }
}

impl From<Option<PlateMatch>> for FinalResult {
    fn from(value: Option<PlateMatch>) -> Self {
        match value {
            Some(m) => FinalResult::Detected(m),
            None => FinalResult::NoDetection,
        }
    }
}

/// Single-channel mask with pixels in {0, 255}.
#[derive(Debug, Clone)]
pub struct BinaryMask(GrayImage);

impl BinaryMask {
    /// Binarize any gray image: nonzero becomes 255.
    pub fn from_gray(mut gray: GrayImage) -> Self {
        for pixel in gray.pixels_mut() {
            if pixel[0] != 0 {
                *pixel = Luma([255u8]);
            }
        }
        Self(gray)
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn as_image(&self) -> &GrayImage {
        &self.0
    }

    pub fn into_image(self) -> GrayImage {
        self.0
    }
}
