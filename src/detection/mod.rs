pub mod acquire;
pub mod clahe;
pub mod contours;
pub mod denoise;
pub mod ocr;
pub mod preprocessing;
pub mod selection;

use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbImage;
use log::{debug, info, warn};
use rayon::prelude::*;

use crate::config::DetectorConfig;
use crate::debug::DebugOutput;
use crate::error::{PlateError, Result};
use crate::models::{FinalResult, MatchOrigin, RecognitionHypothesis, RegionCandidate};
use acquire::{ImageAcquirer, ImageLocation};
use ocr::TextRecognizer;
use preprocessing::Preprocessor;
use selection::{PlateValidator, RegexPlateValidator};

/// Wall-clock budget for one detection.
struct Deadline {
    start: Instant,
    budget: Option<Duration>,
}

impl Deadline {
    fn new(budget: Option<Duration>) -> Self {
        Self {
            start: Instant::now(),
            budget,
        }
    }

    fn check(&self, stage: &'static str) -> Result<()> {
        match self.budget {
            Some(budget) if self.start.elapsed() > budget => {
                Err(PlateError::Timeout { stage, budget })
            }
            _ => Ok(()),
        }
    }
}

/// Main detection pipeline orchestrator
///
/// Owns the configuration and a shared recognizer. One instance is built at
/// startup and reused for every image; `detect` takes `&self` and may be
/// called from several threads at once.
pub struct DetectionPipeline {
    config: DetectorConfig,
    acquirer: ImageAcquirer,
    preprocessor: Preprocessor,
    recognizer: Arc<dyn TextRecognizer>,
    validator: Arc<dyn PlateValidator>,
    debug_out: Option<DebugOutput>,
}

impl DetectionPipeline {
    pub fn new(config: DetectorConfig, recognizer: Arc<dyn TextRecognizer>) -> Result<Self> {
        config.validate()?;
        let validator = Arc::new(RegexPlateValidator::new(&config.selection.plate_pattern)?);
        debug!("Validating plates against {}", validator.pattern());
        Ok(Self {
            acquirer: ImageAcquirer::new(config.acquire.clone()),
            preprocessor: Preprocessor::new(config.preprocess.clone()),
            config,
            recognizer,
            validator,
            debug_out: None,
        })
    }

    /// Swap the plate-format check, e.g. for a regional plate variant.
    pub fn with_validator(mut self, validator: Arc<dyn PlateValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Save intermediate images for every processed input.
    pub fn with_debug(mut self, debug_out: DebugOutput) -> Self {
        self.debug_out = Some(debug_out);
        self
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn debug_output(&self) -> Option<&DebugOutput> {
        self.debug_out.as_ref()
    }

    /// Read the plate from the image at `location`.
    ///
    /// Acquisition, decode and timeout failures are returned as errors;
    /// finding nothing is `Ok(FinalResult::NoDetection)`.
    pub fn detect(&self, location: &ImageLocation) -> Result<FinalResult> {
        self.detect_with_debug(location, self.debug_out.as_ref())
    }

    /// Like [`Self::detect`], writing intermediate images to `debug_out`
    /// instead of the pipeline's own debug directory.
    pub fn detect_with_debug(
        &self,
        location: &ImageLocation,
        debug_out: Option<&DebugOutput>,
    ) -> Result<FinalResult> {
        info!("Processing {}", location);
        let deadline = Deadline::new(self.config.processing_budget());
        let img = self.acquirer.acquire(location)?;
        deadline.check("image acquisition")?;
        self.run(img, &deadline, debug_out)
    }

    /// Same as [`Self::detect`] for an already decoded image.
    pub fn detect_image(&self, img: RgbImage) -> Result<FinalResult> {
        let deadline = Deadline::new(self.config.processing_budget());
        let img = acquire::normalize_width(img, self.config.acquire.max_width);
        self.run(img, &deadline, self.debug_out.as_ref())
    }

    fn run(
        &self,
        img: RgbImage,
        deadline: &Deadline,
        debug_out: Option<&DebugOutput>,
    ) -> Result<FinalResult> {
        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return Err(PlateError::EmptyImage { width, height });
        }
        debug!("Image normalized to {}x{}", width, height);
        if let Some(out) = debug_out {
            out.save_rgb("00_input", &img)?;
        }

        let mask = self.preprocessor.process_with_debug(&img, debug_out)?;
        deadline.check("preprocessing")?;

        let candidates = contours::detect_candidates(&mask, &self.config.candidates);
        drop(mask);
        deadline.check("candidate detection")?;

        if let Some(out) = debug_out {
            let padding = self.config.recognition.padding;
            for (i, candidate) in candidates.iter().enumerate() {
                if let Some(crop) = ocr::crop_with_padding(&img, candidate, padding) {
                    out.save_candidate(i, &crop)?;
                }
            }
        }

        let hypotheses = self.recognize_candidates(&img, &candidates);
        deadline.check("region recognition")?;

        if let Some(best) =
            selection::select_best(hypotheses, self.validator.as_ref(), MatchOrigin::Region)
        {
            info!("Detected '{}' (confidence {:.2})", best.text(), best.confidence());
            return Ok(FinalResult::Detected(best));
        }

        let result = self.fallback(&img);
        deadline.check("full-image recognition")?;
        Ok(result)
    }

    /// Recognize every candidate and pick the best plate, falling back to
    /// the whole image once when no candidate yields one.
    pub fn select_from_candidates(
        &self,
        img: &RgbImage,
        candidates: &[RegionCandidate],
    ) -> FinalResult {
        let hypotheses = self.recognize_candidates(img, candidates);
        match selection::select_best(hypotheses, self.validator.as_ref(), MatchOrigin::Region) {
            Some(best) => FinalResult::Detected(best),
            None => self.fallback(img),
        }
    }

    fn fallback(&self, img: &RgbImage) -> FinalResult {
        debug!("No plate in candidate regions, recognizing full image");
        let hypotheses = self.recognize_or_skip(img, None);
        let result: FinalResult =
            selection::select_best(hypotheses, self.validator.as_ref(), MatchOrigin::FullImage)
                .into();
        match result.text() {
            Some(text) => info!(
                "Detected '{}' on full image (confidence {:.2})",
                text,
                result.confidence()
            ),
            None => info!("No license plate detected"),
        }
        result
    }

    /// Run OCR on each padded candidate in parallel.
    ///
    /// Hypotheses are returned in candidate order; a failing region
    /// contributes nothing.
    pub fn recognize_candidates(
        &self,
        img: &RgbImage,
        candidates: &[RegionCandidate],
    ) -> Vec<RecognitionHypothesis> {
        let padding = self.config.recognition.padding;
        candidates
            .par_iter()
            .map(|candidate| {
                let Some(crop) = ocr::crop_with_padding(img, candidate, padding) else {
                    warn!("Skipping empty region {:?}", candidate);
                    return Vec::new();
                };
                self.recognize_or_skip(&crop, Some(*candidate))
            })
            .collect::<Vec<_>>()
            .into_iter()
            .flatten()
            .collect()
    }

    fn recognize_or_skip(
        &self,
        img: &RgbImage,
        region: Option<RegionCandidate>,
    ) -> Vec<RecognitionHypothesis> {
        match self.recognizer.recognize(img) {
            Ok(hypotheses) => {
                debug!("{:?}: {} text lines", region, hypotheses.len());
                match region {
                    Some(r) => hypotheses.into_iter().map(|h| h.with_region(r)).collect(),
                    None => hypotheses,
                }
            }
            Err(e) => {
                warn!("Recognition failed for {:?}: {}", region, e);
                Vec::new()
            }
        }
    }
}
