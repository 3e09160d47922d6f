use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use plate_reader::{
    DetectionPipeline, DetectorConfig, PlateError, RecognitionHypothesis, TextRecognizer,
};
use tempfile::NamedTempFile;

pub const PLATE_TEXT: &str = "MH12AB3456";
pub const PLATE_CONFIDENCE: f32 = 0.87;

type Responder = dyn Fn(&RgbImage) -> Result<Vec<RecognitionHypothesis>, PlateError> + Send + Sync;

/// Deterministic recognizer that records every call.
pub struct StubRecognizer {
    responder: Box<Responder>,
    calls: AtomicUsize,
    seen: Mutex<Vec<(u32, u32)>>,
}

impl StubRecognizer {
    pub fn new(
        responder: impl Fn(&RgbImage) -> Result<Vec<RecognitionHypothesis>, PlateError>
            + Send
            + Sync
            + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            responder: Box::new(responder),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    /// Always answer with the same hypotheses.
    pub fn returning(hypotheses: Vec<RecognitionHypothesis>) -> Arc<Self> {
        Self::new(move |_| Ok(hypotheses.clone()))
    }

    /// "Reads" the plate whenever the image contains dark ink.
    pub fn plate_reader() -> Arc<Self> {
        Self::new(|img| {
            let has_ink = img.pixels().any(|p| p.0.iter().all(|&c| c < 60));
            if has_ink {
                Ok(vec![RecognitionHypothesis::new(PLATE_TEXT, PLATE_CONFIDENCE)])
            } else {
                Ok(Vec::new())
            }
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Dimensions of every image passed in, in call order.
    pub fn seen_sizes(&self) -> Vec<(u32, u32)> {
        self.seen.lock().unwrap().clone()
    }
}

impl TextRecognizer for StubRecognizer {
    fn recognize(&self, image: &RgbImage) -> Result<Vec<RecognitionHypothesis>, PlateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(image.dimensions());
        (self.responder)(image)
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn pipeline_with(recognizer: Arc<StubRecognizer>) -> DetectionPipeline {
    pipeline_with_config(DetectorConfig::default(), recognizer)
}

pub fn pipeline_with_config(
    config: DetectorConfig,
    recognizer: Arc<StubRecognizer>,
) -> DetectionPipeline {
    init_logging();
    DetectionPipeline::new(config, recognizer).expect("valid pipeline config")
}

pub fn uniform_image(width: u32, height: u32, value: u8) -> RgbImage {
    ImageBuffer::from_pixel(width, height, Rgb([value, value, value]))
}

/// Gray background with one white plate carrying black glyph-like bars.
pub fn synthetic_plate_image() -> RgbImage {
    let mut img = uniform_image(400, 220, 170);
    let (px, py, pw, ph) = (80u32, 80u32, 240u32, 60u32);
    for y in py..py + ph {
        for x in px..px + pw {
            img.put_pixel(x, y, Rgb([250, 250, 250]));
        }
    }
    // Ten "characters", one per plate symbol
    for i in 0..10u32 {
        let x0 = px + 12 + i * 22;
        for y in py + 12..py + ph - 12 {
            for x in x0..x0 + 12 {
                img.put_pixel(x, y, Rgb([15, 15, 15]));
            }
        }
    }
    img
}

/// Bright full-width plate strip between two dark bands touching the top
/// and bottom edges, with glyph bars in the middle of the strip.
///
/// Thresholding leaves the strip as its own outer component spanning
/// `BANDED_PLATE_STRIP` rows across the whole width.
pub fn banded_plate_image() -> RgbImage {
    let (width, height) = (400u32, 140u32);
    let (strip_top, strip_bottom) = BANDED_PLATE_STRIP;
    let mut img = uniform_image(width, height, 20);
    for y in strip_top..strip_bottom {
        for x in 0..width {
            img.put_pixel(x, y, Rgb([240, 240, 240]));
        }
    }
    for i in 0..10u32 {
        let x0 = 80 + i * 22;
        for y in 50..90 {
            for x in x0..x0 + 12 {
                img.put_pixel(x, y, Rgb([15, 15, 15]));
            }
        }
    }
    img
}

/// Rows `[top, bottom)` of the bright strip in [`banded_plate_image`].
pub const BANDED_PLATE_STRIP: (u32, u32) = (25, 115);

/// Black mask with white filled rectangles `(x, y, w, h)`.
pub fn mask_with_rects(width: u32, height: u32, rects: &[(u32, u32, u32, u32)]) -> GrayImage {
    let mut mask = GrayImage::new(width, height);
    for &(x, y, w, h) in rects {
        for yy in y..y + h {
            for xx in x..x + w {
                mask.put_pixel(xx, yy, Luma([255u8]));
            }
        }
    }
    mask
}

/// Save `img` to a temporary PNG that is removed on drop.
pub fn save_temp_png(img: &RgbImage) -> NamedTempFile {
    let file = tempfile::Builder::new()
        .suffix(".png")
        .tempfile()
        .expect("Failed to create temp image file");
    img.save_with_format(file.path(), image::ImageFormat::Png)
        .expect("Failed to save test image");
    file
}
