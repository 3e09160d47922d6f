use std::path::PathBuf;

use image::{ImageBuffer, Rgb};
use plate_reader::config::RecognitionConfig;
use plate_reader::detection::ocr::init_ocr_engine;
use plate_reader::{OcrsRecognizer, PlateError, TextRecognizer};

#[test]
fn missing_models_are_reported() {
    let dir = tempfile::TempDir::new().unwrap();
    let err = init_ocr_engine(dir.path()).err().expect("models are absent");
    let PlateError::ModelLoad { path, .. } = err else {
        panic!("expected ModelLoad, got {err:?}");
    };
    assert_eq!(path, dir.path().join("text-detection.rten"));
}

#[test]
fn recognizer_config_points_at_models_dir() {
    let config = RecognitionConfig {
        models_dir: Some(PathBuf::from("/nonexistent/ocrs-models")),
        ..RecognitionConfig::default()
    };
    assert!(matches!(
        OcrsRecognizer::from_config(&config),
        Err(PlateError::ModelLoad { .. })
    ));
}

/// Needs `text-detection.rten` and `text-recognition.rten` in ~/.cache/ocrs
#[test]
#[ignore]
fn real_engine_finds_nothing_on_blank_image() {
    let recognizer = OcrsRecognizer::from_config(&RecognitionConfig::default()).unwrap();
    let blank = ImageBuffer::from_pixel(320, 120, Rgb([255u8, 255, 255]));
    let hypotheses = recognizer.recognize(&blank).unwrap();
    assert!(hypotheses.is_empty());
}
