pub mod batch;
pub mod config;
pub mod debug;
pub mod detection;
pub mod error;
pub mod models;

pub use config::DetectorConfig;
pub use detection::acquire::ImageLocation;
pub use detection::ocr::{OcrsRecognizer, TextRecognizer};
pub use detection::selection::{PlateValidator, RegexPlateValidator};
pub use detection::DetectionPipeline;
pub use error::PlateError;
pub use models::{
    BinaryMask, FinalResult, MatchOrigin, PlateMatch, RecognitionHypothesis, RegionCandidate,
};
