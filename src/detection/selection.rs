use std::cmp::Ordering;

use regex::Regex;

use crate::error::{PlateError, Result};
use crate::models::{MatchOrigin, PlateMatch, RecognitionHypothesis};

/// Decides whether recognized text looks like a licence plate.
pub trait PlateValidator: Send + Sync {
    fn is_valid(&self, text: &str) -> bool;
}

/// Validator backed by a regular expression.
#[derive(Debug, Clone)]
pub struct RegexPlateValidator {
    pattern: Regex,
}

impl RegexPlateValidator {
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| PlateError::Config(format!("invalid plate pattern: {}", e)))?;
        Ok(Self { pattern })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

impl PlateValidator for RegexPlateValidator {
    fn is_valid(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

/// Stable sort by `key`, largest first. Equal keys keep their input order.
pub fn rank_desc_by<T, K, F>(items: &mut [T], mut key: F)
where
    K: PartialOrd,
    F: FnMut(&T) -> K,
{
    items.sort_by(|a, b| {
        key(b)
            .partial_cmp(&key(a))
            .unwrap_or(Ordering::Equal)
    });
}

/// Keep hypotheses that pass `validator` and return the most confident.
///
/// Ties go to the hypothesis encountered first.
pub fn select_best(
    hypotheses: Vec<RecognitionHypothesis>,
    validator: &dyn PlateValidator,
    origin: MatchOrigin,
) -> Option<PlateMatch> {
    let mut matches: Vec<RecognitionHypothesis> = hypotheses
        .into_iter()
        .filter(|h| validator.is_valid(&h.text))
        .collect();
    rank_desc_by(&mut matches, |h| h.confidence);
    matches
        .into_iter()
        .next()
        .map(|h| PlateMatch::new(h, origin))
}
