use plate_reader::detection::selection::{rank_desc_by, select_best};
use plate_reader::{MatchOrigin, PlateValidator, RecognitionHypothesis, RegexPlateValidator};

fn hyp(text: &str, confidence: f32) -> RecognitionHypothesis {
    RecognitionHypothesis::new(text, confidence)
}

fn default_validator() -> RegexPlateValidator {
    RegexPlateValidator::new(plate_reader::config::DEFAULT_PLATE_PATTERN).unwrap()
}

#[test]
fn plate_pattern_accepts_uppercase_alphanumerics() {
    let validator = default_validator();
    assert!(validator.is_valid("AB1234CD"));
    assert!(validator.is_valid("123456"));
    assert!(validator.is_valid("KA01AB1234"));
    assert!(!validator.is_valid("ab1234"));
    assert!(!validator.is_valid("AB12"));
    assert!(!validator.is_valid("KA01AB12345"));
    assert!(!validator.is_valid("AB 1234"));
    assert!(!validator.is_valid(""));
    assert_eq!(validator.pattern(), "^[A-Z0-9]{6,10}$");
}

#[test]
fn highest_confidence_plate_wins() {
    let hypotheses = vec![
        hyp("KA01AB1234", 0.62),
        hyp("KA01AB1234", 0.91),
        hyp("XY99ZZ0001", 0.40),
    ];
    let best = select_best(hypotheses, &default_validator(), MatchOrigin::Region).unwrap();
    assert_eq!(best.text(), "KA01AB1234");
    assert_eq!(best.confidence(), 0.91);
    assert_eq!(best.origin, MatchOrigin::Region);
}

#[test]
fn invalid_text_never_wins_even_when_confident() {
    let hypotheses = vec![hyp("NOT A PLATE", 0.99), hyp("MH12AB3456", 0.30)];
    let best = select_best(hypotheses, &default_validator(), MatchOrigin::FullImage).unwrap();
    assert_eq!(best.text(), "MH12AB3456");
    assert_eq!(best.origin, MatchOrigin::FullImage);
}

#[test]
fn ties_go_to_the_first_hypothesis() {
    let hypotheses = vec![hyp("AAA111", 0.5), hyp("BBB222", 0.8), hyp("CCC333", 0.8)];
    let best = select_best(hypotheses, &default_validator(), MatchOrigin::Region).unwrap();
    assert_eq!(best.text(), "BBB222");
}

#[test]
fn nothing_valid_selects_nothing() {
    let hypotheses = vec![hyp("ab1234", 0.9), hyp("AB12", 0.8)];
    assert!(select_best(hypotheses, &default_validator(), MatchOrigin::Region).is_none());
    assert!(select_best(Vec::new(), &default_validator(), MatchOrigin::Region).is_none());
}

#[test]
fn rank_is_stable_and_descending() {
    let mut items = vec![(1, 0.2), (2, 0.9), (3, 0.2), (4, 0.9), (5, 0.5)];
    rank_desc_by(&mut items, |&(_, score)| score);
    let order: Vec<i32> = items.iter().map(|&(id, _)| id).collect();
    assert_eq!(order, vec![2, 4, 5, 1, 3]);
}

#[test]
fn confidence_is_clamped_to_unit_interval() {
    assert_eq!(hyp("AB1234", 1.7).confidence, 1.0);
    assert_eq!(hyp("AB1234", -0.2).confidence, 0.0);
    assert_eq!(hyp("AB1234", f32::NAN).confidence, 0.0);
}

struct DigitsOnly;

impl PlateValidator for DigitsOnly {
    fn is_valid(&self, text: &str) -> bool {
        text.len() == 6 && text.chars().all(|c| c.is_ascii_digit())
    }
}

#[test]
fn validators_are_pluggable() {
    let hypotheses = vec![hyp("AB1234", 0.9), hyp("123456", 0.4)];
    let best = select_best(hypotheses, &DigitsOnly, MatchOrigin::Region).unwrap();
    assert_eq!(best.text(), "123456");

    let custom = RegexPlateValidator::new(r"^[A-Z]{2}[0-9]{4}$").unwrap();
    assert!(custom.is_valid("AB1234"));
    assert!(!custom.is_valid("123456"));
    assert!(RegexPlateValidator::new("[unclosed").is_err());
}
