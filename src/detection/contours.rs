use imageproc::contours::{find_contours, BorderType};
use imageproc::point::Point;
use log::debug;

use crate::config::CandidateConfig;
use crate::detection::selection::rank_desc_by;
use crate::models::{BinaryMask, RegionCandidate};

/// Outermost boundary of a foreground blob in a binary mask.
#[derive(Debug, Clone)]
pub struct Contour {
    pub points: Vec<Point<i32>>,
}

impl Contour {
    /// Polygon area enclosed by the boundary points (shoelace formula).
    pub fn area(&self) -> f64 {
        let n = self.points.len();
        if n < 3 {
            return 0.0;
        }
        let mut twice_area = 0i64;
        for i in 0..n {
            let a = self.points[i];
            let b = self.points[(i + 1) % n];
            twice_area += a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64;
        }
        twice_area.abs() as f64 / 2.0
    }

    /// Smallest axis-aligned box containing every boundary point.
    pub fn bounding_rect(&self) -> RegionCandidate {
        let Some(first) = self.points.first() else {
            return RegionCandidate::new(0, 0, 0, 0);
        };
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &self.points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        RegionCandidate::new(
            min_x.max(0) as u32,
            min_y.max(0) as u32,
            (max_x - min_x + 1) as u32,
            (max_y - min_y + 1) as u32,
        )
    }
}

/// Outer borders that are not nested inside any other blob.
pub fn find_external_contours(mask: &BinaryMask) -> Vec<Contour> {
    find_contours::<i32>(mask.as_image())
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| Contour { points: c.points })
        .collect()
}

/// Whether a bounding box has plate-like proportions.
pub fn has_plate_shape(candidate: &RegionCandidate, config: &CandidateConfig) -> bool {
    let aspect = candidate.aspect_ratio();
    aspect >= config.min_aspect_ratio
        && aspect <= config.max_aspect_ratio
        && candidate.width > config.min_width
}

/// Rank contours by area, keep the largest few and filter them by shape.
///
/// Output keeps the area-descending order of the surviving contours.
pub fn select_candidates(
    mut contours: Vec<Contour>,
    config: &CandidateConfig,
) -> Vec<RegionCandidate> {
    rank_desc_by(&mut contours, |c| c.area());
    contours.truncate(config.max_contours);

    contours
        .iter()
        .map(Contour::bounding_rect)
        .filter(|rect| has_plate_shape(rect, config))
        .collect()
}

/// Find plate-shaped regions in a preprocessed mask.
pub fn detect_candidates(mask: &BinaryMask, config: &CandidateConfig) -> Vec<RegionCandidate> {
    let contours = find_external_contours(mask);
    let total = contours.len();
    let candidates = select_candidates(contours, config);
    debug!(
        "Found {} plate-shaped regions (from {} external contours)",
        candidates.len(),
        total
    );
    candidates
}
