//! Cross-line consensus test.
//!
//! A sounding is trusted outright when a sounding from another survey line
//! lies within the search radius and agrees with it in depth. Soundings with
//! other-line neighbours that do not agree are queued for the waveform
//! corroboration check; soundings surrounded only by their own line are left
//! alone for manual review.
//!
//! Each tested point is classified by its home cell only. Agreement is
//! symmetric, so when P agrees with Q, Q reaches the same verdict from its own
//! cell and both end up corroborated without cross-cell writes. That makes
//! every grid row independent and the pass runs one row per rayon task.

use rayon::prelude::*;

use crate::config::FilterConfig;
use crate::core::sounding::SoundingPoint;
use crate::processors::grid::SearchGrid;

/// Verdict for one tested point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Isolation {
    /// An other-line neighbour agrees in depth.
    Corroborated,
    /// Only same-line neighbours within the radius.
    SingleLineOnly,
    /// Needs the waveform check against these other-line neighbours (may be
    /// empty when nothing at all lies within the radius).
    Queued(Vec<usize>),
}

/// A point awaiting the waveform corroboration check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedPoint {
    pub index: usize,
    /// Other-line neighbours within the radius.
    pub neighbors: Vec<usize>,
}

/// Result of classifying every tested point.
#[derive(Debug, Clone, Default)]
pub struct IsolationReport {
    pub corroborated: Vec<usize>,
    pub single_line: Vec<usize>,
    pub queued: Vec<QueuedPoint>,
}

impl IsolationReport {
    /// Number of points that were tested.
    pub fn tested(&self) -> usize {
        self.corroborated.len() + self.single_line.len() + self.queued.len()
    }
}

/// True if the point is the subject of the consensus test.
#[inline]
pub fn is_subject(point: &SoundingPoint, excluded: bool) -> bool {
    !point.invalid && !excluded && !point.is_exempt()
}

/// True if the point may support another point.
#[inline]
fn is_eligible_neighbor(point: &SoundingPoint, excluded: bool) -> bool {
    !point.invalid && !excluded
}

/// Distance allowed between two points: the radius widened by both
/// horizontal error estimates.
#[inline]
fn reach(radius: f64, p: &SoundingPoint, q: &SoundingPoint) -> f64 {
    radius + p.herr + q.herr
}

/// True if `q` lies within reach of `p`. The per-axis test rejects most
/// candidates before the square root.
#[inline]
pub fn within_reach(radius: f64, p: &SoundingPoint, q: &SoundingPoint) -> bool {
    let limit = reach(radius, p, q);
    let dx = (p.x - q.x).abs();
    let dy = (p.y - q.y).abs();
    if dx > limit || dy > limit {
        return false;
    }
    (dx * dx + dy * dy).sqrt() <= limit
}

/// True if two soundings agree within their mean vertical error.
#[inline]
pub fn depths_agree(p: &SoundingPoint, q: &SoundingPoint) -> bool {
    (p.z - q.z).abs() < (p.verr + q.verr) / 2.0
}

/// Classify the point at `idx` against its 3x3 block.
pub fn classify_point(
    idx: usize,
    grid: &SearchGrid,
    points: &[SoundingPoint],
    excluded: &[bool],
    radius: f64,
) -> Isolation {
    let p = &points[idx];
    let (row, col) = grid.home_of(idx);

    let mut same_line = false;
    let mut other_line = Vec::new();

    for j in grid.neighbors9(row, col) {
        if j == idx || !is_eligible_neighbor(&points[j], excluded[j]) {
            continue;
        }

        let q = &points[j];
        if !within_reach(radius, p, q) {
            continue;
        }

        if q.line == p.line {
            same_line = true;
            continue;
        }

        if depths_agree(p, q) {
            return Isolation::Corroborated;
        }
        other_line.push(j);
    }

    if other_line.is_empty() && same_line {
        Isolation::SingleLineOnly
    } else {
        Isolation::Queued(other_line)
    }
}

/// Classify every tested point, one grid row per task.
///
/// `excluded` is the exclusion state before this pass; it is read, never
/// written, so the rows can be processed in any order.
pub fn classify(
    grid: &SearchGrid,
    points: &[SoundingPoint],
    excluded: &[bool],
    config: &FilterConfig,
) -> IsolationReport {
    debug_assert_eq!(points.len(), excluded.len());
    let radius = config.search_radius_m;

    let per_row: Vec<Vec<(usize, Isolation)>> = (0..grid.rows())
        .into_par_iter()
        .map(|row| {
            let mut verdicts = Vec::new();
            for col in 0..grid.cols() {
                for &idx in grid.cell(row, col) {
                    if is_subject(&points[idx], excluded[idx]) {
                        verdicts.push((idx, classify_point(idx, grid, points, excluded, radius)));
                    }
                }
            }
            verdicts
        })
        .collect();

    let mut report = IsolationReport::default();
    for (index, verdict) in per_row.into_iter().flatten() {
        match verdict {
            Isolation::Corroborated => report.corroborated.push(index),
            Isolation::SingleLineOnly => report.single_line.push(index),
            Isolation::Queued(neighbors) => report.queued.push(QueuedPoint { index, neighbors }),
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sounding::{Channel, Waveform};

    fn sounding(id: u64, line: u32, x: f64, y: f64, z: f64) -> SoundingPoint {
        SoundingPoint::new(id, line, x, y, z, Channel::Narrow, Waveform::new(Vec::new(), Vec::new(), 0))
            .with_errors(0.2, 0.0)
    }

    fn run(points: &[SoundingPoint], excluded: &[bool], radius: f64) -> IsolationReport {
        let config = FilterConfig {
            search_radius_m: radius,
            ..FilterConfig::default()
        };
        let grid = SearchGrid::build(points, config.cell_side_m()).unwrap();
        classify(&grid, points, excluded, &config)
    }

    #[test]
    fn test_other_line_agreement_corroborates_both() {
        let points = vec![sounding(1, 1, 0.0, 0.0, 10.0), sounding(2, 2, 1.0, 0.0, 10.1)];
        let report = run(&points, &[false, false], 5.0);

        let mut corroborated = report.corroborated.clone();
        corroborated.sort_unstable();
        assert_eq!(corroborated, vec![0, 1]);
        assert!(report.queued.is_empty());
        assert!(report.single_line.is_empty());
    }

    #[test]
    fn test_same_line_only_is_skipped() {
        let points = vec![sounding(1, 7, 0.0, 0.0, 10.0), sounding(2, 7, 2.0, 1.0, 14.0)];
        let report = run(&points, &[false, false], 5.0);

        assert_eq!(report.single_line.len(), 2);
        assert!(report.corroborated.is_empty());
        assert!(report.queued.is_empty());
    }

    #[test]
    fn test_disagreeing_other_line_is_queued_with_neighbors() {
        let points = vec![
            sounding(1, 1, 0.0, 0.0, 10.0),
            sounding(2, 2, 3.0, 0.0, 12.0),
            sounding(3, 3, 0.0, 4.0, 9.0),
            sounding(4, 1, 1.0, 1.0, 10.0),
            // Other line but outside the radius.
            sounding(5, 4, 8.0, 8.0, 10.0),
        ];
        let report = run(&points, &[false; 5], 5.0);

        let first = report.queued.iter().find(|q| q.index == 0).unwrap();
        let mut neighbors = first.neighbors.clone();
        neighbors.sort_unstable();
        assert_eq!(neighbors, vec![1, 2]);
    }

    #[test]
    fn test_nothing_nearby_is_queued_empty() {
        let points = vec![sounding(1, 1, 0.0, 0.0, 10.0), sounding(2, 2, 60.0, 0.0, 10.0)];
        let report = run(&points, &[false, false], 5.0);

        assert_eq!(report.queued.len(), 2);
        assert!(report.queued.iter().all(|q| q.neighbors.is_empty()));
    }

    #[test]
    fn test_excluded_and_invalid_neighbors_ignored() {
        let mut invalid = sounding(3, 3, 0.0, 1.0, 10.0);
        invalid.invalid = true;
        let points = vec![sounding(1, 1, 0.0, 0.0, 10.0), sounding(2, 2, 1.0, 0.0, 10.0), invalid];
        let report = run(&points, &[false, true, false], 5.0);

        // Only point 0 is tested and nothing can support it.
        assert_eq!(report.tested(), 1);
        assert_eq!(report.queued, vec![QueuedPoint { index: 0, neighbors: vec![] }]);
    }

    #[test]
    fn test_exempt_points_support_but_are_not_tested() {
        let mut exempt = sounding(2, 2, 1.0, 0.0, 10.0);
        exempt.detection_code = 74;
        let points = vec![sounding(1, 1, 0.0, 0.0, 10.0), exempt];
        let report = run(&points, &[false, false], 5.0);

        assert_eq!(report.corroborated, vec![0]);
        assert_eq!(report.tested(), 1);
    }

    #[test]
    fn test_horizontal_error_widens_reach() {
        let far = sounding(2, 2, 6.0, 0.0, 10.0);
        let points = vec![sounding(1, 1, 0.0, 0.0, 10.0), far.clone()];
        let report = run(&points, &[false, false], 5.0);
        assert!(report.corroborated.is_empty());

        let points = vec![sounding(1, 1, 0.0, 0.0, 10.0).with_errors(0.2, 0.6), far.with_errors(0.2, 0.6)];
        let report = run(&points, &[false, false], 5.0);
        assert_eq!(report.corroborated.len(), 2);
    }

    #[test]
    fn test_within_reach_uses_euclidean_distance() {
        let p = sounding(1, 1, 0.0, 0.0, 0.0);
        // Inside the square but outside the circle.
        assert!(!within_reach(5.0, &p, &sounding(2, 2, 4.0, 4.0, 0.0)));
        assert!(within_reach(5.0, &p, &sounding(2, 2, 3.0, 4.0, 0.0)));
    }
}
