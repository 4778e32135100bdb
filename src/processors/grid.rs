//! Uniform search grid over the planar positions of a survey.
//!
//! Cells are twice the search radius on a side, so two points within the
//! search radius of each other always share a cell or sit in adjacent cells.
//! A 3x3 block around a point's home cell therefore holds every candidate
//! neighbour.

use thiserror::Error;

use crate::core::sounding::SoundingPoint;

/// Upper bound on the number of grid cells, to catch a radius that is tiny
/// relative to the survey extent before allocating.
pub const MAX_CELLS: usize = 100_000_000;

/// Errors that can occur while building the grid.
#[derive(Debug, Error)]
pub enum GridError {
    #[error("cell side must be a positive number, got {0}")]
    InvalidCellSide(f64),

    #[error("point {point_id} has a non-finite position ({x}, {y})")]
    InvalidPosition { point_id: u64, x: f64, y: f64 },

    #[error("grid of {rows} x {cols} cells exceeds the {max} cell limit")]
    TooLarge { rows: usize, cols: usize, max: usize },
}

/// Point indices bucketed by grid cell, stored row-major.
#[derive(Debug, Clone)]
pub struct SearchGrid {
    origin_x: f64,
    origin_y: f64,
    cell_side: f64,
    rows: usize,
    cols: usize,
    cells: Vec<Vec<usize>>,
    /// Home cell of every point, indexed like the input.
    homes: Vec<(usize, usize)>,
}

impl SearchGrid {
    /// Bucket every point by floor-dividing its offset from the south-west
    /// corner of the survey bounding box by `cell_side`.
    pub fn build(points: &[SoundingPoint], cell_side: f64) -> Result<Self, GridError> {
        if !cell_side.is_finite() || cell_side <= 0.0 {
            return Err(GridError::InvalidCellSide(cell_side));
        }

        let mut min_x = f64::INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut max_y = f64::NEG_INFINITY;
        for point in points {
            if !point.x.is_finite() || !point.y.is_finite() {
                return Err(GridError::InvalidPosition {
                    point_id: point.id,
                    x: point.x,
                    y: point.y,
                });
            }
            min_x = min_x.min(point.x);
            min_y = min_y.min(point.y);
            max_x = max_x.max(point.x);
            max_y = max_y.max(point.y);
        }

        if points.is_empty() {
            return Ok(Self {
                origin_x: 0.0,
                origin_y: 0.0,
                cell_side,
                rows: 0,
                cols: 0,
                cells: Vec::new(),
                homes: Vec::new(),
            });
        }

        let rows = ((max_y - min_y) / cell_side) as usize + 1;
        let cols = ((max_x - min_x) / cell_side) as usize + 1;
        match rows.checked_mul(cols) {
            Some(n) if n <= MAX_CELLS => {}
            _ => {
                return Err(GridError::TooLarge {
                    rows,
                    cols,
                    max: MAX_CELLS,
                })
            }
        }

        let mut grid = Self {
            origin_x: min_x,
            origin_y: min_y,
            cell_side,
            rows,
            cols,
            cells: vec![Vec::new(); rows * cols],
            homes: Vec::with_capacity(points.len()),
        };

        for (idx, point) in points.iter().enumerate() {
            let (row, col) = grid.cell_of(point.x, point.y);
            grid.cells[row * cols + col].push(idx);
            grid.homes.push((row, col));
        }

        Ok(grid)
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn cell_side(&self) -> f64 {
        self.cell_side
    }

    /// Cell containing a planar position, clamped to the grid.
    pub fn cell_of(&self, x: f64, y: f64) -> (usize, usize) {
        let row = ((y - self.origin_y) / self.cell_side).floor().max(0.0) as usize;
        let col = ((x - self.origin_x) / self.cell_side).floor().max(0.0) as usize;
        (
            row.min(self.rows.saturating_sub(1)),
            col.min(self.cols.saturating_sub(1)),
        )
    }

    /// Home cell of the point at `idx`.
    #[inline]
    pub fn home_of(&self, idx: usize) -> (usize, usize) {
        self.homes[idx]
    }

    /// Point indices in one cell.
    #[inline]
    pub fn cell(&self, row: usize, col: usize) -> &[usize] {
        &self.cells[row * self.cols + col]
    }

    /// Point indices in the cell and its up-to-eight neighbours.
    pub fn neighbors9(&self, row: usize, col: usize) -> impl Iterator<Item = usize> + '_ {
        let start_row = row.saturating_sub(1);
        let end_row = (row + 1).min(self.rows.saturating_sub(1));
        let start_col = col.saturating_sub(1);
        let end_col = (col + 1).min(self.cols.saturating_sub(1));

        (start_row..=end_row).flat_map(move |r| {
            (start_col..=end_col).flat_map(move |c| self.cell(r, c).iter().copied())
        })
    }

    /// Number of non-empty cells.
    pub fn occupied_cells(&self) -> usize {
        self.cells.iter().filter(|cell| !cell.is_empty()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sounding::{Channel, Waveform};

    fn point_at(id: u64, x: f64, y: f64) -> SoundingPoint {
        SoundingPoint::new(id, 1, x, y, 0.0, Channel::Wide, Waveform::new(Vec::new(), Vec::new(), 0))
    }

    /// Deterministic LCG for the invariant test.
    struct Lcg(u64);

    impl Lcg {
        fn next_f64(&mut self) -> f64 {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (self.0 >> 11) as f64 / (1u64 << 53) as f64
        }
    }

    #[test]
    fn test_build_places_each_point_once() {
        let points = vec![
            point_at(1, 0.0, 0.0),
            point_at(2, 9.9, 0.0),
            point_at(3, 10.0, 0.0),
            point_at(4, 25.0, 31.0),
        ];
        let grid = SearchGrid::build(&points, 10.0).unwrap();

        assert_eq!(grid.rows(), 4);
        assert_eq!(grid.cols(), 3);
        assert_eq!(grid.cell(0, 0), &[0, 1]);
        assert_eq!(grid.cell(0, 1), &[2]);
        assert_eq!(grid.cell(3, 2), &[3]);
        assert_eq!(grid.home_of(3), (3, 2));
        assert_eq!(grid.occupied_cells(), 3);

        let total: usize = (0..grid.rows())
            .flat_map(|r| (0..grid.cols()).map(move |c| (r, c)))
            .map(|(r, c)| grid.cell(r, c).len())
            .sum();
        assert_eq!(total, points.len());
    }

    #[test]
    fn test_negative_coordinates_are_offset_from_origin() {
        let points = vec![point_at(1, -15.0, -15.0), point_at(2, 4.0, 4.0)];
        let grid = SearchGrid::build(&points, 10.0).unwrap();
        assert_eq!(grid.home_of(0), (0, 0));
        assert_eq!(grid.home_of(1), (1, 1));
    }

    #[test]
    fn test_neighbors9_clipped_at_edges() {
        let points: Vec<SoundingPoint> = (0..3)
            .flat_map(|r| (0..3).map(move |c| (r, c)))
            .enumerate()
            .map(|(i, (r, c))| point_at(i as u64, c as f64 * 10.0 + 1.0, r as f64 * 10.0 + 1.0))
            .collect();
        let grid = SearchGrid::build(&points, 10.0).unwrap();
        assert_eq!(grid.rows(), 3);
        assert_eq!(grid.cols(), 3);

        let mut corner: Vec<usize> = grid.neighbors9(0, 0).collect();
        corner.sort_unstable();
        assert_eq!(corner, vec![0, 1, 3, 4]);

        let center: Vec<usize> = grid.neighbors9(1, 1).collect();
        assert_eq!(center.len(), 9);

        let mut edge: Vec<usize> = grid.neighbors9(2, 1).collect();
        edge.sort_unstable();
        assert_eq!(edge, vec![3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_points_within_radius_share_neighbourhood() {
        let radius = 3.0;
        let mut rng = Lcg(42);
        let points: Vec<SoundingPoint> = (0..400)
            .map(|i| point_at(i, rng.next_f64() * 60.0 - 20.0, rng.next_f64() * 45.0))
            .collect();
        let grid = SearchGrid::build(&points, radius * 2.0).unwrap();

        for (i, p) in points.iter().enumerate() {
            let (row, col) = grid.home_of(i);
            let block: Vec<usize> = grid.neighbors9(row, col).collect();
            for (j, q) in points.iter().enumerate() {
                let dist = ((p.x - q.x).powi(2) + (p.y - q.y).powi(2)).sqrt();
                if dist <= radius {
                    assert!(block.contains(&j), "point {} missing from block of {}", j, i);
                }
            }
        }
    }

    #[test]
    fn test_empty_input() {
        let grid = SearchGrid::build(&[], 10.0).unwrap();
        assert_eq!(grid.rows(), 0);
        assert_eq!(grid.occupied_cells(), 0);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(matches!(
            SearchGrid::build(&[point_at(1, 0.0, 0.0)], 0.0),
            Err(GridError::InvalidCellSide(_))
        ));
        assert!(matches!(
            SearchGrid::build(&[point_at(9, f64::NAN, 0.0)], 10.0),
            Err(GridError::InvalidPosition { point_id: 9, .. })
        ));
        assert!(matches!(
            SearchGrid::build(&[point_at(1, 0.0, 0.0), point_at(2, 1.0e9, 1.0e9)], 0.01),
            Err(GridError::TooLarge { .. })
        ));
    }
}
