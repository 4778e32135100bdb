//! Planar projection of geographic sounding positions.
//!
//! The search grid works in meters, so soundings delivered as latitude and
//! longitude are projected onto a local plane before the pass. Over the
//! extent of one survey an equirectangular projection anchored at the
//! survey's south-west corner is accurate well below the search radius.

use rayon::prelude::*;

/// Mean Earth radius in meters (IUGG).
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Maps geographic coordinates (degrees) to planar meters.
pub trait PlanarProjector: Sync {
    /// Project one position. Returns `(x, y)`: easting and northing in meters.
    fn project(&self, lat_deg: f64, lon_deg: f64) -> (f64, f64);
}

/// Equirectangular projection about a fixed origin.
///
/// Distances along the parallels are scaled by the cosine of the origin
/// latitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EquirectangularProjector {
    origin_lat: f64,
    origin_lon: f64,
    cos_lat: f64,
}

impl EquirectangularProjector {
    pub fn new(origin_lat: f64, origin_lon: f64) -> Self {
        Self {
            origin_lat,
            origin_lon,
            cos_lat: origin_lat.to_radians().cos(),
        }
    }

    /// Anchor at the south-west corner of the positions' bounding box.
    ///
    /// Returns `None` if there are no finite positions.
    pub fn from_south_west<I>(positions: I) -> Option<Self>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let (min_lat, min_lon) = positions
            .into_iter()
            .filter(|(lat, lon)| lat.is_finite() && lon.is_finite())
            .fold((f64::INFINITY, f64::INFINITY), |(a, b), (lat, lon)| {
                (a.min(lat), b.min(lon))
            });

        if min_lat.is_finite() && min_lon.is_finite() {
            Some(Self::new(min_lat, min_lon))
        } else {
            None
        }
    }

    pub fn origin(&self) -> (f64, f64) {
        (self.origin_lat, self.origin_lon)
    }
}

impl PlanarProjector for EquirectangularProjector {
    #[inline]
    fn project(&self, lat_deg: f64, lon_deg: f64) -> (f64, f64) {
        let x = (lon_deg - self.origin_lon).to_radians() * self.cos_lat * EARTH_RADIUS_M;
        let y = (lat_deg - self.origin_lat).to_radians() * EARTH_RADIUS_M;
        (x, y)
    }
}

/// Project a batch of `(lat, lon)` positions in parallel.
pub fn project_all<P: PlanarProjector + ?Sized>(projector: &P, positions: &[(f64, f64)]) -> Vec<(f64, f64)> {
    positions
        .par_iter()
        .map(|&(lat, lon)| projector.project(lat, lon))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_maps_to_zero() {
        let projector = EquirectangularProjector::new(30.0, -88.0);
        let (x, y) = projector.project(30.0, -88.0);
        assert_eq!((x, y), (0.0, 0.0));
    }

    #[test]
    fn test_degree_lengths() {
        let projector = EquirectangularProjector::new(0.0, 0.0);
        let (_, y) = projector.project(1.0, 0.0);
        assert!((y - 111_195.0).abs() < 1.0, "one degree of latitude was {y}");

        // A degree of longitude shrinks with latitude.
        let projector = EquirectangularProjector::new(60.0, 0.0);
        let (x, _) = projector.project(60.0, 1.0);
        assert!((x - 111_195.0 / 2.0).abs() < 1.0, "one degree of longitude was {x}");
    }

    #[test]
    fn test_south_west_anchor() {
        let positions = [(30.1, -87.9), (30.0, -87.8), (f64::NAN, -90.0), (30.2, -88.0)];
        let projector = EquirectangularProjector::from_south_west(positions).unwrap();
        assert_eq!(projector.origin(), (30.0, -88.0));

        let projected = project_all(&projector, &[(30.0, -88.0), (30.2, -87.8)]);
        assert_eq!(projected[0], (0.0, 0.0));
        assert!(projected[1].0 > 0.0 && projected[1].1 > 0.0);

        assert!(EquirectangularProjector::from_south_west(std::iter::empty()).is_none());
    }

    #[test]
    fn test_short_distances_are_metric() {
        let projector = EquirectangularProjector::new(45.0, 10.0);
        let (x0, y0) = projector.project(45.0, 10.0);
        let (x1, y1) = projector.project(45.00001, 10.00001);
        let d = ((x1 - x0).powi(2) + (y1 - y0).powi(2)).sqrt();
        // About 1.11 m north and 0.79 m east.
        assert!((d - 1.36).abs() < 0.02, "distance was {d}");
    }
}
