//! Geographic rectangles in degrees

/// A latitude/longitude rectangle, in degrees.
///
/// Latitudes grow northward, longitudes eastward. A sector with
/// `min >= max` on either axis is degenerate and matches nothing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sector {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
}

impl Sector {
    /// The whole globe
    pub const FULL_SPHERE: Sector = Sector {
        min_latitude: -90.0,
        max_latitude: 90.0,
        min_longitude: -180.0,
        max_longitude: 180.0,
    };

    pub fn new(
        min_latitude: f64,
        max_latitude: f64,
        min_longitude: f64,
        max_longitude: f64,
    ) -> Self {
        Self {
            min_latitude,
            max_latitude,
            min_longitude,
            max_longitude,
        }
    }

    pub fn delta_latitude(&self) -> f64 {
        self.max_latitude - self.min_latitude
    }

    pub fn delta_longitude(&self) -> f64 {
        self.max_longitude - self.min_longitude
    }

    /// True when the sector covers zero area
    pub fn is_empty(&self) -> bool {
        self.delta_latitude() <= 0.0 || self.delta_longitude() <= 0.0
    }

    /// Center point as (latitude, longitude)
    pub fn centroid(&self) -> (f64, f64) {
        (
            (self.min_latitude + self.max_latitude) * 0.5,
            (self.min_longitude + self.max_longitude) * 0.5,
        )
    }

    /// Whether the point lies inside this sector (edges inclusive)
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        latitude >= self.min_latitude
            && latitude <= self.max_latitude
            && longitude >= self.min_longitude
            && longitude <= self.max_longitude
    }

    /// Whether two sectors overlap in both axes. Touching edges count as
    /// intersecting, matching how adjacent tiles share a border.
    pub fn intersects(&self, other: &Sector) -> bool {
        self.min_latitude <= other.max_latitude
            && self.max_latitude >= other.min_latitude
            && self.min_longitude <= other.max_longitude
            && self.max_longitude >= other.min_longitude
    }

    /// Bisect into four quadrants: `[SW, SE, NW, NE]`.
    ///
    /// The quadrants tile this sector exactly, sharing the centroid edges.
    pub fn subdivide(&self) -> [Sector; 4] {
        let (mid_lat, mid_lon) = self.centroid();
        [
            Sector::new(self.min_latitude, mid_lat, self.min_longitude, mid_lon),
            Sector::new(self.min_latitude, mid_lat, mid_lon, self.max_longitude),
            Sector::new(mid_lat, self.max_latitude, self.min_longitude, mid_lon),
            Sector::new(mid_lat, self.max_latitude, mid_lon, self.max_longitude),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deltas_and_centroid() {
        let s = Sector::new(-10.0, 30.0, 20.0, 60.0);
        assert_eq!(s.delta_latitude(), 40.0);
        assert_eq!(s.delta_longitude(), 40.0);
        assert_eq!(s.centroid(), (10.0, 40.0));
    }

    #[test]
    fn test_contains() {
        let s = Sector::new(0.0, 10.0, 0.0, 10.0);
        assert!(s.contains(5.0, 5.0));
        assert!(s.contains(0.0, 10.0)); // edges inclusive
        assert!(!s.contains(-0.1, 5.0));
        assert!(!s.contains(5.0, 10.1));
    }

    #[test]
    fn test_intersects() {
        let a = Sector::new(0.0, 10.0, 0.0, 10.0);
        let b = Sector::new(5.0, 15.0, 5.0, 15.0);
        let c = Sector::new(10.0, 20.0, 10.0, 20.0); // touches a at a corner
        let d = Sector::new(11.0, 20.0, 0.0, 10.0);

        assert!(a.intersects(&b));
        assert!(a.intersects(&c));
        assert!(!a.intersects(&d));
    }

    #[test]
    fn test_subdivide_partitions_exactly() {
        let s = Sector::new(-90.0, 90.0, -180.0, 180.0);
        let [sw, se, nw, ne] = s.subdivide();

        assert_eq!(sw, Sector::new(-90.0, 0.0, -180.0, 0.0));
        assert_eq!(se, Sector::new(-90.0, 0.0, 0.0, 180.0));
        assert_eq!(nw, Sector::new(0.0, 90.0, -180.0, 0.0));
        assert_eq!(ne, Sector::new(0.0, 90.0, 0.0, 180.0));

        let area: f64 = [sw, se, nw, ne]
            .iter()
            .map(|q| q.delta_latitude() * q.delta_longitude())
            .sum();
        assert_eq!(area, s.delta_latitude() * s.delta_longitude());
    }

    #[test]
    fn test_empty_sector() {
        assert!(Sector::new(10.0, 10.0, 0.0, 20.0).is_empty());
        assert!(!Sector::FULL_SPHERE.is_empty());
    }
}
