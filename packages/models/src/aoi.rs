//! Area of Interest supplied by the caller.

use geo::{BoundingRect, MultiPolygon, Rect};

use crate::crs::Crs;

/// The caller's boundary polygon in a known CRS.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaOfInterest {
    /// Boundary geometry.
    pub geometry: MultiPolygon<f64>,
    /// CRS of `geometry`.
    pub crs: Crs,
}

impl AreaOfInterest {
    /// Creates an AOI.
    #[must_use]
    pub const fn new(geometry: MultiPolygon<f64>, crs: Crs) -> Self {
        Self { geometry, crs }
    }

    /// Rectangular bounding extent, or `None` for an empty geometry.
    #[must_use]
    pub fn extent(&self) -> Option<Rect<f64>> {
        self.geometry.bounding_rect()
    }
}
