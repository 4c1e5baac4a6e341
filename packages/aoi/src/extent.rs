//! Bounding-extent size check.

use std::fmt;

use curve_number_geometry::GeometryEngine;
use curve_number_models::AreaOfInterest;
use geo::MultiPolygon;

use crate::AoiError;

/// Square metres in one international acre.
pub const SQUARE_METRES_PER_ACRE: f64 = 4_046.856_422_4;

/// AOIs whose bounding extent reaches this many acres are rejected.
pub const MAX_EXTENT_ACRES: f64 = 100_000.0;

/// Result of the extent check.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtentVerdict {
    /// The AOI is small enough.
    Accepted {
        /// Bounding-extent area in acres.
        area_acres: f64,
    },
    /// The AOI is too large; the run must stop without outputs.
    Rejected(ExtentRejection),
}

/// User-facing explanation of an oversized AOI.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtentRejection {
    /// Bounding-extent area in acres.
    pub area_acres: f64,
    /// Threshold in acres.
    pub limit_acres: f64,
}

impl fmt::Display for ExtentRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Area Boundary layer extent area is {:.2} acres; it should be less than {:.0} acres",
            self.area_acres, self.limit_acres
        )
    }
}

/// Measures the AOI's rectangular bounding extent in the AOI's (working)
/// CRS and compares it with [`MAX_EXTENT_ACRES`].
///
/// # Errors
///
/// * [`AoiError::EmptyGeometry`] if the AOI has no extent
/// * [`AoiError::Geometry`] if the CRS cannot be measured in metres
pub fn validate_extent(
    engine: &dyn GeometryEngine,
    aoi: &AreaOfInterest,
) -> Result<ExtentVerdict, AoiError> {
    let extent = aoi.extent().ok_or(AoiError::EmptyGeometry)?;
    let square_metres =
        engine.measure_area(&MultiPolygon::new(vec![extent.to_polygon()]), aoi.crs)?;
    let area_acres = square_metres / SQUARE_METRES_PER_ACRE;

    if area_acres >= MAX_EXTENT_ACRES {
        let rejection = ExtentRejection {
            area_acres,
            limit_acres: MAX_EXTENT_ACRES,
        };
        log::warn!("{rejection}");
        return Ok(ExtentVerdict::Rejected(rejection));
    }

    log::info!("Area Boundary layer extent area is {area_acres:.2} acres");
    Ok(ExtentVerdict::Accepted { area_acres })
}
