//! Working CRS selection.

use curve_number_geometry::GeometryEngine;
use curve_number_models::{AREA_PRESERVING, AreaOfInterest, CONUS_ALBERS};

use crate::AoiError;

/// Returns the AOI in an area-preserving CRS.
///
/// An AOI already in one of the accepted Albers equal-area CRSs is returned
/// unchanged; anything else is reprojected to EPSG:5070. The CRS of the
/// result is the working CRS for the rest of the run.
///
/// # Errors
///
/// * [`AoiError::EmptyGeometry`] if the AOI has no polygons
/// * [`AoiError::Geometry`] if reprojection fails
pub fn normalize_crs(
    engine: &dyn GeometryEngine,
    aoi: &AreaOfInterest,
) -> Result<AreaOfInterest, AoiError> {
    if aoi.geometry.0.is_empty() {
        return Err(AoiError::EmptyGeometry);
    }

    if aoi.crs.is_area_preserving() {
        log::debug!("AOI already in area-preserving CRS {}", aoi.crs);
        return Ok(aoi.clone());
    }

    log::info!(
        "Reprojecting AOI from {} to {CONUS_ALBERS} (accepted: {})",
        aoi.crs,
        AREA_PRESERVING
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );

    let geometry = engine.reproject(&aoi.geometry, aoi.crs, CONUS_ALBERS)?;
    Ok(AreaOfInterest::new(geometry, CONUS_ALBERS))
}
