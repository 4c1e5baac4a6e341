//! Convergence steps applied to the soil layer whichever strategy produced
//! it.

use curve_number_geometry::GeometryEngine;
use curve_number_models::{AreaOfInterest, Crs, Field, VectorLayer};

use crate::SoilError;

/// Fields the curve number derivation reads from the soil layer.
pub const REQUIRED_SOIL_FIELDS: [&str; 3] = ["musym", "muname", "hydgrpdcd"];

/// Adds any of [`REQUIRED_SOIL_FIELDS`] that are missing as null text
/// columns.
pub fn ensure_required_fields(layer: &mut VectorLayer) {
    for name in REQUIRED_SOIL_FIELDS {
        if !layer.has_field(name) {
            log::warn!("Soil layer has no {name} field, adding it as null");
            layer.add_field(Field::text(name));
        }
    }
}

/// Clips the soil layer to the exact AOI polygon.
///
/// # Errors
///
/// Returns [`SoilError::Geometry`] if the AOI cannot be brought into the
/// layer's CRS.
pub fn clip_soil(
    engine: &dyn GeometryEngine,
    layer: &VectorLayer,
    aoi: &AreaOfInterest,
) -> Result<VectorLayer, SoilError> {
    let overlay = engine.reproject(&aoi.geometry, aoi.crs, layer.crs())?;
    let clipped = engine.clip(layer, &overlay);
    log::info!(
        "Clipped soil layer to AOI: {} of {} map unit polygons remain",
        clipped.len(),
        layer.len()
    );
    Ok(clipped)
}

/// Reprojects the soil layer into the working CRS.
///
/// # Errors
///
/// Returns [`SoilError::Geometry`] if the reprojection fails.
pub fn reproject_soil(
    engine: &dyn GeometryEngine,
    layer: &VectorLayer,
    working_crs: Crs,
) -> Result<VectorLayer, SoilError> {
    Ok(engine.reproject_layer(layer, working_crs)?)
}
