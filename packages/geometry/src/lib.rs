#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geometry engine for the curve number pipeline.
//!
//! The pipeline never touches polygon algorithms directly. Everything it
//! needs (reprojection, area measurement, polygonizing a raster, repairing
//! invalid polygons, clipping, and attribute-carrying intersection) goes
//! through the [`GeometryEngine`] trait. [`NativeEngine`] implements it with
//! `geo` boolean operations, an `rstar` candidate index, and `proj4rs`
//! coordinate transformations.

pub mod native;
pub mod polygonize;
pub mod projection;

use curve_number_models::{Crs, Raster, VectorLayer};
use geo::MultiPolygon;
use thiserror::Error;

pub use native::NativeEngine;
pub use projection::{Transformer, proj_string};

/// Errors raised by geometry operations.
#[derive(Debug, Error)]
pub enum GeometryError {
    /// No projection definition is known for this CRS.
    #[error("Unsupported CRS: {crs}")]
    UnsupportedCrs {
        /// The offending CRS.
        crs: Crs,
    },

    /// A coordinate transformation failed.
    #[error("Projection error: {message}")]
    Projection {
        /// Description of what failed.
        message: String,
    },

    /// Planar area was requested for geographic coordinates.
    #[error("Cannot measure planar area in geographic CRS {crs}")]
    GeographicArea {
        /// The geographic CRS.
        crs: Crs,
    },

    /// Two layers that must share a CRS do not.
    #[error("CRS mismatch: {left} vs {right}")]
    CrsMismatch {
        /// CRS of the first operand.
        left: Crs,
        /// CRS of the second operand.
        right: Crs,
    },
}

/// Vector and raster operations used by the pipeline.
///
/// Implementations must be shareable across the async stages.
pub trait GeometryEngine: Send + Sync {
    /// Reprojects a geometry between two CRSs.
    ///
    /// # Errors
    ///
    /// Returns an error if either CRS is unsupported or a coordinate fails
    /// to transform.
    fn reproject(
        &self,
        geometry: &MultiPolygon<f64>,
        from: Crs,
        to: Crs,
    ) -> Result<MultiPolygon<f64>, GeometryError>;

    /// Reprojects every feature of a layer. Attributes are unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if either CRS is unsupported or a coordinate fails
    /// to transform.
    fn reproject_layer(&self, layer: &VectorLayer, to: Crs) -> Result<VectorLayer, GeometryError>;

    /// Planar area in square CRS units.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::GeographicArea`] for geographic CRSs.
    fn measure_area(&self, geometry: &MultiPolygon<f64>, crs: Crs) -> Result<f64, GeometryError>;

    /// Converts a raster into polygons of equal-valued connected cells,
    /// storing the cell value in a real field named `field`.
    fn polygonize(&self, raster: &Raster, field: &str) -> VectorLayer;

    /// Repairs invalid geometries and drops features left empty.
    fn fix_geometries(&self, layer: &VectorLayer) -> VectorLayer;

    /// Clips every feature to `overlay`, dropping features outside it.
    fn clip(&self, layer: &VectorLayer, overlay: &MultiPolygon<f64>) -> VectorLayer;

    /// Computes pairwise intersections between two layers.
    ///
    /// The output schema is `input_fields` followed by `overlay_fields`;
    /// names absent from a source layer come out as null text columns.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::CrsMismatch`] if the layers are in
    /// different CRSs.
    fn intersection(
        &self,
        input: &VectorLayer,
        input_fields: &[&str],
        overlay: &VectorLayer,
        overlay_fields: &[&str],
    ) -> Result<VectorLayer, GeometryError>;

    /// Swaps X and Y of every coordinate, for sources that publish
    /// latitude first.
    fn swap_xy(&self, layer: &VectorLayer) -> VectorLayer;
}
