#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Area of interest preparation.
//!
//! [`normalize_crs`] moves the AOI into an area-preserving working CRS and
//! [`validate_extent`] enforces the maximum bounding-extent size before any
//! remote service is contacted.

pub mod extent;
pub mod normalize;

use curve_number_geometry::GeometryError;
use thiserror::Error;

pub use extent::{
    ExtentRejection, ExtentVerdict, MAX_EXTENT_ACRES, SQUARE_METRES_PER_ACRE, validate_extent,
};
pub use normalize::normalize_crs;

/// Errors raised while preparing the AOI.
#[derive(Debug, Error)]
pub enum AoiError {
    /// The AOI has no polygons.
    #[error("Area of interest geometry is empty")]
    EmptyGeometry,

    /// Reprojection or measurement failed.
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}
