#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared data types for the curve number pipeline.
//!
//! Defines the coordinate reference system identifier, the polygon
//! [`VectorLayer`] used for land cover, soil, and curve number layers, the
//! single-band [`Raster`] used for land cover, and the caller's
//! [`AreaOfInterest`]. Every other crate in the workspace exchanges data
//! through these types.

pub mod aoi;
pub mod crs;
pub mod layer;
pub mod raster;

pub use aoi::AreaOfInterest;
pub use crs::{AREA_PRESERVING, CONUS_ALBERS, Crs, CrsAuthority, ParseCrsError, WGS84};
pub use layer::{AttributeValue, Feature, Field, FieldKind, VectorLayer};
pub use raster::{NO_DATA, Raster};
