#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! SSURGO soil acquisition.
//!
//! Two [`SoilStrategy`] implementations fetch map unit polygons for a
//! geographic AOI: [`SoilDataAccess`] (tabular SQL over HTTP POST, the
//! primary path) and [`SoilWebFeatureService`] (GML over WFS, the
//! fallback). The caller runs the primary, inspects its result, and only
//! then tries the fallback, keeping a [`SoilProvenance`] record of which
//! path produced the layer. The [`prepare`] steps then converge either
//! layer onto the same schema, validity, extent, and CRS.

pub mod prepare;
pub mod sda;
pub mod wfs;

use std::fmt;

use async_trait::async_trait;
use curve_number_models::{AreaOfInterest, VectorLayer};
use serde::{Deserialize, Serialize};

pub use prepare::{REQUIRED_SOIL_FIELDS, clip_soil, ensure_required_fields, reproject_soil};
pub use sda::{SDA_FIELDS, SoilDataAccess};
pub use wfs::SoilWebFeatureService;

/// Errors raised by a single soil strategy.
#[derive(Debug, thiserror::Error)]
pub enum SoilError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The service answered with a non-success status.
    #[error("Soil service returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body (truncated).
        body: String,
    },

    /// The response could not be interpreted.
    #[error("Soil response parse error: {message}")]
    Parse {
        /// Description of what went wrong.
        message: String,
    },

    /// A polygon WKT string could not be read.
    #[error("Invalid WKT geometry: {message}")]
    Wkt {
        /// Description of what went wrong.
        message: String,
    },

    /// The service answered successfully but returned no map units.
    #[error("Soil service returned no map unit polygons")]
    NoFeatures,

    /// Post-processing of the layer failed.
    #[error(transparent)]
    Geometry(#[from] curve_number_geometry::GeometryError),
}

/// Both soil strategies failed.
#[derive(Debug, thiserror::Error)]
#[error("Soil acquisition failed. Primary: {primary}. Fallback: {fallback}")]
pub struct SoilAcquisitionError {
    /// Why the primary strategy failed.
    pub primary: SoilError,
    /// Why the fallback strategy failed.
    pub fallback: SoilError,
}

/// Which strategy produced the soil layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum SoilProvenance {
    /// The Soil Data Access tabular service.
    Primary,
    /// The WFS fallback, with the reason the primary was abandoned.
    Fallback {
        /// Display text of the primary error.
        primary_error: String,
    },
}

impl fmt::Display for SoilProvenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => f.write_str("Soil Data Access"),
            Self::Fallback { primary_error } => {
                write!(f, "WFS fallback (primary failed: {primary_error})")
            }
        }
    }
}

/// Soil service endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoilConfig {
    /// SDA tabular POST endpoint.
    pub sda_url: String,
    /// SDA WFS endpoint.
    pub wfs_url: String,
    /// WFS protocol version.
    pub wfs_version: String,
    /// WFS feature type.
    pub type_name: String,
}

impl Default for SoilConfig {
    fn default() -> Self {
        Self {
            sda_url: "https://sdmdataaccess.sc.egov.usda.gov/TABULAR/post.rest".to_string(),
            wfs_url: "https://sdmdataaccess.sc.egov.usda.gov/Spatial/SDMWGS84GEOGRAPHIC.wfs"
                .to_string(),
            wfs_version: "1.1.0".to_string(),
            type_name: "mapunitpolyextended".to_string(),
        }
    }
}

/// One way of obtaining SSURGO map unit polygons.
#[async_trait]
pub trait SoilStrategy: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &'static str;

    /// Fetches map unit polygons intersecting the AOI.
    ///
    /// `aoi` must be in EPSG:4326. The returned layer is in EPSG:4326 with
    /// longitude as X. An empty result is reported as
    /// [`SoilError::NoFeatures`].
    ///
    /// # Errors
    ///
    /// Returns [`SoilError`] if the request, parsing, or conversion fails.
    async fn acquire(&self, aoi: &AreaOfInterest) -> Result<VectorLayer, SoilError>;
}

pub(crate) const MAX_ERROR_BODY: usize = 500;

pub(crate) fn truncate(text: &str) -> String {
    text.chars().take(MAX_ERROR_BODY).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provenance_serializes_with_source_tag() {
        let json = serde_json::to_value(SoilProvenance::Fallback {
            primary_error: "timeout".to_string(),
        })
        .unwrap();
        assert_eq!(json["source"], "fallback");
        assert_eq!(json["primary_error"], "timeout");

        let primary = serde_json::to_value(SoilProvenance::Primary).unwrap();
        assert_eq!(primary["source"], "primary");
    }

    #[test]
    fn acquisition_error_reports_both_causes() {
        let err = SoilAcquisitionError {
            primary: SoilError::NoFeatures,
            fallback: SoilError::Parse {
                message: "bad gml".to_string(),
            },
        };
        let text = err.to_string();
        assert!(text.contains("no map unit polygons"));
        assert!(text.contains("bad gml"));
    }
}
