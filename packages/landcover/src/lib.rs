#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! NLCD land cover acquisition.
//!
//! A [`GetMapRequest`] is built from the AOI extent in the working CRS, a
//! [`LandCoverSource`] turns it into a [`Raster`], and [`reclassify`] maps
//! the WMS palette indices back to NLCD land-use codes. There is no
//! fallback source: any failure here is fatal for the run.

pub mod geotiff;
pub mod reclassify;
pub mod request;
pub mod wms;

use async_trait::async_trait;
use curve_number_models::Raster;
use serde::{Deserialize, Serialize};

pub use reclassify::{LAND_COVER_FIELD, reclassify, remap_value};
pub use request::GetMapRequest;
pub use wms::{WmsLandCoverSource, raster_from_response};

/// Errors that can occur while acquiring land cover.
#[derive(Debug, thiserror::Error)]
pub enum LandCoverError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The WMS answered with a non-success status.
    #[error("WMS returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body (truncated).
        body: String,
    },

    /// The WMS answered with an XML service exception instead of an image.
    #[error("WMS service exception: {message}")]
    ServiceException {
        /// Exception text.
        message: String,
    },

    /// The request could not be turned into a URL.
    #[error("Invalid GetMap request: {message}")]
    Request {
        /// Description of what went wrong.
        message: String,
    },

    /// The response body is not a readable TIFF.
    #[error("TIFF decode error: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// The TIFF decoded but cannot be used as a land cover grid.
    #[error("Unsupported raster: {message}")]
    UnsupportedRaster {
        /// Description of what went wrong.
        message: String,
    },
}

/// WMS endpoint and rendering settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandCoverConfig {
    /// GetMap endpoint.
    pub wms_url: String,
    /// WMS layer name.
    pub layer: String,
    /// WMS protocol version.
    pub version: String,
    /// Requested image MIME type.
    pub format: String,
    /// Target cell size in working CRS units.
    pub resolution: f64,
}

impl Default for LandCoverConfig {
    fn default() -> Self {
        Self {
            wms_url: "https://www.mrlc.gov/geoserver/mrlc_display/NLCD_2016_Land_Cover_L48/ows"
                .to_string(),
            layer: "NLCD_2016_Land_Cover_L48".to_string(),
            version: "1.3.0".to_string(),
            format: "image/geotiff".to_string(),
            resolution: 30.0,
        }
    }
}

/// Something that can produce a land cover raster for a GetMap request.
#[async_trait]
pub trait LandCoverSource: Send + Sync {
    /// Fetches and decodes the raster covering `request.bbox`.
    ///
    /// # Errors
    ///
    /// Returns [`LandCoverError`] if the fetch or decode fails.
    async fn fetch_raster(&self, request: &GetMapRequest) -> Result<Raster, LandCoverError>;
}
