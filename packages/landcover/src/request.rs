//! WMS GetMap request construction.

use curve_number_models::Crs;
use geo::Rect;
use reqwest::Url;

use crate::{LandCoverConfig, LandCoverError};

/// A GetMap request for the AOI extent.
#[derive(Debug, Clone, PartialEq)]
pub struct GetMapRequest {
    /// Endpoint URL.
    pub base_url: String,
    /// WMS layer name.
    pub layer: String,
    /// WMS version.
    pub version: String,
    /// Requested image format.
    pub format: String,
    /// Requested extent in `crs`.
    pub bbox: Rect<f64>,
    /// Working CRS.
    pub crs: Crs,
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
}

impl GetMapRequest {
    /// Sizes the image so each pixel covers `config.resolution` CRS units,
    /// rounding to the nearest pixel with a minimum of one.
    #[must_use]
    pub fn for_extent(bbox: Rect<f64>, crs: Crs, config: &LandCoverConfig) -> Self {
        Self {
            base_url: config.wms_url.clone(),
            layer: config.layer.clone(),
            version: config.version.clone(),
            format: config.format.clone(),
            bbox,
            crs,
            width: pixels(bbox.width(), config.resolution),
            height: pixels(bbox.height(), config.resolution),
        }
    }

    /// The `bbox` parameter value.
    #[must_use]
    pub fn bbox_param(&self) -> String {
        format!(
            "{},{},{},{}",
            self.bbox.min().x,
            self.bbox.min().y,
            self.bbox.max().x,
            self.bbox.max().y
        )
    }

    /// Builds the full GetMap URL.
    ///
    /// # Errors
    ///
    /// Returns [`LandCoverError::Request`] if the base URL is malformed.
    pub fn url(&self) -> Result<Url, LandCoverError> {
        let crs = self.crs.to_string();
        let width = self.width.to_string();
        let height = self.height.to_string();
        let bbox = self.bbox_param();

        Url::parse_with_params(
            &self.base_url,
            [
                ("version", self.version.as_str()),
                ("service", "WMS"),
                ("layers", self.layer.as_str()),
                ("styles", ""),
                ("crs", crs.as_str()),
                ("format", self.format.as_str()),
                ("request", "GetMap"),
                ("width", width.as_str()),
                ("height", height.as_str()),
                ("bbox", bbox.as_str()),
            ],
        )
        .map_err(|e| LandCoverError::Request {
            message: format!("{}: {e}", self.base_url),
        })
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn pixels(extent: f64, resolution: f64) -> u32 {
    let count = (extent / resolution).round();
    if count.is_finite() && count >= 1.0 {
        count.min(f64::from(u32::MAX)) as u32
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curve_number_models::CONUS_ALBERS;
    use geo::coord;

    fn request(width: f64, height: f64) -> GetMapRequest {
        let bbox = Rect::new(
            coord! { x: 1_000_000.0, y: 2_000_000.0 },
            coord! { x: 1_000_000.0 + width, y: 2_000_000.0 + height },
        );
        GetMapRequest::for_extent(bbox, CONUS_ALBERS, &LandCoverConfig::default())
    }

    #[test]
    fn pixel_size_rounds_extent_over_thirty_metres() {
        let r = request(3000.0, 1515.0);
        assert_eq!(r.width, 100);
        // 50.5 rounds away from zero
        assert_eq!(r.height, 51);
    }

    #[test]
    fn tiny_extent_still_requests_one_pixel() {
        let r = request(5.0, 0.0);
        assert_eq!((r.width, r.height), (1, 1));
    }

    #[test]
    fn url_carries_all_getmap_parameters() {
        let url = request(300.0, 600.0).url().unwrap();
        let params: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let get = |key: &str| {
            params
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
                .unwrap()
        };

        assert!(url.as_str().starts_with("https://www.mrlc.gov/geoserver/"));
        assert_eq!(get("version"), "1.3.0");
        assert_eq!(get("service"), "WMS");
        assert_eq!(get("layers"), "NLCD_2016_Land_Cover_L48");
        assert_eq!(get("styles"), "");
        assert_eq!(get("crs"), "EPSG:5070");
        assert_eq!(get("format"), "image/geotiff");
        assert_eq!(get("request"), "GetMap");
        assert_eq!(get("width"), "10");
        assert_eq!(get("height"), "20");
        assert_eq!(get("bbox"), "1000000,2000000,1000300,2000600");
    }
}
