//! NLCD WMS land cover source.

use async_trait::async_trait;
use curve_number_models::Raster;

use crate::{GetMapRequest, LandCoverError, LandCoverSource, geotiff::decode_geotiff};

const MAX_ERROR_BODY: usize = 500;

/// Fetches land cover from an OGC WMS that serves GeoTIFF.
#[derive(Debug, Clone)]
pub struct WmsLandCoverSource {
    client: reqwest::Client,
}

impl WmsLandCoverSource {
    /// Creates a source that issues requests with `client`.
    #[must_use]
    pub const fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LandCoverSource for WmsLandCoverSource {
    async fn fetch_raster(&self, request: &GetMapRequest) -> Result<Raster, LandCoverError> {
        let url = request.url()?;
        log::info!(
            "Requesting {}x{} land cover image from {}",
            request.width,
            request.height,
            request.base_url
        );
        log::debug!("GetMap URL: {url}");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        raster_from_response(status, &bytes, request)
    }
}

/// Turns a GetMap response into a raster placed on the request extent.
///
/// # Errors
///
/// * If `status` is not a success code
/// * If the body is an XML service exception
/// * If the body is not a decodable GeoTIFF
pub fn raster_from_response(
    status: reqwest::StatusCode,
    body: &[u8],
    request: &GetMapRequest,
) -> Result<Raster, LandCoverError> {
    if !status.is_success() {
        return Err(LandCoverError::Status {
            status: status.as_u16(),
            body: truncate(&String::from_utf8_lossy(body)),
        });
    }

    if let Some(message) = service_exception(body) {
        return Err(LandCoverError::ServiceException { message });
    }

    let raster = decode_geotiff(body, request)?;
    log::info!(
        "Downloaded land cover raster: {}x{} cells",
        raster.width,
        raster.height
    );
    Ok(raster)
}

/// WMS servers report errors as XML with a 200 status.
fn service_exception(body: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(body.get(..body.len().min(4096))?).ok()?;
    let trimmed = text.trim_start();
    if !trimmed.starts_with('<') {
        return None;
    }
    Some(truncate(trimmed))
}

fn truncate(text: &str) -> String {
    text.chars().take(MAX_ERROR_BODY).collect()
}
