//! GeoTIFF body decoding.
//!
//! The WMS response carries its own GeoTIFF tags, but the grid is fully
//! determined by the request: the image covers `bbox` at `width x height`
//! pixels. The raster is georeferenced from the request, which also works
//! for servers that answer with a plain TIFF.

use std::io::Cursor;

use curve_number_models::Raster;
use tiff::decoder::{Decoder, DecodingResult};

use crate::{GetMapRequest, LandCoverError};

/// Decodes a single-image TIFF into a raster covering the request extent.
/// Multi-sample images keep their first sample per pixel.
///
/// # Errors
///
/// Returns [`LandCoverError::Tiff`] for unreadable data and
/// [`LandCoverError::UnsupportedRaster`] for empty or oddly-shaped images.
pub fn decode_geotiff(bytes: &[u8], request: &GetMapRequest) -> Result<Raster, LandCoverError> {
    let mut decoder = Decoder::new(Cursor::new(bytes))?;
    let (width, height) = decoder.dimensions()?;
    let (width, height) = (width as usize, height as usize);

    let values = to_f64(decoder.read_image()?)?;
    let pixels = width * height;
    if pixels == 0 || values.len() < pixels || values.len() % pixels != 0 {
        return Err(LandCoverError::UnsupportedRaster {
            message: format!(
                "{} samples do not fit a {width}x{height} image",
                values.len()
            ),
        });
    }

    let samples = values.len() / pixels;
    let data = if samples == 1 {
        values
    } else {
        log::debug!("Keeping first of {samples} samples per pixel");
        values.into_iter().step_by(samples).collect()
    };

    if (width, height) != (request.width as usize, request.height as usize) {
        log::warn!(
            "WMS returned {width}x{height} pixels for a {}x{} request",
            request.width,
            request.height
        );
    }

    Raster::from_extent(request.crs, request.bbox, width, height, data).ok_or_else(|| {
        LandCoverError::UnsupportedRaster {
            message: format!("cannot georeference {width}x{height} image"),
        }
    })
}

#[allow(clippy::cast_precision_loss, clippy::unnecessary_wraps)]
fn to_f64(result: DecodingResult) -> Result<Vec<f64>, LandCoverError> {
    Ok(match result {
        DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::F64(v) => v,
        #[allow(unreachable_patterns)]
        _ => {
            return Err(LandCoverError::UnsupportedRaster {
                message: "unsupported TIFF sample format".to_string(),
            });
        }
    })
}
