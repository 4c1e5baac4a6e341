//! WMS palette index to NLCD land-use code mapping.

use curve_number_models::{NO_DATA, Raster};

/// Field holding the land-use code after vectorization.
pub const LAND_COVER_FIELD: &str = "VALUE";

/// NLCD class for palette indices `0..=21`.
const NLCD_CLASSES: [f64; 22] = [
    1.0, 11.0, 12.0, 21.0, 22.0, 23.0, 24.0, 31.0, 32.0, 41.0, 42.0, 43.0, 51.0, 52.0, 71.0,
    72.0, 73.0, 74.0, 81.0, 82.0, 90.0, 95.0,
];

/// Maps a palette index to its NLCD class, or `None` outside the table.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn remap_value(value: f64) -> Option<f64> {
    if value.fract() != 0.0 || value < 0.0 {
        return None;
    }
    NLCD_CLASSES.get(value as usize).copied()
}

/// Reclassifies every cell of the downloaded raster.
///
/// No-data input cells stay no-data. Values outside the table pass through
/// unchanged, or become [`NO_DATA`] when `nodata_for_missing` is set.
#[must_use]
pub fn reclassify(raster: &Raster, nodata_for_missing: bool) -> Raster {
    let mut unmapped = 0_usize;

    let data = raster
        .data
        .iter()
        .map(|&value| {
            if raster.is_no_data(value) {
                return NO_DATA;
            }
            remap_value(value).unwrap_or_else(|| {
                unmapped += 1;
                if nodata_for_missing { NO_DATA } else { value }
            })
        })
        .collect();

    if unmapped > 0 {
        log::warn!(
            "{unmapped} land cover cells outside the reclassification table were {}",
            if nodata_for_missing {
                "set to no-data"
            } else {
                "kept as-is"
            }
        );
    }

    raster.with_data(data, Some(NO_DATA))
}
