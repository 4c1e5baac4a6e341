//! Reads the AOI boundary from a GeoJSON file.

use std::path::Path;

use curve_number_models::{AreaOfInterest, Crs};
use geo::{BooleanOps, MultiPolygon, Polygon};
use geojson::GeoJson;

/// Errors raised while reading the AOI file.
#[derive(Debug, thiserror::Error)]
pub enum AoiInputError {
    /// The file could not be read.
    #[error("Cannot read AOI file {path}: {source}")]
    Io {
        /// Path that failed.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not valid GeoJSON.
    #[error("Invalid AOI GeoJSON: {0}")]
    GeoJson(#[from] geojson::Error),

    /// The file contains no polygon geometry.
    #[error("AOI file contains no polygons")]
    NoPolygons,
}

/// Loads every polygon in a GeoJSON geometry, feature, or feature
/// collection and merges them into one AOI in `crs`.
///
/// # Errors
///
/// Returns [`AoiInputError`] if the file cannot be read, parsed, or holds
/// no polygons.
pub fn read_aoi(path: &Path, crs: Crs) -> Result<AreaOfInterest, AoiInputError> {
    let text = std::fs::read_to_string(path).map_err(|source| AoiInputError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let geometry = parse_aoi(&text)?;
    log::info!(
        "Read AOI with {} polygon(s) from {} ({crs})",
        geometry.0.len(),
        path.display()
    );
    Ok(AreaOfInterest::new(geometry, crs))
}

/// Parses GeoJSON text into a single merged multipolygon.
///
/// # Errors
///
/// Returns [`AoiInputError`] on malformed GeoJSON or when no polygons are
/// present.
pub fn parse_aoi(text: &str) -> Result<MultiPolygon<f64>, AoiInputError> {
    let geometries = match text.parse::<GeoJson>()? {
        GeoJson::Geometry(geometry) => vec![geometry],
        GeoJson::Feature(feature) => feature.geometry.into_iter().collect(),
        GeoJson::FeatureCollection(collection) => collection
            .features
            .into_iter()
            .filter_map(|f| f.geometry)
            .collect(),
    };

    let mut polygons = Vec::new();
    for geometry in geometries {
        collect_polygons(geo::Geometry::<f64>::try_from(geometry)?, &mut polygons);
    }

    let mut polygons = polygons.into_iter();
    let first = polygons.next().ok_or(AoiInputError::NoPolygons)?;
    Ok(polygons.fold(MultiPolygon::new(vec![first]), |merged, polygon| {
        merged.union(&MultiPolygon::new(vec![polygon]))
    }))
}

fn collect_polygons(geometry: geo::Geometry<f64>, out: &mut Vec<Polygon<f64>>) {
    match geometry {
        geo::Geometry::Polygon(polygon) => out.push(polygon),
        geo::Geometry::MultiPolygon(multi) => out.extend(multi),
        geo::Geometry::GeometryCollection(collection) => {
            for geometry in collection {
                collect_polygons(geometry, out);
            }
        }
        other => log::warn!("Ignoring non-polygon AOI geometry {other:?}"),
    }
}
