//! Coordinate transformations backed by `proj4rs`.
//!
//! `proj4rs` is a pure-Rust port of PROJ.4 that works from proj strings, so
//! the supported CRS set is the explicit table in [`proj_string`]: WGS 84 and
//! NAD83 geographic, Web Mercator, the Albers equal-area whitelist, and the
//! NAD83 and WGS 84 UTM zones.

use curve_number_models::{Crs, CrsAuthority};
use geo::{Coord, MapCoords as _, MultiPolygon, coord};
use proj4rs::proj::Proj;

use crate::GeometryError;

const CONUS_ALBERS_NAD83: &str = "+proj=aea +lat_0=23 +lon_0=-96 +lat_1=29.5 +lat_2=45.5 \
     +x_0=0 +y_0=0 +ellps=GRS80 +towgs84=0,0,0 +units=m +no_defs";

/// Returns the proj string for a supported CRS.
#[must_use]
pub fn proj_string(crs: Crs) -> Option<String> {
    let s = match (crs.authority, crs.code) {
        (CrsAuthority::Epsg, 4326) => "+proj=longlat +datum=WGS84 +no_defs".to_string(),
        (CrsAuthority::Epsg, 4269) => {
            "+proj=longlat +ellps=GRS80 +towgs84=0,0,0 +no_defs".to_string()
        }
        (CrsAuthority::Epsg, 3857) => "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 \
             +x_0=0 +y_0=0 +k=1 +units=m +no_defs"
            .to_string(),
        // NAD83, NAD83(HARN), NAD83(NSRS2007), NAD83(2011) Conus Albers
        (CrsAuthority::Epsg, 5070 | 5071 | 5072 | 6350) => CONUS_ALBERS_NAD83.to_string(),
        (CrsAuthority::Epsg, 3083) => "+proj=aea +lat_0=18 +lon_0=-100 +lat_1=27.5 +lat_2=35 \
             +x_0=1500000 +y_0=6000000 +ellps=GRS80 +towgs84=0,0,0 +units=m +no_defs"
            .to_string(),
        (CrsAuthority::Epsg, 3310) => "+proj=aea +lat_0=0 +lon_0=-120 +lat_1=34 +lat_2=40.5 \
             +x_0=0 +y_0=-4000000 +ellps=GRS80 +towgs84=0,0,0 +units=m +no_defs"
            .to_string(),
        (CrsAuthority::Esri, 102_003) => "+proj=aea +lat_0=37.5 +lon_0=-96 +lat_1=29.5 \
             +lat_2=45.5 +x_0=0 +y_0=0 +ellps=GRS80 +towgs84=0,0,0 +units=m +no_defs"
            .to_string(),
        (CrsAuthority::Epsg, code @ 26901..=26923) => format!(
            "+proj=utm +zone={} +ellps=GRS80 +towgs84=0,0,0 +units=m +no_defs",
            code - 26900
        ),
        (CrsAuthority::Epsg, code @ 32601..=32660) => format!(
            "+proj=utm +zone={} +datum=WGS84 +units=m +no_defs",
            code - 32600
        ),
        _ => return None,
    };
    Some(s)
}

/// A reusable transformation between two supported CRSs.
pub struct Transformer {
    from: Crs,
    to: Crs,
    source: Proj,
    target: Proj,
}

impl std::fmt::Debug for Transformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transformer")
            .field("from", &self.from)
            .field("to", &self.to)
            .finish_non_exhaustive()
    }
}

impl Transformer {
    /// Builds a transformer.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::UnsupportedCrs`] if either CRS has no proj
    /// string, or [`GeometryError::Projection`] if `proj4rs` rejects it.
    pub fn new(from: Crs, to: Crs) -> Result<Self, GeometryError> {
        Ok(Self {
            from,
            to,
            source: build_proj(from)?,
            target: build_proj(to)?,
        })
    }

    /// Transforms a single coordinate. Geographic coordinates are degrees
    /// on both sides.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::Projection`] if the transformation fails or
    /// produces a non-finite result.
    pub fn transform(&self, c: Coord<f64>) -> Result<Coord<f64>, GeometryError> {
        let mut point = if self.from.is_geographic() {
            (c.x.to_radians(), c.y.to_radians(), 0.0)
        } else {
            (c.x, c.y, 0.0)
        };

        proj4rs::transform::transform(&self.source, &self.target, &mut point).map_err(|e| {
            GeometryError::Projection {
                message: format!(
                    "{} -> {} failed at ({}, {}): {e:?}",
                    self.from, self.to, c.x, c.y
                ),
            }
        })?;

        let out = if self.to.is_geographic() {
            coord! { x: point.0.to_degrees(), y: point.1.to_degrees() }
        } else {
            coord! { x: point.0, y: point.1 }
        };

        if !out.x.is_finite() || !out.y.is_finite() {
            return Err(GeometryError::Projection {
                message: format!(
                    "{} -> {} produced a non-finite coordinate for ({}, {})",
                    self.from, self.to, c.x, c.y
                ),
            });
        }

        Ok(out)
    }

    /// Transforms every coordinate of a multipolygon.
    ///
    /// # Errors
    ///
    /// Returns the first coordinate transformation error.
    pub fn transform_geometry(
        &self,
        geometry: &MultiPolygon<f64>,
    ) -> Result<MultiPolygon<f64>, GeometryError> {
        geometry.try_map_coords(|c| self.transform(c))
    }
}

fn build_proj(crs: Crs) -> Result<Proj, GeometryError> {
    let definition = proj_string(crs).ok_or(GeometryError::UnsupportedCrs { crs })?;
    Proj::from_proj_string(&definition).map_err(|e| GeometryError::Projection {
        message: format!("invalid projection for {crs}: {e:?}"),
    })
}
