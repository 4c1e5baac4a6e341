#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Curve number derivation.
//!
//! Works on the soil × land cover intersection layer, one field calculation
//! per step:
//!
//! 1. [`derive_land_use`] copies `VALUE` into the integer `NLCD_LU`.
//! 2. [`derive_gdcode_temp`] composes land use and HSG into `GDCodeTemp`.
//! 3. [`resolve_gdcodes`] resolves dual HSGs into `GDCode`.
//! 4. [`join_lookup`] left-joins `CN_Join` from a [`CnLookupTable`].
//! 5. [`cast_curve_number`] stores the integer `CN`.
//! 6. [`drop_intermediate_fields`] removes the working columns.

pub mod gdcode;
pub mod join;
pub mod lookup;

use curve_number_models::{AttributeValue, Field, VectorLayer};

pub use gdcode::{WATER_CODE, gdcode_temp, is_water_unit, resolve_gdcode};
pub use join::{JoinReport, join_lookup};
pub use lookup::{CnLookupTable, DEFAULT_LOOKUP_CSV};

/// Soil fields carried through the intersection.
pub const SOIL_INTERSECTION_FIELDS: [&str; 3] = ["MUSYM", "HYDGRPDCD", "MUNAME"];
/// Land cover fields carried through the intersection.
pub const LAND_COVER_INTERSECTION_FIELDS: [&str; 1] = [VALUE_FIELD];

/// Land use code from the land cover layer.
pub const VALUE_FIELD: &str = "VALUE";
/// Unresolved join key.
pub const GDCODE_TEMP_FIELD: &str = "GDCodeTemp";
/// Resolved join key.
pub const GDCODE_FIELD: &str = "GDCode";
/// Integer land use code.
pub const LAND_USE_FIELD: &str = "NLCD_LU";
/// Curve number copied from the lookup table.
pub const CN_JOIN_FIELD: &str = "CN_Join";
/// Final integer curve number.
pub const CN_FIELD: &str = "CN";

/// Errors raised while loading a lookup table.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    /// The file could not be opened.
    #[error("Cannot read lookup table {path}: {source}")]
    Io {
        /// Path that failed.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// CSV parsing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A required column is absent.
    #[error("Lookup table has no {column} column")]
    MissingColumn {
        /// Expected header.
        column: String,
    },

    /// A `CN_Join` cell is not a number.
    #[error("Invalid CN_Join value {value:?} on row {row}")]
    InvalidNumber {
        /// 1-based CSV line number.
        row: usize,
        /// Offending cell.
        value: String,
    },
}

fn index(layer: &VectorLayer, name: &str) -> Option<usize> {
    let idx = layer.field_index(name);
    if idx.is_none() {
        log::warn!("Field {name} missing from intersection layer");
    }
    idx
}

fn value_at(attributes: &[AttributeValue], idx: Option<usize>) -> AttributeValue {
    idx.and_then(|i| attributes.get(i).cloned()).unwrap_or_default()
}

/// Adds `NLCD_LU`, the integer copy of `VALUE`.
#[allow(clippy::cast_possible_truncation)]
pub fn derive_land_use(layer: &mut VectorLayer) {
    let value_idx = index(layer, VALUE_FIELD);
    let lu_idx = layer.add_field(Field::integer(LAND_USE_FIELD));

    for feature in layer.features_mut() {
        feature.attributes[lu_idx] = value_at(&feature.attributes, value_idx)
            .as_f64()
            .map_or(AttributeValue::Null, |v| AttributeValue::Integer(v as i64));
    }
}

/// Adds `GDCodeTemp` to every polygon.
pub fn derive_gdcode_temp(layer: &mut VectorLayer) {
    let value_idx = index(layer, VALUE_FIELD);
    let hsg_idx = index(layer, "HYDGRPDCD");
    let musym_idx = index(layer, "MUSYM");
    let muname_idx = index(layer, "MUNAME");
    let temp_idx = layer.add_field(Field::text(GDCODE_TEMP_FIELD));

    let mut water = 0_usize;
    for feature in layer.features_mut() {
        let attrs = &feature.attributes;
        let musym = value_at(attrs, musym_idx);
        let muname = value_at(attrs, muname_idx);
        if is_water_unit(musym.as_text().as_deref(), muname.as_text().as_deref()) {
            water += 1;
        }
        let temp = gdcode_temp(
            &value_at(attrs, value_idx),
            &value_at(attrs, hsg_idx),
            &musym,
            &muname,
        );
        feature.attributes[temp_idx] = temp.map_or(AttributeValue::Null, AttributeValue::Text);
    }

    if water > 0 {
        log::info!("{water} polygons fall on water map units");
    }
}

/// Adds `GDCode`, resolving dual HSGs for drained or undrained soils.
pub fn resolve_gdcodes(layer: &mut VectorLayer, drained: bool) {
    let temp_idx = index(layer, GDCODE_TEMP_FIELD);
    let code_idx = layer.add_field(Field::text(GDCODE_FIELD));

    for feature in layer.features_mut() {
        feature.attributes[code_idx] = value_at(&feature.attributes, temp_idx)
            .as_text()
            .map_or(AttributeValue::Null, |t| {
                AttributeValue::Text(resolve_gdcode(&t, drained))
            });
    }
}

/// Adds the integer `CN` field from `CN_Join`. Non-integral values are
/// truncated, never rounded.
#[allow(clippy::cast_possible_truncation)]
pub fn cast_curve_number(layer: &mut VectorLayer) {
    let join_idx = index(layer, CN_JOIN_FIELD);
    let cn_idx = layer.add_field(Field::integer(CN_FIELD));
    let mut truncated = 0_usize;

    for feature in layer.features_mut() {
        feature.attributes[cn_idx] = match value_at(&feature.attributes, join_idx).as_f64() {
            Some(v) => {
                if v.fract() != 0.0 {
                    truncated += 1;
                }
                AttributeValue::Integer(v.trunc() as i64)
            }
            None => AttributeValue::Null,
        };
    }

    if truncated > 0 {
        log::warn!("{truncated} non-integral curve numbers were truncated");
    }
}

/// Removes `VALUE`, `GDCodeTemp`, and `CN_Join`.
pub fn drop_intermediate_fields(layer: &mut VectorLayer) {
    layer.delete_fields(&[VALUE_FIELD, GDCODE_TEMP_FIELD, CN_JOIN_FIELD]);
}
