//! In-memory polygon feature layers.
//!
//! A [`VectorLayer`] is an ordered field schema plus features whose
//! attribute vectors are aligned with that schema. Field lookup is
//! case-insensitive: SSURGO publishes lower-case names while the curve
//! number derivation refers to them in upper case.

use std::fmt;

use geo::MultiPolygon;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::crs::Crs;

/// Storage type of a field.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FieldKind {
    /// UTF-8 text.
    Text,
    /// 64-bit signed integer.
    Integer,
    /// 64-bit float.
    Real,
}

/// A named, typed column of a [`VectorLayer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Column name as it should appear in outputs.
    pub name: String,
    /// Storage type.
    pub kind: FieldKind,
}

impl Field {
    /// Creates a text field.
    #[must_use]
    pub fn text(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::Text,
        }
    }

    /// Creates an integer field.
    #[must_use]
    pub fn integer(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::Integer,
        }
    }

    /// Creates a real (floating point) field.
    #[must_use]
    pub fn real(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::Real,
        }
    }
}

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Missing value.
    #[default]
    Null,
    /// Text value.
    Text(String),
    /// Integer value.
    Integer(i64),
    /// Floating point value.
    Real(f64),
}

impl AttributeValue {
    /// Builds a text value, mapping the empty string to [`Self::Null`].
    #[must_use]
    pub fn text_or_null(value: &str) -> Self {
        if value.is_empty() {
            Self::Null
        } else {
            Self::Text(value.to_string())
        }
    }

    /// Returns `true` for [`Self::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the value as text, or `None` if null.
    ///
    /// Integral reals are rendered without a fractional part so that a
    /// land-use code stored as `43.0` concatenates as `"43"`.
    #[must_use]
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Text(s) => Some(s.clone()),
            Self::Integer(i) => Some(i.to_string()),
            Self::Real(f) => Some(format_real(*f)),
        }
    }

    /// Returns the value as a float, parsing text if needed.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Null => None,
            Self::Text(s) => s.trim().parse().ok(),
            #[allow(clippy::cast_precision_loss)]
            Self::Integer(i) => Some(*i as f64),
            Self::Real(f) => Some(*f),
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_text() {
            Some(text) => f.write_str(&text),
            None => f.write_str("NULL"),
        }
    }
}

fn format_real(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

/// A polygon feature with attributes aligned to its layer's schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    /// Feature geometry in the layer's CRS.
    pub geometry: MultiPolygon<f64>,
    /// One value per layer field, in schema order.
    pub attributes: Vec<AttributeValue>,
}

/// A polygon layer in a single CRS.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorLayer {
    crs: Crs,
    fields: Vec<Field>,
    features: Vec<Feature>,
}

impl VectorLayer {
    /// Creates an empty layer with the given schema.
    #[must_use]
    pub const fn new(crs: Crs, fields: Vec<Field>) -> Self {
        Self {
            crs,
            fields,
            features: Vec::new(),
        }
    }

    /// Returns the layer CRS.
    #[must_use]
    pub const fn crs(&self) -> Crs {
        self.crs
    }

    /// Returns the field schema.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Returns the features.
    #[must_use]
    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    /// Returns the features mutably. Attribute vectors must keep their
    /// length.
    pub fn features_mut(&mut self) -> &mut [Feature] {
        &mut self.features
    }

    /// Number of features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Returns `true` if the layer has no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Case-insensitive field lookup.
    #[must_use]
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Returns `true` if a field with this name exists (case-insensitive).
    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.field_index(name).is_some()
    }

    /// Appends a feature.
    ///
    /// # Panics
    ///
    /// Panics if the attribute count does not match the schema. That is a
    /// programming error in the producer, not a data error.
    pub fn push(&mut self, feature: Feature) {
        assert_eq!(
            feature.attributes.len(),
            self.fields.len(),
            "feature attribute count does not match layer schema"
        );
        self.features.push(feature);
    }

    /// Adds a field (or returns the existing one's index). Existing
    /// features get [`AttributeValue::Null`].
    pub fn add_field(&mut self, field: Field) -> usize {
        if let Some(idx) = self.field_index(&field.name) {
            return idx;
        }
        self.fields.push(field);
        for feature in &mut self.features {
            feature.attributes.push(AttributeValue::Null);
        }
        self.fields.len() - 1
    }

    /// Removes the named fields (case-insensitive). Unknown names are
    /// ignored.
    pub fn delete_fields(&mut self, names: &[&str]) {
        let keep: Vec<bool> = self
            .fields
            .iter()
            .map(|f| !names.iter().any(|n| f.name.eq_ignore_ascii_case(n)))
            .collect();

        let mut iter = keep.iter();
        self.fields.retain(|_| *iter.next().unwrap_or(&true));

        for feature in &mut self.features {
            let mut iter = keep.iter();
            feature.attributes.retain(|_| *iter.next().unwrap_or(&true));
        }
    }

    /// Returns a feature's value for the named field.
    #[must_use]
    pub fn value<'a>(&self, feature: &'a Feature, name: &str) -> Option<&'a AttributeValue> {
        self.field_index(name)
            .and_then(|idx| feature.attributes.get(idx))
    }

    /// Builds a layer with the same schema from replacement features.
    #[must_use]
    pub fn with_features(&self, features: Vec<Feature>) -> Self {
        Self {
            crs: self.crs,
            fields: self.fields.clone(),
            features,
        }
    }

    /// Builds a layer with the same schema and features in another CRS.
    /// The caller is responsible for having transformed the geometries.
    #[must_use]
    pub fn into_crs(self, crs: Crs, features: Vec<Feature>) -> Self {
        Self {
            crs,
            fields: self.fields,
            features,
        }
    }

    /// Consumes the layer and returns its features.
    #[must_use]
    pub fn into_features(self) -> Vec<Feature> {
        self.features
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::CONUS_ALBERS;

    fn sample_layer() -> VectorLayer {
        let mut layer = VectorLayer::new(
            CONUS_ALBERS,
            vec![Field::text("musym"), Field::real("VALUE")],
        );
        layer.push(Feature {
            geometry: MultiPolygon::new(vec![]),
            attributes: vec![AttributeValue::text_or_null("W"), AttributeValue::Real(43.0)],
        });
        layer
    }

    #[test]
    fn field_lookup_ignores_case() {
        let layer = sample_layer();
        assert_eq!(layer.field_index("MUSYM"), Some(0));
        assert_eq!(layer.field_index("value"), Some(1));
        assert!(layer.field_index("muname").is_none());
    }

    #[test]
    fn add_field_backfills_null() {
        let mut layer = sample_layer();
        let idx = layer.add_field(Field::text("muname"));
        assert_eq!(idx, 2);
        assert_eq!(layer.features()[0].attributes[2], AttributeValue::Null);
        assert_eq!(layer.add_field(Field::text("MUNAME")), 2);
    }

    #[test]
    fn delete_fields_keeps_alignment() {
        let mut layer = sample_layer();
        layer.add_field(Field::text("GDCode"));
        layer.delete_fields(&["value"]);
        let names: Vec<&str> = layer.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["musym", "GDCode"]);
        assert_eq!(layer.features()[0].attributes.len(), 2);
        assert_eq!(
            layer.features()[0].attributes[0],
            AttributeValue::Text("W".to_string())
        );
    }

    #[test]
    fn integral_reals_render_without_fraction() {
        assert_eq!(AttributeValue::Real(43.0).as_text().unwrap(), "43");
        assert_eq!(AttributeValue::Real(1.5).as_text().unwrap(), "1.5");
        assert!(AttributeValue::text_or_null("").is_null());
    }
}
