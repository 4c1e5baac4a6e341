//! Pure-Rust [`GeometryEngine`] built on `geo`, `rstar`, and `proj4rs`.

use curve_number_models::{AttributeValue, Crs, Feature, Field, Raster, VectorLayer};
use geo::{
    Area as _, BooleanOps as _, BoundingRect as _, Intersects as _, MapCoords as _,
    MultiPolygon, RemoveRepeatedPoints as _, Validation as _, coord,
};
use rstar::{AABB, RTree, RTreeObject};

use crate::{GeometryEngine, GeometryError, polygonize, projection::Transformer};

/// An overlay feature stored in the R-tree by position.
struct IndexedFeature {
    index: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedFeature {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Geometry engine implemented entirely in Rust.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeEngine;

impl NativeEngine {
    /// Creates the engine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl GeometryEngine for NativeEngine {
    fn reproject(
        &self,
        geometry: &MultiPolygon<f64>,
        from: Crs,
        to: Crs,
    ) -> Result<MultiPolygon<f64>, GeometryError> {
        if from == to {
            return Ok(geometry.clone());
        }
        Transformer::new(from, to)?.transform_geometry(geometry)
    }

    fn reproject_layer(&self, layer: &VectorLayer, to: Crs) -> Result<VectorLayer, GeometryError> {
        if layer.crs() == to {
            return Ok(layer.clone());
        }

        let transformer = Transformer::new(layer.crs(), to)?;
        let features = layer
            .features()
            .iter()
            .map(|f| {
                Ok(Feature {
                    geometry: transformer.transform_geometry(&f.geometry)?,
                    attributes: f.attributes.clone(),
                })
            })
            .collect::<Result<Vec<_>, GeometryError>>()?;

        log::debug!(
            "Reprojected {} features from {} to {to}",
            features.len(),
            layer.crs()
        );

        Ok(layer.clone().into_crs(to, features))
    }

    fn measure_area(&self, geometry: &MultiPolygon<f64>, crs: Crs) -> Result<f64, GeometryError> {
        if crs.is_geographic() {
            return Err(GeometryError::GeographicArea { crs });
        }
        Ok(geometry.unsigned_area())
    }

    fn polygonize(&self, raster: &Raster, field: &str) -> VectorLayer {
        polygonize::polygonize(raster, field)
    }

    fn fix_geometries(&self, layer: &VectorLayer) -> VectorLayer {
        let mut repaired = 0_usize;
        let features: Vec<Feature> = layer
            .features()
            .iter()
            .filter_map(|f| {
                let (geometry, changed) = repair(&f.geometry);
                if changed {
                    repaired += 1;
                }
                (!is_empty(&geometry)).then(|| Feature {
                    geometry,
                    attributes: f.attributes.clone(),
                })
            })
            .collect();

        let dropped = layer.len() - features.len();
        if repaired > 0 || dropped > 0 {
            log::info!("Repaired {repaired} geometries, dropped {dropped} empty features");
        }

        layer.with_features(features)
    }

    fn clip(&self, layer: &VectorLayer, overlay: &MultiPolygon<f64>) -> VectorLayer {
        let Some(bounds) = overlay.bounding_rect() else {
            return layer.with_features(Vec::new());
        };

        let features = layer
            .features()
            .iter()
            .filter(|f| f.geometry.bounding_rect().is_some_and(|r| r.intersects(&bounds)))
            .filter_map(|f| {
                let geometry = f.geometry.intersection(overlay);
                (!is_empty(&geometry)).then(|| Feature {
                    geometry,
                    attributes: f.attributes.clone(),
                })
            })
            .collect();

        layer.with_features(features)
    }

    fn intersection(
        &self,
        input: &VectorLayer,
        input_fields: &[&str],
        overlay: &VectorLayer,
        overlay_fields: &[&str],
    ) -> Result<VectorLayer, GeometryError> {
        if input.crs() != overlay.crs() {
            return Err(GeometryError::CrsMismatch {
                left: input.crs(),
                right: overlay.crs(),
            });
        }

        let input_columns = resolve_columns(input, input_fields);
        let overlay_columns = resolve_columns(overlay, overlay_fields);
        let fields = input_columns
            .iter()
            .chain(&overlay_columns)
            .map(|(field, _)| field.clone())
            .collect();
        let mut output = VectorLayer::new(input.crs(), fields);

        let tree = RTree::bulk_load(
            overlay
                .features()
                .iter()
                .enumerate()
                .filter_map(|(index, f)| {
                    compute_envelope(&f.geometry).map(|envelope| IndexedFeature { index, envelope })
                })
                .collect(),
        );

        for feature in input.features() {
            let Some(envelope) = compute_envelope(&feature.geometry) else {
                continue;
            };

            let mut candidates: Vec<usize> = tree
                .locate_in_envelope_intersecting(&envelope)
                .map(|entry| entry.index)
                .collect();
            candidates.sort_unstable();

            for idx in candidates {
                let other = &overlay.features()[idx];
                let geometry = feature.geometry.intersection(&other.geometry);
                if is_empty(&geometry) {
                    continue;
                }

                let attributes = pick(&feature.attributes, &input_columns)
                    .chain(pick(&other.attributes, &overlay_columns))
                    .collect();
                output.push(Feature {
                    geometry,
                    attributes,
                });
            }
        }

        log::debug!(
            "Intersected {} x {} features into {}",
            input.len(),
            overlay.len(),
            output.len()
        );

        Ok(output)
    }

    fn swap_xy(&self, layer: &VectorLayer) -> VectorLayer {
        let features = layer
            .features()
            .iter()
            .map(|f| Feature {
                geometry: f.geometry.map_coords(|c| coord! { x: c.y, y: c.x }),
                attributes: f.attributes.clone(),
            })
            .collect();
        layer.with_features(features)
    }
}

/// Returns the repaired geometry and whether it had to change.
fn repair(geometry: &MultiPolygon<f64>) -> (MultiPolygon<f64>, bool) {
    let cleaned = geometry.remove_repeated_points();
    if cleaned.is_valid() {
        let changed = cleaned != *geometry;
        return (cleaned, changed);
    }
    // a self-union rebuilds rings with consistent orientation and no
    // self-intersections
    (cleaned.union(&MultiPolygon::new(Vec::new())), true)
}

fn is_empty(geometry: &MultiPolygon<f64>) -> bool {
    geometry.0.is_empty() || geometry.unsigned_area() <= 0.0
}

fn compute_envelope(geometry: &MultiPolygon<f64>) -> Option<AABB<[f64; 2]>> {
    geometry
        .bounding_rect()
        .map(|rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]))
}

/// Maps requested names to output fields and source column positions.
fn resolve_columns(layer: &VectorLayer, names: &[&str]) -> Vec<(Field, Option<usize>)> {
    names
        .iter()
        .map(|name| match layer.field_index(name) {
            Some(idx) => (
                Field {
                    name: (*name).to_string(),
                    kind: layer.fields()[idx].kind,
                },
                Some(idx),
            ),
            None => {
                log::warn!("Field {name} not present in source layer, emitting nulls");
                (Field::text(name), None)
            }
        })
        .collect()
}

fn pick<'a>(
    attributes: &'a [AttributeValue],
    columns: &'a [(Field, Option<usize>)],
) -> impl Iterator<Item = AttributeValue> + 'a {
    columns.iter().map(|(_, idx)| {
        idx.and_then(|i| attributes.get(i).cloned())
            .unwrap_or_default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use curve_number_models::{CONUS_ALBERS, WGS84};
    use geo::{LineString, Polygon, polygon};

    fn square(x: f64, y: f64, size: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: x, y: y),
            (x: x + size, y: y),
            (x: x + size, y: y + size),
            (x: x, y: y + size),
            (x: x, y: y),
        ]])
    }

    fn layer(
        fields: Vec<Field>,
        features: Vec<(MultiPolygon<f64>, Vec<AttributeValue>)>,
    ) -> VectorLayer {
        let mut layer = VectorLayer::new(CONUS_ALBERS, fields);
        for (geometry, attributes) in features {
            layer.push(Feature {
                geometry,
                attributes,
            });
        }
        layer
    }

    #[test]
    fn measure_area_rejects_geographic_crs() {
        let engine = NativeEngine::new();
        let geometry = square(0.0, 0.0, 10.0);
        assert!((engine.measure_area(&geometry, CONUS_ALBERS).unwrap() - 100.0).abs() < 1e-9);
        assert!(matches!(
            engine.measure_area(&geometry, WGS84),
            Err(GeometryError::GeographicArea { .. })
        ));
    }

    #[test]
    fn fix_geometries_repairs_bowtie() {
        let bowtie = MultiPolygon::new(vec![Polygon::new(
            LineString::from(vec![
                (0.0, 0.0),
                (10.0, 10.0),
                (10.0, 0.0),
                (0.0, 10.0),
                (0.0, 0.0),
            ]),
            vec![],
        )]);
        let input = layer(
            vec![Field::text("musym")],
            vec![(bowtie, vec![AttributeValue::text_or_null("A1")])],
        );

        let fixed = NativeEngine::new().fix_geometries(&input);
        assert_eq!(fixed.len(), 1);
        assert!(fixed.features()[0].geometry.is_valid());
        assert!((fixed.features()[0].geometry.unsigned_area() - 50.0).abs() < 1e-6);
        assert_eq!(
            fixed.features()[0].attributes[0],
            AttributeValue::text_or_null("A1")
        );
    }

    #[test]
    fn clip_drops_features_outside_overlay() {
        let input = layer(
            vec![Field::integer("id")],
            vec![
                (square(0.0, 0.0, 10.0), vec![AttributeValue::Integer(1)]),
                (square(100.0, 100.0, 10.0), vec![AttributeValue::Integer(2)]),
            ],
        );
        let clipped = NativeEngine::new().clip(&input, &square(5.0, 0.0, 10.0));
        assert_eq!(clipped.len(), 1);
        assert_eq!(clipped.features()[0].attributes[0], AttributeValue::Integer(1));
        assert!((clipped.features()[0].geometry.unsigned_area() - 50.0).abs() < 1e-6);
    }

    #[test]
    fn intersection_combines_attributes_of_overlapping_pairs() {
        let soil = layer(
            vec![Field::text("musym"), Field::text("hydgrpdcd"), Field::text("muname")],
            vec![(
                square(0.0, 0.0, 20.0),
                vec![
                    AttributeValue::text_or_null("CeB"),
                    AttributeValue::text_or_null("B"),
                    AttributeValue::text_or_null("Cecil"),
                ],
            )],
        );
        let land_cover = layer(
            vec![Field::real("VALUE")],
            vec![
                (square(0.0, 0.0, 10.0), vec![AttributeValue::Real(41.0)]),
                (square(10.0, 0.0, 10.0), vec![AttributeValue::Real(82.0)]),
                (square(50.0, 50.0, 10.0), vec![AttributeValue::Real(11.0)]),
            ],
        );

        let result = NativeEngine::new()
            .intersection(&soil, &["MUSYM", "HYDGRPDCD", "MUNAME"], &land_cover, &["VALUE"])
            .unwrap();

        let names: Vec<&str> = result.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["MUSYM", "HYDGRPDCD", "MUNAME", "VALUE"]);
        assert_eq!(result.len(), 2);
        assert_eq!(result.features()[0].attributes[3], AttributeValue::Real(41.0));
        assert_eq!(result.features()[1].attributes[3], AttributeValue::Real(82.0));
        assert_eq!(
            result.features()[1].attributes[0],
            AttributeValue::text_or_null("CeB")
        );
    }

    #[test]
    fn intersection_fills_missing_fields_with_null() {
        let a = layer(vec![], vec![(square(0.0, 0.0, 10.0), vec![])]);
        let b = layer(
            vec![Field::real("VALUE")],
            vec![(square(0.0, 0.0, 10.0), vec![AttributeValue::Real(21.0)])],
        );
        let result = NativeEngine::new()
            .intersection(&a, &["MUSYM"], &b, &["VALUE"])
            .unwrap();
        assert_eq!(result.len(), 1);
        assert!(result.features()[0].attributes[0].is_null());
    }

    #[test]
    fn intersection_requires_matching_crs() {
        let a = layer(vec![], vec![]);
        let b = VectorLayer::new(WGS84, vec![]);
        assert!(matches!(
            NativeEngine::new().intersection(&a, &[], &b, &[]),
            Err(GeometryError::CrsMismatch { .. })
        ));
    }

    #[test]
    fn swap_xy_exchanges_axes() {
        let input = layer(vec![], vec![(square(1.0, 2.0, 1.0), vec![])]);
        let swapped = NativeEngine::new().swap_xy(&input);
        let first = swapped.features()[0].geometry.0[0].exterior().0[0];
        assert!((first.x - 2.0).abs() < f64::EPSILON);
        assert!((first.y - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn reproject_layer_preserves_attributes() {
        let input = layer(
            vec![Field::integer("id")],
            vec![(square(0.0, 0.0, 1000.0), vec![AttributeValue::Integer(7)])],
        );
        let engine = NativeEngine::new();
        let geographic = engine.reproject_layer(&input, WGS84).unwrap();
        assert_eq!(geographic.crs(), WGS84);
        assert_eq!(geographic.features()[0].attributes[0], AttributeValue::Integer(7));

        let back = engine.reproject_layer(&geographic, CONUS_ALBERS).unwrap();
        let area = back.features()[0].geometry.unsigned_area();
        assert!((area - 1_000_000.0).abs() < 1.0, "area = {area}");
    }
}
