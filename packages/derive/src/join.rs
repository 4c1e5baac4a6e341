//! Left outer join of the lookup table onto the intersection layer.

use std::collections::BTreeSet;

use curve_number_models::{AttributeValue, Field, VectorLayer};

use crate::{CN_JOIN_FIELD, CnLookupTable, GDCODE_FIELD};

/// Outcome of a lookup join.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinReport {
    /// Polygons that found a curve number.
    pub matched: usize,
    /// Polygons left with a null curve number.
    pub unmatched: usize,
    /// Distinct GDCodes with no table entry.
    pub unmatched_codes: BTreeSet<String>,
}

/// Copies `CN_Join` from `table` onto every polygon by `GDCode`.
///
/// Every polygon is kept; non-matches get a null `CN_Join`.
pub fn join_lookup(layer: &mut VectorLayer, table: &CnLookupTable) -> JoinReport {
    let code_idx = layer.field_index(GDCODE_FIELD);
    let join_idx = layer.add_field(Field::real(CN_JOIN_FIELD));
    let mut report = JoinReport::default();

    for feature in layer.features_mut() {
        let code = code_idx.and_then(|i| feature.attributes[i].as_text());
        let cn = code.as_deref().and_then(|c| table.get(c));

        feature.attributes[join_idx] = match cn {
            Some(value) => {
                report.matched += 1;
                AttributeValue::Real(value)
            }
            None => {
                report.unmatched += 1;
                report
                    .unmatched_codes
                    .insert(code.unwrap_or_else(|| "NULL".to_string()));
                AttributeValue::Null
            }
        };
    }

    if report.unmatched > 0 {
        log::warn!(
            "{} of {} polygons have no curve number; unmatched GDCodes: {}",
            report.unmatched,
            report.matched + report.unmatched,
            report
                .unmatched_codes
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        );
    } else {
        log::info!("All {} polygons matched a curve number", report.matched);
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use curve_number_models::{CONUS_ALBERS, Feature};
    use geo::MultiPolygon;

    fn layer(codes: &[Option<&str>]) -> VectorLayer {
        let mut layer = VectorLayer::new(CONUS_ALBERS, vec![Field::text(GDCODE_FIELD)]);
        for code in codes {
            layer.push(Feature {
                geometry: MultiPolygon::new(vec![]),
                attributes: vec![code.map_or(AttributeValue::Null, AttributeValue::text_or_null)],
            });
        }
        layer
    }

    #[test]
    fn unmatched_polygons_are_kept_with_null() {
        let table = CnLookupTable::from_reader("GDCode,CN_Join\n41B,55\n".as_bytes()).unwrap();
        let mut layer = layer(&[Some("41B"), Some("99Z"), None, Some("41B")]);

        let report = join_lookup(&mut layer, &table);

        assert_eq!(layer.len(), 4);
        assert_eq!(report.matched, 2);
        assert_eq!(report.unmatched, 2);
        assert!(report.unmatched_codes.contains("99Z"));

        let join = layer.field_index(CN_JOIN_FIELD).unwrap();
        assert_eq!(layer.features()[0].attributes[join], AttributeValue::Real(55.0));
        assert!(layer.features()[1].attributes[join].is_null());
        assert!(layer.features()[2].attributes[join].is_null());
    }
}
