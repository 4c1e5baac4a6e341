//! GDCode composition and HSG resolution.

use curve_number_models::AttributeValue;

/// Land use code assigned to water map units.
pub const WATER_CODE: &str = "11";

/// Returns `true` for map units SSURGO labels as open water.
#[must_use]
pub fn is_water_unit(musym: Option<&str>, muname: Option<&str>) -> bool {
    let water = |s: &str| s.trim() == "W" || s.trim().eq_ignore_ascii_case("water");
    musym.is_some_and(water) || muname.is_some_and(water)
}

/// Builds the unresolved GDCode for one intersection polygon.
///
/// Water units always get [`WATER_CODE`]. Otherwise the land use code is
/// followed by the HSG when there is one. Returns `None` when the land use
/// code itself is missing.
#[must_use]
pub fn gdcode_temp(
    land_use: &AttributeValue,
    hsg: &AttributeValue,
    musym: &AttributeValue,
    muname: &AttributeValue,
) -> Option<String> {
    if is_water_unit(musym.as_text().as_deref(), muname.as_text().as_deref()) {
        return Some(WATER_CODE.to_string());
    }

    let land_use = land_use.as_text()?;
    match hsg.as_text().map(|h| h.trim().to_string()) {
        Some(hsg) if !hsg.is_empty() => Some(format!("{land_use}{hsg}")),
        _ => Some(land_use),
    }
}

/// Resolves dual hydrologic soil groups.
///
/// Drained soils take the better-draining group (`B/D` becomes `B`);
/// undrained soils take `D` (`B/D` becomes `D`).
#[must_use]
pub fn resolve_gdcode(temp: &str, drained: bool) -> String {
    if drained {
        temp.replace("/D", "")
    } else {
        temp.replace("A/", "").replace("B/", "").replace("C/", "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> AttributeValue {
        AttributeValue::text_or_null(s)
    }

    #[test]
    fn simple_hsg_is_appended() {
        let temp = gdcode_temp(
            &AttributeValue::Real(41.0),
            &text("B"),
            &text("CeB"),
            &text("Cecil"),
        );
        assert_eq!(temp.as_deref(), Some("41B"));
        assert_eq!(resolve_gdcode("41B", true), "41B");
        assert_eq!(resolve_gdcode("41B", false), "41B");
    }

    #[test]
    fn dual_hsg_depends_on_drainage() {
        let temp = gdcode_temp(
            &AttributeValue::Real(82.0),
            &text("C/D"),
            &text("Ly"),
            &text("Lynchburg"),
        )
        .unwrap();
        assert_eq!(temp, "82C/D");
        assert_eq!(resolve_gdcode(&temp, true), "82C");
        assert_eq!(resolve_gdcode(&temp, false), "82D");
        assert_eq!(resolve_gdcode("21A/D", false), "21D");
        assert_eq!(resolve_gdcode("21B/D", true), "21B");
    }

    #[test]
    fn water_units_ignore_hsg_and_land_use() {
        for (musym, muname) in [
            ("W", "Anything"),
            ("water", "x"),
            ("Ws", "WATER"),
            ("", "Water"),
            ("X", "W"),
        ] {
            let temp = gdcode_temp(
                &AttributeValue::Real(82.0),
                &text("B/D"),
                &text(musym),
                &text(muname),
            );
            assert_eq!(temp.as_deref(), Some("11"), "musym={musym} muname={muname}");
            assert_eq!(resolve_gdcode("11", false), "11");
        }
    }

    #[test]
    fn lowercase_w_is_not_water() {
        assert!(!is_water_unit(Some("w"), Some("Wehadkee")));
        assert!(!is_water_unit(Some("X"), Some("w")));
        assert!(is_water_unit(Some("W"), None));
    }

    #[test]
    fn map_unit_named_w_is_water() {
        assert!(is_water_unit(Some("X"), Some("W")));
        assert!(is_water_unit(None, Some(" W ")));
    }

    #[test]
    fn missing_hsg_yields_bare_land_use() {
        let temp = gdcode_temp(
            &AttributeValue::Real(43.0),
            &AttributeValue::Null,
            &text("Ux"),
            &text("Urban land"),
        );
        assert_eq!(temp.as_deref(), Some("43"));
    }

    #[test]
    fn missing_land_use_yields_none() {
        let temp = gdcode_temp(&AttributeValue::Null, &text("B"), &text("CeB"), &text("Cecil"));
        assert!(temp.is_none());
    }
}
