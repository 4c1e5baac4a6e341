//! Coordinate reference system identifiers.
//!
//! Only the authority and code are tracked here. Projection parameters live
//! in `curve_number_geometry`, which owns the actual transformations.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Authority that issued a CRS code.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum CrsAuthority {
    /// EPSG geodetic parameter registry.
    Epsg,
    /// Esri projection engine codes (e.g. `ESRI:102003`).
    Esri,
}

/// A coordinate reference system, e.g. `EPSG:5070`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Crs {
    /// Issuing authority.
    pub authority: CrsAuthority,
    /// Numeric code within the authority.
    pub code: u32,
}

/// WGS 84 geographic coordinates (longitude, latitude in degrees).
pub const WGS84: Crs = Crs::epsg(4326);

/// NAD83 / Conus Albers, the default working CRS of the pipeline.
pub const CONUS_ALBERS: Crs = Crs::epsg(5070);

/// Projected equal-area systems that are accepted without reprojection.
///
/// All of them are Albers equal-area projections in metres, so planar area
/// measured in them is meaningful.
pub const AREA_PRESERVING: &[Crs] = &[
    Crs::epsg(5070),
    Crs::epsg(5071),
    Crs::epsg(5072),
    Crs::epsg(6350),
    Crs::epsg(3083),
    Crs::epsg(3310),
    Crs::esri(102_003),
];

impl Crs {
    /// Creates an EPSG CRS.
    #[must_use]
    pub const fn epsg(code: u32) -> Self {
        Self {
            authority: CrsAuthority::Epsg,
            code,
        }
    }

    /// Creates an Esri CRS.
    #[must_use]
    pub const fn esri(code: u32) -> Self {
        Self {
            authority: CrsAuthority::Esri,
            code,
        }
    }

    /// Returns `true` for longitude/latitude systems.
    #[must_use]
    pub const fn is_geographic(self) -> bool {
        matches!(self.authority, CrsAuthority::Epsg) && matches!(self.code, 4326 | 4269)
    }

    /// Returns `true` if the CRS is in the [`AREA_PRESERVING`] whitelist.
    #[must_use]
    pub fn is_area_preserving(self) -> bool {
        AREA_PRESERVING.contains(&self)
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.authority, self.code)
    }
}

/// Error returned when a CRS identifier cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseCrsError {
    /// The rejected input.
    pub input: String,
}

impl fmt::Display for ParseCrsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid CRS identifier '{}': expected AUTHORITY:CODE (e.g. EPSG:5070)",
            self.input
        )
    }
}

impl std::error::Error for ParseCrsError {}

impl FromStr for Crs {
    type Err = ParseCrsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseCrsError {
            input: s.to_string(),
        };

        let (authority, code) = s.trim().split_once(':').ok_or_else(err)?;
        let authority = CrsAuthority::from_str(authority.trim()).map_err(|_| err())?;
        let code = code.trim().parse::<u32>().map_err(|_| err())?;

        Ok(Self { authority, code })
    }
}

impl TryFrom<String> for Crs {
    type Error = ParseCrsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Crs> for String {
    fn from(value: Crs) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitive_authority() {
        assert_eq!("epsg:5070".parse::<Crs>().unwrap(), CONUS_ALBERS);
        assert_eq!("ESRI:102003".parse::<Crs>().unwrap(), Crs::esri(102_003));
        assert_eq!(" EPSG : 4326 ".parse::<Crs>().unwrap(), WGS84);
    }

    #[test]
    fn rejects_malformed_identifiers() {
        assert!("5070".parse::<Crs>().is_err());
        assert!("OGC:CRS84".parse::<Crs>().is_err());
        assert!("EPSG:abc".parse::<Crs>().is_err());
    }

    #[test]
    fn displays_as_authority_and_code() {
        assert_eq!(CONUS_ALBERS.to_string(), "EPSG:5070");
        assert_eq!(Crs::esri(102_003).to_string(), "ESRI:102003");
    }

    #[test]
    fn whitelist_is_projected() {
        for crs in AREA_PRESERVING {
            assert!(!crs.is_geographic(), "{crs} should be projected");
            assert!(crs.is_area_preserving());
        }
        assert!(!WGS84.is_area_preserving());
        assert!(!Crs::epsg(3857).is_area_preserving());
    }
}
