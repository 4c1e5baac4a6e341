//! Output selection and registered results.

use curve_number_derive::JoinReport;
use curve_number_models::{Raster, VectorLayer};
use curve_number_soil::SoilProvenance;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};

/// Which layers the caller wants back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct OutputSelection {
    /// Reclassified land cover raster.
    pub land_cover_raster: bool,
    /// Vectorized land cover.
    pub land_cover_vector: bool,
    /// Prepared SSURGO soil polygons.
    pub soil: bool,
    /// Curve number polygons.
    pub curve_number: bool,
}

impl OutputSelection {
    /// Requests only the curve number layer.
    #[must_use]
    pub const fn curve_number_only() -> Self {
        Self {
            land_cover_raster: false,
            land_cover_vector: false,
            soil: false,
            curve_number: true,
        }
    }

    /// Returns `true` if nothing was requested.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        !(self.land_cover_raster || self.land_cover_vector || self.soil || self.curve_number)
    }

    /// The land cover branch runs for any land cover or CN output.
    #[must_use]
    pub const fn needs_land_cover(self) -> bool {
        self.land_cover_raster || self.needs_land_cover_vector()
    }

    /// Vectorization runs for the vector output or CN.
    #[must_use]
    pub const fn needs_land_cover_vector(self) -> bool {
        self.land_cover_vector || self.curve_number
    }

    /// The soil branch runs for the soil output or CN.
    #[must_use]
    pub const fn needs_soil(self) -> bool {
        self.soil || self.curve_number
    }
}

/// The four layers a run can register.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, AsRefStr, Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OutputKind {
    /// Reclassified NLCD raster.
    LandCoverRaster,
    /// Polygonized NLCD layer.
    LandCoverVector,
    /// Prepared SSURGO map units.
    Soil,
    /// Final curve number polygons.
    CurveNumber,
}

impl OutputKind {
    /// Fixed display name of the layer.
    #[must_use]
    pub const fn layer_name(self) -> &'static str {
        match self {
            Self::LandCoverRaster => "NLCD Land Cover Raster",
            Self::LandCoverVector => "NLCD Land Cover Vector",
            Self::Soil => "SSURGO Soil Layer",
            Self::CurveNumber => "Curve Number Layer",
        }
    }

    /// Style definition applied when the layer is loaded.
    #[must_use]
    pub const fn style(self) -> &'static str {
        match self {
            Self::LandCoverRaster => "NLCD_Raster.qml",
            Self::LandCoverVector => "NLCD_Vector.qml",
            Self::Soil => "Soil_Layer.qml",
            Self::CurveNumber => "CN_Grid.qml",
        }
    }
}

/// Borrowed layer data.
#[derive(Debug, Clone, Copy)]
pub enum LayerData<'a> {
    /// Single-band grid.
    Raster(&'a Raster),
    /// Polygon layer.
    Vector(&'a VectorLayer),
}

/// One registered layer with its name and style.
#[derive(Debug, Clone, Copy)]
pub struct OutputLayer<'a> {
    /// Which output this is.
    pub kind: OutputKind,
    /// The layer itself.
    pub data: LayerData<'a>,
}

impl OutputLayer<'_> {
    /// Fixed display name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.kind.layer_name()
    }

    /// Style definition.
    #[must_use]
    pub const fn style(&self) -> &'static str {
        self.kind.style()
    }
}

/// Layers produced by a completed run. Only requested outputs are set.
#[derive(Debug, Clone, Default)]
pub struct RegisteredOutputs {
    /// Reclassified land cover raster.
    pub land_cover_raster: Option<Raster>,
    /// Vectorized land cover.
    pub land_cover_vector: Option<VectorLayer>,
    /// Prepared soil polygons.
    pub soil: Option<VectorLayer>,
    /// Which strategy produced the soil layer. Set whenever the soil branch
    /// ran, even if only CN was requested.
    pub soil_provenance: Option<SoilProvenance>,
    /// Curve number polygons.
    pub curve_number: Option<VectorLayer>,
    /// Lookup join statistics for the CN layer.
    pub join_report: Option<JoinReport>,
}

impl RegisteredOutputs {
    /// Registered layers in a stable order.
    #[must_use]
    pub fn layers(&self) -> Vec<OutputLayer<'_>> {
        let mut layers = Vec::new();
        if let Some(raster) = &self.land_cover_raster {
            layers.push(OutputLayer {
                kind: OutputKind::LandCoverRaster,
                data: LayerData::Raster(raster),
            });
        }
        let vectors = [
            (OutputKind::LandCoverVector, &self.land_cover_vector),
            (OutputKind::Soil, &self.soil),
            (OutputKind::CurveNumber, &self.curve_number),
        ];
        for (kind, layer) in vectors {
            if let Some(layer) = layer {
                layers.push(OutputLayer {
                    kind,
                    data: LayerData::Vector(layer),
                });
            }
        }
        layers
    }

    /// Looks up a layer by its fixed display name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<OutputLayer<'_>> {
        self.layers().into_iter().find(|l| l.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curve_number_models::CONUS_ALBERS;

    #[test]
    fn curve_number_pulls_in_both_branches() {
        let selection = OutputSelection::curve_number_only();
        assert!(selection.needs_land_cover());
        assert!(selection.needs_land_cover_vector());
        assert!(selection.needs_soil());
    }

    #[test]
    fn raster_only_skips_vectorization_and_soil() {
        let selection = OutputSelection {
            land_cover_raster: true,
            ..OutputSelection::default()
        };
        assert!(selection.needs_land_cover());
        assert!(!selection.needs_land_cover_vector());
        assert!(!selection.needs_soil());
        assert!(OutputSelection::default().is_empty());
    }

    #[test]
    fn layers_are_listed_by_fixed_name() {
        let outputs = RegisteredOutputs {
            curve_number: Some(VectorLayer::new(CONUS_ALBERS, vec![])),
            soil: Some(VectorLayer::new(CONUS_ALBERS, vec![])),
            ..RegisteredOutputs::default()
        };
        let names: Vec<&str> = outputs.layers().iter().map(OutputLayer::name).collect();
        assert_eq!(names, ["SSURGO Soil Layer", "Curve Number Layer"]);
        assert_eq!(outputs.get("Curve Number Layer").map(|l| l.style()), Some("CN_Grid.qml"));
        assert!(outputs.get("NLCD Land Cover Raster").is_none());
    }
}
