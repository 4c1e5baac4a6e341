//! Pipeline stages.

use strum::{EnumCount, IntoEnumIterator};
use strum_macros::{AsRefStr, Display, EnumCount as EnumCountMacro, EnumIter};

/// One step of a pipeline run, in execution order.
///
/// Progress is reported as the stage's 1-based position out of
/// [`PipelineStage::COUNT`]. Stages whose branch is not requested are
/// skipped but still advance the position.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, AsRefStr, EnumIter,
    EnumCountMacro,
)]
#[strum(serialize_all = "snake_case")]
pub enum PipelineStage {
    /// Bring the AOI into the working Albers CRS.
    NormalizeCrs,
    /// Reject AOIs whose extent is too large.
    ValidateExtent,
    /// Fetch the NLCD GeoTIFF over WMS.
    DownloadLandCover,
    /// Map palette indices to NLCD class codes.
    ReclassifyLandCover,
    /// Vectorize the reclassified raster.
    PolygonizeLandCover,
    /// Fix invalid land cover polygons.
    RepairLandCoverGeometry,
    /// Reproject the AOI to EPSG:4326 for the soil services.
    ReprojectAoiToGeographic,
    /// Query Soil Data Access.
    AcquireSoil,
    /// Query the WFS fallback.
    AcquireSoilFallback,
    /// Add missing soil fields and fix invalid polygons.
    RepairSoilGeometry,
    /// Clip soil to the AOI polygon.
    ClipSoil,
    /// Reproject soil into the working CRS.
    ReprojectSoil,
    /// Intersect soil with land cover.
    IntersectLayers,
    /// Add `NLCD_LU`.
    DeriveLandUse,
    /// Add `GDCodeTemp`.
    DeriveGdCodeTemp,
    /// Resolve dual HSGs into `GDCode`.
    ResolveGdCode,
    /// Left-join `CN_Join` from the lookup table.
    JoinLookup,
    /// Add the integer `CN`.
    CastCurveNumber,
    /// Drop the working columns.
    DropIntermediateFields,
    /// Hand back the selected layers.
    RegisterOutputs,
}

impl PipelineStage {
    /// Number of stages.
    pub const COUNT: usize = <Self as EnumCount>::COUNT;

    /// Every stage in execution order.
    pub fn all() -> impl Iterator<Item = Self> {
        Self::iter()
    }

    /// 1-based position of the stage in the run.
    #[must_use]
    pub fn position(self) -> usize {
        Self::iter().position(|s| s == self).map_or(0, |i| i + 1)
    }

    /// Human-readable description for progress messages.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::NormalizeCrs => "Normalizing AOI coordinate reference system",
            Self::ValidateExtent => "Validating AOI extent",
            Self::DownloadLandCover => "Downloading NLCD land cover",
            Self::ReclassifyLandCover => "Reclassifying land cover",
            Self::PolygonizeLandCover => "Vectorizing land cover",
            Self::RepairLandCoverGeometry => "Fixing land cover geometries",
            Self::ReprojectAoiToGeographic => "Reprojecting AOI to EPSG:4326",
            Self::AcquireSoil => "Requesting SSURGO soil from Soil Data Access",
            Self::AcquireSoilFallback => "Requesting SSURGO soil from WFS",
            Self::RepairSoilGeometry => "Fixing soil geometries",
            Self::ClipSoil => "Clipping soil to AOI",
            Self::ReprojectSoil => "Reprojecting soil layer",
            Self::IntersectLayers => "Intersecting soil and land cover",
            Self::DeriveLandUse => "Calculating NLCD_LU",
            Self::DeriveGdCodeTemp => "Calculating GDCodeTemp",
            Self::ResolveGdCode => "Resolving GDCode",
            Self::JoinLookup => "Joining curve number lookup",
            Self::CastCurveNumber => "Calculating CN",
            Self::DropIntermediateFields => "Dropping intermediate fields",
            Self::RegisterOutputs => "Registering outputs",
        }
    }
}
