#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Curve number pipeline orchestration.
//!
//! [`run`] drives one batch run through the fixed sequence of
//! [`PipelineStage`]s:
//!
//! 1. Normalize the AOI into an area-preserving CRS and reject oversized
//!    extents.
//! 2. Land cover branch: download, reclassify, and (for vector or CN
//!    output) vectorize and repair.
//! 3. Soil branch: query Soil Data Access, falling back to WFS only when
//!    the primary fails, then repair, clip, and reproject.
//! 4. Curve number branch: intersect, derive `GDCode`, join the lookup
//!    table, and cast `CN`.
//!
//! Only the branches the [`OutputSelection`] needs are executed, and only
//! requested layers are registered. The [`CancellationFlag`] is polled
//! before every stage.

pub mod cancel;
pub mod config;
pub mod outputs;
pub mod progress;
pub mod stage;

use std::sync::Arc;

use curve_number_aoi::{AoiError, ExtentVerdict, normalize_crs, validate_extent};
use curve_number_derive::{
    CnLookupTable, LAND_COVER_INTERSECTION_FIELDS, SOIL_INTERSECTION_FIELDS, cast_curve_number,
    derive_gdcode_temp, derive_land_use, drop_intermediate_fields, join_lookup, resolve_gdcodes,
};
use curve_number_geometry::{GeometryEngine, GeometryError, NativeEngine};
use curve_number_landcover::{
    GetMapRequest, LAND_COVER_FIELD, LandCoverConfig, LandCoverError, LandCoverSource,
    WmsLandCoverSource, reclassify,
};
use curve_number_models::{AreaOfInterest, VectorLayer, WGS84};
use curve_number_soil::{
    SoilAcquisitionError, SoilDataAccess, SoilError, SoilProvenance, SoilStrategy,
    SoilWebFeatureService, clip_soil, ensure_required_fields, reproject_soil,
};

pub use cancel::CancellationFlag;
pub use config::{ConfigError, HttpConfig, ServiceConfig};
pub use outputs::{LayerData, OutputKind, OutputLayer, OutputSelection, RegisteredOutputs};
pub use progress::{NullProgress, ProgressCallback, null_progress};
pub use stage::PipelineStage;

/// Errors that abort a run. No outputs are registered.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The AOI could not be normalized or measured.
    #[error("Invalid area of interest: {0}")]
    Aoi(#[from] AoiError),

    /// A geometry operation failed.
    #[error("Geometry operation failed: {0}")]
    Geometry(#[from] GeometryError),

    /// The land cover raster could not be obtained.
    #[error("Land cover acquisition failed: {0}")]
    LandCover(#[from] LandCoverError),

    /// Both soil strategies failed.
    #[error(transparent)]
    SoilAcquisition(#[from] SoilAcquisitionError),

    /// The soil layer could not be prepared.
    #[error("Soil preparation failed: {0}")]
    Soil(#[from] SoilError),

    /// A branch needed by the requested outputs produced nothing.
    #[error("Missing intermediate layer: {layer}")]
    MissingLayer {
        /// Name of the absent layer.
        layer: &'static str,
    },
}

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// All requested layers were produced.
    Completed(RegisteredOutputs),
    /// The AOI failed validation. Nothing was downloaded.
    Rejected {
        /// User-facing explanation.
        message: String,
    },
    /// The caller cancelled the run between stages.
    Cancelled,
}

/// Caller-supplied parameters for one run.
#[derive(Debug, Clone)]
pub struct PipelineParams {
    /// Boundary polygon in any supported CRS.
    pub aoi: AreaOfInterest,
    /// GDCode to curve number table.
    pub lookup: CnLookupTable,
    /// Resolve dual HSGs as drained (`B/D` to `B`) instead of undrained.
    pub drained_soils: bool,
    /// Requested layers.
    pub outputs: OutputSelection,
    /// Set unmapped land cover cells to no-data instead of passing them
    /// through.
    pub nodata_for_missing: bool,
}

impl PipelineParams {
    /// Parameters for a CN-only run with the embedded lookup table and
    /// undrained soils.
    ///
    /// # Errors
    ///
    /// Returns an error if the embedded lookup table is malformed.
    pub fn new(aoi: AreaOfInterest) -> Result<Self, curve_number_derive::LookupError> {
        Ok(Self {
            aoi,
            lookup: CnLookupTable::embedded()?,
            drained_soils: false,
            outputs: OutputSelection::curve_number_only(),
            nodata_for_missing: false,
        })
    }
}

/// Geometry engine and data sources a run talks to.
#[derive(Clone)]
pub struct PipelineServices {
    /// Geometry primitives.
    pub engine: Arc<dyn GeometryEngine>,
    /// Land cover provider.
    pub land_cover: Arc<dyn LandCoverSource>,
    /// GetMap settings for `land_cover`.
    pub land_cover_config: LandCoverConfig,
    /// First soil strategy tried.
    pub primary_soil: Arc<dyn SoilStrategy>,
    /// Soil strategy used only when the primary fails.
    pub fallback_soil: Arc<dyn SoilStrategy>,
}

impl PipelineServices {
    /// Wires the native engine and the remote services in `config` onto a
    /// single shared HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Client`] if the HTTP client cannot be built.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, ConfigError> {
        let client = config.build_client()?;
        let engine: Arc<dyn GeometryEngine> = Arc::new(NativeEngine::new());

        Ok(Self {
            land_cover: Arc::new(WmsLandCoverSource::new(client.clone())),
            land_cover_config: config.land_cover.clone(),
            primary_soil: Arc::new(SoilDataAccess::new(client.clone(), &config.soil)),
            fallback_soil: Arc::new(SoilWebFeatureService::new(
                client,
                &config.soil,
                Arc::clone(&engine),
            )),
            engine,
        })
    }
}

impl std::fmt::Debug for PipelineServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineServices")
            .field("land_cover_config", &self.land_cover_config)
            .field("primary_soil", &self.primary_soil.name())
            .field("fallback_soil", &self.fallback_soil.name())
            .finish_non_exhaustive()
    }
}

struct StageTracker<'a> {
    progress: &'a dyn ProgressCallback,
    cancel: &'a CancellationFlag,
}

impl StageTracker<'_> {
    /// Reports the stage and returns `true` if the run must stop.
    fn enter(&self, stage: PipelineStage) -> bool {
        if self.cancel.is_cancelled() {
            log::warn!("Run cancelled before {stage}");
            return true;
        }
        let position = stage.position();
        log::info!("[{position}/{}] {}", PipelineStage::COUNT, stage.label());
        self.progress.set_position(position as u64 - 1);
        self.progress.set_message(stage.label().to_string());
        false
    }

    fn skip(&self, stages: &[PipelineStage]) {
        for stage in stages {
            log::debug!("Skipping {stage}");
            self.progress.set_position(stage.position() as u64);
        }
    }
}

/// Runs the pipeline.
///
/// # Errors
///
/// Returns [`PipelineError`] on any fatal failure: an unusable AOI, a
/// land cover download failure, both soil strategies failing, or a
/// geometry operation failing. Extent rejection and cancellation are not
/// errors; they are reported through [`RunOutcome`].
#[allow(clippy::too_many_lines)]
pub async fn run(
    params: &PipelineParams,
    services: &PipelineServices,
    progress: Arc<dyn ProgressCallback>,
    cancel: &CancellationFlag,
) -> Result<RunOutcome, PipelineError> {
    let tracker = StageTracker {
        progress: progress.as_ref(),
        cancel,
    };

    macro_rules! enter {
        ($stage:expr) => {
            if tracker.enter($stage) {
                progress.finish_and_clear();
                return Ok(RunOutcome::Cancelled);
            }
        };
    }

    let engine = services.engine.as_ref();
    let selection = params.outputs;
    progress.set_total(PipelineStage::COUNT as u64);

    if selection.is_empty() {
        log::warn!("No outputs requested");
    }

    enter!(PipelineStage::NormalizeCrs);
    let aoi = normalize_crs(engine, &params.aoi)?;
    log::info!("Working CRS is {}", aoi.crs);

    enter!(PipelineStage::ValidateExtent);
    if let ExtentVerdict::Rejected(rejection) = validate_extent(engine, &aoi)? {
        progress.finish_and_clear();
        return Ok(RunOutcome::Rejected {
            message: rejection.to_string(),
        });
    }

    let mut land_cover_raster = None;
    let mut land_cover_vector = None;
    if selection.needs_land_cover() {
        enter!(PipelineStage::DownloadLandCover);
        let extent = aoi.extent().ok_or(AoiError::EmptyGeometry)?;
        let request = GetMapRequest::for_extent(extent, aoi.crs, &services.land_cover_config);
        let downloaded = services.land_cover.fetch_raster(&request).await?;

        enter!(PipelineStage::ReclassifyLandCover);
        let raster = reclassify(&downloaded, params.nodata_for_missing);

        if selection.needs_land_cover_vector() {
            enter!(PipelineStage::PolygonizeLandCover);
            let polygons = engine.polygonize(&raster, LAND_COVER_FIELD);
            log::info!("Vectorized land cover into {} polygons", polygons.len());

            enter!(PipelineStage::RepairLandCoverGeometry);
            land_cover_vector = Some(engine.fix_geometries(&polygons));
        } else {
            tracker.skip(&[
                PipelineStage::PolygonizeLandCover,
                PipelineStage::RepairLandCoverGeometry,
            ]);
        }
        land_cover_raster = Some(raster);
    } else {
        tracker.skip(&[
            PipelineStage::DownloadLandCover,
            PipelineStage::ReclassifyLandCover,
            PipelineStage::PolygonizeLandCover,
            PipelineStage::RepairLandCoverGeometry,
        ]);
    }

    let mut soil = None;
    let mut soil_provenance = None;
    if selection.needs_soil() {
        enter!(PipelineStage::ReprojectAoiToGeographic);
        let geographic =
            AreaOfInterest::new(engine.reproject(&aoi.geometry, aoi.crs, WGS84)?, WGS84);

        enter!(PipelineStage::AcquireSoil);
        let (mut layer, provenance) =
            match acquire(services.primary_soil.as_ref(), &geographic).await {
                Ok(layer) => {
                    tracker.skip(&[PipelineStage::AcquireSoilFallback]);
                    (layer, SoilProvenance::Primary)
                }
                Err(primary) => {
                    log::warn!(
                        "{} failed, falling back to {}: {primary}",
                        services.primary_soil.name(),
                        services.fallback_soil.name()
                    );
                    enter!(PipelineStage::AcquireSoilFallback);
                    match acquire(services.fallback_soil.as_ref(), &geographic).await {
                        Ok(layer) => {
                            let primary_error = primary.to_string();
                            (layer, SoilProvenance::Fallback { primary_error })
                        }
                        Err(fallback) => {
                            return Err(SoilAcquisitionError { primary, fallback }.into());
                        }
                    }
                }
            };
        log::info!(
            "Received {} soil map unit polygons from {provenance}",
            layer.len()
        );

        enter!(PipelineStage::RepairSoilGeometry);
        ensure_required_fields(&mut layer);
        let repaired = engine.fix_geometries(&layer);

        enter!(PipelineStage::ClipSoil);
        let clipped = clip_soil(engine, &repaired, &geographic)?;

        enter!(PipelineStage::ReprojectSoil);
        soil = Some(reproject_soil(engine, &clipped, aoi.crs)?);
        soil_provenance = Some(provenance);
    } else {
        tracker.skip(&[
            PipelineStage::ReprojectAoiToGeographic,
            PipelineStage::AcquireSoil,
            PipelineStage::AcquireSoilFallback,
            PipelineStage::RepairSoilGeometry,
            PipelineStage::ClipSoil,
            PipelineStage::ReprojectSoil,
        ]);
    }

    let mut curve_number = None;
    let mut join_report = None;
    if selection.curve_number {
        let land_cover = land_cover_vector.as_ref().ok_or(PipelineError::MissingLayer {
            layer: OutputKind::LandCoverVector.layer_name(),
        })?;
        let soil = soil.as_ref().ok_or(PipelineError::MissingLayer {
            layer: OutputKind::Soil.layer_name(),
        })?;

        enter!(PipelineStage::IntersectLayers);
        let mut layer = engine.intersection(
            soil,
            &SOIL_INTERSECTION_FIELDS,
            land_cover,
            &LAND_COVER_INTERSECTION_FIELDS,
        )?;
        log::info!("Intersection produced {} polygons", layer.len());

        enter!(PipelineStage::DeriveLandUse);
        derive_land_use(&mut layer);

        enter!(PipelineStage::DeriveGdCodeTemp);
        derive_gdcode_temp(&mut layer);

        enter!(PipelineStage::ResolveGdCode);
        resolve_gdcodes(&mut layer, params.drained_soils);

        enter!(PipelineStage::JoinLookup);
        join_report = Some(join_lookup(&mut layer, &params.lookup));

        enter!(PipelineStage::CastCurveNumber);
        cast_curve_number(&mut layer);

        enter!(PipelineStage::DropIntermediateFields);
        drop_intermediate_fields(&mut layer);
        curve_number = Some(layer);
    } else {
        tracker.skip(&[
            PipelineStage::IntersectLayers,
            PipelineStage::DeriveLandUse,
            PipelineStage::DeriveGdCodeTemp,
            PipelineStage::ResolveGdCode,
            PipelineStage::JoinLookup,
            PipelineStage::CastCurveNumber,
            PipelineStage::DropIntermediateFields,
        ]);
    }

    enter!(PipelineStage::RegisterOutputs);
    let outputs = RegisteredOutputs {
        land_cover_raster: land_cover_raster.filter(|_| selection.land_cover_raster),
        land_cover_vector: land_cover_vector.filter(|_| selection.land_cover_vector),
        soil: soil.filter(|_| selection.soil),
        soil_provenance,
        curve_number,
        join_report,
    };
    for layer in outputs.layers() {
        log::info!("Registered {} (style {})", layer.name(), layer.style());
    }

    progress.set_position(PipelineStage::COUNT as u64);
    progress.finish("Curve number run complete".to_string());
    Ok(RunOutcome::Completed(outputs))
}

/// Runs one soil strategy, treating an empty layer as a failure.
async fn acquire(
    strategy: &dyn SoilStrategy,
    aoi: &AreaOfInterest,
) -> Result<VectorLayer, SoilError> {
    log::debug!("Requesting soil from {}", strategy.name());
    let layer = strategy.acquire(aoi).await?;
    if layer.is_empty() {
        return Err(SoilError::NoFeatures);
    }
    Ok(layer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use async_trait::async_trait;
    use curve_number_models::{AttributeValue, CONUS_ALBERS, Feature, Field, Raster};
    use curve_number_soil::SoilConfig;
    use geo::{BoundingRect, Contains, MultiPolygon, Rect, coord, point, polygon};

    const X0: f64 = 1_500_000.0;
    const Y0: f64 = 1_800_000.0;

    fn square_aoi(side: f64) -> AreaOfInterest {
        AreaOfInterest::new(
            MultiPolygon::new(vec![polygon![
                (x: X0, y: Y0),
                (x: X0 + side, y: Y0),
                (x: X0 + side, y: Y0 + side),
                (x: X0, y: Y0 + side),
                (x: X0, y: Y0),
            ]]),
            CONUS_ALBERS,
        )
    }

    /// Returns a uniform raster of one palette index over the request bbox.
    struct UniformLandCover {
        palette_index: f64,
        calls: AtomicUsize,
        cancel_on_fetch: Option<CancellationFlag>,
    }

    impl UniformLandCover {
        fn new(palette_index: f64) -> Self {
            Self {
                palette_index,
                calls: AtomicUsize::new(0),
                cancel_on_fetch: None,
            }
        }
    }

    #[async_trait]
    impl LandCoverSource for UniformLandCover {
        async fn fetch_raster(&self, request: &GetMapRequest) -> Result<Raster, LandCoverError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(flag) = &self.cancel_on_fetch {
                flag.cancel();
            }
            let (w, h) = (request.width as usize, request.height as usize);
            Raster::from_extent(request.crs, request.bbox, w, h, vec![self.palette_index; w * h])
                .ok_or_else(|| LandCoverError::UnsupportedRaster {
                    message: "empty request".to_string(),
                })
        }
    }

    /// Returns one map unit covering the AOI's extent, or a canned error.
    struct FakeSoil {
        name: &'static str,
        unit: Option<(&'static str, Option<&'static str>, &'static str)>,
        calls: AtomicUsize,
        seen_crs: Mutex<Vec<curve_number_models::Crs>>,
    }

    impl FakeSoil {
        fn unit(
            name: &'static str,
            musym: &'static str,
            hsg: Option<&'static str>,
            muname: &'static str,
        ) -> Self {
            Self {
                name,
                unit: Some((musym, hsg, muname)),
                calls: AtomicUsize::new(0),
                seen_crs: Mutex::new(Vec::new()),
            }
        }

        fn failing(name: &'static str) -> Self {
            Self {
                name,
                unit: None,
                calls: AtomicUsize::new(0),
                seen_crs: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SoilStrategy for FakeSoil {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn acquire(&self, aoi: &AreaOfInterest) -> Result<VectorLayer, SoilError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen_crs.lock().unwrap().push(aoi.crs);
            let Some((musym, hsg, muname)) = self.unit else {
                return Err(SoilError::Status {
                    status: 503,
                    body: format!("{} unavailable", self.name),
                });
            };

            let extent = aoi.geometry.bounding_rect().unwrap();
            let padded = Rect::new(
                coord! { x: extent.min().x - 0.01, y: extent.min().y - 0.01 },
                coord! { x: extent.max().x + 0.01, y: extent.max().y + 0.01 },
            );
            let mut layer = VectorLayer::new(
                aoi.crs,
                vec![Field::text("musym"), Field::text("hydgrpdcd"), Field::text("muname")],
            );
            layer.push(Feature {
                geometry: MultiPolygon::new(vec![padded.to_polygon()]),
                attributes: vec![
                    AttributeValue::text_or_null(musym),
                    hsg.map_or(AttributeValue::Null, AttributeValue::text_or_null),
                    AttributeValue::text_or_null(muname),
                ],
            });
            Ok(layer)
        }
    }

    /// Serves the AOI's padded extent as latitude-first WFS GML and parses
    /// it through the real fallback service.
    struct GmlSoil {
        wfs: SoilWebFeatureService,
        calls: AtomicUsize,
    }

    impl GmlSoil {
        fn new() -> Self {
            Self {
                wfs: SoilWebFeatureService::new(
                    reqwest::Client::new(),
                    &SoilConfig::default(),
                    Arc::new(NativeEngine::new()),
                ),
                calls: AtomicUsize::new(0),
            }
        }

        fn gml(extent: Rect<f64>) -> String {
            let (w, s) = (extent.min().x - 0.01, extent.min().y - 0.01);
            let (e, n) = (extent.max().x + 0.01, extent.max().y + 0.01);
            format!(
                r#"<?xml version="1.0" encoding="utf-8"?>
<wfs:FeatureCollection xmlns:ms="http://mapserver.gis.umn.edu/mapserver"
    xmlns:gml="http://www.opengis.net/gml" xmlns:wfs="http://www.opengis.net/wfs">
  <gml:featureMember>
    <ms:mapunitpolyextended gml:id="mapunitpolyextended.1">
      <ms:multiPolygon>
        <gml:MultiSurface srsName="EPSG:4326">
          <gml:surfaceMember>
            <gml:Polygon>
              <gml:exterior>
                <gml:LinearRing>
                  <gml:posList srsDimension="2">{s} {w} {s} {e} {n} {e} {n} {w} {s} {w}</gml:posList>
                </gml:LinearRing>
              </gml:exterior>
            </gml:Polygon>
          </gml:surfaceMember>
        </gml:MultiSurface>
      </ms:multiPolygon>
      <ms:musym>CeB</ms:musym>
      <ms:muname>Cecil sandy loam</ms:muname>
    </ms:mapunitpolyextended>
  </gml:featureMember>
</wfs:FeatureCollection>"#
            )
        }
    }

    #[async_trait]
    impl SoilStrategy for GmlSoil {
        fn name(&self) -> &'static str {
            "wfs"
        }

        async fn acquire(&self, aoi: &AreaOfInterest) -> Result<VectorLayer, SoilError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(aoi.crs, WGS84);
            let extent = aoi.geometry.bounding_rect().unwrap();
            self.wfs.layer_from_gml(&Self::gml(extent))
        }
    }

    struct EmptySoil;

    #[async_trait]
    impl SoilStrategy for EmptySoil {
        fn name(&self) -> &'static str {
            "empty"
        }

        async fn acquire(&self, aoi: &AreaOfInterest) -> Result<VectorLayer, SoilError> {
            Ok(VectorLayer::new(aoi.crs, vec![Field::text("musym")]))
        }
    }

    fn services(
        land_cover: Arc<UniformLandCover>,
        primary: Arc<dyn SoilStrategy>,
        fallback: Arc<dyn SoilStrategy>,
    ) -> PipelineServices {
        PipelineServices {
            engine: Arc::new(NativeEngine::new()),
            land_cover,
            land_cover_config: LandCoverConfig::default(),
            primary_soil: primary,
            fallback_soil: fallback,
        }
    }

    fn params(outputs: OutputSelection) -> PipelineParams {
        PipelineParams {
            outputs,
            ..PipelineParams::new(square_aoi(300.0)).unwrap()
        }
    }

    async fn completed(params: &PipelineParams, services: &PipelineServices) -> RegisteredOutputs {
        match run(params, services, null_progress(), &CancellationFlag::new()).await {
            Ok(RunOutcome::Completed(outputs)) => outputs,
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn water_unit_yields_single_polygon_with_water_curve_number() {
        let land_cover = Arc::new(UniformLandCover::new(11.0));
        let primary = Arc::new(FakeSoil::unit("sda", "Ws", Some("B/D"), "Water"));
        let fallback = Arc::new(FakeSoil::failing("wfs"));
        let services = services(land_cover, primary.clone(), fallback.clone());
        let side = (500.0 * curve_number_aoi::SQUARE_METRES_PER_ACRE).sqrt();
        let params = PipelineParams {
            aoi: square_aoi(side),
            ..params(OutputSelection::curve_number_only())
        };

        let outputs = completed(&params, &services).await;

        let cn = outputs.curve_number.expect("curve number layer");
        let names: Vec<&str> = cn.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["MUSYM", "HYDGRPDCD", "MUNAME", "NLCD_LU", "GDCode", "CN"]);
        assert_eq!(cn.crs(), CONUS_ALBERS);
        assert_eq!(cn.len(), 1);

        let row = &cn.features()[0].attributes;
        assert_eq!(row[3], AttributeValue::Integer(43));
        assert_eq!(row[4], AttributeValue::Text("11".to_string()));
        assert_eq!(row[5], AttributeValue::Integer(100));

        assert_eq!(primary.seen_crs.lock().unwrap().as_slice(), [WGS84]);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 0);
        assert_eq!(outputs.soil_provenance, Some(SoilProvenance::Primary));
    }

    #[tokio::test]
    async fn curve_number_only_registers_only_the_curve_number_layer() {
        let land_cover = Arc::new(UniformLandCover::new(9.0));
        let primary = Arc::new(FakeSoil::unit("sda", "CeB", Some("B"), "Cecil sandy loam"));
        let services = services(
            land_cover.clone(),
            primary.clone(),
            Arc::new(FakeSoil::failing("wfs")),
        );

        let outputs = completed(&params(OutputSelection::curve_number_only()), &services).await;

        assert_eq!(land_cover.calls.load(Ordering::SeqCst), 1);
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        let names: Vec<&str> = outputs.layers().iter().map(OutputLayer::name).collect();
        assert_eq!(names, ["Curve Number Layer"]);

        let cn = outputs.curve_number.unwrap();
        assert_eq!(cn.features()[0].attributes[4], AttributeValue::Text("41B".to_string()));
        assert_eq!(cn.features()[0].attributes[5], AttributeValue::Integer(55));
        assert_eq!(outputs.join_report.unwrap().unmatched, 0);
    }

    #[tokio::test]
    async fn raster_only_skips_soil_and_vectorization() {
        let land_cover = Arc::new(UniformLandCover::new(19.0));
        let primary = Arc::new(FakeSoil::unit("sda", "CeB", Some("B"), "Cecil"));
        let services = services(land_cover, primary.clone(), Arc::new(FakeSoil::failing("wfs")));
        let selection = OutputSelection {
            land_cover_raster: true,
            ..OutputSelection::default()
        };

        let outputs = completed(&params(selection), &services).await;

        assert_eq!(primary.calls.load(Ordering::SeqCst), 0);
        assert!(outputs.soil_provenance.is_none());
        let raster = outputs.land_cover_raster.expect("raster");
        assert_eq!(raster.crs, CONUS_ALBERS);
        assert!(raster.data.iter().all(|&v| (v - 82.0).abs() < f64::EPSILON));
        assert!(outputs.land_cover_vector.is_none());
    }

    #[tokio::test]
    async fn failing_primary_falls_back_and_records_the_cause() {
        let primary = Arc::new(FakeSoil::failing("sda"));
        let fallback = Arc::new(FakeSoil::unit("wfs", "CeB", Some("B"), "Cecil"));
        let services = services(
            Arc::new(UniformLandCover::new(9.0)),
            primary,
            fallback.clone(),
        );
        let selection = OutputSelection {
            soil: true,
            ..OutputSelection::default()
        };

        let outputs = completed(&params(selection), &services).await;

        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
        match outputs.soil_provenance {
            Some(SoilProvenance::Fallback { primary_error }) => {
                assert!(primary_error.contains("503"), "{primary_error}");
            }
            other => panic!("expected fallback provenance, got {other:?}"),
        }
        let soil = outputs.soil.expect("soil layer");
        assert_eq!(soil.crs(), CONUS_ALBERS);
        assert_eq!(soil.len(), 1);
        assert!(outputs.curve_number.is_none());
    }

    #[tokio::test]
    async fn latitude_first_fallback_gml_lands_on_the_aoi() {
        let fallback = Arc::new(GmlSoil::new());
        let services = services(
            Arc::new(UniformLandCover::new(9.0)),
            Arc::new(FakeSoil::failing("sda")),
            fallback.clone(),
        );
        let selection = OutputSelection {
            soil: true,
            curve_number: true,
            ..OutputSelection::default()
        };

        let outputs = completed(&params(selection), &services).await;

        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            outputs.soil_provenance,
            Some(SoilProvenance::Fallback { .. })
        ));

        let soil = outputs.soil.expect("soil layer");
        assert_eq!(soil.crs(), CONUS_ALBERS);
        assert_eq!(soil.len(), 1);
        let centre = point! { x: X0 + 150.0, y: Y0 + 150.0 };
        assert!(soil.features()[0].geometry.contains(&centre));
        assert_eq!(
            soil.value(&soil.features()[0], "muname"),
            Some(&AttributeValue::Text("Cecil sandy loam".to_string()))
        );

        let cn = outputs.curve_number.expect("curve number layer");
        assert_eq!(cn.len(), 1);
        assert_eq!(cn.features()[0].attributes[4], AttributeValue::Text("41".to_string()));
    }

    #[tokio::test]
    async fn empty_primary_result_triggers_fallback() {
        let fallback = Arc::new(FakeSoil::unit("wfs", "CeB", Some("B"), "Cecil"));
        let services = services(
            Arc::new(UniformLandCover::new(9.0)),
            Arc::new(EmptySoil),
            fallback.clone(),
        );

        let outputs = completed(&params(OutputSelection::curve_number_only()), &services).await;

        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
        match outputs.soil_provenance {
            Some(SoilProvenance::Fallback { primary_error }) => {
                assert!(primary_error.contains("no map unit"), "{primary_error}");
            }
            other => panic!("expected fallback provenance, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn both_soil_strategies_failing_reports_both_causes() {
        let services = services(
            Arc::new(UniformLandCover::new(9.0)),
            Arc::new(FakeSoil::failing("sda")),
            Arc::new(FakeSoil::failing("wfs")),
        );

        let err = run(
            &params(OutputSelection::curve_number_only()),
            &services,
            null_progress(),
            &CancellationFlag::new(),
        )
        .await
        .unwrap_err();

        let text = err.to_string();
        assert!(matches!(err, PipelineError::SoilAcquisition(_)));
        assert!(text.contains("sda unavailable"), "{text}");
        assert!(text.contains("wfs unavailable"), "{text}");
    }

    #[tokio::test]
    async fn oversized_aoi_is_rejected_before_any_download() {
        let land_cover = Arc::new(UniformLandCover::new(9.0));
        let primary = Arc::new(FakeSoil::unit("sda", "CeB", Some("B"), "Cecil"));
        let services = services(
            land_cover.clone(),
            primary.clone(),
            Arc::new(FakeSoil::failing("wfs")),
        );
        let params = PipelineParams {
            aoi: square_aoi(30_000.0),
            ..params(OutputSelection::curve_number_only())
        };

        let outcome = run(&params, &services, null_progress(), &CancellationFlag::new())
            .await
            .unwrap();

        match outcome {
            RunOutcome::Rejected { message } => {
                assert!(message.contains("222"), "{message}");
                assert!(message.contains("100000 acres"), "{message}");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(land_cover.calls.load(Ordering::SeqCst), 0);
        assert_eq!(primary.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancelled_flag_stops_before_first_stage() {
        let land_cover = Arc::new(UniformLandCover::new(9.0));
        let services = services(
            land_cover.clone(),
            Arc::new(FakeSoil::failing("sda")),
            Arc::new(FakeSoil::failing("wfs")),
        );
        let cancel = CancellationFlag::new();
        cancel.cancel();

        let params = params(OutputSelection::curve_number_only());
        let outcome = run(&params, &services, null_progress(), &cancel)
            .await
            .unwrap();

        assert!(matches!(outcome, RunOutcome::Cancelled));
        assert_eq!(land_cover.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancellation_during_download_stops_at_next_stage() {
        let cancel = CancellationFlag::new();
        let land_cover = Arc::new(UniformLandCover {
            cancel_on_fetch: Some(cancel.clone()),
            ..UniformLandCover::new(9.0)
        });
        let primary = Arc::new(FakeSoil::unit("sda", "CeB", Some("B"), "Cecil"));
        let services = services(land_cover, primary.clone(), Arc::new(FakeSoil::failing("wfs")));

        let params = params(OutputSelection::curve_number_only());
        let outcome = run(&params, &services, null_progress(), &cancel)
            .await
            .unwrap();

        assert!(matches!(outcome, RunOutcome::Cancelled));
        assert_eq!(primary.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn progress_reaches_every_stage() {
        #[derive(Default)]
        struct Recorder {
            total: AtomicUsize,
            last: AtomicUsize,
            messages: Mutex<Vec<String>>,
        }

        impl ProgressCallback for Recorder {
            fn set_total(&self, total: u64) {
                self.total.store(total as usize, Ordering::SeqCst);
            }
            fn set_position(&self, pos: u64) {
                self.last.store(pos as usize, Ordering::SeqCst);
            }
            fn inc(&self, _delta: u64) {}
            fn set_message(&self, msg: String) {
                self.messages.lock().unwrap().push(msg);
            }
            fn finish(&self, _msg: String) {}
            fn finish_and_clear(&self) {}
        }

        let recorder = Arc::new(Recorder::default());
        let services = services(
            Arc::new(UniformLandCover::new(9.0)),
            Arc::new(FakeSoil::unit("sda", "CeB", Some("B"), "Cecil")),
            Arc::new(FakeSoil::failing("wfs")),
        );

        run(
            &params(OutputSelection::curve_number_only()),
            &services,
            recorder.clone(),
            &CancellationFlag::new(),
        )
        .await
        .unwrap();

        assert_eq!(recorder.total.load(Ordering::SeqCst), PipelineStage::COUNT);
        assert_eq!(recorder.last.load(Ordering::SeqCst), PipelineStage::COUNT);
        let messages = recorder.messages.lock().unwrap();
        assert_eq!(messages.len(), PipelineStage::COUNT - 1);
        assert!(!messages.iter().any(|m| m == PipelineStage::AcquireSoilFallback.label()));
    }
}
