//! Writes registered layers and the run manifest to the output directory.
//!
//! Vector layers become GeoJSON feature collections carrying a named `crs`
//! member, the land cover raster becomes a single-band GeoTIFF, and
//! `manifest.json` lists every file with its layer name and style.

use std::{
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
};

use curve_number_models::{AttributeValue, Crs, CrsAuthority, Raster, VectorLayer};
use curve_number_pipeline::{LayerData, OutputKind, RegisteredOutputs};
use curve_number_soil::SoilProvenance;
use geojson::{Feature, FeatureCollection, JsonObject, JsonValue};
use serde::{Deserialize, Serialize};
use tiff::{
    encoder::{TiffEncoder, colortype},
    tags::Tag,
};

const MANIFEST_VERSION: u32 = 1;
const MANIFEST_FILE: &str = "manifest.json";

const MODEL_PIXEL_SCALE: Tag = Tag::ModelPixelScaleTag;
const MODEL_TIEPOINT: Tag = Tag::ModelTiepointTag;
const GEO_KEY_DIRECTORY: Tag = Tag::GeoKeyDirectoryTag;
const GDAL_NODATA: Tag = Tag::GdalNodata;

/// Errors raised while writing outputs.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// GeoTIFF encoding failed.
    #[error("TIFF encode error: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// The raster dimensions do not fit a TIFF.
    #[error("Raster of {width}x{height} cells cannot be written")]
    RasterSize {
        /// Columns.
        width: usize,
        /// Rows.
        height: usize,
    },
}

/// Run record stored at `<output-dir>/manifest.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Manifest schema version.
    pub version: u32,
    /// ISO 8601 time the outputs were written.
    pub generated_at: String,
    /// Written layers in registration order.
    pub layers: Vec<ManifestLayer>,
    /// Which soil strategy produced the soil layer, when the soil branch ran.
    pub soil_provenance: Option<SoilProvenance>,
    /// GDCodes with no curve number, when the CN layer was produced.
    pub unmatched_gdcodes: Option<Vec<String>>,
}

/// One written layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestLayer {
    /// Fixed display name.
    pub name: String,
    /// Output kind.
    pub kind: OutputKind,
    /// File name relative to the output directory.
    pub file: String,
    /// Style definition to apply.
    pub style: String,
    /// CRS of the layer.
    pub crs: Crs,
    /// Polygon count for vector layers.
    pub features: Option<usize>,
}

/// Writes every registered layer plus `manifest.json` into `dir`.
///
/// # Errors
///
/// Returns [`StoreError`] if any file cannot be written.
pub fn write_outputs(dir: &Path, outputs: &RegisteredOutputs) -> Result<Manifest, StoreError> {
    std::fs::create_dir_all(dir)?;

    let mut layers = Vec::new();
    for layer in outputs.layers() {
        let (file, crs, features) = match layer.data {
            LayerData::Raster(raster) => {
                let file = format!("{}.tif", layer.kind.as_ref());
                write_geotiff(&dir.join(&file), raster)?;
                (file, raster.crs, None)
            }
            LayerData::Vector(vector) => {
                let file = format!("{}.geojson", layer.kind.as_ref());
                write_geojson(&dir.join(&file), vector)?;
                (file, vector.crs(), Some(vector.len()))
            }
        };
        log::info!("Wrote {} to {}", layer.name(), dir.join(&file).display());

        layers.push(ManifestLayer {
            name: layer.name().to_string(),
            kind: layer.kind,
            file,
            style: layer.style().to_string(),
            crs,
            features,
        });
    }

    let manifest = Manifest {
        version: MANIFEST_VERSION,
        generated_at: chrono::Utc::now().to_rfc3339(),
        layers,
        soil_provenance: outputs.soil_provenance.clone(),
        unmatched_gdcodes: outputs
            .join_report
            .as_ref()
            .map(|r| r.unmatched_codes.iter().cloned().collect()),
    };
    save_manifest(dir, &manifest)?;
    Ok(manifest)
}

/// Writes the manifest with a write-then-rename so an interrupted run
/// never leaves a truncated file.
fn save_manifest(dir: &Path, manifest: &Manifest) -> Result<(), StoreError> {
    let path = dir.join(MANIFEST_FILE);
    let tmp_path = dir.join(format!("{MANIFEST_FILE}.tmp"));
    let contents = serde_json::to_string_pretty(manifest)?;
    std::fs::write(&tmp_path, contents)?;
    std::fs::rename(&tmp_path, &path)?;
    log::info!("Saved manifest to {}", path.display());
    Ok(())
}

/// Path of the manifest inside `dir`.
#[must_use]
pub fn manifest_path(dir: &Path) -> PathBuf {
    dir.join(MANIFEST_FILE)
}

fn write_geojson(path: &Path, layer: &VectorLayer) -> Result<(), StoreError> {
    let features = layer
        .features()
        .iter()
        .map(|feature| {
            let properties: JsonObject = layer
                .fields()
                .iter()
                .zip(&feature.attributes)
                .map(|(field, value)| (field.name.clone(), json_value(value)))
                .collect();
            Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(geojson::Value::from(
                    &feature.geometry,
                ))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    let mut crs = JsonObject::new();
    crs.insert("type".to_string(), JsonValue::from("name"));
    crs.insert(
        "properties".to_string(),
        serde_json::json!({ "name": crs_urn(layer.crs()) }),
    );
    let mut foreign_members = JsonObject::new();
    foreign_members.insert("crs".to_string(), JsonValue::Object(crs));

    let collection = FeatureCollection {
        bbox: None,
        features,
        foreign_members: Some(foreign_members),
    };

    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(writer, &collection)?;
    Ok(())
}

fn json_value(value: &AttributeValue) -> JsonValue {
    match value {
        AttributeValue::Null => JsonValue::Null,
        AttributeValue::Text(text) => JsonValue::from(text.as_str()),
        AttributeValue::Integer(i) => JsonValue::from(*i),
        AttributeValue::Real(r) => JsonValue::from(*r),
    }
}

fn crs_urn(crs: Crs) -> String {
    format!("urn:ogc:def:crs:{}::{}", crs.authority, crs.code)
}

/// GeoKey directory for a CRS: model type, raster type, and the EPSG code.
fn geo_keys(crs: Crs) -> Vec<u16> {
    let (model_type, code_key) = if crs.is_geographic() {
        (2, 2048)
    } else {
        (1, 3072)
    };
    let mut keys = vec![1, 1, 0, 2, 1024, 0, 1, model_type, 1025, 0, 1, 1];

    match (crs.authority, u16::try_from(crs.code)) {
        (CrsAuthority::Epsg, Ok(code)) => {
            keys[3] = 3;
            keys.extend([code_key, 0, 1, code]);
        }
        _ => log::warn!("{crs} has no GeoTIFF code; the raster will carry no CRS key"),
    }
    keys
}

#[allow(clippy::cast_possible_truncation)]
fn write_geotiff(path: &Path, raster: &Raster) -> Result<(), StoreError> {
    let size_error = || StoreError::RasterSize {
        width: raster.width,
        height: raster.height,
    };
    let width = u32::try_from(raster.width).map_err(|_| size_error())?;
    let height = u32::try_from(raster.height).map_err(|_| size_error())?;

    let data: Vec<f32> = raster.data.iter().map(|&v| v as f32).collect();
    let pixel_scale = [raster.cell_width, raster.cell_height, 0.0];
    let tie_point = [0.0, 0.0, 0.0, raster.origin_x, raster.origin_y, 0.0];
    let keys = geo_keys(raster.crs);

    let mut encoder = TiffEncoder::new(BufWriter::new(File::create(path)?))?;
    let mut image = encoder.new_image::<colortype::Gray32Float>(width, height)?;
    image
        .encoder()
        .write_tag(MODEL_PIXEL_SCALE, &pixel_scale[..])?;
    image
        .encoder()
        .write_tag(MODEL_TIEPOINT, &tie_point[..])?;
    image
        .encoder()
        .write_tag(GEO_KEY_DIRECTORY, &keys[..])?;
    if let Some(no_data) = raster.no_data {
        image
            .encoder()
            .write_tag(GDAL_NODATA, no_data.to_string().as_str())?;
    }
    image.write_data(&data)?;
    Ok(())
}
