//! Soil Data Access tabular service.
//!
//! The SDA `post.rest` endpoint runs an SQL query server-side and returns
//! rows as JSON arrays under `Table`. The query joins `mupolygon` with the
//! `muaggatt` map unit aggregate attributes, restricted to polygons that
//! intersect the AOI extent, and appends the polygon geometry as WKT.

use async_trait::async_trait;
use curve_number_models::{AreaOfInterest, AttributeValue, Feature, Field, VectorLayer, WGS84};
use geo::{Geometry, MultiPolygon};
use serde::Deserialize;
use wkt::{ToWkt as _, TryFromWkt as _};

use crate::{SoilConfig, SoilError, SoilStrategy, truncate};

/// Columns returned by the SDA query, in order. The geometry WKT follows
/// the last one.
pub const SDA_FIELDS: [&str; 43] = [
    "musym",
    "muname",
    "mustatus",
    "slopegraddcp",
    "slopegradwta",
    "brockdepmin",
    "wtdepannmin",
    "wtdepaprjunmin",
    "flodfreqdcd",
    "flodfreqmax",
    "pondfreqprs",
    "aws025wta",
    "aws050wta",
    "aws0100wta",
    "aws0150wta",
    "drclassdcd",
    "drclasswettest",
    "hydgrpdcd",
    "iccdcd",
    "iccdcdpct",
    "niccdcd",
    "niccdcdpct",
    "engdwobdcd",
    "engdwbdcd",
    "engdwbll",
    "engdwbml",
    "engstafdcd",
    "engstafll",
    "engstafml",
    "engsldcd",
    "engsldcp",
    "englrsdcd",
    "engcmssdcd",
    "engcmssmp",
    "urbrecptdcd",
    "urbrecptwta",
    "forpehrtdcp",
    "hydclprs",
    "awmmfpwwta",
    "mukey",
    "mupolygonkey",
    "areasymbol",
    "nationalmusym",
];

#[derive(Debug, Deserialize)]
struct SdaResponse {
    #[serde(rename = "Table", default)]
    table: Vec<Vec<serde_json::Value>>,
}

/// Primary soil strategy backed by the SDA tabular endpoint.
#[derive(Debug, Clone)]
pub struct SoilDataAccess {
    client: reqwest::Client,
    url: String,
}

impl SoilDataAccess {
    /// Creates the strategy.
    #[must_use]
    pub fn new(client: reqwest::Client, config: &SoilConfig) -> Self {
        Self {
            client,
            url: config.sda_url.clone(),
        }
    }
}

#[async_trait]
impl SoilStrategy for SoilDataAccess {
    fn name(&self) -> &'static str {
        "Soil Data Access"
    }

    async fn acquire(&self, aoi: &AreaOfInterest) -> Result<VectorLayer, SoilError> {
        let body = serde_json::json!({
            "format": "JSON",
            "query": build_query(aoi)?,
        });

        log::info!("Querying SSURGO map units from {}", self.url);
        let response = self.client.post(&self.url).json(&body).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(SoilError::Status {
                status: status.as_u16(),
                body: truncate(&text),
            });
        }

        let layer = parse_response(&text)?;
        log::info!("Soil Data Access returned {} map unit polygons", layer.len());
        Ok(layer)
    }
}

/// Lower-cased WKT of the AOI's bounding rectangle.
///
/// # Errors
///
/// Returns [`SoilError::Parse`] if the AOI is empty.
pub fn extent_wkt(aoi: &AreaOfInterest) -> Result<String, SoilError> {
    let extent = aoi.extent().ok_or_else(|| SoilError::Parse {
        message: "AOI has no extent".to_string(),
    })?;
    Ok(extent.to_polygon().wkt_string().to_lowercase())
}

/// The SQL sent to SDA for an AOI in EPSG:4326.
///
/// # Errors
///
/// Returns [`SoilError::Parse`] if the AOI is empty.
pub fn build_query(aoi: &AreaOfInterest) -> Result<String, SoilError> {
    Ok(format!(
        "select Ma.*, M.mupolygonkey, M.areasymbol, M.nationalmusym, M.mupolygongeo \
         from mupolygon M, muaggatt Ma \
         where M.mupolygonkey in \
         (select * from SDA_Get_Mupolygonkey_from_intersection_with_WktWgs84('{}')) \
         and M.mukey=Ma.mukey",
        extent_wkt(aoi)?
    ))
}

/// Converts an SDA JSON response into a text-attribute layer in EPSG:4326.
///
/// # Errors
///
/// * [`SoilError::Json`] for malformed JSON
/// * [`SoilError::Parse`] for rows without a geometry column
/// * [`SoilError::Wkt`] for unreadable geometries
/// * [`SoilError::NoFeatures`] if no rows came back
pub fn parse_response(text: &str) -> Result<VectorLayer, SoilError> {
    let response: SdaResponse = serde_json::from_str(text)?;
    let fields = SDA_FIELDS.iter().map(|name| Field::text(name)).collect();
    let mut layer = VectorLayer::new(WGS84, fields);

    for (row_idx, row) in response.table.iter().enumerate() {
        let wkt = row
            .get(SDA_FIELDS.len())
            .and_then(serde_json::Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SoilError::Parse {
                message: format!("row {row_idx} has no geometry column"),
            })?;

        let attributes = (0..SDA_FIELDS.len())
            .map(|i| row.get(i).map_or(AttributeValue::Null, to_attribute))
            .collect();

        layer.push(Feature {
            geometry: parse_wkt(wkt)?,
            attributes,
        });
    }

    if layer.is_empty() {
        return Err(SoilError::NoFeatures);
    }
    Ok(layer)
}

fn to_attribute(value: &serde_json::Value) -> AttributeValue {
    match value {
        serde_json::Value::Null => AttributeValue::Null,
        serde_json::Value::String(s) => AttributeValue::text_or_null(s),
        other => AttributeValue::Text(other.to_string()),
    }
}

fn parse_wkt(text: &str) -> Result<MultiPolygon<f64>, SoilError> {
    let geometry = Geometry::<f64>::try_from_wkt_str(text).map_err(|e| SoilError::Wkt {
        message: e.to_string(),
    })?;

    match geometry {
        Geometry::Polygon(p) => Ok(MultiPolygon::new(vec![p])),
        Geometry::MultiPolygon(mp) => Ok(mp),
        Geometry::GeometryCollection(gc) => Ok(MultiPolygon::new(
            gc.0.into_iter()
                .flat_map(|g| match g {
                    Geometry::Polygon(p) => vec![p],
                    Geometry::MultiPolygon(mp) => mp.0,
                    _ => Vec::new(),
                })
                .collect(),
        )),
        _ => Err(SoilError::Wkt {
            message: format!(
                "expected a polygon, got {}",
                text.split('(').next().unwrap_or_default().trim()
            ),
        }),
    }
}
