//! SDA Web Feature Service fallback.
//!
//! The WFS answers `GetFeature` with GML. Map unit polygons arrive with
//! latitude first, so the parsed layer goes through the geometry engine's
//! axis swap before it is handed back.

use std::sync::Arc;

use async_trait::async_trait;
use curve_number_geometry::GeometryEngine;
use curve_number_models::{
    AreaOfInterest, AttributeValue, Feature, Field, VectorLayer, WGS84,
};
use geo::{Coord, LineString, MultiPolygon, Polygon, coord};
use quick_xml::{Reader, events::Event};
use reqwest::Url;

use crate::{SoilConfig, SoilError, SoilStrategy, truncate};

/// Fallback soil strategy backed by the SDA WFS.
pub struct SoilWebFeatureService {
    client: reqwest::Client,
    config: SoilConfig,
    engine: Arc<dyn GeometryEngine>,
}

impl std::fmt::Debug for SoilWebFeatureService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoilWebFeatureService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SoilWebFeatureService {
    /// Creates the strategy. `engine` performs the lat/lon axis swap.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        config: &SoilConfig,
        engine: Arc<dyn GeometryEngine>,
    ) -> Self {
        Self {
            client,
            config: config.clone(),
            engine,
        }
    }

    /// The `GetFeature` URL for the AOI's geographic extent.
    ///
    /// # Errors
    ///
    /// Returns [`SoilError::Parse`] if the AOI is empty or the configured
    /// endpoint is not a valid URL.
    pub fn request_url(&self, aoi: &AreaOfInterest) -> Result<Url, SoilError> {
        let extent = aoi.extent().ok_or_else(|| SoilError::Parse {
            message: "AOI has no extent".to_string(),
        })?;
        let bbox = format!(
            "{},{},{},{}",
            extent.min().x,
            extent.min().y,
            extent.max().x,
            extent.max().y
        );

        Url::parse_with_params(
            &self.config.wfs_url,
            [
                ("SERVICE", "WFS"),
                ("VERSION", self.config.wfs_version.as_str()),
                ("REQUEST", "GetFeature"),
                ("TYPENAME", self.config.type_name.as_str()),
                ("SRSNAME", "EPSG:4326"),
                ("BBOX", bbox.as_str()),
            ],
        )
        .map_err(|e| SoilError::Parse {
            message: format!("invalid WFS URL {}: {e}", self.config.wfs_url),
        })
    }

    /// Parses a GML feature collection and swaps it to lon/lat order.
    ///
    /// # Errors
    ///
    /// Returns [`SoilError::Parse`] for malformed GML and
    /// [`SoilError::NoFeatures`] if the collection is empty.
    pub fn layer_from_gml(&self, gml: &str) -> Result<VectorLayer, SoilError> {
        let parsed = parse_gml(gml)?;
        if parsed.is_empty() {
            return Err(SoilError::NoFeatures);
        }
        Ok(self.engine.swap_xy(&parsed))
    }
}

#[async_trait]
impl SoilStrategy for SoilWebFeatureService {
    fn name(&self) -> &'static str {
        "SDA WFS"
    }

    async fn acquire(&self, aoi: &AreaOfInterest) -> Result<VectorLayer, SoilError> {
        let url = self.request_url(aoi)?;
        log::info!("Requesting SSURGO map units from WFS {}", self.config.wfs_url);
        log::debug!("GetFeature URL: {url}");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(SoilError::Status {
                status: status.as_u16(),
                body: truncate(&text),
            });
        }

        let layer = self.layer_from_gml(&text)?;
        log::info!("WFS returned {} map unit polygons", layer.len());
        Ok(layer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RingRole {
    Exterior,
    Interior,
}

/// Attribute element directly under the feature element.
struct Candidate {
    name: String,
    text: String,
    simple: bool,
}

#[derive(Default)]
struct FeatureBuilder {
    polygons: Vec<Polygon<f64>>,
    attributes: Vec<(String, String)>,
}

#[derive(Default)]
struct GmlState {
    depth: usize,
    member_depth: Option<usize>,
    feature_depth: Option<usize>,
    feature: Option<FeatureBuilder>,
    candidate: Option<Candidate>,
    exterior: Option<LineString<f64>>,
    interiors: Vec<LineString<f64>>,
    ring_role: Option<RingRole>,
    ring: Vec<Coord<f64>>,
    coord_text: Option<(CoordFormat, String)>,
    dimension: usize,
    features: Vec<FeatureBuilder>,
}

#[derive(Debug, Clone, Copy)]
enum CoordFormat {
    /// GML 3 `posList`/`pos`: whitespace separated ordinates.
    Ordinates,
    /// GML 2 `coordinates`: `x,y x,y`.
    Tuples,
}

fn is_member(name: &[u8]) -> bool {
    matches!(name, b"featureMember" | b"member" | b"featureMembers")
}

/// Parses a GML feature collection into a layer without touching axis
/// order. Simple child elements of each feature become text fields.
///
/// # Errors
///
/// Returns [`SoilError::Parse`] for malformed XML or coordinates.
pub fn parse_gml(gml: &str) -> Result<VectorLayer, SoilError> {
    let mut reader = Reader::from_str(gml);
    reader.config_mut().trim_text(true);
    let mut state = GmlState {
        dimension: 2,
        ..GmlState::default()
    };

    loop {
        let event = reader.read_event().map_err(|e| SoilError::Parse {
            message: format!("GML error at byte {}: {e}", reader.buffer_position()),
        })?;

        match event {
            Event::Start(e) => {
                state.depth += 1;
                let local = e.local_name();
                let name = local.as_ref();
                let dimension = e
                    .try_get_attribute("srsDimension")
                    .ok()
                    .flatten()
                    .and_then(|a| std::str::from_utf8(&a.value).ok()?.trim().parse().ok());
                state.start(name, dimension);
            }
            Event::Empty(e) => {
                if state.feature_depth == Some(state.depth) {
                    // self-closing attribute element
                    if let Some(feature) = state.feature.as_mut() {
                        let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                        feature.attributes.push((name, String::new()));
                    }
                } else if let Some(candidate) = state.candidate.as_mut() {
                    candidate.simple = false;
                }
            }
            Event::Text(t) => {
                let text = t.decode().map_err(|e| SoilError::Parse {
                    message: format!("GML text error: {e}"),
                })?;
                state.text(&text);
            }
            Event::CData(c) => {
                let text = String::from_utf8_lossy(&c).into_owned();
                state.text(&text);
            }
            Event::End(e) => {
                let local = e.local_name();
                state.end(local.as_ref())?;
                state.depth -= 1;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(state.into_layer())
}

impl GmlState {
    fn start(&mut self, name: &[u8], dimension: Option<usize>) {
        if self.feature_depth.is_none() {
            if is_member(name) {
                self.member_depth = Some(self.depth);
            } else if self.member_depth.is_some_and(|d| d < self.depth) {
                self.feature_depth = Some(self.depth);
                self.feature = Some(FeatureBuilder::default());
            }
            return;
        }

        let feature_depth = self.feature_depth.unwrap_or_default();
        if self.depth == feature_depth + 1 {
            self.candidate = Some(Candidate {
                name: String::from_utf8_lossy(name).into_owned(),
                text: String::new(),
                simple: true,
            });
        } else if let Some(candidate) = self.candidate.as_mut() {
            candidate.simple = false;
        }

        match name {
            b"Polygon" => {
                self.exterior = None;
                self.interiors.clear();
            }
            b"exterior" | b"outerBoundaryIs" => self.ring_role = Some(RingRole::Exterior),
            b"interior" | b"innerBoundaryIs" => self.ring_role = Some(RingRole::Interior),
            b"LinearRing" => self.ring.clear(),
            b"posList" | b"pos" => {
                self.dimension = dimension.unwrap_or(2).max(2);
                self.coord_text = Some((CoordFormat::Ordinates, String::new()));
            }
            b"coordinates" => self.coord_text = Some((CoordFormat::Tuples, String::new())),
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        if let Some((_, buffer)) = self.coord_text.as_mut() {
            buffer.push_str(text);
            buffer.push(' ');
        } else if let Some(candidate) = self.candidate.as_mut()
            && candidate.simple
        {
            candidate.text.push_str(text);
        }
    }

    fn end(&mut self, name: &[u8]) -> Result<(), SoilError> {
        if self.feature_depth == Some(self.depth) {
            if let Some(feature) = self.feature.take() {
                self.features.push(feature);
            }
            self.feature_depth = None;
            return Ok(());
        }
        if self.member_depth == Some(self.depth) {
            self.member_depth = None;
            return Ok(());
        }
        let Some(feature_depth) = self.feature_depth else {
            return Ok(());
        };

        match name {
            b"posList" | b"pos" | b"coordinates" => {
                if let Some((format, text)) = self.coord_text.take() {
                    let coords = match format {
                        CoordFormat::Ordinates => parse_ordinates(&text, self.dimension)?,
                        CoordFormat::Tuples => parse_tuples(&text)?,
                    };
                    self.ring.extend(coords);
                }
            }
            b"LinearRing" => {
                let ring = LineString::new(std::mem::take(&mut self.ring));
                match self.ring_role {
                    Some(RingRole::Interior) => self.interiors.push(ring),
                    _ => self.exterior = Some(ring),
                }
            }
            b"exterior" | b"outerBoundaryIs" | b"interior" | b"innerBoundaryIs" => {
                self.ring_role = None;
            }
            b"Polygon" => {
                if let (Some(exterior), Some(feature)) =
                    (self.exterior.take(), self.feature.as_mut())
                {
                    feature
                        .polygons
                        .push(Polygon::new(exterior, std::mem::take(&mut self.interiors)));
                }
            }
            _ => {}
        }

        if self.depth == feature_depth + 1
            && let Some(candidate) = self.candidate.take()
            && candidate.simple
            && let Some(feature) = self.feature.as_mut()
        {
            feature.attributes.push((candidate.name, candidate.text));
        }

        Ok(())
    }

    fn into_layer(self) -> VectorLayer {
        let mut names: Vec<String> = Vec::new();
        for feature in &self.features {
            for (name, _) in &feature.attributes {
                if !names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
                    names.push(name.clone());
                }
            }
        }

        let fields = names.iter().map(|n| Field::text(n)).collect();
        let mut layer = VectorLayer::new(WGS84, fields);

        for feature in self.features {
            if feature.polygons.is_empty() {
                log::warn!("Skipping WFS feature without polygon geometry");
                continue;
            }
            let attributes = names
                .iter()
                .map(|name| {
                    feature
                        .attributes
                        .iter()
                        .find(|(n, _)| n.eq_ignore_ascii_case(name))
                        .map_or(AttributeValue::Null, |(_, v)| {
                            AttributeValue::text_or_null(v.trim())
                        })
                })
                .collect();
            layer.push(Feature {
                geometry: MultiPolygon::new(feature.polygons),
                attributes,
            });
        }

        layer
    }
}

fn parse_number(token: &str) -> Result<f64, SoilError> {
    token.parse().map_err(|_| SoilError::Parse {
        message: format!("invalid GML coordinate {token:?}"),
    })
}

fn parse_ordinates(text: &str, dimension: usize) -> Result<Vec<Coord<f64>>, SoilError> {
    let values = text
        .split_whitespace()
        .map(parse_number)
        .collect::<Result<Vec<_>, _>>()?;

    if values.len() % dimension != 0 {
        return Err(SoilError::Parse {
            message: format!(
                "{} ordinates do not form {dimension}-dimensional positions",
                values.len()
            ),
        });
    }

    Ok(values
        .chunks(dimension)
        .map(|c| coord! { x: c[0], y: c[1] })
        .collect())
}

fn parse_tuples(text: &str) -> Result<Vec<Coord<f64>>, SoilError> {
    text.split_whitespace()
        .map(|tuple| {
            let mut parts = tuple.split(',');
            match (parts.next(), parts.next()) {
                (Some(x), Some(y)) => Ok(coord! { x: parse_number(x)?, y: parse_number(y)? }),
                _ => Err(SoilError::Parse {
                    message: format!("invalid GML coordinate tuple {tuple:?}"),
                }),
            }
        })
        .collect()
}
