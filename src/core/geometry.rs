//! Jurisdiction boundaries and their bounding-box index.
//!
//! The store is built once from a GeoJSON `FeatureCollection` and exposes only
//! shared (`&self`) accessors afterwards, so it can be wrapped in an `Arc` and
//! read from any number of imports without locking.
//!
//! # Containment convention
//!
//! Containment is *closed*: a point lying exactly on a ring edge or vertex is
//! contained. This holds for hole rings too, so a point on a hole's edge still
//! belongs to the surrounding polygon.

use crate::utils::error::{EtlError, Result};
use geo::{BoundingRect, Intersects};
use geo_types::{Geometry, MultiPolygon, Point, Polygon, Rect};
use geojson::{Feature, JsonObject, JsonValue};
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::RTree;
use serde::Deserialize;
use std::path::Path;

/// Feature property holding the jurisdiction name.
pub const NAME_PROPERTY_KEY: &str = "NAME";

/// Shape of a boundary feature.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureGeometry {
    Polygon(Polygon<f64>),
    MultiPolygon(MultiPolygon<f64>),
    /// Any other shape. Indexed by its bbox but never contains a point.
    Unsupported(Geometry<f64>),
}

impl FeatureGeometry {
    pub fn contains(&self, point: &Point<f64>) -> bool {
        match self {
            FeatureGeometry::Polygon(polygon) => polygon.intersects(point),
            FeatureGeometry::MultiPolygon(multi) => multi.intersects(point),
            FeatureGeometry::Unsupported(_) => false,
        }
    }

    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        match self {
            FeatureGeometry::Polygon(polygon) => polygon.bounding_rect(),
            FeatureGeometry::MultiPolygon(multi) => multi.bounding_rect(),
            FeatureGeometry::Unsupported(other) => other.bounding_rect(),
        }
    }
}

impl From<Geometry<f64>> for FeatureGeometry {
    fn from(geometry: Geometry<f64>) -> Self {
        match geometry {
            Geometry::Polygon(polygon) => FeatureGeometry::Polygon(polygon),
            Geometry::MultiPolygon(multi) => FeatureGeometry::MultiPolygon(multi),
            other => FeatureGeometry::Unsupported(other),
        }
    }
}

/// One boundary feature. Never mutated after load.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryFeature {
    name: Option<String>,
    geometry: Option<FeatureGeometry>,
    bbox: Option<Rect<f64>>,
}

impl GeometryFeature {
    pub fn new(name: Option<String>, geometry: Option<Geometry<f64>>) -> Self {
        let geometry = geometry.map(FeatureGeometry::from);
        let bbox = geometry.as_ref().and_then(FeatureGeometry::bounding_rect);
        Self {
            name,
            geometry,
            bbox,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn geometry(&self) -> Option<&FeatureGeometry> {
        self.geometry.as_ref()
    }

    pub fn bbox(&self) -> Option<Rect<f64>> {
        self.bbox
    }

    pub fn contains(&self, point: &Point<f64>) -> bool {
        self.geometry
            .as_ref()
            .map(|geometry| geometry.contains(point))
            .unwrap_or(false)
    }
}

type IndexEntry = GeomWithData<Rectangle<[f64; 2]>, usize>;

/// Immutable feature list plus an R-tree over feature bounding boxes.
///
/// Each index entry carries the feature's position in the load order; that
/// position is the tie-break key used by the resolver.
pub struct GeometryStore {
    features: Vec<GeometryFeature>,
    index: RTree<IndexEntry>,
}

impl GeometryStore {
    pub fn new(features: Vec<GeometryFeature>) -> Self {
        let entries: Vec<IndexEntry> = features
            .iter()
            .enumerate()
            .filter_map(|(idx, feature)| {
                let rect = feature.bbox()?;
                let min = rect.min();
                let max = rect.max();
                Some(GeomWithData::new(
                    Rectangle::from_corners([min.x, min.y], [max.x, max.y]),
                    idx,
                ))
            })
            .collect();

        Self {
            index: RTree::bulk_load(entries),
            features,
        }
    }

    /// Parses a GeoJSON `FeatureCollection`.
    ///
    /// A feature whose geometry is missing or malformed is kept (so indices
    /// stay aligned with the file) but is left out of the index. A document
    /// that is not a feature collection at all is an error.
    pub fn from_geojson_str(content: &str) -> Result<Self> {
        let document: FeatureCollectionDocument =
            serde_json::from_str(content).map_err(|e| EtlError::GeometryError {
                message: format!("invalid feature collection: {}", e),
            })?;

        let features = document
            .features
            .into_iter()
            .enumerate()
            .map(|(idx, object)| decode_feature(idx, object))
            .collect();

        Ok(Self::new(features))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        let store = Self::from_geojson_str(&content)?;
        tracing::info!(
            path = %path.as_ref().display(),
            features = store.len(),
            indexed = store.indexed_len(),
            "Loaded boundary dataset"
        );
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Number of features that made it into the spatial index.
    pub fn indexed_len(&self) -> usize {
        self.index.size()
    }

    pub fn feature(&self, idx: usize) -> Option<&GeometryFeature> {
        self.features.get(idx)
    }

    pub fn features(&self) -> impl Iterator<Item = &GeometryFeature> {
        self.features.iter()
    }

    /// Indices of features whose bounding box contains the point (edges
    /// included). Loose first filter; no ordering guarantee.
    pub fn candidates(&self, longitude: f64, latitude: f64) -> impl Iterator<Item = usize> + '_ {
        self.index
            .locate_all_at_point(&[longitude, latitude])
            .map(|entry| entry.data)
    }
}

/// Only the envelope is decoded strictly; each feature is decoded on its own
/// so one bad geometry does not reject the whole file.
#[derive(Deserialize)]
struct FeatureCollectionDocument {
    features: Vec<JsonObject>,
}

fn decode_feature(idx: usize, object: JsonObject) -> GeometryFeature {
    let raw_name = object
        .get("properties")
        .and_then(|props| props.get(NAME_PROPERTY_KEY))
        .and_then(JsonValue::as_str)
        .map(str::to_string);

    let feature = match Feature::from_json_object(object) {
        Ok(feature) => feature,
        Err(e) => {
            tracing::warn!(
                feature = idx,
                name = raw_name.as_deref().unwrap_or_default(),
                reason = %e,
                "Skipping malformed feature geometry"
            );
            return GeometryFeature::new(raw_name, None);
        }
    };

    let name = feature
        .property(NAME_PROPERTY_KEY)
        .and_then(JsonValue::as_str)
        .map(str::to_string);

    let geometry = feature.geometry.and_then(|geometry| {
        Geometry::<f64>::try_from(geometry.value)
            .map_err(|e| {
                tracing::warn!(
                    feature = idx,
                    name = name.as_deref().unwrap_or_default(),
                    reason = %e,
                    "Skipping unconvertible feature geometry"
                );
            })
            .ok()
    });

    GeometryFeature::new(name, geometry)
}
