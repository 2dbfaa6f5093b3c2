#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! GeoJSON materialization of the collaborator inputs.
//!
//! Reads entity and road-network documents that are already expressed in
//! a single locally projected, meter-based CRS. No reprojection happens
//! here; the upstream data source is responsible for it. Unusable
//! features are skipped with a warning and counted rather than failing
//! the batch.

use std::path::Path;

use geojson::GeoJson;
use poi_audit_poi_models::{Entity, EntityGeometry, RoadEdge};
use thiserror::Error;

/// Errors raised while materializing GeoJSON inputs.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Reading the input file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The document is not valid GeoJSON.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// The document parsed, but is not a `FeatureCollection`.
    #[error("expected a GeoJSON FeatureCollection document")]
    NotAFeatureCollection,
}

/// Entities materialized from one document, plus the count of features
/// that could not be used.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityBatch {
    /// Usable entities in document order.
    pub entities: Vec<Entity>,
    /// Features skipped for missing or unsupported geometry.
    pub skipped: usize,
}

/// Road edges materialized from one document, plus the count of features
/// that could not be used.
#[derive(Debug, Clone, PartialEq)]
pub struct RoadBatch {
    /// Usable edges; `MultiLineString` features are flattened.
    pub edges: Vec<RoadEdge>,
    /// Features skipped for missing or unsupported geometry.
    pub skipped: usize,
}

/// Parses entity records from a GeoJSON `FeatureCollection` string.
///
/// A feature's `name` property (string) makes it an amenity; a non-null
/// `building` property marks a footprint. Point and Polygon geometries
/// are accepted, along with single-member `MultiPolygon`s.
///
/// # Errors
///
/// Returns [`IngestError`] when the document cannot be parsed or is not a
/// `FeatureCollection`.
pub fn entities_from_geojson(document: &str) -> Result<EntityBatch, IngestError> {
    let GeoJson::FeatureCollection(collection) = document.parse::<GeoJson>()? else {
        return Err(IngestError::NotAFeatureCollection);
    };

    let mut entities = Vec::with_capacity(collection.features.len());
    let mut skipped = 0;

    for feature in collection.features {
        let name = feature
            .properties
            .as_ref()
            .and_then(|properties| properties.get("name"))
            .and_then(serde_json::Value::as_str)
            .map(String::from);
        let building = feature
            .properties
            .as_ref()
            .and_then(|properties| properties.get("building"))
            .is_some_and(|value| !value.is_null());

        let Some(geometry) = feature.geometry else {
            log::warn!("Skipping entity feature without geometry");
            skipped += 1;
            continue;
        };

        let Some(geometry) = entity_geometry(geometry) else {
            skipped += 1;
            continue;
        };

        entities.push(Entity {
            name,
            building,
            geometry,
        });
    }

    log::info!(
        "Materialized {} entities ({skipped} features skipped)",
        entities.len()
    );

    Ok(EntityBatch { entities, skipped })
}

/// Reads and parses entity records from a GeoJSON file.
///
/// # Errors
///
/// Returns [`IngestError`] on IO failure or as for
/// [`entities_from_geojson`].
pub fn entities_from_path(path: &Path) -> Result<EntityBatch, IngestError> {
    let document = std::fs::read_to_string(path)?;
    entities_from_geojson(&document)
}

/// Parses road edges from a GeoJSON `FeatureCollection` string.
///
/// `LineString` features become single edges; `MultiLineString` features
/// are flattened into one edge per member line.
///
/// # Errors
///
/// Returns [`IngestError`] when the document cannot be parsed or is not a
/// `FeatureCollection`.
pub fn roads_from_geojson(document: &str) -> Result<RoadBatch, IngestError> {
    let GeoJson::FeatureCollection(collection) = document.parse::<GeoJson>()? else {
        return Err(IngestError::NotAFeatureCollection);
    };

    let mut edges = Vec::with_capacity(collection.features.len());
    let mut skipped = 0;

    for feature in collection.features {
        let Some(geometry) = feature.geometry else {
            log::warn!("Skipping road feature without geometry");
            skipped += 1;
            continue;
        };

        match geo::Geometry::<f64>::try_from(geometry) {
            Ok(geo::Geometry::LineString(line)) => edges.push(RoadEdge { line }),
            Ok(geo::Geometry::MultiLineString(lines)) => {
                edges.extend(lines.0.into_iter().map(|line| RoadEdge { line }));
            }
            Ok(other) => {
                log::warn!(
                    "Skipping road feature with unsupported geometry type {}",
                    geometry_kind(&other)
                );
                skipped += 1;
            }
            Err(err) => {
                log::warn!("Skipping unconvertible road geometry: {err}");
                skipped += 1;
            }
        }
    }

    log::info!(
        "Materialized {} road edges ({skipped} features skipped)",
        edges.len()
    );

    Ok(RoadBatch { edges, skipped })
}

/// Reads and parses road edges from a GeoJSON file.
///
/// # Errors
///
/// Returns [`IngestError`] on IO failure or as for
/// [`roads_from_geojson`].
pub fn roads_from_path(path: &Path) -> Result<RoadBatch, IngestError> {
    let document = std::fs::read_to_string(path)?;
    roads_from_geojson(&document)
}

/// Converts a GeoJSON geometry into an entity geometry.
///
/// Accepts Point and Polygon, plus single-member `MultiPolygon`s (a
/// common footprint encoding). Everything else is unsupported for
/// entities.
fn entity_geometry(geometry: geojson::Geometry) -> Option<EntityGeometry> {
    match geo::Geometry::<f64>::try_from(geometry) {
        Ok(geo::Geometry::Point(point)) => Some(EntityGeometry::Point(point)),
        Ok(geo::Geometry::Polygon(polygon)) => Some(EntityGeometry::Polygon(polygon)),
        Ok(geo::Geometry::MultiPolygon(multi)) if multi.0.len() == 1 => {
            let polygon = multi.0.into_iter().next()?;
            Some(EntityGeometry::Polygon(polygon))
        }
        Ok(other) => {
            log::warn!(
                "Skipping entity feature with unsupported geometry type {}",
                geometry_kind(&other)
            );
            None
        }
        Err(err) => {
            log::warn!("Skipping unconvertible entity geometry: {err}");
            None
        }
    }
}

fn geometry_kind(geometry: &geo::Geometry<f64>) -> &'static str {
    match geometry {
        geo::Geometry::Point(_) => "Point",
        geo::Geometry::Line(_) => "Line",
        geo::Geometry::LineString(_) => "LineString",
        geo::Geometry::Polygon(_) => "Polygon",
        geo::Geometry::MultiPoint(_) => "MultiPoint",
        geo::Geometry::MultiLineString(_) => "MultiLineString",
        geo::Geometry::MultiPolygon(_) => "MultiPolygon",
        geo::Geometry::GeometryCollection(_) => "GeometryCollection",
        geo::Geometry::Rect(_) => "Rect",
        geo::Geometry::Triangle(_) => "Triangle",
    }
}
