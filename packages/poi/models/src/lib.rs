#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared POI domain types used across the poi-audit workspace.
//!
//! This crate defines the entity model (named points of interest and
//! building footprints in a locally projected, meter-based CRS), the
//! per-entity feature vector, the anomaly verdict, and the fixed CSV
//! column contracts consumed by the export crate and downstream tools.

use geo::Centroid;
use serde::{Deserialize, Serialize};

/// Fixed column ordering for the feature matrix CSV export.
///
/// Downstream consumers rely on positional access; this ordering is a
/// contract and must not change between releases.
pub const FEATURE_COLUMNS: [&str; 5] = [
    "name",
    "neighbor_count_500m",
    "nearest_road_distance",
    "nearest_neighbor_distance",
    "building_intersections",
];

/// Fixed column ordering for the anomaly report CSV export.
pub const ANOMALY_COLUMNS: [&str; 3] = ["name", "anomaly_score", "is_anomaly"];

/// Number of numeric feature dimensions per entity.
pub const FEATURE_DIMENSIONS: usize = 4;

/// Synthetic stable identity for an entity: its insertion sequence index.
///
/// Display names are not unique in source data, so every join inside the
/// engine is keyed by this id. Names are display attributes only.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct EntityId(pub usize);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Projected geometry of a single entity.
///
/// All geometries in one analysis run share the same projected CRS, so
/// Euclidean distance math is valid throughout.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityGeometry {
    /// A single projected point.
    Point(geo::Point<f64>),
    /// A footprint polygon in projected coordinates.
    Polygon(geo::Polygon<f64>),
}

impl EntityGeometry {
    /// Reduces the geometry to the point used for distance and containment
    /// math: a polygon's centroid, or the point itself.
    ///
    /// Returns `None` when the centroid cannot be computed (e.g. an empty
    /// polygon ring), which marks the entity's geometry as malformed.
    #[must_use]
    pub fn representative_point(&self) -> Option<geo::Point<f64>> {
        match self {
            Self::Point(point) => Some(*point),
            Self::Polygon(polygon) => polygon.centroid(),
        }
    }
}

/// A point-of-interest or building record.
///
/// An entity with a name participates in feature extraction and anomaly
/// detection as an amenity. An entity with a building footprint acts as a
/// containment obstacle. The two roles overlap: a named building is both.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    /// Display name. Entities without a name are excluded from amenity
    /// analysis but still act as obstacles for others.
    pub name: Option<String>,
    /// Whether this entity carries a building footprint.
    pub building: bool,
    /// Projected geometry.
    pub geometry: EntityGeometry,
}

impl Entity {
    /// Whether this entity participates in feature extraction.
    #[must_use]
    pub const fn is_amenity(&self) -> bool {
        self.name.is_some()
    }

    /// The footprint polygon, if this entity is a building with one.
    #[must_use]
    pub const fn footprint(&self) -> Option<&geo::Polygon<f64>> {
        if !self.building {
            return None;
        }
        match &self.geometry {
            EntityGeometry::Polygon(polygon) => Some(polygon),
            EntityGeometry::Point(_) => None,
        }
    }
}

/// A drivable road edge: a polyline in the projected CRS.
///
/// Immutable once loaded; the geometry store indexes its constituent
/// segments.
#[derive(Debug, Clone, PartialEq)]
pub struct RoadEdge {
    /// Edge geometry in projected coordinates.
    pub line: geo::LineString<f64>,
}

/// Per-amenity spatial feature vector.
///
/// Degenerate no-candidate values (no roads, single amenity) are recorded
/// as 0 so the anomaly engine always receives a fully populated row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureVector {
    /// Count of other amenities strictly within the neighbor radius.
    pub neighbor_count: u32,
    /// Meters to the closest road edge, or 0 when no roads exist.
    pub nearest_road_distance: f64,
    /// Meters to the closest other amenity, or 0 when there is none.
    pub nearest_neighbor_distance: f64,
    /// Count of building footprints containing this entity's
    /// representative point.
    pub building_intersections: u32,
}

impl FeatureVector {
    /// Numeric row in the model column order (the tail of
    /// [`FEATURE_COLUMNS`], without the leading name column).
    #[must_use]
    pub fn to_model_row(&self) -> [f64; FEATURE_DIMENSIONS] {
        [
            f64::from(self.neighbor_count),
            self.nearest_road_distance,
            self.nearest_neighbor_distance,
            f64::from(self.building_intersections),
        ]
    }
}

/// Anomaly score and classification for a single amenity.
///
/// Recomputed fresh per analysis run; scores depend on the surrounding
/// population, so the same entity can legitimately score differently
/// between runs over different entity sets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyVerdict {
    /// Decision score; lower = more anomalous.
    pub score: f64,
    /// Whether this entity falls under the rank-based threshold.
    pub is_anomaly: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{LineString, Point, Polygon};

    fn unit_square() -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![
                (0.0, 0.0),
                (2.0, 0.0),
                (2.0, 2.0),
                (0.0, 2.0),
                (0.0, 0.0),
            ]),
            vec![],
        )
    }

    #[test]
    fn point_is_its_own_representative() {
        let geometry = EntityGeometry::Point(Point::new(3.0, 4.0));
        assert_eq!(
            geometry.representative_point(),
            Some(Point::new(3.0, 4.0))
        );
    }

    #[test]
    fn polygon_representative_is_centroid() {
        let geometry = EntityGeometry::Polygon(unit_square());
        let point = geometry.representative_point().unwrap();
        assert!((point.x() - 1.0).abs() < 1e-9);
        assert!((point.y() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_polygon_has_no_representative() {
        let geometry = EntityGeometry::Polygon(Polygon::new(LineString::new(vec![]), vec![]));
        assert_eq!(geometry.representative_point(), None);
    }

    #[test]
    fn named_entity_is_amenity() {
        let entity = Entity {
            name: Some("Corner Bakery".into()),
            building: false,
            geometry: EntityGeometry::Point(Point::new(0.0, 0.0)),
        };
        assert!(entity.is_amenity());
    }

    #[test]
    fn unnamed_building_is_not_amenity_but_has_footprint() {
        let entity = Entity {
            name: None,
            building: true,
            geometry: EntityGeometry::Polygon(unit_square()),
        };
        assert!(!entity.is_amenity());
        assert!(entity.footprint().is_some());
    }

    #[test]
    fn point_building_has_no_footprint() {
        let entity = Entity {
            name: None,
            building: true,
            geometry: EntityGeometry::Point(Point::new(0.0, 0.0)),
        };
        assert!(entity.footprint().is_none());
    }

    #[test]
    fn model_row_matches_column_contract() {
        let features = FeatureVector {
            neighbor_count: 3,
            nearest_road_distance: 12.5,
            nearest_neighbor_distance: 40.0,
            building_intersections: 1,
        };
        assert_eq!(features.to_model_row(), [3.0, 12.5, 40.0, 1.0]);
        assert_eq!(FEATURE_COLUMNS[1], "neighbor_count_500m");
        assert_eq!(FEATURE_COLUMNS[4], "building_intersections");
    }
}
