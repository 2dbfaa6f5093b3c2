#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Per-amenity spatial feature extraction.
//!
//! Walks every named amenity in the geometry store and derives its
//! fixed-width feature vector from proximity and containment queries.
//! Output is a pure function of the store contents and the configuration:
//! identical inputs always produce an identical matrix.

use std::collections::{BTreeMap, HashSet};

use poi_audit_geometry::{GeometryError, GeometryStore};
use poi_audit_poi_models::{EntityId, FeatureVector};
use serde::{Deserialize, Serialize};

/// Configuration for the extraction pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionConfig {
    /// Neighbor-count radius in meters. Membership is strict: an amenity
    /// at exactly this distance does not count.
    pub neighbor_radius_m: f64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            neighbor_radius_m: 500.0,
        }
    }
}

/// One amenity's feature vector, keyed by synthetic entity id with the
/// display name carried along for downstream joins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureRow {
    /// Stable synthetic identity.
    pub id: EntityId,
    /// Display name; not guaranteed unique.
    pub name: String,
    /// Derived spatial features.
    pub features: FeatureVector,
}

/// Feature matrix for one analysis run, one row per amenity in input
/// order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureMatrix {
    /// Rows in entity input order.
    pub rows: Vec<FeatureRow>,
    name_collisions: usize,
}

impl FeatureMatrix {
    /// Wraps extracted rows, counting how many are shadowed by an earlier
    /// row with the same display name.
    #[must_use]
    pub fn new(rows: Vec<FeatureRow>) -> Self {
        let mut seen_names: HashSet<&str> = HashSet::new();
        let mut name_collisions = 0;
        for row in &rows {
            if !seen_names.insert(row.name.as_str()) {
                name_collisions += 1;
            }
        }
        Self {
            rows,
            name_collisions,
        }
    }

    /// Name-keyed view of the matrix.
    ///
    /// Names are not unique; when several rows share a name the first-seen
    /// row wins and the rest are reported via [`Self::name_collisions`].
    #[must_use]
    pub fn by_name(&self) -> BTreeMap<&str, &FeatureRow> {
        let mut map = BTreeMap::new();
        for row in &self.rows {
            map.entry(row.name.as_str()).or_insert(row);
        }
        map
    }

    /// Number of rows shadowed by an earlier row with the same name.
    #[must_use]
    pub const fn name_collisions(&self) -> usize {
        self.name_collisions
    }

    /// Number of rows in the matrix.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the matrix has no rows.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Extracts the feature matrix for every amenity in the store.
///
/// Nearest queries with no eligible candidates (no roads, single amenity)
/// record the documented degenerate value 0 so every row is fully
/// populated. Unnamed entities and entities with malformed geometry never
/// get a row; the store reports the latter via
/// [`GeometryStore::skipped_geometries`].
///
/// # Errors
///
/// Returns [`GeometryError`] only for store-level inconsistencies
/// (unknown ids); no-candidate conditions are recovered locally.
pub fn extract(
    store: &GeometryStore,
    config: &ExtractionConfig,
) -> Result<FeatureMatrix, GeometryError> {
    let mut rows = Vec::with_capacity(store.amenities().len());

    for &id in store.amenities() {
        let entity = store.entity(id)?;
        let Some(name) = entity.name.clone() else {
            continue;
        };
        let point = store.representative_point(id)?;

        let nearest_road_distance = match store.nearest_road_distance(point) {
            Ok(distance) => distance,
            Err(GeometryError::EmptyCandidateSet) => 0.0,
            Err(err) => return Err(err),
        };

        let nearest_neighbor_distance = match store.nearest_other_amenity(id) {
            Ok((_, distance)) => distance,
            Err(GeometryError::EmptyCandidateSet) => 0.0,
            Err(err) => return Err(err),
        };

        let neighbor_count = store.amenities_within(id, config.neighbor_radius_m)?.len();
        let building_intersections = store.containing_buildings(id)?.len();

        rows.push(FeatureRow {
            id,
            name,
            features: FeatureVector {
                neighbor_count: u32::try_from(neighbor_count).unwrap_or(u32::MAX),
                nearest_road_distance,
                nearest_neighbor_distance,
                building_intersections: u32::try_from(building_intersections)
                    .unwrap_or(u32::MAX),
            },
        });
    }

    let matrix = FeatureMatrix::new(rows);
    if matrix.name_collisions() > 0 {
        log::warn!(
            "{} amenity name collisions; first-seen rows win in name-keyed output",
            matrix.name_collisions()
        );
    }
    log::debug!("Extracted features for {} amenities", matrix.len());

    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{LineString, Point, Polygon};
    use poi_audit_poi_models::{Entity, EntityGeometry, RoadEdge};

    fn amenity(name: &str, x: f64, y: f64) -> Entity {
        Entity {
            name: Some(name.to_string()),
            building: false,
            geometry: EntityGeometry::Point(Point::new(x, y)),
        }
    }

    fn store(entities: Vec<Entity>, roads: &[RoadEdge]) -> GeometryStore {
        GeometryStore::build(entities, roads)
    }

    #[test]
    fn neighbor_count_matches_within_query() {
        let store = store(
            vec![
                amenity("center", 0.0, 0.0),
                amenity("near", 100.0, 0.0),
                amenity("boundary", 500.0, 0.0),
                amenity("far", 2000.0, 0.0),
            ],
            &[],
        );
        let matrix = extract(&store, &ExtractionConfig::default()).unwrap();

        let by_name = matrix.by_name();
        let center = by_name["center"];
        assert_eq!(
            center.features.neighbor_count,
            u32::try_from(store.amenities_within(center.id, 500.0).unwrap().len()).unwrap()
        );
        // Strict boundary: the amenity at exactly 500 m does not count.
        assert_eq!(center.features.neighbor_count, 1);
    }

    #[test]
    fn no_candidates_record_zero() {
        let store = store(vec![amenity("lonely", 10.0, 10.0)], &[]);
        let matrix = extract(&store, &ExtractionConfig::default()).unwrap();

        let row = &matrix.rows[0];
        assert!((row.features.nearest_road_distance - 0.0).abs() < f64::EPSILON);
        assert!((row.features.nearest_neighbor_distance - 0.0).abs() < f64::EPSILON);
        assert_eq!(row.features.neighbor_count, 0);
        assert_eq!(row.features.building_intersections, 0);
    }

    #[test]
    fn unnamed_entities_get_no_row() {
        let unnamed = Entity {
            name: None,
            building: false,
            geometry: EntityGeometry::Point(Point::new(0.0, 0.0)),
        };
        let store = store(vec![unnamed, amenity("named", 5.0, 5.0)], &[]);
        let matrix = extract(&store, &ExtractionConfig::default()).unwrap();

        assert_eq!(matrix.len(), 1);
        assert_eq!(matrix.rows[0].name, "named");
    }

    #[test]
    fn name_collisions_resolve_first_seen() {
        let store = store(
            vec![
                amenity("Starbucks", 0.0, 0.0),
                amenity("Starbucks", 900.0, 0.0),
                amenity("Library", 10_000.0, 0.0),
            ],
            &[],
        );
        let matrix = extract(&store, &ExtractionConfig::default()).unwrap();

        assert_eq!(matrix.len(), 3);
        assert_eq!(matrix.name_collisions(), 1);

        let by_name = matrix.by_name();
        assert_eq!(by_name.len(), 2);
        assert_eq!(by_name["Starbucks"].id, EntityId(0));
    }

    #[test]
    fn containment_is_a_separate_feature_from_proximity() {
        let hall = Entity {
            name: Some("Town Hall".to_string()),
            building: true,
            geometry: EntityGeometry::Polygon(Polygon::new(
                LineString::from(vec![
                    (0.0, 0.0),
                    (10.0, 0.0),
                    (10.0, 10.0),
                    (0.0, 10.0),
                    (0.0, 0.0),
                ]),
                vec![],
            )),
        };
        let store = store(vec![hall, amenity("kiosk", 2.0, 2.0)], &[]);
        let matrix = extract(&store, &ExtractionConfig::default()).unwrap();

        let by_name = matrix.by_name();
        let kiosk = by_name["kiosk"];
        assert_eq!(kiosk.features.building_intersections, 1);
        // Containment does not masquerade as a zero nearest-neighbor
        // distance; the distance runs to the hall's centroid.
        assert!(kiosk.features.nearest_neighbor_distance > 1.0);
    }

    #[test]
    fn extraction_is_pure() {
        let entities = vec![
            amenity("a", 0.0, 0.0),
            amenity("b", 50.0, 0.0),
            amenity("c", 5000.0, 0.0),
        ];
        let roads = vec![RoadEdge {
            line: LineString::from(vec![(0.0, 10.0), (100.0, 10.0)]),
        }];
        let first = extract(
            &GeometryStore::build(entities.clone(), &roads),
            &ExtractionConfig::default(),
        )
        .unwrap();
        let second = extract(
            &GeometryStore::build(entities, &roads),
            &ExtractionConfig::default(),
        )
        .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn radius_override_changes_counts() {
        let store = store(
            vec![amenity("center", 0.0, 0.0), amenity("near", 100.0, 0.0)],
            &[],
        );
        let wide = extract(&store, &ExtractionConfig::default()).unwrap();
        let narrow = extract(
            &store,
            &ExtractionConfig {
                neighbor_radius_m: 50.0,
            },
        )
        .unwrap();

        assert_eq!(wide.by_name()["center"].features.neighbor_count, 1);
        assert_eq!(narrow.by_name()["center"].features.neighbor_count, 0);
    }
}
