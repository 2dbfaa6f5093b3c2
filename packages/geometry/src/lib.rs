#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-memory geometry store for POI auditing.
//!
//! Owns the projected geometries for one analysis run, builds R-tree
//! spatial indexes over amenity points, building footprints, and road
//! segments, and answers nearest-distance and containment queries. The
//! indexes are built once and read-only afterwards, so concurrent readers
//! never contend.

use geo::{BoundingRect, Contains, Point, Polygon};
use poi_audit_poi_models::{Entity, EntityId, RoadEdge};
use rstar::{
    AABB, PointDistance, RTree, RTreeObject,
    primitives::{GeomWithData, Line},
};
use thiserror::Error;

/// Errors raised by geometry store queries.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GeometryError {
    /// A nearest query has no eligible candidates (no road segments, or
    /// fewer than two amenities).
    #[error("no candidates available for nearest query")]
    EmptyCandidateSet,

    /// The entity id does not exist in this store.
    #[error("unknown entity {0}")]
    UnknownEntity(EntityId),

    /// The entity's geometry has no computable representative point.
    #[error("entity {0} has no usable geometry")]
    MalformedGeometry(EntityId),
}

/// An amenity's representative point, tagged with its entity id.
type AmenityPoint = GeomWithData<[f64; 2], EntityId>;

/// One segment of a road edge polyline.
type RoadSegment = GeomWithData<Line<[f64; 2]>, usize>;

/// A building footprint stored in the R-tree with its bounding envelope.
struct FootprintEntry {
    id: EntityId,
    envelope: AABB<[f64; 2]>,
    polygon: Polygon<f64>,
}

impl RTreeObject for FootprintEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// An entity plus its precomputed representative point.
///
/// `point` is `None` when the geometry is malformed (e.g. an empty
/// polygon ring); such entities are excluded from every index but keep
/// their id slot so ids stay stable.
struct StoredEntity {
    entity: Entity,
    point: Option<Point<f64>>,
}

/// Spatial indexes over a fixed set of projected geometries.
///
/// All queries run through the bulk-loaded R-trees; callers never see the
/// underlying index structure, so it can be swapped without touching the
/// feature pipeline. Distance ties break to the lowest entity id (input
/// order).
pub struct GeometryStore {
    entities: Vec<StoredEntity>,
    amenity_ids: Vec<EntityId>,
    amenity_index: RTree<AmenityPoint>,
    footprint_index: RTree<FootprintEntry>,
    road_index: RTree<RoadSegment>,
    segment_count: usize,
    skipped_geometries: usize,
}

impl GeometryStore {
    /// Builds the store and its indexes from materialized entities and
    /// road edges.
    ///
    /// Entity ids are assigned by input order. Entities with malformed
    /// geometry are excluded from the indexes (and counted) rather than
    /// aborting the batch. Zero-length road segments are dropped so a
    /// degenerate edge can never report an incorrect nearest distance.
    #[must_use]
    pub fn build(entities: Vec<Entity>, roads: &[RoadEdge]) -> Self {
        let mut stored = Vec::with_capacity(entities.len());
        let mut amenity_ids = Vec::new();
        let mut amenity_entries = Vec::new();
        let mut footprint_entries = Vec::new();
        let mut skipped_geometries = 0;

        for (index, entity) in entities.into_iter().enumerate() {
            let id = EntityId(index);
            let point = entity.geometry.representative_point();

            if point.is_none() {
                log::warn!("Excluding entity {id} with malformed geometry");
                skipped_geometries += 1;
            }

            if let Some(point) = point {
                if entity.is_amenity() {
                    amenity_ids.push(id);
                    amenity_entries.push(AmenityPoint::new([point.x(), point.y()], id));
                }
            }

            if let Some(polygon) = entity.footprint() {
                if let Some(rect) = polygon.bounding_rect() {
                    footprint_entries.push(FootprintEntry {
                        id,
                        envelope: AABB::from_corners(
                            [rect.min().x, rect.min().y],
                            [rect.max().x, rect.max().y],
                        ),
                        polygon: polygon.clone(),
                    });
                }
            }

            stored.push(StoredEntity { entity, point });
        }

        let mut segments = Vec::new();
        for (edge_index, edge) in roads.iter().enumerate() {
            for pair in edge.line.0.windows(2) {
                if pair[0] == pair[1] {
                    continue;
                }
                segments.push(RoadSegment::new(
                    Line::new([pair[0].x, pair[0].y], [pair[1].x, pair[1].y]),
                    edge_index,
                ));
            }
        }

        log::info!(
            "Indexed {} amenities, {} footprints, {} road segments ({} entities skipped)",
            amenity_entries.len(),
            footprint_entries.len(),
            segments.len(),
            skipped_geometries,
        );

        let segment_count = segments.len();

        Self {
            entities: stored,
            amenity_ids,
            amenity_index: RTree::bulk_load(amenity_entries),
            footprint_index: RTree::bulk_load(footprint_entries),
            road_index: RTree::bulk_load(segments),
            segment_count,
            skipped_geometries,
        }
    }

    /// Minimum Euclidean distance from `point` to any road segment.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::EmptyCandidateSet`] when there are no
    /// road segments.
    pub fn nearest_road_distance(&self, point: Point<f64>) -> Result<f64, GeometryError> {
        self.road_index
            .nearest_neighbor_iter_with_distance_2(&[point.x(), point.y()])
            .next()
            .map(|(_, distance_2)| distance_2.sqrt())
            .ok_or(GeometryError::EmptyCandidateSet)
    }

    /// Nearest other amenity by representative point, excluding `id`
    /// itself by identity.
    ///
    /// Ties at the minimal distance break to the lowest entity id, so
    /// duplicate-location amenities resolve deterministically.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::EmptyCandidateSet`] when no other amenity
    /// exists, [`GeometryError::UnknownEntity`] for an id outside the
    /// store, and [`GeometryError::MalformedGeometry`] when `id` has no
    /// representative point.
    pub fn nearest_other_amenity(
        &self,
        id: EntityId,
    ) -> Result<(EntityId, f64), GeometryError> {
        let point = self.representative_point(id)?;
        let mut best: Option<(EntityId, f64)> = None;

        // The iterator yields nondecreasing distances; drain every
        // candidate tied at the minimum and keep the lowest id.
        for (item, distance_2) in self
            .amenity_index
            .nearest_neighbor_iter_with_distance_2(&[point.x(), point.y()])
        {
            if item.data == id {
                continue;
            }
            match best {
                None => best = Some((item.data, distance_2)),
                Some((_, best_2)) if distance_2 > best_2 => break,
                Some((best_id, best_2)) => {
                    if item.data < best_id {
                        best = Some((item.data, best_2));
                    }
                }
            }
        }

        best.map(|(neighbor, distance_2)| (neighbor, distance_2.sqrt()))
            .ok_or(GeometryError::EmptyCandidateSet)
    }

    /// All other amenities whose representative point lies strictly
    /// within `radius_m` meters of `id`'s representative point.
    ///
    /// Anti-reflexive and strict: `id` is never in its own result, and an
    /// amenity at exactly `radius_m` is excluded. Results are sorted by
    /// entity id.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::UnknownEntity`] or
    /// [`GeometryError::MalformedGeometry`] as for
    /// [`Self::nearest_other_amenity`].
    pub fn amenities_within(
        &self,
        id: EntityId,
        radius_m: f64,
    ) -> Result<Vec<EntityId>, GeometryError> {
        let point = self.representative_point(id)?;
        let query = [point.x(), point.y()];
        let radius_2 = radius_m * radius_m;

        let mut ids: Vec<EntityId> = self
            .amenity_index
            .locate_within_distance(query, radius_2)
            .filter(|item| item.data != id && item.distance_2(&query) < radius_2)
            .map(|item| item.data)
            .collect();
        ids.sort_unstable();

        Ok(ids)
    }

    /// All building footprints whose polygon contains `id`'s
    /// representative point (exact point-in-polygon, not bounding-box
    /// overlap), excluding `id` itself. Results are sorted by entity id.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::UnknownEntity`] or
    /// [`GeometryError::MalformedGeometry`] as for
    /// [`Self::nearest_other_amenity`].
    pub fn containing_buildings(&self, id: EntityId) -> Result<Vec<EntityId>, GeometryError> {
        let point = self.representative_point(id)?;
        let envelope = AABB::from_point([point.x(), point.y()]);

        let mut ids: Vec<EntityId> = self
            .footprint_index
            .locate_in_envelope_intersecting(&envelope)
            .filter(|entry| entry.id != id && entry.polygon.contains(&point))
            .map(|entry| entry.id)
            .collect();
        ids.sort_unstable();

        Ok(ids)
    }

    /// The representative point for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::UnknownEntity`] for an id outside the
    /// store and [`GeometryError::MalformedGeometry`] when the entity's
    /// geometry is unusable.
    pub fn representative_point(&self, id: EntityId) -> Result<Point<f64>, GeometryError> {
        self.entities
            .get(id.0)
            .ok_or(GeometryError::UnknownEntity(id))?
            .point
            .ok_or(GeometryError::MalformedGeometry(id))
    }

    /// The entity record for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::UnknownEntity`] for an id outside the
    /// store.
    pub fn entity(&self, id: EntityId) -> Result<&Entity, GeometryError> {
        self.entities
            .get(id.0)
            .map(|stored| &stored.entity)
            .ok_or(GeometryError::UnknownEntity(id))
    }

    /// Ids of all amenities with usable geometry, in input order.
    #[must_use]
    pub fn amenities(&self) -> &[EntityId] {
        &self.amenity_ids
    }

    /// Total number of entities in the store, including excluded ones.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the store holds no entities.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Number of indexed road segments.
    #[must_use]
    pub const fn road_segment_count(&self) -> usize {
        self.segment_count
    }

    /// Number of entities excluded for malformed geometry.
    #[must_use]
    pub const fn skipped_geometries(&self) -> usize {
        self.skipped_geometries
    }
}
