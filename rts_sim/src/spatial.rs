//! Collision-style queries over unit, building and resource colliders.
//!
//! The index is rebuilt from [`Collider`] components at the start of every
//! tick. Query results are ordered by distance, then entity, so callers can
//! take the first hit deterministically.

use bevy::prelude::*;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct QueryMask: u8 {
        const UNIT = 0b0001;
        const BUILDING = 0b0010;
        const RESOURCE = 0b0100;
        const GROUND = 0b1000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColliderShape {
    Sphere { radius: f32 },
    Cuboid { half_extents: Vec3 },
}

#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct Collider {
    pub shape: ColliderShape,
    pub layer: QueryMask,
}

impl Collider {
    pub fn sphere(radius: f32, layer: QueryMask) -> Self {
        Self {
            shape: ColliderShape::Sphere { radius },
            layer,
        }
    }

    pub fn cuboid(half_extents: Vec3, layer: QueryMask) -> Self {
        Self {
            shape: ColliderShape::Cuboid { half_extents },
            layer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct IndexedCollider {
    entity: Entity,
    center: Vec3,
    collider: Collider,
}

impl IndexedCollider {
    fn closest_point(&self, point: Vec3) -> Vec3 {
        match self.collider.shape {
            ColliderShape::Sphere { radius } => {
                let offset = point - self.center;
                let distance = offset.length();
                if distance <= radius {
                    point
                } else {
                    self.center + offset / distance * radius
                }
            }
            ColliderShape::Cuboid { half_extents } => {
                let min = self.center - half_extents;
                let max = self.center + half_extents;
                point.clamp(min, max)
            }
        }
    }

    fn overlaps_box(&self, center: Vec3, half_extents: Vec3) -> bool {
        match self.collider.shape {
            ColliderShape::Sphere { radius } => {
                let closest = self.center.clamp(center - half_extents, center + half_extents);
                closest.distance_squared(self.center) < radius * radius
            }
            ColliderShape::Cuboid {
                half_extents: own_half,
            } => {
                let delta = (self.center - center).abs();
                let reach = own_half + half_extents;
                delta.x < reach.x && delta.y < reach.y && delta.z < reach.z
            }
        }
    }

    /// Entry distance along a normalized ray, if it hits within `max_distance`.
    fn ray_distance(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<f32> {
        match self.collider.shape {
            ColliderShape::Sphere { radius } => {
                let to_center = self.center - origin;
                let projected = to_center.dot(direction);
                let closest_sq = to_center.length_squared() - projected * projected;
                let radius_sq = radius * radius;
                if closest_sq > radius_sq {
                    return None;
                }
                let half_chord = (radius_sq - closest_sq).sqrt();
                let entry = projected - half_chord;
                let distance = if entry >= 0.0 {
                    entry
                } else {
                    projected + half_chord
                };
                (distance >= 0.0 && distance <= max_distance).then_some(distance)
            }
            ColliderShape::Cuboid { half_extents } => {
                let min = self.center - half_extents;
                let max = self.center + half_extents;
                let mut t_min = 0.0f32;
                let mut t_max = max_distance;
                for axis in 0..3 {
                    let o = origin[axis];
                    let d = direction[axis];
                    if d.abs() < f32::EPSILON {
                        if o < min[axis] || o > max[axis] {
                            return None;
                        }
                        continue;
                    }
                    let inv = 1.0 / d;
                    let mut t0 = (min[axis] - o) * inv;
                    let mut t1 = (max[axis] - o) * inv;
                    if t0 > t1 {
                        std::mem::swap(&mut t0, &mut t1);
                    }
                    t_min = t_min.max(t0);
                    t_max = t_max.min(t1);
                    if t_min > t_max {
                        return None;
                    }
                }
                Some(t_min)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialHit {
    pub entity: Entity,
    pub position: Vec3,
    pub distance: f32,
    pub layer: QueryMask,
}

/// Closest ray hit. `entity` is `None` when the ray reached the ground plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub entity: Option<Entity>,
    pub point: Vec3,
    pub distance: f32,
}

#[derive(Resource, Debug, Clone, Default)]
pub struct SpatialIndex {
    entries: Vec<IndexedCollider>,
}

impl SpatialIndex {
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn insert(&mut self, entity: Entity, center: Vec3, collider: Collider) {
        self.entries.retain(|entry| entry.entity != entity);
        self.entries.push(IndexedCollider {
            entity,
            center,
            collider,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn overlap_sphere(&self, center: Vec3, radius: f32, filter: QueryMask) -> Vec<SpatialHit> {
        let radius_sq = radius * radius;
        let mut hits: Vec<SpatialHit> = self
            .entries
            .iter()
            .filter(|entry| entry.collider.layer.intersects(filter))
            .filter_map(|entry| {
                let closest = entry.closest_point(center);
                (closest.distance_squared(center) <= radius_sq).then(|| SpatialHit {
                    entity: entry.entity,
                    position: entry.center,
                    distance: entry.center.distance(center),
                    layer: entry.collider.layer,
                })
            })
            .collect();
        sort_hits(&mut hits);
        hits
    }

    pub fn overlap_box(&self, center: Vec3, half_extents: Vec3, filter: QueryMask) -> Vec<SpatialHit> {
        let mut hits: Vec<SpatialHit> = self
            .entries
            .iter()
            .filter(|entry| entry.collider.layer.intersects(filter))
            .filter(|entry| entry.overlaps_box(center, half_extents))
            .map(|entry| SpatialHit {
                entity: entry.entity,
                position: entry.center,
                distance: entry.center.distance(center),
                layer: entry.collider.layer,
            })
            .collect();
        sort_hits(&mut hits);
        hits
    }

    /// Cast from `start` toward `end`. Falls back to the `y = 0` ground plane
    /// when `filter` includes [`QueryMask::GROUND`] and no collider is hit.
    pub fn cast_ray(&self, start: Vec3, end: Vec3, filter: QueryMask) -> Option<RayHit> {
        let delta = end - start;
        let max_distance = delta.length();
        if max_distance <= f32::EPSILON {
            return None;
        }
        let direction = delta / max_distance;

        let closest = self
            .entries
            .iter()
            .filter(|entry| entry.collider.layer.intersects(filter))
            .filter_map(|entry| {
                entry
                    .ray_distance(start, direction, max_distance)
                    .map(|distance| (entry, distance))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.entity.cmp(&b.0.entity)));

        if let Some((entry, distance)) = closest {
            return Some(RayHit {
                entity: Some(entry.entity),
                point: start + direction * distance,
                distance,
            });
        }

        if filter.contains(QueryMask::GROUND) && direction.y.abs() > f32::EPSILON {
            let distance = -start.y / direction.y;
            if distance >= 0.0 && distance <= max_distance {
                return Some(RayHit {
                    entity: None,
                    point: start + direction * distance,
                    distance,
                });
            }
        }
        None
    }
}

fn sort_hits(hits: &mut [SpatialHit]) {
    hits.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.entity.cmp(&b.entity)));
}

pub fn rebuild_spatial_index(
    mut index: ResMut<SpatialIndex>,
    colliders: Query<(Entity, &Transform, &Collider)>,
) {
    index.clear();
    let mut entries: Vec<_> = colliders.iter().collect();
    entries.sort_by_key(|(entity, _, _)| *entity);
    for (entity, transform, collider) in entries {
        index.entries.push(IndexedCollider {
            entity,
            center: transform.translation,
            collider: *collider,
        });
    }
}

#[cfg(test)]
mod tests {
    use bevy_ecs::system::RunSystemOnce;

    use super::*;

    fn index_with(entries: &[(u32, Vec3, Collider)]) -> SpatialIndex {
        let mut index = SpatialIndex::default();
        for (id, center, collider) in entries {
            index.insert(Entity::from_raw(*id), *center, *collider);
        }
        index
    }

    #[test]
    fn sphere_query_filters_by_mask_and_sorts() {
        let index = index_with(&[
            (1, Vec3::new(4.0, 0.0, 0.0), Collider::sphere(0.75, QueryMask::RESOURCE)),
            (2, Vec3::new(2.0, 0.0, 0.0), Collider::sphere(0.75, QueryMask::RESOURCE)),
            (3, Vec3::new(1.0, 0.0, 0.0), Collider::sphere(0.5, QueryMask::UNIT)),
        ]);
        let hits = index.overlap_sphere(Vec3::ZERO, 6.0, QueryMask::RESOURCE);
        let ids: Vec<_> = hits.iter().map(|hit| hit.entity.index()).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn box_query_detects_footprint_overlap() {
        let index = index_with(&[(
            7,
            Vec3::new(10.0, 0.0, 10.0),
            Collider::cuboid(Vec3::new(1.5, 1.0, 1.5), QueryMask::BUILDING),
        )]);
        let blocked = index.overlap_box(
            Vec3::new(12.0, 0.0, 10.0),
            Vec3::new(1.0, 1.0, 1.0),
            QueryMask::BUILDING,
        );
        assert_eq!(blocked.len(), 1);
        let clear = index.overlap_box(
            Vec3::new(14.0, 0.0, 10.0),
            Vec3::new(1.0, 1.0, 1.0),
            QueryMask::BUILDING,
        );
        assert!(clear.is_empty());
    }

    #[test]
    fn ray_prefers_collider_then_ground() {
        let index = index_with(&[(
            5,
            Vec3::new(0.0, 0.0, 5.0),
            Collider::sphere(1.0, QueryMask::RESOURCE),
        )]);
        let hit = index
            .cast_ray(
                Vec3::new(0.0, 10.0, 5.0),
                Vec3::new(0.0, -10.0, 5.0),
                QueryMask::RESOURCE | QueryMask::GROUND,
            )
            .expect("hit");
        assert_eq!(hit.entity, Some(Entity::from_raw(5)));
        assert!((hit.point.y - 1.0).abs() < 1e-4);

        let ground = index
            .cast_ray(
                Vec3::new(8.0, 10.0, 8.0),
                Vec3::new(8.0, -10.0, 8.0),
                QueryMask::RESOURCE | QueryMask::GROUND,
            )
            .expect("ground");
        assert_eq!(ground.entity, None);
        assert!(ground.point.abs_diff_eq(Vec3::new(8.0, 0.0, 8.0), 1e-4));
    }

    #[test]
    fn rebuild_collects_every_collider() {
        let mut world = World::default();
        world.init_resource::<SpatialIndex>();
        world.spawn((
            Transform::from_xyz(1.0, 0.0, 1.0),
            Collider::sphere(0.5, QueryMask::UNIT),
        ));
        world.spawn((
            Transform::from_xyz(3.0, 0.0, 3.0),
            Collider::sphere(0.5, QueryMask::RESOURCE),
        ));
        world.run_system_once(rebuild_spatial_index);
        assert_eq!(world.resource::<SpatialIndex>().len(), 2);
    }
}
