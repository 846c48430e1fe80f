//! Spatial index for proximity queries.
//!
//! Entities are bucketed by the region containing their (clamped) tile, using
//! packed i64 region coordinates as keys. A second map remembers each entity's
//! bucket so removal and relocation never scan.

use std::sync::Arc;

use realm_utils::{RegionPos, TilePos, math::Vector2};
use rustc_hash::{FxHashMap, FxHashSet};
use scc::HashMap;

use crate::entity::{Entity, EntityId};

type Bucket = FxHashMap<EntityId, Arc<Entity>>;

/// A region-bucketed index of the entities of one collision domain.
///
/// Thread-safe via `scc::HashMap`, though in practice only the simulation
/// thread of the owning world writes to it.
pub struct CollisionMap {
    /// Packed region coords to the entities whose tile lies in that region.
    regions: HashMap<i64, Bucket>,
    /// Entity to the packed region it is currently filed under.
    entity_regions: HashMap<EntityId, i64>,
    width: i32,
    height: i32,
}

impl CollisionMap {
    /// Creates an empty index covering a `width` x `height` tile map.
    #[must_use]
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            regions: HashMap::new(),
            entity_regions: HashMap::new(),
            width: width.max(1),
            height: height.max(1),
        }
    }

    /// Files `entity` under the region of its current position.
    pub fn insert(&self, entity: &Arc<Entity>) {
        let region = self.region_key(entity.position());
        let id = entity.id();
        if let Some(previous) = self.entity_regions.read_sync(&id, |_, r| *r) {
            self.remove_from_region(previous, id);
        }
        let _ = self.entity_regions.remove_sync(&id);
        let _ = self.entity_regions.insert_sync(id, region);
        self.add_to_region(region, entity.clone());
    }

    /// Removes `entity` from the index. Unknown entities are ignored.
    pub fn remove(&self, entity: &Entity) {
        let id = entity.id();
        if let Some((_, region)) = self.entity_regions.remove_sync(&id) {
            self.remove_from_region(region, id);
        }
    }

    /// Re-files `entity` after its position changed.
    ///
    /// Buckets are keyed by truncated coordinates, so this is a remove followed by
    /// a reinsert whenever the region changes.
    pub fn relocate(&self, entity: &Arc<Entity>) {
        let new_region = self.region_key(entity.position());
        let id = entity.id();
        match self.entity_regions.read_sync(&id, |_, r| *r) {
            Some(old_region) if old_region == new_region => {}
            Some(old_region) => {
                self.remove_from_region(old_region, id);
                let _ = self
                    .entity_regions
                    .update_sync(&id, |_, region| *region = new_region);
                self.add_to_region(new_region, entity.clone());
            }
            None => {}
        }
    }

    /// Every entity whose distance to `(x, y)` is at most `radius`.
    ///
    /// The boundary is inclusive. A query centered outside the map, or with a
    /// negative radius, finds nothing. Results are unordered.
    #[must_use]
    pub fn hit_test(&self, x: f64, y: f64, radius: f64) -> Vec<Arc<Entity>> {
        if !self.contains(x, y) || radius.is_nan() || radius < 0.0 {
            return Vec::new();
        }

        let center = Vector2::new(x, y);
        let radius_sq = radius * radius;
        let min = self.clamp_tile(TilePos::containing(Vector2::new(x - radius, y - radius)));
        let max = self.clamp_tile(TilePos::containing(Vector2::new(x + radius, y + radius)));
        let (min, max) = (min.region(), max.region());

        let mut hits = Vec::new();
        for ry in min.y..=max.y {
            for rx in min.x..=max.x {
                self.regions
                    .read_sync(&RegionPos::new(rx, ry).as_i64(), |_, bucket| {
                        hits.extend(
                            bucket
                                .values()
                                .filter(|e| e.position().distance_squared(center) <= radius_sq)
                                .cloned(),
                        );
                    });
            }
        }
        hits
    }

    /// Regions that hold at least one entity.
    #[must_use]
    pub fn populated_regions(&self) -> Vec<RegionPos> {
        let mut populated = Vec::new();
        self.regions.iter_sync(|key, bucket| {
            if !bucket.is_empty() {
                populated.push(RegionPos::from_i64(*key));
            }
            true
        });
        populated
    }

    /// Regions of this index within `radius` regions of a populated region of
    /// `other`. Only regions that currently hold entities are returned.
    #[must_use]
    pub fn active_regions(&self, other: &CollisionMap, radius: u8) -> Vec<RegionPos> {
        let radius = i32::from(radius);
        let mut active = FxHashSet::default();
        for center in other.populated_regions() {
            for dy in -radius..=radius {
                for dx in -radius..=radius {
                    let region = RegionPos::new(center.x + dx, center.y + dy);
                    if self.regions.read_sync(&region.as_i64(), |_, _| ()).is_some() {
                        active.insert(region);
                    }
                }
            }
        }
        active.into_iter().collect()
    }

    /// A snapshot of the entities filed under `region`.
    #[must_use]
    pub fn region_entities(&self, region: RegionPos) -> Vec<Arc<Entity>> {
        self.regions
            .read_sync(&region.as_i64(), |_, bucket| bucket.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the number of indexed entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entity_regions.len()
    }

    /// Returns true if no entities are indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entity_regions.is_empty()
    }

    /// Clears all entities from the index.
    pub fn clear(&self) {
        self.regions.clear_sync();
        self.entity_regions.clear_sync();
    }

    fn contains(&self, x: f64, y: f64) -> bool {
        x >= 0.0 && y >= 0.0 && x < f64::from(self.width) && y < f64::from(self.height)
    }

    fn clamp_tile(&self, tile: TilePos) -> TilePos {
        TilePos::new(
            tile.x.clamp(0, self.width - 1),
            tile.y.clamp(0, self.height - 1),
        )
    }

    fn region_key(&self, pos: Vector2<f64>) -> i64 {
        self.clamp_tile(TilePos::containing(pos)).region().as_i64()
    }

    fn add_to_region(&self, region: i64, entity: Arc<Entity>) {
        let id = entity.id();
        if self
            .regions
            .update_sync(&region, |_, bucket| {
                bucket.insert(id, entity.clone());
            })
            .is_none()
        {
            let mut bucket = Bucket::default();
            bucket.insert(id, entity);
            let _ = self.regions.insert_sync(region, bucket);
        }
    }

    fn remove_from_region(&self, region: i64, id: EntityId) {
        let should_remove = self
            .regions
            .update_sync(&region, |_, bucket| {
                bucket.remove(&id);
                bucket.is_empty()
            })
            .unwrap_or(false);

        if should_remove {
            let _ = self
                .regions
                .remove_if_sync(&region, |bucket| bucket.is_empty());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity_at(id: i32, x: f64, y: f64) -> Arc<Entity> {
        let entity = Entity::enemy(1, x, y);
        entity.assign_id(EntityId(id)).expect("fresh entity");
        Arc::new(entity)
    }

    fn ids(entities: &[Arc<Entity>]) -> Vec<EntityId> {
        let mut ids: Vec<_> = entities.iter().map(|e| e.id()).collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_insert_and_query() {
        let map = CollisionMap::new(256, 256);
        let near = entity_at(1, 110.0, 100.0);
        let far = entity_at(2, 120.0, 100.0);
        map.insert(&near);
        map.insert(&far);

        assert_eq!(ids(&map.hit_test(100.0, 100.0, 15.0)), vec![EntityId(1)]);
        assert_eq!(ids(&map.hit_test(100.0, 100.0, 20.0)), vec![EntityId(1), EntityId(2)]);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_boundary_is_inclusive() {
        let map = CollisionMap::new(256, 256);
        map.insert(&entity_at(1, 115.0, 100.0));

        assert_eq!(map.hit_test(100.0, 100.0, 15.0).len(), 1);
        assert!(map.hit_test(100.0, 100.0, 15.0 - 1e-9).is_empty());
    }

    #[test]
    fn test_out_of_map_queries_are_empty() {
        let map = CollisionMap::new(64, 64);
        map.insert(&entity_at(1, 1.0, 1.0));

        assert!(map.hit_test(-1.0, 1.0, 10.0).is_empty());
        assert!(map.hit_test(1.0, 64.0, 10.0).is_empty());
        assert!(map.hit_test(1.0, 1.0, f64::NAN).is_empty());
        assert_eq!(map.hit_test(0.0, 0.0, 10.0).len(), 1);
    }

    #[test]
    fn test_relocate_moves_between_regions() {
        let map = CollisionMap::new(256, 256);
        let entity = entity_at(1, 10.0, 10.0);
        map.insert(&entity);
        assert_eq!(map.region_entities(RegionPos::new(0, 0)).len(), 1);

        entity.set_position(Vector2::new(200.0, 200.0));
        map.relocate(&entity);

        assert!(map.region_entities(RegionPos::new(0, 0)).is_empty());
        assert_eq!(map.region_entities(RegionPos::new(12, 12)).len(), 1);
        assert!(map.hit_test(10.0, 10.0, 5.0).is_empty());
        assert_eq!(map.hit_test(200.0, 200.0, 1.0).len(), 1);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_remove() {
        let map = CollisionMap::new(64, 64);
        let entity = entity_at(1, 5.0, 5.0);
        map.insert(&entity);
        map.remove(&entity);
        map.remove(&entity);

        assert!(map.is_empty());
        assert!(map.populated_regions().is_empty());
    }

    #[test]
    fn test_active_regions() {
        let players = CollisionMap::new(1024, 1024);
        let enemies = CollisionMap::new(1024, 1024);
        players.insert(&entity_at(1, 8.0, 8.0));
        enemies.insert(&entity_at(2, 40.0, 8.0));
        enemies.insert(&entity_at(3, 900.0, 900.0));

        let active = enemies.active_regions(&players, 3);
        assert_eq!(active, vec![RegionPos::new(2, 0)]);
        assert!(enemies.active_regions(&CollisionMap::new(1024, 1024), 3).is_empty());
    }
}
