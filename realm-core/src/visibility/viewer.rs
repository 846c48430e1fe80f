//! Per-viewer incremental visibility.
//!
//! A viewer remembers what its client already knows: which tiles it holds at
//! which version, which entities and static map objects it tracks. Each tick
//! the world asks it for a delta against the current state.

use std::sync::Arc;

use realm_utils::{TilePos, math::Vector2};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use super::{ObjectDef, ObjectStats, TileData, ViewerDelta};
use crate::{
    entity::{Entity, EntityCategory, EntityId, EntityKind, StatChange, StatKind, StatValue},
    ticks::TickTime,
    world::{BlockingMode, CollisionDomain, World, map::Tile},
};

type PendingStats = SmallVec<[(StatKind, StatValue); 4]>;

/// What one player's client currently knows about its world.
#[derive(Default)]
pub struct ViewerState {
    /// Tiles currently within sight.
    active_tiles: FxHashSet<TilePos>,
    /// Tile to the version last sent.
    seen_tiles: FxHashMap<TilePos, u32>,
    /// Entities the client knows about.
    tracked: FxHashMap<EntityId, Arc<Entity>>,
    /// Static map objects the client knows about, by the tile they sit on.
    tracked_statics: FxHashMap<TilePos, EntityId>,
    /// Stat changes accumulated since the last flush.
    pending_stats: FxHashMap<EntityId, PendingStats>,
    force_tile_refresh: bool,
    tick_id: u32,
}

impl ViewerState {
    /// A viewer that knows nothing yet. Its first update recomputes the active tiles.
    #[must_use]
    pub fn new() -> Self {
        Self {
            force_tile_refresh: true,
            ..Self::default()
        }
    }

    /// Recompute the active tiles on the next update.
    pub fn request_tile_refresh(&mut self) {
        self.force_tile_refresh = true;
    }

    /// Tiles currently within sight.
    #[must_use]
    pub fn active_tiles(&self) -> &FxHashSet<TilePos> {
        &self.active_tiles
    }

    /// Whether the client knows about `id`.
    #[must_use]
    pub fn is_tracking(&self, id: EntityId) -> bool {
        self.tracked.contains_key(&id) || self.tracked_statics.values().any(|s| *s == id)
    }

    /// Number of tracked entities, static map objects excluded.
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    /// Sequence number of the last flushed delta.
    #[must_use]
    pub fn tick_id(&self) -> u32 {
        self.tick_id
    }

    /// Forgets everything, releasing the tracked entities.
    pub(crate) fn reset(&mut self) {
        *self = Self::new();
    }

    /// Computes this tick's delta for `viewer`, or `None` if there is nothing to send.
    pub(crate) fn update(
        &mut self,
        world: &World,
        viewer: &Arc<Entity>,
        stat_events: &[StatChange],
        time: &TickTime,
    ) -> Option<ViewerDelta> {
        let player = viewer.player()?;
        let settings = world.settings();
        let map = world.map();

        if self.force_tile_refresh {
            self.active_tiles = world
                .sight()
                .visible_tiles(map, viewer.tile(), settings.blocking);
            self.force_tile_refresh = false;
        }

        let Self {
            active_tiles,
            seen_tiles,
            tracked,
            tracked_statics,
            pending_stats,
            ..
        } = self;

        let mut delta = ViewerDelta {
            tick_time_ms: time.elapsed_ms_delta,
            ..ViewerDelta::default()
        };

        for pos in active_tiles.iter() {
            let Some(tile) = map.tile(*pos) else {
                continue;
            };
            let version = tile.update_count();
            let seen = seen_tiles.entry(*pos).or_insert(0);
            if *seen < version {
                *seen = version;
                delta.tiles.push(TileData {
                    x: pos.x,
                    y: pos.y,
                    ground: tile.ground(),
                });
            }
        }

        let center = viewer.position();
        let radius = f64::from(settings.sight_radius);
        let check_tiles = settings.blocking != BlockingMode::Open;
        let in_view = |entity: &Entity| {
            if entity.is_removed() || entity.position().distance_squared(center) > radius * radius {
                return false;
            }
            match entity.kind() {
                EntityKind::Container { owners } => {
                    active_tiles.contains(&entity.tile())
                        && (owners.is_empty() || owners.contains(&player.account_id))
                }
                _ => !check_tiles || active_tiles.contains(&entity.tile()),
            }
        };
        let exempt = [Some(viewer.id()), player.pet(), player.quest()];
        let is_exempt = |id: EntityId| exempt.contains(&Some(id));

        tracked.retain(|id, entity| {
            let keep = if is_exempt(*id) {
                !entity.is_removed()
            } else {
                in_view(&**entity)
            };
            if !keep {
                delta.drops.push(*id);
            }
            keep
        });

        let mut candidates = world.radius_query(center.x, center.y, radius, CollisionDomain::Players);
        candidates.extend(world.radius_query(center.x, center.y, radius, CollisionDomain::Enemies));
        candidates.extend(world.registry().all_of_category(EntityCategory::Container));
        for entity in candidates {
            let id = entity.id();
            if !tracked.contains_key(&id) && in_view(&entity) {
                delta.new_objects.push(entity.to_definition());
                tracked.insert(id, entity);
            }
        }
        for id in exempt.into_iter().flatten() {
            if tracked.contains_key(&id) {
                continue;
            }
            if let Some(entity) = world.get_entity(id)
                && !entity.is_removed()
            {
                delta.new_objects.push(entity.to_definition());
                tracked.insert(id, entity);
            }
        }

        tracked_statics.retain(|pos, id| {
            let keep = active_tiles.contains(pos)
                && map
                    .tile(*pos)
                    .and_then(Tile::object)
                    .is_some_and(|object| object.instance_id == *id);
            if !keep {
                delta.drops.push(*id);
            }
            keep
        });
        for pos in active_tiles.iter() {
            if tracked_statics.contains_key(pos) {
                continue;
            }
            if let Some(object) = map.tile(*pos).and_then(Tile::object) {
                tracked_statics.insert(*pos, object.instance_id);
                delta.new_objects.push(ObjectDef {
                    id: object.instance_id,
                    object_type: object.object_type,
                    category: EntityCategory::StaticObject,
                    position: Vector2::new(f64::from(pos.x) + 0.5, f64::from(pos.y) + 0.5),
                    stats: Vec::new(),
                });
            }
        }

        let own_id = viewer.id();
        for change in stat_events {
            let deliver = if change.self_only {
                change.subject == own_id
            } else {
                change.subject == own_id || tracked.contains_key(&change.subject)
            };
            if !deliver {
                continue;
            }
            let pending = pending_stats.entry(change.subject).or_default();
            match pending.iter_mut().find(|(kind, _)| *kind == change.kind) {
                Some(slot) => slot.1 = change.value.clone(),
                None => pending.push((change.kind, change.value.clone())),
            }
        }
        for id in &delta.drops {
            pending_stats.remove(id);
        }

        delta.stats = pending_stats
            .drain()
            .filter_map(|(id, stats)| {
                let position = tracked.get(&id)?.position();
                Some(ObjectStats {
                    id,
                    position,
                    stats: stats.into_vec(),
                })
            })
            .collect();
        delta.stats.sort_by_key(|stats| stats.id);

        if delta.is_empty() {
            return None;
        }
        self.tick_id = self.tick_id.wrapping_add(1);
        delta.tick_id = self.tick_id;
        Some(delta)
    }
}
