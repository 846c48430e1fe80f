//! This module contains the `World` struct, one independent simulation domain.
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicUsize, Ordering},
};

use rayon::prelude::*;
use realm_utils::{TilePos, locks::SyncMutex, math::Vector2};

use crate::{
    entity::{Entity, EntityCategory, EntityId, StatChange, StatKind, StatValue},
    error::WorldError,
    ticks::{TickTime, TimerId, TimerQueue},
    transport::{PacketPriority, Payload, Transport},
    visibility::{SightTable, VISIBILITY_RADIUS},
};

pub mod collision_map;
pub mod map;
pub mod registry;
mod settings;
mod tick;
mod world_entities;


pub use collision_map::CollisionMap;
pub use map::{MapLayout, WorldMap};
pub use registry::EntityRegistry;
pub use settings::{BlockingMode, WorldSettings};

/// Which of the two spatial indices a query runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollisionDomain {
    /// Players, pets and decoys.
    Players,
    /// Enemies and static objects other than decoys.
    Enemies,
}

/// Lifetime of a world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorldStatus {
    /// Running.
    Active,
    /// Idle for too long or flagged for close. The owner should destroy it.
    Expiring,
    /// Torn down. Terminal.
    Destroyed,
}

/// A struct that represents a world.
pub struct World {
    settings: WorldSettings,
    map: WorldMap,
    registry: EntityRegistry,
    players_collision: CollisionMap,
    enemies_collision: CollisionMap,
    timers: TimerQueue<World>,
    sight: Arc<SightTable>,
    transport: Arc<dyn Transport>,
    /// Stat changes posted since the last visibility pass.
    stat_events: SyncMutex<Vec<StatChange>>,
    status: SyncMutex<WorldStatus>,
    age_ms: AtomicI64,
    /// Time spent without players or branches.
    idle_ms: AtomicI64,
    force_close: AtomicBool,
    branches: AtomicUsize,
    total_connects: AtomicU32,
}

impl World {
    /// Creates a world over the map described by `layout`.
    ///
    /// The layout's initial entities are not spawned; see
    /// [`World::spawn_initial_entities`].
    pub fn new(
        settings: WorldSettings,
        layout: &MapLayout,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, WorldError> {
        settings.validate().map_err(WorldError::InvalidSettings)?;
        let map = WorldMap::from_layout(layout)?;

        log::info!(
            "Created world {} ({}x{}, {:?})",
            settings.name,
            map.width(),
            map.height(),
            settings.blocking
        );

        Ok(Self {
            sight: SightTable::shared(settings.sight_radius),
            players_collision: CollisionMap::new(map.width(), map.height()),
            enemies_collision: CollisionMap::new(map.width(), map.height()),
            settings,
            map,
            registry: EntityRegistry::new(),
            timers: TimerQueue::new(),
            transport,
            stat_events: SyncMutex::new(Vec::new()),
            status: SyncMutex::new(WorldStatus::Active),
            age_ms: AtomicI64::new(0),
            idle_ms: AtomicI64::new(0),
            force_close: AtomicBool::new(false),
            branches: AtomicUsize::new(0),
            total_connects: AtomicU32::new(0),
        })
    }

    /// The settings this world was created with.
    #[must_use]
    pub fn settings(&self) -> &WorldSettings {
        &self.settings
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.settings.name
    }

    /// The terrain.
    #[must_use]
    pub fn map(&self) -> &WorldMap {
        &self.map
    }

    /// The entity registry.
    #[must_use]
    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    /// The sight table used by this world's viewers.
    #[must_use]
    pub fn sight(&self) -> &SightTable {
        &self.sight
    }

    /// The spatial index of `domain`.
    #[must_use]
    pub fn collision(&self, domain: CollisionDomain) -> &CollisionMap {
        match domain {
            CollisionDomain::Players => &self.players_collision,
            CollisionDomain::Enemies => &self.enemies_collision,
        }
    }

    /// Current lifetime state.
    pub fn status(&self) -> WorldStatus {
        *self.status.lock()
    }

    fn set_status(&self, status: WorldStatus) {
        *self.status.lock() = status;
    }

    /// Simulation time since the world was created, in milliseconds.
    pub fn get_age(&self) -> i64 {
        self.age_ms.load(Ordering::Relaxed)
    }

    /// Requests that the world expire at the top of its next tick. The
    /// request waits while the world has branches.
    pub fn flag_for_close(&self) {
        self.force_close.store(true, Ordering::Release);
    }

    /// Records a stat change for this tick's visibility pass.
    ///
    /// `self_only` changes reach only the subject's own client. Changes posted
    /// by entities outside this world are ignored.
    pub fn post_stat_change(&self, entity: &Entity, kind: StatKind, value: StatValue, self_only: bool) {
        let subject = entity.id();
        if subject.is_none() || entity.is_removed() {
            return;
        }
        self.stat_events.lock().push(StatChange {
            subject,
            kind,
            value,
            self_only,
        });
    }

    /// Every entity of `domain` within `radius` of `(x, y)`, boundary included.
    /// Queries off the map find nothing.
    #[must_use]
    pub fn radius_query(&self, x: f64, y: f64, radius: f64, domain: CollisionDomain) -> Vec<Arc<Entity>> {
        self.collision(domain).hit_test(x, y, radius)
    }

    /// Whether a tile can be walked on. When `spawning`, objects that only
    /// prevent placement count as well.
    #[must_use]
    pub fn is_passable(&self, x: i32, y: i32, spawning: bool) -> bool {
        let pos = TilePos::new(x, y);
        let Some(tile) = self.map.tile(pos) else {
            return false;
        };
        if self
            .map
            .ground_desc(tile.ground())
            .is_some_and(|ground| ground.no_walk)
        {
            return false;
        }
        match tile.object().and_then(|o| self.map.object_desc(o.object_type)) {
            Some(desc) => {
                !(desc.full_occupy || desc.enemy_occupy_square || (spawning && desc.occupy_square))
            }
            None => true,
        }
    }

    /// A snapshot of the players in the world.
    #[must_use]
    pub fn players(&self) -> Vec<Arc<Entity>> {
        self.registry.all_of_category(EntityCategory::Player)
    }

    /// Number of players in the world.
    #[must_use]
    pub fn player_count(&self) -> usize {
        self.registry.count(EntityCategory::Player)
    }

    /// Whether the world is at its player cap.
    #[must_use]
    pub fn is_players_max(&self) -> bool {
        self.player_count() >= self.settings.max_players
    }

    /// Players admitted since the world was created.
    pub fn total_connects(&self) -> u32 {
        self.total_connects.load(Ordering::Relaxed)
    }

    /// Spawn tiles from the map regions.
    #[must_use]
    pub fn spawn_points(&self) -> Vec<TilePos> {
        self.map.spawn_points()
    }

    /// Registers a map-generation sub-branch. A world with branches never idles out.
    pub fn add_branch(&self) {
        self.branches.fetch_add(1, Ordering::AcqRel);
    }

    /// Unregisters a map-generation sub-branch.
    pub fn remove_branch(&self) {
        let _ = self
            .branches
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    /// Number of active sub-branches.
    pub fn branches(&self) -> usize {
        self.branches.load(Ordering::Acquire)
    }

    /// Schedules a callback on this world's simulation thread.
    pub fn schedule_timer<F>(&self, delay_ms: u32, repeat: bool, callback: F) -> TimerId
    where
        F: FnMut(&World, &TickTime) -> anyhow::Result<bool> + Send + 'static,
    {
        self.timers.schedule(delay_ms, repeat, callback)
    }

    /// Number of pending timers.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Sends `payload` to every player.
    pub fn broadcast(&self, payload: &Payload, priority: PacketPriority) {
        self.broadcast_filtered(payload, priority, |_| true);
    }

    /// Sends `payload` to every player within the default sight radius of `position`.
    pub fn broadcast_if_visible(&self, position: Vector2<f64>, payload: &Payload, priority: PacketPriority) {
        let radius_sq = f64::from(VISIBILITY_RADIUS).powi(2);
        self.broadcast_filtered(payload, priority, |player| {
            player.position().distance_squared(position) <= radius_sq
        });
    }

    /// Like [`World::broadcast_if_visible`], skipping `exclude`.
    pub fn broadcast_if_visible_exclude(
        &self,
        position: Vector2<f64>,
        exclude: EntityId,
        payload: &Payload,
        priority: PacketPriority,
    ) {
        let radius_sq = f64::from(VISIBILITY_RADIUS).powi(2);
        self.broadcast_filtered(payload, priority, |player| {
            player.id() != exclude && player.position().distance_squared(position) <= radius_sq
        });
    }

    /// Sends `payload` to one player, if it is in this world.
    pub fn broadcast_to_player(&self, player: EntityId, payload: &Payload, priority: PacketPriority) {
        if self
            .registry
            .get(player)
            .is_some_and(|e| e.category() == EntityCategory::Player && !e.is_removed())
        {
            self.transport.send(player, payload.clone(), priority);
        }
    }

    /// Sends `payload` to the listed players that are in this world.
    pub fn broadcast_to_players(&self, players: &[EntityId], payload: &Payload, priority: PacketPriority) {
        self.broadcast_filtered(payload, priority, |player| players.contains(&player.id()));
    }

    /// Fans `payload` out over a snapshot of the players, in parallel.
    fn broadcast_filtered<F>(&self, payload: &Payload, priority: PacketPriority, filter: F)
    where
        F: Fn(&Arc<Entity>) -> bool + Sync,
    {
        let players = self.players();
        players
            .par_iter()
            .filter(|player| !player.is_removed() && filter(*player))
            .for_each(|player| self.transport.send(player.id(), payload.clone(), priority));
    }
}
