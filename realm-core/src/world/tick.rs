//! One world step and the world's lifetime policy.
//!
//! A step runs the categories in a fixed order so later ones observe what
//! earlier ones did in the same step: static objects, containers, pets,
//! projectiles, players, enemies near players, then timers. The visibility
//! pass follows, then the expiry check.
use std::sync::{Arc, atomic::Ordering};

use rayon::prelude::*;
use rustc_hash::FxHashSet;
use realm_utils::{TilePos, math::Vector2};

use crate::{
    entity::{Entity, EntityCategory, PlayerInput},
    error::WorldError,
    ticks::{Fault, TickTime, run_isolated},
    world::{World, WorldStatus},
};

/// Categories ticked before players, in order.
const PRE_PLAYER_ORDER: [EntityCategory; 4] = [
    EntityCategory::StaticObject,
    EntityCategory::Container,
    EntityCategory::Pet,
    EntityCategory::Projectile,
];

impl World {
    /// Advances the world by one step.
    ///
    /// Faults of single entity ticks and timers are logged and contained.
    /// Invariant violations, including a [`WorldError`] surfacing from a
    /// behavior, end the step with an error and the world should be destroyed.
    pub fn update(&self, time: &TickTime) -> Result<WorldStatus, WorldError> {
        match self.status() {
            WorldStatus::Destroyed => return Err(WorldError::WorldClosed),
            WorldStatus::Expiring => return Ok(WorldStatus::Expiring),
            WorldStatus::Active => {}
        }
        // A world with live branches outlives its close flag.
        if self.force_close.load(Ordering::Acquire) && self.branches() == 0 {
            log::info!("World {} flagged for close", self.name());
            self.set_status(WorldStatus::Expiring);
            return Ok(WorldStatus::Expiring);
        }

        self.age_ms.fetch_add(time.elapsed_ms_delta, Ordering::Relaxed);

        for category in PRE_PLAYER_ORDER {
            for entity in self.registry.all_of_category(category) {
                self.tick_entity(&entity, time)?;
            }
        }
        for player in self.players() {
            self.tick_player(&player, time)?;
        }
        self.tick_active_enemies(time)?;
        self.timers.process(self, time);
        if self.status() == WorldStatus::Destroyed {
            return Err(WorldError::WorldClosed);
        }

        self.update_visibility(time);

        Ok(self.check_expiry(time))
    }

    fn tick_player(&self, player: &Arc<Entity>, time: &TickTime) -> Result<(), WorldError> {
        if player.is_removed() {
            return Ok(());
        }
        let Some(data) = player.player() else {
            return Ok(());
        };

        for input in data.drain_input() {
            match input {
                PlayerInput::Move { x, y } => {
                    let tile = TilePos::containing(Vector2::new(x, y));
                    if x >= 0.0 && y >= 0.0 && self.is_passable(tile.x, tile.y, false) {
                        self.move_entity(player, x, y);
                    } else {
                        log::trace!("Rejected move of {} to ({x}, {y})", player.id());
                    }
                }
            }
        }

        for action in data.take_pending_actions() {
            if player.is_removed() {
                break;
            }
            if let Err(fault) = run_isolated(|| {
                action(self, player, time);
                Ok(())
            }) {
                log::error!("Pending action of player {} {fault}", player.id());
            }
        }

        self.tick_entity(player, time)
    }

    /// Ticks the enemies in regions within reach of a player. With no players
    /// nothing is ticked.
    fn tick_active_enemies(&self, time: &TickTime) -> Result<(), WorldError> {
        if self.player_count() == 0 {
            return Ok(());
        }
        let regions = self
            .enemies_collision
            .active_regions(&self.players_collision, self.settings.active_region_radius);

        // Snapshot first: a behavior may move an enemy into a region not yet visited.
        let mut seen = FxHashSet::default();
        let mut active = Vec::new();
        for region in regions {
            for entity in self.enemies_collision.region_entities(region) {
                if entity.category() == EntityCategory::Enemy && seen.insert(entity.id()) {
                    active.push(entity);
                }
            }
        }
        for entity in &active {
            self.tick_entity(entity, time)?;
        }
        Ok(())
    }

    fn tick_entity(&self, entity: &Arc<Entity>, time: &TickTime) -> Result<(), WorldError> {
        if entity.is_removed() {
            return Ok(());
        }
        let Some(behavior) = entity.behavior() else {
            return Ok(());
        };

        match run_isolated(|| behavior.tick(self, entity, time)) {
            Ok(()) => Ok(()),
            Err(Fault::Error(err)) => match err.downcast::<WorldError>() {
                Ok(fatal) => Err(fatal),
                Err(err) => {
                    log::error!(
                        "Tick of {:?} {} failed: {err:#}",
                        entity.category(),
                        entity.id()
                    );
                    Ok(())
                }
            },
            Err(fault @ Fault::Panic(_)) => {
                log::error!("Tick of {:?} {} {fault}", entity.category(), entity.id());
                Ok(())
            }
        }
    }

    /// Diffs every viewer against the world and hands the deltas to the
    /// transport. Each worker touches only its own viewer's state.
    fn update_visibility(&self, time: &TickTime) {
        let stat_events = std::mem::take(&mut *self.stat_events.lock());
        let players = self.players();

        players.par_iter().for_each(|player| {
            if player.is_removed() {
                return;
            }
            let Some(data) = player.player() else {
                return;
            };
            let delta = data
                .viewer
                .lock()
                .update(self, player, &stat_events, time);
            if let Some(delta) = delta {
                self.transport.send_delta(player.id(), delta);
            }
        });
    }

    fn check_expiry(&self, time: &TickTime) -> WorldStatus {
        if self.settings.persist || self.player_count() > 0 || self.branches() > 0 {
            self.idle_ms.store(0, Ordering::Relaxed);
            return WorldStatus::Active;
        }

        let idle = self.idle_ms.fetch_add(time.elapsed_ms_delta, Ordering::Relaxed)
            + time.elapsed_ms_delta;
        if idle < self.settings.idle_expiry_ms {
            return WorldStatus::Active;
        }

        log::info!("World {} expired after {idle}ms without players", self.name());
        self.set_status(WorldStatus::Expiring);
        WorldStatus::Expiring
    }

    /// Tears the world down. Every resident leaves, with its leave hooks, and
    /// pending timers are dropped. Further updates fail with
    /// [`WorldError::WorldClosed`].
    pub fn destroy(&self) {
        if self.status() == WorldStatus::Destroyed {
            return;
        }

        self.set_status(WorldStatus::Destroyed);

        let mut evicted = 0;
        for category in EntityCategory::TICK_ORDER {
            for entity in self.registry.all_of_category(category) {
                if self.leave_world(&entity) {
                    evicted += 1;
                }
            }
        }

        self.timers.clear();
        self.stat_events.lock().clear();
        self.players_collision.clear();
        self.enemies_collision.clear();
        log::info!(
            "Destroyed world {} after {}ms ({evicted} entities evicted)",
            self.name(),
            self.get_age()
        );
    }
}
