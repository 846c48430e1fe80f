//! This module contains the implementation of the world's entity lifecycle methods.
use std::sync::{Arc, atomic::Ordering};

use realm_utils::math::Vector2;

use crate::{
    entity::{Entity, EntityFactory, EntityId, EntityKind},
    error::WorldError,
    ticks::{Fault, run_isolated},
    world::{CollisionDomain, CollisionMap, MapLayout, World, WorldStatus},
};

impl World {
    /// Admits `entity`, assigning its id.
    ///
    /// Players, pets and decoys are filed in the player collision map; enemies
    /// and the remaining static objects in the enemy collision map. Projectiles
    /// and containers are not spatially indexed.
    pub fn enter_world(&self, entity: Arc<Entity>) -> Result<EntityId, WorldError> {
        if self.status() == WorldStatus::Destroyed {
            return Err(WorldError::WorldClosed);
        }

        let id = self.registry.enter(entity.clone())?;
        match entity.kind() {
            EntityKind::Player(data) => {
                self.players_collision.insert(&entity);
                data.viewer.lock().request_tile_refresh();
                self.total_connects.fetch_add(1, Ordering::Relaxed);
                log::debug!("Player {id} (account {}) entered {}", data.account_id, self.name());
            }
            EntityKind::Pet { owner } => {
                self.players_collision.insert(&entity);
                if let Some(owner) = self.registry.get(*owner)
                    && let Some(data) = owner.player()
                {
                    data.set_pet(Some(id));
                }
            }
            EntityKind::Enemy => self.enemies_collision.insert(&entity),
            EntityKind::StaticObject => self.static_collision(&entity).insert(&entity),
            EntityKind::Projectile { .. } | EntityKind::Container { .. } => {}
        }

        log::trace!("{:?} {id} entered {}", entity.category(), self.name());
        Ok(id)
    }

    /// Removes `entity` from the world.
    ///
    /// Category side effects run before the entity is marked removed: a player
    /// cancels its trade and takes its pet along, a pet unlinks from its owner.
    /// Returns false if the entity was not in this world, so a repeated call is
    /// a no-op.
    pub fn leave_world(&self, entity: &Arc<Entity>) -> bool {
        if self.registry.leave(entity).is_none() {
            return false;
        }

        match entity.kind() {
            EntityKind::Player(data) => {
                self.cancel_trade(entity);
                if let Some(pet) = data.pet().and_then(|pet| self.registry.get(pet)) {
                    self.leave_world(&pet);
                }
                data.set_pet(None);
                self.players_collision.remove(entity);
                data.viewer.lock().reset();
                log::debug!("Player {} left {}", entity.id(), self.name());
            }
            EntityKind::Pet { owner } => {
                self.players_collision.remove(entity);
                if let Some(owner) = self.registry.get(*owner)
                    && let Some(data) = owner.player()
                {
                    data.clear_pet(entity.id());
                }
            }
            EntityKind::Enemy => self.enemies_collision.remove(entity),
            EntityKind::StaticObject => self.static_collision(entity).remove(entity),
            EntityKind::Projectile { .. } | EntityKind::Container { .. } => {}
        }

        entity.mark_removed();
        log::trace!("{:?} {} left {}", entity.category(), entity.id(), self.name());
        true
    }

    /// Moves `entity` to `(x, y)` and re-files it in its collision map.
    ///
    /// A player whose tile changed gets its active tiles recomputed on the next
    /// visibility pass.
    pub fn move_entity(&self, entity: &Arc<Entity>, x: f64, y: f64) {
        let old_tile = entity.tile();
        entity.set_position(Vector2::new(x, y));

        match entity.kind() {
            EntityKind::Player(data) => {
                self.players_collision.relocate(entity);
                if entity.tile() != old_tile {
                    data.viewer.lock().request_tile_refresh();
                }
            }
            EntityKind::Pet { .. } => self.players_collision.relocate(entity),
            EntityKind::Enemy => self.enemies_collision.relocate(entity),
            EntityKind::StaticObject => self.static_collision(entity).relocate(entity),
            EntityKind::Projectile { .. } | EntityKind::Container { .. } => {}
        }
    }

    /// Looks a resident entity up by id.
    #[must_use]
    pub fn get_entity(&self, id: EntityId) -> Option<Arc<Entity>> {
        self.registry.get(id)
    }

    /// Looks a projectile up by its owner and per-owner id.
    #[must_use]
    pub fn get_projectile(&self, owner: EntityId, projectile_id: u8) -> Option<Arc<Entity>> {
        self.registry.projectile(owner, projectile_id)
    }

    /// Breaks off the trade `player` is in, on both sides.
    pub fn cancel_trade(&self, player: &Entity) {
        let Some(data) = player.player() else {
            return;
        };
        let Some(partner) = data.trade_partner() else {
            return;
        };
        data.set_trade_partner(None);

        if let Some(partner) = self.registry.get(partner)
            && let Some(partner_data) = partner.player()
            && partner_data.trade_partner() == Some(player.id())
        {
            partner_data.set_trade_partner(None);
        }
        log::debug!("Trade between {} and {partner} cancelled", player.id());
    }

    /// Builds and admits the entities listed in `layout`.
    ///
    /// A spawn the factory fails on is logged and skipped. Returns how many
    /// entities were admitted.
    pub fn spawn_initial_entities(
        &self,
        layout: &MapLayout,
        factory: &dyn EntityFactory,
    ) -> Result<usize, WorldError> {
        let mut spawned = 0;
        for spawn in &layout.entities {
            match run_isolated(|| factory.create(spawn)) {
                Ok(Some(entity)) => {
                    self.enter_world(Arc::new(entity))?;
                    spawned += 1;
                }
                Ok(None) => {}
                Err(Fault::Error(err)) => {
                    log::warn!(
                        "Skipping spawn of {:#06x} at ({}, {}): {err:#}",
                        spawn.object_type,
                        spawn.x,
                        spawn.y
                    );
                }
                Err(fault @ Fault::Panic(_)) => {
                    log::warn!("Skipping spawn of {:#06x}: factory {fault}", spawn.object_type);
                }
            }
        }
        log::info!("Spawned {spawned} initial entities in {}", self.name());
        Ok(spawned)
    }

    /// Decoys collide like players.
    fn static_collision(&self, entity: &Entity) -> &CollisionMap {
        if entity.is_decoy() {
            self.collision(CollisionDomain::Players)
        } else {
            self.collision(CollisionDomain::Enemies)
        }
    }
}
