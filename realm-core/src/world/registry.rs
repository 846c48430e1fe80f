//! Entity registry: one concurrent map per category.
//!
//! Ids come from a single process-wide counter shared by every world and by
//! static map objects, so an id is never handed out twice while the process runs.

use std::sync::{
    Arc,
    atomic::{AtomicI32, Ordering},
};

use scc::HashMap;

use crate::{
    entity::{Entity, EntityCategory, EntityFlags, EntityId, EntityKind},
    error::WorldError,
};

static NEXT_ENTITY_ID: AtomicI32 = AtomicI32::new(0);

/// Allocates a new process-unique entity id.
pub fn allocate_entity_id() -> EntityId {
    EntityId(NEXT_ENTITY_ID.fetch_add(1, Ordering::Relaxed) + 1)
}

/// Reserves `count` consecutive ids and returns the first one.
pub(crate) fn reserve_entity_ids(count: usize) -> EntityId {
    let count = i32::try_from(count).unwrap_or(i32::MAX);
    EntityId(NEXT_ENTITY_ID.fetch_add(count, Ordering::Relaxed) + 1)
}

type EntityMap = HashMap<EntityId, Arc<Entity>>;

/// Owns every entity resident in one world.
#[derive(Default)]
pub struct EntityRegistry {
    players: EntityMap,
    enemies: EntityMap,
    pets: EntityMap,
    projectiles: EntityMap,
    containers: EntityMap,
    static_objects: EntityMap,
    quests: EntityMap,
    special_enemies: EntityMap,
    /// (owner, per-owner projectile id) -> projectile entity id.
    projectile_keys: HashMap<(EntityId, u8), EntityId>,
}

impl EntityRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self, category: EntityCategory) -> &EntityMap {
        match category {
            EntityCategory::Player => &self.players,
            EntityCategory::Enemy => &self.enemies,
            EntityCategory::Pet => &self.pets,
            EntityCategory::Projectile => &self.projectiles,
            EntityCategory::Container => &self.containers,
            EntityCategory::StaticObject => &self.static_objects,
        }
    }

    /// Assigns an id to `entity` and files it under its category.
    ///
    /// An entity that already carries an id is rejected.
    pub fn enter(&self, entity: Arc<Entity>) -> Result<EntityId, WorldError> {
        if !entity.id().is_none() {
            return Err(WorldError::DuplicateEntity(entity.id()));
        }

        let id = allocate_entity_id();
        entity.assign_id(id)?;

        let category = entity.category();
        if category == EntityCategory::Enemy {
            if entity.flags().contains(EntityFlags::SPECIAL_ENEMY) {
                let _ = self.special_enemies.insert_sync(id, entity.clone());
            }
            if entity.flags().contains(EntityFlags::QUEST) {
                let _ = self.quests.insert_sync(id, entity.clone());
            }
        }
        if let EntityKind::Projectile {
            owner,
            projectile_id,
        } = *entity.kind()
        {
            let key = (owner, projectile_id);
            let _ = self.projectile_keys.remove_sync(&key);
            let _ = self.projectile_keys.insert_sync(key, id);
        }

        self.map(category)
            .insert_sync(id, entity)
            .map_err(|(id, _)| WorldError::DuplicateEntity(id))?;
        Ok(id)
    }

    /// Removes `entity`. Returns `None` if it was not registered, which makes a
    /// second call for the same entity a no-op.
    pub fn leave(&self, entity: &Entity) -> Option<Arc<Entity>> {
        let id = entity.id();
        let (_, removed) = self.map(entity.category()).remove_sync(&id)?;

        match *removed.kind() {
            EntityKind::Enemy => {
                let _ = self.special_enemies.remove_sync(&id);
                let _ = self.quests.remove_sync(&id);
            }
            EntityKind::Projectile {
                owner,
                projectile_id,
            } => {
                let _ = self
                    .projectile_keys
                    .remove_if_sync(&(owner, projectile_id), |current| *current == id);
            }
            _ => {}
        }
        Some(removed)
    }

    /// Looks an entity up by id across all categories.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<Arc<Entity>> {
        [
            EntityCategory::Player,
            EntityCategory::Enemy,
            EntityCategory::StaticObject,
            EntityCategory::Container,
            EntityCategory::Pet,
            EntityCategory::Projectile,
        ]
        .into_iter()
        .find_map(|category| self.map(category).read_sync(&id, |_, e| e.clone()))
    }

    /// Looks a projectile up by its owner and per-owner id.
    #[must_use]
    pub fn projectile(&self, owner: EntityId, projectile_id: u8) -> Option<Arc<Entity>> {
        let id = self
            .projectile_keys
            .read_sync(&(owner, projectile_id), |_, id| *id)?;
        self.projectiles.read_sync(&id, |_, e| e.clone())
    }

    /// A snapshot of every entity in `category`.
    #[must_use]
    pub fn all_of_category(&self, category: EntityCategory) -> Vec<Arc<Entity>> {
        snapshot(self.map(category))
    }

    /// A snapshot of the quest enemies.
    #[must_use]
    pub fn quests(&self) -> Vec<Arc<Entity>> {
        snapshot(&self.quests)
    }

    /// A snapshot of the special enemies.
    #[must_use]
    pub fn special_enemies(&self) -> Vec<Arc<Entity>> {
        snapshot(&self.special_enemies)
    }

    /// Number of entities in `category`.
    #[must_use]
    pub fn count(&self, category: EntityCategory) -> usize {
        self.map(category).len()
    }

    /// Total number of residents.
    #[must_use]
    pub fn len(&self) -> usize {
        EntityCategory::TICK_ORDER
            .into_iter()
            .map(|category| self.count(category))
            .sum()
    }

    /// Returns true if no entity is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn snapshot(map: &EntityMap) -> Vec<Arc<Entity>> {
    let mut entities = Vec::with_capacity(map.len());
    map.iter_sync(|_, entity| {
        entities.push(entity.clone());
        true
    });
    entities
}
