//! Entity model.
//!
//! An entity is one of a closed set of categories. Category specific state lives
//! in [`EntityKind`], so lifecycle code matches on the kind instead of probing
//! types at runtime.

pub mod player;
pub mod stats;

pub use player::{PendingAction, PlayerData, PlayerInput};
pub use stats::{StatChange, StatKind, StatValue};

use std::{
    fmt::{self, Display},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicI32, Ordering},
    },
};

use bitflags::bitflags;
use realm_utils::{TilePos, locks::SyncMutex, math::Vector2};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::{
    error::WorldError, ticks::TickTime, visibility::ObjectDef, world::World,
    world::map::EntitySpawn,
};

/// Process-unique entity identifier. `0` means "not assigned".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub i32);

impl EntityId {
    /// The unassigned id.
    pub const NONE: Self = Self(0);

    /// Whether this is the unassigned id.
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    pub(crate) fn from_raw(raw: i32) -> Option<Self> {
        (raw != 0).then_some(Self(raw))
    }
}

impl Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The mutually exclusive entity categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityCategory {
    /// A connected player.
    Player,
    /// A hostile or neutral mob.
    Enemy,
    /// A player's companion.
    Pet,
    /// A bullet.
    Projectile,
    /// A loot bag.
    Container,
    /// A non-moving object such as a portal, sign or decoy.
    StaticObject,
}

impl EntityCategory {
    /// All categories, in tick order.
    pub const TICK_ORDER: [Self; 6] = [
        Self::StaticObject,
        Self::Container,
        Self::Pet,
        Self::Projectile,
        Self::Player,
        Self::Enemy,
    ];
}

bitflags! {
    /// Descriptor flags that change how the world files an entity.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct EntityFlags: u8 {
        /// A static object that collides like a player.
        const DECOY = 1;
        /// A quest target.
        const QUEST = 1 << 1;
        /// An enemy tracked in the special enemy set.
        const SPECIAL_ENEMY = 1 << 2;
    }
}

/// Category specific entity state.
pub enum EntityKind {
    /// A connected player with its session state.
    Player(Box<PlayerData>),
    /// An enemy.
    Enemy,
    /// A pet following `owner`.
    Pet {
        /// The owning player.
        owner: EntityId,
    },
    /// A projectile, also addressable by its owner and per-owner id.
    Projectile {
        /// The entity that fired it.
        owner: EntityId,
        /// Per-owner projectile id.
        projectile_id: u8,
    },
    /// A loot bag.
    Container {
        /// Account ids allowed to see the bag. Empty means public.
        owners: Vec<i32>,
    },
    /// A static object.
    StaticObject,
}

impl EntityKind {
    /// The category of this kind.
    #[must_use]
    pub fn category(&self) -> EntityCategory {
        match self {
            Self::Player(_) => EntityCategory::Player,
            Self::Enemy => EntityCategory::Enemy,
            Self::Pet { .. } => EntityCategory::Pet,
            Self::Projectile { .. } => EntityCategory::Projectile,
            Self::Container { .. } => EntityCategory::Container,
            Self::StaticObject => EntityCategory::StaticObject,
        }
    }
}

/// Game logic of an entity. Implemented outside the core.
pub trait Behavior: Send + Sync {
    /// Advances `entity` by one tick.
    ///
    /// May call back into the world: post stat changes, admit or remove entities,
    /// move entities. Errors and panics are contained to this entity's tick.
    fn tick(&self, world: &World, entity: &Arc<Entity>, time: &TickTime) -> anyhow::Result<()>;
}

/// Builds the entities listed in a map layout.
pub trait EntityFactory {
    /// Creates the entity for a spawn entry, or `None` to skip it.
    fn create(&self, spawn: &EntitySpawn) -> anyhow::Result<Option<Entity>>;
}

/// A live entity.
pub struct Entity {
    id: AtomicI32,
    object_type: u16,
    kind: EntityKind,
    flags: EntityFlags,
    position: SyncMutex<Vector2<f64>>,
    removed: AtomicBool,
    stats: SyncMutex<FxHashMap<StatKind, StatValue>>,
    behavior: Option<Arc<dyn Behavior>>,
}

impl Entity {
    /// Creates an entity that has not entered a world yet.
    #[must_use]
    pub fn new(kind: EntityKind, object_type: u16, x: f64, y: f64) -> Self {
        Self {
            id: AtomicI32::new(0),
            object_type,
            kind,
            flags: EntityFlags::empty(),
            position: SyncMutex::new(Vector2::new(x, y)),
            removed: AtomicBool::new(false),
            stats: SyncMutex::new(FxHashMap::default()),
            behavior: None,
        }
    }

    /// Creates a player entity for `account_id`.
    #[must_use]
    pub fn player(object_type: u16, account_id: i32, x: f64, y: f64) -> Self {
        Self::new(
            EntityKind::Player(Box::new(PlayerData::new(account_id))),
            object_type,
            x,
            y,
        )
    }

    /// Creates an enemy.
    #[must_use]
    pub fn enemy(object_type: u16, x: f64, y: f64) -> Self {
        Self::new(EntityKind::Enemy, object_type, x, y)
    }

    /// Creates a pet owned by `owner`.
    #[must_use]
    pub fn pet(object_type: u16, owner: EntityId, x: f64, y: f64) -> Self {
        Self::new(EntityKind::Pet { owner }, object_type, x, y)
    }

    /// Creates a projectile fired by `owner`.
    #[must_use]
    pub fn projectile(object_type: u16, owner: EntityId, projectile_id: u8, x: f64, y: f64) -> Self {
        Self::new(
            EntityKind::Projectile {
                owner,
                projectile_id,
            },
            object_type,
            x,
            y,
        )
    }

    /// Creates a loot bag visible to `owners`, or to everyone when empty.
    #[must_use]
    pub fn container(object_type: u16, owners: Vec<i32>, x: f64, y: f64) -> Self {
        Self::new(EntityKind::Container { owners }, object_type, x, y)
    }

    /// Creates a static object.
    #[must_use]
    pub fn static_object(object_type: u16, x: f64, y: f64) -> Self {
        Self::new(EntityKind::StaticObject, object_type, x, y)
    }

    /// Attaches the game logic driving this entity.
    #[must_use]
    pub fn with_behavior(mut self, behavior: Arc<dyn Behavior>) -> Self {
        self.behavior = Some(behavior);
        self
    }

    /// Sets descriptor flags.
    #[must_use]
    pub fn with_flags(mut self, flags: EntityFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Sets an initial stat value without posting a change.
    #[must_use]
    pub fn with_stat(self, kind: StatKind, value: impl Into<StatValue>) -> Self {
        self.stats.lock().insert(kind, value.into());
        self
    }

    /// The entity's id, [`EntityId::NONE`] before it entered a world.
    pub fn id(&self) -> EntityId {
        EntityId(self.id.load(Ordering::Acquire))
    }

    pub(crate) fn assign_id(&self, id: EntityId) -> Result<(), WorldError> {
        self.id
            .compare_exchange(0, id.0, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|existing| WorldError::DuplicateEntity(EntityId(existing)))
    }

    /// The object type from the game data.
    #[must_use]
    pub fn object_type(&self) -> u16 {
        self.object_type
    }

    /// Category specific state.
    #[must_use]
    pub fn kind(&self) -> &EntityKind {
        &self.kind
    }

    /// The entity category.
    #[must_use]
    pub fn category(&self) -> EntityCategory {
        self.kind.category()
    }

    /// Descriptor flags.
    #[must_use]
    pub fn flags(&self) -> EntityFlags {
        self.flags
    }

    /// Whether this is a decoy, filed with player-like entities for collision.
    #[must_use]
    pub fn is_decoy(&self) -> bool {
        self.category() == EntityCategory::StaticObject && self.flags.contains(EntityFlags::DECOY)
    }

    /// Player session state, for player entities.
    #[must_use]
    pub fn player(&self) -> Option<&PlayerData> {
        match &self.kind {
            EntityKind::Player(data) => Some(data),
            _ => None,
        }
    }

    /// The owner of a pet or projectile.
    #[must_use]
    pub fn owner(&self) -> Option<EntityId> {
        match self.kind {
            EntityKind::Pet { owner } | EntityKind::Projectile { owner, .. } => Some(owner),
            _ => None,
        }
    }

    /// The game logic driving this entity.
    #[must_use]
    pub fn behavior(&self) -> Option<&Arc<dyn Behavior>> {
        self.behavior.as_ref()
    }

    /// Current continuous position.
    pub fn position(&self) -> Vector2<f64> {
        *self.position.lock()
    }

    /// The tile under the entity.
    pub fn tile(&self) -> TilePos {
        TilePos::containing(self.position())
    }

    /// Writes the position. Indexed entities must be moved through the world.
    pub(crate) fn set_position(&self, pos: Vector2<f64>) {
        *self.position.lock() = pos;
    }

    /// Whether the entity has left its world.
    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    pub(crate) fn mark_removed(&self) {
        self.removed.store(true, Ordering::Release);
    }

    /// Current value of a stat.
    pub fn stat(&self, kind: StatKind) -> Option<StatValue> {
        self.stats.lock().get(&kind).cloned()
    }

    /// Sets a stat and posts the change to the world's viewers.
    pub fn set_stat(&self, world: &World, kind: StatKind, value: impl Into<StatValue>, self_only: bool) {
        let value = value.into();
        self.stats.lock().insert(kind, value.clone());
        world.post_stat_change(self, kind, value, self_only);
    }

    /// Full definition sent to a client that starts tracking this entity.
    pub fn to_definition(&self) -> ObjectDef {
        let mut stats: Vec<_> = self
            .stats
            .lock()
            .iter()
            .map(|(kind, value)| (*kind, value.clone()))
            .collect();
        stats.sort_by_key(|(kind, _)| *kind);

        ObjectDef {
            id: self.id(),
            object_type: self.object_type,
            category: self.category(),
            position: self.position(),
            stats,
        }
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id())
            .field("category", &self.category())
            .field("object_type", &self.object_type)
            .field("position", &self.position())
            .field("removed", &self.is_removed())
            .finish_non_exhaustive()
    }
}
