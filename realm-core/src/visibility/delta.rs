//! What a viewer is sent after a tick.

use realm_utils::math::Vector2;
use serde::Serialize;

use crate::entity::{EntityCategory, EntityId, StatKind, StatValue};

/// A tile the client has not seen at its current version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TileData {
    /// Tile x.
    pub x: i32,
    /// Tile y.
    pub y: i32,
    /// Ground type.
    pub ground: u16,
}

/// Full definition of an object that just became visible.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectDef {
    /// Entity id, or the instance id of a static map object.
    pub id: EntityId,
    /// Object type.
    pub object_type: u16,
    /// Category.
    pub category: EntityCategory,
    /// Current position.
    pub position: Vector2<f64>,
    /// Every known stat.
    pub stats: Vec<(StatKind, StatValue)>,
}

/// The stat changes of one object, with its live position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectStats {
    /// The object.
    pub id: EntityId,
    /// Where it is this tick.
    pub position: Vector2<f64>,
    /// Changed stats, latest value per kind.
    pub stats: Vec<(StatKind, StatValue)>,
}

/// Everything one viewer learns in one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ViewerDelta {
    /// Per-viewer sequence number, incremented on every flushed delta.
    pub tick_id: u32,
    /// Length of the tick that produced this delta, in milliseconds.
    pub tick_time_ms: i64,
    /// New or changed tiles.
    pub tiles: Vec<TileData>,
    /// Objects that became visible.
    pub new_objects: Vec<ObjectDef>,
    /// Objects that left view or the world.
    pub drops: Vec<EntityId>,
    /// Stat changes of tracked objects.
    pub stats: Vec<ObjectStats>,
}

impl ViewerDelta {
    /// True if there is nothing to send.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
            && self.new_objects.is_empty()
            && self.drops.is_empty()
            && self.stats.is_empty()
    }

    /// The definition of `id` among the new objects.
    #[must_use]
    pub fn new_object(&self, id: EntityId) -> Option<&ObjectDef> {
        self.new_objects.iter().find(|def| def.id == id)
    }
}
