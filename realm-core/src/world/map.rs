//! Static terrain of a world.
//!
//! Ground and object descriptors are immutable after load. What a tile holds can
//! change at runtime; each change bumps the tile's update count so viewers can
//! tell a stale tile from a fresh one without comparing contents.

use std::sync::atomic::{AtomicU32, Ordering};

use realm_utils::{TilePos, locks::SyncMutex};
use rustc_hash::FxHashMap;
use serde::Deserialize;

use super::registry;
use crate::{entity::EntityId, error::WorldError};

/// Ground descriptor.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GroundDesc {
    /// Nothing may walk on this ground.
    pub no_walk: bool,
}

/// Tile object descriptor.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ObjectDesc {
    /// Walls and similar objects that stop sight.
    pub blocks_sight: bool,
    /// Blocks movement across the whole tile.
    pub full_occupy: bool,
    /// Blocks enemies and players alike.
    pub enemy_occupy_square: bool,
    /// Blocks spawning on this tile.
    pub occupy_square: bool,
}

/// Descriptor tables shared by every tile of a map.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TileDescriptors {
    /// Ground descriptors by ground type.
    pub grounds: FxHashMap<u16, GroundDesc>,
    /// Object descriptors by object type.
    pub objects: FxHashMap<u16, ObjectDesc>,
}

/// Named map regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileRegion {
    /// Where players enter the world.
    Spawn,
    /// Where enemies are placed.
    Enemy,
    /// Shop slots.
    Store,
    /// Anything this core does not interpret.
    #[serde(other)]
    Other,
}

/// One tile in a [`MapLayout`].
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct TileSpec {
    /// Ground type.
    pub ground: u16,
    /// Object type placed on the tile, if any.
    #[serde(default)]
    pub object: Option<u16>,
}

/// A region marker in a [`MapLayout`].
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RegionSpec {
    /// Tile x.
    pub x: i32,
    /// Tile y.
    pub y: i32,
    /// Which region.
    pub region: TileRegion,
}

/// An initial entity in a [`MapLayout`].
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct EntitySpawn {
    /// Object type.
    pub object_type: u16,
    /// Spawn x.
    pub x: f64,
    /// Spawn y.
    pub y: f64,
}

/// A map as produced by the map loader or generator.
#[derive(Debug, Clone, Deserialize)]
pub struct MapLayout {
    /// Width in tiles.
    pub width: i32,
    /// Height in tiles.
    pub height: i32,
    /// Row-major tiles, `width * height` of them.
    pub tiles: Vec<TileSpec>,
    /// Region markers.
    #[serde(default)]
    pub regions: Vec<RegionSpec>,
    /// Entities to spawn when the world starts.
    #[serde(default)]
    pub entities: Vec<EntitySpawn>,
    /// Descriptor tables.
    #[serde(default)]
    pub descriptors: TileDescriptors,
}

impl MapLayout {
    /// Parses a JSON map.
    pub fn from_json(json: &str) -> Result<Self, WorldError> {
        serde_json::from_str(json).map_err(|err| WorldError::InvalidMap(err.to_string()))
    }

    /// A map of `width * height` tiles of `ground` with nothing on them.
    #[must_use]
    pub fn filled(width: i32, height: i32, ground: u16) -> Self {
        let count = (width.max(0) * height.max(0)) as usize;
        Self {
            width,
            height,
            tiles: vec![
                TileSpec {
                    ground,
                    object: None
                };
                count
            ],
            regions: Vec::new(),
            entities: Vec::new(),
            descriptors: TileDescriptors::default(),
        }
    }

    /// Places an object on a tile of the layout. Out of range tiles are ignored.
    pub fn place_object(&mut self, x: i32, y: i32, object: u16) {
        if (0..self.width).contains(&x) && (0..self.height).contains(&y) {
            self.tiles[(y * self.width + x) as usize].object = Some(object);
        }
    }
}

/// An object sitting on a tile, with its per-instance id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileObject {
    /// Object type.
    pub object_type: u16,
    /// Stable id of this placement, drawn from the entity id space.
    pub instance_id: EntityId,
}

/// A map tile.
#[derive(Debug)]
pub struct Tile {
    ground: u16,
    object: SyncMutex<Option<TileObject>>,
    update_count: AtomicU32,
}

impl Tile {
    fn new(ground: u16, object: Option<TileObject>) -> Self {
        Self {
            ground,
            object: SyncMutex::new(object),
            update_count: AtomicU32::new(1),
        }
    }

    /// Ground type.
    #[must_use]
    pub fn ground(&self) -> u16 {
        self.ground
    }

    /// The object on this tile.
    pub fn object(&self) -> Option<TileObject> {
        *self.object.lock()
    }

    /// Version of this tile's contents. Starts at 1, strictly increases.
    pub fn update_count(&self) -> u32 {
        self.update_count.load(Ordering::Acquire)
    }
}

/// The terrain of one world.
#[derive(Debug)]
pub struct WorldMap {
    width: i32,
    height: i32,
    tiles: Box<[Tile]>,
    descriptors: TileDescriptors,
    regions: Vec<(TilePos, TileRegion)>,
}

impl WorldMap {
    /// Builds the map. Every tile object gets an instance id from the shared
    /// entity id allocator.
    pub fn from_layout(layout: &MapLayout) -> Result<Self, WorldError> {
        if layout.width <= 0 || layout.height <= 0 {
            return Err(WorldError::InvalidMap(format!(
                "dimensions must be positive, got {}x{}",
                layout.width, layout.height
            )));
        }
        let expected = layout.width as usize * layout.height as usize;
        if layout.tiles.len() != expected {
            return Err(WorldError::InvalidMap(format!(
                "expected {expected} tiles, got {}",
                layout.tiles.len()
            )));
        }

        let object_count = layout.tiles.iter().filter(|t| t.object.is_some()).count();
        let mut next_id = registry::reserve_entity_ids(object_count).0;

        let tiles = layout
            .tiles
            .iter()
            .map(|spec| {
                let object = spec.object.map(|object_type| {
                    let instance_id = EntityId(next_id);
                    next_id += 1;
                    TileObject {
                        object_type,
                        instance_id,
                    }
                });
                Tile::new(spec.ground, object)
            })
            .collect();

        Ok(Self {
            width: layout.width,
            height: layout.height,
            tiles,
            descriptors: layout.descriptors.clone(),
            regions: layout
                .regions
                .iter()
                .map(|r| (TilePos::new(r.x, r.y), r.region))
                .collect(),
        })
    }

    /// Width in tiles.
    #[must_use]
    pub fn width(&self) -> i32 {
        self.width
    }

    /// Height in tiles.
    #[must_use]
    pub fn height(&self) -> i32 {
        self.height
    }

    /// Whether `pos` lies on the map.
    #[must_use]
    pub fn contains(&self, pos: TilePos) -> bool {
        (0..self.width).contains(&pos.x) && (0..self.height).contains(&pos.y)
    }

    /// Row-major index of `pos`, if it lies on the map.
    #[must_use]
    pub fn index_of(&self, pos: TilePos) -> Option<usize> {
        self.contains(pos)
            .then(|| (pos.y * self.width + pos.x) as usize)
    }

    /// The tile at `pos`.
    #[must_use]
    pub fn tile(&self, pos: TilePos) -> Option<&Tile> {
        self.index_of(pos).map(|i| &self.tiles[i])
    }

    /// Descriptor of an object type.
    #[must_use]
    pub fn object_desc(&self, object_type: u16) -> Option<&ObjectDesc> {
        self.descriptors.objects.get(&object_type)
    }

    /// Descriptor of a ground type.
    #[must_use]
    pub fn ground_desc(&self, ground: u16) -> Option<&GroundDesc> {
        self.descriptors.grounds.get(&ground)
    }

    /// Whether the object on `pos` stops sight. Off-map tiles never do.
    #[must_use]
    pub fn blocks_sight(&self, pos: TilePos) -> bool {
        self.tile(pos)
            .and_then(Tile::object)
            .and_then(|object| self.object_desc(object.object_type))
            .is_some_and(|desc| desc.blocks_sight)
    }

    /// Replaces the object on a tile, bumping its update count.
    ///
    /// A new object gets a fresh instance id, which is returned. Returns `None`
    /// when the object was cleared or `pos` is off the map.
    pub fn set_object(&self, pos: TilePos, object_type: Option<u16>) -> Option<EntityId> {
        let tile = self.tile(pos)?;
        let object = object_type.map(|object_type| TileObject {
            object_type,
            instance_id: registry::allocate_entity_id(),
        });

        *tile.object.lock() = object;
        tile.update_count.fetch_add(1, Ordering::AcqRel);
        object.map(|o| o.instance_id)
    }

    /// Region markers.
    #[must_use]
    pub fn regions(&self) -> &[(TilePos, TileRegion)] {
        &self.regions
    }

    /// Tiles marked as spawn points.
    #[must_use]
    pub fn spawn_points(&self) -> Vec<TilePos> {
        self.regions
            .iter()
            .filter(|(_, region)| *region == TileRegion::Spawn)
            .map(|(pos, _)| *pos)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WALL: u16 = 0x01;

    fn walled_layout() -> MapLayout {
        let mut layout = MapLayout::filled(8, 8, 0x10);
        layout.place_object(3, 3, WALL);
        layout.place_object(4, 3, WALL);
        layout.descriptors.objects.insert(
            WALL,
            ObjectDesc {
                blocks_sight: true,
                full_occupy: true,
                ..ObjectDesc::default()
            },
        );
        layout
    }

    #[test]
    fn test_rejects_wrong_tile_count() {
        let mut layout = MapLayout::filled(4, 4, 0);
        layout.tiles.pop();
        assert!(matches!(
            WorldMap::from_layout(&layout),
            Err(WorldError::InvalidMap(_))
        ));
    }

    #[test]
    fn test_objects_get_distinct_instance_ids() {
        let map = WorldMap::from_layout(&walled_layout()).expect("valid map");
        let a = map.tile(TilePos::new(3, 3)).and_then(Tile::object).expect("wall");
        let b = map.tile(TilePos::new(4, 3)).and_then(Tile::object).expect("wall");
        assert_ne!(a.instance_id, b.instance_id);
        assert!(!a.instance_id.is_none());
    }

    #[test]
    fn test_sight_blocking_and_bounds() {
        let map = WorldMap::from_layout(&walled_layout()).expect("valid map");
        assert!(map.blocks_sight(TilePos::new(3, 3)));
        assert!(!map.blocks_sight(TilePos::new(2, 3)));
        assert!(!map.blocks_sight(TilePos::new(-1, 3)));
        assert!(map.tile(TilePos::new(8, 0)).is_none());
    }

    #[test]
    fn test_update_count_strictly_increases() {
        let map = WorldMap::from_layout(&walled_layout()).expect("valid map");
        let pos = TilePos::new(3, 3);
        let before = map.tile(pos).map(Tile::update_count).expect("tile");
        assert_eq!(before, 1);

        assert_eq!(map.set_object(pos, None), None);
        let cleared = map.tile(pos).map(Tile::update_count).expect("tile");
        assert!(cleared > before);

        let id = map.set_object(pos, Some(WALL)).expect("new instance");
        let placed = map.tile(pos).map(Tile::update_count).expect("tile");
        assert!(placed > cleared);
        assert_eq!(map.tile(pos).and_then(Tile::object).map(|o| o.instance_id), Some(id));
    }

    #[test]
    fn test_parses_json_layout() {
        let layout = MapLayout::from_json(
            r#"{
                "width": 2,
                "height": 1,
                "tiles": [{ "ground": 1 }, { "ground": 1, "object": 5 }],
                "regions": [{ "x": 0, "y": 0, "region": "spawn" }],
                "descriptors": { "objects": { "5": { "blocks_sight": true } } }
            }"#,
        )
        .expect("valid json");

        let map = WorldMap::from_layout(&layout).expect("valid map");
        assert!(map.blocks_sight(TilePos::new(1, 0)));
        assert_eq!(map.spawn_points(), vec![TilePos::new(0, 0)]);
    }
}
