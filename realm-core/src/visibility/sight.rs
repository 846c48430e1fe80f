//! Sight tables and the three tile visibility policies.

use std::sync::{Arc, LazyLock};

use realm_utils::{BitSet, TilePos, locks::SyncMutex};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::world::{BlockingMode, map::WorldMap};

/// Tables built so far, by radius.
static SHARED_SIGHT: LazyLock<SyncMutex<FxHashMap<u32, Arc<SightTable>>>> =
    LazyLock::new(|| SyncMutex::new(FxHashMap::default()));

const NEIGHBOURS: [(i32, i32); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Precomputed tile offsets for one sight radius. Immutable once built.
#[derive(Debug)]
pub struct SightTable {
    radius: i32,
    /// Every offset within the radius.
    disk: Box<[(i32, i32)]>,
    /// The outer ring of the disk, used as ray targets.
    circumference: Box<[(i32, i32)]>,
}

impl SightTable {
    /// Builds the table for `radius` tiles.
    #[must_use]
    pub fn new(radius: u32) -> Self {
        let radius = i32::try_from(radius).unwrap_or(i32::MAX).min(1024);
        let outer = radius * radius;
        let inner = (radius - 2).max(0).pow(2);

        let mut disk = Vec::new();
        let mut circumference = Vec::new();
        for y in -radius..=radius {
            for x in -radius..=radius {
                let dist = x * x + y * y;
                if dist <= outer {
                    disk.push((x, y));
                    if dist > inner {
                        circumference.push((x, y));
                    }
                }
            }
        }

        Self {
            radius,
            disk: disk.into_boxed_slice(),
            circumference: circumference.into_boxed_slice(),
        }
    }

    /// The table for `radius`, built once per process and shared.
    #[must_use]
    pub fn shared(radius: u32) -> Arc<Self> {
        SHARED_SIGHT
            .lock()
            .entry(radius)
            .or_insert_with(|| Arc::new(Self::new(radius)))
            .clone()
    }

    /// Sight radius in tiles.
    #[must_use]
    pub fn radius(&self) -> i32 {
        self.radius
    }

    /// Offsets within the radius.
    #[must_use]
    pub fn disk(&self) -> &[(i32, i32)] {
        &self.disk
    }

    /// Offsets on the edge of the radius.
    #[must_use]
    pub fn circumference(&self) -> &[(i32, i32)] {
        &self.circumference
    }

    /// The on-map tiles visible from `origin` under `mode`.
    #[must_use]
    pub fn visible_tiles(
        &self,
        map: &WorldMap,
        origin: TilePos,
        mode: BlockingMode,
    ) -> FxHashSet<TilePos> {
        if !map.contains(origin) {
            return FxHashSet::default();
        }
        match mode {
            BlockingMode::Open => self.open(map, origin),
            BlockingMode::LineOfSight => self.line_of_sight(map, origin),
            BlockingMode::Path => self.path(map, origin),
        }
    }

    fn open(&self, map: &WorldMap, origin: TilePos) -> FxHashSet<TilePos> {
        self.disk
            .iter()
            .map(|&(dx, dy)| origin.offset(dx, dy))
            .filter(|&pos| map.contains(pos))
            .collect()
    }

    fn line_of_sight(&self, map: &WorldMap, origin: TilePos) -> FxHashSet<TilePos> {
        let mut visible = FxHashSet::default();
        visible.insert(origin);
        for &(dx, dy) in &self.circumference {
            draw_line(origin, origin.offset(dx, dy), |pos| {
                if !map.contains(pos) {
                    return false;
                }
                visible.insert(pos);
                !map.blocks_sight(pos)
            });
        }
        visible
    }

    fn path(&self, map: &WorldMap, origin: TilePos) -> FxHashSet<TilePos> {
        let radius_sq = self.radius * self.radius;
        let mut visited = BitSet::with_capacity(map.width() as usize * map.height() as usize);
        let mut visible = FxHashSet::default();
        let mut stack = Vec::with_capacity(self.disk.len());

        if let Some(index) = map.index_of(origin) {
            visited.insert(index);
            stack.push(origin);
        }

        while let Some(pos) = stack.pop() {
            visible.insert(pos);
            if map.blocks_sight(pos) {
                continue;
            }
            for (dx, dy) in NEIGHBOURS {
                let next = pos.offset(dx, dy);
                let (ox, oy) = (next.x - origin.x, next.y - origin.y);
                if ox * ox + oy * oy > radius_sq {
                    continue;
                }
                if let Some(index) = map.index_of(next)
                    && visited.insert(index)
                {
                    stack.push(next);
                }
            }
        }
        visible
    }
}

/// Walks the tiles from `from` to `to` (Bresenham), calling `visit` on each.
/// Stops early when `visit` returns false.
fn draw_line(from: TilePos, to: TilePos, mut visit: impl FnMut(TilePos) -> bool) {
    let dx = (to.x - from.x).abs();
    let dy = -(to.y - from.y).abs();
    let sx = if from.x < to.x { 1 } else { -1 };
    let sy = if from.y < to.y { 1 } else { -1 };
    let mut err = dx + dy;
    let mut pos = from;

    loop {
        if !visit(pos) || pos == to {
            return;
        }
        let doubled = 2 * err;
        if doubled >= dy {
            err += dy;
            pos.x += sx;
        }
        if doubled <= dx {
            err += dx;
            pos.y += sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        visibility::VISIBILITY_RADIUS,
        world::map::{MapLayout, ObjectDesc},
    };

    const WALL: u16 = 0x01;

    /// A 64x64 map with a vertical wall at x = 35 running from y = 10 to y = 54.
    fn walled_map() -> WorldMap {
        let mut layout = MapLayout::filled(64, 64, 0);
        for y in 10..=54 {
            layout.place_object(35, y, WALL);
        }
        layout.descriptors.objects.insert(
            WALL,
            ObjectDesc {
                blocks_sight: true,
                ..ObjectDesc::default()
            },
        );
        WorldMap::from_layout(&layout).expect("valid map")
    }

    #[test]
    fn test_disk_and_circumference() {
        let table = SightTable::new(15);
        assert!(table.disk().contains(&(15, 0)));
        assert!(table.disk().contains(&(0, -15)));
        assert!(!table.disk().contains(&(11, 11)));
        assert!(table.circumference().contains(&(15, 0)));
        assert!(!table.circumference().contains(&(12, 0)));
        assert!(table.circumference().iter().all(|c| table.disk().contains(c)));
    }

    #[test]
    fn test_tables_are_shared_per_radius() {
        let a = SightTable::shared(VISIBILITY_RADIUS);
        let b = SightTable::shared(VISIBILITY_RADIUS);
        assert!(Arc::ptr_eq(&a, &b));

        let small = SightTable::shared(8);
        assert_eq!(small.radius(), 8);
        assert!(Arc::ptr_eq(&small, &SightTable::shared(8)));
        assert!(!Arc::ptr_eq(&small, &a));
    }

    #[test]
    fn test_draw_line_reaches_target() {
        let mut tiles = Vec::new();
        draw_line(TilePos::new(0, 0), TilePos::new(4, 2), |pos| {
            tiles.push(pos);
            true
        });
        assert_eq!(tiles.first(), Some(&TilePos::new(0, 0)));
        assert_eq!(tiles.last(), Some(&TilePos::new(4, 2)));
        assert_eq!(tiles.len(), 5);
    }

    #[test]
    fn test_open_ignores_walls_and_clips_to_map() {
        let map = walled_map();
        let table = SightTable::new(15);
        let visible = table.visible_tiles(&map, TilePos::new(32, 32), BlockingMode::Open);
        assert!(visible.contains(&TilePos::new(40, 32)));
        assert_eq!(visible.len(), table.disk().len());

        let corner = table.visible_tiles(&map, TilePos::new(0, 0), BlockingMode::Open);
        assert!(corner.iter().all(|pos| map.contains(*pos)));
        assert!(corner.len() < table.disk().len());
    }

    #[test]
    fn test_line_of_sight_stops_at_wall() {
        let map = walled_map();
        let table = SightTable::new(15);
        let visible = table.visible_tiles(&map, TilePos::new(32, 32), BlockingMode::LineOfSight);

        assert!(visible.contains(&TilePos::new(32, 32)));
        assert!(visible.contains(&TilePos::new(35, 32)));
        assert!(!visible.contains(&TilePos::new(40, 32)));
        assert!(visible.contains(&TilePos::new(20, 32)));
    }

    #[test]
    fn test_path_flood_respects_wall_and_radius() {
        let map = walled_map();
        let table = SightTable::new(15);
        let visible = table.visible_tiles(&map, TilePos::new(32, 32), BlockingMode::Path);

        assert!(visible.contains(&TilePos::new(35, 32)));
        assert!(!visible.contains(&TilePos::new(36, 32)));
        assert!(visible.contains(&TilePos::new(17, 32)));
        assert!(!visible.contains(&TilePos::new(16, 32)));
    }

    #[test]
    fn test_viewer_off_map_sees_nothing() {
        let map = walled_map();
        let table = SightTable::new(15);
        assert!(
            table
                .visible_tiles(&map, TilePos::new(-5, 3), BlockingMode::Path)
                .is_empty()
        );
    }
}
