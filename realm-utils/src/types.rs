// Wrapper types making it harder to accidentaly mix tile and region coordinates.

use serde::{Deserialize, Serialize};

use crate::math::Vector2;

/// Side length of a spatial region, in tiles.
pub const REGION_SIZE: i32 = 16;

// An integer tile coordinate on a world map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TilePos {
    pub x: i32,
    pub y: i32,
}

impl TilePos {
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The tile containing a continuous position. Coordinates are truncated, not floored.
    #[must_use]
    pub fn containing(pos: Vector2<f64>) -> Self {
        Self::new(pos.x as i32, pos.y as i32)
    }

    #[must_use]
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    #[must_use]
    pub const fn region(self) -> RegionPos {
        RegionPos::new(self.x.div_euclid(REGION_SIZE), self.y.div_euclid(REGION_SIZE))
    }
}

// A region coordinate: a square of `REGION_SIZE` tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionPos {
    pub x: i32,
    pub y: i32,
}

impl RegionPos {
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub const fn as_i64(self) -> i64 {
        (self.x as i64 & 0xFFFF_FFFF) | ((self.y as i64 & 0xFFFF_FFFF) << 32)
    }

    #[must_use]
    pub const fn from_i64(packed: i64) -> Self {
        Self::new(packed as i32, (packed >> 32) as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_packing() {
        for pos in [
            RegionPos::new(0, 0),
            RegionPos::new(-1, 7),
            RegionPos::new(i32::MAX, i32::MIN),
        ] {
            assert_eq!(RegionPos::from_i64(pos.as_i64()), pos);
        }
    }

    #[test]
    fn test_containing_truncates() {
        assert_eq!(
            TilePos::containing(Vector2::new(10.9, 3.2)),
            TilePos::new(10, 3)
        );
        assert_eq!(TilePos::new(17, 15).region(), RegionPos::new(1, 0));
        assert_eq!(TilePos::new(-1, 0).region(), RegionPos::new(-1, 0));
    }
}
