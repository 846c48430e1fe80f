use serde::Deserialize;

use crate::visibility::VISIBILITY_RADIUS;

/// How walls affect what a player can see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockingMode {
    /// Nothing blocks sight; every tile within the sight radius is visible.
    #[default]
    Open,
    /// Rays cast to the edge of the sight radius stop at the first sight-blocking tile.
    LineOfSight,
    /// Tiles are visible only if an 8-connected path of non-blocking tiles reaches them.
    Path,
}

/// Per-world tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorldSettings {
    /// Display name, used in logs.
    pub name: String,
    /// When false, the world is destroyed after staying empty for `idle_expiry_ms`.
    pub persist: bool,
    /// Sight blocking policy.
    pub blocking: BlockingMode,
    /// Sight radius in tiles.
    pub sight_radius: u32,
    /// How long an empty, non-persistent world lingers before expiring.
    pub idle_expiry_ms: i64,
    /// Enemies are ticked only within this many regions of a player.
    pub active_region_radius: u8,
    /// Player cap reported by `is_players_max`.
    pub max_players: usize,
}

impl WorldSettings {
    /// Checks the settings for values the world cannot run with.
    pub fn validate(&self) -> Result<(), &'static str> {
        if !(1..=64).contains(&self.sight_radius) {
            return Err("Sight radius must be in range 1..64");
        }
        if self.idle_expiry_ms < 0 {
            return Err("Idle expiry must not be negative");
        }
        if self.max_players == 0 {
            return Err("Max players must be at least 1");
        }
        Ok(())
    }
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            name: "World".to_string(),
            persist: false,
            blocking: BlockingMode::Open,
            sight_radius: VISIBILITY_RADIUS,
            idle_expiry_ms: 60_000,
            active_region_radius: 3,
            max_players: 85,
        }
    }
}
