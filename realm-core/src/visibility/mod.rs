//! Visibility engine.
//!
//! - [`SightTable`] - Precomputed sight offsets and the tile visibility policies
//! - [`ViewerState`] - What one client knows, diffed against the world every tick
//! - [`ViewerDelta`] - The per-tick result handed to the transport

mod delta;
mod sight;
mod viewer;

pub use delta::{ObjectDef, ObjectStats, TileData, ViewerDelta};
pub use sight::SightTable;
pub use viewer::ViewerState;

/// Default sight radius in tiles. Also the radius of the visible broadcasts.
pub const VISIBILITY_RADIUS: u32 = 15;
