use thiserror::Error;

use crate::entity::EntityId;

/// Faults that break a world's invariants.
///
/// These are never swallowed: they propagate to whoever drives the world, which
/// is expected to quarantine that world.
#[derive(Debug, Error)]
pub enum WorldError {
    /// An entity was admitted twice, or its id collided with a resident.
    #[error("entity {0} is already inside a world")]
    DuplicateEntity(EntityId),
    /// The map this world needs could not be found.
    #[error("missing map data: {0}")]
    MissingMapData(String),
    /// The map data does not describe a valid map.
    #[error("invalid map: {0}")]
    InvalidMap(String),
    /// The world settings failed validation.
    #[error("invalid world settings: {0}")]
    InvalidSettings(&'static str),
    /// The world has already been destroyed.
    #[error("world has been destroyed")]
    WorldClosed,
}
