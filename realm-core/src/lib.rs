//! # Realm core
//!
//! The authoritative simulation core of a world instance: it owns the live
//! entities, advances them on a fixed tick, keeps the collision maps used for
//! proximity queries, and computes what each connected player can currently see.
//!
//! Game rules live elsewhere. Entities are driven through the [`Behavior`]
//! contract and outbound deltas leave through a [`Transport`].
#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    missing_docs,
    clippy::unwrap_used
)]
#![allow(
    clippy::single_call_fn,
    clippy::multiple_inherent_impl,
    clippy::shadow_unrelated,
    clippy::missing_errors_doc,
    clippy::struct_excessive_bools,
    clippy::needless_pass_by_value,
    clippy::cargo_common_metadata
)]

pub mod entity;
mod error;
pub mod ticks;
pub mod transport;
pub mod visibility;
pub mod world;

pub use entity::{Behavior, Entity, EntityCategory, EntityFactory, EntityId, EntityKind};
pub use error::WorldError;
pub use ticks::{TickTime, TimerQueue};
pub use transport::{PacketPriority, Payload, Transport};
pub use world::{World, WorldSettings, WorldStatus};
