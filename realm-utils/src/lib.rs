//! # Realm utils
//!
//! Small building blocks shared by the realm crates: coordinates, lock aliases
//! and a fixed-size bit set.
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

pub mod bit_set;
pub mod locks;
pub mod math;
mod types;

pub use bit_set::BitSet;
pub use types::{RegionPos, TilePos};
