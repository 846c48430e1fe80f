//! Entity stats and the change events that feed per-viewer stat deltas.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use super::EntityId;

/// Kind of a synchronized entity stat.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatKind {
    MaxHealth,
    Health,
    Size,
    MaxMana,
    Mana,
    Level,
    Experience,
    Attack,
    Defense,
    Speed,
    Dexterity,
    Vitality,
    Wisdom,
    Condition,
    Name,
    Texture,
    AltTexture,
    Fame,
    Stars,
    GuildName,
}

/// Value of a stat.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatValue {
    Int(i32),
    Text(String),
}

impl From<i32> for StatValue {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for StatValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for StatValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl Display for StatValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

/// A stat change posted by an entity during a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatChange {
    /// The entity whose stat changed.
    pub subject: EntityId,
    /// Which stat.
    pub kind: StatKind,
    /// The new value.
    pub value: StatValue,
    /// Only the subject's own client may see this change.
    pub self_only: bool,
}
