//! Observable state of one scripted actor.
//!
//! A [`RobotState`] snapshot is handed to the host on every mutation via
//! [`RunHost::robot_update`](crate::host::RunHost::robot_update). The
//! renderer-only animation hints ([`RobotAnim`]) are written by the engine
//! and never read back.

use crate::maze::{Direction, Item, Position};
use serde::{Deserialize, Serialize};

/// Health ceiling; robots spawn at full health.
pub const MAX_HEALTH: u32 = 100;

/// Per-action delay applied to every robot command, in milliseconds.
pub const DEFAULT_SPEED_MS: u64 = 300;

/// Pen descriptor: while set, successful moves append a trail segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pen {
    pub color: String,
}

/// One drawn trail segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrailSegment {
    pub from: Position,
    pub to: Position,
    pub color: String,
}

/// Transient animation hint for the renderer. Write-once per notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RobotAnim {
    EchoWave,
    EchoHit,
    Explosion,
}

/// Full observable state of one robot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RobotState {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub position: Position,
    pub direction: Direction,
    /// Held items, in pickup order. Item ids are unique within the list;
    /// held items have no `position`.
    #[serde(default)]
    pub inventory: Vec<Item>,
    pub speed_ms: u64,
    /// 0..=100.
    pub health: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appearance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pen: Option<Pen>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trail: Vec<TrailSegment>,
    pub is_destroyed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anim: Option<RobotAnim>,
}

impl RobotState {
    /// New robot at full health with the default speed.
    #[must_use]
    pub fn new(name: impl Into<String>, position: Position, direction: Direction) -> Self {
        Self {
            name: name.into(),
            color: None,
            position,
            direction,
            inventory: Vec::new(),
            speed_ms: DEFAULT_SPEED_MS,
            health: MAX_HEALTH,
            appearance: None,
            pen: None,
            trail: Vec::new(),
            is_destroyed: false,
            anim: None,
        }
    }

    #[must_use]
    pub fn with_color(mut self, color: Option<String>) -> Self {
        self.color = color;
        self
    }

    #[must_use]
    pub fn holds(&self, item_id: &str) -> bool {
        self.inventory.iter().any(|i| i.id == item_id)
    }

    /// Removes and returns a held item by id.
    pub fn take_item(&mut self, item_id: &str) -> Option<Item> {
        let idx = self.inventory.iter().position(|i| i.id == item_id)?;
        Some(self.inventory.remove(idx))
    }

    /// Lowers health by `amount`, clamped at zero. Returns the new value.
    pub fn apply_damage(&mut self, amount: u32) -> u32 {
        self.health = self.health.saturating_sub(amount);
        self.health
    }
}
