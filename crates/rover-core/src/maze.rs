//! Maze configuration: grid geometry, doors, items and pressure plates.
//!
//! A [`MazeConfig`] is supplied by the host once per run. The engine deep
//! copies it internally, so script-driven mutation (item pickup, door state,
//! robot creation) never corrupts the host's original object.
//!
//! Wire format is JSON with camelCase keys, e.g.:
//!
//! ```json
//! {
//!   "width": 3, "height": 3,
//!   "walls": [[false, true, false], ...],
//!   "initialRobots": [{"name": "karel", "x": 0, "y": 0, "direction": "east"}],
//!   "items": [{"id": "key-1", "name": "Key", "position": {"x": 2, "y": 0}}],
//!   "doors": [{"id": "d1", "position": {"x": 1, "y": 0}, "lock": {"kind": "items", "required": ["key-1"]}}]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// A cell position on the maze grid.
///
/// Signed so that "one step past the edge" is representable; bounds are
/// checked by [`MazeConfig::in_bounds`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Returns the position one step in `direction`.
    #[must_use]
    pub fn step(self, direction: Direction) -> Self {
        let (dx, dy) = direction.delta();
        Self::new(self.x + dx, self.y + dy)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Facing direction of a robot. Cyclic: `North → East → South → West`.
///
/// The grid origin is the top-left cell; `y` grows southward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    North,
    East,
    South,
    West,
}

impl Direction {
    /// Cell offset of one step in this direction.
    #[must_use]
    pub const fn delta(self) -> (i32, i32) {
        match self {
            Self::North => (0, -1),
            Self::East => (1, 0),
            Self::South => (0, 1),
            Self::West => (-1, 0),
        }
    }

    #[must_use]
    pub const fn left(self) -> Self {
        match self {
            Self::North => Self::West,
            Self::West => Self::South,
            Self::South => Self::East,
            Self::East => Self::North,
        }
    }

    #[must_use]
    pub const fn right(self) -> Self {
        match self {
            Self::North => Self::East,
            Self::East => Self::South,
            Self::South => Self::West,
            Self::West => Self::North,
        }
    }

    /// Parses a lowercase direction name (`"north"`, `"east"`, ...).
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "north" => Some(Self::North),
            "east" => Some(Self::East),
            "south" => Some(Self::South),
            "west" => Some(Self::West),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::North => "north",
            Self::East => "east",
            Self::South => "south",
            Self::West => "west",
        };
        write!(f, "{name}")
    }
}

/// An item that can sit in the maze, be picked up and dropped.
///
/// `position` is `None` while the item is collected (held in an inventory).
/// `extra` carries user-defined properties verbatim; scripts may read and
/// write them and they round-trip unchanged through serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    /// `Some(false)` marks a hidden item: invisible until a robot steps on
    /// its cell or scans it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_revealed: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Item {
    /// True for items configured as hidden (`isRevealed: false`).
    #[must_use]
    pub fn starts_hidden(&self) -> bool {
        self.is_revealed == Some(false)
    }
}

/// A door's access-control rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Lock {
    /// Opens only for an exact string match against `secret`.
    Password { secret: String },
    /// Opens only when every required item id is both supplied as a
    /// credential and present in the actor's inventory.
    Items { required: Vec<String> },
}

/// Static door definition. The authoritative open/closed flag lives in the
/// world state, not here; `open` is only the initial value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Door {
    pub id: String,
    pub position: Position,
    #[serde(default)]
    pub open: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock: Option<Lock>,
}

/// A pressure plate. Activation is derived (a robot or an uncollected item
/// occupies its cell), never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PressurePlate {
    pub id: String,
    pub position: Position,
}

/// Initial robot placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RobotSpawn {
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub direction: Direction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// The complete static description of a maze level.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MazeConfig {
    pub width: u32,
    pub height: u32,
    /// `walls[y][x]` — `true` means the cell is impassable.
    pub walls: Vec<Vec<bool>>,
    #[serde(default)]
    pub initial_robots: Vec<RobotSpawn>,
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub doors: Vec<Door>,
    #[serde(default)]
    pub pressure_plates: Vec<PressurePlate>,
    /// Optional maze-level script executed once per run before the entry
    /// file, typically carrying level-specific win/fail logic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_module: Option<String>,
}

impl MazeConfig {
    #[must_use]
    pub fn in_bounds(&self, pos: Position) -> bool {
        pos.x >= 0 && pos.y >= 0 && (pos.x as u32) < self.width && (pos.y as u32) < self.height
    }

    /// True if the cell is a grid wall. Out-of-bounds cells are not walls;
    /// callers check bounds separately.
    #[must_use]
    pub fn is_wall(&self, pos: Position) -> bool {
        self.in_bounds(pos) && self.walls[pos.y as usize][pos.x as usize]
    }

    #[must_use]
    pub fn door_at(&self, pos: Position) -> Option<&Door> {
        self.doors.iter().find(|d| d.position == pos)
    }

    #[must_use]
    pub fn door(&self, id: &str) -> Option<&Door> {
        self.doors.iter().find(|d| d.id == id)
    }

    #[must_use]
    pub fn item(&self, id: &str) -> Option<&Item> {
        self.items.iter().find(|i| i.id == id)
    }

    #[must_use]
    pub fn item_mut(&mut self, id: &str) -> Option<&mut Item> {
        self.items.iter_mut().find(|i| i.id == id)
    }

    /// First item currently sitting on `pos` (position set).
    #[must_use]
    pub fn item_at(&self, pos: Position) -> Option<&Item> {
        self.items.iter().find(|i| i.position == Some(pos))
    }

    #[must_use]
    pub fn plate(&self, id: &str) -> Option<&PressurePlate> {
        self.pressure_plates.iter().find(|p| p.id == id)
    }

    #[must_use]
    pub fn plates_at(&self, pos: Position) -> impl Iterator<Item = &PressurePlate> {
        self.pressure_plates.iter().filter(move |p| p.position == pos)
    }

    /// Validates structural invariants: the wall grid matches
    /// `width × height` and every entity position lies within bounds.
    ///
    /// # Errors
    ///
    /// Returns a human-readable description of the first violation found.
    pub fn validate(&self) -> Result<(), String> {
        if self.walls.len() != self.height as usize {
            return Err(format!(
                "wall grid has {} rows, expected {}",
                self.walls.len(),
                self.height
            ));
        }
        for (y, row) in self.walls.iter().enumerate() {
            if row.len() != self.width as usize {
                return Err(format!(
                    "wall row {} has {} cells, expected {}",
                    y,
                    row.len(),
                    self.width
                ));
            }
        }
        for robot in &self.initial_robots {
            if !self.in_bounds(Position::new(robot.x, robot.y)) {
                return Err(format!(
                    "robot '{}' placed out of bounds at ({}, {})",
                    robot.name, robot.x, robot.y
                ));
            }
        }
        for item in &self.items {
            if let Some(pos) = item.position {
                if !self.in_bounds(pos) {
                    return Err(format!("item '{}' placed out of bounds at {pos}", item.id));
                }
            }
        }
        for door in &self.doors {
            if !self.in_bounds(door.position) {
                return Err(format!(
                    "door '{}' placed out of bounds at {}",
                    door.id, door.position
                ));
            }
        }
        for plate in &self.pressure_plates {
            if !self.in_bounds(plate.position) {
                return Err(format!(
                    "pressure plate '{}' placed out of bounds at {}",
                    plate.id, plate.position
                ));
            }
        }
        Ok(())
    }
}
