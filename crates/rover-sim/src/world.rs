//! Shared mutable world state.
//!
//! [`WorldState`] owns the door-open map, the revealed/collected item sets
//! and the dropped-item position map, keyed by static entity id and
//! completely independent of any single actor. Every mutator marks the state
//! dirty; [`WorldState::flush_updates`] coalesces several mutations into a
//! single host notification so multi-step effects (a lock check, a drop)
//! appear atomic to the renderer.

use rover_core::{Door, Item, MazeConfig, Position, RunHost};
use std::collections::{HashMap, HashSet};

/// Run-scoped shared world state. Rebuilt from the maze by [`reset`].
///
/// [`reset`]: WorldState::reset
#[derive(Debug, Default)]
pub struct WorldState {
    door_open: HashMap<String, bool>,
    revealed: HashSet<String>,
    collected: HashSet<String>,
    dropped: HashMap<String, Position>,
    dirty: bool,
}

impl WorldState {
    #[must_use]
    pub fn from_maze(maze: &MazeConfig) -> Self {
        let mut world = Self::default();
        world.reset(maze);
        world.dirty = false;
        world
    }

    /// Rebuilds all collections from the maze's static definitions,
    /// discarding anything a previous run mutated.
    pub fn reset(&mut self, maze: &MazeConfig) {
        self.door_open = maze
            .doors
            .iter()
            .map(|d| (d.id.clone(), d.open))
            .collect();
        self.revealed.clear();
        self.collected.clear();
        self.dropped.clear();
        self.dirty = true;
    }

    // --- Doors ---

    /// Authoritative open state for a door. Unknown ids are closed.
    #[must_use]
    pub fn is_door_open(&self, id: &str) -> bool {
        self.door_open.get(id).copied().unwrap_or(false)
    }

    pub fn set_door_open(&mut self, door: &Door, open: bool) {
        self.door_open.insert(door.id.clone(), open);
        self.dirty = true;
    }

    // --- Items ---

    #[must_use]
    pub fn is_collected(&self, id: &str) -> bool {
        self.collected.contains(id)
    }

    pub fn collect(&mut self, id: &str) {
        self.collected.insert(id.to_string());
        self.dropped.remove(id);
        self.dirty = true;
    }

    /// Marks a held item as back in the world at `pos`.
    pub fn drop_at(&mut self, id: &str, pos: Position) {
        self.collected.remove(id);
        self.dropped.insert(id.to_string(), pos);
        self.dirty = true;
    }

    #[must_use]
    pub fn dropped_position(&self, id: &str) -> Option<Position> {
        self.dropped.get(id).copied()
    }

    pub fn reveal(&mut self, id: &str) {
        if self.revealed.insert(id.to_string()) {
            self.dirty = true;
        }
    }

    /// Whether an item is currently visible to scripts and the renderer.
    /// Items not configured hidden are always visible.
    #[must_use]
    pub fn is_revealed(&self, item: &Item) -> bool {
        !item.starts_hidden() || self.revealed.contains(&item.id)
    }

    // --- Derived queries ---

    /// An uncollected item occupying `pos`, hidden or not.
    #[must_use]
    pub fn occupied_by_item(&self, maze: &MazeConfig, pos: Position) -> bool {
        maze.items
            .iter()
            .any(|i| i.position == Some(pos) && !self.is_collected(&i.id))
    }

    /// A pressure plate is active while a robot or an uncollected item
    /// occupies its cell. Robot occupancy is supplied by the caller, which
    /// owns the actor registry.
    #[must_use]
    pub fn plate_active(
        &self,
        maze: &MazeConfig,
        plate_pos: Position,
        robot_positions: &[Position],
    ) -> bool {
        robot_positions.contains(&plate_pos) || self.occupied_by_item(maze, plate_pos)
    }

    // --- Notification batching ---

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Emits a single state-change notification if anything changed since
    /// the last flush.
    pub fn flush_updates(&mut self, host: &dyn RunHost) {
        if self.dirty {
            self.dirty = false;
            host.state_changed();
        }
    }
}
