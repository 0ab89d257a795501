#![allow(dead_code)]

use rover_core::testing::RecordingHost;
use rover_core::{Direction, Door, Item, MazeConfig, Position, RobotSpawn, RunHost};
use rover_engine::{EngineError, ScriptFiles, Simulation};
use std::rc::Rc;

pub fn open_maze(width: u32, height: u32) -> MazeConfig {
    MazeConfig {
        width,
        height,
        walls: vec![vec![false; width as usize]; height as usize],
        initial_robots: vec![],
        items: vec![],
        doors: vec![],
        pressure_plates: vec![],
        global_module: None,
    }
}

pub fn spawn(name: &str, x: i32, y: i32, direction: Direction) -> RobotSpawn {
    RobotSpawn {
        name: name.to_string(),
        x,
        y,
        direction,
        color: None,
    }
}

pub fn item(id: &str, name: &str, position: Option<Position>) -> Item {
    Item {
        id: id.to_string(),
        name: name.to_string(),
        icon: None,
        tags: vec![],
        image: None,
        position,
        is_revealed: None,
        extra: serde_json::Map::new(),
    }
}

pub fn door(id: &str, position: Position, open: bool) -> Door {
    Door {
        id: id.to_string(),
        position,
        open,
        lock: None,
    }
}

pub fn script_files(entries: &[(&str, &str)]) -> ScriptFiles {
    entries
        .iter()
        .map(|(n, s)| ((*n).to_string(), (*s).to_string()))
        .collect()
}

pub fn simulation(maze: MazeConfig) -> (Simulation, Rc<RecordingHost>) {
    let host = Rc::new(RecordingHost::new());
    let sim = Simulation::new(maze, host.clone() as Rc<dyn RunHost>).expect("valid maze");
    (sim, host)
}

/// Runs a self-terminating program (one that wins, fails or errors out) to
/// the end and returns the recorded host events.
pub async fn run_to_end(
    maze: MazeConfig,
    files: &[(&str, &str)],
) -> (Rc<RecordingHost>, Result<(), EngineError>) {
    let (sim, host) = simulation(maze);
    let result = sim.run(script_files(files)).await;
    (host, result)
}
