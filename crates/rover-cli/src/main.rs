//! Rover CLI - scripted maze simulations in the terminal.
//!
//! Loads a maze definition (JSON) and a directory of Lua scripts, then runs
//! the simulation to completion, echoing script output and robot activity to
//! stdout. Scripts that call `readline` block until a line is typed on stdin.
//!
//! Diagnostics go to stderr and are controlled with `RUST_LOG` (or `--debug`
//! as a shorthand for `RUST_LOG=debug`).

use anyhow::{bail, Context, Result};
use clap::Parser;
use rover_core::{LogKind, MazeConfig, RobotState, RunHost};
use rover_engine::{ScriptFiles, Simulation};
use std::cell::Cell;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Rover - scripted maze simulations in the terminal.
#[derive(Parser, Debug)]
#[command(name = "rover")]
#[command(version, about, long_about = None)]
struct Args {
    /// Maze definition file (JSON)
    maze: PathBuf,

    /// Lua scripts: a directory containing main.lua, or a single .lua file
    scripts: PathBuf,

    /// Enable debug logging (shorthand for RUST_LOG=debug)
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(if args.debug { "debug" } else { "warn" })
        }))
        .with_writer(std::io::stderr)
        .init();

    let maze = load_maze(&args.maze)?;
    let files = load_scripts(&args.scripts)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build the runtime")?;
    let local = tokio::task::LocalSet::new();

    let succeeded = runtime.block_on(local.run_until(async move {
        let host = Rc::new(CliHost::default());
        // EngineError carries mlua::Error, which is not Send, so anyhow's
        // Context is unavailable; map the message across explicitly.
        let sim = Simulation::new(maze, Rc::clone(&host) as Rc<dyn RunHost>)
            .map_err(|e| anyhow::anyhow!("invalid maze: {e}"))?;

        tokio::select! {
            result = sim.run(files) => {
                result.map_err(|e| anyhow::anyhow!("run failed: {e}"))?;
            }
            () = answer_prompts(&sim) => {}
        }
        Ok::<bool, anyhow::Error>(host.succeeded())
    }))?;

    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}

fn load_maze(path: &Path) -> Result<MazeConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read maze file {}", path.display()))?;
    let maze: MazeConfig = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse maze file {}", path.display()))?;
    Ok(maze)
}

/// A single `.lua` file becomes the entry file; a directory contributes
/// every `.lua` file it directly contains, in name order.
fn load_scripts(path: &Path) -> Result<ScriptFiles> {
    let mut files = ScriptFiles::new();

    if path.is_file() {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        files.insert("main.lua".to_string(), source);
        return Ok(files);
    }

    let entries = std::fs::read_dir(path)
        .with_context(|| format!("failed to read scripts directory {}", path.display()))?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "lua"))
        .collect();
    paths.sort();

    for script in paths {
        let name = script
            .file_name()
            .and_then(|n| n.to_str())
            .context("script file name is not valid UTF-8")?
            .to_string();
        let source = std::fs::read_to_string(&script)
            .with_context(|| format!("failed to read {}", script.display()))?;
        files.insert(name, source);
    }

    if files.is_empty() {
        bail!("no .lua files found in {}", path.display());
    }
    Ok(files)
}

/// Feeds stdin lines to scripts blocked on `readline`. Never resolves; the
/// surrounding `select!` drops it when the run ends.
async fn answer_prompts(sim: &Simulation) {
    loop {
        if sim.pending_prompt().is_none() {
            tokio::time::sleep(Duration::from_millis(25)).await;
            continue;
        }
        match tokio::task::spawn_blocking(read_stdin_line).await {
            Ok(Some(line)) => {
                sim.resolve_input(line.trim_end_matches(['\r', '\n']));
            }
            // stdin closed; stop answering but keep the run alive.
            Ok(None) | Err(_) => break,
        }
    }
    std::future::pending::<()>().await;
}

fn read_stdin_line() -> Option<String> {
    let mut line = String::new();
    match std::io::stdin().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line),
    }
}

/// Host that renders the run as plain terminal output.
#[derive(Default)]
struct CliHost {
    outcome: Cell<Option<bool>>,
}

impl CliHost {
    fn succeeded(&self) -> bool {
        // A run stopped without win/fail counts as success for exit-code
        // purposes; only an explicit failure is an error.
        self.outcome.get() != Some(false)
    }
}

impl RunHost for CliHost {
    fn log(&self, kind: LogKind, message: &str) {
        match kind {
            LogKind::User => println!("{message}"),
            LogKind::Robot => println!("> {message}"),
        }
    }

    fn robot_update(&self, name: &str, state: &RobotState) {
        tracing::debug!(
            robot = name,
            position = %state.position,
            health = state.health,
            "robot update"
        );
    }

    fn completed(&self, success: bool, message: &str) {
        self.outcome.set(Some(success));
        if success {
            println!("== {message}");
        } else {
            println!("== failed: {message}");
        }
    }

    fn input_requested(&self, prompt: &str) {
        print!("? {prompt} ");
        let _ = std::io::stdout().flush();
    }
}
