//! KurmaNav - fog-of-war tile navigation game for a turtle robot
//!
//! Drives a physical robot across a virtual tile grid that is revealed as
//! the robot explores. The robot's raw pose readings (cm, arbitrary start
//! offset, rotated heading) are mapped into the grid frame once per
//! connection; tile occupancy is inferred from the front reflectance
//! sensors.
//!
//! ## Threads
//!
//! - **Game thread**: connection lifecycle and the per-tick navigation loop
//! - **Sensor pump** (per connection): UDP frames or simulated frames into
//!   the game loop's channel
//! - **Main thread**: command input and the periodic status render

mod client;
mod config;
mod error;
mod grid;
mod mqtt;
mod nav;
mod pose;
mod robot;
mod shared;
mod threads;
mod utils;

use config::KurmaConfig;
use error::Result;
use grid::TileGrid;
use shared::{CmdEvent, ConnectionState, SharedGame, SharedHandle};

use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc::{self, Sender};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("kurma_nav=info".parse().unwrap()),
        )
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();

    let mut config = if args.len() > 1 && !args[1].starts_with("--") {
        let config_path = Path::new(&args[1]);
        info!("Loading configuration from {:?}", config_path);
        KurmaConfig::load(config_path)?
    } else if Path::new("kurma.toml").exists() {
        info!("Loading configuration from kurma.toml");
        KurmaConfig::load(Path::new("kurma.toml"))?
    } else {
        info!("Using default configuration");
        KurmaConfig::default()
    };

    // CLI overrides
    if let Some(ip) = args
        .iter()
        .position(|a| a == "--robot")
        .and_then(|i| args.get(i + 1))
    {
        info!("Using robot IP: {}", ip);
        config.connection.robot_ip = ip.clone();
    }
    if args.iter().any(|a| a == "--sim") {
        info!("Simulated robot selected");
        config.robot.simulate = true;
    }
    config.validate()?;

    info!("KurmaNav v{}", env!("CARGO_PKG_VERSION"));
    if config.robot.simulate {
        info!("Robot: simulated");
    } else {
        info!("Robot daemon: {}", config.address());
    }
    info!(
        "Grid {}x{}, start {:?} @ {:.0}°, goal {:?}",
        config.game.grid_width,
        config.game.grid_height,
        config.game.start_tile,
        config.game.start_theta,
        config.game.goal_tile
    );

    // Shared state and command channel
    let grid = TileGrid::new(
        config.game.grid_width,
        config.game.grid_height,
        config.game.goal_tile,
    );
    let shared: SharedHandle = Arc::new(SharedGame::new(grid, config.start_pose()));
    let (ui_tx, ui_rx) = mpsc::channel();

    let status_interval = Duration::from_secs_f32(config.game.status_interval_s.max(0.1));
    let handles = threads::spawn_game_thread(config, Arc::clone(&shared), ui_rx);

    spawn_stdin_reader(ui_tx, Arc::clone(&shared));

    // Main thread: periodic status render until shutdown
    let mut last_render = Instant::now();
    loop {
        std::thread::sleep(Duration::from_millis(250));

        if shared.should_shutdown() {
            break;
        }
        if handles.game.is_finished() {
            warn!("Game thread exited unexpectedly");
            break;
        }
        if last_render.elapsed() >= status_interval {
            render_status(&shared);
            last_render = Instant::now();
        }
    }

    shared.signal_shutdown();
    if handles.game.join().is_err() {
        error!("Game thread panicked");
    }

    info!("KurmaNav finished");
    Ok(())
}

/// Read command lines from stdin and translate them into command events.
/// This is the stand-in for a real renderer's input side; goal relocation
/// mirrors its drag-and-drop while disconnected.
fn spawn_stdin_reader(ui_tx: Sender<CmdEvent>, shared: SharedHandle) {
    std::thread::Builder::new()
        .name("ui".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(_) => break,
                };
                let event = match parse_command(&line, &shared) {
                    Some(event) => event,
                    None => continue,
                };
                let quitting = event == CmdEvent::Quit;
                if ui_tx.send(event).is_err() || quitting {
                    break;
                }
            }
        })
        .expect("Failed to spawn ui thread");
}

fn parse_command(line: &str, shared: &SharedHandle) -> Option<CmdEvent> {
    let mut words = line.split_whitespace();
    let word = words.next()?;
    match word.to_ascii_lowercase().as_str() {
        "left" | "l" => Some(CmdEvent::Left),
        "right" | "r" => Some(CmdEvent::Right),
        "up" | "u" | "forward" | "f" => Some(CmdEvent::Up),
        "connect" | "c" | "disconnect" => Some(CmdEvent::ToggleConnect),
        "queue" => Some(CmdEvent::ToggleQueueing),
        "run" => Some(CmdEvent::RunQueued),
        "delete" | "d" => Some(CmdEvent::DeleteLastQueued),
        "stop" | "s" => Some(CmdEvent::Stop),
        "quit" | "q" | "exit" => Some(CmdEvent::Quit),
        "goal" => {
            // goal X Y: relocate the goal tile, only while disconnected
            let x = words.next().and_then(|w| w.parse::<usize>().ok());
            let y = words.next().and_then(|w| w.parse::<usize>().ok());
            match (x, y) {
                (Some(x), Some(y)) => {
                    shared.with_state(|s| {
                        if s.connection != ConnectionState::Idle {
                            warn!("Goal can only be moved while disconnected");
                        } else if !s.grid.relocate_goal(x, y) {
                            warn!("Goal tile ({}, {}) is off the grid", x, y);
                        }
                    });
                }
                _ => warn!("Usage: goal <x> <y>"),
            }
            None
        }
        other => {
            warn!(
                "Unknown command '{}' (left/right/up, connect, queue/run/delete, stop, goal x y, quit)",
                other
            );
            None
        }
    }
}

/// Render the grid and pose to the terminal.
fn render_status(shared: &SharedHandle) {
    let (text, pose, connection) = shared.with_state(|s| {
        (
            s.grid.render_ascii(&s.turtle_pose),
            s.turtle_pose,
            s.connection,
        )
    });
    if connection == ConnectionState::Connected {
        info!("pose: {}", pose);
        print!("{}", text);
    }
}
