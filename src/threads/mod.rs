//! Thread plumbing for the game.
//!
//! The game thread owns the connection lifecycle and the navigation loop;
//! it spawns one sensor pump per robot connection. The main thread stays
//! free for monitoring and rendering.

mod game;
mod sensor;

pub use game::GameThread;
pub use sensor::SensorPump;

use std::sync::mpsc::Receiver;
use std::thread::{self, JoinHandle};

use crate::config::KurmaConfig;
use crate::shared::{CmdEvent, SharedHandle};

/// Handles for the spawned threads.
pub struct ThreadHandles {
    pub game: JoinHandle<()>,
}

/// Spawn the game thread.
pub fn spawn_game_thread(
    config: KurmaConfig,
    shared: SharedHandle,
    ui_rx: Receiver<CmdEvent>,
) -> ThreadHandles {
    let handle = thread::Builder::new()
        .name("game".into())
        .spawn(move || {
            let mut game = GameThread::new(config, shared, ui_rx);
            if let Err(e) = game.run() {
                tracing::error!("Game thread error: {}", e);
            }
        })
        .expect("Failed to spawn game thread");

    ThreadHandles { game: handle }
}
