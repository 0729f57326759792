//! Shared state between the game loop, the monitor/render task, and the
//! I/O threads.
//!
//! The game loop mutates the grid and pose under a mutex scoped to each
//! read/modify block; the renderer takes the same lock once per frame for a
//! consistent snapshot. Grid mutations are small and infrequent relative to
//! the render rate, so no finer-grained locking is needed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::grid::TileGrid;
use crate::pose::Pose;

/// Discrete user/network intents, consumed by the game loop in arrival
/// order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmdEvent {
    None,
    Left,
    Right,
    Up,
    Quit,
    ToggleConnect,
    ToggleQueueing,
    DeleteLastQueued,
    RunQueued,
    Stop,
}

/// Robot session lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
}

/// Everything the renderer needs to draw one frame.
#[derive(Debug)]
pub struct GameState {
    pub grid: TileGrid,
    pub turtle_pose: Pose,
    pub connection: ConnectionState,
}

/// Shared handle between all threads.
pub struct SharedGame {
    state: Mutex<GameState>,
    shutdown: AtomicBool,
}

impl SharedGame {
    pub fn new(grid: TileGrid, start_pose: Pose) -> Self {
        Self {
            state: Mutex::new(GameState {
                grid,
                turtle_pose: start_pose,
                connection: ConnectionState::Idle,
            }),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Run a closure with the game state locked. Keep the closure scoped to
    /// one read/modify block.
    pub fn with_state<T>(&self, f: impl FnOnce(&mut GameState) -> T) -> T {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn set_connection(&self, state: ConnectionState) {
        self.with_state(|s| s.connection = state);
    }

    /// Signal cooperative shutdown to every thread.
    pub fn signal_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    pub fn should_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

pub type SharedHandle = Arc<SharedGame>;
