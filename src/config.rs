//! Configuration loading for KurmaNav

use crate::error::{KurmaError, Result};
use crate::pose::Pose;
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Clone, Debug, Deserialize)]
pub struct KurmaConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub game: GameConfig,
    #[serde(default)]
    pub robot: RobotConfig,
}

/// Network connection settings
#[derive(Clone, Debug, Deserialize)]
pub struct ConnectionConfig {
    /// Robot daemon IP address (default: 127.0.0.1 for a local mock)
    #[serde(default = "default_robot_ip")]
    pub robot_ip: String,

    /// TCP/UDP port number (default: 5555)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Connect timeout in milliseconds, also the mid-session sensor
    /// silence allowance (default: 5000)
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,

    /// MQTT broker for the card controller; no broker means no network
    /// command source
    #[serde(default)]
    pub mqtt_broker: Option<String>,

    #[serde(default = "default_mqtt_port")]
    pub mqtt_port: u16,
}

/// Board layout and session pacing
#[derive(Clone, Debug, Deserialize)]
pub struct GameConfig {
    /// Grid width in tiles (default: 6)
    #[serde(default = "default_grid_width")]
    pub grid_width: usize,

    /// Grid height in tiles (default: 6)
    #[serde(default = "default_grid_height")]
    pub grid_height: usize,

    /// Start tile, bottom-left origin (default: (0, 5))
    #[serde(default = "default_start_tile")]
    pub start_tile: (usize, usize),

    /// Start heading in grid degrees (default: 270, facing -y)
    #[serde(default = "default_start_theta")]
    pub start_theta: f32,

    /// Goal tile (default: (4, 1))
    #[serde(default = "default_goal_tile")]
    pub goal_tile: (usize, usize),

    /// Seconds between status renders (default: 2.0)
    #[serde(default = "default_status_interval")]
    pub status_interval_s: f32,
}

/// Robot physical parameters and detection tuning
#[derive(Clone, Debug, Deserialize)]
pub struct RobotConfig {
    /// Drive a simulated robot instead of hardware (default: false)
    #[serde(default)]
    pub simulate: bool,

    /// Tile edge length in centimeters (default: 30.48, a 1-foot mat tile)
    #[serde(default = "default_tile_size")]
    pub tile_size_cm: f32,

    /// Reflectance above which both front sensors must read to call the
    /// facing tile blocked (default: 12.0)
    #[serde(default = "default_front_threshold")]
    pub front_detection_threshold: f32,

    /// Reflectance above which either sensor triggers the mid-move
    /// emergency reverse (default: 40.0)
    #[serde(default = "default_crash_threshold")]
    pub crash_detection_threshold: f32,

    /// Seconds granted to a 90° turn (default: 4.0)
    #[serde(default = "default_turn_time")]
    pub turn_time_s: f32,

    /// Seconds granted to a one-tile move (default: 4.0)
    #[serde(default = "default_forward_time")]
    pub forward_time_s: f32,
}

// Default value functions
fn default_robot_ip() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    5555
}
fn default_timeout() -> u64 {
    5000
}
fn default_mqtt_port() -> u16 {
    1883
}
fn default_grid_width() -> usize {
    6
}
fn default_grid_height() -> usize {
    6
}
fn default_start_tile() -> (usize, usize) {
    (0, 5)
}
fn default_start_theta() -> f32 {
    270.0
}
fn default_goal_tile() -> (usize, usize) {
    (4, 1)
}
fn default_status_interval() -> f32 {
    2.0
}
fn default_tile_size() -> f32 {
    30.48
}
fn default_front_threshold() -> f32 {
    12.0
}
fn default_crash_threshold() -> f32 {
    40.0
}
fn default_turn_time() -> f32 {
    4.0
}
fn default_forward_time() -> f32 {
    4.0
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            robot_ip: default_robot_ip(),
            port: default_port(),
            timeout_ms: default_timeout(),
            mqtt_broker: None,
            mqtt_port: default_mqtt_port(),
        }
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            grid_width: default_grid_width(),
            grid_height: default_grid_height(),
            start_tile: default_start_tile(),
            start_theta: default_start_theta(),
            goal_tile: default_goal_tile(),
            status_interval_s: default_status_interval(),
        }
    }
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            simulate: false,
            tile_size_cm: default_tile_size(),
            front_detection_threshold: default_front_threshold(),
            crash_detection_threshold: default_crash_threshold(),
            turn_time_s: default_turn_time(),
            forward_time_s: default_forward_time(),
        }
    }
}

impl Default for KurmaConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            game: GameConfig::default(),
            robot: RobotConfig::default(),
        }
    }
}

impl KurmaConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| KurmaError::Config(format!("Failed to read config file: {}", e)))?;
        let config: KurmaConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the board layout is self-consistent.
    pub fn validate(&self) -> Result<()> {
        let (w, h) = (self.game.grid_width, self.game.grid_height);
        if w == 0 || h == 0 {
            return Err(KurmaError::Config("Grid dimensions must be non-zero".into()));
        }
        let (sx, sy) = self.game.start_tile;
        if sx >= w || sy >= h {
            return Err(KurmaError::Config(format!(
                "Start tile ({}, {}) outside {}x{} grid",
                sx, sy, w, h
            )));
        }
        let (gx, gy) = self.game.goal_tile;
        if gx >= w || gy >= h {
            return Err(KurmaError::Config(format!(
                "Goal tile ({}, {}) outside {}x{} grid",
                gx, gy, w, h
            )));
        }
        if self.robot.tile_size_cm <= 0.0 {
            return Err(KurmaError::Config("Tile size must be positive".into()));
        }
        Ok(())
    }

    /// Full address string for the robot daemon connection
    pub fn address(&self) -> String {
        format!("{}:{}", self.connection.robot_ip, self.connection.port)
    }

    /// Virtual start pose: center of the start tile at the start heading.
    pub fn start_pose(&self) -> Pose {
        Pose::new(
            self.game.start_tile.0 as f32 + 0.5,
            self.game.start_tile.1 as f32 + 0.5,
            self.game.start_theta,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = KurmaConfig::default();
        assert_eq!(config.game.grid_width, 6);
        assert_eq!(config.game.start_tile, (0, 5));
        assert_eq!(config.address(), "127.0.0.1:5555");
        assert!(config.validate().is_ok());

        let start = config.start_pose();
        assert!((start.x - 0.5).abs() < 1e-6);
        assert!((start.y - 5.5).abs() < 1e-6);
        assert!((start.theta - 270.0).abs() < 1e-6);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: KurmaConfig = toml::from_str(
            r#"
            [connection]
            robot_ip = "192.168.1.45"
            mqtt_broker = "192.168.1.110"

            [game]
            start_tile = [3, 5]
            start_theta = 90.0
            goal_tile = [5, 0]

            [robot]
            front_detection_threshold = 20.0
            "#,
        )
        .unwrap();

        assert_eq!(config.connection.robot_ip, "192.168.1.45");
        assert_eq!(config.connection.mqtt_broker.as_deref(), Some("192.168.1.110"));
        assert_eq!(config.game.start_tile, (3, 5));
        assert_eq!(config.game.goal_tile, (5, 0));
        assert_eq!(config.robot.front_detection_threshold, 20.0);
        // untouched sections keep their defaults
        assert_eq!(config.connection.port, 5555);
        assert_eq!(config.robot.turn_time_s, 4.0);
    }

    #[test]
    fn test_validate_rejects_out_of_grid_tiles() {
        let mut config = KurmaConfig::default();
        config.game.goal_tile = (7, 1);
        assert!(config.validate().is_err());

        config = KurmaConfig::default();
        config.game.start_tile = (0, 6);
        assert!(config.validate().is_err());
    }
}
