//! Pose mapping between the robot's native frame and the virtual grid.
//!
//! The robot reports its pose in centimeters with an arbitrary start offset
//! in x, y and theta. The game works in tile units where each tile is 1x1
//! and heading 0° points along +x. `PoseMapper` captures the calibration
//! between the two frames once per connection and converts in both
//! directions.

use std::fmt;

use crate::client::SensorFrame;
use crate::utils::{normalize_ang360, rotate_point};

/// A 2D pose. Used for both robot-native poses (cm) and virtual poses
/// (tile units); `theta` is degrees in `[0, 360)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    pub x: f32,
    pub y: f32,
    pub theta: f32,
}

impl Pose {
    pub fn new(x: f32, y: f32, theta: f32) -> Self {
        Self { x, y, theta }
    }
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.1}°)", self.x, self.y, self.theta)
    }
}

/// Maps robot-native sensor poses into the virtual grid frame and motion
/// targets back out.
///
/// The calibration is sampled once from the first sensor frame of a
/// connection and is immutable for the connection's lifetime. The tracked
/// virtual pose is the authoritative planned pose: `turn` and `forward`
/// update it before the physical robot confirms the motion.
pub struct PoseMapper {
    start_pose_robot: Pose,
    start_pose_virtual: Pose,
    theta_offset: f32,
    pos_scale: f32,
    virtual_pos: Pose,
}

impl PoseMapper {
    /// Create a mapper from the robot's boot pose, the configured virtual
    /// start pose (start tile center + heading), and the tile edge length
    /// in centimeters.
    pub fn new(robot_boot: Pose, start_virtual: Pose, tile_size_cm: f32) -> Self {
        Self {
            start_pose_robot: robot_boot,
            start_pose_virtual: start_virtual,
            theta_offset: start_virtual.theta - robot_boot.theta,
            pos_scale: 1.0 / tile_size_cm,
            virtual_pos: start_virtual,
        }
    }

    /// Convert a native sensor pose into the virtual grid frame.
    pub fn virtual_pose(&self, frame: &SensorFrame) -> Pose {
        // Remove the start offset so the robot starts at (0, 0)
        let bot_x = frame.x - self.start_pose_robot.x;
        let bot_y = frame.y - self.start_pose_robot.y;
        // The extra -90 accounts for the robot's native forward axis
        // pointing along +y rather than the grid's +x
        let (bot_x, bot_y) = rotate_point(bot_x, bot_y, self.theta_offset - 90.0);
        Pose::new(
            bot_x * self.pos_scale + self.start_pose_virtual.x,
            bot_y * self.pos_scale + self.start_pose_virtual.y,
            normalize_ang360(frame.degrees + self.theta_offset),
        )
    }

    /// Rotate the tracked heading by 90° and return the absolute native
    /// heading the robot should be commanded to.
    pub fn turn(&mut self, clockwise: bool) -> f32 {
        let delta = if clockwise { -90.0 } else { 90.0 };
        self.virtual_pos.theta = normalize_ang360(self.virtual_pos.theta + delta);
        self.virtual_pos.theta - self.theta_offset
    }

    /// Advance the tracked position exactly one tile along the current
    /// heading (backwards when `reverse`) and return the absolute native
    /// `(x, y)` target for the motion command.
    pub fn forward(&mut self, reverse: bool) -> (f32, f32) {
        let dist = if reverse { -1.0 } else { 1.0 };
        let rad = self.virtual_pos.theta.to_radians();
        self.virtual_pos.x += rad.cos() * dist;
        self.virtual_pos.y += rad.sin() * dist;
        self.to_native(self.virtual_pos.x, self.virtual_pos.y)
    }

    /// The tracked (planned) virtual pose.
    pub fn tracked_pose(&self) -> Pose {
        self.virtual_pos
    }

    /// Invert the offset/rotate/scale chain used by `virtual_pose`:
    /// remove the virtual start offset and convert to cm, rotate into the
    /// robot's sensor orientation, add back the robot's start offset.
    fn to_native(&self, vx: f32, vy: f32) -> (f32, f32) {
        let x = (vx - self.start_pose_virtual.x) / self.pos_scale;
        let y = (vy - self.start_pose_virtual.y) / self.pos_scale;
        let (x, y) = rotate_point(x, y, 90.0 - self.theta_offset);
        (x + self.start_pose_robot.x, y + self.start_pose_robot.y)
    }
}
