//! Robot capability interface.
//!
//! One abstraction over everything the game asks a robot to do, with two
//! implementations: `PhysicalBot` drives the real robot through the daemon
//! command link, `SimBot` moves a purely virtual pose. Which one a session
//! uses is a configuration choice; the navigation loop only ever sees the
//! trait.

use std::sync::{Arc, Mutex, PoisonError};

use crate::client::{BotCommand, BotSound, CommandLink, PoseMode, SensorFrame};
use crate::error::Result;
use crate::pose::{Pose, PoseMapper};
use crate::utils::normalize_ang360;

/// Resting light scheme: green left ear, blue front, red right ear.
pub const HOME_RGB: ([f32; 3], [f32; 3], [f32; 3]) =
    ([0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0]);

/// Everything the navigation loop can ask of a robot.
pub trait RobotControl {
    /// Replace the cached sensor frame; does not touch the tracked pose.
    fn update_sensors(&mut self, frame: SensorFrame);

    /// Current pose in the virtual grid frame.
    fn pose(&self) -> Pose;

    /// Rotate 90° in place, clockwise or counter-clockwise.
    fn turn(&mut self, clockwise: bool) -> Result<()>;

    /// Move one tile along the current heading; backwards when `reverse`.
    fn forward(&mut self, reverse: bool) -> Result<()>;

    /// Abort the staged motion.
    fn stop(&mut self) -> Result<()>;

    fn set_rgb(&mut self, ear_left: [f32; 3], front: [f32; 3], ear_right: [f32; 3]) -> Result<()>;

    fn set_main_led(&mut self, on: bool) -> Result<()>;

    fn play_sound(&mut self, sound: BotSound) -> Result<()>;

    /// Stage an in-place spin, relative to the current heading.
    fn stage_spin(&mut self, degrees: f32, time_s: f32) -> Result<()>;
}

/// Hardware-backed robot: maps virtual motions into native pose targets and
/// stages them on the daemon command link.
pub struct PhysicalBot {
    link: CommandLink,
    mapper: PoseMapper,
    frame: SensorFrame,
    turn_time_s: f32,
    forward_time_s: f32,
}

impl PhysicalBot {
    /// Calibrate the virtual frame from the first sensor frame of the
    /// connection.
    pub fn new(
        link: CommandLink,
        first_frame: SensorFrame,
        start_virtual: Pose,
        tile_size_cm: f32,
        turn_time_s: f32,
        forward_time_s: f32,
    ) -> Self {
        let boot = Pose::new(first_frame.x, first_frame.y, first_frame.degrees);
        tracing::info!(
            "calibrated: robot boot pose {} maps to virtual start {}",
            boot,
            start_virtual
        );
        Self {
            link,
            mapper: PoseMapper::new(boot, start_virtual, tile_size_cm),
            frame: first_frame,
            turn_time_s,
            forward_time_s,
        }
    }
}

impl RobotControl for PhysicalBot {
    fn update_sensors(&mut self, frame: SensorFrame) {
        self.frame = frame;
    }

    fn pose(&self) -> Pose {
        self.mapper.virtual_pose(&self.frame)
    }

    fn turn(&mut self, clockwise: bool) -> Result<()> {
        let degrees = self.mapper.turn(clockwise);
        tracing::debug!("turn: planned pose {}", self.mapper.tracked_pose());
        // Hold position while rotating to the absolute native heading
        self.link.send(&BotCommand::StagePose {
            x: self.frame.x,
            y: self.frame.y,
            degrees,
            time_s: self.turn_time_s,
            mode: PoseMode::Global,
        })
    }

    fn forward(&mut self, reverse: bool) -> Result<()> {
        let (x, y) = self.mapper.forward(reverse);
        // Hold heading while translating to the absolute native target
        self.link.send(&BotCommand::StagePose {
            x,
            y,
            degrees: self.frame.degrees,
            time_s: self.forward_time_s,
            mode: PoseMode::Global,
        })
    }

    fn stop(&mut self) -> Result<()> {
        self.link.send(&BotCommand::StageStop)
    }

    fn set_rgb(&mut self, ear_left: [f32; 3], front: [f32; 3], ear_right: [f32; 3]) -> Result<()> {
        self.link.send(&BotCommand::Rgb {
            ear_left,
            front,
            ear_right,
        })
    }

    fn set_main_led(&mut self, on: bool) -> Result<()> {
        self.link.send(&BotCommand::MainLed { on })
    }

    fn play_sound(&mut self, sound: BotSound) -> Result<()> {
        self.link.send(&BotCommand::Audio { sound })
    }

    fn stage_spin(&mut self, degrees: f32, time_s: f32) -> Result<()> {
        self.link.send(&BotCommand::StagePose {
            x: 0.0,
            y: 0.0,
            degrees,
            time_s,
            mode: PoseMode::RelativeMeasured,
        })
    }
}

/// Simulated robot: motions complete instantly, effect commands are no-ops.
///
/// The pose handle is shared with the simulated sensor pump, which feeds the
/// pose back through the regular sensor channel so the rest of the stack is
/// unchanged.
pub struct SimBot {
    virtual_pos: Arc<Mutex<Pose>>,
}

impl SimBot {
    pub fn new(start_virtual: Pose) -> Self {
        Self {
            virtual_pos: Arc::new(Mutex::new(start_virtual)),
        }
    }

    /// Handle for the simulated sensor pump.
    pub fn pose_handle(&self) -> Arc<Mutex<Pose>> {
        Arc::clone(&self.virtual_pos)
    }

    fn with_pose<T>(&self, f: impl FnOnce(&mut Pose) -> T) -> T {
        let mut guard = self
            .virtual_pos
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

impl RobotControl for SimBot {
    fn update_sensors(&mut self, _frame: SensorFrame) {}

    fn pose(&self) -> Pose {
        self.with_pose(|p| *p)
    }

    fn turn(&mut self, clockwise: bool) -> Result<()> {
        self.with_pose(|p| {
            let delta = if clockwise { -90.0 } else { 90.0 };
            p.theta = normalize_ang360(p.theta + delta);
        });
        Ok(())
    }

    fn forward(&mut self, reverse: bool) -> Result<()> {
        self.with_pose(|p| {
            let dist = if reverse { -1.0 } else { 1.0 };
            let rad = p.theta.to_radians();
            p.x += rad.cos() * dist;
            p.y += rad.sin() * dist;
        });
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn set_rgb(
        &mut self,
        _ear_left: [f32; 3],
        _front: [f32; 3],
        _ear_right: [f32; 3],
    ) -> Result<()> {
        Ok(())
    }

    fn set_main_led(&mut self, _on: bool) -> Result<()> {
        Ok(())
    }

    fn play_sound(&mut self, sound: BotSound) -> Result<()> {
        tracing::debug!("sim sound: {:?}", sound);
        Ok(())
    }

    fn stage_spin(&mut self, _degrees: f32, _time_s: f32) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_turn_and_forward() {
        let mut bot = SimBot::new(Pose::new(3.5, 5.5, 90.0));

        bot.turn(true).unwrap();
        assert_eq!(bot.pose().theta, 0.0);

        bot.forward(false).unwrap();
        let p = bot.pose();
        assert!((p.x - 4.5).abs() < 1e-4);
        assert!((p.y - 5.5).abs() < 1e-4);

        bot.forward(true).unwrap();
        let p = bot.pose();
        assert!((p.x - 3.5).abs() < 1e-4);
    }

    #[test]
    fn test_sim_turn_pair_cancels() {
        let mut bot = SimBot::new(Pose::new(0.5, 0.5, 270.0));
        bot.turn(false).unwrap();
        bot.turn(true).unwrap();
        assert_eq!(bot.pose().theta, 270.0);
    }
}
