//! Per-tick navigation state machine.
//!
//! Consumes one sensor frame per tick, recomputes the virtual pose and the
//! grid's fog-of-war, applies the collision and command-dispatch policy, and
//! drives the robot through the `RobotControl` capability interface. The
//! thread plumbing around it lives in `threads::game`; everything here is
//! synchronous and directly testable.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::client::{BotSound, SensorFrame};
use crate::error::{KurmaError, Result};
use crate::grid::{TileGrid, TileType};
use crate::robot::{HOME_RGB, RobotControl};
use crate::shared::CmdEvent;
use crate::utils::heading_to_grid_step;

/// Detection thresholds the navigator needs from the main configuration.
#[derive(Clone, Copy, Debug)]
pub struct NavConfig {
    /// Both front reflectance readings above this mark the facing tile
    /// blocked.
    pub front_detection_threshold: f32,
    /// Either reading above this mid-move triggers the emergency reverse.
    pub crash_detection_threshold: f32,
}

/// What the caller should do after a tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    /// Tear the session down and return to the idle connection state.
    Disconnect,
    /// Shut the whole game down.
    Quit,
}

/// Navigation loop state for one robot connection.
pub struct Navigator {
    config: NavConfig,
    queue_mode: bool,
    pending: VecDeque<CmdEvent>,
    last_idle: bool,
    moving_forward: bool,
    celebrated: bool,
    celebration: Option<Celebration>,
}

impl Navigator {
    pub fn new(config: NavConfig) -> Self {
        Self {
            config,
            queue_mode: false,
            pending: VecDeque::new(),
            last_idle: false,
            moving_forward: false,
            celebrated: false,
            celebration: None,
        }
    }

    /// Number of commands waiting in the queue.
    pub fn queued(&self) -> usize {
        self.pending.len()
    }

    /// Run one navigation tick against a fresh sensor frame and the command
    /// events that arrived since the last tick (UI source first, then
    /// network).
    pub fn step(
        &mut self,
        frame: &SensorFrame,
        events: &[CmdEvent],
        robot: &mut dyn RobotControl,
        grid: &mut TileGrid,
    ) -> Result<StepOutcome> {
        robot.update_sensors(*frame);
        let robot_idle = frame.is_idle();

        // Idle transitions drive the main-button indicator; arriving at
        // idle also ends any in-flight move.
        if self.last_idle && !robot_idle {
            robot.set_main_led(false)?;
        } else if !self.last_idle && robot_idle {
            robot.set_main_led(true)?;
            self.moving_forward = false;
        }
        self.last_idle = robot_idle;

        // Crash watch runs every tick, idle or not: a reflectance spike
        // mid-move means we are about to hit something the tile probe
        // missed. Back off one step and give up on the move.
        if self.moving_forward
            && (frame.reflect_left > self.config.crash_detection_threshold
                || frame.reflect_right > self.config.crash_detection_threshold)
        {
            tracing::warn!(
                "imminent collision (reflectance {:.0}/{:.0}), reversing one tile",
                frame.reflect_left,
                frame.reflect_right
            );
            robot.stop()?;
            robot.forward(true)?;
            self.moving_forward = false;
        }

        let pose = robot.pose();
        let map_x = pose.x.floor() as i32;
        let map_y = pose.y.floor() as i32;

        if !grid.in_bounds(map_x, map_y) {
            tracing::error!(
                "virtual pose {} resolved to off-grid tile ({}, {}); native frame x={:.1} y={:.1} deg={:.1}",
                pose,
                map_x,
                map_y,
                frame.x,
                frame.y,
                frame.degrees
            );
            return Err(KurmaError::Game(format!(
                "tile ({}, {}) outside {}x{} grid",
                map_x,
                map_y,
                grid.width(),
                grid.height()
            )));
        }
        let (tile_x, tile_y) = (map_x as usize, map_y as usize);

        // Fog-of-war is recomputed from scratch every tick. The tile under
        // the robot is traversable by construction.
        grid.set_all_unobserved();
        grid.set_observed_tile(tile_x, tile_y, TileType::Empty);

        // Drain command events; session-control events win over motion.
        let mut motion: Vec<CmdEvent> = Vec::new();
        for &event in events {
            match event {
                CmdEvent::Quit => return Ok(StepOutcome::Quit),
                CmdEvent::ToggleConnect => return Ok(StepOutcome::Disconnect),
                CmdEvent::ToggleQueueing => {
                    self.queue_mode = !self.queue_mode;
                    tracing::info!(
                        "command queueing {}",
                        if self.queue_mode { "on" } else { "off" }
                    );
                }
                CmdEvent::DeleteLastQueued => {
                    self.pending.pop_back();
                }
                CmdEvent::RunQueued => {
                    if self.queue_mode {
                        tracing::info!("running {} queued commands", self.pending.len());
                        self.queue_mode = false;
                    }
                }
                CmdEvent::Stop => {
                    self.pending.clear();
                    self.moving_forward = false;
                    robot.stop()?;
                }
                CmdEvent::Left | CmdEvent::Right | CmdEvent::Up => motion.push(event),
                CmdEvent::None => {}
            }
        }

        let mut turn_request: Option<bool> = None;
        let mut move_requested = false;

        if self.queue_mode {
            // While queueing, arrivals accumulate; nothing executes until
            // the queue is released.
            self.pending.extend(motion.iter().copied());
        } else if !motion.is_empty() && !robot_idle {
            tracing::debug!("rejected {} commands while moving", motion.len());
            robot.play_sound(BotSound::Sigh)?;
        } else {
            let next = if !self.pending.is_empty() {
                if robot_idle {
                    self.pending.pop_front()
                } else {
                    None
                }
            } else {
                // Several commands in one tick collapse to the first
                motion.first().copied()
            };
            match next {
                Some(CmdEvent::Left) => turn_request = Some(false),
                Some(CmdEvent::Right) => turn_request = Some(true),
                Some(CmdEvent::Up) => move_requested = true,
                _ => {}
            }
        }

        if let Some(clockwise) = turn_request {
            robot.turn(clockwise)?;
        }

        // One celebration per connection, started only once the robot has
        // settled on the goal tile; stepped every tick until it ends.
        if robot_idle
            && !self.celebrated
            && grid
                .get(tile_x, tile_y)
                .is_some_and(|t| t.kind == TileType::Goal)
        {
            tracing::info!("goal reached at tile ({}, {})", tile_x, tile_y);
            self.celebration = Some(Celebration::start(robot)?);
            self.celebrated = true;
        }
        if let Some(celebration) = self.celebration.as_mut() {
            if celebration.step(robot)? {
                self.celebration = None;
            }
        }

        // Probe the tile the robot is facing; the heading snapshot from the
        // top of the tick is authoritative for this frame.
        let (dx, dy) = heading_to_grid_step(pose.theta);
        let front_x = map_x + dx;
        let front_y = map_y + dy;
        let looking_off_map = !grid.in_bounds(front_x, front_y);

        if !looking_off_map {
            let blocked = frame.reflect_left > self.config.front_detection_threshold
                && frame.reflect_right > self.config.front_detection_threshold;
            grid.set_observed_tile(
                front_x as usize,
                front_y as usize,
                if blocked {
                    TileType::Blocked
                } else {
                    TileType::Empty
                },
            );
        }

        if move_requested {
            if looking_off_map {
                tracing::info!("move refused: facing off the grid");
                robot.play_sound(BotSound::NoWay)?;
            } else if grid
                .get(front_x as usize, front_y as usize)
                .is_some_and(|t| t.kind == TileType::Blocked)
            {
                tracing::info!("move refused: tile ({}, {}) blocked", front_x, front_y);
                robot.play_sound(BotSound::NoWay)?;
            } else {
                robot.forward(false)?;
                self.moving_forward = true;
            }
        }

        Ok(StepOutcome::Continue)
    }
}

const CELEBRATION_SPIN_DEGREES: f32 = 360.0;
const CELEBRATION_SPIN_S: f32 = 4.0;
const CELEBRATION_LEN: Duration = Duration::from_secs(6);
const CELEBRATION_CHEER_AT: Duration = Duration::from_secs(3);
const CELEBRATION_FLASH_INTERVAL: Duration = Duration::from_millis(200);

/// Goal celebration as a tick-stepped animation: a full spin with random
/// light flashes, a fanfare at the start and a second cheer partway
/// through. Never blocks the loop, so a quit or disconnect cancels it at
/// the next tick boundary.
struct Celebration {
    started: Instant,
    last_flash: Instant,
    did_cheer: bool,
}

impl Celebration {
    fn start(robot: &mut dyn RobotControl) -> Result<Self> {
        robot.play_sound(BotSound::Trumpet)?;
        robot.stage_spin(CELEBRATION_SPIN_DEGREES, CELEBRATION_SPIN_S)?;
        robot.set_rgb(random_color(), random_color(), random_color())?;
        let now = Instant::now();
        Ok(Self {
            started: now,
            last_flash: now,
            did_cheer: false,
        })
    }

    /// Advance the animation; true once it has finished.
    fn step(&mut self, robot: &mut dyn RobotControl) -> Result<bool> {
        let elapsed = self.started.elapsed();
        if elapsed >= CELEBRATION_LEN {
            let (left, front, right) = HOME_RGB;
            robot.set_rgb(left, front, right)?;
            return Ok(true);
        }
        if self.last_flash.elapsed() >= CELEBRATION_FLASH_INTERVAL {
            robot.set_rgb(random_color(), random_color(), random_color())?;
            self.last_flash = Instant::now();
        }
        if !self.did_cheer && elapsed >= CELEBRATION_CHEER_AT {
            robot.play_sound(BotSound::Yippee)?;
            self.did_cheer = true;
        }
        Ok(false)
    }
}

fn random_color() -> [f32; 3] {
    [rand::random(), rand::random(), rand::random()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::IDLE_WATERMARK;
    use crate::pose::Pose;
    use crate::utils::normalize_ang360;

    /// Instant-motion robot that records every effect command.
    struct TestBot {
        pose: Pose,
        sounds: Vec<BotSound>,
        stops: usize,
        spins: usize,
        reverses: usize,
    }

    impl TestBot {
        fn new(pose: Pose) -> Self {
            Self {
                pose,
                sounds: Vec::new(),
                stops: 0,
                spins: 0,
                reverses: 0,
            }
        }
    }

    impl RobotControl for TestBot {
        fn update_sensors(&mut self, _frame: SensorFrame) {}

        fn pose(&self) -> Pose {
            self.pose
        }

        fn turn(&mut self, clockwise: bool) -> Result<()> {
            let delta = if clockwise { -90.0 } else { 90.0 };
            self.pose.theta = normalize_ang360(self.pose.theta + delta);
            Ok(())
        }

        fn forward(&mut self, reverse: bool) -> Result<()> {
            if reverse {
                self.reverses += 1;
            }
            let dist = if reverse { -1.0 } else { 1.0 };
            let rad = self.pose.theta.to_radians();
            self.pose.x += rad.cos() * dist;
            self.pose.y += rad.sin() * dist;
            Ok(())
        }

        fn stop(&mut self) -> Result<()> {
            self.stops += 1;
            Ok(())
        }

        fn set_rgb(&mut self, _l: [f32; 3], _f: [f32; 3], _r: [f32; 3]) -> Result<()> {
            Ok(())
        }

        fn set_main_led(&mut self, _on: bool) -> Result<()> {
            Ok(())
        }

        fn play_sound(&mut self, sound: BotSound) -> Result<()> {
            self.sounds.push(sound);
            Ok(())
        }

        fn stage_spin(&mut self, _degrees: f32, _time_s: f32) -> Result<()> {
            self.spins += 1;
            Ok(())
        }
    }

    fn nav() -> Navigator {
        Navigator::new(NavConfig {
            front_detection_threshold: 12.0,
            crash_detection_threshold: 40.0,
        })
    }

    fn frame(idle: bool, reflect_left: f32, reflect_right: f32) -> SensorFrame {
        SensorFrame {
            x: 0.0,
            y: 0.0,
            degrees: 0.0,
            watermark: if idle { IDLE_WATERMARK } else { 0 },
            reflect_left,
            reflect_right,
        }
    }

    fn idle_frame() -> SensorFrame {
        frame(true, 0.0, 0.0)
    }

    #[test]
    fn test_right_right_up_scenario() {
        // 6x6 grid, start (3,5) heading 90°, goal (5,0)
        let mut grid = TileGrid::new(6, 6, (5, 0));
        let mut bot = TestBot::new(Pose::new(3.5, 5.5, 90.0));
        let mut nav = nav();

        nav.step(&idle_frame(), &[CmdEvent::Right], &mut bot, &mut grid)
            .unwrap();
        assert_eq!(bot.pose.theta, 0.0);

        nav.step(&idle_frame(), &[CmdEvent::Right], &mut bot, &mut grid)
            .unwrap();
        assert_eq!(bot.pose.theta, 270.0);

        nav.step(&idle_frame(), &[CmdEvent::Up], &mut bot, &mut grid)
            .unwrap();
        let p = bot.pose;
        assert!((p.x - 3.5).abs() < 1e-4);
        assert!((p.y - 4.5).abs() < 1e-4, "expected tile (3,4), at {}", p);
        assert!(bot.sounds.is_empty());
    }

    #[test]
    fn test_move_into_blocked_tile_refused() {
        let mut grid = TileGrid::new(6, 6, (5, 0));
        let mut bot = TestBot::new(Pose::new(3.5, 4.5, 270.0));
        let mut nav = nav();

        // both reflectance readings over the front threshold: tile ahead is
        // a wall
        let blocked = frame(true, 20.0, 20.0);
        nav.step(&blocked, &[CmdEvent::Up], &mut bot, &mut grid)
            .unwrap();

        assert_eq!(grid.get(3, 3).unwrap().kind, TileType::Blocked);
        assert!((bot.pose.x - 3.5).abs() < 1e-4);
        assert!((bot.pose.y - 4.5).abs() < 1e-4);
        assert_eq!(bot.sounds, vec![BotSound::NoWay]);
    }

    #[test]
    fn test_one_high_reading_is_not_blocked() {
        let mut grid = TileGrid::new(6, 6, (5, 0));
        let mut bot = TestBot::new(Pose::new(3.5, 4.5, 270.0));
        let mut nav = nav();

        let lopsided = frame(true, 20.0, 0.0);
        nav.step(&lopsided, &[], &mut bot, &mut grid).unwrap();
        assert_eq!(grid.get(3, 3).unwrap().kind, TileType::Empty);
        assert!(grid.get(3, 3).unwrap().observed);
    }

    #[test]
    fn test_move_off_grid_refused() {
        let mut grid = TileGrid::new(6, 6, (5, 0));
        // top edge, facing up
        let mut bot = TestBot::new(Pose::new(3.5, 5.5, 90.0));
        let mut nav = nav();

        nav.step(&idle_frame(), &[CmdEvent::Up], &mut bot, &mut grid)
            .unwrap();
        assert!((bot.pose.y - 5.5).abs() < 1e-4);
        assert_eq!(bot.sounds, vec![BotSound::NoWay]);
    }

    #[test]
    fn test_busy_commands_rejected_with_cue() {
        let mut grid = TileGrid::new(6, 6, (5, 0));
        let mut bot = TestBot::new(Pose::new(2.5, 2.5, 0.0));
        let mut nav = nav();

        let moving = frame(false, 0.0, 0.0);
        nav.step(&moving, &[CmdEvent::Up, CmdEvent::Left], &mut bot, &mut grid)
            .unwrap();

        assert_eq!(bot.sounds, vec![BotSound::Sigh]);
        assert_eq!(bot.pose.theta, 0.0);
        assert_eq!(nav.queued(), 0);
    }

    #[test]
    fn test_simultaneous_commands_collapse_to_first() {
        let mut grid = TileGrid::new(6, 6, (5, 0));
        let mut bot = TestBot::new(Pose::new(2.5, 2.5, 0.0));
        let mut nav = nav();

        nav.step(
            &idle_frame(),
            &[CmdEvent::Left, CmdEvent::Right, CmdEvent::Up],
            &mut bot,
            &mut grid,
        )
        .unwrap();

        // only the Left ran; the rest were dropped, not queued
        assert_eq!(bot.pose.theta, 90.0);
        assert!((bot.pose.x - 2.5).abs() < 1e-4);
        assert_eq!(nav.queued(), 0);
    }

    #[test]
    fn test_queue_mode_keeps_every_submission() {
        let mut grid = TileGrid::new(6, 6, (5, 0));
        let mut bot = TestBot::new(Pose::new(0.5, 0.5, 90.0));
        let mut nav = nav();

        nav.step(&idle_frame(), &[CmdEvent::ToggleQueueing], &mut bot, &mut grid)
            .unwrap();
        nav.step(
            &idle_frame(),
            &[CmdEvent::Up, CmdEvent::Up, CmdEvent::Up],
            &mut bot,
            &mut grid,
        )
        .unwrap();

        // three submissions -> three queued entries, nothing executed yet
        assert_eq!(nav.queued(), 3);
        assert!((bot.pose.y - 0.5).abs() < 1e-4);

        // release the queue: one command per idle tick, in order
        nav.step(&idle_frame(), &[CmdEvent::RunQueued], &mut bot, &mut grid)
            .unwrap();
        assert!((bot.pose.y - 1.5).abs() < 1e-4);
        assert_eq!(nav.queued(), 2);

        nav.step(&idle_frame(), &[], &mut bot, &mut grid).unwrap();
        nav.step(&idle_frame(), &[], &mut bot, &mut grid).unwrap();
        assert!((bot.pose.y - 3.5).abs() < 1e-4);
        assert_eq!(nav.queued(), 0);
    }

    #[test]
    fn test_queue_executes_in_submission_order() {
        let mut grid = TileGrid::new(6, 6, (5, 0));
        let mut bot = TestBot::new(Pose::new(0.5, 0.5, 90.0));
        let mut nav = nav();

        nav.step(&idle_frame(), &[CmdEvent::ToggleQueueing], &mut bot, &mut grid)
            .unwrap();
        nav.step(
            &idle_frame(),
            &[CmdEvent::Right, CmdEvent::Up],
            &mut bot,
            &mut grid,
        )
        .unwrap();
        nav.step(&idle_frame(), &[CmdEvent::RunQueued], &mut bot, &mut grid)
            .unwrap();
        // Right first: heading 90 -> 0
        assert_eq!(bot.pose.theta, 0.0);
        assert!((bot.pose.x - 0.5).abs() < 1e-4);

        nav.step(&idle_frame(), &[], &mut bot, &mut grid).unwrap();
        // then the Up, along the new heading
        assert!((bot.pose.x - 1.5).abs() < 1e-4);
    }

    #[test]
    fn test_delete_last_queued() {
        let mut grid = TileGrid::new(6, 6, (5, 0));
        let mut bot = TestBot::new(Pose::new(0.5, 0.5, 90.0));
        let mut nav = nav();

        nav.step(&idle_frame(), &[CmdEvent::ToggleQueueing], &mut bot, &mut grid)
            .unwrap();
        nav.step(
            &idle_frame(),
            &[CmdEvent::Up, CmdEvent::Right],
            &mut bot,
            &mut grid,
        )
        .unwrap();
        assert_eq!(nav.queued(), 2);

        nav.step(
            &idle_frame(),
            &[CmdEvent::DeleteLastQueued],
            &mut bot,
            &mut grid,
        )
        .unwrap();
        assert_eq!(nav.queued(), 1);

        nav.step(&idle_frame(), &[CmdEvent::RunQueued], &mut bot, &mut grid)
            .unwrap();
        // the surviving entry was the Up
        assert!((bot.pose.y - 1.5).abs() < 1e-4);
        assert_eq!(bot.pose.theta, 90.0);
    }

    #[test]
    fn test_crash_detection_reverses_exactly_once() {
        let mut grid = TileGrid::new(6, 6, (5, 0));
        let mut bot = TestBot::new(Pose::new(2.5, 2.5, 0.0));
        let mut nav = nav();

        // start a move
        nav.step(&idle_frame(), &[CmdEvent::Up], &mut bot, &mut grid)
            .unwrap();
        assert!((bot.pose.x - 3.5).abs() < 1e-4);

        // mid-move, a reflectance spike over the crash threshold
        let spike = frame(false, 45.0, 0.0);
        nav.step(&spike, &[], &mut bot, &mut grid).unwrap();
        assert_eq!(bot.stops, 1);
        assert_eq!(bot.reverses, 1);
        assert!((bot.pose.x - 2.5).abs() < 1e-4);

        // the spike persists; no second reverse
        nav.step(&spike, &[], &mut bot, &mut grid).unwrap();
        assert_eq!(bot.stops, 1);
        assert_eq!(bot.reverses, 1);
        assert!((bot.pose.x - 2.5).abs() < 1e-4);
    }

    #[test]
    fn test_goal_celebration_fires_once() {
        let mut grid = TileGrid::new(6, 6, (0, 0));
        let mut bot = TestBot::new(Pose::new(0.5, 0.5, 0.0));
        let mut nav = nav();

        nav.step(&idle_frame(), &[], &mut bot, &mut grid).unwrap();
        assert_eq!(bot.spins, 1);
        assert_eq!(
            bot.sounds.iter().filter(|s| **s == BotSound::Trumpet).count(),
            1
        );

        for _ in 0..5 {
            nav.step(&idle_frame(), &[], &mut bot, &mut grid).unwrap();
        }
        assert_eq!(bot.spins, 1);
        assert_eq!(
            bot.sounds.iter().filter(|s| **s == BotSound::Trumpet).count(),
            1
        );
    }

    #[test]
    fn test_out_of_bounds_pose_is_fatal() {
        let mut grid = TileGrid::new(6, 6, (5, 0));
        let mut bot = TestBot::new(Pose::new(7.5, 0.5, 0.0));
        let mut nav = nav();

        let result = nav.step(&idle_frame(), &[], &mut bot, &mut grid);
        assert!(matches!(result, Err(KurmaError::Game(_))));
    }

    #[test]
    fn test_quit_and_toggle_outcomes() {
        let mut grid = TileGrid::new(6, 6, (5, 0));
        let mut bot = TestBot::new(Pose::new(0.5, 0.5, 0.0));
        let mut nav = nav();

        let out = nav
            .step(&idle_frame(), &[CmdEvent::Quit], &mut bot, &mut grid)
            .unwrap();
        assert_eq!(out, StepOutcome::Quit);

        let out = nav
            .step(&idle_frame(), &[CmdEvent::ToggleConnect], &mut bot, &mut grid)
            .unwrap();
        assert_eq!(out, StepOutcome::Disconnect);
    }

    #[test]
    fn test_stop_clears_queue() {
        let mut grid = TileGrid::new(6, 6, (5, 0));
        let mut bot = TestBot::new(Pose::new(0.5, 0.5, 90.0));
        let mut nav = nav();

        nav.step(&idle_frame(), &[CmdEvent::ToggleQueueing], &mut bot, &mut grid)
            .unwrap();
        nav.step(
            &idle_frame(),
            &[CmdEvent::Up, CmdEvent::Up],
            &mut bot,
            &mut grid,
        )
        .unwrap();
        assert_eq!(nav.queued(), 2);

        nav.step(&idle_frame(), &[CmdEvent::Stop], &mut bot, &mut grid)
            .unwrap();
        assert_eq!(nav.queued(), 0);
        assert_eq!(bot.stops, 1);
    }

    #[test]
    fn test_fog_recomputed_each_tick() {
        let mut grid = TileGrid::new(6, 6, (5, 0));
        let mut bot = TestBot::new(Pose::new(3.5, 4.5, 270.0));
        let mut nav = nav();

        let blocked = frame(true, 20.0, 20.0);
        nav.step(&blocked, &[], &mut bot, &mut grid).unwrap();
        assert!(grid.get(3, 3).unwrap().observed);

        // turn away: the wall tile drops back into fog but keeps its kind
        nav.step(&blocked, &[CmdEvent::Right], &mut bot, &mut grid)
            .unwrap();
        nav.step(&idle_frame(), &[], &mut bot, &mut grid).unwrap();
        assert!(!grid.get(3, 3).unwrap().observed);
        assert_eq!(grid.get(3, 3).unwrap().kind, TileType::Blocked);
    }
}
