//! Game thread: connection lifecycle and the per-tick navigation loop.
//!
//! Sits in the idle connection state until a `ToggleConnect` arrives, then
//! runs one robot session: connect (or spin up the simulator), calibrate
//! from the first sensor frame, and hand every subsequent frame to the
//! `Navigator` until the session ends.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

use crate::client::{BotClient, SensorFrame};
use crate::config::KurmaConfig;
use crate::error::Result;
use crate::grid::TileGrid;
use crate::mqtt::MqttCommandSource;
use crate::nav::{NavConfig, Navigator, StepOutcome};
use crate::robot::{HOME_RGB, PhysicalBot, RobotControl, SimBot};
use crate::shared::{CmdEvent, ConnectionState, SharedHandle};
use crate::threads::SensorPump;

/// Bound on buffered sensor frames between the pump and the game loop.
const SENSOR_CHANNEL_BOUND: usize = 32;

/// How often the idle loop wakes to poll for commands.
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Why a robot session ended.
enum SessionEnd {
    /// User asked to disconnect; back to idle.
    Toggled,
    /// Sensor stream went silent or closed; back to idle.
    Disconnected,
    /// Connection never produced a frame within the timeout.
    ConnectTimeout,
    /// The daemon refused the connection.
    ConnectFailed,
    /// Quit the whole game.
    Quit,
}

pub struct GameThread {
    config: KurmaConfig,
    shared: SharedHandle,
    ui_rx: Receiver<CmdEvent>,
    net_rx: Option<Receiver<CmdEvent>>,
    mqtt: Option<MqttCommandSource>,
}

impl GameThread {
    pub fn new(config: KurmaConfig, shared: SharedHandle, ui_rx: Receiver<CmdEvent>) -> Self {
        // The command transport is optional and absent-tolerant: a broker
        // failure costs us the card controller, nothing else.
        let (mqtt, net_rx) = match &config.connection.mqtt_broker {
            Some(broker) => {
                let (net_tx, net_rx) = mpsc::channel();
                match MqttCommandSource::start(broker, config.connection.mqtt_port, net_tx) {
                    Ok(source) => (Some(source), Some(net_rx)),
                    Err(e) => {
                        tracing::warn!("MQTT command source unavailable: {}", e);
                        (None, None)
                    }
                }
            }
            None => (None, None),
        };

        Self {
            config,
            shared,
            ui_rx,
            net_rx,
            mqtt,
        }
    }

    pub fn run(&mut self) -> Result<()> {
        tracing::info!("Game thread started");

        let result = self.idle_loop();

        self.shared.set_connection(ConnectionState::Idle);
        self.shared.signal_shutdown();
        if let Some(mqtt) = self.mqtt.take() {
            mqtt.stop();
        }
        tracing::info!("Game thread exited");
        result
    }

    /// Idle connection state: wait for a connect request or quit.
    fn idle_loop(&mut self) -> Result<()> {
        loop {
            if self.shared.should_shutdown() {
                return Ok(());
            }

            match self.ui_rx.recv_timeout(IDLE_POLL) {
                Ok(CmdEvent::Quit) => return Ok(()),
                Ok(CmdEvent::ToggleConnect) => match self.run_session()? {
                    SessionEnd::Quit => return Ok(()),
                    _ => continue,
                },
                // motion and queue commands mean nothing without a robot
                Ok(_) => {}
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return Ok(()),
            }

            // keep the network queue from growing while nobody consumes it
            if let Some(net_rx) = &self.net_rx {
                while net_rx.try_recv().is_ok() {}
            }
        }
    }

    /// One robot session, from connect to teardown. The grid is reset for
    /// each session, keeping a goal the renderer may have relocated.
    fn run_session(&mut self) -> Result<SessionEnd> {
        let game = &self.config.game;
        let goal = self
            .shared
            .with_state(|s| s.grid.goal_tile())
            .unwrap_or(game.goal_tile);
        let start_pose = self.config.start_pose();

        self.shared.with_state(|s| {
            s.grid = TileGrid::new(game.grid_width, game.grid_height, goal);
            s.turtle_pose = start_pose;
            s.connection = ConnectionState::Connecting;
        });

        let end = self.connect_and_play();

        self.shared.set_connection(ConnectionState::Idle);
        match &end {
            Ok(SessionEnd::Quit) => {}
            Ok(_) => tracing::info!("Session ended, back to idle"),
            Err(e) => tracing::error!("Session ended on fatal error: {}", e),
        }
        end
    }

    fn connect_and_play(&mut self) -> Result<SessionEnd> {
        let timeout = Duration::from_millis(self.config.connection.timeout_ms);
        let (sensor_tx, sensor_rx) = mpsc::sync_channel::<SensorFrame>(SENSOR_CHANNEL_BOUND);
        let start_pose = self.config.start_pose();
        let robot_cfg = &self.config.robot;

        let (mut robot, pump): (Box<dyn RobotControl>, SensorPump) = if robot_cfg.simulate {
            tracing::info!("Starting simulated robot");
            let sim = SimBot::new(start_pose);
            let pump = SensorPump::simulated(sim.pose_handle(), sensor_tx);
            (Box::new(sim), pump)
        } else {
            let addr = self.config.address();
            tracing::info!("Connecting to robot daemon at {}...", addr);
            let client = match BotClient::connect_timeout(&addr, timeout) {
                Ok(client) => client,
                Err(e) => {
                    tracing::warn!("Connection failed: {}", e);
                    return Ok(SessionEnd::ConnectFailed);
                }
            };
            let (link, port) = client.into_parts();
            let pump = SensorPump::hardware(port, sensor_tx);

            // The first frame samples the calibration; without it there is
            // no frame mapping and no session.
            let first = match sensor_rx.recv_timeout(timeout) {
                Ok(frame) => frame,
                Err(_) => {
                    tracing::warn!("No sensor data within {:?}, aborting connect", timeout);
                    pump.stop();
                    return Ok(SessionEnd::ConnectTimeout);
                }
            };

            let bot = PhysicalBot::new(
                link,
                first,
                start_pose,
                robot_cfg.tile_size_cm,
                robot_cfg.turn_time_s,
                robot_cfg.forward_time_s,
            );
            (Box::new(bot), pump)
        };

        self.shared.set_connection(ConnectionState::Connected);
        tracing::info!("Robot connected");
        let (left, front, right) = HOME_RGB;
        if let Err(e) = robot.set_rgb(left, front, right) {
            tracing::warn!("Failed to set idle colors: {}", e);
        }

        let mut nav = Navigator::new(NavConfig {
            front_detection_threshold: robot_cfg.front_detection_threshold,
            crash_detection_threshold: robot_cfg.crash_detection_threshold,
        });

        let end = loop {
            if self.shared.should_shutdown() {
                break Ok(SessionEnd::Quit);
            }

            let frame = match sensor_rx.recv_timeout(timeout) {
                Ok(frame) => frame,
                Err(RecvTimeoutError::Timeout) => {
                    tracing::warn!("Sensor stream silent for {:?}, disconnecting", timeout);
                    break Ok(SessionEnd::Disconnected);
                }
                Err(RecvTimeoutError::Disconnected) => {
                    tracing::warn!("Sensor stream ended");
                    break Ok(SessionEnd::Disconnected);
                }
            };

            // merge command sources by concatenation: UI first, then network
            let mut events = Vec::new();
            while let Ok(event) = self.ui_rx.try_recv() {
                events.push(event);
            }
            if let Some(net_rx) = &self.net_rx {
                while let Ok(event) = net_rx.try_recv() {
                    events.push(event);
                }
            }

            let outcome = self.shared.with_state(|s| {
                let outcome = nav.step(&frame, &events, robot.as_mut(), &mut s.grid);
                s.turtle_pose = robot.pose();
                outcome
            });

            match outcome {
                Ok(StepOutcome::Continue) => {}
                Ok(StepOutcome::Disconnect) => break Ok(SessionEnd::Toggled),
                Ok(StepOutcome::Quit) => break Ok(SessionEnd::Quit),
                Err(e) => break Err(e),
            }
        };

        if nav.queued() > 0 {
            tracing::info!("Discarding {} queued commands", nav.queued());
        }
        if let Err(e) = robot.stop() {
            tracing::debug!("Stop on teardown failed: {}", e);
        }
        pump.stop();
        end
    }
}
