//! Sensor pump: feeds robot sensor frames into the game loop's channel.
//!
//! One pump per connection. The hardware pump reads UDP datagrams from the
//! daemon; the simulated pump synthesizes always-idle frames from the sim
//! robot's pose at 10Hz. Either way the game loop sees the same channel,
//! and the pump dropping its sender is the stream-end sentinel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{SyncSender, TrySendError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::client::{IDLE_WATERMARK, SensorFrame, SensorPort};
use crate::pose::Pose;

/// Simulated sensor cadence (10Hz).
const SIM_FRAME_INTERVAL: Duration = Duration::from_millis(100);

/// Handle to a running sensor pump thread.
pub struct SensorPump {
    handle: JoinHandle<()>,
    stop: Arc<AtomicBool>,
}

impl SensorPump {
    /// Pump frames from the daemon's UDP sensor port.
    pub fn hardware(mut port: SensorPort, tx: SyncSender<SensorFrame>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("sensor".into())
            .spawn(move || {
                loop {
                    if thread_stop.load(Ordering::Acquire) {
                        break;
                    }
                    match port.recv() {
                        Ok(Some(frame)) => match tx.try_send(frame) {
                            Ok(()) => {}
                            Err(TrySendError::Full(_)) => {
                                // consumer is behind; the next frame
                                // supersedes this one anyway
                                tracing::debug!("Sensor channel full, dropping frame");
                            }
                            Err(TrySendError::Disconnected(_)) => break,
                        },
                        // read timeout: loop around and re-check stop
                        Ok(None) => {}
                        Err(e) => {
                            tracing::error!("Sensor stream error: {}", e);
                            break;
                        }
                    }
                }
                tracing::debug!("Sensor pump exited");
            })
            .expect("Failed to spawn sensor thread");

        Self { handle, stop }
    }

    /// Synthesize frames from the simulated robot's pose.
    pub fn simulated(pose: Arc<Mutex<Pose>>, tx: SyncSender<SensorFrame>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("sensor".into())
            .spawn(move || {
                loop {
                    if thread_stop.load(Ordering::Acquire) {
                        break;
                    }
                    let p = *pose.lock().unwrap_or_else(PoisonError::into_inner);
                    let frame = SensorFrame {
                        x: p.x,
                        y: p.y,
                        degrees: p.theta,
                        watermark: IDLE_WATERMARK,
                        reflect_left: 0.0,
                        reflect_right: 0.0,
                    };
                    match tx.try_send(frame) {
                        Ok(()) | Err(TrySendError::Full(_)) => {}
                        Err(TrySendError::Disconnected(_)) => break,
                    }
                    thread::sleep(SIM_FRAME_INTERVAL);
                }
                tracing::debug!("Sim sensor pump exited");
            })
            .expect("Failed to spawn sensor thread");

        Self { handle, stop }
    }

    /// Stop the pump and join its thread.
    pub fn stop(self) {
        self.stop.store(true, Ordering::Release);
        if self.handle.join().is_err() {
            tracing::error!("Sensor thread panicked");
        }
    }
}
