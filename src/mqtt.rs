//! MQTT command source for the wireless card controller.
//!
//! The controller publishes the set of currently-pressed buttons as a JSON
//! array of names on every change. Presses are de-duplicated against the
//! previous set so a held button fires once per new press, not once per
//! message. Broker failures are logged and retried; they never take the
//! game down.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rumqttc::{Client, Event, MqttOptions, Packet, QoS};

use crate::error::{KurmaError, Result};
use crate::shared::CmdEvent;

/// Topic the card controller publishes button-press sets on.
pub const CONTROLLER_TOPIC: &str = "controller/buttons_pressed";

/// Delay before retrying after a broker error.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Background MQTT client translating button presses into command events.
pub struct MqttCommandSource {
    client: Client,
    handle: Option<JoinHandle<()>>,
    stopping: Arc<AtomicBool>,
}

impl MqttCommandSource {
    /// Connect to the broker and start the network loop. Decoded command
    /// events are pushed into `tx`.
    pub fn start(host: &str, port: u16, tx: Sender<CmdEvent>) -> Result<Self> {
        let mut options = MqttOptions::new("kurma-nav", host, port);
        options.set_keep_alive(Duration::from_secs(5));

        let (client, mut connection) = Client::new(options, 16);
        let stopping = Arc::new(AtomicBool::new(false));

        let loop_client = client.clone();
        let loop_stopping = Arc::clone(&stopping);
        let host_label = format!("{}:{}", host, port);

        let handle = thread::Builder::new()
            .name("mqtt".into())
            .spawn(move || {
                let mut pressed: Vec<String> = Vec::new();

                for event in connection.iter() {
                    if loop_stopping.load(Ordering::Acquire) {
                        break;
                    }
                    match event {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            tracing::info!("Connected to broker at {}", host_label);
                            // (re)subscribe on every connect; the broker
                            // forgets our subscriptions across reconnects
                            if let Err(e) =
                                loop_client.subscribe(CONTROLLER_TOPIC, QoS::AtMostOnce)
                            {
                                tracing::warn!("MQTT subscribe failed: {}", e);
                            }
                        }
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            if publish.topic == CONTROLLER_TOPIC
                                && decode_presses(&publish.payload, &mut pressed, &tx).is_err()
                            {
                                // game side hung up
                                break;
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            if loop_stopping.load(Ordering::Acquire) {
                                break;
                            }
                            tracing::warn!(
                                "MQTT connection error ({}), will attempt reconnect",
                                e
                            );
                            thread::sleep(RECONNECT_DELAY);
                        }
                    }
                }
                tracing::info!("MQTT loop exited");
            })
            .map_err(|e| KurmaError::Transport(format!("Failed to spawn MQTT thread: {}", e)))?;

        Ok(Self {
            client,
            handle: Some(handle),
            stopping,
        })
    }

    /// Disconnect from the broker and stop the network loop.
    pub fn stop(mut self) {
        self.stopping.store(true, Ordering::Release);
        if let Err(e) = self.client.disconnect() {
            tracing::debug!("MQTT disconnect: {}", e);
        }
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            tracing::error!("MQTT thread panicked");
        }
    }
}

/// Map a newly-pressed button name to its command event.
fn button_event(name: &str) -> CmdEvent {
    match name {
        "A" => CmdEvent::Left,
        "B" => CmdEvent::Up,
        "C" => CmdEvent::Right,
        _ => CmdEvent::None,
    }
}

/// Decode one button-press-set payload, emitting an event per button that
/// was not in the previous set. Err means the receiver is gone.
fn decode_presses(
    payload: &[u8],
    pressed: &mut Vec<String>,
    tx: &Sender<CmdEvent>,
) -> std::result::Result<(), std::sync::mpsc::SendError<CmdEvent>> {
    let new_buttons: Vec<String> = match serde_json::from_slice(payload) {
        Ok(buttons) => buttons,
        Err(e) => {
            tracing::warn!("Bad controller payload: {}", e);
            return Ok(());
        }
    };

    for name in &new_buttons {
        if !pressed.contains(name) {
            let event = button_event(name);
            if event != CmdEvent::None {
                tx.send(event)?;
            }
        }
    }
    *pressed = new_buttons;
    Ok(())
}
