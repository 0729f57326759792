//! Robot daemon client: TCP command link and UDP sensor feed.
//!
//! Commands are staged as u32 big-endian length-prefixed JSON frames over
//! TCP; the daemon streams sensor frames back over UDP with the same
//! framing. The daemon executes one staged pose at a time and reports
//! idleness through the sensor watermark.

use crate::error::{KurmaError, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::net::{TcpStream, UdpSocket};
use std::time::Duration;

/// Watermark value the pose sensor reports once motion has settled.
pub const IDLE_WATERMARK: u8 = 255;

/// Default receive buffer size (sensor frames are small)
const DEFAULT_BUFFER_SIZE: usize = 2048;

/// One sensor reading: native pose in cm plus the front reflectance pair.
/// Frozen once received; each frame supersedes the previous one wholesale.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct SensorFrame {
    pub x: f32,
    pub y: f32,
    pub degrees: f32,
    pub watermark: u8,
    pub reflect_left: f32,
    pub reflect_right: f32,
}

impl SensorFrame {
    /// Whether the robot has finished executing its staged motion.
    pub fn is_idle(&self) -> bool {
        self.watermark == IDLE_WATERMARK
    }
}

/// Addressing mode for a staged pose.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PoseMode {
    Global,
    RelativeMeasured,
}

/// Sounds the robot can play from its onboard speaker.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BotSound {
    Sigh,
    NoWay,
    Trumpet,
    Yippee,
}

/// Commands accepted by the robot daemon.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum BotCommand {
    /// Stage a pose target; the daemon drives toward it over `time_s`.
    StagePose {
        x: f32,
        y: f32,
        degrees: f32,
        time_s: f32,
        mode: PoseMode,
    },
    /// Abort the staged motion.
    StageStop,
    /// Ear and front light colors, each RGB in `[0, 1]`.
    Rgb {
        ear_left: [f32; 3],
        front: [f32; 3],
        ear_right: [f32; 3],
    },
    /// Main button indicator LED.
    MainLed { on: bool },
    Audio { sound: BotSound },
}

/// Connected client, split into its command and sensor halves with
/// [`BotClient::into_parts`] so the sensor pump thread can own the UDP side.
pub struct BotClient {
    stream: TcpStream,
    udp: UdpSocket,
}

impl BotClient {
    /// Connect with timeout (the UDP sensor port mirrors the TCP port).
    pub fn connect_timeout(addr: &str, timeout: Duration) -> Result<Self> {
        let addr: std::net::SocketAddr = addr
            .parse()
            .map_err(|e| KurmaError::Config(format!("Invalid robot address: {}", e)))?;
        let stream = TcpStream::connect_timeout(&addr, timeout)?;

        let udp_bind_addr = format!("0.0.0.0:{}", addr.port());
        let udp = UdpSocket::bind(&udp_bind_addr).map_err(|e| {
            KurmaError::Config(format!("Failed to bind UDP to {}: {}", udp_bind_addr, e))
        })?;
        udp.set_read_timeout(Some(Duration::from_millis(100)))?;

        tracing::info!("UDP socket bound to port {} for sensor frames", addr.port());

        Ok(Self { stream, udp })
    }

    pub fn into_parts(self) -> (CommandLink, SensorPort) {
        (
            CommandLink {
                stream: self.stream,
            },
            SensorPort {
                udp: self.udp,
                buffer: vec![0u8; DEFAULT_BUFFER_SIZE],
            },
        )
    }
}

/// Write half: stages commands on the TCP stream.
pub struct CommandLink {
    stream: TcpStream,
}

impl CommandLink {
    pub fn send(&mut self, cmd: &BotCommand) -> Result<()> {
        let encoded = serde_json::to_vec(cmd)?;
        let len = encoded.len() as u32;

        self.stream.write_all(&len.to_be_bytes())?;
        self.stream.write_all(&encoded)?;
        self.stream.flush()?;

        Ok(())
    }
}

/// Read half: receives sensor frames from the UDP socket.
pub struct SensorPort {
    udp: UdpSocket,
    buffer: Vec<u8>,
}

impl SensorPort {
    /// Receive one sensor frame; `None` when the read timed out.
    pub fn recv(&mut self) -> Result<Option<SensorFrame>> {
        match self.udp.recv(&mut self.buffer) {
            Ok(len) => {
                if len < 4 {
                    return Ok(None);
                }
                let msg_len = u32::from_be_bytes([
                    self.buffer[0],
                    self.buffer[1],
                    self.buffer[2],
                    self.buffer[3],
                ]) as usize;

                if len < 4 + msg_len {
                    return Err(KurmaError::Protocol("Incomplete sensor datagram".into()));
                }

                let frame: SensorFrame = serde_json::from_slice(&self.buffer[4..4 + msg_len])?;
                Ok(Some(frame))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(KurmaError::Connection(e)),
        }
    }
}
