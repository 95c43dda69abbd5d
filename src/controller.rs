//! Panel controller handle and processing loop.
//!
//! [`NxController`] is the single long-lived object representing the panel
//! connection and its in-memory state. It is constructed once at startup
//! and shared between the background processing loop and the foreground
//! API handlers; all internal state sits behind a mutex so the handle is
//! safe for concurrent access (`Send + Sync`).
//!
//! Message interpretation beyond framing belongs to the protocol engine;
//! the loop here frames the byte stream, validates checksums, and keeps
//! the shared zone/link state current.
use std::{
    collections::{BTreeMap, VecDeque},
    fs,
    io::{self, Read, Write},
    net::TcpStream,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
    thread,
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{BrokerOptions, TransportSpec};
use crate::constants::{FRAME_START, MAX_FRAME_LEN, RECONNECT_DELAY};
use crate::error::ControllerError;
use crate::lifecycle::ControllerLoop;

/// Baud rates the serial transport accepts.
const SUPPORTED_BAUDS: [u32; 5] = [9_600, 19_200, 38_400, 57_600, 115_200];

/// Byte stream to the panel, either a TCP socket or a serial device.
pub trait PanelLink: Read + Write + Send {}

impl<T: Read + Write + Send> PanelLink for T {}

/// Outbound port for state transitions.
///
/// The broker session is a separate collaborator; the controller hands it
/// subtopic/payload pairs and never sees broker wire details.
pub trait StateSink: Send + Sync {
    /// Publishes `payload` under `subtopic`, relative to the state root.
    fn publish(&self, subtopic: &str, payload: &str);
}

/// Sink that renders state transitions into the log stream. Used when no
/// broker session is wired in.
pub struct LogSink {
    root: String,
}

impl LogSink {
    /// Creates a sink rendering topics under the given state root.
    pub fn new(root: impl Into<String>) -> Self {
        Self { root: root.into() }
    }
}

impl StateSink for LogSink {
    fn publish(&self, subtopic: &str, payload: &str) {
        debug!(topic = %format!("{}/{subtopic}", self.root), %payload, "state published");
    }
}

/// Status of a single zone.
#[derive(Debug, Clone, Serialize)]
pub struct Zone {
    /// Display name from the panel config, or a generated placeholder.
    pub name: String,
    /// Whether the zone is currently faulted.
    pub faulted: bool,
}

/// Point-in-time copy of the panel state, serialised by the API.
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    /// Broker the bridge publishes towards.
    pub broker: String,
    /// Root topic for state publishing.
    pub state_topic_root: String,
    /// Whether the panel link is currently open.
    pub connected: bool,
    /// Frames accepted since startup.
    pub frames_rx: u64,
    /// Frames rejected (bad length or checksum) since startup.
    pub frames_bad: u64,
    /// Zone table keyed by zone number.
    pub zones: BTreeMap<u16, Zone>,
    /// Timestamp of the last accepted frame.
    pub last_event: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct PanelState {
    connected: bool,
    frames_rx: u64,
    frames_bad: u64,
    zones: BTreeMap<u16, Zone>,
    last_event: Option<DateTime<Utc>>,
}

/// The single live instance representing the panel connection plus its
/// in-memory state.
pub struct NxController {
    transport: TransportSpec,
    broker: BrokerOptions,
    state: Mutex<PanelState>,
    commands: Mutex<VecDeque<Vec<u8>>>,
    sink: Box<dyn StateSink>,
}

impl NxController {
    /// Builds the controller from the resolved transport and broker
    /// parameters. Zone display names are loaded from the panel config
    /// file when it exists; a missing file is not an error.
    pub fn new(
        transport: TransportSpec,
        panel_config: &Path,
        broker: BrokerOptions,
        sink: Box<dyn StateSink>,
    ) -> Result<Self, ControllerError> {
        if let TransportSpec::Serial { baud, .. } = transport {
            if !SUPPORTED_BAUDS.contains(&baud) {
                return Err(ControllerError::UnsupportedBaud(baud));
            }
        }

        let mut state = PanelState::default();
        for (number, name) in load_zone_names(panel_config)? {
            state.zones.insert(
                number,
                Zone {
                    name,
                    faulted: false,
                },
            );
        }

        Ok(Self {
            transport,
            broker,
            state: Mutex::new(state),
            commands: Mutex::new(VecDeque::new()),
            sink,
        })
    }

    /// Returns a point-in-time copy of the shared state.
    pub fn snapshot(&self) -> StateSnapshot {
        let state = self.state();
        StateSnapshot {
            broker: self.broker.address.clone(),
            state_topic_root: self.broker.state_topic_root.clone(),
            connected: state.connected,
            frames_rx: state.frames_rx,
            frames_bad: state.frames_bad,
            zones: state.zones.clone(),
            last_event: state.last_event,
        }
    }

    /// Queues a raw command payload for the processing loop to send.
    pub fn submit_command(&self, payload: Vec<u8>) {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(payload);
    }

    fn state(&self) -> MutexGuard<'_, PanelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_connected(&self, connected: bool) {
        self.state().connected = connected;
        self.sink
            .publish("system/avail", if connected { "online" } else { "offline" });
    }

    fn open_transport(&self) -> io::Result<Box<dyn PanelLink>> {
        match &self.transport {
            TransportSpec::Tcp { host, port } => {
                let stream = TcpStream::connect((host.as_str(), *port))?;
                Ok(Box::new(stream))
            }
            TransportSpec::Serial { device, baud } => {
                Ok(Box::new(open_serial(device, *baud)?))
            }
        }
    }

    /// Reads frames off the link until it fails. Queued commands are
    /// drained between frames.
    fn pump(&self, link: &mut dyn PanelLink) -> io::Result<()> {
        let mut byte = [0u8; 1];
        let mut frame = Vec::with_capacity(MAX_FRAME_LEN + 2);
        loop {
            self.drain_commands(link)?;

            link.read_exact(&mut byte)?;
            if byte[0] != FRAME_START {
                continue;
            }

            link.read_exact(&mut byte)?;
            let len = byte[0] as usize;
            if len == 0 || len > MAX_FRAME_LEN {
                self.state().frames_bad += 1;
                continue;
            }

            frame.resize(len + 2, 0);
            link.read_exact(&mut frame)?;
            self.apply_frame(&frame[..len], &frame[len..]);
        }
    }

    fn drain_commands(&self, link: &mut dyn PanelLink) -> io::Result<()> {
        loop {
            let payload = self
                .commands
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            let Some(payload) = payload else {
                return Ok(());
            };
            if payload.is_empty() || payload.len() > MAX_FRAME_LEN {
                warn!(bytes = payload.len(), "dropping command with invalid length");
                continue;
            }
            let (s1, s2) = fletcher(&payload);
            let mut out = Vec::with_capacity(payload.len() + 4);
            out.push(FRAME_START);
            out.push(payload.len() as u8);
            out.extend_from_slice(&payload);
            out.push(s1);
            out.push(s2);
            link.write_all(&out)?;
            link.flush()?;
            debug!(bytes = payload.len(), "command sent to panel");
        }
    }

    fn apply_frame(&self, payload: &[u8], checksum: &[u8]) {
        let (s1, s2) = fletcher(payload);
        if checksum != [s1, s2] {
            self.state().frames_bad += 1;
            return;
        }

        {
            let mut state = self.state();
            state.frames_rx += 1;
            state.last_event = Some(Utc::now());
        }

        // Zone status transition (message type 0x04): zone index, flags.
        if let [0x04, index, flags, ..] = payload {
            let number = u16::from(*index) + 1;
            let faulted = flags & 0x01 != 0;
            let mut state = self.state();
            let zone = state.zones.entry(number).or_insert_with(|| Zone {
                name: format!("Zone {number}"),
                faulted: false,
            });
            zone.faulted = faulted;
            drop(state);
            self.sink.publish(
                &format!("zone/{number}/fault"),
                if faulted { "1" } else { "0" },
            );
        }
    }
}

impl ControllerLoop for NxController {
    /// Runs the processing loop for the lifetime of the process: open the
    /// transport, pump frames until the link drops, back off, repeat.
    fn controller_loop(&self) {
        loop {
            match self.open_transport() {
                Ok(mut link) => {
                    info!("panel link established");
                    self.set_connected(true);
                    if let Err(err) = self.pump(link.as_mut()) {
                        warn!("panel link lost: {err}");
                    }
                    self.set_connected(false);
                }
                Err(err) => warn!("failed to open panel transport: {err}"),
            }
            thread::sleep(RECONNECT_DELAY);
        }
    }
}

/// Reads zone display names from the `[zones]` section of the panel
/// config file. A missing file yields an empty table.
fn load_zone_names(path: &Path) -> Result<BTreeMap<u16, String>, ControllerError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(parse_zone_names(&content)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(source) => Err(ControllerError::PanelConfig {
            path: PathBuf::from(path),
            source,
        }),
    }
}

fn parse_zone_names(content: &str) -> BTreeMap<u16, String> {
    let mut zones = BTreeMap::new();
    let mut in_zones = false;
    for raw in content.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if line.starts_with('[') {
            in_zones = line.eq_ignore_ascii_case("[zones]");
            continue;
        }
        if !in_zones {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            if let Ok(number) = key.trim().parse::<u16>() {
                zones.insert(number, value.trim().to_string());
            }
        }
    }
    zones
}

/// Checksum over a frame payload, as used on the panel link.
fn fletcher(data: &[u8]) -> (u8, u8) {
    let mut sum1: u8 = 0;
    let mut sum2: u8 = 0;
    for byte in data {
        sum1 = sum1.wrapping_add(*byte);
        sum2 = sum2.wrapping_add(sum1);
    }
    (sum1, sum2)
}

#[cfg(unix)]
fn open_serial(device: &str, baud: u32) -> io::Result<fs::File> {
    use nix::sys::termios::{self, SetArg};

    let file = fs::OpenOptions::new().read(true).write(true).open(device)?;
    let baud = baud_rate(baud).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unsupported baud rate {baud}"),
        )
    })?;

    let mut tio = termios::tcgetattr(&file).map_err(io::Error::from)?;
    termios::cfmakeraw(&mut tio);
    termios::cfsetspeed(&mut tio, baud).map_err(io::Error::from)?;
    termios::tcsetattr(&file, SetArg::TCSANOW, &tio).map_err(io::Error::from)?;
    Ok(file)
}

#[cfg(unix)]
fn baud_rate(baud: u32) -> Option<nix::sys::termios::BaudRate> {
    use nix::sys::termios::BaudRate;

    match baud {
        9_600 => Some(BaudRate::B9600),
        19_200 => Some(BaudRate::B19200),
        38_400 => Some(BaudRate::B38400),
        57_600 => Some(BaudRate::B57600),
        115_200 => Some(BaudRate::B115200),
        _ => None,
    }
}

#[cfg(not(unix))]
fn open_serial(_device: &str, _baud: u32) -> io::Result<fs::File> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "serial transport requires a unix platform",
    ))
}
