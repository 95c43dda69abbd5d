//! Constants shared across the caddxd daemon.

use std::time::Duration;

/// Default MQTT broker port.
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Default API listen port.
pub const DEFAULT_API_PORT: u16 = 5007;

/// Default serial baud rate for NX panels.
pub const DEFAULT_BAUD: u32 = 38400;

/// Default MQTT session timeout in seconds.
pub const DEFAULT_MQTT_TIMEOUT_SECS: u64 = 10;

/// File name prefix for the rotating debug log.
pub const DEBUG_LOG_FILE: &str = "debug.log";

/// Number of rotated log files kept per file sink.
pub const LOG_BACKUP_COUNT: usize = 3;

/// Tracing target used for API access-log lines.
///
/// The WARNING display level suppresses INFO records carrying this target
/// on every sink; everything else passes through unchanged.
pub const API_ACCESS_TARGET: &str = "caddxd::api::access";

/// Name of the detached thread running the controller loop.
pub const WORKER_THREAD_NAME: &str = "controller-loop";

/// Delay before reopening the panel transport after it drops.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Leading byte of a binary panel frame.
pub const FRAME_START: u8 = 0x7e;

/// Upper bound on the payload length byte of a panel frame.
pub const MAX_FRAME_LEN: usize = 0xfa;
