//! Error handling for caddxd.
use std::path::PathBuf;

use thiserror::Error;

use crate::lifecycle::Phase;

/// Errors detected while resolving command-line input into a runtime
/// configuration. All of these are fatal before any thread starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Neither a network nor a serial transport was supplied.
    #[error("transport required: supply --solAddr or --serial")]
    TransportRequired,

    /// Both transports were supplied at once.
    #[error("conflicting transports: --solAddr and --serial are mutually exclusive")]
    TransportConflict,

    /// No broker address was supplied.
    #[error("missing MQTT broker address (--mqttBroker)")]
    MissingBroker,

    /// The `host:port` transport argument could not be parsed.
    #[error("invalid host:port '{value}': {reason}")]
    InvalidSolAddr {
        /// The raw argument as given on the command line.
        value: String,
        /// Why parsing rejected it.
        reason: String,
    },
}

/// Errors attaching log sinks at startup. No fallback sink is substituted.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The directory holding a file sink could not be created.
    #[error("failed to create log directory '{path}': {source}")]
    Directory {
        /// Directory that could not be created.
        path: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// A rotating file appender could not be opened.
    #[error("failed to open log destination: {0}")]
    Appender(#[from] tracing_appender::rolling::InitError),

    /// A log file path with no file name component was supplied.
    #[error("log destination '{0}' has no file name")]
    BadPath(PathBuf),
}

/// Errors constructing the panel controller handle.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// The panel config file exists but could not be read.
    #[error("failed to read panel config '{path}': {source}")]
    PanelConfig {
        /// Path to the panel config file.
        path: PathBuf,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// The requested serial baud rate is not supported.
    #[error("unsupported baud rate {0}")]
    UnsupportedBaud(u32),
}

/// Errors escaping the blocking foreground serve call. Caught at the
/// single top-level boundary and mapped to a nonzero exit.
#[derive(Debug, Error)]
pub enum ServeError {
    /// The API listener could not bind its address.
    #[error("failed to bind API listener on {addr}:{port}: {source}")]
    Bind {
        /// Requested listen address.
        addr: String,
        /// Requested listen port.
        port: u16,
        /// The underlying error that occurred.
        #[source]
        source: std::io::Error,
    },

    /// The listener failed while accepting connections.
    #[error("API listener failed: {0}")]
    Accept(#[from] std::io::Error),
}

/// Errors enforcing the forward-only lifecycle contract.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// An operation was attempted out of order.
    #[error("invalid lifecycle transition: {from:?} -> {to:?}")]
    Transition {
        /// Phase the lifecycle was in.
        from: Phase,
        /// Phase the operation required next.
        to: Phase,
    },

    /// A configured lifecycle was required but none exists.
    #[error("lifecycle has no resolved configuration")]
    NotConfigured,

    /// The controller worker thread could not be spawned.
    #[error("failed to spawn controller worker thread: {0}")]
    WorkerSpawn(#[from] std::io::Error),
}

/// Top-level error for the startup path of the binary.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Controller(#[from] ControllerError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}
