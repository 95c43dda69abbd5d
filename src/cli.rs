//! Command-line interface for caddxd.
use std::{fmt, path::PathBuf};

use clap::{Parser, ValueEnum};

use crate::constants::{
    DEFAULT_API_PORT, DEFAULT_BAUD, DEFAULT_MQTT_PORT, DEFAULT_MQTT_TIMEOUT_SECS,
};
use crate::logging::LoggingOptions;

/// Severity displayed on the console; gates the root of the log pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "UPPER")]
pub enum DisplayLevel {
    /// Show everything.
    Debug,
    /// Show informational messages and above.
    #[default]
    Info,
    /// Show warnings and errors only.
    Warning,
}

impl DisplayLevel {
    /// Directive string for the root filter.
    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayLevel::Debug => "debug",
            DisplayLevel::Info => "info",
            DisplayLevel::Warning => "warn",
        }
    }
}

impl fmt::Display for DisplayLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DisplayLevel::Debug => "DEBUG",
            DisplayLevel::Info => "INFO",
            DisplayLevel::Warning => "WARNING",
        };
        write!(f, "{name}")
    }
}

/// Command-line interface for caddxd.
///
/// Long flag names are kept compatible with earlier releases of the
/// bridge, so several use camelCase rather than kebab-case.
#[derive(Debug, Parser)]
#[command(name = "caddxd", version, author)]
#[command(about = "Caddx NX alarm panel to MQTT bridge", long_about = None)]
pub struct Cli {
    /// Path to the panel config file.
    #[arg(long, value_name = "FILE", default_value = "config.ini")]
    pub config: PathBuf,

    /// Enable debug logging to a rotating file when not on a terminal.
    #[arg(long)]
    pub debug: bool,

    /// Path to a rotating general log file.
    #[arg(long, value_name = "FILE")]
    pub log: Option<PathBuf>,

    /// Level of log displayed to console.
    #[arg(
        long = "logLevel",
        value_enum,
        value_name = "LOG_LEVEL_CONSOLE",
        default_value_t = DisplayLevel::Info
    )]
    pub log_level: DisplayLevel,

    /// Host and port to connect for the serial-over-LAN stream.
    #[arg(long = "solAddr", value_name = "HOST:PORT")]
    pub sol_addr: Option<String>,

    /// Serial port to open for the stream.
    #[arg(long, value_name = "DEVICE")]
    pub serial: Option<String>,

    /// Serial baud rate.
    #[arg(long, value_name = "BAUD", default_value_t = DEFAULT_BAUD)]
    pub baudrate: u32,

    /// API listen address.
    #[arg(long = "apiAddress", value_name = "API_ADDRESS", default_value = "127.0.0.1")]
    pub api_address: String,

    /// API listen port.
    #[arg(long = "apiPort", default_value_t = DEFAULT_API_PORT)]
    pub api_port: u16,

    /// MQTT broker address. Required for activation.
    #[arg(long = "mqttBroker", value_name = "MQTT_BROKER")]
    pub mqtt_broker: Option<String>,

    /// MQTT broker port.
    #[arg(long = "mqttPort", value_name = "MQTT_PORT", default_value_t = DEFAULT_MQTT_PORT)]
    pub mqtt_port: u16,

    /// MQTT client username.
    #[arg(long = "mqttUser", value_name = "MQTT_USERNAME")]
    pub mqtt_user: Option<String>,

    /// MQTT client password.
    #[arg(long = "mqttPassword", value_name = "MQTT_PASSWORD")]
    pub mqtt_password: Option<String>,

    /// Root topic for state publishing.
    #[arg(
        long = "mqttStateTopicRoot",
        value_name = "STATE_TOPIC_ROOT",
        default_value = "home/alarm"
    )]
    pub mqtt_state_topic_root: String,

    /// Command topic monitored for submissions.
    #[arg(
        long = "mqttCommandTopic",
        value_name = "COMMAND_TOPIC",
        default_value = "home/alarm/set"
    )]
    pub mqtt_command_topic: String,

    /// Enable MQTT TLS.
    #[arg(long = "mqttTlsActive")]
    pub mqtt_tls_active: bool,

    /// Ignore MQTT TLS verification failures. Not recommended.
    #[arg(long = "mqttTlsInsecure")]
    pub mqtt_tls_insecure: bool,

    /// MQTT timeout in seconds.
    #[arg(long = "mqttTimeout", value_name = "MQTT_TIMEOUT", default_value_t = DEFAULT_MQTT_TIMEOUT_SECS)]
    pub mqtt_timeout: u64,
}

impl Cli {
    /// Extracts the options that drive the log sink pipeline.
    pub fn logging_options(&self) -> LoggingOptions {
        LoggingOptions {
            display_level: self.log_level,
            debug: self.debug,
            log_file: self.log.clone(),
        }
    }
}

/// Parses command-line arguments and returns a `Cli` struct.
pub fn parse_args() -> Cli {
    Cli::parse()
}
