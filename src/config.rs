//! Configuration resolution for caddxd.
//!
//! Turns parsed command-line input into one immutable, validated
//! [`RuntimeConfig`]. Invalid combinations are rejected here, before any
//! thread starts.
use std::{path::PathBuf, time::Duration};

use crate::cli::Cli;
use crate::error::ConfigError;

/// The physical link used to reach the panel.
///
/// Exactly one variant is chosen at resolution time; supplying both or
/// neither on the command line is a configuration error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSpec {
    /// Serial-over-LAN stream reachable at `host:port`.
    Tcp {
        /// Remote host.
        host: String,
        /// Remote port.
        port: u16,
    },
    /// Local serial device.
    Serial {
        /// Device path, e.g. `/dev/ttyUSB0`.
        device: String,
        /// Baud rate for the line.
        baud: u32,
    },
}

/// Broker connection parameters handed through to the controller.
#[derive(Debug, Clone)]
pub struct BrokerOptions {
    /// Broker address.
    pub address: String,
    /// Broker port.
    pub port: u16,
    /// Optional client username.
    pub username: Option<String>,
    /// Optional client password.
    pub password: Option<String>,
    /// Root topic for state publishing.
    pub state_topic_root: String,
    /// Topic monitored for command submissions.
    pub command_topic: String,
    /// Whether the session uses TLS.
    pub tls_active: bool,
    /// Whether TLS verification failures are ignored.
    pub tls_insecure: bool,
    /// Session timeout.
    pub timeout: Duration,
}

/// Immutable record of resolved startup parameters.
///
/// Created once from command-line input, never mutated afterwards, and
/// owned by the process lifecycle for the lifetime of the daemon.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Panel transport selection.
    pub transport: TransportSpec,
    /// Path to the panel config file (zone names etc.).
    pub panel_config: PathBuf,
    /// Broker connection parameters.
    pub broker: BrokerOptions,
    /// API listen address.
    pub api_address: String,
    /// API listen port.
    pub api_port: u16,
}

/// Resolves parsed arguments into a validated [`RuntimeConfig`].
///
/// Exactly one of `--solAddr` and `--serial` must be supplied, and a
/// broker address is mandatory. No side effects beyond producing the
/// record.
pub fn resolve(cli: &Cli) -> Result<RuntimeConfig, ConfigError> {
    let transport = match (&cli.sol_addr, &cli.serial) {
        (Some(_), Some(_)) => return Err(ConfigError::TransportConflict),
        (None, None) => return Err(ConfigError::TransportRequired),
        (Some(addr), None) => parse_sol_addr(addr)?,
        (None, Some(device)) => TransportSpec::Serial {
            device: device.clone(),
            baud: cli.baudrate,
        },
    };

    let address = cli
        .mqtt_broker
        .clone()
        .ok_or(ConfigError::MissingBroker)?;

    Ok(RuntimeConfig {
        transport,
        panel_config: cli.config.clone(),
        broker: BrokerOptions {
            address,
            port: cli.mqtt_port,
            username: cli.mqtt_user.clone(),
            password: cli.mqtt_password.clone(),
            state_topic_root: cli.mqtt_state_topic_root.clone(),
            command_topic: cli.mqtt_command_topic.clone(),
            tls_active: cli.mqtt_tls_active,
            tls_insecure: cli.mqtt_tls_insecure,
            timeout: Duration::from_secs(cli.mqtt_timeout),
        },
        api_address: cli.api_address.clone(),
        api_port: cli.api_port,
    })
}

/// Parses a `host:port` argument into a network transport.
fn parse_sol_addr(value: &str) -> Result<TransportSpec, ConfigError> {
    let (host, port) = value.split_once(':').ok_or_else(|| {
        ConfigError::InvalidSolAddr {
            value: value.to_string(),
            reason: "expected HOST:PORT".to_string(),
        }
    })?;

    if host.is_empty() {
        return Err(ConfigError::InvalidSolAddr {
            value: value.to_string(),
            reason: "host is empty".to_string(),
        });
    }

    let port = port.parse::<u16>().map_err(|err| ConfigError::InvalidSolAddr {
        value: value.to_string(),
        reason: err.to_string(),
    })?;

    Ok(TransportSpec::Tcp {
        host: host.to_string(),
        port,
    })
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut full = vec!["caddxd"];
        full.extend_from_slice(args);
        Cli::try_parse_from(full).unwrap()
    }

    #[test]
    fn network_transport_with_broker_resolves() {
        let cli = parse(&["--solAddr", "10.0.0.5:4444", "--mqttBroker", "10.0.0.1"]);
        let config = resolve(&cli).unwrap();

        assert_eq!(
            config.transport,
            TransportSpec::Tcp {
                host: "10.0.0.5".to_string(),
                port: 4444,
            }
        );
        assert_eq!(config.broker.address, "10.0.0.1");
        assert_eq!(config.broker.port, 1883);
    }

    #[test]
    fn serial_transport_carries_baud_rate() {
        let cli = parse(&[
            "--serial",
            "/dev/ttyUSB0",
            "--baudrate",
            "9600",
            "--mqttBroker",
            "127.0.0.1",
        ]);
        let config = resolve(&cli).unwrap();

        assert_eq!(
            config.transport,
            TransportSpec::Serial {
                device: "/dev/ttyUSB0".to_string(),
                baud: 9600,
            }
        );
    }

    #[test]
    fn neither_transport_is_rejected() {
        let cli = parse(&["--mqttBroker", "127.0.0.1"]);
        assert!(matches!(
            resolve(&cli),
            Err(ConfigError::TransportRequired)
        ));
    }

    #[test]
    fn both_transports_are_rejected() {
        let cli = parse(&[
            "--solAddr",
            "10.0.0.5:4444",
            "--serial",
            "/dev/ttyUSB0",
            "--mqttBroker",
            "127.0.0.1",
        ]);
        assert!(matches!(
            resolve(&cli),
            Err(ConfigError::TransportConflict)
        ));
    }

    #[test]
    fn missing_broker_is_rejected() {
        let cli = parse(&["--solAddr", "10.0.0.5:4444"]);
        assert!(matches!(resolve(&cli), Err(ConfigError::MissingBroker)));
    }

    #[test]
    fn malformed_sol_addr_is_rejected() {
        let cli = parse(&["--solAddr", "10.0.0.5", "--mqttBroker", "127.0.0.1"]);
        assert!(matches!(
            resolve(&cli),
            Err(ConfigError::InvalidSolAddr { .. })
        ));

        let cli = parse(&["--solAddr", "10.0.0.5:high", "--mqttBroker", "127.0.0.1"]);
        assert!(matches!(
            resolve(&cli),
            Err(ConfigError::InvalidSolAddr { .. })
        ));

        let cli = parse(&["--solAddr", ":4444", "--mqttBroker", "127.0.0.1"]);
        assert!(matches!(
            resolve(&cli),
            Err(ConfigError::InvalidSolAddr { .. })
        ));
    }

    #[test]
    fn broker_options_carry_credentials_and_topics() {
        let cli = parse(&[
            "--solAddr",
            "10.0.0.5:4444",
            "--mqttBroker",
            "broker.local",
            "--mqttPort",
            "8883",
            "--mqttUser",
            "alarm",
            "--mqttPassword",
            "hunter2",
            "--mqttStateTopicRoot",
            "house/alarm",
            "--mqttCommandTopic",
            "house/alarm/set",
            "--mqttTlsActive",
            "--mqttTimeout",
            "30",
        ]);
        let config = resolve(&cli).unwrap();
        let broker = &config.broker;

        assert_eq!(broker.port, 8883);
        assert_eq!(broker.username.as_deref(), Some("alarm"));
        assert_eq!(broker.password.as_deref(), Some("hunter2"));
        assert_eq!(broker.state_topic_root, "house/alarm");
        assert_eq!(broker.command_topic, "house/alarm/set");
        assert!(broker.tls_active);
        assert!(!broker.tls_insecure);
        assert_eq!(broker.timeout, Duration::from_secs(30));
    }
}
