use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn version_prints_and_exits() {
    Command::new(assert_cmd::cargo::cargo_bin!("caddxd"))
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("caddxd"))
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn missing_transport_exits_with_error() {
    Command::new(assert_cmd::cargo::cargo_bin!("caddxd"))
        .arg("--mqttBroker")
        .arg("127.0.0.1")
        .assert()
        .failure()
        .stderr(predicate::str::contains("transport required"));
}

#[test]
fn conflicting_transports_exit_with_error() {
    Command::new(assert_cmd::cargo::cargo_bin!("caddxd"))
        .arg("--solAddr")
        .arg("10.0.0.5:4444")
        .arg("--serial")
        .arg("/dev/ttyUSB0")
        .arg("--mqttBroker")
        .arg("127.0.0.1")
        .assert()
        .failure()
        .stderr(predicate::str::contains("mutually exclusive"));
}

#[test]
fn missing_broker_exits_with_error() {
    Command::new(assert_cmd::cargo::cargo_bin!("caddxd"))
        .arg("--solAddr")
        .arg("10.0.0.5:4444")
        .assert()
        .failure()
        .stderr(predicate::str::contains("broker"));
}

#[test]
fn malformed_sol_addr_exits_with_error() {
    Command::new(assert_cmd::cargo::cargo_bin!("caddxd"))
        .arg("--solAddr")
        .arg("10.0.0.5")
        .arg("--mqttBroker")
        .arg("127.0.0.1")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid host:port"));
}

#[test]
fn unknown_log_level_is_rejected_by_the_parser() {
    Command::new(assert_cmd::cargo::cargo_bin!("caddxd"))
        .arg("--logLevel")
        .arg("VERBOSE")
        .assert()
        .failure()
        .stderr(predicate::str::contains("logLevel"));
}
