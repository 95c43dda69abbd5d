//! Caddxd bridges a Caddx NX-series alarm panel to an MQTT broker and
//! serves a small status API while it runs. The panel is reached over a
//! serial-over-LAN socket or a local serial device; one background thread
//! runs the panel processing loop while the foreground thread blocks on
//! the API server, and both share a single controller handle.

/// Foreground status API server.
pub mod api;

/// CLI interface.
pub mod cli;

/// Startup configuration resolution.
pub mod config;

/// Shared constants.
pub mod constants;

/// Panel controller handle and processing loop.
pub mod controller;

/// Error handling.
pub mod error;

/// Process lifecycle sequencing.
pub mod lifecycle;

/// Log sink pipeline.
pub mod logging;
