//! Foreground status API server.
//!
//! A deliberately small blocking HTTP server: every request is answered
//! with a JSON snapshot of the shared controller handle. The route
//! surface beyond that belongs to the full API collaborator; this core
//! only defines the blocking `serve` contract and the handle injection.
use std::{
    io::{BufRead, BufReader, Read, Write},
    net::{TcpListener, TcpStream},
    sync::Arc,
    thread,
};

use tracing::{debug, info, warn};

use crate::constants::{API_ACCESS_TARGET, MAX_FRAME_LEN};
use crate::controller::NxController;
use crate::error::ServeError;
use crate::lifecycle::ForegroundServe;

/// Blocking request server reading the shared controller handle.
pub struct ApiServer {
    controller: Arc<NxController>,
}

impl ApiServer {
    /// Creates a server over the published controller handle. The handle
    /// is injected here, before `serve` is invoked; handlers never reach
    /// for it through a global.
    pub fn new(controller: Arc<NxController>) -> Self {
        Self { controller }
    }

    fn serve_on(&self, listener: TcpListener) -> Result<(), ServeError> {
        for stream in listener.incoming() {
            let stream = stream?;
            let controller = Arc::clone(&self.controller);
            let spawned = thread::Builder::new()
                .name("api-worker".to_string())
                .spawn(move || {
                    if let Err(err) = handle_request(stream, &controller) {
                        debug!("request handler failed: {err}");
                    }
                });
            if let Err(err) = spawned {
                warn!("failed to spawn request handler: {err}");
            }
        }
        Ok(())
    }
}

impl ForegroundServe for ApiServer {
    /// Binds the listener and serves until it fails. Returns only on
    /// listener failure; this call is the main thread's blocking point
    /// for the life of the process.
    fn serve(&self, addr: &str, port: u16, threaded: bool) -> Result<(), ServeError> {
        let listener =
            TcpListener::bind((addr, port)).map_err(|source| ServeError::Bind {
                addr: addr.to_string(),
                port,
                source,
            })?;
        info!("API listening on {addr}:{port}");

        if threaded {
            return self.serve_on(listener);
        }

        for stream in listener.incoming() {
            let stream = stream?;
            if let Err(err) = handle_request(stream, &self.controller) {
                debug!("request handler failed: {err}");
            }
        }
        Ok(())
    }
}

/// Largest accepted command body: one frame payload, hex-encoded.
const MAX_COMMAND_BODY: usize = MAX_FRAME_LEN * 2;

fn handle_request(
    mut stream: TcpStream,
    controller: &NxController,
) -> std::io::Result<()> {
    let peer = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    let (request_line, content_length, body) = {
        let mut reader = BufReader::new(&mut stream);
        let mut request_line = String::new();
        reader.read_line(&mut request_line)?;

        let mut content_length = 0usize;
        let mut header = String::new();
        while reader.read_line(&mut header)? > 2 {
            if let Some((name, value)) = header.split_once(':') {
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().unwrap_or(0);
                }
            }
            header.clear();
        }

        let mut body = vec![0u8; content_length.min(MAX_COMMAND_BODY)];
        if !body.is_empty() {
            reader.read_exact(&mut body)?;
        }
        // Drain any excess so the peer can read the response cleanly.
        if content_length > body.len() {
            std::io::copy(
                &mut reader.by_ref().take((content_length - body.len()) as u64),
                &mut std::io::sink(),
            )?;
        }
        (request_line, content_length, body)
    };

    let (status, payload) = if request_line.starts_with("POST /command") {
        // A body longer than one frame payload can never be sent; reject
        // it here rather than queue something the loop would drop.
        if content_length > MAX_COMMAND_BODY {
            ("400 Bad Request", "{\"error\":\"command too long\"}".to_string())
        } else {
            match parse_hex(String::from_utf8_lossy(&body).trim()) {
                Some(command) if !command.is_empty() => {
                    controller.submit_command(command);
                    ("202 Accepted", "{\"queued\":true}".to_string())
                }
                _ => (
                    "400 Bad Request",
                    "{\"error\":\"invalid command payload\"}".to_string(),
                ),
            }
        }
    } else {
        ("200 OK", serde_json::to_string(&controller.snapshot())?)
    };

    let response = format!(
        "HTTP/1.0 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{payload}",
        payload.len()
    );
    stream.write_all(response.as_bytes())?;
    stream.flush()?;

    info!(
        target: API_ACCESS_TARGET,
        peer = %peer,
        request = %request_line.trim_end(),
        "request served"
    );
    Ok(())
}

/// Decodes a hex command body, e.g. `"3e01"` into `[0x3e, 0x01]`.
fn parse_hex(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|at| {
            text.get(at..at + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
        })
        .collect()
}
