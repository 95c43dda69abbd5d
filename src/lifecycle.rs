//! Process lifecycle sequencing.
//!
//! The lifecycle controller owns the startup order of the daemon: resolve
//! configuration, construct the controller handle, publish it, start the
//! background worker, then block on the foreground server. Transitions
//! are strictly forward-only; there is no retry or re-entry within one
//! process lifetime.
//!
//! The shared handle is published as an `Arc` before either consumer
//! thread starts, so construction happens-before both of them. The worker
//! thread is detached and never joined: when the process exits, it is
//! terminated abruptly along with it. That abandonment is deliberate
//! terminal-shutdown policy, and it also means a fault inside the worker
//! is invisible here.
use std::{sync::Arc, thread};

use tracing::{debug, error, info};

use crate::config::RuntimeConfig;
use crate::constants::WORKER_THREAD_NAME;
use crate::error::{LifecycleError, ServeError};

/// Startup phases, in order. `Terminated` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Phase {
    /// Nothing resolved yet.
    Unconfigured = 0,
    /// Configuration resolved and stored.
    Configured = 1,
    /// Controller handle constructed and published.
    ControllerConstructed = 2,
    /// Background worker running.
    WorkerStarted = 3,
    /// Foreground server blocking the main thread.
    ServingForeground = 4,
    /// Single exit path taken; no further transitions.
    Terminated = 5,
}

/// Background worker entry point: the controller's processing loop,
/// intended to run for the lifetime of the process.
pub trait ControllerLoop: Send + Sync + 'static {
    /// Runs the processing loop. Not expected to return.
    fn controller_loop(&self);
}

/// Blocking foreground server.
pub trait ForegroundServe {
    /// Accepts and serves requests until shutdown or fatal error.
    fn serve(&self, addr: &str, port: u16, threaded: bool) -> Result<(), ServeError>;
}

/// How the foreground serving ended.
#[derive(Debug)]
pub enum Outcome {
    /// The serve call returned normally.
    Clean,
    /// The serve call failed; carried to the exit boundary.
    Fault(ServeError),
}

/// Sequences startup and owns the single exit path.
pub struct Lifecycle {
    phase: Phase,
    config: Option<RuntimeConfig>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    /// A fresh, unconfigured lifecycle.
    pub fn new() -> Self {
        Self {
            phase: Phase::Unconfigured,
            config: None,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Resolved configuration, once [`Lifecycle::configure`] has run.
    pub fn config(&self) -> Option<&RuntimeConfig> {
        self.config.as_ref()
    }

    /// Stores the resolved configuration and enters `Configured`.
    pub fn configure(&mut self, config: RuntimeConfig) -> Result<(), LifecycleError> {
        self.advance(Phase::Configured)?;
        self.config = Some(config);
        Ok(())
    }

    /// Publishes the constructed controller handle.
    ///
    /// Wrapping the controller in an `Arc` here is the publication point:
    /// it completes before either consumer can be started, so both see a
    /// fully constructed handle.
    pub fn publish_controller<C: ControllerLoop>(
        &mut self,
        controller: C,
    ) -> Result<Arc<C>, LifecycleError> {
        self.advance(Phase::ControllerConstructed)?;
        Ok(Arc::new(controller))
    }

    /// Starts the detached background worker on the published handle.
    ///
    /// The thread is never joined; a failure inside it is not observed by
    /// the foreground path.
    pub fn start_background_worker<C: ControllerLoop>(
        &mut self,
        handle: Arc<C>,
    ) -> Result<(), LifecycleError> {
        self.advance(Phase::WorkerStarted)?;
        thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || handle.controller_loop())?;
        debug!("background worker started");
        Ok(())
    }

    /// Blocks on the foreground server and reports how serving ended.
    pub fn serve_foreground<S: ForegroundServe>(
        &mut self,
        server: &S,
        addr: &str,
        port: u16,
    ) -> Result<Outcome, LifecycleError> {
        self.advance(Phase::ServingForeground)?;
        debug!("activating foreground server on {addr}:{port}");
        Ok(match server.serve(addr, port, true) {
            Ok(()) => Outcome::Clean,
            Err(err) => Outcome::Fault(err),
        })
    }

    /// Single exit boundary. A fault is logged exactly once; the
    /// background worker is abandoned either way. Returns the process
    /// exit code.
    pub fn shutdown(&mut self, outcome: Outcome) -> i32 {
        self.phase = Phase::Terminated;
        match outcome {
            Outcome::Clean => {
                info!("caddxd exiting");
                0
            }
            Outcome::Fault(err) => {
                error!("fatal exception in foreground server: {err}");
                1
            }
        }
    }

    /// Marks the lifecycle terminated without a serving outcome, for
    /// startup failures.
    pub fn terminate(&mut self) {
        self.phase = Phase::Terminated;
    }

    fn advance(&mut self, to: Phase) -> Result<(), LifecycleError> {
        if self.phase != Phase::Terminated && to as u8 == self.phase as u8 + 1 {
            self.phase = to;
            Ok(())
        } else {
            Err(LifecycleError::Transition {
                from: self.phase,
                to,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    use super::*;
    use crate::config::{BrokerOptions, TransportSpec};

    struct IdleLoop;

    impl ControllerLoop for IdleLoop {
        fn controller_loop(&self) {}
    }

    /// Reports whether the published-flag was visible when the worker ran.
    struct PublicationProbe {
        published: AtomicBool,
        seen: mpsc::Sender<bool>,
    }

    impl ControllerLoop for PublicationProbe {
        fn controller_loop(&self) {
            let _ = self.seen.send(self.published.load(Ordering::Acquire));
        }
    }

    struct TickingLoop {
        ticks: Arc<AtomicU64>,
    }

    impl ControllerLoop for TickingLoop {
        fn controller_loop(&self) {
            loop {
                self.ticks.fetch_add(1, Ordering::Relaxed);
                thread::sleep(Duration::from_millis(5));
            }
        }
    }

    struct FailingServer;

    impl ForegroundServe for FailingServer {
        fn serve(&self, addr: &str, port: u16, _threaded: bool) -> Result<(), ServeError> {
            Err(ServeError::Bind {
                addr: addr.to_string(),
                port,
                source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
            })
        }
    }

    struct CleanServer;

    impl ForegroundServe for CleanServer {
        fn serve(&self, _addr: &str, _port: u16, _threaded: bool) -> Result<(), ServeError> {
            Ok(())
        }
    }

    fn config() -> RuntimeConfig {
        RuntimeConfig {
            transport: TransportSpec::Tcp {
                host: "10.0.0.5".to_string(),
                port: 4444,
            },
            panel_config: "config.ini".into(),
            broker: BrokerOptions {
                address: "10.0.0.1".to_string(),
                port: 1883,
                username: None,
                password: None,
                state_topic_root: "home/alarm".to_string(),
                command_topic: "home/alarm/set".to_string(),
                tls_active: false,
                tls_insecure: false,
                timeout: Duration::from_secs(10),
            },
            api_address: "127.0.0.1".to_string(),
            api_port: 5007,
        }
    }

    #[test]
    fn phases_advance_in_order() {
        let mut lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.phase(), Phase::Unconfigured);

        lifecycle.configure(config()).unwrap();
        assert_eq!(lifecycle.phase(), Phase::Configured);

        let handle = lifecycle.publish_controller(IdleLoop).unwrap();
        assert_eq!(lifecycle.phase(), Phase::ControllerConstructed);

        lifecycle.start_background_worker(handle).unwrap();
        assert_eq!(lifecycle.phase(), Phase::WorkerStarted);

        let outcome = lifecycle.serve_foreground(&CleanServer, "127.0.0.1", 0).unwrap();
        assert!(matches!(outcome, Outcome::Clean));
        assert_eq!(lifecycle.phase(), Phase::ServingForeground);

        assert_eq!(lifecycle.shutdown(outcome), 0);
        assert_eq!(lifecycle.phase(), Phase::Terminated);
    }

    #[test]
    fn worker_cannot_start_before_publication() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.configure(config()).unwrap();

        let handle = Arc::new(IdleLoop);
        assert!(matches!(
            lifecycle.start_background_worker(handle),
            Err(LifecycleError::Transition { .. })
        ));
    }

    #[test]
    fn serving_cannot_start_before_worker() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.configure(config()).unwrap();
        let _handle = lifecycle.publish_controller(IdleLoop).unwrap();

        assert!(matches!(
            lifecycle.serve_foreground(&CleanServer, "127.0.0.1", 0),
            Err(LifecycleError::Transition { .. })
        ));
    }

    #[test]
    fn published_handle_is_visible_to_the_worker() {
        let (seen, observed) = mpsc::channel();
        let mut lifecycle = Lifecycle::new();
        lifecycle.configure(config()).unwrap();

        let handle = lifecycle
            .publish_controller(PublicationProbe {
                published: AtomicBool::new(false),
                seen,
            })
            .unwrap();
        handle.published.store(true, Ordering::Release);

        lifecycle.start_background_worker(Arc::clone(&handle)).unwrap();

        let visible = observed
            .recv_timeout(Duration::from_secs(5))
            .expect("worker never ran");
        assert!(visible, "worker observed an unpublished handle");
    }

    #[test]
    fn foreground_fault_maps_to_nonzero_exit() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.configure(config()).unwrap();
        let handle = lifecycle.publish_controller(IdleLoop).unwrap();
        lifecycle.start_background_worker(handle).unwrap();

        let outcome = lifecycle
            .serve_foreground(&FailingServer, "127.0.0.1", 5007)
            .unwrap();
        assert!(matches!(outcome, Outcome::Fault(_)));

        assert_eq!(lifecycle.shutdown(outcome), 1);
        assert_eq!(lifecycle.phase(), Phase::Terminated);
    }

    #[test]
    fn worker_is_abandoned_not_stopped_at_shutdown() {
        let ticks = Arc::new(AtomicU64::new(0));
        let mut lifecycle = Lifecycle::new();
        lifecycle.configure(config()).unwrap();
        let handle = lifecycle
            .publish_controller(TickingLoop {
                ticks: Arc::clone(&ticks),
            })
            .unwrap();
        lifecycle.start_background_worker(handle).unwrap();

        let outcome = lifecycle
            .serve_foreground(&FailingServer, "127.0.0.1", 5007)
            .unwrap();
        lifecycle.shutdown(outcome);

        let before = ticks.load(Ordering::Relaxed);
        thread::sleep(Duration::from_millis(50));
        let after = ticks.load(Ordering::Relaxed);
        assert!(
            after > before,
            "worker should keep running after shutdown returns"
        );
    }

    #[test]
    fn terminated_lifecycle_rejects_further_operations() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.terminate();

        assert!(matches!(
            lifecycle.configure(config()),
            Err(LifecycleError::Transition { .. })
        ));
        assert!(matches!(
            lifecycle.publish_controller(IdleLoop),
            Err(LifecycleError::Transition { .. })
        ));
    }
}
