use std::{path::Path, process, sync::Arc};

use tracing::{error, info};

use caddxd::{
    api::ApiServer,
    cli::{self, Cli},
    config,
    controller::{LogSink, NxController},
    error::BridgeError,
    lifecycle::{Lifecycle, Outcome},
    logging,
};

fn main() {
    let args = cli::parse_args();

    let _log_guard = match logging::init(&args.logging_options()) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("caddxd: {err}");
            process::exit(1);
        }
    };

    info!("Starting caddxd {}", env!("CARGO_PKG_VERSION"));
    process::exit(run(&args));
}

fn run(args: &Cli) -> i32 {
    let mut lifecycle = Lifecycle::new();
    match boot(args, &mut lifecycle) {
        Ok(outcome) => lifecycle.shutdown(outcome),
        Err(err) => {
            error!("{err}");
            lifecycle.terminate();
            1
        }
    }
}

/// Startup sequence: resolve, construct, publish, start the worker, then
/// block on the foreground server.
fn boot(args: &Cli, lifecycle: &mut Lifecycle) -> Result<Outcome, BridgeError> {
    let config = config::resolve(args)?;
    lifecycle.configure(config)?;

    let (transport, panel_config, broker, api_address, api_port) = {
        let config = lifecycle
            .config()
            .ok_or(caddxd::error::LifecycleError::NotConfigured)?;
        (
            config.transport.clone(),
            config.panel_config.clone(),
            config.broker.clone(),
            config.api_address.clone(),
            config.api_port,
        )
    };

    info!("Activating controller");
    let sink = Box::new(LogSink::new(broker.state_topic_root.clone()));
    let controller =
        NxController::new(transport, Path::new(&panel_config), broker, sink)?;
    let handle = lifecycle.publish_controller(controller)?;

    lifecycle.start_background_worker(Arc::clone(&handle))?;

    register_signal_handler();

    info!("Activating web api");
    let server = ApiServer::new(handle);
    Ok(lifecycle.serve_foreground(&server, &api_address, api_port)?)
}

/// SIGINT takes the same abrupt exit path as process termination: the
/// detached worker is abandoned along with the process.
fn register_signal_handler() {
    if let Err(err) = ctrlc::set_handler(|| {
        println!("caddxd is shutting down...");
        process::exit(0);
    }) {
        error!("failed to register signal handler: {err}");
    }
}
