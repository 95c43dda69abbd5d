//! Log sink pipeline for caddxd.
//!
//! The pipeline is planned as data first ([`plan_sinks`]) and only then
//! materialised into subscriber layers, so the set of sinks and their
//! filters is fully determined before anything is attached. Each sink has
//! its own severity threshold; the chosen display severity gates the root
//! of the pipeline independently.
use std::{
    fs,
    io::IsTerminal,
    path::{Path, PathBuf},
};

use tracing::{Level, Metadata};
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    Layer, Registry,
    filter::{EnvFilter, FilterFn},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::cli::DisplayLevel;
use crate::constants::{API_ACCESS_TARGET, DEBUG_LOG_FILE, LOG_BACKUP_COUNT};
use crate::error::LoggingError;

/// Options that drive sink planning, extracted from the CLI.
#[derive(Debug, Clone)]
pub struct LoggingOptions {
    /// Severity gating the root of the pipeline.
    pub display_level: DisplayLevel,
    /// Whether the rotating debug file was requested.
    pub debug: bool,
    /// Optional path for the rotating general log file.
    pub log_file: Option<PathBuf>,
}

/// Destination of a planned sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkKind {
    /// Stream to the console (stderr).
    Console,
    /// Rotating `debug.log` in the working directory.
    DebugFile,
    /// Rotating general log file at the given path.
    LogFile(PathBuf),
}

/// One planned sink: destination, threshold, and whether API access-log
/// noise is suppressed on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkSpec {
    /// Where records go.
    pub kind: SinkKind,
    /// Most verbose level this sink accepts.
    pub threshold: Level,
    /// Drop INFO records from the API access-log target.
    pub suppress_api_info: bool,
}

/// Keeps non-blocking writer workers alive for the process lifetime.
pub struct LogGuard {
    _guards: Vec<WorkerGuard>,
}

/// Plans the sink list for the given options.
///
/// Policy, in order:
/// - the rotating debug file is used only when `--debug` is set and the
///   process is not interactive; debug output on a terminal goes through
///   the console sink instead,
/// - the console sink exists whenever the process is interactive and is
///   thresholded at DEBUG regardless of the display severity,
/// - the general log file, when configured, is thresholded at INFO,
/// - with display severity WARNING, every planned sink also suppresses
///   INFO records from the API access-log target,
/// - a process with no sink at all still gets a warnings-only console
///   sink so fatal startup errors are never silent.
pub fn plan_sinks(opts: &LoggingOptions, interactive: bool) -> Vec<SinkSpec> {
    let mut sinks = Vec::new();

    if opts.debug && !interactive {
        sinks.push(SinkSpec {
            kind: SinkKind::DebugFile,
            threshold: Level::DEBUG,
            suppress_api_info: false,
        });
    }

    if interactive {
        sinks.push(SinkSpec {
            kind: SinkKind::Console,
            threshold: Level::DEBUG,
            suppress_api_info: false,
        });
    }

    if let Some(path) = &opts.log_file {
        sinks.push(SinkSpec {
            kind: SinkKind::LogFile(path.clone()),
            threshold: Level::INFO,
            suppress_api_info: false,
        });
    }

    if sinks.is_empty() {
        sinks.push(SinkSpec {
            kind: SinkKind::Console,
            threshold: Level::WARN,
            suppress_api_info: false,
        });
    }

    if opts.display_level == DisplayLevel::Warning {
        for sink in &mut sinks {
            sink.suppress_api_info = true;
        }
    }

    sinks
}

/// Attaches the planned sinks to the process-wide subscriber.
///
/// Must run before any other component logs. File destinations that
/// cannot be opened fail here; no fallback sink is substituted.
pub fn init(opts: &LoggingOptions) -> Result<LogGuard, LoggingError> {
    let interactive = std::io::stdin().is_terminal();
    let plan = plan_sinks(opts, interactive);
    init_with_plan(&plan, opts.display_level)
}

fn init_with_plan(
    plan: &[SinkSpec],
    display_level: DisplayLevel,
) -> Result<LogGuard, LoggingError> {
    let mut guards = Vec::new();
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    for spec in plan {
        let filter = sink_filter(spec.threshold, spec.suppress_api_info);
        match &spec.kind {
            SinkKind::Console => {
                layers.push(Box::new(
                    tracing_subscriber::fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .with_filter(filter),
                ));
            }
            SinkKind::DebugFile => {
                let (writer, guard) = open_rolling(Path::new("."), DEBUG_LOG_FILE)?;
                guards.push(guard);
                layers.push(Box::new(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_target(true)
                        .with_filter(filter),
                ));
            }
            SinkKind::LogFile(path) => {
                let name = path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .ok_or_else(|| LoggingError::BadPath(path.clone()))?;
                let dir = match path.parent() {
                    Some(parent) if !parent.as_os_str().is_empty() => parent,
                    _ => Path::new("."),
                };
                if !dir.exists() {
                    fs::create_dir_all(dir).map_err(|source| LoggingError::Directory {
                        path: dir.to_path_buf(),
                        source,
                    })?;
                }
                let (writer, guard) = open_rolling(dir, name)?;
                guards.push(guard);
                layers.push(Box::new(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_target(true)
                        .with_filter(filter),
                ));
            }
        }
    }

    layers.push(Box::new(EnvFilter::new(display_level.as_str())));

    Registry::default().with(layers).init();
    Ok(LogGuard { _guards: guards })
}

/// Per-sink filter: severity threshold plus the optional access-log
/// suppression. Built before the sink is attached.
fn sink_filter(
    threshold: Level,
    suppress_api_info: bool,
) -> FilterFn<impl Fn(&Metadata<'_>) -> bool> {
    FilterFn::new(move |meta| {
        if *meta.level() > threshold {
            return false;
        }
        !(suppress_api_info
            && *meta.level() == Level::INFO
            && meta.target().starts_with(API_ACCESS_TARGET))
    })
}

fn open_rolling(
    dir: &Path,
    file_name: &str,
) -> Result<(non_blocking::NonBlocking, WorkerGuard), LoggingError> {
    let appender = rolling::Builder::new()
        .rotation(rolling::Rotation::DAILY)
        .filename_prefix(file_name)
        .max_log_files(LOG_BACKUP_COUNT)
        .build(dir)?;
    Ok(tracing_appender::non_blocking(appender))
}
