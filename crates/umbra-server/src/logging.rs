use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// `--verbosity` to a base log level, overridable per-module via
/// `RUST_LOG`. Per §6: 0 silent, 1 error, 2 info, 3 debug.
fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "off",
        1 => "error",
        2 => "info",
        _ => "debug",
    }
}

/// Initialise structured logging: a human-readable layer on stdout and
/// a daily-rotating JSON layer under `log_dir`. Returns the file
/// worker's guard, which must be kept alive for the process lifetime
/// or buffered log lines are dropped on exit.
pub fn init(verbosity: u8, log_dir: &Path) -> anyhow::Result<WorkerGuard> {
    let default_level = level_for(verbosity);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    std::fs::create_dir_all(log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "umbra-server.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let stdout_layer = fmt::layer().with_target(true).with_writer(std::io::stdout);
    let file_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_writer(non_blocking);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}
