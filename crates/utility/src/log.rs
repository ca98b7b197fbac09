// Logging bootstrap for the build tools and the runtime map.
//
// One console layer, plus a daily-rolling file layer when a log directory is
// given.  Everything sits behind an EnvFilter so RUST_LOG keeps working.

use std::path::Path;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Map the numeric CLI log level onto a tracing filter directive.
pub fn map_log_level(level: i32) -> &'static str {
    match level {
        0 => "warn",
        1 => "error",
        2 => "info",
        3 => "debug",
        _ => "trace",
    }
}

/// Initialize the global subscriber.  Safe to call once per process; the
/// drivers call it before doing anything else.
pub fn initialize_logging(log_dir: Option<&Path>, console_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(console_level));

    let console = fmt::layer()
        .with_target(false)
        .with_thread_ids(false);

    // layers compose as Option, so the file sink is simply absent when no
    // directory was configured
    let file = log_dir.map(|dir| {
        if !dir.exists() {
            let _ = std::fs::create_dir_all(dir);
        }

        let appender = tracing_appender::rolling::daily(dir, "tilenav.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        // the writer thread must survive until process exit or the tail of
        // the log is lost
        std::mem::forget(guard);

        fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();
}
