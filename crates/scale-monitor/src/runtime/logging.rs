use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "info,scale_monitor=debug,scale_core=info,scale_io=info";
const DEBUG_FILTER: &str = "info,scale_monitor=debug,scale_core=debug,scale_io=debug";

/// Initialize the tracing subscriber with optional JSON output and an optional
/// daily-rolling log file. The returned guard flushes the file writer on drop.
pub fn init_tracing(json_output: bool, debug: bool, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug { DEBUG_FILTER } else { DEFAULT_FILTER }));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "scale-monitor.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    if json_output {
        tracing_subscriber::registry()
            .with(file_layer)
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(file_layer)
            .with(filter)
            .with(fmt::layer().pretty())
            .init();
    }

    guard
}
