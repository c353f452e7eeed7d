// Native logging for the replay harness

use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::core::config::LoggingSettings;

// Keep the guards alive for the lifetime of the program
static LOG_GUARD: OnceLock<Vec<WorkerGuard>> = OnceLock::new();

/// Initialize logging with optional console and file outputs.
///
/// `RUST_LOG` wins over `settings.level`. An empty `log_file` disables the
/// file layer.
pub fn init_logging(settings: &LoggingSettings) {
    let mut guards = Vec::new();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let log_file = (!settings.log_file.is_empty()).then(|| PathBuf::from(&settings.log_file));
    let file_layer = log_file.and_then(|path| {
        let parent = path.parent()?.to_path_buf();
        let file_name = path.file_name()?.to_str()?.to_string();

        let file_appender = tracing_appender::rolling::never(parent, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        guards.push(guard);

        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(false),
        )
    });

    // stderr, so stdout stays clean for the harness output
    let console_layer = if settings.console {
        let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stderr());
        guards.push(guard);

        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(false),
        )
    } else {
        None
    };

    // Ignore a second init (tests, repeated harness runs in one process)
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init();

    let _ = LOG_GUARD.set(guards);
}
