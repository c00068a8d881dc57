use configuration::Logging;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber: a console layer, plus a daily-rolling file
/// layer when `logging.directory` is set and writable.
///
/// The returned guard flushes the file writer on drop and must live as long as
/// the process logs.
pub fn init_logging(settings: &Logging) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level));

    let mut guard = None;
    let file_layer = match settings.directory.as_deref() {
        Some(dir) if writable(Path::new(dir)) => {
            // `rolling::daily` panics if it cannot create the first file.
            let file_appender = tracing_appender::rolling::daily(dir, "riftventory.log");
            let (non_blocking, worker_guard) = tracing_appender::non_blocking(file_appender);
            guard = Some(worker_guard);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .with_target(true),
            )
        }
        Some(dir) => {
            eprintln!("Warning: could not write to log directory {dir}, file logging disabled");
            None
        }
        None => None,
    };

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    guard
}

fn writable(dir: &Path) -> bool {
    if std::fs::create_dir_all(dir).is_err() {
        return false;
    }
    let probe = dir.join(".riftventory_write_test");
    let ok = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&probe)
        .is_ok();
    let _ = std::fs::remove_file(&probe);
    ok
}
