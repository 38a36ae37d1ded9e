/// Logging Setup
///
/// Events go to stderr (never stdout, which carries STDIO JSON-RPC traffic)
/// and are appended to a log file under the configured log directory.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "ofac_party_service=info,actix_web=info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

fn stderr_layer<S>() -> impl tracing_subscriber::Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
}

/// Install a stderr-only subscriber, for failures before the config is known.
pub fn init_stderr() {
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(stderr_layer())
        .try_init();
}

/// Install the global tracing subscriber.
///
/// If the log file cannot be opened the subscriber still logs to stderr and
/// a warning is emitted once it is installed.
pub fn init(log_dir: &Path, file_name: &str) {
    let (file_layer, file_error) = match open_log_file(log_dir, file_name) {
        Ok(file) => {
            let layer = fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(true);
            (Some(layer), None)
        }
        Err(e) => (None, Some(e)),
    };

    // Option<Layer> is itself a layer, so a missing file simply disables it.
    let installed = tracing_subscriber::registry()
        .with(env_filter())
        .with(stderr_layer())
        .with(file_layer)
        .try_init();

    if installed.is_err() {
        // Already initialized.
        return;
    }

    if let Some(e) = file_error {
        tracing::warn!(
            "Could not open log file {}: {}; logging to stderr only",
            log_dir.join(file_name).display(),
            e
        );
    }
}

fn open_log_file(log_dir: &Path, file_name: &str) -> io::Result<File> {
    fs::create_dir_all(log_dir)?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(file_name))
}
