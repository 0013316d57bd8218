//! Tracing setup shared by the `conductor` binary and embedding hosts.
//!
//! Logs always go to stderr; stdout belongs to the event feed.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{Error, Result};

const CRATES: [&str; 4] = [
    "conductor",
    "conductor_core",
    "conductor_engine",
    "conductor_cli",
];

/// `RUST_LOG`-style directive enabling every conductor crate at `level`.
pub fn default_filter(level: &str) -> String {
    CRATES
        .iter()
        .map(|krate| format!("{krate}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber, ignoring an already installed one.
///
/// `default_filter` applies when `RUST_LOG` is unset or invalid. With
/// `log_json` every line is a JSON object.
pub fn init_tracing(default_filter: &str, log_json: bool) {
    // A host that installed its own subscriber keeps it.
    let _ = try_init_tracing(default_filter, log_json);
}

/// Like [`init_tracing`], but reports a second installation as an error.
pub fn try_init_tracing(default_filter: &str, log_json: bool) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let json = log_json.then(|| {
        fmt::layer()
            .json()
            .with_current_span(false)
            .with_writer(std::io::stderr)
    });
    let text = (!log_json).then(|| fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json)
        .with(text)
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to install tracing subscriber: {e}")))
}
