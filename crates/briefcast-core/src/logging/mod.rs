//! Structured logging bootstrap on top of `tracing`.
//!
//! Context (session ID, connection ID, channel) travels as span and event
//! fields, never as string interpolation, so both the compact and the JSON
//! output keep it queryable.

pub mod test_utils;

pub use test_utils::{CapturedLogs, capture_logs};

use tracing_subscriber::EnvFilter;

/// Output format of the global subscriber.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable single-line output.
    #[default]
    Compact,
    /// One JSON object per line.
    Json,
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Initialize the global tracing subscriber with compact stderr output.
///
/// `RUST_LOG` wins over `level` when set. Subsequent calls are no-ops.
pub fn init_subscriber(level: &str) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    // try_init fails only if a global subscriber already exists
    let _ = subscriber.try_init();
}

/// Initialize the global tracing subscriber with JSON lines on stderr.
pub fn init_json_subscriber(level: &str) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .json()
        .with_current_span(true);

    let _ = subscriber.try_init();
}

/// Initialize with the given format.
pub fn init(level: &str, format: LogFormat) {
    match format {
        LogFormat::Compact => init_subscriber(level),
        LogFormat::Json => init_json_subscriber(level),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
