//! `tracing` subscriber setup.
//!
//! Output goes to stderr, either compact human-readable lines or one JSON
//! object per event. `RUST_LOG` overrides the configured level when set.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// Call once at application startup. Subsequent calls are no-ops.
///
/// # Arguments
///
/// * `level` - Minimum log level (or any `EnvFilter` directive string).
/// * `json` - Emit newline-delimited JSON instead of compact text.
pub fn init_subscriber(level: &str, json: bool) {
    let filter = build_filter(level);

    // try_init is a no-op if a global default is already set
    if json {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .json()
            .with_current_span(true)
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .compact()
            .try_init();
    }
}

/// Build the filter: `RUST_LOG` first, then `level`, then `info`.
fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
