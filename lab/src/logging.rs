//! Development-time tracing for debugging the lab.
//!
//! Tracing is diagnostics only. What the operator sees (code listings, critic
//! summaries, failure explanations) goes through [`crate::io::operator`], and
//! what a run leaves behind goes through [`crate::io::artifacts`]; neither
//! depends on `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`, defaulting to `warn`. Output goes to stderr in compact format.
///
/// ```bash
/// RUST_LOG=lab=debug lab run --topic "protein folding"
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
