//! Operator-facing logging.
//!
//! Every command reports progress through `tracing` events on stderr. Success
//! lines are `info!` events carrying an `outcome` field, warnings and errors
//! use their own levels.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set. Otherwise the level is `info`, or `debug` for
/// the `manage_prs` crate when `debug` is true.
///
/// # Example
/// ```bash
/// RUST_LOG=manage_prs=trace manage-prs walk-fleet --template W1035-addTier --dry
/// ```
pub fn init(debug: bool) {
    let fallback = if debug { "info,manage_prs=debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
