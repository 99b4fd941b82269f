//! Tracing subscriber setup for the `fairload` binary.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "fairload=debug,info"
    } else {
        "info"
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise `info`, or `debug` for this crate
/// with `verbose`. Logs go to stderr so JSON on stdout stays parseable.
/// A second call is a no-op.
pub fn init_logging(verbose: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directive(verbose).into());

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
