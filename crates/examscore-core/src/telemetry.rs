//! Tracing setup for the examscore binary.
//!
//! [`init_tracing`] installs the global subscriber once. `RUST_LOG` wins when
//! set; otherwise examscore's own crates log at the requested level and
//! everything else (HTTP stack included) at `warn`.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialise the global tracing subscriber, writing to stderr.
///
/// With `json` set, log lines are newline-delimited JSON. Later calls are
/// no-ops because the global subscriber can only be set once per process.
pub fn init_tracing(json: bool, level: Level) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(level));

    let (plain, json_layer) = if json {
        (
            None,
            Some(fmt::layer().with_target(false).with_writer(std::io::stderr).json()),
        )
    } else {
        (
            Some(fmt::layer().with_target(false).with_writer(std::io::stderr)),
            None,
        )
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(json_layer)
        .try_init()
        .ok();
}

fn default_directives(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    format!("warn,examscore={level},examscore_core={level}")
}

fn default_filter(level: Level) -> EnvFilter {
    EnvFilter::new(default_directives(level))
}
