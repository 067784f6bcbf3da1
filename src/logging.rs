//! Tracing subscriber setup.
//!
//! trellis itself only emits `tracing` events; installing a subscriber is up
//! to the application. [`init`] is the one-liner for the common case.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::{LogFormat, LoggingConfig};
use crate::error::Error;

/// Installs a global subscriber: an `EnvFilter` (`RUST_LOG` wins over
/// `config.level`) and a `fmt` layer in the configured format.
///
/// Fails if a global subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<(), Error> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| Error::Config(format!("logging.level: {e}")))?;

    let fmt_layer = match config.format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer().pretty().with_target(true).boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer().compact().boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| Error::Config(format!("logging already initialised: {e}")))
}
