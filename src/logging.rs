//! Log subscriber setup.
//!
//! httpkit emits through `tracing` and installs nothing by itself. Call
//! [`init`] once from `main`, or build a [`tracing::Dispatch`] with
//! [`dispatch`] and hand it to `ServerBuilder::logger` to scope a
//! subscriber to one server.

use tracing::Dispatch;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::error::Error;

/// Installs the global subscriber. `RUST_LOG` overrides `default_filter`
/// (e.g. `"info,httpkit=debug"`).
pub fn init(default_filter: &str, json: bool) -> Result<(), Error> {
    tracing_subscriber::registry()
        .with(filter(default_filter)?)
        .with(fmt_layer(json))
        .try_init()
        .map_err(|e| Error::Config(format!("logger already installed: {e}")))
}

/// The same subscriber as [`init`], returned instead of installed.
pub fn dispatch(default_filter: &str, json: bool) -> Result<Dispatch, Error> {
    let subscriber = tracing_subscriber::registry()
        .with(filter(default_filter)?)
        .with(fmt_layer(json));
    Ok(Dispatch::new(subscriber))
}

fn filter(default_filter: &str) -> Result<EnvFilter, Error> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(default_filter)
            .map_err(|e| Error::Config(format!("invalid log filter `{default_filter}`: {e}"))),
    }
}

fn fmt_layer<S>(json: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    if json {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer().with_target(true).compact().boxed()
    }
}
