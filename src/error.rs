//! Unified error type.

use std::io;

/// The error type returned by httpkit's fallible operations.
///
/// Application-level failures (401, 404, 422, etc.) are expressed as HTTP
/// [`Response`](crate::Response) values, not as `Error`s. This type surfaces
/// conditions that keep a server from serving at all (bad configuration, a
/// port that cannot be bound) and client transport failures.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A configuration value was missing, malformed or contradictory.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A route pattern was rejected by the router (syntax or conflict).
    #[error("invalid route `{path}`: {reason}")]
    Route { path: String, reason: String },

    /// A metric collector with this name was already registered.
    #[error("metric collector `{0}` is already registered")]
    DuplicateCollector(String),

    /// The metrics backend refused its configuration.
    #[error("metrics backend: {0}")]
    Metrics(String),

    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("io: {0}")]
    Io(#[from] io::Error),

    /// The tracer provider failed to flush or shut down.
    #[error("tracer: {0}")]
    Tracer(String),

    /// The outbound request could not be built or sent.
    #[error("http client: {0}")]
    Client(#[from] reqwest::Error),
}
