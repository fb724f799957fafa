//! Request correlation ids.
//!
//! Every id has the shape `<hostname>/<random>-<sequence>`:
//!
//! ```text
//! web-7f9c/Xk3pQ9aZ0b-000042
//! └──┬───┘ └───┬────┘ └─┬──┘
//!  host     10 chars   6-digit counter, zero-padded
//! ```
//!
//! The host + random part is computed once per [`RequestIdGenerator`] and
//! the counter is a single atomic. Ids are unique for the lifetime of the
//! generator, not across restarts. They are meant for log correlation, not
//! as a security token.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use sysinfo::System;

const PREFIX_RANDOM_LEN: usize = 10;
const FALLBACK_HOSTNAME: &str = "localhost";

/// Produces correlation ids for inbound requests.
///
/// Cheap to clone; clones share the prefix and the counter.
#[derive(Clone, Debug)]
pub struct RequestIdGenerator {
    prefix: Arc<str>,
    sequence: Arc<AtomicU64>,
}

impl RequestIdGenerator {
    /// Creates a generator with a fresh random prefix for this host.
    pub fn new() -> Self {
        Self::with_hostname(&hostname())
    }

    /// Creates a generator for an explicit hostname. An empty hostname falls
    /// back to `localhost`.
    pub fn with_hostname(hostname: &str) -> Self {
        let host = if hostname.is_empty() { FALLBACK_HOSTNAME } else { hostname };
        Self {
            prefix: format!("{host}/{}", random_suffix()).into(),
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The stable `<hostname>/<random>` part shared by every id.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the next id. Never fails.
    pub fn next_id(&self) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("{}-{seq:06}", self.prefix)
    }
}

impl Default for RequestIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Base64 of 12 random bytes with `+` and `/` removed, cut to ten characters.
/// Stripping can leave fewer than ten, in which case another draw is made.
fn random_suffix() -> String {
    let mut rng = rand::thread_rng();
    let mut buf = [0u8; 12];
    loop {
        rng.fill_bytes(&mut buf);
        let encoded: String = STANDARD
            .encode(buf)
            .chars()
            .filter(|c| *c != '+' && *c != '/')
            .collect();
        if encoded.len() >= PREFIX_RANDOM_LEN {
            return encoded[..PREFIX_RANDOM_LEN].to_owned();
        }
    }
}

/// The OS hostname, or `localhost` when it cannot be read.
fn hostname() -> String {
    System::host_name()
        .map(|h| h.trim().to_owned())
        .filter(|h| !h.is_empty() && !h.chars().any(char::is_whitespace))
        .unwrap_or_else(|| FALLBACK_HOSTNAME.to_owned())
}
