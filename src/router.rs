//! Radix-tree request router.
//!
//! One tree per HTTP method, O(path-length) lookup. Every entry stores the
//! handler already wrapped by its middleware chain, so dispatch is a lookup
//! followed by one call.

use std::collections::HashMap;
use std::sync::Arc;

use http::Method;
use matchit::Router as MatchitRouter;

use crate::error::Error;
use crate::handler::Endpoint;

/// A registered route: pattern, method and the fully wrapped handler.
/// Immutable once inserted.
#[derive(Clone)]
pub(crate) struct HandlerEntry {
    pub(crate) method: Method,
    pub(crate) pattern: Arc<str>,
    pub(crate) handler: Endpoint,
}

/// Result of a successful lookup.
pub(crate) struct Matched {
    pub(crate) handler: Endpoint,
    pub(crate) route: Arc<str>,
    pub(crate) params: HashMap<String, String>,
}

#[derive(Default)]
pub(crate) struct Router {
    trees: HashMap<Method, MatchitRouter<HandlerEntry>>,
    entries: Vec<(Method, Arc<str>)>,
}

impl Router {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Path parameters use `{name}` syntax, catch-alls `{*rest}`.
    pub(crate) fn insert(&mut self, method: Method, path: &str, endpoint: Endpoint) -> Result<(), Error> {
        let pattern: Arc<str> = Arc::from(path);
        let entry = HandlerEntry {
            method: method.clone(),
            pattern: Arc::clone(&pattern),
            handler: endpoint,
        };
        self.trees
            .entry(method.clone())
            .or_default()
            .insert(path, entry)
            .map_err(|e| Error::Route { path: path.to_owned(), reason: e.to_string() })?;
        self.entries.push((method, pattern));
        Ok(())
    }

    pub(crate) fn lookup(&self, method: &Method, path: &str) -> Option<Matched> {
        let matched = self.trees.get(method)?.at(path).ok()?;
        debug_assert_eq!(matched.value.method, *method);
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some(Matched {
            handler: matched.value.handler.clone(),
            route: Arc::clone(&matched.value.pattern),
            params,
        })
    }

    /// Registered routes in insertion order.
    pub(crate) fn routes(&self) -> impl Iterator<Item = (&Method, &str)> {
        self.entries.iter().map(|(m, p)| (m, &**p))
    }
}
