//! Storage media a handle can persist its session into.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use axum_extra::extract::cookie::{Cookie, CookieJar};
use parking_lot::{Mutex, RwLock};

use crate::cookies::{self, CookieOptions};

/// String key/value medium holding the serialized session.
pub trait SessionStorage: Send + Sync + 'static {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str);

    fn remove(&self, key: &str);
}

/// Process-local medium used by the long-lived client handle.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.items.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.items.write().insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.items.write().remove(key);
    }
}

fn snapshot(jar: &CookieJar) -> HashMap<String, String> {
    jar.iter()
        .map(|c| (c.name().to_string(), c.value().to_string()))
        .collect()
}

/// Read-only view of an inbound request's cookies, for server rendering.
///
/// There is no response to write to, so writes are dropped.
#[derive(Debug, Clone, Default)]
pub struct RequestCookies {
    cookies: HashMap<String, String>,
}

impl RequestCookies {
    #[must_use]
    pub fn from_jar(jar: &CookieJar) -> Self {
        Self {
            cookies: snapshot(jar),
        }
    }
}

impl SessionStorage for RequestCookies {
    fn get(&self, key: &str) -> Option<String> {
        cookies::read_chunked(key, |name| self.cookies.get(name).cloned())
    }

    fn set(&self, key: &str, _value: &str) {
        tracing::debug!(key, "Ignoring cookie write on read-only request cookies");
    }

    fn remove(&self, key: &str) {
        tracing::debug!(key, "Ignoring cookie removal on read-only request cookies");
    }
}

#[derive(Debug, Default)]
struct Pending {
    // None marks a removal
    writes: BTreeMap<String, Option<String>>,
    flushed: bool,
}

/// Inbound cookies plus a buffer of outbound writes, for request interception.
///
/// Reads see the inbound set overlaid with writes made so far. Writes are
/// buffered until [`take_pending`](Self::take_pending) drains them once, to be
/// attached to the response. Anything written after that is lost.
#[derive(Debug)]
pub struct InterceptionCookies {
    inbound: HashMap<String, String>,
    options: CookieOptions,
    pending: Mutex<Pending>,
}

impl InterceptionCookies {
    #[must_use]
    pub fn from_jar(jar: &CookieJar, options: CookieOptions) -> Self {
        Self {
            inbound: snapshot(jar),
            options,
            pending: Mutex::new(Pending::default()),
        }
    }

    /// Drain buffered writes as response cookies. Later writes are dropped.
    pub fn take_pending(&self) -> Vec<Cookie<'static>> {
        let mut pending = self.pending.lock();
        pending.flushed = true;
        std::mem::take(&mut pending.writes)
            .into_iter()
            .map(|(name, value)| match value {
                Some(value) => cookies::session_cookie(&name, &value, &self.options),
                None => cookies::removal_cookie(&name, &self.options),
            })
            .collect()
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.lock().writes.is_empty()
    }

    fn lookup(&self, pending: &Pending, name: &str) -> Option<String> {
        match pending.writes.get(name) {
            Some(value) => value.clone(),
            None => self.inbound.get(name).cloned(),
        }
    }

    fn live_names(&self, pending: &Pending, key: &str) -> BTreeSet<String> {
        let mut names: BTreeSet<String> = self
            .inbound
            .keys()
            .filter(|name| cookies::is_chunk_of(name, key))
            .cloned()
            .collect();
        for (name, value) in &pending.writes {
            if !cookies::is_chunk_of(name, key) {
                continue;
            }
            if value.is_some() {
                names.insert(name.clone());
            } else {
                names.remove(name);
            }
        }
        names
    }
}

impl SessionStorage for InterceptionCookies {
    fn get(&self, key: &str) -> Option<String> {
        let pending = self.pending.lock();
        cookies::read_chunked(key, |name| self.lookup(&pending, name))
    }

    fn set(&self, key: &str, value: &str) {
        let mut pending = self.pending.lock();
        if pending.flushed {
            tracing::warn!(key, "Cookie write after response cookies were taken; dropped");
            return;
        }
        let chunks = cookies::split_into_chunks(key, &cookies::encode_value(value));
        for stale in self.live_names(&pending, key) {
            if !chunks.iter().any(|(name, _)| *name == stale) {
                pending.writes.insert(stale, None);
            }
        }
        for (name, value) in chunks {
            pending.writes.insert(name, Some(value));
        }
    }

    fn remove(&self, key: &str) {
        let mut pending = self.pending.lock();
        if pending.flushed {
            tracing::warn!(key, "Cookie removal after response cookies were taken; dropped");
            return;
        }
        for name in self.live_names(&pending, key) {
            pending.writes.insert(name, None);
        }
    }
}
