//! Per-call run identity, logging and resource-cache scoping.
//!
//! Every capture call registers a `RenderInstance` in the `InstanceRegistry`
//! owned by its `Capturer`. Collaborators resolve instance-scoped state by
//! `InstanceId` through the registry (or receive it explicitly), so two calls
//! in flight never share a logger or a cache.

use crate::config::ResourceOptions;
use crate::resource::{Fetcher, ResourceCache};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

const LOG_TARGET: &str = "rfcapture";

/// Opaque token identifying one capture call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u64);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:x}", self.0)
    }
}

/// Logging sink scoped to one run identity.
///
/// Messages go through the `log` facade, prefixed with the instance id and
/// the milliseconds elapsed since the call started. Debug and info output
/// is suppressed when logging is disabled for the call; errors and warnings
/// always pass through.
#[derive(Debug, Clone)]
pub struct InstanceLogger {
    id: InstanceId,
    enabled: bool,
    start: Instant,
}

impl InstanceLogger {
    pub fn new(id: InstanceId, enabled: bool) -> Self {
        Self { id, enabled, start: Instant::now() }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    fn elapsed_ms(&self) -> u128 {
        self.start.elapsed().as_millis()
    }

    pub fn debug(&self, msg: impl fmt::Display) {
        if self.enabled {
            log::debug!(target: LOG_TARGET, "{} {}ms {}", self.id, self.elapsed_ms(), msg);
        }
    }

    pub fn info(&self, msg: impl fmt::Display) {
        if self.enabled {
            log::info!(target: LOG_TARGET, "{} {}ms {}", self.id, self.elapsed_ms(), msg);
        }
    }

    pub fn warn(&self, msg: impl fmt::Display) {
        log::warn!(target: LOG_TARGET, "{} {}ms {}", self.id, self.elapsed_ms(), msg);
    }

    pub fn error(&self, msg: impl fmt::Display) {
        log::error!(target: LOG_TARGET, "{} {}ms {}", self.id, self.elapsed_ms(), msg);
    }
}

/// The resources scoped to one capture call
#[derive(Debug, Clone)]
pub struct RenderInstance {
    pub id: InstanceId,
    pub logging_enabled: bool,
    pub cache: Arc<ResourceCache>,
    pub logger: InstanceLogger,
}

#[derive(Debug, Default)]
struct Entries {
    loggers: HashMap<InstanceId, InstanceLogger>,
    caches: HashMap<InstanceId, Arc<ResourceCache>>,
}

/// Table of live render instances, keyed by run identity
#[derive(Debug, Default)]
pub struct InstanceRegistry {
    next_id: AtomicU64,
    entries: Mutex<Entries>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a fresh identity and register its logger and resource cache.
    ///
    /// `existing` replaces the per-call cache when the caller supplied one.
    pub fn register(
        &self,
        logging: bool,
        options: &ResourceOptions,
        existing: Option<Arc<ResourceCache>>,
        base_url: Option<&str>,
        fetcher: Arc<dyn Fetcher>,
    ) -> RenderInstance {
        let id = InstanceId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let logger = InstanceLogger::new(id, logging);
        let cache = existing.unwrap_or_else(|| Arc::new(ResourceCache::new(options.clone(), base_url, fetcher)));

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.loggers.insert(id, logger.clone());
        entries.caches.insert(id, cache.clone());

        RenderInstance { id, logging_enabled: logging, cache, logger }
    }

    pub fn logger(&self, id: InstanceId) -> Option<InstanceLogger> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.loggers.get(&id).cloned()
    }

    pub fn cache(&self, id: InstanceId) -> Option<Arc<ResourceCache>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.caches.get(&id).cloned()
    }

    /// Drop the logger and cache registrations for `id`. Returns whether
    /// anything was registered.
    pub fn release(&self, id: InstanceId) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let had_logger = entries.loggers.remove(&id).is_some();
        let had_cache = entries.caches.remove(&id).is_some();
        had_logger || had_cache
    }

    pub fn is_registered(&self, id: InstanceId) -> bool {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.loggers.contains_key(&id) || entries.caches.contains_key(&id)
    }

    /// Number of instances currently registered
    pub fn active(&self) -> usize {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.loggers.len().max(entries.caches.len())
    }

    /// Identities issued so far, including released ones
    pub fn issued(&self) -> u64 {
        self.next_id.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::NoopFetcher;

    fn register(reg: &InstanceRegistry) -> RenderInstance {
        reg.register(true, &ResourceOptions::default(), None, None, Arc::new(NoopFetcher))
    }

    #[test]
    fn ids_are_unique_and_scoped() {
        let reg = InstanceRegistry::new();
        let a = register(&reg);
        let b = register(&reg);
        assert_ne!(a.id, b.id);
        assert_eq!(reg.active(), 2);
        assert!(Arc::ptr_eq(&reg.cache(a.id).unwrap(), &a.cache));
        assert!(!Arc::ptr_eq(&a.cache, &b.cache));
        assert_eq!(reg.logger(b.id).unwrap().id(), b.id);
    }

    #[test]
    fn release_removes_both_entries_once() {
        let reg = InstanceRegistry::new();
        let a = register(&reg);
        assert!(reg.release(a.id));
        assert!(!reg.is_registered(a.id));
        assert!(reg.logger(a.id).is_none());
        assert!(!reg.release(a.id));
        assert_eq!(reg.issued(), 1);
    }

    #[test]
    fn existing_cache_is_reused() {
        let reg = InstanceRegistry::new();
        let shared = Arc::new(ResourceCache::new(ResourceOptions::default(), None, Arc::new(NoopFetcher)));
        let inst = reg.register(false, &ResourceOptions::default(), Some(shared.clone()), None, Arc::new(NoopFetcher));
        assert!(Arc::ptr_eq(&inst.cache, &shared));
        assert!(!inst.logger.enabled());
    }

    #[test]
    fn id_display_is_hex() {
        assert_eq!(InstanceId(255).to_string(), "#ff");
    }
}
