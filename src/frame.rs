//! Offscreen frames and the named-frame cache.
//!
//! A frame hosts one duplicated document. Liveness is an explicit flag owned
//! by the frame: once detached, `window()` returns `None` and the named cache
//! stops handing the frame out.

use crate::dom::{Document, Window};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

static NEXT_FRAME_ID: AtomicU64 = AtomicU64::new(1);

struct FrameInner {
    id: u64,
    window: Window,
    document: Mutex<Arc<Document>>,
    alive: AtomicBool,
}

/// Shared handle to an offscreen frame
#[derive(Clone)]
pub struct FrameHandle(Arc<FrameInner>);

impl FrameHandle {
    /// Create a live frame hosting `document`, sized to `window`
    pub fn new(mut document: Document, window: Window) -> Self {
        document.set_window(Some(window));
        Self(Arc::new(FrameInner {
            id: NEXT_FRAME_ID.fetch_add(1, Ordering::Relaxed),
            window,
            document: Mutex::new(Arc::new(document)),
            alive: AtomicBool::new(true),
        }))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn is_alive(&self) -> bool {
        self.0.alive.load(Ordering::Acquire)
    }

    /// The frame's window, or `None` once the frame has been detached
    pub fn window(&self) -> Option<Window> {
        self.is_alive().then_some(self.0.window)
    }

    /// Snapshot of the hosted document
    pub fn document(&self) -> Arc<Document> {
        self.0.document.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Swap the hosted document
    pub fn replace_document(&self, mut document: Document) -> Arc<Document> {
        document.set_window(Some(self.0.window));
        let doc = Arc::new(document);
        *self.0.document.lock().unwrap_or_else(PoisonError::into_inner) = doc.clone();
        doc
    }

    /// Mark the frame detached. Returns false if it already was.
    pub fn detach(&self) -> bool {
        self.0.alive.swap(false, Ordering::AcqRel)
    }

    pub fn same_frame(&self, other: &FrameHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for FrameHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameHandle")
            .field("id", &self.0.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Exclusive access to a render name for the duration of a call
pub type NameGuard = OwnedMutexGuard<()>;

/// Cross-call store of reusable frames, keyed by render name
#[derive(Clone, Default)]
pub struct NamedFrameCache {
    frames: Arc<Mutex<HashMap<String, FrameHandle>>>,
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl NamedFrameCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A live frame stored under `name`. Dead entries are evicted on lookup.
    pub fn lookup(&self, name: &str) -> Option<FrameHandle> {
        let mut frames = self.frames.lock().unwrap_or_else(PoisonError::into_inner);
        match frames.get(name) {
            Some(frame) if frame.window().is_some() => Some(frame.clone()),
            Some(_) => {
                frames.remove(name);
                None
            }
            None => None,
        }
    }

    pub fn store(&self, name: &str, frame: FrameHandle) {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), frame);
    }

    /// Whether an entry exists for `name`, live or not
    pub fn contains(&self, name: &str) -> bool {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner).contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove and detach the frame stored under `name`
    pub fn evict(&self, name: &str) -> Option<FrameHandle> {
        let frame = self.frames.lock().unwrap_or_else(PoisonError::into_inner).remove(name)?;
        frame.detach();
        Some(frame)
    }

    /// Wait for exclusive use of `name`. Calls sharing a render name are
    /// serialized; the guard is released when dropped.
    pub async fn acquire(&self, name: &str) -> NameGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(name.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

impl std::fmt::Debug for NamedFrameCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedFrameCache").field("names", &self.names()).finish()
    }
}
