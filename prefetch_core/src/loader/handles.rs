use std::collections::HashMap;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::service::content_service::HandleRef;

/// Every handle a run currently holds, so the run teardown can release
/// whatever the executor did not.
///
/// A handle leaves the registry exactly once, and is released by whoever
/// removed it. The lock is never held while calling into a handle.
#[derive(Default)]
pub struct ActiveHandles {
    next_id: AtomicU64,
    handles: Mutex<HashMap<u64, HandleRef>>,
}

impl ActiveHandles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handle that stays until [`ActiveHandles::release_all`].
    pub fn register(&self, handle: HandleRef) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(id, handle);
        id
    }

    /// Registers a handle that is released when the returned lease drops.
    pub fn lease(&self, handle: HandleRef) -> HandleLease<'_> {
        let id = self.register(handle.clone());
        HandleLease {
            registry: self,
            id,
            handle,
        }
    }

    /// Releases one handle. Returns false if it was already gone.
    pub fn release(&self, id: u64) -> bool {
        let removed = self.lock().remove(&id);
        match removed {
            Some(handle) => {
                handle.release();
                true
            }
            None => false,
        }
    }

    /// Releases every registered handle and returns how many there were.
    pub fn release_all(&self) -> usize {
        let drained: Vec<HandleRef> = self.lock().drain().map(|(_, h)| h).collect();
        for handle in &drained {
            handle.release();
        }
        drained.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, HandleRef>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Scoped registration of one handle; releases it on drop, on every path
/// out of the scope (including the enclosing future being dropped).
pub struct HandleLease<'a> {
    registry: &'a ActiveHandles,
    id: u64,
    handle: HandleRef,
}

impl Deref for HandleLease<'_> {
    type Target = HandleRef;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl Drop for HandleLease<'_> {
    fn drop(&mut self) {
        self.registry.release(self.id);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    use super::*;
    use crate::service::content_service::{DownloadHandle, HandleStatus};

    #[derive(Default)]
    struct CountingHandle {
        releases: AtomicUsize,
    }

    impl DownloadHandle for CountingHandle {
        fn is_done(&self) -> bool {
            true
        }
        fn progress(&self) -> f32 {
            1.0
        }
        fn status(&self) -> HandleStatus {
            HandleStatus::Succeeded
        }
        fn error(&self) -> Option<String> {
            None
        }
        fn release(&self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn lease_releases_on_drop() {
        let registry = ActiveHandles::new();
        let handle = Arc::new(CountingHandle::default());
        {
            let _lease = registry.lease(handle.clone());
            assert_eq!(registry.len(), 1);
        }
        assert!(registry.is_empty());
        assert_eq!(handle.releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn release_all_then_lease_drop_releases_once() {
        let registry = ActiveHandles::new();
        let handle = Arc::new(CountingHandle::default());
        let lease = registry.lease(handle.clone());
        registry.register(handle.clone());

        assert_eq!(registry.release_all(), 2);
        drop(lease);

        // once per registration, the lease drop finds nothing left
        assert_eq!(handle.releases.load(Ordering::SeqCst), 2);
        assert!(!registry.release(0));
    }
}
