//! Handle registry: the correlation table between in-flight host calls and
//! the sandboxed guest.
//!
//! Guest code cannot hold a reference to a host object, so every bridge call
//! passes the guest a 64-bit **handle** instead. The registry binds that
//! handle to the encoded argument payload before the call and collects the
//! result bytes the guest pushes back during it. Entries live for exactly one
//! call: [`HandleRegistry::bind`] allocates, and the returned [`HandleGuard`]
//! releases on drop, on every exit path.
//!
//! Each loader owns its own registry. The original design kept process-wide
//! static maps keyed by literal handle values, which collide as soon as two
//! bridges reuse the same literal concurrently; per-instance registries plus
//! generated handles remove that failure mode.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::{WasmError, WasmResult};

/// Opaque correlation key for one in-flight host/guest call.
///
/// Purely an identifier; it has no relationship to a pointer or address.
pub type Handle = u64;

/// Registry payload bound to a live handle.
#[derive(Debug, Default)]
struct HandleEntry {
    /// Encoded argument payload, served to the guest through `get_args`.
    args: Vec<u8>,
    /// Result byte strings the guest pushed through `put_result`, in push
    /// order. List-returning contracts push one element per result.
    results: Vec<Vec<u8>>,
}

/// Concurrent map from live handles to their call payloads.
///
/// Thread-safe; shared between the loader (which binds entries around guest
/// calls) and the host functions (which read and write them mid-call).
#[derive(Debug)]
pub struct HandleRegistry {
    next: AtomicU64,
    entries: Mutex<HashMap<Handle, HandleEntry>>,
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            // Handle 0 is left unallocated so tests and bridges can use it
            // as an explicit caller-determined value.
            next: AtomicU64::new(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Bind `args` under a freshly generated handle.
    ///
    /// The entry is released when the returned guard drops.
    pub fn bind(self: &Arc<Self>, args: Vec<u8>) -> HandleGuard {
        let mut entries = self.entries.lock();
        // Skip values a caller parked via bind_at; a live handle is never
        // handed out twice.
        let handle = loop {
            let candidate = self.next.fetch_add(1, Ordering::Relaxed);
            if !entries.contains_key(&candidate) {
                break candidate;
            }
        };
        entries.insert(handle, HandleEntry {
            args,
            results: Vec::new(),
        });
        drop(entries);
        HandleGuard {
            registry: Arc::clone(self),
            handle,
        }
    }

    /// Bind `args` under a caller-determined handle.
    ///
    /// # Errors
    ///
    /// Returns [`WasmError::HandleInUse`] if `handle` is currently live:
    /// a handle must not be reused while still registered.
    pub fn bind_at(self: &Arc<Self>, handle: Handle, args: Vec<u8>) -> WasmResult<HandleGuard> {
        let mut entries = self.entries.lock();
        if entries.contains_key(&handle) {
            return Err(WasmError::HandleInUse(handle));
        }
        entries.insert(handle, HandleEntry {
            args,
            results: Vec::new(),
        });
        drop(entries);
        Ok(HandleGuard {
            registry: Arc::clone(self),
            handle,
        })
    }

    /// Remove the entry for `handle`. A no-op if the handle was never bound.
    pub fn release(&self, handle: Handle) {
        self.entries.lock().remove(&handle);
    }

    /// Check whether `handle` is live.
    #[must_use]
    pub fn contains(&self, handle: Handle) -> bool {
        self.entries.lock().contains_key(&handle)
    }

    /// Number of live entries.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.entries.lock().len()
    }

    /// Copy up to `max_len` bytes of the argument payload for `handle`.
    ///
    /// Returns `None` for a stale handle. The returned prefix may be shorter
    /// than `max_len` when the payload is; callers treat that as the
    /// complete payload.
    pub(crate) fn args_prefix(&self, handle: Handle, max_len: usize) -> Option<Vec<u8>> {
        let entries = self.entries.lock();
        let entry = entries.get(&handle)?;
        let len = entry.args.len().min(max_len);
        Some(entry.args.get(..len).unwrap_or_default().to_vec())
    }

    /// Append a result byte string for `handle`.
    ///
    /// Returns `false` for a stale handle; the bytes are dropped.
    pub(crate) fn push_result(&self, handle: Handle, bytes: Vec<u8>) -> bool {
        let mut entries = self.entries.lock();
        match entries.get_mut(&handle) {
            Some(entry) => {
                entry.results.push(bytes);
                true
            }
            None => false,
        }
    }

    fn take_results(&self, handle: Handle) -> Vec<Vec<u8>> {
        let mut entries = self.entries.lock();
        entries
            .get_mut(&handle)
            .map(|entry| std::mem::take(&mut entry.results))
            .unwrap_or_default()
    }
}

/// Scoped ownership of one live handle.
///
/// Dropping the guard removes the registry entry, so a call's handle is
/// released on success, on guest trap, and on host-side error alike.
#[derive(Debug)]
pub struct HandleGuard {
    registry: Arc<HandleRegistry>,
    handle: Handle,
}

impl HandleGuard {
    /// The bound handle value, as passed to the guest export.
    #[must_use]
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Take the most recently pushed result, if the guest pushed any.
    ///
    /// Scalar contracts use this; when the guest pushed several times the
    /// last push wins.
    #[must_use]
    pub fn take_result(&self) -> Option<Vec<u8>> {
        self.registry.take_results(self.handle).pop()
    }

    /// Take all pushed results in push order.
    ///
    /// List-returning contracts use this to materialize `count` elements.
    #[must_use]
    pub fn take_results(&self) -> Vec<Vec<u8>> {
        self.registry.take_results(self.handle)
    }
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        self.registry.release(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Arc<HandleRegistry> {
        Arc::new(HandleRegistry::new())
    }

    #[test]
    fn test_bind_generates_unique_handles() {
        let registry = registry();
        let a = registry.bind(b"a".to_vec());
        let b = registry.bind(b"b".to_vec());
        assert_ne!(a.handle(), b.handle());
        assert_eq!(registry.live_count(), 2);
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let registry = registry();
        let handle = {
            let guard = registry.bind(b"payload".to_vec());
            assert!(registry.contains(guard.handle()));
            guard.handle()
        };
        assert!(!registry.contains(handle));
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn test_bind_at_rejects_live_handle() -> WasmResult<()> {
        let registry = registry();
        let _guard = registry.bind_at(7, b"first".to_vec())?;
        match registry.bind_at(7, b"second".to_vec()) {
            Err(WasmError::HandleInUse(7)) => Ok(()),
            other => panic!("expected HandleInUse(7), got {other:?}"),
        }
    }

    #[test]
    fn test_bind_at_reusable_after_release() -> WasmResult<()> {
        let registry = registry();
        drop(registry.bind_at(7, b"first".to_vec())?);
        let guard = registry.bind_at(7, b"second".to_vec())?;
        assert_eq!(guard.handle(), 7);
        Ok(())
    }

    #[test]
    fn test_bind_skips_parked_handles() -> WasmResult<()> {
        let registry = registry();
        let parked = registry.bind_at(1, Vec::new())?;
        let generated = registry.bind(Vec::new());
        assert_ne!(generated.handle(), parked.handle());
        Ok(())
    }

    #[test]
    fn test_release_of_unknown_handle_is_noop() {
        let registry = registry();
        registry.release(42);
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn test_args_prefix_truncates() {
        let registry = registry();
        let guard = registry.bind(b"hello rust!".to_vec());
        assert_eq!(
            registry.args_prefix(guard.handle(), 5).as_deref(),
            Some(&b"hello"[..])
        );
        assert_eq!(
            registry.args_prefix(guard.handle(), 64).as_deref(),
            Some(&b"hello rust!"[..])
        );
        assert_eq!(registry.args_prefix(999, 5), None);
    }

    #[test]
    fn test_results_accumulate_in_push_order() {
        let registry = registry();
        let guard = registry.bind(Vec::new());
        assert!(registry.push_result(guard.handle(), b"one".to_vec()));
        assert!(registry.push_result(guard.handle(), b"two".to_vec()));
        assert_eq!(guard.take_results(), vec![b"one".to_vec(), b"two".to_vec()]);
        // Taking drains the entry.
        assert_eq!(guard.take_result(), None);
    }

    #[test]
    fn test_push_result_on_stale_handle_is_dropped() {
        let registry = registry();
        assert!(!registry.push_result(999, b"lost".to_vec()));
    }
}
