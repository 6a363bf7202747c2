//! Ownership of a single native resource.
//!
//! A [`NativeHandle`] wraps a pointer returned by a successful native
//! open/create call together with the function that releases it. The
//! release function runs at most once, whether the handle is disposed
//! explicitly, disposed concurrently from several threads, or dropped
//! without ever being disposed.
//!
//! Calls through one handle are serialized: [`NativeHandle::with_raw`]
//! holds an exclusive lock, so a native object is never driven from two
//! threads at once even when the handle is shared.
//!
//! Handles do not know about each other. When a native object is only
//! valid while its parent is alive, the owner of the child handle has to
//! keep the parent around (an `Arc` is enough, children never point back).

use std::any::Any;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use bridge_error::{BridgeError, Result};

/// Native function releasing the resource behind a handle.
pub type ReleaseFn<T> = unsafe extern "C" fn(*mut T);

static LEAKED_HANDLES: AtomicUsize = AtomicUsize::new(0);

/// Number of handles released from `Drop` because nobody disposed them.
///
/// Meant for leak diagnostics in long running processes and tests.
pub fn leaked_handle_count() -> usize {
    LEAKED_HANDLES.load(Ordering::Relaxed)
}

pub struct NativeHandle<T> {
    label: &'static str,
    /// Null once the resource has been released.
    raw: Mutex<*mut T>,
    release: ReleaseFn<T>,
    disposed: AtomicBool,
    keepalive: Mutex<Vec<Box<dyn Any + Send>>>,
}

// SAFETY: the pointer is only handed to native code while the lock is
// held, and released once under the same lock.
unsafe impl<T> Send for NativeHandle<T> {}
unsafe impl<T> Sync for NativeHandle<T> {}

impl<T> NativeHandle<T> {
    /// Take ownership of a pointer produced by a successful native call.
    ///
    /// # Safety
    /// `raw` must be a live resource that `release` knows how to free, and
    /// nothing else may release it.
    pub unsafe fn acquire(
        label: &'static str,
        raw: *mut T,
        release: ReleaseFn<T>,
    ) -> Self {
        debug_assert!(!raw.is_null(), "handle/{}: null resource", label);
        log::debug!("handle/{}: acquired {:p}", label, raw);
        Self {
            label,
            raw: Mutex::new(raw),
            release,
            disposed: AtomicBool::new(false),
            keepalive: Mutex::new(Vec::new()),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Keep `obj` alive until the native resource has been released.
    ///
    /// Keep-alive objects are dropped right after the release function
    /// returns, never before.
    pub fn add_keepalive<K: Any + Send>(&self, obj: K) -> Result<()> {
        if self.is_disposed() {
            return Err(BridgeError::UseAfterDispose(self.label));
        }
        self.keepalive
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(obj));
        Ok(())
    }

    /// Run `f` with the raw pointer.
    ///
    /// Other calls through this handle wait until `f` returns, and the
    /// resource cannot be released meanwhile. Using this same handle from
    /// inside `f` deadlocks and is a programming error.
    pub fn with_raw<R>(&self, f: impl FnOnce(*mut T) -> R) -> Result<R> {
        let raw = self.raw.lock().unwrap_or_else(PoisonError::into_inner);
        if raw.is_null() {
            return Err(BridgeError::UseAfterDispose(self.label));
        }
        Ok(f(*raw))
    }

    /// Release the native resource. Calling this again is a no-op.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        let raw = {
            let mut slot =
                self.raw.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *slot, ptr::null_mut())
        };
        if !raw.is_null() {
            // SAFETY: the pointer was detached under the lock after
            // winning the disposed flag, so no other release can see it.
            unsafe { (self.release)(raw) };
            log::debug!("handle/{}: released {:p}", self.label, raw);
        }

        let kept = std::mem::take(
            &mut *self
                .keepalive
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        drop(kept);
    }
}

impl<T> std::fmt::Debug for NativeHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeHandle")
            .field("label", &self.label)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl<T> Drop for NativeHandle<T> {
    fn drop(&mut self) {
        if *self.disposed.get_mut() {
            return;
        }
        LEAKED_HANDLES.fetch_add(1, Ordering::Relaxed);
        log::warn!(
            "handle/{}: never disposed, releasing from drop",
            self.label
        );
        self.dispose();
    }
}
