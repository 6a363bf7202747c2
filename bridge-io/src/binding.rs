use std::os::raw::c_void;
use std::slice;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use bridge_error::{guard, BridgeError, ErrorCode, Status};
use serde::{Deserialize, Serialize};

use crate::sink::OutputSink;
use crate::slots::{InputSlotTable, OutputSlotTable};
use crate::source::RandomAccessSource;

/// What a binding does when native code calls one of its slots after the
/// binding was closed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ClosedSourcePolicy {
    /// Fail the slot with [`ErrorCode::Closed`]; native code reports it as
    /// a failed status of the call in progress.
    #[default]
    Reject,
    /// Log and abort the process.
    Abort,
}

/// State shared by source and sink bindings. Lives in a `Box` so its
/// address, which is the context token, never moves.
struct Endpoint<T: ?Sized> {
    label: String,
    owns: bool,
    policy: ClosedSourcePolicy,
    closed: AtomicBool,
    inner: Mutex<Box<T>>,
}

impl<T: ?Sized> Endpoint<T> {
    fn new(label: String, inner: Box<T>, owns: bool) -> Box<Self> {
        Box::new(Self {
            label,
            owns,
            policy: ClosedSourcePolicy::default(),
            closed: AtomicBool::new(false),
            inner: Mutex::new(inner),
        })
    }

    /// # Safety
    /// `context` must be null or point at a live endpoint of this type.
    unsafe fn from_context<'a>(
        context: *mut c_void,
    ) -> Result<&'a Self, Status> {
        (context as *const Self).as_ref().ok_or_else(|| {
            Status::new(ErrorCode::InvalidArgument, "null callback context")
        })
    }

    fn context(&self) -> *mut c_void {
        self as *const Self as *mut c_void
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Exclusive access for one slot invocation.
    fn enter(&self, slot: &str) -> Result<MutexGuard<'_, Box<T>>, Status> {
        if self.is_closed() {
            return Err(self.closed_violation(slot));
        }
        match self.inner.try_lock() {
            Ok(inner) => Ok(inner),
            Err(TryLockError::Poisoned(poisoned)) => Ok(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => Err(Status::new(
                ErrorCode::Callback,
                format!("{}/{}: concurrent callback invocation", self.label, slot),
            )),
        }
    }

    fn closed_violation(&self, slot: &str) -> Status {
        match self.policy {
            ClosedSourcePolicy::Reject => Status::new(
                ErrorCode::Closed,
                format!("{}/{}: invoked after close", self.label, slot),
            ),
            ClosedSourcePolicy::Abort => {
                log::error!(
                    "{}/{}: invoked after close, aborting",
                    self.label,
                    slot
                );
                std::process::abort()
            }
        }
    }

    fn failure(&self, slot: &str, err: BridgeError) -> Status {
        log::debug!("{}/{}: callback failed: {}", self.label, slot, err);
        Status::new(
            ErrorCode::Callback,
            format!("{}/{}: {}", self.label, slot, err.message()),
        )
    }

    /// Marks the endpoint closed and runs `close` on the managed object.
    fn shutdown(
        &self,
        close: impl FnOnce(&mut T, bool) -> bridge_error::Result<()>,
    ) -> Result<(), Status> {
        let mut inner = self.enter("close")?;
        self.closed.store(true, Ordering::Release);
        log::debug!("{}: closed by native code", self.label);
        close(&mut **inner, self.owns).map_err(|e| self.failure("close", e))
    }

    /// Drop path: close an owned object that native code never closed.
    fn close_if_abandoned(
        &mut self,
        close: impl FnOnce(&mut T) -> bridge_error::Result<()>,
    ) {
        if *self.closed.get_mut() {
            return;
        }
        *self.closed.get_mut() = true;
        if !self.owns {
            return;
        }
        let inner = self
            .inner
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = close(&mut **inner) {
            log::warn!("{}: discarding close error: {}", self.label, err);
        }
    }
}

/// Binds a [`RandomAccessSource`] to an [`InputSlotTable`].
///
/// The binding has to outlive every native object that received its
/// slots; register it as a keep-alive on the handle of that object.
pub struct ManagedSourceBinding {
    endpoint: Box<Endpoint<dyn RandomAccessSource>>,
}

impl ManagedSourceBinding {
    /// `owns_source` decides whether closing the binding also closes the
    /// source.
    pub fn new<S: RandomAccessSource + 'static>(
        label: impl Into<String>,
        source: S,
        owns_source: bool,
    ) -> Self {
        let source: Box<dyn RandomAccessSource> = Box::new(source);
        Self {
            endpoint: Endpoint::new(label.into(), source, owns_source),
        }
    }

    pub fn with_policy(mut self, policy: ClosedSourcePolicy) -> Self {
        self.endpoint.policy = policy;
        self
    }

    pub fn label(&self) -> &str {
        &self.endpoint.label
    }

    pub fn owns_source(&self) -> bool {
        self.endpoint.owns
    }

    pub fn is_closed(&self) -> bool {
        self.endpoint.is_closed()
    }

    pub fn slots(&self) -> InputSlotTable {
        InputSlotTable {
            context: self.endpoint.context(),
            read_at: source_read_at,
            get_length: source_get_length,
            close: source_close,
        }
    }
}

impl Drop for ManagedSourceBinding {
    fn drop(&mut self) {
        self.endpoint.close_if_abandoned(|source| source.close());
    }
}

type SourceEndpoint = Endpoint<dyn RandomAccessSource>;

unsafe extern "C" fn source_read_at(
    context: *mut c_void,
    offset: u64,
    buffer: *mut u8,
    length: usize,
    bytes_read: *mut usize,
) -> Status {
    guard(|| -> Result<(), Status> {
        let endpoint = SourceEndpoint::from_context(context)?;
        if bytes_read.is_null() || (buffer.is_null() && length > 0) {
            return Err(Status::new(
                ErrorCode::InvalidArgument,
                "read_at: null buffer",
            ));
        }
        let mut source = endpoint.enter("read_at")?;
        let buf: &mut [u8] = if length == 0 {
            &mut []
        } else {
            slice::from_raw_parts_mut(buffer, length)
        };
        let read = source
            .read_at(offset, buf)
            .map_err(|e| endpoint.failure("read_at", e))?;
        *bytes_read = read.min(length);
        Ok(())
    })
}

unsafe extern "C" fn source_get_length(
    context: *mut c_void,
    length: *mut u64,
) -> Status {
    guard(|| -> Result<(), Status> {
        let endpoint = SourceEndpoint::from_context(context)?;
        if length.is_null() {
            return Err(Status::new(
                ErrorCode::InvalidArgument,
                "get_length: null output",
            ));
        }
        let mut source = endpoint.enter("get_length")?;
        *length = source
            .size()
            .map_err(|e| endpoint.failure("get_length", e))?;
        Ok(())
    })
}

unsafe extern "C" fn source_close(context: *mut c_void) -> Status {
    guard(|| -> Result<(), Status> {
        let endpoint = SourceEndpoint::from_context(context)?;
        endpoint.shutdown(|source, owns| {
            if owns {
                source.close()
            } else {
                Ok(())
            }
        })
    })
}

/// Binds an [`OutputSink`] to an [`OutputSlotTable`].
///
/// Closing an owned sink closes it; closing a borrowed one only flushes.
pub struct ManagedSinkBinding {
    endpoint: Box<Endpoint<dyn OutputSink>>,
}

impl ManagedSinkBinding {
    pub fn new<S: OutputSink + 'static>(
        label: impl Into<String>,
        sink: S,
        owns_sink: bool,
    ) -> Self {
        let sink: Box<dyn OutputSink> = Box::new(sink);
        Self {
            endpoint: Endpoint::new(label.into(), sink, owns_sink),
        }
    }

    pub fn with_policy(mut self, policy: ClosedSourcePolicy) -> Self {
        self.endpoint.policy = policy;
        self
    }

    pub fn label(&self) -> &str {
        &self.endpoint.label
    }

    pub fn is_closed(&self) -> bool {
        self.endpoint.is_closed()
    }

    pub fn slots(&self) -> OutputSlotTable {
        OutputSlotTable {
            context: self.endpoint.context(),
            write: sink_write,
            flush: sink_flush,
            tell: sink_tell,
            close: sink_close,
        }
    }
}

impl Drop for ManagedSinkBinding {
    fn drop(&mut self) {
        self.endpoint.close_if_abandoned(|sink| sink.close());
    }
}

type SinkEndpoint = Endpoint<dyn OutputSink>;

unsafe extern "C" fn sink_write(
    context: *mut c_void,
    data: *const u8,
    length: usize,
) -> Status {
    guard(|| -> Result<(), Status> {
        let endpoint = SinkEndpoint::from_context(context)?;
        if data.is_null() && length > 0 {
            return Err(Status::new(
                ErrorCode::InvalidArgument,
                "write: null data",
            ));
        }
        let mut sink = endpoint.enter("write")?;
        let data: &[u8] = if length == 0 {
            &[]
        } else {
            slice::from_raw_parts(data, length)
        };
        sink.write(data).map_err(|e| endpoint.failure("write", e))
    })
}

unsafe extern "C" fn sink_flush(context: *mut c_void) -> Status {
    guard(|| -> Result<(), Status> {
        let endpoint = SinkEndpoint::from_context(context)?;
        let mut sink = endpoint.enter("flush")?;
        sink.flush().map_err(|e| endpoint.failure("flush", e))
    })
}

unsafe extern "C" fn sink_tell(context: *mut c_void, position: *mut u64) -> Status {
    guard(|| -> Result<(), Status> {
        let endpoint = SinkEndpoint::from_context(context)?;
        if position.is_null() {
            return Err(Status::new(
                ErrorCode::InvalidArgument,
                "tell: null output",
            ));
        }
        let mut sink = endpoint.enter("tell")?;
        *position = sink
            .position()
            .map_err(|e| endpoint.failure("tell", e))?;
        Ok(())
    })
}

unsafe extern "C" fn sink_close(context: *mut c_void) -> Status {
    guard(|| -> Result<(), Status> {
        let endpoint = SinkEndpoint::from_context(context)?;
        endpoint.shutdown(|sink, owns| {
            if owns {
                sink.close()
            } else {
                sink.flush()
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemorySource, SharedBuffer};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    struct TrackedSource {
        inner: MemorySource,
        closes: Arc<AtomicUsize>,
        fail_reads: bool,
    }

    impl TrackedSource {
        fn new(closes: &Arc<AtomicUsize>) -> Self {
            Self {
                inner: MemorySource::new(b"0123456789".to_vec()),
                closes: Arc::clone(closes),
                fail_reads: false,
            }
        }
    }

    impl RandomAccessSource for TrackedSource {
        fn read_at(
            &mut self,
            offset: u64,
            buf: &mut [u8],
        ) -> bridge_error::Result<usize> {
            if self.fail_reads {
                return Err(BridgeError::Callback("stream reset".to_owned()));
            }
            self.inner.read_at(offset, buf)
        }

        fn size(&mut self) -> bridge_error::Result<u64> {
            self.inner.size()
        }

        fn close(&mut self) -> bridge_error::Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn native_code(err: bridge_error::BridgeError) -> ErrorCode {
        match err {
            BridgeError::NativeCall { code, .. } => code,
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_slots_serve_reads_and_length() {
        let closes = Arc::new(AtomicUsize::new(0));
        let binding =
            ManagedSourceBinding::new("test", TrackedSource::new(&closes), true);
        let slots = binding.slots();

        let mut buf = [0u8; 4];
        unsafe {
            assert_eq!(slots.invoke_read(3, &mut buf).unwrap(), 4);
            assert_eq!(&buf, b"3456");
            assert_eq!(slots.invoke_read(8, &mut buf).unwrap(), 2);
            assert_eq!(slots.invoke_read(4, &mut []).unwrap(), 0);
            assert_eq!(slots.invoke_length().unwrap(), 10);
        }
    }

    #[test_log::test]
    fn test_source_failure_becomes_callback_status() {
        let closes = Arc::new(AtomicUsize::new(0));
        let mut source = TrackedSource::new(&closes);
        source.fail_reads = true;
        let binding = ManagedSourceBinding::new("failing", source, true);

        let mut buf = [0u8; 4];
        let err = unsafe { binding.slots().invoke_read(0, &mut buf) }
            .unwrap_err();
        assert!(err.message().contains("stream reset"));
        assert_eq!(native_code(err), ErrorCode::Callback);
    }

    #[test]
    fn test_owned_source_closed_exactly_once() {
        let closes = Arc::new(AtomicUsize::new(0));
        let binding =
            ManagedSourceBinding::new("owned", TrackedSource::new(&closes), true);
        let slots = binding.slots();

        unsafe { slots.invoke_close() }.unwrap();
        assert!(binding.is_closed());
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        drop(binding);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_borrowed_source_is_never_closed() {
        let closes = Arc::new(AtomicUsize::new(0));
        let binding = ManagedSourceBinding::new(
            "borrowed",
            TrackedSource::new(&closes),
            false,
        );

        unsafe { binding.slots().invoke_close() }.unwrap();
        drop(binding);
        assert_eq!(closes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_abandoned_owned_source_closed_on_drop() {
        let closes = Arc::new(AtomicUsize::new(0));
        drop(ManagedSourceBinding::new(
            "abandoned",
            TrackedSource::new(&closes),
            true,
        ));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test_log::test]
    fn test_default_policy_rejects_reads_after_close() {
        let closes = Arc::new(AtomicUsize::new(0));
        let binding =
            ManagedSourceBinding::new("default", TrackedSource::new(&closes), false);
        let slots = binding.slots();
        unsafe { slots.invoke_close() }.unwrap();

        let mut buf = [0u8; 4];
        let err = unsafe { slots.invoke_read(0, &mut buf) }.unwrap_err();
        assert!(err.message().contains("invoked after close"), "{}", err);
        assert_eq!(native_code(err), ErrorCode::Closed);
        assert_eq!(closes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_slots_rejected_after_close() {
        let closes = Arc::new(AtomicUsize::new(0));
        let binding =
            ManagedSourceBinding::new("closed", TrackedSource::new(&closes), true)
                .with_policy(ClosedSourcePolicy::Reject);
        let slots = binding.slots();
        unsafe { slots.invoke_close() }.unwrap();

        let mut buf = [0u8; 1];
        let read = unsafe { slots.invoke_read(0, &mut buf) }.unwrap_err();
        assert_eq!(native_code(read), ErrorCode::Closed);
        let length = unsafe { slots.invoke_length() }.unwrap_err();
        assert_eq!(native_code(length), ErrorCode::Closed);
        let again = unsafe { slots.invoke_close() }.unwrap_err();
        assert_eq!(native_code(again), ErrorCode::Closed);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    struct PanickingSource;

    impl RandomAccessSource for PanickingSource {
        fn read_at(
            &mut self,
            _offset: u64,
            _buf: &mut [u8],
        ) -> bridge_error::Result<usize> {
            panic!("source blew up")
        }

        fn size(&mut self) -> bridge_error::Result<u64> {
            Ok(0)
        }
    }

    #[test_log::test]
    fn test_panic_in_source_does_not_unwind_into_caller() {
        let binding = ManagedSourceBinding::new("panicking", PanickingSource, true);
        let slots = binding.slots();

        let mut buf = [0u8; 1];
        let err = unsafe { slots.invoke_read(0, &mut buf) }.unwrap_err();
        assert_eq!(native_code(err), ErrorCode::Panic);
        // The poisoned lock does not wedge the binding.
        assert_eq!(unsafe { slots.invoke_length() }.unwrap(), 0);
    }

    struct SendSlots(InputSlotTable);

    unsafe impl Send for SendSlots {}

    /// Calls back into its own binding from inside `read_at`.
    struct ReentrantSource {
        slots: Arc<Mutex<Option<SendSlots>>>,
    }

    impl RandomAccessSource for ReentrantSource {
        fn read_at(
            &mut self,
            offset: u64,
            buf: &mut [u8],
        ) -> bridge_error::Result<usize> {
            let slots = self.slots.lock().unwrap();
            let slots = &slots.as_ref().unwrap().0;
            unsafe { slots.invoke_read(offset, buf) }
        }

        fn size(&mut self) -> bridge_error::Result<u64> {
            Ok(1)
        }
    }

    #[test_log::test]
    fn test_reentrant_invocation_is_rejected() {
        let shared = Arc::new(Mutex::new(None));
        let binding = ManagedSourceBinding::new(
            "reentrant",
            ReentrantSource {
                slots: Arc::clone(&shared),
            },
            true,
        );
        *shared.lock().unwrap() = Some(SendSlots(binding.slots()));

        let mut buf = [0u8; 1];
        let err = unsafe { binding.slots().invoke_read(0, &mut buf) }
            .unwrap_err();
        assert!(err.message().contains("concurrent callback invocation"));
    }

    #[test]
    fn test_sink_slots_push_bytes() {
        let buffer = SharedBuffer::new();
        let binding = ManagedSinkBinding::new("sink", buffer.clone(), true);
        let slots = binding.slots();

        unsafe {
            slots.invoke_write(b"PAR1").unwrap();
            slots.invoke_write(&[]).unwrap();
            slots.invoke_flush().unwrap();
            assert_eq!(slots.invoke_tell().unwrap(), 4);
            slots.invoke_close().unwrap();
            assert_eq!(
                native_code(slots.invoke_write(b"late").unwrap_err()),
                ErrorCode::Closed
            );
        }
        assert_eq!(buffer.contents(), b"PAR1");
        assert!(buffer.is_closed());
    }

    #[test]
    fn test_borrowed_sink_only_flushed_on_close() {
        let buffer = SharedBuffer::new();
        let binding = ManagedSinkBinding::new("borrowed", buffer.clone(), false);

        unsafe { binding.slots().invoke_close() }.unwrap();
        drop(binding);
        assert!(!buffer.is_closed());
    }
}
