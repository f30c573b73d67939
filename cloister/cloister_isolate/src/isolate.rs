//! Isolates.
//!
//! An isolate is an independent runtime context: isolate-owned global state
//! plus the set of thread attachment records currently bound to it. All
//! mutation of the attachment set goes through one isolate-local lock, so
//! attach, detach, and the start of teardown are linearizable per isolate
//! and unrelated isolates make independent progress.

use std::collections::HashMap;
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, trace};

use cloister_core::{AttachmentId, IsolateError, IsolateId, Result};

use crate::attach::AttachmentRecord;
use crate::config::IsolateParams;
use crate::scope::{RawObjectRef, ScopedHandle};

/// Lifecycle state of an isolate.
///
/// Transitions only ever run `Active → TearingDown → Destroyed`. No new
/// thread is admitted once the isolate is tearing down, and `Destroyed` is
/// reachable only with an empty attachment set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// The isolate accepts attaches and detaches
    Active,

    /// Teardown has begun; existing threads may still detach
    TearingDown,

    /// The isolate's state has been released
    Destroyed,
}

/// The isolate's reserved heap address space.
///
/// The execution engine owns the actual heap; this core only accounts for
/// the reservation and releases it when the isolate is destroyed.
#[derive(Debug)]
struct HeapReservation {
    bytes: usize,
}

impl HeapReservation {
    fn new(bytes: usize) -> Self {
        trace!("Reserved {} bytes of isolate address space", bytes);
        Self { bytes }
    }
}

impl Drop for HeapReservation {
    fn drop(&mut self) {
        trace!("Released {} bytes of isolate address space", self.bytes);
    }
}

/// State guarded by the isolate-local lock.
#[derive(Debug)]
struct IsolateInner {
    state: LifecycleState,
    attachments: HashMap<AttachmentId, AttachmentRecord>,
    by_thread: HashMap<ThreadId, AttachmentId>,
    heap: Option<HeapReservation>,
}

/// An independent runtime execution context.
pub struct Isolate {
    /// The isolate's opaque handle
    id: IsolateId,

    /// Creation parameters
    params: IsolateParams,

    /// Attachment set, thread index, state machine, and heap reservation
    inner: Mutex<IsolateInner>,

    /// Signalled by the detach that empties the attachment set while a
    /// teardown is pending
    quiescent: Condvar,
}

impl Isolate {
    /// Create a new isolate in the `Active` state with no attachments.
    pub fn new(id: IsolateId, params: IsolateParams) -> Self {
        let heap = HeapReservation::new(params.reserved_address_space);
        Self {
            id,
            params,
            inner: Mutex::new(IsolateInner {
                state: LifecycleState::Active,
                attachments: HashMap::new(),
                by_thread: HashMap::new(),
                heap: Some(heap),
            }),
            quiescent: Condvar::new(),
        }
    }

    /// Get the isolate's handle.
    pub fn id(&self) -> IsolateId {
        self.id
    }

    /// Get the current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.inner.lock().state
    }

    /// Number of currently attached threads.
    pub fn attachment_count(&self) -> usize {
        self.inner.lock().attachments.len()
    }

    /// Attach the calling thread to this isolate.
    ///
    /// Re-attaching a thread that already holds a record here is idempotent:
    /// the existing record is returned and no second scope is allocated.
    /// The `Active`-state check and the admission into the attachment set
    /// happen under one lock acquisition, so no thread can slip in after a
    /// concurrent teardown has begun.
    ///
    /// Returns the record's handle and whether the record is fresh.
    pub fn attach_current_thread(&self) -> Result<(AttachmentId, bool)> {
        let mut inner = self.inner.lock();

        if inner.state != LifecycleState::Active {
            return Err(IsolateError::TeardownInProgress(self.id).into());
        }

        let thread = thread::current().id();
        if let Some(existing) = inner.by_thread.get(&thread) {
            trace!("Thread {:?} already attached to isolate {}", thread, self.id);
            return Ok((*existing, false));
        }

        let id = AttachmentId::new();
        let record = AttachmentRecord::new(id, self.id, thread, self.params.scope_capacity);
        inner.by_thread.insert(thread, id);
        inner.attachments.insert(id, record);

        debug!("Attached thread {:?} to isolate {} as {}", thread, self.id, id);
        Ok((id, true))
    }

    /// Look up the calling thread's attachment record, if any.
    pub fn current_attachment(&self) -> Option<AttachmentId> {
        let inner = self.inner.lock();
        inner.by_thread.get(&thread::current().id()).copied()
    }

    /// Detach the given record from this isolate.
    ///
    /// Releases the record's default scope and removes it from the
    /// attachment set. If this empties the set while a teardown is pending,
    /// the blocked teardown call is woken.
    pub fn detach(&self, attachment: AttachmentId) -> Result<()> {
        let mut inner = self.inner.lock();
        self.detach_locked(&mut inner, attachment)
    }

    /// Detach a batch of records, all-or-nothing.
    ///
    /// `caller` must itself be a live member of this isolate, and so must
    /// every record in `batch`. The whole batch is validated before any
    /// record is touched; a single invalid, duplicate, or foreign record
    /// rejects the batch with nothing detached. If the caller's own record
    /// appears in the batch it is detached last, after every other entry.
    pub fn detach_batch(&self, caller: AttachmentId, batch: &[AttachmentId]) -> Result<()> {
        let mut inner = self.inner.lock();

        if !inner.attachments.contains_key(&caller) {
            return Err(IsolateError::UnknownAttachment(caller).into());
        }

        let mut seen = std::collections::HashSet::with_capacity(batch.len());
        for id in batch {
            if !inner.attachments.contains_key(id) || !seen.insert(*id) {
                return Err(IsolateError::BatchRejected(*id).into());
            }
        }

        debug!(
            "Bulk-detaching {} records from isolate {}",
            batch.len(),
            self.id
        );
        for id in batch.iter().filter(|id| **id != caller) {
            self.detach_locked(&mut inner, *id)?;
        }
        if batch.contains(&caller) {
            self.detach_locked(&mut inner, caller)?;
        }

        Ok(())
    }

    /// Tear down this isolate.
    ///
    /// `attachment` is detached as part of the call, the state moves to
    /// `TearingDown` (atomically with respect to concurrent attaches), and
    /// the calling thread then blocks until every other attached thread has
    /// detached. This is a quiescence barrier, not a forced eviction: no
    /// other thread is ever detached on its behalf. Once the attachment set
    /// is empty the isolate's state is released and it becomes `Destroyed`.
    ///
    /// Fails without mutating anything if the record is unknown, if a
    /// teardown is already in progress, or if waiting can never be
    /// satisfied because the calling thread itself would remain attached
    /// through a different record.
    pub fn tear_down(&self, attachment: AttachmentId) -> Result<()> {
        let mut inner = self.inner.lock();

        if !inner.attachments.contains_key(&attachment) {
            return Err(IsolateError::UnknownAttachment(attachment).into());
        }
        if inner.state != LifecycleState::Active {
            return Err(IsolateError::TeardownInProgress(self.id).into());
        }

        // A thread suspended in the quiescence wait cannot detach itself, so
        // quiescence is unreachable if this thread stays attached through a
        // record other than the one being torn down.
        let me = thread::current().id();
        if let Some(own) = inner.by_thread.get(&me) {
            if *own != attachment {
                return Err(IsolateError::QuiescenceDeadlock(self.id).into());
            }
        }

        inner.state = LifecycleState::TearingDown;
        info!("Isolate {} tearing down", self.id);

        self.detach_locked(&mut inner, attachment)?;

        while !inner.attachments.is_empty() {
            debug!(
                "Teardown of isolate {} waiting for {} attached threads",
                self.id,
                inner.attachments.len()
            );
            self.quiescent.wait(&mut inner);
        }

        inner.state = LifecycleState::Destroyed;
        inner.heap.take();
        info!("Isolate {} destroyed", self.id);
        Ok(())
    }

    /// Pin a raw reference into the given record's default scope.
    pub fn allocate_handle(
        &self,
        attachment: AttachmentId,
        raw: RawObjectRef,
    ) -> Result<ScopedHandle> {
        let mut inner = self.inner.lock();
        let record = inner
            .attachments
            .get_mut(&attachment)
            .ok_or(IsolateError::UnknownAttachment(attachment))?;
        let index = record
            .scope_mut()
            .allocate(raw)
            .ok_or(IsolateError::UnknownAttachment(attachment))?;
        Ok(ScopedHandle { attachment, index })
    }

    /// Resolve a scoped handle, or `None` if the owning scope is gone.
    pub fn resolve_handle(&self, handle: &ScopedHandle) -> Option<RawObjectRef> {
        let inner = self.inner.lock();
        inner
            .attachments
            .get(&handle.attachment)?
            .scope()
            .resolve(handle.index)
    }

    /// Remove and detach one record while holding the isolate lock,
    /// signalling the teardown synchronizer when the set empties.
    fn detach_locked(
        &self,
        inner: &mut IsolateInner,
        attachment: AttachmentId,
    ) -> Result<()> {
        let mut record = inner
            .attachments
            .remove(&attachment)
            .ok_or(IsolateError::UnknownAttachment(attachment))?;
        inner.by_thread.remove(&record.thread());
        record.detach();

        debug!("Detached record {} from isolate {}", attachment, self.id);

        if inner.attachments.is_empty() && inner.state == LifecycleState::TearingDown {
            self.quiescent.notify_all();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloister_core::Error;
    use std::sync::Arc;

    fn make_isolate() -> Isolate {
        Isolate::new(IsolateId::new(), IsolateParams::default())
    }

    #[test]
    fn test_attach_is_idempotent() {
        let isolate = make_isolate();

        let (first, fresh_first) = isolate.attach_current_thread().unwrap();
        let (second, fresh_second) = isolate.attach_current_thread().unwrap();

        assert_eq!(first, second);
        assert!(fresh_first);
        assert!(!fresh_second);
        assert_eq!(isolate.attachment_count(), 1);
    }

    #[test]
    fn test_detach_unknown_record_fails() {
        let isolate = make_isolate();
        let result = isolate.detach(AttachmentId::new());
        assert!(matches!(
            result,
            Err(Error::Isolate(IsolateError::UnknownAttachment(_)))
        ));
    }

    #[test]
    fn test_detach_twice_fails() {
        let isolate = make_isolate();
        let (att, _) = isolate.attach_current_thread().unwrap();

        isolate.detach(att).unwrap();
        assert!(isolate.detach(att).is_err());
        assert_eq!(isolate.attachment_count(), 0);
    }

    #[test]
    fn test_tear_down_sole_attachment() {
        let isolate = make_isolate();
        let (att, _) = isolate.attach_current_thread().unwrap();

        isolate.tear_down(att).unwrap();

        assert_eq!(isolate.state(), LifecycleState::Destroyed);
        assert_eq!(isolate.attachment_count(), 0);
    }

    #[test]
    fn test_attach_after_teardown_fails() {
        let isolate = make_isolate();
        let (att, _) = isolate.attach_current_thread().unwrap();
        isolate.tear_down(att).unwrap();

        let result = isolate.attach_current_thread();
        assert!(matches!(
            result,
            Err(Error::Isolate(IsolateError::TeardownInProgress(_)))
        ));
    }

    #[test]
    fn test_tear_down_foreign_record_while_self_attached_deadlocks() {
        let isolate = Arc::new(make_isolate());
        let (mine, _) = isolate.attach_current_thread().unwrap();

        // Attach a record bound to another thread; that thread exits
        // without detaching, leaving the record live.
        let other = {
            let isolate = Arc::clone(&isolate);
            std::thread::spawn(move || isolate.attach_current_thread().unwrap().0)
                .join()
                .unwrap()
        };

        let result = isolate.tear_down(other);
        assert!(matches!(
            result,
            Err(Error::Isolate(IsolateError::QuiescenceDeadlock(_)))
        ));

        // Nothing was mutated by the failed call.
        assert_eq!(isolate.state(), LifecycleState::Active);
        assert_eq!(isolate.attachment_count(), 2);
        assert_eq!(isolate.current_attachment(), Some(mine));
    }

    #[test]
    fn test_detach_batch_rejects_invalid_member() {
        let isolate = Arc::new(make_isolate());
        let (caller, _) = isolate.attach_current_thread().unwrap();
        let other = {
            let isolate = Arc::clone(&isolate);
            std::thread::spawn(move || isolate.attach_current_thread().unwrap().0)
                .join()
                .unwrap()
        };

        let bogus = AttachmentId::new();
        let result = isolate.detach_batch(caller, &[other, bogus]);
        assert!(matches!(
            result,
            Err(Error::Isolate(IsolateError::BatchRejected(id))) if id == bogus
        ));

        // Atomicity: the valid member of the rejected batch is untouched.
        assert_eq!(isolate.attachment_count(), 2);
    }

    #[test]
    fn test_detach_batch_with_caller_included() {
        let isolate = Arc::new(make_isolate());
        let (caller, _) = isolate.attach_current_thread().unwrap();
        let other = {
            let isolate = Arc::clone(&isolate);
            std::thread::spawn(move || isolate.attach_current_thread().unwrap().0)
                .join()
                .unwrap()
        };

        isolate.detach_batch(caller, &[caller, other]).unwrap();
        assert_eq!(isolate.attachment_count(), 0);
    }

    #[test]
    fn test_handle_allocation_and_staleness() {
        let isolate = make_isolate();
        let (att, _) = isolate.attach_current_thread().unwrap();

        let handle = isolate.allocate_handle(att, RawObjectRef(99)).unwrap();
        assert_eq!(isolate.resolve_handle(&handle), Some(RawObjectRef(99)));

        isolate.detach(att).unwrap();
        assert_eq!(isolate.resolve_handle(&handle), None);
        assert!(isolate.allocate_handle(att, RawObjectRef(1)).is_err());
    }
}
