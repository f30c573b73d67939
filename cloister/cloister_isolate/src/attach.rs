//! Thread attachment records.
//!
//! An attachment record binds one OS thread to one isolate for the duration
//! of the attachment. It owns the thread's default handle scope and is
//! destroyed on detach, which releases that scope.

use std::thread::ThreadId;

use cloister_core::{AttachmentId, IsolateId};

use crate::scope::HandleScope;

/// Per-thread attachment state within one isolate.
///
/// A thread holds at most one live record per isolate at any time; the
/// owning isolate enforces this through its thread index. The owning
/// isolate id is immutable for the record's lifetime.
#[derive(Debug)]
pub struct AttachmentRecord {
    /// The record's opaque handle
    id: AttachmentId,

    /// The isolate this record belongs to
    isolate: IsolateId,

    /// The OS thread this record is bound to
    thread: ThreadId,

    /// The thread's default handle scope
    scope: HandleScope,

    /// Whether the record is currently attached
    attached: bool,
}

impl AttachmentRecord {
    /// Create a new record bound to the given thread, with a fresh default
    /// scope of the given capacity.
    pub fn new(
        id: AttachmentId,
        isolate: IsolateId,
        thread: ThreadId,
        scope_capacity: usize,
    ) -> Self {
        Self {
            id,
            isolate,
            thread,
            scope: HandleScope::with_capacity(scope_capacity),
            attached: true,
        }
    }

    /// Get the record's handle.
    pub fn id(&self) -> AttachmentId {
        self.id
    }

    /// Get the owning isolate's handle.
    pub fn isolate(&self) -> IsolateId {
        self.isolate
    }

    /// Get the OS thread this record is bound to.
    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    /// Check whether the record is currently attached.
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Get the default handle scope.
    pub fn scope(&self) -> &HandleScope {
        &self.scope
    }

    /// Get the default handle scope mutably.
    pub fn scope_mut(&mut self) -> &mut HandleScope {
        &mut self.scope
    }

    /// Detach the record, releasing its default scope.
    pub fn detach(&mut self) {
        self.scope.release();
        self.attached = false;
    }
}
