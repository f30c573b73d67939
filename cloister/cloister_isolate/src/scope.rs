//! Handle scopes.
//!
//! A handle scope is a growable arena of raw object references bound to one
//! thread attachment. Every attached thread owns exactly one default scope,
//! created on attach and released on detach. Scopes are never shared across
//! threads and carry no synchronization of their own; all access is
//! serialized by the owning isolate's lock.

use cloister_core::AttachmentId;
use tracing::trace;

/// An opaque reference into the execution engine's object graph.
///
/// The engine running inside an isolate is an external collaborator; this
/// crate only pins and hands back its references, never interprets them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawObjectRef(pub u64);

/// A handle into a thread's default scope.
///
/// Scoped handles are validated against the registry on every resolution,
/// so a handle held past the owning thread's detach is detected rather than
/// dereferenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopedHandle {
    /// The attachment record owning the scope this handle points into
    pub attachment: AttachmentId,

    /// Slot index within the scope
    pub index: usize,
}

/// A growable arena of object references owned by one attachment record.
#[derive(Debug)]
pub struct HandleScope {
    slots: Vec<RawObjectRef>,
    released: bool,
}

impl HandleScope {
    /// Create a scope with the given initial capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            released: false,
        }
    }

    /// Pin a raw reference into the scope, returning its slot index.
    ///
    /// Returns `None` if the scope has already been released.
    pub fn allocate(&mut self, raw: RawObjectRef) -> Option<usize> {
        if self.released {
            return None;
        }
        let index = self.slots.len();
        self.slots.push(raw);
        trace!("Pinned reference {:?} in scope slot {}", raw, index);
        Some(index)
    }

    /// Resolve a slot index back to the pinned reference.
    ///
    /// Returns `None` once the scope is released or if the index was never
    /// allocated.
    pub fn resolve(&self, index: usize) -> Option<RawObjectRef> {
        if self.released {
            return None;
        }
        self.slots.get(index).copied()
    }

    /// Number of live references in the scope.
    pub fn len(&self) -> usize {
        if self.released {
            0
        } else {
            self.slots.len()
        }
    }

    /// Check whether the scope holds no references.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check whether the scope has been released.
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Release the scope, invalidating every reference it held.
    ///
    /// Called exactly once, on detach of the owning attachment record.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        trace!("Releasing handle scope with {} references", self.slots.len());
        self.slots.clear();
        self.slots.shrink_to_fit();
        self.released = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_and_resolve() {
        let mut scope = HandleScope::with_capacity(4);
        assert!(scope.is_empty());

        let a = scope.allocate(RawObjectRef(10)).unwrap();
        let b = scope.allocate(RawObjectRef(20)).unwrap();

        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(scope.resolve(a), Some(RawObjectRef(10)));
        assert_eq!(scope.resolve(b), Some(RawObjectRef(20)));
        assert_eq!(scope.resolve(2), None);
        assert_eq!(scope.len(), 2);
        assert!(!scope.is_empty());
    }

    #[test]
    fn test_release_invalidates_handles() {
        let mut scope = HandleScope::with_capacity(4);
        let slot = scope.allocate(RawObjectRef(7)).unwrap();

        scope.release();

        assert!(scope.is_released());
        assert_eq!(scope.resolve(slot), None);
        assert_eq!(scope.len(), 0);
        assert_eq!(scope.allocate(RawObjectRef(8)), None);
    }

    #[test]
    fn test_growth_past_initial_capacity() {
        let mut scope = HandleScope::with_capacity(2);
        for i in 0..10 {
            scope.allocate(RawObjectRef(i)).unwrap();
        }
        assert_eq!(scope.len(), 10);
        assert_eq!(scope.resolve(9), Some(RawObjectRef(9)));
    }
}
