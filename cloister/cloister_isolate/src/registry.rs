//! The isolate registry.
//!
//! The registry is the process-wide table of live isolates and the entry
//! point for the whole lifecycle API. It is an explicit, lifecycle-scoped
//! object rather than a singleton, so embedders and tests can run
//! independent registries side by side.
//!
//! Registry membership reflects exactly the isolates in the `Active` or
//! `TearingDown` state; destroyed isolates are removed, so a stale isolate
//! handle is detected on lookup rather than reaching freed state. The
//! registry tables are touched only for creation, teardown, and handle
//! resolution; steady-state attach/detach traffic contends only on the
//! owning isolate's lock.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info};

use cloister_core::{AttachmentId, IsolateError, IsolateId, Result};

use crate::config::{IsolateParams, RegistryConfig};
use crate::isolate::Isolate;
use crate::scope::{RawObjectRef, ScopedHandle};

/// Process-wide table of live isolates.
pub struct IsolateRegistry {
    /// Registry configuration
    config: RegistryConfig,

    /// Serializes isolate admission so the capacity check and the insert
    /// are one atomic step with respect to concurrent creators
    admission: Mutex<()>,

    /// Live isolates, keyed by handle
    isolates: DashMap<IsolateId, Arc<Isolate>>,

    /// Owning isolate of every live attachment record
    attachments: DashMap<AttachmentId, IsolateId>,
}

impl IsolateRegistry {
    /// Create an empty registry with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create an empty registry with the given configuration.
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            config,
            admission: Mutex::new(()),
            isolates: DashMap::new(),
            attachments: DashMap::new(),
        }
    }

    /// Number of live isolates (`Active` or `TearingDown`).
    pub fn isolate_count(&self) -> usize {
        self.isolates.len()
    }

    /// Create a new isolate and attach the calling thread to it.
    ///
    /// The isolate is registered in the `Active` state and the calling
    /// thread receives its attachment record with a fresh default handle
    /// scope. The calling thread must eventually detach or tear the
    /// isolate down.
    ///
    /// Creation is all-or-nothing: if the registry is at capacity or the
    /// requested address space exceeds the configured ceiling, nothing is
    /// registered.
    pub fn create_isolate(
        &self,
        params: Option<IsolateParams>,
    ) -> Result<(IsolateId, AttachmentId)> {
        // Held until the new isolate is published, so racing creators
        // cannot all pass the capacity check and over-admit.
        let _admission = self.admission.lock();

        if let Some(max) = self.config.max_isolates {
            if self.isolates.len() >= max {
                return Err(IsolateError::RegistryFull(max).into());
            }
        }

        let params = params.unwrap_or_default();
        if params.reserved_address_space > self.config.address_space_ceiling {
            return Err(IsolateError::AddressSpaceExhausted {
                requested: params.reserved_address_space,
                ceiling: self.config.address_space_ceiling,
            }
            .into());
        }

        let isolate = Arc::new(Isolate::new(IsolateId::new(), params));
        let isolate_id = isolate.id();

        // The isolate is not yet visible to other threads, so the implicit
        // first attach cannot race anything; it is performed before the
        // isolate is published so a failure leaves nothing registered.
        let (attachment_id, _) = isolate.attach_current_thread()?;

        self.isolates.insert(isolate_id, isolate);
        self.attachments.insert(attachment_id, isolate_id);

        info!(
            "Created isolate {} with initial attachment {}",
            isolate_id, attachment_id
        );
        Ok((isolate_id, attachment_id))
    }

    /// Attach the calling thread to an existing isolate.
    ///
    /// Fails if the handle is unknown to the registry or the isolate is no
    /// longer `Active`. Re-attaching an already-attached thread returns the
    /// existing record without allocating a second scope. Admission is
    /// atomic with respect to a concurrent teardown: an attach racing the
    /// start of teardown either fully succeeds (and must later detach
    /// before teardown completes) or fails outright.
    pub fn attach_thread(&self, isolate: IsolateId) -> Result<AttachmentId> {
        let target = self
            .isolate(isolate)
            .ok_or(IsolateError::UnknownIsolate(isolate))?;

        let (attachment_id, fresh) = target.attach_current_thread()?;
        if fresh {
            self.attachments.insert(attachment_id, isolate);
        }
        Ok(attachment_id)
    }

    /// Look up the calling thread's attachment record in the given isolate.
    ///
    /// Pure lookup: `None` (not a failure) when the thread holds no record
    /// there or the isolate handle is stale.
    pub fn current_attachment(&self, isolate: IsolateId) -> Option<AttachmentId> {
        self.isolate(isolate)?.current_attachment()
    }

    /// Look up the isolate owning the given attachment record.
    ///
    /// Pure lookup: `None` when the attachment handle is stale or unknown.
    pub fn owning_isolate(&self, attachment: AttachmentId) -> Option<IsolateId> {
        self.attachments.get(&attachment).map(|entry| *entry.value())
    }

    /// Detach the given record from its isolate.
    ///
    /// Releases the record's default handle scope, invalidating every
    /// reference it held, and removes the record from the isolate's
    /// attachment set. The caller is responsible for ensuring no code still
    /// executes under the record. If this detach empties the set of an
    /// isolate with a pending teardown, the blocked teardown call proceeds.
    pub fn detach_thread(&self, attachment: AttachmentId) -> Result<()> {
        let (isolate_id, target) = self.resolve(attachment)?;

        target.detach(attachment)?;
        self.attachments.remove(&attachment);

        debug!("Record {} detached from isolate {}", attachment, isolate_id);
        Ok(())
    }

    /// Detach a batch of records in one request, all-or-nothing.
    ///
    /// Every record in `batch` must be a live member of the same isolate as
    /// `caller`. One invalid record rejects the whole batch with nothing
    /// detached, since partial detachment would leave ambiguous ownership
    /// of released scopes. The caller's own record may appear in the batch
    /// and is then detached as the batch's last step, though single detach
    /// is preferred for that case.
    pub fn detach_threads(&self, caller: AttachmentId, batch: &[AttachmentId]) -> Result<()> {
        let (isolate_id, target) = self.resolve(caller)?;

        target.detach_batch(caller, batch)?;
        for id in batch {
            self.attachments.remove(id);
        }

        debug!(
            "Bulk-detached {} records from isolate {}",
            batch.len(),
            isolate_id
        );
        Ok(())
    }

    /// Tear down the isolate owning the given attachment record.
    ///
    /// The record is detached as part of the call, no further attaches are
    /// admitted, and the calling thread blocks until every other attached
    /// thread has detached. Once quiescent, the isolate's state is released
    /// and it is removed from the registry; subsequent operations on its
    /// handle fail. Only one teardown may proceed to completion; a second
    /// concurrent attempt fails.
    pub fn tear_down_isolate(&self, attachment: AttachmentId) -> Result<()> {
        let (isolate_id, target) = self.resolve(attachment)?;

        target.tear_down(attachment)?;

        self.isolates.remove(&isolate_id);
        self.attachments.remove(&attachment);

        info!("Isolate {} torn down and unregistered", isolate_id);
        Ok(())
    }

    /// Pin a raw engine reference into the record's default scope.
    ///
    /// The returned handle stays valid until the record detaches; after
    /// that, resolution fails closed instead of reaching released memory.
    pub fn allocate_handle(
        &self,
        attachment: AttachmentId,
        raw: RawObjectRef,
    ) -> Result<ScopedHandle> {
        let (_, target) = self.resolve(attachment)?;
        target.allocate_handle(attachment, raw)
    }

    /// Resolve a scoped handle back to the pinned reference.
    ///
    /// Pure lookup: `None` once the owning record has detached or its
    /// isolate has been torn down.
    pub fn resolve_handle(&self, handle: &ScopedHandle) -> Option<RawObjectRef> {
        let target = self
            .attachments
            .get(&handle.attachment)
            .and_then(|entry| self.isolate(*entry.value()))?;
        target.resolve_handle(handle)
    }

    /// Clone out an isolate without holding a table guard across isolate
    /// lock acquisition.
    fn isolate(&self, id: IsolateId) -> Option<Arc<Isolate>> {
        self.isolates.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Resolve an attachment handle to its owning isolate.
    fn resolve(&self, attachment: AttachmentId) -> Result<(IsolateId, Arc<Isolate>)> {
        let isolate_id = self
            .owning_isolate(attachment)
            .ok_or(IsolateError::UnknownAttachment(attachment))?;
        let target = self
            .isolate(isolate_id)
            .ok_or(IsolateError::UnknownAttachment(attachment))?;
        Ok((isolate_id, target))
    }
}

impl Default for IsolateRegistry {
    fn default() -> Self {
        Self::new()
    }
}
