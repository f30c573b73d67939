//! # Cloister Isolate
//!
//! `cloister_isolate` implements the lifecycle protocol binding native
//! threads to isolates: independent, self-contained runtime execution
//! contexts that coexist within a single process.
//!
//! Key concepts:
//!
//! 1. **Isolate**: An independent runtime context with its own heap
//!    reservation and set of attached threads.
//!
//! 2. **Attachment Record**: Per-thread state binding one OS thread to one
//!    isolate, owning the thread's default handle scope.
//!
//! 3. **Handle Scope**: A growable arena of object references released
//!    deterministically when its thread detaches.
//!
//! 4. **Isolate Registry**: The process-wide table of live isolates and the
//!    entry point for the lifecycle API.
//!
//! 5. **Teardown**: A quiescence barrier that blocks new attachments, waits
//!    for every attached thread to detach, then releases the isolate.
//!
//! The execution engine running inside an isolate is an external
//! collaborator; this crate specifies only the lifecycle and concurrency
//! contract around it.

pub mod attach;
pub mod config;
pub mod isolate;
pub mod registry;
pub mod scope;

// Re-export key types for convenience
pub use attach::AttachmentRecord;
pub use config::{IsolateParams, RegistryConfig};
pub use isolate::{Isolate, LifecycleState};
pub use registry::IsolateRegistry;
pub use scope::{HandleScope, RawObjectRef, ScopedHandle};
