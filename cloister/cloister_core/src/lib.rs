//! # Cloister Core
//!
//! `cloister_core` provides the fundamental building blocks for the Cloister
//! isolate lifecycle system: the opaque handle families and the error
//! hierarchy shared by every other crate in the workspace.
//!
//! ## Crate Structure
//!
//! - **error**: Error types for all Cloister components
//! - **id**: Strongly-typed identifier types

pub mod error;
pub mod id;

// Re-export key types for convenience
pub use error::{Error, IsolateError, Result};
pub use id::{AttachmentId, IsolateId};
