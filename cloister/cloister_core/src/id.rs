//! Strongly-typed identifiers for the Cloister isolate core.
//!
//! This module provides the opaque handle families used throughout the
//! system. Each handle type is a thin wrapper around a UUID with a phantom
//! type parameter, so an isolate handle can never be passed where an
//! attachment handle is expected, even though both share the same
//! underlying representation.
//!
//! # Examples
//!
//! ```
//! use cloister_core::id::{AttachmentId, IsolateId};
//! use std::str::FromStr;
//!
//! // Create new random handles
//! let isolate_id = IsolateId::new();
//! let attachment_id = AttachmentId::new();
//!
//! // Create from string
//! let id_str = "550e8400-e29b-41d4-a716-446655440000";
//! let isolate_id = IsolateId::from_str(id_str).unwrap();
//! assert_eq!(isolate_id.to_string(), id_str);
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::{Ord, PartialOrd};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A type-safe identifier based on UUID.
///
/// This is a generic identifier type that is specialized for different
/// entity types using the phantom type parameter `T`. Handles are
/// process-unique and opaque: nothing about their numeric encoding is part
/// of the lifecycle contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct Id<T> {
    uuid: Uuid,
    #[serde(skip)]
    _marker: std::marker::PhantomData<T>,
}

impl<T> Id<T> {
    /// Create a new random identifier.
    pub fn new() -> Self {
        Self {
            uuid: Uuid::new_v4(),
            _marker: std::marker::PhantomData,
        }
    }

    /// Create an identifier from a specific UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self {
            uuid,
            _marker: std::marker::PhantomData,
        }
    }

    /// Get the underlying UUID.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Create a nil (all zeros) identifier.
    ///
    /// Useful as a sentinel value in tests; no live isolate or attachment
    /// ever carries the nil handle.
    pub fn nil() -> Self {
        Self {
            uuid: Uuid::nil(),
            _marker: std::marker::PhantomData,
        }
    }

    /// Check if this is a nil identifier.
    pub fn is_nil(&self) -> bool {
        self.uuid == Uuid::nil()
    }
}

impl<T> Default for Id<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uuid)
    }
}

impl<T> FromStr for Id<T> {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self {
            uuid: Uuid::parse_str(s)?,
            _marker: std::marker::PhantomData,
        })
    }
}

/// Marker type for isolates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IsolateMarker;
/// Identifier for an isolate.
pub type IsolateId = Id<IsolateMarker>;

/// Marker type for thread attachment records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentMarker;
/// Identifier for a thread attachment record.
pub type AttachmentId = Id<AttachmentMarker>;
