//! Configuration for isolates and the isolate registry.

use serde::{Deserialize, Serialize};

/// Default address space reserved for a new isolate's heap, in bytes.
pub const DEFAULT_RESERVED_ADDRESS_SPACE: usize = 64 * 1024 * 1024;

/// Default initial capacity of a thread's default handle scope.
pub const DEFAULT_SCOPE_CAPACITY: usize = 64;

/// Default per-isolate address space reservation ceiling, in bytes.
pub const DEFAULT_ADDRESS_SPACE_CEILING: usize = 64 * 1024 * 1024 * 1024;

/// Creation parameters for a single isolate.
///
/// Absent parameters fall back to the defaults, so `IsolateParams::default()`
/// is always a valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolateParams {
    /// Address space reserved for the isolate's heap, in bytes
    pub reserved_address_space: usize,

    /// Initial capacity of each attached thread's default handle scope
    pub scope_capacity: usize,
}

impl Default for IsolateParams {
    fn default() -> Self {
        Self {
            reserved_address_space: DEFAULT_RESERVED_ADDRESS_SPACE,
            scope_capacity: DEFAULT_SCOPE_CAPACITY,
        }
    }
}

/// Configuration for an isolate registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Maximum number of live isolates the registry admits, or `None` for
    /// no limit
    pub max_isolates: Option<usize>,

    /// Largest heap reservation a single isolate may request, in bytes
    pub address_space_ceiling: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_isolates: None,
            address_space_ceiling: DEFAULT_ADDRESS_SPACE_CEILING,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params() {
        let params = IsolateParams::default();
        assert_eq!(params.reserved_address_space, DEFAULT_RESERVED_ADDRESS_SPACE);
        assert_eq!(params.scope_capacity, DEFAULT_SCOPE_CAPACITY);
    }

    #[test]
    fn test_default_registry_config() {
        let config = RegistryConfig::default();
        assert!(config.max_isolates.is_none());
        assert!(config.address_space_ceiling >= DEFAULT_RESERVED_ADDRESS_SPACE);
    }
}
