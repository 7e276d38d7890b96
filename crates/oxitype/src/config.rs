//! Registry configuration.
//!
//! Settings can be given in code through the `with_*` builders or read from
//! the environment:
//!
//! | variable                    | meaning                              |
//! |-----------------------------|--------------------------------------|
//! | `OXITYPE_REGISTRY_CAPACITY` | initial type table capacity          |
//! | `OXITYPE_LOG`               | log level (`error` .. `trace`)       |

use oxitype_log::Level;
use oxitype_mem::{Allocator, SystemAllocator};
use std::fmt;
use std::sync::Arc;

/// Environment variable holding the initial type table capacity.
pub const CAPACITY_ENV: &str = "OXITYPE_REGISTRY_CAPACITY";

/// Default number of table slots reserved up front.
pub const DEFAULT_CAPACITY: usize = 64;

/// How a [`Registry`](crate::Registry) is set up.
///
/// # Example
///
/// ```rust
/// use oxitype::{Registry, RegistryConfig};
/// use oxitype_mem::{ArenaAllocator, Allocator};
/// use std::sync::Arc;
///
/// let arena: Arc<dyn Allocator> = Arc::new(ArenaAllocator::new(4096));
/// let registry = Registry::with_config(
///     RegistryConfig::default()
///         .with_initial_capacity(128)
///         .with_allocator(arena),
/// );
/// assert_eq!(registry.name(oxitype::TypeId::STRING), Some("string"));
/// ```
#[derive(Clone)]
pub struct RegistryConfig {
    /// Type table slots reserved at construction.
    pub initial_capacity: usize,
    /// Source of every class and instance block.
    pub allocator: Arc<dyn Allocator>,
    /// Applied to the process-wide logger when the registry is built.
    pub log_level: Option<Level>,
}

impl RegistryConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the configuration from the environment.
    ///
    /// Unset or unparsable variables keep their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(capacity) = std::env::var(CAPACITY_ENV)
            .ok()
            .and_then(|v| v.trim().parse().ok())
        {
            config.initial_capacity = capacity;
        }
        config.log_level = std::env::var(oxitype_log::LEVEL_ENV)
            .ok()
            .and_then(|v| v.parse().ok());
        config
    }

    #[must_use]
    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_allocator(mut self, allocator: Arc<dyn Allocator>) -> Self {
        self.allocator = allocator;
        self
    }

    #[must_use]
    pub fn with_log_level(mut self, level: Level) -> Self {
        self.log_level = Some(level);
        self
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            initial_capacity: DEFAULT_CAPACITY,
            allocator: Arc::new(SystemAllocator),
            log_level: None,
        }
    }
}

impl fmt::Debug for RegistryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryConfig")
            .field("initial_capacity", &self.initial_capacity)
            .field("log_level", &self.log_level)
            .finish_non_exhaustive()
    }
}
