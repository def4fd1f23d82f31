//! Hotswap Engine
//!
//! Reload the implementation of a type inside a running process while
//! existing instances keep their identity and state:
//! - **Registry**: admits types and owns their versions (`registry` module)
//! - **Rewriter**: turns each version into an executor unit and the loaded
//!   unit into a dispatcher (`rewriter` module)
//! - **Reloadable types**: version history and the published executor
//!   table (`reloadable` module)
//! - **Field extensions and capture sites**: storage for fields and
//!   captured variables that the baseline layout does not have
//!   (`field_store`, `capture` modules)
//! - **VM**: a reference host runtime that runs the rewritten code (`vm` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use hotswap_engine::{EngineConfig, TypeRegistry, Vm};
//!
//! let registry = TypeRegistry::new(EngineConfig::default().registry);
//! let counter = registry.register("app.Counter", &v1_bytes)?;
//!
//! let vm = Vm::new(Arc::clone(&registry));
//! let object = vm.new_instance("app.Counter")?;
//! vm.invoke_virtual(&object, "next()I", &[])?;
//!
//! counter.reload("v2", &v2_bytes)?;
//! vm.invoke_virtual(&object, "next()I", &[])?; // runs v2, same object
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// ============================================================================
// Core Modules
// ============================================================================

/// Error types
pub mod error;

/// Engine configuration
pub mod config;

/// Type registry, name patterns and visibility promotion
pub mod registry;

/// Reloadable types and their versions
pub mod reloadable;

/// Version rewriting and dispatcher generation
pub mod rewriter;

/// Executor tables
pub mod executor;

// ============================================================================
// Object Model
// ============================================================================

/// Baseline instance layouts
pub mod layout;

/// Per-object storage for fields added by reloads
pub mod field_store;

/// Closure capture sites
pub mod capture;

/// Runtime values
pub mod value;

/// Instances and closures
pub mod object;

/// Reference host runtime
pub mod vm;

// ============================================================================
// Re-exports
// ============================================================================

pub use capture::{CaptureSite, CaptureSiteTable, HostShape, SiteId};
pub use config::{ConfigError, EngineConfig, RegistryConfig, VmOptions};
pub use error::{LookupError, RegistryError, RejectReason, ReloadRejected};
pub use executor::{Executable, ExecutorTable};
pub use field_store::{FieldExtensionStore, ObjectId};
pub use layout::Layout;
pub use object::{ClosureInstance, Instance};
pub use registry::{NamePattern, RegistryScope, TypeRegistry};
pub use reloadable::{ReloadableType, TypeId, Version, INITIAL_LABEL};
pub use value::Value;
pub use vm::{Vm, VmError, VmResult};
