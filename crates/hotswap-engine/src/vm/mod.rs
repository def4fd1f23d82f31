//! Reference host runtime
//!
//! A small recursive stack interpreter that runs loaded and executor
//! units. Host entry points invoke the loaded (dispatcher) bodies, exactly
//! as compiled callers would; every `DISPATCH` and dynamic invocation
//! loads the type's current executor table afresh, so a reload is picked
//! up on the next call and never in the middle of one.

mod interpreter;
mod stack;

pub use stack::{CallFrame, Stack};

use crate::config::VmOptions;
use crate::error::LookupError;
use crate::object::{ClosureInstance, Instance};
use crate::registry::TypeRegistry;
use crate::value::Value;
use hotswap_unit::DecodeError;
use interpreter::Interpreter;
use std::sync::Arc;
use thiserror::Error;

/// Interpreter errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum VmError {
    /// Stack overflow
    #[error("Stack overflow")]
    StackOverflow,

    /// Stack underflow
    #[error("Stack underflow")]
    StackUnderflow,

    /// Too many nested calls
    #[error("Call depth exceeded ({0})")]
    CallDepthExceeded(usize),

    /// Type error
    #[error("Type error: {0}")]
    TypeError(String),

    /// Division by zero
    #[error("Division by zero")]
    DivisionByZero,

    /// Null receiver or field owner
    #[error("Null pointer exception")]
    NullPointer,

    /// A referenced type is not registered
    #[error("Unknown type: {0}")]
    UnknownType(String),

    /// No version of the type declares the field
    #[error("{type_name} has no field {field}")]
    NoSuchField {
        /// Owner type
        type_name: String,
        /// Field name
        field: String,
    },

    /// Code in one type reached a type it may not access
    #[error("{accessor} may not access {target}")]
    IllegalAccess {
        /// Unit whose code made the access
        accessor: String,
        /// Type accessed
        target: String,
    },

    /// Code that should have been rewritten reached the interpreter
    #[error("Unrewritten instruction {0}")]
    Unrewritten(&'static str),

    /// Method lookup failed
    #[error(transparent)]
    Lookup(#[from] LookupError),

    /// Code did not decode
    #[error("Bad code: {0}")]
    Decode(#[from] DecodeError),

    /// Runtime error
    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// VM execution result
pub type VmResult<T> = Result<T, VmError>;

/// Interpreter over a registry's types
///
/// A `Vm` is cheap to share between threads; every invocation runs on its
/// own stack.
#[derive(Debug, Clone)]
pub struct Vm {
    registry: Arc<TypeRegistry>,
    options: VmOptions,
}

impl Vm {
    /// Create a VM with default options
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self::with_options(registry, VmOptions::default())
    }

    /// Create a VM with explicit options
    pub fn with_options(registry: Arc<TypeRegistry>, options: VmOptions) -> Self {
        Self { registry, options }
    }

    /// Registry the VM resolves types through
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Options
    pub fn options(&self) -> &VmOptions {
        &self.options
    }

    /// Allocate an instance of a registered type
    pub fn new_instance(&self, type_name: &str) -> VmResult<Arc<Instance>> {
        let ty = self
            .registry
            .get(type_name)
            .ok_or_else(|| VmError::UnknownType(type_name.to_string()))?;
        if ty.is_closure_host() {
            return Err(VmError::TypeError(format!(
                "{} hosts a closure and cannot be instantiated",
                type_name
            )));
        }
        Ok(Arc::new(Instance::new(ty, self.registry.extensions())))
    }

    /// Invoke a static method the way a compiled caller would
    pub fn invoke_static(&self, type_name: &str, signature: &str, args: &[Value]) -> VmResult<Value> {
        Interpreter::new(self).invoke_static(type_name, signature, args)
    }

    /// Invoke an instance method the way a compiled caller would
    pub fn invoke_virtual(&self, receiver: &Arc<Instance>, signature: &str, args: &[Value]) -> VmResult<Value> {
        Interpreter::new(self).invoke_virtual(receiver, signature, args)
    }

    /// Invoke a closure's functional method
    pub fn invoke_closure(
        &self,
        closure: &Arc<ClosureInstance>,
        signature: &str,
        args: &[Value],
    ) -> VmResult<Value> {
        Interpreter::new(self).invoke_closure(closure, signature, args)
    }
}
