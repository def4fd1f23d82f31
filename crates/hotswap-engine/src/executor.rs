//! Executor tables
//!
//! An [`ExecutorTable`] maps each signature key declared by one version to
//! its rewritten implementation. Tables are built once and never mutated;
//! a reload publishes a whole new table.

use crate::reloadable::TypeId;
use hotswap_unit::{ConstantPool, MethodSignature, TypeUnit};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// A rewritten method body, ready to run
#[derive(Debug)]
pub struct Executable {
    /// Signature key the method is dispatched under
    pub key: String,
    /// Signature
    pub signature: MethodSignature,
    /// Whether the method has no receiver
    pub is_static: bool,
    /// Declaring type
    pub type_id: TypeId,
    /// Declaring type name
    pub type_name: Arc<str>,
    /// Executor unit holding the body; the accessor for visibility checks
    pub unit_name: Arc<str>,
    /// Version index the body belongs to
    pub version: usize,
    /// Local slots, receiver and parameters included
    pub local_count: u16,
    /// Declared exception types
    pub exceptions: Vec<String>,
    /// Rewritten code
    pub code: Arc<[u8]>,
    /// Constant pool of the executor unit
    pub constants: Arc<ConstantPool>,
}

impl Executable {
    /// Argument slots, receiver included
    pub fn arg_slots(&self) -> usize {
        self.signature.param_count() + usize::from(!self.is_static)
    }
}

/// Signature -> implementation map of one version
#[derive(Debug)]
pub struct ExecutorTable {
    type_name: Arc<str>,
    version: usize,
    label: String,
    entries: FxHashMap<String, Arc<Executable>>,
}

impl ExecutorTable {
    /// Build a table from an executor unit
    pub(crate) fn from_executor_unit(
        executor: &TypeUnit,
        type_id: TypeId,
        type_name: &Arc<str>,
        version: usize,
        label: &str,
    ) -> Self {
        let unit_name: Arc<str> = Arc::from(executor.name.as_str());
        let constants = Arc::new(executor.constants.clone());
        let entries = executor
            .methods
            .iter()
            .map(|method| {
                let key = method.key();
                let executable = Executable {
                    key: key.clone(),
                    signature: method.signature.clone(),
                    is_static: method.is_static(),
                    type_id,
                    type_name: Arc::clone(type_name),
                    unit_name: Arc::clone(&unit_name),
                    version,
                    local_count: method.local_count,
                    exceptions: method.exceptions.clone(),
                    code: Arc::from(method.code.as_slice()),
                    constants: Arc::clone(&constants),
                };
                (key, Arc::new(executable))
            })
            .collect();

        Self {
            type_name: Arc::clone(type_name),
            version,
            label: label.to_string(),
            entries,
        }
    }

    /// Same implementations published under a new version
    pub(crate) fn republish(&self, version: usize, label: &str) -> Self {
        Self {
            type_name: Arc::clone(&self.type_name),
            version,
            label: label.to_string(),
            entries: self.entries.clone(),
        }
    }

    /// Type the table belongs to
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Version index
    pub fn version(&self) -> usize {
        self.version
    }

    /// Version label
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Implementation of a signature
    pub fn get(&self, key: &str) -> Option<&Arc<Executable>> {
        self.entries.get(key)
    }

    /// Whether a signature is present
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Signature keys, unordered
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
