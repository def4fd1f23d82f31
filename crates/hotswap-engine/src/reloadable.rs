//! Reloadable types
//!
//! A [`ReloadableType`] is one logical type across all of its versions.
//! Versions are kept in an append-only arena; the current [`ExecutorTable`]
//! is published through a single `ArcSwap`, so a caller either sees the
//! table it loaded or the next one, never a mix.
//!
//! # Reload
//!
//! ```text
//! decode -> verify -> history check -> label check
//!        -> rewrite (or republish when byte-identical)
//!        -> [publish lock] refresh host shapes -> capture-site checks
//!        -> apply bindings -> append version -> publish
//! ```
//!
//! Everything before "apply bindings" is side-effect free, so a rejected
//! reload leaves the type exactly as it was. Reloads of one type are
//! serialized by a per-type lock. Different types rewrite independently
//! and only serialize on the Capture Site Table's publish lock, which a
//! closure host also holds while it rebinds its sites and publishes.

use crate::capture::{HostShape, SiteBinding};
use crate::error::{LookupError, RejectReason, ReloadRejected};
use crate::executor::{Executable, ExecutorTable};
use crate::layout::Layout;
use crate::registry::{visibility, TypeRegistry};
use crate::rewriter::{build_dispatcher, host_shape_of, rewrite_version, History, RewriteContext};
use arc_swap::ArcSwap;
use hotswap_unit::{verify_unit, TypeDesc, TypeDescriptor, TypeUnit, VerifyMode};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Numeric type id, assigned in registration order
pub type TypeId = u32;

/// Label of the version supplied at registration
pub const INITIAL_LABEL: &str = "initial";

const LOADED_LABEL: &str = "loaded";

/// One accepted version
#[derive(Debug)]
pub struct Version {
    /// Version index (0 = initial)
    pub index: usize,
    /// Caller-supplied label, unique per type
    pub label: String,
    /// Bytes as supplied
    pub bytes: Arc<[u8]>,
    /// Decoded unit
    pub unit: Arc<TypeUnit>,
    /// Summary of the unit, including its SHA-256 digest
    pub descriptor: TypeDescriptor,
    /// Encoded executor unit
    pub executor_bytes: Arc<[u8]>,
}

/// A registered type and its version history
pub struct ReloadableType {
    id: TypeId,
    name: Arc<str>,
    internal_name: String,
    registry: Weak<TypeRegistry>,

    /// Fixed at registration
    layout: Layout,
    loaded_unit: TypeUnit,
    loaded_bytes: Arc<[u8]>,
    dispatchers: ExecutorTable,
    loaded_methods: FxHashMap<String, bool>,
    promoted: bool,

    versions: RwLock<Vec<Arc<Version>>>,
    history: RwLock<History>,
    table: ArcSwap<ExecutorTable>,
    reload_lock: Mutex<()>,
}

impl ReloadableType {
    /// Build a type from its initial version
    ///
    /// Returns the capture-site bindings of the initial version; the
    /// registry applies them once the type is visible.
    pub(crate) fn create(
        registry: &Arc<TypeRegistry>,
        id: TypeId,
        unit: TypeUnit,
        bytes: &[u8],
    ) -> Result<(Self, Vec<SiteBinding>), RejectReason> {
        let config = registry.config();
        let name: Arc<str> = Arc::from(unit.name.as_str());
        let layout = Layout::from_unit(&unit);
        let loaded_methods: FxHashMap<String, bool> = unit
            .methods
            .iter()
            .map(|m| (m.key(), m.is_static()))
            .collect();

        let mut loaded_unit = build_dispatcher(&unit)?;
        let promoted = config.promote_nested_visibility && visibility::promote(&mut loaded_unit);
        if promoted {
            debug!(type_name = %name, "promoted nested type to public");
        }
        if config.verify_units {
            verify_unit(&loaded_unit, VerifyMode::Rewritten)?;
        }
        let loaded_bytes: Arc<[u8]> = Arc::from(loaded_unit.encode());
        let dispatchers = ExecutorTable::from_executor_unit(&loaded_unit, id, &name, 0, LOADED_LABEL);

        let rewritten = rewrite_version(
            &unit,
            &RewriteContext {
                type_id: id,
                version: 0,
                layout: &layout,
                loaded_methods: &loaded_methods,
                registry,
                verify: config.verify_units,
            },
        )?;

        let table = ExecutorTable::from_executor_unit(&rewritten.executor, id, &name, 0, INITIAL_LABEL);
        let version = Version {
            index: 0,
            label: INITIAL_LABEL.to_string(),
            bytes: Arc::from(bytes),
            descriptor: unit.descriptor(bytes),
            executor_bytes: Arc::from(rewritten.executor_bytes),
            unit: Arc::new(unit),
        };
        let history = History::from_initial(&version.unit);

        let ty = Self {
            id,
            internal_name: version.unit.internal_name(),
            name,
            registry: Arc::downgrade(registry),
            layout,
            loaded_unit,
            loaded_bytes,
            dispatchers,
            loaded_methods,
            promoted,
            versions: RwLock::new(vec![Arc::new(version)]),
            history: RwLock::new(history),
            table: ArcSwap::from_pointee(table),
            reload_lock: Mutex::new(()),
        };
        Ok((ty, rewritten.bindings))
    }

    /// Numeric id
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Dotted name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Slashed name
    pub fn internal_name(&self) -> &str {
        &self.internal_name
    }

    /// Owning registry, if it is still alive
    pub fn registry(&self) -> Option<Arc<TypeRegistry>> {
        self.registry.upgrade()
    }

    /// Descriptor of the initial version
    pub fn descriptor(&self) -> TypeDescriptor {
        self.initial_version().descriptor.clone()
    }

    /// Baseline layout every instance is allocated with
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Whether the type hosts a closure
    pub fn is_closure_host(&self) -> bool {
        self.loaded_unit.is_closure_host()
    }

    /// Capture shape of the current version and its index, for closure hosts
    pub fn current_host_shape(&self) -> Option<(usize, HostShape)> {
        let current = self.current_version();
        current
            .unit
            .is_closure_host()
            .then(|| (current.index, host_shape_of(&current.unit)))
    }

    /// Declared type of a field in any accepted version
    pub fn field_type(&self, name: &str) -> Option<TypeDesc> {
        self.history.read().field_types.get(name).cloned()
    }

    /// Whether a signature is declared by the loaded unit, and if so whether it is static
    pub fn loaded_method_kind(&self, key: &str) -> Option<bool> {
        self.loaded_methods.get(key).copied()
    }

    /// Unit the host runtime loads under this type's name
    pub fn loaded_unit(&self) -> &TypeUnit {
        &self.loaded_unit
    }

    /// Encoded loaded unit
    pub fn loaded_unit_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.loaded_bytes)
    }

    /// Dispatcher body of a loaded method; what the host runtime invokes
    pub fn dispatcher(&self, key: &str) -> Option<Arc<Executable>> {
        self.dispatchers.get(key).cloned()
    }

    /// Whether the loaded unit's visibility was promoted at registration
    pub fn was_promoted(&self) -> bool {
        self.promoted
    }

    /// Current executor table
    pub fn current_table(&self) -> Arc<ExecutorTable> {
        self.table.load_full()
    }

    /// Live implementation of a signature
    pub fn current_executable(&self, key: &str) -> Result<Arc<Executable>, LookupError> {
        if let Some(executable) = self.table.load().get(key) {
            return Ok(Arc::clone(executable));
        }
        if self.history.read().method_kinds.contains_key(key) {
            Err(LookupError::RemovedMemberInvoked {
                type_name: self.name.to_string(),
                signature: key.to_string(),
            })
        } else {
            Err(LookupError::NoSuchMember {
                type_name: self.name.to_string(),
                signature: key.to_string(),
            })
        }
    }

    /// Initial version
    pub fn initial_version(&self) -> Arc<Version> {
        Arc::clone(&self.versions.read()[0])
    }

    /// Version the current table was built from
    pub fn current_version(&self) -> Arc<Version> {
        let index = self.table.load().version();
        Arc::clone(&self.versions.read()[index])
    }

    /// Every accepted version, oldest first
    pub fn versions(&self) -> Vec<Arc<Version>> {
        self.versions.read().clone()
    }

    /// Number of accepted versions
    pub fn version_count(&self) -> usize {
        self.versions.read().len()
    }

    /// Bytes of the initial version
    pub fn initial_unit_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.initial_version().bytes)
    }

    /// Bytes of the current version
    pub fn current_unit_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.current_version().bytes)
    }

    /// Encoded executor unit of the current version
    pub fn current_executor_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.current_version().executor_bytes)
    }

    /// Replace the implementation with a new version
    ///
    /// On rejection nothing changes: no version is appended, the current
    /// table stays published and no capture site is touched.
    pub fn reload(&self, label: &str, bytes: &[u8]) -> Result<(), ReloadRejected> {
        let _guard = self.reload_lock.lock();
        match self.try_reload(label, bytes) {
            Ok(version) => {
                info!(
                    type_name = %self.name,
                    type_id = self.id,
                    label,
                    version,
                    "published reload"
                );
                Ok(())
            }
            Err(reason) => {
                warn!(type_name = %self.name, label, %reason, "reload rejected");
                Err(ReloadRejected {
                    type_name: self.name.to_string(),
                    label: label.to_string(),
                    reason,
                })
            }
        }
    }

    fn try_reload(&self, label: &str, bytes: &[u8]) -> Result<usize, RejectReason> {
        let registry = self.registry.upgrade().ok_or(RejectReason::Detached)?;
        let config = registry.config();

        let unit = TypeUnit::decode(bytes)?;
        if config.verify_units {
            verify_unit(&unit, VerifyMode::Source)?;
        }
        self.history.read().check(&unit)?;
        if self.versions.read().iter().any(|v| v.label == label) {
            return Err(RejectReason::DuplicateVersionLabel(label.to_string()));
        }

        let index = self.version_count();
        let descriptor = unit.descriptor(bytes);
        let current_table = self.table.load_full();
        let current = self.current_version();

        let rewritten = if descriptor.digest == current.descriptor.digest {
            debug!(type_name = %self.name, label, "byte-identical reload");
            None
        } else {
            Some(rewrite_version(
                &unit,
                &RewriteContext {
                    type_id: self.id,
                    version: index,
                    layout: &self.layout,
                    loaded_methods: &self.loaded_methods,
                    registry: &registry,
                    verify: config.verify_units,
                },
            )?)
        };

        let sites = registry.sites();
        let _publish = sites.lock_publish();
        let (table, executor_bytes) = match rewritten {
            None => (
                current_table.republish(index, label),
                Arc::clone(&current.executor_bytes),
            ),
            Some(mut rewritten) => {
                registry.refresh_bindings(self.id, &self.name, &mut rewritten.bindings)?;
                for binding in &rewritten.bindings {
                    sites.check(binding)?;
                }
                let shape = unit.is_closure_host().then(|| host_shape_of(&unit));
                if let Some(shape) = &shape {
                    sites.check_host(&self.name, self.id, shape)?;
                }

                for binding in &rewritten.bindings {
                    sites.bind(binding);
                }
                if let Some(shape) = &shape {
                    let rebound = sites.rebind_host(&self.name, self.id, index, shape);
                    debug!(type_name = %self.name, rebound, "rebound capture sites");
                }
                self.history.write().record(&unit);

                let table =
                    ExecutorTable::from_executor_unit(&rewritten.executor, self.id, &self.name, index, label);
                (table, Arc::from(rewritten.executor_bytes))
            }
        };

        self.versions.write().push(Arc::new(Version {
            index,
            label: label.to_string(),
            bytes: Arc::from(bytes),
            unit: Arc::new(unit),
            descriptor,
            executor_bytes,
        }));
        self.table.store(Arc::new(table));
        Ok(index)
    }
}

impl fmt::Debug for ReloadableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table.load();
        f.debug_struct("ReloadableType")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("version", &table.version())
            .field("label", &table.label())
            .finish()
    }
}
