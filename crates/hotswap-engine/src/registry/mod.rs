//! Type Registry
//!
//! The registry owns every [`ReloadableType`] of a process, together with
//! the shared structures their code runs against: the Field Extension
//! Store and the Capture Site Table. Ids are handed out in registration
//! order and never reused.
//!
//! Registration is explicit and ordered: a type must be registered after
//! every type its code references, except its own enclosing types, which
//! nested types reach through late-bound access.

mod pattern;
mod scope;
pub mod visibility;

pub use pattern::NamePattern;
pub use scope::RegistryScope;

use crate::capture::{CaptureSiteTable, SiteBinding};
use crate::config::RegistryConfig;
use crate::error::{RegistryError, RejectReason};
use crate::field_store::FieldExtensionStore;
use crate::reloadable::{ReloadableType, TypeId};
use dashmap::DashMap;
use hotswap_unit::{verify_unit, TypeUnit, VerifyMode};
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{info, warn};

static GLOBAL: OnceCell<Arc<TypeRegistry>> = OnceCell::new();

/// Process-wide set of reloadable types
pub struct TypeRegistry {
    config: RegistryConfig,
    include: Vec<NamePattern>,
    exclude: Vec<NamePattern>,
    types: DashMap<String, Arc<ReloadableType>>,
    by_id: RwLock<Vec<Arc<ReloadableType>>>,
    register_lock: Mutex<()>,
    extensions: Arc<FieldExtensionStore>,
    sites: CaptureSiteTable,
    this: Weak<TypeRegistry>,
}

impl TypeRegistry {
    /// Create a registry
    ///
    /// Patterns that do not parse are skipped; use
    /// [`RegistryConfig::validate`] to reject them up front.
    pub fn new(config: RegistryConfig) -> Arc<Self> {
        let parse = |patterns: &[String]| {
            patterns
                .iter()
                .filter_map(|p| match NamePattern::parse(p) {
                    Ok(pattern) => Some(pattern),
                    Err(e) => {
                        warn!(%e, "ignoring name pattern");
                        None
                    }
                })
                .collect::<Vec<_>>()
        };
        let include = parse(&config.include);
        let exclude = parse(&config.exclude);

        Arc::new_cyclic(|this| Self {
            config,
            include,
            exclude,
            types: DashMap::new(),
            by_id: RwLock::new(Vec::new()),
            register_lock: Mutex::new(()),
            extensions: Arc::new(FieldExtensionStore::new()),
            sites: CaptureSiteTable::new(),
            this: this.clone(),
        })
    }

    /// The process-wide registry, created with default settings on first use
    pub fn global() -> Arc<Self> {
        Arc::clone(GLOBAL.get_or_init(|| TypeRegistry::new(RegistryConfig::default())))
    }

    /// Settings
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Field Extension Store shared by every instance
    pub fn extensions(&self) -> &Arc<FieldExtensionStore> {
        &self.extensions
    }

    /// Capture Site Table
    pub fn sites(&self) -> &CaptureSiteTable {
        &self.sites
    }

    /// Whether a name may be registered
    pub fn is_included(&self, name: &str) -> bool {
        self.include.iter().any(|p| p.matches(name)) && !self.exclude.iter().any(|p| p.matches(name))
    }

    /// Register the initial version of a type
    pub fn register(&self, name: &str, bytes: &[u8]) -> Result<Arc<ReloadableType>, RegistryError> {
        if !self.is_included(name) {
            return Err(RegistryError::NotIncluded(name.to_string()));
        }
        let this = self
            .this
            .upgrade()
            .ok_or_else(|| RegistryError::from_reason(name, RejectReason::Detached))?;

        let _guard = self.register_lock.lock();
        if self.types.contains_key(name) {
            return Err(RegistryError::DuplicateRegistration(name.to_string()));
        }

        let reject = |reason: RejectReason| {
            warn!(type_name = name, %reason, "registration rejected");
            RegistryError::from_reason(name, reason)
        };

        let unit = TypeUnit::decode(bytes).map_err(|e| reject(e.into()))?;
        if self.config.verify_units {
            verify_unit(&unit, VerifyMode::Source).map_err(|e| reject(e.into()))?;
        }
        if unit.name != name {
            return Err(reject(RejectReason::NameMismatch {
                expected: name.to_string(),
                found: unit.name,
            }));
        }

        let id = self.by_id.read().len() as TypeId;
        let (ty, mut bindings) = ReloadableType::create(&this, id, unit, bytes).map_err(reject)?;
        let ty = Arc::new(ty);

        let _publish = self.sites.lock_publish();
        self.refresh_bindings(id, name, &mut bindings).map_err(reject)?;
        for binding in &bindings {
            self.sites.check(binding).map_err(reject)?;
        }

        self.types.insert(name.to_string(), Arc::clone(&ty));
        self.by_id.write().push(Arc::clone(&ty));
        for binding in &bindings {
            self.sites.bind(binding);
        }

        info!(
            type_name = name,
            type_id = id,
            promoted = ty.was_promoted(),
            sites = bindings.len(),
            "registered type"
        );
        Ok(ty)
    }

    /// Re-read host shapes for bindings produced by a rewrite
    ///
    /// Runs under the Capture Site Table's publish lock. A host reloaded
    /// after the rewrite read its shape is bound at its published version;
    /// a creation expression that no longer matches its host is refused.
    pub(crate) fn refresh_bindings(
        &self,
        declaring: TypeId,
        from: &str,
        bindings: &mut [SiteBinding],
    ) -> Result<(), RejectReason> {
        for binding in bindings.iter_mut().filter(|b| b.host_id != declaring) {
            let current = self
                .get_by_id(binding.host_id)
                .and_then(|host| host.current_host_shape());
            let Some((version, shape)) = current else {
                return Err(RejectReason::MalformedUnit(format!(
                    "{} is not a closure host",
                    binding.host
                )));
            };
            if version == binding.host_version {
                continue;
            }
            if shape.captured.len() != binding.passed || shape.captures_this != binding.shape.captures_this {
                return Err(RejectReason::MalformedUnit(format!(
                    "{} passes {} values but {} now captures {}",
                    from,
                    binding.passed,
                    binding.host,
                    shape.captured.len()
                )));
            }
            binding.host_version = version;
            binding.shape = shape;
        }
        Ok(())
    }

    /// Reload a registered type
    pub fn reload(&self, name: &str, label: &str, bytes: &[u8]) -> Result<(), RegistryError> {
        let ty = self
            .get(name)
            .ok_or_else(|| RegistryError::UnknownType(name.to_string()))?;
        ty.reload(label, bytes)?;
        Ok(())
    }

    /// Look up a type by name
    pub fn get(&self, name: &str) -> Option<Arc<ReloadableType>> {
        self.types.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Look up a type by id
    pub fn get_by_id(&self, id: TypeId) -> Option<Arc<ReloadableType>> {
        self.by_id.read().get(id as usize).cloned()
    }

    /// Every registered type, in registration order
    pub fn types(&self) -> Vec<Arc<ReloadableType>> {
        self.by_id.read().clone()
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.by_id.read().len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Scope onto the types matching a pattern
    pub fn resolve(&self, pattern: &str) -> Result<RegistryScope, RegistryError> {
        let parsed = NamePattern::parse(pattern)?;
        let this = self
            .this
            .upgrade()
            .ok_or_else(|| RegistryError::from_reason(pattern, RejectReason::Detached))?;
        Ok(RegistryScope::new(this, parsed))
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.len())
            .field("sites", &self.sites.len())
            .field("extended_objects", &self.extensions.object_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotswap_unit::{access, method_flags, UnitBuilder};

    fn simple(name: &str) -> Vec<u8> {
        UnitBuilder::new(name)
            .method("run()I", method_flags::STATIC, 0, |b| {
                b.const_i32(1).ret();
            })
            .encode()
            .unwrap()
    }

    #[test]
    fn test_ids_follow_registration_order() {
        let registry = TypeRegistry::new(RegistryConfig::default());
        let a = registry.register("basic.A", &simple("basic.A")).unwrap();
        let b = registry.register("basic.B", &simple("basic.B")).unwrap();
        assert_eq!((a.id(), b.id()), (0, 1));
        assert_eq!(a.internal_name(), "basic/A");
        assert!(Arc::ptr_eq(&registry.get_by_id(1).unwrap(), &b));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_duplicate_registration() {
        let registry = TypeRegistry::new(RegistryConfig::default());
        registry.register("basic.A", &simple("basic.A")).unwrap();
        assert_eq!(
            registry.register("basic.A", &simple("basic.A")).unwrap_err(),
            RegistryError::DuplicateRegistration("basic.A".to_string())
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_name_mismatch_and_garbage() {
        let registry = TypeRegistry::new(RegistryConfig::default());
        assert!(matches!(
            registry.register("basic.A", &simple("basic.B")),
            Err(RegistryError::Rejected {
                reason: RejectReason::NameMismatch { .. },
                ..
            })
        ));
        assert!(matches!(
            registry.register("basic.A", b"\x00\x01"),
            Err(RegistryError::MalformedUnit { .. })
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_include_and_exclude() {
        let registry = TypeRegistry::new(RegistryConfig {
            include: vec!["basic..*".to_string()],
            exclude: vec!["basic.internal.*".to_string()],
            ..RegistryConfig::default()
        });
        assert!(registry.register("basic.A", &simple("basic.A")).is_ok());
        assert_eq!(
            registry
                .register("basic.internal.B", &simple("basic.internal.B"))
                .unwrap_err(),
            RegistryError::NotIncluded("basic.internal.B".to_string())
        );
        assert!(matches!(
            registry.register("other.C", &simple("other.C")),
            Err(RegistryError::NotIncluded(_))
        ));
    }

    #[test]
    fn test_promotion_of_private_nested_type() {
        let registry = TypeRegistry::new(RegistryConfig::default());
        let helper = UnitBuilder::new("basic.Outer$Helper")
            .access(access::PRIVATE)
            .encode()
            .unwrap();
        let ty = registry.register("basic.Outer$Helper", &helper).unwrap();
        assert!(ty.was_promoted());
        assert!(ty.loaded_unit().is_public());
        // the supplied unit is kept as it was
        assert!(!ty.initial_version().unit.is_public());

        let registry = TypeRegistry::new(RegistryConfig {
            promote_nested_visibility: false,
            ..RegistryConfig::default()
        });
        let ty = registry.register("basic.Outer$Helper", &helper).unwrap();
        assert!(!ty.was_promoted());
        assert!(ty.loaded_unit().is_private());
    }

    #[test]
    fn test_scope() {
        let registry = TypeRegistry::new(RegistryConfig::default());
        registry.register("basic.A", &simple("basic.A")).unwrap();
        registry.register("other.B", &simple("other.B")).unwrap();

        let scope = registry.resolve("basic.*").unwrap();
        assert_eq!(scope.types().len(), 1);
        assert!(scope.get("other.B").is_none());
        assert!(matches!(
            scope.register("other.C", &simple("other.C")),
            Err(RegistryError::OutOfScope { .. })
        ));

        let touched = scope
            .reload_all(
                "v2",
                vec![("basic.A", simple("basic.A")), ("basic.C", simple("basic.C"))],
            )
            .unwrap();
        assert_eq!(touched.len(), 2);
        assert_eq!(registry.get("basic.A").unwrap().version_count(), 2);
        assert_eq!(registry.get("basic.C").unwrap().version_count(), 1);

        assert!(matches!(
            registry.resolve("basic.*.A"),
            Err(RegistryError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_refresh_follows_host_reloads() {
        use crate::capture::{HostShape, SiteId};
        use hotswap_unit::{field_flags, TypeDesc};

        let host = |captures: usize| {
            let mut builder = UnitBuilder::new("basic.A$Lambda0")
                .access(access::PRIVATE | access::SYNTHETIC | access::CLOSURE_HOST);
            for i in 0..captures {
                builder = builder.field(format!("c{}", i), "I", field_flags::CAPTURED);
            }
            builder.encode().unwrap()
        };
        let registry = TypeRegistry::new(RegistryConfig::default());
        let ty = registry.register("basic.A$Lambda0", &host(1)).unwrap();
        let stale = SiteBinding {
            id: SiteId::new(7, "run()I", 0),
            host: "basic.A$Lambda0".to_string(),
            host_id: ty.id(),
            host_version: 0,
            passed: 1,
            shape: HostShape {
                captured: vec![TypeDesc::I32],
                captures_this: false,
            },
        };

        let mut bindings = vec![stale.clone()];
        registry.refresh_bindings(7, "basic.A", &mut bindings).unwrap();
        assert_eq!(bindings[0], stale);

        // a host reload that keeps the shape moves the binding forward
        ty.reload("v2", &host(1)).unwrap();
        let mut bindings = vec![stale.clone()];
        registry.refresh_bindings(7, "basic.A", &mut bindings).unwrap();
        assert_eq!(bindings[0].host_version, 1);

        ty.reload("v3", &host(2)).unwrap();
        let mut bindings = vec![stale.clone()];
        assert!(matches!(
            registry.refresh_bindings(7, "basic.A", &mut bindings),
            Err(RejectReason::MalformedUnit(_))
        ));

        ty.reload("v4", &host(1)).unwrap();
        let mut bindings = vec![stale];
        registry.refresh_bindings(7, "basic.A", &mut bindings).unwrap();
        assert_eq!(bindings[0].host_version, 3);
    }

    #[test]
    fn test_global_is_shared() {
        assert!(Arc::ptr_eq(&TypeRegistry::global(), &TypeRegistry::global()));
    }
}
