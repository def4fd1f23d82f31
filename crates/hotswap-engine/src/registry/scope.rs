//! Registry scopes
//!
//! A scope groups the types matched by one pattern, typically a type and
//! its synthetic nested types, so they can be registered and reloaded
//! together in dependency order.

use super::{NamePattern, TypeRegistry};
use crate::error::RegistryError;
use crate::reloadable::ReloadableType;
use std::sync::Arc;
use tracing::debug;

/// Handle onto the types matching a pattern
#[derive(Debug, Clone)]
pub struct RegistryScope {
    registry: Arc<TypeRegistry>,
    pattern: NamePattern,
}

impl RegistryScope {
    pub(super) fn new(registry: Arc<TypeRegistry>, pattern: NamePattern) -> Self {
        Self { registry, pattern }
    }

    /// Pattern the scope was resolved from
    pub fn pattern(&self) -> &NamePattern {
        &self.pattern
    }

    /// Whether a name lies inside the scope
    pub fn contains(&self, name: &str) -> bool {
        self.pattern.matches(name)
    }

    /// Registered types inside the scope, in registration order
    pub fn types(&self) -> Vec<Arc<ReloadableType>> {
        self.registry
            .types()
            .into_iter()
            .filter(|ty| self.pattern.matches(ty.name()))
            .collect()
    }

    /// Look up a registered type inside the scope
    pub fn get(&self, name: &str) -> Option<Arc<ReloadableType>> {
        if !self.contains(name) {
            return None;
        }
        self.registry.get(name)
    }

    fn ensure_contains(&self, name: &str) -> Result<(), RegistryError> {
        if self.contains(name) {
            Ok(())
        } else {
            Err(RegistryError::OutOfScope {
                pattern: self.pattern.to_string(),
                name: name.to_string(),
            })
        }
    }

    /// Register a type inside the scope
    pub fn register(&self, name: &str, bytes: &[u8]) -> Result<Arc<ReloadableType>, RegistryError> {
        self.ensure_contains(name)?;
        self.registry.register(name, bytes)
    }

    /// Apply an ordered batch of units under one label
    ///
    /// Registered names are reloaded; unregistered ones (a renamed closure
    /// host, a new helper) are registered. Dependencies must come before
    /// the types that reference them. Processing stops at the first
    /// failure; units applied before it stay applied.
    pub fn reload_all<N, B>(
        &self,
        label: &str,
        units: impl IntoIterator<Item = (N, B)>,
    ) -> Result<Vec<Arc<ReloadableType>>, RegistryError>
    where
        N: AsRef<str>,
        B: AsRef<[u8]>,
    {
        let mut touched = Vec::new();
        for (name, bytes) in units {
            let name = name.as_ref();
            self.ensure_contains(name)?;
            let ty = match self.registry.get(name) {
                Some(ty) => {
                    ty.reload(label, bytes.as_ref())?;
                    ty
                }
                None => {
                    debug!(scope = %self.pattern, type_name = name, "registering new type during reload");
                    self.registry.register(name, bytes.as_ref())?
                }
            };
            touched.push(ty);
        }
        Ok(touched)
    }
}
