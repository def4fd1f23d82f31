//! Structural compatibility of a candidate version

use crate::error::RejectReason;
use hotswap_unit::{TypeDesc, TypeUnit};
use rustc_hash::FxHashMap;

/// What earlier versions of a type fixed for all later ones
#[derive(Debug, Clone, Default)]
pub struct History {
    /// Name of the type
    pub name: String,
    /// Supertype of the initial version
    pub super_name: Option<String>,
    /// Whether the initial version hosts a closure
    pub closure_host: bool,
    /// Every field ever declared, with the type it was declared with
    pub field_types: FxHashMap<String, TypeDesc>,
    /// Every method ever declared, with whether it was static
    pub method_kinds: FxHashMap<String, bool>,
}

impl History {
    /// History seeded from the initial version
    pub fn from_initial(unit: &TypeUnit) -> Self {
        let mut history = Self {
            name: unit.name.clone(),
            super_name: unit.super_name.clone(),
            closure_host: unit.is_closure_host(),
            ..Self::default()
        };
        history.record(unit);
        history
    }

    /// Fold an accepted version into the history
    pub fn record(&mut self, unit: &TypeUnit) {
        for field in &unit.fields {
            self.field_types
                .entry(field.name.clone())
                .or_insert_with(|| field.descriptor.clone());
        }
        for method in &unit.methods {
            self.method_kinds
                .entry(method.key())
                .or_insert_with(|| method.is_static());
        }
    }

    /// Check a candidate version against everything recorded so far
    ///
    /// Methods may be added, removed or have their bodies changed freely.
    pub fn check(&self, candidate: &TypeUnit) -> Result<(), RejectReason> {
        if candidate.name != self.name {
            return Err(RejectReason::NameMismatch {
                expected: self.name.clone(),
                found: candidate.name.clone(),
            });
        }

        if candidate.super_name != self.super_name {
            return Err(RejectReason::IncompatibleSupertype {
                expected: self.super_name.clone(),
                found: candidate.super_name.clone(),
            });
        }

        if candidate.is_closure_host() != self.closure_host {
            return Err(RejectReason::MalformedUnit(format!(
                "{} changed whether it hosts a closure",
                self.name
            )));
        }

        for field in &candidate.fields {
            if let Some(previous) = self.field_types.get(&field.name) {
                if *previous != field.descriptor {
                    return Err(RejectReason::IncompatibleFieldRetype {
                        field: field.name.clone(),
                        from: previous.clone(),
                        to: field.descriptor.clone(),
                    });
                }
            }
        }

        for method in &candidate.methods {
            let key = method.key();
            if let Some(&was_static) = self.method_kinds.get(&key) {
                if was_static != method.is_static() {
                    return Err(RejectReason::IncompatibleMethodKind(key));
                }
            }
        }

        Ok(())
    }
}
