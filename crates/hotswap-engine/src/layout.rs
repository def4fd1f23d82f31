//! Baseline instance layout

use crate::value::Value;
use hotswap_unit::{TypeDesc, TypeUnit};
use rustc_hash::FxHashMap;

/// Ordered instance slots of a type's initial version
///
/// Fixed at registration. Closure hosts have an empty layout: their
/// captured and enclosing fields live in the closure itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Layout {
    fields: Vec<(String, TypeDesc)>,
    index: FxHashMap<String, usize>,
}

impl Layout {
    /// Layout with no slots
    pub fn empty() -> Self {
        Self::default()
    }

    /// Derive the layout from an initial version
    pub fn from_unit(unit: &TypeUnit) -> Self {
        if unit.is_closure_host() {
            return Self::empty();
        }
        let mut layout = Self::empty();
        for field in unit
            .instance_fields()
            .filter(|f| !f.is_captured() && !f.is_enclosing())
        {
            layout.index.insert(field.name.clone(), layout.fields.len());
            layout
                .fields
                .push((field.name.clone(), field.descriptor.clone()));
        }
        layout
    }

    /// Slot index of a field
    pub fn slot_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Declared type of a slot
    pub fn slot_type(&self, slot: usize) -> Option<&TypeDesc> {
        self.fields.get(slot).map(|(_, ty)| ty)
    }

    /// Declared type of a field in the layout
    pub fn field_type(&self, name: &str) -> Option<&TypeDesc> {
        self.slot_of(name).and_then(|slot| self.slot_type(slot))
    }

    /// Field names and types in slot order
    pub fn fields(&self) -> &[(String, TypeDesc)] {
        &self.fields
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the layout has no slots
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Default values for a fresh instance
    pub fn defaults(&self) -> Vec<Value> {
        self.fields
            .iter()
            .map(|(_, ty)| Value::default_for(ty))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotswap_unit::{access, field_flags, UnitBuilder};

    #[test]
    fn test_layout_skips_statics() {
        let unit = UnitBuilder::new("basic.Point")
            .field("x", "I", 0)
            .field("ORIGIN", "Lbasic.Point;", field_flags::STATIC)
            .field("label", "S", 0)
            .build()
            .unwrap();
        let layout = Layout::from_unit(&unit);

        assert_eq!(layout.len(), 2);
        assert_eq!(layout.slot_of("x"), Some(0));
        assert_eq!(layout.slot_of("label"), Some(1));
        assert_eq!(layout.slot_of("ORIGIN"), None);
        assert_eq!(layout.defaults(), vec![Value::I32(0), Value::Null]);
    }

    #[test]
    fn test_closure_host_layout_is_empty() {
        let unit = UnitBuilder::new("basic.A$Lambda0")
            .access(access::SYNTHETIC | access::CLOSURE_HOST)
            .field("cap$0", "I", field_flags::CAPTURED)
            .build()
            .unwrap();
        assert!(Layout::from_unit(&unit).is_empty());
    }
}
