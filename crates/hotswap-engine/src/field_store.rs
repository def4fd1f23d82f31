//! Field Extension Store
//!
//! Instances are always allocated with their type's baseline layout. A
//! field introduced by a later version has no slot in that layout, so its
//! value lives here, keyed by object identity and field name.
//!
//! Slots are installed on first touch with per-key compare-and-install:
//! two threads racing to touch the same field of the same object observe
//! one slot. A slot survives every later reload, including one that drops
//! the field, and is only released when its object is dropped.

use crate::value::Value;
use dashmap::DashMap;
use hotswap_unit::TypeDesc;
use parking_lot::RwLock;
use std::sync::Arc;

/// Identity of an instance or closure, unique per process
pub type ObjectId = u64;

/// One extension field of one object
#[derive(Debug)]
pub struct ExtensionSlot {
    descriptor: TypeDesc,
    value: RwLock<Value>,
}

impl ExtensionSlot {
    fn new(descriptor: &TypeDesc) -> Self {
        Self {
            descriptor: descriptor.clone(),
            value: RwLock::new(Value::default_for(descriptor)),
        }
    }

    /// Declared type of the field when the slot was installed
    pub fn descriptor(&self) -> &TypeDesc {
        &self.descriptor
    }

    /// Current value
    pub fn get(&self) -> Value {
        self.value.read().clone()
    }

    /// Replace the value
    pub fn set(&self, value: Value) {
        *self.value.write() = value;
    }
}

type ObjectSlots = DashMap<String, Arc<ExtensionSlot>>;

/// Per-object side storage for fields outside the baseline layout
#[derive(Debug, Default)]
pub struct FieldExtensionStore {
    objects: DashMap<ObjectId, Arc<ObjectSlots>>,
}

impl FieldExtensionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn slots_of(&self, object: ObjectId) -> Arc<ObjectSlots> {
        if let Some(slots) = self.objects.get(&object) {
            return Arc::clone(slots.value());
        }
        Arc::clone(self.objects.entry(object).or_default().value())
    }

    /// Slot for `field` of `object`, installing it on first touch
    pub fn slot(&self, object: ObjectId, field: &str, descriptor: &TypeDesc) -> Arc<ExtensionSlot> {
        let slots = self.slots_of(object);
        if let Some(slot) = slots.get(field) {
            return Arc::clone(slot.value());
        }
        let slot = slots
            .entry(field.to_string())
            .or_insert_with(|| Arc::new(ExtensionSlot::new(descriptor)));
        Arc::clone(slot.value())
    }

    /// Read a field, installing a default-valued slot on first touch
    pub fn read(&self, object: ObjectId, field: &str, descriptor: &TypeDesc) -> Value {
        self.slot(object, field, descriptor).get()
    }

    /// Write a field, installing its slot on first touch
    pub fn write(&self, object: ObjectId, field: &str, descriptor: &TypeDesc, value: Value) {
        self.slot(object, field, descriptor).set(value);
    }

    /// Read a field without installing anything
    pub fn get(&self, object: ObjectId, field: &str) -> Option<Value> {
        let slots = self.objects.get(&object)?;
        let slot = slots.get(field)?;
        Some(slot.get())
    }

    /// Number of extension slots held for an object
    pub fn slot_count(&self, object: ObjectId) -> usize {
        self.objects.get(&object).map(|s| s.len()).unwrap_or(0)
    }

    /// Number of objects holding at least one slot
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Drop every slot of an object
    pub fn release(&self, object: ObjectId) {
        self.objects.remove(&object);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_first_touch_reads_default() {
        let store = FieldExtensionStore::new();
        assert_eq!(store.get(1, "extra"), None);
        assert_eq!(store.read(1, "extra", &TypeDesc::I32), Value::I32(0));
        assert_eq!(store.slot_count(1), 1);
        assert_eq!(store.read(1, "name", &TypeDesc::Str), Value::Null);
    }

    #[test]
    fn test_write_then_read() {
        let store = FieldExtensionStore::new();
        store.write(7, "extra", &TypeDesc::I32, Value::I32(42));
        assert_eq!(store.get(7, "extra"), Some(Value::I32(42)));
        assert_eq!(store.get(8, "extra"), None);
    }

    #[test]
    fn test_slot_keeps_first_descriptor() {
        let store = FieldExtensionStore::new();
        let first = store.slot(3, "extra", &TypeDesc::I64);
        let second = store.slot(3, "extra", &TypeDesc::I32);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.descriptor(), &TypeDesc::I64);
    }

    #[test]
    fn test_release() {
        let store = FieldExtensionStore::new();
        store.write(5, "a", &TypeDesc::I32, Value::I32(1));
        store.write(5, "b", &TypeDesc::I32, Value::I32(2));
        assert_eq!(store.object_count(), 1);
        store.release(5);
        assert_eq!(store.object_count(), 0);
        assert_eq!(store.get(5, "a"), None);
    }

    #[test]
    fn test_racing_first_touch_installs_one_slot() {
        let store = Arc::new(FieldExtensionStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.slot(11, "extra", &TypeDesc::I32))
            })
            .collect();
        let slots: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for slot in &slots[1..] {
            assert!(Arc::ptr_eq(&slots[0], slot));
        }
        assert_eq!(store.slot_count(11), 1);
    }
}
