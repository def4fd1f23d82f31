//! Instances and closures
//!
//! An [`Instance`] carries exactly its type's baseline layout for its whole
//! life; fields added by later versions live in the Field Extension Store
//! under the instance's [`ObjectId`]. A [`ClosureInstance`] keeps the values
//! captured when it was created, in capture-site slot order.

use crate::capture::SiteId;
use crate::field_store::{FieldExtensionStore, ObjectId};
use crate::reloadable::ReloadableType;
use crate::value::Value;
use hotswap_unit::TypeDesc;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

fn next_object_id() -> ObjectId {
    NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Identity plus the link to extension storage
///
/// Extension slots are released when the header is dropped, if any were
/// ever installed.
struct ObjectHeader {
    id: ObjectId,
    extended: AtomicBool,
    store: Weak<FieldExtensionStore>,
}

impl ObjectHeader {
    fn new(store: &Arc<FieldExtensionStore>) -> Self {
        Self {
            id: next_object_id(),
            extended: AtomicBool::new(false),
            store: Arc::downgrade(store),
        }
    }

    fn read_extension(&self, field: &str, descriptor: &TypeDesc) -> Value {
        match self.store.upgrade() {
            Some(store) => {
                self.extended.store(true, Ordering::Release);
                store.read(self.id, field, descriptor)
            }
            None => Value::default_for(descriptor),
        }
    }

    fn write_extension(&self, field: &str, descriptor: &TypeDesc, value: Value) {
        if let Some(store) = self.store.upgrade() {
            self.extended.store(true, Ordering::Release);
            store.write(self.id, field, descriptor, value);
        }
    }
}

macro_rules! extension_access {
    ($ty:ty) => {
        impl $ty {
            /// Object identity
            pub fn id(&self) -> ObjectId {
                self.header.id
            }

            /// Whether any extension slot was ever installed for this object
            pub fn is_extended(&self) -> bool {
                self.header.extended.load(Ordering::Acquire)
            }

            /// Read an extension field, installing its slot on first touch
            pub fn read_extension(&self, field: &str, descriptor: &TypeDesc) -> Value {
                self.header.read_extension(field, descriptor)
            }

            /// Write an extension field, installing its slot on first touch
            pub fn write_extension(&self, field: &str, descriptor: &TypeDesc, value: Value) {
                self.header.write_extension(field, descriptor, value)
            }
        }
    };
}

impl Drop for ObjectHeader {
    fn drop(&mut self) {
        if self.extended.load(Ordering::Acquire) {
            if let Some(store) = self.store.upgrade() {
                store.release(self.id);
            }
        }
    }
}

/// Instance of a reloadable type
pub struct Instance {
    header: ObjectHeader,
    ty: Arc<ReloadableType>,
    fields: RwLock<Vec<Value>>,
}

impl Instance {
    /// Allocate an instance with the type's baseline layout at default values
    pub(crate) fn new(ty: Arc<ReloadableType>, store: &Arc<FieldExtensionStore>) -> Self {
        let fields = ty.layout().defaults();
        Self {
            header: ObjectHeader::new(store),
            ty,
            fields: RwLock::new(fields),
        }
    }

    /// Type of this instance
    pub fn reloadable_type(&self) -> &Arc<ReloadableType> {
        &self.ty
    }

    /// Name of this instance's type
    pub fn type_name(&self) -> &str {
        self.ty.name()
    }

    /// Number of baseline slots
    pub fn slot_count(&self) -> usize {
        self.fields.read().len()
    }

    /// Read a baseline slot
    pub fn get_slot(&self, slot: usize) -> Option<Value> {
        self.fields.read().get(slot).cloned()
    }

    /// Write a baseline slot; returns `false` if the slot does not exist
    pub fn set_slot(&self, slot: usize, value: Value) -> bool {
        match self.fields.write().get_mut(slot) {
            Some(target) => {
                *target = value;
                true
            }
            None => false,
        }
    }

    /// Read a field by name: baseline slot if present, extension otherwise
    pub fn get_field(&self, name: &str) -> Option<Value> {
        let layout = self.ty.layout();
        if let Some(slot) = layout.slot_of(name) {
            return self.get_slot(slot);
        }
        let descriptor = self.ty.field_type(name)?;
        Some(self.read_extension(name, &descriptor))
    }

    /// Write a field by name; returns `false` if no version declares it
    pub fn set_field(&self, name: &str, value: Value) -> bool {
        if let Some(slot) = self.ty.layout().slot_of(name) {
            return self.set_slot(slot, value);
        }
        match self.ty.field_type(name) {
            Some(descriptor) => {
                self.write_extension(name, &descriptor, value);
                true
            }
            None => false,
        }
    }
}

extension_access!(Instance);

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.header.id)
            .field("type", &self.type_name())
            .field("fields", &*self.fields.read())
            .finish()
    }
}

/// Closure created at a capture site
pub struct ClosureInstance {
    header: ObjectHeader,
    site: SiteId,
    enclosing: Option<Value>,
    captured: Vec<Value>,
}

impl ClosureInstance {
    pub(crate) fn new(
        site: SiteId,
        enclosing: Option<Value>,
        captured: Vec<Value>,
        store: &Arc<FieldExtensionStore>,
    ) -> Self {
        Self {
            header: ObjectHeader::new(store),
            site,
            enclosing,
            captured,
        }
    }

    /// Capture site the closure was created at
    pub fn site(&self) -> &SiteId {
        &self.site
    }

    /// Enclosing instance, if the closure captured one
    pub fn enclosing(&self) -> Option<&Value> {
        self.enclosing.as_ref()
    }

    /// Captured value in a site slot; `None` for slots added after creation
    pub fn captured(&self, slot: usize) -> Option<&Value> {
        self.captured.get(slot)
    }

    /// Number of slots filled at creation
    pub fn captured_len(&self) -> usize {
        self.captured.len()
    }
}

extension_access!(ClosureInstance);

impl fmt::Debug for ClosureInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosureInstance")
            .field("id", &self.header.id)
            .field("site", &self.site)
            .field("captured", &self.captured)
            .finish()
    }
}
