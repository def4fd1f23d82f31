//! Capture Site Table
//!
//! A closure is identified by where it is created, not by the generated
//! name of its host type: the declaring type, the declaring method's
//! signature key, and the ordinal of the creation expression within that
//! method. Each site records its current host and a list of typed slots.
//!
//! ```text
//!  host v1 captures (I, J)      positions [0, 1]   slots [I*, J*]
//!  host v2 captures (I, S, J)   positions [0, 2, 3] slots [I*, J, S*, J*]
//! ```
//!
//! Host positions are remapped by position and type. A position whose
//! type changed gets a fresh slot; the slot it used to map to is retired
//! and never handed out again, so closures created under an older version
//! keep reading what they captured. Slots added after a closure was
//! created read as the slot type's default value.
//!
//! Site snapshots are immutable and published through an `ArcSwap`, so a
//! reader sees either the old binding or the new one. Each snapshot keeps
//! the position map of every host version it was bound to: a host body
//! reads captured values through the map of its own version, so a site can
//! be rebound before the host's new table is published.
//!
//! Bindings are applied under the table's publish lock. Every reload that
//! binds or rebinds sites holds it from the final shape check until its
//! table is published.

use crate::error::RejectReason;
use crate::reloadable::TypeId;
use arc_swap::ArcSwap;
use dashmap::DashMap;
use hotswap_unit::TypeDesc;
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Stable identity of a closure creation expression
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SiteId {
    /// Declaring type
    pub declaring: TypeId,
    /// Signature key of the declaring method
    pub method: String,
    /// Index of the creation expression within the method, in code order
    pub ordinal: u32,
}

impl SiteId {
    /// Create a site identity
    pub fn new(declaring: TypeId, method: impl Into<String>, ordinal: u32) -> Self {
        Self {
            declaring,
            method: method.into(),
            ordinal,
        }
    }

    /// Key stored in rewritten code (`run()I#0`)
    pub fn key(&self) -> String {
        format!("{}#{}", self.method, self.ordinal)
    }

    /// Rebuild a site identity from a rewritten-code key
    pub fn from_key(declaring: TypeId, key: &str) -> Option<Self> {
        let (method, ordinal) = key.rsplit_once('#')?;
        Some(Self::new(declaring, method, ordinal.parse().ok()?))
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}#{}", self.declaring, self.method, self.ordinal)
    }
}

/// One captured-variable slot
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSlot {
    /// Declared type of the variable
    pub descriptor: TypeDesc,
    /// Whether the current host maps a position to this slot
    pub live: bool,
}

/// Capture shape of one closure host version
#[derive(Debug, Clone, PartialEq)]
pub struct HostShape {
    /// Types of the captured-variable fields, in declaration order
    pub captured: Vec<TypeDesc>,
    /// Whether the host holds the enclosing instance
    pub captures_this: bool,
}

/// Position map of one host version
#[derive(Debug, Clone, PartialEq)]
pub struct HostMapping {
    /// Host type id
    pub host_id: TypeId,
    /// Host version the map was built for
    pub host_version: usize,
    /// Host captured-field position -> slot
    pub positions: Vec<usize>,
}

/// Immutable snapshot of a capture site
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSite {
    /// Site identity
    pub id: SiteId,
    /// Current host type name
    pub host: String,
    /// Current host type id
    pub host_id: TypeId,
    /// Whether closures from this site carry the enclosing instance
    pub captures_this: bool,
    /// Every slot ever allocated, live or retired
    pub slots: Vec<CaptureSlot>,
    /// Host captured-field position -> slot, for the current host version
    pub positions: Vec<usize>,
    /// Position maps of every host version the site was bound to, oldest first
    pub mappings: Vec<HostMapping>,
    /// Number of times the site has been rebound
    pub generation: u32,
}

impl CaptureSite {
    fn new(binding: &SiteBinding) -> Self {
        let positions: Vec<usize> = (0..binding.shape.captured.len()).collect();
        Self {
            id: binding.id.clone(),
            host: binding.host.clone(),
            host_id: binding.host_id,
            captures_this: binding.shape.captures_this,
            slots: binding
                .shape
                .captured
                .iter()
                .map(|ty| CaptureSlot {
                    descriptor: ty.clone(),
                    live: true,
                })
                .collect(),
            mappings: vec![HostMapping {
                host_id: binding.host_id,
                host_version: binding.host_version,
                positions: positions.clone(),
            }],
            positions,
            generation: 0,
        }
    }

    /// Slot a host position maps to under the current host version
    pub fn slot_for(&self, position: usize) -> Option<usize> {
        self.positions.get(position).copied()
    }

    /// Slot a host position maps to for code of one host version
    ///
    /// Uses the newest map recorded for `host_id` at or before
    /// `host_version`, and the current map when there is none.
    pub fn slot_at(&self, host_id: TypeId, host_version: usize, position: usize) -> Option<usize> {
        self.mappings
            .iter()
            .rev()
            .find(|m| m.host_id == host_id && m.host_version <= host_version)
            .map_or(&self.positions, |m| &m.positions)
            .get(position)
            .copied()
    }

    /// Declared type of a slot
    pub fn slot_type(&self, slot: usize) -> Option<&TypeDesc> {
        self.slots.get(slot).map(|s| &s.descriptor)
    }

    /// Number of live slots
    pub fn live_slots(&self) -> usize {
        self.slots.iter().filter(|s| s.live).count()
    }

    fn remapped(&self, binding: &SiteBinding) -> Result<Self, String> {
        let shape = &binding.shape;
        if shape.captures_this != self.captures_this {
            return Err(format!(
                "enclosing-instance capture changed from {} to {}",
                self.captures_this, shape.captures_this
            ));
        }

        let mut slots: Vec<CaptureSlot> = self
            .slots
            .iter()
            .map(|s| CaptureSlot {
                descriptor: s.descriptor.clone(),
                live: false,
            })
            .collect();
        let mut positions = Vec::with_capacity(shape.captured.len());

        for (position, ty) in shape.captured.iter().enumerate() {
            let reused = self
                .positions
                .get(position)
                .copied()
                .filter(|&slot| self.slots[slot].descriptor == *ty);
            let slot = match reused {
                Some(slot) => slot,
                None => {
                    slots.push(CaptureSlot {
                        descriptor: ty.clone(),
                        live: false,
                    });
                    slots.len() - 1
                }
            };
            slots[slot].live = true;
            positions.push(slot);
        }

        let mut mappings = self.mappings.clone();
        mappings.push(HostMapping {
            host_id: binding.host_id,
            host_version: binding.host_version,
            positions: positions.clone(),
        });

        Ok(Self {
            id: self.id.clone(),
            host: binding.host.clone(),
            host_id: binding.host_id,
            captures_this: self.captures_this,
            slots,
            positions,
            mappings,
            generation: self.generation + 1,
        })
    }

    fn same_binding(&self, other: &Self) -> bool {
        self.host_id == other.host_id
            && self.host == other.host
            && self.slots == other.slots
            && self.positions == other.positions
    }
}

/// A site binding produced by rewriting one closure creation expression
#[derive(Debug, Clone, PartialEq)]
pub struct SiteBinding {
    /// Site identity
    pub id: SiteId,
    /// Host named by the creation expression
    pub host: String,
    /// Host type id
    pub host_id: TypeId,
    /// Host version the shape was read from
    pub host_version: usize,
    /// Values the creation expression passes
    pub passed: usize,
    /// Host's capture shape
    pub shape: HostShape,
}

/// Process-wide table of capture sites
#[derive(Debug, Default)]
pub struct CaptureSiteTable {
    sites: DashMap<SiteId, Arc<ArcSwap<CaptureSite>>>,
    publish: Mutex<()>,
}

impl CaptureSiteTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize binding and publishing across types
    ///
    /// Held from the last shape check until the new table is published, by
    /// registration and by every reload that changes sites.
    pub(crate) fn lock_publish(&self) -> MutexGuard<'_, ()> {
        self.publish.lock()
    }

    /// Current snapshot of a site
    pub fn get(&self, id: &SiteId) -> Option<Arc<CaptureSite>> {
        self.sites.get(id).map(|cell| cell.load_full())
    }

    /// Number of sites
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    /// Whether the table has no sites
    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Sites currently bound to a host
    pub fn sites_bound_to(&self, host: &str) -> Vec<SiteId> {
        self.sites
            .iter()
            .filter(|entry| entry.value().load().host == host)
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Check that a binding could be applied, without applying it
    pub fn check(&self, binding: &SiteBinding) -> Result<(), RejectReason> {
        let Some(existing) = self.get(&binding.id) else {
            return Ok(());
        };
        existing
            .remapped(binding)
            .map(|_| ())
            .map_err(|detail| RejectReason::ClosureShapeMismatch {
                site: binding.id.to_string(),
                detail,
            })
    }

    /// Check that every site bound to `host` accepts its new shape
    pub fn check_host(&self, host: &str, host_id: TypeId, shape: &HostShape) -> Result<(), RejectReason> {
        for id in self.sites_bound_to(host) {
            self.check(&host_binding(id, host, host_id, 0, shape))?;
        }
        Ok(())
    }

    /// Create or rebind a site
    pub fn bind(&self, binding: &SiteBinding) -> Arc<CaptureSite> {
        let cell = {
            let entry = self.sites.entry(binding.id.clone()).or_insert_with(|| {
                debug!(site = %binding.id, host = %binding.host, "capture site created");
                Arc::new(ArcSwap::from_pointee(CaptureSite::new(binding)))
            });
            Arc::clone(entry.value())
        };

        loop {
            let current = cell.load_full();
            let next = match current.remapped(binding) {
                Ok(next) if current.same_binding(&next) => return current,
                Ok(next) => Arc::new(next),
                Err(detail) => {
                    warn!(site = %binding.id, %detail, "capture site kept its binding");
                    return current;
                }
            };
            let previous = cell.compare_and_swap(&current, Arc::clone(&next));
            if Arc::ptr_eq(&*previous, &current) {
                debug!(
                    site = %binding.id,
                    from = %current.host,
                    to = %next.host,
                    slots = next.slots.len(),
                    "capture site rebound"
                );
                return next;
            }
        }
    }

    /// Rebind every site bound to `host` to the shape of `host_version`; returns how many
    pub fn rebind_host(&self, host: &str, host_id: TypeId, host_version: usize, shape: &HostShape) -> usize {
        let ids = self.sites_bound_to(host);
        for id in &ids {
            self.bind(&host_binding(id.clone(), host, host_id, host_version, shape));
        }
        ids.len()
    }
}

fn host_binding(id: SiteId, host: &str, host_id: TypeId, host_version: usize, shape: &HostShape) -> SiteBinding {
    SiteBinding {
        id,
        host: host.to_string(),
        host_id,
        host_version,
        passed: shape.captured.len(),
        shape: shape.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(host: &str, captured: Vec<TypeDesc>, captures_this: bool) -> SiteBinding {
        SiteBinding {
            id: SiteId::new(0, "run()I", 0),
            host: host.to_string(),
            host_id: 1,
            host_version: 0,
            passed: captured.len(),
            shape: HostShape {
                captured,
                captures_this,
            },
        }
    }

    #[test]
    fn test_site_key_roundtrip() {
        let id = SiteId::new(4, "apply(I)I", 2);
        assert_eq!(id.key(), "apply(I)I#2");
        assert_eq!(SiteId::from_key(4, &id.key()), Some(id));
        assert_eq!(SiteId::from_key(4, "apply(I)I"), None);
    }

    #[test]
    fn test_pure_rename_keeps_slots() {
        let table = CaptureSiteTable::new();
        let first = table.bind(&binding("basic.A$Lambda0", vec![TypeDesc::I32], false));
        let renamed = table.bind(&binding("basic.A$Lambda1", vec![TypeDesc::I32], false));

        assert_eq!(renamed.host, "basic.A$Lambda1");
        assert_eq!(renamed.slots, first.slots);
        assert_eq!(renamed.positions, vec![0]);
        assert_eq!(renamed.generation, 1);
        assert_eq!(table.sites_bound_to("basic.A$Lambda0"), Vec::<SiteId>::new());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_identical_rebind_is_a_no_op() {
        let table = CaptureSiteTable::new();
        let first = table.bind(&binding("basic.A$Lambda0", vec![TypeDesc::I32], false));
        let again = table.bind(&binding("basic.A$Lambda0", vec![TypeDesc::I32], false));
        assert!(Arc::ptr_eq(&first, &again));
    }

    #[test]
    fn test_appended_and_retyped_positions() {
        let table = CaptureSiteTable::new();
        table.bind(&binding("h", vec![TypeDesc::I32, TypeDesc::I64], false));

        let site = table.bind(&binding(
            "h",
            vec![TypeDesc::I32, TypeDesc::Str, TypeDesc::I64],
            false,
        ));
        // position 1 changed type: fresh slot, old slot 1 retired
        assert_eq!(site.positions, vec![0, 2, 3]);
        assert_eq!(site.slots.len(), 4);
        assert!(!site.slots[1].live);
        assert_eq!(site.live_slots(), 3);

        // shrinking retires slots without reusing them
        let site = table.bind(&binding("h", vec![TypeDesc::I32], false));
        assert_eq!(site.positions, vec![0]);
        assert_eq!(site.slots.len(), 4);
        assert_eq!(site.live_slots(), 1);

        // growing again allocates past every retired slot
        let site = table.bind(&binding("h", vec![TypeDesc::I32, TypeDesc::I64], false));
        assert_eq!(site.positions, vec![0, 4]);
    }

    #[test]
    fn test_enclosing_capture_change_rejected() {
        let table = CaptureSiteTable::new();
        table.bind(&binding("h", vec![TypeDesc::I32], true));

        let changed = binding("h", vec![TypeDesc::I32], false);
        assert!(matches!(
            table.check(&changed),
            Err(RejectReason::ClosureShapeMismatch { .. })
        ));
        assert!(table.get(&changed.id).unwrap().captures_this);
    }

    #[test]
    fn test_rebind_host() {
        let table = CaptureSiteTable::new();
        table.bind(&binding("h", vec![TypeDesc::I32], false));
        let mut other = binding("h", vec![TypeDesc::I32], false);
        other.id = SiteId::new(0, "run()I", 1);
        table.bind(&other);

        let shape = HostShape {
            captured: vec![TypeDesc::I32, TypeDesc::I32],
            captures_this: false,
        };
        assert_eq!(table.check_host("h", 1, &shape), Ok(()));
        assert_eq!(table.rebind_host("h", 1, 1, &shape), 2);
        assert_eq!(table.get(&other.id).unwrap().positions, vec![0, 1]);
    }

    #[test]
    fn test_older_host_versions_keep_their_positions() {
        let table = CaptureSiteTable::new();
        table.bind(&binding("h", vec![TypeDesc::I32, TypeDesc::I64], false));

        let shape = HostShape {
            captured: vec![TypeDesc::Str, TypeDesc::I64],
            captures_this: false,
        };
        table.rebind_host("h", 1, 3, &shape);
        let site = table.get(&SiteId::new(0, "run()I", 0)).unwrap();

        // version 3 onwards reads the retyped position from a fresh slot
        assert_eq!(site.slot_at(1, 3, 0), Some(2));
        assert_eq!(site.slot_at(1, 7, 0), Some(2));
        // bodies of versions 0..3 are still published until the swap
        assert_eq!(site.slot_at(1, 0, 0), Some(0));
        assert_eq!(site.slot_at(1, 2, 1), Some(1));
        // an unknown host falls back to the current map
        assert_eq!(site.slot_at(9, 0, 0), Some(2));
        assert_eq!(site.mappings.len(), 2);
    }
}
