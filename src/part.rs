//! Graph parts (C2, §3): [`Slot`], [`Tube`], [`Placeholder`]. Each holds one
//! cached value and at most one peer link. Links are stored as full names and
//! resolved through the owning [`crate::waterwork::Waterwork`]'s maps rather than
//! as direct references (§9, "peer back-links vs ownership").

use std::hash::{Hash, Hasher};

use crate::value::{Descriptor, Value};

/// An input endpoint of a tank (§3).
#[derive(Debug, Clone)]
pub struct Slot {
    pub name: String,
    pub tank: String,
    pub key: String,
    /// Full name of the tube this slot is connected to, if any. `None` means
    /// the slot is free ("funnel").
    pub tube: Option<String>,
    pub descriptor: Option<Descriptor>,
    pub val: Option<Value>,
}

impl Slot {
    pub fn new(name: String, tank: String, key: String, descriptor: Option<Descriptor>) -> Self {
        Slot {
            name,
            tank,
            key,
            tube: None,
            descriptor,
            val: None,
        }
    }

    pub fn is_funnel(&self) -> bool {
        self.tube.is_none()
    }

    pub fn tuple_key(&self) -> (String, String) {
        (self.tank.clone(), self.key.clone())
    }
}

// A slot's identity within a waterwork is its `(tank, key)` pair, i.e. its full
// name (`slot.py`: "Determine whether two slots are the same within one
// waterwork" hashes/compares on `(tank, key)`, not `val`).
impl PartialEq for Slot {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}
impl Eq for Slot {}
impl Hash for Slot {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

/// An output endpoint of a tank (§3).
#[derive(Debug, Clone)]
pub struct Tube {
    pub name: String,
    pub tank: String,
    pub key: String,
    /// Full name of the slot this tube feeds, if any. `None` means the tube is
    /// free ("tap"). At most one slot: multi-fanout is canonicalised away by
    /// inserting a `Clone` tank (§3, §9 "multi-fanout").
    pub slot: Option<String>,
    pub descriptor: Option<Descriptor>,
    pub val: Option<Value>,
}

impl Tube {
    pub fn new(name: String, tank: String, key: String, descriptor: Option<Descriptor>) -> Self {
        Tube {
            name,
            tank,
            key,
            slot: None,
            descriptor,
            val: None,
        }
    }

    pub fn is_tap(&self) -> bool {
        self.slot.is_none()
    }

    pub fn tuple_key(&self) -> (String, String) {
        (self.tank.clone(), self.key.clone())
    }
}

impl PartialEq for Tube {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}
impl Eq for Tube {}
impl Hash for Tube {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

/// A free, named source of a value, used by [`crate::transforms::Transform`]s to
/// bind fit-time constants or runtime inputs by name (§3). Behaves as a tube for
/// linking purposes: it may feed at most one slot.
#[derive(Debug, Clone)]
pub struct Placeholder {
    pub name: String,
    pub slot: Option<String>,
    pub descriptor: Option<Descriptor>,
    pub val: Option<Value>,
}

impl Placeholder {
    pub fn new(name: String, descriptor: Option<Descriptor>, val: Option<Value>) -> Self {
        Placeholder {
            name,
            slot: None,
            descriptor,
            val,
        }
    }
}
