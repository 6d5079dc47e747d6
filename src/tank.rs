//! Tank (C3, §4.2): the abstract node contract every catalog kind (`crate::tanks`)
//! implements, plus the [`Tank`] struct that wires a [`TankOps`] instance into a
//! [`crate::waterwork::Waterwork`].

use std::collections::BTreeMap;
use std::fmt;

use crate::error::WwResult;
use crate::value::Value;

/// A mapping from a tank's slot/tube keys to the value present on each, passed
/// to and returned from [`TankOps::pour`] / [`TankOps::pump`].
pub type ValueMap = BTreeMap<String, Value>;

/// The contract every concrete tank kind implements (§4.2). `slot_keys` and
/// `tube_keys` are fixed at kind-definition time; `pour` and `pump` must be
/// total, pure functions of their inputs, and mutual inverses.
///
/// Dependency reporting (`pour_dependencies`/`pump_dependencies` in §4.2) is not
/// part of this trait: a tank never holds references to its neighbours (§9,
/// "peer back-links vs ownership"), so the owning
/// [`crate::waterwork::Waterwork`] answers those questions by walking its own
/// slot/tube maps (see `Waterwork::pour_dependencies`).
pub trait TankOps: fmt::Debug {
    /// A short, stable identifier for the kind, e.g. `"Add"`, `"OneHot"`. Used to
    /// default-name tank instances (`<ClassName>_<n>`, §4.1).
    fn kind(&self) -> &'static str;

    /// The tank's declared slot keys, fixed at kind-definition time.
    fn slot_keys(&self) -> &'static [&'static str];

    /// The tank's declared tube keys, fixed at kind-definition time.
    fn tube_keys(&self) -> &'static [&'static str];

    /// Forward evaluation: one value per slot key in, one value per tube key out.
    fn pour(&self, slot_values: &ValueMap) -> WwResult<ValueMap>;

    /// Backward evaluation: the inverse of `pour`. Tube values include whatever
    /// auxiliary tubes `pour` populated.
    fn pump(&self, tube_values: &ValueMap) -> WwResult<ValueMap>;

    /// Clones the boxed trait object. Needed by `Waterwork::combine`, which
    /// reconstructs fresh tank instances rather than moving the originals.
    /// Implemented per concrete kind as `Box::new(self.clone())`.
    fn clone_box(&self) -> Box<dyn TankOps>;
}

/// A node in the graph: a name, its slot/tube full-name lookups, and the
/// [`TankOps`] implementation driving its `pour`/`pump`.
///
/// The actual [`crate::part::Slot`]/[`crate::part::Tube`] instances live in the
/// owning [`crate::waterwork::Waterwork`]'s `slots`/`tubes` maps, keyed by full
/// name; `Tank` only remembers which full name corresponds to which of its own
/// keys.
pub struct Tank {
    pub name: String,
    pub ops: Box<dyn TankOps>,
    /// slot key -> full slot name
    pub slot_names: BTreeMap<String, String>,
    /// tube key -> full tube name
    pub tube_names: BTreeMap<String, String>,
}

impl fmt::Debug for Tank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tank")
            .field("name", &self.name)
            .field("kind", &self.ops.kind())
            .field("slot_names", &self.slot_names)
            .field("tube_names", &self.tube_names)
            .finish()
    }
}

impl Tank {
    pub fn kind(&self) -> &'static str {
        self.ops.kind()
    }

    pub fn slot_full_name(&self, key: &str) -> Option<&str> {
        self.slot_names.get(key).map(|s| s.as_str())
    }

    pub fn tube_full_name(&self, key: &str) -> Option<&str> {
        self.tube_names.get(key).map(|s| s.as_str())
    }
}
