//! Waterwork (C4, §4.3): the graph. Owns every tank/slot/tube/placeholder by
//! full name, drives the name-scope while being built, and schedules/executes
//! `pour` and `pump`.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, instrument};

use crate::error::{WaterworksError, WwResult};
use crate::part::{Placeholder, Slot, Tube};
use crate::scope::{NameScope, ScopeGuard};
use crate::tank::{Tank, TankOps, ValueMap};
use crate::value::Value;

/// How a caller addresses funnels/taps in a `pour`/`pump` result map (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMode {
    /// The part's full hierarchical name.
    Str,
    /// `(tank_name, key)`.
    Tuple,
    /// The part itself.
    Obj,
}

/// The key type of a `pour` result map: one entry per tap.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TapKey {
    Str(String),
    Tuple(String, String),
    Obj(Tube),
}

/// The key type of a `pump` result map: one entry per funnel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FunnelKey {
    Str(String),
    Tuple(String, String),
    Obj(Slot),
}

/// The graph (§3). Holds every part by full name; `tanks`/`slots`/`tubes`/
/// `placeholders` are the ground truth, `funnels()`/`taps()` are derived views.
#[derive(Debug, Default)]
pub struct Waterwork {
    pub name: String,
    pub tanks: BTreeMap<String, Tank>,
    pub slots: BTreeMap<String, Slot>,
    pub tubes: BTreeMap<String, Tube>,
    pub placeholders: BTreeMap<String, Placeholder>,
}

impl Waterwork {
    pub fn new(name: impl Into<String>) -> Self {
        Waterwork {
            name: name.into(),
            tanks: BTreeMap::new(),
            slots: BTreeMap::new(),
            tubes: BTreeMap::new(),
            placeholders: BTreeMap::new(),
        }
    }

    /// Builds a waterwork by activating its name-scope (§4.3.1), running `build`,
    /// and exiting the scope regardless of whether `build` errors. This is the
    /// idiomatic entry point: callers don't touch [`NameScope`] directly.
    pub fn build<F>(name: impl Into<String>, build: F) -> WwResult<Waterwork>
    where
        F: FnOnce(&mut Waterwork) -> WwResult<()>,
    {
        let mut ww = Waterwork::new(name);
        let _guard = ScopeGuard::enter(&ww.name)?;
        build(&mut ww)?;
        Ok(ww)
    }

    // ---- derived views (§3, §9 "supplemented features") --------------------

    /// Free slots, ordered the way `_sorted_funnel_names` in the original source
    /// orders them: funnels belonging to tanks with no other slot already paired
    /// (i.e. tanks that are "purely" entry points) sort first, ties broken by
    /// name.
    pub fn funnels(&self) -> Vec<&Slot> {
        let mut funnels: Vec<&Slot> = self.slots.values().filter(|s| s.is_funnel()).collect();
        funnels.sort_by_key(|s| (self.paired_slot_count(&s.tank), s.name.clone()));
        funnels
    }

    /// Free tubes, ordered analogously via `_sorted_tap_names`.
    pub fn taps(&self) -> Vec<&Tube> {
        let mut taps: Vec<&Tube> = self.tubes.values().filter(|t| t.is_tap()).collect();
        taps.sort_by_key(|t| (self.paired_tube_count(&t.tank), t.name.clone()));
        taps
    }

    fn paired_slot_count(&self, tank_name: &str) -> usize {
        self.slots
            .values()
            .filter(|s| s.tank == tank_name && !s.is_funnel())
            .count()
    }

    fn paired_tube_count(&self, tank_name: &str) -> usize {
        self.tubes
            .values()
            .filter(|t| t.tank == tank_name && !t.is_tap())
            .count()
    }

    /// Non-failing lookup of a placeholder by name (`maybe_get_placeholder`).
    pub fn resolve_placeholder(&self, name: &str) -> Option<&Placeholder> {
        self.placeholders.get(name)
    }

    /// Non-failing lookup of a slot by full name (`maybe_get_slot`).
    pub fn resolve_slot(&self, name: &str) -> Option<&Slot> {
        self.slots.get(name)
    }

    /// Non-failing lookup of a slot by `(tank_name, key)` (`maybe_get_slot`).
    pub fn resolve_slot_by_tuple(&self, tank: &str, key: &str) -> Option<&Slot> {
        self.tanks
            .get(tank)
            .and_then(|t| t.slot_full_name(key))
            .and_then(|full| self.slots.get(full))
    }

    /// Non-failing lookup of a tube by full name (`maybe_get_tube`).
    pub fn resolve_tube(&self, name: &str) -> Option<&Tube> {
        self.tubes.get(name)
    }

    pub fn resolve_tube_by_tuple(&self, tank: &str, key: &str) -> Option<&Tube> {
        self.tanks
            .get(tank)
            .and_then(|t| t.tube_full_name(key))
            .and_then(|full| self.tubes.get(full))
    }

    // ---- construction (used by crate::builder) ------------------------------

    /// Registers a new tank, creating its declared slots and tubes (unconnected).
    /// Returns the tank's full name. If `explicit_name` is `None`, a default of
    /// `<prefix>/<Kind>_<n>` is assigned (§4.1).
    pub fn instantiate_tank(
        &mut self,
        ops: Box<dyn TankOps>,
        explicit_name: Option<String>,
    ) -> WwResult<String> {
        let kind = ops.kind();
        let name = match explicit_name {
            Some(n) => self.qualify(&n),
            None => {
                let n = NameScope::next_suffix(kind);
                NameScope::default_name(&format!("{}_{}", kind, n))
            }
        };
        if self.tanks.contains_key(&name) {
            return Err(WaterworksError::NameCollision {
                waterwork: self.name.clone(),
                name,
            });
        }

        let mut slot_names = BTreeMap::new();
        for key in ops.slot_keys() {
            let slot_name = format!("{}/slots/{}", name, key);
            self.insert_slot(Slot::new(
                slot_name.clone(),
                name.clone(),
                (*key).to_string(),
                None,
            ))?;
            slot_names.insert((*key).to_string(), slot_name);
        }

        let mut tube_names = BTreeMap::new();
        for key in ops.tube_keys() {
            let tube_name = format!("{}/tubes/{}", name, key);
            self.insert_tube(Tube::new(
                tube_name.clone(),
                name.clone(),
                (*key).to_string(),
                None,
            ))?;
            tube_names.insert((*key).to_string(), tube_name);
        }

        self.tanks.insert(
            name.clone(),
            Tank {
                name: name.clone(),
                ops,
                slot_names,
                tube_names,
            },
        );
        debug!(tank = %name, kind, "instantiated tank");
        Ok(name)
    }

    /// Synthesises a fresh placeholder, optionally pre-populated with a value
    /// (§4.2's "raw payload" construction case). Returns its full name.
    pub fn new_placeholder(&mut self, val: Option<Value>) -> WwResult<String> {
        let n = NameScope::next_suffix("Placeholder");
        let name = NameScope::default_name(&format!("Placeholder_{}", n));
        let descriptor = val.as_ref().map(|v| v.descriptor());
        self.placeholders
            .insert(name.clone(), Placeholder::new(name.clone(), descriptor, val));
        Ok(name)
    }

    fn qualify(&self, name: &str) -> String {
        if name.starts_with(&format!("{}/", self.name)) || name == self.name {
            name.to_string()
        } else {
            format!("{}/{}", self.name, name)
        }
    }

    fn insert_slot(&mut self, slot: Slot) -> WwResult<()> {
        if self.slots.contains_key(&slot.name) {
            return Err(WaterworksError::NameCollision {
                waterwork: self.name.clone(),
                name: slot.name,
            });
        }
        self.slots.insert(slot.name.clone(), slot);
        Ok(())
    }

    fn insert_tube(&mut self, tube: Tube) -> WwResult<()> {
        if self.tubes.contains_key(&tube.name) {
            return Err(WaterworksError::NameCollision {
                waterwork: self.name.clone(),
                name: tube.name,
            });
        }
        self.tubes.insert(tube.name.clone(), tube);
        Ok(())
    }

    /// Links `slot_name` to `tube_name` (a tube or placeholder), validating
    /// descriptor compatibility (§4.2). The tube/placeholder must currently be a
    /// tap (unused) — callers that might violate this must claim a `Clone`
    /// output first (see `crate::builder::claim_source`).
    pub fn link(&mut self, slot_name: &str, tube_name: &str) -> WwResult<()> {
        let source_descriptor = self.source_descriptor(tube_name);

        if let Some(slot) = self.slots.get(slot_name) {
            if let (Some(slot_d), Some(tube_d)) = (slot.descriptor, source_descriptor) {
                if !slot_d.compatible_with(&tube_d) {
                    return Err(WaterworksError::TypeMismatch {
                        slot: slot_name.to_string(),
                        tube: tube_name.to_string(),
                        slot_descriptor: slot_d.to_string(),
                        tube_descriptor: tube_d.to_string(),
                    });
                }
            }
        }

        let val = self.source_val(tube_name);
        if let Some(slot) = self.slots.get_mut(slot_name) {
            slot.tube = Some(tube_name.to_string());
            if slot.descriptor.is_none() {
                slot.descriptor = source_descriptor;
            }
            slot.val = val;
        }
        self.set_source_slot(tube_name, Some(slot_name.to_string()));
        Ok(())
    }

    fn source_descriptor(&self, name: &str) -> Option<crate::value::Descriptor> {
        self.tubes
            .get(name)
            .map(|t| t.descriptor)
            .or_else(|| self.placeholders.get(name).map(|p| p.descriptor))
            .flatten()
    }

    fn source_val(&self, name: &str) -> Option<Value> {
        self.tubes
            .get(name)
            .and_then(|t| t.val.clone())
            .or_else(|| self.placeholders.get(name).and_then(|p| p.val.clone()))
    }

    pub(crate) fn source_is_used(&self, name: &str) -> bool {
        self.tubes
            .get(name)
            .map(|t| t.slot.is_some())
            .or_else(|| self.placeholders.get(name).map(|p| p.slot.is_some()))
            .unwrap_or(false)
    }

    /// Returns a tube full name safe for a *new* slot to consume: `tube_name`
    /// itself if it's still a tap, otherwise a freshly inserted `Clone`
    /// tank's `b` tube (§9, "multi-fanout"). Recurses through an existing
    /// `Clone` chain so a third, fourth, ... consumer of the same tube gets
    /// its own link rather than stealing an earlier consumer's.
    pub(crate) fn claim_tube(&mut self, tube_name: &str) -> WwResult<String> {
        if !self.source_is_used(tube_name) {
            return Ok(tube_name.to_string());
        }

        let consumer_slot = self
            .tubes
            .get(tube_name)
            .and_then(|t| t.slot.clone())
            .or_else(|| self.placeholders.get(tube_name).and_then(|p| p.slot.clone()))
            .expect("source_is_used implies a consumer slot exists");

        if let Some(slot) = self.slots.get(&consumer_slot) {
            if let Some(tank) = self.tanks.get(&slot.tank) {
                if tank.kind() == "Clone" && tank.slot_full_name("a") == Some(consumer_slot.as_str()) {
                    let b_tube = tank
                        .tube_full_name("b")
                        .expect("Clone always declares tube b")
                        .to_string();
                    return self.claim_tube(&b_tube);
                }
            }
        }

        let descriptor = self.source_descriptor(tube_name);
        let clone_name = self.instantiate_tank(Box::new(crate::tanks::arithmetic::Clone), None)?;
        let clone_a_slot = format!("{}/slots/a", clone_name);
        let clone_a_tube = format!("{}/tubes/a", clone_name);
        let clone_b_tube = format!("{}/tubes/b", clone_name);
        if let Some(d) = descriptor {
            if let Some(t) = self.tubes.get_mut(&clone_a_tube) {
                t.descriptor = Some(d);
            }
            if let Some(t) = self.tubes.get_mut(&clone_b_tube) {
                t.descriptor = Some(d);
            }
        }
        self.link(&clone_a_slot, tube_name)?;
        self.link(&consumer_slot, &clone_a_tube)?;
        Ok(clone_b_tube)
    }

    fn set_source_slot(&mut self, name: &str, slot: Option<String>) {
        if let Some(tube) = self.tubes.get_mut(name) {
            tube.slot = slot;
            return;
        }
        if let Some(ph) = self.placeholders.get_mut(name) {
            ph.slot = slot;
        }
    }

    // ---- dependency reporting (§4.2) ----------------------------------------

    /// Tanks whose tubes feed this tank's slots.
    pub fn pour_dependencies(&self, tank: &str) -> WwResult<BTreeSet<String>> {
        let tank = self
            .tanks
            .get(tank)
            .ok_or_else(|| WaterworksError::UnknownTap(tank.to_string()))?;
        let mut deps = BTreeSet::new();
        for slot_name in tank.slot_names.values() {
            let slot = &self.slots[slot_name];
            if let Some(tube_name) = &slot.tube {
                if let Some(tube) = self.tubes.get(tube_name) {
                    deps.insert(tube.tank.clone());
                }
                // Placeholders aren't owned by a tank, so they never introduce a dependency edge.
            }
        }
        Ok(deps)
    }

    /// Tanks whose slots are fed by this tank's tubes.
    pub fn pump_dependencies(&self, tank: &str) -> WwResult<BTreeSet<String>> {
        let tank = self
            .tanks
            .get(tank)
            .ok_or_else(|| WaterworksError::UnknownTap(tank.to_string()))?;
        let mut deps = BTreeSet::new();
        for tube_name in tank.tube_names.values() {
            let tube = &self.tubes[tube_name];
            if let Some(slot_name) = &tube.slot {
                let slot = &self.slots[slot_name];
                deps.insert(slot.tank.clone());
            }
        }
        Ok(deps)
    }

    /// A deterministic topological order of `self.tanks`, per `dependencies_of`,
    /// ties broken by tank name (§4.3.4). Kahn's algorithm over a `BTreeSet`
    /// frontier gives the "unique up to name-tie" ordering the spec requires,
    /// unlike a naive pairwise comparator (§9, open question (a)).
    fn schedule(
        &self,
        dependencies_of: impl Fn(&str) -> WwResult<BTreeSet<String>>,
    ) -> WwResult<Vec<String>> {
        let mut indegree: BTreeMap<String, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for name in self.tanks.keys() {
            let deps = dependencies_of(name)?;
            indegree.insert(name.clone(), deps.len());
            for dep in deps {
                dependents.entry(dep).or_default().insert(name.clone());
            }
        }

        let mut frontier: BTreeSet<String> = indegree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(k, _)| k.clone())
            .collect();

        let mut order = Vec::with_capacity(self.tanks.len());
        while let Some(name) = frontier.iter().next().cloned() {
            frontier.remove(&name);
            order.push(name.clone());
            if let Some(deps) = dependents.get(&name) {
                for d in deps {
                    let entry = indegree.get_mut(d).expect("dependent must be tracked");
                    *entry -= 1;
                    if *entry == 0 {
                        frontier.insert(d.clone());
                    }
                }
            }
        }

        if order.len() != self.tanks.len() {
            let stuck = indegree
                .into_iter()
                .find(|(_, d)| *d > 0)
                .map(|(k, _)| k)
                .unwrap_or_default();
            return Err(WaterworksError::CycleDetected(stuck));
        }

        Ok(order)
    }

    pub fn pour_order(&self) -> WwResult<Vec<String>> {
        self.schedule(|t| self.pour_dependencies(t))
    }

    pub fn pump_order(&self) -> WwResult<Vec<String>> {
        self.schedule(|t| self.pump_dependencies(t))
    }

    // ---- evaluation (§4.3.2, §4.3.3) ----------------------------------------

    /// Forward evaluation. `funnel_values` is keyed by the full name of a free
    /// slot or a placeholder.
    #[instrument(skip(self, funnel_values), fields(waterwork = %self.name))]
    pub fn pour(
        &mut self,
        funnel_values: HashMap<String, Value>,
        key_mode: KeyMode,
    ) -> WwResult<HashMap<TapKey, Value>> {
        // 1. Bind inputs.
        for (name, val) in funnel_values {
            if let Some(ph) = self.placeholders.get_mut(&name) {
                ph.val = Some(val.clone());
                if let Some(slot_name) = ph.slot.clone() {
                    if let Some(slot) = self.slots.get_mut(&slot_name) {
                        slot.val = Some(val);
                    }
                }
            } else if let Some(slot) = self.slots.get_mut(&name) {
                slot.val = Some(val.clone());
                if let Some(tube_name) = slot.tube.clone() {
                    if let Some(tube) = self.tubes.get_mut(&tube_name) {
                        tube.val = Some(val);
                    }
                }
            } else {
                return Err(WaterworksError::UnknownFunnel(name));
            }
        }

        for slot in self.funnels() {
            if slot.val.is_none() {
                return Err(WaterworksError::MissingInput(slot.name.clone()));
            }
        }

        // 2. Order.
        let order = self.pour_order()?;

        // 3. Execute.
        for tank_name in &order {
            debug!(tank = %tank_name, "pour");
            let tank = &self.tanks[tank_name];
            let mut slot_values: ValueMap = ValueMap::new();
            for (key, slot_name) in &tank.slot_names {
                let slot = &self.slots[slot_name];
                let val = slot.val.clone().ok_or_else(|| {
                    WaterworksError::MissingInput(slot.name.clone())
                })?;
                slot_values.insert(key.clone(), val);
            }
            let tube_values = tank.ops.pour(&slot_values)?;

            #[cfg(debug_assertions)]
            self.check_reversal(tank_name, &slot_values, &tube_values)?;

            let tank = &self.tanks[tank_name];
            for (key, val) in tube_values {
                let tube_name = tank
                    .tube_names
                    .get(&key)
                    .cloned()
                    .ok_or_else(|| WaterworksError::UnknownTap(key.clone()))?;
                let downstream_slot = {
                    let tube = self.tubes.get_mut(&tube_name).expect("tube must exist");
                    tube.val = Some(val.clone());
                    tube.slot.clone()
                };
                if let Some(slot_name) = downstream_slot {
                    if let Some(slot) = self.slots.get_mut(&slot_name) {
                        slot.val = Some(val);
                    }
                }
            }
        }

        // 4. Collect.
        let mut out = HashMap::new();
        for tap in self.taps() {
            let val = tap.val.clone().ok_or_else(|| {
                WaterworksError::MissingInput(tap.name.clone())
            })?;
            let key = match key_mode {
                KeyMode::Str => TapKey::Str(tap.name.clone()),
                KeyMode::Tuple => TapKey::Tuple(tap.tank.clone(), tap.key.clone()),
                KeyMode::Obj => TapKey::Obj(tap.clone()),
            };
            out.insert(key, val);
        }
        Ok(out)
    }

    /// Backward evaluation. `tap_values` is keyed by the full name of a tap.
    #[instrument(skip(self, tap_values), fields(waterwork = %self.name))]
    pub fn pump(
        &mut self,
        tap_values: HashMap<String, Value>,
        key_mode: KeyMode,
    ) -> WwResult<HashMap<FunnelKey, Value>> {
        for (name, val) in tap_values {
            if let Some(tube) = self.tubes.get_mut(&name) {
                tube.val = Some(val);
            } else {
                return Err(WaterworksError::UnknownTap(name));
            }
        }

        for tap in self.taps() {
            if tap.val.is_none() {
                return Err(WaterworksError::MissingInput(tap.name.clone()));
            }
        }

        let order = self.pump_order()?;

        for tank_name in &order {
            debug!(tank = %tank_name, "pump");
            let tank = &self.tanks[tank_name];
            let mut tube_values: ValueMap = ValueMap::new();
            for (key, tube_name) in &tank.tube_names {
                let tube = &self.tubes[tube_name];
                let val = tube.val.clone().ok_or_else(|| {
                    WaterworksError::MissingInput(tube.name.clone())
                })?;
                tube_values.insert(key.clone(), val);
            }
            let slot_values = tank.ops.pump(&tube_values)?;

            let tank = &self.tanks[tank_name];
            for (key, val) in slot_values {
                let slot_name = tank
                    .slot_names
                    .get(&key)
                    .cloned()
                    .ok_or_else(|| WaterworksError::UnknownFunnel(key.clone()))?;
                let upstream_tube = {
                    let slot = self.slots.get_mut(&slot_name).expect("slot must exist");
                    slot.val = Some(val.clone());
                    slot.tube.clone()
                };
                if let Some(tube_name) = upstream_tube {
                    if let Some(tube) = self.tubes.get_mut(&tube_name) {
                        tube.val = Some(val);
                    } else if let Some(ph) = self.placeholders.get_mut(&tube_name) {
                        ph.val = Some(val);
                    }
                }
            }
        }

        let mut out = HashMap::new();
        for funnel in self.funnels() {
            let val = funnel.val.clone().ok_or_else(|| {
                WaterworksError::MissingInput(funnel.name.clone())
            })?;
            let key = match key_mode {
                KeyMode::Str => FunnelKey::Str(funnel.name.clone()),
                KeyMode::Tuple => FunnelKey::Tuple(funnel.tank.clone(), funnel.key.clone()),
                KeyMode::Obj => FunnelKey::Obj(funnel.clone()),
            };
            out.insert(key, val);
        }
        Ok(out)
    }

    /// Resets every slot, tube and placeholder's cached value to `None`,
    /// leaving the graph structure untouched.
    pub fn clear_vals(&mut self) {
        for slot in self.slots.values_mut() {
            slot.val = None;
        }
        for tube in self.tubes.values_mut() {
            tube.val = None;
        }
        for ph in self.placeholders.values_mut() {
            ph.val = None;
        }
    }

    /// Debug-only self-check (§7): re-runs `tank`'s own `pump` against the
    /// tube values `pour` just produced and verifies it reproduces the exact
    /// slot values `pour` was given. Every tank's `pour`/`pump` are supposed
    /// to be exact inverses; this catches a tank that breaks that contract
    /// before it corrupts a whole graph's worth of downstream state.
    #[cfg(debug_assertions)]
    fn check_reversal(
        &self,
        tank_name: &str,
        slot_values: &ValueMap,
        tube_values: &ValueMap,
    ) -> WwResult<()> {
        let tank = &self.tanks[tank_name];
        let recovered = tank.ops.pump(tube_values)?;
        for (key, expected) in slot_values {
            let actual = recovered.get(key).ok_or_else(|| WaterworksError::ReversalViolation {
                tank: tank_name.to_string(),
                slot: key.clone(),
                expected: format!("{:?}", expected),
                actual: "<missing>".to_string(),
            })?;
            if actual != expected {
                return Err(WaterworksError::ReversalViolation {
                    tank: tank_name.to_string(),
                    slot: key.clone(),
                    expected: format!("{:?}", expected),
                    actual: format!("{:?}", actual),
                });
            }
        }
        Ok(())
    }

    // ---- composition (§4.3.5) ------------------------------------------------

    /// Destructively folds `other` into a fresh waterwork together with `self`.
    /// `join_dict` maps a slot full name in `other` to a tube full name in
    /// `self`; each pair becomes an internal edge, removing the tube from
    /// `self`'s taps and the slot from `other`'s funnels.
    pub fn merge(
        self,
        other: Waterwork,
        join_dict: &[(String, String)],
        name: impl Into<String>,
    ) -> WwResult<Waterwork> {
        if self.name == other.name {
            return Err(WaterworksError::NameCollision {
                waterwork: self.name.clone(),
                name: other.name,
            });
        }
        let name = name.into();

        let mut merged = Waterwork::new(name.clone());

        // Every part name already starts with its owning waterwork's name, so
        // prefixing with `name` alone keeps the two operands' parts distinct
        // even when they happen to share a tank name relative to their own
        // root (e.g. both naming a tank "step").
        let rename = |old: &str, _owner: &str| -> String { format!("{}/{}", name, old) };

        for (w, owner) in [(&self, self.name.as_str()), (&other, other.name.as_str())] {
            for (tname, tank) in &w.tanks {
                let new_name = rename(tname, owner);
                if merged.tanks.contains_key(&new_name) {
                    return Err(WaterworksError::NameCollision {
                        waterwork: name.clone(),
                        name: new_name,
                    });
                }
                let mut slot_names = BTreeMap::new();
                for (key, sname) in &tank.slot_names {
                    slot_names.insert(key.clone(), rename(sname, owner));
                }
                let mut tube_names = BTreeMap::new();
                for (key, tname2) in &tank.tube_names {
                    tube_names.insert(key.clone(), rename(tname2, owner));
                }
                merged.tanks.insert(
                    new_name.clone(),
                    Tank {
                        name: new_name,
                        ops: tank.ops.clone_box(),
                        slot_names,
                        tube_names,
                    },
                );
            }
            for (sname, slot) in &w.slots {
                let new_name = rename(sname, owner);
                let mut new_slot = slot.clone();
                new_slot.name = new_name.clone();
                new_slot.tank = rename(&slot.tank, owner);
                new_slot.tube = slot.tube.as_ref().map(|t| rename(t, owner));
                merged.slots.insert(new_name, new_slot);
            }
            for (tname, tube) in &w.tubes {
                let new_name = rename(tname, owner);
                let mut new_tube = tube.clone();
                new_tube.name = new_name.clone();
                new_tube.tank = rename(&tube.tank, owner);
                new_tube.slot = tube.slot.as_ref().map(|s| rename(s, owner));
                merged.tubes.insert(new_name, new_tube);
            }
            for (pname, ph) in &w.placeholders {
                let new_name = rename(pname, owner);
                let mut new_ph = ph.clone();
                new_ph.name = new_name.clone();
                new_ph.slot = ph.slot.as_ref().map(|s| rename(s, owner));
                merged.placeholders.insert(new_name, new_ph);
            }
        }

        for (other_slot, self_tube) in join_dict {
            let new_slot_name = rename(other_slot, other.name.as_str());
            let new_tube_name = rename(self_tube, self.name.as_str());

            if let Some(tube) = merged.tubes.get_mut(&new_tube_name) {
                tube.slot = Some(new_slot_name.clone());
            } else if let Some(ph) = merged.placeholders.get_mut(&new_tube_name) {
                ph.slot = Some(new_slot_name.clone());
            }
            if let Some(slot) = merged.slots.get_mut(&new_slot_name) {
                slot.tube = Some(new_tube_name.clone());
                if let Some(tube) = merged.tubes.get(&new_tube_name) {
                    slot.val = tube.val.clone();
                } else if let Some(ph) = merged.placeholders.get(&new_tube_name) {
                    slot.val = ph.val.clone();
                }
            }
        }

        Ok(merged)
    }

    /// Non-destructively builds a new waterwork from fresh copies of every tank
    /// in `self` then `other`, wiring slots to tubes according to the original
    /// links, with `join_dict` overrides (`other` slot full name -> `self` tube
    /// full name) taking precedence. Both operands remain usable afterwards.
    pub fn combine(
        &self,
        other: &Waterwork,
        join_dict: &[(String, String)],
        name: impl Into<String>,
    ) -> WwResult<Waterwork> {
        if self.name == other.name {
            return Err(WaterworksError::NameCollision {
                waterwork: self.name.clone(),
                name: other.name.clone(),
            });
        }
        let name = name.into();
        let join: BTreeMap<&str, &str> = join_dict
            .iter()
            .map(|(s, t)| (s.as_str(), t.as_str()))
            .collect();

        let mut combined = Waterwork::new(name.clone());
        // See the identical note in `merge`: keep the owner's own name in the
        // renamed part so the two operands never collide.
        let rename = |old: &str, _owner: &str| -> String { format!("{}/{}", name, old) };

        for (w, owner) in [(self, self.name.as_str()), (other, other.name.as_str())] {
            for tank_name in w.pour_order()? {
                let tank = &w.tanks[&tank_name];
                let new_tank_name = rename(&tank_name, owner);
                let mut slot_names = BTreeMap::new();
                let mut tube_names = BTreeMap::new();

                for (key, tname) in &tank.tube_names {
                    let new_name = rename(tname, owner);
                    let old_tube = &w.tubes[tname];
                    let mut t = old_tube.clone();
                    t.name = new_name.clone();
                    t.tank = new_tank_name.clone();
                    t.slot = None;
                    combined.tubes.insert(new_name.clone(), t);
                    tube_names.insert(key.clone(), new_name);
                }

                for (key, sname) in &tank.slot_names {
                    let new_name = rename(sname, owner);
                    let old_slot = &w.slots[sname];
                    let mut s = old_slot.clone();
                    s.name = new_name.clone();
                    s.tank = new_tank_name.clone();

                    let source_full_name = if let Some(over) = join.get(sname.as_str()) {
                        Some(rename(over, self.name.as_str()))
                    } else if let Some(tube_name) = &old_slot.tube {
                        Some(rename(tube_name, owner))
                    } else {
                        None
                    };

                    if let Some(src) = &source_full_name {
                        s.tube = Some(src.clone());
                        if let Some(tube) = combined.tubes.get_mut(src) {
                            tube.slot = Some(new_name.clone());
                        } else if let Some(ph) = combined.placeholders.get_mut(src) {
                            ph.slot = Some(new_name.clone());
                        }
                    } else {
                        s.tube = None;
                    }
                    combined.slots.insert(new_name.clone(), s);
                    slot_names.insert(key.clone(), new_name);
                }

                combined.tanks.insert(
                    new_tank_name.clone(),
                    Tank {
                        name: new_tank_name,
                        ops: tank.ops.clone_box(),
                        slot_names,
                        tube_names,
                    },
                );
            }
        }

        Ok(combined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tanks::arithmetic::Add;

    fn build_add_chain() -> Waterwork {
        Waterwork::build("ww", |ww| {
            let a = ww.new_placeholder(None)?;
            let b = ww.new_placeholder(None)?;
            let add = ww.instantiate_tank(Box::new(Add), None)?;
            ww.link(&format!("{}/slots/a", add), &a)?;
            ww.link(&format!("{}/slots/b", add), &b)?;
            Ok(())
        })
        .unwrap()
    }

    #[test]
    fn pour_order_is_topological_and_deterministic() {
        let ww = build_add_chain();
        let order = ww.pour_order().unwrap();
        assert_eq!(order.len(), 1);
    }

    #[test]
    fn clear_vals_wipes_every_value() {
        let mut ww = build_add_chain();
        for ph in ww.placeholders.values_mut() {
            ph.val = Some(Value::Float(1.0));
        }
        ww.clear_vals();
        assert!(ww.placeholders.values().all(|p| p.val.is_none()));
        assert!(ww.slots.values().all(|s| s.val.is_none()));
    }

    #[test]
    fn pour_accepts_a_tank_whose_pump_genuinely_inverts() {
        let mut ww = Waterwork::build("ww_sound", |ww| {
            ww.instantiate_tank(Box::new(Add), None)?;
            Ok(())
        })
        .unwrap();
        let add = ww.tanks.keys().next().cloned().unwrap();
        let a_slot = format!("{}/slots/a", add);
        let b_slot = format!("{}/slots/b", add);
        let mut funnels = HashMap::new();
        funnels.insert(a_slot, Value::Float(2.0));
        funnels.insert(b_slot, Value::Float(3.0));
        assert!(ww.pour(funnels, KeyMode::Str).is_ok());
    }

    #[derive(Debug, Clone, Copy)]
    struct BrokenTank;

    impl TankOps for BrokenTank {
        fn kind(&self) -> &'static str {
            "BrokenTank"
        }
        fn slot_keys(&self) -> &'static [&'static str] {
            &["a"]
        }
        fn tube_keys(&self) -> &'static [&'static str] {
            &["target"]
        }
        fn pour(&self, slot_values: &ValueMap) -> WwResult<ValueMap> {
            let mut out = ValueMap::new();
            out.insert("target".to_string(), slot_values["a"].clone());
            Ok(out)
        }
        fn pump(&self, _tube_values: &ValueMap) -> WwResult<ValueMap> {
            // Deliberately wrong: never recovers the original "a".
            let mut out = ValueMap::new();
            out.insert("a".to_string(), Value::Float(-1.0));
            Ok(out)
        }
        fn clone_box(&self) -> Box<dyn TankOps> {
            Box::new(*self)
        }
    }

    #[test]
    fn pour_raises_reversal_violation_when_pump_does_not_invert() {
        let mut ww = Waterwork::build("ww_broken", |ww| {
            ww.instantiate_tank(Box::new(BrokenTank), None)?;
            Ok(())
        })
        .unwrap();
        let broken = ww.tanks.keys().next().cloned().unwrap();
        let a_slot = format!("{}/slots/a", broken);

        let mut funnels = HashMap::new();
        funnels.insert(a_slot, Value::Float(3.0));
        let err = ww.pour(funnels, KeyMode::Str).unwrap_err();
        assert!(matches!(err, WaterworksError::ReversalViolation { .. }));
    }
}
