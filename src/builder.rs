//! The fluent programmatic surface (§6): constructor functions, one per
//! catalog kind, that accept a raw value / an existing tube / "leave free"
//! for each slot and return a [`TankHandle`] exposing that tank's tubes by
//! key. Grounded on `tank_defs.py`'s wrapper functions (`add`, `sub`, `mul`,
//! ...), which accept the same three argument shapes per slot.
//!
//! Every constructor auto-inserts a `Clone` tank when a tube argument is
//! already feeding another slot (`Waterwork::claim_tube`), so callers never
//! have to think about the one-tube-to-one-slot invariant themselves (§9,
//! "multi-fanout").

use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use crate::error::{WaterworksError, WwResult};
use crate::tanks::arithmetic::{Add, Clone as CloneTank, Div, Mul, Sub};
use crate::tanks::array_ops::{Boolean, BooleanOp, Concatenate, LogicalNot, Reduce, ReduceOp, Replace, Transpose};
use crate::tanks::cast::{Cast, CastTarget};
use crate::tanks::categorical::{CatToIndex, OneHot};
use crate::tanks::datetime::{DatetimeToNum, IsNat, TimeUnit};
use crate::tanks::text::{HalfWidth, Lemmatize, LowerCase, ReplaceSubstring, Tokenize};
use crate::value::Value;
use crate::waterwork::Waterwork;

/// A reference to one of a tank's declared tubes, usable as the `Source` of
/// another tank's slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TubeHandle {
    pub tank: String,
    pub key: String,
}

/// The handle a catalog constructor returns: the tank's full name, plus
/// `.tube(key)` to reference one of its outputs in a subsequent call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TankHandle {
    pub name: String,
}

impl TankHandle {
    pub fn tube(&self, key: impl Into<String>) -> TubeHandle {
        TubeHandle {
            tank: self.name.clone(),
            key: key.into(),
        }
    }
}

/// A reference to a bare placeholder created via [`placeholder`], usable as
/// the `Source` of a slot the same way a [`TubeHandle`] is — the difference
/// is it names a free value source with no owning tank (§3's "placeholder").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderHandle {
    pub name: String,
}

/// Synthesises a bare placeholder a caller can feed to more than one slot
/// (each additional slot goes through `claim_tube` just like a tube would).
/// Grounded on the same "named free value source" placeholders already serve
/// for scalar arguments (`bind_slot`'s `Source::Value` arm), exposed here so
/// a [`crate::transforms`] façade can share one raw input across several
/// tanks without the caller manually inserting a `Clone`.
pub fn placeholder(ww: &mut Waterwork) -> WwResult<PlaceholderHandle> {
    let name = ww.new_placeholder(None)?;
    Ok(PlaceholderHandle { name })
}

/// What a slot argument resolves to: a constant (becomes a placeholder), an
/// existing tube, an existing bare placeholder, or "leave free" (the slot
/// becomes a funnel, §3).
#[derive(Debug, Clone)]
pub enum Source {
    Value(Value),
    Tube(TubeHandle),
    PlaceholderRef(String),
    Free,
}

impl Source {
    pub fn free() -> Self {
        Source::Free
    }
}

impl From<Value> for Source {
    fn from(v: Value) -> Self {
        Source::Value(v)
    }
}
impl From<f64> for Source {
    fn from(v: f64) -> Self {
        Source::Value(Value::from(v))
    }
}
impl From<i64> for Source {
    fn from(v: i64) -> Self {
        Source::Value(Value::from(v))
    }
}
impl From<bool> for Source {
    fn from(v: bool) -> Self {
        Source::Value(Value::from(v))
    }
}
impl From<&str> for Source {
    fn from(v: &str) -> Self {
        Source::Value(Value::from(v))
    }
}
impl From<String> for Source {
    fn from(v: String) -> Self {
        Source::Value(Value::from(v))
    }
}
impl From<Vec<f64>> for Source {
    fn from(v: Vec<f64>) -> Self {
        Source::Value(Value::from(v))
    }
}
impl From<Vec<i64>> for Source {
    fn from(v: Vec<i64>) -> Self {
        Source::Value(Value::from(v))
    }
}
impl From<Vec<bool>> for Source {
    fn from(v: Vec<bool>) -> Self {
        Source::Value(Value::from(v))
    }
}
impl From<Vec<String>> for Source {
    fn from(v: Vec<String>) -> Self {
        Source::Value(Value::from(v))
    }
}
impl From<TubeHandle> for Source {
    fn from(t: TubeHandle) -> Self {
        Source::Tube(t)
    }
}
impl From<&TubeHandle> for Source {
    fn from(t: &TubeHandle) -> Self {
        Source::Tube(t.clone())
    }
}
impl From<PlaceholderHandle> for Source {
    fn from(p: PlaceholderHandle) -> Self {
        Source::PlaceholderRef(p.name)
    }
}
impl From<&PlaceholderHandle> for Source {
    fn from(p: &PlaceholderHandle) -> Self {
        Source::PlaceholderRef(p.name.clone())
    }
}

/// Resolves `source` into a link onto `tank_name`'s `slot_key`. `Free` leaves
/// the slot unconnected (a funnel); `Value` synthesises a placeholder;
/// `Tube` claims a non-conflicting tube (inserting a `Clone` if needed) and
/// links to it.
fn bind_slot(ww: &mut Waterwork, tank_name: &str, slot_key: &str, source: Source) -> WwResult<()> {
    let slot_name = format!("{}/slots/{}", tank_name, slot_key);
    match source {
        Source::Free => Ok(()),
        Source::Value(v) => {
            let ph = ww.new_placeholder(Some(v))?;
            ww.link(&slot_name, &ph)
        }
        Source::Tube(handle) => {
            let full = ww
                .resolve_tube_by_tuple(&handle.tank, &handle.key)
                .map(|t| t.name.clone())
                .ok_or_else(|| {
                    WaterworksError::UnknownTap(format!("{}/tubes/{}", handle.tank, handle.key))
                })?;
            let claimed = ww.claim_tube(&full)?;
            ww.link(&slot_name, &claimed)
        }
        Source::PlaceholderRef(name) => {
            let claimed = ww.claim_tube(&name)?;
            ww.link(&slot_name, &claimed)
        }
    }
}

fn instantiate(
    ww: &mut Waterwork,
    ops: Box<dyn crate::tank::TankOps>,
    name: Option<&str>,
) -> WwResult<TankHandle> {
    let tank_name = ww.instantiate_tank(ops, name.map(|s| s.to_string()))?;
    Ok(TankHandle { name: tank_name })
}

/// Duplicates a tube onto two slots. Constructors call `Waterwork::claim_tube`
/// automatically; this is exposed for callers who want an explicit split.
pub fn clone_tube(ww: &mut Waterwork, a: impl Into<Source>, name: Option<&str>) -> WwResult<TankHandle> {
    let h = instantiate(ww, Box::new(CloneTank), name)?;
    bind_slot(ww, &h.name, "a", a.into())?;
    Ok(h)
}

macro_rules! binary_op_ctor {
    ($fn_name:ident, $tank:ty) => {
        pub fn $fn_name(
            ww: &mut Waterwork,
            a: impl Into<Source>,
            b: impl Into<Source>,
            name: Option<&str>,
        ) -> WwResult<TankHandle> {
            let h = instantiate(ww, Box::new(<$tank>::default()), name)?;
            bind_slot(ww, &h.name, "a", a.into())?;
            bind_slot(ww, &h.name, "b", b.into())?;
            Ok(h)
        }
    };
}

binary_op_ctor!(add, Add);
binary_op_ctor!(sub, Sub);
binary_op_ctor!(mul, Mul);
binary_op_ctor!(div, Div);

pub fn cast(
    ww: &mut Waterwork,
    a: impl Into<Source>,
    target: CastTarget,
    name: Option<&str>,
) -> WwResult<TankHandle> {
    let h = instantiate(ww, Box::new(Cast::new(target)), name)?;
    bind_slot(ww, &h.name, "a", a.into())?;
    let dtype = match target {
        CastTarget::ToI64 => crate::value::ValDtype::I64,
        CastTarget::ToF64 => crate::value::ValDtype::F64,
    };
    bind_slot(ww, &h.name, "dtype", Source::Value(Value::Str(dtype.to_string())))?;
    Ok(h)
}

pub fn cat_to_index(
    ww: &mut Waterwork,
    cats: impl Into<Source>,
    cat_to_index_map: BTreeMap<String, i64>,
    name: Option<&str>,
) -> WwResult<TankHandle> {
    let h = instantiate(ww, Box::new(CatToIndex::new(cat_to_index_map)), name)?;
    bind_slot(ww, &h.name, "cats", cats.into())?;
    Ok(h)
}

pub fn one_hot(
    ww: &mut Waterwork,
    indices: impl Into<Source>,
    depth: usize,
    name: Option<&str>,
) -> WwResult<TankHandle> {
    let h = instantiate(ww, Box::new(OneHot::new(depth)), name)?;
    bind_slot(ww, &h.name, "indices", indices.into())?;
    Ok(h)
}

pub fn concatenate(
    ww: &mut Waterwork,
    a_list: impl Into<Source>,
    axis: impl Into<Source>,
    name: Option<&str>,
) -> WwResult<TankHandle> {
    let h = instantiate(ww, Box::new(Concatenate), name)?;
    bind_slot(ww, &h.name, "a_list", a_list.into())?;
    bind_slot(ww, &h.name, "axis", axis.into())?;
    Ok(h)
}

pub fn transpose(
    ww: &mut Waterwork,
    a: impl Into<Source>,
    axes: impl Into<Source>,
    name: Option<&str>,
) -> WwResult<TankHandle> {
    let h = instantiate(ww, Box::new(Transpose), name)?;
    bind_slot(ww, &h.name, "a", a.into())?;
    bind_slot(ww, &h.name, "axes", axes.into())?;
    Ok(h)
}

pub fn replace(
    ww: &mut Waterwork,
    a: impl Into<Source>,
    mask: impl Into<Source>,
    replace_with: impl Into<Source>,
    name: Option<&str>,
) -> WwResult<TankHandle> {
    let h = instantiate(ww, Box::new(Replace), name)?;
    bind_slot(ww, &h.name, "a", a.into())?;
    bind_slot(ww, &h.name, "mask", mask.into())?;
    bind_slot(ww, &h.name, "replace_with", replace_with.into())?;
    Ok(h)
}

pub fn tokenize(
    ww: &mut Waterwork,
    strings: impl Into<Source>,
    max_len: usize,
    delimiter: impl Into<String>,
    name: Option<&str>,
) -> WwResult<TankHandle> {
    let h = instantiate(ww, Box::new(Tokenize::new(max_len, delimiter)), name)?;
    bind_slot(ww, &h.name, "strings", strings.into())?;
    Ok(h)
}

pub fn lower_case(ww: &mut Waterwork, strings: impl Into<Source>, name: Option<&str>) -> WwResult<TankHandle> {
    let h = instantiate(ww, Box::new(LowerCase), name)?;
    bind_slot(ww, &h.name, "strings", strings.into())?;
    Ok(h)
}

pub fn half_width(ww: &mut Waterwork, strings: impl Into<Source>, name: Option<&str>) -> WwResult<TankHandle> {
    let h = instantiate(ww, Box::new(HalfWidth), name)?;
    bind_slot(ww, &h.name, "strings", strings.into())?;
    Ok(h)
}

pub fn lemmatize(ww: &mut Waterwork, strings: impl Into<Source>, name: Option<&str>) -> WwResult<TankHandle> {
    let h = instantiate(ww, Box::new(Lemmatize), name)?;
    bind_slot(ww, &h.name, "strings", strings.into())?;
    Ok(h)
}

pub fn replace_substring(
    ww: &mut Waterwork,
    strings: impl Into<Source>,
    old: impl Into<Source>,
    new: impl Into<Source>,
    name: Option<&str>,
) -> WwResult<TankHandle> {
    let h = instantiate(ww, Box::new(ReplaceSubstring), name)?;
    bind_slot(ww, &h.name, "strings", strings.into())?;
    bind_slot(ww, &h.name, "old", old.into())?;
    bind_slot(ww, &h.name, "new", new.into())?;
    Ok(h)
}

pub fn datetime_to_num(
    ww: &mut Waterwork,
    a: impl Into<Source>,
    zero_datetime: NaiveDateTime,
    num_units: i64,
    time_unit: TimeUnit,
    name: Option<&str>,
) -> WwResult<TankHandle> {
    let h = instantiate(
        ww,
        Box::new(DatetimeToNum::new(zero_datetime, num_units, time_unit)),
        name,
    )?;
    bind_slot(ww, &h.name, "a", a.into())?;
    Ok(h)
}

pub fn is_nat(ww: &mut Waterwork, a: impl Into<Source>, name: Option<&str>) -> WwResult<TankHandle> {
    let h = instantiate(ww, Box::new(IsNat), name)?;
    bind_slot(ww, &h.name, "a", a.into())?;
    Ok(h)
}

pub fn reduce(
    ww: &mut Waterwork,
    a: impl Into<Source>,
    axis: impl Into<Source>,
    op: ReduceOp,
    name: Option<&str>,
) -> WwResult<TankHandle> {
    let h = instantiate(ww, Box::new(Reduce::new(op)), name)?;
    bind_slot(ww, &h.name, "a", a.into())?;
    bind_slot(ww, &h.name, "axis", axis.into())?;
    Ok(h)
}

pub fn boolean(
    ww: &mut Waterwork,
    a: impl Into<Source>,
    b: impl Into<Source>,
    op: BooleanOp,
    name: Option<&str>,
) -> WwResult<TankHandle> {
    let h = instantiate(ww, Box::new(Boolean::new(op)), name)?;
    bind_slot(ww, &h.name, "a", a.into())?;
    if op != BooleanOp::IsNan {
        bind_slot(ww, &h.name, "b", b.into())?;
    }
    Ok(h)
}

pub fn logical_not(ww: &mut Waterwork, a: impl Into<Source>, name: Option<&str>) -> WwResult<TankHandle> {
    let h = instantiate(ww, Box::new(LogicalNot), name)?;
    bind_slot(ww, &h.name, "a", a.into())?;
    Ok(h)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_mul_reuses_the_same_tube_via_clone() {
        let mut ww = Waterwork::new("ww");
        let _guard = crate::scope::ScopeGuard::enter("ww").unwrap();
        let a = add(&mut ww, vec![1.0, 2.0], 1.0, None).unwrap();
        let target = a.tube("target");
        let _m1 = mul(&mut ww, &target, 2.0, None).unwrap();
        let _m2 = mul(&mut ww, &target, 3.0, None).unwrap();

        let clones: Vec<_> = ww.tanks.values().filter(|t| t.kind() == "Clone").collect();
        assert_eq!(clones.len(), 1, "a third consumer of the same tube should share one Clone");
    }
}
