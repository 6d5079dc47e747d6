//! Clone and the rank-/shape-adjusting binary ops (§4.4, add/sub/mul/div rows
//! of the catalog table in §6). Grounded on `tank_defs.py`'s `add`/`sub`/
//! `mul`/`div` wrappers: the Python source infers a target dtype and
//! delegates to a kind-specific subclass; here each kind is its own
//! `TankOps` impl operating on flattened `f64` data.
//!
//! All four share one broadcasting convention: slots `a`/`b` may differ in
//! length only if one of them is length 1 (a scalar broadcast across the
//! other). `a_is_smaller` records which operand was shorter (ties favour
//! `b`), and `smaller_size_array` carries that operand's values in full, so
//! `pump` can broadcast it back out and invert elementwise against `target`.

use std::collections::BTreeMap;

use crate::error::{WaterworksError, WwResult};
use crate::tank::{TankOps, ValueMap};
use crate::value::Value;

use super::support::{array, broadcast_len, broadcast_to, scalar_or_array, to_f64_vec};

/// Duplicates its input onto two tubes. The waterwork builder inserts this
/// automatically wherever a tube would otherwise feed more than one slot
/// (§9, "multi-fanout").
#[derive(Debug, Clone, Copy, Default)]
pub struct Clone;

impl TankOps for Clone {
    fn kind(&self) -> &'static str {
        "Clone"
    }
    fn slot_keys(&self) -> &'static [&'static str] {
        &["a"]
    }
    fn tube_keys(&self) -> &'static [&'static str] {
        &["a", "b"]
    }
    fn pour(&self, slot_values: &ValueMap) -> WwResult<ValueMap> {
        let a = slot_values
            .get("a")
            .cloned()
            .ok_or_else(|| missing("Clone", "a"))?;
        let mut out = ValueMap::new();
        out.insert("a".to_string(), a.clone());
        out.insert("b".to_string(), a);
        Ok(out)
    }
    fn pump(&self, tube_values: &ValueMap) -> WwResult<ValueMap> {
        let a = tube_values
            .get("a")
            .cloned()
            .ok_or_else(|| missing("Clone", "a"))?;
        let mut out = ValueMap::new();
        out.insert("a".to_string(), a);
        Ok(out)
    }
    fn clone_box(&self) -> Box<dyn TankOps> {
        Box::new(*self)
    }
}

fn missing(tank: &str, slot: &str) -> WaterworksError {
    WaterworksError::InvalidValue {
        tank: tank.to_string(),
        slot: slot.to_string(),
        reason: "required slot had no value".to_string(),
    }
}

/// Reads `a`/`b` out of a slot map, preserving which side ends up "smaller".
fn read_operands(tank: &str, slot_values: &ValueMap) -> WwResult<(Vec<f64>, Vec<f64>)> {
    let a_val = slot_values.get("a").ok_or_else(|| missing(tank, "a"))?;
    let b_val = slot_values.get("b").ok_or_else(|| missing(tank, "b"))?;
    let a = to_f64_vec(tank, "a", a_val)?;
    let b = to_f64_vec(tank, "b", b_val)?;
    Ok((a, b))
}

/// Common pour shape: broadcast `a`/`b`, apply `op` elementwise, and emit
/// `target`/`smaller_size_array`/`a_is_smaller` plus whatever `extra` the
/// caller wants added (e.g. `missing_vals`, `remainder`).
fn binary_pour(
    tank: &str,
    slot_values: &ValueMap,
    op: impl Fn(f64, f64) -> f64,
) -> WwResult<(ValueMap, Vec<f64>, Vec<f64>, bool)> {
    let (a, b) = read_operands(tank, slot_values)?;
    let len = broadcast_len(tank, &a, &b)?;
    let a_b = broadcast_to(&a, len);
    let b_b = broadcast_to(&b, len);
    let target: Vec<f64> = a_b.iter().zip(&b_b).map(|(&x, &y)| op(x, y)).collect();

    let a_is_smaller = a.len() < b.len();
    let smaller = if a_is_smaller { a.clone() } else { b.clone() };

    let mut out = ValueMap::new();
    out.insert("target".to_string(), array(target.clone()));
    out.insert(
        "smaller_size_array".to_string(),
        scalar_or_array(smaller),
    );
    out.insert("a_is_smaller".to_string(), Value::Bool(a_is_smaller));
    Ok((out, a_b, b_b, a_is_smaller))
}

/// Reconstructs `a`/`b` from `target` and `smaller_size_array`, broadcasting
/// the recorded smaller operand back out to `target`'s length and inverting
/// elementwise with `inv_a`/`inv_b` (given `target[i]` and the *other*
/// operand's value at `i`, recover this operand's value at `i`).
fn binary_pump(
    tank: &str,
    tube_values: &ValueMap,
    inv_a: impl Fn(f64, f64) -> f64,
    inv_b: impl Fn(f64, f64) -> f64,
) -> WwResult<(Vec<f64>, Vec<f64>, Vec<f64>)> {
    let target = to_f64_vec(
        tank,
        "target",
        tube_values.get("target").ok_or_else(|| missing(tank, "target"))?,
    )?;
    let smaller = to_f64_vec(
        tank,
        "smaller_size_array",
        tube_values
            .get("smaller_size_array")
            .ok_or_else(|| missing(tank, "smaller_size_array"))?,
    )?;
    let a_is_smaller = tube_values
        .get("a_is_smaller")
        .and_then(|v| v.as_bool())
        .ok_or_else(|| missing(tank, "a_is_smaller"))?;

    let len = target.len();
    let smaller_full = broadcast_to(&smaller, len);

    let (a, b) = if a_is_smaller {
        let b: Vec<f64> = target
            .iter()
            .zip(&smaller_full)
            .map(|(&t, &a)| inv_b(t, a))
            .collect();
        (smaller, b)
    } else {
        let a: Vec<f64> = target
            .iter()
            .zip(&smaller_full)
            .map(|(&t, &b)| inv_a(t, b))
            .collect();
        (a, smaller)
    };
    Ok((a, b, target))
}

/// `target = a + b`. `pump` inverts with `a = target - b` / `b = target - a`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Add;

impl TankOps for Add {
    fn kind(&self) -> &'static str {
        "Add"
    }
    fn slot_keys(&self) -> &'static [&'static str] {
        &["a", "b"]
    }
    fn tube_keys(&self) -> &'static [&'static str] {
        &["target", "smaller_size_array", "a_is_smaller"]
    }
    fn pour(&self, slot_values: &ValueMap) -> WwResult<ValueMap> {
        let (out, ..) = binary_pour("Add", slot_values, |a, b| a + b)?;
        Ok(out)
    }
    fn pump(&self, tube_values: &ValueMap) -> WwResult<ValueMap> {
        let (a, b, _) = binary_pump("Add", tube_values, |t, b| t - b, |t, a| t - a)?;
        let mut out = ValueMap::new();
        out.insert("a".to_string(), scalar_or_array(a));
        out.insert("b".to_string(), scalar_or_array(b));
        Ok(out)
    }
    fn clone_box(&self) -> Box<dyn TankOps> {
        Box::new(*self)
    }
}

/// `target = a - b`. `pump` inverts with `a = target + b` / `b = a - target`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sub;

impl TankOps for Sub {
    fn kind(&self) -> &'static str {
        "Sub"
    }
    fn slot_keys(&self) -> &'static [&'static str] {
        &["a", "b"]
    }
    fn tube_keys(&self) -> &'static [&'static str] {
        &["target", "smaller_size_array", "a_is_smaller"]
    }
    fn pour(&self, slot_values: &ValueMap) -> WwResult<ValueMap> {
        let (out, ..) = binary_pour("Sub", slot_values, |a, b| a - b)?;
        Ok(out)
    }
    fn pump(&self, tube_values: &ValueMap) -> WwResult<ValueMap> {
        // a_is_smaller here means "a" is the recorded (known) operand: since
        // target = a - b, if a is known then b = a - target; if b is known
        // then a = target + b.
        let (a, b, _) = binary_pump("Sub", tube_values, |t, b| t + b, |t, a| a - t)?;
        let mut out = ValueMap::new();
        out.insert("a".to_string(), scalar_or_array(a));
        out.insert("b".to_string(), scalar_or_array(b));
        Ok(out)
    }
    fn clone_box(&self) -> Box<dyn TankOps> {
        Box::new(*self)
    }
}

/// `target = a * b`, with positions where the reconstructing division would
/// be by zero captured verbatim in `missing_vals` (indices implicit: one
/// entry per zero divisor, in order).
#[derive(Debug, Clone, Copy, Default)]
pub struct Mul;

impl TankOps for Mul {
    fn kind(&self) -> &'static str {
        "Mul"
    }
    fn slot_keys(&self) -> &'static [&'static str] {
        &["a", "b"]
    }
    fn tube_keys(&self) -> &'static [&'static str] {
        &[
            "target",
            "smaller_size_array",
            "a_is_smaller",
            "missing_vals",
        ]
    }
    fn pour(&self, slot_values: &ValueMap) -> WwResult<ValueMap> {
        let (a, b) = read_operands("Mul", slot_values)?;
        let len = broadcast_len("Mul", &a, &b)?;
        let a_b = broadcast_to(&a, len);
        let b_b = broadcast_to(&b, len);
        let target: Vec<f64> = a_b.iter().zip(&b_b).map(|(x, y)| x * y).collect();
        let a_is_smaller = a.len() < b.len();
        let smaller = if a_is_smaller { a.clone() } else { b.clone() };
        // `known` is whichever side pump will broadcast back out as the
        // divisor (smaller_size_array); `large_original` is the side being
        // lost wherever that divisor is zero.
        let known = if a_is_smaller { &a_b } else { &b_b };
        let large_original = if a_is_smaller { &b_b } else { &a_b };
        let missing_vals: Vec<f64> = known
            .iter()
            .zip(large_original)
            .filter(|(&k, _)| k == 0.0)
            .map(|(_, &v)| v)
            .collect();

        let mut out = ValueMap::new();
        out.insert("target".to_string(), array(target));
        out.insert("smaller_size_array".to_string(), scalar_or_array(smaller));
        out.insert("a_is_smaller".to_string(), Value::Bool(a_is_smaller));
        out.insert("missing_vals".to_string(), array(missing_vals));
        Ok(out)
    }
    fn pump(&self, tube_values: &ValueMap) -> WwResult<ValueMap> {
        let target = to_f64_vec("Mul", "target", &tube_values["target"])?;
        let smaller = to_f64_vec("Mul", "smaller_size_array", &tube_values["smaller_size_array"])?;
        let a_is_smaller = tube_values["a_is_smaller"].as_bool().ok_or_else(|| missing("Mul", "a_is_smaller"))?;
        let missing_vals = to_f64_vec("Mul", "missing_vals", &tube_values["missing_vals"])?;

        let len = target.len();
        let known_full = broadcast_to(&smaller, len);
        let mut spare = missing_vals.into_iter();
        let large: Vec<f64> = target
            .iter()
            .zip(&known_full)
            .map(|(&t, &k)| {
                if k == 0.0 {
                    spare.next().unwrap_or(0.0)
                } else {
                    t / k
                }
            })
            .collect();

        let (a, b) = if a_is_smaller { (smaller, large) } else { (large, smaller) };
        let mut out = ValueMap::new();
        out.insert("a".to_string(), scalar_or_array(a));
        out.insert("b".to_string(), scalar_or_array(b));
        Ok(out)
    }
    fn clone_box(&self) -> Box<dyn TankOps> {
        Box::new(*self)
    }
}

/// Floor division: `target = floor(a / b)`, `remainder = a - target * b`, so
/// `a = target * b + remainder` always recovers `a` exactly given `b`.
/// Positions where `b == 0` can't drive `target`'s division and are recorded
/// verbatim in `missing_vals` instead, same convention as [`Mul`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Div;

impl TankOps for Div {
    fn kind(&self) -> &'static str {
        "Div"
    }
    fn slot_keys(&self) -> &'static [&'static str] {
        &["a", "b"]
    }
    fn tube_keys(&self) -> &'static [&'static str] {
        &[
            "target",
            "smaller_size_array",
            "a_is_smaller",
            "missing_vals",
            "remainder",
        ]
    }
    fn pour(&self, slot_values: &ValueMap) -> WwResult<ValueMap> {
        let (a, b) = read_operands("Div", slot_values)?;
        let len = broadcast_len("Div", &a, &b)?;
        let a_b = broadcast_to(&a, len);
        let b_b = broadcast_to(&b, len);

        let mut target = Vec::with_capacity(len);
        let mut remainder = Vec::with_capacity(len);
        let mut missing_vals = Vec::new();
        for (&x, &y) in a_b.iter().zip(&b_b) {
            if y == 0.0 {
                target.push(0.0);
                remainder.push(0.0);
                missing_vals.push(x);
            } else {
                let q = (x / y).floor();
                target.push(q);
                remainder.push(x - q * y);
            }
        }

        let a_is_smaller = a.len() < b.len();
        let smaller = if a_is_smaller { a } else { b };

        let mut out = ValueMap::new();
        out.insert("target".to_string(), array(target));
        out.insert("smaller_size_array".to_string(), scalar_or_array(smaller));
        out.insert("a_is_smaller".to_string(), Value::Bool(a_is_smaller));
        out.insert("missing_vals".to_string(), array(missing_vals));
        out.insert("remainder".to_string(), array(remainder));
        Ok(out)
    }
    fn pump(&self, tube_values: &ValueMap) -> WwResult<ValueMap> {
        let target = to_f64_vec("Div", "target", &tube_values["target"])?;
        let remainder = to_f64_vec("Div", "remainder", &tube_values["remainder"])?;
        let smaller = to_f64_vec("Div", "smaller_size_array", &tube_values["smaller_size_array"])?;
        let a_is_smaller = tube_values["a_is_smaller"].as_bool().ok_or_else(|| missing("Div", "a_is_smaller"))?;
        let missing_vals = to_f64_vec("Div", "missing_vals", &tube_values["missing_vals"])?;
        let len = target.len();

        let (a, b) = if a_is_smaller {
            // a is fully known (the recorded smaller operand); b must be
            // recovered. Where b was 0, target/remainder carry no
            // information, so fall back to missing_vals.
            let a_full = broadcast_to(&smaller, len);
            let mut spare = missing_vals.into_iter();
            let b: Vec<f64> = target
                .iter()
                .zip(&a_full)
                .zip(&remainder)
                .map(|((&t, &a), &r)| {
                    if t == 0.0 && r == 0.0 {
                        spare.next().unwrap_or(0.0)
                    } else {
                        (a - r) / t
                    }
                })
                .collect();
            (smaller, b)
        } else {
            // b is fully known (the recorded smaller operand, the divisor);
            // a must be recovered. Where b was 0, pour couldn't drive target
            // or remainder off it either, so a was lost and recorded
            // verbatim in missing_vals instead.
            let b_full = broadcast_to(&smaller, len);
            let mut spare = missing_vals.into_iter();
            let a: Vec<f64> = target
                .iter()
                .zip(&b_full)
                .zip(&remainder)
                .map(|((&t, &b), &r)| {
                    if b == 0.0 {
                        spare.next().unwrap_or(0.0)
                    } else {
                        t * b + r
                    }
                })
                .collect();
            (a, smaller)
        };

        let mut out = ValueMap::new();
        out.insert("a".to_string(), scalar_or_array(a));
        out.insert("b".to_string(), scalar_or_array(b));
        Ok(out)
    }
    fn clone_box(&self) -> Box<dyn TankOps> {
        Box::new(*self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(pairs: Vec<(&str, Value)>) -> BTreeMap<String, Value> {
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn add_reversal_matches_concrete_scenario() {
        let add = Add;
        let slots = sorted(vec![("a", array(vec![1.0, 2.0, 3.0])), ("b", Value::Float(10.0))]);
        let tubes = add.pour(&slots).unwrap();
        assert_eq!(tubes["target"], array(vec![11.0, 12.0, 13.0]));
        assert_eq!(tubes["smaller_size_array"], Value::Float(10.0));
        assert_eq!(tubes["a_is_smaller"], Value::Bool(false));

        let back = add.pump(&tubes).unwrap();
        assert_eq!(back["a"], array(vec![1.0, 2.0, 3.0]));
        assert_eq!(back["b"], Value::Float(10.0));
    }

    #[test]
    fn div_with_remainder_matches_concrete_scenario() {
        let div = Div;
        let slots = sorted(vec![("a", array(vec![7.0, 8.0])), ("b", array(vec![2.0, 3.0]))]);
        let tubes = div.pour(&slots).unwrap();
        assert_eq!(tubes["target"], array(vec![3.0, 2.0]));
        assert_eq!(tubes["remainder"], array(vec![1.0, 2.0]));
        assert_eq!(tubes["missing_vals"], array(vec![]));

        let back = div.pump(&tubes).unwrap();
        assert_eq!(back["a"], array(vec![7.0, 8.0]));
        assert_eq!(back["b"], array(vec![2.0, 3.0]));
    }

    #[test]
    fn mul_with_zero_scalar_recovers_the_lost_array_via_missing_vals() {
        let mul = Mul;
        let slots = sorted(vec![("a", Value::Float(0.0)), ("b", array(vec![1.0, 2.0, 3.0]))]);
        let tubes = mul.pour(&slots).unwrap();
        assert_eq!(tubes["target"], array(vec![0.0, 0.0, 0.0]));
        assert_eq!(tubes["a_is_smaller"], Value::Bool(true));
        assert_eq!(tubes["missing_vals"], array(vec![1.0, 2.0, 3.0]));

        let back = mul.pump(&tubes).unwrap();
        assert_eq!(back["a"], Value::Float(0.0));
        assert_eq!(back["b"], array(vec![1.0, 2.0, 3.0]));
    }

    #[test]
    fn div_by_zero_scalar_recovers_the_lost_dividend_via_missing_vals() {
        let div = Div;
        let slots = sorted(vec![("a", array(vec![5.0, 6.0])), ("b", Value::Float(0.0))]);
        let tubes = div.pour(&slots).unwrap();
        assert_eq!(tubes["target"], array(vec![0.0, 0.0]));
        assert_eq!(tubes["remainder"], array(vec![0.0, 0.0]));
        assert_eq!(tubes["missing_vals"], array(vec![5.0, 6.0]));

        let back = div.pump(&tubes).unwrap();
        assert_eq!(back["a"], array(vec![5.0, 6.0]));
        assert_eq!(back["b"], Value::Float(0.0));
    }

    #[test]
    fn clone_duplicates_and_reverses() {
        let c = Clone;
        let slots = sorted(vec![("a", array(vec![1.0, 2.0]))]);
        let tubes = c.pour(&slots).unwrap();
        assert_eq!(tubes["a"], tubes["b"]);
        let back = c.pump(&tubes).unwrap();
        assert_eq!(back["a"], array(vec![1.0, 2.0]));
    }
}
