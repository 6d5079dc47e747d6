//! Array-shape ops (§4.4/§6): `concatenate`, `transpose`, `replace`,
//! `reduce`, the `boolean` family, and `logical_not`. `reduce` and `boolean`
//! both follow the catalog's stated trick of emitting the original operand(s)
//! verbatim as an auxiliary tube (`a`, or `a`/`b`), so `pump` is a literal
//! copy-back rather than a true mathematical inverse — reductions like `sum`
//! have no inverse in general, and the catalog documents exactly this aux
//! tube for that reason.

use crate::error::{WaterworksError, WwResult};
use crate::tank::{TankOps, ValueMap};
use crate::value::{ArrayValue, Value};

/// Masked element substitution, generic over the array element type so
/// [`Replace`] can work on any of `Value`'s array variants (numeric, string,
/// datetime, ...) the way the original's dtype-agnostic array replace does.
/// `replace_with` broadcasts if it has exactly one element.
fn replace_elements<T: Clone>(a: &[T], mask: &[bool], replace_with: &[T]) -> (Vec<T>, Vec<T>) {
    let mut target = a.to_vec();
    let mut replaced_vals = Vec::new();
    let mut rep_idx = 0usize;
    for (i, &m) in mask.iter().enumerate() {
        if m {
            replaced_vals.push(a[i].clone());
            let rep = if replace_with.len() == 1 {
                replace_with[0].clone()
            } else {
                let v = replace_with[rep_idx].clone();
                rep_idx += 1;
                v
            };
            target[i] = rep;
        }
    }
    (target, replaced_vals)
}

/// Inverse of [`replace_elements`]: restores the original values at `mask`'s
/// `true` positions from `replaced_vals`, and reports what `replace_with` must
/// have been (in case it wasn't a broadcast scalar).
fn unreplace_elements<T: Clone>(target: &[T], mask: &[bool], replaced_vals: &[T]) -> (Vec<T>, Vec<T>) {
    let mut a = target.to_vec();
    let mut replace_with = Vec::new();
    let mut rvi = 0usize;
    for (i, &m) in mask.iter().enumerate() {
        if m {
            a[i] = replaced_vals[rvi].clone();
            replace_with.push(target[i].clone());
            rvi += 1;
        }
    }
    (a, replace_with)
}

fn invalid(tank: &str, slot: &str, reason: impl Into<String>) -> WaterworksError {
    WaterworksError::InvalidValue {
        tank: tank.to_string(),
        slot: slot.to_string(),
        reason: reason.into(),
    }
}

fn as_f64_array<'a>(tank: &str, slot: &str, v: &'a Value) -> WwResult<&'a ArrayValue<f64>> {
    match v {
        Value::ArrayF64(a) => Ok(a),
        other => Err(invalid(tank, slot, format!("expected an f64 array, got {}", other.descriptor()))),
    }
}

/// Flattens a list of 1-D arrays into one, recording each input's boundary
/// index so `pump` can split `target` back into the original pieces.
#[derive(Debug, Clone, Copy, Default)]
pub struct Concatenate;

impl TankOps for Concatenate {
    fn kind(&self) -> &'static str {
        "Concatenate"
    }
    fn slot_keys(&self) -> &'static [&'static str] {
        &["a_list", "axis"]
    }
    fn tube_keys(&self) -> &'static [&'static str] {
        &["target", "indices", "axis", "dtypes"]
    }
    fn pour(&self, slot_values: &ValueMap) -> WwResult<ValueMap> {
        let items = match &slot_values["a_list"] {
            Value::Sequence(items) => items,
            other => return Err(invalid("Concatenate", "a_list", format!("expected a sequence of arrays, got {}", other.descriptor()))),
        };
        let axis = slot_values.get("axis").cloned().ok_or_else(|| invalid("Concatenate", "axis", "required slot had no value"))?;
        let mut target = Vec::new();
        let mut indices = Vec::with_capacity(items.len());
        let mut dtypes = Vec::with_capacity(items.len());
        for item in items {
            let arr = as_f64_array("Concatenate", "a_list", item)?;
            target.extend_from_slice(&arr.data);
            indices.push(target.len() as i64);
            dtypes.push(Value::Str(item.descriptor().to_string()));
        }
        let mut out = ValueMap::new();
        out.insert("target".to_string(), Value::ArrayF64(ArrayValue::vector(target)));
        out.insert("indices".to_string(), Value::ArrayI64(ArrayValue::vector(indices)));
        out.insert("axis".to_string(), axis);
        out.insert("dtypes".to_string(), Value::Sequence(dtypes));
        Ok(out)
    }
    fn pump(&self, tube_values: &ValueMap) -> WwResult<ValueMap> {
        let target = as_f64_array("Concatenate", "target", &tube_values["target"])?;
        let indices = match &tube_values["indices"] {
            Value::ArrayI64(a) => &a.data,
            other => return Err(invalid("Concatenate", "indices", format!("expected an i64 array, got {}", other.descriptor()))),
        };
        let mut pieces = Vec::with_capacity(indices.len());
        let mut start = 0usize;
        for &end in indices {
            let end = end as usize;
            pieces.push(Value::ArrayF64(ArrayValue::vector(target.data[start..end].to_vec())));
            start = end;
        }
        let mut out = ValueMap::new();
        out.insert("a_list".to_string(), Value::Sequence(pieces));
        out.insert("axis".to_string(), tube_values["axis"].clone());
        Ok(out)
    }
    fn clone_box(&self) -> Box<dyn TankOps> {
        Box::new(*self)
    }
}

/// Transposes a 2-D array. `axes` (the permutation) is recorded so `pump` can
/// apply its inverse.
#[derive(Debug, Clone, Copy, Default)]
pub struct Transpose;

fn transpose_2d(data: &[f64], rows: usize, cols: usize) -> Vec<f64> {
    let mut out = vec![0.0; data.len()];
    for r in 0..rows {
        for c in 0..cols {
            out[c * rows + r] = data[r * cols + c];
        }
    }
    out
}

impl TankOps for Transpose {
    fn kind(&self) -> &'static str {
        "Transpose"
    }
    fn slot_keys(&self) -> &'static [&'static str] {
        &["a", "axes"]
    }
    fn tube_keys(&self) -> &'static [&'static str] {
        &["target", "axes"]
    }
    fn pour(&self, slot_values: &ValueMap) -> WwResult<ValueMap> {
        let a = as_f64_array("Transpose", "a", &slot_values["a"])?;
        if a.shape.len() != 2 {
            return Err(invalid("Transpose", "a", "only 2-D arrays are supported"));
        }
        let (rows, cols) = (a.shape[0], a.shape[1]);
        let transposed = transpose_2d(&a.data, rows, cols);
        let axes = slot_values["axes"].clone();
        let mut out = ValueMap::new();
        out.insert(
            "target".to_string(),
            Value::ArrayF64(ArrayValue::new(transposed, vec![cols, rows])),
        );
        out.insert("axes".to_string(), axes);
        Ok(out)
    }
    fn pump(&self, tube_values: &ValueMap) -> WwResult<ValueMap> {
        let target = as_f64_array("Transpose", "target", &tube_values["target"])?;
        let (rows, cols) = (target.shape[0], target.shape[1]);
        let original = transpose_2d(&target.data, rows, cols);
        let mut out = ValueMap::new();
        out.insert(
            "a".to_string(),
            Value::ArrayF64(ArrayValue::new(original, vec![cols, rows])),
        );
        out.insert("axes".to_string(), tube_values["axes"].clone());
        Ok(out)
    }
    fn clone_box(&self) -> Box<dyn TankOps> {
        Box::new(*self)
    }
}

/// Replaces every element of `a` where `mask` is true with `replace_with`
/// (broadcast if length 1), recording the replaced originals so `pump` can
/// restore them. Dtype-agnostic, like the original's array replace: `a` may
/// be any of `Value`'s array variants, so long as `replace_with` matches.
#[derive(Debug, Clone, Copy, Default)]
pub struct Replace;

fn replace_mask(v: &Value, tank: &str, slot: &str) -> WwResult<&[bool]> {
    match v {
        Value::ArrayBool(m) => Ok(&m.data),
        other => Err(invalid(tank, slot, format!("expected a bool array, got {}", other.descriptor()))),
    }
}

impl TankOps for Replace {
    fn kind(&self) -> &'static str {
        "Replace"
    }
    fn slot_keys(&self) -> &'static [&'static str] {
        &["a", "mask", "replace_with"]
    }
    fn tube_keys(&self) -> &'static [&'static str] {
        &["target", "replaced_vals", "mask", "replace_with_shape"]
    }
    fn pour(&self, slot_values: &ValueMap) -> WwResult<ValueMap> {
        let mask = replace_mask(&slot_values["mask"], "Replace", "mask")?.to_vec();
        let replace_with = &slot_values["replace_with"];

        let (target, replaced_vals, replace_with_shape) = match (&slot_values["a"], replace_with) {
            (Value::ArrayF64(a), Value::ArrayF64(r)) => {
                let (t, rv) = replace_elements(&a.data, &mask, &r.data);
                (Value::ArrayF64(ArrayValue::new(t, a.shape.clone())), Value::ArrayF64(ArrayValue::vector(rv)), r.shape.clone())
            }
            (Value::ArrayI64(a), Value::ArrayI64(r)) => {
                let (t, rv) = replace_elements(&a.data, &mask, &r.data);
                (Value::ArrayI64(ArrayValue::new(t, a.shape.clone())), Value::ArrayI64(ArrayValue::vector(rv)), r.shape.clone())
            }
            (Value::ArrayStr(a), Value::ArrayStr(r)) => {
                let (t, rv) = replace_elements(&a.data, &mask, &r.data);
                (Value::ArrayStr(ArrayValue::new(t, a.shape.clone())), Value::ArrayStr(ArrayValue::vector(rv)), r.shape.clone())
            }
            (Value::ArrayDateTime(a), Value::ArrayDateTime(r)) => {
                let (t, rv) = replace_elements(&a.data, &mask, &r.data);
                (Value::ArrayDateTime(ArrayValue::new(t, a.shape.clone())), Value::ArrayDateTime(ArrayValue::vector(rv)), r.shape.clone())
            }
            (a, _) => {
                return Err(invalid(
                    "Replace",
                    "a",
                    format!("unsupported or mismatched dtype for replace: {}", a.descriptor()),
                ))
            }
        };

        let mut out = ValueMap::new();
        out.insert("target".to_string(), target);
        out.insert("replaced_vals".to_string(), replaced_vals);
        out.insert("mask".to_string(), Value::ArrayBool(ArrayValue::vector(mask)));
        out.insert(
            "replace_with_shape".to_string(),
            Value::ArrayI64(ArrayValue::vector(replace_with_shape.iter().map(|&x| x as i64).collect())),
        );
        Ok(out)
    }
    fn pump(&self, tube_values: &ValueMap) -> WwResult<ValueMap> {
        let mask = replace_mask(&tube_values["mask"], "Replace", "mask")?.to_vec();
        let replace_with_shape: Vec<usize> = match &tube_values["replace_with_shape"] {
            Value::ArrayI64(a) => a.data.iter().map(|&x| x as usize).collect(),
            other => return Err(invalid("Replace", "replace_with_shape", format!("expected an i64 array, got {}", other.descriptor()))),
        };

        let (a, replace_with) = match (&tube_values["target"], &tube_values["replaced_vals"]) {
            (Value::ArrayF64(t), Value::ArrayF64(rv)) => {
                let (a, rw) = unreplace_elements(&t.data, &mask, &rv.data);
                (Value::ArrayF64(ArrayValue::new(a, t.shape.clone())), Value::ArrayF64(ArrayValue::new(rw, replace_with_shape)))
            }
            (Value::ArrayI64(t), Value::ArrayI64(rv)) => {
                let (a, rw) = unreplace_elements(&t.data, &mask, &rv.data);
                (Value::ArrayI64(ArrayValue::new(a, t.shape.clone())), Value::ArrayI64(ArrayValue::new(rw, replace_with_shape)))
            }
            (Value::ArrayStr(t), Value::ArrayStr(rv)) => {
                let (a, rw) = unreplace_elements(&t.data, &mask, &rv.data);
                (Value::ArrayStr(ArrayValue::new(a, t.shape.clone())), Value::ArrayStr(ArrayValue::new(rw, replace_with_shape)))
            }
            (Value::ArrayDateTime(t), Value::ArrayDateTime(rv)) => {
                let (a, rw) = unreplace_elements(&t.data, &mask, &rv.data);
                (Value::ArrayDateTime(ArrayValue::new(a, t.shape.clone())), Value::ArrayDateTime(ArrayValue::new(rw, replace_with_shape)))
            }
            (t, _) => {
                return Err(invalid(
                    "Replace",
                    "target",
                    format!("unsupported or mismatched dtype for replace: {}", t.descriptor()),
                ))
            }
        };

        let mut out = ValueMap::new();
        out.insert("a".to_string(), a);
        out.insert("mask".to_string(), Value::ArrayBool(ArrayValue::vector(mask)));
        out.insert("replace_with".to_string(), replace_with);
        Ok(out)
    }
    fn clone_box(&self) -> Box<dyn TankOps> {
        Box::new(*self)
    }
}

/// Which reduction `Reduce` applies. `pump` ignores the choice entirely: the
/// `a` aux tube already holds the un-reduced input (§6's "reduce" row).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    Max,
    Min,
    Sum,
    Mean,
    Std,
}

#[derive(Debug, Clone, Copy)]
pub struct Reduce {
    pub op: ReduceOp,
}

impl Reduce {
    pub fn new(op: ReduceOp) -> Self {
        Reduce { op }
    }
}

impl TankOps for Reduce {
    fn kind(&self) -> &'static str {
        "Reduce"
    }
    fn slot_keys(&self) -> &'static [&'static str] {
        &["a", "axis"]
    }
    fn tube_keys(&self) -> &'static [&'static str] {
        &["target", "a", "axis"]
    }
    fn pour(&self, slot_values: &ValueMap) -> WwResult<ValueMap> {
        let a = as_f64_array("Reduce", "a", &slot_values["a"])?;
        let axis = slot_values.get("axis").cloned().ok_or_else(|| invalid("Reduce", "axis", "required slot had no value"))?;
        let n = a.data.len() as f64;
        let mean = a.data.iter().sum::<f64>() / n;
        let value = match self.op {
            ReduceOp::Max => a.data.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            ReduceOp::Min => a.data.iter().cloned().fold(f64::INFINITY, f64::min),
            ReduceOp::Sum => a.data.iter().sum(),
            ReduceOp::Mean => mean,
            ReduceOp::Std => {
                let var = a.data.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / n;
                var.sqrt()
            }
        };
        let mut out = ValueMap::new();
        out.insert("target".to_string(), Value::Float(value));
        out.insert("a".to_string(), slot_values["a"].clone());
        out.insert("axis".to_string(), axis);
        Ok(out)
    }
    fn pump(&self, tube_values: &ValueMap) -> WwResult<ValueMap> {
        let mut out = ValueMap::new();
        out.insert("a".to_string(), tube_values["a"].clone());
        out.insert("axis".to_string(), tube_values["axis"].clone());
        Ok(out)
    }
    fn clone_box(&self) -> Box<dyn TankOps> {
        Box::new(*self)
    }
}

/// Which comparison `Boolean` applies. `equal`/`greater`/`less` take two
/// operands; `isnan` takes one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BooleanOp {
    Equal,
    Greater,
    Less,
    IsNan,
}

#[derive(Debug, Clone, Copy)]
pub struct Boolean {
    pub op: BooleanOp,
}

impl Boolean {
    pub fn new(op: BooleanOp) -> Self {
        Boolean { op }
    }

    fn is_binary(&self) -> bool {
        self.op != BooleanOp::IsNan
    }
}

impl TankOps for Boolean {
    fn kind(&self) -> &'static str {
        "Boolean"
    }
    fn slot_keys(&self) -> &'static [&'static str] {
        &["a", "b"]
    }
    fn tube_keys(&self) -> &'static [&'static str] {
        &["target", "a", "b"]
    }
    fn pour(&self, slot_values: &ValueMap) -> WwResult<ValueMap> {
        let a = as_f64_array("Boolean", "a", &slot_values["a"])?;
        let mut out = ValueMap::new();
        let target: Vec<bool> = if self.is_binary() {
            let b = as_f64_array("Boolean", "b", &slot_values["b"])?;
            a.data
                .iter()
                .zip(&b.data)
                .map(|(&x, &y)| match self.op {
                    BooleanOp::Equal => x == y,
                    BooleanOp::Greater => x > y,
                    BooleanOp::Less => x < y,
                    BooleanOp::IsNan => unreachable!(),
                })
                .collect()
        } else {
            a.data.iter().map(|x| x.is_nan()).collect()
        };
        out.insert("target".to_string(), Value::ArrayBool(ArrayValue::new(target, a.shape.clone())));
        out.insert("a".to_string(), slot_values["a"].clone());
        if self.is_binary() {
            out.insert("b".to_string(), slot_values["b"].clone());
        }
        Ok(out)
    }
    fn pump(&self, tube_values: &ValueMap) -> WwResult<ValueMap> {
        let mut out = ValueMap::new();
        out.insert("a".to_string(), tube_values["a"].clone());
        if self.is_binary() {
            out.insert("b".to_string(), tube_values["b"].clone());
        }
        Ok(out)
    }
    fn clone_box(&self) -> Box<dyn TankOps> {
        Box::new(*self)
    }
}

/// Self-inverse: `not(not(x)) == x`, so `pump` is just another `not`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogicalNot;

impl TankOps for LogicalNot {
    fn kind(&self) -> &'static str {
        "LogicalNot"
    }
    fn slot_keys(&self) -> &'static [&'static str] {
        &["a"]
    }
    fn tube_keys(&self) -> &'static [&'static str] {
        &["target"]
    }
    fn pour(&self, slot_values: &ValueMap) -> WwResult<ValueMap> {
        let a = match &slot_values["a"] {
            Value::ArrayBool(a) => a,
            other => return Err(invalid("LogicalNot", "a", format!("expected a bool array, got {}", other.descriptor()))),
        };
        let target: Vec<bool> = a.data.iter().map(|&x| !x).collect();
        let mut out = ValueMap::new();
        out.insert("target".to_string(), Value::ArrayBool(ArrayValue::new(target, a.shape.clone())));
        Ok(out)
    }
    fn pump(&self, tube_values: &ValueMap) -> WwResult<ValueMap> {
        let target = match &tube_values["target"] {
            Value::ArrayBool(a) => a,
            other => return Err(invalid("LogicalNot", "target", format!("expected a bool array, got {}", other.descriptor()))),
        };
        let a: Vec<bool> = target.data.iter().map(|&x| !x).collect();
        let mut out = ValueMap::new();
        out.insert("a".to_string(), Value::ArrayBool(ArrayValue::new(a, target.shape.clone())));
        Ok(out)
    }
    fn clone_box(&self) -> Box<dyn TankOps> {
        Box::new(*self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transpose_is_its_own_inverse_on_2d() {
        let t = Transpose;
        let mut slots = ValueMap::new();
        slots.insert("a".to_string(), Value::ArrayF64(ArrayValue::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3])));
        slots.insert("axes".to_string(), Value::Tuple(vec![Value::Int(1), Value::Int(0)]));
        let tubes = t.pour(&slots).unwrap();
        let back = t.pump(&tubes).unwrap();
        assert_eq!(back["a"], slots["a"]);
    }

    #[test]
    fn logical_not_round_trips() {
        let n = LogicalNot;
        let mut slots = ValueMap::new();
        slots.insert("a".to_string(), Value::ArrayBool(ArrayValue::vector(vec![true, false, true])));
        let tubes = n.pour(&slots).unwrap();
        let back = n.pump(&tubes).unwrap();
        assert_eq!(back["a"], slots["a"]);
    }

    #[test]
    fn replace_round_trips_on_datetime_array_with_broadcast_fill() {
        use chrono::{NaiveDate, NaiveDateTime};

        fn d(y: i32, m: u32, day: u32) -> NaiveDateTime {
            NaiveDate::from_ymd_opt(y, m, day).unwrap().and_hms_opt(0, 0, 0).unwrap()
        }

        let r = Replace;
        let mut slots = ValueMap::new();
        slots.insert(
            "a".to_string(),
            Value::ArrayDateTime(ArrayValue::vector(vec![Some(d(2020, 1, 1)), None, Some(d(2020, 1, 3))])),
        );
        slots.insert("mask".to_string(), Value::ArrayBool(ArrayValue::vector(vec![false, true, false])));
        slots.insert(
            "replace_with".to_string(),
            Value::ArrayDateTime(ArrayValue::vector(vec![Some(d(1970, 1, 1))])),
        );

        let tubes = r.pour(&slots).unwrap();
        let target = tubes["target"].as_array_datetime().unwrap();
        assert_eq!(target.data, vec![Some(d(2020, 1, 1)), Some(d(1970, 1, 1)), Some(d(2020, 1, 3))]);

        let back = r.pump(&tubes).unwrap();
        assert_eq!(back["a"], slots["a"]);
    }
}
