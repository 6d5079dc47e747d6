//! Shared helpers for the tank catalog (§4.4): value coercion and the
//! broadcasting convention used by the binary arithmetic kinds.

use crate::error::{WaterworksError, WwResult};
use crate::value::{ArrayValue, Value};

/// Flattens any numeric `Value` (array or scalar) to a `Vec<f64>`. Scalars
/// become a single-element vector so the arithmetic kinds can treat "array op
/// scalar" and "array op array" uniformly.
pub fn to_f64_vec(tank: &str, slot: &str, v: &Value) -> WwResult<Vec<f64>> {
    match v {
        Value::ArrayF64(a) => Ok(a.data.clone()),
        Value::ArrayI64(a) => Ok(a.data.iter().map(|&x| x as f64).collect()),
        Value::ArrayBool(a) => Ok(a.data.iter().map(|&x| if x { 1.0 } else { 0.0 }).collect()),
        Value::Float(x) => Ok(vec![*x]),
        Value::Int(x) => Ok(vec![*x as f64]),
        Value::Bool(x) => Ok(vec![if *x { 1.0 } else { 0.0 }]),
        _ => Err(WaterworksError::InvalidValue {
            tank: tank.to_string(),
            slot: slot.to_string(),
            reason: format!("expected a numeric array or scalar, got {}", v.descriptor()),
        }),
    }
}

/// Rebuilds a `Value` in the same "array vs scalar" shape as `data`'s length
/// implies, defaulting to an array. Callers that need to preserve an original
/// scalar shape do so explicitly with [`scalar_or_array`].
pub fn array(data: Vec<f64>) -> Value {
    Value::ArrayF64(ArrayValue::vector(data))
}

/// Rebuilds a `Value` that was originally length-1 as a scalar `Float`, and
/// anything else as an array. Used when restoring an operand that pour
/// observed to be a broadcast scalar.
pub fn scalar_or_array(data: Vec<f64>) -> Value {
    if data.len() == 1 {
        Value::Float(data[0])
    } else {
        array(data)
    }
}

/// The broadcast length of two operands under the add/sub/mul/div convention
/// (§4.4): equal lengths, or one of length 1.
pub fn broadcast_len(tank: &str, a: &[f64], b: &[f64]) -> WwResult<usize> {
    match (a.len(), b.len()) {
        (x, y) if x == y => Ok(x),
        (1, y) => Ok(y),
        (x, 1) => Ok(x),
        _ => Err(WaterworksError::InvalidValue {
            tank: tank.to_string(),
            slot: "a/b".to_string(),
            reason: format!("cannot broadcast shapes of length {} and {}", a.len(), b.len()),
        }),
    }
}

/// Repeats a length-1 slice to `len`, or returns it unchanged if already `len`.
pub fn broadcast_to(v: &[f64], len: usize) -> Vec<f64> {
    if v.len() == len {
        v.to_vec()
    } else {
        vec![v[0]; len]
    }
}
