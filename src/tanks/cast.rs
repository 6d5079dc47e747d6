//! `Cast` (§4.4, "Cast" idiom): converts an array between `f64` and `i64`,
//! carrying the precision lost in the round-trip on a `diff` tube so `pump`
//! can restore it exactly. Grounded on `tank_defs.py::cast`, which selects a
//! target dtype and records `input_dtype` for the return trip.

use crate::error::WwResult;
use crate::tank::{TankOps, ValueMap};
use crate::value::{ArrayValue, ValDtype, Value};

/// The two dtypes `Cast` knows how to convert between. Other combinations are
/// identity casts (`diff` all zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastTarget {
    ToI64,
    ToF64,
}

#[derive(Debug, Clone, Copy)]
pub struct Cast {
    pub target: CastTarget,
}

impl Cast {
    pub fn new(target: CastTarget) -> Self {
        Cast { target }
    }
}

impl TankOps for Cast {
    fn kind(&self) -> &'static str {
        "Cast"
    }
    fn slot_keys(&self) -> &'static [&'static str] {
        &["a", "dtype"]
    }
    fn tube_keys(&self) -> &'static [&'static str] {
        &["target", "input_dtype", "diff", "dtype"]
    }
    fn pour(&self, slot_values: &ValueMap) -> WwResult<ValueMap> {
        let a = &slot_values["a"];
        let dtype = slot_values
            .get("dtype")
            .cloned()
            .ok_or_else(|| crate::error::WaterworksError::InvalidValue {
                tank: "Cast".to_string(),
                slot: "dtype".to_string(),
                reason: "required slot had no value".to_string(),
            })?;
        let mut out = ValueMap::new();
        match (self.target, a) {
            (CastTarget::ToI64, Value::ArrayF64(arr)) => {
                let rounded: Vec<i64> = arr.data.iter().map(|&x| x.round() as i64).collect();
                let diff: Vec<f64> = arr
                    .data
                    .iter()
                    .zip(&rounded)
                    .map(|(&x, &r)| x - r as f64)
                    .collect();
                out.insert(
                    "target".to_string(),
                    Value::ArrayI64(ArrayValue::new(rounded, arr.shape.clone())),
                );
                out.insert(
                    "input_dtype".to_string(),
                    Value::Str(ValDtype::F64.to_string()),
                );
                out.insert(
                    "diff".to_string(),
                    Value::ArrayF64(ArrayValue::new(diff, arr.shape.clone())),
                );
            }
            (CastTarget::ToF64, Value::ArrayI64(arr)) => {
                let floats: Vec<f64> = arr.data.iter().map(|&x| x as f64).collect();
                out.insert(
                    "target".to_string(),
                    Value::ArrayF64(ArrayValue::new(floats, arr.shape.clone())),
                );
                out.insert(
                    "input_dtype".to_string(),
                    Value::Str(ValDtype::I64.to_string()),
                );
                out.insert(
                    "diff".to_string(),
                    Value::ArrayI64(ArrayValue::new(vec![0; arr.data.len()], arr.shape.clone())),
                );
            }
            _ => {
                return Err(crate::error::WaterworksError::InvalidValue {
                    tank: "Cast".to_string(),
                    slot: "a".to_string(),
                    reason: format!("cannot cast {} to {:?}", a.descriptor(), self.target),
                })
            }
        }
        out.insert("dtype".to_string(), dtype);
        Ok(out)
    }
    fn pump(&self, tube_values: &ValueMap) -> WwResult<ValueMap> {
        let mut out = ValueMap::new();
        out.insert("dtype".to_string(), tube_values["dtype"].clone());
        let a = match (&tube_values["target"], &tube_values["diff"]) {
            (Value::ArrayI64(rounded), Value::ArrayF64(diff)) => {
                let restored: Vec<f64> = rounded
                    .data
                    .iter()
                    .zip(&diff.data)
                    .map(|(&r, &d)| r as f64 + d)
                    .collect();
                Value::ArrayF64(ArrayValue::new(restored, rounded.shape.clone()))
            }
            (Value::ArrayF64(floats), Value::ArrayI64(_)) => {
                let restored: Vec<i64> = floats.data.iter().map(|&x| x.round() as i64).collect();
                Value::ArrayI64(ArrayValue::new(restored, floats.shape.clone()))
            }
            (target, _) => target.clone(),
        };
        out.insert("a".to_string(), a);
        Ok(out)
    }
    fn clone_box(&self) -> Box<dyn TankOps> {
        Box::new(*self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ArrayValue;

    #[test]
    fn cast_to_i64_round_trips_via_diff() {
        let cast = Cast::new(CastTarget::ToI64);
        let mut slots = ValueMap::new();
        slots.insert(
            "a".to_string(),
            Value::ArrayF64(ArrayValue::vector(vec![1.2, 2.7, -0.4])),
        );
        slots.insert("dtype".to_string(), Value::Str(ValDtype::I64.to_string()));
        let tubes = cast.pour(&slots).unwrap();
        let back = cast.pump(&tubes).unwrap();
        assert_eq!(back["dtype"], Value::Str(ValDtype::I64.to_string()));
        match &back["a"] {
            Value::ArrayF64(a) => {
                for (got, want) in a.data.iter().zip([1.2, 2.7, -0.4]) {
                    assert!((got - want).abs() < 1e-9);
                }
            }
            other => panic!("expected ArrayF64, got {:?}", other),
        }
    }
}
