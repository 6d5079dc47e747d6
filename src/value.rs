//! The data model: [`Value`] and its two-part [`Descriptor`] (§3).
//!
//! The engine treats tank arithmetic as opaque (§1); what it does need is enough of
//! a value representation to infer descriptors, mirror values along edges, and let
//! the catalog (`crate::tanks`) implement concrete primitives. Arrays are flat
//! `Vec<T>` plus a shape, matching the "multidimensional array" `val_type` of §3
//! without pulling in a numerical-library dependency (§1 leaves that out of scope).

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;

/// The container kind of a [`Value`], per §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValType {
    Array,
    ScalarInt,
    ScalarFloat,
    ScalarString,
    ScalarBool,
    Mapping,
    Tuple,
    Sequence,
    Function,
}

impl fmt::Display for ValType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValType::Array => "array",
            ValType::ScalarInt => "scalar_int",
            ValType::ScalarFloat => "scalar_float",
            ValType::ScalarString => "scalar_string",
            ValType::ScalarBool => "scalar_bool",
            ValType::Mapping => "mapping",
            ValType::Tuple => "tuple",
            ValType::Sequence => "sequence",
            ValType::Function => "function",
        };
        f.write_str(s)
    }
}

/// The element kind of an array `Value`. Only meaningful when `val_type = Array`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValDtype {
    F64,
    I64,
    Bool,
    Str,
    DateTime,
}

impl fmt::Display for ValDtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValDtype::F64 => "f64",
            ValDtype::I64 => "i64",
            ValDtype::Bool => "bool",
            ValDtype::Str => "str",
            ValDtype::DateTime => "datetime",
        };
        f.write_str(s)
    }
}

/// `(val_type, val_dtype)` as described in §3. `val_dtype` is `None` for every
/// non-array `val_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Descriptor {
    pub val_type: ValType,
    pub val_dtype: Option<ValDtype>,
}

impl Descriptor {
    pub fn array(dtype: ValDtype) -> Self {
        Descriptor {
            val_type: ValType::Array,
            val_dtype: Some(dtype),
        }
    }

    pub fn scalar(val_type: ValType) -> Self {
        debug_assert!(val_type != ValType::Array);
        Descriptor {
            val_type,
            val_dtype: None,
        }
    }

    /// Whether `self` is compatible as a tube descriptor feeding a slot declaring
    /// `other`. Descriptors must match exactly; the engine does no coercion.
    pub fn compatible_with(&self, other: &Descriptor) -> bool {
        self == other
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.val_dtype {
            Some(dtype) => write!(f, "{}<{}>", self.val_type, dtype),
            None => write!(f, "{}", self.val_type),
        }
    }
}

/// A flat, row-major array value: `data.len() == shape.iter().product()`.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayValue<T> {
    pub data: Vec<T>,
    pub shape: Vec<usize>,
}

impl<T> ArrayValue<T> {
    pub fn new(data: Vec<T>, shape: Vec<usize>) -> Self {
        ArrayValue { data, shape }
    }

    /// A 1-D array built directly from a `Vec`.
    pub fn vector(data: Vec<T>) -> Self {
        let len = data.len();
        ArrayValue {
            data,
            shape: vec![len],
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// The payload the engine mirrors along slot/tube edges (§3's "Value").
///
/// This is intentionally a closed, opaque-to-the-engine enum: the graph engine
/// never matches on a `Value`'s contents, only on its [`Descriptor`] (via
/// [`Value::descriptor`]). Concrete tanks (`crate::tanks`) do the real work.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    ArrayF64(ArrayValue<f64>),
    ArrayI64(ArrayValue<i64>),
    ArrayBool(ArrayValue<bool>),
    ArrayStr(ArrayValue<String>),
    /// `None` entries stand in for "not a time" (NaT), mirroring the Python
    /// source's use of `numpy.datetime64('NaT')`.
    ArrayDateTime(ArrayValue<Option<NaiveDateTime>>),
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Map(BTreeMap<String, Value>),
    Tuple(Vec<Value>),
    Sequence(Vec<Value>),
}

impl Value {
    /// Infers the `(val_type, val_dtype)` descriptor of a value. §9's "dynamic
    /// argument typing → explicit descriptor inference" design note: this is the
    /// one inference routine, called once per slot/tube and cached by the caller.
    pub fn descriptor(&self) -> Descriptor {
        match self {
            Value::ArrayF64(_) => Descriptor::array(ValDtype::F64),
            Value::ArrayI64(_) => Descriptor::array(ValDtype::I64),
            Value::ArrayBool(_) => Descriptor::array(ValDtype::Bool),
            Value::ArrayStr(_) => Descriptor::array(ValDtype::Str),
            Value::ArrayDateTime(_) => Descriptor::array(ValDtype::DateTime),
            Value::Int(_) => Descriptor::scalar(ValType::ScalarInt),
            Value::Float(_) => Descriptor::scalar(ValType::ScalarFloat),
            Value::Str(_) => Descriptor::scalar(ValType::ScalarString),
            Value::Bool(_) => Descriptor::scalar(ValType::ScalarBool),
            Value::Map(_) => Descriptor::scalar(ValType::Mapping),
            Value::Tuple(_) => Descriptor::scalar(ValType::Tuple),
            Value::Sequence(_) => Descriptor::scalar(ValType::Sequence),
        }
    }

    pub fn as_array_f64(&self) -> Option<&ArrayValue<f64>> {
        match self {
            Value::ArrayF64(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_array_i64(&self) -> Option<&ArrayValue<i64>> {
        match self {
            Value::ArrayI64(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_array_bool(&self) -> Option<&ArrayValue<bool>> {
        match self {
            Value::ArrayBool(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_array_str(&self) -> Option<&ArrayValue<String>> {
        match self {
            Value::ArrayStr(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_array_datetime(&self) -> Option<&ArrayValue<Option<NaiveDateTime>>> {
        match self {
            Value::ArrayDateTime(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::Sequence(v) => Some(v),
            _ => None,
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::ArrayF64(ArrayValue::vector(v))
    }
}

impl From<Vec<i64>> for Value {
    fn from(v: Vec<i64>) -> Self {
        Value::ArrayI64(ArrayValue::vector(v))
    }
}

impl From<Vec<bool>> for Value {
    fn from(v: Vec<bool>) -> Self {
        Value::ArrayBool(ArrayValue::vector(v))
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Value::ArrayStr(ArrayValue::vector(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_of_array_carries_dtype() {
        let v: Value = vec![1.0, 2.0, 3.0].into();
        let d = v.descriptor();
        assert_eq!(d.val_type, ValType::Array);
        assert_eq!(d.val_dtype, Some(ValDtype::F64));
    }

    #[test]
    fn descriptor_of_scalar_has_no_dtype() {
        let v = Value::Int(3);
        let d = v.descriptor();
        assert_eq!(d.val_type, ValType::ScalarInt);
        assert_eq!(d.val_dtype, None);
    }

    #[test]
    fn compatible_descriptors_require_exact_match() {
        let a = Descriptor::array(ValDtype::F64);
        let b = Descriptor::array(ValDtype::I64);
        assert!(!a.compatible_with(&b));
        assert!(a.compatible_with(&Descriptor::array(ValDtype::F64)));
    }
}
