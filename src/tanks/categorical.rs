//! Categorical ops (§4.4): `cat_to_index` and `one_hot`. Both emit a
//! `missing_vals` tube carrying the originals of any input outside the
//! mapping's domain, grounded on `tank_defs.py::cat_to_index`'s "maps to -1"
//! fallback.

use std::collections::BTreeMap;

use crate::error::{WaterworksError, WwResult};
use crate::tank::{TankOps, ValueMap};
use crate::value::{ArrayValue, Value};

/// Maps categorical strings to integer indices via a fixed dictionary. Values
/// outside the map get a `-1` placeholder on `target` and are recorded
/// verbatim, in order, on `missing_vals`; `missing_mask` marks which
/// positions those placeholders are, so a category the caller's own map
/// legitimately sends to `-1` doesn't get mistaken for a miss on `pump`.
#[derive(Debug, Clone)]
pub struct CatToIndex {
    pub cat_to_index_map: BTreeMap<String, i64>,
}

impl CatToIndex {
    pub fn new(cat_to_index_map: BTreeMap<String, i64>) -> Self {
        CatToIndex { cat_to_index_map }
    }

    fn index_to_cat(&self) -> BTreeMap<i64, String> {
        self.cat_to_index_map
            .iter()
            .map(|(c, i)| (*i, c.clone()))
            .collect()
    }
}

impl TankOps for CatToIndex {
    fn kind(&self) -> &'static str {
        "CatToIndex"
    }
    fn slot_keys(&self) -> &'static [&'static str] {
        &["cats"]
    }
    fn tube_keys(&self) -> &'static [&'static str] {
        &["target", "missing_vals", "missing_mask"]
    }
    fn pour(&self, slot_values: &ValueMap) -> WwResult<ValueMap> {
        let cats = match &slot_values["cats"] {
            Value::ArrayStr(a) => a.data.clone(),
            other => {
                return Err(WaterworksError::InvalidValue {
                    tank: "CatToIndex".to_string(),
                    slot: "cats".to_string(),
                    reason: format!("expected an array of strings, got {}", other.descriptor()),
                })
            }
        };
        let mut target = Vec::with_capacity(cats.len());
        let mut missing_vals = Vec::new();
        let mut missing_mask = Vec::with_capacity(cats.len());
        for cat in &cats {
            match self.cat_to_index_map.get(cat) {
                Some(&idx) => {
                    target.push(idx);
                    missing_mask.push(false);
                }
                None => {
                    target.push(-1);
                    missing_vals.push(cat.clone());
                    missing_mask.push(true);
                }
            }
        }
        let mut out = ValueMap::new();
        out.insert("target".to_string(), Value::ArrayI64(ArrayValue::vector(target)));
        out.insert(
            "missing_vals".to_string(),
            Value::ArrayStr(ArrayValue::vector(missing_vals)),
        );
        out.insert(
            "missing_mask".to_string(),
            Value::ArrayBool(ArrayValue::vector(missing_mask)),
        );
        Ok(out)
    }
    fn pump(&self, tube_values: &ValueMap) -> WwResult<ValueMap> {
        let target = match &tube_values["target"] {
            Value::ArrayI64(a) => a.data.clone(),
            other => {
                return Err(WaterworksError::InvalidValue {
                    tank: "CatToIndex".to_string(),
                    slot: "target".to_string(),
                    reason: format!("expected an array of i64, got {}", other.descriptor()),
                })
            }
        };
        let missing_vals = match &tube_values["missing_vals"] {
            Value::ArrayStr(a) => a.data.clone(),
            _ => Vec::new(),
        };
        let missing_mask = match &tube_values["missing_mask"] {
            Value::ArrayBool(a) => a.data.clone(),
            _ => vec![false; target.len()],
        };
        let index_to_cat = self.index_to_cat();
        let mut spare = missing_vals.into_iter();
        let cats: Vec<String> = target
            .into_iter()
            .zip(missing_mask)
            .map(|(idx, is_missing)| {
                if is_missing {
                    spare.next().unwrap_or_default()
                } else {
                    index_to_cat.get(&idx).cloned().unwrap_or_default()
                }
            })
            .collect();
        let mut out = ValueMap::new();
        out.insert("cats".to_string(), Value::ArrayStr(ArrayValue::vector(cats)));
        Ok(out)
    }
    fn clone_box(&self) -> Box<dyn TankOps> {
        Box::new(self.clone())
    }
}

/// One-hot encodes an array of non-negative indices against a fixed `depth`.
/// Indices `>= depth` (or negative) can't be represented and are recorded on
/// `missing_vals` in order, matching the "One-hot with miss" scenario (§8.3).
#[derive(Debug, Clone, Copy)]
pub struct OneHot {
    pub depth: usize,
}

impl OneHot {
    pub fn new(depth: usize) -> Self {
        OneHot { depth }
    }
}

impl TankOps for OneHot {
    fn kind(&self) -> &'static str {
        "OneHot"
    }
    fn slot_keys(&self) -> &'static [&'static str] {
        &["indices"]
    }
    fn tube_keys(&self) -> &'static [&'static str] {
        &["target", "missing_vals"]
    }
    fn pour(&self, slot_values: &ValueMap) -> WwResult<ValueMap> {
        let indices = match &slot_values["indices"] {
            Value::ArrayI64(a) => a.data.clone(),
            other => {
                return Err(WaterworksError::InvalidValue {
                    tank: "OneHot".to_string(),
                    slot: "indices".to_string(),
                    reason: format!("expected an array of i64, got {}", other.descriptor()),
                })
            }
        };
        let n = indices.len();
        let mut target = vec![0i64; n * self.depth];
        let mut missing_vals = Vec::new();
        for (row, &idx) in indices.iter().enumerate() {
            if idx >= 0 && (idx as usize) < self.depth {
                target[row * self.depth + idx as usize] = 1;
            } else {
                missing_vals.push(idx);
            }
        }
        let mut out = ValueMap::new();
        out.insert(
            "target".to_string(),
            Value::ArrayI64(ArrayValue::new(target, vec![n, self.depth])),
        );
        out.insert(
            "missing_vals".to_string(),
            Value::ArrayI64(ArrayValue::vector(missing_vals)),
        );
        Ok(out)
    }
    fn pump(&self, tube_values: &ValueMap) -> WwResult<ValueMap> {
        let target = match &tube_values["target"] {
            Value::ArrayI64(a) => a,
            other => {
                return Err(WaterworksError::InvalidValue {
                    tank: "OneHot".to_string(),
                    slot: "target".to_string(),
                    reason: format!("expected an array of i64, got {}", other.descriptor()),
                })
            }
        };
        let missing_vals = match &tube_values["missing_vals"] {
            Value::ArrayI64(a) => a.data.clone(),
            _ => Vec::new(),
        };
        let rows = target.shape.first().copied().unwrap_or(0);
        let mut spare = missing_vals.into_iter();
        let mut indices = Vec::with_capacity(rows);
        for row in 0..rows {
            let slice = &target.data[row * self.depth..(row + 1) * self.depth];
            match slice.iter().position(|&v| v == 1) {
                Some(col) => indices.push(col as i64),
                None => indices.push(spare.next().unwrap_or(-1)),
            }
        }
        let mut out = ValueMap::new();
        out.insert(
            "indices".to_string(),
            Value::ArrayI64(ArrayValue::vector(indices)),
        );
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
    fn cat_to_index_round_trips_a_category_legitimately_mapped_to_minus_one() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), -1i64);
        map.insert("b".to_string(), 7i64);
        let c = CatToIndex::new(map);

        let mut slots = ValueMap::new();
        slots.insert(
            "cats".to_string(),
            Value::ArrayStr(ArrayValue::vector(vec!["a".to_string(), "b".to_string(), "z".to_string()])),
        );
        let tubes = c.pour(&slots).unwrap();
        assert_eq!(tubes["target"].as_array_i64().unwrap().data, vec![-1, 7, -1]);
        assert_eq!(
            tubes["missing_mask"].as_array_bool().unwrap().data,
            vec![false, false, true]
        );
        assert_eq!(tubes["missing_vals"].as_array_str().unwrap().data, vec!["z".to_string()]);

        let back = c.pump(&tubes).unwrap();
        assert_eq!(
            back["cats"].as_array_str().unwrap().data,
            vec!["a".to_string(), "b".to_string(), "z".to_string()]
        );
    }

    #[test]
    fn one_hot_with_miss_matches_concrete_scenario() {
        let oh = OneHot::new(3);
        let mut slots = ValueMap::new();
        slots.insert(
            "indices".to_string(),
            Value::ArrayI64(ArrayValue::vector(vec![0, 1, 5])),
        );
        let tubes = oh.pour(&slots).unwrap();
        let target = tubes["target"].as_array_i64().unwrap();
        assert_eq!(target.shape, vec![3, 3]);
        assert_eq!(target.data, vec![1, 0, 0, 0, 1, 0, 0, 0, 0]);
        assert_eq!(
            tubes["missing_vals"].as_array_i64().unwrap().data,
            vec![5]
        );

        let back = oh.pump(&tubes).unwrap();
        assert_eq!(back["indices"].as_array_i64().unwrap().data, vec![0, 1, 5]);
    }
}
