//! `datetime_to_num` (§4.4/§6) and the `IsNat` helper the datetime transform
//! composes it with. Converts a `NaiveDateTime` array to a count of
//! `num_units * time_unit`-sized buckets since `zero_datetime`, carrying the
//! sub-unit remainder on `diff` so `pump` recovers the original instant
//! exactly (to nanosecond precision). `NaT` entries (`None`) pour to `NaN`
//! and pump back to `None`.

use chrono::{Duration, NaiveDateTime};

use crate::error::{WaterworksError, WwResult};
use crate::tank::{TankOps, ValueMap};
use crate::value::{ArrayValue, Value};

/// The unit `num_units` counts in, per §4.5's `time_unit ∈ {D,h,m,s,ms,...}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Days,
    Hours,
    Minutes,
    Seconds,
    Milliseconds,
}

impl TimeUnit {
    pub fn seconds_per_unit(self) -> f64 {
        match self {
            TimeUnit::Days => 86_400.0,
            TimeUnit::Hours => 3_600.0,
            TimeUnit::Minutes => 60.0,
            TimeUnit::Seconds => 1.0,
            TimeUnit::Milliseconds => 0.001,
        }
    }
}

fn invalid(tank: &str, slot: &str, reason: impl Into<String>) -> WaterworksError {
    WaterworksError::InvalidValue {
        tank: tank.to_string(),
        slot: slot.to_string(),
        reason: reason.into(),
    }
}

pub(crate) fn total_seconds(dt: NaiveDateTime, zero: NaiveDateTime) -> f64 {
    let delta = dt - zero;
    delta.num_nanoseconds().unwrap_or(0) as f64 / 1e9
}

#[derive(Debug, Clone, Copy)]
pub struct DatetimeToNum {
    pub zero_datetime: NaiveDateTime,
    pub num_units: i64,
    pub time_unit: TimeUnit,
}

impl DatetimeToNum {
    pub fn new(zero_datetime: NaiveDateTime, num_units: i64, time_unit: TimeUnit) -> Self {
        DatetimeToNum {
            zero_datetime,
            num_units,
            time_unit,
        }
    }

    fn unit_seconds(&self) -> f64 {
        self.num_units as f64 * self.time_unit.seconds_per_unit()
    }
}

impl TankOps for DatetimeToNum {
    fn kind(&self) -> &'static str {
        "DatetimeToNum"
    }
    fn slot_keys(&self) -> &'static [&'static str] {
        &["a"]
    }
    fn tube_keys(&self) -> &'static [&'static str] {
        &["target", "diff", "zero_datetime", "num_units", "time_unit"]
    }
    fn pour(&self, slot_values: &ValueMap) -> WwResult<ValueMap> {
        let a = match &slot_values["a"] {
            Value::ArrayDateTime(a) => a,
            other => {
                return Err(invalid(
                    "DatetimeToNum",
                    "a",
                    format!("expected a datetime array, got {}", other.descriptor()),
                ))
            }
        };
        let unit_seconds = self.unit_seconds();
        let mut target = Vec::with_capacity(a.data.len());
        let mut diff = Vec::with_capacity(a.data.len());
        for dt in &a.data {
            match dt {
                Some(dt) => {
                    let secs = total_seconds(*dt, self.zero_datetime);
                    let units = (secs / unit_seconds).floor();
                    target.push(units);
                    diff.push(secs - units * unit_seconds);
                }
                None => {
                    target.push(f64::NAN);
                    diff.push(f64::NAN);
                }
            }
        }
        let mut out = ValueMap::new();
        out.insert(
            "target".to_string(),
            Value::ArrayF64(ArrayValue::new(target, a.shape.clone())),
        );
        out.insert(
            "diff".to_string(),
            Value::ArrayF64(ArrayValue::new(diff, a.shape.clone())),
        );
        out.insert("zero_datetime".to_string(), Value::ArrayDateTime(ArrayValue::vector(vec![Some(self.zero_datetime)])));
        out.insert("num_units".to_string(), Value::Int(self.num_units));
        out.insert("time_unit".to_string(), Value::Str(format!("{:?}", self.time_unit)));
        Ok(out)
    }
    fn pump(&self, tube_values: &ValueMap) -> WwResult<ValueMap> {
        let target = match &tube_values["target"] {
            Value::ArrayF64(a) => a,
            other => {
                return Err(invalid(
                    "DatetimeToNum",
                    "target",
                    format!("expected an f64 array, got {}", other.descriptor()),
                ))
            }
        };
        let diff = match &tube_values["diff"] {
            Value::ArrayF64(a) => &a.data,
            other => {
                return Err(invalid(
                    "DatetimeToNum",
                    "diff",
                    format!("expected an f64 array, got {}", other.descriptor()),
                ))
            }
        };
        let unit_seconds = self.unit_seconds();
        let mut a = Vec::with_capacity(target.data.len());
        for (&units, &rem) in target.data.iter().zip(diff) {
            if units.is_nan() {
                a.push(None);
            } else {
                let secs = units * unit_seconds + rem;
                let ns = (secs * 1e9).round() as i64;
                a.push(Some(self.zero_datetime + Duration::nanoseconds(ns)));
            }
        }
        let mut out = ValueMap::new();
        out.insert(
            "a".to_string(),
            Value::ArrayDateTime(ArrayValue::new(a, target.shape.clone())),
        );
        Ok(out)
    }
    fn clone_box(&self) -> Box<dyn TankOps> {
        Box::new(*self)
    }
}

/// Marks which entries of a datetime array are `NaT`. A general-purpose
/// catalog primitive (§6) for callers who want a standalone `NaT` mask; the
/// datetime normalizer (§4.5) derives its own `nats` more cheaply from
/// [`DatetimeToNum`]'s `NaN` sentinel instead of wiring this tank in.
#[derive(Debug, Clone, Copy, Default)]
pub struct IsNat;

impl TankOps for IsNat {
    fn kind(&self) -> &'static str {
        "IsNat"
    }
    fn slot_keys(&self) -> &'static [&'static str] {
        &["a"]
    }
    fn tube_keys(&self) -> &'static [&'static str] {
        &["target", "a"]
    }
    fn pour(&self, slot_values: &ValueMap) -> WwResult<ValueMap> {
        let a = match &slot_values["a"] {
            Value::ArrayDateTime(a) => a,
            other => {
                return Err(invalid(
                    "IsNat",
                    "a",
                    format!("expected a datetime array, got {}", other.descriptor()),
                ))
            }
        };
        let target: Vec<bool> = a.data.iter().map(|d| d.is_none()).collect();
        let mut out = ValueMap::new();
        out.insert(
            "target".to_string(),
            Value::ArrayBool(ArrayValue::new(target, a.shape.clone())),
        );
        out.insert("a".to_string(), slot_values["a"].clone());
        Ok(out)
    }
    fn pump(&self, tube_values: &ValueMap) -> WwResult<ValueMap> {
        let mut out = ValueMap::new();
        out.insert("a".to_string(), tube_values["a"].clone());
        Ok(out)
    }
    fn clone_box(&self) -> Box<dyn TankOps> {
        Box::new(*self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, day).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    #[test]
    fn datetime_to_num_round_trips_with_nat() {
        let tank = DatetimeToNum::new(d(2020, 1, 1), 1, TimeUnit::Days);
        let mut slots = ValueMap::new();
        slots.insert(
            "a".to_string(),
            Value::ArrayDateTime(ArrayValue::vector(vec![Some(d(2020, 1, 2)), None])),
        );
        let tubes = tank.pour(&slots).unwrap();
        let target = tubes["target"].as_array_f64().unwrap();
        assert_eq!(target.data[0], 1.0);
        assert!(target.data[1].is_nan());

        let back = tank.pump(&tubes).unwrap();
        let a = back["a"].as_array_datetime().unwrap();
        assert_eq!(a.data[0], Some(d(2020, 1, 2)));
        assert_eq!(a.data[1], None);
    }
}
