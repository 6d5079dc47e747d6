//! The datetime normalizer (§4.5, §8 scenario 5): fits `{mean, std}` or
//! `{min, max}` over a batch of `NaiveDateTime`s, then exposes a waterwork
//! that converts further batches to normalized `num_units`-sized buckets
//! (`nums`) and a sub-bucket residual (`diff`), both fully reversible via
//! `pump`. `NaT` entries pour `diff`/`nums` to `NaN`; the façade replaces
//! that with a fixed fill value on `nums` and reports the positions on
//! `nats`, mirroring the original's `isnat`/`replace` pairing without
//! needing a second tank: [`crate::tanks::datetime::DatetimeToNum`] already
//! carries the same `NaN` onto both outputs for exactly this reason.
//!
//! Grounded on `datetime_transform.py`: `calc_global_values`'s degenerate
//! `std`/`min==max` patching and warning, and `pump`'s need to manually
//! supply every auxiliary tap the normalization arithmetic leaves dangling
//! (there, `('SubTyped_0', 'a_is_smaller')` and friends; here, the same
//! tubes by full name) both carry over unchanged.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};
use tracing::warn;

use crate::builder;
use crate::error::{WaterworksError, WwResult};
use crate::tanks::datetime::{total_seconds, TimeUnit};
use crate::transforms::Transform;
use crate::value::{ArrayValue, Value};
use crate::waterwork::{FunnelKey, KeyMode, TapKey, Waterwork};

/// Which statistic `pour`/`pump` normalize the raw bucket count against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NormMode {
    None,
    MinMax,
    MeanStd,
}

#[derive(Debug, Clone, Copy)]
enum Stats {
    None,
    MinMax { min: f64, max: f64 },
    MeanStd { mean: f64, std: f64 },
}

/// Configuration a [`DatetimeNormalizer`] is built from (§4.5).
#[derive(Debug, Clone)]
pub struct DatetimeNormalizerConfig {
    pub norm_mode: NormMode,
    /// Kept for API parity with the original's multi-axis arrays; this
    /// transform only ever normalizes a single flat axis.
    pub norm_axis: usize,
    pub num_units: i64,
    pub time_unit: TimeUnit,
    pub zero_datetime: NaiveDateTime,
}

impl Default for DatetimeNormalizerConfig {
    fn default() -> Self {
        DatetimeNormalizerConfig {
            norm_mode: NormMode::None,
            norm_axis: 0,
            num_units: 1,
            time_unit: TimeUnit::Days,
            zero_datetime: NaiveDate::from_ymd_opt(1970, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        }
    }
}

/// The tubes a [`DatetimeNormalizer`] pour produces.
#[derive(Debug, Clone, PartialEq)]
pub struct DatetimeNormalizerOutput {
    pub nums: Vec<f64>,
    pub nats: Vec<bool>,
    pub diff: Vec<f64>,
}

fn normalize_raw(stats: Stats, raw: f64) -> f64 {
    match stats {
        Stats::None => raw,
        Stats::MinMax { min, max } => (raw - min) / (max - min),
        Stats::MeanStd { mean, std } => (raw - mean) / std,
    }
}

fn extract_f64(taps: &HashMap<TapKey, Value>, name: &str) -> WwResult<Vec<f64>> {
    let val = taps
        .get(&TapKey::Str(name.to_string()))
        .ok_or_else(|| WaterworksError::UnknownTap(name.to_string()))?;
    val.as_array_f64()
        .map(|a| a.data.clone())
        .ok_or_else(|| WaterworksError::InvalidValue {
            tank: "DatetimeNormalizer".to_string(),
            slot: name.to_string(),
            reason: format!("expected an f64 array, got {}", val.descriptor()),
        })
}

fn array_f64(data: Vec<f64>) -> Value {
    Value::ArrayF64(ArrayValue::vector(data))
}

/// Fits normalization statistics over a sample, then converts further batches
/// of `NaiveDateTime`s to/from normalized numeric buckets (§4.5).
#[derive(Debug)]
pub struct DatetimeNormalizer {
    config: DatetimeNormalizerConfig,
    stats: Stats,
    /// Normalized value substituted for `NaT` entries in `pour`'s `nums`
    /// output. Computed once, from `config.zero_datetime`, the moment stats
    /// are fit (§9, open question (b)): a later mutation of `zero_datetime`
    /// is not observed, since nothing in this API re-derives it afterward.
    fill_nat_num: f64,
    waterwork: Option<Waterwork>,
    input_name: Option<String>,
    nums_tube: Option<String>,
    diff_tube: Option<String>,
    /// Every other tube the normalization arithmetic leaves as a dangling
    /// tap (`DatetimeToNum`'s `zero_datetime`/`num_units`/`time_unit`, and
    /// `Sub`/`Mul`'s bookkeeping tubes if `norm_mode` isn't `None`). Their
    /// values never vary across `pour` calls, so they're captured once here
    /// and replayed verbatim into every `pump`.
    meta_taps: Vec<(String, Value)>,
}

impl DatetimeNormalizer {
    pub fn new(config: DatetimeNormalizerConfig) -> Self {
        DatetimeNormalizer {
            config,
            stats: Stats::None,
            fill_nat_num: 0.0,
            waterwork: None,
            input_name: None,
            nums_tube: None,
            diff_tube: None,
            meta_taps: Vec::new(),
        }
    }

    #[allow(clippy::type_complexity)]
    fn build(&self) -> WwResult<(Waterwork, String, String, String, Vec<(String, Value)>)> {
        let cfg = self.config.clone();
        let stats = self.stats;
        let mut input_name = String::new();
        let mut nums_tube = String::new();
        let mut diff_tube = String::new();
        let mut meta_taps = Vec::new();

        let ww = Waterwork::build("datetime_normalizer", |ww| {
            let src = builder::placeholder(ww)?;
            input_name = src.name.clone();

            let dt = builder::datetime_to_num(
                ww,
                &src,
                cfg.zero_datetime,
                cfg.num_units,
                cfg.time_unit,
                Some("datetime_to_num"),
            )?;
            diff_tube = format!("{}/tubes/diff", dt.name);
            meta_taps.push((
                format!("{}/tubes/zero_datetime", dt.name),
                Value::ArrayDateTime(ArrayValue::vector(vec![Some(cfg.zero_datetime)])),
            ));
            meta_taps.push((format!("{}/tubes/num_units", dt.name), Value::Int(cfg.num_units)));
            meta_taps.push((
                format!("{}/tubes/time_unit", dt.name),
                Value::Str(format!("{:?}", cfg.time_unit)),
            ));

            let raw = dt.tube("target");
            let final_owner = match stats {
                Stats::None => dt.name.clone(),
                Stats::MinMax { min, max } => {
                    let shift = builder::sub(ww, &raw, min, Some("shift"))?;
                    meta_taps.push((format!("{}/tubes/smaller_size_array", shift.name), Value::Float(min)));
                    meta_taps.push((format!("{}/tubes/a_is_smaller", shift.name), Value::Bool(false)));

                    let scale = builder::mul(ww, shift.tube("target"), 1.0 / (max - min), Some("scale"))?;
                    meta_taps.push((format!("{}/tubes/smaller_size_array", scale.name), Value::Float(1.0 / (max - min))));
                    meta_taps.push((format!("{}/tubes/a_is_smaller", scale.name), Value::Bool(false)));
                    meta_taps.push((format!("{}/tubes/missing_vals", scale.name), array_f64(vec![])));
                    scale.name
                }
                Stats::MeanStd { mean, std } => {
                    let shift = builder::sub(ww, &raw, mean, Some("shift"))?;
                    meta_taps.push((format!("{}/tubes/smaller_size_array", shift.name), Value::Float(mean)));
                    meta_taps.push((format!("{}/tubes/a_is_smaller", shift.name), Value::Bool(false)));

                    let scale = builder::mul(ww, shift.tube("target"), 1.0 / std, Some("scale"))?;
                    meta_taps.push((format!("{}/tubes/smaller_size_array", scale.name), Value::Float(1.0 / std)));
                    meta_taps.push((format!("{}/tubes/a_is_smaller", scale.name), Value::Bool(false)));
                    meta_taps.push((format!("{}/tubes/missing_vals", scale.name), array_f64(vec![])));
                    scale.name
                }
            };
            nums_tube = format!("{}/tubes/target", final_owner);
            Ok(())
        })?;

        Ok((ww, input_name, nums_tube, diff_tube, meta_taps))
    }

    /// Fits `{mean, std}` or `{min, max}` over `fit_data`'s non-`NaT` entries
    /// (per `config.norm_mode`) and builds the underlying waterwork.
    /// Degenerate statistics are patched with a `warn!` rather than
    /// propagated into a divide-by-zero: zero `std` becomes `1`, an equal
    /// `min`/`max` becomes `min, min + 1`.
    pub fn calc_global_values(&mut self, fit_data: &[Option<NaiveDateTime>]) -> WwResult<()> {
        if fit_data.is_empty() {
            return Err(WaterworksError::EmptyFit("DatetimeNormalizer".to_string()));
        }
        let unit_seconds = self.config.num_units as f64 * self.config.time_unit.seconds_per_unit();
        let nums: Vec<f64> = fit_data
            .iter()
            .filter_map(|d| d.map(|dt| (total_seconds(dt, self.config.zero_datetime) / unit_seconds).floor()))
            .collect();
        if nums.is_empty() {
            return Err(WaterworksError::EmptyFit("DatetimeNormalizer".to_string()));
        }

        self.stats = match self.config.norm_mode {
            NormMode::None => Stats::None,
            NormMode::MinMax => {
                let mut min = nums[0];
                let mut max = nums[0];
                for &v in &nums {
                    if v < min {
                        min = v;
                    }
                    if v > max {
                        max = v;
                    }
                }
                if (max - min).abs() < f64::EPSILON {
                    warn!(min, max, "datetime normalizer: degenerate min/max, widening by 1");
                    max = min + 1.0;
                }
                Stats::MinMax { min, max }
            }
            NormMode::MeanStd => {
                let mean = nums.iter().sum::<f64>() / nums.len() as f64;
                let variance = nums.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / nums.len() as f64;
                let mut std = variance.sqrt();
                if std.abs() < f64::EPSILON {
                    warn!(mean, std, "datetime normalizer: degenerate std, defaulting to 1");
                    std = 1.0;
                }
                Stats::MeanStd { mean, std }
            }
        };
        self.fill_nat_num = normalize_raw(self.stats, 0.0);

        let (ww, input_name, nums_tube, diff_tube, meta_taps) = self.build()?;
        self.waterwork = Some(ww);
        self.input_name = Some(input_name);
        self.nums_tube = Some(nums_tube);
        self.diff_tube = Some(diff_tube);
        self.meta_taps = meta_taps;
        Ok(())
    }

    pub fn get_waterwork(&self) -> WwResult<Waterwork> {
        self.build().map(|(ww, ..)| ww)
    }

    /// Converts `data` to normalized buckets. `NaT` entries pour to
    /// `fill_nat_num` on `nums` (rather than leaking `NaN` to callers) and
    /// are marked `true` on `nats`.
    pub fn pour(&mut self, data: &[Option<NaiveDateTime>]) -> WwResult<DatetimeNormalizerOutput> {
        let input_name = self
            .input_name
            .clone()
            .ok_or_else(|| WaterworksError::EmptyFit("DatetimeNormalizer".to_string()))?;
        let nums_tube = self.nums_tube.clone().expect("set alongside input_name");
        let diff_tube = self.diff_tube.clone().expect("set alongside input_name");

        let ww = self
            .waterwork
            .as_mut()
            .ok_or_else(|| WaterworksError::EmptyFit("DatetimeNormalizer".to_string()))?;
        ww.clear_vals();

        let mut funnel_values = HashMap::new();
        funnel_values.insert(input_name, Value::ArrayDateTime(ArrayValue::vector(data.to_vec())));
        let taps = ww.pour(funnel_values, KeyMode::Str)?;

        let raw_nums = extract_f64(&taps, &nums_tube)?;
        let diff = extract_f64(&taps, &diff_tube)?;
        let nats: Vec<bool> = raw_nums.iter().map(|n| n.is_nan()).collect();

        let patched_nums: Vec<f64> = raw_nums
            .iter()
            .zip(&nats)
            .map(|(&n, &is_nat)| if is_nat { self.fill_nat_num } else { n })
            .collect();

        Ok(DatetimeNormalizerOutput {
            nums: patched_nums,
            nats,
            diff,
        })
    }

    /// Inverts `pour` exactly: entries marked `true` on `nats` reconstruct as
    /// `None` regardless of what `nums`/`diff` carry for them.
    pub fn pump(&mut self, out: &DatetimeNormalizerOutput) -> WwResult<Vec<Option<NaiveDateTime>>> {
        let input_name = self
            .input_name
            .clone()
            .ok_or_else(|| WaterworksError::EmptyFit("DatetimeNormalizer".to_string()))?;
        let nums_tube = self.nums_tube.clone().expect("set alongside input_name");
        let diff_tube = self.diff_tube.clone().expect("set alongside input_name");
        let meta_taps = self.meta_taps.clone();

        let restored_nums: Vec<f64> = out
            .nums
            .iter()
            .zip(&out.nats)
            .map(|(&n, &is_nat)| if is_nat { f64::NAN } else { n })
            .collect();
        let restored_diff: Vec<f64> = out
            .diff
            .iter()
            .zip(&out.nats)
            .map(|(&d, &is_nat)| if is_nat { f64::NAN } else { d })
            .collect();

        let ww = self
            .waterwork
            .as_mut()
            .ok_or_else(|| WaterworksError::EmptyFit("DatetimeNormalizer".to_string()))?;
        ww.clear_vals();

        let mut tap_values = HashMap::new();
        tap_values.insert(nums_tube, array_f64(restored_nums));
        tap_values.insert(diff_tube, array_f64(restored_diff));
        for (name, val) in meta_taps {
            tap_values.insert(name, val);
        }

        let funnels = ww.pump(tap_values, KeyMode::Str)?;
        let restored = funnels
            .get(&FunnelKey::Str(input_name.clone()))
            .ok_or_else(|| WaterworksError::MissingInput(input_name))?;
        restored
            .as_array_datetime()
            .map(|a| a.data.clone())
            .ok_or_else(|| WaterworksError::InvalidValue {
                tank: "DatetimeNormalizer".to_string(),
                slot: "a".to_string(),
                reason: format!("expected a datetime array, got {}", restored.descriptor()),
            })
    }
}

impl Transform for DatetimeNormalizer {
    type FitInput = Vec<Option<NaiveDateTime>>;
    type PourInput = Vec<Option<NaiveDateTime>>;
    type PourOutput = DatetimeNormalizerOutput;
    type PumpOutput = DatetimeNormalizerOutput;

    fn calc_global_values(&mut self, fit_data: Self::FitInput) -> WwResult<()> {
        DatetimeNormalizer::calc_global_values(self, &fit_data)
    }

    fn get_waterwork(&self) -> WwResult<Waterwork> {
        DatetimeNormalizer::get_waterwork(self)
    }

    fn pour(&mut self, data: Self::PourInput) -> WwResult<Self::PourOutput> {
        DatetimeNormalizer::pour(self, &data)
    }

    fn pump(&mut self, data: Self::PumpOutput) -> WwResult<Self::PourInput> {
        DatetimeNormalizer::pump(self, &data)
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
    fn mean_std_round_trips_with_nat_matches_concrete_scenario() {
        let config = DatetimeNormalizerConfig {
            norm_mode: NormMode::MeanStd,
            ..DatetimeNormalizerConfig::default()
        };
        let mut norm = DatetimeNormalizer::new(config);
        norm.calc_global_values(&[Some(d(2020, 1, 1)), Some(d(2020, 1, 2)), Some(d(2020, 1, 3))])
            .unwrap();

        let out = norm.pour(&[Some(d(2020, 1, 2)), None]).unwrap();
        assert_eq!(out.nats, vec![false, true]);
        assert!((out.nums[0]).abs() < 1e-9, "2020-01-02 is the fitted mean");

        let back = norm.pump(&out).unwrap();
        assert_eq!(back[0], Some(d(2020, 1, 2)));
        assert_eq!(back[1], None);
    }

    #[test]
    fn none_mode_round_trips_without_any_normalization() {
        let config = DatetimeNormalizerConfig {
            zero_datetime: d(2020, 1, 1),
            ..DatetimeNormalizerConfig::default()
        };
        let mut norm = DatetimeNormalizer::new(config);
        norm.calc_global_values(&[Some(d(2020, 1, 1))]).unwrap();
        let out = norm.pour(&[Some(d(2020, 1, 5))]).unwrap();
        assert_eq!(out.nums[0], 4.0);
        let back = norm.pump(&out).unwrap();
        assert_eq!(back[0], Some(d(2020, 1, 5)));
    }

    #[test]
    fn empty_fit_data_is_rejected() {
        let mut norm = DatetimeNormalizer::new(DatetimeNormalizerConfig::default());
        let err = norm.calc_global_values(&[]).unwrap_err();
        assert!(matches!(err, WaterworksError::EmptyFit(_)));
    }

    #[test]
    fn degenerate_min_max_is_widened_not_divided_by_zero() {
        let config = DatetimeNormalizerConfig {
            norm_mode: NormMode::MinMax,
            ..DatetimeNormalizerConfig::default()
        };
        let mut norm = DatetimeNormalizer::new(config);
        norm.calc_global_values(&[Some(d(2020, 1, 1)), Some(d(2020, 1, 1))]).unwrap();
        let out = norm.pour(&[Some(d(2020, 1, 1))]).unwrap();
        assert!(out.nums[0].is_finite());

        let back = norm.pump(&out).unwrap();
        assert_eq!(back[0], Some(d(2020, 1, 1)));
    }
}
