//! End-to-end coverage of the §8 concrete scenarios, driven through the full
//! [`Waterwork::pour`]/[`Waterwork::pump`] cycle (not just a single tank's
//! `TankOps` impl, which the per-tank unit tests already cover) plus the
//! composition laws of §4.3.5.

use std::collections::{BTreeMap, HashMap};

use proptest::prelude::*;

use waterworks::builder::{self, Source};
use waterworks::value::{ArrayValue, Value};
use waterworks::waterwork::{FunnelKey, KeyMode, TapKey, Waterwork};

fn array(data: Vec<f64>) -> Value {
    Value::ArrayF64(ArrayValue::vector(data))
}

fn str_array(data: Vec<&str>) -> Value {
    Value::ArrayStr(ArrayValue::vector(data.into_iter().map(String::from).collect()))
}

fn taps_by_name(taps: HashMap<TapKey, Value>) -> HashMap<String, Value> {
    taps.into_iter()
        .filter_map(|(k, v)| match k {
            TapKey::Str(name) => Some((name, v)),
            _ => None,
        })
        .collect()
}

#[test]
fn add_reversal_round_trips_through_a_full_waterwork() {
    let mut ww = Waterwork::build("add_demo", |ww| {
        builder::add(ww, Source::free(), Source::free(), Some("sum"))?;
        Ok(())
    })
    .unwrap();

    let a_slot = "add_demo/sum/slots/a".to_string();
    let b_slot = "add_demo/sum/slots/b".to_string();

    let mut funnel_values = HashMap::new();
    funnel_values.insert(a_slot.clone(), array(vec![1.0, 2.0, 3.0]));
    funnel_values.insert(b_slot.clone(), Value::Float(10.0));

    let taps = taps_by_name(ww.pour(funnel_values, KeyMode::Str).unwrap());
    assert_eq!(taps["add_demo/sum/tubes/target"], array(vec![11.0, 12.0, 13.0]));

    let funnels = ww.pump(taps, KeyMode::Str).unwrap();
    assert_eq!(funnels[&FunnelKey::Str(a_slot)], array(vec![1.0, 2.0, 3.0]));
    assert_eq!(funnels[&FunnelKey::Str(b_slot)], Value::Float(10.0));
}

#[test]
fn div_with_remainder_round_trips_through_a_full_waterwork() {
    let mut ww = Waterwork::build("div_demo", |ww| {
        builder::div(ww, Source::free(), Source::free(), Some("q"))?;
        Ok(())
    })
    .unwrap();

    let a_slot = "div_demo/q/slots/a".to_string();
    let b_slot = "div_demo/q/slots/b".to_string();

    let mut funnel_values = HashMap::new();
    funnel_values.insert(a_slot.clone(), array(vec![7.0, 8.0]));
    funnel_values.insert(b_slot.clone(), array(vec![2.0, 3.0]));

    let taps = taps_by_name(ww.pour(funnel_values, KeyMode::Str).unwrap());
    assert_eq!(taps["div_demo/q/tubes/target"], array(vec![3.0, 2.0]));
    assert_eq!(taps["div_demo/q/tubes/remainder"], array(vec![1.0, 2.0]));

    let funnels = ww.pump(taps, KeyMode::Str).unwrap();
    assert_eq!(funnels[&FunnelKey::Str(a_slot)], array(vec![7.0, 8.0]));
    assert_eq!(funnels[&FunnelKey::Str(b_slot)], array(vec![2.0, 3.0]));
}

/// §8.3 "one-hot with miss", but wired as `cat_to_index` feeding `one_hot`
/// rather than exercised as two standalone tanks, so the unconsumed
/// `missing_vals` tube of each becomes a real dangling tap a caller must
/// round-trip through `pump`.
#[test]
fn cat_to_index_feeding_one_hot_round_trips_including_both_miss_tubes() {
    let mut map = BTreeMap::new();
    map.insert("a".to_string(), 0i64);
    map.insert("b".to_string(), 1i64);

    let mut ww = Waterwork::build("cat_demo", |ww| {
        let idx = builder::cat_to_index(ww, Source::free(), map.clone(), Some("idx"))?;
        builder::one_hot(ww, idx.tube("target"), 2, Some("oh"))?;
        Ok(())
    })
    .unwrap();

    let cats_slot = "cat_demo/idx/slots/cats".to_string();
    let mut funnel_values = HashMap::new();
    funnel_values.insert(cats_slot.clone(), str_array(vec!["a", "b", "c"]));

    let taps = taps_by_name(ww.pour(funnel_values, KeyMode::Str).unwrap());
    assert_eq!(
        taps["cat_demo/oh/tubes/target"],
        Value::ArrayI64(ArrayValue::new(vec![1, 0, 0, 1, 0, 0], vec![3, 2]))
    );
    assert_eq!(
        taps["cat_demo/oh/tubes/missing_vals"],
        Value::ArrayI64(ArrayValue::vector(vec![-1]))
    );
    assert_eq!(
        taps["cat_demo/idx/tubes/missing_vals"],
        str_array(vec!["c"])
    );

    let funnels = ww.pump(taps, KeyMode::Str).unwrap();
    assert_eq!(
        funnels[&FunnelKey::Str(cats_slot)],
        str_array(vec!["a", "b", "c"])
    );
}

/// §8.4 "tokenize/detokenize": every one of `Tokenize`'s four declared
/// tubes (`target`/`diff`/`tokenizer`/`delimiter`) is a tap here since
/// nothing downstream consumes any of them.
#[test]
fn tokenize_detokenize_round_trips_through_a_full_waterwork() {
    let mut ww = Waterwork::build("tok_demo", |ww| {
        builder::tokenize(ww, Source::free(), 3, " ", Some("tok"))?;
        Ok(())
    })
    .unwrap();

    let strings_slot = "tok_demo/tok/slots/strings".to_string();
    let mut funnel_values = HashMap::new();
    funnel_values.insert(strings_slot.clone(), str_array(vec!["hi, there!", "ok"]));

    let taps = taps_by_name(ww.pour(funnel_values, KeyMode::Str).unwrap());
    let funnels = ww.pump(taps, KeyMode::Str).unwrap();
    assert_eq!(
        funnels[&FunnelKey::Str(strings_slot)],
        str_array(vec!["hi, there!", "ok"])
    );
}

/// §9 "multi-fanout": a third consumer of the same tube shares one
/// auto-inserted `Clone` rather than each consumer getting its own, and the
/// shared value survives a full pour.
#[test]
fn three_consumers_of_one_tube_share_a_single_clone_and_pour_consistently() {
    let mut ww = Waterwork::build("fanout_demo", |ww| {
        let src = builder::add(ww, Source::free(), 0.0, Some("src"))?;
        let target = src.tube("target");
        builder::mul(ww, &target, 2.0, Some("m1"))?;
        builder::mul(ww, &target, 3.0, Some("m2"))?;
        builder::mul(ww, &target, 4.0, Some("m3"))?;
        Ok(())
    })
    .unwrap();

    let clones: Vec<_> = ww.tanks.values().filter(|t| t.kind() == "Clone").collect();
    assert_eq!(clones.len(), 2, "3 consumers of one tube need 2 chained Clone tanks");

    let src_a = "fanout_demo/src/slots/a".to_string();
    let mut funnel_values = HashMap::new();
    funnel_values.insert(src_a, array(vec![5.0]));

    let taps = taps_by_name(ww.pour(funnel_values, KeyMode::Str).unwrap());
    assert_eq!(taps["fanout_demo/m1/tubes/target"], array(vec![10.0]));
    assert_eq!(taps["fanout_demo/m2/tubes/target"], array(vec![15.0]));
    assert_eq!(taps["fanout_demo/m3/tubes/target"], array(vec![20.0]));
}

/// §4.3.5 `combine`: both operands stay usable and independently pourable
/// after being combined, and the combined graph's standalone (unjoined) taps
/// still carry the values of whichever operand they came from.
#[test]
fn combine_preserves_standalone_tap_values_and_leaves_operands_usable() {
    let ww_a = Waterwork::build("graph_a", |ww| {
        builder::add(ww, Source::free(), 1.0, Some("step"))?;
        Ok(())
    })
    .unwrap();
    let ww_b = Waterwork::build("graph_b", |ww| {
        builder::mul(ww, Source::free(), 2.0, Some("step"))?;
        Ok(())
    })
    .unwrap();

    let combined = ww_a
        .combine(&ww_b, &[], "combined")
        .expect("disjoint graphs combine without a join");

    assert!(combined.tanks.contains_key("combined/graph_a/step"));
    assert!(combined.tanks.contains_key("combined/graph_b/step"));

    let mut combined = combined;
    let mut funnel_values = HashMap::new();
    funnel_values.insert(
        "combined/graph_a/step/slots/a".to_string(),
        array(vec![1.0]),
    );
    funnel_values.insert(
        "combined/graph_b/step/slots/a".to_string(),
        array(vec![3.0]),
    );
    let taps = taps_by_name(combined.pour(funnel_values, KeyMode::Str).unwrap());
    assert_eq!(taps["combined/graph_a/step/tubes/target"], array(vec![2.0]));
    assert_eq!(taps["combined/graph_b/step/tubes/target"], array(vec![6.0]));

    // The original operands are untouched and still independently usable.
    let mut ww_a = ww_a;
    let mut funnel_values = HashMap::new();
    funnel_values.insert("graph_a/step/slots/a".to_string(), array(vec![9.0]));
    let taps = taps_by_name(ww_a.pour(funnel_values, KeyMode::Str).unwrap());
    assert_eq!(taps["graph_a/step/tubes/target"], array(vec![10.0]));
}

proptest! {
    /// Add's broadcast reversal law holds for arbitrary same-length operand
    /// pairs, not just the single scenario arithmetic.rs's unit test pins down.
    #[test]
    fn add_pour_then_pump_recovers_operands(
        a in prop::collection::vec(-1000.0f64..1000.0, 1..8),
        b in prop::collection::vec(-1000.0f64..1000.0, 1..8),
    ) {
        let len = a.len().min(b.len());
        let a = a[..len].to_vec();
        let b = b[..len].to_vec();

        let mut ww = Waterwork::build("prop_add", |ww| {
            builder::add(ww, Source::free(), Source::free(), Some("sum"))?;
            Ok(())
        })
        .unwrap();

        let a_slot = "prop_add/sum/slots/a".to_string();
        let b_slot = "prop_add/sum/slots/b".to_string();
        let mut funnel_values = HashMap::new();
        funnel_values.insert(a_slot.clone(), array(a.clone()));
        funnel_values.insert(b_slot.clone(), array(b.clone()));

        let taps = taps_by_name(ww.pour(funnel_values, KeyMode::Str).unwrap());
        let funnels = ww.pump(taps, KeyMode::Str).unwrap();

        prop_assert_eq!(&funnels[&FunnelKey::Str(a_slot)], &array(a));
        prop_assert_eq!(&funnels[&FunnelKey::Str(b_slot)], &array(b));
    }
}
