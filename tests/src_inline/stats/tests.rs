use std::collections::BTreeMap;
use std::sync::Arc;

use super::*;
use crate::gating::quantile::Side;
use crate::gating::{Bound, Gate, QuantileFitter};
use crate::model::{EventTable, SampleMeta, SampleSet};
use crate::testutil::{scenario_set, scenario_table};

fn mid_gate() -> Gate {
    Gate::rectangle("mid", vec![Bound::new("FSC.A", Some(200.0), Some(800.0))]).unwrap()
}

fn gated(set: &SampleSet) -> GatingSet {
    GatingSet::new(set).add_gate("root", mid_gate()).unwrap()
}

#[test]
fn test_three_samples_exact_counts() {
    let gs = gated(&scenario_set(3, 412));
    let records = stats(&gs, Some("/mid"), None).unwrap();
    assert_eq!(records.len(), 3);
    for (rec, id) in records.iter().zip(["s1", "s2", "s3"]) {
        assert_eq!(rec.sample, id);
        assert_eq!(rec.path, "/mid");
        assert_eq!(rec.population, "mid");
        assert_eq!(rec.parent.as_deref(), Some("root"));
        assert_eq!(rec.count, Some(412));
        assert_eq!(rec.parent_count, Some(1000));
        assert!((rec.percent.unwrap() - 0.412).abs() < 1e-12);
        assert!(rec.values.is_empty());
        assert!(rec.warnings.is_empty());
    }
}

#[test]
fn test_all_nodes_in_tree_order() {
    let gs = gated(&scenario_set(2, 412));
    let records = stats(&gs, None, None).unwrap();
    let keys: Vec<(&str, &str)> = records
        .iter()
        .map(|r| (r.sample.as_str(), r.path.as_str()))
        .collect();
    assert_eq!(
        keys,
        vec![("s1", "root"), ("s1", "/mid"), ("s2", "root"), ("s2", "/mid")]
    );
    let root = &records[0];
    assert_eq!(root.parent, None);
    assert_eq!(root.count, Some(1000));
    assert_eq!(root.percent, Some(1.0));
}

#[test]
fn test_percent_matches_count_ratio() {
    let gs = gated(&scenario_set(1, 412))
        .add_gate(
            "mid",
            Gate::rectangle("hi", vec![Bound::new("SSC.A", Some(400.0), None)]).unwrap(),
        )
        .unwrap();
    for rec in stats(&gs, None, None).unwrap() {
        let (c, p) = (rec.count.unwrap(), rec.parent_count.unwrap());
        assert!(c <= p);
        assert_eq!(rec.percent.unwrap(), c as f64 / p as f64);
    }
}

#[test]
fn test_zero_parent_gives_nan_with_warning() {
    let gs = GatingSet::new(&scenario_set(1, 412))
        .add_gate(
            "root",
            Gate::rectangle("none", vec![Bound::new("FSC.A", Some(1e9), None)]).unwrap(),
        )
        .unwrap()
        .add_gate(
            "none",
            Gate::rectangle("child", vec![Bound::new("SSC.A", None, None)]).unwrap(),
        )
        .unwrap();
    let rec = &stats(&gs, Some("child"), None).unwrap()[0];
    assert_eq!(rec.count, Some(0));
    assert_eq!(rec.parent_count, Some(0));
    assert!(rec.percent.unwrap().is_nan());
    assert_eq!(
        rec.warnings,
        vec![StatsWarning::UndefinedPercent {
            parent: "/none".to_string()
        }]
    );
}

#[test]
fn test_failed_sample_absent_others_reported() {
    let mut set = SampleSet::new();
    set.insert("a", scenario_table(412), SampleMeta::new()).unwrap();
    set.insert("b", scenario_table(0), SampleMeta::new()).unwrap();
    set.insert("c", scenario_table(412), SampleMeta::new()).unwrap();
    let gs = gated(&set)
        .add_gate(
            "mid",
            Gate::fitted(
                "upper",
                vec!["SSC.A".to_string()],
                Arc::new(QuantileFitter { q: 0.5, side: Side::Above }),
            ),
        )
        .unwrap();
    let records = stats(&gs, Some("upper"), Some(&Mean::default())).unwrap();
    assert_eq!(records.len(), 3);
    let b = &records[1];
    assert!(b.is_failed());
    assert_eq!(b.count, None);
    assert_eq!(b.percent, None);
    assert_eq!(b.parent_count, Some(0));
    assert!(b.values.is_empty());
    for rec in [&records[0], &records[2]] {
        assert!(!rec.is_failed());
        assert!(rec.count.unwrap() > 0);
        assert!(rec.values["SSC.A"].is_finite());
    }
}

#[test]
fn test_builtin_aggregators() {
    let t = EventTable::from_rows(
        &["A", "B"],
        &[vec![1.0, 10.0], vec![2.0, 20.0], vec![3.0, 30.0], vec![4.0, f64::NAN]],
    )
    .unwrap();
    let mut set = SampleSet::new();
    set.insert("s", t, SampleMeta::new()).unwrap();
    let gs = GatingSet::new(&set);

    let mean = &stats(&gs, Some("root"), Some(&Mean::default())).unwrap()[0];
    assert_eq!(mean.values["A"], 2.5);
    assert_eq!(mean.values["B"], 20.0);

    let p75 = by_name("p75", Some(vec!["A".to_string()])).unwrap();
    assert_eq!(p75.name(), "p75");
    let rec = &stats(&gs, None, Some(p75.as_ref())).unwrap()[0];
    assert_eq!(rec.values.len(), 1);
    assert!((rec.values["A"] - 3.25).abs() < 1e-12);

    let count = &stats(&gs, None, Some(&Count::default())).unwrap()[0];
    assert_eq!(count.values["B"], 3.0);

    let median = by_name("median", None).unwrap();
    let rec = &stats(&gs, None, Some(median.as_ref())).unwrap()[0];
    assert_eq!(rec.values["A"], 2.5);

    assert!(by_name("p150", None).is_none());
    assert!(by_name("mode", None).is_none());
}

#[test]
fn test_aggregator_failure_fills_nan() {
    let gs = GatingSet::new(&scenario_set(1, 412))
        .add_gate(
            "root",
            Gate::rectangle("none", vec![Bound::new("FSC.A", Some(1e9), None)]).unwrap(),
        )
        .unwrap();
    let rec = &stats(&gs, Some("none"), Some(&Mean::default())).unwrap()[0];
    assert_eq!(rec.count, Some(0));
    assert_eq!(rec.values.len(), 2);
    assert!(rec.values.values().all(|v| v.is_nan()));
    assert!(matches!(
        &rec.warnings[0],
        StatsWarning::AggregatorFailed { aggregator, .. } if aggregator == "mean"
    ));

    let missing = Mean {
        channels: Some(vec!["CD3".to_string()]),
    };
    let rec = &stats(&gs, Some("root"), Some(&missing)).unwrap()[0];
    assert!(rec.values["CD3"].is_nan());
}

#[derive(Debug)]
struct SpanAggregator;

impl Aggregator for SpanAggregator {
    fn name(&self) -> &str {
        "span"
    }

    fn keys(&self, _table: &crate::model::EventTable) -> Vec<String> {
        vec!["FSC.A".to_string()]
    }

    fn aggregate(&self, view: &EventView<'_>) -> Result<BTreeMap<String, f64>, AggregateError> {
        let v = view
            .column("FSC.A")
            .ok_or_else(|| AggregateError::MissingChannel("FSC.A".to_string()))?;
        let lo = v.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = v.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Ok(BTreeMap::from([("FSC.A".to_string(), hi - lo)]))
    }
}

#[test]
fn test_user_aggregator_plugs_in() {
    let gs = gated(&scenario_set(1, 412));
    let rec = &stats(&gs, Some("mid"), Some(&SpanAggregator)).unwrap()[0];
    assert_eq!(rec.values["FSC.A"], 600.0);
}

#[test]
fn test_unknown_node_is_error() {
    let gs = gated(&scenario_set(1, 412));
    assert!(matches!(
        stats(&gs, Some("/nope"), None),
        Err(TreeError::UnknownNode(_))
    ));
}
