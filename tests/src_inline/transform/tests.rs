use std::sync::Arc;

use super::*;
use crate::model::EventTable;

#[test]
fn test_arcsinh_round_trip() {
    let t = Arcsinh::new(5.0).unwrap();
    for v in [-50.0, 0.0, 3.0, 1e4] {
        assert!((t.invert(t.apply(v)) - v).abs() < 1e-9 * v.abs().max(1.0));
    }
    assert!(Arcsinh::new(0.0).is_err());
}

#[test]
fn test_log10_non_positive_is_nan() {
    assert!(Log10.apply(0.0).is_nan());
    assert!(Log10.apply(-3.0).is_nan());
    assert!((Log10.apply(1000.0) - 3.0).abs() < 1e-12);
    assert!((Log10.invert(2.0) - 100.0).abs() < 1e-9);
}

#[test]
fn test_transform_list_returns_new_table() {
    let t = EventTable::from_rows(&["FSC.A", "CD3"], &[vec![10.0, 100.0], vec![20.0, 1000.0]])
        .unwrap();
    let mut list = TransformList::new();
    list.push("CD3", Arc::new(Log10));
    let out = list.apply_table(&t).unwrap();
    assert_eq!(out.column("CD3").unwrap(), &[2.0, 3.0]);
    assert_eq!(out.column("FSC.A").unwrap(), &[10.0, 20.0]);
    assert_eq!(t.column("CD3").unwrap(), &[100.0, 1000.0]);

    let back = list.inverse_table(&out).unwrap();
    let cd3 = back.column("CD3").unwrap();
    assert!((cd3[0] - 100.0).abs() < 1e-9 && (cd3[1] - 1000.0).abs() < 1e-9);
}

#[test]
fn test_transform_list_unknown_channel() {
    let t = EventTable::from_rows(&["FSC.A"], &[vec![1.0]]).unwrap();
    let mut list = TransformList::new();
    list.push("CD4", Arc::new(Log10));
    assert!(matches!(
        list.apply_table(&t),
        Err(TransformError::UnknownChannel(c)) if c == "CD4"
    ));
}

#[test]
fn test_dotted_names() {
    let t = EventTable::from_rows(&["FSC-A", "SSC.A", "APC Cy7-A"], &[vec![1.0, 2.0, 3.0]])
        .unwrap();
    let map = dotted_names(&t);
    assert_eq!(map.len(), 2);
    assert_eq!(map["FSC-A"], "FSC.A");
    assert_eq!(map["APC Cy7-A"], "APC.Cy7.A");
    let renamed = t.rename_channels(&map).unwrap();
    assert_eq!(renamed.channel_names(), vec!["FSC.A", "SSC.A", "APC.Cy7.A"]);
}
