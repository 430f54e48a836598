use std::collections::BTreeMap;

use super::*;
use crate::model::EventTable;

const RAW: &str = "2,FL1,FL2,1,0.1,0.2,1";

#[test]
fn test_parse_keyword_form() {
    let s = Spillover::parse(RAW).unwrap();
    assert_eq!(s.channels, vec!["FL1".to_string(), "FL2".to_string()]);
    assert_eq!(s.matrix, vec![vec![1.0, 0.1], vec![0.2, 1.0]]);
}

#[test]
fn test_parse_rejects_wrong_field_count() {
    assert!(matches!(
        Spillover::parse("2,FL1,FL2,1,0.1,0.2"),
        Err(TransformError::Spillover(_))
    ));
    assert!(matches!(
        Spillover::parse("x,FL1"),
        Err(TransformError::Spillover(_))
    ));
}

#[test]
fn test_compensation_recovers_true_signal() {
    // true (100, 50) and (10, 0) pushed through the spillover matrix
    let rows = vec![vec![110.0, 60.0, 7.0], vec![10.0, 1.0, 8.0]];
    let t = EventTable::from_rows(&["FL1", "FL2", "FSC.A"], &rows).unwrap();
    let comp = Spillover::parse(RAW).unwrap().compensate(&t).unwrap();
    let fl1 = comp.column("FL1").unwrap();
    let fl2 = comp.column("FL2").unwrap();
    assert!((fl1[0] - 100.0).abs() < 1e-9);
    assert!((fl2[0] - 50.0).abs() < 1e-9);
    assert!((fl1[1] - 10.0).abs() < 1e-9);
    assert!(fl2[1].abs() < 1e-9);
    assert_eq!(comp.column("FSC.A").unwrap(), &[7.0, 8.0]);
    // source table untouched
    assert_eq!(t.column("FL1").unwrap(), &[110.0, 10.0]);
}

#[test]
fn test_from_table_keyword() {
    let t = EventTable::from_rows(&["FL1", "FL2"], &[vec![1.0, 1.0]]).unwrap();
    assert!(Spillover::from_table(&t).is_none());
    let mut kw = BTreeMap::new();
    kw.insert("$SPILLOVER".to_string(), RAW.to_string());
    let t = t.with_keywords(kw);
    let s = Spillover::from_table(&t).unwrap().unwrap();
    assert_eq!(s.channels.len(), 2);
}

#[test]
fn test_singular_matrix() {
    let err = invert(&[vec![1.0, 1.0], vec![1.0, 1.0]]).unwrap_err();
    assert!(matches!(err, TransformError::SingularSpillover));
}

#[test]
fn test_missing_channel() {
    let t = EventTable::from_rows(&["FL1"], &[vec![1.0]]).unwrap();
    let err = Spillover::parse(RAW).unwrap().compensate(&t).unwrap_err();
    assert!(matches!(err, TransformError::UnknownChannel(c) if c == "FL2"));
}
