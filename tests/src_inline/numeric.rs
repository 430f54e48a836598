use super::*;

#[test]
fn test_quantile_type7() {
    let v = vec![1.0, 2.0, 3.0, 4.0];
    assert_eq!(quantile(&v, 0.0), 1.0);
    assert_eq!(quantile(&v, 1.0), 4.0);
    assert!((quantile(&v, 0.75) - 3.25).abs() < 1e-12);
    assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
}

#[test]
fn test_empty_and_non_finite() {
    assert!(quantile(&[], 0.5).is_nan());
    assert!(mean(&[f64::NAN]).is_nan());
    assert_eq!(mean(&[1.0, f64::NAN, 3.0]), 2.0);
    assert!(std_dev(&[1.0]).is_nan());
}

#[test]
fn test_mad() {
    let v = vec![1.0, 2.0, 3.0, 4.0, 100.0];
    assert!((mad(&v) - 1.4826).abs() < 1e-9);
}
