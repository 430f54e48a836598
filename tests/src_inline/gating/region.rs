use super::*;
use crate::model::EventTable;

fn square() -> Vec<[f64; 2]> {
    vec![[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]]
}

#[test]
fn test_point_in_polygon_boundary_inside() {
    let sq = square();
    assert!(point_in_polygon(5.0, 5.0, &sq));
    assert!(point_in_polygon(0.0, 5.0, &sq));
    assert!(point_in_polygon(10.0, 10.0, &sq));
    assert!(!point_in_polygon(10.5, 5.0, &sq));
    assert!(!point_in_polygon(f64::NAN, 5.0, &sq));
}

#[test]
fn test_point_in_polygon_too_few_vertices() {
    assert!(!point_in_polygon(0.0, 0.0, &[]));
    assert!(!point_in_polygon(0.5, 0.5, &[[0.0, 0.0], [1.0, 1.0]]));
}

#[test]
fn test_concave_polygon() {
    // L-shape: the notch at (7.5, 7.5) is outside.
    let l = vec![
        [0.0, 0.0],
        [10.0, 0.0],
        [10.0, 5.0],
        [5.0, 5.0],
        [5.0, 10.0],
        [0.0, 10.0],
    ];
    assert!(point_in_polygon(2.0, 8.0, &l));
    assert!(point_in_polygon(8.0, 2.0, &l));
    assert!(!point_in_polygon(7.5, 7.5, &l));
}

#[test]
fn test_bound_open_sides() {
    let b = Bound::new("X", Some(1.0), None);
    assert!(b.contains(1.0));
    assert!(b.contains(1e9));
    assert!(!b.contains(0.99));
    assert!(!b.contains(f64::NAN));
}

#[test]
fn test_ellipse_membership() {
    let t = EventTable::from_rows(
        &["X", "Y"],
        &[vec![0.0, 0.0], vec![1.0, 0.0], vec![3.0, 0.0], vec![0.0, 2.5]],
    )
    .unwrap();
    let rows = t.all_rows();
    let view = EventView::new(&t, &rows);
    let region = Region::Ellipse {
        x: "X".to_string(),
        y: "Y".to_string(),
        center: [0.0, 0.0],
        cov: [[1.0, 0.0], [0.0, 4.0]],
        cutoff: 4.0,
    };
    let mask = region.evaluate(&view).unwrap();
    // d2: 0, 1, 9, 1.5625
    assert_eq!(mask.bits(), &[true, true, false, true]);
}

#[test]
fn test_ratio_non_positive_denominator_outside() {
    let t = EventTable::from_rows(
        &["A", "H"],
        &[vec![12.0, 10.0], vec![5.0, 0.0], vec![30.0, 10.0]],
    )
    .unwrap();
    let rows = t.all_rows();
    let view = EventView::new(&t, &rows);
    let region = Region::Ratio {
        numerator: "A".to_string(),
        denominator: "H".to_string(),
        min: 1.0,
        max: 1.5,
    };
    assert_eq!(region.evaluate(&view).unwrap().bits(), &[true, false, false]);
}

#[test]
fn test_validate_rejects_bad_shapes() {
    assert!(
        Region::Rectangle {
            bounds: vec![Bound::new("X", Some(5.0), Some(1.0))]
        }
        .validate()
        .is_err()
    );
    assert!(Region::Rectangle { bounds: vec![] }.validate().is_err());
    assert!(
        Region::Polygon {
            x: "X".into(),
            y: "Y".into(),
            vertices: vec![[0.0, 0.0], [1.0, 1.0]]
        }
        .validate()
        .is_err()
    );
}
