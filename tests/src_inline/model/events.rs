use super::*;

fn small_table() -> EventTable {
    EventTable::from_rows(
        &["FSC.A", "SSC.A", "CD3"],
        &[
            vec![100.0, 50.0, 1.0],
            vec![200.0, 60.0, 2.0],
            vec![300.0, 70.0, 3.0],
            vec![400.0, 80.0, 4.0],
        ],
    )
    .unwrap()
}

#[test]
fn test_from_rows_column_access() {
    let t = small_table();
    assert_eq!(t.n_events(), 4);
    assert_eq!(t.n_channels(), 3);
    assert_eq!(t.column("SSC.A").unwrap(), &[50.0, 60.0, 70.0, 80.0]);
    assert_eq!(t.value(2, "CD3"), Some(3.0));
    assert_eq!(t.value(9, "CD3"), None);
    assert!(t.column("CD4").is_none());
}

#[test]
fn test_row_width_mismatch_rejected() {
    let err = EventTable::from_rows(&["A", "B"], &[vec![1.0, 2.0], vec![3.0]]).unwrap_err();
    assert_eq!(
        err,
        TableError::RowWidth {
            row: 1,
            got: 1,
            expected: 2
        }
    );
}

#[test]
fn test_duplicate_channel_rejected() {
    let err = EventTable::from_rows(&["A", "A"], &[vec![1.0, 2.0]]).unwrap_err();
    assert_eq!(err, TableError::DuplicateChannel("A".to_string()));
}

#[test]
fn test_subset_keeps_order() {
    let t = small_table();
    let s = t.subset(&[3, 1]);
    assert_eq!(s.n_events(), 2);
    assert_eq!(s.column("FSC.A").unwrap(), &[400.0, 200.0]);
    assert_eq!(t.n_events(), 4);
}

#[test]
fn test_rename_returns_new_table() {
    let t = small_table();
    let mut map = BTreeMap::new();
    map.insert("CD3".to_string(), "CD3-FITC".to_string());
    map.insert("absent".to_string(), "ignored".to_string());
    let renamed = t.rename_channels(&map).unwrap();
    assert!(renamed.column("CD3-FITC").is_some());
    assert!(renamed.column("CD3").is_none());
    assert!(t.column("CD3").is_some());
}

#[test]
fn test_rename_collision_rejected() {
    let t = small_table();
    let mut map = BTreeMap::new();
    map.insert("CD3".to_string(), "FSC.A".to_string());
    assert_eq!(
        t.rename_channels(&map).unwrap_err(),
        TableError::DuplicateChannel("FSC.A".to_string())
    );
}

#[test]
fn test_with_columns_replaces_only_named() {
    let t = small_table();
    let out = t
        .with_columns(vec![("CD3".to_string(), vec![9.0, 9.0, 9.0, 9.0])])
        .unwrap();
    assert_eq!(out.column("CD3").unwrap(), &[9.0, 9.0, 9.0, 9.0]);
    assert_eq!(out.column("FSC.A"), t.column("FSC.A"));
    assert!(matches!(
        t.with_columns(vec![("CD3".to_string(), vec![1.0])]),
        Err(TableError::LengthMismatch { .. })
    ));
}

#[test]
fn test_view_reads_selected_rows() {
    let t = small_table();
    let rows = vec![0u32, 2];
    let view = EventView::new(&t, &rows);
    assert_eq!(view.len(), 2);
    assert_eq!(view.column("FSC.A").unwrap(), vec![100.0, 300.0]);
    assert!(view.column("missing").is_none());
}

#[test]
fn test_display_name_prefers_marker() {
    let mut meta = ChannelMeta::named("FL1.A");
    assert_eq!(meta.display_name(), "FL1.A");
    meta.desc = Some("CD4".to_string());
    assert_eq!(meta.display_name(), "CD4");
}
