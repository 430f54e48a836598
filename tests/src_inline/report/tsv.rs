use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::*;
use crate::model::ExclusionKind;
use crate::stats::StatsWarning;

static DIR_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn make_temp_dir() -> std::path::PathBuf {
    let mut dir = std::env::temp_dir();
    let id = DIR_COUNTER.fetch_add(1, Ordering::SeqCst);
    dir.push(format!("kira_cytogate_tsv_{}_{}", std::process::id(), id));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn records() -> Vec<StatisticsRecord> {
    vec![
        StatisticsRecord {
            sample: "s1".to_string(),
            path: "/mid".to_string(),
            population: "mid".to_string(),
            parent: Some("root".to_string()),
            count: Some(412),
            parent_count: Some(1000),
            percent: Some(0.412),
            values: BTreeMap::from([("FSC.A".to_string(), 500.0)]),
            warnings: Vec::new(),
            failure: None,
        },
        StatisticsRecord {
            sample: "s2".to_string(),
            path: "/mid".to_string(),
            population: "mid".to_string(),
            parent: Some("root".to_string()),
            count: None,
            parent_count: Some(0),
            percent: None,
            values: BTreeMap::new(),
            warnings: vec![StatsWarning::UndefinedPercent {
                parent: "root".to_string(),
            }],
            failure: Some("gate fit failed:\tempty".to_string()),
        },
    ]
}

#[test]
fn test_stats_tsv_shape() {
    let text = render_stats_tsv(&records());
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(
        lines[0],
        "sample\tpopulation\tpath\tparent\tcount\tparent_count\tpercent\tFSC.A\tstatus\tnotes"
    );
    assert_eq!(
        lines[1],
        "s1\tmid\t/mid\troot\t412\t1000\t0.412000\t500.000000\tok\t"
    );
    let cols: Vec<&str> = lines[2].split('\t').collect();
    assert_eq!(cols.len(), 10);
    assert_eq!(cols[4], "NA");
    assert_eq!(cols[6], "NA");
    assert_eq!(cols[7], "NA");
    assert_eq!(cols[8], "failed");
    assert!(cols[9].starts_with("gate fit failed: empty; percent of parent undefined"));
}

#[test]
fn test_write_files() {
    let dir = make_temp_dir();
    let stats_path = dir.join("stats.tsv");
    write_stats_tsv(&records(), &stats_path).unwrap();
    let text = std::fs::read_to_string(&stats_path).unwrap();
    assert_eq!(text, render_stats_tsv(&records()));

    let excluded_path = dir.join("excluded.tsv");
    let excluded = vec![ExcludedSample {
        id: "bad".to_string(),
        kind: ExclusionKind::SchemaMismatch,
        reason: "missing: [CD3]".to_string(),
    }];
    write_excluded_tsv(&excluded, &excluded_path).unwrap();
    let text = std::fs::read_to_string(&excluded_path).unwrap();
    assert_eq!(text, "sample\tkind\treason\nbad\tschema_mismatch\tmissing: [CD3]\n");
}
