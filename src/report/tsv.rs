use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::model::ExcludedSample;
use crate::report::format_f64_6;
use crate::stats::StatisticsRecord;

const NA: &str = "NA";

/// Long-format statistics table: one row per (sample, node), one column
/// per aggregate key. Absent values are written as `NA`.
pub fn render_stats_tsv(records: &[StatisticsRecord]) -> String {
    let keys: BTreeSet<&str> = records
        .iter()
        .flat_map(|r| r.values.keys().map(|k| k.as_str()))
        .collect();

    let mut header = vec![
        "sample",
        "population",
        "path",
        "parent",
        "count",
        "parent_count",
        "percent",
    ];
    header.extend(keys.iter().copied());
    header.extend(["status", "notes"]);

    let mut out = header.join("\t");
    out.push('\n');
    for r in records {
        let mut row = vec![
            r.sample.clone(),
            r.population.clone(),
            r.path.clone(),
            r.parent.clone().unwrap_or_else(|| NA.to_string()),
            opt_count(r.count),
            opt_count(r.parent_count),
            r.percent.map(format_f64_6).unwrap_or_else(|| NA.to_string()),
        ];
        for k in &keys {
            row.push(
                r.values
                    .get(*k)
                    .map(|v| format_f64_6(*v))
                    .unwrap_or_else(|| NA.to_string()),
            );
        }
        row.push(if r.is_failed() { "failed" } else { "ok" }.to_string());
        row.push(notes(r));
        out.push_str(&row.join("\t"));
        out.push('\n');
    }
    out
}

pub fn write_stats_tsv(records: &[StatisticsRecord], path: &Path) -> std::io::Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    w.write_all(render_stats_tsv(records).as_bytes())?;
    w.flush()
}

pub fn write_excluded_tsv(excluded: &[ExcludedSample], path: &Path) -> std::io::Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    writeln!(w, "sample\tkind\treason")?;
    for e in excluded {
        writeln!(w, "{}\t{}\t{}", e.id, e.kind.as_str(), sanitize(&e.reason))?;
    }
    w.flush()
}

fn opt_count(v: Option<usize>) -> String {
    v.map(|c| c.to_string()).unwrap_or_else(|| NA.to_string())
}

fn notes(r: &StatisticsRecord) -> String {
    let mut parts: Vec<String> = r.failure.iter().map(|f| sanitize(f)).collect();
    parts.extend(r.warnings.iter().map(|w| sanitize(&w.to_string())));
    parts.join("; ")
}

fn sanitize(s: &str) -> String {
    s.replace(['\t', '\n', '\r'], " ")
}

#[cfg(test)]
#[path = "../../tests/src_inline/report/tsv.rs"]
mod tests;
