use std::collections::BTreeMap;

use crate::report::{PopulationSummary, SummaryData, median, p10, p90};
use crate::stats::StatisticsRecord;

pub fn render_summary_json(data: &SummaryData) -> serde_json::Result<String> {
    let mut json = serde_json::to_string_pretty(data)?;
    json.push('\n');
    Ok(json)
}

/// Per-node distribution of counts and percents across samples, in the
/// order nodes first appear in `records`.
pub fn summarize_populations(records: &[StatisticsRecord]) -> Vec<PopulationSummary> {
    let mut order: Vec<&str> = Vec::new();
    let mut by_path: BTreeMap<&str, Vec<&StatisticsRecord>> = BTreeMap::new();
    for r in records {
        let entry = by_path.entry(r.path.as_str()).or_default();
        if entry.is_empty() {
            order.push(r.path.as_str());
        }
        entry.push(r);
    }

    order
        .into_iter()
        .map(|path| {
            let recs = &by_path[path];
            let counts: Vec<f64> = recs
                .iter()
                .filter_map(|r| r.count.map(|c| c as f64))
                .collect();
            let percents: Vec<f64> = recs.iter().filter_map(|r| r.percent).collect();
            PopulationSummary {
                path: path.to_string(),
                samples_ok: counts.len(),
                samples_failed: recs.len() - counts.len(),
                count_median: median(&counts),
                percent_median: median(&percents),
                percent_p10: p10(&percents),
                percent_p90: p90(&percents),
            }
        })
        .collect()
}
