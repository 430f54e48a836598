use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::model::SampleSet;
use crate::report::json::{render_summary_json, summarize_populations};
use crate::report::tsv::{write_excluded_tsv, write_stats_tsv};
use crate::report::{GateSummary, InputSummary, PreprocessSummary, SummaryData, ToolMeta};
use crate::stats::StatisticsRecord;
use crate::transform::TransformList;
use crate::tree::GatingSet;

#[derive(Debug, Clone)]
pub struct Stage4Input<'a> {
    pub gating_set: &'a GatingSet,
    pub samples: &'a SampleSet,
    pub records: &'a [StatisticsRecord],
    pub transforms: &'a TransformList,
    pub aggregator: Option<String>,
    pub compensated: usize,
    pub renamed_channels: usize,

    pub input_dir: String,
    pub template: String,
    pub tool_name: String,
    pub tool_version: String,
    pub git_hash: Option<String>,
}

pub fn write_reports(input: &Stage4Input<'_>, out_dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(out_dir)?;

    write_stats_tsv(input.records, &out_dir.join("stats.tsv"))?;
    write_excluded_tsv(input.samples.excluded(), &out_dir.join("excluded.tsv"))?;

    let summary = build_summary(input);
    let json = render_summary_json(&summary).map_err(std::io::Error::other)?;
    write_text(&out_dir.join("summary.json"), &json)?;

    tracing::info!(
        out = %out_dir.display(),
        records = input.records.len(),
        "stage 4: reports written"
    );
    Ok(())
}

pub fn build_summary(input: &Stage4Input<'_>) -> SummaryData {
    let strategy = input
        .gating_set
        .strategy()
        .iter()
        .map(|entry| GateSummary {
            path: entry.path.clone(),
            parent: entry.parent.clone(),
            method: entry.gate.method().to_string(),
            channels: entry.gate.channels().into_iter().map(String::from).collect(),
            fitted: entry.gate.is_fitted(),
        })
        .collect();

    SummaryData {
        tool: ToolMeta {
            name: input.tool_name.clone(),
            version: input.tool_version.clone(),
            git_hash: input.git_hash.clone(),
        },
        input: InputSummary {
            input_dir: input.input_dir.clone(),
            template: input.template.clone(),
            n_samples: input.samples.len(),
            n_excluded: input.samples.excluded().len(),
            channels: input.samples.channel_names(),
        },
        preprocessing: PreprocessSummary {
            compensated: input.compensated,
            renamed_channels: input.renamed_channels,
            transforms: input
                .transforms
                .iter()
                .map(|t| format!("{}:{}", t.channel, t.transform.name()))
                .collect(),
        },
        aggregator: input.aggregator.clone(),
        strategy,
        populations: summarize_populations(input.records),
        n_warnings: input.records.iter().map(|r| r.warnings.len()).sum(),
        excluded: input.samples.excluded().to_vec(),
    }
}

fn write_text(path: &Path, text: &str) -> std::io::Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    w.write_all(text.as_bytes())?;
    w.flush()
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/stage4_report.rs"]
mod tests;
