pub mod json;
pub mod tsv;

use serde::Serialize;

use crate::model::ExcludedSample;
use crate::numeric::quantile;

#[derive(Debug, Clone, Serialize)]
pub struct ToolMeta {
    pub name: String,
    pub version: String,
    pub git_hash: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InputSummary {
    pub input_dir: String,
    pub template: String,
    pub n_samples: usize,
    pub n_excluded: usize,
    pub channels: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreprocessSummary {
    pub compensated: usize,
    pub renamed_channels: usize,
    pub transforms: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GateSummary {
    pub path: String,
    pub parent: String,
    pub method: String,
    pub channels: Vec<String>,
    pub fitted: bool,
}

/// Across-sample distribution of one population's statistics.
#[derive(Debug, Clone, Serialize)]
pub struct PopulationSummary {
    pub path: String,
    pub samples_ok: usize,
    pub samples_failed: usize,
    pub count_median: f64,
    pub percent_median: f64,
    pub percent_p10: f64,
    pub percent_p90: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryData {
    pub tool: ToolMeta,
    pub input: InputSummary,
    pub preprocessing: PreprocessSummary,
    pub aggregator: Option<String>,
    pub strategy: Vec<GateSummary>,
    pub populations: Vec<PopulationSummary>,
    pub n_warnings: usize,
    pub excluded: Vec<ExcludedSample>,
}

/// Fixed six-decimal rendering; `NaN` for undefined values.
pub fn format_f64_6(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else {
        format!("{:.6}", v)
    }
}

pub fn median(values: &[f64]) -> f64 {
    quantile(values, 0.5)
}

pub fn p10(values: &[f64]) -> f64 {
    quantile(values, 0.10)
}

pub fn p90(values: &[f64]) -> f64 {
    quantile(values, 0.90)
}

#[cfg(test)]
#[path = "../../tests/src_inline/report/mod.rs"]
mod tests;
