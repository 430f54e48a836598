use std::path::PathBuf;

use regex::Regex;

use crate::input::meta::load_sample_meta;
use crate::input::{InputError, LoadOptions, load_sample_set};
use crate::model::SampleSet;

#[derive(Debug, Clone)]
pub struct Stage1Params {
    pub input_dir: PathBuf,
    pub meta_path: Option<PathBuf>,
    /// Pattern whose match in the file name becomes the `well` field.
    pub well_pattern: Option<Regex>,
}

pub fn run_stage1(params: &Stage1Params) -> Result<SampleSet, InputError> {
    let sample_meta = match &params.meta_path {
        Some(path) => load_sample_meta(path)?,
        None => Default::default(),
    };
    let mut options = LoadOptions {
        name_patterns: Vec::new(),
        sample_meta,
    };
    if let Some(re) = &params.well_pattern {
        options.name_patterns.push(("well".to_string(), re.clone()));
    }

    let set = load_sample_set(&params.input_dir, &options)?;
    tracing::info!(
        loaded = set.len(),
        excluded = set.excluded().len(),
        "stage 1: samples loaded"
    );
    if set.is_empty() {
        return Err(InputError::MissingInput(format!(
            "no readable samples in {}",
            params.input_dir.display()
        )));
    }
    Ok(set)
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/stage1_load.rs"]
mod tests;
