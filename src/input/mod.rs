use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use regex::Regex;
use thiserror::Error;

pub mod delimited;
pub mod fcs;
pub mod meta;

use delimited::read_delimited;
use fcs::read_fcs;
use meta::{MetaField, extract_field, sample_id_from_path};

use crate::model::{EventTable, ExclusionKind, SampleMeta, SampleSet};

#[derive(Debug, Error)]
pub enum InputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("missing input: {0}")]
    MissingInput(String),
    #[error("format error: {0}")]
    Format(String),
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
}

impl InputError {
    pub fn exclusion_kind(&self) -> ExclusionKind {
        match self {
            InputError::Io(_) | InputError::MissingInput(_) => ExclusionKind::Io,
            InputError::Format(_) => ExclusionKind::Format,
            InputError::SchemaMismatch(_) => ExclusionKind::SchemaMismatch,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    Fcs,
    Delimited,
}

pub fn detect_format(path: &Path) -> Option<SampleFormat> {
    let name = path.file_name()?.to_string_lossy().to_ascii_lowercase();
    if name.ends_with(".fcs") {
        Some(SampleFormat::Fcs)
    } else if [".tsv", ".csv", ".tsv.gz", ".csv.gz"]
        .iter()
        .any(|s| name.ends_with(s))
    {
        Some(SampleFormat::Delimited)
    } else {
        None
    }
}

/// Reads one sample. Truncated or corrupt input is a `Format` error, never a
/// partial table.
pub fn read_sample(path: &Path) -> Result<EventTable, InputError> {
    match detect_format(path) {
        Some(SampleFormat::Fcs) => read_fcs(path),
        Some(SampleFormat::Delimited) => read_delimited(path),
        None => Err(InputError::Format(format!(
            "unrecognised sample file extension: {}",
            path.display()
        ))),
    }
}

pub fn find_sample_files(input_dir: &Path) -> Result<Vec<PathBuf>, InputError> {
    if !input_dir.is_dir() {
        return Err(InputError::MissingInput(format!(
            "{} is not a directory",
            input_dir.display()
        )));
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(input_dir)? {
        let path = entry?.path();
        if path.is_file() && detect_format(&path).is_some() {
            files.push(path);
        }
    }
    files.sort();
    if files.is_empty() {
        return Err(InputError::MissingInput(format!(
            "no .fcs/.tsv/.csv samples in {}",
            input_dir.display()
        )));
    }
    Ok(files)
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Metadata key → pattern applied to the file name.
    pub name_patterns: Vec<(String, Regex)>,
    pub sample_meta: BTreeMap<String, SampleMeta>,
}

/// Loads every sample file in parallel. A file that fails to read is
/// recorded as excluded; it never aborts the batch.
pub fn load_sample_set(input_dir: &Path, options: &LoadOptions) -> Result<SampleSet, InputError> {
    let files = find_sample_files(input_dir)?;
    load_sample_files(&files, options)
}

pub fn load_sample_files(files: &[PathBuf], options: &LoadOptions) -> Result<SampleSet, InputError> {
    let results: Vec<(String, PathBuf, Result<EventTable, InputError>)> = files
        .par_iter()
        .map(|path| (sample_id_from_path(path), path.clone(), read_sample(path)))
        .collect();

    let mut set = SampleSet::new();
    for (id, path, result) in results {
        match result {
            Ok(table) => {
                let meta = build_meta(&id, &path, options);
                tracing::info!(
                    sample = %id,
                    events = table.n_events(),
                    channels = table.n_channels(),
                    "loaded sample"
                );
                if let Err(e) = set.insert(&id, table, meta) {
                    set.record_exclusion(crate::model::ExcludedSample {
                        id,
                        kind: ExclusionKind::Format,
                        reason: e.to_string(),
                    });
                }
            }
            Err(e) => {
                let kind = e.exclusion_kind();
                tracing::warn!(sample = %id, path = %path.display(), "failed to read sample: {e}");
                set.record_exclusion(crate::model::ExcludedSample {
                    id,
                    kind,
                    reason: e.to_string(),
                });
            }
        }
    }
    Ok(set)
}

fn build_meta(id: &str, path: &Path, options: &LoadOptions) -> SampleMeta {
    let mut meta = SampleMeta::new();
    meta.insert("file".to_string(), path.display().to_string());
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    for (key, pattern) in &options.name_patterns {
        match extract_field(&file_name, pattern) {
            MetaField::Found(v) => {
                meta.insert(key.clone(), v);
            }
            MetaField::Empty => {
                tracing::debug!(sample = id, field = %key, "metadata field matched but empty");
                meta.insert(key.clone(), String::new());
            }
            MetaField::NotFound => {
                tracing::debug!(sample = id, field = %key, "metadata field not found in file name");
            }
        }
    }
    if let Some(extra) = options.sample_meta.get(id) {
        for (k, v) in extra {
            meta.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }
    meta
}

#[cfg(test)]
#[path = "../../tests/src_inline/input/tests.rs"]
mod tests;
