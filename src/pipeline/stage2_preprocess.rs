use std::collections::BTreeMap;

use thiserror::Error;

use crate::config::{AnalysisConfig, ConfigError};
use crate::model::{EventTable, ExclusionKind, HarmonizePolicy, SampleSet, SampleSetError};
use crate::transform::{Spillover, TransformList, dotted_names};

#[derive(Debug, Error)]
pub enum Stage2Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Samples(#[from] SampleSetError),
}

#[derive(Debug)]
pub struct Stage2Output {
    pub samples: SampleSet,
    pub transforms: TransformList,
    /// Samples that carried a spillover matrix and were compensated.
    pub compensated: usize,
    pub renamed_channels: usize,
}

/// Compensation, channel renames, harmonization, then transforms. Each
/// step yields a new sample set; a sample failing a step is excluded.
pub fn run_stage2(
    samples: &SampleSet,
    config: &AnalysisConfig,
    policy: HarmonizePolicy,
) -> Result<Stage2Output, Stage2Error> {
    let mut current = samples.clone();

    let mut compensated = 0usize;
    if config.compensate {
        let with_spillover: Vec<String> = current
            .iter()
            .filter(|(_, t)| Spillover::from_table(t).is_some())
            .map(|(id, _)| id.to_string())
            .collect();
        for id in current.ids() {
            if !with_spillover.iter().any(|s| s == id) {
                tracing::warn!(sample = %id, "no spillover matrix recorded; left uncompensated");
            }
        }
        current = current.map_tables(ExclusionKind::Transform, |_, table| {
            match Spillover::from_table(table) {
                Some(spill) => spill
                    .and_then(|s| s.compensate(table))
                    .map_err(|e| format!("compensation failed: {e}")),
                None => Ok(table.clone()),
            }
        });
        compensated = with_spillover
            .iter()
            .filter(|id| current.get(id).is_some())
            .count();
    }

    let mut renamed_channels = 0usize;
    if config.dotted_names || !config.rename.is_empty() {
        let reference = current.iter().next().map(|(_, t)| rename_map(t, config));
        renamed_channels = reference.map(|m| m.len()).unwrap_or(0);
        current = current.map_tables(ExclusionKind::Transform, |_, table| {
            table
                .rename_channels(&rename_map(table, config))
                .map_err(|e| format!("channel rename failed: {e}"))
        });
    }

    current = current.harmonize_channels(policy)?;

    let transforms = match current.iter().next() {
        Some((reference_id, reference)) if !config.transforms.is_empty() => {
            tracing::info!(reference = %reference_id, "estimating transform parameters");
            config.build_transforms(reference)?
        }
        _ => TransformList::new(),
    };
    if !transforms.is_empty() {
        current = current.map_tables(ExclusionKind::Transform, |_, table| {
            transforms
                .apply_table(table)
                .map_err(|e| format!("transform failed: {e}"))
        });
    }

    tracing::info!(
        samples = current.len(),
        excluded = current.excluded().len(),
        compensated,
        transforms = transforms.len(),
        "stage 2: preprocessing done"
    );
    Ok(Stage2Output {
        samples: current,
        transforms,
        compensated,
        renamed_channels,
    })
}

/// Dotted-name cleanup (when enabled) followed by the explicit renames.
fn rename_map(table: &EventTable, config: &AnalysisConfig) -> BTreeMap<String, String> {
    let mut map = if config.dotted_names {
        dotted_names(table)
    } else {
        BTreeMap::new()
    };
    for meta in table.channels() {
        let cleaned = map.get(&meta.name).unwrap_or(&meta.name);
        if let Some(target) = config
            .rename
            .get(cleaned)
            .or_else(|| config.rename.get(&meta.name))
        {
            map.insert(meta.name.clone(), target.clone());
        }
    }
    map
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/stage2_preprocess.rs"]
mod tests;
