use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::model::events::{EventTable, TableError};

pub type SampleMeta = BTreeMap<String, String>;

#[derive(Debug, Error, PartialEq)]
pub enum SampleSetError {
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
    #[error("duplicate sample id: {0}")]
    DuplicateSample(String),
    #[error("unknown sample: {0}")]
    UnknownSample(String),
    #[error(transparent)]
    Table(#[from] TableError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionKind {
    Io,
    Format,
    SchemaMismatch,
    Transform,
}

impl ExclusionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ExclusionKind::Io => "io",
            ExclusionKind::Format => "format",
            ExclusionKind::SchemaMismatch => "schema_mismatch",
            ExclusionKind::Transform => "transform",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExcludedSample {
    pub id: String,
    pub kind: ExclusionKind,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarmonizePolicy {
    /// Any channel-set disagreement fails the whole set.
    Strict,
    /// Samples outside the majority channel set are excluded with a reason.
    ExcludeMismatched,
}

/// One experiment's worth of samples. Tables are shared read-only.
#[derive(Debug, Clone, Default)]
pub struct SampleSet {
    tables: BTreeMap<String, Arc<EventTable>>,
    meta: BTreeMap<String, SampleMeta>,
    excluded: Vec<ExcludedSample>,
}

impl SampleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        id: &str,
        table: EventTable,
        meta: SampleMeta,
    ) -> Result<(), SampleSetError> {
        if self.tables.contains_key(id) {
            return Err(SampleSetError::DuplicateSample(id.to_string()));
        }
        self.tables.insert(id.to_string(), Arc::new(table));
        self.meta.insert(id.to_string(), meta);
        Ok(())
    }

    pub fn exclude(&mut self, id: &str, kind: ExclusionKind, reason: String) {
        tracing::warn!(sample = id, ?kind, "excluding sample: {reason}");
        self.tables.remove(id);
        self.meta.remove(id);
        self.excluded.push(ExcludedSample {
            id: id.to_string(),
            kind,
            reason,
        });
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Sample ids in sorted order.
    pub fn ids(&self) -> Vec<&str> {
        self.tables.keys().map(|k| k.as_str()).collect()
    }

    pub fn get(&self, id: &str) -> Option<&Arc<EventTable>> {
        self.tables.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<EventTable>)> {
        self.tables.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn meta(&self, id: &str) -> Option<&SampleMeta> {
        self.meta.get(id)
    }

    pub fn meta_value(&self, id: &str, key: &str) -> Option<&str> {
        self.meta.get(id)?.get(key).map(|s| s.as_str())
    }

    pub fn set_meta_value(&mut self, id: &str, key: &str, value: &str) -> Result<(), SampleSetError> {
        let meta = self
            .meta
            .get_mut(id)
            .ok_or_else(|| SampleSetError::UnknownSample(id.to_string()))?;
        meta.insert(key.to_string(), value.to_string());
        Ok(())
    }

    pub fn excluded(&self) -> &[ExcludedSample] {
        &self.excluded
    }

    pub fn record_exclusion(&mut self, excluded: ExcludedSample) {
        self.excluded.push(excluded);
    }

    /// Shared channel names (first sample's order), empty for an empty set.
    pub fn channel_names(&self) -> Vec<String> {
        self.tables
            .values()
            .next()
            .map(|t| t.channel_names().into_iter().map(String::from).collect())
            .unwrap_or_default()
    }

    /// Rebuilds the set with every table passed through `f`. Samples where
    /// `f` fails are excluded under `kind`; the rest are unaffected.
    pub fn map_tables<F>(&self, kind: ExclusionKind, f: F) -> SampleSet
    where
        F: Fn(&str, &EventTable) -> Result<EventTable, String> + Sync,
    {
        use rayon::prelude::*;

        let results: Vec<(String, Result<EventTable, String>)> = self
            .tables
            .par_iter()
            .map(|(id, table)| (id.clone(), f(id, table)))
            .collect();

        let mut out = SampleSet {
            tables: BTreeMap::new(),
            meta: BTreeMap::new(),
            excluded: self.excluded.clone(),
        };
        for (id, result) in results {
            match result {
                Ok(table) => {
                    out.tables.insert(id.clone(), Arc::new(table));
                    let meta = self.meta.get(&id).cloned().unwrap_or_default();
                    out.meta.insert(id, meta);
                }
                Err(reason) => out.exclude(&id, kind, reason),
            }
        }
        out
    }

    /// Brings every table onto one channel set and order.
    pub fn harmonize_channels(&self, policy: HarmonizePolicy) -> Result<SampleSet, SampleSetError> {
        let Some(reference) = self.reference_channels() else {
            return Ok(self.clone());
        };
        let reference_set: BTreeSet<String> = reference.iter().cloned().collect();

        let mut out = SampleSet {
            tables: BTreeMap::new(),
            meta: BTreeMap::new(),
            excluded: self.excluded.clone(),
        };
        for (id, table) in &self.tables {
            let set = table.channel_set();
            if set != reference_set {
                let reason = describe_mismatch(&reference_set, &set);
                match policy {
                    HarmonizePolicy::Strict => {
                        return Err(SampleSetError::SchemaMismatch(format!("{id}: {reason}")));
                    }
                    HarmonizePolicy::ExcludeMismatched => {
                        out.exclude(id, ExclusionKind::SchemaMismatch, reason);
                        continue;
                    }
                }
            }
            let reordered = if table.channel_names() == reference {
                Arc::clone(table)
            } else {
                Arc::new(table.reorder(&reference)?)
            };
            out.tables.insert(id.clone(), reordered);
            out.meta
                .insert(id.clone(), self.meta.get(id).cloned().unwrap_or_default());
        }
        Ok(out)
    }

    /// The channel set shared by the most samples; ties go to the set seen
    /// first in sample-id order. Order follows that first sample.
    fn reference_channels(&self) -> Option<Vec<String>> {
        let mut counts: Vec<(BTreeSet<String>, usize, Vec<String>)> = Vec::new();
        for table in self.tables.values() {
            let set = table.channel_set();
            if let Some(entry) = counts.iter_mut().find(|(s, _, _)| *s == set) {
                entry.1 += 1;
            } else {
                let order = table.channel_names().into_iter().map(String::from).collect();
                counts.push((set, 1, order));
            }
        }
        let mut best: Option<(usize, Vec<String>)> = None;
        for (_, count, order) in counts {
            match &best {
                Some((c, _)) if *c >= count => {}
                _ => best = Some((count, order)),
            }
        }
        best.map(|(_, order)| order)
    }
}

fn describe_mismatch(reference: &BTreeSet<String>, got: &BTreeSet<String>) -> String {
    let missing: Vec<&str> = reference.difference(got).map(|s| s.as_str()).collect();
    let extra: Vec<&str> = got.difference(reference).map(|s| s.as_str()).collect();
    format!(
        "channel set differs (missing: [{}], unexpected: [{}])",
        missing.join(","),
        extra.join(",")
    )
}

#[cfg(test)]
#[path = "../../tests/src_inline/model/sample_set.rs"]
mod tests;
