use std::collections::BTreeMap;
use std::sync::Arc;

use rayon::prelude::*;

use crate::gating::Gate;
use crate::model::SampleSet;
use crate::tree::{PopulationTree, ROOT, TreeError, child_path, resolve_path};

/// One gate of the shared strategy, attached under `parent`.
#[derive(Debug, Clone)]
pub struct StrategyEntry {
    pub path: String,
    pub parent: String,
    pub gate: Arc<Gate>,
}

/// The gating strategy plus one population tree per sample. Snapshots are
/// immutable: each operation builds every sample's new tree on the rayon
/// pool and returns a new set once all of them are complete.
#[derive(Debug, Clone, Default)]
pub struct GatingSet {
    strategy: Vec<StrategyEntry>,
    trees: BTreeMap<String, Arc<PopulationTree>>,
}

impl GatingSet {
    pub fn new(samples: &SampleSet) -> Self {
        let trees = samples
            .iter()
            .map(|(id, table)| {
                (
                    id.to_string(),
                    Arc::new(PopulationTree::new(id, Arc::clone(table))),
                )
            })
            .collect();
        Self {
            strategy: Vec::new(),
            trees,
        }
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    pub fn samples(&self) -> Vec<&str> {
        self.trees.keys().map(|k| k.as_str()).collect()
    }

    pub fn tree(&self, sample: &str) -> Option<&Arc<PopulationTree>> {
        self.trees.get(sample)
    }

    pub fn trees(&self) -> impl Iterator<Item = (&str, &Arc<PopulationTree>)> {
        self.trees.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn strategy(&self) -> &[StrategyEntry] {
        &self.strategy
    }

    /// Node paths shared by every tree, root first.
    pub fn paths(&self) -> Vec<&str> {
        std::iter::once(ROOT)
            .chain(self.strategy.iter().map(|e| e.path.as_str()))
            .collect()
    }

    pub fn resolve(&self, query: &str) -> Result<String, TreeError> {
        let paths = self.paths();
        let idx = resolve_path(paths.iter().copied(), query)?;
        Ok(paths[idx].to_string())
    }

    pub fn add_gate(&self, parent: &str, gate: Gate) -> Result<GatingSet, TreeError> {
        let parent = self.resolve(parent)?;
        let path = child_path(&parent, gate.name())?;
        if self.strategy.iter().any(|e| e.path == path) {
            return Err(TreeError::DuplicateNode {
                parent,
                name: gate.name().to_string(),
            });
        }
        let gate = Arc::new(gate);
        let trees = self.map_trees(|tree| tree.add_gate(&parent, Arc::clone(&gate)))?;

        let mut strategy = self.strategy.clone();
        strategy.push(StrategyEntry { path, parent, gate });
        tracing::info!(
            node = %strategy[strategy.len() - 1].path,
            samples = trees.len(),
            "gate added"
        );
        Ok(GatingSet { strategy, trees })
    }

    pub fn recompute(&self) -> GatingSet {
        let trees = self
            .trees
            .par_iter()
            .map(|(id, tree)| (id.clone(), Arc::new(tree.recompute())))
            .collect();
        GatingSet {
            strategy: self.strategy.clone(),
            trees,
        }
    }

    pub fn replace_gate(&self, query: &str, gate: Gate) -> Result<GatingSet, TreeError> {
        let path = self.resolve(query)?;
        if path == ROOT {
            return Err(TreeError::RootImmutable);
        }
        let gate = Arc::new(gate);
        let mut strategy = self.strategy.clone();
        for entry in &mut strategy {
            if entry.path == path {
                if entry.gate.name() != gate.name() {
                    return Err(TreeError::InvalidName(gate.name().to_string()));
                }
                entry.gate = Arc::clone(&gate);
            }
        }
        let trees = self.map_trees(|tree| tree.replace_gate(&path, Arc::clone(&gate)))?;
        Ok(GatingSet { strategy, trees })
    }

    pub fn remove_node(&self, query: &str) -> Result<GatingSet, TreeError> {
        let path = self.resolve(query)?;
        if path == ROOT {
            return Err(TreeError::RootImmutable);
        }
        let prefix = format!("{path}/");
        let strategy = self
            .strategy
            .iter()
            .filter(|e| e.path != path && !e.path.starts_with(&prefix))
            .cloned()
            .collect();
        let trees = self.map_trees(|tree| tree.remove_node(&path))?;
        Ok(GatingSet { strategy, trees })
    }

    fn map_trees<F>(&self, op: F) -> Result<BTreeMap<String, Arc<PopulationTree>>, TreeError>
    where
        F: Fn(&PopulationTree) -> Result<PopulationTree, TreeError> + Sync,
    {
        self.trees
            .par_iter()
            .map(|(id, tree)| Ok((id.clone(), Arc::new(op(tree)?))))
            .collect()
    }
}

#[cfg(test)]
#[path = "../../tests/src_inline/tree/gating_set.rs"]
mod tests;
