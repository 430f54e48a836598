pub mod gating_set;

use std::sync::Arc;

use thiserror::Error;

use crate::gating::{Gate, Region};
use crate::model::{EventTable, EventView, Mask};

pub use gating_set::GatingSet;

pub const ROOT: &str = "root";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TreeError {
    #[error("node {name} already exists under {parent}")]
    DuplicateNode { parent: String, name: String },
    #[error("no node matches {0}")]
    UnknownNode(String),
    #[error("node name {0} matches more than one node; use the full path")]
    AmbiguousNode(String),
    #[error("invalid node name {0:?}")]
    InvalidName(String),
    #[error("the root node cannot be replaced or removed")]
    RootImmutable,
}

/// Events retained by a node, as root-relative row indices, together with
/// the mask over the parent's retained events that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct Population {
    pub mask: Mask,
    pub rows: Arc<[u32]>,
    pub fitted: Option<Region>,
}

impl Population {
    pub fn count(&self) -> usize {
        self.rows.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeState {
    Ready(Arc<Population>),
    /// The gate could not be applied here, or an ancestor failed.
    Failed { reason: String },
}

impl NodeState {
    pub fn population(&self) -> Option<&Population> {
        match self {
            NodeState::Ready(p) => Some(p),
            NodeState::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, NodeState::Failed { .. })
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    name: String,
    path: String,
    parent: Option<usize>,
    gate: Option<Arc<Gate>>,
    state: NodeState,
}

impl Node {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    pub fn gate(&self) -> Option<&Arc<Gate>> {
        self.gate.as_ref()
    }

    pub fn state(&self) -> &NodeState {
        &self.state
    }

    pub fn count(&self) -> Option<usize> {
        self.state.population().map(Population::count)
    }
}

/// One sample's gating hierarchy. Every operation returns a new tree;
/// nodes are kept parent-before-child so a forward pass is a valid
/// recompute order.
#[derive(Debug, Clone)]
pub struct PopulationTree {
    sample: String,
    table: Arc<EventTable>,
    nodes: Vec<Node>,
}

impl PopulationTree {
    pub fn new(sample: &str, table: Arc<EventTable>) -> Self {
        let rows: Arc<[u32]> = table.all_rows().into();
        let root = Node {
            name: ROOT.to_string(),
            path: ROOT.to_string(),
            parent: None,
            gate: None,
            state: NodeState::Ready(Arc::new(Population {
                mask: Mask::all(rows.len()),
                rows,
                fitted: None,
            })),
        };
        Self {
            sample: sample.to_string(),
            table,
            nodes: vec![root],
        }
    }

    pub fn sample(&self) -> &str {
        &self.sample
    }

    pub fn table(&self) -> &Arc<EventTable> {
        &self.table
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false: the root is never removed.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn root(&self) -> &Node {
        &self.nodes[0]
    }

    /// Node paths in recompute order, root first.
    pub fn paths(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.path.as_str()).collect()
    }

    pub fn children(&self, idx: usize) -> impl Iterator<Item = (usize, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .filter(move |(_, n)| n.parent == Some(idx))
    }

    pub fn resolve(&self, query: &str) -> Result<usize, TreeError> {
        resolve_path(self.nodes.iter().map(|n| n.path.as_str()), query)
    }

    pub fn node(&self, query: &str) -> Result<&Node, TreeError> {
        Ok(&self.nodes[self.resolve(query)?])
    }

    pub fn node_state(&self, query: &str) -> Result<&NodeState, TreeError> {
        Ok(&self.node(query)?.state)
    }

    /// New tree with `gate` attached under `parent`, computed immediately.
    pub fn add_gate(&self, parent: &str, gate: Arc<Gate>) -> Result<PopulationTree, TreeError> {
        let parent_idx = self.resolve(parent)?;
        let path = child_path(&self.nodes[parent_idx].path, gate.name())?;
        if self.nodes.iter().any(|n| n.path == path) {
            return Err(TreeError::DuplicateNode {
                parent: self.nodes[parent_idx].path.clone(),
                name: gate.name().to_string(),
            });
        }

        let mut next = self.clone();
        let state = next.compute(parent_idx, &gate);
        next.nodes.push(Node {
            name: gate.name().to_string(),
            path,
            parent: Some(parent_idx),
            gate: Some(gate),
            state,
        });
        Ok(next)
    }

    /// Re-applies every gate, parents before children.
    pub fn recompute(&self) -> PopulationTree {
        let mut next = self.clone();
        next.recompute_from(0, |_| true);
        next
    }

    /// Swaps the gate of an existing node, keeping its name, and recomputes
    /// that node and its descendants.
    pub fn replace_gate(&self, query: &str, gate: Arc<Gate>) -> Result<PopulationTree, TreeError> {
        let idx = self.resolve(query)?;
        if idx == 0 {
            return Err(TreeError::RootImmutable);
        }
        if gate.name() != self.nodes[idx].name {
            return Err(TreeError::InvalidName(gate.name().to_string()));
        }
        let mut next = self.clone();
        next.nodes[idx].gate = Some(gate);
        let affected = self.subtree(idx);
        next.recompute_from(idx, |j| affected[j]);
        Ok(next)
    }

    /// Drops a node and its whole subtree.
    pub fn remove_node(&self, query: &str) -> Result<PopulationTree, TreeError> {
        let idx = self.resolve(query)?;
        if idx == 0 {
            return Err(TreeError::RootImmutable);
        }
        let removed = self.subtree(idx);
        let mut remap = vec![None; self.nodes.len()];
        let mut nodes = Vec::with_capacity(self.nodes.len());
        for (old, node) in self.nodes.iter().enumerate() {
            if removed[old] {
                continue;
            }
            remap[old] = Some(nodes.len());
            let mut node = node.clone();
            node.parent = node.parent.and_then(|p| remap[p]);
            nodes.push(node);
        }
        Ok(PopulationTree {
            sample: self.sample.clone(),
            table: Arc::clone(&self.table),
            nodes,
        })
    }

    /// `flags[j]` is true when node `j` is `idx` or one of its descendants.
    fn subtree(&self, idx: usize) -> Vec<bool> {
        let mut flags = vec![false; self.nodes.len()];
        flags[idx] = true;
        for j in idx + 1..self.nodes.len() {
            if let Some(p) = self.nodes[j].parent {
                flags[j] = flags[p];
            }
        }
        flags
    }

    fn recompute_from<F: Fn(usize) -> bool>(&mut self, start: usize, include: F) {
        for j in start.max(1)..self.nodes.len() {
            if !include(j) {
                continue;
            }
            let (Some(parent), Some(gate)) = (self.nodes[j].parent, self.nodes[j].gate.clone())
            else {
                continue;
            };
            self.nodes[j].state = self.compute(parent, &gate);
        }
    }

    fn compute(&self, parent_idx: usize, gate: &Gate) -> NodeState {
        let parent = &self.nodes[parent_idx];
        let population = match &parent.state {
            NodeState::Ready(p) => p,
            NodeState::Failed { .. } => {
                return NodeState::Failed {
                    reason: format!("parent {} failed", parent.path),
                };
            }
        };
        let view = EventView::new(&self.table, &population.rows);
        match gate.apply(&view) {
            Ok(outcome) => {
                let rows: Arc<[u32]> = outcome.mask.select(&population.rows).into();
                tracing::debug!(
                    sample = %self.sample,
                    gate = gate.name(),
                    parent = %parent.path,
                    count = rows.len(),
                    parent_count = population.rows.len(),
                    "gate applied"
                );
                NodeState::Ready(Arc::new(Population {
                    mask: outcome.mask,
                    rows,
                    fitted: outcome.fitted,
                }))
            }
            Err(err) => {
                tracing::warn!(
                    sample = %self.sample,
                    gate = gate.name(),
                    error = %err,
                    "gate failed; subtree marked failed"
                );
                NodeState::Failed {
                    reason: err.to_string(),
                }
            }
        }
    }
}

pub(crate) fn validate_name(name: &str) -> Result<(), TreeError> {
    if name.is_empty() || name.contains('/') || name == ROOT || name.trim() != name {
        return Err(TreeError::InvalidName(name.to_string()));
    }
    Ok(())
}

pub(crate) fn child_path(parent_path: &str, name: &str) -> Result<String, TreeError> {
    validate_name(name)?;
    Ok(if parent_path == ROOT {
        format!("/{name}")
    } else {
        format!("{parent_path}/{name}")
    })
}

/// Accepts `root`, a full `/a/b` path, a path without the leading slash,
/// or a bare node name that occurs exactly once.
pub(crate) fn resolve_path<'a, I>(paths: I, query: &str) -> Result<usize, TreeError>
where
    I: IntoIterator<Item = &'a str>,
{
    let query = query.trim();
    if query.is_empty() || query == ROOT || query == "/" {
        return Ok(0);
    }
    let paths: Vec<&str> = paths.into_iter().collect();
    if query.contains('/') {
        let full = if query.starts_with('/') {
            query.to_string()
        } else {
            format!("/{query}")
        };
        let full = full.trim_end_matches('/');
        return paths
            .iter()
            .position(|p| *p == full)
            .ok_or_else(|| TreeError::UnknownNode(query.to_string()));
    }

    let mut found = paths
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(_, p)| p.rsplit('/').next() == Some(query))
        .map(|(i, _)| i);
    match (found.next(), found.next()) {
        (Some(i), None) => Ok(i),
        (Some(_), Some(_)) => Err(TreeError::AmbiguousNode(query.to_string())),
        (None, _) => Err(TreeError::UnknownNode(query.to_string())),
    }
}

#[cfg(test)]
#[path = "../../tests/src_inline/tree/tests.rs"]
mod tests;
