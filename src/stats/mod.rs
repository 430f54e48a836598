//! Per-population statistics over a gating set.

pub mod aggregators;

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;

use crate::model::EventView;
use crate::tree::{GatingSet, Node, NodeState, PopulationTree, TreeError};

pub use aggregators::{AggregateError, Aggregator, Count, Mean, Median, Quantile, by_name};

/// Non-fatal conditions recorded on a statistics record.
#[derive(Debug, Error, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatsWarning {
    #[error("percent of parent undefined: parent {parent} has no events")]
    UndefinedPercent { parent: String },
    #[error("aggregator {aggregator} failed: {reason}")]
    AggregatorFailed { aggregator: String, reason: String },
}

/// Statistics for one (sample, node) pair. Counts and percent are `None`
/// when the node failed; `percent` is NaN when the parent has no events.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsRecord {
    pub sample: String,
    pub path: String,
    pub population: String,
    pub parent: Option<String>,
    pub count: Option<usize>,
    pub parent_count: Option<usize>,
    /// Fraction of the parent's events, in `[0, 1]`.
    pub percent: Option<f64>,
    pub values: BTreeMap<String, f64>,
    pub warnings: Vec<StatsWarning>,
    /// Why the node has no population, when it failed.
    pub failure: Option<String>,
}

impl StatisticsRecord {
    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }
}

/// Records for every sample, restricted to one node when `node_path` is
/// given. Samples are visited in id order and nodes in tree order.
pub fn stats(
    gs: &GatingSet,
    node_path: Option<&str>,
    aggregator: Option<&dyn Aggregator>,
) -> Result<Vec<StatisticsRecord>, TreeError> {
    let target = node_path.map(|p| gs.resolve(p)).transpose()?;
    let trees: Vec<_> = gs.trees().collect();
    let per_sample: Vec<Vec<StatisticsRecord>> = trees
        .par_iter()
        .map(|(_, tree)| {
            tree.nodes()
                .iter()
                .filter(|n| target.as_deref().is_none_or(|t| n.path() == t))
                .map(|n| node_record(tree, n, aggregator))
                .collect()
        })
        .collect();
    Ok(per_sample.into_iter().flatten().collect())
}

fn node_record(
    tree: &PopulationTree,
    node: &Node,
    aggregator: Option<&dyn Aggregator>,
) -> StatisticsRecord {
    let parent_node = node.parent().map(|p| &tree.nodes()[p]);
    // The root is its own reference population.
    let reference = parent_node.unwrap_or(node);

    let mut record = StatisticsRecord {
        sample: tree.sample().to_string(),
        path: node.path().to_string(),
        population: node.name().to_string(),
        parent: parent_node.map(|p| p.path().to_string()),
        count: node.count(),
        parent_count: reference.count(),
        percent: None,
        values: BTreeMap::new(),
        warnings: Vec::new(),
        failure: None,
    };

    let population = match node.state() {
        NodeState::Ready(p) => p,
        NodeState::Failed { reason } => {
            record.failure = Some(reason.clone());
            return record;
        }
    };

    if let Some(parent_count) = record.parent_count {
        let count = population.count();
        record.percent = Some(if parent_count > 0 {
            count as f64 / parent_count as f64
        } else {
            record.warnings.push(StatsWarning::UndefinedPercent {
                parent: reference.path().to_string(),
            });
            f64::NAN
        });
    }

    if let Some(agg) = aggregator {
        let view = EventView::new(tree.table(), &population.rows);
        match agg.aggregate(&view) {
            Ok(values) => record.values = values,
            Err(err) => {
                tracing::debug!(
                    sample = %record.sample,
                    node = %record.path,
                    aggregator = agg.name(),
                    error = %err,
                    "aggregator failed"
                );
                record.values = agg
                    .keys(tree.table())
                    .into_iter()
                    .map(|k| (k, f64::NAN))
                    .collect();
                record.warnings.push(StatsWarning::AggregatorFailed {
                    aggregator: agg.name().to_string(),
                    reason: err.to_string(),
                });
            }
        }
    }
    record
}

#[cfg(test)]
#[path = "../../tests/src_inline/stats/tests.rs"]
mod tests;
