use crate::gating::Gate;
use crate::model::SampleSet;
use crate::tree::{GatingSet, TreeError};

/// Builds the gating set by adding each `(parent, gate)` pair in order.
/// Fit failures only mark nodes failed; structural errors abort.
pub fn run_stage3(samples: &SampleSet, gates: Vec<(String, Gate)>) -> Result<GatingSet, TreeError> {
    let mut gs = GatingSet::new(samples);
    for (parent, gate) in gates {
        gs = gs.add_gate(&parent, gate)?;
    }

    for path in gs.paths().into_iter().skip(1) {
        let failed: Vec<&str> = gs
            .trees()
            .filter(|(_, tree)| {
                tree.node_state(path)
                    .map(|state| state.is_failed())
                    .unwrap_or(false)
            })
            .map(|(id, _)| id)
            .collect();
        if !failed.is_empty() {
            tracing::warn!(
                node = path,
                failed = failed.len(),
                samples = ?failed,
                "population failed in some samples"
            );
        }
    }
    tracing::info!(
        samples = gs.len(),
        nodes = gs.paths().len(),
        "stage 3: gating done"
    );
    Ok(gs)
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/stage3_gating.rs"]
mod tests;
