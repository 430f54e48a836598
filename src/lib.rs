//! Hierarchical population gating for flow cytometry samples: load event
//! tables, preprocess them, apply a tree of gates per sample and report
//! per-population statistics.

pub mod config;
pub mod gating;
pub mod input;
pub mod logging;
pub mod model;
pub mod numeric;
pub mod pipeline;
pub mod report;
pub mod stats;
pub mod transform;
pub mod tree;

#[cfg(test)]
#[path = "../tests/src_inline/testutil.rs"]
pub(crate) mod testutil;
