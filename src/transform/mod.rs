pub mod compensation;
pub mod logicle;

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use thiserror::Error;

use crate::model::{EventTable, TableError};

pub use compensation::Spillover;
pub use logicle::{Logicle, LogicleParams};

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("invalid spillover matrix: {0}")]
    Spillover(String),
    #[error("spillover matrix is singular")]
    SingularSpillover,
    #[error("unknown channel: {0}")]
    UnknownChannel(String),
    #[error("invalid transform parameters: {0}")]
    InvalidParams(String),
    #[error(transparent)]
    Table(#[from] TableError),
}

/// Invertible per-value scale change.
pub trait Transform: Send + Sync + Debug {
    fn name(&self) -> &str;
    fn apply(&self, x: f64) -> f64;
    fn invert(&self, y: f64) -> f64;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arcsinh {
    pub cofactor: f64,
}

impl Default for Arcsinh {
    fn default() -> Self {
        Self { cofactor: 150.0 }
    }
}

impl Arcsinh {
    pub fn new(cofactor: f64) -> Result<Self, TransformError> {
        if cofactor > 0.0 && cofactor.is_finite() {
            Ok(Self { cofactor })
        } else {
            Err(TransformError::InvalidParams(format!(
                "arcsinh cofactor must be positive, got {cofactor}"
            )))
        }
    }
}

impl Transform for Arcsinh {
    fn name(&self) -> &str {
        "arcsinh"
    }

    fn apply(&self, x: f64) -> f64 {
        (x / self.cofactor).asinh()
    }

    fn invert(&self, y: f64) -> f64 {
        y.sinh() * self.cofactor
    }
}

/// Base-10 log; non-positive values map to NaN.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Log10;

impl Transform for Log10 {
    fn name(&self) -> &str {
        "log10"
    }

    fn apply(&self, x: f64) -> f64 {
        if x > 0.0 { x.log10() } else { f64::NAN }
    }

    fn invert(&self, y: f64) -> f64 {
        10f64.powf(y)
    }
}

#[derive(Debug, Clone)]
pub struct ChannelTransform {
    pub channel: String,
    pub transform: Arc<dyn Transform>,
}

/// Ordered list of per-channel transforms applied as one step.
#[derive(Debug, Clone, Default)]
pub struct TransformList {
    items: Vec<ChannelTransform>,
}

impl TransformList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, channel: &str, transform: Arc<dyn Transform>) {
        self.items.push(ChannelTransform {
            channel: channel.to_string(),
            transform,
        });
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChannelTransform> {
        self.items.iter()
    }

    pub fn apply_table(&self, table: &EventTable) -> Result<EventTable, TransformError> {
        self.map_table(table, |t, v| t.apply(v))
    }

    pub fn inverse_table(&self, table: &EventTable) -> Result<EventTable, TransformError> {
        self.map_table(table, |t, v| t.invert(v))
    }

    fn map_table<F>(&self, table: &EventTable, f: F) -> Result<EventTable, TransformError>
    where
        F: Fn(&dyn Transform, f64) -> f64,
    {
        let mut replacements = Vec::with_capacity(self.items.len());
        for item in &self.items {
            let col = table
                .column(&item.channel)
                .ok_or_else(|| TransformError::UnknownChannel(item.channel.clone()))?;
            let values = col.iter().map(|&v| f(item.transform.as_ref(), v)).collect();
            replacements.push((item.channel.clone(), values));
        }
        Ok(table.with_columns(replacements)?)
    }
}

/// Mapping that replaces `-`, spaces and other non-identifier characters in
/// channel names with `.`, e.g. `FSC-A` → `FSC.A`. Names that are already
/// clean are left out of the map.
pub fn dotted_names(table: &EventTable) -> BTreeMap<String, String> {
    table
        .channels()
        .iter()
        .filter_map(|meta| {
            let dotted: String = meta
                .name
                .chars()
                .map(|c| {
                    if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
                        c
                    } else {
                        '.'
                    }
                })
                .collect();
            (dotted != meta.name).then(|| (meta.name.clone(), dotted))
        })
        .collect()
}

#[cfg(test)]
#[path = "../../tests/src_inline/transform/tests.rs"]
mod tests;
