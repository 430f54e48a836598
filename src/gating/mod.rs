use std::fmt;
use std::sync::Arc;

use thiserror::Error;

pub mod cluster;
pub mod mindensity;
pub mod quantile;
pub mod region;
pub mod singlet;

pub use cluster::DensityClusterFitter;
pub use mindensity::MinDensityFitter;
pub use quantile::QuantileFitter;
pub use region::{Bound, Region};
pub use singlet::SingletFitter;

use crate::model::{EventView, Mask};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GateFitError {
    #[error("{method}: no events to fit")]
    EmptyInput { method: String },
    #[error("{method}: degenerate input: {reason}")]
    Degenerate { method: String, reason: String },
    #[error("{method}: did not converge after {iterations} iterations")]
    NoConvergence { method: String, iterations: usize },
    #[error("{method}: expects {expected} channel(s), got {got}")]
    ChannelCount {
        method: String,
        expected: usize,
        got: usize,
    },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GateError {
    #[error("channel not present: {0}")]
    MissingChannel(String),
    #[error("gate fit failed: {0}")]
    Fit(#[from] GateFitError),
    #[error("invalid gate: {0}")]
    Invalid(String),
}

/// A per-sample fitting strategy. Implementations see only the parent
/// population's events and must be deterministic for identical input.
pub trait GateFitter: Send + Sync + fmt::Debug {
    /// Stable method name, part of gate identity.
    fn method(&self) -> &str;

    /// Canonical rendering of the fitting arguments, part of gate identity.
    fn args(&self) -> String;

    fn fit(&self, view: &EventView<'_>, channels: &[String]) -> Result<Region, GateFitError>;
}

#[derive(Debug, Clone)]
pub enum GateKind {
    Fixed(Region),
    Fitted {
        channels: Vec<String>,
        fitter: Arc<dyn GateFitter>,
    },
}

/// A named, immutable predicate over one or two channels.
#[derive(Debug, Clone)]
pub struct Gate {
    name: String,
    kind: GateKind,
}

/// Result of applying a gate to one parent population.
#[derive(Debug, Clone, PartialEq)]
pub struct GateOutcome {
    pub mask: Mask,
    /// The boundary realized for this sample when the gate is fitted.
    pub fitted: Option<Region>,
}

impl Gate {
    pub fn fixed(name: &str, region: Region) -> Result<Self, GateError> {
        region.validate()?;
        Ok(Self {
            name: name.to_string(),
            kind: GateKind::Fixed(region),
        })
    }

    pub fn rectangle(name: &str, bounds: Vec<Bound>) -> Result<Self, GateError> {
        Self::fixed(name, Region::Rectangle { bounds })
    }

    pub fn polygon(
        name: &str,
        x: &str,
        y: &str,
        vertices: Vec<[f64; 2]>,
    ) -> Result<Self, GateError> {
        Self::fixed(
            name,
            Region::Polygon {
                x: x.to_string(),
                y: y.to_string(),
                vertices,
            },
        )
    }

    pub fn fitted(name: &str, channels: Vec<String>, fitter: Arc<dyn GateFitter>) -> Self {
        Self {
            name: name.to_string(),
            kind: GateKind::Fitted { channels, fitter },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &GateKind {
        &self.kind
    }

    pub fn is_fitted(&self) -> bool {
        matches!(self.kind, GateKind::Fitted { .. })
    }

    pub fn channels(&self) -> Vec<&str> {
        match &self.kind {
            GateKind::Fixed(region) => region.channels(),
            GateKind::Fitted { channels, .. } => channels.iter().map(|c| c.as_str()).collect(),
        }
    }

    /// Short label for reports: `rectangle`, `polygon`, or the fit method.
    pub fn method(&self) -> &str {
        match &self.kind {
            GateKind::Fixed(Region::Rectangle { .. }) => "rectangle",
            GateKind::Fixed(Region::Polygon { .. }) => "polygon",
            GateKind::Fixed(Region::Ellipse { .. }) => "ellipse",
            GateKind::Fixed(Region::Ratio { .. }) => "ratio",
            GateKind::Fitted { fitter, .. } => fitter.method(),
        }
    }

    pub fn apply(&self, parent: &EventView<'_>) -> Result<GateOutcome, GateError> {
        match &self.kind {
            GateKind::Fixed(region) => Ok(GateOutcome {
                mask: region.evaluate(parent)?,
                fitted: None,
            }),
            GateKind::Fitted { channels, fitter } => {
                for ch in channels {
                    if !parent.has_channel(ch) {
                        return Err(GateError::MissingChannel(ch.clone()));
                    }
                }
                let region = fitter.fit(parent, channels)?;
                region.validate()?;
                let mask = region.evaluate(parent)?;
                Ok(GateOutcome {
                    mask,
                    fitted: Some(region),
                })
            }
        }
    }
}

/// Structural equality: realized per-sample boundaries are not compared.
impl PartialEq for Gate {
    fn eq(&self, other: &Self) -> bool {
        if self.name != other.name {
            return false;
        }
        match (&self.kind, &other.kind) {
            (GateKind::Fixed(a), GateKind::Fixed(b)) => a == b,
            (
                GateKind::Fitted {
                    channels: ca,
                    fitter: fa,
                },
                GateKind::Fitted {
                    channels: cb,
                    fitter: fb,
                },
            ) => ca == cb && fa.method() == fb.method() && fa.args() == fb.args(),
            _ => false,
        }
    }
}

pub(crate) fn expect_channels(
    method: &str,
    channels: &[String],
    expected: usize,
) -> Result<(), GateFitError> {
    if channels.len() != expected {
        return Err(GateFitError::ChannelCount {
            method: method.to_string(),
            expected,
            got: channels.len(),
        });
    }
    Ok(())
}

/// Finite values of `channel` in `view`; missing channels read as empty.
pub(crate) fn finite_column(view: &EventView<'_>, channel: &str) -> Vec<f64> {
    view.column(channel)
        .unwrap_or_default()
        .into_iter()
        .filter(|v| v.is_finite())
        .collect()
}

#[cfg(test)]
#[path = "../../tests/src_inline/gating/tests.rs"]
mod tests;
