//! JSON analysis template: how samples are preprocessed and which gates
//! make up the strategy.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gating::quantile::Side;
use crate::gating::{
    Bound, DensityClusterFitter, Gate, GateError, MinDensityFitter, QuantileFitter, SingletFitter,
};
use crate::model::EventTable;
use crate::numeric::quantile;
use crate::transform::{Arcsinh, Log10, Logicle, LogicleParams, TransformError, TransformList};
use crate::tree::ROOT;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read template {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid template JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid well pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("gate {name}: {source}")]
    Gate { name: String, source: GateError },
    #[error(transparent)]
    Transform(#[from] TransformError),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Explicit channel renames applied after loading.
    pub rename: BTreeMap<String, String>,
    /// Replace non-identifier characters in channel names with `.`
    /// before `rename` is applied.
    pub dotted_names: bool,
    /// Regex run over the sample file name; group 1 (or the whole match)
    /// becomes the `well` metadata field.
    pub well_pattern: Option<String>,
    /// Apply the spillover matrix stored in each sample's keywords.
    pub compensate: bool,
    pub transforms: Vec<TransformSpec>,
    pub gates: Vec<GateSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformSpec {
    pub channels: Vec<String>,
    #[serde(flatten)]
    pub kind: TransformKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformKind {
    Arcsinh {
        #[serde(default = "default_cofactor")]
        cofactor: f64,
    },
    Log10,
    /// Missing `t` comes from the channel range (or data maximum), missing
    /// `w` is estimated from the reference sample's negative tail.
    Logicle {
        t: Option<f64>,
        w: Option<f64>,
        #[serde(default = "default_logicle_m")]
        m: f64,
        #[serde(default)]
        a: f64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateSpec {
    pub name: String,
    /// Parent node path; `root` when omitted.
    #[serde(default = "default_parent")]
    pub parent: String,
    #[serde(flatten)]
    pub kind: GateSpecKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum GateSpecKind {
    Rectangle {
        bounds: Vec<Bound>,
    },
    Polygon {
        x: String,
        y: String,
        vertices: Vec<[f64; 2]>,
    },
    Quantile {
        channel: String,
        q: f64,
        #[serde(default)]
        side: Side,
    },
    Mindensity {
        channel: String,
        #[serde(default)]
        side: Side,
        #[serde(default = "default_adjust")]
        adjust: f64,
        #[serde(default)]
        range: Option<(f64, f64)>,
    },
    Singlet {
        area: String,
        height: String,
        #[serde(default = "default_singlet_width")]
        width: f64,
    },
    DensityCluster {
        x: String,
        y: String,
        #[serde(default = "default_k")]
        k: usize,
        #[serde(default = "default_level")]
        level: f64,
        #[serde(default)]
        target: Option<[f64; 2]>,
    },
}

fn default_cofactor() -> f64 {
    Arcsinh::default().cofactor
}

fn default_logicle_m() -> f64 {
    LogicleParams::default().m
}

fn default_parent() -> String {
    ROOT.to_string()
}

fn default_adjust() -> f64 {
    MinDensityFitter::default().adjust
}

fn default_singlet_width() -> f64 {
    SingletFitter::default().width
}

fn default_k() -> usize {
    DensityClusterFitter::default().k
}

fn default_level() -> f64 {
    DensityClusterFitter::default().level
}

impl AnalysisConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: AnalysisConfig = serde_json::from_str(raw)?;
        config.well_regex()?;
        config.build_gates()?;
        Ok(config)
    }

    pub fn well_regex(&self) -> Result<Option<Regex>, ConfigError> {
        match &self.well_pattern {
            Some(p) => Ok(Some(Regex::new(p)?)),
            None => Ok(None),
        }
    }

    /// Gates paired with their parent paths, in template order.
    pub fn build_gates(&self) -> Result<Vec<(String, Gate)>, ConfigError> {
        self.gates
            .iter()
            .map(|spec| Ok((spec.parent.clone(), spec.build()?)))
            .collect()
    }

    /// Resolves the transform list against a reference table, estimating
    /// any logicle parameters the template leaves open.
    pub fn build_transforms(&self, reference: &EventTable) -> Result<TransformList, ConfigError> {
        let mut list = TransformList::new();
        for spec in &self.transforms {
            for channel in &spec.channels {
                match &spec.kind {
                    TransformKind::Arcsinh { cofactor } => {
                        list.push(channel, Arc::new(Arcsinh::new(*cofactor)?));
                    }
                    TransformKind::Log10 => list.push(channel, Arc::new(Log10)),
                    TransformKind::Logicle { t, w, m, a } => {
                        let params = logicle_params(reference, channel, *t, *w, *m, *a)?;
                        tracing::debug!(
                            channel = %channel,
                            t = params.t,
                            w = params.w,
                            m = params.m,
                            a = params.a,
                            "logicle parameters"
                        );
                        list.push(channel, Arc::new(Logicle::new(params)?));
                    }
                }
            }
        }
        Ok(list)
    }
}

fn logicle_params(
    reference: &EventTable,
    channel: &str,
    t: Option<f64>,
    w: Option<f64>,
    m: f64,
    a: f64,
) -> Result<LogicleParams, TransformError> {
    let values = reference
        .column(channel)
        .ok_or_else(|| TransformError::UnknownChannel(channel.to_string()))?;
    let t = match t {
        Some(t) => t,
        None => reference
            .channel(channel)
            .and_then(|meta| meta.range)
            .filter(|r| *r > 0.0)
            .unwrap_or_else(|| quantile(values, 1.0)),
    };
    if !(t > 0.0) {
        return Err(TransformError::InvalidParams(format!(
            "no positive top of scale for {channel}"
        )));
    }
    Ok(match w {
        Some(w) => LogicleParams { t, w, m, a },
        None => LogicleParams::estimate(values, t, m, a),
    })
}

impl GateSpec {
    pub fn build(&self) -> Result<Gate, ConfigError> {
        let name = self.name.as_str();
        let gate = match &self.kind {
            GateSpecKind::Rectangle { bounds } => Gate::rectangle(name, bounds.clone()),
            GateSpecKind::Polygon { x, y, vertices } => Gate::polygon(name, x, y, vertices.clone()),
            GateSpecKind::Quantile { channel, q, side } => Ok(Gate::fitted(
                name,
                vec![channel.clone()],
                Arc::new(QuantileFitter { q: *q, side: *side }),
            )),
            GateSpecKind::Mindensity {
                channel,
                side,
                adjust,
                range,
            } => Ok(Gate::fitted(
                name,
                vec![channel.clone()],
                Arc::new(MinDensityFitter {
                    side: *side,
                    adjust: *adjust,
                    range: *range,
                }),
            )),
            GateSpecKind::Singlet {
                area,
                height,
                width,
            } => Ok(Gate::fitted(
                name,
                vec![area.clone(), height.clone()],
                Arc::new(SingletFitter { width: *width }),
            )),
            GateSpecKind::DensityCluster {
                x,
                y,
                k,
                level,
                target,
            } => Ok(Gate::fitted(
                name,
                vec![x.clone(), y.clone()],
                Arc::new(DensityClusterFitter {
                    k: *k,
                    level: *level,
                    target: *target,
                    ..DensityClusterFitter::default()
                }),
            )),
        };
        gate.map_err(|source| ConfigError::Gate {
            name: self.name.clone(),
            source,
        })
    }
}

#[cfg(test)]
#[path = "../tests/src_inline/config.rs"]
mod tests;
