use serde::{Deserialize, Serialize};

use crate::gating::GateError;
use crate::model::{EventView, Mask};

/// Closed interval on one channel; a missing side is unbounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl Bound {
    pub fn new(channel: &str, min: Option<f64>, max: Option<f64>) -> Self {
        Self {
            channel: channel.to_string(),
            min,
            max,
        }
    }

    pub fn contains(&self, v: f64) -> bool {
        if v.is_nan() {
            return false;
        }
        self.min.is_none_or(|lo| v >= lo) && self.max.is_none_or(|hi| v <= hi)
    }
}

/// A realized gate boundary in channel space.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum Region {
    /// One bound is a threshold gate, two a rectangle.
    Rectangle { bounds: Vec<Bound> },
    Polygon {
        x: String,
        y: String,
        vertices: Vec<[f64; 2]>,
    },
    /// Points whose squared Mahalanobis distance from `center` is at most
    /// `cutoff`.
    Ellipse {
        x: String,
        y: String,
        center: [f64; 2],
        cov: [[f64; 2]; 2],
        cutoff: f64,
    },
    /// `numerator / denominator` within `[min, max]`; a non-positive
    /// denominator is outside.
    Ratio {
        numerator: String,
        denominator: String,
        min: f64,
        max: f64,
    },
}

impl Region {
    pub fn channels(&self) -> Vec<&str> {
        match self {
            Region::Rectangle { bounds } => bounds.iter().map(|b| b.channel.as_str()).collect(),
            Region::Polygon { x, y, .. } | Region::Ellipse { x, y, .. } => {
                vec![x.as_str(), y.as_str()]
            }
            Region::Ratio {
                numerator,
                denominator,
                ..
            } => vec![numerator.as_str(), denominator.as_str()],
        }
    }

    pub fn validate(&self) -> Result<(), GateError> {
        match self {
            Region::Rectangle { bounds } => {
                if bounds.is_empty() || bounds.len() > 2 {
                    return Err(GateError::Invalid(format!(
                        "rectangle needs 1 or 2 bounds, got {}",
                        bounds.len()
                    )));
                }
                for b in bounds {
                    if let (Some(lo), Some(hi)) = (b.min, b.max) {
                        if lo > hi {
                            return Err(GateError::Invalid(format!(
                                "bound on {} has min {} > max {}",
                                b.channel, lo, hi
                            )));
                        }
                    }
                }
                Ok(())
            }
            Region::Polygon { vertices, .. } => {
                if vertices.len() < 3 {
                    return Err(GateError::Invalid(format!(
                        "polygon needs at least 3 vertices, got {}",
                        vertices.len()
                    )));
                }
                Ok(())
            }
            Region::Ellipse { cov, cutoff, .. } => {
                let det = cov[0][0] * cov[1][1] - cov[0][1] * cov[1][0];
                if !(det > 0.0) || !(*cutoff > 0.0) {
                    return Err(GateError::Invalid(
                        "ellipse covariance must be positive definite".to_string(),
                    ));
                }
                Ok(())
            }
            Region::Ratio { min, max, .. } => {
                if min > max {
                    return Err(GateError::Invalid(format!(
                        "ratio band min {min} > max {max}"
                    )));
                }
                Ok(())
            }
        }
    }

    /// Membership of every event in `view`.
    pub fn evaluate(&self, view: &EventView<'_>) -> Result<Mask, GateError> {
        let bits = match self {
            Region::Rectangle { bounds } => {
                let mut bits = vec![true; view.len()];
                for b in bounds {
                    let col = column(view, &b.channel)?;
                    for (keep, v) in bits.iter_mut().zip(col) {
                        *keep = *keep && b.contains(v);
                    }
                }
                bits
            }
            Region::Polygon { x, y, vertices } => {
                let xs = column(view, x)?;
                let ys = column(view, y)?;
                xs.iter()
                    .zip(&ys)
                    .map(|(&px, &py)| point_in_polygon(px, py, vertices))
                    .collect()
            }
            Region::Ellipse {
                x,
                y,
                center,
                cov,
                cutoff,
            } => {
                let xs = column(view, x)?;
                let ys = column(view, y)?;
                let det = cov[0][0] * cov[1][1] - cov[0][1] * cov[1][0];
                let inv = [
                    [cov[1][1] / det, -cov[0][1] / det],
                    [-cov[1][0] / det, cov[0][0] / det],
                ];
                xs.iter()
                    .zip(&ys)
                    .map(|(&px, &py)| {
                        let dx = px - center[0];
                        let dy = py - center[1];
                        let d2 = dx * (inv[0][0] * dx + inv[0][1] * dy)
                            + dy * (inv[1][0] * dx + inv[1][1] * dy);
                        d2 <= *cutoff
                    })
                    .collect()
            }
            Region::Ratio {
                numerator,
                denominator,
                min,
                max,
            } => {
                let num = column(view, numerator)?;
                let den = column(view, denominator)?;
                num.iter()
                    .zip(&den)
                    .map(|(&a, &h)| {
                        if !(h > 0.0) {
                            return false;
                        }
                        let r = a / h;
                        r >= *min && r <= *max
                    })
                    .collect()
            }
        };
        Ok(Mask::from_bools(bits))
    }
}

fn column(view: &EventView<'_>, channel: &str) -> Result<Vec<f64>, GateError> {
    view.column(channel)
        .ok_or_else(|| GateError::MissingChannel(channel.to_string()))
}

/// Even-odd rule; points on an edge or vertex count as inside. Fewer than
/// three vertices enclose nothing.
pub fn point_in_polygon(px: f64, py: f64, vertices: &[[f64; 2]]) -> bool {
    if !px.is_finite() || !py.is_finite() {
        return false;
    }
    let n = vertices.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let [xi, yi] = vertices[i];
        let [xj, yj] = vertices[j];
        if on_segment(px, py, xi, yi, xj, yj) {
            return true;
        }
        if (yi > py) != (yj > py) {
            let x_cross = xi + (py - yi) * (xj - xi) / (yj - yi);
            if px < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

fn on_segment(px: f64, py: f64, x1: f64, y1: f64, x2: f64, y2: f64) -> bool {
    let cross = (px - x1) * (y2 - y1) - (py - y1) * (x2 - x1);
    let scale = ((x2 - x1).abs() + (y2 - y1).abs()).max(1.0);
    if cross.abs() > 1e-12 * scale {
        return false;
    }
    px >= x1.min(x2) && px <= x1.max(x2) && py >= y1.min(y2) && py <= y1.max(y2)
}

#[cfg(test)]
#[path = "../../tests/src_inline/gating/region.rs"]
mod tests;
