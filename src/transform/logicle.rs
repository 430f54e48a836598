//! Logicle display transform (Parks, Roederer & Moore 2006): linear around
//! zero, logarithmic for large values, symmetric for negatives.

use serde::{Deserialize, Serialize};

use crate::numeric::quantile;
use crate::transform::{Transform, TransformError};

const LN_10: f64 = std::f64::consts::LN_10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogicleParams {
    /// Top of scale data value.
    pub t: f64,
    /// Linearization width in decades.
    pub w: f64,
    /// Total display width in decades.
    pub m: f64,
    /// Additional negative decades.
    pub a: f64,
}

impl Default for LogicleParams {
    fn default() -> Self {
        Self {
            t: 262_144.0,
            w: 0.5,
            m: 4.5,
            a: 0.0,
        }
    }
}

impl LogicleParams {
    /// Picks `w` from the 5th percentile of the data so that the negative
    /// spread falls inside the linear region. Falls back to the default
    /// width when the data give no usable estimate.
    pub fn estimate(values: &[f64], t: f64, m: f64, a: f64) -> Self {
        let default_w = LogicleParams::default().w;
        let r = quantile(values, 0.05);
        let w = if r.is_finite() && r < 0.0 {
            (m - (t / r.abs()).log10()) / 2.0
        } else {
            default_w
        };
        let w = if w.is_finite() {
            w.clamp(0.0, (m / 2.0 - 1e-6).max(0.0))
        } else {
            default_w
        };
        Self { t, w, m, a }
    }

    pub fn validate(&self) -> Result<(), TransformError> {
        let ok = self.t > 0.0
            && self.m > 0.0
            && self.w >= 0.0
            && 2.0 * self.w <= self.m
            && self.a >= -self.w
            && self.a <= self.m - 2.0 * self.w;
        if ok {
            Ok(())
        } else {
            Err(TransformError::InvalidParams(format!("{self:?}")))
        }
    }
}

#[derive(Debug, Clone)]
pub struct Logicle {
    params: LogicleParams,
    a: f64,
    b: f64,
    c: f64,
    d: f64,
    f: f64,
    x1: f64,
    // slope of the biexponential at x1, used to seed the Newton step
    slope: f64,
}

impl Logicle {
    pub fn new(params: LogicleParams) -> Result<Self, TransformError> {
        params.validate()?;
        let LogicleParams { t, w, m, a } = params;

        let w_scaled = w / (m + a);
        let x2 = a / (m + a);
        let x1 = x2 + w_scaled;
        let x0 = x2 + 2.0 * w_scaled;
        let b = (m + a) * LN_10;
        let d = solve_d(b, w_scaled)?;
        let c_a = (x0 * (b + d)).exp();
        let mf_a = (b * x1).exp() - c_a / (d * x1).exp();
        let a_coef = t / (b.exp() - mf_a - c_a / d.exp());
        let c = c_a * a_coef;
        let f = -mf_a * a_coef;
        let slope = a_coef * b * (b * x1).exp() + c * d / (d * x1).exp();

        Ok(Self {
            params,
            a: a_coef,
            b,
            c,
            d,
            f,
            x1,
            slope,
        })
    }

    pub fn params(&self) -> LogicleParams {
        self.params
    }

    fn biexponential(&self, x: f64) -> f64 {
        self.a * (self.b * x).exp() - self.c / (self.d * x).exp() + self.f
    }

    /// Data value → display scale, `[0, 1]` for data in `[-T·10^-(M), T]`.
    pub fn scale(&self, value: f64) -> f64 {
        if value.is_nan() {
            return f64::NAN;
        }
        if value == 0.0 {
            return self.x1;
        }
        let negative = value < 0.0;
        let v = value.abs();

        let mut x = if v < self.slope * 0.1 {
            self.x1 + v / self.slope
        } else {
            (v / self.a).ln() / self.b
        };
        if !x.is_finite() {
            x = self.x1 + v / self.slope;
        }
        for _ in 0..50 {
            let ae2bx = self.a * (self.b * x).exp();
            let ce2mdx = self.c / (self.d * x).exp();
            let y = ae2bx + self.f - ce2mdx - v;
            let dy = self.b * ae2bx + self.d * ce2mdx;
            let ddy = self.b * self.b * ae2bx - self.d * self.d * ce2mdx;
            // Halley's method
            let delta = y / (dy * (1.0 - y * ddy / (2.0 * dy * dy)));
            x -= delta;
            if delta.abs() < 1e-12 * x.abs().max(1.0) {
                break;
            }
        }
        if negative { 2.0 * self.x1 - x } else { x }
    }

    /// Display scale → data value.
    pub fn inverse(&self, x: f64) -> f64 {
        if x.is_nan() {
            return f64::NAN;
        }
        let negative = x < self.x1;
        let reflected = if negative { 2.0 * self.x1 - x } else { x };
        let v = self.biexponential(reflected);
        if negative { -v } else { v }
    }
}

impl Transform for Logicle {
    fn name(&self) -> &str {
        "logicle"
    }

    fn apply(&self, x: f64) -> f64 {
        self.scale(x)
    }

    fn invert(&self, y: f64) -> f64 {
        self.inverse(y)
    }
}

/// Root of `2 ln(d) + w d = 2 ln(b) - w b` in `(0, b]` by bisection.
fn solve_d(b: f64, w: f64) -> Result<f64, TransformError> {
    if w == 0.0 {
        return Ok(b);
    }
    let target = 2.0 * b.ln() - w * b;
    let g = |d: f64| 2.0 * d.ln() + w * d - target;
    let (mut lo, mut hi) = (f64::MIN_POSITIVE, b);
    if g(hi) < 0.0 {
        return Err(TransformError::InvalidParams(format!(
            "no logicle solution for b={b} w={w}"
        )));
    }
    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if g(mid) < 0.0 {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo <= 2.0 * f64::EPSILON * b {
            break;
        }
    }
    Ok(0.5 * (lo + hi))
}

#[cfg(test)]
#[path = "../../tests/src_inline/transform/logicle.rs"]
mod tests;
