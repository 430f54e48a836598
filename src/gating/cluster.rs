use crate::gating::{GateFitError, GateFitter, Region, expect_channels};
use crate::model::EventView;
use crate::numeric::{mean, std_dev};

const MIN_EVENTS_PER_COMPONENT: usize = 5;
const REGULARIZE: f64 = 1e-6;

/// Two-channel density clustering: a `k`-component bivariate Gaussian
/// mixture fitted by EM; the gate is one component's ellipse at
/// probability `level`.
#[derive(Debug, Clone)]
pub struct DensityClusterFitter {
    pub k: usize,
    pub level: f64,
    /// Pick the component whose mean is nearest this point; the heaviest
    /// component otherwise.
    pub target: Option<[f64; 2]>,
    pub max_iter: usize,
    pub tolerance: f64,
}

impl Default for DensityClusterFitter {
    fn default() -> Self {
        Self {
            k: 2,
            level: 0.9,
            target: None,
            max_iter: 200,
            tolerance: 1e-6,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub weight: f64,
    pub mean: [f64; 2],
    pub cov: [[f64; 2]; 2],
}

#[derive(Debug, Clone)]
pub struct Mixture {
    pub components: Vec<Component>,
    pub log_likelihood: f64,
    pub iterations: usize,
}

impl GateFitter for DensityClusterFitter {
    fn method(&self) -> &str {
        "density_cluster"
    }

    fn args(&self) -> String {
        format!(
            "k={};level={};target={:?};max_iter={};tolerance={}",
            self.k, self.level, self.target, self.max_iter, self.tolerance
        )
    }

    fn fit(&self, view: &EventView<'_>, channels: &[String]) -> Result<Region, GateFitError> {
        expect_channels(self.method(), channels, 2)?;
        if !(self.level > 0.0 && self.level < 1.0) || self.k == 0 {
            return Err(self.degenerate(format!(
                "invalid arguments k={} level={}",
                self.k, self.level
            )));
        }
        let xs = view.column(&channels[0]).unwrap_or_default();
        let ys = view.column(&channels[1]).unwrap_or_default();
        let points: Vec<[f64; 2]> = xs
            .iter()
            .zip(&ys)
            .filter(|(x, y)| x.is_finite() && y.is_finite())
            .map(|(&x, &y)| [x, y])
            .collect();
        if points.is_empty() {
            return Err(GateFitError::EmptyInput {
                method: self.method().to_string(),
            });
        }
        if points.len() < self.k * MIN_EVENTS_PER_COMPONENT {
            return Err(self.degenerate(format!(
                "{} events for {} components",
                points.len(),
                self.k
            )));
        }

        let mixture = self.fit_mixture(&points)?;
        let chosen = self.pick_component(&mixture.components);
        tracing::debug!(
            iterations = mixture.iterations,
            log_likelihood = mixture.log_likelihood,
            weight = chosen.weight,
            "density cluster fitted"
        );
        Ok(Region::Ellipse {
            x: channels[0].clone(),
            y: channels[1].clone(),
            center: chosen.mean,
            cov: chosen.cov,
            cutoff: chi2_2dof_quantile(self.level),
        })
    }
}

impl DensityClusterFitter {
    fn degenerate(&self, reason: String) -> GateFitError {
        GateFitError::Degenerate {
            method: self.method().to_string(),
            reason,
        }
    }

    fn pick_component<'a>(&self, components: &'a [Component]) -> &'a Component {
        let mut best = &components[0];
        for c in &components[1..] {
            let better = match self.target {
                Some(t) => sq_dist(c.mean, t) < sq_dist(best.mean, t),
                None => c.weight > best.weight,
            };
            if better {
                best = c;
            }
        }
        best
    }

    /// EM on standardized coordinates; the result is mapped back to channel
    /// units.
    pub fn fit_mixture(&self, points: &[[f64; 2]]) -> Result<Mixture, GateFitError> {
        let xs: Vec<f64> = points.iter().map(|p| p[0]).collect();
        let ys: Vec<f64> = points.iter().map(|p| p[1]).collect();
        let shift = [mean(&xs), mean(&ys)];
        let scale = [std_dev(&xs), std_dev(&ys)];
        if !(scale[0] > 0.0 && scale[1] > 0.0) {
            return Err(self.degenerate("a channel has zero variance".to_string()));
        }
        let z: Vec<[f64; 2]> = points
            .iter()
            .map(|p| {
                [
                    (p[0] - shift[0]) / scale[0],
                    (p[1] - shift[1]) / scale[1],
                ]
            })
            .collect();

        let n = z.len();
        let k = self.k;
        let mut components = initial_components(&z, k);
        let mut resp = vec![0f64; n * k];
        let mut last_ll = f64::NEG_INFINITY;

        for iter in 1..=self.max_iter {
            // E step
            let mut ll = 0f64;
            for (i, p) in z.iter().enumerate() {
                let row = &mut resp[i * k..(i + 1) * k];
                let mut max_log = f64::NEG_INFINITY;
                for (j, c) in components.iter().enumerate() {
                    row[j] = c.weight.ln() + log_gauss(*p, c);
                    max_log = max_log.max(row[j]);
                }
                let mut sum = 0f64;
                for r in row.iter_mut() {
                    *r = (*r - max_log).exp();
                    sum += *r;
                }
                for r in row.iter_mut() {
                    *r /= sum;
                }
                ll += max_log + sum.ln();
            }
            if !ll.is_finite() {
                return Err(GateFitError::NoConvergence {
                    method: self.method().to_string(),
                    iterations: iter,
                });
            }

            // M step
            for (j, c) in components.iter_mut().enumerate() {
                let mut nk = 0f64;
                let mut mx = 0f64;
                let mut my = 0f64;
                for (i, p) in z.iter().enumerate() {
                    let r = resp[i * k + j];
                    nk += r;
                    mx += r * p[0];
                    my += r * p[1];
                }
                if nk < 1.0 {
                    return Err(self.degenerate(format!("component {j} collapsed")));
                }
                mx /= nk;
                my /= nk;
                let (mut sxx, mut sxy, mut syy) = (0f64, 0f64, 0f64);
                for (i, p) in z.iter().enumerate() {
                    let r = resp[i * k + j];
                    let dx = p[0] - mx;
                    let dy = p[1] - my;
                    sxx += r * dx * dx;
                    sxy += r * dx * dy;
                    syy += r * dy * dy;
                }
                c.weight = nk / n as f64;
                c.mean = [mx, my];
                c.cov = [
                    [sxx / nk + REGULARIZE, sxy / nk],
                    [sxy / nk, syy / nk + REGULARIZE],
                ];
            }

            if (ll - last_ll).abs() <= self.tolerance * ll.abs().max(1.0) {
                return Ok(Mixture {
                    components: unstandardize(&components, shift, scale),
                    log_likelihood: ll,
                    iterations: iter,
                });
            }
            last_ll = ll;
        }

        Err(GateFitError::NoConvergence {
            method: self.method().to_string(),
            iterations: self.max_iter,
        })
    }
}

/// Seeds components at evenly spaced quantiles of the projection onto the
/// first principal axis, with a shared isotropic covariance.
fn initial_components(z: &[[f64; 2]], k: usize) -> Vec<Component> {
    let (sxx, sxy, syy) = z.iter().fold((0.0, 0.0, 0.0), |(a, b, c), p| {
        (a + p[0] * p[0], b + p[0] * p[1], c + p[1] * p[1])
    });
    // Leading eigenvector of the 2x2 scatter matrix.
    let tr = sxx + syy;
    let det = sxx * syy - sxy * sxy;
    let lambda = tr / 2.0 + ((tr * tr / 4.0) - det).max(0.0).sqrt();
    let axis = if sxy.abs() > 1e-12 {
        normalize([lambda - syy, sxy])
    } else if sxx >= syy {
        [1.0, 0.0]
    } else {
        [0.0, 1.0]
    };

    let mut proj: Vec<(f64, usize)> = z
        .iter()
        .enumerate()
        .map(|(i, p)| (p[0] * axis[0] + p[1] * axis[1], i))
        .collect();
    proj.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    let n = z.len();
    let spread = 1.0 / k as f64;
    (0..k)
        .map(|j| {
            // Mean of the j-th slice along the axis.
            let start = j * n / k;
            let end = ((j + 1) * n / k).max(start + 1).min(n);
            let slice = &proj[start..end];
            let mut m = [0f64; 2];
            for &(_, i) in slice {
                m[0] += z[i][0];
                m[1] += z[i][1];
            }
            let len = slice.len() as f64;
            Component {
                weight: spread,
                mean: [m[0] / len, m[1] / len],
                cov: [[spread, 0.0], [0.0, spread]],
            }
        })
        .collect()
}

fn unstandardize(components: &[Component], shift: [f64; 2], scale: [f64; 2]) -> Vec<Component> {
    components
        .iter()
        .map(|c| Component {
            weight: c.weight,
            mean: [
                shift[0] + scale[0] * c.mean[0],
                shift[1] + scale[1] * c.mean[1],
            ],
            cov: [
                [
                    scale[0] * scale[0] * c.cov[0][0],
                    scale[0] * scale[1] * c.cov[0][1],
                ],
                [
                    scale[1] * scale[0] * c.cov[1][0],
                    scale[1] * scale[1] * c.cov[1][1],
                ],
            ],
        })
        .collect()
}

fn log_gauss(p: [f64; 2], c: &Component) -> f64 {
    let det = c.cov[0][0] * c.cov[1][1] - c.cov[0][1] * c.cov[1][0];
    if !(det > 0.0) {
        return f64::NEG_INFINITY;
    }
    let dx = p[0] - c.mean[0];
    let dy = p[1] - c.mean[1];
    let d2 = (c.cov[1][1] * dx * dx - 2.0 * c.cov[0][1] * dx * dy + c.cov[0][0] * dy * dy) / det;
    -0.5 * d2 - 0.5 * det.ln() - (2.0 * std::f64::consts::PI).ln()
}

/// Chi-square quantile with two degrees of freedom.
pub fn chi2_2dof_quantile(p: f64) -> f64 {
    -2.0 * (1.0 - p).ln()
}

fn sq_dist(a: [f64; 2], b: [f64; 2]) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)
}

fn normalize(v: [f64; 2]) -> [f64; 2] {
    let len = (v[0] * v[0] + v[1] * v[1]).sqrt();
    [v[0] / len, v[1] / len]
}

