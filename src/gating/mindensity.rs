use crate::gating::quantile::Side;
use crate::gating::{GateFitError, GateFitter, Region, expect_channels, finite_column};
use crate::numeric::{finite_sorted, quantile_sorted, std_dev};
use crate::model::EventView;

const GRID: usize = 512;
const MIN_EVENTS: usize = 10;
// Peaks below this share of the tallest peak are treated as noise.
const MIN_PEAK_SHARE: f64 = 0.05;

/// One-channel threshold at the density valley between the two dominant
/// modes of a Gaussian kernel density estimate.
#[derive(Debug, Clone)]
pub struct MinDensityFitter {
    pub side: Side,
    /// Multiplier on Silverman's bandwidth.
    pub adjust: f64,
    /// Restricts fitting to events inside this range.
    pub range: Option<(f64, f64)>,
}

impl Default for MinDensityFitter {
    fn default() -> Self {
        Self {
            side: Side::Above,
            adjust: 1.0,
            range: None,
        }
    }
}

impl GateFitter for MinDensityFitter {
    fn method(&self) -> &str {
        "mindensity"
    }

    fn args(&self) -> String {
        format!(
            "side={:?};adjust={};range={:?}",
            self.side, self.adjust, self.range
        )
    }

    fn fit(&self, view: &EventView<'_>, channels: &[String]) -> Result<Region, GateFitError> {
        expect_channels(self.method(), channels, 1)?;
        let mut values = finite_column(view, &channels[0]);
        if let Some((lo, hi)) = self.range {
            values.retain(|v| *v >= lo && *v <= hi);
        }
        if values.is_empty() {
            return Err(GateFitError::EmptyInput {
                method: self.method().to_string(),
            });
        }
        if values.len() < MIN_EVENTS {
            return Err(self.degenerate(format!("only {} events", values.len())));
        }

        let threshold = valley_threshold(&values, self.adjust)
            .map_err(|reason| self.degenerate(reason))?;
        Ok(Region::Rectangle {
            bounds: vec![self.side.bound(&channels[0], threshold)],
        })
    }
}

impl MinDensityFitter {
    fn degenerate(&self, reason: String) -> GateFitError {
        GateFitError::Degenerate {
            method: self.method().to_string(),
            reason,
        }
    }
}

/// Silverman's rule of thumb scaled by `adjust`.
pub fn bandwidth(values: &[f64], adjust: f64) -> f64 {
    let sorted = finite_sorted(values);
    let n = sorted.len() as f64;
    let sd = std_dev(&sorted);
    let iqr = quantile_sorted(&sorted, 0.75) - quantile_sorted(&sorted, 0.25);
    let spread = if iqr > 0.0 { sd.min(iqr / 1.34) } else { sd };
    0.9 * spread * n.powf(-0.2) * adjust
}

/// Linear-binned Gaussian KDE on a regular grid. Returns `(grid, density)`.
pub fn binned_kde(values: &[f64], h: f64) -> (Vec<f64>, Vec<f64>) {
    let lo = values.iter().copied().fold(f64::INFINITY, f64::min) - 3.0 * h;
    let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max) + 3.0 * h;
    let step = (hi - lo) / (GRID - 1) as f64;
    let grid: Vec<f64> = (0..GRID).map(|i| lo + step * i as f64).collect();

    let mut weights = vec![0f64; GRID];
    for &v in values {
        let pos = (v - lo) / step;
        let i = (pos.floor() as usize).min(GRID - 2);
        let frac = pos - i as f64;
        weights[i] += 1.0 - frac;
        weights[i + 1] += frac;
    }

    let reach = ((4.0 * h / step).ceil() as usize).min(GRID - 1);
    let kernel: Vec<f64> = (0..=reach)
        .map(|k| {
            let z = k as f64 * step / h;
            (-0.5 * z * z).exp()
        })
        .collect();
    let norm = 1.0 / (values.len() as f64 * h * (2.0 * std::f64::consts::PI).sqrt());

    let mut density = vec![0f64; GRID];
    for (j, &w) in weights.iter().enumerate() {
        if w == 0.0 {
            continue;
        }
        let start = j.saturating_sub(reach);
        let end = (j + reach).min(GRID - 1);
        for (g, d) in density.iter_mut().enumerate().take(end + 1).skip(start) {
            *d += w * kernel[g.abs_diff(j)];
        }
    }
    for d in &mut density {
        *d *= norm;
    }
    (grid, density)
}

fn valley_threshold(values: &[f64], adjust: f64) -> Result<f64, String> {
    let h = bandwidth(values, adjust);
    if !(h > 0.0) || !h.is_finite() {
        return Err("zero bandwidth (constant channel)".to_string());
    }
    let (grid, density) = binned_kde(values, h);
    let tallest = density.iter().copied().fold(0.0, f64::max);

    let mut peaks: Vec<usize> = (1..GRID - 1)
        .filter(|&i| {
            density[i] > density[i - 1]
                && density[i] >= density[i + 1]
                && density[i] >= MIN_PEAK_SHARE * tallest
        })
        .collect();
    if peaks.len() < 2 {
        return Err(format!("{} density mode(s); need two", peaks.len()));
    }
    peaks.sort_by(|&a, &b| {
        density[b]
            .partial_cmp(&density[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let (left, right) = if peaks[0] < peaks[1] {
        (peaks[0], peaks[1])
    } else {
        (peaks[1], peaks[0])
    };

    let mut best = left;
    for i in left..=right {
        if density[i] < density[best] {
            best = i;
        }
    }
    Ok(grid[best])
}
