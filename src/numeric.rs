//! Small order-statistic helpers shared by gate fitting and aggregation.
//! All functions ignore non-finite values and return NaN for empty input.

use std::cmp::Ordering;

pub fn finite_sorted(values: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    sorted
}

/// Linear interpolation between order statistics (R's default, type 7).
pub fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() || !(0.0..=1.0).contains(&p) {
        return f64::NAN;
    }
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let h = (n - 1) as f64 * p;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

pub fn quantile(values: &[f64], p: f64) -> f64 {
    quantile_sorted(&finite_sorted(values), p)
}

pub fn median(values: &[f64]) -> f64 {
    quantile(values, 0.5)
}

pub fn mean(values: &[f64]) -> f64 {
    let mut sum = 0f64;
    let mut n = 0usize;
    for &v in values {
        if v.is_finite() {
            sum += v;
            n += 1;
        }
    }
    if n == 0 { f64::NAN } else { sum / n as f64 }
}

/// Sample standard deviation (n - 1 denominator).
pub fn std_dev(values: &[f64]) -> f64 {
    let m = mean(values);
    let mut ss = 0f64;
    let mut n = 0usize;
    for &v in values {
        if v.is_finite() {
            ss += (v - m) * (v - m);
            n += 1;
        }
    }
    if n < 2 { f64::NAN } else { (ss / (n - 1) as f64).sqrt() }
}

/// Median absolute deviation scaled to be consistent with the normal sd.
pub fn mad(values: &[f64]) -> f64 {
    let m = median(values);
    if m.is_nan() {
        return f64::NAN;
    }
    let dev: Vec<f64> = values
        .iter()
        .filter(|v| v.is_finite())
        .map(|v| (v - m).abs())
        .collect();
    1.4826 * median(&dev)
}

#[cfg(test)]
#[path = "../tests/src_inline/numeric.rs"]
mod tests;
